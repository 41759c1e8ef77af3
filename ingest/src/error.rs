#[derive(Debug, Clone)]
pub struct EvmIngestError;

impl error_stack::Context for EvmIngestError {}

impl std::fmt::Display for EvmIngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EVM ingest error")
    }
}
