#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// The ingestion options are invalid.
    Configuration,
    /// The gateway request failed after exhausting its retry policy.
    Gateway,
    /// The archive reported a height lower than the one used to build the query.
    HeightRegressed,
    /// The gateway response is internally inconsistent.
    InconsistentData,
    /// The engine bookkeeping is broken.
    InvalidState,
    /// The gateway response violates the query protocol.
    Protocol,
    /// Failed to serialize the query.
    Serialization,
}

impl error_stack::Context for IngestError {}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::Configuration => write!(f, "ingest error: invalid configuration"),
            IngestError::Gateway => write!(f, "ingest error: gateway request error"),
            IngestError::HeightRegressed => write!(f, "ingest error: archive height regressed"),
            IngestError::InconsistentData => {
                write!(f, "ingest error: inconsistent gateway data")
            }
            IngestError::InvalidState => write!(f, "ingest error: invalid state"),
            IngestError::Protocol => write!(f, "ingest error: protocol violation"),
            IngestError::Serialization => write!(f, "ingest error: failed to serialize query"),
        }
    }
}
