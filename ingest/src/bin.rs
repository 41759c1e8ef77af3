use clap::Parser;
use error_stack::{Result, ResultExt};
use evm_ingest::{cli::Cli, error::EvmIngestError};
use evm_ingest_observability::init_opentelemetry;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[cfg(not(windows))]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> Result<(), EvmIngestError> {
    let args = Cli::parse();
    run_with_args(args).await
}

async fn run_with_args(args: Cli) -> Result<(), EvmIngestError> {
    init_opentelemetry(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
        .change_context(EvmIngestError)
        .attach_printable("failed to initialize opentelemetry")?;

    let ct = CancellationToken::new();

    ctrlc::set_handler({
        let ct = ct.clone();
        move || {
            info!("SIGINT received");
            ct.cancel();
        }
    })
    .change_context(EvmIngestError)
    .attach_printable("failed to set SIGINT handler")?;

    args.run(ct).await
}
