//! Turn batch requests into an ordered stream of block data.
mod block;
mod engine;
mod error;
mod height;
mod normalize;

pub use self::block::{compare_items, BlockData, BlockHeader, Item, Log, Transaction};
pub use self::engine::{
    DataBatch, DataBatchStream, Ingest, IngestOptions, DEFAULT_BATCH_SIZE,
    MAX_QUEUE_SIZE,
};
pub use self::error::IngestError;
pub use self::height::ArchiveHeight;
pub use self::normalize::{normalize_rows, short_hash};
