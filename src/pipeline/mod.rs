// ============================================================================
// Pipeline
// ============================================================================
//
// Write side: `IngestionLoop` moves broker messages into the store and cache.
// Read side: `ReadPath` answers lookups from the cache, falling back to the
// store.
//
// ============================================================================

mod ingest;
mod read_path;
mod warm;

pub use ingest::{IngestError, IngestStats, IngestionLoop, MessageStage};
pub use read_path::ReadPath;
pub use warm::warm_cache;
