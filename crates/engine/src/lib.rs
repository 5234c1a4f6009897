//! The two long-running, streamed jobs over the results ledger: the
//! ingestion pipeline (file -> lines -> parser -> matcher -> ledger) and
//! the rollback engine (soft-delete an upload, recompute every
//! constituency it touched), plus the typed event protocol both stream.

pub mod events;
pub mod ingest;
pub mod matcher;
pub mod rollback;

/// How many lines/constituencies are processed between progress events.
pub const PROGRESS_BATCH_SIZE: usize = 10;
