//! HTTP surface for the tally election-results service.
//!
//! The query façade (constituencies, totals, upload history) plus the two
//! streaming operations: file ingestion and upload rollback, both served
//! as SSE event streams.

pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;
