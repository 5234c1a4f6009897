//! Line-level ingestion error taxonomy.
//!
//! Every failure while ingesting one line of a results file — at parse,
//! match, or ledger-append time — is recorded as a [`LineError`]. These are
//! persisted on the upload row as a JSON array and carried verbatim in the
//! ingestion `complete` event, so operators can triage a file without
//! re-running it.

use serde::{Deserialize, Serialize};

/// The category of a per-line ingestion failure.
///
/// The first four arise in the parser; `ConstituencyNotMatched` comes from
/// the matcher, and `DuplicateConstituencyInUpload` from a ledger conflict
/// (the same constituency listed twice in one file). All are recoverable:
/// the offending line is skipped and the upload continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestErrorKind {
    MalformedLine,
    InvalidVoteCount,
    DuplicateParty,
    UnknownParty,
    ConstituencyNotMatched,
    DuplicateConstituencyInUpload,
}

/// One recorded line failure: 1-based line number, category, and a
/// human-readable message for operator triage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineError {
    pub line_number: i64,
    pub kind: IngestErrorKind,
    pub message: String,
}

impl LineError {
    pub fn new(line_number: i64, kind: IngestErrorKind, message: impl Into<String>) -> Self {
        Self {
            line_number,
            kind,
            message: message.into(),
        }
    }
}
