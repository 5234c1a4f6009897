//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&DbPool` as the first argument.

pub mod constituency_repo;
pub mod result_version_repo;
pub mod upload_repo;

pub use constituency_repo::ConstituencyRepo;
pub use result_version_repo::{LedgerError, ResultVersionRepo};
pub use upload_repo::{SoftDeleteError, UploadRepo};
