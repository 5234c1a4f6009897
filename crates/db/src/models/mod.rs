pub mod constituency;
pub mod result_version;
pub mod upload;

pub use constituency::{Constituency, ConstituencyCurrentRow, CreateConstituency};
pub use result_version::ResultVersion;
pub use upload::{Upload, UploadStats, UploadStatus};
