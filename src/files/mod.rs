//! File gateway: safe filesystem actions for untrusted virtual paths.
//! Every path is confined to one sandbox root; content can be streamed whole,
//! by byte range, or as a bounded preview.

pub mod paths;
pub mod host_path;
pub mod range;
pub mod content;
pub mod ops;

pub use content::{mime_for, Disposition, ServedFile, PREVIEW_TEXT_LIMIT};
pub use host_path::{Resolved, Sandbox};
pub use ops::{FileGateway, UploadPolicy};
pub use paths::{normalize_nfc, validate_name};
pub use range::{parse_range, ByteRange};
