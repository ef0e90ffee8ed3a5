//! Reading `file://` URLs, optionally restricted to a byte range.

mod request;
mod stream;

pub use request::{get, FileRequest};
pub use stream::FileStream;
