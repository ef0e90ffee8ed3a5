//! Asynchronous URL transfers: DNS resolution, TCP and TLS connections, HTTP/1.x, WebSockets and
//! local files.
//!
//! Each protocol lives in its own module with a small entry point taking a URL:
//! [`http::get`], [`ws::open`] and [`file::get`]. Requests are configured with chained setters and
//! executed with `run().await`.
//!
//! ```ignore
//! let mut res = client::http::get("https://example.com").run().await?;
//! println!("{} {}", res.status(), res.text().await?);
//! ```

pub mod dns;
pub mod env;
pub mod error;
pub mod file;
pub mod http;
pub mod net;
pub mod tls;
pub mod ws;

mod request;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{Error, Result};

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber which logs to stderr, filtered by `RUST_LOG`.
///
/// Calling this more than once is harmless; only the first call installs a subscriber.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
