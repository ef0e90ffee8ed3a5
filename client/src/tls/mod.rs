//! TLS client sessions.

pub mod certs;
mod conn;

pub use conn::{ConnectStats, TlsConn};
