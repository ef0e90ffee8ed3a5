//! `Sec-WebSocket-Key` / `Sec-WebSocket-Accept` computation.

use super::WebSocketError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha1::{Digest, Sha1};

pub const WEB_SOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
pub const WEB_SOCKET_VERSION: &str = "13";

/// A fresh random key for a client handshake.
pub(crate) fn new_key() -> String {
    STANDARD.encode(rand::random::<[u8; 16]>())
}

/// Check that a key from a client decodes to 16 bytes.
pub(crate) fn validate_key(key: &str) -> Result<(), WebSocketError> {
    match STANDARD.decode(key.trim()) {
        Ok(bytes) if bytes.len() == 16 => Ok(()),
        _ => Err(WebSocketError::InvalidKey),
    }
}

/// The `Sec-WebSocket-Accept` value answering `key`.
pub(crate) fn accept_key(key: &str) -> String {
    let mut sha = Sha1::new();
    sha.update(key.trim().as_bytes());
    sha.update(WEB_SOCKET_GUID.as_bytes());
    STANDARD.encode(sha.finalize())
}
