use http::StatusCode;
use snafu::Snafu;

/// Protocol errors from a WebSocket peer, or misuse of a WebSocket by the caller.
#[derive(Debug, Snafu)]
pub enum WebSocketError {
    #[snafu(display("server rejected the WebSocket upgrade with status {status}"))]
    ServerRejected { status: StatusCode },

    #[snafu(display("invalid '{name}' header in the server handshake"))]
    InvalidHandshake { name: &'static str },

    #[snafu(display("invalid client upgrade request: {reason}"))]
    InvalidClientRequest { reason: &'static str },

    #[snafu(display("WebSocket handshake timed out"))]
    HandshakeTimeout,

    #[snafu(display("invalid Sec-WebSocket-Key"))]
    InvalidKey,

    #[snafu(display("invalid opcode {op:#x}"))]
    InvalidOpcode { op: u8 },

    /// No extension is negotiated, so the RSV bits must be clear.
    #[snafu(display("reserved bits set in frame header: {bits:#x}"))]
    ReservedBits { bits: u8 },

    #[snafu(display("invalid payload length: most significant bit is set"))]
    InvalidLength,

    #[snafu(display("invalid control frame: {reason}"))]
    InvalidControlFrame { reason: &'static str },

    #[snafu(display("expected a continuation frame"))]
    ExpectedContinuation,

    #[snafu(display("unexpected continuation frame"))]
    UnexpectedContinuation,

    #[snafu(display("server sent a masked frame"))]
    ServerMasked,

    #[snafu(display("message too long"))]
    MessageTooLong,

    /// A control frame sent by the caller was too long.
    #[snafu(display("control frame payload too long"))]
    UserInvalidControlFrame,

    /// A partial message was continued with a frame of a different type.
    #[snafu(display("data type of continuation frame does not match the message"))]
    DataTypeMismatch,
}
