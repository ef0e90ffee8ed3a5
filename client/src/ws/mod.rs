//! WebSocket client and server (RFC 6455).
//!
//! A client connection starts with [`open`], which performs the HTTP upgrade handshake and yields
//! a [`WebSocket`]. A server binds a [`WebSocketServer`] and accepts upgrades from incoming
//! connections. Either way, messages are sent with [`WebSocket::send_frame`] and received with
//! [`WebSocket::recv`] or the [`WebSocket::frames`] stream.
//!
//! Closing is tracked per direction. Sending a close frame shuts down the write side, receiving
//! one (or the end of the stream) shuts down the read side, and once both are shut the remaining
//! data from the peer is drained until it closes the connection or the close timeout expires.

mod error;
mod frame;
mod handshake;
mod request;
mod server;
mod socket;

pub use error::WebSocketError;
pub use frame::FrameHeader;
pub use handshake::{WEB_SOCKET_GUID, WEB_SOCKET_VERSION};
pub use request::{open, WebSocketOptions, WsRequest, DEFAULT_MAX_MESSAGE_LENGTH};
pub use server::{WebSocketHandle, WebSocketServer};
pub use socket::{WebSocket, WsReader, WsWriter};

use std::fmt;
use strum::FromRepr;

/// Maximum payload of a control frame.
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

#[derive(Clone, Copy, Debug, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum Op {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xa,
}

impl Op {
    pub fn is_control(self) -> bool {
        self as u8 & 0x8 != 0
    }
}

/// Status codes carried by close frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromRepr)]
#[repr(u16)]
pub enum CloseCode {
    Normal = 1000,
    GoingAway = 1001,
    ProtocolError = 1002,
    UnsupportedDataKind = 1003,
    Reserved = 1004,
    /// The close frame had no status code. Never sent on the wire.
    NoStatusCode = 1005,
    /// The connection ended without a close frame. Never sent on the wire.
    NoClose = 1006,
    InvalidMessageData = 1007,
    PolicyViolation = 1008,
    MessageTooLong = 1009,
    ExtensionsExpected = 1010,
    InternalServerError = 1011,
    TlsHandshakeFailure = 1015,
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code as u16
    }
}

/// XOR `data` with a masking key, starting at the first byte of the key.
pub fn mask(data: &mut [u8], key: u32) {
    let key = key.to_be_bytes();
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i & 3];
    }
}

/// The payload of a control frame, stored inline.
#[derive(Clone, Copy)]
pub struct ControlFrame {
    data: [u8; MAX_CONTROL_FRAME_PAYLOAD],
    offset: u8,
    length: u8,
}

impl ControlFrame {
    pub fn new() -> Self {
        Self {
            data: [0; MAX_CONTROL_FRAME_PAYLOAD],
            offset: 0,
            length: 0,
        }
    }

    /// Copy `data` into a control frame, or [`None`] if it is too long.
    pub fn from_slice(data: &[u8]) -> Option<Self> {
        let mut frame = Self::new();
        frame.data.get_mut(..data.len())?.copy_from_slice(data);
        frame.length = data.len() as u8;
        Some(frame)
    }

    pub fn data(&self) -> &[u8] {
        &self.data[self.offset as usize..self.length as usize]
    }

    pub fn len(&self) -> usize {
        self.data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data().is_empty()
    }

    /// The whole payload buffer, used while reading a frame of `length` bytes.
    pub(crate) fn buffer_mut(&mut self, length: usize) -> &mut [u8] {
        self.offset = 0;
        self.length = length.min(MAX_CONTROL_FRAME_PAYLOAD) as u8;
        &mut self.data[..self.length as usize]
    }

    /// Skip the first `count` bytes of the payload.
    pub(crate) fn advance(&mut self, count: usize) {
        self.offset = (self.offset as usize + count).min(self.length as usize) as u8;
    }
}

impl Default for ControlFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ControlFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ControlFrame").field(&self.data()).finish()
    }
}

impl AsRef<[u8]> for ControlFrame {
    fn as_ref(&self) -> &[u8] {
        self.data()
    }
}

/// A complete message or control frame received from the peer.
#[derive(Debug)]
pub enum Frame {
    Ping(ControlFrame),
    Pong(ControlFrame),
    /// A close status code and reason.
    Close(u16, ControlFrame),
    Text(String),
    Binary(Vec<u8>),
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ping(frame) => write!(f, "ping ({} bytes)", frame.len()),
            Self::Pong(frame) => write!(f, "pong ({} bytes)", frame.len()),
            Self::Close(code, frame) => {
                write!(f, "close {code}")?;
                if !frame.is_empty() {
                    write!(f, ": {}", String::from_utf8_lossy(frame.data()))?;
                }
                Ok(())
            }
            Self::Text(text) => write!(f, "{text}"),
            Self::Binary(data) => write!(f, "binary ({} bytes)", data.len()),
        }
    }
}

/// A frame to send, borrowing its payload.
#[derive(Clone, Copy, Debug)]
pub struct BorrowedFrame<'a> {
    pub(crate) op: Op,
    pub(crate) close_code: u16,
    pub(crate) payload: &'a [u8],
    pub(crate) fin: bool,
}

impl<'a> BorrowedFrame<'a> {
    fn new(op: Op, payload: &'a [u8], fin: bool) -> Self {
        Self {
            op,
            close_code: 0,
            payload,
            fin,
        }
    }

    pub fn text(text: &'a str) -> Self {
        Self::new(Op::Text, text.as_bytes(), true)
    }

    pub fn binary(data: &'a [u8]) -> Self {
        Self::new(Op::Binary, data, true)
    }

    /// Part of a text message; `fin` marks the last part.
    pub fn text_partial(text: &'a str, fin: bool) -> Self {
        Self::new(Op::Text, text.as_bytes(), fin)
    }

    /// Part of a binary message; `fin` marks the last part.
    pub fn binary_partial(data: &'a [u8], fin: bool) -> Self {
        Self::new(Op::Binary, data, fin)
    }

    pub fn ping(data: &'a [u8]) -> Self {
        Self::new(Op::Ping, data, true)
    }

    pub fn pong(data: &'a [u8]) -> Self {
        Self::new(Op::Pong, data, true)
    }

    pub fn close(code: impl Into<u16>, reason: &'a [u8]) -> Self {
        Self {
            close_code: code.into(),
            ..Self::new(Op::Close, reason, true)
        }
    }

    pub fn op(&self) -> Op {
        self.op
    }

    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}

impl<'a> From<&'a Frame> for BorrowedFrame<'a> {
    fn from(frame: &'a Frame) -> Self {
        match frame {
            Frame::Ping(data) => Self::ping(data.data()),
            Frame::Pong(data) => Self::pong(data.data()),
            Frame::Close(code, reason) => Self::close(*code, reason.data()),
            Frame::Text(text) => Self::text(text),
            Frame::Binary(data) => Self::binary(data),
        }
    }
}

impl<'a> From<&'a str> for BorrowedFrame<'a> {
    fn from(text: &'a str) -> Self {
        Self::text(text)
    }
}

impl<'a> From<&'a [u8]> for BorrowedFrame<'a> {
    fn from(data: &'a [u8]) -> Self {
        Self::binary(data)
    }
}

#[cfg(test)]
mod test;
