//! Frame headers on the wire.
//!
//! ```text
//!  0               1               2
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |            (16/64)            |
//! |N|V|V|V|       |S|             |                               |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |                        Masking key (32)                       |
//! +---------------------------------------------------------------+
//! ```

use super::{Op, WebSocketError};
use crate::{error::Result, net::BufStream};
use futures::io::AsyncRead;

const FIN: u8 = 0x80;
const MASKED: u8 = 0x80;
const RSV_MASK: u8 = 0x70;
const OP_MASK: u8 = 0x0f;
const LEN_MASK: u8 = 0x7f;
const LEN_16: u8 = 126;
const LEN_64: u8 = 127;

/// The header of a single frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub(crate) fin: bool,
    pub(crate) op: Op,
    pub(crate) mask: Option<u32>,
    /// Payload bytes not yet read.
    pub(crate) len: u64,
}

impl FrameHeader {
    pub fn fin(&self) -> bool {
        self.fin
    }

    pub fn op(&self) -> Op {
        self.op
    }

    pub fn mask(&self) -> Option<u32> {
        self.mask
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read a header, or [`None`] if the stream ended cleanly before it.
    pub(crate) async fn read<S: AsyncRead + Unpin>(
        reader: &mut BufStream<S>,
    ) -> Result<Option<Self>> {
        let Some([first, second]) = reader.try_read_array::<2>().await? else {
            return Ok(None);
        };

        let bits = first & RSV_MASK;
        if bits != 0 {
            return Err(WebSocketError::ReservedBits { bits }.into());
        }
        let op = first & OP_MASK;
        let op = Op::from_repr(op).ok_or(WebSocketError::InvalidOpcode { op })?;
        let len = match second & LEN_MASK {
            LEN_16 => u16::from_be_bytes(reader.read_array().await?) as u64,
            LEN_64 => {
                let len = u64::from_be_bytes(reader.read_array().await?);
                if len >> 63 != 0 {
                    return Err(WebSocketError::InvalidLength.into());
                }
                len
            }
            len => len as u64,
        };
        let mask = if second & MASKED != 0 {
            Some(u32::from_be_bytes(reader.read_array().await?))
        } else {
            None
        };

        Ok(Some(Self {
            fin: first & FIN != 0,
            op,
            mask,
            len,
        }))
    }

    /// Append the encoded header to `out`.
    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        let fin = if self.fin { FIN } else { 0 };
        out.push(fin | self.op as u8);

        let masked = if self.mask.is_some() { MASKED } else { 0 };
        if self.len < LEN_16 as u64 {
            out.push(masked | self.len as u8);
        } else if let Ok(len) = u16::try_from(self.len) {
            out.push(masked | LEN_16);
            out.extend_from_slice(&len.to_be_bytes());
        } else {
            out.push(masked | LEN_64);
            out.extend_from_slice(&self.len.to_be_bytes());
        }

        if let Some(mask) = self.mask {
            out.extend_from_slice(&mask.to_be_bytes());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Error;
    use futures::io::Cursor;

    fn encode(header: FrameHeader) -> Vec<u8> {
        let mut out = vec![];
        header.encode(&mut out);
        out
    }

    #[test]
    fn test_encode() {
        let header = FrameHeader {
            fin: true,
            op: Op::Text,
            mask: None,
            len: 5,
        };
        assert_eq!(encode(header), [0x81, 0x05]);

        let header = FrameHeader {
            mask: Some(0x37fa213d),
            ..header
        };
        assert_eq!(encode(header), [0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d]);

        let header = FrameHeader {
            fin: false,
            op: Op::Binary,
            mask: None,
            len: 256,
        };
        assert_eq!(encode(header), [0x02, 0x7e, 0x01, 0x00]);

        let header = FrameHeader {
            len: 65536,
            ..header
        };
        assert_eq!(
            encode(header),
            [0x02, 0x7f, 0, 0, 0, 0, 0, 0x01, 0x00, 0x00]
        );
    }

    #[async_std::test]
    async fn test_read() {
        let bytes = [
            0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, // masked "Hello"
            0x7f, 0x9f, 0x4d, 0x51, 0x58, //
            0x89, 0x7e, 0x01, 0x00, // ping with a 16-bit length
        ];
        let mut reader = BufStream::new(Cursor::new(bytes.to_vec()));

        let header = FrameHeader::read(&mut reader).await.unwrap().unwrap();
        assert!(header.fin());
        assert_eq!(header.op(), Op::Text);
        assert_eq!(header.mask(), Some(0x37fa213d));
        assert_eq!(header.len(), 5);
        reader.consume(5);

        let header = FrameHeader::read(&mut reader).await.unwrap().unwrap();
        assert_eq!(header.op(), Op::Ping);
        assert_eq!(header.mask(), None);
        assert_eq!(header.len(), 256);

        assert_eq!(FrameHeader::read(&mut reader).await.unwrap(), None);
    }

    #[async_std::test]
    async fn test_read_invalid() {
        let mut reader = BufStream::new(Cursor::new(vec![0x83, 0x00]));
        let err = FrameHeader::read(&mut reader).await.unwrap_err();
        assert!(
            matches!(
                err,
                Error::WebSocket {
                    source: WebSocketError::InvalidOpcode { op: 3 }
                }
            ),
            "{err}"
        );

        let mut reader = BufStream::new(Cursor::new(vec![0xc1, 0x00]));
        let err = FrameHeader::read(&mut reader).await.unwrap_err();
        assert!(
            matches!(
                err,
                Error::WebSocket {
                    source: WebSocketError::ReservedBits { bits: 0x40 }
                }
            ),
            "{err}"
        );

        let mut reader = BufStream::new(Cursor::new(vec![0x82, 0x7f, 0x80, 0, 0, 0, 0, 0, 0, 1]));
        let err = FrameHeader::read(&mut reader).await.unwrap_err();
        assert!(
            matches!(
                err,
                Error::WebSocket {
                    source: WebSocketError::InvalidLength
                }
            ),
            "{err}"
        );

        // Truncated extended length.
        let mut reader = BufStream::new(Cursor::new(vec![0x82, 0x7f, 0x00]));
        let err = FrameHeader::read(&mut reader).await.unwrap_err();
        assert!(err.is_eof(), "{err}");
    }
}
