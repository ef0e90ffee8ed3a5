use super::{
    mask, BorrowedFrame, CloseCode, ControlFrame, Frame, FrameHeader, Op, WebSocketError,
    WebSocketOptions, MAX_CONTROL_FRAME_PAYLOAD,
};
use crate::{
    error::{Error, Result},
    http::HttpConn,
    net::BufStream,
};
use async_std::future::timeout;
use futures::{
    io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf},
    stream::{self, Stream},
};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

type ReadStream = BufStream<ReadHalf<HttpConn>>;
type WriteStream = WriteHalf<HttpConn>;

const READ_CLOSED: u8 = 0b01;
const WRITE_CLOSED: u8 = 0b10;
const BOTH_CLOSED: u8 = READ_CLOSED | WRITE_CLOSED;

/// Settings and close state shared by the two halves of a connection.
struct Shared {
    max_message_length: u64,
    close_timeout: Duration,
    is_client: bool,
    close_state: AtomicU8,
}

impl Shared {
    fn can_read(&self) -> bool {
        self.close_state.load(Ordering::Acquire) & READ_CLOSED == 0
    }

    fn can_write(&self) -> bool {
        self.close_state.load(Ordering::Acquire) & WRITE_CLOSED == 0
    }

    fn is_closed(&self) -> bool {
        self.close_state.load(Ordering::Acquire) == BOTH_CLOSED
    }

    /// Mark one direction closed. Returns true if this closed the last open direction.
    fn shutdown(&self, how: u8) -> bool {
        let prev = self.close_state.fetch_or(how, Ordering::AcqRel);
        prev & how == 0 && prev | how == BOTH_CLOSED
    }
}

/// Read until the peer closes the connection, bounded by the close timeout.
async fn drain(stream: &mut ReadStream, close_timeout: Duration) {
    let result = timeout(close_timeout, async {
        loop {
            stream.discard();
            if stream.fill().await? == 0 {
                return Ok::<_, std::io::Error>(());
            }
        }
    })
    .await;

    match result {
        Ok(Ok(())) => tracing::debug!("== Closed"),
        Ok(Err(err)) => tracing::debug!("== Close was not clean: {err}"),
        Err(_) => tracing::debug!("== Close timed out"),
    }
}

/// An open WebSocket connection.
pub struct WebSocket {
    reader: ReadStream,
    writer: WriteStream,

    expect_continuation: bool,
    current_message: Option<(Op, Vec<u8>)>,
    last_sent_op: Option<Op>,

    shared: Shared,
}

impl std::fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocket").finish_non_exhaustive()
    }
}

impl WebSocket {
    /// Wrap a connection which has completed the opening handshake.
    ///
    /// Data already buffered in `stream` is treated as the start of the frame stream.
    pub(crate) fn from_stream(
        stream: BufStream<HttpConn>,
        options: &WebSocketOptions,
        is_client: bool,
    ) -> Self {
        let (conn, buffered) = stream.into_parts();
        let (reader, writer) = conn.split();

        Self {
            reader: BufStream::from_parts(reader, &buffered),
            writer,
            expect_continuation: false,
            current_message: None,
            last_sent_op: None,
            shared: Shared {
                max_message_length: options.max_message_length,
                close_timeout: options.close_timeout,
                is_client,
                close_state: AtomicU8::new(0),
            },
        }
    }

    pub fn set_max_message_length(&mut self, max: u64) -> &mut Self {
        self.shared.max_message_length = max;
        self
    }

    pub fn set_close_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.shared.close_timeout = timeout;
        self
    }

    pub fn can_read(&self) -> bool {
        self.shared.can_read()
    }

    pub fn can_write(&self) -> bool {
        self.shared.can_write()
    }

    pub fn reader(&mut self) -> WsReader<'_> {
        self.split().0
    }

    pub fn writer(&mut self) -> WsWriter<'_> {
        self.split().1
    }

    /// Borrow the read and write halves separately, so that frames can be sent while waiting to
    /// receive. The halves share the close state.
    pub fn split(&mut self) -> (WsReader<'_>, WsWriter<'_>) {
        (
            WsReader {
                stream: &mut self.reader,
                expect_continuation: &mut self.expect_continuation,
                current_message: &mut self.current_message,
                shared: &self.shared,
            },
            WsWriter {
                stream: &mut self.writer,
                last_sent_op: &mut self.last_sent_op,
                shared: &self.shared,
            },
        )
    }

    /// Receive the next complete message or control frame.
    pub async fn recv(&mut self) -> Result<Frame> {
        self.reader().recv().await
    }

    pub fn frames(&mut self) -> impl Stream<Item = Result<Frame>> + '_ {
        self.reader().frames()
    }

    /// Send a frame.
    ///
    /// If this is a close frame answering one from the peer, the connection is then drained
    /// until the peer closes it.
    pub async fn send_frame<'b>(&mut self, frame: impl Into<BorrowedFrame<'b>>) -> Result<()> {
        let frame = frame.into();
        self.writer().send_frame(frame).await?;

        if frame.op == Op::Close && self.shared.is_closed() {
            drain(&mut self.reader, self.shared.close_timeout).await;
        }
        Ok(())
    }
}

/// The receiving half of a [`WebSocket`].
pub struct WsReader<'a> {
    stream: &'a mut ReadStream,
    expect_continuation: &'a mut bool,
    current_message: &'a mut Option<(Op, Vec<u8>)>,
    shared: &'a Shared,
}

impl<'a> WsReader<'a> {
    pub fn can_read(&self) -> bool {
        self.shared.can_read()
    }

    /// Read and validate the next frame header, or [`None`] at the end of the stream.
    pub async fn read_frame_header(&mut self) -> Result<Option<FrameHeader>> {
        if !self.shared.can_read() {
            return Err(Error::Shutdown);
        }

        let Some(header) = FrameHeader::read(self.stream).await? else {
            self.shared.shutdown(READ_CLOSED);
            return Ok(None);
        };

        if header.op.is_control() {
            if !header.fin {
                return Err(WebSocketError::InvalidControlFrame {
                    reason: "fin not set on control frame",
                }
                .into());
            }
            if header.len > MAX_CONTROL_FRAME_PAYLOAD as u64 {
                return Err(WebSocketError::InvalidControlFrame {
                    reason: "control frame too long",
                }
                .into());
            }
        } else {
            let continuation = header.op == Op::Continuation;
            if *self.expect_continuation && !continuation {
                return Err(WebSocketError::ExpectedContinuation.into());
            }
            if !*self.expect_continuation && continuation {
                return Err(WebSocketError::UnexpectedContinuation.into());
            }
            *self.expect_continuation = !header.fin;
        }

        if header.mask.is_some() && self.shared.is_client {
            return Err(WebSocketError::ServerMasked.into());
        }

        tracing::trace!(
            ">> {:?} frame, {} bytes{}",
            header.op,
            header.len,
            if header.fin { "" } else { " (partial)" }
        );

        if header.op == Op::Close {
            self.shared.shutdown(READ_CLOSED);
        }

        Ok(Some(header))
    }

    /// Read payload data of the frame `header` into `buf`, without unmasking it.
    ///
    /// Returns the number of bytes read, which is limited by the unread payload of the frame.
    pub async fn read_frame_data(
        &mut self,
        header: &mut FrameHeader,
        buf: &mut [u8],
    ) -> Result<usize> {
        let len = usize::try_from(header.len)
            .unwrap_or(usize::MAX)
            .min(buf.len());
        let read = self.stream.read_fully(&mut buf[..len]).await?;
        if read < len {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }

        header.len -= read as u64;
        Ok(read)
    }

    /// Skip the unread payload of the frame `header`.
    pub async fn discard_frame_data(&mut self, header: &mut FrameHeader) -> Result<()> {
        loop {
            let available = self.stream.buffer().len() as u64;
            if header.len <= available {
                self.stream.consume(header.len as usize);
                header.len = 0;
                return Ok(());
            }

            header.len -= available;
            self.stream.discard();
            if self.stream.fill().await? == 0 {
                return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
            }
        }
    }

    /// Read one frame, returning a [`Frame`] once a control frame or a whole message is read.
    async fn read_frame(&mut self) -> Result<Option<Frame>> {
        let Some(mut header) = self.read_frame_header().await? else {
            let code = CloseCode::NoClose.into();
            return Ok(Some(Frame::Close(code, ControlFrame::new())));
        };

        if header.len > self.shared.max_message_length {
            return Err(WebSocketError::MessageTooLong.into());
        }

        if header.op.is_control() {
            let mut control = ControlFrame::new();
            let len = header.len as usize;
            let mut data = [0; MAX_CONTROL_FRAME_PAYLOAD];
            self.read_frame_data(&mut header, &mut data[..len]).await?;
            if let Some(key) = header.mask {
                mask(&mut data[..len], key);
            }
            control.buffer_mut(len).copy_from_slice(&data[..len]);

            return Ok(Some(match header.op {
                Op::Ping => Frame::Ping(control),
                Op::Pong => Frame::Pong(control),
                _ => {
                    let code = match control.data() {
                        [high, low, ..] => {
                            let code = u16::from_be_bytes([*high, *low]);
                            control.advance(2);
                            code
                        }
                        [] => CloseCode::NoStatusCode.into(),
                        [_] => {
                            return Err(WebSocketError::InvalidControlFrame {
                                reason: "close payload of one byte",
                            }
                            .into())
                        }
                    };
                    tracing::debug!(">> Close {code}");

                    if self.shared.is_closed() {
                        drain(self.stream, self.shared.close_timeout).await;
                    }
                    Frame::Close(code, control)
                }
            }));
        }

        let max = self.shared.max_message_length;
        let (op, buf) = self
            .current_message
            .get_or_insert_with(|| (header.op, Vec::new()));
        let end = (buf.len() as u64)
            .checked_add(header.len)
            .filter(|end| *end <= max)
            .ok_or(WebSocketError::MessageTooLong)?;
        let op = *op;

        let start = buf.len();
        buf.resize(end as usize, 0);
        let len = self
            .stream
            .read_fully(&mut buf[start..])
            .await?;
        if len < buf.len() - start {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        if let Some(key) = header.mask {
            mask(&mut buf[start..], key);
        }

        if !header.fin {
            return Ok(None);
        }

        let buf = self.current_message.take().map(|(_, buf)| buf).unwrap_or_default();
        Ok(Some(match op {
            Op::Text => Frame::Text(String::from_utf8(buf)?),
            _ => Frame::Binary(buf),
        }))
    }

    /// Receive the next complete message or control frame.
    ///
    /// The end of the stream is reported as a close frame with [`CloseCode::NoClose`].
    pub async fn recv(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.read_frame().await? {
                return Ok(frame);
            }
        }
    }

    /// A stream of received frames, ending when the read side is closed or after an error.
    pub fn frames(self) -> impl Stream<Item = Result<Frame>> + 'a {
        stream::unfold(Some(self), |reader| async move {
            let mut reader = reader?;
            if !reader.can_read() {
                return None;
            }

            match reader.recv().await {
                Ok(frame) => Some((Ok(frame), Some(reader))),
                Err(err) => Some((Err(err), None)),
            }
        })
    }
}

/// The sending half of a [`WebSocket`].
pub struct WsWriter<'a> {
    stream: &'a mut WriteStream,
    last_sent_op: &'a mut Option<Op>,
    shared: &'a Shared,
}

impl WsWriter<'_> {
    pub fn can_write(&self) -> bool {
        self.shared.can_write()
    }

    /// Send a frame.
    ///
    /// Frames from a client are masked with a random key. Sending a close frame shuts down the
    /// write side of the connection.
    pub async fn send_frame<'b>(&mut self, frame: impl Into<BorrowedFrame<'b>>) -> Result<()> {
        if !self.shared.can_write() {
            return Err(Error::Shutdown);
        }

        let frame = frame.into();
        let mut header = FrameHeader {
            fin: frame.fin,
            op: frame.op,
            mask: self.shared.is_client.then(rand::random::<u32>),
            len: frame.payload.len() as u64,
        };

        if header.op.is_control() {
            let limit = match header.op {
                Op::Close => MAX_CONTROL_FRAME_PAYLOAD - 2,
                _ => MAX_CONTROL_FRAME_PAYLOAD,
            };
            if frame.payload.len() > limit {
                return Err(WebSocketError::UserInvalidControlFrame.into());
            }
            if header.op == Op::Close {
                header.len += 2;
            }
        } else {
            match *self.last_sent_op {
                Some(op) if op != header.op => return Err(WebSocketError::DataTypeMismatch.into()),
                Some(_) => header.op = Op::Continuation,
                None => *self.last_sent_op = Some(header.op),
            }
            if header.fin {
                *self.last_sent_op = None;
            }
        }

        let mut bytes = Vec::with_capacity(14 + header.len as usize);
        header.encode(&mut bytes);
        let start = bytes.len();
        if header.op == Op::Close {
            bytes.extend_from_slice(&frame.close_code.to_be_bytes());
        }
        bytes.extend_from_slice(frame.payload);
        if let Some(key) = header.mask {
            mask(&mut bytes[start..], key);
        }

        tracing::trace!(
            "<< {:?} frame, {} bytes{}",
            header.op,
            header.len,
            if header.fin { "" } else { " (partial)" }
        );

        if header.op != Op::Close {
            self.stream.write_all(&bytes).await?;
            self.stream.flush().await?;
            return Ok(());
        }

        tracing::debug!("<< Close {}", frame.close_code);
        self.shared.shutdown(WRITE_CLOSED);

        let stream = &mut *self.stream;
        let result = timeout(self.shared.close_timeout, async {
            stream.write_all(&bytes).await?;
            stream.close().await
        })
        .await;
        match result {
            Ok(res) => res?,
            Err(_) => tracing::debug!("== Close timed out"),
        }
        Ok(())
    }
}
