//! A buffered stream whose read buffer can be inspected and refilled in place.
//!
//! Protocol parsers need to look ahead (for a line ending, a chunk size, a frame header) without
//! copying, and to keep unconsumed bytes while reading more. [`futures::io::BufReader`] only
//! refills an empty buffer, so we keep our own.

use futures::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite},
    task::{Context, Poll},
};
use std::io;
use std::pin::Pin;

pub const DEFAULT_CAPACITY: usize = 16 * 1024;

#[derive(Debug)]
pub struct BufStream<S> {
    inner: S,
    buf: Box<[u8]>,
    pos: usize,
    end: usize,
}

impl<S> BufStream<S> {
    pub fn new(inner: S) -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, inner)
    }

    pub fn with_capacity(capacity: usize, inner: S) -> Self {
        Self {
            inner,
            buf: vec![0; capacity].into_boxed_slice(),
            pos: 0,
            end: 0,
        }
    }

    /// Wrap `inner`, treating `buffered` as data which has already been read from it.
    pub fn from_parts(inner: S, buffered: &[u8]) -> Self {
        let mut this = Self::with_capacity(DEFAULT_CAPACITY.max(buffered.len()), inner);
        this.buf[..buffered.len()].copy_from_slice(buffered);
        this.end = buffered.len();
        this
    }

    /// Split into the underlying stream and the data read from it but not yet consumed.
    pub fn into_parts(self) -> (S, Vec<u8>) {
        let buffered = self.buffer().to_vec();
        (self.inner, buffered)
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Data read from the stream but not yet consumed.
    pub fn buffer(&self) -> &[u8] {
        &self.buf[self.pos..self.end]
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Mark `amt` bytes at the front of the buffer as consumed.
    pub fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.end);
        if self.pos == self.end {
            self.discard();
        }
    }

    /// Drop all buffered data.
    pub fn discard(&mut self) {
        self.pos = 0;
        self.end = 0;
    }
}

impl<S: AsyncRead + Unpin> BufStream<S> {
    /// Read more data from the stream, appending it to the buffered data.
    ///
    /// Unconsumed data is kept. Returns the number of bytes read, which is 0 at the end of the
    /// stream or when the buffer is full.
    pub async fn fill(&mut self) -> io::Result<usize> {
        if self.pos > 0 {
            self.buf.copy_within(self.pos..self.end, 0);
            self.end -= self.pos;
            self.pos = 0;
        }
        if self.end == self.buf.len() {
            return Ok(0);
        }

        let read = self.inner.read(&mut self.buf[self.end..]).await?;
        self.end += read;
        Ok(read)
    }

    /// Read into `buf`, serving buffered data first.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pos == self.end {
            // Large reads bypass the buffer.
            if buf.len() >= self.buf.len() {
                return self.inner.read(buf).await;
            }
            if self.fill().await? == 0 {
                return Ok(0);
            }
        }

        let available = self.buffer();
        let len = available.len().min(buf.len());
        buf[..len].copy_from_slice(&available[..len]);
        self.consume(len);
        Ok(len)
    }

    /// Fill `buf` completely.
    ///
    /// Returns the number of bytes read, which is less than `buf.len()` only if the stream
    /// ended.
    pub async fn read_fully(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut offset = 0;
        while offset < buf.len() {
            let read = self.read(&mut buf[offset..]).await?;
            if read == 0 {
                break;
            }
            offset += read;
        }
        Ok(offset)
    }

    /// Read exactly `N` bytes.
    ///
    /// Returns [`None`] if the stream ended before any byte was read; ending part way through
    /// is an [`UnexpectedEof`](io::ErrorKind::UnexpectedEof) error.
    pub async fn try_read_array<const N: usize>(&mut self) -> io::Result<Option<[u8; N]>> {
        let mut bytes = [0u8; N];
        match self.read_fully(&mut bytes).await? {
            0 if N > 0 => Ok(None),
            read if read == N => Ok(Some(bytes)),
            _ => Err(io::ErrorKind::UnexpectedEof.into()),
        }
    }

    /// Read exactly `N` bytes; the end of the stream is an error.
    pub async fn read_array<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        self.try_read_array()
            .await?
            .ok_or_else(|| io::ErrorKind::UnexpectedEof.into())
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for BufStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        if self.pos == self.end {
            return Pin::new(&mut self.inner).poll_read(cx, buf);
        }

        let available = self.buffer();
        let len = available.len().min(buf.len());
        buf[..len].copy_from_slice(&available[..len]);
        self.consume(len);
        Poll::Ready(Ok(len))
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for BufStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_close(cx)
    }
}
