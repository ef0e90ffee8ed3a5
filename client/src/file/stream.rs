use crate::error::Result;
use async_std::fs::File;
use futures::{
    io::{AsyncRead, AsyncReadExt, AsyncSeekExt},
    task::{Context, Poll},
};
use std::io::{self, SeekFrom};
use std::path::Path;
use std::pin::Pin;

/// Most bytes [`FileStream::bytes`] reserves before it starts reading.
const MAX_INITIAL_CAPACITY: usize = 1 << 24;

fn initial_capacity(remaining: u64) -> usize {
    usize::try_from(remaining)
        .unwrap_or(usize::MAX)
        .min(MAX_INITIAL_CAPACITY)
}

/// A byte range of an open file.
///
/// Positions are relative to the start of the range, and reads stop at its end.
#[derive(Debug)]
pub struct FileStream {
    file: File,
    start: u64,
    end: u64,
    /// Absolute position in the file.
    pos: u64,
}

impl FileStream {
    /// Open `path` for reading `start..end`.
    ///
    /// The range defaults to the whole file and is clamped to the file's length. A range which
    /// ends before it starts is empty.
    pub(crate) async fn open(path: &Path, start: Option<u64>, end: Option<u64>) -> Result<Self> {
        let mut file = File::open(path.as_os_str()).await?;
        let size = file.metadata().await?.len();

        let start = start.unwrap_or(0);
        let end = end.unwrap_or(size).min(size).max(start);

        file.seek(SeekFrom::Start(start)).await?;
        Ok(Self {
            file,
            start,
            end,
            pos: start,
        })
    }

    /// The length of the range.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The read position within the range.
    pub fn position(&self) -> u64 {
        self.pos - self.start
    }

    fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.pos)
    }

    /// Read into `buf`, returning 0 at the end of the range.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(AsyncReadExt::read(self, buf).await?)
    }

    /// Move the read position, relative to the range. Returns the new position.
    pub async fn seek(&mut self, seek: SeekFrom) -> Result<u64> {
        let target = match seek {
            SeekFrom::Start(offset) => self.start.checked_add(offset),
            SeekFrom::Current(offset) => self.pos.checked_add_signed(offset),
            SeekFrom::End(offset) => self.end.checked_add_signed(offset),
        }
        .filter(|target| *target >= self.start)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start of range"))?;

        self.pos = self.file.seek(SeekFrom::Start(target)).await?;
        Ok(self.position())
    }

    /// Read the rest of the range.
    pub async fn bytes(&mut self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(initial_capacity(self.remaining()));
        self.read_to_end(&mut bytes).await?;
        Ok(bytes)
    }
}

impl AsyncRead for FileStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        let len = usize::try_from(self.remaining())
            .unwrap_or(usize::MAX)
            .min(buf.len());
        if len == 0 {
            return Poll::Ready(Ok(0));
        }

        let read = futures::ready!(Pin::new(&mut self.file).poll_read(cx, &mut buf[..len]))?;
        self.pos += read as u64;
        Poll::Ready(Ok(read))
    }
}
