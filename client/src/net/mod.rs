//! TCP connections and the buffered streams protocols read from.

mod buf;
mod conn;

pub use buf::{BufStream, DEFAULT_CAPACITY};
pub use conn::{Conn, ConnectOptions, ConnectStats, IpStrategy};

use futures::io::{AsyncRead, AsyncWrite};

/// A byte stream a protocol can run over: a plain TCP connection or a TLS session.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> Transport for T {}

/// A type-erased [`Transport`].
pub type BoxedTransport = Box<dyn Transport>;
