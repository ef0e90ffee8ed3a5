use super::{
    handshake::{accept_key, validate_key, WEB_SOCKET_VERSION},
    WebSocket, WebSocketError, WebSocketOptions,
};
use crate::{
    error::Result,
    http::{
        transfer::{read_headers_limited, read_line_in_place},
        HttpConn, DEFAULT_MAXIMUM_HEADER_SIZE,
    },
    net::{BufStream, Conn},
};
use async_std::{
    future::timeout,
    net::{TcpListener, ToSocketAddrs},
};
use futures::io::AsyncWriteExt;
use http::{header, HeaderMap};
use std::net::SocketAddr;

const BAD_REQUEST: &[u8] =
    b"HTTP/1.1 400 Bad Request\r\nConnection: close\r\nContent-Length: 0\r\n\r\n";

/// Accepts WebSocket connections over plain TCP.
pub struct WebSocketServer {
    listener: TcpListener,
    options: WebSocketOptions,
}

impl WebSocketServer {
    pub async fn bind(addrs: impl ToSocketAddrs, options: WebSocketOptions) -> Result<Self> {
        let listener = TcpListener::bind(addrs).await?;
        Ok(Self { listener, options })
    }

    /// Wait for the next connection.
    ///
    /// The upgrade handshake is not performed until [`WebSocketHandle::accept`], so that it can
    /// run in its own task.
    pub async fn accept(&self) -> Result<WebSocketHandle> {
        let (stream, peer) = self.listener.accept().await?;
        tracing::debug!(">> Connection from {peer}");

        Ok(WebSocketHandle {
            stream: Box::new(Conn::from(stream)),
            peer,
            options: self.options,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// A connection which has not completed the upgrade handshake yet.
pub struct WebSocketHandle {
    stream: HttpConn,
    peer: SocketAddr,
    options: WebSocketOptions,
}

impl WebSocketHandle {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Read the client's upgrade request and answer it.
    ///
    /// An invalid request is answered with `400 Bad Request`.
    pub async fn accept(self) -> Result<WebSocket> {
        let stream = timeout(self.options.handshake_timeout, upgrade(self.stream))
            .await
            .map_err(|_| WebSocketError::HandshakeTimeout)??;

        tracing::debug!("== WebSocket connected to {}", self.peer);
        Ok(WebSocket::from_stream(stream, &self.options, false))
    }
}

/// Check an upgrade request, returning the key to answer.
fn check_request<'a>(
    method: &str,
    version: &str,
    headers: &'a HeaderMap,
) -> std::result::Result<&'a str, WebSocketError> {
    let invalid = |reason| WebSocketError::InvalidClientRequest { reason };

    if method != "GET" {
        return Err(invalid("method must be GET"));
    }
    if version != "HTTP/1.1" {
        return Err(invalid("version must be HTTP/1.1"));
    }

    let get = move |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
    };

    let upgrade = get(header::CONNECTION)
        .split(',')
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    if !upgrade {
        return Err(invalid("missing 'Connection: upgrade'"));
    }
    if !get(header::UPGRADE).trim().eq_ignore_ascii_case("websocket") {
        return Err(invalid("missing 'Upgrade: websocket'"));
    }
    if get(header::SEC_WEBSOCKET_VERSION).trim() != WEB_SOCKET_VERSION {
        return Err(invalid("unsupported WebSocket version"));
    }

    let key = get(header::SEC_WEBSOCKET_KEY);
    validate_key(key).map_err(|_| invalid("invalid Sec-WebSocket-Key"))?;
    Ok(key)
}

async fn upgrade(stream: HttpConn) -> Result<BufStream<HttpConn>> {
    let mut reader = BufStream::new(stream);

    let (line, offset) = read_line_in_place(&mut reader).await?;
    tracing::trace!(">> {line}");
    let mut parts = line.split(' ').filter(|part| !part.is_empty());
    let method = parts.next().unwrap_or_default().to_string();
    let version = parts.nth(1).unwrap_or_default().to_string();
    reader.consume(offset);

    let mut headers = HeaderMap::new();
    let limit = DEFAULT_MAXIMUM_HEADER_SIZE.saturating_sub(offset);
    read_headers_limited(&mut reader, &mut headers, limit).await?;

    let accept = match check_request(&method, &version, &headers) {
        Ok(key) => accept_key(key),
        Err(err) => {
            tracing::debug!("<< 400 Bad Request ({err})");
            let conn = reader.get_mut();
            conn.write_all(BAD_REQUEST).await?;
            conn.flush().await?;
            return Err(err.into());
        }
    };

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n"
    );
    tracing::trace!("<< 101 Switching Protocols");
    let conn = reader.get_mut();
    conn.write_all(response.as_bytes()).await?;
    conn.flush().await?;

    Ok(reader)
}
