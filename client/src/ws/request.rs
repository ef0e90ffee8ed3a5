use super::{
    handshake::{accept_key, new_key, WEB_SOCKET_VERSION},
    WebSocket, WebSocketError,
};
use crate::{
    dns::Resolver,
    error::Result,
    http::{transfer::transfer, HttpRequest},
    net::IpStrategy,
    request::RequestBase,
};
use async_std::future::timeout;
use http::{
    header::{self, HeaderName, HeaderValue},
    Method, StatusCode,
};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MAX_MESSAGE_LENGTH: u64 = 128 * 1024 * 1024;

#[derive(Clone, Copy, Debug)]
pub struct WebSocketOptions {
    /// Limit on the whole opening handshake, including connecting.
    pub handshake_timeout: Duration,
    /// Largest message accepted from the peer, across all of its frames.
    pub max_message_length: u64,
    /// How long to wait for the peer to close the connection after both sides sent close frames.
    pub close_timeout: Duration,
}

impl Default for WebSocketOptions {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(60),
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            close_timeout: Duration::from_secs(30),
        }
    }
}

impl WebSocketOptions {
    pub fn set_handshake_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn set_max_message_length(&mut self, max: u64) -> &mut Self {
        self.max_message_length = max;
        self
    }

    pub fn set_close_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.close_timeout = timeout;
        self
    }
}

/// A WebSocket connection request.
pub struct WsRequest {
    inner: HttpRequest,
    options: WebSocketOptions,
}

impl WsRequest {
    pub fn options(&self) -> &WebSocketOptions {
        &self.options
    }

    pub fn header<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: TryInto<HeaderName>,
        K::Error: Into<crate::Error>,
        V: TryInto<HeaderValue>,
        V::Error: Into<crate::Error>,
    {
        self.inner.header(key, value);
        self
    }

    pub fn set_port(&mut self, port: u16) -> &mut Self {
        self.inner.set_port(port);
        self
    }

    pub fn set_strategy(&mut self, strategy: IpStrategy) -> &mut Self {
        self.inner.set_strategy(strategy);
        self
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.inner.set_timeout(timeout);
        self
    }

    pub fn set_resolver(&mut self, resolver: Arc<Resolver>) -> &mut Self {
        self.inner.set_resolver(resolver);
        self
    }

    pub fn set_handshake_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.options.set_handshake_timeout(timeout);
        self
    }

    pub fn set_max_message_length(&mut self, max: u64) -> &mut Self {
        self.options.set_max_message_length(max);
        self
    }

    pub fn set_close_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.options.set_close_timeout(timeout);
        self
    }

    /// Connect and perform the opening handshake.
    pub async fn run(&mut self) -> Result<WebSocket> {
        let key = new_key();
        let accept = accept_key(&key);

        self.inner
            .header(header::CONNECTION, "Upgrade")
            .header(header::UPGRADE, "websocket")
            .header(header::SEC_WEBSOCKET_VERSION, WEB_SOCKET_VERSION)
            .header(header::SEC_WEBSOCKET_KEY, key.as_str());

        let (response, reader) = timeout(self.options.handshake_timeout, transfer(&mut self.inner))
            .await
            .map_err(|_| WebSocketError::HandshakeTimeout)??;

        if response.status != StatusCode::SWITCHING_PROTOCOLS {
            tracing::debug!("== WebSocket connection refused ({})", response.status);
            return Err(WebSocketError::ServerRejected {
                status: response.status,
            }
            .into());
        }

        let expect = |name: HeaderName, expected: &str, label: &'static str| {
            let matches = response
                .headers
                .get(&name)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|value| value.trim().eq_ignore_ascii_case(expected));
            if matches {
                Ok(())
            } else {
                tracing::debug!("== WebSocket connection refused (bad '{label}' header)");
                Err(WebSocketError::InvalidHandshake { name: label })
            }
        };
        expect(header::CONNECTION, "upgrade", "Connection")?;
        expect(header::UPGRADE, "websocket", "Upgrade")?;

        // The accept key is base64, so the comparison must be exact.
        let accepted = response
            .headers
            .get(header::SEC_WEBSOCKET_ACCEPT)
            .is_some_and(|value| value.as_bytes() == accept.as_bytes());
        if !accepted {
            tracing::debug!("== WebSocket connection refused (bad accept key)");
            return Err(WebSocketError::InvalidHandshake {
                name: "Sec-WebSocket-Accept",
            }
            .into());
        }

        tracing::debug!("== WebSocket connected");
        Ok(WebSocket::from_stream(reader, &self.options, true))
    }
}

/// Start building a WebSocket connection to a `ws` or `wss` URL.
pub fn open(url: impl AsRef<str>) -> WsRequest {
    let mut secure = false;
    let base = RequestBase::new(url, |scheme| match scheme {
        "ws" => true,
        "wss" => {
            secure = true;
            true
        }
        _ => false,
    });

    let mut inner = HttpRequest::new(base, Method::GET);
    inner.options.secure = secure;
    WsRequest {
        inner,
        options: WebSocketOptions::default(),
    }
}
