use crate::{
    env::get_tls_client_config,
    error::{Error, Result},
    net::{self, Conn, ConnectOptions},
};
use futures::{
    io::{AsyncRead, AsyncWrite},
    task::{Context, Poll},
};
use futures_rustls::{client::TlsStream, TlsConnector};
use rustls::{pki_types::ServerName, ClientConfig};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, Default)]
pub struct ConnectStats {
    pub stats: net::ConnectStats,
    pub tls_connect: Duration,
}

impl From<net::ConnectStats> for ConnectStats {
    fn from(stats: net::ConnectStats) -> Self {
        Self {
            stats,
            ..Default::default()
        }
    }
}

fn handshake_error(err: io::Error) -> Error {
    if let Some(tls) = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
    {
        return Error::Tls {
            source: tls.clone(),
        };
    }
    err.into()
}

/// A TLS session over a TCP connection.
#[derive(Debug)]
pub struct TlsConn {
    inner: TlsStream<Conn>,
}

impl TlsConn {
    pub async fn connect_stats_config(
        options: &ConnectOptions<'_>,
        config: Arc<ClientConfig>,
    ) -> Result<(Self, ConnectStats)> {
        let server_name = ServerName::try_from(options.host().to_string()).map_err(|_| {
            Error::InvalidServerName {
                host: options.host().into(),
            }
        })?;

        let (conn, stats) = Conn::connect_stats(options).await?;
        let mut stats = ConnectStats::from(stats);

        let now = Instant::now();
        let inner = TlsConnector::from(config)
            .connect(server_name, conn)
            .await
            .map_err(handshake_error)?;
        stats.tls_connect = now.elapsed();

        let (_, session) = inner.get_ref();
        tracing::debug!(
            "== TLS connected using {:?} / {:?} ({:.3} ms)",
            session.protocol_version(),
            session.negotiated_cipher_suite().map(|suite| suite.suite()),
            stats.tls_connect.as_secs_f32() * 1000.0
        );

        Ok((Self { inner }, stats))
    }

    pub async fn connect_config(
        options: &ConnectOptions<'_>,
        config: Arc<ClientConfig>,
    ) -> Result<Self> {
        Ok(Self::connect_stats_config(options, config).await?.0)
    }

    /// Connect using the shared client configuration, which trusts the system root certificates.
    pub async fn connect_stats(options: &ConnectOptions<'_>) -> Result<(Self, ConnectStats)> {
        Self::connect_stats_config(options, get_tls_client_config().await?).await
    }

    pub async fn connect(options: &ConnectOptions<'_>) -> Result<Self> {
        Ok(Self::connect_stats(options).await?.0)
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.get_ref().0.peer_addr()
    }
}

impl AsyncRead for TlsConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TlsConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_close(cx)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dns::{Hosts, Lookup, Resolver};
    use async_std::net::TcpListener;
    use futures::AsyncWriteExt;

    #[async_std::test]
    async fn test_invalid_server_name() {
        let services: Vec<Box<dyn Lookup>> = vec![Box::new(Hosts::default())];
        let resolver = Arc::new(Resolver::from_services(services));
        let options = ConnectOptions::with_resolver(resolver, "bad name!", 443);
        let config = Arc::new(
            ClientConfig::builder_with_provider(Arc::new(
                rustls::crypto::ring::default_provider(),
            ))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(rustls::RootCertStore::empty())
            .with_no_client_auth(),
        );

        let err = TlsConn::connect_config(&options, config).await.unwrap_err();
        assert!(matches!(err, Error::InvalidServerName { .. }), "{err}");
    }

    #[async_std::test]
    async fn test_handshake_with_plaintext_server() {
        crate::init_logging();

        // A server which does not speak TLS at all.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        async_std::task::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await.unwrap();
        });

        let services: Vec<Box<dyn Lookup>> = vec![Box::new(Hosts::parse("127.0.0.1 tls.local"))];
        let resolver = Arc::new(Resolver::from_services(services));
        let options = ConnectOptions::with_resolver(resolver, "tls.local", port);
        let config = Arc::new(
            ClientConfig::builder_with_provider(Arc::new(
                rustls::crypto::ring::default_provider(),
            ))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(rustls::RootCertStore::empty())
            .with_no_client_auth(),
        );

        assert!(TlsConn::connect_config(&options, config).await.is_err());
    }
}
