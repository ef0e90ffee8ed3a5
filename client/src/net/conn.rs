use crate::{
    dns::{LookupIp, Resolver},
    env::get_resolver,
    error::{Error, Result},
};
use async_std::{future::timeout, net::TcpStream};
use futures::{
    io::{AsyncRead, AsyncWrite},
    task::{Context, Poll},
};
use std::io;
use std::net::{IpAddr, Shutdown, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use strum::{Display, EnumString};

/// Time spent in each phase of establishing a connection.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConnectStats {
    pub dns_resolve: Duration,
    pub tcp_tries: u32,
    pub tcp_connect: Duration,
}

/// Which address families to try, and in which order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum IpStrategy {
    /// Same as [`PreferIpv6`](Self::PreferIpv6).
    #[default]
    Default,
    Ipv4Only,
    Ipv6Only,
    PreferIpv4,
    PreferIpv6,
}

#[derive(Clone)]
pub struct ConnectOptions<'a> {
    resolver: Arc<Resolver>,
    host: &'a str,
    port: u16,
    strategy: IpStrategy,
    timeout: Option<Duration>,
    tcp_nodelay: bool,
    ttl: Option<u32>,
}

impl<'a> ConnectOptions<'a> {
    /// Options for connecting to `host`, resolved with the shared resolver.
    pub async fn new(host: &'a str, port: u16) -> Result<Self> {
        Ok(Self::with_resolver(get_resolver().await?, host, port))
    }

    pub fn with_resolver(resolver: Arc<Resolver>, host: &'a str, port: u16) -> Self {
        Self {
            resolver,
            host,
            port,
            strategy: IpStrategy::Default,
            timeout: None,
            tcp_nodelay: false,
            ttl: None,
        }
    }

    pub fn host(&self) -> &'a str {
        self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_port(&mut self, port: u16) -> &mut Self {
        self.port = port;
        self
    }

    pub fn set_strategy(&mut self, strategy: IpStrategy) -> &mut Self {
        self.strategy = strategy;
        self
    }

    /// Limit the time spent connecting, across all addresses. DNS resolution is not included.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.timeout = timeout;
        self
    }

    pub fn set_tcp_nodelay(&mut self, enable: bool) -> &mut Self {
        self.tcp_nodelay = enable;
        self
    }

    pub fn set_ttl(&mut self, ttl: u32) -> &mut Self {
        self.ttl = Some(ttl);
        self
    }

    /// The addresses to try, in order.
    fn order(&self, addrs: &LookupIp) -> Vec<IpAddr> {
        let v4 = addrs.v4().iter().copied().map(IpAddr::V4);
        let v6 = addrs.v6().iter().copied().map(IpAddr::V6);

        match self.strategy {
            IpStrategy::Ipv4Only => v4.collect(),
            IpStrategy::Ipv6Only => v6.collect(),
            IpStrategy::PreferIpv4 => v4.chain(v6).collect(),
            IpStrategy::Default | IpStrategy::PreferIpv6 => v6.chain(v4).collect(),
        }
    }
}

/// A TCP connection.
#[derive(Debug)]
pub struct Conn {
    inner: TcpStream,
}

impl Conn {
    async fn connect_addrs(
        addrs: Vec<IpAddr>,
        options: &ConnectOptions<'_>,
        stats: &mut ConnectStats,
    ) -> Result<Self> {
        let mut error = None;
        let start = Instant::now();

        for ip in addrs {
            let addr = SocketAddr::new(ip, options.port);
            stats.tcp_tries += 1;

            tracing::debug!(
                "<< Connecting to {}:{} - Try {}: {ip}",
                options.host,
                options.port,
                stats.tcp_tries
            );

            let now = Instant::now();
            match TcpStream::connect(addr).await {
                Ok(inner) => {
                    let elapsed = start.elapsed();
                    stats.tcp_connect = elapsed;

                    tracing::debug!(
                        ">> Connected to {} ({:.3} ms elapsed, {:.3} ms total)",
                        options.host,
                        now.elapsed().as_secs_f32() * 1000.0,
                        elapsed.as_secs_f32() * 1000.0
                    );
                    return Ok(Self { inner });
                }
                Err(err) => {
                    tracing::debug!(
                        ">> Connection failed to {}: {err} ({:.3} ms elapsed)",
                        options.host,
                        now.elapsed().as_secs_f32() * 1000.0
                    );
                    error = Some(err);
                }
            }
        }

        Err(error.map(Error::from).unwrap_or(Error::NoAddresses))
    }

    pub async fn connect_stats(options: &ConnectOptions<'_>) -> Result<(Self, ConnectStats)> {
        let mut stats = ConnectStats::default();

        let now = Instant::now();
        let addrs = options.resolver.resolve_ips(options.host).await?;
        stats.dns_resolve = now.elapsed();

        let addrs = options.order(&addrs);
        let conn = match options.timeout {
            None => Self::connect_addrs(addrs, options, &mut stats).await?,
            Some(duration) => timeout(duration, Self::connect_addrs(addrs, options, &mut stats))
                .await
                .map_err(|_| Error::TimedOut {
                    operation: "connect",
                })??,
        };

        if options.tcp_nodelay {
            conn.inner.set_nodelay(true)?;
        }
        if let Some(ttl) = options.ttl {
            conn.inner.set_ttl(ttl)?;
        }

        Ok((conn, stats))
    }

    pub async fn connect(options: &ConnectOptions<'_>) -> Result<Self> {
        Ok(Self::connect_stats(options).await?.0)
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        self.inner.shutdown(how)
    }
}

impl From<TcpStream> for Conn {
    fn from(inner: TcpStream) -> Self {
        Self { inner }
    }
}

impl AsyncRead for Conn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for Conn {
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

    /// Flush and shut down the write side, so the peer reads end of file.
    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        futures::ready!(Pin::new(&mut self.inner).poll_flush(cx))?;
        match self.inner.shutdown(Shutdown::Write) {
            Err(err) if err.kind() != io::ErrorKind::NotConnected => Poll::Ready(Err(err)),
            _ => Poll::Ready(Ok(())),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dns::{Hosts, Lookup};
    use async_std::net::TcpListener;
    use futures::{AsyncReadExt, AsyncWriteExt};

    fn resolver(hosts: &str) -> Arc<Resolver> {
        let services: Vec<Box<dyn Lookup>> = vec![Box::new(Hosts::parse(hosts))];
        Arc::new(Resolver::from_services(services))
    }

    #[async_std::test]
    async fn test_connect() {
        crate::init_logging();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = async_std::task::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"hello").await.unwrap();
        });

        let resolver = resolver("127.0.0.1 test.local\n");
        let mut options = ConnectOptions::with_resolver(resolver, "test.local", port);
        options.set_tcp_nodelay(true);
        let (mut conn, stats) = Conn::connect_stats(&options).await.unwrap();
        assert_eq!(stats.tcp_tries, 1);
        assert_eq!(conn.peer_addr().unwrap().port(), port);

        let mut buf = String::new();
        conn.read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "hello");
        server.await;
    }

    #[async_std::test]
    async fn test_close_shuts_down_write() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = async_std::task::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await.unwrap();
            stream.write_all(b"bye").await.unwrap();
            buf
        });

        let resolver = resolver("127.0.0.1 test.local\n");
        let options = ConnectOptions::with_resolver(resolver, "test.local", port);
        let mut conn = Conn::connect(&options).await.unwrap();
        conn.write_all(b"done").await.unwrap();
        conn.close().await.unwrap();

        // The server only answers once it has read to the end, and the read side stays open.
        let mut reply = String::new();
        conn.read_to_string(&mut reply).await.unwrap();
        assert_eq!(reply, "bye");
        assert_eq!(server.await, b"done");
    }

    #[async_std::test]
    async fn test_falls_back_to_next_address() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Nothing listens on the IPv6 loopback at this port, so the first try is refused.
        let resolver = resolver("127.0.0.1 test.local\n::1 test.local\n");
        let options = ConnectOptions::with_resolver(resolver, "test.local", port);
        let (_conn, stats) = Conn::connect_stats(&options).await.unwrap();
        assert_eq!(stats.tcp_tries, 2);
        drop(listener);
    }

    #[async_std::test]
    async fn test_strategy_order() {
        let resolver = resolver("192.0.2.1 test.local\n2001:db8::1 test.local\n");
        let addrs = resolver.resolve_ips("test.local").await.unwrap();
        let v4: IpAddr = "192.0.2.1".parse().unwrap();
        let v6: IpAddr = "2001:db8::1".parse().unwrap();

        let mut options = ConnectOptions::with_resolver(resolver, "test.local", 80);
        assert_eq!(options.order(&addrs), [v6, v4]);
        options.set_strategy(IpStrategy::PreferIpv4);
        assert_eq!(options.order(&addrs), [v4, v6]);
        options.set_strategy(IpStrategy::Ipv4Only);
        assert_eq!(options.order(&addrs), [v4]);
        options.set_strategy(IpStrategy::Ipv6Only);
        assert_eq!(options.order(&addrs), [v6]);
    }

    #[test]
    fn test_parse_strategy() {
        assert_eq!("prefer-ipv4".parse::<IpStrategy>().unwrap(), IpStrategy::PreferIpv4);
        assert_eq!("ipv6-only".parse::<IpStrategy>().unwrap(), IpStrategy::Ipv6Only);
        assert_eq!(IpStrategy::Default.to_string(), "default");
        assert!("ipv5".parse::<IpStrategy>().is_err());
    }

    #[async_std::test]
    async fn test_no_addresses() {
        let resolver = resolver("2001:db8::1 test.local\n");
        let mut options = ConnectOptions::with_resolver(resolver, "test.local", 80);
        options.set_strategy(IpStrategy::Ipv4Only);
        let err = Conn::connect(&options).await.unwrap_err();
        assert!(matches!(err, Error::NoAddresses));
    }
}
