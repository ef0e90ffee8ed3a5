use super::{Config, DnsError, Hosts, Lookup};
use crate::error::Result;
use futures::future::join;
use hickory_proto::{
    op::Query,
    rr::{Name, RData, Record, RecordType},
};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// The addresses a host name resolved to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LookupIp {
    v4: Vec<Ipv4Addr>,
    v6: Vec<Ipv6Addr>,
}

impl LookupIp {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_ip(ip: IpAddr) -> Self {
        let mut this = Self::new();
        match ip {
            IpAddr::V4(addr) => this.v4.push(addr),
            IpAddr::V6(addr) => this.v6.push(addr),
        }
        this
    }

    fn push_records(&mut self, records: &[Record]) {
        for record in records {
            match record.data() {
                Some(RData::A(ip)) => self.v4.push(ip.0),
                Some(RData::AAAA(ip)) => self.v6.push(ip.0),
                _ => (),
            }
        }
    }

    pub fn v4(&self) -> &[Ipv4Addr] {
        &self.v4
    }

    pub fn v6(&self) -> &[Ipv6Addr] {
        &self.v6
    }

    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }
}

/// Resolves host names to addresses, first from the hosts table and then from name servers.
pub struct Resolver {
    services: Vec<Box<dyn Lookup>>,
    attempts: u32,
    rotate: bool,
    next: AtomicUsize,
}

impl Resolver {
    /// Create a resolver from the system `resolv.conf` and hosts files.
    pub async fn load(resolv_conf: impl AsRef<Path>, hosts: impl AsRef<Path>) -> Result<Self> {
        let (config, hosts) = join(Config::load(resolv_conf), Hosts::load(hosts)).await;
        Ok(Self::new(config?, hosts?))
    }

    pub fn new(config: Config, hosts: Hosts) -> Self {
        let mut services: Vec<Box<dyn Lookup>> = vec![Box::new(hosts)];
        for mut name_server in config.name_servers {
            tracing::trace!("++ Name Server {name_server}");
            name_server.set_timeout(config.timeout);
            services.push(Box::new(name_server));
        }

        let mut this = Self::from_services(services);
        this.attempts = config.attempts.max(1);
        this.rotate = config.rotate;
        this
    }

    /// Create a resolver which consults `services` in order.
    pub fn from_services(services: Vec<Box<dyn Lookup>>) -> Self {
        Self {
            services,
            attempts: 1,
            rotate: false,
            next: AtomicUsize::new(0),
        }
    }

    /// The order in which to consult services for the next query.
    ///
    /// The first service (the hosts table) is always consulted first. With `rotate`, the
    /// starting point among the remaining services advances on each query.
    fn service_order(&self) -> Vec<&dyn Lookup> {
        let mut order: Vec<&dyn Lookup> = self.services.iter().map(|s| s.as_ref()).collect();
        if self.rotate && order.len() > 2 {
            let shift = self.next.fetch_add(1, Ordering::Relaxed) % (order.len() - 1);
            order[1..].rotate_left(shift);
        }
        order
    }

    async fn resolve_ips_lookup(&self, name: &Name) -> Result<LookupIp> {
        let a = Query::query(name.clone(), RecordType::A);
        let aaaa = Query::query(name.clone(), RecordType::AAAA);

        let mut error = None;
        let mut result = LookupIp::new();

        for _ in 0..self.attempts {
            for service in self.service_order() {
                let (a, aaaa) = join(service.lookup(&a), service.lookup(&aaaa)).await;
                let mut success = false;

                for answer in [a, aaaa] {
                    match answer {
                        Ok(results) => {
                            result.push_records(results.records());
                            success = true;
                        }
                        Err(err) => {
                            tracing::trace!("== {} failed: {err}", service.describe());
                            error = Some(err);
                        }
                    }
                }

                if success {
                    return Ok(result);
                }
            }
        }

        Err(error.unwrap_or_else(|| DnsError::NoData.into()))
    }

    /// Resolve a host name, or parse an IP address literal.
    pub async fn resolve_ips(&self, name: &str) -> Result<LookupIp> {
        if let Ok(addr) = name.parse::<IpAddr>() {
            tracing::debug!("== Addr {addr}");
            return Ok(LookupIp::from_ip(addr));
        }

        let lower = name.to_lowercase();
        let name = Name::from_str(&lower).map_err(|_| DnsError::InvalidName { name: lower })?;
        let now = Instant::now();

        tracing::debug!("<< Lookup {name}");

        let addrs = self.resolve_ips_lookup(&name).await;

        tracing::debug!(
            ">> Lookup {name} ({:.3} ms)",
            now.elapsed().as_secs_f32() * 1000.0
        );

        let addrs = addrs?;
        for a in addrs.v4() {
            tracing::debug!(">>     A    {a}");
        }
        for aaaa in addrs.v6() {
            tracing::debug!(">>     AAAA {aaaa}");
        }

        Ok(addrs)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dns::LookupResults;
    use crate::Error;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    /// A service which fails a fixed number of times before answering.
    struct Flaky {
        failures: u32,
        calls: Arc<AtomicU32>,
        hosts: Hosts,
    }

    #[async_trait]
    impl Lookup for Flaky {
        async fn lookup(&self, query: &Query) -> Result<LookupResults> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            // Each attempt issues an A and an AAAA query.
            if call / 2 < self.failures {
                return Err(DnsError::TimedOut.into());
            }
            self.hosts.lookup(query).await
        }

        fn describe(&self) -> String {
            "flaky".into()
        }
    }

    #[async_std::test]
    async fn test_ip_literal() {
        let resolver = Resolver::from_services(vec![]);

        let ips = resolver.resolve_ips("192.0.2.1").await.unwrap();
        assert_eq!(ips.v4(), ["192.0.2.1".parse::<Ipv4Addr>().unwrap()]);
        assert!(ips.v6().is_empty());

        let ips = resolver.resolve_ips("2001:db8::5").await.unwrap();
        assert_eq!(ips.v6(), ["2001:db8::5".parse::<Ipv6Addr>().unwrap()]);
    }

    #[async_std::test]
    async fn test_resolve_from_hosts() {
        crate::init_logging();

        let hosts = Hosts::parse("192.0.2.7 www.example.com\n2001:db8::7 www.example.com\n");
        let resolver = Resolver::from_services(vec![Box::new(hosts)]);

        let ips = resolver.resolve_ips("WWW.Example.com").await.unwrap();
        assert_eq!(ips.v4(), ["192.0.2.7".parse::<Ipv4Addr>().unwrap()]);
        assert_eq!(ips.v6(), ["2001:db8::7".parse::<Ipv6Addr>().unwrap()]);
    }

    #[async_std::test]
    async fn test_no_services() {
        let resolver = Resolver::from_services(vec![]);
        let err = resolver.resolve_ips("www.example.com").await.unwrap_err();
        assert!(matches!(err, Error::Dns { source: DnsError::NoData }));
    }

    #[async_std::test]
    async fn test_retry_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let flaky = Flaky {
            failures: 2,
            calls: calls.clone(),
            hosts: Hosts::parse("192.0.2.9 flaky.example.com\n"),
        };
        let mut resolver = Resolver::from_services(vec![Box::new(flaky)]);

        // Two attempts are not enough.
        resolver.attempts = 2;
        let err = resolver.resolve_ips("flaky.example.com").await.unwrap_err();
        assert!(err.is_timeout());

        // The third attempt succeeds.
        calls.store(0, Ordering::SeqCst);
        resolver.attempts = 3;
        let ips = resolver.resolve_ips("flaky.example.com").await.unwrap();
        assert_eq!(ips.v4(), ["192.0.2.9".parse::<Ipv4Addr>().unwrap()]);
    }

    #[test]
    fn test_rotate() {
        let services: Vec<Box<dyn Lookup>> = vec![
            Box::new(Hosts::default()),
            Box::new(crate::dns::NameServer::new(Ipv4Addr::new(10, 0, 0, 1).into())),
            Box::new(crate::dns::NameServer::new(Ipv4Addr::new(10, 0, 0, 2).into())),
        ];
        let mut resolver = Resolver::from_services(services);
        resolver.rotate = true;

        let describe = |resolver: &Resolver| {
            resolver
                .service_order()
                .iter()
                .map(|s| s.describe())
                .collect::<Vec<_>>()
        };
        assert_eq!(
            describe(&resolver),
            ["hosts", "name server 10.0.0.1:53", "name server 10.0.0.2:53"]
        );
        assert_eq!(
            describe(&resolver),
            ["hosts", "name server 10.0.0.2:53", "name server 10.0.0.1:53"]
        );
    }
}
