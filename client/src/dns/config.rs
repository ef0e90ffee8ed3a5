use super::NameServer;
use crate::error::Result;
use async_std::fs;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

/// Resolver settings, as found in `resolv.conf`.
#[derive(Clone, Debug)]
pub struct Config {
    pub name_servers: Vec<NameServer>,
    pub ndots: u32,
    pub attempts: u32,
    pub rotate: bool,
    pub timeout: Duration,
}

impl Default for Config {
    /// The settings used when there is no `resolv.conf`: a name server on the local machine.
    fn default() -> Self {
        Self {
            name_servers: vec![NameServer::new(IpAddr::V4(Ipv4Addr::LOCALHOST))],
            ndots: 1,
            attempts: 2,
            rotate: false,
            timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Load the configuration from a `resolv.conf` file.
    ///
    /// A missing or malformed file is not an error; it is logged and the default configuration
    /// is used instead.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = match fs::read(path.as_os_str()).await {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::warn!("{} not found, using default name server", path.display());
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };

        Ok(match Self::parse(&data) {
            Some(config) => config,
            None => {
                tracing::warn!("{} is malformed, using default name server", path.display());
                Self::default()
            }
        })
    }

    /// Parse the contents of a `resolv.conf` file.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let config = match resolv_conf::Config::parse(data) {
            Ok(config) => config,
            Err(err) => {
                tracing::debug!("unable to parse resolver configuration: {err}");
                return None;
            }
        };

        let mut name_servers: Vec<NameServer> = config
            .nameservers
            .iter()
            .map(|ip| NameServer::new(ip.into()))
            .collect();
        if name_servers.is_empty() {
            name_servers = Self::default().name_servers;
        }

        Some(Self {
            name_servers,
            ndots: config.ndots,
            attempts: config.attempts.max(1),
            rotate: config.rotate,
            timeout: Duration::from_secs(config.timeout.max(1).into()),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse() {
        let config = Config::parse(
            b"# comment\n\
              nameserver 10.0.0.1\n\
              nameserver 2001:db8::1\n\
              options ndots:2 attempts:3 timeout:7 rotate\n",
        )
        .unwrap();

        let ips = config
            .name_servers
            .iter()
            .map(|ns| ns.addr().ip())
            .collect::<Vec<_>>();
        assert_eq!(
            ips,
            ["10.0.0.1".parse::<IpAddr>().unwrap(), "2001:db8::1".parse().unwrap()]
        );
        assert_eq!(config.ndots, 2);
        assert_eq!(config.attempts, 3);
        assert_eq!(config.timeout, Duration::from_secs(7));
        assert!(config.rotate);
    }

    #[test]
    fn test_parse_without_name_servers() {
        let config = Config::parse(b"search example.com\n").unwrap();
        assert_eq!(config.name_servers.len(), 1);
        assert_eq!(config.name_servers[0].addr().ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[async_std::test]
    async fn test_missing_file() {
        let config = Config::load("/nonexistent/resolv.conf").await.unwrap();
        assert_eq!(config.name_servers.len(), 1);
        assert_eq!(config.attempts, 2);
    }
}
