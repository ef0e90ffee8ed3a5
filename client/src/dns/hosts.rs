use super::{DnsError, Lookup, LookupResults};
use crate::error::Result;
use async_std::fs;
use async_trait::async_trait;
use hickory_proto::{
    op::Query,
    rr::{
        rdata::{A, AAAA},
        Name, RData, Record, RecordType,
    },
};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Default)]
struct Results {
    a: Option<LookupResults>,
    aaaa: Option<LookupResults>,
}

/// The static host name table.
#[derive(Debug, Default)]
pub struct Hosts {
    names: HashMap<Name, Results>,
}

impl Hosts {
    /// Load a hosts file. A missing file yields an empty table.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path.as_os_str()).await {
            Ok(data) => Ok(Self::parse(&data)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::warn!("{} not found, host table is empty", path.display());
                Ok(Self::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Parse the contents of a hosts file.
    ///
    /// Each line holds an address followed by the names it is known by. Text after `#` is a
    /// comment. Lines and names which cannot be parsed are skipped.
    pub fn parse(data: &str) -> Self {
        let mut hosts = Self::default();

        for line in data.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            let mut tokens = line.split_whitespace();
            let Some(ip) = tokens.next() else {
                continue;
            };
            let ip: IpAddr = match ip.parse() {
                Ok(ip) => ip,
                Err(_) => {
                    tracing::warn!("failed to parse ip {ip}");
                    continue;
                }
            };

            for host in tokens {
                let host = host.to_lowercase();
                let name = match Name::from_str(&host) {
                    Ok(name) => name,
                    Err(err) => {
                        tracing::warn!("failed to parse hostname '{host}': {err}");
                        continue;
                    }
                };
                hosts.insert(name, ip);
            }
        }

        hosts
    }

    fn insert(&mut self, name: Name, ip: IpAddr) {
        let (record_type, rdata) = match ip {
            IpAddr::V4(addr) => (RecordType::A, RData::A(A(addr))),
            IpAddr::V6(addr) => (RecordType::AAAA, RData::AAAA(AAAA(addr))),
        };
        let record = Record::from_rdata(name.clone(), 0, rdata);
        let query = Query::query(name.clone(), record_type);

        let results = self.names.entry(name).or_default();
        let slot = match record_type {
            RecordType::A => &mut results.a,
            _ => &mut results.aaaa,
        };
        slot.get_or_insert_with(|| LookupResults::new(query, vec![], None))
            .records_mut()
            .push(record);
    }

    /// The number of names in the table.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[async_trait]
impl Lookup for Hosts {
    async fn lookup(&self, query: &Query) -> Result<LookupResults> {
        let results = self.names.get(query.name()).ok_or(DnsError::NoData)?;
        let results = match query.query_type() {
            RecordType::A => results.a.as_ref(),
            RecordType::AAAA => results.aaaa.as_ref(),
            _ => None,
        };

        Ok(results.ok_or(DnsError::NoData)?.clone())
    }

    fn describe(&self) -> String {
        "hosts".into()
    }
}
