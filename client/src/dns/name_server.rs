use super::{DnsError, Lookup, LookupResults};
use crate::error::Result;
use async_std::{future::timeout, net::UdpSocket};
use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use std::fmt::{self, Display, Formatter};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};

/// Largest DNS message we send or accept over UDP.
const MAX_PACKET_LENGTH: usize = 900;

const DNS_PORT: u16 = 53;

/// A recursive name server, queried over UDP.
#[derive(Clone, Debug)]
pub struct NameServer {
    addr: SocketAddr,
    timeout: Duration,
}

impl NameServer {
    pub fn new(ip: IpAddr) -> Self {
        Self::with_addr(SocketAddr::new(ip, DNS_PORT))
    }

    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            addr,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Limit the time spent waiting for the answer to each query.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Send `request` and wait for the response carrying the same message ID.
    async fn transact(&self, request: &Message) -> Result<Message> {
        let bytes = request.to_vec().map_err(DnsError::from)?;

        let local: SocketAddr = match self.addr {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(self.addr).await?;
        socket.send(&bytes).await?;

        let mut buf = [0u8; MAX_PACKET_LENGTH];
        loop {
            let len = socket.recv(&mut buf).await?;
            let response = match Message::from_vec(&buf[..len]) {
                Ok(response) => response,
                Err(err) => {
                    tracing::debug!("== Failed to parse response from {self}: {err}");
                    continue;
                }
            };

            if response.id() != request.id() {
                tracing::debug!(
                    "== Got mismatched message ids from {self}: {} =/= {}",
                    request.id(),
                    response.id()
                );
                continue;
            }

            break Ok(response);
        }
    }
}

impl Display for NameServer {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}

#[async_trait]
impl Lookup for NameServer {
    async fn lookup(&self, query: &Query) -> Result<LookupResults> {
        let mut request = Message::new();
        request
            .set_id(rand::random())
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true)
            .add_query(query.clone());

        let response = timeout(self.timeout, self.transact(&request))
            .await
            .map_err(|_| DnsError::TimedOut)??;

        let mut has_answer = false;
        if response.response_code() == ResponseCode::NoError {
            let mut records = vec![];
            let all = response
                .answers()
                .iter()
                .chain(response.name_servers())
                .chain(response.additionals());

            for record in all {
                if record.name() == query.name() {
                    has_answer = true;
                }
                if record.dns_class() != query.query_class()
                    || record.record_type() != query.query_type()
                {
                    continue;
                }
                records.push(record.clone());
            }

            if !records.is_empty() {
                let ttl = records.iter().map(|record| record.ttl()).min().unwrap_or(0);
                let valid_until = Instant::now() + Duration::from_secs(ttl.into());
                return Ok(LookupResults::new(query.clone(), records, Some(valid_until)));
            } else if has_answer {
                return Err(DnsError::NoData.into());
            }
        }

        Err(DnsError::NoRecords {
            query: Box::new(query.clone()),
            soa: response.name_servers().first().cloned().map(Box::new),
            response_code: response.response_code(),
        }
        .into())
    }

    fn describe(&self) -> String {
        format!("name server {self}")
    }
}
