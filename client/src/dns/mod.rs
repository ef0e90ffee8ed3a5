//! A stub DNS resolver which answers from the hosts file and queries recursive name servers.

mod config;
mod error;
mod hosts;
mod lookup;
mod name_server;
mod resolver;

pub use config::Config;
pub use error::DnsError;
pub use hosts::Hosts;
pub use lookup::{Lookup, LookupResults};
pub use name_server::NameServer;
pub use resolver::{LookupIp, Resolver};

pub use hickory_proto::op::Query;
pub use hickory_proto::rr::{Name, RecordType};
