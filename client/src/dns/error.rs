use hickory_proto::{
    error::ProtoError,
    op::{Query, ResponseCode},
    rr::Record,
};
use snafu::Snafu;

/// Errors returned by DNS lookups.
#[derive(Debug, Snafu)]
pub enum DnsError {
    /// The name exists, but has no records of the requested type.
    #[snafu(display("no data"))]
    NoData,

    #[snafu(display("no records for {query} ({response_code})"))]
    NoRecords {
        query: Box<Query>,
        /// The start of authority record for the zone, if the name server sent one.
        soa: Option<Box<Record>>,
        response_code: ResponseCode,
    },

    #[snafu(display("invalid domain name '{name}'"))]
    InvalidName { name: String },

    #[snafu(display("DNS query timed out"))]
    TimedOut,

    #[snafu(display("DNS protocol error: {source}"))]
    Proto { source: ProtoError },
}

impl From<ProtoError> for DnsError {
    fn from(source: ProtoError) -> Self {
        Self::Proto { source }
    }
}
