use crate::error::Result;
use async_trait::async_trait;
use hickory_proto::{op::Query, rr::Record};
use std::time::Instant;

/// The records found for a query.
#[derive(Clone, Debug)]
pub struct LookupResults {
    query: Query,
    records: Vec<Record>,
    valid_until: Option<Instant>,
}

impl LookupResults {
    pub fn new(query: Query, records: Vec<Record>, valid_until: Option<Instant>) -> Self {
        Self {
            query,
            records,
            valid_until,
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut Vec<Record> {
        &mut self.records
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// When these results expire, or [`None`] if they never do.
    pub fn valid_until(&self) -> Option<Instant> {
        self.valid_until
    }
}

/// A source of DNS records.
#[async_trait]
pub trait Lookup: Send + Sync {
    /// Find the records answering `query`.
    async fn lookup(&self, query: &Query) -> Result<LookupResults>;

    /// A short description of this source, for logging.
    fn describe(&self) -> String;
}
