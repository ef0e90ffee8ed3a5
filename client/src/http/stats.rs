use crate::{net::ConnectStats, tls};
use std::fmt;
use std::time::Duration;

/// Timings for a transfer.
#[derive(Clone, Copy, Default)]
pub struct Stats {
    /// Time spent following redirects before the final request was sent.
    pub redirect: Option<Duration>,
    pub connect: Option<ConnectStats>,
    pub tls_connect: Option<Duration>,
    /// Time spent sending the request.
    pub stall: Duration,
    /// Time from sending the request to the first byte of the response.
    pub wait: Duration,
    /// Time from sending the request to the end of the response headers.
    pub response: Duration,
}

impl From<ConnectStats> for Stats {
    fn from(connect: ConnectStats) -> Self {
        Self {
            connect: Some(connect),
            ..Default::default()
        }
    }
}

impl From<tls::ConnectStats> for Stats {
    fn from(connect: tls::ConnectStats) -> Self {
        Self {
            connect: Some(connect.stats),
            tls_connect: Some(connect.tls_connect),
            ..Default::default()
        }
    }
}

impl fmt::Debug for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stats = f.debug_struct("Stats");

        if let Some(redirect) = &self.redirect {
            stats.field("redirect", redirect);
        }
        if let Some(connect) = &self.connect {
            stats.field("lookup", &connect.dns_resolve);
            stats.field("connect", &connect.tcp_connect);
            stats.field("tries", &connect.tcp_tries);
        }
        if let Some(tls) = &self.tls_connect {
            stats.field("tls", tls);
        }

        stats.field("stall", &self.stall);
        stats.field("wait", &self.wait);
        stats.field("response", &self.response);
        stats.finish()
    }
}
