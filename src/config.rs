//! Resolver configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use domain::resolv::stub::conf::ResolvConf;
use tracing::debug;

use crate::dns::RecordType;

/// Lookup bound applied when none is given.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub const RESOLV_CONF_PATH: &str = "/etc/resolv.conf";

const DNS_PORT: u16 = 53;

/// Servers used when the host configuration names none.
pub fn fallback_servers() -> Vec<SocketAddr> {
    vec![
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), DNS_PORT),
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)), DNS_PORT),
    ]
}

/// Configuration for a tracer and its resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Recursive servers, queried in order until one is reachable.
    pub servers: Vec<SocketAddr>,
    /// Bound on one whole lookup.
    pub timeout: Duration,
    pub record_type: RecordType,
}

impl ResolverConfig {
    /// Build a configuration from the host's `/etc/resolv.conf`.
    pub fn from_system() -> Self {
        let mut conf = ResolvConf::new();
        let servers = match conf.parse_file(RESOLV_CONF_PATH) {
            Ok(()) => nameservers(&conf),
            Err(e) => {
                debug!(path = RESOLV_CONF_PATH, error = %e, "cannot read resolver configuration");
                Vec::new()
            }
        };

        if servers.is_empty() {
            debug!("no nameservers configured, using fallback servers");
            return Self::default();
        }

        Self {
            servers,
            ..Self::default()
        }
    }

    /// Build a configuration that queries exactly `servers`.
    pub fn with_servers(servers: Vec<SocketAddr>) -> Self {
        Self {
            servers,
            ..Self::default()
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            servers: fallback_servers(),
            timeout: DEFAULT_TIMEOUT,
            record_type: RecordType::A,
        }
    }
}

/// Extract `nameserver` entries from resolv.conf text.
///
/// Scoped link-local servers (`fe80::1%2`) keep their scope ID. Text the
/// parser rejects yields no servers.
pub fn parse_resolv_conf(text: &str) -> Vec<SocketAddr> {
    let mut conf = ResolvConf::new();
    match conf.parse(&mut text.as_bytes()) {
        Ok(()) => nameservers(&conf),
        Err(e) => {
            debug!(error = %e, "unparsable resolver configuration");
            Vec::new()
        }
    }
}

fn nameservers(conf: &ResolvConf) -> Vec<SocketAddr> {
    conf.servers.iter().map(|server| server.addr).collect()
}
