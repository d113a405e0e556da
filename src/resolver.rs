//! DNS lookup engine.
//!
//! Performs one bounded lookup against the configured recursive servers:
//! 1. Validate the name (no network activity for malformed input)
//! 2. Query over UDP, retrying once over TCP when the reply is truncated
//! 3. Classify the reply into an answer or a [`LookupError`]
//!
//! Transports handle the actual I/O, the resolver handles decisions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::dns::{self, Query, RData, Rcode, RecordType, Response};
use crate::error::LookupError;
use crate::name;
use crate::transport::{DnsTransport, Protocol, SocketTransport};

/// A successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupSuccess {
    /// First record of the requested type, rendered as text.
    pub address: String,
    pub ttl: u32,
    /// Server that produced the answer.
    pub server: SocketAddr,
}

/// Resolver engine over a set of recursive servers.
///
/// Holds no per-lookup state, so one resolver can serve concurrent lookups.
pub struct Resolver {
    servers: Vec<SocketAddr>,
    transport: Arc<dyn DnsTransport>,
}

impl Resolver {
    /// Create a resolver that talks to `servers` over real sockets.
    pub fn new(servers: Vec<SocketAddr>) -> Self {
        Self::with_transport(servers, Arc::new(SocketTransport))
    }

    /// Create a resolver that sends every message through `transport`.
    pub fn with_transport(servers: Vec<SocketAddr>, transport: Arc<dyn DnsTransport>) -> Self {
        Self { servers, transport }
    }

    /// Look up `record_type` records for `domain`.
    ///
    /// The whole lookup, including TCP fallback and server failover, is
    /// bounded by `timeout`.
    pub async fn lookup(
        &self,
        domain: &str,
        record_type: RecordType,
        timeout: Duration,
    ) -> Result<LookupSuccess, LookupError> {
        let name = name::validate(domain)?;
        debug!(domain = %name, %record_type, "starting lookup");

        let deadline = Instant::now() + timeout;
        match tokio::time::timeout_at(deadline, self.lookup_name(&name, record_type, deadline))
            .await
        {
            Ok(Err(LookupError::Timeout(_))) | Err(_) => {
                warn!(domain = %name, timeout_ms = timeout.as_millis() as u64, "lookup timed out");
                Err(LookupError::Timeout(timeout))
            }
            Ok(result) => result,
        }
    }

    /// Query each server in turn, moving on when one is unreachable or
    /// silent.
    ///
    /// Each server gets an equal share of the time left before `deadline`,
    /// so a blackholed server cannot starve the ones after it.
    async fn lookup_name(
        &self,
        name: &str,
        record_type: RecordType,
        deadline: Instant,
    ) -> Result<LookupSuccess, LookupError> {
        let mut last_error =
            LookupError::TransportFailure("no DNS servers configured".to_string());

        for (i, &server) in self.servers.iter().enumerate() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let share = remaining / (self.servers.len() - i) as u32;

            match tokio::time::timeout(share, self.query_server(server, name, record_type)).await {
                Ok(Err(LookupError::TransportFailure(reason))) => {
                    warn!(%server, %reason, "DNS server unreachable");
                    last_error = LookupError::TransportFailure(reason);
                }
                Ok(result) => return result,
                Err(_) => {
                    warn!(%server, share_ms = share.as_millis() as u64, "DNS server silent");
                    last_error = LookupError::Timeout(share);
                }
            }
        }

        Err(last_error)
    }

    async fn query_server(
        &self,
        server: SocketAddr,
        name: &str,
        record_type: RecordType,
    ) -> Result<LookupSuccess, LookupError> {
        let query = Query::new(rand::random(), name, record_type);
        let message = query.to_bytes();

        let mut reply = self.exchange(server, Protocol::Udp, &message).await?;
        if dns::is_truncated(&reply) {
            debug!(%server, domain = name, "UDP reply truncated, retrying over TCP");
            reply = self.exchange(server, Protocol::Tcp, &message).await?;
        }

        let response = Response::parse(&reply).map_err(|e| {
            LookupError::Unexpected(format!("undecodable reply from {server}: {e}"))
        })?;

        if response.id != query.id {
            return Err(LookupError::Unexpected(format!(
                "reply from {server} carries ID {} but the query used {}",
                response.id, query.id
            )));
        }

        let result = classify(&query, server, &response);
        debug!(
            %server,
            domain = name,
            rcode = %response.rcode(),
            ok = result.is_ok(),
            "reply classified"
        );
        result
    }

    async fn exchange(
        &self,
        server: SocketAddr,
        protocol: Protocol,
        message: &[u8],
    ) -> Result<Vec<u8>, LookupError> {
        self.transport
            .exchange(server, protocol, message)
            .await
            .map_err(|e| {
                LookupError::TransportFailure(format!(
                    "{protocol} exchange with {server} failed: {e}"
                ))
            })
    }
}

/// Turn a reply into an answer or a classified failure.
///
/// CNAME chains inside the answer section are followed from the queried name.
fn classify(
    query: &Query,
    server: SocketAddr,
    response: &Response,
) -> Result<LookupSuccess, LookupError> {
    match response.rcode() {
        Rcode::NoError => {}
        Rcode::NxDomain => return Err(LookupError::NameNotFound(query.name.clone())),
        rcode @ (Rcode::ServFail | Rcode::Refused) => {
            return Err(LookupError::ServerFailure { server, rcode });
        }
        rcode => {
            return Err(LookupError::Unexpected(format!(
                "server {server} answered with {rcode}"
            )));
        }
    }

    let mut owner = query.name.as_str();

    // At most one alias hop per answer record; CNAME loops end here.
    for _ in 0..=response.answers.len() {
        if let Some(record) = response
            .answers
            .iter()
            .find(|r| r.name == owner && r.record_type() == Some(query.record_type))
        {
            return Ok(LookupSuccess {
                address: record.data.to_string(),
                ttl: record.ttl,
                server,
            });
        }

        let alias = response.answers.iter().find_map(|r| match &r.data {
            RData::Cname(target) if r.name == owner => Some(target.as_str()),
            _ => None,
        });
        match alias {
            Some(target) => owner = target,
            None => break,
        }
    }

    Err(LookupError::NoRecordOfType {
        domain: query.name.clone(),
        record_type: query.record_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::Record;
    use std::net::Ipv4Addr;

    fn server() -> SocketAddr {
        "192.0.2.53:53".parse().unwrap()
    }

    #[test]
    fn classify_returns_first_matching_answer() {
        let query = Query::new(1, "example.com", RecordType::A);
        let response = Response::reply_to(&query, Rcode::NoError)
            .with_answer(Record::a("example.com", Ipv4Addr::new(93, 184, 216, 34), 300))
            .with_answer(Record::a("example.com", Ipv4Addr::new(93, 184, 216, 35), 300));

        let success = classify(&query, server(), &response).unwrap();
        assert_eq!(success.address, "93.184.216.34");
        assert_eq!(success.ttl, 300);
        assert_eq!(success.server, server());
    }

    #[test]
    fn classify_follows_cname_chain() {
        let query = Query::new(1, "www.example.com", RecordType::A);
        let response = Response::reply_to(&query, Rcode::NoError)
            .with_answer(Record::new(
                "www.example.com",
                RecordType::Cname,
                60,
                RData::Cname("edge.example.net".into()),
            ))
            .with_answer(Record::a("edge.example.net", Ipv4Addr::new(198, 51, 100, 7), 20));

        let success = classify(&query, server(), &response).unwrap();
        assert_eq!(success.address, "198.51.100.7");
        assert_eq!(success.ttl, 20);
    }

    #[test]
    fn classify_stops_on_cname_loop() {
        let query = Query::new(1, "a.example.com", RecordType::A);
        let response = Response::reply_to(&query, Rcode::NoError)
            .with_answer(Record::new(
                "a.example.com",
                RecordType::Cname,
                60,
                RData::Cname("b.example.com".into()),
            ))
            .with_answer(Record::new(
                "b.example.com",
                RecordType::Cname,
                60,
                RData::Cname("a.example.com".into()),
            ));

        let err = classify(&query, server(), &response).unwrap_err();
        assert!(matches!(err, LookupError::NoRecordOfType { .. }));
    }

    #[test]
    fn classify_maps_rcodes() {
        let query = Query::new(1, "example.com", RecordType::A);
        let classify_rcode =
            |rcode| classify(&query, server(), &Response::reply_to(&query, rcode)).unwrap_err();

        assert_eq!(
            classify_rcode(Rcode::NxDomain),
            LookupError::NameNotFound("example.com".into())
        );
        assert_eq!(
            classify_rcode(Rcode::ServFail),
            LookupError::ServerFailure {
                server: server(),
                rcode: Rcode::ServFail
            }
        );
        assert!(matches!(
            classify_rcode(Rcode::Refused),
            LookupError::ServerFailure { .. }
        ));
        assert!(matches!(
            classify_rcode(Rcode::NotImp),
            LookupError::Unexpected(text) if text.contains("NOTIMP")
        ));
    }

    #[test]
    fn empty_noerror_is_no_record_of_type() {
        let query = Query::new(1, "example.com", RecordType::Aaaa);
        let response = Response::reply_to(&query, Rcode::NoError);

        assert_eq!(
            classify(&query, server(), &response),
            Err(LookupError::NoRecordOfType {
                domain: "example.com".into(),
                record_type: RecordType::Aaaa,
            })
        );
    }
}
