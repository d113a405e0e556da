//! Transport layer for DNS exchanges.
//!
//! Provides UDP and TCP exchanges with a single upstream server. The
//! resolver talks to the network only through [`DnsTransport`], so tests can
//! substitute their own implementation.

pub mod tcp;
pub mod udp;

/// Maximum size of a DNS packet (with some headroom).
pub const MAX_DNS_PACKET_SIZE: usize = 4096;

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::net::SocketAddr;

/// Transport protocol identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sends one DNS message to a server and returns its reply.
///
/// Implementations do not apply a deadline; the caller bounds the exchange
/// and drops the future on expiry, which must release any socket.
#[async_trait]
pub trait DnsTransport: Send + Sync {
    async fn exchange(
        &self,
        server: SocketAddr,
        protocol: Protocol,
        message: &[u8],
    ) -> io::Result<Vec<u8>>;
}

/// Transport backed by real tokio sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct SocketTransport;

#[async_trait]
impl DnsTransport for SocketTransport {
    async fn exchange(
        &self,
        server: SocketAddr,
        protocol: Protocol,
        message: &[u8],
    ) -> io::Result<Vec<u8>> {
        match protocol {
            Protocol::Udp => udp::exchange(server, message).await,
            Protocol::Tcp => tcp::exchange(server, message).await,
        }
    }
}
