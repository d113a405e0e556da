//! UDP transport for DNS queries.
//!
//! Each exchange uses a fresh ephemeral socket connected to the server, so
//! only datagrams from that server are seen and an ICMP port-unreachable
//! surfaces as a receive error. Replies are matched by their 16-bit query ID.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;
use tracing::debug;

use crate::dns::{HEADER_LEN, message_id};

use super::MAX_DNS_PACKET_SIZE;

/// Send `query` to `server` and wait for the reply carrying the same ID.
///
/// Datagrams that are too short or carry another ID are dropped. Waits
/// until a matching reply arrives or the socket fails.
pub async fn exchange(server: SocketAddr, query: &[u8]) -> io::Result<Vec<u8>> {
    let query_id = message_id(query)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "DNS query too short"))?;

    let bind_addr: SocketAddr = if server.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };

    let socket = UdpSocket::bind(bind_addr).await?;
    socket.connect(server).await?;
    socket.send(query).await?;
    debug!(%server, bytes = query.len(), "UDP query sent");

    let mut buf = vec![0u8; MAX_DNS_PACKET_SIZE];

    loop {
        let len = socket.recv(&mut buf).await?;

        if len < HEADER_LEN {
            debug!(%server, len, "dropping runt UDP datagram");
            continue;
        }

        if message_id(&buf[..len]) != Some(query_id) {
            debug!(%server, "dropping UDP reply with mismatched ID");
            continue;
        }

        buf.truncate(len);
        debug!(%server, bytes = len, "UDP response received");

        return Ok(buf);
    }
}
