//! End-to-end traces against loopback mock upstreams.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use dnstrace::dns::{Query, Rcode, Record, Response};
use dnstrace::transport::MAX_DNS_PACKET_SIZE;
use dnstrace::transport::tcp::{read_dns_message, write_dns_message};
use dnstrace::{ErrorKind, ResolverConfig, Tracer};
use tokio::net::{TcpListener, UdpSocket};

fn answer(query: &Query, addr: Ipv4Addr, ttl: u32) -> Response {
    Response::reply_to(query, Rcode::NoError).with_answer(Record::a(query.name.clone(), addr, ttl))
}

/// UDP upstream that answers every query with `reply`.
async fn spawn_udp_upstream<F>(reply: F) -> SocketAddr
where
    F: Fn(&Query) -> Response + Send + 'static,
{
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; MAX_DNS_PACKET_SIZE];
        loop {
            let Ok((len, src)) = socket.recv_from(&mut buf).await else {
                return;
            };
            let Ok(query) = Query::parse(&buf[..len]) else {
                continue;
            };
            let _ = socket.send_to(&reply(&query).to_bytes(), src).await;
        }
    });

    addr
}

/// TCP upstream serving `listener`, answering with `reply`.
async fn spawn_tcp_upstream<F>(listener: TcpListener, reply: F)
where
    F: Fn(&Query) -> Response + Send + Sync + Clone + 'static,
{
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let reply = reply.clone();
            tokio::spawn(async move {
                let Ok(message) = read_dns_message(&mut stream).await else {
                    return;
                };
                let Ok(query) = Query::parse(&message) else {
                    return;
                };
                let _ = write_dns_message(&mut stream, &reply(&query).to_bytes()).await;
            });
        }
    });
}

fn tracer_for(server: SocketAddr, timeout: Duration) -> Tracer {
    Tracer::new(ResolverConfig {
        timeout,
        ..ResolverConfig::with_servers(vec![server])
    })
}

#[tokio::test]
async fn resolves_over_udp() {
    let server = spawn_udp_upstream(|q| answer(q, Ipv4Addr::new(93, 184, 216, 34), 300)).await;

    let result = tracer_for(server, Duration::from_secs(2))
        .trace("example.com")
        .await;

    assert_eq!(result.outcome().address(), Some("93.184.216.34"));
    assert_eq!(result.outcome().ttl(), Some(300));
    assert_eq!(result.stages().len(), 4);
}

#[tokio::test]
async fn nxdomain_over_udp() {
    let server = spawn_udp_upstream(|q| Response::reply_to(q, Rcode::NxDomain)).await;

    let result = tracer_for(server, Duration::from_secs(2))
        .trace("this-domain-does-not-exist-xyz.invalid")
        .await;

    assert_eq!(result.outcome().error_kind(), Some(ErrorKind::NameNotFound));
    assert_eq!(result.stages().len(), 3);
}

#[tokio::test]
async fn truncated_udp_falls_back_to_tcp_on_same_port() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    // Bind UDP on the port the TCP listener got.
    let udp = UdpSocket::bind(("127.0.0.1", port)).await.unwrap();
    let server = udp.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; MAX_DNS_PACKET_SIZE];
        while let Ok((len, src)) = udp.recv_from(&mut buf).await {
            if let Ok(query) = Query::parse(&buf[..len]) {
                let truncated = Response::reply_to(&query, Rcode::NoError).truncated();
                let _ = udp.send_to(&truncated.to_bytes(), src).await;
            }
        }
    });
    spawn_tcp_upstream(listener, |q| answer(q, Ipv4Addr::new(203, 0, 113, 77), 600)).await;

    let result = tracer_for(server, Duration::from_secs(2))
        .trace("large.example.com")
        .await;

    assert_eq!(result.outcome().address(), Some("203.0.113.77"));
    assert_eq!(result.outcome().ttl(), Some(600));
    assert_eq!(result.stages().len(), 4);
    assert_eq!(result.steps().len(), 3);
}

#[tokio::test]
async fn silent_server_times_out() {
    // Bound but never answers.
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server = silent.local_addr().unwrap();
    let timeout = Duration::from_millis(150);

    let started = std::time::Instant::now();
    let result = tracer_for(server, timeout).trace("example.com").await;

    assert_eq!(result.outcome().error_kind(), Some(ErrorKind::Timeout));
    assert!(started.elapsed() < timeout + Duration::from_millis(500));
    drop(silent);
}
