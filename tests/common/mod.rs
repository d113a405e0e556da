//! Shared test doubles.

#![allow(dead_code)]

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dnstrace::dns::{Query, RData, Rcode, Record, RecordType, Response};
use dnstrace::transport::{DnsTransport, Protocol};

/// What the mock does with one exchange.
pub enum Reply {
    Respond(Response),
    Fail(io::ErrorKind),
    Hang,
}

type Script = Box<dyn Fn(&Query, SocketAddr, Protocol) -> Reply + Send + Sync>;

/// Scripted transport that records every exchange.
pub struct MockTransport {
    script: Script,
    calls: AtomicUsize,
    log: Mutex<Vec<(SocketAddr, Protocol)>>,
}

impl MockTransport {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&Query, SocketAddr, Protocol) -> Reply + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Answer every A query with `addr`.
    pub fn answering(addr: Ipv4Addr, ttl: u32) -> Self {
        Self::new(move |query, _, _| {
            Reply::Respond(
                Response::reply_to(query, Rcode::NoError).with_answer(Record::a(
                    query.name.clone(),
                    addr,
                    ttl,
                )),
            )
        })
    }

    pub fn with_rcode(rcode: Rcode) -> Self {
        Self::new(move |query, _, _| Reply::Respond(Response::reply_to(query, rcode)))
    }

    /// Name exists but only carries an MX record.
    pub fn mx_only() -> Self {
        Self::new(|query, _, _| {
            let mut response = Response::reply_to(query, Rcode::NoError);
            if query.record_type == RecordType::Mx {
                response = response.with_answer(Record::new(
                    query.name.clone(),
                    RecordType::Mx,
                    3600,
                    RData::Mx {
                        preference: 10,
                        exchange: format!("mail.{}", query.name),
                    },
                ));
            }
            Reply::Respond(response)
        })
    }

    pub fn hanging() -> Self {
        Self::new(|_, _, _| Reply::Hang)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<(SocketAddr, Protocol)> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl DnsTransport for MockTransport {
    async fn exchange(
        &self,
        server: SocketAddr,
        protocol: Protocol,
        message: &[u8],
    ) -> io::Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push((server, protocol));

        let query =
            Query::parse(message).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        match (self.script)(&query, server, protocol) {
            Reply::Respond(response) => Ok(response.to_bytes()),
            Reply::Fail(kind) => Err(io::Error::new(kind, "mock transport failure")),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(io::Error::new(io::ErrorKind::TimedOut, "mock hang ended"))
            }
        }
    }
}

pub fn server(n: u8) -> SocketAddr {
    SocketAddr::new(Ipv4Addr::new(192, 0, 2, n).into(), 53)
}
