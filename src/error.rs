//! Classified lookup failures.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::dns::{Rcode, RecordType};

/// Why a lookup failed.
///
/// Every variant maps to exactly one [`ErrorKind`]; the `Display` text is the
/// diagnostic shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("malformed domain name: {0}")]
    MalformedName(String),

    #[error("domain {0} does not exist")]
    NameNotFound(String),

    #[error("no {record_type} records found for {domain}")]
    NoRecordOfType {
        domain: String,
        record_type: RecordType,
    },

    #[error("DNS server {server} reported a failure ({rcode})")]
    ServerFailure { server: SocketAddr, rcode: Rcode },

    #[error("no response within {} ms", .0.as_millis())]
    Timeout(Duration),

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("{0}")]
    Unexpected(String),
}

impl LookupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LookupError::MalformedName(_) => ErrorKind::MalformedName,
            LookupError::NameNotFound(_) => ErrorKind::NameNotFound,
            LookupError::NoRecordOfType { .. } => ErrorKind::NoRecordOfType,
            LookupError::ServerFailure { .. } => ErrorKind::ServerFailure,
            LookupError::Timeout(_) => ErrorKind::Timeout,
            LookupError::TransportFailure(_) => ErrorKind::TransportFailure,
            LookupError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }
}

/// Field-less error classification, for callers that branch on the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    MalformedName,
    NameNotFound,
    NoRecordOfType,
    ServerFailure,
    Timeout,
    TransportFailure,
    Unexpected,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::MalformedName => "MalformedName",
            ErrorKind::NameNotFound => "NameNotFound",
            ErrorKind::NoRecordOfType => "NoRecordOfType",
            ErrorKind::ServerFailure => "ServerFailure",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::TransportFailure => "TransportFailure",
            ErrorKind::Unexpected => "Unexpected",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caller abandoned a trace before it completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("resolution cancelled")]
pub struct Cancelled;
