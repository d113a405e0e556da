//! Staged resolution traces.
//!
//! A trace wraps one resolver lookup in the classic resolution narrative:
//! local cache check, root servers, TLD servers, authoritative server. The
//! lookup itself goes to a recursive server that walks the hierarchy on our
//! behalf, so the cache, root and TLD stages are simulated reporting stages
//! rather than hops this crate performs.

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tracing::{debug, info};

use crate::config::ResolverConfig;
use crate::dns::RecordType;
use crate::error::{Cancelled, ErrorKind, LookupError};
use crate::resolver::{LookupSuccess, Resolver};
use crate::transport::DnsTransport;

/// One step of the resolution narrative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    LocalCache,
    RootServer,
    #[serde(rename = "TLDServer")]
    TldServer,
    AuthoritativeServer,
    Error,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::LocalCache => "Local DNS Cache",
            Stage::RootServer => "Root DNS Server",
            Stage::TldServer => "Top-Level Domain (TLD) Server",
            Stage::AuthoritativeServer => "Authoritative Name Server",
            Stage::Error => "Error",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StageStatus {
    Checked,
    Queried,
    Resolved,
    Completed,
    Failed,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One entry in a trace's resolution path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub description: String,
    pub status: StageStatus,
    /// Set only on a successful authoritative stage.
    #[serde(rename = "ip_address", skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl StageRecord {
    fn new(stage: Stage, description: impl Into<String>, status: StageStatus) -> Self {
        Self {
            stage,
            description: description.into(),
            status,
            address: None,
        }
    }
}

/// Terminal result of one resolution attempt.
///
/// Either an address with its TTL or an error is present, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionOutcome {
    domain: String,
    record_type: RecordType,
    #[serde(rename = "ip_address", skip_serializing_if = "Option::is_none")]
    address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<u32>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_error_kind"
    )]
    error: Option<LookupError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_detail: Option<String>,
}

impl ResolutionOutcome {
    pub fn success(
        domain: impl Into<String>,
        record_type: RecordType,
        address: String,
        ttl: u32,
    ) -> Self {
        Self {
            domain: domain.into(),
            record_type,
            address: Some(address),
            ttl: Some(ttl),
            error: None,
            error_detail: None,
        }
    }

    pub fn failure(
        domain: impl Into<String>,
        record_type: RecordType,
        error: LookupError,
    ) -> Self {
        Self {
            domain: domain.into(),
            record_type,
            address: None,
            ttl: None,
            error_detail: Some(error.to_string()),
            error: Some(error),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn ttl(&self) -> Option<u32> {
        self.ttl
    }

    pub fn error(&self) -> Option<&LookupError> {
        self.error.as_ref()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(LookupError::kind)
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

fn serialize_error_kind<S: Serializer>(
    error: &Option<LookupError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(error) => error.kind().serialize(serializer),
        None => serializer.serialize_none(),
    }
}

/// Resolution path plus outcome, serialised as the `mapping` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mapping {
    #[serde(flatten)]
    outcome: ResolutionOutcome,
    resolution_path: Vec<StageRecord>,
}

/// Everything a front end needs to present one resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceResult {
    steps: Vec<String>,
    mapping: Mapping,
}

impl TraceResult {
    /// Narrative lines, one per significant event.
    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn stages(&self) -> &[StageRecord] {
        &self.mapping.resolution_path
    }

    pub fn outcome(&self) -> &ResolutionOutcome {
        &self.mapping.outcome
    }
}

/// Renders the mapping as an indented tree followed by the steps.
impl fmt::Display for TraceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = self.outcome();

        writeln!(f, "DNS Resolution for {}", outcome.domain)?;
        writeln!(f, "  Domain Details")?;
        writeln!(f, "    Domain: {}", outcome.domain)?;
        writeln!(f, "    IP Address: {}", outcome.address().unwrap_or("N/A"))?;
        writeln!(f, "    Record Type: {}", outcome.record_type)?;
        if let Some(ttl) = outcome.ttl {
            writeln!(f, "    TTL: {ttl}")?;
        }
        if let Some(error) = &outcome.error {
            writeln!(f, "    Error: {} ({error})", error.kind())?;
        }

        writeln!(f, "  Resolution Path")?;
        for record in self.stages() {
            writeln!(f, "    {}", record.stage)?;
            writeln!(f, "      Description: {}", record.description)?;
            writeln!(f, "      Status: {}", record.status)?;
            if let Some(address) = &record.address {
                writeln!(f, "      IP: {address}")?;
            }
        }

        writeln!(f, "Resolution Steps:")?;
        for step in &self.steps {
            writeln!(f, "  {step}")?;
        }

        Ok(())
    }
}

/// Accumulates one trace. Consumed by its terminal transition, so no stage
/// can be emitted after the trace ends.
struct TraceBuilder {
    domain: String,
    record_type: RecordType,
    stages: Vec<StageRecord>,
    steps: Vec<String>,
}

impl TraceBuilder {
    /// Emit the stages that precede the lookup.
    fn start(domain: &str, record_type: RecordType) -> Self {
        let mut builder = Self {
            domain: domain.to_string(),
            record_type,
            stages: Vec::with_capacity(4),
            steps: Vec::with_capacity(3),
        };

        builder.steps.push("Initiating DNS Resolution".to_string());
        builder.stages.push(StageRecord::new(
            Stage::LocalCache,
            "Checking local system DNS cache",
            StageStatus::Checked,
        ));

        builder.steps.push("Querying DNS Servers".to_string());
        builder.stages.push(StageRecord::new(
            Stage::RootServer,
            "Querying root nameservers",
            StageStatus::Queried,
        ));

        builder
    }

    fn resolved(mut self, success: LookupSuccess) -> TraceResult {
        self.stages.push(StageRecord::new(
            Stage::TldServer,
            "Obtaining domain namespace information",
            StageStatus::Resolved,
        ));
        self.stages.push(StageRecord {
            address: Some(success.address.clone()),
            ..StageRecord::new(
                Stage::AuthoritativeServer,
                "Retrieving specific IP address",
                StageStatus::Completed,
            )
        });
        self.steps.push(format!(
            "Successfully resolved {} to {}",
            self.domain, success.address
        ));

        let outcome =
            ResolutionOutcome::success(self.domain, self.record_type, success.address, success.ttl);
        Self::finish(self.steps, self.stages, outcome)
    }

    fn failed(mut self, error: LookupError) -> TraceResult {
        let (description, step) = describe_failure(&error);
        self.stages
            .push(StageRecord::new(Stage::Error, description, StageStatus::Failed));
        self.steps.push(step);

        let outcome = ResolutionOutcome::failure(self.domain, self.record_type, error);
        Self::finish(self.steps, self.stages, outcome)
    }

    fn finish(
        steps: Vec<String>,
        stages: Vec<StageRecord>,
        outcome: ResolutionOutcome,
    ) -> TraceResult {
        TraceResult {
            steps,
            mapping: Mapping {
                outcome,
                resolution_path: stages,
            },
        }
    }
}

/// Error stage description and narrative line for a failure.
fn describe_failure(error: &LookupError) -> (String, String) {
    match error {
        LookupError::MalformedName(reason) => (
            format!("Domain name is malformed: {reason}"),
            format!("Error: Malformed domain name ({reason})"),
        ),
        LookupError::NameNotFound(_) => (
            "Domain does not exist".to_string(),
            "Error: Domain does not exist".to_string(),
        ),
        LookupError::NoRecordOfType {
            domain,
            record_type,
        } => (
            format!("Domain exists but has no {record_type} records"),
            format!("Error: No {record_type} records found for {domain}"),
        ),
        LookupError::ServerFailure { server, rcode } => (
            format!("DNS server {server} could not answer ({rcode})"),
            format!("Error: DNS server {server} reported a failure ({rcode})"),
        ),
        LookupError::Timeout(timeout) => (
            "No response from DNS servers in time".to_string(),
            format!(
                "Error: DNS query timed out after {} ms",
                timeout.as_millis()
            ),
        ),
        LookupError::TransportFailure(reason) => (
            "Could not reach a DNS server".to_string(),
            format!("Error: Could not reach a DNS server: {reason}"),
        ),
        LookupError::Unexpected(text) => (
            "Unexpected resolution failure".to_string(),
            format!("Unexpected error: {text}"),
        ),
    }
}

/// Produces [`TraceResult`]s for domains.
///
/// Share-nothing per call: concurrent traces need no coordination.
pub struct Tracer {
    resolver: Resolver,
    record_type: RecordType,
    timeout: Duration,
}

impl Tracer {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            resolver: Resolver::new(config.servers),
            record_type: config.record_type,
            timeout: config.timeout,
        }
    }

    /// Create a tracer whose lookups go through `transport`.
    pub fn with_transport(config: ResolverConfig, transport: Arc<dyn DnsTransport>) -> Self {
        Self {
            resolver: Resolver::with_transport(config.servers, transport),
            record_type: config.record_type,
            timeout: config.timeout,
        }
    }

    /// Trace the resolution of `domain`.
    ///
    /// Never fails: lookup errors are part of the returned trace.
    pub async fn trace(&self, domain: &str) -> TraceResult {
        let domain = domain.trim();
        let builder = TraceBuilder::start(domain, self.record_type);

        match self
            .resolver
            .lookup(domain, self.record_type, self.timeout)
            .await
        {
            Ok(success) => {
                info!(domain, address = %success.address, ttl = success.ttl, "resolved");
                builder.resolved(success)
            }
            Err(error) => {
                info!(domain, kind = %error.kind(), %error, "resolution failed");
                builder.failed(error)
            }
        }
    }

    /// Trace `domain` unless `cancel` completes first.
    ///
    /// On cancellation the in-flight lookup is dropped, closing its socket,
    /// and no partial trace is returned.
    pub async fn trace_until<F>(&self, domain: &str, cancel: F) -> Result<TraceResult, Cancelled>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.trace(domain) => Ok(result),
            () = cancel => {
                debug!(domain = domain.trim(), "trace cancelled");
                Err(Cancelled)
            }
        }
    }

    /// Trace `domain` on a private current-thread runtime.
    ///
    /// For synchronous callers; must not be called from within a tokio
    /// runtime.
    pub fn trace_blocking(&self, domain: &str) -> io::Result<TraceResult> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        Ok(rt.block_on(self.trace(domain)))
    }
}
