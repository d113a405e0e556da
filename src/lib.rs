//! dnstrace - traces the staged resolution of domain names.
//!
//! [`Tracer::trace`] resolves one domain and returns a [`TraceResult`]: the
//! ordered resolution stages, a narrative for display, and the final address
//! or a classified [`LookupError`]. The library has no process-wide state, so
//! any front end can call it concurrently.

pub mod config;
pub mod dns;
pub mod error;
pub mod name;
pub mod resolver;
pub mod trace;
pub mod transport;

pub use config::ResolverConfig;
pub use dns::RecordType;
pub use error::{Cancelled, ErrorKind, LookupError};
pub use resolver::{LookupSuccess, Resolver};
pub use trace::{ResolutionOutcome, Stage, StageRecord, StageStatus, TraceResult, Tracer};
