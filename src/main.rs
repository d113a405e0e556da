use clap::Parser;
use futures::future::join_all;
use std::io::{self, Write};
use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use dnstrace::{RecordType, ResolverConfig, Tracer};

#[derive(Parser)]
#[command(name = "dnstrace")]
#[command(about = "Trace the staged resolution of domain names", long_about = None)]
struct Args {
    /// Domains to resolve
    #[arg(required = true)]
    domains: Vec<String>,

    /// DNS server to query (ip or ip:port), repeat for failover [default: /etc/resolv.conf]
    #[arg(short, long = "server", value_parser = parse_server)]
    servers: Vec<SocketAddr>,

    /// Lookup timeout in milliseconds
    #[arg(short, long, default_value = "5000")]
    timeout_ms: u64,

    /// Record type to look up
    #[arg(short, long, default_value = "A")]
    record_type: RecordType,

    /// Print each trace as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_server(s: &str) -> Result<SocketAddr, String> {
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Ok(addr);
    }
    s.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, 53))
        .map_err(|_| format!("invalid DNS server address '{s}'"))
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "dnstrace=debug" } else { "dnstrace=warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Trace every domain concurrently and print the results in argument order.
///
/// Returns whether every domain resolved.
async fn run(args: Args) -> io::Result<bool> {
    let mut config = if args.servers.is_empty() {
        ResolverConfig::from_system()
    } else {
        ResolverConfig::with_servers(args.servers)
    };
    config.timeout = Duration::from_millis(args.timeout_ms);
    config.record_type = args.record_type;

    let tracer = Tracer::new(config);
    let results = join_all(args.domains.iter().map(|domain| tracer.trace(domain))).await;

    let mut stdout = io::stdout().lock();
    for result in &results {
        if args.json {
            serde_json::to_writer_pretty(&mut stdout, result)?;
            writeln!(stdout)?;
        } else {
            writeln!(stdout, "{result}")?;
        }
    }

    Ok(results.iter().all(|r| r.outcome().is_success()))
}

fn main() -> io::Result<ExitCode> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    if rt.block_on(run(args))? {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
