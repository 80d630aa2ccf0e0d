//! locurlfwd - Main entry point
//!
//! Forwards requests on one local port to several upstreams, chosen by the
//! first path segment.

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use locurlfwd::{build_client, DestinationTable, ProxyConfig, ProxyEngine, ProxyServer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// locurlfwd - forward one local port to several upstreams
#[derive(Parser, Debug)]
#[command(name = "locurlfwd")]
#[command(version)]
#[command(about = "Forward one local port to several upstreams by first path segment")]
#[command(after_help = "Example: locurlfwd 8000 -d http://localhost:3000 -d api^http://localhost:5000")]
struct Args {
    /// Source port to listen on
    port: u16,

    /// Destination: URL (default), prefix=URL (keep prefix) or prefix^URL (strip prefix)
    #[arg(short = 'd', long = "destination", value_name = "SPEC")]
    destinations: Vec<String>,

    /// Upstream timeout in seconds; unbounded when unset
    #[arg(long, env = "UPSTREAM_TIMEOUT", value_name = "SECS")]
    timeout: Option<u64>,

    /// Largest accepted request body in bytes
    #[arg(long, env = "MAX_REQUEST_SIZE", default_value = "10485760")]
    max_request_size: usize,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let table = match DestinationTable::build(args.port, &args.destinations) {
        Ok(table) => table,
        Err(e) => Args::command()
            .error(
                ErrorKind::ValueValidation,
                format!("{}\nExample: -d http://localhost:3000 -d api=http://localhost:5000", e),
            )
            .exit(),
    };

    let config = ProxyConfig {
        port: args.port,
        upstream_timeout: args.timeout.map(Duration::from_secs),
        max_request_size: args.max_request_size,
    };

    let engine = ProxyEngine::new(table, build_client());
    let server = Arc::new(ProxyServer::new(config, engine));

    info!("locurlfwd started on port {}", args.port);

    server.run().await?;

    Ok(())
}
