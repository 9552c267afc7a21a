//! SSE relay server - main entry point.
//!
//! Serves the downstream event-stream routes and relays each session to the
//! configured backend.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sse_relay::http::RelayServer;
use sse_relay::types::parse_duration;
use sse_relay::Config;

#[derive(Debug, Parser)]
#[command(name = "sse-relay", version, about = "Streaming event relay")]
struct Args {
    /// JSON config file.
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Downstream bind address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Backend base URL (overrides config).
    #[arg(long)]
    upstream: Option<String>,

    /// Connect budget, e.g. "60s" (overrides config).
    #[arg(long, value_parser = parse_timeout)]
    connect_timeout: Option<Duration>,
}

fn parse_timeout(raw: &str) -> Result<Duration, String> {
    parse_duration(raw).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    if let Some(upstream) = args.upstream {
        config.upstream.base_url = upstream.trim_end_matches('/').to_string();
    }
    if let Some(timeout) = args.connect_timeout {
        config.upstream.connect_timeout = timeout;
    }

    // Initialize observability
    sse_relay::observability::init_tracing_with(&config.observability);

    let server = Arc::new(RelayServer::new(config)?);

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received");
            signal_server.shutdown();
        }
    });

    server.serve().await?;
    Ok(())
}
