//! # Main — CLI Entry Point
//!
//! One binary, two roles:
//!
//! - `server`: accept metrics over HTTP and store them in memory, a snapshot
//!   file, or PostgreSQL.
//! - `agent`: sample this process and the host, then ship signed batches to
//!   a server.
//!
//! Every flag has an environment variable fallback; a `.env` file in the
//! working directory is loaded first. Intervals accept `10s`/`1m`-style
//! durations or bare seconds.
//!
//! Logging: `LOG_FORMAT=json` for structured output, human-readable on stderr
//! otherwise. `RUST_LOG` sets the filter (default `info`).

mod cli;

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use metricsrelay::{parse_interval, parse_period};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "metricsrelay", about = "Collect, sign and store runtime metrics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the metrics server
    Server(ServerArgs),
    /// Run the collection agent
    Agent(AgentArgs),
}

#[derive(Args, Debug)]
struct ServerArgs {
    /// Listen address (host:port)
    #[arg(short = 'a', long, env = "ADDRESS", default_value = "localhost:8080")]
    address: String,

    /// Snapshot interval; 0 writes the snapshot on every update
    #[arg(short = 'i', long, env = "STORE_INTERVAL", default_value = "300s", value_parser = parse_interval)]
    store_interval: Duration,

    /// Snapshot file path; empty disables file persistence
    #[arg(short = 'f', long, env = "STORE_FILE", default_value = "tmp/devops-metrics-db.json")]
    store_file: String,

    /// Load the snapshot file at startup
    #[arg(short = 'r', long, env = "RESTORE", default_value_t = true, action = ArgAction::Set)]
    restore: bool,

    /// Shared secret for metric checksums; empty disables them
    #[arg(short = 'k', long, env = "KEY", default_value = "", hide_env_values = true)]
    key: String,

    /// PostgreSQL connection URL; takes precedence over the snapshot file
    #[arg(short = 'd', long = "database-dsn", env = "DATABASE_DSN", hide_env_values = true)]
    database_dsn: Option<String>,
}

#[derive(Args, Debug)]
struct AgentArgs {
    /// Server address (host:port or URL)
    #[arg(short = 'a', long, env = "ADDRESS", default_value = "localhost:8080")]
    address: String,

    /// How often a batch is reported
    #[arg(short = 'r', long, env = "REPORT_INTERVAL", default_value = "10s", value_parser = parse_period)]
    report_interval: Duration,

    /// How often the collectors sample
    #[arg(short = 'p', long, env = "POLL_INTERVAL", default_value = "2s", value_parser = parse_period)]
    poll_interval: Duration,

    /// Shared secret for metric checksums; empty disables them
    #[arg(short = 'k', long, env = "KEY", default_value = "", hide_env_values = true)]
    key: String,

    /// Concurrent senders and queued batches
    #[arg(short = 'l', long, env = "RATE_LIMIT", default_value_t = 3, value_parser = clap::value_parser!(u16).range(1..))]
    rate_limit: u16,

    /// How long in-flight sends may drain after shutdown is requested
    #[arg(long, default_value = "5s", value_parser = parse_interval)]
    shutdown_grace: Duration,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_logging();

    let cli = Cli::parse();
    match cli.command {
        Commands::Server(args) => cli::run_server(args),
        Commands::Agent(args) => cli::run_agent(args),
    }
}
