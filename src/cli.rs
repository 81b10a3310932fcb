//! # CLI Execution Functions
//!
//! Turns parsed arguments into resolved configs, builds the Tokio runtime,
//! and ties SIGINT/SIGTERM to the cancellation token each role shuts down on.

use anyhow::Result;
use metricsrelay::agent::collector::{Collector, HostCollector, RuntimeCollector};
use metricsrelay::agent::sender::HttpSender;
use metricsrelay::agent::{Agent, AgentConfig};
use metricsrelay::server::{self, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{AgentArgs, ServerArgs};

impl From<ServerArgs> for ServerConfig {
    fn from(args: ServerArgs) -> Self {
        ServerConfig {
            address: args.address,
            store_interval: args.store_interval,
            store_file: Some(args.store_file)
                .filter(|f| !f.trim().is_empty())
                .map(PathBuf::from),
            restore: args.restore,
            key: args.key,
            database_url: args.database_dsn.filter(|d| !d.trim().is_empty()),
        }
    }
}

impl From<AgentArgs> for AgentConfig {
    fn from(args: AgentArgs) -> Self {
        AgentConfig {
            address: args.address,
            report_interval: args.report_interval,
            poll_interval: args.poll_interval,
            key: args.key,
            rate_limit: usize::from(args.rate_limit),
            shutdown_grace: args.shutdown_grace,
        }
    }
}

pub fn run_server(args: ServerArgs) -> Result<()> {
    let config = ServerConfig::from(args);
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let cancel = CancellationToken::new();
        tokio::spawn(cancel_on_signal(cancel.clone()));
        server::run(config, cancel).await
    })
}

pub fn run_agent(args: AgentArgs) -> Result<()> {
    let config = AgentConfig::from(args);
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let cancel = CancellationToken::new();
        tokio::spawn(cancel_on_signal(cancel.clone()));

        let sender = Arc::new(HttpSender::new(&config.address)?);
        info!(url = sender.url(), "reporting to server");
        let collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(RuntimeCollector::new()?),
            Box::new(HostCollector::new()),
        ];
        Agent::new(config).run(collectors, sender, cancel).await
    })
}

async fn cancel_on_signal(cancel: CancellationToken) {
    shutdown_signal().await;
    cancel.cancel();
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler, only SIGINT is handled");
                ctrl_c.await.ok();
                info!("received SIGINT, shutting down");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received SIGINT, shutting down");
    }
}
