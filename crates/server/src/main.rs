//! shellcache server entry point.
//!
//! Boots the worker (install, then activation when waiting is skipped) and
//! serves its triggers as MCP tools on stdio.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use shellcache_client::Worker;
use shellcache_core::{AppConfig, CacheDb};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(generation = %config.generation, db_path = %config.db_path.display(), "starting shellcache on stdio transport");

    let db = CacheDb::open(&config.db_path).await?;
    let worker = Arc::new(Worker::from_config(&config, db)?);

    let mut messages = worker.subscribe();
    tokio::spawn(async move {
        loop {
            match messages.recv().await {
                Ok(message) => tracing::info!(?message, "client message"),
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "client messages dropped"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    match worker.start().await? {
        Some(report) => tracing::info!(generation = %report.generation, deleted = ?report.deleted, "generation active"),
        None => tracing::info!(generation = %config.generation, "generation installed; waiting for SKIP_WAITING"),
    }

    let handler = handler::ShellcacheServer::new(worker.clone());
    let server = serve_server(handler, stdio()).await?;
    server.waiting().await?;

    worker.settle().await;
    tracing::info!("background tasks settled; exiting");

    Ok(())
}
