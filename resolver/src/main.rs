// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use prometheus::{Encoder, TextEncoder};
use resolver::config::ResolverNodeConfig;
use resolver::node::run_resolver_node;
use resolver_config::Config;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(name = "resolver-node", rename_all = "kebab-case")]
struct Args {
    /// Path to the node config, YAML or JSON.
    #[clap(long, short)]
    config_path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ResolverNodeConfig::load(&args.config_path)?;
    let metrics_port = config.metrics_port;

    let prometheus_registry = prometheus::Registry::new();
    tokio::spawn(serve_metrics(prometheus_registry.clone(), metrics_port));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("[Node] interrupt received, shutting down");
                cancel.cancel();
            }
        });
    }

    let handle = run_resolver_node(config, &prometheus_registry, cancel).await?;
    handle.await??;
    Ok(())
}

/// Minimal scrape endpoint: every request gets the full text exposition.
async fn serve_metrics(registry: prometheus::Registry, port: u16) {
    let listener = match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("[Node] metrics port {port} unavailable: {e}");
            return;
        }
    };
    info!("[Node] serving metrics on port {port}");
    loop {
        let Ok((mut socket, _)) = listener.accept().await else {
            continue;
        };
        let mut body = Vec::new();
        if TextEncoder::new().encode(&registry.gather(), &mut body).is_err() {
            continue;
        }
        let header = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: {}\r\ncontent-length: {}\r\n\r\n",
            prometheus::TEXT_FORMAT,
            body.len()
        );
        let _ = socket.write_all(header.as_bytes()).await;
        let _ = socket.write_all(&body).await;
        let _ = socket.shutdown().await;
    }
}
