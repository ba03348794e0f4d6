use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use oroute_core::engine::ProxyEngine;
use oroute_core::notify::WebhookNotifier;
use oroute_core::upstream_client::WreqUpstreamClient;
use oroute_storage::{dsn_for, NoopAuditSink, RecordBus, RecordBusConfig, RecordStorage, SharedAuditSink};

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = cli::Cli::parse();
    let config = oroute_core::config::load(&args.config)?;
    info!(
        event = "config_loaded",
        path = %args.config,
        upstreams = config.upstreams.len()
    );

    if args.list {
        println!("SECRET\tENDPOINT");
        for upstream in &config.upstreams {
            println!("{}\t{}", upstream.secret, upstream.endpoint);
        }
        return Ok(());
    }

    let sink: SharedAuditSink = match dsn_for(&config.dbtype, &config.dbaddr)? {
        Some(dsn) => {
            let storage = RecordStorage::connect(&dsn, args.dblog)
                .await
                .with_context(|| format!("connect {} database", config.dbtype))?;
            storage.sync().await.context("sync database schema")?;
            info!(event = "storage_ready", dbtype = %config.dbtype);
            Arc::new(RecordBus::spawn(storage, RecordBusConfig::default()))
        }
        None => {
            info!(event = "storage_disabled");
            Arc::new(NoopAuditSink)
        }
    };

    let client = Arc::new(WreqUpstreamClient::new().context("build upstream HTTP client")?);
    let notifier = Arc::new(WebhookNotifier::from_env().context("build webhook notifier")?);
    let core = oroute_core::Core::new(
        &config,
        args.noauth,
        ProxyEngine::new(client),
        sink,
        notifier,
    );

    let bind = bind_address(&config.address);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind '{bind}'"))?;
    info!(event = "listening", address = %bind);
    axum::serve(
        listener,
        core.router()
            .into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Accept the Go-style `:8888` shorthand for "every interface".
fn bind_address(address: &str) -> String {
    if let Some(port) = address.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        address.to_string()
    }
}
