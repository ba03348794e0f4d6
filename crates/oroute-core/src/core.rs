use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use prometheus_client::registry::Registry;

use oroute_common::GatewayConfig;
use oroute_storage::SharedAuditSink;

use crate::engine::ProxyEngine;
use crate::handler::{metrics_handler, preflight_handler, proxy_handler};
use crate::metrics::Metrics;
use crate::notify::Notifier;
use crate::registry::UpstreamRegistry;

pub struct CoreState {
    pub registry: UpstreamRegistry,
    pub engine: ProxyEngine,
    pub sink: SharedAuditSink,
    pub notifier: Arc<dyn Notifier>,
    pub metrics: Metrics,
    pub metrics_registry: Registry,
    pub hostname: String,
}

pub struct Core {
    state: Arc<CoreState>,
}

impl Core {
    pub fn new(
        config: &GatewayConfig,
        global_noauth: bool,
        engine: ProxyEngine,
        sink: SharedAuditSink,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let mut metrics_registry = Registry::with_prefix("oroute");
        let metrics = Metrics::new(&mut metrics_registry);
        let hostname = if config.hostname.is_empty() {
            std::env::var("HOSTNAME").unwrap_or_default()
        } else {
            config.hostname.clone()
        };

        Self {
            state: Arc::new(CoreState {
                registry: UpstreamRegistry::new(config, global_noauth),
                engine,
                sink,
                notifier,
                metrics,
                metrics_registry,
                hostname,
            }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/v1/metrics", get(metrics_handler))
            .route(
                "/v1/{*path}",
                post(proxy_handler).options(preflight_handler),
            )
            .with_state(self.state.clone())
    }

    pub fn state(&self) -> Arc<CoreState> {
        self.state.clone()
    }
}
