pub mod auth;
pub mod config;
pub mod core;
pub mod cors;
pub mod engine;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod notify;
pub mod policy;
pub mod recorder;
pub mod registry;
pub mod upstream_client;

#[cfg(test)]
mod testutil;

pub use self::core::{Core, CoreState};
pub use engine::{ProxyEngine, ProxyOutcome, RequestContext};
pub use error::ProxyFailure;
pub use registry::UpstreamRegistry;
