use anyhow::Context;
use tracing::info;

use oroute_common::{
    ConfigError, GatewayConfig, UpstreamKind, DEFAULT_ADDRESS, DEFAULT_DB_ADDR, DEFAULT_DB_TYPE,
    DEFAULT_STREAM_TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS,
};

/// Load and normalize the gateway config. Any validation failure here is
/// fatal for the process.
pub fn load(path: &str) -> anyhow::Result<GatewayConfig> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("read config file '{path}'"))?;
    let mut config: GatewayConfig =
        serde_yaml::from_str(&data).with_context(|| format!("parse config file '{path}'"))?;
    apply_defaults(&mut config);
    validate(&config)?;
    Ok(config)
}

fn apply_defaults(config: &mut GatewayConfig) {
    if config.address.is_empty() {
        info!(event = "config_default", field = "address", value = DEFAULT_ADDRESS);
        config.address = DEFAULT_ADDRESS.to_string();
    }
    if config.dbtype.is_empty() {
        info!(event = "config_default", field = "dbtype", value = DEFAULT_DB_TYPE);
        config.dbtype = DEFAULT_DB_TYPE.to_string();
    }
    if config.dbaddr.is_empty() {
        info!(event = "config_default", field = "dbaddr", value = DEFAULT_DB_ADDR);
        config.dbaddr = DEFAULT_DB_ADDR.to_string();
    }
    if config.timeout == 0 {
        config.timeout = DEFAULT_TIMEOUT_SECS;
    }
    if config.stream_timeout == 0 {
        config.stream_timeout = DEFAULT_STREAM_TIMEOUT_SECS;
    }

    for upstream in &mut config.upstreams {
        // A noauth upstream must not inherit the global token list, or it
        // would start rejecting anonymous callers.
        if upstream.authorization.is_empty() && !upstream.noauth {
            upstream.authorization = config.authorization.clone();
        }
        if upstream.timeout == 0 {
            upstream.timeout = config.timeout;
        }
        if upstream.stream_timeout == 0 {
            upstream.stream_timeout = config.stream_timeout;
        }
    }
}

fn validate(config: &GatewayConfig) -> Result<(), ConfigError> {
    if !matches!(config.dbtype.as_str(), "sqlite" | "postgres" | "none") {
        return Err(ConfigError::UnknownDbType(config.dbtype.clone()));
    }

    for upstream in &config.upstreams {
        let uri: http::Uri =
            upstream
                .endpoint
                .parse()
                .map_err(|err| ConfigError::InvalidEndpoint {
                    endpoint: upstream.endpoint.clone(),
                    reason: format!("{err}"),
                })?;
        if uri.scheme_str().is_none() || uri.authority().is_none() {
            return Err(ConfigError::InvalidEndpoint {
                endpoint: upstream.endpoint.clone(),
                reason: "endpoint must be an absolute URL".to_string(),
            });
        }
        if upstream.kind == UpstreamKind::Replicate && upstream.secret.is_empty() {
            return Err(ConfigError::MissingSecret(upstream.endpoint.clone()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oroute_common::LbPolicy;

    fn parse(yaml: &str) -> GatewayConfig {
        let mut config: GatewayConfig = serde_yaml::from_str(yaml).unwrap();
        apply_defaults(&mut config);
        config
    }

    #[test]
    fn fills_global_defaults() {
        let config = parse("upstreams: []");
        assert_eq!(config.address, ":8888");
        assert_eq!(config.timeout, 120);
        assert_eq!(config.stream_timeout, 10);
        assert_eq!(config.dbtype, "sqlite");
        assert_eq!(config.lb_policy, LbPolicy::Order);
    }

    #[test]
    fn upstreams_inherit_authorization_and_timeouts() {
        let config = parse(
            r#"
authorization: "tok-a,tok-b"
timeout: 30
upstreams:
  - endpoint: https://a.example/v1
    secret: sk-a
  - endpoint: https://b.example/v1
    secret: sk-b
    authorization: "tok-c"
    timeout: 5
  - endpoint: https://c.example/v1
    secret: sk-c
    noauth: true
"#,
        );
        assert_eq!(config.upstreams[0].authorization, "tok-a,tok-b");
        assert_eq!(config.upstreams[0].timeout, 30);
        assert_eq!(config.upstreams[0].stream_timeout, 10);
        assert_eq!(config.upstreams[1].authorization, "tok-c");
        assert_eq!(config.upstreams[1].timeout, 5);
        // noauth upstreams never inherit the global token list
        assert_eq!(config.upstreams[2].authorization, "");
    }

    #[test]
    fn rejects_bad_endpoint() {
        let config = parse(
            r#"
upstreams:
  - endpoint: "not a url"
    secret: sk
"#,
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_replicate_without_secret() {
        let config = parse(
            r#"
upstreams:
  - endpoint: https://api.replicate.com
    type: replicate
"#,
        );
        assert!(matches!(
            validate(&config),
            Err(ConfigError::MissingSecret(_))
        ));
    }

    #[test]
    fn rejects_unknown_dbtype() {
        let config = parse("dbtype: oracle\nupstreams: []");
        assert!(matches!(
            validate(&config),
            Err(ConfigError::UnknownDbType(_))
        ));
    }

    #[test]
    fn parses_lb_policy_random() {
        let config = parse("lb_policy: random\nupstreams: []");
        assert_eq!(config.lb_policy, LbPolicy::Random);
    }
}
