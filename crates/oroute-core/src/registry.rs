use rand::seq::SliceRandom;

use oroute_common::{GatewayConfig, LbPolicy, Upstream, SINGLE_CANDIDATE_TIMEOUT_SECS};

use crate::auth::check_auth;

/// Immutable snapshot of the configured upstreams, consulted once per
/// request to build the failover candidate list.
#[derive(Debug)]
pub struct UpstreamRegistry {
    upstreams: Vec<Upstream>,
    policy: LbPolicy,
    global_noauth: bool,
}

impl UpstreamRegistry {
    pub fn new(config: &GatewayConfig, global_noauth: bool) -> Self {
        Self {
            upstreams: config.upstreams.clone(),
            policy: config.lb_policy,
            global_noauth,
        }
    }

    /// Ordered candidate list for one request: every upstream the caller's
    /// token is admitted to, permuted under the `random` policy. A lone
    /// candidate gets its timeout stretched to the longest-try value.
    pub fn candidates(&self, token: &str) -> Vec<Upstream> {
        let mut out: Vec<Upstream> = self
            .upstreams
            .iter()
            .filter(|upstream| {
                self.global_noauth
                    || upstream.noauth
                    || check_auth(token, &upstream.authorization)
            })
            .cloned()
            .collect();

        if self.policy == LbPolicy::Random {
            out.shuffle(&mut rand::rng());
        }
        if let [only] = out.as_mut_slice() {
            only.timeout = SINGLE_CANDIDATE_TIMEOUT_SECS;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oroute_common::UpstreamKind;

    fn upstream(endpoint: &str, authorization: &str, noauth: bool) -> Upstream {
        Upstream {
            endpoint: endpoint.to_string(),
            secret: "sk".to_string(),
            kind: UpstreamKind::OpenAI,
            timeout: 7,
            stream_timeout: 10,
            allow: Vec::new(),
            deny: Vec::new(),
            authorization: authorization.to_string(),
            keep_header: false,
            noauth,
        }
    }

    fn registry(upstreams: Vec<Upstream>, policy: LbPolicy, global_noauth: bool) -> UpstreamRegistry {
        let config = GatewayConfig {
            upstreams,
            lb_policy: policy,
            ..Default::default()
        };
        UpstreamRegistry::new(&config, global_noauth)
    }

    #[test]
    fn filters_by_token() {
        let registry = registry(
            vec![
                upstream("https://a.example", "tok-a", false),
                upstream("https://b.example", "tok-b", false),
            ],
            LbPolicy::Order,
            false,
        );
        let candidates = registry.candidates("tok-b");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].endpoint, "https://b.example");
    }

    #[test]
    fn noauth_upstream_admits_anonymous_callers() {
        let registry = registry(
            vec![
                upstream("https://a.example", "tok-a", false),
                upstream("https://b.example", "", true),
            ],
            LbPolicy::Order,
            false,
        );
        let candidates = registry.candidates("");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].endpoint, "https://b.example");
    }

    #[test]
    fn global_noauth_admits_everything() {
        let registry = registry(
            vec![
                upstream("https://a.example", "tok-a", false),
                upstream("https://b.example", "tok-b", false),
            ],
            LbPolicy::Order,
            true,
        );
        assert_eq!(registry.candidates("").len(), 2);
    }

    #[test]
    fn preserves_config_order() {
        let registry = registry(
            vec![
                upstream("https://a.example", "tok", false),
                upstream("https://b.example", "tok", false),
                upstream("https://c.example", "tok", false),
            ],
            LbPolicy::Order,
            false,
        );
        let endpoints: Vec<String> = registry
            .candidates("tok")
            .into_iter()
            .map(|u| u.endpoint)
            .collect();
        assert_eq!(
            endpoints,
            ["https://a.example", "https://b.example", "https://c.example"]
        );
    }

    #[test]
    fn random_policy_keeps_the_same_set() {
        let registry = registry(
            vec![
                upstream("https://a.example", "tok", false),
                upstream("https://b.example", "tok", false),
                upstream("https://c.example", "tok", false),
            ],
            LbPolicy::Random,
            false,
        );
        let mut endpoints: Vec<String> = registry
            .candidates("tok")
            .into_iter()
            .map(|u| u.endpoint)
            .collect();
        endpoints.sort();
        assert_eq!(
            endpoints,
            ["https://a.example", "https://b.example", "https://c.example"]
        );
    }

    #[test]
    fn lone_candidate_gets_long_timeout() {
        let registry = registry(
            vec![upstream("https://a.example", "tok", false)],
            LbPolicy::Order,
            false,
        );
        let candidates = registry.candidates("tok");
        assert_eq!(candidates[0].timeout, SINGLE_CANDIDATE_TIMEOUT_SECS);
    }
}
