use oroute_common::Upstream;

use crate::error::ProxyFailure;

/// Apply the upstream's allow then deny model lists. Violations fail the
/// current candidate without consuming the client response slot.
pub fn check_model(upstream: &Upstream, model: &str) -> Result<(), ProxyFailure> {
    if !upstream.allow.is_empty() && !upstream.allow.iter().any(|entry| entry == model) {
        return Err(ProxyFailure::ModelNotAllowed(model.to_string()));
    }
    if upstream.deny.iter().any(|entry| entry == model) {
        return Err(ProxyFailure::ModelDenied(model.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(allow: &[&str], deny: &[&str]) -> Upstream {
        Upstream {
            endpoint: "https://u.example/v1".to_string(),
            secret: "sk".to_string(),
            kind: Default::default(),
            timeout: 120,
            stream_timeout: 10,
            allow: allow.iter().map(|s| s.to_string()).collect(),
            deny: deny.iter().map(|s| s.to_string()).collect(),
            authorization: String::new(),
            keep_header: false,
            noauth: false,
        }
    }

    #[test]
    fn empty_allow_admits_all() {
        assert!(check_model(&upstream(&[], &[]), "gpt-4").is_ok());
    }

    #[test]
    fn allow_list_filters() {
        let up = upstream(&["gpt-4"], &[]);
        assert!(check_model(&up, "gpt-4").is_ok());
        assert!(matches!(
            check_model(&up, "gpt-3.5-turbo"),
            Err(ProxyFailure::ModelNotAllowed(_))
        ));
    }

    #[test]
    fn deny_wins_over_allow() {
        let up = upstream(&["gpt-4"], &["gpt-4"]);
        assert!(matches!(
            check_model(&up, "gpt-4"),
            Err(ProxyFailure::ModelDenied(_))
        ));
    }
}
