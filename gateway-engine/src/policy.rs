//! Pluggable security-policy hook.
//!
//! The engine itself carries no language-specific source-pattern security
//! policy — it calls this trait before dispatch and treats a denial as a
//! normal rejection, the same way the original system treats policy as
//! data external to the execution path rather than hardcoded rules.

use crate::types::{ExecuteRequest, Language};

/// Outcome of a policy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny(String),
}

/// Consulted once per `Engine::execute` call, before fingerprinting.
pub trait ExecutionPolicy: Send + Sync {
    fn check(&self, request: &ExecuteRequest) -> PolicyDecision;
}

/// Default policy: every request is allowed. Deployments that need source
/// scanning, per-tenant language allowlists, or size overrides beyond
/// `Config::max_source_bytes` implement `ExecutionPolicy` and pass it to
/// `Engine::new`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl ExecutionPolicy for AllowAll {
    fn check(&self, _request: &ExecuteRequest) -> PolicyDecision {
        PolicyDecision::Allow
    }
}

/// Denies everything for a given language. Mainly useful in tests that
/// exercise the `PolicyRejected` error path without depending on a real
/// source-scanning rule set.
#[derive(Debug, Clone)]
pub struct DenyLanguage(pub Language);

impl ExecutionPolicy for DenyLanguage {
    fn check(&self, request: &ExecuteRequest) -> PolicyDecision {
        if request.language == self.0 {
            PolicyDecision::Deny(format!("{} is disabled by policy", self.0))
        } else {
            PolicyDecision::Allow
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(language: Language) -> ExecuteRequest {
        ExecuteRequest {
            language,
            version: "latest".to_string(),
            source: b"print(1)".to_vec(),
        }
    }

    #[test]
    fn allow_all_allows_everything() {
        let policy = AllowAll;
        assert_eq!(policy.check(&request(Language::Python)), PolicyDecision::Allow);
    }

    #[test]
    fn deny_language_denies_only_that_language() {
        let policy = DenyLanguage(Language::Php);
        assert!(matches!(policy.check(&request(Language::Php)), PolicyDecision::Deny(_)));
        assert_eq!(policy.check(&request(Language::Python)), PolicyDecision::Allow);
    }
}
