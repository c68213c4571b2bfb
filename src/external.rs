//! External collaborators the core depends on through narrow seams.
//!
//! The gateway never interprets what these return; it only needs an owner's
//! revenue share, a yes/no on a credential, and an opaque payload to serve.
//! The bundled implementations are config-backed and mock-valued stand-ins:
//! real certificate validation and real upstream proxying are explicit
//! non-goals, but the seams are where they would plug in.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::revenue::RevenueShareBp;
use crate::types::{OwnerId, ResourceKey};

/// What the owner registry knows about a resource owner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OwnerProfile {
    pub revenue_share_bp: RevenueShareBp,
    pub verified: bool,
}

/// Resolves a resource owner to its revenue share and verification status.
///
/// Unknown or unverified owners still get a profile (with the configured
/// default share): the payment flow never fails on verification status, it
/// only reports it.
pub trait OwnerRegistry: Send + Sync + 'static {
    fn profile(&self, owner: &OwnerId) -> OwnerProfile;
}

/// Checks an owner credential. Pluggable; the bundled implementation is
/// plain string matching against configured certificates.
pub trait Verifier: Send + Sync + 'static {
    fn verify(&self, owner: &OwnerId, credential: &str) -> bool;
}

/// Fetches the payload served once an entitlement is granted.
#[async_trait]
pub trait Upstream: Send + Sync + 'static {
    async fn fetch(&self, resource: &ResourceKey, method: &str) -> Result<Value, UpstreamError>;
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),
}

/// A publisher entry as configured: certificate string, share, verified flag.
#[derive(Debug, Clone)]
pub struct PublisherEntry {
    pub certificate: String,
    pub revenue_share_bp: RevenueShareBp,
    pub verified: bool,
}

/// Owner registry and verifier backed by the static publisher table from
/// configuration.
pub struct StaticOwnerRegistry {
    publishers: HashMap<String, PublisherEntry>,
    default_share_bp: RevenueShareBp,
}

impl StaticOwnerRegistry {
    pub fn new(publishers: HashMap<String, PublisherEntry>, default_share_bp: RevenueShareBp) -> Self {
        Self {
            publishers,
            default_share_bp,
        }
    }
}

impl OwnerRegistry for StaticOwnerRegistry {
    fn profile(&self, owner: &OwnerId) -> OwnerProfile {
        match self.publishers.get(owner.as_str()) {
            Some(entry) => OwnerProfile {
                revenue_share_bp: entry.revenue_share_bp,
                verified: entry.verified,
            },
            None => OwnerProfile {
                revenue_share_bp: self.default_share_bp,
                verified: false,
            },
        }
    }
}

impl Verifier for StaticOwnerRegistry {
    fn verify(&self, owner: &OwnerId, credential: &str) -> bool {
        self.publishers
            .get(owner.as_str())
            .is_some_and(|entry| entry.certificate == credential)
    }
}

/// Canned upstream payloads, standing in for real API proxying.
#[derive(Debug, Default)]
pub struct MockUpstream;

#[async_trait]
impl Upstream for MockUpstream {
    async fn fetch(&self, resource: &ResourceKey, method: &str) -> Result<Value, UpstreamError> {
        let body = match resource {
            ResourceKey::Api { name, endpoint } => match name.as_str() {
                "weather" => json!({
                    "location": "London",
                    "temperature": 22,
                    "description": "Partly cloudy",
                    "humidity": 65,
                }),
                "ml-inference" => json!({
                    "prediction": "positive",
                    "confidence": 0.87,
                    "model_version": "1.2.3",
                    "processing_time_ms": 45,
                }),
                _ => json!({
                    "message": "API response",
                    "api": name,
                    "endpoint": endpoint,
                    "method": method,
                }),
            },
            ResourceKey::Page { domain, hash } => json!({
                "ad_free": true,
                "domain": domain,
                "page_hash": hash,
            }),
        };
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> StaticOwnerRegistry {
        let mut publishers = HashMap::new();
        publishers.insert(
            "example.com".to_string(),
            PublisherEntry {
                certificate: "mock_cert_example_com".to_string(),
                revenue_share_bp: RevenueShareBp::new(8_500).unwrap(),
                verified: true,
            },
        );
        StaticOwnerRegistry::new(publishers, RevenueShareBp::new(7_000).unwrap())
    }

    #[test]
    fn test_known_owner_profile() {
        let registry = registry();
        let profile = registry.profile(&OwnerId::new("example.com"));
        assert!(profile.verified);
        assert_eq!(profile.revenue_share_bp.as_u16(), 8_500);
    }

    #[test]
    fn test_unknown_owner_gets_default_share_unverified() {
        let registry = registry();
        let profile = registry.profile(&OwnerId::new("nowhere.example"));
        assert!(!profile.verified);
        assert_eq!(profile.revenue_share_bp.as_u16(), 7_000);
    }

    #[test]
    fn test_certificate_string_matching() {
        let registry = registry();
        let owner = OwnerId::new("example.com");
        assert!(registry.verify(&owner, "mock_cert_example_com"));
        assert!(!registry.verify(&owner, "wrong"));
        assert!(!registry.verify(&OwnerId::new("nowhere.example"), "anything"));
    }

    #[tokio::test]
    async fn test_mock_upstream_serves_page_and_api() {
        let upstream = MockUpstream;
        let api = upstream
            .fetch(&ResourceKey::api("weather", "current"), "GET")
            .await
            .unwrap();
        assert_eq!(api["location"], "London");

        let page = upstream
            .fetch(&ResourceKey::page("example.com", "abc"), "POST")
            .await
            .unwrap();
        assert_eq!(page["ad_free"], true);
    }
}
