//! Core data model: payment records, earnings accumulators, usage records
//! and the identifiers that key them.
//!
//! A [`PaymentRecord`] tracks a single payment through its
//! `Pending -> Completed` lifecycle. Completion is terminal: a record never
//! transitions out of [`PaymentStatus::Completed`] and is treated as
//! immutable afterwards, serving as the audit trail for revenue
//! reconciliation.

use std::fmt;
use std::fmt::Display;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::money::UsdAmount;
use crate::revenue::RevenueShareBp;
use crate::timestamp::UnixTimestamp;

fn random_token() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}

/// Opaque unique payment identifier, generated at creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(String);

impl PaymentId {
    pub fn random() -> Self {
        Self(random_token())
    }
}

impl Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PaymentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Unique identifier of a usage (receipt) record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageId(String);

impl UsageId {
    pub fn random() -> Self {
        Self(random_token())
    }
}

impl Display for UsageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The party entitled to a revenue share: a publisher or API owner domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(domain: impl Into<String>) -> Self {
        Self(domain.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identifier under which payment and entitlement state is tracked.
///
/// Two kinds exist: metered upstream API endpoints (`api:<name>/<endpoint>`)
/// and content pages keyed by domain plus content hash
/// (`page:<domain>/<hash>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    Api { name: String, endpoint: String },
    Page { domain: String, hash: String },
}

impl ResourceKey {
    pub fn api(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        ResourceKey::Api {
            name: name.into(),
            endpoint: endpoint.into(),
        }
    }

    pub fn page(domain: impl Into<String>, hash: impl Into<String>) -> Self {
        ResourceKey::Page {
            domain: domain.into(),
            hash: hash.into(),
        }
    }
}

impl Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKey::Api { name, endpoint } => write!(f, "api:{}/{}", name, endpoint),
            ResourceKey::Page { domain, hash } => write!(f, "page:{}/{}", domain, hash),
        }
    }
}

impl Serialize for ResourceKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Lifecycle status of a payment. Transitions only `Pending -> Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
}

/// Decorative page metadata carried on page payment records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMeta {
    pub url: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// A single payment tracked from creation to completion.
///
/// The revenue share is captured at creation time so later splits stay
/// deterministic even if the publisher configuration changes in between.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub resource: ResourceKey,
    pub owner: OwnerId,
    pub amount: UsdAmount,
    pub revenue_share_bp: RevenueShareBp,
    pub status: PaymentStatus,
    pub created_at: UnixTimestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<UnixTimestamp>,
    /// Expiry of the entitlement window. `None` for call-scoped payments.
    /// Anchored at creation time, matching the pricing the payer saw.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<UnixTimestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<PageMeta>,
}

impl PaymentRecord {
    pub fn is_completed(&self) -> bool {
        self.status == PaymentStatus::Completed
    }

    /// Whether this payment grants exactly one future call rather than a
    /// time window.
    pub fn is_call_scoped(&self) -> bool {
        self.expires_at.is_none()
    }
}

/// Running earnings of a resource owner. Created lazily on the first
/// completed payment; both counters are monotonically non-decreasing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EarningsAccumulator {
    pub total_earned: UsdAmount,
    pub payment_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_payment_at: Option<UnixTimestamp>,
}

/// Unique identifier of a debit (balance snapshot) record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DebitId(String);

impl DebitId {
    pub fn random() -> Self {
        Self(random_token())
    }
}

impl Display for DebitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Balance snapshot taken at the moment a payment completes: the amount
/// debited from the payer, keyed by payment. Append-only audit trail,
/// exactly one per completed payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebitRecord {
    pub id: DebitId,
    pub payment_id: PaymentId,
    pub resource: ResourceKey,
    pub amount_debited: UsdAmount,
    pub timestamp: UnixTimestamp,
}

/// Append-only receipt for a successfully served request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    pub id: UsageId,
    /// `None` for free resources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<PaymentId>,
    pub resource: ResourceKey,
    pub method: String,
    pub timestamp: UnixTimestamp,
    pub cost: UsdAmount,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_key_canonical_form() {
        let api = ResourceKey::api("weather", "current");
        assert_eq!(api.to_string(), "api:weather/current");

        let page = ResourceKey::page("example.com", "abc123");
        assert_eq!(page.to_string(), "page:example.com/abc123");
    }

    #[test]
    fn test_payment_ids_are_unique() {
        let a = PaymentId::random();
        let b = PaymentId::random();
        assert_ne!(a, b);
    }

    #[test]
    fn test_call_scoped_detection() {
        let record = PaymentRecord {
            id: PaymentId::random(),
            resource: ResourceKey::api("ml-inference", "predict"),
            owner: OwnerId::new("example-ml.com"),
            amount: UsdAmount::from_micros(10_000),
            revenue_share_bp: RevenueShareBp::default_share(),
            status: PaymentStatus::Pending,
            created_at: UnixTimestamp::from_secs(0),
            completed_at: None,
            expires_at: None,
            page: None,
        };
        assert!(record.is_call_scoped());
        assert!(!record.is_completed());
    }
}
