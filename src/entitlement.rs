//! Entitlement resolution: does a resource key already carry an unexpired
//! grant?
//!
//! Two grant shapes exist. Time-boxed grants come from payments with an
//! `expires_at` and hold until that instant. Call-scoped grants come from
//! payments without one and are **single-use**: serving the resource
//! consumes the grant, and re-presenting the same payment id afterwards does
//! not grant again. (The dispatcher performs the consumption; the resolver
//! only reports what is currently live.)

use std::sync::Arc;

use serde::Serialize;

use crate::ledger::Ledger;
use crate::timestamp::UnixTimestamp;
use crate::types::{PaymentId, ResourceKey};

/// A live entitlement for a resource key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Grant {
    /// Paid access until `expires_at`.
    TimeBoxed {
        payment_id: PaymentId,
        expires_at: UnixTimestamp,
        remaining_secs: u64,
    },
    /// Paid access for exactly one call.
    SingleCall { payment_id: PaymentId },
}

impl Grant {
    pub fn payment_id(&self) -> &PaymentId {
        match self {
            Grant::TimeBoxed { payment_id, .. } => payment_id,
            Grant::SingleCall { payment_id } => payment_id,
        }
    }

    pub fn remaining_secs(&self) -> Option<u64> {
        match self {
            Grant::TimeBoxed { remaining_secs, .. } => Some(*remaining_secs),
            Grant::SingleCall { .. } => None,
        }
    }
}

/// Resolves grants against the ledger.
#[derive(Clone)]
pub struct EntitlementResolver {
    ledger: Arc<dyn Ledger>,
}

impl EntitlementResolver {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Returns the live grant for `resource` at `now`, or `None`.
    ///
    /// Policy: the most recent completed payment wins. An `expires_at`
    /// exactly equal to `now` is already expired; one second in the future
    /// grants one remaining second.
    pub fn entitlement(&self, resource: &ResourceKey, now: UnixTimestamp) -> Option<Grant> {
        if let Some(record) = self.ledger.latest_completed(resource)
            && let Some(expires_at) = record.expires_at
            && let Some(remaining_secs) = now.remaining_until(expires_at)
        {
            return Some(Grant::TimeBoxed {
                payment_id: record.id,
                expires_at,
                remaining_secs,
            });
        }
        self.ledger
            .unconsumed_call_grant(resource)
            .map(|record| Grant::SingleCall { payment_id: record.id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::money::UsdAmount;
    use crate::revenue::RevenueShareBp;
    use crate::types::{OwnerId, PaymentRecord, PaymentStatus};

    fn resolver_with_ledger() -> (EntitlementResolver, Arc<InMemoryLedger>) {
        let ledger = Arc::new(InMemoryLedger::new());
        let resolver = EntitlementResolver::new(ledger.clone());
        (resolver, ledger)
    }

    fn completed(resource: ResourceKey, expires_at: Option<u64>) -> PaymentRecord {
        PaymentRecord {
            id: PaymentId::random(),
            owner: OwnerId::new("example.com"),
            amount: UsdAmount::from_micros(1_000),
            revenue_share_bp: RevenueShareBp::default_share(),
            status: PaymentStatus::Pending,
            created_at: UnixTimestamp::from_secs(0),
            completed_at: None,
            expires_at: expires_at.map(UnixTimestamp::from_secs),
            page: None,
            resource,
        }
    }

    #[test]
    fn test_no_payment_history_means_no_grant() {
        let (resolver, _ledger) = resolver_with_ledger();
        let resource = ResourceKey::page("example.com", "page123");
        assert_eq!(
            resolver.entitlement(&resource, UnixTimestamp::from_secs(1)),
            None
        );
    }

    #[test]
    fn test_pending_payment_grants_nothing() {
        let (resolver, ledger) = resolver_with_ledger();
        let resource = ResourceKey::page("example.com", "page123");
        ledger.insert_payment(completed(resource.clone(), Some(1_000)));
        assert_eq!(
            resolver.entitlement(&resource, UnixTimestamp::from_secs(1)),
            None
        );
    }

    #[test]
    fn test_expiry_boundary() {
        let (resolver, ledger) = resolver_with_ledger();
        let resource = ResourceKey::page("example.com", "page123");
        let record = completed(resource.clone(), Some(1_000));
        let id = record.id.clone();
        ledger.insert_payment(record);
        ledger
            .complete_payment(&id, UnixTimestamp::from_secs(700))
            .unwrap();

        // One second before expiry: granted with one second remaining.
        let grant = resolver
            .entitlement(&resource, UnixTimestamp::from_secs(999))
            .unwrap();
        assert_eq!(grant.remaining_secs(), Some(1));

        // At and after expiry: not granted.
        assert_eq!(
            resolver.entitlement(&resource, UnixTimestamp::from_secs(1_000)),
            None
        );
        assert_eq!(
            resolver.entitlement(&resource, UnixTimestamp::from_secs(1_001)),
            None
        );
    }

    #[test]
    fn test_call_grant_until_consumed() {
        let (resolver, ledger) = resolver_with_ledger();
        let resource = ResourceKey::api("ml-inference", "predict");
        let record = completed(resource.clone(), None);
        let id = record.id.clone();
        ledger.insert_payment(record);
        ledger
            .complete_payment(&id, UnixTimestamp::from_secs(10))
            .unwrap();

        let now = UnixTimestamp::from_secs(11);
        let grant = resolver.entitlement(&resource, now).unwrap();
        assert_eq!(grant, Grant::SingleCall { payment_id: id.clone() });

        assert!(ledger.consume_call_grant(&id, now));
        assert_eq!(resolver.entitlement(&resource, now), None);
    }
}
