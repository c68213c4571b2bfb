//! Payment lifecycle management: creation of pending payments and their
//! idempotent completion.
//!
//! Creation has no side effects beyond the ledger entry, so abandoned
//! pending payments are harmless and safe to retry. Completion delegates to
//! the ledger's atomic transition; callers that race on the same id all
//! receive the completed record, and only the winner's call applied the
//! revenue split.

use std::sync::Arc;

use tracing::instrument;

use crate::ledger::{Completion, Ledger, LedgerError};
use crate::money::UsdAmount;
use crate::revenue::RevenueShareBp;
use crate::timestamp::UnixTimestamp;
use crate::types::{OwnerId, PageMeta, PaymentId, PaymentRecord, PaymentStatus, ResourceKey};

/// Parameters for a new pending payment.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub resource: ResourceKey,
    pub owner: OwnerId,
    pub amount: UsdAmount,
    pub revenue_share_bp: RevenueShareBp,
    /// Entitlement window in seconds. `None` creates a call-scoped payment.
    pub duration_secs: Option<u64>,
    pub page: Option<PageMeta>,
}

/// Creates and completes payment records against the injected ledger.
#[derive(Clone)]
pub struct PaymentLifecycle {
    ledger: Arc<dyn Ledger>,
}

impl PaymentLifecycle {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Creates a pending payment and stores it.
    ///
    /// For time-boxed payments the entitlement window is anchored at
    /// creation, so the expiry the payer was quoted is the expiry they get.
    /// Callers are expected to have checked for a live entitlement first.
    #[instrument(skip_all, fields(resource = %request.resource))]
    pub fn create_payment(&self, request: NewPayment, now: UnixTimestamp) -> PaymentRecord {
        let record = PaymentRecord {
            id: PaymentId::random(),
            resource: request.resource,
            owner: request.owner,
            amount: request.amount,
            revenue_share_bp: request.revenue_share_bp,
            status: PaymentStatus::Pending,
            created_at: now,
            completed_at: None,
            expires_at: request.duration_secs.map(|secs| now + secs),
            page: request.page,
        };
        tracing::info!(payment_id = %record.id, amount = %record.amount, "Payment request created");
        self.ledger.insert_payment(record.clone());
        record
    }

    /// Completes a payment.
    ///
    /// Unknown ids fail with [`LedgerError::NotFound`]. Already-completed
    /// payments return the existing record unchanged, which makes retried
    /// completion calls (duplicate webhooks) safe.
    #[instrument(skip_all, fields(payment_id = %id))]
    pub fn complete_payment(
        &self,
        id: &PaymentId,
        now: UnixTimestamp,
    ) -> Result<Completion, LedgerError> {
        let completion = self.ledger.complete_payment(id, now)?;
        if completion.newly_completed {
            tracing::info!(
                owner = %completion.record.owner,
                publisher_share = %completion.split.publisher_share,
                platform_share = %completion.split.platform_share,
                "Payment completed"
            );
        } else {
            tracing::debug!("Payment already completed, idempotent no-op");
        }
        Ok(completion)
    }

    /// Looks up a payment by id.
    pub fn payment(&self, id: &PaymentId) -> Option<PaymentRecord> {
        self.ledger.payment(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;

    fn lifecycle() -> (PaymentLifecycle, Arc<InMemoryLedger>) {
        let ledger = Arc::new(InMemoryLedger::new());
        (PaymentLifecycle::new(ledger.clone()), ledger)
    }

    fn page_payment(duration_secs: Option<u64>) -> NewPayment {
        NewPayment {
            resource: ResourceKey::page("example.com", "page123"),
            owner: OwnerId::new("example.com"),
            amount: UsdAmount::from_micros(1_000),
            revenue_share_bp: RevenueShareBp::default_share(),
            duration_secs,
            page: None,
        }
    }

    #[test]
    fn test_create_time_boxed_payment() {
        let (lifecycle, ledger) = lifecycle();
        let record = lifecycle.create_payment(page_payment(Some(300)), UnixTimestamp::from_secs(100));
        assert_eq!(record.status, PaymentStatus::Pending);
        assert_eq!(record.expires_at, Some(UnixTimestamp::from_secs(400)));
        assert_eq!(record.completed_at, None);
        assert_eq!(ledger.payment(&record.id).unwrap(), record);
    }

    #[test]
    fn test_create_call_scoped_payment() {
        let (lifecycle, _ledger) = lifecycle();
        let record = lifecycle.create_payment(page_payment(None), UnixTimestamp::from_secs(100));
        assert!(record.is_call_scoped());
    }

    #[test]
    fn test_complete_twice_counts_once() {
        let (lifecycle, ledger) = lifecycle();
        let record = lifecycle.create_payment(page_payment(Some(300)), UnixTimestamp::from_secs(100));

        let first = lifecycle
            .complete_payment(&record.id, UnixTimestamp::from_secs(110))
            .unwrap();
        let second = lifecycle
            .complete_payment(&record.id, UnixTimestamp::from_secs(120))
            .unwrap();

        assert!(first.newly_completed);
        assert!(!second.newly_completed);
        assert_eq!(first.record.completed_at, second.record.completed_at);

        let earned = ledger.earnings(&record.owner).unwrap();
        assert_eq!(earned.payment_count, 1);
        assert_eq!(earned.total_earned, first.split.publisher_share);
    }

    #[test]
    fn test_complete_unknown_id_fails() {
        let (lifecycle, _ledger) = lifecycle();
        let missing = PaymentId::from("no-such-payment");
        assert!(matches!(
            lifecycle.complete_payment(&missing, UnixTimestamp::from_secs(1)),
            Err(LedgerError::NotFound(_))
        ));
    }
}
