//! The ledger store: shared, transactional storage for payment records,
//! earnings accumulators and the usage log.
//!
//! The [`Ledger`] trait is the single shared-mutable-state seam of the
//! gateway. It is injected into the lifecycle manager and entitlement
//! resolver so the core stays testable without globals and can be swapped
//! for a database-backed implementation later.
//!
//! [`InMemoryLedger`] is the authoritative single-instance implementation.
//! Its consistency guarantees:
//!
//! - The `Pending -> Completed` transition is a compare-and-set keyed by
//!   payment id. Exactly one caller observes the edge; concurrent retries
//!   (duplicate webhook deliveries) observe the already-completed record.
//! - The owner's earnings accumulator is updated inside the same per-id
//!   critical section as the transition, so `total_earned` never
//!   double-counts and never misses a completed payment.
//! - Call-scoped grant consumption is likewise a compare-and-set, so a
//!   single-use grant is served at most once.
//!
//! All operations complete in bounded local time; nothing inside a critical
//! section performs I/O.

use std::sync::RwLock;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::revenue::RevenueSplit;
use crate::timestamp::UnixTimestamp;
use crate::types::{
    DebitId, DebitRecord, EarningsAccumulator, OwnerId, PaymentId, PaymentRecord, PaymentStatus,
    ResourceKey, UsageRecord,
};

/// Errors from ledger operations. Only true failures live here; idempotent
/// re-completion is a success (see [`Completion::newly_completed`]).
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LedgerError {
    #[error("Payment {0} not found")]
    NotFound(PaymentId),
}

/// Result of a completion call.
///
/// `newly_completed` is `true` for the one caller that performed the
/// `Pending -> Completed` edge (and whose call applied the revenue split),
/// `false` for idempotent retries.
#[derive(Debug, Clone)]
pub struct Completion {
    pub record: PaymentRecord,
    pub split: RevenueSplit,
    pub newly_completed: bool,
}

/// Storage abstraction for payment, earnings and usage state.
pub trait Ledger: Send + Sync + 'static {
    /// Stores a freshly created pending payment.
    fn insert_payment(&self, record: PaymentRecord);

    /// Looks up a payment by id.
    fn payment(&self, id: &PaymentId) -> Option<PaymentRecord>;

    /// The most recently completed payment for a resource key, if any.
    fn latest_completed(&self, resource: &ResourceKey) -> Option<PaymentRecord>;

    /// The most recently completed call-scoped payment for a resource key
    /// whose grant has not been consumed yet.
    fn unconsumed_call_grant(&self, resource: &ResourceKey) -> Option<PaymentRecord>;

    /// Transitions a payment `Pending -> Completed` and applies the revenue
    /// split to the owner's accumulator, atomically per payment id.
    ///
    /// Completing an already-completed payment is a no-op success.
    fn complete_payment(
        &self,
        id: &PaymentId,
        now: UnixTimestamp,
    ) -> Result<Completion, LedgerError>;

    /// Marks a call-scoped grant as consumed. Returns `true` only for the
    /// caller that performed the consumption.
    fn consume_call_grant(&self, id: &PaymentId, now: UnixTimestamp) -> bool;

    /// Whether a call-scoped grant has been consumed.
    fn is_consumed(&self, id: &PaymentId) -> bool;

    /// Appends a usage (receipt) record. Usage records are never mutated.
    fn record_usage(&self, record: UsageRecord);

    /// A page of usage records plus the total count.
    fn usage_page(&self, offset: usize, limit: usize) -> (Vec<UsageRecord>, usize);

    /// The debit log: one balance snapshot per completed payment, in
    /// completion order.
    fn debits(&self) -> Vec<DebitRecord>;

    /// Earnings accumulator for one owner.
    fn earnings(&self, owner: &OwnerId) -> Option<EarningsAccumulator>;

    /// All earnings accumulators.
    fn all_earnings(&self) -> Vec<(OwnerId, EarningsAccumulator)>;

    /// All completed payment records, for reporting and reconciliation.
    fn completed_payments(&self) -> Vec<PaymentRecord>;
}

/// Single-process ledger backed by [`DashMap`] shards.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    payments: DashMap<PaymentId, PaymentRecord>,
    earnings: DashMap<OwnerId, EarningsAccumulator>,
    consumed: DashMap<PaymentId, UnixTimestamp>,
    usage: RwLock<Vec<UsageRecord>>,
    debits: RwLock<Vec<DebitRecord>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Ledger for InMemoryLedger {
    fn insert_payment(&self, record: PaymentRecord) {
        self.payments.insert(record.id.clone(), record);
    }

    fn payment(&self, id: &PaymentId) -> Option<PaymentRecord> {
        self.payments.get(id).map(|r| r.clone())
    }

    fn latest_completed(&self, resource: &ResourceKey) -> Option<PaymentRecord> {
        // Linear scan; the in-memory ledger is not indexed by resource key.
        self.payments
            .iter()
            .filter(|r| r.is_completed() && &r.resource == resource)
            .max_by_key(|r| r.completed_at)
            .map(|r| r.clone())
    }

    fn unconsumed_call_grant(&self, resource: &ResourceKey) -> Option<PaymentRecord> {
        self.payments
            .iter()
            .filter(|r| {
                r.is_completed()
                    && r.is_call_scoped()
                    && &r.resource == resource
                    && !self.consumed.contains_key(&r.id)
            })
            .max_by_key(|r| r.completed_at)
            .map(|r| r.clone())
    }

    fn complete_payment(
        &self,
        id: &PaymentId,
        now: UnixTimestamp,
    ) -> Result<Completion, LedgerError> {
        // `get_mut` holds the shard lock for this id for the whole
        // transition, serializing concurrent completion attempts.
        let mut entry = self
            .payments
            .get_mut(id)
            .ok_or_else(|| LedgerError::NotFound(id.clone()))?;

        let split = RevenueSplit::of(entry.amount, entry.revenue_share_bp);

        if entry.is_completed() {
            return Ok(Completion {
                record: entry.clone(),
                split,
                newly_completed: false,
            });
        }

        entry.status = PaymentStatus::Completed;
        entry.completed_at = Some(now);

        // Apply the split while still holding the payment entry, so the
        // accumulator update is atomic with the status transition.
        let mut accumulator = self.earnings.entry(entry.owner.clone()).or_default();
        accumulator.total_earned = accumulator.total_earned.saturating_add(split.publisher_share);
        accumulator.payment_count += 1;
        accumulator.last_payment_at = Some(now);
        drop(accumulator);

        // Snapshot the debit in the same critical section, so the log holds
        // exactly one entry per completed payment.
        self.debits.write().expect("debit log poisoned").push(DebitRecord {
            id: DebitId::random(),
            payment_id: entry.id.clone(),
            resource: entry.resource.clone(),
            amount_debited: entry.amount,
            timestamp: now,
        });

        Ok(Completion {
            record: entry.clone(),
            split,
            newly_completed: true,
        })
    }

    fn consume_call_grant(&self, id: &PaymentId, now: UnixTimestamp) -> bool {
        match self.consumed.entry(id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(now);
                true
            }
        }
    }

    fn is_consumed(&self, id: &PaymentId) -> bool {
        self.consumed.contains_key(id)
    }

    fn record_usage(&self, record: UsageRecord) {
        self.usage.write().expect("usage log poisoned").push(record);
    }

    fn usage_page(&self, offset: usize, limit: usize) -> (Vec<UsageRecord>, usize) {
        let usage = self.usage.read().expect("usage log poisoned");
        let page = usage.iter().skip(offset).take(limit).cloned().collect();
        (page, usage.len())
    }

    fn debits(&self) -> Vec<DebitRecord> {
        self.debits.read().expect("debit log poisoned").clone()
    }

    fn earnings(&self, owner: &OwnerId) -> Option<EarningsAccumulator> {
        self.earnings.get(owner).map(|e| e.clone())
    }

    fn all_earnings(&self) -> Vec<(OwnerId, EarningsAccumulator)> {
        let mut all: Vec<_> = self
            .earnings
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    fn completed_payments(&self) -> Vec<PaymentRecord> {
        self.payments
            .iter()
            .filter(|r| r.is_completed())
            .map(|r| r.clone())
            .collect()
    }
}
