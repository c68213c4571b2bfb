//! The gateway dispatcher: the per-request composition of entitlement
//! resolution, payment lifecycle and revenue accounting.
//!
//! Per-request algorithm:
//!
//! 1. Price the resource key against the catalog.
//! 2. Free resources skip payment entirely; serve and log usage.
//! 3. A live entitlement serves immediately: time-boxed grants at cost 0
//!    (already paid), call-scoped grants at the payment amount, consuming
//!    the grant in the same step.
//! 4. Otherwise, a referenced still-pending payment answers "payment
//!    required / still pending"; with no usable reference a fresh pending
//!    payment is created and its terms returned. Both are ordinary protocol
//!    steps, surfaced as HTTP 402 at the transport boundary, not errors.
//!
//! Every successfully served request appends exactly one usage record.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::instrument;

use crate::config::{ApiResourceConfig, Config, PageAccessConfig};
use crate::entitlement::{EntitlementResolver, Grant};
use crate::error::GatewayError;
use crate::external::{OwnerRegistry, Upstream, Verifier};
use crate::ledger::{Completion, Ledger};
use crate::lifecycle::{NewPayment, PaymentLifecycle};
use crate::money::UsdAmount;
use crate::timestamp::{Clock, UnixTimestamp};
use crate::types::{
    OwnerId, PageMeta, PaymentId, PaymentRecord, ResourceKey, UsageId, UsageRecord,
};

/// One access attempt against a protected resource.
#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub resource: ResourceKey,
    pub method: String,
    /// Payment id supplied by the caller (e.g. `X-Payment-ID`).
    pub payment_id: Option<PaymentId>,
    pub page: Option<PageMeta>,
}

/// A successfully served request.
#[derive(Debug, Clone, Serialize)]
pub struct Served {
    pub resource: ResourceKey,
    pub usage_id: UsageId,
    pub cost: UsdAmount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<PaymentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<UnixTimestamp>,
    pub body: Value,
}

/// The payment descriptor returned when access requires payment first.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentTerms {
    pub payment_id: PaymentId,
    pub resource: ResourceKey,
    pub amount: UsdAmount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    pub publisher_verified: bool,
    /// `true` when the caller referenced this payment and it is still
    /// pending; `false` for a freshly created payment request.
    pub still_pending: bool,
    pub instructions: String,
}

/// Dispatcher outcome. Both variants are expected protocol steps.
#[derive(Debug, Clone)]
pub enum AccessOutcome {
    Served(Served),
    PaymentRequired(PaymentTerms),
}

/// Aggregate statistics over completed payments and live entitlements.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStats {
    pub total_payments: u64,
    pub total_revenue: UsdAmount,
    pub unique_publishers: u64,
    pub average_payment: UsdAmount,
    pub active_entitlements: u64,
}

/// Per-request entry point composing the ledger, resolver, lifecycle and
/// the external collaborators.
pub struct Gateway {
    ledger: Arc<dyn Ledger>,
    resolver: EntitlementResolver,
    lifecycle: PaymentLifecycle,
    owners: Arc<dyn OwnerRegistry>,
    verifier: Arc<dyn Verifier>,
    upstream: Arc<dyn Upstream>,
    clock: Arc<dyn Clock>,
    default_share: crate::revenue::RevenueShareBp,
    page_access: PageAccessConfig,
    resources: BTreeMap<String, ApiResourceConfig>,
}

/// Pricing resolved for one resource key.
struct Pricing {
    amount: UsdAmount,
    free: bool,
    owner: OwnerId,
    duration_secs: Option<u64>,
}

impl Gateway {
    pub fn new(
        config: &Config,
        ledger: Arc<dyn Ledger>,
        owners: Arc<dyn OwnerRegistry>,
        verifier: Arc<dyn Verifier>,
        upstream: Arc<dyn Upstream>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            resolver: EntitlementResolver::new(ledger.clone()),
            lifecycle: PaymentLifecycle::new(ledger.clone()),
            ledger,
            owners,
            verifier,
            upstream,
            clock,
            default_share: config.default_revenue_share_bp(),
            page_access: config.page_access().clone(),
            resources: config.resources().clone(),
        }
    }

    pub fn now(&self) -> UnixTimestamp {
        self.clock.now()
    }

    /// The metered API catalog, for the discovery endpoint.
    pub fn resources(&self) -> &BTreeMap<String, ApiResourceConfig> {
        &self.resources
    }

    pub fn page_access(&self) -> &PageAccessConfig {
        &self.page_access
    }

    fn pricing_for(&self, resource: &ResourceKey) -> Result<Pricing, GatewayError> {
        match resource {
            ResourceKey::Api { name, .. } => {
                let config = self
                    .resources
                    .get(name)
                    .ok_or_else(|| GatewayError::UnknownResource(name.clone()))?;
                Ok(Pricing {
                    amount: config.amount,
                    free: config.free,
                    owner: OwnerId::new(config.owner.clone()),
                    duration_secs: config.duration_secs,
                })
            }
            ResourceKey::Page { domain, .. } => Ok(Pricing {
                amount: self.page_access.amount,
                free: false,
                owner: OwnerId::new(domain.clone()),
                duration_secs: Some(self.page_access.duration_secs),
            }),
        }
    }

    /// Runs one access attempt through the payment state machine.
    #[instrument(skip_all, fields(resource = %request.resource))]
    pub async fn dispatch(&self, request: AccessRequest) -> Result<AccessOutcome, GatewayError> {
        let now = self.clock.now();
        let pricing = self.pricing_for(&request.resource)?;

        if pricing.free {
            let served = self
                .serve(&request, None, UsdAmount::ZERO, None, None, now)
                .await?;
            return Ok(AccessOutcome::Served(served));
        }

        if let Some(grant) = self.resolver.entitlement(&request.resource, now) {
            match grant {
                Grant::TimeBoxed {
                    payment_id,
                    expires_at,
                    remaining_secs,
                } => {
                    let served = self
                        .serve(
                            &request,
                            Some(payment_id),
                            UsdAmount::ZERO,
                            Some(remaining_secs),
                            Some(expires_at),
                            now,
                        )
                        .await?;
                    return Ok(AccessOutcome::Served(served));
                }
                Grant::SingleCall { payment_id } => {
                    // The consumption is a compare-and-set: losing the race
                    // to a parallel request means this caller has to pay.
                    // Consumption happens before the upstream fetch and is
                    // not refunded if the fetch fails; like the revenue
                    // split, a grant is never rolled back.
                    if self.ledger.consume_call_grant(&payment_id, now) {
                        let cost = self
                            .lifecycle
                            .payment(&payment_id)
                            .map(|record| record.amount)
                            .unwrap_or(pricing.amount);
                        let served = self
                            .serve(&request, Some(payment_id), cost, None, None, now)
                            .await?;
                        return Ok(AccessOutcome::Served(served));
                    }
                }
            }
        }

        // A referenced payment that exists and is still pending answers
        // "still pending" instead of opening another payment.
        if let Some(id) = &request.payment_id
            && let Some(record) = self.lifecycle.payment(id)
            && !record.is_completed()
            && record.resource == request.resource
        {
            return Ok(AccessOutcome::PaymentRequired(
                self.terms(&record, true),
            ));
        }

        let profile = self.owners.profile(&pricing.owner);
        let record = self.lifecycle.create_payment(
            NewPayment {
                resource: request.resource.clone(),
                owner: pricing.owner,
                amount: pricing.amount,
                revenue_share_bp: profile.revenue_share_bp,
                duration_secs: pricing.duration_secs,
                page: request.page.clone(),
            },
            now,
        );
        Ok(AccessOutcome::PaymentRequired(self.terms(&record, false)))
    }

    fn terms(&self, record: &PaymentRecord, still_pending: bool) -> PaymentTerms {
        let profile = self.owners.profile(&record.owner);
        let duration_secs = record
            .expires_at
            .map(|expires_at| expires_at.as_secs() - record.created_at.as_secs());
        let instructions = match duration_secs {
            Some(secs) => format!(
                "Pay {} USD to unlock {} for {} seconds",
                record.amount, record.resource, secs
            ),
            None => format!(
                "Pay {} USD to unlock one call to {}",
                record.amount, record.resource
            ),
        };
        PaymentTerms {
            payment_id: record.id.clone(),
            resource: record.resource.clone(),
            amount: record.amount,
            duration_secs,
            publisher_verified: profile.verified,
            still_pending,
            instructions,
        }
    }

    async fn serve(
        &self,
        request: &AccessRequest,
        payment_id: Option<PaymentId>,
        cost: UsdAmount,
        remaining_secs: Option<u64>,
        expires_at: Option<UnixTimestamp>,
        now: UnixTimestamp,
    ) -> Result<Served, GatewayError> {
        let body = self.upstream.fetch(&request.resource, &request.method).await?;
        let usage = UsageRecord {
            id: UsageId::random(),
            payment_id: payment_id.clone(),
            resource: request.resource.clone(),
            method: request.method.clone(),
            timestamp: now,
            cost,
        };
        let usage_id = usage.id.clone();
        self.ledger.record_usage(usage);
        tracing::info!(
            resource = %request.resource,
            cost = %cost,
            usage_id = %usage_id,
            "Resource served"
        );
        Ok(Served {
            resource: request.resource.clone(),
            usage_id,
            cost,
            payment_id,
            remaining_secs,
            expires_at,
            body,
        })
    }

    /// Completes a payment; idempotent for already-completed ids.
    pub fn complete_payment(&self, id: &PaymentId) -> Result<Completion, GatewayError> {
        Ok(self.lifecycle.complete_payment(id, self.clock.now())?)
    }

    /// Looks up a payment record.
    pub fn payment(&self, id: &PaymentId) -> Result<PaymentRecord, GatewayError> {
        self.lifecycle
            .payment(id)
            .ok_or_else(|| GatewayError::PaymentNotFound(id.clone()))
    }

    /// Checks an owner credential against the pluggable verifier.
    pub fn verify_owner(&self, owner: &OwnerId, credential: &str) -> bool {
        self.verifier.verify(owner, credential)
    }

    pub fn owner_verified(&self, owner: &OwnerId) -> bool {
        self.owners.profile(owner).verified
    }

    pub fn usage_page(&self, offset: usize, limit: usize) -> (Vec<UsageRecord>, usize) {
        self.ledger.usage_page(offset, limit)
    }

    /// The debit log: one balance snapshot per completed payment.
    pub fn debits(&self) -> Vec<crate::types::DebitRecord> {
        self.ledger.debits()
    }

    pub fn earnings(&self, owner: &OwnerId) -> crate::types::EarningsAccumulator {
        self.ledger.earnings(owner).unwrap_or_default()
    }

    pub fn all_earnings(&self) -> Vec<(OwnerId, crate::types::EarningsAccumulator)> {
        self.ledger.all_earnings()
    }

    /// Total platform share across all completed payments.
    pub fn platform_revenue(&self) -> UsdAmount {
        self.ledger
            .completed_payments()
            .iter()
            .map(|record| {
                crate::revenue::RevenueSplit::of(record.amount, record.revenue_share_bp)
                    .platform_share
            })
            .fold(UsdAmount::ZERO, |acc, share| acc.saturating_add(share))
    }

    /// Aggregate statistics at the current instant.
    pub fn stats(&self) -> GatewayStats {
        let now = self.clock.now();
        let completed = self.ledger.completed_payments();
        let total_payments = completed.len() as u64;
        let total_revenue = completed
            .iter()
            .fold(UsdAmount::ZERO, |acc, r| acc.saturating_add(r.amount));
        let unique_publishers = {
            let mut owners: Vec<_> = completed.iter().map(|r| &r.owner).collect();
            owners.sort();
            owners.dedup();
            owners.len() as u64
        };
        let average_payment = if total_payments == 0 {
            UsdAmount::ZERO
        } else {
            UsdAmount::from_micros(total_revenue.as_micros() / total_payments)
        };
        let active_entitlements = completed
            .iter()
            .filter(|r| match r.expires_at {
                Some(expires_at) => now.remaining_until(expires_at).is_some(),
                None => !self.ledger.is_consumed(&r.id),
            })
            .count() as u64;
        GatewayStats {
            total_payments,
            total_revenue,
            unique_publishers,
            average_payment,
            active_entitlements,
        }
    }

    /// Default revenue share applied to owners absent from the registry.
    pub fn default_share(&self) -> crate::revenue::RevenueShareBp {
        self.default_share
    }
}
