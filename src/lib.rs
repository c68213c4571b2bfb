//! Micropayment gateway core.
//!
//! paygate sits in front of protected resources (content pages, upstream
//! APIs), demands a small payment before granting access, and on completion
//! unlocks either a time-boxed entitlement window or a single-use call
//! grant while recording the revenue split between resource owner and
//! platform.
//!
//! # Architecture
//!
//! The payment state machine per resource-access attempt:
//!
//! ```text
//! NoEntitlement -> PendingPayment -> Completed -> [Granted while unexpired]
//!                                                 -> NoEntitlement (expiry)
//! ```
//!
//! `Completed` is terminal per payment record; a record never transitions
//! out of it.
//!
//! # Modules
//!
//! - [`config`]: server configuration, resource catalog, publisher table.
//! - [`entitlement`]: grant resolution for time-boxed and call-scoped entitlements.
//! - [`error`]: gateway error taxonomy and HTTP status mapping.
//! - [`external`]: collaborator seams (owner registry, verifier, upstream fetcher).
//! - [`gateway`]: the per-request dispatcher composing all components.
//! - [`handlers`]: HTTP endpoints, protocol and reporting.
//! - [`ledger`]: the transactional store for payments, earnings and usage.
//! - [`lifecycle`]: payment creation and idempotent completion.
//! - [`money`]: fixed-point USD amounts in integer micro-USD.
//! - [`revenue`]: basis-point revenue splits with exact sums.
//! - [`shutdown`]: SIGTERM/SIGINT handling.
//! - [`telemetry`]: tracing and optional OpenTelemetry export.
//! - [`timestamp`]: Unix timestamps and the injectable clock.
//! - [`types`]: payment records, accumulators, usage records, identifiers.

pub mod config;
pub mod entitlement;
pub mod error;
pub mod external;
pub mod gateway;
pub mod handlers;
pub mod ledger;
pub mod lifecycle;
pub mod money;
pub mod revenue;
pub mod shutdown;
pub mod telemetry;
pub mod timestamp;
pub mod types;
