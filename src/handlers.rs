//! HTTP endpoints of the paygate server.
//!
//! Protocol-critical endpoints (`/proxy`, `/access`, `/payments`) drive the
//! payment state machine; the read-only reporting endpoints (`/usage`,
//! `/earnings`, `/stats`) expose the ledger.
//!
//! "Payment required" is surfaced as HTTP 402 with a machine-readable
//! payment descriptor. It is a normal protocol step, distinct from the
//! client-error codes used for missing input (400) and unknown identifiers
//! (404).

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;
use url::Url;

use crate::error::GatewayError;
use crate::gateway::{AccessOutcome, AccessRequest, Gateway, PaymentTerms};
use crate::types::{OwnerId, PageMeta, PaymentId, ResourceKey};

/// Header referencing an in-flight payment.
pub const PAYMENT_ID_HEADER: &str = "X-Payment-ID";

/// All routes of the gateway, to be mounted with shared [`Gateway`] state.
pub fn routes() -> Router<Arc<Gateway>> {
    Router::new()
        .route("/resources", get(get_resources))
        .route("/proxy/{api}/{*endpoint}", any(proxy))
        .route("/access", post(post_access))
        .route("/payments/{id}", get(get_payment))
        .route("/payments/{id}/complete", post(post_complete))
        .route("/usage", get(get_usage))
        .route("/balance-snapshots", get(get_balance_snapshots))
        .route("/earnings", get(get_all_earnings))
        .route("/earnings/{domain}", get(get_owner_earnings))
        .route("/stats", get(get_stats))
        .route("/owners/verify", post(post_verify_owner))
}

fn payment_id_from_headers(headers: &HeaderMap) -> Option<PaymentId> {
    headers
        .get(PAYMENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(PaymentId::from)
}

/// Renders a dispatcher outcome: 200 with the served payload, or 402 with
/// the payment descriptor.
fn render_outcome(outcome: AccessOutcome) -> Response {
    match outcome {
        AccessOutcome::Served(served) => (StatusCode::OK, Json(served)).into_response(),
        AccessOutcome::PaymentRequired(terms) => payment_required(terms),
    }
}

fn payment_required(terms: PaymentTerms) -> Response {
    let error = if terms.still_pending {
        "Payment Pending"
    } else {
        "Payment Required"
    };
    let body = json!({
        "error": error,
        "payment_id": terms.payment_id,
        "resource": terms.resource,
        "amount_usd": terms.amount,
        "duration_secs": terms.duration_secs,
        "publisher_verified": terms.publisher_verified,
        "message": terms.instructions,
    });
    (StatusCode::PAYMENT_REQUIRED, Json(body)).into_response()
}

/// `GET /resources`: the metered API catalog and page access pricing.
#[instrument(skip_all)]
async fn get_resources(State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
    let apis: BTreeMap<_, _> = gateway
        .resources()
        .iter()
        .map(|(name, config)| {
            (
                name.clone(),
                json!({
                    "amount_usd": config.amount,
                    "free": config.free,
                    "owner": config.owner,
                    "duration_secs": config.duration_secs,
                }),
            )
        })
        .collect();
    Json(json!({
        "apis": apis,
        "page_access": {
            "amount_usd": gateway.page_access().amount,
            "duration_secs": gateway.page_access().duration_secs,
        },
    }))
}

/// `GET|POST|... /proxy/{api}/{endpoint}`: metered access to an upstream
/// API. Responds 402 with payment terms until a usable entitlement exists.
#[instrument(skip_all, fields(api = %api, endpoint = %endpoint))]
async fn proxy(
    State(gateway): State<Arc<Gateway>>,
    Path((api, endpoint)): Path<(String, String)>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let outcome = gateway
        .dispatch(AccessRequest {
            resource: ResourceKey::api(api, endpoint),
            method: method.to_string(),
            payment_id: payment_id_from_headers(&headers),
            page: None,
        })
        .await?;
    Ok(render_outcome(outcome))
}

#[derive(Debug, Deserialize)]
struct AccessBody {
    page_hash: Option<String>,
    page_url: Option<Url>,
    #[serde(default)]
    page_title: Option<String>,
    #[serde(default)]
    payment_id: Option<PaymentId>,
}

/// `POST /access`: page (ad-free) access request.
///
/// Requires a `page_hash` and a `page_url` with a host, which keys the
/// entitlement; responds 402 until paid, then 200 with remaining time.
#[instrument(skip_all)]
async fn post_access(
    State(gateway): State<Arc<Gateway>>,
    Json(body): Json<AccessBody>,
) -> Result<Response, GatewayError> {
    let page_hash = body
        .page_hash
        .filter(|hash| !hash.is_empty())
        .ok_or(GatewayError::MissingInput("page_hash"))?;
    let page_url = body.page_url.ok_or(GatewayError::MissingInput("page_url"))?;
    let domain = page_url
        .host_str()
        .ok_or(GatewayError::MissingInput("page_url host"))?
        .to_string();

    let outcome = gateway
        .dispatch(AccessRequest {
            resource: ResourceKey::page(domain, page_hash),
            method: "POST".to_string(),
            payment_id: body.payment_id,
            page: Some(PageMeta {
                url: Some(page_url),
                title: body.page_title,
            }),
        })
        .await?;
    Ok(render_outcome(outcome))
}

/// `GET /payments/{id}`: payment record lookup.
#[instrument(skip_all, fields(payment_id = %id))]
async fn get_payment(
    State(gateway): State<Arc<Gateway>>,
    Path(id): Path<String>,
) -> Result<Response, GatewayError> {
    let record = gateway.payment(&PaymentId::from(id.as_str()))?;
    Ok((StatusCode::OK, Json(record)).into_response())
}

/// `POST /payments/{id}/complete`: marks a payment as completed and applies
/// the revenue split. Idempotent: repeating the call returns the same
/// completed state without double-counting.
#[instrument(skip_all, fields(payment_id = %id))]
async fn post_complete(
    State(gateway): State<Arc<Gateway>>,
    Path(id): Path<String>,
) -> Result<Response, GatewayError> {
    let completion = gateway.complete_payment(&PaymentId::from(id.as_str()))?;
    let message = if completion.newly_completed {
        "Payment completed successfully"
    } else {
        "Payment already completed"
    };
    let body = json!({
        "message": message,
        "payment_id": completion.record.id,
        "status": completion.record.status,
        "expires_at": completion.record.expires_at,
        "publisher_share": completion.split.publisher_share,
        "platform_share": completion.split.platform_share,
    });
    Ok((StatusCode::OK, Json(body)).into_response())
}

#[derive(Debug, Deserialize)]
struct UsageParams {
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
}

/// `GET /usage`: the append-only usage log, paginated.
#[instrument(skip_all)]
async fn get_usage(
    State(gateway): State<Arc<Gateway>>,
    Query(params): Query<UsageParams>,
) -> impl IntoResponse {
    let offset = params.offset.unwrap_or(0);
    let limit = params.limit.unwrap_or(usize::MAX);
    let (usage, total_count) = gateway.usage_page(offset, limit);
    Json(json!({
        "usage": usage,
        "total_count": total_count,
        "offset": offset,
    }))
}

/// `GET /balance-snapshots`: the debit log, one snapshot per completed
/// payment in completion order.
#[instrument(skip_all)]
async fn get_balance_snapshots(State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
    let snapshots = gateway.debits();
    let total_count = snapshots.len();
    Json(json!({
        "balance_snapshots": snapshots,
        "total_count": total_count,
    }))
}

/// `GET /earnings`: all accumulators plus the platform's total share.
#[instrument(skip_all)]
async fn get_all_earnings(State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
    let publishers: BTreeMap<String, _> = gateway
        .all_earnings()
        .into_iter()
        .map(|(owner, earnings)| (owner.to_string(), earnings))
        .collect();
    Json(json!({
        "publishers": publishers,
        "total_platform_revenue": gateway.platform_revenue(),
    }))
}

/// `GET /earnings/{domain}`: one owner's accumulator. Owners without
/// completed payments report zeroes rather than 404.
#[instrument(skip_all, fields(domain = %domain))]
async fn get_owner_earnings(
    State(gateway): State<Arc<Gateway>>,
    Path(domain): Path<String>,
) -> impl IntoResponse {
    let owner = OwnerId::new(domain);
    let earnings = gateway.earnings(&owner);
    Json(json!({
        "domain": owner,
        "earnings": earnings,
        "verified": gateway.owner_verified(&owner),
    }))
}

/// `GET /stats`: aggregate statistics over completed payments.
#[instrument(skip_all)]
async fn get_stats(State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
    Json(gateway.stats())
}

#[derive(Debug, Deserialize)]
struct VerifyOwnerBody {
    domain: Option<String>,
    certificate: Option<String>,
}

#[derive(Debug, Serialize)]
struct VerifyOwnerResponse {
    verified: bool,
    domain: String,
    message: &'static str,
}

/// `POST /owners/verify`: checks a publisher certificate.
///
/// A mismatch is reported with `verified: false`, never as a crash; missing
/// fields are the only hard failure.
#[instrument(skip_all)]
async fn post_verify_owner(
    State(gateway): State<Arc<Gateway>>,
    Json(body): Json<VerifyOwnerBody>,
) -> Result<Response, GatewayError> {
    let domain = body.domain.ok_or(GatewayError::MissingInput("domain"))?;
    let certificate = body
        .certificate
        .ok_or(GatewayError::MissingInput("certificate"))?;
    let owner = OwnerId::new(domain.clone());
    if gateway.verify_owner(&owner, &certificate) {
        Ok((
            StatusCode::OK,
            Json(VerifyOwnerResponse {
                verified: true,
                domain,
                message: "Publisher certificate verified",
            }),
        )
            .into_response())
    } else {
        tracing::warn!(domain = %owner, "Publisher certificate verification failed");
        Ok((
            StatusCode::BAD_REQUEST,
            Json(VerifyOwnerResponse {
                verified: false,
                domain,
                message: "Publisher certificate verification failed",
            }),
        )
            .into_response())
    }
}
