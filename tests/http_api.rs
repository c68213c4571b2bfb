//! End-to-end tests of the HTTP surface: the 402 payment flow, reporting
//! endpoints, and error mapping, driven through the axum router.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use paygate::config::Config;
use paygate::external::{MockUpstream, PublisherEntry, StaticOwnerRegistry};
use paygate::gateway::Gateway;
use paygate::handlers;
use paygate::ledger::InMemoryLedger;
use paygate::timestamp::ManualClock;

fn test_router() -> (Router, Arc<ManualClock>) {
    let config = Config::default();
    let clock = Arc::new(ManualClock::at(1_000_000));
    let registry = Arc::new(StaticOwnerRegistry::new(
        config
            .publishers()
            .iter()
            .map(|(domain, publisher)| {
                (
                    domain.clone(),
                    PublisherEntry {
                        certificate: publisher.certificate.clone(),
                        revenue_share_bp: publisher.revenue_share_bp,
                        verified: publisher.verified,
                    },
                )
            })
            .collect(),
        config.default_revenue_share_bp(),
    ));
    let gateway = Gateway::new(
        &config,
        Arc::new(InMemoryLedger::new()),
        registry.clone(),
        registry,
        Arc::new(MockUpstream),
        clock.clone(),
    );
    let router = handlers::routes().with_state(Arc::new(gateway));
    (router, clock)
}

async fn call(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_catalog_lists_pricing() {
    let (router, _clock) = test_router();
    let (status, body) = call(&router, get("/resources")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["apis"]["weather"]["free"], true);
    assert_eq!(body["apis"]["ml-inference"]["amount_usd"], "0.01");
    assert_eq!(body["page_access"]["duration_secs"], 300);
}

#[tokio::test]
async fn test_free_api_served_without_payment() {
    let (router, _clock) = test_router();
    let (status, body) = call(&router, get("/proxy/weather/current")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cost"], "0");
    assert_eq!(body["body"]["location"], "London");

    let (status, usage) = call(&router, get("/usage")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usage["total_count"], 1);
}

#[tokio::test]
async fn test_unknown_api_is_404() {
    let (router, _clock) = test_router();
    let (status, _body) = call(&router, get("/proxy/no-such-api/anything")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metered_api_payment_flow() {
    let (router, _clock) = test_router();

    // First call: 402 with payment terms.
    let (status, body) = call(
        &router,
        Request::post("/proxy/ml-inference/predict")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"], "Payment Required");
    assert_eq!(body["amount_usd"], "0.01");
    let payment_id = body["payment_id"].as_str().unwrap().to_string();

    // Referencing the pending payment: still 402, same id, pending wording.
    let (status, body) = call(
        &router,
        Request::post("/proxy/ml-inference/predict")
            .header("X-Payment-ID", &payment_id)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"], "Payment Pending");
    assert_eq!(body["payment_id"], payment_id.as_str());

    // Complete the payment; a retry reports the idempotent no-op.
    let uri = format!("/payments/{payment_id}/complete");
    let (status, body) = call(&router, post_json(&uri, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Payment completed successfully");
    let (status, body) = call(&router, post_json(&uri, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Payment already completed");

    // The paid call is served once, charged at the API price.
    let (status, body) = call(
        &router,
        Request::post("/proxy/ml-inference/predict")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cost"], "0.01");
    assert_eq!(body["body"]["prediction"], "positive");

    // The single-use grant is consumed: next call demands a new payment.
    let (status, body) = call(
        &router,
        Request::post("/proxy/ml-inference/predict")
            .header("X-Payment-ID", &payment_id)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_ne!(body["payment_id"], payment_id.as_str());

    // Earnings went to the API owner exactly once: 85% of $0.01.
    let (status, body) = call(&router, get("/earnings/example-ml.com")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["earnings"]["total_earned"], "0.0085");
    assert_eq!(body["earnings"]["payment_count"], 1);
    assert_eq!(body["verified"], false);
}

#[tokio::test]
async fn test_page_access_flow_with_expiry() {
    let (router, clock) = test_router();
    let access = json!({
        "page_hash": "page123",
        "page_url": "https://example.com/article",
        "page_title": "An Article",
    });

    let (status, body) = call(&router, post_json("/access", access.clone())).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["amount_usd"], "0.001");
    assert_eq!(body["duration_secs"], 300);
    assert_eq!(body["publisher_verified"], true);
    let payment_id = body["payment_id"].as_str().unwrap().to_string();

    let uri = format!("/payments/{payment_id}/complete");
    let (status, body) = call(&router, post_json(&uri, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["publisher_share"], "0.00085");
    assert_eq!(body["platform_share"], "0.00015");

    // Within the window: served with remaining time.
    let (status, body) = call(&router, post_json("/access", access.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let remaining = body["remaining_secs"].as_u64().unwrap();
    assert!(remaining > 0 && remaining <= 300);
    assert_eq!(body["cost"], "0");

    // After the window: payment required again.
    clock.advance(301);
    let (status, _body) = call(&router, post_json("/access", access)).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
}

#[tokio::test]
async fn test_access_requires_page_hash() {
    let (router, _clock) = test_router();
    let (status, body) = call(
        &router,
        post_json("/access", json!({ "page_url": "https://example.com/a" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing page_hash");
}

#[tokio::test]
async fn test_unknown_payment_is_404_and_mutates_nothing() {
    let (router, _clock) = test_router();
    let (status, _body) = call(&router, get("/payments/deadbeef")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _body) = call(&router, post_json("/payments/deadbeef/complete", json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&router, get("/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_payments"], 0);
    assert_eq!(body["total_revenue"], "0");
}

#[tokio::test]
async fn test_earnings_and_stats_reporting() {
    let (router, _clock) = test_router();
    let access = json!({
        "page_hash": "page123",
        "page_url": "https://news-site.com/story",
    });

    let (_status, body) = call(&router, post_json("/access", access.clone())).await;
    let payment_id = body["payment_id"].as_str().unwrap().to_string();
    call(
        &router,
        post_json(&format!("/payments/{payment_id}/complete"), json!({})),
    )
    .await;

    let (status, body) = call(&router, get("/earnings")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["publishers"]["news-site.com"]["payment_count"], 1);
    assert_eq!(body["total_platform_revenue"], "0.00015");

    let (status, body) = call(&router, get("/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_payments"], 1);
    assert_eq!(body["total_revenue"], "0.001");
    assert_eq!(body["unique_publishers"], 1);
    assert_eq!(body["average_payment"], "0.001");
    assert_eq!(body["active_entitlements"], 1);
}

#[tokio::test]
async fn test_balance_snapshots_track_completions() {
    let (router, _clock) = test_router();
    let (_status, body) = call(&router, get("/balance-snapshots")).await;
    assert_eq!(body["total_count"], 0);

    let (_status, body) = call(
        &router,
        Request::post("/proxy/ml-inference/predict")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    let payment_id = body["payment_id"].as_str().unwrap().to_string();
    let uri = format!("/payments/{payment_id}/complete");
    call(&router, post_json(&uri, json!({}))).await;
    // Idempotent retry must not add a second snapshot.
    call(&router, post_json(&uri, json!({}))).await;

    let (status, body) = call(&router, get("/balance-snapshots")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_count"], 1);
    let snapshot = &body["balance_snapshots"][0];
    assert_eq!(snapshot["payment_id"], payment_id.as_str());
    assert_eq!(snapshot["amount_debited"], "0.01");
    assert_eq!(snapshot["resource"], "api:ml-inference/predict");
}

#[tokio::test]
async fn test_owner_verification() {
    let (router, _clock) = test_router();

    let (status, body) = call(
        &router,
        post_json(
            "/owners/verify",
            json!({ "domain": "example.com", "certificate": "mock_cert_example_com" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], true);

    let (status, body) = call(
        &router,
        post_json(
            "/owners/verify",
            json!({ "domain": "example.com", "certificate": "forged" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["verified"], false);

    let (status, body) = call(&router, post_json("/owners/verify", json!({ "domain": "x" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing certificate");
}

#[tokio::test]
async fn test_concurrent_completions_credit_once() {
    let (router, _clock) = test_router();
    let (_status, body) = call(
        &router,
        post_json(
            "/access",
            json!({ "page_hash": "race", "page_url": "https://example.com/r" }),
        ),
    )
    .await;
    let payment_id = body["payment_id"].as_str().unwrap().to_string();
    let uri = format!("/payments/{payment_id}/complete");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let router = router.clone();
        let uri = uri.clone();
        handles.push(tokio::spawn(async move {
            let response = router.oneshot(post_json(&uri, json!({}))).await.unwrap();
            response.status()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    let (_status, body) = call(&router, get("/earnings/example.com")).await;
    assert_eq!(body["earnings"]["payment_count"], 1);
    assert_eq!(body["earnings"]["total_earned"], "0.00085");
}
