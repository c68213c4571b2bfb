//! paygate HTTP entrypoint.
//!
//! This binary launches an Axum-based HTTP server that fronts protected
//! resources with HTTP 402 payment flows.
//!
//! Endpoints:
//! - `GET /resources` – Metered API catalog and pricing
//! - `ANY /proxy/{api}/{endpoint}` – Metered access to an upstream API
//! - `POST /access` – Page (ad-free) access request
//! - `GET /payments/{id}` – Payment record lookup
//! - `POST /payments/{id}/complete` – Payment completion (idempotent)
//! - `GET /usage` – Usage receipts, paginated
//! - `GET /balance-snapshots` – Debit log, one snapshot per completed payment
//! - `GET /earnings`, `GET /earnings/{domain}` – Earnings accumulators
//! - `GET /stats` – Aggregate payment statistics
//! - `POST /owners/verify` – Publisher certificate check
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT` control the binding address
//! - `CONFIG` points at the JSON configuration file
//! - `OTEL_*` variables enable tracing export

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use tower_http::cors;
use tower_http::trace::TraceLayer;

use paygate::config::Config;
use paygate::external::{MockUpstream, PublisherEntry, StaticOwnerRegistry};
use paygate::gateway::Gateway;
use paygate::handlers;
use paygate::ledger::InMemoryLedger;
use paygate::shutdown::ShutdownSignal;
use paygate::telemetry::Telemetry;
use paygate::timestamp::SystemClock;

/// Initializes the paygate server.
///
/// - Loads `.env` variables.
/// - Initializes tracing (and OTLP export when configured).
/// - Builds the in-memory ledger and the gateway dispatcher.
/// - Starts an Axum HTTP server with graceful shutdown.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let _telemetry = Telemetry::init(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;

    let ledger = Arc::new(InMemoryLedger::new());
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
        ledger,
        registry.clone(),
        registry,
        Arc::new(MockUpstream),
        Arc::new(SystemClock),
    );
    let axum_state = Arc::new(gateway);

    let http_endpoints = Router::new()
        .merge(handlers::routes().with_state(axum_state))
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host(), config.port());
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!("Failed to bind to {}: {}", addr, e))?;

    let shutdown = ShutdownSignal::install()?;
    let cancellation_token = shutdown.token();
    let graceful_shutdown = async move { cancellation_token.cancelled().await };
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(graceful_shutdown)
        .await?;

    Ok(())
}
