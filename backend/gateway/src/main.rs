//! Inflection gateway — entry point.
//!
//! Builds campaign contract calls, hands them to the wallet-abstraction
//! service and tracks the resulting jobs in SQLite. Also proxies the
//! credential issuer and blob storage behind one Axum REST API.

mod amount;
mod api;
mod blobs;
mod calls;
mod campaign;
mod config;
mod credentials;
mod db;
mod decimals;
mod errors;
mod flow;
mod networks;
mod rpc;
mod tracker;
mod wallet;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use reqwest::Client;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use blobs::BlobStore;
use config::Config;
use credentials::CredentialIssuer;
use decimals::DecimalsRegistry;
use rpc::ChainReader;
use tracker::TrackerState;
use wallet::{HttpWalletService, WalletService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;
    if config.rpc_urls.is_empty() {
        info!("No RPC endpoints configured; campaign reads disabled, static token decimals in use");
    }

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    // One HTTP client for the wallet service, RPC, issuer and blob store.
    let client = Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()?;

    let wallet: Arc<dyn WalletService> = Arc::new(HttpWalletService::new(
        config.wallet_api_url.clone(),
        config.wallet_api_key.clone(),
        client.clone(),
    ));

    let tracker = Arc::new(TrackerState {
        pool: pool.clone(),
        wallet: Arc::clone(&wallet),
        policy: config.tracker_policy(),
    });

    let api_state = Arc::new(api::ApiState {
        campaigns: Arc::new(ChainReader::new(client.clone(), config.rpc_urls.clone())),
        decimals: DecimalsRegistry::new(client.clone(), config.rpc_urls.clone()),
        issuer: CredentialIssuer::new(
            config.credential_issuer_url.clone(),
            config.credential_api_token.clone(),
            client.clone(),
        ),
        blobs: BlobStore::new(
            config.blob_publisher_url.clone(),
            config.blob_aggregator_url.clone(),
            config.blob_epochs,
            client,
        ),
        pool,
        wallet,
        tracker,
        config: config.clone(),
    });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/auth/session", post(api::login))
        .route("/accounts", get(api::accounts))
        .route("/networks/:network/campaigns", get(api::list_campaigns))
        .route("/networks/:network/campaigns/:id", get(api::get_campaign))
        .route(
            "/networks/:network/tokens/:token/decimals/refresh",
            post(api::refresh_decimals),
        )
        .route("/campaigns", post(api::create_campaign))
        .route("/campaigns/:id/donations", post(api::donate))
        .route("/transactions", post(api::submit_transaction))
        .route("/submissions/:job_id", get(api::get_submission))
        .route("/submissions/:job_id/resolve", post(api::resolve_submission))
        .route("/senders/:address/submissions", get(api::sender_submissions))
        .route("/credentials/issue", post(api::issue_credential))
        .route("/credentials/verify", post(api::verify_credential))
        .route("/credentials/:subject", get(api::cached_credential))
        .route("/uploads", put(api::upload))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(api_state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
