//! Axum REST API handlers.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::info;

use crate::blobs::{BlobStore, UploadedBlob};
use crate::campaign::Campaign;
use crate::config::Config;
use crate::credentials::{self, CredentialIssuer, IssueRequest};
use crate::db::{self, SubmissionRecord};
use crate::decimals::DecimalsRegistry;
use crate::errors::{GatewayError, Result};
use crate::flow::{self, CreateCampaignRequest, DonationReceipt, DonationRequest, Receipt, TransactionRequest};
use crate::networks::{Network, TokenSymbol};
use crate::rpc::CampaignReader;
use crate::tracker::{Resolution, TrackerState};
use crate::wallet::{WalletAccount, WalletService, WalletSession};

pub struct ApiState {
    pub pool: SqlitePool,
    pub config: Config,
    pub wallet: Arc<dyn WalletService>,
    pub campaigns: Arc<dyn CampaignReader>,
    pub decimals: DecimalsRegistry,
    pub issuer: CredentialIssuer,
    pub blobs: BlobStore,
    pub tracker: Arc<TrackerState>,
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub id_token: String,
    pub provider: String,
}

#[derive(Serialize)]
pub struct CampaignsResponse {
    pub network: Network,
    pub count: usize,
    pub campaigns: Vec<Campaign>,
}

#[derive(Serialize)]
pub struct SubmissionsResponse {
    pub sender: String,
    pub count: usize,
    pub submissions: Vec<SubmissionRecord>,
}

#[derive(Serialize)]
pub struct DecimalsResponse {
    pub network: Network,
    pub token: TokenSymbol,
    pub decimals: u8,
}

/// Session token from `Authorization: Bearer …`.
fn session_token(headers: &HeaderMap) -> Result<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .ok_or(GatewayError::Unauthorized)
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /auth/session`
pub async fn login(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<WalletSession>> {
    let session = state.wallet.login_using_oauth(&req.id_token, &req.provider).await?;
    info!("Wallet session opened via {}", req.provider);
    Ok(Json(session))
}

/// `GET /accounts`
pub async fn accounts(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<WalletAccount>>> {
    let session = session_token(&headers)?;
    Ok(Json(state.wallet.get_account(&session).await?))
}

/// `GET /networks/:network/campaigns`
pub async fn list_campaigns(
    State(state): State<Arc<ApiState>>,
    Path(network): Path<String>,
) -> Result<Json<CampaignsResponse>> {
    let network = Network::from_str(&network)?;
    let campaigns = state.campaigns.list_campaigns(network).await?;
    Ok(Json(CampaignsResponse {
        network,
        count: campaigns.len(),
        campaigns,
    }))
}

/// `GET /networks/:network/campaigns/:id`
pub async fn get_campaign(
    State(state): State<Arc<ApiState>>,
    Path((network, id)): Path<(String, u64)>,
) -> Result<Json<Campaign>> {
    let network = Network::from_str(&network)?;
    Ok(Json(state.campaigns.get_campaign(network, U256::from(id)).await?))
}

/// `POST /networks/:network/tokens/:token/decimals/refresh`
///
/// Drops the cached precision and reads it again.
pub async fn refresh_decimals(
    State(state): State<Arc<ApiState>>,
    Path((network, token)): Path<(String, String)>,
) -> Result<Json<DecimalsResponse>> {
    let network = Network::from_str(&network)?;
    let token = TokenSymbol::from_str(&token)?;
    state.decimals.invalidate(network, token).await;
    let decimals = state.decimals.decimals(network, token).await?;
    Ok(Json(DecimalsResponse {
        network,
        token,
        decimals,
    }))
}

/// `POST /campaigns`
pub async fn create_campaign(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(req): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<Receipt>)> {
    let session = session_token(&headers)?;
    let receipt = flow::create_campaign(&state, &session, &req).await?;
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

/// `POST /campaigns/:id/donations`
pub async fn donate(
    State(state): State<Arc<ApiState>>,
    Path(campaign_id): Path<u64>,
    headers: HeaderMap,
    Json(req): Json<DonationRequest>,
) -> Result<(StatusCode, Json<DonationReceipt>)> {
    let session = session_token(&headers)?;
    let receipt = flow::donate(&state, &session, campaign_id, &req).await?;
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

/// `POST /transactions`
pub async fn submit_transaction(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(req): Json<TransactionRequest>,
) -> Result<(StatusCode, Json<Receipt>)> {
    let session = session_token(&headers)?;
    let receipt = flow::execute(&state, &session, &req).await?;
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

/// `GET /submissions/:job_id`
pub async fn get_submission(
    State(state): State<Arc<ApiState>>,
    Path(job_id): Path<String>,
) -> Result<Json<SubmissionRecord>> {
    db::get_submission(&state.pool, &job_id)
        .await?
        .map(Json)
        .ok_or_else(|| GatewayError::NotFound(format!("Submission {job_id}")))
}

/// `GET /senders/:address/submissions`
pub async fn sender_submissions(
    State(state): State<Arc<ApiState>>,
    Path(sender): Path<String>,
) -> Result<Json<SubmissionsResponse>> {
    let sender = sender.to_lowercase();
    let submissions = db::get_submissions_for_sender(&state.pool, &sender).await?;
    Ok(Json(SubmissionsResponse {
        count: submissions.len(),
        sender,
        submissions,
    }))
}

/// `POST /submissions/:job_id/resolve`
pub async fn resolve_submission(
    State(state): State<Arc<ApiState>>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Resolution>> {
    let session = session_token(&headers)?;
    Ok(Json(flow::resolve_submission(&state, &session, &job_id).await?))
}

/// `POST /credentials/issue`
pub async fn issue_credential(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let request = IssueRequest::from_body(&body)?;
    let credential = credentials::issue_and_cache(&state.issuer, &state.pool, &request).await?;
    Ok(Json(credential))
}

/// `POST /credentials/verify`
///
/// The issuer's status code and body are passed through unchanged.
pub async fn verify_credential(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>)> {
    let (status, data) = state.issuer.verify(&body).await?;
    Ok((status, Json(data)))
}

/// `GET /credentials/:subject`
pub async fn cached_credential(
    State(state): State<Arc<ApiState>>,
    Path(subject): Path<String>,
) -> Result<Json<Value>> {
    let credential = credentials::cached(
        &state.pool,
        &subject,
        state.config.credential_cache_ttl_secs,
        chrono::Utc::now().timestamp(),
    )
    .await?;
    Ok(Json(credential))
}

/// `PUT /uploads`
pub async fn upload(State(state): State<Arc<ApiState>>, body: Bytes) -> Result<Json<UploadedBlob>> {
    Ok(Json(state.blobs.upload(body.to_vec()).await?))
}
