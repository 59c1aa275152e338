//! Verifiable-credential issuer proxy.
//!
//! Requests are forwarded to the external issuer with the server-side API
//! token attached. No signature or trust checks happen here; the issuer's
//! answer is returned as-is. Successfully issued credentials are cached per
//! subject address so a client can pick them up again later.

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db;
use crate::errors::{GatewayError, Result};

#[derive(Clone)]
pub struct CredentialIssuer {
    base_url: String,
    api_token: String,
    client: Client,
}

/// Validated body of an issue request.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueRequest {
    pub subject_address: String,
    pub claims: Value,
}

impl IssueRequest {
    /// Presence checks only: a non-empty subject and a non-null claim set.
    pub fn from_body(body: &Value) -> Result<Self> {
        let subject_address = body
            .get("subject_address")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GatewayError::BadRequest("Subject address is required".to_string()))?;

        let claims = body
            .get("claims")
            .filter(|c| !c.is_null())
            .cloned()
            .ok_or_else(|| GatewayError::BadRequest("Claims are required".to_string()))?;

        Ok(Self {
            subject_address: subject_address.to_string(),
            claims,
        })
    }
}

impl CredentialIssuer {
    pub fn new(base_url: String, api_token: String, client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            client,
        }
    }

    async fn post(&self, path: &str, body: &Value) -> Result<(StatusCode, Value)> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header("X-API-Token", &self.api_token)
            .header("Accept", "*/*")
            .json(body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        let data = serde_json::from_str(&text).unwrap_or(Value::String(text));
        info!("Issuer {path} responded with {status}");
        Ok((status, data))
    }

    pub async fn issue(&self, request: &IssueRequest) -> Result<Value> {
        info!("Issuing credential for {}", request.subject_address);
        let body = json!({
            "subject_address": request.subject_address,
            "claims": request.claims,
        });
        let (status, data) = self.post("/credentials/issue", &body).await?;
        if !status.is_success() {
            warn!("Issuer rejected credential for {}: {data}", request.subject_address);
            return Err(GatewayError::external(
                status.as_u16(),
                format!("Failed to issue credential: {data}"),
            ));
        }
        Ok(data)
    }

    /// Forward a verify body untouched, returning the issuer's status and body.
    pub async fn verify(&self, body: &Value) -> Result<(StatusCode, Value)> {
        self.post("/credentials/verify", body).await
    }
}

/// Issue a credential and remember it for `subject_address`.
pub async fn issue_and_cache(
    issuer: &CredentialIssuer,
    pool: &SqlitePool,
    request: &IssueRequest,
) -> Result<Value> {
    let credential = issuer.issue(request).await?;
    let issued_at = chrono::Utc::now().timestamp();
    db::save_credential(
        pool,
        &request.subject_address.to_lowercase(),
        &credential.to_string(),
        issued_at,
    )
    .await?;
    Ok(credential)
}

/// Cached credential for `subject`, unless older than `ttl_secs` (0 disables expiry).
pub async fn cached(pool: &SqlitePool, subject: &str, ttl_secs: u64, now: i64) -> Result<Value> {
    let not_found = || GatewayError::NotFound(format!("No credential cached for {subject}"));
    let row = db::get_credential(pool, &subject.to_lowercase())
        .await?
        .ok_or_else(not_found)?;

    if ttl_secs > 0 && now.saturating_sub(row.issued_at) > ttl_secs as i64 {
        return Err(not_found());
    }
    Ok(serde_json::from_str(&row.credential)?)
}
