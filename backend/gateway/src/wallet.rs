//! Wallet-abstraction service client.
//!
//! The wallet service signs, broadcasts and retries transactions on our
//! behalf; this module only dispatches requests and reads job history.
//! Every call carries the caller's session token; the gateway never stores
//! it.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::calls::RawTransactionEnvelope;
use crate::errors::{GatewayError, Result};

/// Opaque identifier of an in-flight wallet job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(pub String);

impl JobHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSession {
    pub session_token: String,
    #[serde(default)]
    pub user_address: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAccount {
    pub address: String,
    pub network: String,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransferParams {
    /// Smallest-unit amount as a decimal string.
    pub amount: String,
    pub recipient: String,
    pub token: String,
    pub caip2_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentType {
    RawTransaction,
    TokenTransfer,
}

impl IntentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RawTransaction => "RAW_TRANSACTION",
            Self::TokenTransfer => "TOKEN_TRANSFER",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderFilter {
    pub intent_id: JobHandle,
    pub intent_type: IntentType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub intent_id: String,
    pub intent_type: String,
    /// `SUCCESSFUL`, `FAILED`, `PENDING` or `REJECTED`.
    pub status: String,
    #[serde(default)]
    pub network_name: Option<String>,
    #[serde(default)]
    pub transaction_hash: Option<Vec<String>>,
}

#[async_trait]
pub trait WalletService: Send + Sync {
    async fn login_using_oauth(&self, id_token: &str, provider: &str) -> Result<WalletSession>;

    async fn get_account(&self, session: &str) -> Result<Vec<WalletAccount>>;

    async fn token_transfer(&self, session: &str, params: &TokenTransferParams) -> Result<JobHandle>;

    async fn evm_raw_transaction(
        &self,
        session: &str,
        envelope: &RawTransactionEnvelope,
    ) -> Result<JobHandle>;

    async fn get_orders_history(&self, session: &str, filter: &OrderFilter) -> Result<Vec<OrderRecord>>;
}

/// Every wallet response wraps its payload in `{"data": …}`.
#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobData {
    job_id: String,
}

#[derive(Clone)]
pub struct HttpWalletService {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpWalletService {
    pub fn new(base_url: String, api_key: Option<String>, client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder, session: Option<&str>) -> RequestBuilder {
        let request = match &self.api_key {
            Some(key) => request.header("X-API-Key", key),
            None => request,
        };
        match session {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Dispatch a job; any failure is a [`GatewayError::SubmissionFailed`].
    async fn submit_job<B: Serialize + ?Sized>(&self, path: &str, session: &str, body: &B) -> Result<JobHandle> {
        let request = self.authorize(self.client.post(self.url(path)), Some(session));
        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::SubmissionFailed(format!("wallet service unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::SubmissionFailed(format!(
                "wallet service returned {status}: {text}"
            )));
        }

        let parsed: DataEnvelope<JobData> = response
            .json()
            .await
            .map_err(|e| GatewayError::SubmissionFailed(format!("malformed job response: {e}")))?;
        info!("Wallet job {} accepted via {path}", parsed.data.job_id);
        Ok(JobHandle(parsed.data.job_id))
    }
}

async fn read_data<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(GatewayError::external(status.as_u16(), text));
    }
    let parsed: DataEnvelope<T> = response.json().await?;
    Ok(parsed.data)
}

#[async_trait]
impl WalletService for HttpWalletService {
    async fn login_using_oauth(&self, id_token: &str, provider: &str) -> Result<WalletSession> {
        let request = self.authorize(self.client.post(self.url("/auth/oauth")), None);
        let response = request
            .json(&json!({ "idToken": id_token, "provider": provider }))
            .send()
            .await?;
        read_data(response).await
    }

    async fn get_account(&self, session: &str) -> Result<Vec<WalletAccount>> {
        let request = self.authorize(self.client.get(self.url("/accounts")), Some(session));
        read_data(request.send().await?).await
    }

    async fn token_transfer(&self, session: &str, params: &TokenTransferParams) -> Result<JobHandle> {
        self.submit_job("/jobs/token-transfer", session, params).await
    }

    async fn evm_raw_transaction(
        &self,
        session: &str,
        envelope: &RawTransactionEnvelope,
    ) -> Result<JobHandle> {
        self.submit_job("/jobs/raw-transaction", session, envelope).await
    }

    async fn get_orders_history(&self, session: &str, filter: &OrderFilter) -> Result<Vec<OrderRecord>> {
        let request = self
            .authorize(self.client.get(self.url("/orders")), Some(session))
            .query(&[
                ("intent_id", filter.intent_id.as_str()),
                ("intent_type", filter.intent_type.as_str()),
            ]);
        let orders: Vec<OrderRecord> = read_data(request.send().await?).await?;
        debug!(
            "Order history for {} returned {} records",
            filter.intent_id,
            orders.len()
        );
        Ok(orders)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory wallet used by flow and tracker tests.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MockWallet {
        pub fail_submissions: bool,
        /// Fail only raw transactions; token transfers still go through.
        pub fail_raw_transactions: bool,
        pub submissions: AtomicUsize,
        pub lookups: AtomicUsize,
        pub raw_transactions: Mutex<Vec<RawTransactionEnvelope>>,
        pub transfers: Mutex<Vec<TokenTransferParams>>,
        /// Orders the service "knows about", keyed by job id.
        pub orders: Mutex<HashMap<String, Vec<OrderRecord>>>,
    }

    impl MockWallet {
        pub fn failing() -> Self {
            Self {
                fail_submissions: true,
                ..Default::default()
            }
        }

        pub fn failing_raw_transactions() -> Self {
            Self {
                fail_raw_transactions: true,
                ..Default::default()
            }
        }

        pub fn record_order(&self, job: &JobHandle, status: &str) {
            self.record_order_as(job, IntentType::RawTransaction, status);
        }

        pub fn record_order_as(&self, job: &JobHandle, intent: IntentType, status: &str) {
            self.orders.lock().unwrap().entry(job.0.clone()).or_default().push(OrderRecord {
                intent_id: job.0.clone(),
                intent_type: intent.as_str().to_string(),
                status: status.to_string(),
                network_name: None,
                transaction_hash: None,
            });
        }

        fn next_job(&self) -> Result<JobHandle> {
            if self.fail_submissions {
                return Err(GatewayError::SubmissionFailed("wallet service unreachable".into()));
            }
            let n = self.submissions.fetch_add(1, Ordering::SeqCst);
            Ok(JobHandle(format!("job-{n}")))
        }
    }

    #[async_trait]
    impl WalletService for MockWallet {
        async fn login_using_oauth(&self, id_token: &str, _provider: &str) -> Result<WalletSession> {
            Ok(WalletSession {
                session_token: format!("session-for-{id_token}"),
                user_address: None,
                expires_at: None,
            })
        }

        async fn get_account(&self, _session: &str) -> Result<Vec<WalletAccount>> {
            Ok(vec![WalletAccount {
                address: "0x1111111111111111111111111111111111111111".to_string(),
                network: "BASE_SEPOLIA".to_string(),
                symbol: "ETH".to_string(),
            }])
        }

        async fn token_transfer(&self, _session: &str, params: &TokenTransferParams) -> Result<JobHandle> {
            let job = self.next_job()?;
            self.transfers.lock().unwrap().push(params.clone());
            Ok(job)
        }

        async fn evm_raw_transaction(
            &self,
            _session: &str,
            envelope: &RawTransactionEnvelope,
        ) -> Result<JobHandle> {
            if self.fail_raw_transactions {
                return Err(GatewayError::SubmissionFailed("raw transaction rejected".into()));
            }
            let job = self.next_job()?;
            self.raw_transactions.lock().unwrap().push(envelope.clone());
            Ok(job)
        }

        async fn get_orders_history(&self, _session: &str, filter: &OrderFilter) -> Result<Vec<OrderRecord>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .orders
                .lock()
                .unwrap()
                .get(filter.intent_id.as_str())
                .map(|orders| {
                    orders
                        .iter()
                        .filter(|o| o.intent_type == filter.intent_type.as_str())
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_handle_is_a_plain_string_on_the_wire() {
        let job = JobHandle("abc-123".to_string());
        assert_eq!(serde_json::to_value(&job).unwrap(), "abc-123");
    }

    #[test]
    fn parses_order_history_records() {
        let raw = r#"{"data":[{"intentId":"abc","intentType":"RAW_TRANSACTION","status":"SUCCESSFUL","transactionHash":["0xdead"]}]}"#;
        let parsed: DataEnvelope<Vec<OrderRecord>> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.data.len(), 1);
        assert_eq!(parsed.data[0].status, "SUCCESSFUL");
        assert_eq!(parsed.data[0].network_name, None);
    }

    #[test]
    fn parses_job_response() {
        let parsed: DataEnvelope<JobData> =
            serde_json::from_str(r#"{"data":{"jobId":"89214196"}}"#).unwrap();
        assert_eq!(parsed.data.job_id, "89214196");
    }

    #[test]
    fn trims_trailing_slash_from_base_url() {
        let wallet = HttpWalletService::new("https://wallet.example/api/".into(), None, Client::new());
        assert_eq!(wallet.url("/orders"), "https://wallet.example/api/orders");
    }

    #[tokio::test]
    async fn unreachable_service_is_a_submission_failure() {
        let wallet = HttpWalletService::new("http://127.0.0.1:9".into(), None, Client::new());
        let params = TokenTransferParams {
            amount: "1".into(),
            recipient: "0x".into(),
            token: "0x".into(),
            caip2_id: "eip155:84532".into(),
        };
        let err = wallet.token_transfer("session", &params).await.unwrap_err();
        assert!(matches!(err, GatewayError::SubmissionFailed(_)));
    }
}
