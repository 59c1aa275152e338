//! EVM JSON-RPC client — read-only `eth_call` against the campaign and token
//! contracts.
//!
//! ## Resilience
//!
//! * Exponential back-off is applied on transport errors, non-success HTTP
//!   statuses, unparseable bodies and soft JSON-RPC errors, up to
//!   [`MAX_BACKOFF_SECS`] seconds between attempts.
//! * Reads give up after [`MAX_ATTEMPTS`] tries so a request handler never
//!   waits indefinitely on a dead endpoint.
//! * Writes never go through this module; transactions are submitted via the
//!   wallet service exactly once.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use ethers::abi::{ParamType, Token};
use ethers::types::{Address, U256};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::calls::{self, hex_address};
use crate::campaign::Campaign;
use crate::errors::{GatewayError, Result};
use crate::networks::Network;

const MAX_BACKOFF_SECS: u64 = 8;
const INITIAL_BACKOFF_SECS: u64 = 1;
const MAX_ATTEMPTS: u32 = 4;

// ─────────────────────────────────────────────────────────
// JSON-RPC response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    pub result: Option<String>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    /// Malformed requests and reverts will not succeed on retry.
    fn is_hard(&self) -> bool {
        matches!(self.code, -32600 | -32601 | -32602 | 3) || self.message.contains("revert")
    }
}

// ─────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────

/// Execute a read-only call and return the raw return data.
pub async fn eth_call(client: &Client, rpc_url: &str, to: &Address, data: &[u8]) -> Result<Vec<u8>> {
    let mut backoff = INITIAL_BACKOFF_SECS;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let response = client
            .post(rpc_url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "eth_call",
                "params": build_params(to, data),
            }))
            .send()
            .await;

        let retry_reason = match response {
            Err(e) => format!("RPC request failed: {e}"),
            Ok(resp) if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                "Rate-limited by RPC".to_string()
            }
            Ok(resp) if !resp.status().is_success() => {
                format!("RPC returned HTTP {}", resp.status())
            }
            Ok(resp) => match resp.json::<RpcResponse>().await {
                Err(e) => format!("Malformed RPC response: {e}"),
                Ok(body) => match (body.result, body.error) {
                    (_, Some(err)) if err.is_hard() => {
                        return Err(GatewayError::Rpc(format!(
                            "eth_call hard error {}: {}",
                            err.code, err.message
                        )));
                    }
                    (_, Some(err)) => format!("RPC soft error {} {}", err.code, err.message),
                    (Some(result), None) => {
                        let bytes = decode_hex(&result)?;
                        debug!("eth_call to {} returned {} bytes", hex_address(to), bytes.len());
                        return Ok(bytes);
                    }
                    (None, None) => {
                        return Err(GatewayError::Rpc("Empty result from eth_call".to_string()));
                    }
                },
            },
        };

        if attempt >= MAX_ATTEMPTS {
            return Err(GatewayError::Rpc(format!(
                "{retry_reason} (gave up after {attempt} attempts)"
            )));
        }
        warn!("{retry_reason} (will retry in {backoff}s)");
        tokio::time::sleep(Duration::from_secs(backoff)).await;
        backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
    }
}

fn build_params(to: &Address, data: &[u8]) -> Value {
    json!([
        {
            "to": hex_address(to),
            "data": format!("0x{}", hex::encode(data)),
        },
        "latest"
    ])
}

fn decode_hex(raw: &str) -> Result<Vec<u8>> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(digits).map_err(|e| GatewayError::Rpc(format!("Malformed eth_call result: {e}")))
}

// ─────────────────────────────────────────────────────────
// Contract views
// ─────────────────────────────────────────────────────────

/// `getAllCampaigns()` on the campaign contract.
pub async fn fetch_campaigns(client: &Client, rpc_url: &str, contract: &Address) -> Result<Vec<Campaign>> {
    let data = calls::encode_call(calls::GET_ALL_CAMPAIGNS, &[]);
    let output = eth_call(client, rpc_url, contract, &data).await?;
    Campaign::decode_list(&output)
}

/// `decimals()` on an ERC-20 token.
pub async fn fetch_decimals(client: &Client, rpc_url: &str, token: &Address) -> Result<u8> {
    let data = calls::encode_call(calls::DECIMALS, &[]);
    let output = eth_call(client, rpc_url, token, &data).await?;
    decode_decimals(&output)
}

fn decode_decimals(output: &[u8]) -> Result<u8> {
    match ethers::abi::decode(&[ParamType::Uint(8)], output)?.pop() {
        Some(Token::Uint(v)) if v <= U256::from(u8::MAX) => Ok(v.as_u32() as u8),
        other => Err(GatewayError::Decode(format!(
            "unexpected decimals() output: {other:?}"
        ))),
    }
}

// ─────────────────────────────────────────────────────────
// Campaign reads
// ─────────────────────────────────────────────────────────

#[async_trait]
pub trait CampaignReader: Send + Sync {
    async fn list_campaigns(&self, network: Network) -> Result<Vec<Campaign>>;

    async fn get_campaign(&self, network: Network, id: U256) -> Result<Campaign> {
        self.list_campaigns(network)
            .await?
            .into_iter()
            .find(|c| c.id == id)
            .ok_or_else(|| GatewayError::NotFound(format!("Campaign {id} on {network}")))
    }
}

/// Reads campaign snapshots straight from the contract on each request.
pub struct ChainReader {
    client: Client,
    rpc_urls: HashMap<Network, String>,
}

impl ChainReader {
    pub fn new(client: Client, rpc_urls: HashMap<Network, String>) -> Self {
        Self { client, rpc_urls }
    }
}

#[async_trait]
impl CampaignReader for ChainReader {
    async fn list_campaigns(&self, network: Network) -> Result<Vec<Campaign>> {
        let rpc_url = self.rpc_urls.get(&network).ok_or_else(|| {
            GatewayError::Config(format!(
                "No RPC endpoint configured for {network} (set {})",
                network.rpc_env_key()
            ))
        })?;
        let contract = network.contract_address()?;
        fetch_campaigns(&self.client, rpc_url, &contract).await
    }
}

#[cfg(test)]
pub(crate) mod stub {
    //! Local HTTP endpoint that answers each connection with the next canned
    //! `(status, body)` pair, then stops accepting.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    pub struct RpcStub {
        pub url: String,
        pub hits: Arc<AtomicUsize>,
    }

    impl RpcStub {
        pub fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    /// JSON-RPC success body carrying `result`.
    pub fn result_body(result: &str) -> (u16, String) {
        (200, format!(r#"{{"jsonrpc":"2.0","id":1,"result":"{result}"}}"#))
    }

    pub async fn serve(responses: Vec<(u16, String)>) -> RpcStub {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                read_request(&mut socket).await;
                counter.fetch_add(1, Ordering::SeqCst);
                let reply = format!(
                    "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        RpcStub { url, hits }
    }

    /// Consume headers and a `Content-Length` body.
    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                return;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_use_lowercase_hex_and_latest_block() {
        let params = build_params(&Address::repeat_byte(0xAB), &[0x31, 0x3c, 0xe5, 0x67]);
        assert_eq!(params[0]["to"], format!("0x{}", "ab".repeat(20)));
        assert_eq!(params[0]["data"], "0x313ce567");
        assert_eq!(params[1], "latest");
    }

    #[test]
    fn decodes_hex_results() {
        assert_eq!(decode_hex("0x0a0b").unwrap(), vec![0x0a, 0x0b]);
        assert_eq!(decode_hex("0x").unwrap(), Vec::<u8>::new());
        assert!(decode_hex("0xzz").is_err());
    }

    #[test]
    fn decodes_decimals_word() {
        let word = ethers::abi::encode(&[Token::Uint(U256::from(6))]);
        assert_eq!(decode_decimals(&word).unwrap(), 6);
    }

    #[test]
    fn classifies_hard_errors() {
        let revert = RpcError {
            code: -32000,
            message: "execution reverted".to_string(),
        };
        let busy = RpcError {
            code: -32005,
            message: "limit exceeded".to_string(),
        };
        assert!(revert.is_hard());
        assert!(!busy.is_hard());
    }

    #[tokio::test]
    async fn reader_without_rpc_endpoint_is_misconfigured() {
        let reader = ChainReader::new(Client::new(), HashMap::new());
        let err = reader.list_campaigns(Network::BaseSepolia).await.unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    fn word(value: u64) -> String {
        format!("0x{}", hex::encode(ethers::abi::encode(&[Token::Uint(U256::from(value))])))
    }

    #[tokio::test]
    async fn retries_after_unavailable_gateway() {
        let stub = stub::serve(vec![
            (503, "<html>503 Service Unavailable</html>".to_string()),
            stub::result_body("0x0a0b"),
        ])
        .await;
        let data = eth_call(&Client::new(), &stub.url, &Address::zero(), &[0x01])
            .await
            .unwrap();
        assert_eq!(data, vec![0x0a, 0x0b]);
        assert_eq!(stub.hits(), 2);
    }

    #[tokio::test]
    async fn retries_after_unparseable_body() {
        let stub = stub::serve(vec![
            (200, "<html>upstream hiccup</html>".to_string()),
            stub::result_body("0x01"),
        ])
        .await;
        let data = eth_call(&Client::new(), &stub.url, &Address::zero(), &[0x01])
            .await
            .unwrap();
        assert_eq!(data, vec![0x01]);
        assert_eq!(stub.hits(), 2);
    }

    #[tokio::test]
    async fn revert_is_returned_without_retry() {
        let stub = stub::serve(vec![
            (
                200,
                r#"{"jsonrpc":"2.0","id":1,"error":{"code":3,"message":"execution reverted"}}"#.to_string(),
            ),
            stub::result_body("0x01"),
        ])
        .await;
        let err = eth_call(&Client::new(), &stub.url, &Address::zero(), &[0x01])
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rpc(_)));
        assert_eq!(stub.hits(), 1);
    }

    #[tokio::test]
    async fn reads_token_decimals() {
        let stub = stub::serve(vec![stub::result_body(&word(6))]).await;
        let decimals = fetch_decimals(&Client::new(), &stub.url, &Address::repeat_byte(0x01))
            .await
            .unwrap();
        assert_eq!(decimals, 6);
    }

    #[tokio::test]
    async fn reader_decodes_campaigns_from_endpoint() {
        let empty = format!("0x{}", hex::encode(ethers::abi::encode(&[Token::Array(vec![])])));
        let stub = stub::serve(vec![stub::result_body(&empty), stub::result_body(&empty)]).await;
        let reader = ChainReader::new(
            Client::new(),
            HashMap::from([(Network::BaseSepolia, stub.url.clone())]),
        );
        assert!(reader.list_campaigns(Network::BaseSepolia).await.unwrap().is_empty());
        assert!(matches!(
            reader.get_campaign(Network::BaseSepolia, U256::from(1)).await,
            Err(GatewayError::NotFound(_))
        ));
    }
}
