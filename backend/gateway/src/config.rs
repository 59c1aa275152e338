//! Application configuration loaded from environment variables.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{GatewayError, Result};
use crate::networks::Network;
use crate::tracker::TrackerPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the REST API server
    pub api_port: u16,
    /// Path to the SQLite database file
    pub database_url: String,
    /// Base URL of the wallet-abstraction service
    pub wallet_api_url: String,
    /// Server-side key sent to the wallet service, if it requires one
    pub wallet_api_key: Option<String>,
    /// JSON-RPC endpoint per network, used for contract reads
    pub rpc_urls: HashMap<Network, String>,
    /// Credential issuer base URL
    pub credential_issuer_url: String,
    /// Token attached as `X-API-Token` on issuer calls
    pub credential_api_token: String,
    /// Cached credentials older than this are ignored (0 = never expire)
    pub credential_cache_ttl_secs: u64,
    /// Blob publisher base URL (uploads)
    pub blob_publisher_url: String,
    /// Blob aggregator base URL (public reads)
    pub blob_aggregator_url: String,
    /// Storage epochs requested per upload
    pub blob_epochs: u32,
    /// Largest accepted upload body
    pub max_upload_bytes: usize,
    /// Timeout applied to every outbound HTTP call
    pub http_timeout_secs: u64,
    /// Maximum order-history lookups per tracked job
    pub tracker_max_attempts: u32,
    /// First delay between lookups
    pub tracker_initial_backoff_secs: u64,
    /// Upper bound on the delay between lookups
    pub tracker_max_backoff_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mut rpc_urls = HashMap::new();
        for network in Network::ALL {
            if let Ok(url) = env_var(&network.rpc_env_key()) {
                if !url.trim().is_empty() {
                    rpc_urls.insert(network, url);
                }
            }
        }

        Ok(Config {
            api_port: parse_var("API_PORT", "3001")?,
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./inflection.db".to_string()),
            wallet_api_url: env_var("WALLET_API_URL").map_err(|_| {
                GatewayError::Config("WALLET_API_URL environment variable is required".to_string())
            })?,
            wallet_api_key: env_var("WALLET_API_KEY").ok().filter(|k| !k.is_empty()),
            rpc_urls,
            credential_issuer_url: env_var("CREDENTIAL_ISSUER_URL")
                .unwrap_or_else(|_| "https://issuer.humanity.org".to_string()),
            credential_api_token: env_var("CREDENTIAL_API_TOKEN").unwrap_or_default(),
            credential_cache_ttl_secs: parse_var("CREDENTIAL_CACHE_TTL_SECS", "0")?,
            blob_publisher_url: env_var("BLOB_PUBLISHER_URL")
                .unwrap_or_else(|_| "https://publisher.walrus-testnet.walrus.space".to_string()),
            blob_aggregator_url: env_var("BLOB_AGGREGATOR_URL")
                .unwrap_or_else(|_| "https://aggregator.walrus-testnet.walrus.space".to_string()),
            blob_epochs: parse_var("BLOB_EPOCHS", "1")?,
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", "10485760")?,
            http_timeout_secs: parse_var("HTTP_TIMEOUT_SECS", "30")?,
            tracker_max_attempts: parse_var("TRACKER_MAX_ATTEMPTS", "10")?,
            tracker_initial_backoff_secs: parse_var("TRACKER_INITIAL_BACKOFF_SECS", "2")?,
            tracker_max_backoff_secs: parse_var("TRACKER_MAX_BACKOFF_SECS", "60")?,
        })
    }

    pub fn tracker_policy(&self) -> TrackerPolicy {
        TrackerPolicy {
            max_attempts: self.tracker_max_attempts.max(1),
            initial_backoff: Duration::from_secs(self.tracker_initial_backoff_secs),
            max_backoff: Duration::from_secs(self.tracker_max_backoff_secs),
        }
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            api_port: 0,
            database_url: "sqlite::memory:".to_string(),
            wallet_api_url: "http://wallet.invalid".to_string(),
            wallet_api_key: None,
            rpc_urls: HashMap::new(),
            credential_issuer_url: "http://issuer.invalid".to_string(),
            credential_api_token: String::new(),
            credential_cache_ttl_secs: 0,
            blob_publisher_url: "http://publisher.invalid".to_string(),
            blob_aggregator_url: "http://aggregator.invalid".to_string(),
            blob_epochs: 1,
            max_upload_bytes: 1024,
            http_timeout_secs: 1,
            tracker_max_attempts: 3,
            tracker_initial_backoff_secs: 0,
            tracker_max_backoff_secs: 0,
        }
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| GatewayError::Config(format!("Missing env var: {key}")))
}

fn parse_var<T: FromStr>(key: &str, default: &str) -> Result<T> {
    env_var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| GatewayError::Config(format!("Invalid {key}")))
}
