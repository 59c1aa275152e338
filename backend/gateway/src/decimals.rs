//! Token precision lookup.
//!
//! Decimals are read from the token contract the first time a
//! `(network, token)` pair is used and cached until explicitly invalidated.
//! Networks without a configured RPC endpoint fall back to the static
//! precision in [`TokenSymbol::default_decimals`].

use std::collections::HashMap;

use reqwest::Client;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::errors::Result;
use crate::networks::{Network, TokenSymbol};
use crate::rpc;

pub struct DecimalsRegistry {
    client: Client,
    rpc_urls: HashMap<Network, String>,
    cache: RwLock<HashMap<(Network, TokenSymbol), u8>>,
}

impl DecimalsRegistry {
    pub fn new(client: Client, rpc_urls: HashMap<Network, String>) -> Self {
        Self {
            client,
            rpc_urls,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn decimals(&self, network: Network, token: TokenSymbol) -> Result<u8> {
        if let Some(cached) = self.cache.read().await.get(&(network, token)) {
            return Ok(*cached);
        }

        let Some(rpc_url) = self.rpc_urls.get(&network) else {
            return Ok(token.default_decimals());
        };

        let address = network.token_address(token)?;
        let decimals = rpc::fetch_decimals(&self.client, rpc_url, &address).await?;
        if decimals != token.default_decimals() {
            warn!(
                "{} on {network} reports {decimals} decimals (expected {})",
                token.as_str(),
                token.default_decimals()
            );
        }

        self.cache.write().await.insert((network, token), decimals);
        Ok(decimals)
    }

    /// Drop the cached precision so the next lookup queries the contract again.
    pub async fn invalidate(&self, network: Network, token: TokenSymbol) {
        if self.cache.write().await.remove(&(network, token)).is_some() {
            info!("Invalidated cached decimals for {} on {network}", token.as_str());
        }
    }

    #[cfg(test)]
    pub async fn seed(&self, network: Network, token: TokenSymbol, decimals: u8) {
        self.cache.write().await.insert((network, token), decimals);
    }
}
