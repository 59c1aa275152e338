//! Static per-network deployment table.
//!
//! Every supported chain maps to the campaign contract deployed on it and to
//! the stablecoin contracts accepted there. Lookups for anything outside the
//! table fail with [`GatewayError::Config`]; there is no default network.

use std::fmt;
use std::str::FromStr;

use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::errors::{GatewayError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Network {
    BaseSepolia,
    PolygonAmoy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Campaign contract address.
    pub contract_address: &'static str,
    /// CAIP-2 chain identifier.
    pub caip2_id: &'static str,
}

const BASE_SEPOLIA: NetworkConfig = NetworkConfig {
    contract_address: "0x5fC6413edE9655F30FE178c581fe4825766E3f36",
    caip2_id: "eip155:84532",
};

const POLYGON_AMOY: NetworkConfig = NetworkConfig {
    contract_address: "0x68B6D84180B055D4D5f2C44aEb1572452470765E",
    caip2_id: "eip155:80002",
};

impl Network {
    pub const ALL: [Network; 2] = [Network::BaseSepolia, Network::PolygonAmoy];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BaseSepolia => "BASE_SEPOLIA",
            Self::PolygonAmoy => "POLYGON_AMOY",
        }
    }

    pub fn config(&self) -> &'static NetworkConfig {
        match self {
            Self::BaseSepolia => &BASE_SEPOLIA,
            Self::PolygonAmoy => &POLYGON_AMOY,
        }
    }

    pub fn contract_address(&self) -> Result<Address> {
        parse_configured_address(self.config().contract_address, self.as_str())
    }

    /// Address of `token` on this network. An empty table entry means the
    /// token is not deployed here.
    pub fn token_address(&self, token: TokenSymbol) -> Result<Address> {
        let raw = match (self, token) {
            (Self::BaseSepolia, TokenSymbol::Usdc) => "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
            (Self::BaseSepolia, TokenSymbol::Rlusd) => "0x93740e0575c71D4b5F0E50b79976d446c5c12474",
            (Self::PolygonAmoy, TokenSymbol::Usdc) => "0x41e94eb019c0762f9bfcf9fb1e58725bfb0e7582",
            (Self::PolygonAmoy, TokenSymbol::Rlusd) => "",
        };
        if raw.is_empty() {
            return Err(GatewayError::Config(format!(
                "{} is not available on {}",
                token.as_str(),
                self.as_str()
            )));
        }
        parse_configured_address(raw, self.as_str())
    }

    /// Environment variable holding the JSON-RPC endpoint for this network.
    pub fn rpc_env_key(&self) -> String {
        format!("{}_RPC_URL", self.as_str())
    }
}

impl FromStr for Network {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BASE_SEPOLIA" => Ok(Self::BaseSepolia),
            "POLYGON_AMOY" => Ok(Self::PolygonAmoy),
            other => Err(GatewayError::Config(format!("Unsupported network: {other}"))),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenSymbol {
    Usdc,
    Rlusd,
}

impl TokenSymbol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usdc => "USDC",
            Self::Rlusd => "RLUSD",
        }
    }

    /// Decimal precision assumed when the token contract cannot be queried.
    pub fn default_decimals(&self) -> u8 {
        match self {
            Self::Usdc => 6,
            Self::Rlusd => 18,
        }
    }
}

impl FromStr for TokenSymbol {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USDC" => Ok(Self::Usdc),
            "RLUSD" => Ok(Self::Rlusd),
            other => Err(GatewayError::Config(format!("Unsupported token: {other}"))),
        }
    }
}

fn parse_configured_address(raw: &str, network: &str) -> Result<Address> {
    Address::from_str(raw)
        .map_err(|_| GatewayError::Config(format!("Malformed address {raw} configured for {network}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_networks_case_insensitively() {
        assert_eq!("BASE_SEPOLIA".parse::<Network>().unwrap(), Network::BaseSepolia);
        assert_eq!("polygon_amoy".parse::<Network>().unwrap(), Network::PolygonAmoy);
    }

    #[test]
    fn unsupported_network_is_a_configuration_error() {
        let err = "UNSUPPORTED".parse::<Network>().unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
        assert!(err.to_string().contains("UNSUPPORTED"));
    }

    #[test]
    fn networks_carry_distinct_contracts_and_chains() {
        let base = Network::BaseSepolia.config();
        let amoy = Network::PolygonAmoy.config();
        assert_eq!(base.caip2_id, "eip155:84532");
        assert_eq!(amoy.caip2_id, "eip155:80002");
        assert_ne!(
            Network::BaseSepolia.contract_address().unwrap(),
            Network::PolygonAmoy.contract_address().unwrap()
        );
    }

    #[test]
    fn missing_token_deployment_does_not_fall_back() {
        let err = Network::PolygonAmoy
            .token_address(TokenSymbol::Rlusd)
            .unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
        assert!(Network::BaseSepolia.token_address(TokenSymbol::Rlusd).is_ok());
    }

    #[test]
    fn default_decimals() {
        assert_eq!(TokenSymbol::Usdc.default_decimals(), 6);
        assert_eq!(TokenSymbol::Rlusd.default_decimals(), 18);
        assert_eq!("usdc".parse::<TokenSymbol>().unwrap(), TokenSymbol::Usdc);
        assert!("DAI".parse::<TokenSymbol>().is_err());
    }

    #[test]
    fn rpc_env_key_follows_network_name() {
        assert_eq!(Network::BaseSepolia.rpc_env_key(), "BASE_SEPOLIA_RPC_URL");
    }
}
