//! Contract call encoding and raw-transaction envelopes.
//!
//! Each campaign operation has one fixed Solidity signature. Calldata is the
//! 4-byte selector of that signature followed by the ABI encoding of the
//! arguments in declaration order, so the same logical call always produces
//! the same bytes.

use std::str::FromStr;

use ethers::abi::Token;
use ethers::types::{Address, U256};
use ethers::utils::id;
use serde::{Deserialize, Serialize};

use crate::campaign::CampaignType;
use crate::errors::{GatewayError, Result};
use crate::networks::Network;

pub const CREATE_CAMPAIGN: &str =
    "createCampaign(address,uint256,string,string,string,address,uint256,uint256,uint256)";
pub const DONATE: &str = "donate(uint256,uint256)";
pub const UPDATE_CAMPAIGN: &str = "updateCampaign(uint256,uint256)";
pub const GET_ALL_CAMPAIGNS: &str = "getAllCampaigns()";
pub const DECIMALS: &str = "decimals()";

/// What a submission does; stored with every ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    CreateCampaign,
    Donate,
    UpdateCampaign,
    TokenTransfer,
}

impl SubmissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateCampaign => "create_campaign",
            Self::Donate => "donate",
            Self::UpdateCampaign => "update_campaign",
            Self::TokenTransfer => "token_transfer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCampaignArgs {
    pub token: Address,
    pub campaign_type: CampaignType,
    pub name: String,
    pub image: String,
    pub description: String,
    pub recipient: Address,
    pub goal: U256,
    pub deadline: u64,
    pub max_donors: U256,
}

/// A state-changing call on the campaign contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CampaignCall {
    CreateCampaign(CreateCampaignArgs),
    Donate { campaign_id: U256, amount: U256 },
    UpdateCampaign { campaign_id: U256, amount: U256 },
}

impl CampaignCall {
    pub fn kind(&self) -> SubmissionKind {
        match self {
            Self::CreateCampaign(_) => SubmissionKind::CreateCampaign,
            Self::Donate { .. } => SubmissionKind::Donate,
            Self::UpdateCampaign { .. } => SubmissionKind::UpdateCampaign,
        }
    }

    pub fn signature(&self) -> &'static str {
        match self {
            Self::CreateCampaign(_) => CREATE_CAMPAIGN,
            Self::Donate { .. } => DONATE,
            Self::UpdateCampaign { .. } => UPDATE_CAMPAIGN,
        }
    }

    fn tokens(&self) -> Vec<Token> {
        match self {
            Self::CreateCampaign(args) => vec![
                Token::Address(args.token),
                Token::Uint(U256::from(args.campaign_type.as_u8())),
                Token::String(args.name.clone()),
                Token::String(args.image.clone()),
                Token::String(args.description.clone()),
                Token::Address(args.recipient),
                Token::Uint(args.goal),
                Token::Uint(U256::from(args.deadline)),
                Token::Uint(args.max_donors),
            ],
            Self::Donate {
                campaign_id,
                amount,
            }
            | Self::UpdateCampaign {
                campaign_id,
                amount,
            } => vec![Token::Uint(*campaign_id), Token::Uint(*amount)],
        }
    }

    pub fn calldata(&self) -> Vec<u8> {
        encode_call(self.signature(), &self.tokens())
    }
}

/// Selector of `signature` followed by the ABI encoding of `args`.
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut data = id(signature).to_vec();
    data.extend(ethers::abi::encode(args));
    data
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmTransaction {
    pub from: String,
    pub to: String,
    pub data: String,
    pub value: String,
}

/// Unsigned transaction handed to the wallet service for signing and broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransactionEnvelope {
    pub caip2_id: String,
    pub transaction: EvmTransaction,
}

/// Envelope for a call against the campaign contract on `network`.
pub fn envelope_for(network: Network, sender: Address, calldata: Vec<u8>) -> Result<RawTransactionEnvelope> {
    let config = network.config();
    let contract = network.contract_address()?;
    Ok(RawTransactionEnvelope {
        caip2_id: config.caip2_id.to_string(),
        transaction: EvmTransaction {
            from: hex_address(&sender),
            to: hex_address(&contract),
            data: format!("0x{}", hex::encode(calldata)),
            value: "0x0".to_string(),
        },
    })
}

/// Lowercase `0x`-prefixed hex form of an address.
pub fn hex_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_bytes()))
}

/// Parse a user-supplied address; `field` names it in the error.
pub fn parse_address(raw: &str, field: &str) -> Result<Address> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if digits.len() != 40 {
        return Err(GatewayError::BadRequest(format!("Invalid {field} address: {raw}")));
    }
    Address::from_str(digits)
        .map_err(|_| GatewayError::BadRequest(format!("Invalid {field} address: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENDER: &str = "0xAbCdEf0123456789aBcDeF0123456789AbCdEf01";

    /// Resolve the network name first, as the flow layer does.
    fn build_envelope(network: &str, sender: &str, call: &CampaignCall) -> Result<RawTransactionEnvelope> {
        let network = Network::from_str(network)?;
        let sender = parse_address(sender, "sender")?;
        envelope_for(network, sender, call.calldata())
    }

    fn create_args() -> CreateCampaignArgs {
        CreateCampaignArgs {
            token: Address::repeat_byte(0x11),
            campaign_type: CampaignType::PerPerson,
            name: "Trail fund".to_string(),
            image: "https://aggregator.example/v1/blobs/xyz".to_string(),
            description: "Rebuild the ridge trail".to_string(),
            recipient: Address::repeat_byte(0x22),
            goal: U256::from(100_000_000u64),
            deadline: 1_767_225_600,
            max_donors: U256::from(10),
        }
    }

    #[test]
    fn calldata_starts_with_signature_selector() {
        let call = CampaignCall::UpdateCampaign {
            campaign_id: U256::from(3),
            amount: U256::from(10_000_000u64),
        };
        let data = call.calldata();
        assert_eq!(&data[..4], &id(UPDATE_CAMPAIGN));
        assert_eq!(data.len(), 4 + 32 * 2);
        assert_eq!(U256::from_big_endian(&data[4..36]), U256::from(3));
        assert_eq!(U256::from_big_endian(&data[36..68]), U256::from(10_000_000u64));
    }

    #[test]
    fn donate_and_update_use_different_selectors() {
        let donate = CampaignCall::Donate {
            campaign_id: U256::one(),
            amount: U256::one(),
        };
        let update = CampaignCall::UpdateCampaign {
            campaign_id: U256::one(),
            amount: U256::one(),
        };
        assert_ne!(donate.calldata()[..4], update.calldata()[..4]);
        assert_eq!(donate.calldata()[4..], update.calldata()[4..]);
    }

    #[test]
    fn encoding_is_deterministic() {
        let call = CampaignCall::CreateCampaign(create_args());
        assert_eq!(call.calldata(), call.clone().calldata());
        assert_eq!(call.calldata(), CampaignCall::CreateCampaign(create_args()).calldata());
    }

    #[test]
    fn create_campaign_encodes_arguments_in_order() {
        let data = CampaignCall::CreateCampaign(create_args()).calldata();
        assert_eq!(&data[..4], &id(CREATE_CAMPAIGN));
        let head = &data[4..];
        // token address is right-aligned in the first word
        assert_eq!(&head[12..32], Address::repeat_byte(0x11).as_bytes());
        // campaign type
        assert_eq!(U256::from_big_endian(&head[32..64]), U256::from(2));
        // recipient sits after the three string offsets
        assert_eq!(&head[5 * 32 + 12..6 * 32], Address::repeat_byte(0x22).as_bytes());
        assert_eq!(U256::from_big_endian(&head[6 * 32..7 * 32]), U256::from(100_000_000u64));
        assert_eq!(U256::from_big_endian(&head[7 * 32..8 * 32]), U256::from(1_767_225_600u64));
        assert_eq!(U256::from_big_endian(&head[8 * 32..9 * 32]), U256::from(10));
    }

    #[test]
    fn envelope_targets_network_contract() {
        let call = CampaignCall::Donate {
            campaign_id: U256::from(1),
            amount: U256::from(5),
        };
        let envelope = build_envelope("BASE_SEPOLIA", SENDER, &call).unwrap();
        assert_eq!(envelope.caip2_id, "eip155:84532");
        assert_eq!(envelope.transaction.from, SENDER.to_lowercase());
        assert_eq!(
            envelope.transaction.to,
            "0x5fc6413ede9655f30fe178c581fe4825766e3f36"
        );
        assert_eq!(envelope.transaction.value, "0x0");
        assert_eq!(
            envelope.transaction.data,
            format!("0x{}", hex::encode(call.calldata()))
        );
    }

    #[test]
    fn unsupported_network_fails_without_default() {
        let call = CampaignCall::Donate {
            campaign_id: U256::from(1),
            amount: U256::from(5),
        };
        let err = build_envelope("UNSUPPORTED", SENDER, &call).unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[test]
    fn rejects_malformed_sender() {
        let call = CampaignCall::Donate {
            campaign_id: U256::from(1),
            amount: U256::from(5),
        };
        for sender in ["", "0x1234", "not-an-address", "0xZZcdef0123456789abcdef0123456789abcdef01"] {
            assert!(matches!(
                build_envelope("BASE_SEPOLIA", sender, &call),
                Err(GatewayError::BadRequest(_))
            ));
        }
    }

    #[test]
    fn envelope_serializes_with_wallet_field_names() {
        let call = CampaignCall::Donate {
            campaign_id: U256::from(1),
            amount: U256::from(5),
        };
        let envelope = build_envelope("POLYGON_AMOY", SENDER, &call).unwrap();
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["caip2Id"], "eip155:80002");
        assert!(json["transaction"]["data"].as_str().unwrap().starts_with("0x"));
    }
}
