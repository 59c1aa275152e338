//! Campaign snapshots as returned by the contract's `getAllCampaigns()` view.

use ethers::abi::{ParamType, Token};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::amount::{self, dec_string};
use crate::errors::{GatewayError, Result};

/// Fundraising rule set enforced by the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignType {
    /// Any amount, ends at the deadline.
    AnythingHelps,
    /// Reach the goal by the deadline or refund.
    Goal,
    /// Each donor pays a fixed share.
    PerPerson,
    /// Goal must be reached; each donor pays at least `goal / max_donors`.
    SplitFixedCost,
}

impl CampaignType {
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::AnythingHelps => 0,
            Self::Goal => 1,
            Self::PerPerson => 2,
            Self::SplitFixedCost => 3,
        }
    }

    /// Whether donations must cover an equal share of the goal.
    pub fn has_per_donor_minimum(&self) -> bool {
        matches!(self, Self::PerPerson | Self::SplitFixedCost)
    }

    /// Whether a positive donor cap must accompany the campaign.
    pub fn requires_max_donors(&self) -> bool {
        self.has_per_donor_minimum()
    }
}

impl TryFrom<u64> for CampaignType {
    type Error = GatewayError;

    fn try_from(value: u64) -> Result<Self> {
        match value {
            0 => Ok(Self::AnythingHelps),
            1 => Ok(Self::Goal),
            2 => Ok(Self::PerPerson),
            3 => Ok(Self::SplitFixedCost),
            other => Err(GatewayError::Decode(format!("Unknown campaign type {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    #[serde(with = "dec_string")]
    pub id: U256,
    pub campaign_type: CampaignType,
    pub is_active: bool,
    pub token: Address,
    pub name: String,
    pub image: String,
    pub description: String,
    #[serde(with = "dec_string")]
    pub balance: U256,
    pub deadline: u64,
    #[serde(with = "dec_string")]
    pub num_donors: U256,
    pub donors: Vec<Address>,
    #[serde(with = "dec_string")]
    pub goal: U256,
    #[serde(with = "dec_string")]
    pub max_donors: U256,
    pub recipient: Address,
    #[serde(with = "dec_string")]
    pub num_donations: U256,
    pub creator: Address,
}

impl Campaign {
    /// ABI layout of one `Campaign` struct, in declaration order.
    pub fn param_types() -> Vec<ParamType> {
        vec![
            ParamType::Uint(256),
            ParamType::Uint(8),
            ParamType::Bool,
            ParamType::Address,
            ParamType::String,
            ParamType::String,
            ParamType::String,
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Array(Box::new(ParamType::Address)),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Address,
            ParamType::Uint(256),
            ParamType::Address,
        ]
    }

    /// Decode the return data of `getAllCampaigns()`.
    pub fn decode_list(data: &[u8]) -> Result<Vec<Campaign>> {
        let output = ParamType::Array(Box::new(ParamType::Tuple(Self::param_types())));
        let mut tokens = ethers::abi::decode(&[output], data)?;
        match tokens.pop() {
            Some(Token::Array(items)) => items.into_iter().map(Self::from_token).collect(),
            _ => Err(GatewayError::Decode(
                "getAllCampaigns did not return an array".to_string(),
            )),
        }
    }

    pub fn from_token(token: Token) -> Result<Self> {
        let fields = match token {
            Token::Tuple(fields) => fields,
            other => {
                return Err(GatewayError::Decode(format!(
                    "expected campaign tuple, got {other:?}"
                )))
            }
        };
        let mut fields = fields.into_iter();
        let mut next = || {
            fields
                .next()
                .ok_or_else(|| GatewayError::Decode("campaign tuple is too short".to_string()))
        };

        let id = uint(next()?)?;
        let raw_type = uint(next()?)?;
        if raw_type > U256::from(u64::MAX) {
            return Err(GatewayError::Decode(format!("campaign type {raw_type} out of range")));
        }
        let campaign_type = CampaignType::try_from(raw_type.as_u64())?;
        let is_active = match next()? {
            Token::Bool(b) => b,
            other => return Err(unexpected("bool", &other)),
        };
        let token = address(next()?)?;
        let name = string(next()?)?;
        let image = string(next()?)?;
        let description = string(next()?)?;
        let balance = uint(next()?)?;
        let deadline = uint(next()?)?;
        let num_donors = uint(next()?)?;
        let donors = match next()? {
            Token::Array(items) => items.into_iter().map(address).collect::<Result<_>>()?,
            other => return Err(unexpected("address[]", &other)),
        };
        let goal = uint(next()?)?;
        let max_donors = uint(next()?)?;
        let recipient = address(next()?)?;
        let num_donations = uint(next()?)?;
        let creator = address(next()?)?;

        if deadline > U256::from(u64::MAX) {
            return Err(GatewayError::Decode(format!("deadline {deadline} out of range")));
        }

        Ok(Campaign {
            id,
            campaign_type,
            is_active,
            token,
            name,
            image,
            description,
            balance,
            deadline: deadline.as_u64(),
            num_donors,
            donors,
            goal,
            max_donors,
            recipient,
            num_donations,
            creator,
        })
    }

    /// Validate a normalized donation against this campaign's rules.
    pub fn check_donation(&self, units: U256, decimals: u8) -> Result<()> {
        if !self.is_active {
            return Err(GatewayError::BadRequest(format!(
                "Campaign {} is no longer accepting donations",
                self.id
            )));
        }
        if self.campaign_type.has_per_donor_minimum() {
            let minimum = amount::minimum_share(self.goal, self.max_donors)?;
            amount::ensure_at_least(units, minimum, decimals)?;
        }
        Ok(())
    }
}

fn unexpected(expected: &str, got: &Token) -> GatewayError {
    GatewayError::Decode(format!("expected {expected}, got {got:?}"))
}

fn uint(token: Token) -> Result<U256> {
    match token {
        Token::Uint(v) => Ok(v),
        other => Err(unexpected("uint", &other)),
    }
}

fn address(token: Token) -> Result<Address> {
    match token {
        Token::Address(a) => Ok(a),
        other => Err(unexpected("address", &other)),
    }
}

fn string(token: Token) -> Result<String> {
    match token {
        Token::String(s) => Ok(s),
        other => Err(unexpected("string", &other)),
    }
}
