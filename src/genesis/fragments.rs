//! Per-module genesis state for the auth, bank and staking modules.

use crate::coins::{Coins, Dec};
use crate::crypto::{Address, PubKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const AUTH_MODULE: &str = "auth";
pub const BANK_MODULE: &str = "bank";
pub const STAKING_MODULE: &str = "staking";

pub const DEFAULT_MAX_MEMO_CHARACTERS: u64 = 256;
pub const DEFAULT_TX_SIG_LIMIT: u64 = 7;
pub const DEFAULT_MAX_VALIDATORS: u32 = 100;
/// Three weeks, in seconds.
pub const DEFAULT_UNBONDING_TIME_SECS: u64 = 21 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthParams {
    pub max_memo_characters: u64,
    pub tx_sig_limit: u64,
}

impl Default for AuthParams {
    fn default() -> Self {
        AuthParams {
            max_memo_characters: DEFAULT_MAX_MEMO_CHARACTERS,
            tx_sig_limit: DEFAULT_TX_SIG_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    #[serde(with = "hex")]
    pub address: Address,
    pub pub_key: Option<PubKey>,
    pub account_number: u64,
    pub sequence: u64,
}

impl GenesisAccount {
    pub fn new(address: Address, account_number: u64) -> Self {
        GenesisAccount {
            address,
            pub_key: None,
            account_number,
            sequence: 0,
        }
    }

    /// Account whose address is derived from `pub_key`.
    pub fn with_pub_key(pub_key: PubKey, account_number: u64) -> Self {
        GenesisAccount {
            address: pub_key.address(),
            pub_key: Some(pub_key),
            account_number,
            sequence: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthGenesis {
    pub params: AuthParams,
    pub accounts: Vec<GenesisAccount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankParams {
    pub default_send_enabled: bool,
}

impl Default for BankParams {
    fn default() -> Self {
        BankParams {
            default_send_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    #[serde(with = "hex")]
    pub address: Address,
    pub coins: Coins,
}

impl Balance {
    pub fn new(address: Address, coins: Coins) -> Self {
        Balance { address, coins }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankGenesis {
    pub params: BankParams,
    pub balances: Vec<Balance>,
    /// Total supply; rewritten on every compose.
    pub supply: Coins,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingParams {
    pub bond_denom: String,
    pub max_validators: u32,
    pub unbonding_time_secs: u64,
}

impl StakingParams {
    pub fn new(bond_denom: impl Into<String>) -> Self {
        StakingParams {
            bond_denom: bond_denom.into(),
            max_validators: DEFAULT_MAX_VALIDATORS,
            unbonding_time_secs: DEFAULT_UNBONDING_TIME_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BondStatus {
    Bonded,
    Unbonding,
    Unbonded,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    pub moniker: String,
    pub identity: String,
    pub website: String,
    pub details: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commission {
    pub rate: Dec,
    pub max_rate: Dec,
    pub max_change_rate: Dec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    #[serde(with = "hex")]
    pub operator_address: Address,
    pub consensus_pubkey: PubKey,
    pub jailed: bool,
    pub status: BondStatus,
    #[serde(with = "crate::coins::amount_str")]
    pub tokens: u128,
    pub delegator_shares: Dec,
    pub description: Description,
    pub unbonding_height: i64,
    pub unbonding_time: DateTime<Utc>,
    pub commission: Commission,
    #[serde(with = "crate::coins::amount_str")]
    pub min_self_delegation: u128,
}

impl Validator {
    /// A bonded validator with `tokens` and one share, zero commission and
    /// no unbonding history.
    pub fn bonded(consensus_pubkey: PubKey, tokens: u128) -> Self {
        Validator {
            operator_address: consensus_pubkey.address(),
            consensus_pubkey,
            jailed: false,
            status: BondStatus::Bonded,
            tokens,
            delegator_shares: Dec::one(),
            description: Description::default(),
            unbonding_height: 0,
            unbonding_time: DateTime::<Utc>::UNIX_EPOCH,
            commission: Commission::default(),
            min_self_delegation: 0,
        }
    }

    pub fn is_bonded(&self) -> bool {
        self.status == BondStatus::Bonded
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    #[serde(with = "hex")]
    pub delegator_address: Address,
    #[serde(with = "hex")]
    pub validator_address: Address,
    pub shares: Dec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingGenesis {
    pub params: StakingParams,
    pub validators: Vec<Validator>,
    pub delegations: Vec<Delegation>,
}
