//! The application boundary the block simulator drives, shaped after ABCI.

use crate::coins::Coins;
use crate::consensus::{ConsensusParams, ValidatorUpdate};
use crate::crypto::Address;
use crate::error::{ExecutionError, Result};
use crate::persistence::CommitId;
use crate::transaction::TxConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::auth::BaseAccount;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasInfo {
    pub gas_wanted: u64,
    pub gas_used: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: String,
    pub attributes: Vec<(String, String)>,
}

impl Event {
    pub fn new(kind: impl Into<String>) -> Self {
        Event {
            kind: kind.into(),
            attributes: Vec::new(),
        }
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    pub data: Vec<u8>,
    pub log: String,
    pub events: Vec<Event>,
}

/// Outcome of delivering (or checking) one transaction. A rejected
/// transaction is a normal outcome, not an error of the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub gas_info: GasInfo,
    pub outcome: std::result::Result<TxResult, ExecutionError>,
}

impl Delivery {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn result(&self) -> Option<&TxResult> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ExecutionError> {
        self.outcome.as_ref().err()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInitChain {
    pub time: DateTime<Utc>,
    pub chain_id: String,
    pub consensus_params: ConsensusParams,
    pub validators: Vec<ValidatorUpdate>,
    pub app_state_bytes: Vec<u8>,
    pub initial_height: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseInitChain {
    /// Validators the application put in place from its genesis state.
    pub validators: Vec<ValidatorUpdate>,
    pub app_hash: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub chain_id: String,
    pub height: u64,
    pub time: DateTime<Utc>,
    #[serde(with = "hex")]
    pub last_commit_hash: [u8; 32],
    #[serde(with = "hex")]
    pub validators_hash: [u8; 32],
    #[serde(with = "hex")]
    pub next_validators_hash: [u8; 32],
    #[serde(with = "hex")]
    pub proposer_address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBeginBlock {
    pub header: Header,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestEndBlock {
    pub height: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseEndBlock {
    pub validator_updates: Vec<ValidatorUpdate>,
    pub consensus_param_updates: Option<ConsensusParams>,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseCommit {
    pub data: [u8; 32],
    /// Lowest height the store still keeps after pruning.
    pub retain_height: u64,
}

/// An application the block simulator can drive. Calls arrive in lifecycle
/// order; the simulator enforces that order before forwarding.
pub trait Application {
    fn init_chain(&mut self, req: RequestInitChain) -> Result<ResponseInitChain>;

    fn begin_block(&mut self, req: RequestBeginBlock) -> Result<()>;

    /// Executes an encoded transaction against the block's working state.
    /// `Err` is reserved for failures of the application itself.
    fn deliver(&mut self, tx_bytes: &[u8]) -> Result<Delivery>;

    /// Runs authentication only, against the last committed state (genesis
    /// before the first commit). Deliveries of an open block are not visible.
    fn check(&self, tx_bytes: &[u8]) -> Result<Delivery>;

    fn end_block(&mut self, req: RequestEndBlock) -> Result<ResponseEndBlock>;

    fn commit(&mut self) -> Result<ResponseCommit>;

    fn last_block_height(&self) -> u64;

    fn last_commit_id(&self) -> CommitId;

    fn tx_config(&self) -> &TxConfig;

    /// Queries read the same state as `check`.
    fn account(&self, address: &Address) -> Result<Option<BaseAccount>>;

    fn balance(&self, address: &Address) -> Result<Coins>;
}
