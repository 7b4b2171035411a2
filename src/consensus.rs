//! Consensus-layer values the harness supplies in place of a real consensus
//! engine: block/evidence/validator parameters and the validator set.

use crate::crypto::{Address, KeyType, PrivKey, PubKey, Signer};
use crate::error::HarnessError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockParams {
    pub max_bytes: i64,
    /// `-1` disables the block gas limit.
    pub max_gas: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceParams {
    pub max_age_num_blocks: i64,
    pub max_age_duration: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorParams {
    pub pub_key_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusParams {
    pub block: BlockParams,
    pub evidence: EvidenceParams,
    pub validator: ValidatorParams,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        ConsensusParams {
            block: BlockParams {
                max_bytes: 200_000,
                max_gas: 2_000_000,
            },
            evidence: EvidenceParams {
                max_age_num_blocks: 302_400,
                max_age_duration: 1_814_400,
            },
            validator: ValidatorParams {
                pub_key_types: vec![
                    KeyType::Ed25519.as_str().to_string(),
                    KeyType::Secp256k1.as_str().to_string(),
                ],
            },
        }
    }
}

impl ConsensusParams {
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.block.max_bytes <= 0 {
            return Err(HarnessError::Validation(format!(
                "block.max_bytes must be positive, got {}",
                self.block.max_bytes
            )));
        }
        if self.block.max_gas < -1 {
            return Err(HarnessError::Validation(format!(
                "block.max_gas must be -1 or non-negative, got {}",
                self.block.max_gas
            )));
        }
        if self.evidence.max_age_num_blocks <= 0 || self.evidence.max_age_duration <= 0 {
            return Err(HarnessError::Validation(
                "evidence max age bounds must be positive".to_string(),
            ));
        }
        if self.validator.pub_key_types.is_empty() {
            return Err(HarnessError::Validation(
                "at least one validator public-key type must be allowed".to_string(),
            ));
        }
        Ok(())
    }

    pub fn allows_key_type(&self, key_type: KeyType) -> bool {
        self.validator
            .pub_key_types
            .iter()
            .any(|t| t == key_type.as_str())
    }

    /// Block gas limit, or `None` when unlimited.
    pub fn block_gas_limit(&self) -> Option<u64> {
        u64::try_from(self.block.max_gas).ok()
    }
}

/// A consensus validator as the consensus engine sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusValidator {
    #[serde(with = "hex")]
    pub address: Address,
    pub pub_key: PubKey,
    pub voting_power: i64,
}

impl ConsensusValidator {
    pub fn new(pub_key: PubKey, voting_power: i64) -> Self {
        ConsensusValidator {
            address: pub_key.address(),
            pub_key,
            voting_power,
        }
    }
}

/// Voting-power update emitted by the application at init-chain / end-block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    pub pub_key: PubKey,
    pub power: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSet {
    pub validators: Vec<ConsensusValidator>,
}

impl ValidatorSet {
    pub fn new(validators: Vec<ConsensusValidator>) -> Self {
        ValidatorSet { validators }
    }

    /// `count` fresh ed25519 validators with power 1, derived from `seed`.
    pub fn deterministic(count: usize, seed: &str) -> Result<Self, HarnessError> {
        let validators = (0..count)
            .map(|i| {
                let member_seed = format!("{}-{}", seed, i);
                let key = PrivKey::from_seed(KeyType::Ed25519, member_seed.as_bytes())?;
                Ok(ConsensusValidator::new(key.pub_key(), 1))
            })
            .collect::<Result<Vec<_>, HarnessError>>()?;
        Ok(ValidatorSet { validators })
    }

    /// The same validators, each with `power`.
    pub fn with_power(&self, power: i64) -> Self {
        ValidatorSet {
            validators: self
                .validators
                .iter()
                .map(|v| ConsensusValidator::new(v.pub_key.clone(), power))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn total_voting_power(&self) -> i64 {
        self.validators.iter().map(|v| v.voting_power).sum()
    }

    /// Hash over the validators in order: address, key bytes and power.
    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for validator in &self.validators {
            hasher.update(validator.address);
            hasher.update(validator.pub_key.key_type().as_str().as_bytes());
            hasher.update(validator.pub_key.as_bytes());
            hasher.update(validator.voting_power.to_be_bytes());
        }
        hasher.finalize().into()
    }

    /// Applies end-block updates: power 0 removes a validator, anything else
    /// inserts it or replaces its power.
    pub fn apply_updates(&mut self, updates: &[ValidatorUpdate]) {
        for update in updates {
            let address = update.pub_key.address();
            let existing = self.validators.iter().position(|v| v.address == address);
            match (existing, update.power) {
                (Some(i), 0) => {
                    self.validators.remove(i);
                }
                (Some(i), power) => self.validators[i].voting_power = power,
                (None, 0) => {}
                (None, power) => self
                    .validators
                    .push(ConsensusValidator::new(update.pub_key.clone(), power)),
            }
        }
    }

    pub fn to_updates(&self) -> Vec<ValidatorUpdate> {
        self.validators
            .iter()
            .map(|v| ValidatorUpdate {
                pub_key: v.pub_key.clone(),
                power: v.voting_power,
            })
            .collect()
    }
}
