//! Genesis composition.
//!
//! A [`GenesisDocument`] maps module names to opaque JSON module state. The
//! [`GenesisComposer`] merges the default auth, bank and staking state with
//! caller-supplied accounts, balances, validators and delegations, and
//! recomputes the total supply on every compose. Output is deterministic:
//! module names and every JSON object key are emitted in sorted order.

pub mod fragments;

pub use fragments::*;

use crate::coins::{Coins, Dec};
use crate::config::HarnessConfig;
use crate::consensus::ValidatorSet;
use crate::crypto::{address_from_string, address_to_hex, Address};
use crate::error::{HarnessError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Module account holding the tokens bonded to validators.
pub const BONDED_POOL_NAME: &str = "bonded_tokens_pool";

pub fn bonded_pool_address() -> Address {
    address_from_string(BONDED_POOL_NAME)
}

/// How the bank supply is derived from the composed balances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplyAccounting {
    /// Sum of all balances plus the tokens of every validator.
    #[default]
    Bonded,
    /// Sum of all balances plus the bond amount once per balance entry. Only
    /// agrees with the actual holdings when there is exactly one balance and
    /// one validator; `verify_supply_invariant` flags it otherwise.
    PerBalance,
}

/// Initial chain state keyed by module name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenesisDocument {
    modules: BTreeMap<String, serde_json::Value>,
}

impl GenesisDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_module<T: Serialize>(&mut self, name: &str, state: &T) -> Result<()> {
        let value = serde_json::to_value(state)?;
        self.modules.insert(name.to_string(), value);
        Ok(())
    }

    pub fn module<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self
            .modules
            .get(name)
            .ok_or_else(|| HarnessError::Validation(format!("genesis has no '{}' module", name)))?;
        serde_json::from_value(value.clone()).map_err(|e| {
            HarnessError::Validation(format!("malformed '{}' genesis: {}", name, e))
        })
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Pretty-printed JSON with sorted keys.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| HarnessError::Validation(format!("invalid genesis JSON: {}", e)))
    }
}

/// The default document: module params, no accounts, no validators.
pub fn default_genesis(config: &HarnessConfig) -> Result<GenesisDocument> {
    GenesisComposer::new(config).compose()
}

/// Composes genesis from explicit fragments with the default configuration.
pub fn compose_genesis(
    accounts: Vec<GenesisAccount>,
    validators: Vec<Validator>,
    delegations: Vec<Delegation>,
    balances: Vec<Balance>,
) -> Result<GenesisDocument> {
    GenesisComposer::new(&HarnessConfig::default())
        .accounts(accounts)
        .validators(validators)
        .delegations(delegations)
        .balances(balances)
        .compose()
}

#[derive(Debug, Clone)]
pub struct GenesisComposer {
    bond_denom: String,
    bond_amount: u128,
    supply_accounting: SupplyAccounting,
    accounts: Vec<GenesisAccount>,
    balances: Vec<Balance>,
    validators: Vec<Validator>,
    delegations: Vec<Delegation>,
    validator_set: Option<ValidatorSet>,
}

impl GenesisComposer {
    pub fn new(config: &HarnessConfig) -> Self {
        GenesisComposer {
            bond_denom: config.chain.bond_denom.clone(),
            bond_amount: u128::from(config.genesis.bond_amount),
            supply_accounting: config.genesis.supply_accounting,
            accounts: Vec::new(),
            balances: Vec::new(),
            validators: Vec::new(),
            delegations: Vec::new(),
            validator_set: None,
        }
    }

    pub fn accounts(mut self, accounts: Vec<GenesisAccount>) -> Self {
        self.accounts = accounts;
        self
    }

    pub fn balances(mut self, balances: Vec<Balance>) -> Self {
        self.balances = balances;
        self
    }

    pub fn validators(mut self, validators: Vec<Validator>) -> Self {
        self.validators = validators;
        self
    }

    pub fn delegations(mut self, delegations: Vec<Delegation>) -> Self {
        self.delegations = delegations;
        self
    }

    /// Derives one bonded validator per member of `set` (bond amount tokens)
    /// and one delegation to each from the first genesis account.
    pub fn validator_set(mut self, set: &ValidatorSet) -> Self {
        self.validator_set = Some(set.clone());
        self
    }

    pub fn supply_accounting(mut self, accounting: SupplyAccounting) -> Self {
        self.supply_accounting = accounting;
        self
    }

    pub fn compose(self) -> Result<GenesisDocument> {
        let GenesisComposer {
            bond_denom,
            bond_amount,
            supply_accounting,
            accounts,
            mut balances,
            mut validators,
            mut delegations,
            validator_set,
        } = self;

        check_unique(accounts.iter().map(|a| a.address), "account address")?;
        check_unique(accounts.iter().map(|a| a.account_number), "account number")?;
        for balance in &balances {
            balance.coins.validate().map_err(|e| {
                HarnessError::Validation(format!(
                    "balance of {}: {}",
                    address_to_hex(&balance.address),
                    e
                ))
            })?;
        }

        if let Some(set) = validator_set {
            let delegator = accounts.first().map(|a| a.address).ok_or_else(|| {
                HarnessError::Validation(
                    "a validator set needs at least one genesis account to delegate".to_string(),
                )
            })?;
            for member in &set.validators {
                let validator = Validator::bonded(member.pub_key.clone(), bond_amount);
                delegations.push(Delegation {
                    delegator_address: delegator,
                    validator_address: validator.operator_address,
                    shares: Dec::one(),
                });
                validators.push(validator);
            }
        }

        check_unique(validators.iter().map(|v| v.operator_address), "validator")?;
        let known: BTreeSet<Address> = validators.iter().map(|v| v.operator_address).collect();
        if let Some(orphan) = delegations
            .iter()
            .find(|d| !known.contains(&d.validator_address))
        {
            return Err(HarnessError::Validation(format!(
                "delegation to unknown validator {}",
                address_to_hex(&orphan.validator_address)
            )));
        }

        let bonded_tokens = bonded_tokens(&validators)?;

        let supply = match supply_accounting {
            SupplyAccounting::Bonded => {
                let mut supply = sum_balances(&balances)?;
                if bonded_tokens > 0 {
                    supply = supply.checked_add(&Coins::single(&bond_denom, bonded_tokens)?)?;
                }
                supply
            }
            SupplyAccounting::PerBalance => {
                let per_entry = Coins::single(&bond_denom, bond_amount)?;
                let mut supply = Coins::new();
                for balance in &balances {
                    supply = supply
                        .checked_add(&balance.coins)?
                        .checked_add(&per_entry)?;
                }
                supply
            }
        };

        if bonded_tokens > 0 {
            balances.push(Balance::new(
                bonded_pool_address(),
                Coins::single(&bond_denom, bonded_tokens)?,
            ));
        }
        check_unique(balances.iter().map(|b| b.address), "balance address")?;

        let mut doc = GenesisDocument::new();
        doc.set_module(
            AUTH_MODULE,
            &AuthGenesis {
                params: AuthParams::default(),
                accounts,
            },
        )?;
        doc.set_module(
            BANK_MODULE,
            &BankGenesis {
                params: BankParams::default(),
                balances,
                supply,
            },
        )?;
        doc.set_module(
            STAKING_MODULE,
            &StakingGenesis {
                params: StakingParams::new(bond_denom),
                validators,
                delegations,
            },
        )?;

        debug!(
            modules = doc.modules.len(),
            bonded_tokens = %bonded_tokens,
            "composed genesis document"
        );
        Ok(doc)
    }
}

fn check_unique<T: Ord + std::fmt::Debug>(
    items: impl Iterator<Item = T>,
    what: &str,
) -> Result<()> {
    let mut seen = BTreeSet::new();
    for item in items {
        if !seen.insert(item) {
            return Err(HarnessError::Validation(format!("duplicate {} in genesis", what)));
        }
    }
    Ok(())
}

/// Tokens held by the bonded validators in `validators`.
pub fn bonded_tokens<'a>(validators: impl IntoIterator<Item = &'a Validator>) -> Result<u128> {
    validators
        .into_iter()
        .filter(|v| v.is_bonded())
        .try_fold(0u128, |total, v| {
            total.checked_add(v.tokens).ok_or_else(|| {
                HarnessError::Validation("bonded validator tokens overflow".to_string())
            })
        })
}

fn sum_balances(balances: &[Balance]) -> Result<Coins> {
    balances
        .iter()
        .try_fold(Coins::new(), |acc, b| acc.checked_add(&b.coins))
}

/// Checks that the bank supply equals everything held: all balances (the
/// bonded pool included) and that the bonded pool holds exactly the tokens of
/// the bonded validators.
pub fn verify_supply_invariant(doc: &GenesisDocument) -> Result<()> {
    let bank: BankGenesis = doc.module(BANK_MODULE)?;
    let staking: StakingGenesis = doc.module(STAKING_MODULE)?;

    let held = sum_balances(&bank.balances)?;
    if held != bank.supply {
        return Err(HarnessError::Validation(format!(
            "supply {} does not match balances {}",
            bank.supply, held
        )));
    }

    let bonded = bonded_tokens(&staking.validators)?;
    let pool = bonded_pool_address();
    let in_pool = bank
        .balances
        .iter()
        .find(|b| b.address == pool)
        .map(|b| b.coins.amount_of(&staking.params.bond_denom))
        .unwrap_or(0);
    if in_pool != bonded {
        return Err(HarnessError::Validation(format!(
            "bonded pool holds {} but validators have {} bonded",
            in_pool, bonded
        )));
    }
    Ok(())
}
