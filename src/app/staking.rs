//! Validator and delegation bookkeeping. Validators only change through
//! genesis; end-block never emits updates.

use crate::consensus::ValidatorUpdate;
use crate::crypto::Address;
use crate::error::{HarnessError, Result};
use crate::genesis::{
    bonded_pool_address, bonded_tokens, Delegation, StakingGenesis, StakingParams, Validator,
};

use super::bank;
use super::context::Context;

const VALIDATOR_PREFIX: &[u8] = b"staking/val/";
const DELEGATION_PREFIX: &[u8] = b"staking/del/";
const PARAMS_KEY: &[u8] = b"staking/params";

/// Tokens per unit of consensus voting power.
pub const POWER_REDUCTION: u128 = 1_000_000;

fn validator_key(operator: &Address) -> Vec<u8> {
    [VALIDATOR_PREFIX, operator.as_slice()].concat()
}

fn delegation_key(delegator: &Address, validator: &Address) -> Vec<u8> {
    [DELEGATION_PREFIX, delegator.as_slice(), validator.as_slice()].concat()
}

pub fn consensus_power(tokens: u128) -> i64 {
    i64::try_from(tokens / POWER_REDUCTION).unwrap_or(i64::MAX)
}

pub fn params(ctx: &mut Context<'_>) -> Result<Option<StakingParams>> {
    ctx.get(PARAMS_KEY)
}

pub fn validators(ctx: &mut Context<'_>) -> Result<Vec<Validator>> {
    Ok(ctx
        .iter_prefix::<Validator>(VALIDATOR_PREFIX)?
        .into_iter()
        .map(|(_, v)| v)
        .collect())
}

pub fn get_delegation(
    ctx: &mut Context<'_>,
    delegator: &Address,
    validator: &Address,
) -> Result<Option<Delegation>> {
    ctx.get(&delegation_key(delegator, validator))
}

/// Stores validators and delegations and returns the initial validator set.
/// The bonded pool must hold exactly the tokens of the bonded validators.
pub fn init_genesis(
    ctx: &mut Context<'_>,
    genesis: &StakingGenesis,
) -> Result<Vec<ValidatorUpdate>> {
    ctx.set(PARAMS_KEY, &genesis.params)?;

    let bonded: Vec<&Validator> = genesis.validators.iter().filter(|v| v.is_bonded()).collect();
    if bonded.len() > genesis.params.max_validators as usize {
        return Err(HarnessError::Validation(format!(
            "staking genesis: {} bonded validators exceed the maximum of {}",
            bonded.len(),
            genesis.params.max_validators
        )));
    }

    for validator in &genesis.validators {
        ctx.set(&validator_key(&validator.operator_address), validator)?;
    }
    for delegation in &genesis.delegations {
        ctx.set(
            &delegation_key(&delegation.delegator_address, &delegation.validator_address),
            delegation,
        )?;
    }

    let bonded_tokens = bonded_tokens(bonded.iter().copied())?;
    let pool = bank::get_balance(ctx, &bonded_pool_address())?
        .amount_of(&genesis.params.bond_denom);
    if pool != bonded_tokens {
        return Err(HarnessError::Validation(format!(
            "staking genesis: bonded pool holds {} but bonded validators have {}",
            pool, bonded_tokens
        )));
    }

    Ok(bonded
        .into_iter()
        .map(|v| ValidatorUpdate {
            pub_key: v.consensus_pubkey.clone(),
            power: consensus_power(v.tokens),
        })
        .collect())
}

pub fn end_block(_ctx: &mut Context<'_>) -> Result<Vec<ValidatorUpdate>> {
    Ok(Vec::new())
}
