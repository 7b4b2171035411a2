//! Accounts: numbers, sequences and public keys.

use crate::crypto::{Address, PubKey};
use crate::error::{HarnessError, Result};
use crate::genesis::{AuthGenesis, AuthParams};
use serde::{Deserialize, Serialize};

use super::context::Context;

const ACCOUNT_PREFIX: &[u8] = b"acc/";
const NEXT_ACCOUNT_NUMBER_KEY: &[u8] = b"auth/next_account_number";
const PARAMS_KEY: &[u8] = b"auth/params";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseAccount {
    #[serde(with = "hex")]
    pub address: Address,
    /// Unset until the account signs its first transaction.
    pub pub_key: Option<PubKey>,
    pub account_number: u64,
    pub sequence: u64,
}

pub fn account_key(address: &Address) -> Vec<u8> {
    [ACCOUNT_PREFIX, address.as_slice()].concat()
}

pub fn get_account(ctx: &mut Context<'_>, address: &Address) -> Result<Option<BaseAccount>> {
    ctx.get(&account_key(address))
}

pub fn set_account(ctx: &mut Context<'_>, account: &BaseAccount) -> Result<()> {
    ctx.set(&account_key(&account.address), account)
}

pub fn params(ctx: &mut Context<'_>) -> Result<AuthParams> {
    Ok(ctx.get(PARAMS_KEY)?.unwrap_or_default())
}

fn next_account_number(ctx: &mut Context<'_>) -> Result<u64> {
    let next: u64 = ctx.get(NEXT_ACCOUNT_NUMBER_KEY)?.unwrap_or(0);
    ctx.set(NEXT_ACCOUNT_NUMBER_KEY, &(next + 1))?;
    Ok(next)
}

/// Returns the account at `address`, creating it with the next account number
/// when it does not exist yet.
pub fn get_or_create_account(ctx: &mut Context<'_>, address: &Address) -> Result<BaseAccount> {
    if let Some(account) = get_account(ctx, address)? {
        return Ok(account);
    }
    let account = BaseAccount {
        address: *address,
        pub_key: None,
        account_number: next_account_number(ctx)?,
        sequence: 0,
    };
    set_account(ctx, &account)?;
    Ok(account)
}

pub fn init_genesis(ctx: &mut Context<'_>, genesis: &AuthGenesis) -> Result<()> {
    if genesis.params.tx_sig_limit == 0 {
        return Err(HarnessError::Validation(
            "auth genesis: tx signature limit must be positive".to_string(),
        ));
    }
    ctx.set(PARAMS_KEY, &genesis.params)?;

    let mut next = 0;
    for account in &genesis.accounts {
        if let Some(pub_key) = &account.pub_key {
            if pub_key.address() != account.address {
                return Err(HarnessError::Validation(format!(
                    "auth genesis: public key does not match account {}",
                    hex::encode(account.address)
                )));
            }
        }
        set_account(
            ctx,
            &BaseAccount {
                address: account.address,
                pub_key: account.pub_key.clone(),
                account_number: account.account_number,
                sequence: account.sequence,
            },
        )?;
        next = next.max(account.account_number + 1);
    }
    ctx.set(NEXT_ACCOUNT_NUMBER_KEY, &next)
}
