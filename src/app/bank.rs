//! Balances, transfers and total supply.

use crate::coins::Coins;
use crate::crypto::{address_to_hex, Address};
use crate::error::{ExecutionError, HarnessError, Result};
use crate::genesis::{BankGenesis, BankParams};
use crate::transaction::{MsgMultiSend, MsgSend};

use super::abci::Event;
use super::auth;
use super::context::Context;

const BALANCE_PREFIX: &[u8] = b"bal/";
const SUPPLY_KEY: &[u8] = b"bank/supply";
const PARAMS_KEY: &[u8] = b"bank/params";

pub fn balance_key(address: &Address) -> Vec<u8> {
    [BALANCE_PREFIX, address.as_slice()].concat()
}

pub fn get_balance(ctx: &mut Context<'_>, address: &Address) -> Result<Coins> {
    Ok(ctx.get(&balance_key(address))?.unwrap_or_default())
}

fn set_balance(ctx: &mut Context<'_>, address: &Address, coins: &Coins) -> Result<()> {
    if coins.is_empty() {
        ctx.delete(&balance_key(address))
    } else {
        ctx.set(&balance_key(address), coins)
    }
}

pub fn params(ctx: &mut Context<'_>) -> Result<BankParams> {
    Ok(ctx.get(PARAMS_KEY)?.unwrap_or_default())
}

pub fn supply(ctx: &mut Context<'_>) -> Result<Coins> {
    Ok(ctx.get(SUPPLY_KEY)?.unwrap_or_default())
}

pub fn sub_coins(ctx: &mut Context<'_>, address: &Address, amount: &Coins) -> Result<()> {
    let balance = get_balance(ctx, address)?;
    let remaining = balance.checked_sub(amount).ok_or_else(|| {
        ExecutionError::InsufficientFunds(format!("{} is smaller than {}", balance, amount))
    })?;
    set_balance(ctx, address, &remaining)
}

pub fn add_coins(ctx: &mut Context<'_>, address: &Address, amount: &Coins) -> Result<()> {
    let balance = get_balance(ctx, address)?;
    let updated = balance
        .checked_add(amount)
        .map_err(|e| ExecutionError::InvalidCoins(e.to_string()))?;
    set_balance(ctx, address, &updated)
}

/// Moves coins between balances without touching accounts.
pub fn send_coins(
    ctx: &mut Context<'_>,
    from: &Address,
    to: &Address,
    amount: &Coins,
) -> Result<()> {
    sub_coins(ctx, from, amount)?;
    add_coins(ctx, to, amount)
}

fn ensure_send_enabled(ctx: &mut Context<'_>) -> Result<()> {
    if params(ctx)?.default_send_enabled {
        Ok(())
    } else {
        Err(ExecutionError::InvalidRequest("transfers are currently disabled".to_string()).into())
    }
}

fn transfer_event(sender: &Address, recipient: &Address, amount: &Coins) -> Event {
    Event::new("transfer")
        .attr("recipient", address_to_hex(recipient))
        .attr("sender", address_to_hex(sender))
        .attr("amount", amount.to_string())
}

pub fn handle_send(ctx: &mut Context<'_>, msg: &MsgSend) -> Result<Vec<Event>> {
    ensure_send_enabled(ctx)?;
    send_coins(ctx, &msg.from_address, &msg.to_address, &msg.amount)?;
    auth::get_or_create_account(ctx, &msg.to_address)?;
    Ok(vec![transfer_event(&msg.from_address, &msg.to_address, &msg.amount)])
}

pub fn handle_multi_send(ctx: &mut Context<'_>, msg: &MsgMultiSend) -> Result<Vec<Event>> {
    ensure_send_enabled(ctx)?;
    let mut events = Vec::with_capacity(msg.inputs.len() + msg.outputs.len());
    for input in &msg.inputs {
        sub_coins(ctx, &input.address, &input.coins)?;
        events.push(
            Event::new("coin_spent")
                .attr("spender", address_to_hex(&input.address))
                .attr("amount", input.coins.to_string()),
        );
    }
    for output in &msg.outputs {
        add_coins(ctx, &output.address, &output.coins)?;
        auth::get_or_create_account(ctx, &output.address)?;
        events.push(
            Event::new("coin_received")
                .attr("receiver", address_to_hex(&output.address))
                .attr("amount", output.coins.to_string()),
        );
    }
    Ok(events)
}

/// Loads balances and supply. The recorded supply must equal the sum of all
/// balances.
pub fn init_genesis(ctx: &mut Context<'_>, genesis: &BankGenesis) -> Result<()> {
    ctx.set(PARAMS_KEY, &genesis.params)?;

    let mut total = Coins::new();
    for balance in &genesis.balances {
        balance.coins.validate()?;
        total = total.checked_add(&balance.coins)?;
        add_coins(ctx, &balance.address, &balance.coins)?;
    }
    if total != genesis.supply {
        return Err(HarnessError::Validation(format!(
            "bank genesis: supply is {}, balances sum to {}",
            genesis.supply, total
        )));
    }
    ctx.set(SUPPLY_KEY, &genesis.supply)
}
