//! Authentication run ahead of message execution.
//!
//! Checks run in a fixed order: memo length, size gas, fee deduction, public
//! keys, signature count, then per signer the sequence followed by the
//! signature itself. Sequences are bumped once every check has passed.

use crate::crypto::{address_from_string, address_to_hex, Address, KeyType};
use crate::error::{ExecutionError, Result};
use crate::transaction::{SignModeHandler, SignerData, Tx};
use tracing::trace;

use super::auth::{self, BaseAccount};
use super::bank;
use super::context::{
    Context, SIG_VERIFY_COST_ED25519, SIG_VERIFY_COST_SECP256K1, TX_SIZE_COST_PER_BYTE,
};

pub const FEE_COLLECTOR_NAME: &str = "fee_collector";

pub fn fee_collector_address() -> Address {
    address_from_string(FEE_COLLECTOR_NAME)
}

pub struct AnteHandler<'h> {
    pub chain_id: &'h str,
    pub sign_mode_handler: &'h SignModeHandler,
}

impl AnteHandler<'_> {
    pub fn handle(&self, ctx: &mut Context<'_>, tx: &Tx, tx_size: usize) -> Result<()> {
        let params = auth::params(ctx)?;

        let memo_len = tx.body.memo.chars().count();
        if memo_len as u64 > params.max_memo_characters {
            return Err(ExecutionError::MemoTooLarge {
                len: memo_len,
                max: params.max_memo_characters as usize,
            }
            .into());
        }

        ctx.gas_meter
            .consume(TX_SIZE_COST_PER_BYTE * tx_size as u64)?;

        self.deduct_fee(ctx, tx)?;

        let signers = tx.signers();
        let mut accounts = Vec::with_capacity(signers.len());
        for (signer, info) in signers.iter().zip(&tx.auth_info.signer_infos) {
            let mut account = auth::get_account(ctx, signer)?.ok_or_else(|| {
                ExecutionError::UnknownAddress(format!(
                    "account {} does not exist",
                    address_to_hex(signer)
                ))
            })?;
            match &account.pub_key {
                Some(existing) if *existing != info.public_key => {
                    return Err(ExecutionError::InvalidSignature(format!(
                        "public key does not match the one on account {}",
                        address_to_hex(signer)
                    ))
                    .into());
                }
                Some(_) => {}
                None => {
                    if info.public_key.address() != *signer {
                        return Err(ExecutionError::InvalidSignature(format!(
                            "public key does not match signer address {}",
                            address_to_hex(signer)
                        ))
                        .into());
                    }
                    account.pub_key = Some(info.public_key.clone());
                }
            }
            accounts.push(account);
        }

        let sig_count = tx.signatures.len();
        if sig_count as u64 > params.tx_sig_limit {
            return Err(ExecutionError::TooManySignatures {
                got: sig_count,
                max: params.tx_sig_limit as usize,
            }
            .into());
        }

        for (i, account) in accounts.iter().enumerate() {
            self.verify_signer(ctx, tx, i, account)?;
        }

        for mut account in accounts {
            account.sequence += 1;
            auth::set_account(ctx, &account)?;
        }
        Ok(())
    }

    fn deduct_fee(&self, ctx: &mut Context<'_>, tx: &Tx) -> Result<()> {
        let fee = &tx.auth_info.fee.amount;
        let payer = tx.fee_payer().ok_or_else(|| {
            ExecutionError::InvalidRequest("transaction has no signers".to_string())
        })?;
        if auth::get_account(ctx, &payer)?.is_none() {
            return Err(ExecutionError::UnknownAddress(format!(
                "fee payer address {} does not exist",
                address_to_hex(&payer)
            ))
            .into());
        }
        if fee.is_empty() {
            return Ok(());
        }
        let balance = bank::get_balance(ctx, &payer)?;
        if !balance.is_all_gte(fee) {
            return Err(ExecutionError::InsufficientFunds(format!(
                "fee payer {} has {} but the fee is {}",
                address_to_hex(&payer),
                balance,
                fee
            ))
            .into());
        }
        bank::send_coins(ctx, &payer, &fee_collector_address(), fee)
    }

    fn verify_signer(
        &self,
        ctx: &mut Context<'_>,
        tx: &Tx,
        index: usize,
        account: &BaseAccount,
    ) -> Result<()> {
        let info = &tx.auth_info.signer_infos[index];
        let cost = match info.public_key.key_type() {
            KeyType::Secp256k1 => SIG_VERIFY_COST_SECP256K1,
            KeyType::Ed25519 => SIG_VERIFY_COST_ED25519,
        };
        ctx.gas_meter.consume(cost)?;

        if info.sequence != account.sequence {
            return Err(ExecutionError::WrongSequence {
                expected: account.sequence,
                got: info.sequence,
            }
            .into());
        }

        let signer_data = SignerData {
            chain_id: self.chain_id.to_string(),
            account_number: account.account_number,
            sequence: account.sequence,
        };
        let sign_bytes = self
            .sign_mode_handler
            .get_sign_bytes(info.mode, &signer_data, tx)
            .map_err(|e| ExecutionError::InvalidSignature(e.to_string()))?;
        info.public_key
            .verify(&sign_bytes, &tx.signatures[index])
            .map_err(|_| {
                ExecutionError::InvalidSignature(format!(
                    "signature verification failed; please verify account number ({}), \
                     sequence ({}) and chain-id ({})",
                    account.account_number, account.sequence, self.chain_id
                ))
            })?;
        trace!(signer = %address_to_hex(&account.address), "signature verified");
        Ok(())
    }
}
