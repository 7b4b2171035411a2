//! Builds signed transactions for one or more signers.
//!
//! Signing is a two-pass protocol over the builder:
//!
//! 1. every signer gets a slot holding its public key, the default sign mode
//!    and its sequence, with empty signature bytes, and all slots are attached
//!    together with the messages, memo, fee and gas;
//! 2. signers are visited in order; each computes sign bytes from the current
//!    builder state and its own (chain id, account number, sequence), signs,
//!    and the slot set is written back and re-validated.
//!
//! Sign bytes cover the full slot set but never signature bytes, so every
//! signer signs the same document regardless of how many slots are filled.

use crate::coins::Coins;
use crate::crypto::Signer;
use crate::error::{HarnessError, Result};
use crate::transaction::{Msg, SignatureV2, SignerData, Tx, TxConfig};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Upper bound on the length of generated memos.
pub const MAX_RANDOM_MEMO_LEN: usize = 100;

/// Memo attached to a generated transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Memo {
    /// Alphanumeric memo of random length in `0..=MAX_RANDOM_MEMO_LEN`, from a
    /// generator seeded per call.
    #[default]
    Random,
    Fixed(String),
}

impl Memo {
    fn resolve(&self) -> String {
        match self {
            Memo::Fixed(memo) => memo.clone(),
            Memo::Random => {
                let seed = chrono::Utc::now()
                    .timestamp_nanos_opt()
                    .unwrap_or_default() as u64;
                random_memo(&mut StdRng::seed_from_u64(seed))
            }
        }
    }
}

pub fn random_memo<R: Rng>(rng: &mut R) -> String {
    let len = rng.gen_range(0..=MAX_RANDOM_MEMO_LEN);
    rng.sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Everything needed to build one signed transaction. `account_numbers`,
/// `sequences` and `signers` are parallel arrays, in required-signer order.
pub struct GenTxRequest<'a> {
    pub messages: Vec<Msg>,
    pub fee_amount: Coins,
    pub gas_limit: u64,
    pub chain_id: &'a str,
    pub account_numbers: &'a [u64],
    pub sequences: &'a [u64],
    pub signers: &'a [&'a dyn Signer],
    pub memo: Memo,
}

/// Generates a signed transaction.
///
/// Fails with [`HarnessError::Validation`] when the parallel arrays disagree in
/// length or the signers do not match the messages' required signers, and with
/// [`HarnessError::Crypto`] when a key cannot sign.
pub fn gen_tx(config: &TxConfig, request: GenTxRequest<'_>) -> Result<Tx> {
    let GenTxRequest {
        messages,
        fee_amount,
        gas_limit,
        chain_id,
        account_numbers,
        sequences,
        signers,
        memo,
    } = request;

    if account_numbers.len() != signers.len() || sequences.len() != signers.len() {
        return Err(HarnessError::Validation(format!(
            "mismatched signer data: {} account numbers, {} sequences, {} signers",
            account_numbers.len(),
            sequences.len(),
            signers.len()
        )));
    }

    let handler = config.sign_mode_handler();
    let sign_mode = handler.default_mode();

    // Pass 1: one empty slot per signer.
    let mut sigs: Vec<SignatureV2> = signers
        .iter()
        .zip(sequences)
        .map(|(signer, sequence)| SignatureV2::empty(signer.pub_key(), sign_mode, *sequence))
        .collect();

    let mut builder = config.new_tx_builder();
    builder.set_msgs(messages)?;
    builder.set_signatures(&sigs)?;
    builder.set_memo(memo.resolve());
    builder.set_fee_amount(fee_amount);
    builder.set_gas_limit(gas_limit);

    let expected = builder.get_tx().signers();
    if expected.len() != signers.len() {
        return Err(HarnessError::Validation(format!(
            "messages require {} signers, got {}",
            expected.len(),
            signers.len()
        )));
    }
    for (i, (signer, required)) in signers.iter().zip(&expected).enumerate() {
        if signer.address() != *required {
            return Err(HarnessError::Validation(format!(
                "signer {} is {} but the messages expect {}",
                i,
                hex::encode(signer.address()),
                hex::encode(required)
            )));
        }
    }

    // Pass 2: fill the slots in signer order.
    for (i, signer) in signers.iter().enumerate() {
        let signer_data = SignerData {
            chain_id: chain_id.to_string(),
            account_number: account_numbers[i],
            sequence: sequences[i],
        };
        let sign_bytes = handler.get_sign_bytes(sign_mode, &signer_data, builder.get_tx())?;
        sigs[i].data.signature = signer.sign(&sign_bytes)?;
        builder.set_signatures(&sigs)?;
        builder.get_tx().validate_envelope()?;
    }

    let tx = builder.into_tx();
    debug!(
        signers = signers.len(),
        memo_len = tx.body.memo.len(),
        "generated signed transaction"
    );
    Ok(tx)
}

/// Recomputes each signer's sign bytes from a finished transaction and checks
/// the signature in that slot.
pub fn verify_tx_signatures(
    config: &TxConfig,
    tx: &Tx,
    chain_id: &str,
    account_numbers: &[u64],
) -> Result<()> {
    tx.validate_envelope()?;
    if account_numbers.len() != tx.auth_info.signer_infos.len() {
        return Err(HarnessError::Validation(format!(
            "{} account numbers for {} signatures",
            account_numbers.len(),
            tx.auth_info.signer_infos.len()
        )));
    }
    for ((info, signature), account_number) in tx
        .auth_info
        .signer_infos
        .iter()
        .zip(&tx.signatures)
        .zip(account_numbers)
    {
        let signer_data = SignerData {
            chain_id: chain_id.to_string(),
            account_number: *account_number,
            sequence: info.sequence,
        };
        let sign_bytes = config
            .sign_mode_handler()
            .get_sign_bytes(info.mode, &signer_data, tx)?;
        info.public_key.verify(&sign_bytes, signature)?;
    }
    Ok(())
}
