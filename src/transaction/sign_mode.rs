//! Sign modes and sign-byte encoding.
//!
//! Every mode is a pure function of the signer context and the transaction.
//! Neither mode covers signature bytes: `Direct` commits to the body and the
//! auth info (signer keys, modes, sequences, fee), `LegacyAminoJson` to a
//! sorted-key JSON document. Filling one signature slot therefore never
//! changes the sign bytes of another.

use crate::coins::Coins;
use crate::error::HarnessError;
use crate::transaction::types::{Msg, SignerData, Tx};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignMode {
    Direct,
    LegacyAminoJson,
}

#[derive(Serialize)]
struct SignDoc<'a> {
    body_bytes: Vec<u8>,
    auth_info_bytes: Vec<u8>,
    chain_id: &'a str,
    account_number: u64,
}

#[derive(Serialize)]
struct StdFee<'a> {
    amount: &'a Coins,
    gas: String,
}

#[derive(Serialize)]
struct StdSignDoc<'a> {
    account_number: String,
    chain_id: &'a str,
    fee: StdFee<'a>,
    memo: &'a str,
    msgs: &'a [Msg],
    sequence: String,
    timeout_height: String,
}

impl SignMode {
    pub fn encode(&self, signer: &SignerData, tx: &Tx) -> Result<Vec<u8>, HarnessError> {
        match self {
            SignMode::Direct => {
                let doc = SignDoc {
                    body_bytes: tx.body_bytes()?,
                    auth_info_bytes: tx.auth_info_bytes()?,
                    chain_id: &signer.chain_id,
                    account_number: signer.account_number,
                };
                Ok(bincode::serialize(&doc)?)
            }
            SignMode::LegacyAminoJson => {
                let doc = StdSignDoc {
                    account_number: signer.account_number.to_string(),
                    chain_id: &signer.chain_id,
                    fee: StdFee {
                        amount: &tx.auth_info.fee.amount,
                        gas: tx.auth_info.fee.gas_limit.to_string(),
                    },
                    memo: &tx.body.memo,
                    msgs: &tx.body.messages,
                    sequence: signer.sequence.to_string(),
                    timeout_height: tx.body.timeout_height.to_string(),
                };
                // Going through `Value` sorts every object's keys.
                let value = serde_json::to_value(&doc)?;
                Ok(serde_json::to_vec(&value)?)
            }
        }
    }
}

/// The set of sign modes a chain accepts and the one new signatures use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignModeHandler {
    default_mode: SignMode,
    modes: Vec<SignMode>,
}

impl Default for SignModeHandler {
    fn default() -> Self {
        SignModeHandler {
            default_mode: SignMode::Direct,
            modes: vec![SignMode::Direct, SignMode::LegacyAminoJson],
        }
    }
}

impl SignModeHandler {
    pub fn new(default_mode: SignMode, modes: Vec<SignMode>) -> Result<Self, HarnessError> {
        if !modes.contains(&default_mode) {
            return Err(HarnessError::Validation(format!(
                "default sign mode {:?} is not among the supported modes",
                default_mode
            )));
        }
        Ok(SignModeHandler {
            default_mode,
            modes,
        })
    }

    pub fn default_mode(&self) -> SignMode {
        self.default_mode
    }

    pub fn modes(&self) -> &[SignMode] {
        &self.modes
    }

    pub fn get_sign_bytes(
        &self,
        mode: SignMode,
        signer: &SignerData,
        tx: &Tx,
    ) -> Result<Vec<u8>, HarnessError> {
        if !self.modes.contains(&mode) {
            return Err(HarnessError::Validation(format!(
                "unsupported sign mode {:?}",
                mode
            )));
        }
        mode.encode(signer, tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::address_from_string;

    fn sample_tx() -> Tx {
        let mut tx = Tx::default();
        tx.body.messages.push(Msg::send(
            address_from_string("a"),
            address_from_string("b"),
            Coins::single("stake", 5).unwrap(),
        ));
        tx.body.memo = "memo".to_string();
        tx.auth_info.fee.gas_limit = 100;
        tx
    }

    fn signer(sequence: u64) -> SignerData {
        SignerData {
            chain_id: "test-chain".to_string(),
            account_number: 3,
            sequence,
        }
    }

    #[test]
    fn test_amino_json_is_sorted_and_covers_sequence() {
        let tx = sample_tx();
        let bytes = SignMode::LegacyAminoJson.encode(&signer(7), &tx).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("{\"account_number\":\"3\",\"chain_id\":\"test-chain\""));
        assert!(text.contains("\"sequence\":\"7\""));
        assert!(text.contains("{\"amount\":\"5\",\"denom\":\"stake\"}"));

        let other = SignMode::LegacyAminoJson.encode(&signer(8), &tx).unwrap();
        assert_ne!(text.into_bytes(), other);
    }

    #[test]
    fn test_direct_ignores_signature_bytes() {
        let mut tx = sample_tx();
        let before = SignMode::Direct.encode(&signer(0), &tx).unwrap();
        tx.signatures.push(vec![1, 2, 3]);
        let after = SignMode::Direct.encode(&signer(0), &tx).unwrap();
        assert_eq!(before, after);

        tx.body.memo.push('!');
        assert_ne!(before, SignMode::Direct.encode(&signer(0), &tx).unwrap());
    }

    #[test]
    fn test_handler_rejects_unsupported_mode() {
        let handler = SignModeHandler::new(SignMode::Direct, vec![SignMode::Direct]).unwrap();
        let result = handler.get_sign_bytes(SignMode::LegacyAminoJson, &signer(0), &sample_tx());
        assert!(matches!(result, Err(HarnessError::Validation(_))));

        assert!(SignModeHandler::new(SignMode::LegacyAminoJson, vec![SignMode::Direct]).is_err());
    }
}
