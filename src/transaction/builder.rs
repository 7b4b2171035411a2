//! Transaction codec: the mutable builder and the config that hands it out
use crate::coins::Coins;
use crate::error::HarnessError;
use crate::transaction::sign_mode::SignModeHandler;
use crate::transaction::types::{Msg, SignatureV2, SignerInfo, Tx};

/// Accumulates the parts of a transaction. Every setter replaces the previous
/// value, so calling one twice with the same input leaves the tx unchanged.
#[derive(Debug, Clone, Default)]
pub struct TxBuilder {
    tx: Tx,
}

impl TxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_msgs(&mut self, msgs: Vec<Msg>) -> Result<(), HarnessError> {
        if msgs.is_empty() {
            return Err(HarnessError::Validation(
                "a transaction needs at least one message".to_string(),
            ));
        }
        self.tx.body.messages = msgs;
        Ok(())
    }

    /// Replaces every signature slot with `sigs`, in order.
    pub fn set_signatures(&mut self, sigs: &[SignatureV2]) -> Result<(), HarnessError> {
        for (i, sig) in sigs.iter().enumerate() {
            if sigs[..i].iter().any(|other| other.pub_key == sig.pub_key) {
                return Err(HarnessError::Validation(format!(
                    "duplicate public key in signature slot {}",
                    i
                )));
            }
        }

        self.tx.auth_info.signer_infos = sigs
            .iter()
            .map(|sig| SignerInfo {
                public_key: sig.pub_key.clone(),
                mode: sig.data.mode,
                sequence: sig.sequence,
            })
            .collect();
        self.tx.signatures = sigs.iter().map(|sig| sig.data.signature.clone()).collect();
        Ok(())
    }

    pub fn set_memo(&mut self, memo: impl Into<String>) {
        self.tx.body.memo = memo.into();
    }

    pub fn set_fee_amount(&mut self, amount: Coins) {
        self.tx.auth_info.fee.amount = amount;
    }

    pub fn set_gas_limit(&mut self, gas_limit: u64) {
        self.tx.auth_info.fee.gas_limit = gas_limit;
    }

    pub fn set_timeout_height(&mut self, height: u64) {
        self.tx.body.timeout_height = height;
    }

    pub fn get_tx(&self) -> &Tx {
        &self.tx
    }

    pub fn into_tx(self) -> Tx {
        self.tx
    }
}

/// Encoding configuration shared by the harness and the application.
#[derive(Debug, Clone, Default)]
pub struct TxConfig {
    sign_mode_handler: SignModeHandler,
}

impl TxConfig {
    pub fn new(sign_mode_handler: SignModeHandler) -> Self {
        TxConfig { sign_mode_handler }
    }

    pub fn new_tx_builder(&self) -> TxBuilder {
        TxBuilder::new()
    }

    pub fn sign_mode_handler(&self) -> &SignModeHandler {
        &self.sign_mode_handler
    }

    pub fn encode_tx(&self, tx: &Tx) -> Result<Vec<u8>, HarnessError> {
        tx.to_bytes()
    }

    pub fn decode_tx(&self, bytes: &[u8]) -> Result<Tx, HarnessError> {
        Ok(bincode::deserialize(bytes)?)
    }
}
