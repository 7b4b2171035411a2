//! Stateless checks for transactions, separated from the type definitions
use crate::error::{ExecutionError, HarnessError};
use crate::transaction::types::{Msg, Tx, MAX_TRANSACTION_SIZE};

const ZERO_ADDRESS: [u8; 32] = [0u8; 32];

impl Msg {
    pub fn validate_basic(&self) -> Result<(), ExecutionError> {
        match self {
            Msg::Send(msg) => {
                if msg.from_address == ZERO_ADDRESS {
                    return Err(ExecutionError::InvalidAddress(
                        "sender address cannot be empty".to_string(),
                    ));
                }
                if msg.to_address == ZERO_ADDRESS {
                    return Err(ExecutionError::InvalidAddress(
                        "recipient address cannot be empty".to_string(),
                    ));
                }
                if msg.amount.is_empty() {
                    return Err(ExecutionError::InvalidCoins(
                        "send amount cannot be empty".to_string(),
                    ));
                }
                msg.amount
                    .validate()
                    .map_err(|e| ExecutionError::InvalidCoins(e.to_string()))
            }
            Msg::MultiSend(msg) => {
                if msg.inputs.is_empty() {
                    return Err(ExecutionError::InvalidRequest(
                        "no inputs to send transaction".to_string(),
                    ));
                }
                if msg.outputs.is_empty() {
                    return Err(ExecutionError::InvalidRequest(
                        "no outputs to send transaction".to_string(),
                    ));
                }

                let mut total_in = crate::coins::Coins::new();
                for input in &msg.inputs {
                    if input.address == ZERO_ADDRESS || input.coins.is_empty() {
                        return Err(ExecutionError::InvalidRequest(
                            "input needs an address and a non-empty amount".to_string(),
                        ));
                    }
                    input
                        .coins
                        .validate()
                        .map_err(|e| ExecutionError::InvalidCoins(e.to_string()))?;
                    total_in = total_in
                        .checked_add(&input.coins)
                        .map_err(|e| ExecutionError::InvalidCoins(e.to_string()))?;
                }

                let mut total_out = crate::coins::Coins::new();
                for output in &msg.outputs {
                    if output.address == ZERO_ADDRESS || output.coins.is_empty() {
                        return Err(ExecutionError::InvalidRequest(
                            "output needs an address and a non-empty amount".to_string(),
                        ));
                    }
                    output
                        .coins
                        .validate()
                        .map_err(|e| ExecutionError::InvalidCoins(e.to_string()))?;
                    total_out = total_out
                        .checked_add(&output.coins)
                        .map_err(|e| ExecutionError::InvalidCoins(e.to_string()))?;
                }

                if total_in != total_out {
                    return Err(ExecutionError::InvalidCoins(format!(
                        "sum inputs {} != sum outputs {}",
                        total_in, total_out
                    )));
                }
                Ok(())
            }
        }
    }
}

impl Tx {
    /// Structural check of the envelope: one signature per slot, no more slots
    /// than required signers. Holds for partially signed transactions too.
    pub fn validate_envelope(&self) -> Result<(), HarnessError> {
        let slots = self.auth_info.signer_infos.len();
        if slots != self.signatures.len() {
            return Err(HarnessError::Validation(format!(
                "signer infos ({}) and signatures ({}) are out of step",
                slots,
                self.signatures.len()
            )));
        }
        let required = self.signers().len();
        if slots > required {
            return Err(HarnessError::Validation(format!(
                "{} signature slots for {} required signers",
                slots, required
            )));
        }
        Ok(())
    }

    /// Stateless validation the application runs before touching state.
    pub fn validate_basic(&self) -> Result<(), ExecutionError> {
        if self.body.messages.is_empty() {
            return Err(ExecutionError::InvalidRequest(
                "must contain at least one message".to_string(),
            ));
        }
        for msg in &self.body.messages {
            msg.validate_basic()?;
        }

        self.auth_info
            .fee
            .amount
            .validate()
            .map_err(|e| ExecutionError::InsufficientFee(e.to_string()))?;

        let size = self
            .to_bytes()
            .map_err(|e| ExecutionError::TxDecode(e.to_string()))?
            .len();
        if size > MAX_TRANSACTION_SIZE {
            return Err(ExecutionError::TxDecode(format!(
                "transaction too large: {} bytes (max: {})",
                size, MAX_TRANSACTION_SIZE
            )));
        }

        if self.signatures.is_empty() {
            return Err(ExecutionError::NoSignatures);
        }
        let signers = self.signers();
        if self.signatures.len() != signers.len()
            || self.auth_info.signer_infos.len() != signers.len()
        {
            return Err(ExecutionError::Unauthorized(format!(
                "wrong number of signers; expected {}, got {}",
                signers.len(),
                self.signatures.len()
            )));
        }
        Ok(())
    }
}
