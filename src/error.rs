//! Error types for the harness and for the reference application

use crate::simulator::BlockLifecycle;
use thiserror::Error;

/// Failures raised by the harness itself.
///
/// `Validation`, `Crypto` and `ProtocolViolation` are fatal to the running
/// test. `Execution` wraps an application rejection and is the only variant a
/// caller is expected to assert on.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Protocol violation: {reason} [{state}]")]
    ProtocolViolation {
        reason: String,
        state: Box<BlockLifecycle>,
    },

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Unexpected delivery outcome: {0}")]
    UnexpectedOutcome(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl HarnessError {
    pub fn protocol(reason: impl Into<String>, state: &BlockLifecycle) -> Self {
        HarnessError::ProtocolViolation {
            reason: reason.into(),
            state: Box::new(state.clone()),
        }
    }

    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, HarnessError::ProtocolViolation { .. })
    }
}

impl From<std::io::Error> for HarnessError {
    fn from(err: std::io::Error) -> Self {
        HarnessError::Storage(err.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for HarnessError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        HarnessError::Codec(err.to_string())
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(err: serde_json::Error) -> Self {
        HarnessError::Codec(err.to_string())
    }
}

impl From<rusqlite::Error> for HarnessError {
    fn from(err: rusqlite::Error) -> Self {
        HarnessError::Storage(err.to_string())
    }
}

impl From<toml::de::Error> for HarnessError {
    fn from(err: toml::de::Error) -> Self {
        HarnessError::Config(err.to_string())
    }
}

/// A transaction rejected by the application. Codes are stable so tests can
/// match on them without parsing log strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("tx parse error: {0}")]
    TxDecode(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("unknown address: {0}")]
    UnknownAddress(String),

    #[error("invalid coins: {0}")]
    InvalidCoins(String),

    #[error("out of gas: limit {limit}, used {used}")]
    OutOfGas { limit: u64, used: u64 },

    #[error("memo too large: {len} characters (max {max})")]
    MemoTooLarge { len: usize, max: usize },

    #[error("insufficient fee: {0}")]
    InsufficientFee(String),

    #[error("too many signatures: {got} (max {max})")]
    TooManySignatures { got: usize, max: usize },

    #[error("no signatures supplied")]
    NoSignatures,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("account sequence mismatch, expected {expected}, got {got}")]
    WrongSequence { expected: u64, got: u64 },

    #[error("block gas limit exceeded: limit {limit}, used {used}")]
    BlockGasExceeded { limit: u64, used: u64 },
}

impl ExecutionError {
    pub fn code(&self) -> u32 {
        match self {
            ExecutionError::TxDecode(_) => 2,
            ExecutionError::Unauthorized(_) => 4,
            ExecutionError::InsufficientFunds(_) => 5,
            ExecutionError::InvalidAddress(_) => 7,
            ExecutionError::InvalidSignature(_) => 8,
            ExecutionError::UnknownAddress(_) => 9,
            ExecutionError::InvalidCoins(_) => 10,
            ExecutionError::OutOfGas { .. } => 11,
            ExecutionError::MemoTooLarge { .. } => 12,
            ExecutionError::InsufficientFee(_) => 13,
            ExecutionError::TooManySignatures { .. } => 14,
            ExecutionError::NoSignatures => 15,
            ExecutionError::InvalidRequest(_) => 18,
            ExecutionError::WrongSequence { .. } => 32,
            ExecutionError::BlockGasExceeded { .. } => 41,
        }
    }

    pub fn codespace(&self) -> &'static str {
        "sdk"
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_codes_are_distinct() {
        let errors = vec![
            ExecutionError::TxDecode(String::new()),
            ExecutionError::Unauthorized(String::new()),
            ExecutionError::InsufficientFunds(String::new()),
            ExecutionError::InvalidAddress(String::new()),
            ExecutionError::InvalidSignature(String::new()),
            ExecutionError::UnknownAddress(String::new()),
            ExecutionError::InvalidCoins(String::new()),
            ExecutionError::OutOfGas { limit: 1, used: 2 },
            ExecutionError::MemoTooLarge { len: 2, max: 1 },
            ExecutionError::InsufficientFee(String::new()),
            ExecutionError::TooManySignatures { got: 2, max: 1 },
            ExecutionError::NoSignatures,
            ExecutionError::InvalidRequest(String::new()),
            ExecutionError::WrongSequence { expected: 1, got: 0 },
            ExecutionError::BlockGasExceeded { limit: 1, used: 2 },
        ];
        let mut codes: Vec<u32> = errors.iter().map(|e| e.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_execution_error_wraps_into_harness_error() {
        let err: HarnessError = ExecutionError::WrongSequence { expected: 3, got: 2 }.into();
        assert_eq!(
            err.to_string(),
            "Execution error: account sequence mismatch, expected 3, got 2"
        );
        assert!(!err.is_protocol_violation());
    }
}
