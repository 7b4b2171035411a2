//! Block lifecycle as a value.
//!
//! Every transition takes the current state by reference and returns the next
//! one, or a `ProtocolViolation` carrying the state it was attempted from.
//! The simulator replaces its state only after the application accepted the
//! corresponding call.

use crate::consensus::ConsensusParams;
use crate::error::{HarnessError, Result};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Initialized,
    /// A block at `height + 1` is open; `ended` once end-block ran.
    BlockOpen { ended: bool },
    BlockClosed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Phase::Uninitialized => write!(f, "uninitialized"),
            Phase::Initialized => write!(f, "initialized"),
            Phase::BlockOpen { ended: false } => write!(f, "block-open"),
            Phase::BlockOpen { ended: true } => write!(f, "block-ended"),
            Phase::BlockClosed => write!(f, "block-closed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLifecycle {
    pub phase: Phase,
    /// Last committed height.
    pub height: u64,
    pub last_commit_hash: [u8; 32],
    pub validators_hash: [u8; 32],
    pub consensus_params: ConsensusParams,
}

impl Default for BlockLifecycle {
    fn default() -> Self {
        BlockLifecycle {
            phase: Phase::Uninitialized,
            height: 0,
            last_commit_hash: [0u8; 32],
            validators_hash: [0u8; 32],
            consensus_params: ConsensusParams::default(),
        }
    }
}

impl fmt::Display for BlockLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "phase={} height={} last_commit={} validators={} max_gas={}",
            self.phase,
            self.height,
            hex::encode(&self.last_commit_hash[..8]),
            hex::encode(&self.validators_hash[..8]),
            self.consensus_params.block.max_gas
        )
    }
}

impl BlockLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of a chain that already committed `height` blocks.
    pub fn resumed(
        height: u64,
        last_commit_hash: [u8; 32],
        validators_hash: [u8; 32],
        consensus_params: ConsensusParams,
    ) -> Self {
        BlockLifecycle {
            phase: if height == 0 {
                Phase::Initialized
            } else {
                Phase::BlockClosed
            },
            height,
            last_commit_hash,
            validators_hash,
            consensus_params,
        }
    }

    fn violation(&self, reason: impl Into<String>) -> HarnessError {
        HarnessError::protocol(reason, self)
    }

    pub fn is_initialized(&self) -> bool {
        self.phase != Phase::Uninitialized
    }

    /// Height of the open block, if any.
    pub fn open_height(&self) -> Option<u64> {
        match self.phase {
            Phase::BlockOpen { .. } => Some(self.height + 1),
            _ => None,
        }
    }

    pub fn init_chain(
        &self,
        validators_hash: [u8; 32],
        consensus_params: ConsensusParams,
    ) -> Result<Self> {
        if self.phase != Phase::Uninitialized {
            return Err(self.violation("init_chain called on an initialised chain"));
        }
        Ok(BlockLifecycle {
            phase: Phase::Initialized,
            validators_hash,
            consensus_params,
            ..self.clone()
        })
    }

    pub fn begin_block(&self, height: u64) -> Result<Self> {
        match self.phase {
            Phase::Initialized | Phase::BlockClosed => {}
            Phase::Uninitialized => return Err(self.violation("begin_block before init_chain")),
            Phase::BlockOpen { .. } => {
                return Err(self.violation("begin_block while a block is open"))
            }
        }
        if height != self.height + 1 {
            return Err(self.violation(format!(
                "begin_block at height {}, expected {}",
                height,
                self.height + 1
            )));
        }
        Ok(BlockLifecycle {
            phase: Phase::BlockOpen { ended: false },
            ..self.clone()
        })
    }

    /// Deliveries leave the state unchanged; this only checks they are allowed.
    pub fn deliver_tx(&self) -> Result<()> {
        match self.phase {
            Phase::BlockOpen { ended: false } => Ok(()),
            Phase::BlockOpen { ended: true } => Err(self.violation("deliver_tx after end_block")),
            _ => Err(self.violation("deliver_tx outside an open block")),
        }
    }

    pub fn end_block(&self) -> Result<Self> {
        match self.phase {
            Phase::BlockOpen { ended: false } => Ok(BlockLifecycle {
                phase: Phase::BlockOpen { ended: true },
                ..self.clone()
            }),
            Phase::BlockOpen { ended: true } => Err(self.violation("end_block called twice")),
            _ => Err(self.violation("end_block outside an open block")),
        }
    }

    pub fn commit(&self, commit_hash: [u8; 32]) -> Result<Self> {
        match self.phase {
            Phase::BlockOpen { ended: true } => Ok(BlockLifecycle {
                phase: Phase::BlockClosed,
                height: self.height + 1,
                last_commit_hash: commit_hash,
                ..self.clone()
            }),
            Phase::BlockOpen { ended: false } => Err(self.violation("commit before end_block")),
            _ => Err(self.violation("commit without an open block")),
        }
    }

    pub fn with_validators_hash(&self, validators_hash: [u8; 32]) -> Self {
        BlockLifecycle {
            validators_hash,
            ..self.clone()
        }
    }
}
