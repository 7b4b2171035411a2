//! Gas metering and the per-transaction execution context.

use crate::error::{ExecutionError, Result};
use crate::persistence::{CacheKv, KvRead, WriteSet};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const READ_COST_FLAT: u64 = 1000;
pub const READ_COST_PER_BYTE: u64 = 3;
pub const WRITE_COST_FLAT: u64 = 2000;
pub const WRITE_COST_PER_BYTE: u64 = 30;
pub const DELETE_COST: u64 = 1000;
pub const ITER_NEXT_COST_FLAT: u64 = 30;
pub const TX_SIZE_COST_PER_BYTE: u64 = 10;
pub const SIG_VERIFY_COST_SECP256K1: u64 = 1000;
pub const SIG_VERIFY_COST_ED25519: u64 = 590;

/// Counts gas against a limit. A limit of `None` meters without bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasMeter {
    limit: Option<u64>,
    consumed: u64,
}

impl GasMeter {
    pub fn new(limit: u64) -> Self {
        GasMeter {
            limit: Some(limit),
            consumed: 0,
        }
    }

    pub fn infinite() -> Self {
        GasMeter {
            limit: None,
            consumed: 0,
        }
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn consume(&mut self, amount: u64) -> std::result::Result<(), ExecutionError> {
        self.consumed = self.consumed.saturating_add(amount);
        match self.limit {
            Some(limit) if self.consumed > limit => Err(ExecutionError::OutOfGas {
                limit,
                used: self.consumed,
            }),
            _ => Ok(()),
        }
    }
}

/// Store access for one execution step, charging gas per read and write.
pub struct Context<'a> {
    store: CacheKv<'a>,
    pub gas_meter: GasMeter,
    pub height: u64,
}

impl<'a> Context<'a> {
    pub fn new(store: CacheKv<'a>, gas_meter: GasMeter, height: u64) -> Self {
        Context {
            store,
            gas_meter,
            height,
        }
    }

    pub fn get_raw(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.gas_meter.consume(READ_COST_FLAT)?;
        let value = self.store.get(key)?;
        if let Some(bytes) = &value {
            self.gas_meter
                .consume(READ_COST_PER_BYTE * (key.len() + bytes.len()) as u64)?;
        }
        Ok(value)
    }

    pub fn get<T: DeserializeOwned>(&mut self, key: &[u8]) -> Result<Option<T>> {
        match self.get_raw(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize>(&mut self, key: &[u8], value: &T) -> Result<()> {
        let bytes = bincode::serialize(value)?;
        self.gas_meter.consume(WRITE_COST_FLAT)?;
        self.gas_meter
            .consume(WRITE_COST_PER_BYTE * (key.len() + bytes.len()) as u64)?;
        self.store.set(key, &bytes);
        Ok(())
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.gas_meter.consume(DELETE_COST)?;
        self.store.delete(key);
        Ok(())
    }

    pub fn iter_prefix<T: DeserializeOwned>(&mut self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, T)>> {
        let entries = self.store.iter_prefix(prefix)?;
        let mut decoded = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            self.gas_meter.consume(ITER_NEXT_COST_FLAT)?;
            decoded.push((key, bincode::deserialize(&value)?));
        }
        Ok(decoded)
    }

    pub fn into_writes(self) -> WriteSet {
        self.store.into_writes()
    }
}
