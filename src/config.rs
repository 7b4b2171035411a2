//! Configuration management for the harness

use crate::consensus::ConsensusParams;
use crate::error::{HarnessError, Result};
use crate::genesis::SupplyAccounting;
use crate::persistence::StorageBackend;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

pub const DEFAULT_CHAIN_ID: &str = "harness-chain";
pub const DEFAULT_BOND_DENOM: &str = "stake";
pub const DEFAULT_GEN_TX_GAS: u64 = 1_000_000;
pub const DEFAULT_BOND_AMOUNT: u64 = 1_000_000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub chain: ChainConfig,
    pub genesis: GenesisConfig,
    pub consensus: ConsensusParams,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub chain_id: String,
    pub bond_denom: String,
    /// Gas limit for transactions built by `sign_and_deliver`.
    pub default_gen_tx_gas: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            chain_id: DEFAULT_CHAIN_ID.to_string(),
            bond_denom: DEFAULT_BOND_DENOM.to_string(),
            default_gen_tx_gas: DEFAULT_GEN_TX_GAS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenesisConfig {
    /// Tokens bonded to each validator derived from a validator set.
    pub bond_amount: u64,
    pub supply_accounting: SupplyAccounting,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        GenesisConfig {
            bond_amount: DEFAULT_BOND_AMOUNT,
            supply_accounting: SupplyAccounting::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Committed versions kept by the store; 0 keeps everything.
    pub pruning_keep_recent: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: StorageBackend::Memory,
            pruning_keep_recent: 0,
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chain.chain_id.trim().is_empty() {
            return Err(HarnessError::Config("chain.chain_id must be set".to_string()));
        }
        crate::coins::validate_denom(&self.chain.bond_denom)
            .map_err(|e| HarnessError::Config(format!("chain.bond_denom: {}", e)))?;
        if self.chain.default_gen_tx_gas == 0 {
            return Err(HarnessError::Config(
                "chain.default_gen_tx_gas must be positive".to_string(),
            ));
        }
        if let StorageBackend::Sqlite { file_name } = &self.storage.backend {
            if file_name.is_empty() {
                return Err(HarnessError::Config(
                    "storage.backend.file_name must be set for sqlite".to_string(),
                ));
            }
        }
        self.consensus
            .validate()
            .map_err(|e| HarnessError::Config(format!("consensus: {}", e)))
    }
}

/// Loads the harness configuration from a TOML file. A missing file yields the
/// defaults; every loaded config is validated.
pub fn load_config(path: impl AsRef<Path>) -> Result<HarnessConfig> {
    let config = match fs::read_to_string(path.as_ref()) {
        Ok(config_str) => toml::from_str(&config_str)?,
        Err(e) if e.kind() == ErrorKind::NotFound => HarnessConfig::default(),
        Err(e) => return Err(HarnessError::Config(format!("failed to read config: {}", e))),
    };

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = load_config("/nonexistent/harness.toml").unwrap();
        assert_eq!(config.chain.chain_id, DEFAULT_CHAIN_ID);
        assert_eq!(config.chain.bond_denom, "stake");
        assert_eq!(config.genesis.bond_amount, 1_000_000);
        assert_eq!(config.consensus.block.max_gas, 2_000_000);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_partial_file_overrides_selected_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[chain]
chain_id = "custom-1"

[genesis]
supply_accounting = "per_balance"

[consensus.block]
max_bytes = 1000
max_gas = -1

[storage]
pruning_keep_recent = 3
backend = {{ kind = "sqlite", file_name = "state.db" }}
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.chain.chain_id, "custom-1");
        assert_eq!(config.chain.default_gen_tx_gas, DEFAULT_GEN_TX_GAS);
        assert_eq!(config.genesis.supply_accounting, SupplyAccounting::PerBalance);
        assert_eq!(config.consensus.block.max_bytes, 1000);
        assert_eq!(config.consensus.block_gas_limit(), None);
        assert_eq!(config.consensus.evidence.max_age_num_blocks, 302_400);
        assert_eq!(config.storage.pruning_keep_recent, 3);
        assert_eq!(
            config.storage.backend,
            StorageBackend::Sqlite {
                file_name: "state.db".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[chain]\nchain_id = \"\"").unwrap();
        assert!(matches!(
            load_config(file.path()),
            Err(HarnessError::Config(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[chain]\nbond_denom = \"1x\"").unwrap();
        assert!(load_config(file.path()).is_err());
    }
}
