//! Bootstrapping: build the application over a store and, when asked, bring
//! the chain up through init-chain.

use crate::app::staking::consensus_power;
use crate::app::SimApp;
use crate::config::HarnessConfig;
use crate::consensus::ValidatorSet;
use crate::crypto::{KeyType, PrivKey, Signer};
use crate::error::Result;
use crate::genesis::{default_genesis, Balance, GenesisAccount, GenesisComposer};
use crate::persistence::{KvStore, StorageBackend};
use crate::simulator::BlockSimulator;
use crate::transaction::TxConfig;
use std::path::Path;
use tracing::info;

/// Opens `backend` under `home_dir` and builds the application over it.
pub fn new_app(
    backend: &StorageBackend,
    home_dir: &Path,
    pruning_keep_recent: u64,
) -> Result<SimApp> {
    let store = backend.open(home_dir)?;
    info!(?backend, home = %home_dir.display(), "opened application store");
    new_app_with_store(store, pruning_keep_recent)
}

pub fn new_app_with_store(store: Box<dyn KvStore>, pruning_keep_recent: u64) -> Result<SimApp> {
    SimApp::new(store, TxConfig::default(), pruning_keep_recent)
}

/// Builds the application from `config`. Unless `is_check_tx`, the chain is
/// initialised with the default genesis and no validators.
pub fn setup(
    is_check_tx: bool,
    home_dir: &Path,
    config: &HarnessConfig,
) -> Result<BlockSimulator<SimApp>> {
    let app = new_app(
        &config.storage.backend,
        home_dir,
        config.storage.pruning_keep_recent,
    )?;
    let mut simulator = BlockSimulator::new(app, config);
    if !is_check_tx {
        simulator.init_chain(
            &default_genesis(config)?,
            &ValidatorSet::default(),
            config.consensus.clone(),
        )?;
    }
    Ok(simulator)
}

/// Builds the application and initialises it with a genesis composed from
/// `val_set`, `accounts` and `balances`, then commits the genesis state as
/// block 1. Consensus sees every member of `val_set` with the voting power of
/// the configured bond.
pub fn setup_with_genesis_val_set(
    home_dir: &Path,
    config: &HarnessConfig,
    val_set: &ValidatorSet,
    accounts: Vec<GenesisAccount>,
    balances: Vec<Balance>,
) -> Result<BlockSimulator<SimApp>> {
    let app = new_app(
        &config.storage.backend,
        home_dir,
        config.storage.pruning_keep_recent,
    )?;
    let genesis = GenesisComposer::new(config)
        .accounts(accounts)
        .balances(balances)
        .validator_set(val_set)
        .compose()?;

    let bonded_set = val_set.with_power(consensus_power(u128::from(config.genesis.bond_amount)));

    let mut simulator = BlockSimulator::new(app, config);
    simulator.init_chain(&genesis, &bonded_set, config.consensus.clone())?;
    simulator.next_block()?;
    let commit = simulator.finish_block()?;
    info!(height = commit.version, "genesis committed");
    Ok(simulator)
}

/// `count` secp256k1 keys derived from `seed`.
pub fn test_keys(count: usize, seed: &str) -> Result<Vec<PrivKey>> {
    (0..count)
        .map(|i| PrivKey::from_seed(KeyType::Secp256k1, format!("{}-{}", seed, i).as_bytes()))
        .collect()
}

/// Genesis accounts for `keys`, numbered by position.
pub fn genesis_accounts(keys: &[PrivKey]) -> Vec<GenesisAccount> {
    keys.iter()
        .enumerate()
        .map(|(i, key)| GenesisAccount::with_pub_key(key.pub_key(), i as u64))
        .collect()
}
