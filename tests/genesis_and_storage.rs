//! Integration tests for genesis composition, configuration and storage backends

use blockharness::app::Application;
use blockharness::coins::Coins;
use blockharness::config::{load_config, HarnessConfig};
use blockharness::consensus::ValidatorSet;
use blockharness::crypto::{address_from_string, Signer};
use blockharness::error::HarnessError;
use blockharness::genesis::{
    verify_supply_invariant, Balance, BankGenesis, GenesisComposer, SupplyAccounting, BANK_MODULE,
};
use blockharness::persistence::{MemStore, StorageBackend};
use blockharness::setup::{
    genesis_accounts, new_app, new_app_with_store, setup_with_genesis_val_set, test_keys,
};
use blockharness::simulator::BlockSimulator;
use blockharness::transaction::Msg;
use std::io::Write;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn stake(amount: u128) -> Coins {
    Coins::single("stake", amount).expect("valid coins")
}

#[test]
fn test_one_validator_one_account_supply() -> TestResult {
    let home = TempDir::new()?;
    let keys = test_keys(1, "supply")?;
    let sim = setup_with_genesis_val_set(
        home.path(),
        &HarnessConfig::default(),
        &ValidatorSet::deterministic(1, "val")?,
        genesis_accounts(&keys),
        vec![Balance::new(keys[0].address(), stake(500))],
    )?;

    assert_eq!(sim.app().supply()?, stake(1_000_500));
    let validators = sim.app().validators()?;
    assert_eq!(validators.len(), 1);
    assert_eq!(validators[0].tokens, 1_000_000);
    Ok(())
}

#[test]
fn test_per_balance_supply_is_rejected_at_init() -> TestResult {
    let home = TempDir::new()?;
    let mut config = HarnessConfig::default();
    config.genesis.supply_accounting = SupplyAccounting::PerBalance;
    let keys = test_keys(2, "legacy")?;
    let balances: Vec<Balance> = keys
        .iter()
        .map(|k| Balance::new(k.address(), stake(500)))
        .collect();

    let doc = GenesisComposer::new(&config)
        .accounts(genesis_accounts(&keys))
        .balances(balances.clone())
        .validator_set(&ValidatorSet::deterministic(1, "val")?)
        .compose()?;
    let bank: BankGenesis = doc.module(BANK_MODULE)?;
    assert_eq!(bank.supply, stake(2_001_000));
    assert!(verify_supply_invariant(&doc).is_err());

    let result = setup_with_genesis_val_set(
        home.path(),
        &config,
        &ValidatorSet::deterministic(1, "val")?,
        genesis_accounts(&keys),
        balances,
    );
    assert!(matches!(result, Err(HarnessError::Validation(_))));
    Ok(())
}

#[test]
fn test_mismatched_consensus_validators_are_rejected() -> TestResult {
    let home = TempDir::new()?;
    let config = HarnessConfig::default();
    let keys = test_keys(1, "mismatch")?;
    let genesis = GenesisComposer::new(&config)
        .accounts(genesis_accounts(&keys))
        .validator_set(&ValidatorSet::deterministic(1, "genesis")?)
        .compose()?;

    let app = new_app(&StorageBackend::Memory, home.path(), 0)?;
    let mut sim = BlockSimulator::new(app, &config);
    let result = sim.init_chain(
        &genesis,
        &ValidatorSet::deterministic(1, "other")?,
        config.consensus.clone(),
    );
    assert!(matches!(result, Err(HarnessError::Validation(_))));
    Ok(())
}

#[test]
fn test_sqlite_backend_survives_restart() -> TestResult {
    let home = TempDir::new()?;
    let mut config = HarnessConfig::default();
    config.storage.backend = StorageBackend::Sqlite {
        file_name: "state.db".to_string(),
    };
    let keys = test_keys(1, "durable")?;
    let val_set = ValidatorSet::deterministic(1, "val")?;
    let sink = address_from_string("sink");

    let committed = {
        let mut sim = setup_with_genesis_val_set(
            home.path(),
            &config,
            &val_set,
            genesis_accounts(&keys),
            vec![Balance::new(keys[0].address(), stake(1_000))],
        )?;
        sim.sign_and_deliver(
            vec![Msg::send(keys[0].address(), sink, stake(10))],
            &[0],
            &[0],
            true,
            &[&keys[0]],
        )?;
        sim.last_commit_id()
    };
    assert!(home.path().join("state.db").exists());

    let app = new_app(&config.storage.backend, home.path(), 0)?;
    assert_eq!(app.last_commit_id(), committed);
    assert_eq!(app.chain_id(), Some(config.chain.chain_id.as_str()));
    assert_eq!(app.balance(&sink)?, stake(10));

    let mut sim = BlockSimulator::resume(app, &config, val_set);
    sim.sign_and_deliver(
        vec![Msg::send(keys[0].address(), sink, stake(5))],
        &[0],
        &[1],
        true,
        &[&keys[0]],
    )?;
    assert_eq!(sim.last_block_height(), 3);
    sim.check_balance(&sink, &stake(15))?;
    Ok(())
}

#[test]
fn test_sqlite_genesis_is_durable_before_any_transaction() -> TestResult {
    let home = TempDir::new()?;
    let mut config = HarnessConfig::default();
    config.storage.backend = StorageBackend::Sqlite {
        file_name: "genesis.db".to_string(),
    };
    let keys = test_keys(1, "durable-genesis")?;
    let genesis_commit = setup_with_genesis_val_set(
        home.path(),
        &config,
        &ValidatorSet::deterministic(1, "val")?,
        genesis_accounts(&keys),
        vec![Balance::new(keys[0].address(), stake(42))],
    )?
    .last_commit_id();
    assert_eq!(genesis_commit.version, 1);

    let app = new_app(&config.storage.backend, home.path(), 0)?;
    assert_eq!(app.last_commit_id(), genesis_commit);
    assert_eq!(app.balance(&keys[0].address())?, stake(42));
    assert_eq!(app.supply()?, stake(1_000_042));
    Ok(())
}

#[test]
fn test_non_default_bond_amount() -> TestResult {
    let home = TempDir::new()?;
    let mut config = HarnessConfig::default();
    config.genesis.bond_amount = 5_000_000;
    let keys = test_keys(1, "bond")?;
    let mut sim = setup_with_genesis_val_set(
        home.path(),
        &config,
        &ValidatorSet::deterministic(3, "val")?,
        genesis_accounts(&keys),
        vec![Balance::new(keys[0].address(), stake(10))],
    )?;
    assert_eq!(sim.validators().total_voting_power(), 15);
    assert_eq!(sim.app().supply()?, stake(15_000_010));

    sim.sign_and_deliver(
        vec![Msg::send(keys[0].address(), address_from_string("sink"), stake(10))],
        &[0],
        &[0],
        true,
        &[&keys[0]],
    )?;
    Ok(())
}

#[test]
fn test_memory_and_sqlite_commit_the_same_hash() -> TestResult {
    let home = TempDir::new()?;
    let keys = test_keys(1, "agree")?;
    let val_set = ValidatorSet::deterministic(1, "val")?;

    let mut hashes = Vec::new();
    for backend in [
        StorageBackend::Memory,
        StorageBackend::Sqlite {
            file_name: "agree.db".to_string(),
        },
    ] {
        let mut config = HarnessConfig::default();
        config.storage.backend = backend;
        let mut sim = setup_with_genesis_val_set(
            home.path(),
            &config,
            &val_set,
            genesis_accounts(&keys),
            vec![Balance::new(keys[0].address(), stake(50))],
        )?;
        hashes.push(sim.advance_empty_blocks(2)?);
    }
    assert_eq!(hashes[0], hashes[1]);
    Ok(())
}

#[test]
fn test_pruned_store_keeps_advancing() -> TestResult {
    let app = new_app_with_store(Box::new(MemStore::new()), 2)?;
    let config = HarnessConfig::default();
    let mut sim = BlockSimulator::new(app, &config);
    sim.init_chain(
        &blockharness::genesis::default_genesis(&config)?,
        &ValidatorSet::default(),
        config.consensus.clone(),
    )?;
    sim.advance_empty_blocks(4)?;
    assert_eq!(sim.last_block_height(), 4);
    Ok(())
}

#[test]
fn test_config_file_drives_setup() -> TestResult {
    let home = TempDir::new()?;
    let path = home.path().join("harness.toml");
    let mut file = std::fs::File::create(&path)?;
    writeln!(file, "[chain]")?;
    writeln!(file, "chain_id = \"toml-chain\"")?;
    writeln!(file, "default_gen_tx_gas = 400000")?;
    writeln!(file, "[storage]")?;
    writeln!(file, "backend = {{ kind = \"sqlite\", file_name = \"from-config.db\" }}")?;
    drop(file);

    let config = load_config(&path)?;
    let keys = test_keys(1, "config")?;
    let mut sim = setup_with_genesis_val_set(
        home.path(),
        &config,
        &ValidatorSet::deterministic(1, "val")?,
        genesis_accounts(&keys),
        vec![Balance::new(keys[0].address(), stake(100))],
    )?;
    assert_eq!(sim.chain_id(), "toml-chain");
    assert_eq!(sim.app().chain_id(), Some("toml-chain"));
    assert!(home.path().join("from-config.db").exists());

    let delivery = sim.sign_and_deliver(
        vec![Msg::send(keys[0].address(), address_from_string("sink"), stake(1))],
        &[0],
        &[0],
        true,
        &[&keys[0]],
    )?;
    assert_eq!(delivery.gas_info.gas_wanted, 400_000);
    Ok(())
}
