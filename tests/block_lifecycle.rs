//! Integration tests for the block lifecycle state machine

use blockharness::app::Application;
use blockharness::coins::Coins;
use blockharness::config::HarnessConfig;
use blockharness::consensus::{ConsensusParams, ValidatorSet};
use blockharness::crypto::{address_from_string, PrivKey, Signer};
use blockharness::error::{ExecutionError, HarnessError};
use blockharness::genesis::{default_genesis, Balance};
use blockharness::setup::{genesis_accounts, setup, setup_with_genesis_val_set, test_keys};
use blockharness::signing::{gen_tx, GenTxRequest, Memo};
use blockharness::simulator::Phase;
use blockharness::transaction::{Msg, Tx};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn stake(amount: u128) -> Coins {
    Coins::single("stake", amount).expect("valid coins")
}

fn send_tx(chain_id: &str, key: &PrivKey, sequence: u64, amount: u128) -> Result<Tx, HarnessError> {
    let signers: [&dyn Signer; 1] = [key];
    gen_tx(
        &Default::default(),
        GenTxRequest {
            messages: vec![Msg::send(key.address(), address_from_string("sink"), stake(amount))],
            fee_amount: Coins::new(),
            gas_limit: 500_000,
            chain_id,
            account_numbers: &[0],
            sequences: &[sequence],
            signers: &signers,
            memo: Memo::Fixed(format!("tx-{}", sequence)),
        },
    )
}

fn expect_violation<T: std::fmt::Debug>(
    result: Result<T, HarnessError>,
) -> Box<blockharness::BlockLifecycle> {
    match result {
        Err(HarnessError::ProtocolViolation { state, .. }) => state,
        other => panic!("expected a protocol violation, got {:?}", other),
    }
}

#[test]
fn test_height_is_monotonic() -> TestResult {
    let home = TempDir::new()?;
    let mut sim = setup(false, home.path(), &HarnessConfig::default())?;

    let commit = sim.advance_empty_blocks(5)?;
    assert_eq!(commit.version, 5);
    assert_eq!(sim.last_block_height(), 5);
    assert_eq!(sim.lifecycle().height, 5);
    assert_eq!(sim.lifecycle().last_commit_hash, commit.hash);

    for wrong in [0, 5, 7] {
        let state = expect_violation(sim.begin_block(wrong, [0u8; 32]));
        assert_eq!(state.height, 5);
    }
    sim.begin_block(6, [0u8; 32])?;
    sim.finish_block()?;
    assert_eq!(sim.last_block_height(), 6);
    Ok(())
}

#[test]
fn test_out_of_order_calls_are_protocol_violations() -> TestResult {
    let home = TempDir::new()?;
    let config = HarnessConfig::default();
    let keys = test_keys(1, "lifecycle")?;
    let tx = send_tx(&config.chain.chain_id, &keys[0], 0, 1)?;

    let mut fresh = setup(true, home.path(), &config)?;
    expect_violation(fresh.next_block());
    expect_violation(fresh.deliver_tx(&tx));
    expect_violation(fresh.check_tx(&tx));

    let mut sim = setup(false, home.path(), &config)?;
    let state = expect_violation(sim.init_chain(
        &default_genesis(&config)?,
        &ValidatorSet::default(),
        ConsensusParams::default(),
    ));
    assert_eq!(state.phase, Phase::Initialized);

    expect_violation(sim.deliver_tx(&tx));
    expect_violation(sim.end_block());
    expect_violation(sim.commit());

    sim.next_block()?;
    let state = expect_violation(sim.commit());
    assert_eq!(state.phase, Phase::BlockOpen { ended: false });
    expect_violation(sim.next_block());

    sim.end_block()?;
    let state = expect_violation(sim.deliver_tx(&tx));
    assert_eq!(state.phase, Phase::BlockOpen { ended: true });
    sim.commit()?;
    assert_eq!(sim.lifecycle().phase, Phase::BlockClosed);
    Ok(())
}

#[test]
fn test_failed_delivery_does_not_abort_block() -> TestResult {
    let home = TempDir::new()?;
    let keys = test_keys(1, "batch")?;
    let mut sim = setup_with_genesis_val_set(
        home.path(),
        &HarnessConfig::default(),
        &ValidatorSet::deterministic(1, "val")?,
        genesis_accounts(&keys),
        vec![Balance::new(keys[0].address(), stake(100))],
    )?;
    let chain_id = sim.chain_id().to_string();

    let txs = vec![
        send_tx(&chain_id, &keys[0], 0, 10)?,
        send_tx(&chain_id, &keys[0], 5, 10)?,
        send_tx(&chain_id, &keys[0], 1, 10)?,
    ];
    let deliveries = sim.run_block(&txs)?;
    assert!(deliveries[0].is_ok());
    assert!(matches!(
        deliveries[1].error(),
        Some(ExecutionError::WrongSequence {
            expected: 1,
            got: 5
        })
    ));
    assert!(deliveries[2].is_ok());
    assert_eq!(sim.last_block_height(), 2);
    sim.check_balance(&address_from_string("sink"), &stake(20))?;
    Ok(())
}

#[test]
fn test_identical_runs_produce_identical_commits() -> TestResult {
    let run = || -> Result<Vec<[u8; 32]>, Box<dyn std::error::Error>> {
        let home = TempDir::new()?;
        let keys = test_keys(1, "determinism")?;
        let mut sim = setup_with_genesis_val_set(
            home.path(),
            &HarnessConfig::default(),
            &ValidatorSet::deterministic(2, "val")?,
            genesis_accounts(&keys),
            vec![Balance::new(keys[0].address(), stake(1_000))],
        )?;
        let chain_id = sim.chain_id().to_string();
        let mut hashes = Vec::new();
        for sequence in 0..3 {
            sim.run_block(&[send_tx(&chain_id, &keys[0], sequence, 7)?])?;
            hashes.push(sim.last_commit_id().hash);
        }
        Ok(hashes)
    };
    let first = run()?;
    assert_eq!(first, run()?);
    assert_ne!(first[0], first[1]);
    Ok(())
}

#[test]
fn test_block_gas_limit_rejects_transaction() -> TestResult {
    let home = TempDir::new()?;
    let mut config = HarnessConfig::default();
    config.consensus.block.max_gas = 1;
    let keys = test_keys(1, "gas")?;
    let mut sim = setup_with_genesis_val_set(
        home.path(),
        &config,
        &ValidatorSet::deterministic(1, "val")?,
        genesis_accounts(&keys),
        vec![Balance::new(keys[0].address(), stake(100))],
    )?;
    assert_eq!(sim.app().consensus_params().block.max_gas, 1);

    let chain_id = sim.chain_id().to_string();
    let deliveries = sim.run_block(&[send_tx(&chain_id, &keys[0], 0, 10)?])?;
    assert!(matches!(
        deliveries[0].error(),
        Some(ExecutionError::BlockGasExceeded { limit: 1, .. })
    ));
    sim.check_balance(&address_from_string("sink"), &Coins::new())?;
    Ok(())
}

#[test]
fn test_commit_returns_app_hash_into_next_header() -> TestResult {
    let home = TempDir::new()?;
    let mut sim = setup(false, home.path(), &HarnessConfig::default())?;
    let first = sim.advance_empty_blocks(1)?;
    assert_eq!(sim.app().last_commit_id(), first);
    assert_eq!(sim.lifecycle().last_commit_hash, first.hash);
    assert!(!first.is_zero());
    Ok(())
}
