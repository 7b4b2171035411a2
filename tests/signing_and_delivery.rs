//! Integration tests for signed transactions delivered through the simulator

use blockharness::app::{fee_collector_address, Application, SimApp};
use blockharness::coins::Coins;
use blockharness::config::HarnessConfig;
use blockharness::consensus::ValidatorSet;
use blockharness::crypto::{address_from_string, PrivKey, Signer};
use blockharness::error::{ExecutionError, HarnessError};
use blockharness::genesis::Balance;
use blockharness::setup::{genesis_accounts, setup_with_genesis_val_set, test_keys};
use blockharness::signing::{gen_tx, GenTxRequest, Memo};
use blockharness::simulator::BlockSimulator;
use blockharness::transaction::{Input, Msg, MsgMultiSend, Output};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

const FUNDS: u128 = 10_000;

fn stake(amount: u128) -> Coins {
    Coins::single("stake", amount).expect("valid coins")
}

/// Helper to bring up a chain with `count` funded accounts and one validator
fn funded_chain(
    home: &TempDir,
    count: usize,
) -> Result<(BlockSimulator<SimApp>, Vec<PrivKey>), Box<dyn std::error::Error>> {
    blockharness::logging::init_tracing();
    let keys = test_keys(count, "account")?;
    let balances = keys
        .iter()
        .map(|k| Balance::new(k.address(), stake(FUNDS)))
        .collect();
    let sim = setup_with_genesis_val_set(
        home.path(),
        &HarnessConfig::default(),
        &ValidatorSet::deterministic(1, "validator")?,
        genesis_accounts(&keys),
        balances,
    )?;
    Ok((sim, keys))
}

fn sequence_of(sim: &BlockSimulator<SimApp>, key: &PrivKey) -> u64 {
    sim.account(&key.address())
        .expect("account query")
        .expect("account exists")
        .sequence
}

#[test]
fn test_expected_pass_increments_sequence_by_one() -> TestResult {
    let home = TempDir::new()?;
    let (mut sim, keys) = funded_chain(&home, 1)?;
    let recipient = address_from_string("recipient");

    let delivery = sim.sign_and_deliver(
        vec![Msg::send(keys[0].address(), recipient, stake(100))],
        &[0],
        &[0],
        true,
        &[&keys[0]],
    )?;

    assert!(delivery.is_ok());
    assert!(delivery.gas_info.gas_used > 0);
    assert!(delivery.gas_info.gas_used <= delivery.gas_info.gas_wanted);
    assert_eq!(sequence_of(&sim, &keys[0]), 1);
    assert_eq!(sim.last_block_height(), 2);
    sim.check_balance(&keys[0].address(), &stake(FUNDS - 100))?;
    sim.check_balance(&recipient, &stake(100))?;

    // The recipient got the next account number.
    let created = sim.account(&recipient)?.ok_or("recipient account missing")?;
    assert_eq!(created.account_number, 1);
    Ok(())
}

#[test]
fn test_two_signers_with_stale_sequence_fail_but_block_commits() -> TestResult {
    let home = TempDir::new()?;
    let (mut sim, keys) = funded_chain(&home, 2)?;
    let (a, b) = (&keys[0], &keys[1]);
    let sink = address_from_string("sink");

    sim.sign_and_deliver(vec![Msg::send(a.address(), sink, stake(1))], &[0], &[0], true, &[a])?;

    let multi = Msg::MultiSend(MsgMultiSend {
        inputs: vec![
            Input {
                address: a.address(),
                coins: stake(5),
            },
            Input {
                address: b.address(),
                coins: stake(5),
            },
        ],
        outputs: vec![Output {
            address: sink,
            coins: stake(10),
        }],
    });

    // `a` already used sequence 0.
    let delivery = sim.sign_and_deliver(vec![multi.clone()], &[0, 1], &[0, 0], false, &[a, b])?;
    assert!(delivery.result().is_none());
    assert_eq!(
        delivery.error(),
        Some(&ExecutionError::WrongSequence {
            expected: 1,
            got: 0
        })
    );
    assert_eq!(sim.last_block_height(), 3);
    assert_eq!(sequence_of(&sim, a), 1);
    assert_eq!(sequence_of(&sim, b), 0);
    sim.check_balance(&sink, &stake(1))?;

    // Expecting success for the same stale transaction is reported after commit.
    let err = sim
        .sign_and_deliver(vec![multi.clone()], &[0, 1], &[0, 0], true, &[a, b])
        .unwrap_err();
    assert!(matches!(err, HarnessError::UnexpectedOutcome(_)));
    assert_eq!(sim.last_block_height(), 4);

    // Fresh sequences go through and bump both signers.
    sim.sign_and_deliver(vec![multi], &[0, 1], &[1, 0], true, &[a, b])?;
    assert_eq!(sequence_of(&sim, a), 2);
    assert_eq!(sequence_of(&sim, b), 1);
    sim.check_balance(&sink, &stake(11))?;
    Ok(())
}

#[test]
fn test_wrong_account_number_fails_verification() -> TestResult {
    let home = TempDir::new()?;
    let (mut sim, keys) = funded_chain(&home, 1)?;
    let msg = Msg::send(keys[0].address(), address_from_string("x"), stake(1));

    let delivery = sim.sign_and_deliver(vec![msg], &[7], &[0], false, &[&keys[0]])?;
    assert!(matches!(
        delivery.error(),
        Some(ExecutionError::InvalidSignature(_))
    ));
    assert_eq!(sequence_of(&sim, &keys[0]), 0);
    Ok(())
}

#[test]
fn test_failed_message_keeps_ante_effects() -> TestResult {
    let home = TempDir::new()?;
    let (mut sim, keys) = funded_chain(&home, 1)?;
    let msg = Msg::send(keys[0].address(), address_from_string("x"), stake(FUNDS + 1));

    let delivery = sim.sign_and_deliver(vec![msg], &[0], &[0], false, &[&keys[0]])?;
    assert!(matches!(
        delivery.error(),
        Some(ExecutionError::InsufficientFunds(_))
    ));
    // Authentication passed, so the sequence moved even though the send failed.
    assert_eq!(sequence_of(&sim, &keys[0]), 1);
    sim.check_balance(&keys[0].address(), &stake(FUNDS))?;
    Ok(())
}

#[test]
fn test_fee_goes_to_fee_collector() -> TestResult {
    let home = TempDir::new()?;
    let (mut sim, keys) = funded_chain(&home, 1)?;
    let signers: [&dyn Signer; 1] = [&keys[0]];

    let tx = gen_tx(
        sim.app().tx_config(),
        GenTxRequest {
            messages: vec![Msg::send(keys[0].address(), address_from_string("x"), stake(10))],
            fee_amount: stake(25),
            gas_limit: 200_000,
            chain_id: sim.chain_id(),
            account_numbers: &[0],
            sequences: &[0],
            signers: &signers,
            memo: Memo::Fixed("fee test".to_string()),
        },
    )?;
    let deliveries = sim.run_block(&[tx])?;
    assert!(deliveries[0].is_ok());
    sim.check_balance(&fee_collector_address(), &stake(25))?;
    sim.check_balance(&keys[0].address(), &stake(FUNDS - 35))?;
    Ok(())
}

#[test]
fn test_ante_rejections() -> TestResult {
    let home = TempDir::new()?;
    let (mut sim, keys) = funded_chain(&home, 1)?;
    let stranger = test_keys(1, "stranger")?.remove(0);
    let chain_id = sim.chain_id().to_string();

    let build = |key: &PrivKey, gas_limit: u64, memo: Memo| {
        let signers: [&dyn Signer; 1] = [key];
        gen_tx(
            &Default::default(),
            GenTxRequest {
                messages: vec![Msg::send(key.address(), address_from_string("x"), stake(1))],
                fee_amount: Coins::new(),
                gas_limit,
                chain_id: &chain_id,
                account_numbers: &[0],
                sequences: &[0],
                signers: &signers,
                memo,
            },
        )
    };

    let long_memo = build(&keys[0], 200_000, Memo::Fixed("m".repeat(300)))?;
    let starved = build(&keys[0], 1_000, Memo::Fixed(String::new()))?;
    let unknown = build(&stranger, 200_000, Memo::Fixed(String::new()))?;

    let deliveries = sim.run_block(&[long_memo, starved, unknown])?;
    assert!(matches!(
        deliveries[0].error(),
        Some(ExecutionError::MemoTooLarge { len: 300, max: 256 })
    ));
    assert!(matches!(
        deliveries[1].error(),
        Some(ExecutionError::OutOfGas { limit: 1_000, .. })
    ));
    assert!(matches!(
        deliveries[2].error(),
        Some(ExecutionError::UnknownAddress(_))
    ));
    assert_eq!(sequence_of(&sim, &keys[0]), 0);
    Ok(())
}

#[test]
fn test_check_tx_leaves_state_untouched() -> TestResult {
    let home = TempDir::new()?;
    let (sim, keys) = funded_chain(&home, 1)?;
    let signers: [&dyn Signer; 1] = [&keys[0]];
    let tx = gen_tx(
        &Default::default(),
        GenTxRequest {
            messages: vec![Msg::send(keys[0].address(), address_from_string("x"), stake(1))],
            fee_amount: stake(3),
            gas_limit: 200_000,
            chain_id: sim.chain_id(),
            account_numbers: &[0],
            sequences: &[0],
            signers: &signers,
            memo: Memo::Random,
        },
    )?;

    let first = sim.check_tx(&tx)?;
    let second = sim.check_tx(&tx)?;
    assert!(first.is_ok());
    assert_eq!(first, second);
    assert_eq!(sequence_of(&sim, &keys[0]), 0);
    sim.check_balance(&keys[0].address(), &stake(FUNDS))?;
    Ok(())
}

#[test]
fn test_check_tx_ignores_open_block_deliveries() -> TestResult {
    let home = TempDir::new()?;
    let (mut sim, keys) = funded_chain(&home, 1)?;
    let chain_id = sim.chain_id().to_string();
    let signers: [&dyn Signer; 1] = [&keys[0]];
    let build = |sequence: u64| {
        gen_tx(
            &Default::default(),
            GenTxRequest {
                messages: vec![Msg::send(keys[0].address(), address_from_string("x"), stake(1))],
                fee_amount: Coins::new(),
                gas_limit: 200_000,
                chain_id: &chain_id,
                account_numbers: &[0],
                sequences: &[sequence],
                signers: &signers,
                memo: Memo::Fixed(String::new()),
            },
        )
    };
    let (first, second) = (build(0)?, build(1)?);

    sim.next_block()?;
    assert!(sim.deliver_tx(&first)?.is_ok());

    // The delivery is not committed yet, so checks still expect sequence 0.
    assert_eq!(
        sim.check_tx(&second)?.error(),
        Some(&ExecutionError::WrongSequence {
            expected: 0,
            got: 1
        })
    );
    assert!(sim.check_tx(&first)?.is_ok());

    sim.finish_block()?;
    assert!(sim.check_tx(&second)?.is_ok());
    assert_eq!(
        sim.check_tx(&first)?.error(),
        Some(&ExecutionError::WrongSequence {
            expected: 1,
            got: 0
        })
    );
    Ok(())
}

#[test]
fn test_undecodable_bytes_are_rejected() -> TestResult {
    let home = TempDir::new()?;
    let (mut sim, _keys) = funded_chain(&home, 1)?;
    sim.next_block()?;
    let delivery = sim.deliver_tx_bytes(&[0xff, 0x00, 0x13])?;
    assert!(matches!(delivery.error(), Some(ExecutionError::TxDecode(_))));
    assert_eq!(delivery.error().map(|e| e.code()), Some(2));
    sim.finish_block()?;
    Ok(())
}
