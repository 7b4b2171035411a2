//! Block simulator: drives an [`Application`] through
//! init → begin-block → deliver-tx* → end-block → commit and checks that
//! calls arrive in that order.

pub mod lifecycle;

pub use lifecycle::{BlockLifecycle, Phase};

use crate::app::{
    Application, BaseAccount, Delivery, Header, RequestBeginBlock, RequestEndBlock,
    RequestInitChain, ResponseEndBlock, ResponseInitChain,
};
use crate::coins::Coins;
use crate::config::HarnessConfig;
use crate::consensus::{ConsensusParams, ConsensusValidator, ValidatorSet};
use crate::crypto::{address_to_hex, Address, Signer};
use crate::error::{HarnessError, Result};
use crate::genesis::GenesisDocument;
use crate::persistence::CommitId;
use crate::signing::{gen_tx, GenTxRequest, Memo};
use crate::transaction::{Msg, Tx};
use chrono::Utc;
use tracing::{debug, info};

pub struct BlockSimulator<A: Application> {
    app: A,
    lifecycle: BlockLifecycle,
    validators: ValidatorSet,
    chain_id: String,
    bond_denom: String,
    default_gas: u64,
}

impl<A: Application> BlockSimulator<A> {
    /// A simulator over an application that has not been initialised.
    pub fn new(app: A, config: &HarnessConfig) -> Self {
        BlockSimulator {
            app,
            lifecycle: BlockLifecycle::new(),
            validators: ValidatorSet::default(),
            chain_id: config.chain.chain_id.clone(),
            bond_denom: config.chain.bond_denom.clone(),
            default_gas: config.chain.default_gen_tx_gas,
        }
    }

    /// A simulator over an application that was initialised earlier, such as
    /// one reopened from disk.
    pub fn resume(app: A, config: &HarnessConfig, validators: ValidatorSet) -> Self {
        let commit = app.last_commit_id();
        let lifecycle = BlockLifecycle::resumed(
            commit.version,
            commit.hash,
            validators.hash(),
            config.consensus.clone(),
        );
        BlockSimulator {
            lifecycle,
            validators,
            ..Self::new(app, config)
        }
    }

    pub fn app(&self) -> &A {
        &self.app
    }

    pub fn into_app(self) -> A {
        self.app
    }

    pub fn lifecycle(&self) -> &BlockLifecycle {
        &self.lifecycle
    }

    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn init_chain(
        &mut self,
        genesis: &GenesisDocument,
        validators: &ValidatorSet,
        consensus_params: ConsensusParams,
    ) -> Result<ResponseInitChain> {
        let next = self
            .lifecycle
            .init_chain(validators.hash(), consensus_params.clone())?;

        let response = self.app.init_chain(RequestInitChain {
            time: Utc::now(),
            chain_id: self.chain_id.clone(),
            consensus_params,
            validators: validators.to_updates(),
            app_state_bytes: genesis.to_json_bytes()?,
            initial_height: 1,
        })?;

        self.validators = if response.validators.is_empty() {
            validators.clone()
        } else {
            ValidatorSet::new(
                response
                    .validators
                    .iter()
                    .map(|u| ConsensusValidator::new(u.pub_key.clone(), u.power))
                    .collect(),
            )
        };
        self.lifecycle = next.with_validators_hash(self.validators.hash());
        info!(chain_id = %self.chain_id, validators = self.validators.len(), "chain initialised");
        Ok(response)
    }

    /// Opens the block at `height`, which must directly follow the last
    /// committed height.
    pub fn begin_block(&mut self, height: u64, proposer: Address) -> Result<()> {
        let next = self.lifecycle.begin_block(height)?;
        let header = Header {
            chain_id: self.chain_id.clone(),
            height,
            time: Utc::now(),
            last_commit_hash: self.lifecycle.last_commit_hash,
            validators_hash: self.lifecycle.validators_hash,
            next_validators_hash: self.lifecycle.validators_hash,
            proposer_address: proposer,
        };
        self.app.begin_block(RequestBeginBlock { header })?;
        self.lifecycle = next;
        Ok(())
    }

    /// Opens the next block, proposed by the first validator.
    pub fn next_block(&mut self) -> Result<u64> {
        let height = self.lifecycle.height + 1;
        let proposer = self
            .validators
            .validators
            .first()
            .map(|v| v.address)
            .unwrap_or_default();
        self.begin_block(height, proposer)?;
        Ok(height)
    }

    pub fn deliver_tx(&mut self, tx: &Tx) -> Result<Delivery> {
        self.lifecycle.deliver_tx()?;
        let bytes = self.app.tx_config().encode_tx(tx)?;
        self.app.deliver(&bytes)
    }

    /// Delivers raw bytes, for exercising the application's decoder.
    pub fn deliver_tx_bytes(&mut self, tx_bytes: &[u8]) -> Result<Delivery> {
        self.lifecycle.deliver_tx()?;
        self.app.deliver(tx_bytes)
    }

    pub fn end_block(&mut self) -> Result<ResponseEndBlock> {
        let next = self.lifecycle.end_block()?;
        let height = self.lifecycle.height + 1;
        let response = self.app.end_block(RequestEndBlock { height })?;
        if !response.validator_updates.is_empty() {
            self.validators.apply_updates(&response.validator_updates);
        }
        self.lifecycle = next.with_validators_hash(self.validators.hash());
        Ok(response)
    }

    pub fn commit(&mut self) -> Result<CommitId> {
        // Validate the transition before asking the app to persist anything.
        self.lifecycle.commit([0u8; 32])?;
        let response = self.app.commit()?;
        self.lifecycle = self.lifecycle.commit(response.data)?;
        let commit_id = self.app.last_commit_id();
        if commit_id.version != self.lifecycle.height {
            return Err(HarnessError::protocol(
                format!(
                    "application committed version {} at height {}",
                    commit_id.version, self.lifecycle.height
                ),
                &self.lifecycle,
            ));
        }
        debug!(height = commit_id.version, "block committed");
        Ok(commit_id)
    }

    /// Closes the open block: end-block followed by commit.
    pub fn finish_block(&mut self) -> Result<CommitId> {
        self.end_block()?;
        self.commit()
    }

    /// Delivers `txs` in order inside one new block and commits it.
    pub fn run_block(&mut self, txs: &[Tx]) -> Result<Vec<Delivery>> {
        self.next_block()?;
        let mut deliveries = Vec::with_capacity(txs.len());
        for tx in txs {
            deliveries.push(self.deliver_tx(tx)?);
        }
        self.finish_block()?;
        Ok(deliveries)
    }

    pub fn advance_empty_blocks(&mut self, count: u64) -> Result<CommitId> {
        let mut last = self.app.last_commit_id();
        for _ in 0..count {
            self.next_block()?;
            last = self.finish_block()?;
        }
        Ok(last)
    }

    /// Builds a transaction from `msgs`, delivers it in a block of its own
    /// and commits. The block is committed even when the outcome contradicts
    /// `expect_pass`; the mismatch is reported afterwards.
    pub fn sign_and_deliver(
        &mut self,
        msgs: Vec<Msg>,
        account_numbers: &[u64],
        sequences: &[u64],
        expect_pass: bool,
        signers: &[&dyn Signer],
    ) -> Result<Delivery> {
        let tx = gen_tx(
            self.app.tx_config(),
            GenTxRequest {
                messages: msgs,
                fee_amount: Coins::single(&self.bond_denom, 0)?,
                gas_limit: self.default_gas,
                chain_id: &self.chain_id,
                account_numbers,
                sequences,
                signers,
                memo: Memo::Random,
            },
        )?;

        self.next_block()?;
        let delivery = self.deliver_tx(&tx)?;
        self.finish_block()?;

        match (&delivery.outcome, expect_pass) {
            (Ok(_), false) => Err(HarnessError::UnexpectedOutcome(format!(
                "transaction {} passed but was expected to fail",
                tx.hash_str()?
            ))),
            (Err(err), true) => Err(HarnessError::UnexpectedOutcome(format!(
                "transaction {} failed but was expected to pass: {}",
                tx.hash_str()?,
                err
            ))),
            _ => Ok(delivery),
        }
    }

    /// Runs authentication against committed state. Allowed in any phase
    /// after init.
    pub fn check_tx(&self, tx: &Tx) -> Result<Delivery> {
        if !self.lifecycle.is_initialized() {
            return Err(HarnessError::protocol("check_tx before init_chain", &self.lifecycle));
        }
        let bytes = self.app.tx_config().encode_tx(tx)?;
        self.app.check(&bytes)
    }

    pub fn account(&self, address: &Address) -> Result<Option<BaseAccount>> {
        self.app.account(address)
    }

    pub fn balance(&self, address: &Address) -> Result<Coins> {
        self.app.balance(address)
    }

    /// Fails with `UnexpectedOutcome` unless `address` holds exactly `expected`.
    pub fn check_balance(&self, address: &Address, expected: &Coins) -> Result<()> {
        let actual = self.app.balance(address)?;
        if &actual != expected {
            return Err(HarnessError::UnexpectedOutcome(format!(
                "balance of {} is {}, expected {}",
                address_to_hex(address),
                actual,
                expected
            )));
        }
        Ok(())
    }

    pub fn last_block_height(&self) -> u64 {
        self.app.last_block_height()
    }

    pub fn last_commit_id(&self) -> CommitId {
        self.app.last_commit_id()
    }
}
