//! Reference application: auth, bank and staking over a versioned store.

use crate::coins::Coins;
use crate::consensus::{ConsensusParams, ValidatorUpdate};
use crate::crypto::Address;
use crate::error::{ExecutionError, HarnessError, Result};
use crate::genesis::{
    AuthGenesis, BankGenesis, GenesisDocument, StakingGenesis, Validator, AUTH_MODULE, BANK_MODULE,
    STAKING_MODULE,
};
use crate::persistence::{CacheKv, CommitId, KvRead, KvStore, WriteSet};
use crate::transaction::{Msg, Tx, TxConfig};
use tracing::{debug, info, warn};

use super::abci::{
    Application, Delivery, Event, GasInfo, Header, RequestBeginBlock, RequestEndBlock,
    RequestInitChain, ResponseCommit, ResponseEndBlock, ResponseInitChain, TxResult,
};
use super::ante::AnteHandler;
use super::auth::{self, BaseAccount};
use super::bank;
use super::context::{Context, GasMeter};
use super::staking;

const CHAIN_ID_KEY: &[u8] = b"app/chain_id";
const CONSENSUS_PARAMS_KEY: &[u8] = b"app/consensus_params";

#[derive(Debug)]
struct BlockState {
    header: Header,
    gas_used: u64,
    /// Writes of the open block. They reach the store at commit, so checks
    /// keep reading the last committed state.
    writes: WriteSet,
}

pub struct SimApp {
    store: Box<dyn KvStore>,
    tx_config: TxConfig,
    chain_id: Option<String>,
    consensus_params: ConsensusParams,
    pruning_keep_recent: u64,
    block: Option<BlockState>,
}

impl SimApp {
    /// Wraps `store`, picking up chain metadata if it was initialised before.
    pub fn new(
        mut store: Box<dyn KvStore>,
        tx_config: TxConfig,
        pruning_keep_recent: u64,
    ) -> Result<Self> {
        store.set_pruning(pruning_keep_recent);
        let chain_id = store
            .get(CHAIN_ID_KEY)?
            .map(|bytes| String::from_utf8(bytes).map_err(|e| HarnessError::Codec(e.to_string())))
            .transpose()?;
        let consensus_params = match store.get(CONSENSUS_PARAMS_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => ConsensusParams::default(),
        };
        if let Some(chain_id) = &chain_id {
            info!(
                "Reopened application for chain {} at height {}",
                chain_id,
                store.last_commit_id().version
            );
        }
        Ok(SimApp {
            store,
            tx_config,
            chain_id,
            consensus_params,
            pruning_keep_recent,
            block: None,
        })
    }

    pub fn chain_id(&self) -> Option<&str> {
        self.chain_id.as_deref()
    }

    pub fn consensus_params(&self) -> &ConsensusParams {
        &self.consensus_params
    }

    pub fn validators(&self) -> Result<Vec<Validator>> {
        let mut ctx = self.query_context();
        staking::validators(&mut ctx)
    }

    pub fn supply(&self) -> Result<Coins> {
        let mut ctx = self.query_context();
        bank::supply(&mut ctx)
    }

    fn query_context(&self) -> Context<'_> {
        Context::new(
            CacheKv::new(self.store.as_read()),
            GasMeter::infinite(),
            self.last_block_height(),
        )
    }

    fn require_chain_id(&self) -> Result<&str> {
        self.chain_id
            .as_deref()
            .ok_or_else(|| HarnessError::Validation("chain is not initialised".to_string()))
    }

    /// Decodes and statelessly validates `tx_bytes`, turning rejections into a
    /// finished delivery.
    fn decode(&self, tx_bytes: &[u8]) -> std::result::Result<Tx, Delivery> {
        let tx = self.tx_config.decode_tx(tx_bytes).map_err(|e| Delivery {
            gas_info: GasInfo::default(),
            outcome: Err(ExecutionError::TxDecode(e.to_string())),
        })?;
        tx.validate_basic().map_err(|e| Delivery {
            gas_info: GasInfo {
                gas_wanted: tx.gas_limit(),
                gas_used: 0,
            },
            outcome: Err(e),
        })?;
        Ok(tx)
    }
}

fn run_msgs(ctx: &mut Context<'_>, tx: &Tx) -> Result<TxResult> {
    let mut events = Vec::new();
    for (i, msg) in tx.body.messages.iter().enumerate() {
        events.push(
            Event::new("message")
                .attr("action", msg.type_url())
                .attr("msg_index", i.to_string()),
        );
        let emitted = match msg {
            Msg::Send(send) => bank::handle_send(ctx, send)?,
            Msg::MultiSend(multi) => bank::handle_multi_send(ctx, multi)?,
        };
        events.extend(emitted);
    }
    Ok(TxResult {
        data: tx.hash()?.to_vec(),
        log: format!("executed {} message(s)", tx.body.messages.len()),
        events,
    })
}

impl Application for SimApp {
    fn init_chain(&mut self, req: RequestInitChain) -> Result<ResponseInitChain> {
        if let Some(existing) = &self.chain_id {
            return Err(HarnessError::Validation(format!(
                "application already initialised for chain {}",
                existing
            )));
        }
        req.consensus_params.validate()?;

        let doc = GenesisDocument::from_json_bytes(&req.app_state_bytes)?;
        let auth_genesis: AuthGenesis = doc.module(AUTH_MODULE)?;
        let bank_genesis: BankGenesis = doc.module(BANK_MODULE)?;
        let staking_genesis: StakingGenesis = doc.module(STAKING_MODULE)?;

        let (writes, validators) = {
            let mut ctx = Context::new(
                CacheKv::new(self.store.as_read()),
                GasMeter::infinite(),
                req.initial_height,
            );
            auth::init_genesis(&mut ctx, &auth_genesis)?;
            bank::init_genesis(&mut ctx, &bank_genesis)?;
            let updates = staking::init_genesis(&mut ctx, &staking_genesis)?;
            check_validator_updates(&req.validators, &updates)?;
            (ctx.into_writes(), updates)
        };
        self.store.apply(writes)?;
        self.store.set(CHAIN_ID_KEY, req.chain_id.as_bytes())?;
        self.store
            .set(CONSENSUS_PARAMS_KEY, &serde_json::to_vec(&req.consensus_params)?)?;

        info!(
            "Initialised chain {} with {} accounts and {} validators",
            req.chain_id,
            auth_genesis.accounts.len(),
            validators.len()
        );
        self.chain_id = Some(req.chain_id);
        self.consensus_params = req.consensus_params;
        Ok(ResponseInitChain {
            validators,
            app_hash: self.store.last_commit_id().hash,
        })
    }

    fn begin_block(&mut self, req: RequestBeginBlock) -> Result<()> {
        let chain_id = self.require_chain_id()?;
        if req.header.chain_id != chain_id {
            return Err(HarnessError::Validation(format!(
                "block for chain {} delivered to chain {}",
                req.header.chain_id, chain_id
            )));
        }
        if self.block.is_some() {
            return Err(HarnessError::Validation(
                "begin_block while a block is in progress".to_string(),
            ));
        }
        debug!(height = req.header.height, "begin block");
        self.block = Some(BlockState {
            header: req.header,
            gas_used: 0,
            writes: WriteSet::new(),
        });
        Ok(())
    }

    fn deliver(&mut self, tx_bytes: &[u8]) -> Result<Delivery> {
        let chain_id = self.require_chain_id()?.to_string();
        let (height, block_gas_used, block_writes) = match &self.block {
            Some(block) => (block.header.height, block.gas_used, block.writes.clone()),
            None => {
                return Err(HarnessError::Validation(
                    "deliver outside of a block".to_string(),
                ))
            }
        };

        let tx = match self.decode(tx_bytes) {
            Ok(tx) => tx,
            Err(rejected) => return Ok(rejected),
        };
        let gas_wanted = tx.gas_limit();
        let ante = AnteHandler {
            chain_id: &chain_id,
            sign_mode_handler: self.tx_config.sign_mode_handler(),
        };

        let mut ante_ctx = Context::new(
            CacheKv::with_writes(self.store.as_read(), block_writes),
            GasMeter::new(gas_wanted),
            height,
        );
        match ante.handle(&mut ante_ctx, &tx, tx_bytes.len()) {
            Ok(()) => {}
            Err(HarnessError::Execution(err)) => {
                warn!(height, code = err.code(), "transaction rejected by ante handler: {}", err);
                return Ok(Delivery {
                    gas_info: GasInfo {
                        gas_wanted,
                        gas_used: ante_ctx.gas_meter.consumed(),
                    },
                    outcome: Err(err),
                });
            }
            Err(other) => return Err(other),
        }
        let gas_meter = ante_ctx.gas_meter;
        let ante_writes = ante_ctx.into_writes();

        let mut msg_ctx = Context::new(
            CacheKv::with_writes(self.store.as_read(), ante_writes.clone()),
            gas_meter,
            height,
        );
        let executed = run_msgs(&mut msg_ctx, &tx);
        let gas_used = msg_ctx.gas_meter.consumed();
        let (writes, mut outcome) = match executed {
            Ok(result) => (msg_ctx.into_writes(), Ok(result)),
            Err(HarnessError::Execution(err)) => (ante_writes.clone(), Err(err)),
            Err(other) => return Err(other),
        };

        let block_gas = block_gas_used.saturating_add(gas_used);
        let writes = match self.consensus_params.block_gas_limit() {
            Some(limit) if block_gas > limit && outcome.is_ok() => {
                outcome = Err(ExecutionError::BlockGasExceeded {
                    limit,
                    used: block_gas,
                });
                ante_writes
            }
            _ => writes,
        };

        if let Some(block) = self.block.as_mut() {
            block.writes = writes;
            block.gas_used = block_gas;
        }

        match &outcome {
            Ok(_) => debug!(height, gas_used, "delivered transaction"),
            Err(err) => warn!(height, gas_used, code = err.code(), "transaction failed: {}", err),
        }
        Ok(Delivery {
            gas_info: GasInfo {
                gas_wanted,
                gas_used,
            },
            outcome,
        })
    }

    fn check(&self, tx_bytes: &[u8]) -> Result<Delivery> {
        let chain_id = self.require_chain_id()?;
        let tx = match self.decode(tx_bytes) {
            Ok(tx) => tx,
            Err(rejected) => return Ok(rejected),
        };
        let gas_wanted = tx.gas_limit();
        let ante = AnteHandler {
            chain_id,
            sign_mode_handler: self.tx_config.sign_mode_handler(),
        };
        let mut ctx = Context::new(
            CacheKv::new(self.store.as_read()),
            GasMeter::new(gas_wanted),
            self.last_block_height() + 1,
        );
        let outcome = match ante.handle(&mut ctx, &tx, tx_bytes.len()) {
            Ok(()) => Ok(TxResult::default()),
            Err(HarnessError::Execution(err)) => Err(err),
            Err(other) => return Err(other),
        };
        Ok(Delivery {
            gas_info: GasInfo {
                gas_wanted,
                gas_used: ctx.gas_meter.consumed(),
            },
            outcome,
        })
    }

    fn end_block(&mut self, req: RequestEndBlock) -> Result<ResponseEndBlock> {
        let (gas_used, block_writes) = match &self.block {
            Some(block) if block.header.height == req.height => {
                (block.gas_used, block.writes.clone())
            }
            _ => {
                return Err(HarnessError::Validation(format!(
                    "end_block for height {} without a matching block",
                    req.height
                )))
            }
        };
        let (validator_updates, writes) = {
            let mut ctx = Context::new(
                CacheKv::with_writes(self.store.as_read(), block_writes),
                GasMeter::infinite(),
                req.height,
            );
            let updates = staking::end_block(&mut ctx)?;
            (updates, ctx.into_writes())
        };
        if let Some(block) = self.block.as_mut() {
            block.writes = writes;
        }
        Ok(ResponseEndBlock {
            validator_updates,
            consensus_param_updates: None,
            events: vec![Event::new("block_gas").attr("gas_used", gas_used.to_string())],
        })
    }

    fn commit(&mut self) -> Result<ResponseCommit> {
        let block = self
            .block
            .take()
            .ok_or_else(|| HarnessError::Validation("commit without a block".to_string()))?;
        self.store.apply(block.writes)?;
        let commit_id = self.store.commit()?;
        if commit_id.version != block.header.height {
            warn!(
                "Store version {} differs from block height {}",
                commit_id.version, block.header.height
            );
        }
        let retain_height = if self.pruning_keep_recent == 0 {
            0
        } else {
            commit_id
                .version
                .saturating_sub(self.pruning_keep_recent)
                .saturating_add(1)
        };
        info!(
            height = commit_id.version,
            hash = %hex::encode(commit_id.hash),
            gas_used = block.gas_used,
            "committed block"
        );
        Ok(ResponseCommit {
            data: commit_id.hash,
            retain_height,
        })
    }

    fn last_block_height(&self) -> u64 {
        self.store.last_commit_id().version
    }

    fn last_commit_id(&self) -> CommitId {
        self.store.last_commit_id()
    }

    fn tx_config(&self) -> &TxConfig {
        &self.tx_config
    }

    fn account(&self, address: &Address) -> Result<Option<BaseAccount>> {
        match self.store.get(&auth::account_key(address))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn balance(&self, address: &Address) -> Result<Coins> {
        match self.store.get(&bank::balance_key(address))? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Ok(Coins::new()),
        }
    }
}

/// The validators the genesis state bonds must be the ones consensus started
/// with, compared by key and power regardless of order.
fn check_validator_updates(
    requested: &[ValidatorUpdate],
    genesis: &[ValidatorUpdate],
) -> Result<()> {
    if requested.is_empty() {
        return Ok(());
    }
    let key = |u: &ValidatorUpdate| (u.pub_key.as_bytes().to_vec(), u.power);
    let mut left: Vec<_> = requested.iter().map(key).collect();
    let mut right: Vec<_> = genesis.iter().map(key).collect();
    left.sort();
    right.sort();
    if left != right {
        return Err(HarnessError::Validation(format!(
            "genesis bonds {} validators that differ from the {} consensus started with",
            genesis.len(),
            requested.len()
        )));
    }
    Ok(())
}
