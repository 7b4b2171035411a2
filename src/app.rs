//! The application under test: the `Application` boundary and `SimApp`, a
//! small auth/bank/staking chain used as the reference implementation.

pub mod abci;
pub mod ante;
pub mod auth;
pub mod bank;
pub mod context;
pub mod simapp;
pub mod staking;

pub use abci::{
    Application, Delivery, Event, GasInfo, Header, RequestBeginBlock, RequestEndBlock,
    RequestInitChain, ResponseCommit, ResponseEndBlock, ResponseInitChain, TxResult,
};
pub use ante::{fee_collector_address, FEE_COLLECTOR_NAME};
pub use auth::BaseAccount;
pub use context::GasMeter;
pub use simapp::SimApp;
