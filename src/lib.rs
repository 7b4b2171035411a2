//! BlockHarness - deterministic end-to-end harness for a chain application
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Harness
//! - [`signing`] - Signed transaction generation (two-pass signing)
//! - [`genesis`] - Genesis composition and the supply invariant
//! - [`simulator`] - Block lifecycle state machine driving the application
//! - [`setup`] - Application bootstrapping
//!
//! ## Application Under Test
//! - [`app`] - The `Application` boundary and the `SimApp` reference chain
//! - [`transaction`] - Transaction types, sign modes and the codec
//!
//! ## Primitives
//! - [`crypto`] - secp256k1 / ed25519 keys and addresses
//! - [`coins`] - Coin sets and fixed-point decimals
//! - [`consensus`] - Consensus parameters and validator sets
//!
//! ## State Management
//! - [`persistence`] - Versioned key-value stores (memory, SQLite)
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//! - [`logging`] - Tracing setup

#![forbid(unsafe_code)]

// ============================================================================
// Harness
// ============================================================================
pub mod genesis;
pub mod setup;
pub mod signing;
pub mod simulator;

// ============================================================================
// Application Under Test
// ============================================================================
pub mod app;
pub mod transaction;

// ============================================================================
// Primitives
// ============================================================================
pub mod coins;
pub mod consensus;
pub mod crypto;

// ============================================================================
// State Management
// ============================================================================
pub mod persistence;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
pub mod logging;

pub use app::{Application, Delivery, SimApp};
pub use error::{ExecutionError, HarnessError, Result};
pub use signing::{gen_tx, GenTxRequest, Memo};
pub use simulator::{BlockLifecycle, BlockSimulator, Phase};
