//! Transaction module split into types, sign modes, builder and validation

pub mod builder;
pub mod sign_mode;
pub mod types;
pub mod validation;

pub use builder::{TxBuilder, TxConfig};
pub use sign_mode::{SignMode, SignModeHandler};
pub use types::*;
