#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(unsafe_code)]

pub mod config;
pub mod objects;
pub mod units;

pub use ethereum_types::{Address, H256 as TxHash, U256};
