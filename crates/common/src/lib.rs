//! # Stakewatch Common Crate
//!
//! Wire-format utilities shared by the projection engine.
//!
//! ## Modules
//! - `kvp`: block diff and state-key grammar
//! - `decode`: deterministic decoding of raw contract values
//! - `time`: contracting-time conversion
//! - `config`: configuration management

pub mod config;
pub mod decode;
pub mod kvp;
pub mod time;

pub use decode::{DecodeError, DecodedValue, DepositValue, EpochValue};
pub use kvp::{BlockDiff, KvPair, StateKey};

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
