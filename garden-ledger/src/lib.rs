//! Garden Ledger
//!
//! Plant ownership ledger: accounts pay a fixed price to seed plants, water
//! them, watch them grow through four stages and harvest them when they bloom.
//!
//! # Architecture
//!
//! - **Single Writer**: One actor task orders and applies every mutation
//! - **Pure Rules**: Growth, decay and payment checks are side-effect free
//! - **Lazy Decay**: Water loss is derived from elapsed block time at read
//! - **Atomic Commits**: Metadata, plant, index and receipt in one write batch
//!
//! # Invariants
//!
//! - Plant IDs are exactly `1..=plant_counter`, assigned in commit order
//! - Stages only move forward, one step at a time
//! - A dead or harvested plant never changes again
//! - A rejected operation leaves no trace

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod rules;
pub mod server;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use rules::{GrowthRules, PaymentPolicy, WateringPolicy};
pub use storage::Storage;
pub use types::{AccountId, Amount, CallContext, Plant, PlantId, Receipt, Stage};
