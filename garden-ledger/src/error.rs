//! Error types for the garden ledger

use crate::types::{AccountId, Amount, PlantId};
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// The first group are rejections: the operation was well-formed but a
/// precondition did not hold, and nothing was committed. The second group are
/// infrastructure failures.
#[derive(Error, Debug)]
pub enum Error {
    /// Creation attempted with less than the plant price
    #[error("Insufficient payment: required {required}, provided {provided}")]
    InsufficientPayment {
        /// Plant price
        required: Amount,
        /// Value attached to the call
        provided: Amount,
    },

    /// Creation attempted with more than the plant price under the exact policy
    #[error("Overpayment: required exactly {required}, provided {provided}")]
    Overpayment {
        /// Plant price
        required: Amount,
        /// Value attached to the call
        provided: Amount,
    },

    /// Value attached to a non-payable operation
    #[error("Operation does not accept payment (attached {0})")]
    UnexpectedPayment(Amount),

    /// Zero-value transfer
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Plant not found
    #[error("Plant not found: {0}")]
    NotFound(PlantId),

    /// Mutation attempted on a dead plant
    #[error("Plant {0} is dead")]
    AlreadyDead(PlantId),

    /// Mutation attempted on a harvested plant
    #[error("Plant {0} has already been harvested")]
    AlreadyHarvested(PlantId),

    /// Harvest attempted before the plant bloomed
    #[error("Plant {0} is not blooming")]
    NotBlooming(PlantId),

    /// Caller lacks permission
    #[error("Unauthorized: {caller} may not {action}")]
    Unauthorized {
        /// Calling account
        caller: AccountId,
        /// Attempted action
        action: &'static str,
    },

    /// Treasury cannot cover the requested transfer
    #[error("Insufficient treasury: required {required}, available {available}")]
    InsufficientTreasury {
        /// Amount needed
        required: Amount,
        /// Amount held in custody
        available: Amount,
    },

    /// Block time moved backwards
    #[error("Clock regression: block time {block_time} is before ledger clock {clock}")]
    ClockRegression {
        /// Block time of the rejected call
        block_time: u64,
        /// Current ledger clock
        clock: u64,
    },

    /// Receipt not found
    #[error("Receipt not found: {0}")]
    ReceiptNotFound(u64),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Invariant violation (counter overflow, corrupted index, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the operation was refused by a ledger rule rather than
    /// failing in the infrastructure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::InsufficientPayment { .. }
                | Error::Overpayment { .. }
                | Error::UnexpectedPayment(_)
                | Error::InvalidAmount(_)
                | Error::NotFound(_)
                | Error::AlreadyDead(_)
                | Error::AlreadyHarvested(_)
                | Error::NotBlooming(_)
                | Error::Unauthorized { .. }
                | Error::InsufficientTreasury { .. }
                | Error::ClockRegression { .. }
                | Error::ReceiptNotFound(_)
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_classification() {
        assert!(Error::NotFound(PlantId::new(3)).is_rejection());
        assert!(Error::AlreadyDead(PlantId::new(1)).is_rejection());
        assert!(!Error::Storage("disk full".to_string()).is_rejection());
        assert!(!Error::Concurrency("mailbox closed".to_string()).is_rejection());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::InsufficientPayment {
            required: Amount::from_wei(100),
            provided: Amount::from_wei(50),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient payment: required 100 wei, provided 50 wei"
        );

        let err = Error::Unauthorized {
            caller: AccountId::new("0xBEEF"),
            action: "water plant 1",
        };
        assert_eq!(err.to_string(), "Unauthorized: 0xbeef may not water plant 1");
    }
}
