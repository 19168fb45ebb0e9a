//! Configuration for the garden ledger

use crate::rules::GrowthRules;
use crate::types::{AccountId, Amount};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Metrics listen address
    pub metrics_listen_addr: String,

    /// Capacity of the writer mailbox
    pub mailbox_capacity: usize,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Rules applied on first deployment
    pub garden: GrowthRules,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/garden"),
            service_name: "garden-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            metrics_listen_addr: "0.0.0.0:9090".to_string(),
            mailbox_capacity: 1000,
            rocksdb: RocksDBConfig::default(),
            garden: GrowthRules::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Sync the WAL on every commit
    pub sync_writes: bool,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            sync_writes: true,
            enable_statistics: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("GARDEN_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(addr) = std::env::var("GARDEN_METRICS_ADDR") {
            config.metrics_listen_addr = addr;
        }

        if let Ok(price) = std::env::var("GARDEN_PLANT_PRICE") {
            let wei = price.parse::<u128>().map_err(|e| {
                crate::Error::Config(format!("Invalid GARDEN_PLANT_PRICE {}: {}", price, e))
            })?;
            config.garden.plant_price = Amount::from_wei(wei);
        }

        if let Ok(operator) = std::env::var("GARDEN_OPERATOR") {
            config.garden.operator = Some(AccountId::parse_address(&operator)?);
        }

        if let Ok(policy) = std::env::var("GARDEN_WATERING_POLICY") {
            config.garden.watering_policy = policy.parse()?;
        }

        if let Ok(policy) = std::env::var("GARDEN_PAYMENT_POLICY") {
            config.garden.payment_policy = policy.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check values that would otherwise fail at runtime
    pub fn validate(&self) -> crate::Result<()> {
        if self.mailbox_capacity == 0 {
            return Err(crate::Error::Config(
                "mailbox_capacity must be positive".to_string(),
            ));
        }
        self.garden.validate()
    }
}
