//! Main ledger orchestration layer
//!
//! This module ties together storage, rules, and actor components
//! into a high-level API for the plant ledger.
//!
//! # Example
//!
//! ```no_run
//! use garden_ledger::types::{AccountId, Amount, CallContext};
//! use garden_ledger::{Config, Ledger};
//!
//! #[tokio::main]
//! async fn main() -> garden_ledger::Result<()> {
//!     let config = Config::default();
//!     let ledger = Ledger::open(config).await?;
//!
//!     let alice = AccountId::new("0xa11ce");
//!     let ctx = CallContext::new(alice, 1_700_000_000).with_value(ledger.plant_price());
//!     let (plant_id, _receipt) = ledger.plant_seed(ctx).await?;
//!
//!     let plant = ledger.get_plant(plant_id)?;
//!     assert!(plant.is_alive);
//!
//!     ledger.shutdown().await?;
//!     Ok(())
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    metrics::Metrics,
    rules::GrowthRules,
    storage::{Deployment, Storage, StorageStats},
    types::{AccountId, Amount, CallContext, LedgerMeta, Operation, Plant, PlantId, Receipt},
    Config, Error, Result,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Main ledger interface
#[derive(Debug)]
pub struct Ledger {
    /// Actor handle for mutations
    handle: LedgerHandle,

    /// Actor task, joined on shutdown
    actor: JoinHandle<()>,

    /// Direct storage access (for reads)
    storage: Arc<Storage>,

    /// Rules fixed at deployment
    rules: GrowthRules,

    /// Metrics shared with the actor
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open ledger with configuration
    ///
    /// The first open of a data directory records the configured rules as the
    /// deployment. Later opens keep the recorded rules, so price and growth
    /// constants never change for an existing ledger.
    pub async fn open(mut config: Config) -> Result<Self> {
        config.validate()?;

        // Open storage
        let storage = Arc::new(Storage::open(&config)?);

        let rules = match storage.load_deployment()? {
            Some(deployment) => {
                if deployment.rules != config.garden {
                    tracing::warn!(
                        deployed_at = %deployment.deployed_at,
                        "Configured rules differ from the deployment; keeping deployed rules"
                    );
                }
                deployment.rules
            }
            None => {
                let deployment = Deployment {
                    rules: config.garden.clone(),
                    deployed_at: Utc::now(),
                };
                storage.put_deployment(&deployment, &LedgerMeta::default())?;
                deployment.rules
            }
        };

        config.garden = rules.clone();

        let meta = storage.load_meta()?.unwrap_or_default();
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to register metrics: {}", e)))?;

        tracing::info!(
            data_dir = %config.data_dir.display(),
            plant_counter = meta.plant_counter,
            sequence = meta.sequence,
            clock = meta.clock,
            "Ledger opened"
        );

        // Spawn actor
        let (handle, actor) = spawn_ledger_actor(
            storage.clone(),
            meta,
            rules.clone(),
            metrics.clone(),
            config.mailbox_capacity,
        );

        Ok(Self {
            handle,
            actor,
            storage,
            rules,
            metrics,
            config,
        })
    }

    // Mutations

    /// Pay the plant price and create a plant owned by the caller
    ///
    /// Returns the new plant's ID together with the receipt.
    pub async fn plant_seed(&self, ctx: CallContext) -> Result<(PlantId, Receipt)> {
        let receipt = self.handle.execute(Operation::PlantSeed, ctx).await?;
        let plant_id = receipt.seeded_plant().ok_or_else(|| {
            Error::InvariantViolation("Seed receipt without PlantSeeded event".to_string())
        })?;
        Ok((plant_id, receipt))
    }

    /// Water a plant
    pub async fn water_plant(&self, id: PlantId, ctx: CallContext) -> Result<Receipt> {
        self.handle.execute(Operation::WaterPlant(id), ctx).await
    }

    /// Advance a plant's stage if it has grown enough
    pub async fn update_plant_stage(&self, id: PlantId, ctx: CallContext) -> Result<Receipt> {
        self.handle.execute(Operation::UpdatePlantStage(id), ctx).await
    }

    /// Harvest a blooming plant
    pub async fn harvest_plant(&self, id: PlantId, ctx: CallContext) -> Result<Receipt> {
        self.handle.execute(Operation::HarvestPlant(id), ctx).await
    }

    /// Move the attached value into custody
    pub async fn deposit(&self, ctx: CallContext) -> Result<Receipt> {
        self.handle.execute(Operation::Deposit, ctx).await
    }

    /// Drain custody to the operator
    pub async fn withdraw(&self, ctx: CallContext) -> Result<Receipt> {
        self.handle.execute(Operation::Withdraw, ctx).await
    }

    /// Move the ledger clock forward
    pub async fn advance_clock(&self, block_time: u64) -> Result<()> {
        self.handle.advance_clock(block_time).await
    }

    // Reads

    /// Number of plants ever created
    pub fn plant_counter(&self) -> Result<u64> {
        Ok(self.storage.snapshot()?.meta()?.plant_counter)
    }

    /// Fixed price of a seed
    pub fn plant_price(&self) -> Amount {
        self.rules.plant_price
    }

    /// Plant snapshot at the ledger clock
    pub fn get_plant(&self, id: PlantId) -> Result<Plant> {
        let view = self.storage.snapshot()?;
        let meta = view.meta()?;

        if id.value() == 0 || id.value() > meta.plant_counter {
            return Err(Error::NotFound(id));
        }

        let record = view.plant(id)?.ok_or_else(|| {
            Error::InvariantViolation(format!("Plant {} missing from storage", id))
        })?;

        Ok(self.rules.snapshot(&record, meta.clock))
    }

    /// IDs of plants created by `owner`, in creation order
    pub fn plants_of(&self, owner: &AccountId) -> Result<Vec<PlantId>> {
        self.storage.snapshot()?.plants_of(owner)
    }

    /// Value held in custody
    pub fn treasury(&self) -> Result<Amount> {
        Ok(self.storage.snapshot()?.meta()?.treasury)
    }

    /// Block time of the last committed operation
    pub fn clock(&self) -> Result<u64> {
        Ok(self.storage.snapshot()?.meta()?.clock)
    }

    /// Rules in force
    pub fn rules(&self) -> &GrowthRules {
        &self.rules
    }

    /// Receipt by sequence number
    pub fn get_receipt(&self, sequence: u64) -> Result<Receipt> {
        self.storage
            .snapshot()?
            .receipt(sequence)?
            .ok_or(Error::ReceiptNotFound(sequence))
    }

    /// Storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        self.storage.get_stats()
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration the ledger was opened with, carrying the deployed rules
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shutdown ledger
    ///
    /// Returns once the database is closed, so the data directory can be
    /// reopened right away.
    pub async fn shutdown(self) -> Result<()> {
        let Ledger {
            handle,
            actor,
            storage,
            ..
        } = self;

        handle.shutdown().await?;
        actor
            .await
            .map_err(|e| Error::Concurrency(format!("Ledger actor failed: {}", e)))?;
        drop(storage);

        tracing::info!("Ledger closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Stage;
    use tempfile::TempDir;

    const PRICE: u128 = 100;
    const REWARD: u128 = 250;

    async fn create_test_ledger() -> (Ledger, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let ledger = Ledger::open(test_config(&temp_dir)).await.unwrap();
        (ledger, temp_dir)
    }

    fn test_config(temp_dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        config.garden.plant_price = Amount::from_wei(PRICE);
        config.garden.harvest_reward = Amount::from_wei(REWARD);
        config.garden.operator = Some(AccountId::new("0x0pe"));
        config
    }

    fn ctx(caller: &str, block_time: u64) -> CallContext {
        CallContext::new(AccountId::new(caller), block_time)
    }

    fn paid(caller: &str, block_time: u64) -> CallContext {
        ctx(caller, block_time).with_value(Amount::from_wei(PRICE))
    }

    /// Water every 300s until the plant blooms (six waterings of 20)
    async fn grow_to_bloom(ledger: &Ledger, id: PlantId, owner: &str) -> u64 {
        let mut t = 0;
        for _ in 0..6 {
            t += 300;
            ledger.water_plant(id, ctx(owner, t)).await.unwrap();
        }
        t
    }

    #[tokio::test]
    async fn test_ledger_open() {
        let (ledger, _temp) = create_test_ledger().await;
        assert_eq!(ledger.plant_counter().unwrap(), 0);
        assert_eq!(ledger.plant_price(), Amount::from_wei(PRICE));
        assert_eq!(ledger.treasury().unwrap(), Amount::ZERO);
    }

    #[tokio::test]
    async fn test_plant_seed_and_get() {
        let (ledger, _temp) = create_test_ledger().await;

        let (id, receipt) = ledger.plant_seed(paid("0xa", 0)).await.unwrap();
        assert_eq!(id, PlantId::new(1));
        assert_eq!(receipt.sequence, 1);

        let plant = ledger.get_plant(id).unwrap();
        assert_eq!(plant.owner, AccountId::new("0xa"));
        assert_eq!(plant.stage, Stage::Seed);
        assert_eq!(plant.water_level, 100);
        assert!(plant.is_alive);

        assert_eq!(ledger.treasury().unwrap(), Amount::from_wei(PRICE));
        assert_eq!(ledger.get_receipt(1).unwrap(), receipt);
    }

    #[tokio::test]
    async fn test_get_plant_out_of_range() {
        let (ledger, _temp) = create_test_ledger().await;
        ledger.plant_seed(paid("0xa", 0)).await.unwrap();

        assert!(matches!(
            ledger.get_plant(PlantId::new(0)),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            ledger.get_plant(PlantId::new(2)),
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_decay_observed_after_clock_advance() {
        let (ledger, _temp) = create_test_ledger().await;
        let (id, _) = ledger.plant_seed(paid("0xa", 0)).await.unwrap();

        ledger.advance_clock(300).await.unwrap();
        assert_eq!(ledger.get_plant(id).unwrap().water_level, 80);

        // 100 water at 2 per 30s runs out at 1500s
        ledger.advance_clock(1_500).await.unwrap();
        let plant = ledger.get_plant(id).unwrap();
        assert!(!plant.is_alive);
        assert_eq!(plant.died_at, Some(1_500));

        let result = ledger.water_plant(id, ctx("0xa", 1_500)).await;
        assert!(matches!(result, Err(Error::AlreadyDead(_))));
    }

    #[tokio::test]
    async fn test_growth_to_bloom_and_harvest() {
        let (ledger, _temp) = create_test_ledger().await;
        let (id, _) = ledger.plant_seed(paid("0xa", 0)).await.unwrap();

        let t = grow_to_bloom(&ledger, id, "0xa").await;
        assert_eq!(ledger.get_plant(id).unwrap().stage, Stage::Blooming);

        // Treasury holds only the seed price
        let result = ledger.harvest_plant(id, ctx("0xa", t)).await;
        assert!(matches!(result, Err(Error::InsufficientTreasury { .. })));

        ledger
            .deposit(ctx("0x0pe", t).with_value(Amount::from_wei(REWARD)))
            .await
            .unwrap();
        let receipt = ledger.harvest_plant(id, ctx("0xa", t)).await.unwrap();
        assert_eq!(receipt.events.len(), 1);
        assert_eq!(ledger.treasury().unwrap(), Amount::from_wei(PRICE));

        let plant = ledger.get_plant(id).unwrap();
        assert!(plant.harvested);

        let result = ledger.harvest_plant(id, ctx("0xa", t + 1)).await;
        assert!(matches!(result, Err(Error::AlreadyHarvested(_))));
        let result = ledger.update_plant_stage(id, ctx("0xa", t + 1)).await;
        assert!(matches!(result, Err(Error::AlreadyHarvested(_))));
        let result = ledger.water_plant(id, ctx("0xa", t + 1)).await;
        assert!(matches!(result, Err(Error::AlreadyHarvested(_))));

        // Rejections leave the frozen plant and the receipt log untouched
        assert_eq!(ledger.get_plant(id).unwrap(), plant);
        assert_eq!(ledger.stats().unwrap().total_receipts, 9);
    }

    #[tokio::test]
    async fn test_withdraw_operator_only() {
        let (ledger, _temp) = create_test_ledger().await;
        ledger.plant_seed(paid("0xa", 0)).await.unwrap();

        let result = ledger.withdraw(ctx("0xa", 1)).await;
        assert!(matches!(result, Err(Error::Unauthorized { .. })));

        ledger.withdraw(ctx("0x0pe", 1)).await.unwrap();
        assert_eq!(ledger.treasury().unwrap(), Amount::ZERO);
    }

    #[tokio::test]
    async fn test_plants_of() {
        let (ledger, _temp) = create_test_ledger().await;
        ledger.plant_seed(paid("0xa", 0)).await.unwrap();
        ledger.plant_seed(paid("0xb", 0)).await.unwrap();
        ledger.plant_seed(paid("0xa", 0)).await.unwrap();

        assert_eq!(
            ledger.plants_of(&AccountId::new("0xa")).unwrap(),
            vec![PlantId::new(1), PlantId::new(3)]
        );
        assert!(ledger.plants_of(&AccountId::new("0xc")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_receipt_not_found() {
        let (ledger, _temp) = create_test_ledger().await;
        assert!(matches!(
            ledger.get_receipt(1),
            Err(Error::ReceiptNotFound(1))
        ));
    }

    #[tokio::test]
    async fn test_reopen_keeps_deployed_rules() {
        let temp_dir = TempDir::new().unwrap();

        let ledger = Ledger::open(test_config(&temp_dir)).await.unwrap();
        ledger.plant_seed(paid("0xa", 10)).await.unwrap();
        ledger.shutdown().await.unwrap();

        let mut config = test_config(&temp_dir);
        config.garden.plant_price = Amount::from_wei(PRICE * 2);
        let ledger = Ledger::open(config).await.unwrap();

        assert_eq!(ledger.plant_price(), Amount::from_wei(PRICE));
        assert_eq!(ledger.config().garden, *ledger.rules());
        assert_eq!(ledger.config().garden.plant_price, Amount::from_wei(PRICE));
        assert_eq!(ledger.plant_counter().unwrap(), 1);
        assert_eq!(ledger.clock().unwrap(), 10);

        let (id, receipt) = ledger.plant_seed(paid("0xb", 20)).await.unwrap();
        assert_eq!(id, PlantId::new(2));
        assert_eq!(receipt.sequence, 2);
    }

    #[tokio::test]
    async fn test_stats() {
        let (ledger, _temp) = create_test_ledger().await;
        ledger.plant_seed(paid("0xa", 0)).await.unwrap();
        ledger
            .deposit(ctx("0xb", 1).with_value(Amount::from_wei(5)))
            .await
            .unwrap();

        let stats = ledger.stats().unwrap();
        assert_eq!(stats.total_plants, 1);
        assert_eq!(stats.total_receipts, 2);
        assert_eq!(stats.treasury, Amount::from_wei(PRICE + 5));
        assert_eq!(ledger.metrics().plants_seeded.get(), 1);
    }
}
