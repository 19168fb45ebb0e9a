//! Actor-based concurrency for the ledger
//!
//! This module implements the single-writer pattern using Tokio actors:
//! - One logical writer task gives every mutation a place in a total order
//! - Each mutation is validated, computed and committed before the next starts
//! - Async message passing with backpressure (bounded mailbox)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │            Transaction submitters (many)              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ Ledger::plant_seed / water_plant / ...
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │         Sends messages to actor mailbox               │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │  ┌────────────────────────────────────────────────┐  │
//! │  │ LedgerMeta: counter, treasury, clock, sequence │  │
//! │  │ GrowthRules: fixed at deployment               │  │
//! │  └────────────────────────────────────────────────┘  │
//! │                       │                               │
//! │                       ▼                               │
//! │              Storage::commit()                        │
//! │        (one WriteBatch per operation)                 │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! Readers never go through the mailbox; they read a storage snapshot.

use crate::metrics::Metrics;
use crate::rules::GrowthRules;
use crate::storage::{Commit, Storage};
use crate::types::{
    Amount, CallContext, GardenEvent, LedgerMeta, Operation, PlantId, PlantRecord, Receipt,
};
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Apply a mutating operation
    Execute {
        /// Operation to apply
        op: Operation,
        /// Sender, value and block time
        ctx: CallContext,
        /// Reply channel
        response: oneshot::Sender<Result<Receipt>>,
    },

    /// Move the ledger clock forward
    AdvanceClock {
        /// New clock value
        block_time: u64,
        /// Reply channel
        response: oneshot::Sender<Result<()>>,
    },

    /// Stop the actor once earlier messages are processed
    Shutdown {
        /// Signalled once the actor has stopped
        response: oneshot::Sender<()>,
    },
}

/// Actor that owns all ledger writes
pub struct LedgerActor {
    /// Storage backend
    storage: Arc<Storage>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// Last committed metadata
    meta: LedgerMeta,

    /// Deployed rules
    rules: GrowthRules,

    /// Metrics
    metrics: Metrics,
}

/// What one operation produces before it is committed
struct Outcome {
    plant: Option<PlantRecord>,
    index_owner: bool,
    events: Vec<GardenEvent>,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        storage: Arc<Storage>,
        mailbox: mpsc::Receiver<LedgerMessage>,
        meta: LedgerMeta,
        rules: GrowthRules,
        metrics: Metrics,
    ) -> Self {
        metrics.set_treasury(meta.treasury);
        Self {
            storage,
            mailbox,
            meta,
            rules,
            metrics,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let mut stop_reply = None;

        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::Execute { op, ctx, response } => {
                    let result = self.execute(op, &ctx);
                    if let Err(e) = &result {
                        self.report_failure(op, &ctx, e);
                    }
                    let _ = response.send(result);
                }

                LedgerMessage::AdvanceClock {
                    block_time,
                    response,
                } => {
                    let result = self.advance_clock(block_time);
                    if let Err(e) = &result {
                        tracing::warn!(block_time, error = %e, "Clock advance rejected");
                    }
                    let _ = response.send(result);
                }

                LedgerMessage::Shutdown { response } => {
                    stop_reply = Some(response);
                    break;
                }
            }
        }

        tracing::info!(
            sequence = self.meta.sequence,
            plant_counter = self.meta.plant_counter,
            "Ledger actor stopping"
        );

        // The storage handle must be gone before the stop is acknowledged
        let LedgerActor {
            storage, mailbox, ..
        } = self;
        drop(mailbox);
        drop(storage);

        if let Some(response) = stop_reply {
            let _ = response.send(());
        }
    }

    /// Validate, compute and commit one operation.
    ///
    /// In-memory metadata is replaced only after the write succeeds, so a
    /// failed operation leaves no trace.
    fn execute(&mut self, op: Operation, ctx: &CallContext) -> Result<Receipt> {
        let started = Instant::now();
        self.check_clock(ctx.block_time)?;

        let mut meta = self.meta.clone();
        meta.clock = ctx.block_time;
        meta.sequence = meta
            .sequence
            .checked_add(1)
            .ok_or_else(|| Error::InvariantViolation("Sequence overflow".to_string()))?;

        let outcome = self.apply(op, ctx, &mut meta)?;

        let receipt = Receipt {
            sequence: meta.sequence,
            tx_hash: tx_hash(meta.sequence, ctx, &op)?,
            block_time: ctx.block_time,
            caller: ctx.caller.clone(),
            events: outcome.events,
        };

        self.storage.commit(&Commit {
            meta: meta.clone(),
            plant: outcome.plant,
            index_owner: outcome.index_owner,
            receipt: Some(receipt.clone()),
        })?;

        self.meta = meta;

        self.metrics.record_events(&receipt.events);
        self.metrics.set_treasury(self.meta.treasury);
        self.metrics
            .record_commit_duration(started.elapsed().as_secs_f64());

        tracing::info!(
            operation = op.name(),
            caller = %ctx.caller,
            sequence = receipt.sequence,
            tx_hash = %receipt.tx_hash_hex(),
            events = receipt.events.len(),
            "Operation committed"
        );

        Ok(receipt)
    }

    /// Compute the effect of `op` on `meta` and the touched plant
    fn apply(&self, op: Operation, ctx: &CallContext, meta: &mut LedgerMeta) -> Result<Outcome> {
        match op {
            Operation::PlantSeed => {
                self.rules.check_seed_payment(ctx.value)?;

                let id = meta
                    .plant_counter
                    .checked_add(1)
                    .ok_or_else(|| Error::InvariantViolation("Plant counter overflow".to_string()))?;
                meta.plant_counter = id;
                meta.treasury = meta
                    .treasury
                    .checked_add(ctx.value)
                    .ok_or_else(|| Error::InvariantViolation("Treasury overflow".to_string()))?;

                let plant_id = PlantId::new(id);
                let record = self
                    .rules
                    .new_plant(plant_id, ctx.caller.clone(), ctx.block_time);

                Ok(Outcome {
                    plant: Some(record),
                    index_owner: true,
                    events: vec![GardenEvent::PlantSeeded {
                        plant_id,
                        owner: ctx.caller.clone(),
                    }],
                })
            }

            Operation::WaterPlant(id) => {
                let record = self.load_plant(id)?;
                let (next, events) = self.rules.water(&record, ctx)?;
                Ok(Outcome {
                    plant: Some(next),
                    index_owner: false,
                    events,
                })
            }

            Operation::UpdatePlantStage(id) => {
                let record = self.load_plant(id)?;
                let (next, events) = self.rules.update_stage(&record, ctx)?;
                Ok(Outcome {
                    plant: Some(next),
                    index_owner: false,
                    events,
                })
            }

            Operation::HarvestPlant(id) => {
                let record = self.load_plant(id)?;
                let (next, treasury, events) = self.rules.harvest(&record, ctx, meta.treasury)?;
                meta.treasury = treasury;
                Ok(Outcome {
                    plant: Some(next),
                    index_owner: false,
                    events,
                })
            }

            Operation::Deposit => {
                if ctx.value.is_zero() {
                    return Err(Error::InvalidAmount("Deposit must be positive".to_string()));
                }
                meta.treasury = meta
                    .treasury
                    .checked_add(ctx.value)
                    .ok_or_else(|| Error::InvariantViolation("Treasury overflow".to_string()))?;
                Ok(Outcome {
                    plant: None,
                    index_owner: false,
                    events: vec![GardenEvent::Deposited {
                        from: ctx.caller.clone(),
                        amount: ctx.value,
                    }],
                })
            }

            Operation::Withdraw => {
                let amount = self.rules.withdraw(ctx, meta.treasury)?;
                meta.treasury = Amount::ZERO;
                Ok(Outcome {
                    plant: None,
                    index_owner: false,
                    events: vec![GardenEvent::TreasuryWithdrawn {
                        to: ctx.caller.clone(),
                        amount,
                    }],
                })
            }
        }
    }

    /// Move the clock forward without touching any plant
    fn advance_clock(&mut self, block_time: u64) -> Result<()> {
        self.check_clock(block_time)?;
        if block_time == self.meta.clock {
            return Ok(());
        }

        let mut meta = self.meta.clone();
        meta.clock = block_time;

        self.storage.commit(&Commit {
            meta: meta.clone(),
            plant: None,
            index_owner: false,
            receipt: None,
        })?;
        self.meta = meta;

        tracing::debug!(clock = block_time, "Clock advanced");
        Ok(())
    }

    fn check_clock(&self, block_time: u64) -> Result<()> {
        if block_time < self.meta.clock {
            return Err(Error::ClockRegression {
                block_time,
                clock: self.meta.clock,
            });
        }
        Ok(())
    }

    /// Load a plant, enforcing `1 <= id <= plant_counter`
    fn load_plant(&self, id: PlantId) -> Result<PlantRecord> {
        if id.value() == 0 || id.value() > self.meta.plant_counter {
            return Err(Error::NotFound(id));
        }
        self.storage
            .get_plant_record(id)?
            .ok_or_else(|| Error::InvariantViolation(format!("Plant {} missing from storage", id)))
    }

    fn report_failure(&self, op: Operation, ctx: &CallContext, error: &Error) {
        if error.is_rejection() {
            self.metrics.record_rejection(op.name());
            tracing::warn!(
                operation = op.name(),
                caller = %ctx.caller,
                error = %error,
                "Operation rejected"
            );
        } else {
            tracing::error!(
                operation = op.name(),
                caller = %ctx.caller,
                error = %error,
                "Operation failed"
            );
        }
    }
}

/// SHA-256 over the ordered operation
fn tx_hash(sequence: u64, ctx: &CallContext, op: &Operation) -> Result<[u8; 32]> {
    let bytes = bincode::serialize(&(sequence, ctx, op))?;
    Ok(Sha256::digest(&bytes).into())
}

impl std::fmt::Debug for LedgerActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerActor")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    /// Apply a mutating operation
    pub async fn execute(&self, op: Operation, ctx: CallContext) -> Result<Receipt> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::Execute {
                op,
                ctx,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Move the ledger clock forward
    pub async fn advance_clock(&self, block_time: u64) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::AdvanceClock {
                block_time,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Shutdown actor, waiting for queued messages to drain
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::Shutdown { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }
}

/// Spawn the ledger actor
///
/// The returned task handle completes once the actor has released storage.
pub fn spawn_ledger_actor(
    storage: Arc<Storage>,
    meta: LedgerMeta,
    rules: GrowthRules,
    metrics: Metrics,
    mailbox_capacity: usize,
) -> (LedgerHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(mailbox_capacity); // Bounded channel for backpressure
    let actor = LedgerActor::new(storage, rx, meta, rules, metrics);

    let task = tokio::spawn(async move {
        actor.run().await;
    });

    (LedgerHandle::new(tx), task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountId, Stage};
    use crate::Config;
    use tempfile::TempDir;

    fn test_rules() -> GrowthRules {
        GrowthRules {
            plant_price: Amount::from_wei(100),
            ..GrowthRules::default()
        }
    }

    fn spawn_test_actor() -> (LedgerHandle, Arc<Storage>, Metrics, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;

        let storage = Arc::new(Storage::open(&config).unwrap());
        let metrics = Metrics::new().unwrap();
        let (handle, _task) = spawn_ledger_actor(
            storage.clone(),
            LedgerMeta::default(),
            test_rules(),
            metrics.clone(),
            16,
        );
        (handle, storage, metrics, temp_dir)
    }

    fn seed_ctx(owner: &str, block_time: u64) -> CallContext {
        CallContext::new(AccountId::new(owner), block_time).with_value(Amount::from_wei(100))
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let (handle, storage, _metrics, _temp) = spawn_test_actor();
        assert_eq!(Arc::strong_count(&storage), 2);
        handle.shutdown().await.unwrap();

        // Storage is released by the time shutdown returns
        assert_eq!(Arc::strong_count(&storage), 1);

        // Mailbox is gone after shutdown
        let result = handle.advance_clock(1).await;
        assert!(matches!(result, Err(Error::Concurrency(_))));
    }

    #[tokio::test]
    async fn test_actor_plant_seed() {
        let (handle, storage, metrics, _temp) = spawn_test_actor();

        let receipt = handle
            .execute(Operation::PlantSeed, seed_ctx("0xa", 10))
            .await
            .unwrap();
        assert_eq!(receipt.sequence, 1);
        assert_eq!(receipt.seeded_plant(), Some(PlantId::new(1)));

        let view = storage.snapshot().unwrap();
        let meta = view.meta().unwrap();
        assert_eq!(meta.plant_counter, 1);
        assert_eq!(meta.treasury, Amount::from_wei(100));
        assert_eq!(meta.clock, 10);

        let record = view.plant(PlantId::new(1)).unwrap().unwrap();
        assert_eq!(record.stage, Stage::Seed);
        assert_eq!(metrics.plants_seeded.get(), 1);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_rejection_commits_nothing() {
        let (handle, storage, metrics, _temp) = spawn_test_actor();

        let ctx = CallContext::new(AccountId::new("0xa"), 10).with_value(Amount::from_wei(50));
        let result = handle.execute(Operation::PlantSeed, ctx).await;
        assert!(matches!(result, Err(Error::InsufficientPayment { .. })));

        let meta = storage.snapshot().unwrap().meta().unwrap();
        assert_eq!(meta, LedgerMeta::default());
        assert_eq!(
            metrics.rejections.with_label_values(&["plant_seed"]).get(),
            1
        );

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_clock_regression() {
        let (handle, storage, _metrics, _temp) = spawn_test_actor();

        handle.advance_clock(100).await.unwrap();
        assert_eq!(storage.snapshot().unwrap().meta().unwrap().clock, 100);

        let result = handle
            .execute(Operation::PlantSeed, seed_ctx("0xa", 99))
            .await;
        assert!(matches!(result, Err(Error::ClockRegression { .. })));
        assert!(handle.advance_clock(50).await.is_err());

        // Same block time is fine
        handle
            .execute(Operation::PlantSeed, seed_ctx("0xa", 100))
            .await
            .unwrap();

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_tx_hashes_unique() {
        let (handle, _storage, _metrics, _temp) = spawn_test_actor();

        let a = handle
            .execute(Operation::PlantSeed, seed_ctx("0xa", 1))
            .await
            .unwrap();
        let b = handle
            .execute(Operation::PlantSeed, seed_ctx("0xa", 1))
            .await
            .unwrap();
        assert_ne!(a.tx_hash, b.tx_hash);
        assert_eq!(b.sequence, 2);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_concurrent_seeds_get_distinct_ids() {
        let (handle, storage, _metrics, _temp) = spawn_test_actor();

        let mut tasks = Vec::new();
        for i in 0..20 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                handle
                    .execute(Operation::PlantSeed, seed_ctx(&format!("0x{:x}", i), 5))
                    .await
                    .unwrap()
                    .seeded_plant()
                    .unwrap()
            }));
        }

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().value());
        }
        ids.sort_unstable();
        assert_eq!(ids, (1..=20).collect::<Vec<_>>());
        assert_eq!(storage.snapshot().unwrap().meta().unwrap().plant_counter, 20);

        handle.shutdown().await.unwrap();
    }
}
