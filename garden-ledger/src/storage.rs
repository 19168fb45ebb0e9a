//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `plants` - Plant records (key: plant_id, big-endian)
//! - `meta` - Ledger metadata and the deployment record
//! - `indices` - Owner index (key: owner_len u32 || owner || plant_id)
//! - `receipts` - Append-only receipt log (key: sequence, big-endian)
//!
//! Every mutating operation lands as one `WriteBatch`, so metadata, plant
//! record, index entry and receipt become visible together or not at all.

use crate::{
    error::{Error, Result},
    rules::GrowthRules,
    types::{AccountId, LedgerMeta, PlantId, PlantRecord, Receipt},
    Config,
};
use chrono::{DateTime, Utc};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, SnapshotWithThreadMode,
    WriteBatch, WriteOptions, DB,
};
use serde::{Deserialize, Serialize};

/// Column family names
const CF_PLANTS: &str = "plants";
const CF_META: &str = "meta";
const CF_INDICES: &str = "indices";
const CF_RECEIPTS: &str = "receipts";

/// Keys in the meta column family
const KEY_META: &[u8] = b"meta";
const KEY_DEPLOYMENT: &[u8] = b"deployment";

/// Rules and time of the first open of a data directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// Rules in force for the lifetime of the ledger
    pub rules: GrowthRules,

    /// Wall-clock time of deployment
    pub deployed_at: DateTime<Utc>,
}

/// State produced by one operation, written atomically
#[derive(Debug, Clone)]
pub struct Commit {
    /// Ledger metadata after the operation
    pub meta: LedgerMeta,

    /// Created or updated plant
    pub plant: Option<PlantRecord>,

    /// Add the plant to its owner's index (creation only)
    pub index_owner: bool,

    /// Receipt of the operation
    pub receipt: Option<Receipt>,
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: DB,
    write_opts: WriteOptions,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_PLANTS, Self::cf_options_plants()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
            ColumnFamilyDescriptor::new(CF_RECEIPTS, Self::cf_options_receipts()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(config.rocksdb.sync_writes);

        tracing::info!(path = ?path, sync = config.rocksdb.sync_writes, "Opened RocksDB");

        Ok(Self { db, write_opts })
    }

    // Column family options

    fn cf_options_plants() -> Options {
        let mut opts = Options::default();
        // Plants are read on every query, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_options_receipts() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Writer access

    /// Load ledger metadata (None on an empty database)
    pub fn load_meta(&self) -> Result<Option<LedgerMeta>> {
        let cf = self.cf_handle(CF_META)?;
        match self.db.get_cf(cf, KEY_META)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Load the deployment record (None on an empty database)
    pub fn load_deployment(&self) -> Result<Option<Deployment>> {
        let cf = self.cf_handle(CF_META)?;
        match self.db.get_cf(cf, KEY_DEPLOYMENT)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Write the deployment record and genesis metadata (atomic)
    pub fn put_deployment(&self, deployment: &Deployment, meta: &LedgerMeta) -> Result<()> {
        let cf = self.cf_handle(CF_META)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(cf, KEY_DEPLOYMENT, bincode::serialize(deployment)?);
        batch.put_cf(cf, KEY_META, bincode::serialize(meta)?);
        self.db.write_opt(batch, &self.write_opts)?;

        tracing::info!(
            plant_price = %deployment.rules.plant_price,
            deployed_at = %deployment.deployed_at,
            "Deployment recorded"
        );

        Ok(())
    }

    /// Get plant record by ID
    pub fn get_plant_record(&self, id: PlantId) -> Result<Option<PlantRecord>> {
        let cf = self.cf_handle(CF_PLANTS)?;
        match self.db.get_cf(cf, id.to_key())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Apply the result of one operation (atomic)
    pub fn commit(&self, commit: &Commit) -> Result<()> {
        let mut batch = WriteBatch::default();

        // 1. Metadata
        let cf_meta = self.cf_handle(CF_META)?;
        batch.put_cf(cf_meta, KEY_META, bincode::serialize(&commit.meta)?);

        // 2. Plant record and owner index
        if let Some(plant) = &commit.plant {
            let cf_plants = self.cf_handle(CF_PLANTS)?;
            batch.put_cf(cf_plants, plant.id.to_key(), bincode::serialize(plant)?);

            if commit.index_owner {
                let cf_indices = self.cf_handle(CF_INDICES)?;
                batch.put_cf(
                    cf_indices,
                    Self::index_key_owner_plant(&plant.owner, Some(plant.id))?,
                    b"",
                );
            }
        }

        // 3. Receipt
        if let Some(receipt) = &commit.receipt {
            let cf_receipts = self.cf_handle(CF_RECEIPTS)?;
            batch.put_cf(
                cf_receipts,
                receipt.sequence.to_be_bytes(),
                bincode::serialize(receipt)?,
            );
        }

        self.db.write_opt(batch, &self.write_opts)?;

        tracing::debug!(
            sequence = commit.meta.sequence,
            plant_counter = commit.meta.plant_counter,
            clock = commit.meta.clock,
            "Commit written"
        );

        Ok(())
    }

    // Reader access

    /// Consistent view of the last committed state
    pub fn snapshot(&self) -> Result<StorageSnapshot<'_>> {
        Ok(StorageSnapshot {
            snapshot: self.db.snapshot(),
            plants: self.cf_handle(CF_PLANTS)?,
            meta: self.cf_handle(CF_META)?,
            indices: self.cf_handle(CF_INDICES)?,
            receipts: self.cf_handle(CF_RECEIPTS)?,
        })
    }

    // Index key helpers

    /// owner_len (u32, big-endian) || owner || plant_id
    ///
    /// The length prefix keeps one owner's keys from being a prefix of
    /// another's.
    fn index_key_owner_plant(owner: &AccountId, plant_id: Option<PlantId>) -> Result<Vec<u8>> {
        let owner_bytes = owner.as_str().as_bytes();
        let len = u32::try_from(owner_bytes.len()).map_err(|_| {
            Error::InvariantViolation(format!(
                "Account id of {} bytes cannot be indexed",
                owner_bytes.len()
            ))
        })?;

        let mut key = Vec::with_capacity(4 + owner_bytes.len() + 8);
        key.extend_from_slice(&len.to_be_bytes());
        key.extend_from_slice(owner_bytes);
        if let Some(id) = plant_id {
            key.extend_from_slice(&id.to_key());
        }
        Ok(key)
    }

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        let meta = self.load_meta()?.unwrap_or_default();
        Ok(StorageStats {
            total_plants: meta.plant_counter,
            total_receipts: meta.sequence,
            treasury: meta.treasury,
        })
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .finish_non_exhaustive()
    }
}

/// Point-in-time read view over the committed state
pub struct StorageSnapshot<'a> {
    snapshot: SnapshotWithThreadMode<'a, DB>,
    plants: &'a ColumnFamily,
    meta: &'a ColumnFamily,
    indices: &'a ColumnFamily,
    receipts: &'a ColumnFamily,
}

impl std::fmt::Debug for StorageSnapshot<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSnapshot").finish_non_exhaustive()
    }
}

impl StorageSnapshot<'_> {
    /// Ledger metadata
    pub fn meta(&self) -> Result<LedgerMeta> {
        match self.snapshot.get_cf(self.meta, KEY_META)? {
            Some(value) => Ok(bincode::deserialize(&value)?),
            None => Ok(LedgerMeta::default()),
        }
    }

    /// Plant record by ID
    pub fn plant(&self, id: PlantId) -> Result<Option<PlantRecord>> {
        match self.snapshot.get_cf(self.plants, id.to_key())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// IDs of plants created by `owner`, in creation order
    pub fn plants_of(&self, owner: &AccountId) -> Result<Vec<PlantId>> {
        let prefix = Storage::index_key_owner_plant(owner, None)?;
        let iter = self
            .snapshot
            .iterator_cf(self.indices, IteratorMode::From(prefix.as_slice(), Direction::Forward));

        let mut ids = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let id = PlantId::from_key(&key[prefix.len()..]).ok_or_else(|| {
                Error::InvariantViolation(format!("Malformed owner index key for {}", owner))
            })?;
            ids.push(id);
        }

        Ok(ids)
    }

    /// Receipt by sequence number
    pub fn receipt(&self, sequence: u64) -> Result<Option<Receipt>> {
        match self.snapshot.get_cf(self.receipts, sequence.to_be_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Plants ever created
    pub total_plants: u64,
    /// Receipts committed
    pub total_receipts: u64,
    /// Value held in custody
    pub treasury: crate::types::Amount,
}
