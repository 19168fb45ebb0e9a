//! Core types for the garden ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (integer wei for money, `Decimal` only for display)
//! - Cheap snapshots (plain `Clone` values, no shared interior state)

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of decimal places between wei and ether
const ETHER_SCALE: u32 = 18;

/// Sequential plant identifier (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlantId(u64);

impl PlantId {
    /// Create plant ID
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw value
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Big-endian storage key, so byte order matches creation order
    pub fn to_key(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Decode a storage key
    pub fn from_key(key: &[u8]) -> Option<Self> {
        let bytes: [u8; 8] = key.try_into().ok()?;
        Some(Self(u64::from_be_bytes(bytes)))
    }
}

impl fmt::Display for PlantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Account identifier (normalized to lowercase)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().to_ascii_lowercase())
    }

    /// Parse a `0x`-prefixed 20-byte hex address
    pub fn parse_address(s: &str) -> crate::Result<Self> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| crate::Error::Config(format!("Address missing 0x prefix: {}", s)))?;

        let bytes = hex::decode(digits)
            .map_err(|e| crate::Error::Config(format!("Invalid address {}: {}", s, e)))?;

        if bytes.len() != 20 {
            return Err(crate::Error::Config(format!(
                "Invalid address {}: expected 20 bytes, got {}",
                s,
                bytes.len()
            )));
        }

        Ok(Self(format!("0x{}", hex::encode(bytes))))
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Amount of native currency, in wei
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Amount(u128);

impl Amount {
    /// Zero wei
    pub const ZERO: Amount = Amount(0);

    /// Create from wei
    pub const fn from_wei(wei: u128) -> Self {
        Self(wei)
    }

    /// Value in wei
    pub const fn wei(&self) -> u128 {
        self.0
    }

    /// Is zero
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Convert an ether amount (e.g. `0.001`) to wei.
    ///
    /// Returns `None` for negative values, sub-wei precision, or overflow.
    pub fn from_ether(ether: Decimal) -> Option<Self> {
        if ether.is_sign_negative() {
            return None;
        }
        let wei = ether.checked_mul(Decimal::from(10u64.pow(ETHER_SCALE)))?;
        if !wei.fract().is_zero() {
            return None;
        }
        wei.trunc().to_u128().map(Self)
    }

    /// Render in ether (18 decimal places, normalized)
    pub fn to_ether(&self) -> Option<Decimal> {
        let wei = i128::try_from(self.0).ok()?;
        Decimal::try_from_i128_with_scale(wei, ETHER_SCALE)
            .ok()
            .map(|d| d.normalize())
    }

    /// Checked addition
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Checked subtraction
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} wei", self.0)
    }
}

/// Growth stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Stage {
    /// Freshly planted
    Seed = 0,
    /// First shoots
    Sprout = 1,
    /// Growing
    Growing = 2,
    /// Fully grown (final growth stage)
    Blooming = 3,
}

impl Stage {
    /// Wire value (0..=3)
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Parse wire value
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Stage::Seed),
            1 => Some(Stage::Sprout),
            2 => Some(Stage::Growing),
            3 => Some(Stage::Blooming),
            _ => None,
        }
    }

    /// The following stage, if any
    pub fn next(&self) -> Option<Self> {
        Self::from_u8(self.as_u8() + 1)
    }

    /// Blooming is the last growth stage
    pub fn is_final(&self) -> bool {
        matches!(self, Stage::Blooming)
    }

    /// Upper-case name as rendered by clients
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Seed => "SEED",
            Stage::Sprout => "SPROUT",
            Stage::Growing => "GROWING",
            Stage::Blooming => "BLOOMING",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Persisted plant state.
///
/// Water decays lazily, so the record stores the level at the last watering
/// together with that block time. Use [`crate::rules::GrowthRules::snapshot`]
/// to evaluate it at a given time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantRecord {
    /// Plant ID
    pub id: PlantId,

    /// Creator (immutable)
    pub owner: AccountId,

    /// Current growth stage
    pub stage: Stage,

    /// Water level at `last_watered`
    pub water_level: u64,

    /// Block time of last watering (creation counts)
    pub last_watered: u64,

    /// Block time of creation
    pub planted_at: u64,

    /// Block time of the last stage change (creation counts)
    pub stage_changed_at: u64,

    /// Cumulative water absorbed
    pub growth: u64,

    /// Block time of harvest, if harvested
    pub harvested_at: Option<u64>,
}

/// Point-in-time view of a plant, as returned by `get_plant`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plant {
    /// Plant ID
    pub id: PlantId,

    /// Creator
    pub owner: AccountId,

    /// Growth stage (frozen at death)
    pub stage: Stage,

    /// Water level at the evaluation time
    pub water_level: u64,

    /// Liveness (false is terminal)
    pub is_alive: bool,

    /// Block time of creation
    pub planted_at: u64,

    /// Block time of last watering
    pub last_watered: u64,

    /// Cumulative water absorbed
    pub growth: u64,

    /// Whether the plant has been harvested
    pub harvested: bool,

    /// Block time at which the water ran out
    pub died_at: Option<u64>,
}

impl Plant {
    /// Creation time as a UTC timestamp
    pub fn planted_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::try_from(self.planted_at).ok()?, 0)
    }
}

/// Caller-supplied context of a mutating operation
///
/// Mirrors what the substrate provides to every call: the sender, the value
/// attached, and the block timestamp (seconds) the call executes in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    /// Sender
    pub caller: AccountId,

    /// Attached value
    pub value: Amount,

    /// Block timestamp (seconds)
    pub block_time: u64,
}

impl CallContext {
    /// Context without attached value
    pub fn new(caller: AccountId, block_time: u64) -> Self {
        Self {
            caller,
            value: Amount::ZERO,
            block_time,
        }
    }

    /// Attach value
    pub fn with_value(mut self, value: Amount) -> Self {
        self.value = value;
        self
    }
}

/// Mutating operation, as ordered by the actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Pay the plant price and create a plant
    PlantSeed,
    /// Add water to a plant
    WaterPlant(PlantId),
    /// Apply the stage rule without watering
    UpdatePlantStage(PlantId),
    /// Collect the reward for a blooming plant
    HarvestPlant(PlantId),
    /// Transfer value into custody
    Deposit,
    /// Drain custody to the operator
    Withdraw,
}

impl Operation {
    /// Short name for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            Operation::PlantSeed => "plant_seed",
            Operation::WaterPlant(_) => "water_plant",
            Operation::UpdatePlantStage(_) => "update_plant_stage",
            Operation::HarvestPlant(_) => "harvest_plant",
            Operation::Deposit => "deposit",
            Operation::Withdraw => "withdraw",
        }
    }
}

/// Event emitted by a committed operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GardenEvent {
    /// Plant created
    PlantSeeded {
        /// New plant
        plant_id: PlantId,
        /// Creator
        owner: AccountId,
    },
    /// Plant watered
    PlantWatered {
        /// Plant
        plant_id: PlantId,
        /// Level after watering
        water_level: u64,
    },
    /// Stage advanced by one step
    StageAdvanced {
        /// Plant
        plant_id: PlantId,
        /// New stage
        stage: Stage,
    },
    /// Reward paid for a blooming plant
    PlantHarvested {
        /// Plant
        plant_id: PlantId,
        /// Recipient
        owner: AccountId,
        /// Reward paid out of custody
        reward: Amount,
    },
    /// Value moved into custody
    Deposited {
        /// Sender
        from: AccountId,
        /// Amount
        amount: Amount,
    },
    /// Custody drained
    TreasuryWithdrawn {
        /// Recipient
        to: AccountId,
        /// Amount
        amount: Amount,
    },
}

/// Acknowledgment of a committed operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Position in the global order (1-based)
    pub sequence: u64,

    /// SHA-256 of the ordered operation
    pub tx_hash: [u8; 32],

    /// Block time the operation executed in
    pub block_time: u64,

    /// Sender
    pub caller: AccountId,

    /// Events emitted
    pub events: Vec<GardenEvent>,
}

impl Receipt {
    /// `0x`-prefixed hex transaction hash
    pub fn tx_hash_hex(&self) -> String {
        format!("0x{}", hex::encode(self.tx_hash))
    }

    /// Block time as a UTC timestamp
    pub fn block_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::try_from(self.block_time).ok()?, 0)
    }

    /// ID of the plant created by this operation, if any
    pub fn seeded_plant(&self) -> Option<PlantId> {
        self.events.iter().find_map(|event| match event {
            GardenEvent::PlantSeeded { plant_id, .. } => Some(*plant_id),
            _ => None,
        })
    }
}

/// Process-wide ledger state, committed atomically with every operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerMeta {
    /// Last assigned plant ID (0 = none)
    pub plant_counter: u64,

    /// Value held in custody
    pub treasury: Amount,

    /// Block time of the last committed operation
    pub clock: u64,

    /// Number of committed receipts
    pub sequence: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_plant_id_key_order() {
        let a = PlantId::new(2);
        let b = PlantId::new(256);
        assert!(a.to_key() < b.to_key());
        assert_eq!(PlantId::from_key(&b.to_key()), Some(b));
        assert_eq!(PlantId::from_key(&[1, 2, 3]), None);
    }

    #[test]
    fn test_account_id_normalized() {
        assert_eq!(AccountId::new("0xAbC").as_str(), "0xabc");
    }

    #[test]
    fn test_parse_address() {
        let addr = AccountId::parse_address("0x5FbDB2315678afecb367f032d93F642f64180aa3").unwrap();
        assert_eq!(addr.as_str(), "0x5fbdb2315678afecb367f032d93f642f64180aa3");

        assert!(AccountId::parse_address("5FbDB2315678afecb367f032d93F642f64180aa3").is_err());
        assert!(AccountId::parse_address("0x5FbD").is_err());
        assert!(AccountId::parse_address("0xZZbDB2315678afecb367f032d93F642f64180aa3").is_err());
    }

    #[test]
    fn test_amount_ether_conversion() {
        let price = Amount::from_ether(Decimal::from_str("0.001").unwrap()).unwrap();
        assert_eq!(price.wei(), 1_000_000_000_000_000);
        assert_eq!(price.to_ether(), Some(Decimal::from_str("0.001").unwrap()));

        assert!(Amount::from_ether(Decimal::from_str("-1").unwrap()).is_none());
        assert!(Amount::from_ether(Decimal::from_str("0.0000000000000000001").unwrap()).is_none());
    }

    #[test]
    fn test_stage_progression() {
        assert_eq!(Stage::Seed.next(), Some(Stage::Sprout));
        assert_eq!(Stage::Growing.next(), Some(Stage::Blooming));
        assert_eq!(Stage::Blooming.next(), None);
        assert!(Stage::Blooming.is_final());
        assert_eq!(Stage::from_u8(4), None);
        assert_eq!(Stage::Sprout.to_string(), "SPROUT");
    }

    #[test]
    fn test_receipt_helpers() {
        let receipt = Receipt {
            sequence: 1,
            tx_hash: [0xab; 32],
            block_time: 1_700_000_000,
            caller: AccountId::new("0xa"),
            events: vec![GardenEvent::PlantSeeded {
                plant_id: PlantId::new(7),
                owner: AccountId::new("0xa"),
            }],
        };

        assert_eq!(receipt.seeded_plant(), Some(PlantId::new(7)));
        assert!(receipt.tx_hash_hex().starts_with("0xabab"));
        assert_eq!(receipt.tx_hash_hex().len(), 66);
        assert!(receipt.block_datetime().is_some());
    }
}
