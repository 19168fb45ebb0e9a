//! Growth, decay and payment rules
//!
//! Every transition of a single plant is a pure function of its
//! [`PlantRecord`], the [`CallContext`] and the deployed [`GrowthRules`].
//! Nothing here touches storage; the actor commits whatever these functions
//! return, or nothing at all when they return an error.
//!
//! # Water
//!
//! Water decays in whole intervals from the last watering:
//!
//! ```text
//! level(t) = water_level - floor((t - last_watered) / depletion_interval) * depletion_rate
//! ```
//!
//! saturating at zero. A plant is dead at `t` iff `level(t) == 0`. Decay is
//! evaluated on demand; nothing is scheduled.
//!
//! # Growth
//!
//! Watering adds at most `water_amount` (capped at `max_water_level`); the
//! amount actually absorbed accumulates in `growth`. A plant moves one stage
//! forward when `growth >= growth_per_stage * (stage + 1)` and at least
//! `stage_interval_secs` passed since its last stage change. One step per
//! operation, so stages are never skipped.

use crate::types::{Amount, AccountId, CallContext, GardenEvent, Plant, PlantId, PlantRecord, Stage};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How `plant_seed` treats payment above the plant price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPolicy {
    /// Payment must equal the price
    Exact,
    /// Any payment at or above the price; the excess stays in custody
    AcceptOverpayment,
}

impl FromStr for PaymentPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "exact" => Ok(PaymentPolicy::Exact),
            "accept_overpayment" => Ok(PaymentPolicy::AcceptOverpayment),
            other => Err(Error::Config(format!("Unknown payment policy: {}", other))),
        }
    }
}

/// Who may water a plant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WateringPolicy {
    /// Only the plant's owner
    OwnerOnly,
    /// Any account
    Permissionless,
}

impl FromStr for WateringPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "owner_only" => Ok(WateringPolicy::OwnerOnly),
            "permissionless" => Ok(WateringPolicy::Permissionless),
            other => Err(Error::Config(format!("Unknown watering policy: {}", other))),
        }
    }
}

/// Rule set fixed at deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthRules {
    /// Price of one seed
    pub plant_price: Amount,

    /// Reward paid for harvesting a blooming plant
    pub harvest_reward: Amount,

    /// Water level of a new plant
    pub initial_water_level: u64,

    /// Cap on water level
    pub max_water_level: u64,

    /// Water added per watering (before the cap)
    pub water_amount: u64,

    /// Absorbed water needed per stage
    pub growth_per_stage: u64,

    /// Water lost per depletion interval
    pub depletion_rate: u64,

    /// Length of a depletion interval (seconds)
    pub depletion_interval_secs: u64,

    /// Minimum time between stage changes (seconds)
    pub stage_interval_secs: u64,

    /// Overpayment handling
    pub payment_policy: PaymentPolicy,

    /// Watering permission
    pub watering_policy: WateringPolicy,

    /// Account allowed to withdraw custody
    pub operator: Option<AccountId>,
}

impl Default for GrowthRules {
    fn default() -> Self {
        Self {
            plant_price: Amount::from_wei(1_000_000_000_000_000),    // 0.001 ETH
            harvest_reward: Amount::from_wei(3_000_000_000_000_000), // 0.003 ETH
            initial_water_level: 100,
            max_water_level: 100,
            water_amount: 20,
            growth_per_stage: 40,
            depletion_rate: 2,
            depletion_interval_secs: 30,
            stage_interval_secs: 60,
            payment_policy: PaymentPolicy::Exact,
            watering_policy: WateringPolicy::OwnerOnly,
            operator: None,
        }
    }
}

impl GrowthRules {
    /// Reject rule sets that would make the state machine degenerate
    pub fn validate(&self) -> Result<()> {
        if self.depletion_interval_secs == 0 {
            return Err(Error::Config(
                "depletion_interval_secs must be positive".to_string(),
            ));
        }
        if self.growth_per_stage == 0 {
            return Err(Error::Config("growth_per_stage must be positive".to_string()));
        }
        if self.initial_water_level == 0 || self.initial_water_level > self.max_water_level {
            return Err(Error::Config(format!(
                "initial_water_level must be in 1..={}, got {}",
                self.max_water_level, self.initial_water_level
            )));
        }
        if self.water_amount == 0 {
            return Err(Error::Config("water_amount must be positive".to_string()));
        }
        Ok(())
    }

    /// Check the value attached to `plant_seed`
    pub fn check_seed_payment(&self, value: Amount) -> Result<()> {
        if value < self.plant_price {
            return Err(Error::InsufficientPayment {
                required: self.plant_price,
                provided: value,
            });
        }
        if value > self.plant_price && self.payment_policy == PaymentPolicy::Exact {
            return Err(Error::Overpayment {
                required: self.plant_price,
                provided: value,
            });
        }
        Ok(())
    }

    /// Fresh record for a newly created plant
    pub fn new_plant(&self, id: PlantId, owner: AccountId, now: u64) -> PlantRecord {
        PlantRecord {
            id,
            owner,
            stage: Stage::Seed,
            water_level: self.initial_water_level,
            last_watered: now,
            planted_at: now,
            stage_changed_at: now,
            growth: 0,
            harvested_at: None,
        }
    }

    /// Water level at block time `t`.
    ///
    /// Harvested plants stop decaying at harvest time.
    pub fn water_level_at(&self, record: &PlantRecord, t: u64) -> u64 {
        let t = record.harvested_at.map_or(t, |h| t.min(h));
        let intervals = t.saturating_sub(record.last_watered) / self.depletion_interval_secs;
        let lost = intervals.saturating_mul(self.depletion_rate);
        record.water_level.saturating_sub(lost)
    }

    /// Whether the plant still has water at `t`
    pub fn is_alive_at(&self, record: &PlantRecord, t: u64) -> bool {
        self.water_level_at(record, t) > 0
    }

    /// Block time at which the water runs out, if it ever does
    pub fn died_at(&self, record: &PlantRecord) -> Option<u64> {
        if self.depletion_rate == 0 {
            return None;
        }
        let intervals = record.water_level.div_ceil(self.depletion_rate);
        let death = record
            .last_watered
            .saturating_add(intervals.saturating_mul(self.depletion_interval_secs));

        match record.harvested_at {
            Some(harvested) if harvested < death => None,
            _ => Some(death),
        }
    }

    /// Evaluate a record at block time `t`
    pub fn snapshot(&self, record: &PlantRecord, t: u64) -> Plant {
        let water_level = self.water_level_at(record, t);
        let is_alive = water_level > 0;

        Plant {
            id: record.id,
            owner: record.owner.clone(),
            stage: record.stage,
            water_level,
            is_alive,
            planted_at: record.planted_at,
            last_watered: record.last_watered,
            growth: record.growth,
            harvested: record.harvested_at.is_some(),
            died_at: if is_alive { None } else { self.died_at(record) },
        }
    }

    /// Water a plant
    pub fn water(
        &self,
        record: &PlantRecord,
        ctx: &CallContext,
    ) -> Result<(PlantRecord, Vec<GardenEvent>)> {
        ensure_no_payment(ctx)?;
        let current = self.ensure_growing(record, ctx.block_time)?;

        if self.watering_policy == WateringPolicy::OwnerOnly && ctx.caller != record.owner {
            return Err(Error::Unauthorized {
                caller: ctx.caller.clone(),
                action: "water a plant it does not own",
            });
        }

        let level = current
            .saturating_add(self.water_amount)
            .min(self.max_water_level);

        let mut next = record.clone();
        next.growth = next.growth.saturating_add(level - current);
        next.water_level = level;
        next.last_watered = ctx.block_time;

        let mut events = vec![GardenEvent::PlantWatered {
            plant_id: record.id,
            water_level: level,
        }];

        if let Some(stage) = self.advance_stage(&mut next, ctx.block_time) {
            events.push(GardenEvent::StageAdvanced {
                plant_id: record.id,
                stage,
            });
        }

        Ok((next, events))
    }

    /// Apply the stage rule without watering
    pub fn update_stage(
        &self,
        record: &PlantRecord,
        ctx: &CallContext,
    ) -> Result<(PlantRecord, Vec<GardenEvent>)> {
        ensure_no_payment(ctx)?;
        self.ensure_growing(record, ctx.block_time)?;

        let mut next = record.clone();
        let events = match self.advance_stage(&mut next, ctx.block_time) {
            Some(stage) => vec![GardenEvent::StageAdvanced {
                plant_id: record.id,
                stage,
            }],
            None => vec![],
        };

        Ok((next, events))
    }

    /// Harvest a blooming plant; returns the record and the treasury after
    /// paying the reward
    pub fn harvest(
        &self,
        record: &PlantRecord,
        ctx: &CallContext,
        treasury: Amount,
    ) -> Result<(PlantRecord, Amount, Vec<GardenEvent>)> {
        ensure_no_payment(ctx)?;
        self.ensure_growing(record, ctx.block_time)?;

        if ctx.caller != record.owner {
            return Err(Error::Unauthorized {
                caller: ctx.caller.clone(),
                action: "harvest a plant it does not own",
            });
        }

        if !record.stage.is_final() {
            return Err(Error::NotBlooming(record.id));
        }

        let remaining =
            treasury
                .checked_sub(self.harvest_reward)
                .ok_or(Error::InsufficientTreasury {
                    required: self.harvest_reward,
                    available: treasury,
                })?;

        let mut next = record.clone();
        next.harvested_at = Some(ctx.block_time);

        let events = vec![GardenEvent::PlantHarvested {
            plant_id: record.id,
            owner: record.owner.clone(),
            reward: self.harvest_reward,
        }];

        Ok((next, remaining, events))
    }

    /// Drain custody to the operator; returns the amount withdrawn
    pub fn withdraw(&self, ctx: &CallContext, treasury: Amount) -> Result<Amount> {
        ensure_no_payment(ctx)?;

        if self.operator.as_ref() != Some(&ctx.caller) {
            return Err(Error::Unauthorized {
                caller: ctx.caller.clone(),
                action: "withdraw the treasury",
            });
        }

        if treasury.is_zero() {
            return Err(Error::InsufficientTreasury {
                required: Amount::from_wei(1),
                available: treasury,
            });
        }

        Ok(treasury)
    }

    /// Advance one stage if the plant qualifies at `now`
    fn advance_stage(&self, record: &mut PlantRecord, now: u64) -> Option<Stage> {
        let next = record.stage.next()?;

        let threshold = self
            .growth_per_stage
            .saturating_mul(u64::from(next.as_u8()));
        let waited = now.saturating_sub(record.stage_changed_at);

        if record.growth >= threshold && waited >= self.stage_interval_secs {
            record.stage = next;
            record.stage_changed_at = now;
            Some(next)
        } else {
            None
        }
    }

    /// Reject harvested and dead plants; returns the current water level
    fn ensure_growing(&self, record: &PlantRecord, now: u64) -> Result<u64> {
        if record.harvested_at.is_some() {
            return Err(Error::AlreadyHarvested(record.id));
        }
        match self.water_level_at(record, now) {
            0 => Err(Error::AlreadyDead(record.id)),
            level => Ok(level),
        }
    }
}

fn ensure_no_payment(ctx: &CallContext) -> Result<()> {
    if ctx.value.is_zero() {
        Ok(())
    } else {
        Err(Error::UnexpectedPayment(ctx.value))
    }
}
