//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `garden_plants_seeded_total` - Plants created
//! - `garden_waterings_total` - Successful waterings
//! - `garden_stage_advances_total` - Stage transitions
//! - `garden_harvests_total` - Harvests paid out
//! - `garden_rejections_total{operation}` - Operations refused by a ledger rule
//! - `garden_treasury_wei` - Value held in custody
//! - `garden_commit_duration_seconds` - Histogram of commit latencies

use crate::types::{Amount, GardenEvent};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Plants created
    pub plants_seeded: IntCounter,

    /// Successful waterings
    pub waterings: IntCounter,

    /// Stage transitions
    pub stage_advances: IntCounter,

    /// Harvests
    pub harvests: IntCounter,

    /// Rejected operations, by operation name
    pub rejections: IntCounterVec,

    /// Treasury balance (saturates at i64::MAX wei)
    pub treasury: IntGauge,

    /// Commit duration histogram
    pub commit_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let plants_seeded =
            IntCounter::new("garden_plants_seeded_total", "Total number of plants created")?;
        registry.register(Box::new(plants_seeded.clone()))?;

        let waterings = IntCounter::new("garden_waterings_total", "Total number of waterings")?;
        registry.register(Box::new(waterings.clone()))?;

        let stage_advances = IntCounter::new(
            "garden_stage_advances_total",
            "Total number of stage transitions",
        )?;
        registry.register(Box::new(stage_advances.clone()))?;

        let harvests = IntCounter::new("garden_harvests_total", "Total number of harvests")?;
        registry.register(Box::new(harvests.clone()))?;

        let rejections = IntCounterVec::new(
            Opts::new(
                "garden_rejections_total",
                "Operations refused by a ledger rule",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(rejections.clone()))?;

        let treasury = IntGauge::new("garden_treasury_wei", "Value held in custody (wei)")?;
        registry.register(Box::new(treasury.clone()))?;

        let commit_duration = Histogram::with_opts(
            HistogramOpts::new(
                "garden_commit_duration_seconds",
                "Histogram of commit latencies",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250]),
        )?;
        registry.register(Box::new(commit_duration.clone()))?;

        Ok(Self {
            plants_seeded,
            waterings,
            stage_advances,
            harvests,
            rejections,
            treasury,
            commit_duration,
            registry,
        })
    }

    /// Record the events of a committed operation
    pub fn record_events(&self, events: &[GardenEvent]) {
        for event in events {
            match event {
                GardenEvent::PlantSeeded { .. } => self.plants_seeded.inc(),
                GardenEvent::PlantWatered { .. } => self.waterings.inc(),
                GardenEvent::StageAdvanced { .. } => self.stage_advances.inc(),
                GardenEvent::PlantHarvested { .. } => self.harvests.inc(),
                GardenEvent::Deposited { .. } | GardenEvent::TreasuryWithdrawn { .. } => {}
            }
        }
    }

    /// Record a rejected operation
    pub fn record_rejection(&self, operation: &str) {
        self.rejections.with_label_values(&[operation]).inc();
    }

    /// Update treasury gauge
    pub fn set_treasury(&self, treasury: Amount) {
        self.treasury
            .set(i64::try_from(treasury.wei()).unwrap_or(i64::MAX));
    }

    /// Record commit duration
    pub fn record_commit_duration(&self, duration_seconds: f64) {
        self.commit_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render in the Prometheus text exposition format
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("plants_seeded", &self.plants_seeded.get())
            .field("treasury", &self.treasury.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountId, PlantId, Stage};

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.plants_seeded.get(), 0);
        assert_eq!(metrics.harvests.get(), 0);
    }

    #[test]
    fn test_independent_registries() {
        // Each collector owns its registry, so two ledgers in one process
        // do not collide
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.plants_seeded.inc();
        assert_eq!(b.plants_seeded.get(), 0);
    }

    #[test]
    fn test_record_events() {
        let metrics = Metrics::new().unwrap();
        let plant_id = PlantId::new(1);

        metrics.record_events(&[
            GardenEvent::PlantSeeded {
                plant_id,
                owner: AccountId::new("0xa"),
            },
            GardenEvent::PlantWatered {
                plant_id,
                water_level: 100,
            },
            GardenEvent::StageAdvanced {
                plant_id,
                stage: Stage::Sprout,
            },
        ]);

        assert_eq!(metrics.plants_seeded.get(), 1);
        assert_eq!(metrics.waterings.get(), 1);
        assert_eq!(metrics.stage_advances.get(), 1);
    }

    #[test]
    fn test_record_rejection() {
        let metrics = Metrics::new().unwrap();
        metrics.record_rejection("plant_seed");
        metrics.record_rejection("plant_seed");
        assert_eq!(
            metrics
                .rejections
                .with_label_values(&["plant_seed"])
                .get(),
            2
        );
    }

    #[test]
    fn test_treasury_gauge_saturates() {
        let metrics = Metrics::new().unwrap();
        metrics.set_treasury(Amount::from_wei(1_000));
        assert_eq!(metrics.treasury.get(), 1_000);

        metrics.set_treasury(Amount::from_wei(u128::MAX));
        assert_eq!(metrics.treasury.get(), i64::MAX);
    }

    #[test]
    fn test_render() {
        let metrics = Metrics::new().unwrap();
        metrics.plants_seeded.inc();
        let text = metrics.render().unwrap();
        assert!(text.contains("garden_plants_seeded_total 1"));
    }
}
