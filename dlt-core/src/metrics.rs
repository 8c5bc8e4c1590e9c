//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `dlt_mints_total` - Successful mints
//! - `dlt_burns_total` - Successful burns
//! - `dlt_transfers_total` - Successfully applied transfer legs
//! - `dlt_permits_total` - Successfully applied permits

use prometheus::{IntCounter, Registry};
use std::sync::Arc;

/// Metrics collector
///
/// Each ledger instance owns its own registry; counters are recorded only
/// after an operation fully succeeds.
#[derive(Clone)]
pub struct Metrics {
    /// Successful mints
    pub mints_total: IntCounter,

    /// Successful burns
    pub burns_total: IntCounter,

    /// Successfully applied transfer legs (a batch counts one per leg)
    pub transfers_total: IntCounter,

    /// Successfully applied permits
    pub permits_total: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create a new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let mints_total = IntCounter::new("dlt_mints_total", "Successful mints")?;
        registry.register(Box::new(mints_total.clone()))?;

        let burns_total = IntCounter::new("dlt_burns_total", "Successful burns")?;
        registry.register(Box::new(burns_total.clone()))?;

        let transfers_total =
            IntCounter::new("dlt_transfers_total", "Successfully applied transfer legs")?;
        registry.register(Box::new(transfers_total.clone()))?;

        let permits_total = IntCounter::new("dlt_permits_total", "Successfully applied permits")?;
        registry.register(Box::new(permits_total.clone()))?;

        Ok(Self {
            mints_total,
            burns_total,
            transfers_total,
            permits_total,
            registry,
        })
    }

    /// Record a successful mint
    pub fn record_mint(&self) {
        self.mints_total.inc();
    }

    /// Record a successful burn
    pub fn record_burn(&self) {
        self.burns_total.inc();
    }

    /// Record successfully applied transfer legs
    pub fn record_transfers(&self, legs: u64) {
        self.transfers_total.inc_by(legs);
    }

    /// Record a successful permit
    pub fn record_permit(&self) {
        self.permits_total.inc();
    }

    /// Get the metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("fresh registry cannot hold duplicate collectors")
    }
}
