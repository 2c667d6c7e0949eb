//! History engine: time series and the production table.
//!
//! ```text
//!  control cycle ──sample()──▶ SeriesSet (fine ─▶ medium ─▶ coarse)
//!  run events ──start/end──▶ ProductionTable ──save──▶ StoragePort
//! ```
//!
//! The engine owns its storage backend.  Mutations report what changed so
//! the service can notify observers; the engine itself never emits.

pub mod series;
pub mod table;

use log::{info, warn};
use serde::Serialize;

use crate::accounting::RunStats;
use crate::app::ports::StoragePort;
use crate::config::ProductionMode;
use crate::error::Error;
use crate::fsm::context::RunEvent;

pub use series::{BASE_PERIOD_MS, Resolution, Sample, SeriesExport, SeriesSet};
pub use table::{ProductionRecord, ProductionTable, TABLE_CAPACITY};

/// Volumes of every run finalized since boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionTotals {
    pub liters_out: f32,
    pub liters_in: f32,
}

/// Time series plus persisted production table.
pub struct HistoryEngine<S: StoragePort> {
    storage: S,
    table: ProductionTable,
    totals: ProductionTotals,
    series: Box<SeriesSet>,
    next_sample_ms: Option<u64>,
}

impl<S: StoragePort> HistoryEngine<S> {
    /// Build the engine and load the persisted table.
    pub fn new(storage: S) -> Self {
        let table = ProductionTable::load(&storage);
        info!("history: {} production rows loaded", table.len());
        Self {
            storage,
            table,
            totals: ProductionTotals::default(),
            series: Box::default(),
            next_sample_ms: None,
        }
    }

    // ── Production table ──────────────────────────────────────

    /// Apply one run lifecycle event.  Returns `true` when the table
    /// changed (and was persisted).
    pub fn apply(&mut self, event: RunEvent) -> bool {
        match event {
            RunEvent::Started { mode, at_secs } => {
                self.start_run(mode, at_secs);
                true
            }
            RunEvent::Ended {
                reason,
                liters,
                stats,
                at_secs,
            } => self.end_run(reason.as_str(), liters, stats, at_secs),
        }
    }

    /// Open a new row and persist.
    pub fn start_run(&mut self, mode: ProductionMode, at_secs: i64) {
        self.table.start_run(mode, at_secs);
        self.persist();
    }

    /// Close the open row, add it to the totals and persist.  No-op when
    /// no row is open.
    pub fn end_run(&mut self, reason: &str, liters: f32, stats: RunStats, at_secs: i64) -> bool {
        if !self.table.end_run(reason, liters, stats, at_secs) {
            return false;
        }
        self.totals.liters_out += liters;
        self.totals.liters_in += stats.liters_in;
        info!(
            "history: run closed, {:.2} L from {:.2} L feed, avg {:.1} ppm, {}",
            liters,
            stats.liters_in,
            stats.quality_avg(),
            reason
        );
        self.persist();
        true
    }

    /// Drop every row and persist the empty table.
    pub fn clear(&mut self) {
        self.table.clear();
        self.persist();
        info!("history: production table cleared");
    }

    pub fn table(&self) -> &[ProductionRecord] {
        self.table.rows()
    }

    pub fn open_row(&self) -> Option<&ProductionRecord> {
        self.table.open_row()
    }

    /// Totals since boot; not persisted.
    pub fn totals(&self) -> ProductionTotals {
        self.totals
    }

    pub fn table_json(&self) -> Result<String, Error> {
        self.table.to_json()
    }

    /// Storage failures are logged; the in-memory table stays authoritative.
    fn persist(&mut self) {
        if let Err(e) = self.table.save(&mut self.storage) {
            warn!("history: table save failed: {}", e);
        }
    }

    // ── Time series ───────────────────────────────────────────

    /// Take a sample if the base period elapsed.  `sample` is only
    /// evaluated when due.  Returns the coarsest tier that received a point.
    pub fn sample_if_due(&mut self, now_ms: u64, sample: impl FnOnce() -> Sample) -> Option<Resolution> {
        let due = self.next_sample_ms.unwrap_or(now_ms);
        if now_ms < due {
            return None;
        }
        // Stay on the base grid; after a stall, restart from now instead
        // of replaying missed periods.
        let next = due + BASE_PERIOD_MS;
        self.next_sample_ms = Some(if next <= now_ms { now_ms + BASE_PERIOD_MS } else { next });
        Some(self.series.push(sample()))
    }

    /// All slots of a tier, oldest first, `None` for no data.
    pub fn series(&self, res: Resolution) -> Vec<Option<Sample>> {
        self.series.slots(res)
    }

    /// The most recent `n` points of a tier, oldest first.
    pub fn recent(&self, res: Resolution, n: usize) -> Vec<Sample> {
        self.series.recent(res, n)
    }

    pub fn series_json(&self, res: Resolution) -> Result<String, Error> {
        serde_json::to_string(&SeriesExport::from_slots(&self.series(res)))
            .map_err(|_| Error::Codec("series json failed"))
    }

    /// Access the storage backend (diagnostics, tests).
    pub fn storage(&self) -> &S {
        &self.storage
    }
}
