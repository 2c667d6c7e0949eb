//! Persisted production table.
//!
//! One row per production run, newest first, at most [`TABLE_CAPACITY`]
//! rows; a new run on a full table evicts the oldest row.  The table is
//! written to storage as a versioned postcard blob on every start, end
//! and clear.  Version 1 blobs (no quality or feed columns) still load.

use heapless::Vec;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::accounting::RunStats;
use crate::app::ports::{StorageError, StoragePort};
use crate::config::ProductionMode;
use crate::error::{Error, StopReason};

pub const TABLE_CAPACITY: usize = 100;
/// Maximum stored length of a stop reason.
pub const REASON_CAPACITY: usize = 24;

const TABLE_NAMESPACE: &str = "history";
const TABLE_KEY: &str = "table";
const TABLE_FORMAT_VERSION: u8 = 2;
/// Upper bound of the encoded table (100 rows of at most ~70 bytes).
pub const MAX_TABLE_BLOB: usize = 8 * 1024;

/// One production run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionRecord {
    pub mode: ProductionMode,
    /// Wall-clock start (Unix seconds).
    #[serde(rename = "start")]
    pub start_ts: i64,
    /// Wall-clock end (Unix seconds); 0 while the run is open.
    #[serde(rename = "end")]
    pub end_ts: i64,
    /// Final produced volume, frozen when the run stopped.
    pub liters: f32,
    /// Feed volume drawn by the run.
    #[serde(rename = "litersIn")]
    pub liters_in: f32,
    #[serde(rename = "tdsMin")]
    pub quality_min: f32,
    #[serde(rename = "tdsMax")]
    pub quality_max: f32,
    #[serde(rename = "tdsAvg")]
    pub quality_avg: f32,
    /// Why the run ended; empty while open.
    pub reason: heapless::String<REASON_CAPACITY>,
}

/// Row layout of format version 1.
#[derive(Deserialize)]
struct RecordV1 {
    mode: ProductionMode,
    start_ts: i64,
    end_ts: i64,
    liters: f32,
    reason: heapless::String<REASON_CAPACITY>,
}

impl From<RecordV1> for ProductionRecord {
    fn from(r: RecordV1) -> Self {
        Self {
            mode: r.mode,
            start_ts: r.start_ts,
            end_ts: r.end_ts,
            liters: r.liters,
            liters_in: 0.0,
            quality_min: 0.0,
            quality_max: 0.0,
            quality_avg: 0.0,
            reason: r.reason,
        }
    }
}

impl ProductionRecord {
    pub fn is_open(&self) -> bool {
        self.end_ts == 0 && self.reason.is_empty()
    }
}

/// Copy `text` into a reason slot, cutting at a char boundary if needed.
fn reason_text(text: &str) -> heapless::String<REASON_CAPACITY> {
    let mut out = heapless::String::new();
    for c in text.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// In-memory production table.
#[derive(Debug, Default)]
pub struct ProductionTable {
    /// Newest first.
    rows: Vec<ProductionRecord, TABLE_CAPACITY>,
    /// Row 0 belongs to the run in progress.
    open: bool,
}

impl ProductionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows, newest first.
    pub fn rows(&self) -> &[ProductionRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The row of the run in progress, if any.
    pub fn open_row(&self) -> Option<&ProductionRecord> {
        if self.open { self.rows.first() } else { None }
    }

    /// Insert a new open row at the top, evicting the oldest when full.
    pub fn start_run(&mut self, mode: ProductionMode, start_ts: i64) {
        if self.open {
            warn!("history: new run while previous row still open, closing it");
            self.end_run(StopReason::Stopped.as_str(), 0.0, RunStats::default(), start_ts);
        }
        if self.rows.is_full() {
            self.rows.pop();
        }
        let row = ProductionRecord {
            mode,
            start_ts,
            end_ts: 0,
            liters: 0.0,
            liters_in: 0.0,
            quality_min: 0.0,
            quality_max: 0.0,
            quality_avg: 0.0,
            reason: heapless::String::new(),
        };
        // Cannot fail: a slot was freed above.
        let _ = self.rows.insert(0, row);
        self.open = true;
    }

    /// Close the open row.  Returns `false` (and changes nothing) when no
    /// row is open, so finalizing twice is harmless.
    pub fn end_run(&mut self, reason: &str, liters: f32, stats: RunStats, end_ts: i64) -> bool {
        if !self.open {
            return false;
        }
        self.open = false;
        let Some(row) = self.rows.first_mut() else {
            return false;
        };
        row.end_ts = end_ts;
        row.liters = liters;
        row.liters_in = stats.liters_in;
        row.quality_min = stats.quality_min();
        row.quality_max = stats.quality_max();
        row.quality_avg = stats.quality_avg();
        row.reason = reason_text(if reason.is_empty() {
            StopReason::Stopped.as_str()
        } else {
            reason
        });
        true
    }

    /// Drop every row.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.open = false;
    }

    // ── Persistence ───────────────────────────────────────────

    /// Encode as a versioned postcard blob.
    pub fn to_bytes(&self) -> Result<std::vec::Vec<u8>, Error> {
        postcard::to_allocvec(&(TABLE_FORMAT_VERSION, &self.rows))
            .map_err(|_| Error::Codec("production table encode failed"))
    }

    /// Decode a blob written by [`to_bytes`](Self::to_bytes).  A row left
    /// open by a power loss stays unfinished; it is never resumed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let corrupted = |_| Error::Codec("production table corrupted");
        let (version, body): (u8, &[u8]) = postcard::take_from_bytes(bytes).map_err(corrupted)?;
        let rows = match version {
            TABLE_FORMAT_VERSION => postcard::from_bytes(body).map_err(corrupted)?,
            1 => {
                let old: Vec<RecordV1, TABLE_CAPACITY> =
                    postcard::from_bytes(body).map_err(corrupted)?;
                old.into_iter().map(ProductionRecord::from).collect()
            }
            _ => return Err(Error::Codec("unknown production table version")),
        };
        Ok(Self { rows, open: false })
    }

    /// Write the table through the storage port.
    pub fn save(&self, storage: &mut impl StoragePort) -> Result<(), Error> {
        let bytes = self.to_bytes()?;
        storage.write(TABLE_NAMESPACE, TABLE_KEY, &bytes)?;
        Ok(())
    }

    /// Load the table.  A missing blob is an empty table; a corrupt one is
    /// logged and replaced by an empty table.
    pub fn load(storage: &impl StoragePort) -> Self {
        let mut buf = vec![0u8; MAX_TABLE_BLOB];
        match storage.read(TABLE_NAMESPACE, TABLE_KEY, &mut buf) {
            Ok(len) => Self::from_bytes(&buf[..len]).unwrap_or_else(|e| {
                warn!("history: {}, starting with an empty table", e);
                Self::new()
            }),
            Err(StorageError::NotFound) => Self::new(),
            Err(e) => {
                warn!("history: table load failed ({}), starting empty", e);
                Self::new()
            }
        }
    }

    /// JSON rendering for the front-end, newest first.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(&self.rows.as_slice())
            .map_err(|_| Error::Codec("production table json failed"))
    }
}
