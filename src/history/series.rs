//! Multi-resolution time series of process samples.
//!
//! Three fixed-capacity rings hold the same signals at different
//! resolutions:
//!
//! | Tier   | Period | Capacity | Span  |
//! |--------|--------|----------|-------|
//! | Fine   | 2 s    | 1800     | 1 h   |
//! | Medium | 30 s   | 2880     | 24 h  |
//! | Coarse | 450 s  | 1344     | 7 d   |
//!
//! Medium points are block averages of [`BLOCK_FACTOR`] fine points,
//! coarse points block averages of [`BLOCK_FACTOR`] medium points.
//! Quality and flow are averaged; the volume is cumulative, so a block
//! keeps its latest value.

use heapless::HistoryBuffer;
use serde::Serialize;

/// Base sampling period of the fine tier.
pub const BASE_PERIOD_MS: u64 = 2_000;
/// Number of points of one tier averaged into one point of the next.
pub const BLOCK_FACTOR: usize = 15;

pub const FINE_CAPACITY: usize = 1800;
pub const MEDIUM_CAPACITY: usize = 2880;
pub const COARSE_CAPACITY: usize = 1344;

/// Series resolution tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Fine,
    Medium,
    Coarse,
}

impl Resolution {
    pub const ALL: [Self; 3] = [Self::Fine, Self::Medium, Self::Coarse];

    /// Time between two points of this tier.
    pub const fn period_ms(self) -> u64 {
        match self {
            Self::Fine => BASE_PERIOD_MS,
            Self::Medium => BASE_PERIOD_MS * BLOCK_FACTOR as u64,
            Self::Coarse => BASE_PERIOD_MS * (BLOCK_FACTOR * BLOCK_FACTOR) as u64,
        }
    }

    pub const fn capacity(self) -> usize {
        match self {
            Self::Fine => FINE_CAPACITY,
            Self::Medium => MEDIUM_CAPACITY,
            Self::Coarse => COARSE_CAPACITY,
        }
    }
}

/// One point of every series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Sample {
    /// Water quality (TDS, ppm).
    pub quality_ppm: f32,
    /// Product flow rate (L/min).
    pub flow_lpm: f32,
    /// Volume produced by the current or last run (L).
    pub liters: f32,
}

// ── Block averaging ───────────────────────────────────────────

#[derive(Debug, Default)]
struct BlockAccumulator {
    quality_sum: f32,
    flow_sum: f32,
    last_liters: f32,
    count: usize,
}

impl BlockAccumulator {
    /// Add a point; returns the block average once the block is complete.
    fn push(&mut self, s: Sample) -> Option<Sample> {
        self.quality_sum += s.quality_ppm;
        self.flow_sum += s.flow_lpm;
        self.last_liters = s.liters;
        self.count += 1;
        if self.count < BLOCK_FACTOR {
            return None;
        }
        let n = self.count as f32;
        let out = Sample {
            quality_ppm: self.quality_sum / n,
            flow_lpm: self.flow_sum / n,
            liters: self.last_liters,
        };
        *self = Self::default();
        Some(out)
    }
}

// ── SeriesSet ─────────────────────────────────────────────────

/// All three tiers plus their block accumulators.
pub struct SeriesSet {
    fine: HistoryBuffer<Sample, FINE_CAPACITY>,
    medium: HistoryBuffer<Sample, MEDIUM_CAPACITY>,
    coarse: HistoryBuffer<Sample, COARSE_CAPACITY>,
    to_medium: BlockAccumulator,
    to_coarse: BlockAccumulator,
}

impl Default for SeriesSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SeriesSet {
    pub fn new() -> Self {
        Self {
            fine: HistoryBuffer::new(),
            medium: HistoryBuffer::new(),
            coarse: HistoryBuffer::new(),
            to_medium: BlockAccumulator::default(),
            to_coarse: BlockAccumulator::default(),
        }
    }

    /// Append one base-period sample.  Returns the coarsest tier that
    /// received a new point.
    pub fn push(&mut self, sample: Sample) -> Resolution {
        self.fine.write(sample);
        let Some(medium) = self.to_medium.push(sample) else {
            return Resolution::Fine;
        };
        self.medium.write(medium);
        let Some(coarse) = self.to_coarse.push(medium) else {
            return Resolution::Medium;
        };
        self.coarse.write(coarse);
        Resolution::Coarse
    }

    /// Number of points written to a tier (saturates at its capacity).
    pub fn len(&self, res: Resolution) -> usize {
        match res {
            Resolution::Fine => self.fine.len(),
            Resolution::Medium => self.medium.len(),
            Resolution::Coarse => self.coarse.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len(Resolution::Fine) == 0
    }

    /// Every slot of a tier, oldest first.  Slots never written are
    /// `None` and come before the oldest real point.
    pub fn slots(&self, res: Resolution) -> Vec<Option<Sample>> {
        let filled = self.ordered(res);
        let mut out = Vec::with_capacity(res.capacity());
        out.resize(res.capacity() - filled.len(), None);
        out.extend(filled.into_iter().map(Some));
        out
    }

    /// The last `n` points of a tier, oldest first.
    pub fn recent(&self, res: Resolution, n: usize) -> Vec<Sample> {
        let mut all = self.ordered(res);
        let skip = all.len().saturating_sub(n);
        all.drain(..skip);
        all
    }

    fn ordered(&self, res: Resolution) -> Vec<Sample> {
        match res {
            Resolution::Fine => self.fine.oldest_ordered().copied().collect(),
            Resolution::Medium => self.medium.oldest_ordered().copied().collect(),
            Resolution::Coarse => self.coarse.oldest_ordered().copied().collect(),
        }
    }
}

/// Column layout used by the chart front-end.
#[derive(Debug, Serialize)]
pub struct SeriesExport {
    pub tds: Vec<Option<f32>>,
    pub flow: Vec<Option<f32>>,
    pub prod: Vec<Option<f32>>,
}

impl SeriesExport {
    pub fn from_slots(slots: &[Option<Sample>]) -> Self {
        Self {
            tds: slots.iter().map(|s| s.map(|s| s.quality_ppm)).collect(),
            flow: slots.iter().map(|s| s.map(|s| s.flow_lpm)).collect(),
            prod: slots.iter().map(|s| s.map(|s| s.liters)).collect(),
        }
    }
}
