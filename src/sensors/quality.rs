//! TDS (total dissolved solids) quality probe conversion.
//!
//! The probe board outputs an analog voltage read through a 12-bit ADC
//! referenced to 3.3 V.  The vendor curve maps voltage to ppm with a cubic
//! polynomial; the trailing 0.5 factor is the probe's fixed temperature
//! compensation at 25 °C.
//!
//! A short ring buffer smooths ADC noise so a single spike can't trip the
//! absolute quality maximum during production.

/// ADC full-scale count (12-bit).
pub const ADC_MAX: f32 = 4095.0;
/// ADC reference voltage.
pub const ADC_VREF: f32 = 3.3;

const RING_BUF_CAP: usize = 8;

/// Convert a raw ADC count into a TDS value in ppm.
pub fn raw_to_ppm(raw: u16) -> f32 {
    let v = f32::from(raw) * ADC_VREF / ADC_MAX;
    let ppm = (133.42 * v * v * v - 255.86 * v * v + 857.39 * v) * 0.5;
    ppm.max(0.0)
}

/// Smallest raw ADC count that reads at least `ppm`.  The curve is
/// monotonic over the ADC range, so a binary search inverts it.
pub fn ppm_to_raw(ppm: f32) -> u16 {
    let (mut lo, mut hi) = (0u16, ADC_MAX as u16);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if raw_to_ppm(mid) < ppm {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Smoothed quality reading.
#[derive(Debug, Clone, Copy)]
pub struct QualityReading {
    pub raw: u16,
    pub ppm: f32,
    pub avg_ppm: f32,
}

/// Quality probe with a running average.
pub struct QualityProbe {
    ring: [f32; RING_BUF_CAP],
    head: usize,
    count: usize,
}

impl Default for QualityProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl QualityProbe {
    pub fn new() -> Self {
        Self {
            ring: [0.0; RING_BUF_CAP],
            head: 0,
            count: 0,
        }
    }

    /// Feed one raw ADC sample.
    pub fn update(&mut self, raw: u16) -> QualityReading {
        let ppm = raw_to_ppm(raw);

        self.ring[self.head] = ppm;
        self.head = (self.head + 1) % RING_BUF_CAP;
        if self.count < RING_BUF_CAP {
            self.count += 1;
        }

        QualityReading {
            raw,
            ppm,
            avg_ppm: self.running_average(),
        }
    }

    fn running_average(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        let sum: f32 = self.ring[..self.count].iter().sum();
        sum / self.count as f32
    }
}
