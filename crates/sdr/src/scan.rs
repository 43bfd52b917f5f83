// Copyright 2025-2026 CEMAXECUTER LLC

use serde::{Deserialize, Serialize};

use crate::error::{Param, SdrError, SdrResult};
use crate::{Channel, SyncDevice};

/// Inclusive sweep `min..=max` in `step` increments, all in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRange {
    pub min: u64,
    pub max: u64,
    pub step: u64,
}

impl Default for ScanRange {
    fn default() -> Self {
        Self {
            min: 800_000_000,
            max: 900_000_000,
            step: 5_000_000,
        }
    }
}

/// One tuning attempt: what was asked for and what the device reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPoint {
    pub requested: u64,
    pub achieved: u64,
}

impl ScanPoint {
    /// The device reported a usable tuned frequency.
    pub fn is_active(&self) -> bool {
        self.achieved > 0
    }

    /// Achieved minus requested, in Hz
    pub fn offset(&self) -> i64 {
        self.achieved as i64 - self.requested as i64
    }
}

/// Sweep `range` on `ch`, collecting every set/read-back pair.
pub fn scan<D: SyncDevice + ?Sized>(
    dev: &mut D,
    ch: Channel,
    range: &ScanRange,
) -> SdrResult<Vec<ScanPoint>> {
    let mut points = Vec::new();
    scan_each(dev, ch, range, |p| points.push(*p))?;
    Ok(points)
}

/// Like `scan`, reporting each point as soon as it is read back.
///
/// The achievable range is queried from the device first and the sweep is
/// clamped to it. The first failed set or read-back aborts the sweep.
pub fn scan_each<D, F>(dev: &mut D, ch: Channel, range: &ScanRange, mut visit: F) -> SdrResult<()>
where
    D: SyncDevice + ?Sized,
    F: FnMut(&ScanPoint),
{
    if range.step == 0 {
        return Err(SdrError::InvalidScan("step must be non-zero".to_string()));
    }
    if range.min > range.max {
        return Err(SdrError::InvalidScan(format!(
            "min {} Hz is above max {} Hz",
            range.min, range.max
        )));
    }

    let limits = dev.frequency_range(ch).map_err(|status| {
        let err = SdrError::Query { channel: ch, what: "frequency range", status };
        log::error!("{}", err);
        err
    })?;

    // First grid point at or above the device minimum
    let lo = if range.min >= limits.min {
        Some(range.min)
    } else {
        let k = (limits.min - range.min).div_ceil(range.step);
        k.checked_mul(range.step).and_then(|d| range.min.checked_add(d))
    };
    let hi = range.max.min(limits.max);
    let lo = match lo {
        Some(lo) if lo <= hi => lo,
        _ => {
            return Err(SdrError::InvalidScan(format!(
                "{}-{} Hz has no step inside the device range {}-{} Hz",
                range.min, range.max, limits.min, limits.max
            )))
        }
    };
    if lo != range.min || hi != range.max {
        log::warn!(
            "{}: sweep clamped to device range, {:.3}-{:.3} MHz",
            ch,
            lo as f64 / 1e6,
            hi as f64 / 1e6
        );
    }

    log::info!(
        "scanning {} from {:.3} to {:.3} MHz in {:.3} MHz steps",
        ch,
        lo as f64 / 1e6,
        hi as f64 / 1e6,
        range.step as f64 / 1e6
    );

    let mut freq = lo;
    loop {
        dev.set_frequency(ch, freq).map_err(|status| {
            let err = SdrError::Config {
                channel: ch,
                param: Param::Frequency,
                value: freq as i64,
                status,
            };
            log::error!("{}", err);
            err
        })?;

        let achieved = dev.frequency(ch).map_err(|status| {
            let err = SdrError::Query { channel: ch, what: "frequency", status };
            log::error!("{}", err);
            err
        })?;

        let point = ScanPoint { requested: freq, achieved };
        log::debug!("{}: {} Hz -> {} Hz", ch, freq, achieved);
        visit(&point);

        freq = match freq.checked_add(range.step) {
            Some(next) if next <= hi => next,
            _ => break,
        };
    }

    Ok(())
}
