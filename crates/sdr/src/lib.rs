pub mod channel;
pub mod error;
pub mod scan;
pub mod session;
pub mod status;
pub mod stream;

#[cfg(feature = "bladerf")]
pub mod bladerf;

#[cfg(test)]
mod mock;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use error::SdrError;
pub use status::Status;

/// Sample buffer: a block of interleaved int16 IQ samples
#[derive(Debug, Clone, Default)]
pub struct SampleBuf {
    /// Interleaved I,Q,I,Q,... as i16
    pub data: Vec<i16>,
    /// Number of complex samples (data.len() / 2)
    pub num_samples: usize,
}

impl SampleBuf {
    /// Allocate a zeroed buffer holding `num_samples` complex samples.
    /// Reports `SdrError::Alloc` instead of aborting when memory is short.
    pub fn try_zeroed(num_samples: usize) -> Result<Self, SdrError> {
        let len = num_samples
            .checked_mul(2)
            .ok_or(SdrError::Alloc { samples: num_samples })?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| SdrError::Alloc { samples: num_samples })?;
        data.resize(len, 0);
        Ok(Self { data, num_samples })
    }

    /// Build a buffer from already interleaved I/Q data.
    pub fn from_interleaved(data: Vec<i16>) -> Self {
        let num_samples = data.len() / 2;
        Self { data, num_samples }
    }
}

/// RF path direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Rx,
    Tx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Rx => f.write_str("RX"),
            Direction::Tx => f.write_str("TX"),
        }
    }
}

/// One independently tunable RF path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
    pub direction: Direction,
    #[serde(default)]
    pub index: u8,
}

impl Channel {
    pub const fn rx(index: u8) -> Self {
        Self { direction: Direction::Rx, index }
    }

    pub const fn tx(index: u8) -> Self {
        Self { direction: Direction::Tx, index }
    }

    /// libbladeRF channel number: RX(n) = 2n, TX(n) = 2n + 1
    pub fn raw(&self) -> i32 {
        let dir = match self.direction {
            Direction::Rx => 0,
            Direction::Tx => 1,
        };
        ((self.index as i32) << 1) | dir
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.direction, self.index)
    }
}

/// Sample format for the synchronous interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    /// SC16 Q11, no metadata
    #[default]
    Sc16Q11,
    /// SC16 Q11 with per-transfer timestamp/status metadata
    Sc16Q11Meta,
}

impl Format {
    pub fn has_metadata(&self) -> bool {
        matches!(self, Format::Sc16Q11Meta)
    }
}

/// Per-transfer metadata (metadata formats only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Metadata {
    pub timestamp: u64,
    pub flags: u32,
    pub status: u32,
    pub actual_count: u32,
}

impl Metadata {
    pub const FLAG_TX_BURST_START: u32 = 1 << 0;
    pub const FLAG_TX_BURST_END: u32 = 1 << 1;
    pub const FLAG_TX_NOW: u32 = 1 << 2;
    pub const FLAG_RX_NOW: u32 = 1 << 31;

    pub const STATUS_OVERRUN: u32 = 1 << 0;

    pub fn with_flags(flags: u32) -> Self {
        Self { flags, ..Self::default() }
    }

    pub fn overrun(&self) -> bool {
        self.status & Self::STATUS_OVERRUN != 0
    }
}

/// Achievable frequency range as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyRange {
    pub min: u64,
    pub max: u64,
    pub step: u64,
    pub scale: f32,
}

impl FrequencyRange {
    pub fn contains(&self, freq: u64) -> bool {
        freq >= self.min && freq <= self.max
    }
}

/// The subset of libbladeRF a streaming session needs.
///
/// Every call returns the raw library status on failure. Implementations are
/// used from a single thread; exclusive access is expressed with `&mut self`.
pub trait SyncDevice {
    fn set_frequency(&mut self, ch: Channel, freq: u64) -> Result<(), Status>;

    fn frequency(&mut self, ch: Channel) -> Result<u64, Status>;

    fn frequency_range(&mut self, ch: Channel) -> Result<FrequencyRange, Status>;

    /// Returns the rate actually applied.
    fn set_sample_rate(&mut self, ch: Channel, rate: u32) -> Result<u32, Status>;

    /// Returns the bandwidth actually applied.
    fn set_bandwidth(&mut self, ch: Channel, bandwidth: u32) -> Result<u32, Status>;

    fn set_gain(&mut self, ch: Channel, gain: i32) -> Result<(), Status>;

    /// Configure the synchronous interface for the x1 layout of `dir`.
    fn sync_config(
        &mut self,
        dir: Direction,
        format: Format,
        num_buffers: u32,
        buffer_size: u32,
        num_transfers: u32,
        timeout_ms: u32,
    ) -> Result<(), Status>;

    fn enable_module(&mut self, ch: Channel, enable: bool) -> Result<(), Status>;

    /// Pull `samples.len() / 2` samples.
    fn sync_rx(
        &mut self,
        samples: &mut [i16],
        meta: Option<&mut Metadata>,
        timeout_ms: u32,
    ) -> Result<(), Status>;

    /// Push `samples.len() / 2` samples.
    fn sync_tx(
        &mut self,
        samples: &[i16],
        meta: Option<&mut Metadata>,
        timeout_ms: u32,
    ) -> Result<(), Status>;

    /// Current free-running timestamp counter for `dir`.
    fn timestamp(&mut self, dir: Direction) -> Result<u64, Status>;
}
