// Copyright 2025-2026 CEMAXECUTER LLC

use std::fmt;

use crate::{Channel, Direction, Status};

/// Parameter a configuration step was applying when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Frequency,
    SampleRate,
    Bandwidth,
    Gain,
    /// Synchronous interface setup; the value reported is the buffer size.
    StreamSetup(Direction),
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Frequency => f.write_str("frequency"),
            Param::SampleRate => f.write_str("samplerate"),
            Param::Bandwidth => f.write_str("bandwidth"),
            Param::Gain => f.write_str("gain"),
            Param::StreamSetup(dir) => write!(f, "{} sync interface buffer_size", dir),
        }
    }
}

/// Result type for SDR operations
pub type SdrResult<T> = Result<T, SdrError>;

/// Errors that can occur while configuring or streaming
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SdrError {
    #[error("unable to open device: {status}")]
    Open { status: Status },

    #[error("failed to allocate a {samples} sample buffer")]
    Alloc { samples: usize },

    #[error("failed to set {param} = {value} on {channel}: {status}")]
    Config {
        channel: Channel,
        param: Param,
        value: i64,
        status: Status,
    },

    #[error("failed to read back {what} on {channel}: {status}")]
    Query {
        channel: Channel,
        what: &'static str,
        status: Status,
    },

    #[error("failed to enable {channel}: {status}")]
    Enable { channel: Channel, status: Status },

    #[error("failed to disable {channel}: {status}")]
    Disable { channel: Channel, status: Status },

    #[error("failed to {direction} samples: {status}")]
    Transfer { direction: Direction, status: Status },

    #[error("invalid scan range: {0}")]
    InvalidScan(String),
}

impl SdrError {
    /// libbladeRF status this error carries, used as the process exit code.
    pub fn status(&self) -> Status {
        match self {
            SdrError::Open { status }
            | SdrError::Config { status, .. }
            | SdrError::Query { status, .. }
            | SdrError::Enable { status, .. }
            | SdrError::Disable { status, .. }
            | SdrError::Transfer { status, .. } => *status,
            SdrError::Alloc { .. } => Status::MEM,
            SdrError::InvalidScan(_) => Status::INVAL,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.status() == Status::TIMEOUT
    }
}
