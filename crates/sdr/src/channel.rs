// Copyright 2025-2026 CEMAXECUTER LLC

use serde::{Deserialize, Serialize};

use crate::error::{Param, SdrError, SdrResult};
use crate::{Channel, SyncDevice};

/// RF parameters for one channel. RX and TX are configured independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub channel: Channel,
    /// Center frequency in Hz
    pub frequency: u64,
    /// Analog bandwidth in Hz
    pub bandwidth: u32,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Overall gain in dB
    pub gain: i32,
}

impl ChannelConfig {
    /// RX settings used by the boilerplate example.
    pub fn default_rx() -> Self {
        Self {
            channel: Channel::rx(0),
            frequency: 910_000_000,
            bandwidth: 2_000_000,
            sample_rate: 300_000,
            gain: 39,
        }
    }

    /// TX settings used by the boilerplate example.
    pub fn default_tx() -> Self {
        Self {
            channel: Channel::tx(0),
            frequency: 918_000_000,
            bandwidth: 1_500_000,
            sample_rate: 250_000,
            gain: -14,
        }
    }
}

/// Apply frequency, sample rate, bandwidth and gain, in that order.
///
/// Stops at the first failing step; nothing after it is attempted.
pub fn configure_channel<D: SyncDevice + ?Sized>(dev: &mut D, c: &ChannelConfig) -> SdrResult<()> {
    let ch = c.channel;
    let fail = |param, value: i64, status| {
        let err = SdrError::Config { channel: ch, param, value, status };
        log::error!("{}", err);
        err
    };

    dev.set_frequency(ch, c.frequency)
        .map_err(|s| fail(Param::Frequency, c.frequency as i64, s))?;

    let actual_rate = dev
        .set_sample_rate(ch, c.sample_rate)
        .map_err(|s| fail(Param::SampleRate, c.sample_rate as i64, s))?;
    if actual_rate != c.sample_rate {
        log::debug!("{}: requested {} S/s, got {} S/s", ch, c.sample_rate, actual_rate);
    }

    let actual_bw = dev
        .set_bandwidth(ch, c.bandwidth)
        .map_err(|s| fail(Param::Bandwidth, c.bandwidth as i64, s))?;
    if actual_bw != c.bandwidth {
        log::debug!("{}: requested {} Hz bandwidth, got {} Hz", ch, c.bandwidth, actual_bw);
    }

    dev.set_gain(ch, c.gain)
        .map_err(|s| fail(Param::Gain, c.gain as i64, s))?;

    log::info!(
        "{} configured ({} MHz, {} S/s, {} Hz bw, gain={} dB)",
        ch,
        c.frequency as f64 / 1e6,
        actual_rate,
        actual_bw,
        c.gain,
    );
    Ok(())
}
