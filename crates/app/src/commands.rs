use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use brf_sdr::channel::{configure_channel, ChannelConfig};
use brf_sdr::error::{Param, SdrError, SdrResult};
use brf_sdr::scan::{scan_each, ScanPoint, ScanRange};
use brf_sdr::stream::{sync_rx, sync_tx, RxOptions, RxStats, StreamConfig, TxOptions, TxStats};
use brf_sdr::{Channel, SampleBuf, SyncDevice};
use crossbeam::channel;

use crate::config::ScanProfile;

/// Configure the RX channel and receive until the options say stop.
pub fn run_rx<D: SyncDevice + ?Sized>(
    dev: &mut D,
    rx: &ChannelConfig,
    stream: &StreamConfig,
    opts: &RxOptions,
) -> SdrResult<RxStats> {
    configure_channel(dev, rx)?;

    let start = Instant::now();
    let mut last_stats = Instant::now();
    let mut buffers: u64 = 0;
    let mut samples: u64 = 0;
    let mut overruns: u64 = 0;

    sync_rx(dev, stream, opts, |block, meta| {
        buffers += 1;
        samples += (block.len() / 2) as u64;
        if meta.map_or(false, |m| m.overrun()) {
            overruns += 1;
        }

        // Print stats every 5 seconds
        if last_stats.elapsed().as_secs() >= 5 {
            let elapsed = start.elapsed().as_secs_f64();
            eprintln!(
                "[{:.1}s] RX buffers: {} samples: {} ({:.0} S/s) overruns: {}",
                elapsed,
                buffers,
                samples,
                samples as f64 / elapsed,
                overruns,
            );
            last_stats = Instant::now();
        }
        ControlFlow::Continue(())
    })
}

/// Configure the TX channel and transmit `blocks` blocks of silence.
///
/// The blocks come from a producer thread so the transmit loop sees the
/// same data-ready hand-off it would with a real sample source.
pub fn run_tx<D: SyncDevice + ?Sized>(
    dev: &mut D,
    tx: &ChannelConfig,
    stream: &StreamConfig,
    opts: &TxOptions,
    blocks: u64,
) -> SdrResult<TxStats> {
    configure_channel(dev, tx)?;

    let block_len = opts.samples_len;
    let (sender, receiver) = channel::bounded(4);
    let producer = std::thread::spawn(move || {
        for _ in 0..blocks {
            let buf = SampleBuf::from_interleaved(vec![0i16; block_len * 2]);
            if sender.send(buf).is_err() {
                break; // transmitter gone
            }
        }
    });

    let result = sync_tx(dev, stream, opts, &receiver);

    // Unblock the producer if the transmitter stopped early
    drop(receiver);
    if producer.join().is_err() {
        log::error!("TX producer thread panicked");
    }
    result
}

/// Apply the scan sample rate and bandwidth, then sweep.
pub fn run_scan<D: SyncDevice + ?Sized>(
    dev: &mut D,
    ch: Channel,
    scan: &ScanProfile,
    mut report: impl FnMut(&ScanPoint),
) -> SdrResult<()> {
    dev.set_sample_rate(ch, scan.sample_rate).map_err(|status| {
        let err = SdrError::Config {
            channel: ch,
            param: Param::SampleRate,
            value: scan.sample_rate as i64,
            status,
        };
        log::error!("{}", err);
        err
    })?;
    dev.set_bandwidth(ch, scan.bandwidth).map_err(|status| {
        let err = SdrError::Config {
            channel: ch,
            param: Param::Bandwidth,
            value: scan.bandwidth as i64,
            status,
        };
        log::error!("{}", err);
        err
    })?;

    scan_each(dev, ch, &scan.range, |p| report(p))
}

pub fn print_point(p: &ScanPoint) {
    if p.is_active() {
        println!(
            "{:.3} MHz -> tuned {:.6} MHz (offset {} Hz)",
            p.requested as f64 / 1e6,
            p.achieved as f64 / 1e6,
            p.offset()
        );
    } else {
        println!("{:.3} MHz -> no frequency reported", p.requested as f64 / 1e6);
    }
}

/// Scan range from optional CLI overrides given in MHz.
pub fn scan_range(base: ScanRange, min: Option<f64>, max: Option<f64>, step: Option<f64>) -> ScanRange {
    let hz = |mhz: f64| (mhz * 1e6).round() as u64;
    ScanRange {
        min: min.map_or(base.min, hz),
        max: max.map_or(base.max, hz),
        step: step.map_or(base.step, hz),
    }
}

pub fn grace(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
