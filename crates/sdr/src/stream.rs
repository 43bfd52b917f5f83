// Copyright 2025-2026 CEMAXECUTER LLC

use crossbeam::channel::{Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Param, SdrError, SdrResult};
use crate::{Channel, Direction, Format, Metadata, SampleBuf, SyncDevice};

/// The transfer engine only accepts buffer sizes that are a multiple of this.
pub const BUFFER_ALIGNMENT: u32 = 1024;

/// Buffering parameters for the synchronous interface.
///
/// TX buffers are not submitted to the hardware until `buffer_size` samples
/// have been provided; RX samples are not available until a block of
/// `buffer_size` samples has been received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub num_buffers: u32,
    /// In samples; must be a multiple of `BUFFER_ALIGNMENT`
    pub buffer_size: u32,
    pub num_transfers: u32,
    pub timeout_ms: u32,
    pub format: Format,
    /// Timestamp-scheduled transmission (metadata format only)
    pub schedule: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            num_buffers: 16,
            buffer_size: 8192,
            num_transfers: 8,
            timeout_ms: 3500,
            format: Format::Sc16Q11,
            schedule: false,
        }
    }
}

impl StreamConfig {
    /// Whether `buffer_size` satisfies the engine's alignment rule.
    /// Not enforced here; the engine rejects misaligned sizes itself.
    pub fn is_aligned(&self) -> bool {
        self.buffer_size != 0 && self.buffer_size % BUFFER_ALIGNMENT == 0
    }
}

/// Apply buffering parameters for one direction. Must precede enabling it.
pub fn configure_stream<D: SyncDevice + ?Sized>(
    dev: &mut D,
    dir: Direction,
    s: &StreamConfig,
) -> SdrResult<()> {
    setup_stream(dev, Channel { direction: dir, index: 0 }, s)
}

/// `configure_stream` for the channel a session will enable; errors name it.
fn setup_stream<D: SyncDevice + ?Sized>(dev: &mut D, ch: Channel, s: &StreamConfig) -> SdrResult<()> {
    let dir = ch.direction;
    dev.sync_config(
        dir,
        s.format,
        s.num_buffers,
        s.buffer_size,
        s.num_transfers,
        s.timeout_ms,
    )
    .map_err(|status| {
        let err = SdrError::Config {
            channel: ch,
            param: Param::StreamSetup(dir),
            value: s.buffer_size as i64,
            status,
        };
        log::error!("failed to configure {} sync interface: {}", dir, status);
        err
    })?;

    log::debug!(
        "{} sync interface: {} buffers x {} samples, {} transfers, {} ms, {:?}",
        dir,
        s.num_buffers,
        s.buffer_size,
        s.num_transfers,
        s.timeout_ms,
        s.format,
    );
    Ok(())
}

/// Lifecycle of a stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Configured,
    Enabled,
    Running,
    Disabling,
}

/// Bound on consecutive failed transfers before a loop gives up.
///
/// A successful transfer resets the count. `shared()` hands out a second
/// budget drawing on the same counter, so an RX and a TX loop can be made to
/// give up together.
#[derive(Debug)]
pub struct FailureBudget {
    limit: u32,
    consecutive: Arc<AtomicU32>,
}

impl FailureBudget {
    /// A limit of 0 is treated as 1: the first failure ends the loop.
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            consecutive: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn shared(&self) -> Self {
        Self {
            limit: self.limit,
            consecutive: self.consecutive.clone(),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive.load(Ordering::SeqCst)
    }

    /// Returns true once the budget is exhausted.
    fn record_failure(&self) -> bool {
        self.consecutive.fetch_add(1, Ordering::SeqCst) + 1 >= self.limit
    }

    fn record_success(&self) {
        self.consecutive.store(0, Ordering::SeqCst);
    }
}

impl Default for FailureBudget {
    fn default() -> Self {
        Self::new(3)
    }
}

fn is_running(flag: &Option<Arc<AtomicBool>>) -> bool {
    flag.as_ref().map_or(true, |r| r.load(Ordering::SeqCst))
}

/// Receive loop options.
#[derive(Debug)]
pub struct RxOptions {
    pub channel_index: u8,
    /// Samples per pull; any reasonable size, independent of `buffer_size`
    pub samples_len: usize,
    /// Bound on each blocking pull
    pub timeout_ms: u32,
    /// Stop after this many successful pulls
    pub max_buffers: Option<u64>,
    pub budget: FailureBudget,
    /// Loop runs while this is true
    pub running: Option<Arc<AtomicBool>>,
}

impl Default for RxOptions {
    fn default() -> Self {
        Self {
            channel_index: 0,
            samples_len: 10_000,
            timeout_ms: 5000,
            max_buffers: None,
            budget: FailureBudget::default(),
            running: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxStats {
    pub buffers: u64,
    pub samples: u64,
    pub failures: u64,
    pub overruns: u64,
}

/// Transmit loop options.
#[derive(Debug)]
pub struct TxOptions {
    pub channel_index: u8,
    /// Samples per push
    pub samples_len: usize,
    pub timeout_ms: u32,
    /// Time allowed for queued samples to reach the RF front end
    pub grace: Duration,
    /// Lead time for the first scheduled burst, in samples
    pub schedule_delay_samples: u64,
    pub budget: FailureBudget,
    pub running: Option<Arc<AtomicBool>>,
}

impl Default for TxOptions {
    fn default() -> Self {
        Self {
            channel_index: 0,
            samples_len: 10_000,
            timeout_ms: 5000,
            grace: Duration::from_secs(2),
            schedule_delay_samples: 100_000,
            budget: FailureBudget::default(),
            running: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxStats {
    pub buffers: u64,
    pub samples: u64,
    pub failures: u64,
}

/// Owns the enabled-or-not state of one channel; disables it exactly once.
struct StreamSession<'a, D: SyncDevice + ?Sized> {
    dev: &'a mut D,
    channel: Channel,
    state: SessionState,
    torn_down: bool,
}

impl<'a, D: SyncDevice + ?Sized> StreamSession<'a, D> {
    fn new(dev: &'a mut D, channel: Channel) -> Self {
        Self {
            dev,
            channel,
            state: SessionState::Idle,
            torn_down: false,
        }
    }

    fn set_state(&mut self, state: SessionState) {
        log::debug!("{} stream: {:?} -> {:?}", self.channel, self.state, state);
        self.state = state;
    }

    fn configure(&mut self, s: &StreamConfig) -> SdrResult<()> {
        setup_stream(self.dev, self.channel, s)?;
        self.set_state(SessionState::Configured);
        Ok(())
    }

    fn enable(&mut self) -> SdrResult<()> {
        self.dev.enable_module(self.channel, true).map_err(|status| {
            let err = SdrError::Enable { channel: self.channel, status };
            log::error!("{}", err);
            err
        })?;
        self.set_state(SessionState::Enabled);
        Ok(())
    }

    /// Disable the channel. Safe whether or not it was ever enabled; a
    /// failure is logged and does not affect the session's result.
    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.set_state(SessionState::Disabling);
        if let Err(status) = self.dev.enable_module(self.channel, false) {
            log::error!("{}", SdrError::Disable { channel: self.channel, status });
        }
        self.set_state(SessionState::Idle);
    }

    fn run_rx<F>(
        &mut self,
        buf: &mut SampleBuf,
        s: &StreamConfig,
        opts: &RxOptions,
        handler: &mut F,
    ) -> SdrResult<RxStats>
    where
        F: FnMut(&[i16], Option<&Metadata>) -> ControlFlow<()>,
    {
        self.set_state(SessionState::Running);
        let with_meta = s.format.has_metadata();
        let mut stats = RxStats::default();

        loop {
            if !is_running(&opts.running) {
                log::info!("{} stop requested", self.channel);
                break;
            }
            if opts.max_buffers.map_or(false, |max| stats.buffers >= max) {
                break;
            }

            let mut meta = Metadata::with_flags(Metadata::FLAG_RX_NOW);
            let meta_arg = if with_meta { Some(&mut meta) } else { None };

            if let Err(status) = self.dev.sync_rx(&mut buf.data, meta_arg, opts.timeout_ms) {
                stats.failures += 1;
                let err = SdrError::Transfer { direction: Direction::Rx, status };
                log_transfer_error(&err);
                if opts.budget.record_failure() {
                    log::error!(
                        "{}: giving up after {} consecutive failures",
                        self.channel,
                        opts.budget.limit()
                    );
                    return Err(err);
                }
                continue;
            }
            opts.budget.record_success();

            let valid = if with_meta {
                let valid = (meta.actual_count as usize).min(buf.num_samples);
                if meta.overrun() {
                    stats.overruns += 1;
                    log::warn!(
                        "{} overrun detected, {} of {} samples valid",
                        self.channel,
                        valid,
                        buf.num_samples
                    );
                }
                valid
            } else {
                buf.num_samples
            };

            stats.buffers += 1;
            stats.samples += valid as u64;

            let meta_ref = if with_meta { Some(&meta) } else { None };
            if handler(&buf.data[..valid * 2], meta_ref).is_break() {
                break;
            }
        }

        Ok(stats)
    }

    fn run_tx(
        &mut self,
        buf: &mut SampleBuf,
        s: &StreamConfig,
        opts: &TxOptions,
        source: &Receiver<SampleBuf>,
    ) -> SdrResult<TxStats> {
        self.set_state(SessionState::Running);
        let with_meta = s.format.has_metadata();
        let wait = Duration::from_millis(opts.timeout_ms as u64);
        let mut next_timestamp: Option<u64> = None;
        let mut stats = TxStats::default();

        while is_running(&opts.running) {
            let block = match source.recv_timeout(wait) {
                Ok(block) => block,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    log::debug!("{} producer finished", self.channel);
                    break;
                }
            };

            for chunk in block.data.chunks(buf.data.len()) {
                let n = chunk.len() / 2;
                if n == 0 {
                    continue;
                }
                buf.data[..n * 2].copy_from_slice(&chunk[..n * 2]);

                let mut meta = Metadata::default();
                let mut slot = None;
                if with_meta {
                    meta.flags = Metadata::FLAG_TX_BURST_START | Metadata::FLAG_TX_BURST_END;
                    if s.schedule {
                        let ts = match next_timestamp {
                            Some(ts) => ts,
                            None => {
                                let ts = self.first_burst_time(opts.schedule_delay_samples)?;
                                next_timestamp = Some(ts);
                                ts
                            }
                        };
                        meta.timestamp = ts;
                        slot = Some(ts);
                    } else {
                        meta.flags |= Metadata::FLAG_TX_NOW;
                    }
                }
                let meta_arg = if with_meta { Some(&mut meta) } else { None };

                if let Err(status) = self.dev.sync_tx(&buf.data[..n * 2], meta_arg, opts.timeout_ms) {
                    stats.failures += 1;
                    let err = SdrError::Transfer { direction: Direction::Tx, status };
                    log_transfer_error(&err);
                    if opts.budget.record_failure() {
                        log::error!(
                            "{}: giving up after {} consecutive failures",
                            self.channel,
                            opts.budget.limit()
                        );
                        return Err(err);
                    }
                    continue;
                }
                opts.budget.record_success();
                // A failed push leaves its slot for the next burst
                if let Some(ts) = slot {
                    next_timestamp = Some(ts + n as u64);
                }
                stats.buffers += 1;
                stats.samples += n as u64;
            }
        }

        Ok(stats)
    }

    fn first_burst_time(&mut self, delay: u64) -> SdrResult<u64> {
        let now = self.dev.timestamp(Direction::Tx).map_err(|status| {
            let err = SdrError::Query { channel: self.channel, what: "timestamp", status };
            log::error!("{}", err);
            err
        })?;
        Ok(now + delay)
    }
}

impl<'a, D: SyncDevice + ?Sized> Drop for StreamSession<'a, D> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn log_transfer_error(err: &SdrError) {
    if err.is_timeout() {
        log::warn!("{}", err);
    } else {
        log::error!("{}", err);
    }
}

fn alloc(samples: usize) -> SdrResult<SampleBuf> {
    SampleBuf::try_zeroed(samples).map_err(|e| {
        log::error!("{}", e);
        e
    })
}

/// Receive loop: allocate, configure, enable, pull until done, disable.
///
/// `handler` gets the valid interleaved samples of each pull and, in
/// metadata mode, that pull's metadata. Returning `Break` ends the loop.
pub fn sync_rx<D, F>(
    dev: &mut D,
    s: &StreamConfig,
    opts: &RxOptions,
    mut handler: F,
) -> SdrResult<RxStats>
where
    D: SyncDevice + ?Sized,
    F: FnMut(&[i16], Option<&Metadata>) -> ControlFlow<()>,
{
    let mut buf = alloc(opts.samples_len)?;
    let mut session = StreamSession::new(dev, Channel::rx(opts.channel_index));

    session.configure(s)?;
    session.enable()?;
    let result = session.run_rx(&mut buf, s, opts, &mut handler);
    session.teardown();

    if let Ok(stats) = &result {
        log::info!(
            "RX done: {} buffers, {} samples, {} failures, {} overruns",
            stats.buffers,
            stats.samples,
            stats.failures,
            stats.overruns
        );
    }
    result
}

/// Transmit loop: push every block `source` delivers until the producer
/// hangs up, then let the last samples drain before disabling TX.
pub fn sync_tx<D>(
    dev: &mut D,
    s: &StreamConfig,
    opts: &TxOptions,
    source: &Receiver<SampleBuf>,
) -> SdrResult<TxStats>
where
    D: SyncDevice + ?Sized,
{
    // Blocks are split into pushes of this size, so it cannot be empty
    let mut buf = alloc(opts.samples_len.max(1))?;
    let mut session = StreamSession::new(dev, Channel::tx(opts.channel_index));

    session.configure(s)?;
    session.enable()?;
    let result = session.run_tx(&mut buf, s, opts, source);

    if matches!(&result, Ok(stats) if stats.buffers > 0) && !opts.grace.is_zero() {
        log::debug!("waiting {:?} for TX samples to drain", opts.grace);
        std::thread::sleep(opts.grace);
    }
    session.teardown();

    if let Ok(stats) = &result {
        log::info!(
            "TX done: {} buffers, {} samples, {} failures",
            stats.buffers,
            stats.samples,
            stats.failures
        );
    }
    result
}
