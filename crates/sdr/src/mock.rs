//! Scripted in-memory device for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::{Channel, Direction, Format, FrequencyRange, Metadata, Status, SyncDevice};

/// Operations a test can make fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    SetFrequency,
    GetFrequency,
    FrequencyRange,
    SetSampleRate,
    SetBandwidth,
    SetGain,
    SyncConfig,
    Enable,
    Disable,
    SyncTx,
    Timestamp,
}

/// Record of every call, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SetFrequency(Channel, u64),
    GetFrequency(Channel),
    FrequencyRange(Channel),
    SetSampleRate(Channel, u32),
    SetBandwidth(Channel, u32),
    SetGain(Channel, i32),
    SyncConfig(Direction, Format, u32),
    Enable(Channel),
    Disable(Channel),
    /// Sample count and buffer address
    SyncRx(usize, usize),
    SyncTx(usize, Option<Metadata>),
    Timestamp(Direction),
}

/// Outcome of one scripted `sync_rx` call.
#[derive(Debug, Clone, Copy)]
pub enum RxStep {
    Ok,
    Fail(Status),
    /// Metadata overrun with this many valid samples
    Overrun(u32),
}

pub struct MockDevice {
    pub calls: Vec<Call>,
    pub range: FrequencyRange,
    pub rx_script: VecDeque<RxStep>,
    /// Offset added to every frequency read back
    pub freq_error: u64,
    pub tx_timestamp: u64,
    freqs: HashMap<Channel, u64>,
    configured: HashSet<Direction>,
    enabled: HashSet<Direction>,
    failures: HashMap<Op, (usize, Status)>,
    counts: HashMap<Op, usize>,
    rx_counter: i16,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            range: FrequencyRange {
                min: 70_000_000,
                max: 6_000_000_000,
                step: 2,
                scale: 1.0,
            },
            rx_script: VecDeque::new(),
            freq_error: 0,
            tx_timestamp: 0,
            freqs: HashMap::new(),
            configured: HashSet::new(),
            enabled: HashSet::new(),
            failures: HashMap::new(),
            counts: HashMap::new(),
            rx_counter: 0,
        }
    }

    /// Make the `nth` (0-based) call of `op` return `status`.
    pub fn fail(mut self, op: Op, nth: usize, status: Status) -> Self {
        self.failures.insert(op, (nth, status));
        self
    }

    pub fn script_rx(mut self, steps: &[RxStep]) -> Self {
        self.rx_script.extend(steps.iter().copied());
        self
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn disables(&self) -> usize {
        self.count(|c| matches!(c, Call::Disable(_)))
    }

    pub fn enables(&self) -> usize {
        self.count(|c| matches!(c, Call::Enable(_)))
    }

    fn step(&mut self, op: Op) -> Result<(), Status> {
        let n = self.counts.entry(op).or_insert(0);
        let current = *n;
        *n += 1;
        match self.failures.get(&op) {
            Some(&(nth, status)) if nth == current => Err(status),
            _ => Ok(()),
        }
    }
}

impl SyncDevice for MockDevice {
    fn set_frequency(&mut self, ch: Channel, freq: u64) -> Result<(), Status> {
        self.calls.push(Call::SetFrequency(ch, freq));
        self.step(Op::SetFrequency)?;
        if !self.range.contains(freq) {
            return Err(Status::RANGE);
        }
        self.freqs.insert(ch, freq);
        Ok(())
    }

    fn frequency(&mut self, ch: Channel) -> Result<u64, Status> {
        self.calls.push(Call::GetFrequency(ch));
        self.step(Op::GetFrequency)?;
        Ok(self.freqs.get(&ch).copied().unwrap_or(0) + self.freq_error)
    }

    fn frequency_range(&mut self, ch: Channel) -> Result<FrequencyRange, Status> {
        self.calls.push(Call::FrequencyRange(ch));
        self.step(Op::FrequencyRange)?;
        Ok(self.range)
    }

    fn set_sample_rate(&mut self, ch: Channel, rate: u32) -> Result<u32, Status> {
        self.calls.push(Call::SetSampleRate(ch, rate));
        self.step(Op::SetSampleRate)?;
        Ok(rate)
    }

    fn set_bandwidth(&mut self, ch: Channel, bandwidth: u32) -> Result<u32, Status> {
        self.calls.push(Call::SetBandwidth(ch, bandwidth));
        self.step(Op::SetBandwidth)?;
        Ok(bandwidth)
    }

    fn set_gain(&mut self, ch: Channel, gain: i32) -> Result<(), Status> {
        self.calls.push(Call::SetGain(ch, gain));
        self.step(Op::SetGain)
    }

    fn sync_config(
        &mut self,
        dir: Direction,
        format: Format,
        _num_buffers: u32,
        buffer_size: u32,
        _num_transfers: u32,
        _timeout_ms: u32,
    ) -> Result<(), Status> {
        self.calls.push(Call::SyncConfig(dir, format, buffer_size));
        self.step(Op::SyncConfig)?;
        // Same constraint the transfer engine enforces
        if buffer_size == 0 || buffer_size % 1024 != 0 {
            return Err(Status::INVAL);
        }
        self.configured.insert(dir);
        Ok(())
    }

    fn enable_module(&mut self, ch: Channel, enable: bool) -> Result<(), Status> {
        if enable {
            self.calls.push(Call::Enable(ch));
            self.step(Op::Enable)?;
            self.enabled.insert(ch.direction);
        } else {
            self.calls.push(Call::Disable(ch));
            self.enabled.remove(&ch.direction);
            self.step(Op::Disable)?;
        }
        Ok(())
    }

    fn sync_rx(
        &mut self,
        samples: &mut [i16],
        meta: Option<&mut Metadata>,
        _timeout_ms: u32,
    ) -> Result<(), Status> {
        let num_samples = samples.len() / 2;
        self.calls.push(Call::SyncRx(num_samples, samples.as_ptr() as usize));
        if !self.configured.contains(&Direction::Rx) || !self.enabled.contains(&Direction::Rx) {
            return Err(Status::NOT_INIT);
        }

        let mut actual = num_samples as u32;
        let mut status = 0;
        match self.rx_script.pop_front().unwrap_or(RxStep::Ok) {
            RxStep::Ok => {}
            RxStep::Fail(s) => return Err(s),
            RxStep::Overrun(valid) => {
                actual = valid;
                status = Metadata::STATUS_OVERRUN;
            }
        }

        for s in samples.iter_mut() {
            self.rx_counter = self.rx_counter.wrapping_add(1);
            *s = self.rx_counter;
        }
        if let Some(m) = meta {
            m.actual_count = actual;
            m.status = status;
            m.timestamp = 1000;
        }
        Ok(())
    }

    fn sync_tx(
        &mut self,
        samples: &[i16],
        meta: Option<&mut Metadata>,
        _timeout_ms: u32,
    ) -> Result<(), Status> {
        self.calls.push(Call::SyncTx(samples.len() / 2, meta.as_deref().copied()));
        if !self.configured.contains(&Direction::Tx) || !self.enabled.contains(&Direction::Tx) {
            return Err(Status::NOT_INIT);
        }
        self.step(Op::SyncTx)
    }

    fn timestamp(&mut self, dir: Direction) -> Result<u64, Status> {
        self.calls.push(Call::Timestamp(dir));
        self.step(Op::Timestamp)?;
        Ok(self.tx_timestamp)
    }
}
