// Copyright 2025-2026 CEMAXECUTER LLC

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_uint, c_void};
use std::ptr;

use crate::error::SdrResult;
use crate::session::{open_with_fallback, DeviceInfo};
use crate::{Channel, Direction, Format, FrequencyRange, Metadata, Status, SyncDevice};

type RawDevice = c_void;

// bladeRF constants
const BLADERF_RX_X1: c_int = 0;
const BLADERF_TX_X1: c_int = 1;
const BLADERF_RX: c_int = 0;
const BLADERF_TX: c_int = 1;
const BLADERF_FORMAT_SC16_Q11: c_int = 0;
const BLADERF_FORMAT_SC16_Q11_META: c_int = 1;
const BLADERF_SERIAL_LENGTH: usize = 33;

// bladerf_devinfo
#[repr(C)]
struct BladerfDevinfo {
    backend: c_int,
    serial: [c_char; BLADERF_SERIAL_LENGTH],
    usb_bus: u8,
    usb_addr: u8,
    instance: c_uint,
    manufacturer: [c_char; 33],
    product: [c_char; 33],
}

// bladerf_range
#[repr(C)]
struct BladerfRange {
    min: i64,
    max: i64,
    step: i64,
    scale: f32,
}

// bladerf_metadata
#[repr(C)]
struct BladerfMetadata {
    timestamp: u64,
    flags: u32,
    status: u32,
    actual_count: c_uint,
    reserved: [u8; 32],
}

extern "C" {
    fn bladerf_init_devinfo(info: *mut BladerfDevinfo);
    fn bladerf_open_with_devinfo(device: *mut *mut RawDevice, devinfo: *mut BladerfDevinfo) -> c_int;
    fn bladerf_close(device: *mut RawDevice);
    fn bladerf_set_frequency(dev: *mut RawDevice, ch: c_int, frequency: u64) -> c_int;
    fn bladerf_get_frequency(dev: *mut RawDevice, ch: c_int, frequency: *mut u64) -> c_int;
    fn bladerf_get_frequency_range(
        dev: *mut RawDevice,
        ch: c_int,
        range: *mut *const BladerfRange,
    ) -> c_int;
    fn bladerf_set_sample_rate(
        dev: *mut RawDevice,
        ch: c_int,
        rate: c_uint,
        actual: *mut c_uint,
    ) -> c_int;
    fn bladerf_set_bandwidth(
        dev: *mut RawDevice,
        ch: c_int,
        bandwidth: c_uint,
        actual: *mut c_uint,
    ) -> c_int;
    fn bladerf_set_gain(dev: *mut RawDevice, ch: c_int, gain: c_int) -> c_int;
    fn bladerf_sync_config(
        dev: *mut RawDevice,
        layout: c_int,
        format: c_int,
        num_buffers: c_uint,
        buffer_size: c_uint,
        num_transfers: c_uint,
        stream_timeout: c_uint,
    ) -> c_int;
    fn bladerf_enable_module(dev: *mut RawDevice, ch: c_int, enable: bool) -> c_int;
    fn bladerf_sync_rx(
        dev: *mut RawDevice,
        samples: *mut c_void,
        num_samples: c_uint,
        metadata: *mut BladerfMetadata,
        timeout_ms: c_uint,
    ) -> c_int;
    fn bladerf_sync_tx(
        dev: *mut RawDevice,
        samples: *const c_void,
        num_samples: c_uint,
        metadata: *mut BladerfMetadata,
        timeout_ms: c_uint,
    ) -> c_int;
    fn bladerf_get_timestamp(dev: *mut RawDevice, dir: c_int, value: *mut u64) -> c_int;
    fn bladerf_get_device_list(devices: *mut *mut BladerfDevinfo) -> c_int;
    fn bladerf_free_device_list(devices: *mut BladerfDevinfo);
}

fn c_string(raw: &[c_char]) -> String {
    unsafe { CStr::from_ptr(raw.as_ptr()).to_string_lossy().to_string() }
}

/// Complex sample count for an interleaved buffer of `len` values.
fn sample_count(len: usize) -> Result<c_uint, Status> {
    c_uint::try_from(len / 2).map_err(|_| Status::INVAL)
}

fn raw_metadata(meta: &Metadata) -> BladerfMetadata {
    BladerfMetadata {
        timestamp: meta.timestamp,
        flags: meta.flags,
        status: 0,
        actual_count: 0,
        reserved: [0; 32],
    }
}

/// List attached boards. No devices is an empty list, not an error.
pub fn list_devices() -> Result<Vec<DeviceInfo>, Status> {
    let mut devs: *mut BladerfDevinfo = ptr::null_mut();
    let count = unsafe { bladerf_get_device_list(&mut devs) };

    if count == Status::NODEV.code() {
        return Ok(Vec::new());
    }
    if count < 0 {
        return Err(Status(count));
    }
    if devs.is_null() {
        return Ok(Vec::new());
    }

    let mut devices = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let dev = unsafe { &*devs.add(i) };
        devices.push(DeviceInfo {
            instance: dev.instance,
            serial: c_string(&dev.serial),
            usb_bus: dev.usb_bus,
            usb_addr: dev.usb_addr,
        });
    }

    unsafe { bladerf_free_device_list(devs) };
    Ok(devices)
}

/// An open bladeRF handle. Closed on drop.
pub struct BladerfDevice {
    dev: *mut RawDevice,
}

// The handle is only ever used through `&mut self`
unsafe impl Send for BladerfDevice {}

impl BladerfDevice {
    /// Open the device with `serial`, or any device when `None`.
    pub fn open(serial: Option<&str>) -> Result<Self, Status> {
        let mut info = std::mem::MaybeUninit::<BladerfDevinfo>::uninit();
        let mut info = unsafe {
            bladerf_init_devinfo(info.as_mut_ptr());
            info.assume_init()
        };

        if let Some(serial) = serial {
            // strncpy semantics: keep the terminating NUL
            for (dst, &src) in info
                .serial
                .iter_mut()
                .zip(serial.as_bytes().iter().take(BLADERF_SERIAL_LENGTH - 1))
            {
                *dst = src as c_char;
            }
            let end = serial.len().min(BLADERF_SERIAL_LENGTH - 1);
            info.serial[end] = 0;
        }

        let mut dev: *mut RawDevice = ptr::null_mut();
        Status::check(unsafe { bladerf_open_with_devinfo(&mut dev, &mut info) })?;
        Ok(Self { dev })
    }

    /// Open by serial, falling back to the first available device.
    pub fn open_with_serial(serial: Option<&str>) -> SdrResult<Self> {
        open_with_fallback(serial, Self::open)
    }
}

impl SyncDevice for BladerfDevice {
    fn set_frequency(&mut self, ch: Channel, freq: u64) -> Result<(), Status> {
        Status::check(unsafe { bladerf_set_frequency(self.dev, ch.raw(), freq) })
    }

    fn frequency(&mut self, ch: Channel) -> Result<u64, Status> {
        let mut freq: u64 = 0;
        Status::check(unsafe { bladerf_get_frequency(self.dev, ch.raw(), &mut freq) })?;
        Ok(freq)
    }

    fn frequency_range(&mut self, ch: Channel) -> Result<FrequencyRange, Status> {
        let mut range: *const BladerfRange = ptr::null();
        Status::check(unsafe { bladerf_get_frequency_range(self.dev, ch.raw(), &mut range) })?;
        if range.is_null() {
            return Err(Status::UNEXPECTED);
        }

        // Owned by libbladeRF; copied out immediately
        let r = unsafe { &*range };
        let scaled = |v: i64| (v as f64 * r.scale as f64).max(0.0) as u64;
        Ok(FrequencyRange {
            min: scaled(r.min),
            max: scaled(r.max),
            step: scaled(r.step),
            scale: r.scale,
        })
    }

    fn set_sample_rate(&mut self, ch: Channel, rate: u32) -> Result<u32, Status> {
        let mut actual: c_uint = 0;
        Status::check(unsafe { bladerf_set_sample_rate(self.dev, ch.raw(), rate, &mut actual) })?;
        Ok(actual)
    }

    fn set_bandwidth(&mut self, ch: Channel, bandwidth: u32) -> Result<u32, Status> {
        let mut actual: c_uint = 0;
        Status::check(unsafe {
            bladerf_set_bandwidth(self.dev, ch.raw(), bandwidth, &mut actual)
        })?;
        Ok(actual)
    }

    fn set_gain(&mut self, ch: Channel, gain: i32) -> Result<(), Status> {
        Status::check(unsafe { bladerf_set_gain(self.dev, ch.raw(), gain) })
    }

    fn sync_config(
        &mut self,
        dir: Direction,
        format: Format,
        num_buffers: u32,
        buffer_size: u32,
        num_transfers: u32,
        timeout_ms: u32,
    ) -> Result<(), Status> {
        let layout = match dir {
            Direction::Rx => BLADERF_RX_X1,
            Direction::Tx => BLADERF_TX_X1,
        };
        let format = match format {
            Format::Sc16Q11 => BLADERF_FORMAT_SC16_Q11,
            Format::Sc16Q11Meta => BLADERF_FORMAT_SC16_Q11_META,
        };
        Status::check(unsafe {
            bladerf_sync_config(
                self.dev,
                layout,
                format,
                num_buffers,
                buffer_size,
                num_transfers,
                timeout_ms,
            )
        })
    }

    fn enable_module(&mut self, ch: Channel, enable: bool) -> Result<(), Status> {
        Status::check(unsafe { bladerf_enable_module(self.dev, ch.raw(), enable) })
    }

    fn sync_rx(
        &mut self,
        samples: &mut [i16],
        meta: Option<&mut Metadata>,
        timeout_ms: u32,
    ) -> Result<(), Status> {
        let num_samples = sample_count(samples.len())?;
        match meta {
            Some(meta) => {
                let mut raw = raw_metadata(meta);
                let r = unsafe {
                    bladerf_sync_rx(
                        self.dev,
                        samples.as_mut_ptr() as *mut c_void,
                        num_samples,
                        &mut raw,
                        timeout_ms,
                    )
                };
                meta.timestamp = raw.timestamp;
                meta.status = raw.status;
                meta.actual_count = raw.actual_count;
                Status::check(r)
            }
            None => Status::check(unsafe {
                bladerf_sync_rx(
                    self.dev,
                    samples.as_mut_ptr() as *mut c_void,
                    num_samples,
                    ptr::null_mut(),
                    timeout_ms,
                )
            }),
        }
    }

    fn sync_tx(
        &mut self,
        samples: &[i16],
        meta: Option<&mut Metadata>,
        timeout_ms: u32,
    ) -> Result<(), Status> {
        let num_samples = sample_count(samples.len())?;
        match meta {
            Some(meta) => {
                let mut raw = raw_metadata(meta);
                let r = unsafe {
                    bladerf_sync_tx(
                        self.dev,
                        samples.as_ptr() as *const c_void,
                        num_samples,
                        &mut raw,
                        timeout_ms,
                    )
                };
                meta.status = raw.status;
                Status::check(r)
            }
            None => Status::check(unsafe {
                bladerf_sync_tx(
                    self.dev,
                    samples.as_ptr() as *const c_void,
                    num_samples,
                    ptr::null_mut(),
                    timeout_ms,
                )
            }),
        }
    }

    fn timestamp(&mut self, dir: Direction) -> Result<u64, Status> {
        let dir = match dir {
            Direction::Rx => BLADERF_RX,
            Direction::Tx => BLADERF_TX,
        };
        let mut value: u64 = 0;
        Status::check(unsafe { bladerf_get_timestamp(self.dev, dir, &mut value) })?;
        Ok(value)
    }
}

impl Drop for BladerfDevice {
    fn drop(&mut self) {
        unsafe { bladerf_close(self.dev) };
        log::debug!("bladeRF closed");
    }
}
