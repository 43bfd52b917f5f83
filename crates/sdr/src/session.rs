// Copyright 2025-2026 CEMAXECUTER LLC

use crate::error::{SdrError, SdrResult};
use crate::Status;

/// An attached board as reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub instance: u32,
    pub serial: String,
    pub usb_bus: u8,
    pub usb_addr: u8,
}

/// Open a device by serial number, falling back to the first available one.
///
/// `open(None)` must open any device. A serial that matches nothing
/// (`NODEV`) is not an error; any other failure is.
pub fn open_with_fallback<T, F>(serial: Option<&str>, mut open: F) -> SdrResult<T>
where
    F: FnMut(Option<&str>) -> Result<T, Status>,
{
    if let Some(serial) = serial.filter(|s| !s.is_empty()) {
        match open(Some(serial)) {
            Ok(dev) => {
                log::info!("opened device with serial {}", serial);
                return Ok(dev);
            }
            Err(Status::NODEV) => {
                log::warn!("no device with serial {}, using first available", serial);
            }
            Err(status) => {
                log::error!("unable to open device {}: {}", serial, status);
                return Err(SdrError::Open { status });
            }
        }
    }

    match open(None) {
        Ok(dev) => {
            log::info!("opened first available device");
            Ok(dev)
        }
        Err(status) => {
            log::error!("unable to open device: {}", status);
            Err(SdrError::Open { status })
        }
    }
}
