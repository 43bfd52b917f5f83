// Copyright 2025-2026 CEMAXECUTER LLC

use std::fmt;

/// Raw libbladeRF status code. Zero is success, negatives are `BLADERF_ERR_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub i32);

impl Status {
    pub const UNEXPECTED: Status = Status(-1);
    pub const RANGE: Status = Status(-2);
    pub const INVAL: Status = Status(-3);
    pub const MEM: Status = Status(-4);
    pub const IO: Status = Status(-5);
    pub const TIMEOUT: Status = Status(-6);
    pub const NODEV: Status = Status(-7);
    pub const UNSUPPORTED: Status = Status(-8);
    pub const MISALIGNED: Status = Status(-9);
    pub const CHECKSUM: Status = Status(-10);
    pub const NO_FILE: Status = Status(-11);
    pub const UPDATE_FPGA: Status = Status(-12);
    pub const UPDATE_FW: Status = Status(-13);
    pub const TIME_PAST: Status = Status(-14);
    pub const QUEUE_FULL: Status = Status(-15);
    pub const FPGA_OP: Status = Status(-16);
    pub const PERMISSION: Status = Status(-17);
    pub const WOULD_BLOCK: Status = Status(-18);
    pub const NOT_INIT: Status = Status(-19);

    /// Map a C return value to `Ok(())` / `Err(Status)`.
    pub fn check(code: i32) -> Result<(), Status> {
        if code == 0 {
            Ok(())
        } else {
            Err(Status(code))
        }
    }

    pub fn code(&self) -> i32 {
        self.0
    }

    /// Same wording as `bladerf_strerror()`.
    pub fn message(&self) -> &'static str {
        match *self {
            Status::UNEXPECTED => "An unexpected error occurred",
            Status::RANGE => "Provided parameter was out of the allowable range",
            Status::INVAL => "Invalid operation or parameter",
            Status::MEM => "A memory allocation error occurred",
            Status::IO => "File or device I/O failure",
            Status::TIMEOUT => "Operation timed out",
            Status::NODEV => "No devices available",
            Status::UNSUPPORTED => "Operation not supported",
            Status::MISALIGNED => "Misaligned flash access",
            Status::CHECKSUM => "Invalid checksum",
            Status::NO_FILE => "File not found",
            Status::UPDATE_FPGA => "An FPGA update is required",
            Status::UPDATE_FW => "A firmware update is required",
            Status::TIME_PAST => "Requested timestamp is in the past",
            Status::QUEUE_FULL => "Could not enqueue data into full queue",
            Status::FPGA_OP => "An FPGA operation reported a failure",
            Status::PERMISSION => "Insufficient permissions for the requested operation",
            Status::WOULD_BLOCK => {
                "The operation would block, but has been requested to be non-blocking"
            }
            Status::NOT_INIT => "Device insufficiently initialized for operation",
            _ => "Unknown error code",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.0)
    }
}
