//! Stream SSRC identifiers
//!
//! Ten decimal digits: a real-time/playback flag, five characters taken from
//! the device ID (positions 3..8, the area code portion), then a zero-padded
//! four digit stream number.

use crate::domain::shared::{DomainError, Result};
use std::fmt;

pub const MIN_STREAM_ID: u16 = 1;
pub const MAX_STREAM_ID: u16 = 9999;

const DEVICE_SLICE: std::ops::Range<usize> = 3..8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ssrc {
    device_id: String,
    stream_id: u16,
    real_time: bool,
}

impl Ssrc {
    /// Validate and build an SSRC. Fails before anything touches the network
    /// when the stream number is outside [1, 9999] or the device ID is too
    /// short to slice.
    pub fn new(real_time: bool, device_id: &str, stream_id: u16) -> Result<Self> {
        if !(MIN_STREAM_ID..=MAX_STREAM_ID).contains(&stream_id) {
            return Err(DomainError::ValidationError(format!(
                "stream id must be within [{}, {}] (got {})",
                MIN_STREAM_ID, MAX_STREAM_ID, stream_id
            )));
        }

        if device_id.get(DEVICE_SLICE).is_none() {
            return Err(DomainError::ValidationError(format!(
                "device id {:?} is too short for an SSRC",
                device_id
            )));
        }

        Ok(Self {
            device_id: device_id.to_string(),
            stream_id,
            real_time,
        })
    }

    /// Numeric form, as carried in RTP headers. `None` if the device ID slice
    /// is not all digits.
    pub fn value(&self) -> Option<u32> {
        self.to_string().parse().ok()
    }
}

impl fmt::Display for Ssrc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = if self.real_time { '0' } else { '1' };
        // Slice bounds were checked in `new`
        let area = self.device_id.get(DEVICE_SLICE).unwrap_or_default();
        write!(f, "{}{}{:04}", flag, area, self.stream_id)
    }
}
