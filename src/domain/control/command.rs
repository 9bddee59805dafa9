//! PTZ and iris/focus command frames
//!
//! A command is eight bytes:
//!
//! | byte | meaning                                   |
//! |------|-------------------------------------------|
//! | 0-2  | fixed header `A5 0F 01`                   |
//! | 3    | direction bitmask                         |
//! | 4    | pan speed (PTZ) / focus speed (FI)        |
//! | 5    | tilt speed (PTZ) / iris speed (FI)        |
//! | 6    | zoom speed in the high nibble (PTZ only)  |
//! | 7    | checksum: sum of bytes 0-6 mod 256        |
//!
//! The checksum is never stored; it is computed whenever the frame is
//! rendered, so rendering the same command twice always yields the same text.

use crate::domain::shared::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of an encoded command frame
pub const FRAME_LEN: usize = 8;

const HEADER: [u8; 3] = [0xA5, 0x0F, 0x01];

const MASK: usize = 3;
const SPEED_PAN: usize = 4;
const SPEED_TILT: usize = 5;
const SPEED_ZOOM: usize = 6;
const CHECKSUM: usize = 7;

// PTZ bitmask positions
pub const PTZ_ZOOM_OUT: u8 = 5;
pub const PTZ_ZOOM_IN: u8 = 4;
pub const PTZ_UP: u8 = 3;
pub const PTZ_DOWN: u8 = 2;
pub const PTZ_LEFT: u8 = 1;
pub const PTZ_RIGHT: u8 = 0;

// Iris/focus bitmask positions
pub const FI_MARKER: u8 = 6;
pub const FI_IRIS_REDUCE: u8 = 3;
pub const FI_IRIS_EXPAND: u8 = 2;
pub const FI_FOCUS_NEAR: u8 = 1;
pub const FI_FOCUS_AWAY: u8 = 0;

/// Highest zoom speed; it has to fit in a nibble
pub const MAX_ZOOM_SPEED: u8 = 15;

/// Pan or tilt motion. Left/down is -1, right/up is 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtzRotateParam {
    pub direction: i8,
    pub speed: u8,
}

/// Zoom motion. -1 zooms in, 1 zooms out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtzZoomParam {
    pub direction: i8,
    pub speed: u8,
}

/// A pan/tilt/zoom request. Absent axes are left at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtzConfig {
    pub zoom: Option<PtzZoomParam>,
    pub horizontal: Option<PtzRotateParam>,
    pub vertical: Option<PtzRotateParam>,
}

/// Iris motion. 1 opens the iris, -1 closes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiIrisParam {
    pub direction: i8,
    pub speed: u8,
}

/// Focus motion. -1 focuses near, 1 focuses away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiFocusParam {
    pub direction: i8,
    pub speed: u8,
}

/// An iris/focus request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiConfig {
    pub iris: Option<FiIrisParam>,
    pub focus: Option<FiFocusParam>,
}

fn check_direction(axis: &str, direction: i8) -> Result<()> {
    if (-1..=1).contains(&direction) {
        Ok(())
    } else {
        Err(DomainError::ValidationError(format!(
            "{} direction must be one of -1, 0, 1 (got {})",
            axis, direction
        )))
    }
}

/// Picks the bit for a -1/0/1 direction
fn direction_bit(direction: i8, negative: u8, positive: u8) -> u8 {
    match direction {
        -1 => 1 << negative,
        1 => 1 << positive,
        _ => 0,
    }
}

/// An eight byte device-control command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    frame: [u8; FRAME_LEN],
}

impl Command {
    fn new() -> Self {
        let mut frame = [0u8; FRAME_LEN];
        frame[..HEADER.len()].copy_from_slice(&HEADER);
        Self { frame }
    }

    /// Build a pan/tilt/zoom command
    pub fn ptz(config: &PtzConfig) -> Result<Self> {
        let mut cmd = Self::new();

        if let Some(zoom) = config.zoom {
            check_direction("zoom", zoom.direction)?;
            if zoom.speed > MAX_ZOOM_SPEED {
                return Err(DomainError::ValidationError(format!(
                    "zoom speed must be within [0, {}] (got {})",
                    MAX_ZOOM_SPEED, zoom.speed
                )));
            }
            cmd.frame[MASK] |= direction_bit(zoom.direction, PTZ_ZOOM_IN, PTZ_ZOOM_OUT);
            cmd.frame[SPEED_ZOOM] = zoom.speed << 4;
        }

        if let Some(horizontal) = config.horizontal {
            check_direction("horizontal", horizontal.direction)?;
            cmd.frame[MASK] |= direction_bit(horizontal.direction, PTZ_LEFT, PTZ_RIGHT);
            cmd.frame[SPEED_PAN] = horizontal.speed;
        }

        if let Some(vertical) = config.vertical {
            check_direction("vertical", vertical.direction)?;
            cmd.frame[MASK] |= direction_bit(vertical.direction, PTZ_DOWN, PTZ_UP);
            cmd.frame[SPEED_TILT] = vertical.speed;
        }

        Ok(cmd)
    }

    /// Build an iris/focus command
    pub fn fi(config: &FiConfig) -> Result<Self> {
        let mut cmd = Self::new();
        cmd.frame[MASK] |= 1 << FI_MARKER;

        if let Some(iris) = config.iris {
            check_direction("iris", iris.direction)?;
            cmd.frame[MASK] |= direction_bit(iris.direction, FI_IRIS_REDUCE, FI_IRIS_EXPAND);
            cmd.frame[SPEED_TILT] = iris.speed;
        }

        if let Some(focus) = config.focus {
            check_direction("focus", focus.direction)?;
            cmd.frame[MASK] |= direction_bit(focus.direction, FI_FOCUS_NEAR, FI_FOCUS_AWAY);
            cmd.frame[SPEED_PAN] = focus.speed;
        }

        Ok(cmd)
    }

    /// A stop command: header only, every motion bit cleared
    pub fn stop() -> Self {
        Self::new()
    }

    /// Frame bytes without the checksum filled in
    pub fn raw(&self) -> [u8; FRAME_LEN] {
        self.frame
    }

    /// Sum of the first seven bytes, mod 256
    pub fn checksum(&self) -> u8 {
        self.frame[..CHECKSUM]
            .iter()
            .fold(0u8, |acc, b| acc.wrapping_add(*b))
    }

    /// Frame bytes with the checksum in the last slot
    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let mut bytes = self.frame;
        bytes[CHECKSUM] = self.checksum();
        bytes
    }

    /// Whether this is an iris/focus command rather than PTZ
    pub fn is_fi(&self) -> bool {
        self.frame[MASK] & (1 << FI_MARKER) != 0
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.to_bytes()))
    }
}
