//! Decoders for what the headset sends back.
//!
//! Replies come in two shapes:
//!
//! - a text line (`OK`, `READY`, or anything else on failure), and
//! - fixed-size little-endian binary records:
//!
//! ```text
//! OPI_GET_RES      → [width:i32][height:i32][eye_width:i32][eye_height:i32][filler:1]   17 bytes
//! OPI_MONO_PRESENT → [seen:u8][time:f32][filler:1]                                        6 bytes
//! ```
//!
//! The trailing filler byte is the device's line terminator; it is consumed
//! and ignored.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size of the `OPI_GET_RES` reply in bytes.
pub const GET_RES_REPLY_LEN: usize = 17;

/// Size of the `OPI_MONO_PRESENT` reply in bytes.
pub const PRESENT_REPLY_LEN: usize = 6;

/// Errors decoding a binary reply.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// Fewer bytes than the record needs.
    #[error("insufficient data: need {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// A screen dimension came back negative.
    #[error("device reported negative {field}: {value}")]
    NegativeDimension { field: &'static str, value: i32 },
}

// ── Text replies ──────────────────────────────────────────────────────────────

/// A one-line text reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Ready,
    /// Anything else, with the line terminator stripped.
    Other(String),
}

impl Reply {
    /// Classifies a raw line as read from the socket.
    pub fn parse(line: &str) -> Self {
        match line.trim_end_matches(['\r', '\n']) {
            "OK" => Reply::Ok,
            "READY" => Reply::Ready,
            other => Reply::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => f.write_str("OK"),
            Reply::Ready => f.write_str("READY"),
            Reply::Other(s) => write!(f, "{s:?}"),
        }
    }
}

// ── Screen geometry ───────────────────────────────────────────────────────────

/// Resolutions reported by `OPI_GET_RES`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScreenGeometry {
    /// Full phone screen, both eyes side by side.
    pub width: u32,
    pub height: u32,
    /// One eye's half of the screen.
    pub eye_width: u32,
    pub eye_height: u32,
}

impl ScreenGeometry {
    /// Decodes the 17-byte `OPI_GET_RES` reply.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InsufficientData`] for short input and
    /// [`ProtocolError::NegativeDimension`] for a negative value.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        require_len(bytes, GET_RES_REPLY_LEN)?;
        Ok(Self {
            width: read_dimension(bytes, 0, "width")?,
            height: read_dimension(bytes, 4, "height")?,
            eye_width: read_dimension(bytes, 8, "eye width")?,
            eye_height: read_dimension(bytes, 12, "eye height")?,
        })
    }

    /// Device-side encoding, used by the simulated headset.
    pub fn encode(&self) -> [u8; GET_RES_REPLY_LEN] {
        let mut buf = [0u8; GET_RES_REPLY_LEN];
        for (i, v) in [self.width, self.height, self.eye_width, self.eye_height]
            .into_iter()
            .enumerate()
        {
            let v = i32::try_from(v).unwrap_or(i32::MAX);
            buf[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
        buf[GET_RES_REPLY_LEN - 1] = b'\n';
        buf
    }
}

// ── Present reply ─────────────────────────────────────────────────────────────

/// Failure codes the device reports through the time field of a not-seen
/// present reply.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DeviceFault {
    #[error("Background image not set")]
    BackgroundNotSet,
    #[error("Trouble with stim image")]
    StimImage,
    #[error("Location out of range for daydream")]
    LocationOutOfRange,
    #[error("Trouble with OPI_MONO_PRESENT")]
    PresentFailed,
}

impl DeviceFault {
    /// Maps a not-seen time value to its fault, if it is one of the codes.
    pub fn from_code(time: f32) -> Option<Self> {
        // Codes are small integers sent as f32, so exact equality is safe.
        match time {
            t if t == 0.0 => Some(DeviceFault::BackgroundNotSet),
            t if t == 1.0 => Some(DeviceFault::StimImage),
            t if t == 2.0 => Some(DeviceFault::LocationOutOfRange),
            t if t == 3.0 => Some(DeviceFault::PresentFailed),
            _ => None,
        }
    }

    pub fn code(self) -> f32 {
        match self {
            DeviceFault::BackgroundNotSet => 0.0,
            DeviceFault::StimImage => 1.0,
            DeviceFault::LocationOutOfRange => 2.0,
            DeviceFault::PresentFailed => 3.0,
        }
    }
}

/// The 6-byte `OPI_MONO_PRESENT` reply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresentReply {
    /// Non-zero when the subject responded.
    pub seen: u8,
    /// Reaction time in ms when seen; a fault code or time otherwise.
    pub time: f32,
}

impl PresentReply {
    /// Decodes the reply record.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InsufficientData`] for short input.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        require_len(bytes, PRESENT_REPLY_LEN)?;
        Ok(Self {
            seen: bytes[0],
            time: f32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
        })
    }

    /// Device-side encoding, used by the simulated headset.
    pub fn encode(&self) -> [u8; PRESENT_REPLY_LEN] {
        let mut buf = [0u8; PRESENT_REPLY_LEN];
        buf[0] = self.seen;
        buf[1..5].copy_from_slice(&self.time.to_le_bytes());
        buf[5] = b'\n';
        buf
    }

    /// Interprets the reply as `(seen, time_ms)` or a device fault.
    ///
    /// # Errors
    ///
    /// Returns the [`DeviceFault`] when the stimulus was not seen and the
    /// time field holds one of the codes 0–3.
    pub fn outcome(self) -> Result<(bool, f64), DeviceFault> {
        if self.seen == 0 {
            if let Some(fault) = DeviceFault::from_code(self.time) {
                return Err(fault);
            }
        }
        Ok((self.seen != 0, f64::from(self.time)))
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn require_len(bytes: &[u8], needed: usize) -> Result<(), ProtocolError> {
    if bytes.len() < needed {
        return Err(ProtocolError::InsufficientData {
            needed,
            available: bytes.len(),
        });
    }
    Ok(())
}

fn read_dimension(bytes: &[u8], offset: usize, field: &'static str) -> Result<u32, ProtocolError> {
    let value = i32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ]);
    u32::try_from(value).map_err(|_| ProtocolError::NegativeDimension { field, value })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
