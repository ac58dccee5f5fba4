//! The OPI surface: what any perimeter binding offers to test procedures.
//!
//! OPI standardises five calls (initialise, present, set background, query
//! device, close).  Initialise is binding-specific (it needs addresses and
//! calibration) and lives on the concrete session type; the other four form
//! the [`OpiMachine`] trait so procedures can be written once and run against
//! the real headset, the simulated one, or a test double.

use std::time::Duration;

use async_trait::async_trait;
use opi_core::{
    DeviceFault, Eye, Fixation, PlanError, ProtocolError, Reply, Rgb, ScreenGeometry,
    Stimulus, StimulusError, StimulusKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by OPI calls.
///
/// Local validation failures are raised before any byte is sent.  Device
/// faults and unexpected replies mean the device answered but refused.
/// Transport failures (see [`OpiError::is_transport`]) mean the connection
/// itself can no longer be trusted.
#[derive(Debug, Error)]
pub enum OpiError {
    /// Nothing answered at the configured address within the probe timeout.
    #[error("cannot find a device at {addr}: {reason}")]
    Unreachable { addr: String, reason: String },

    /// A required stimulus field is missing.
    #[error(transparent)]
    Stimulus(#[from] StimulusError),

    /// Kinetic and temporal stimuli cannot be shown on this device.
    #[error("{0} stimuli are not supported by the daydream device")]
    Unsupported(StimulusKind),

    /// The stimulus or fixation cannot be drawn.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// `set_background` was called without a luminance.
    #[error("no luminance given for the background")]
    MissingLuminance,

    /// `set_background` was given a NaN or infinite luminance.
    #[error("background luminance must be finite, got {0}")]
    InvalidLuminance(f64),

    /// The device reported a fault code in a present reply.
    #[error(transparent)]
    Device(#[from] DeviceFault),

    /// The device answered a command with something other than expected.
    #[error("{command}: expected {expected}, device replied {got}")]
    UnexpectedReply {
        command: &'static str,
        expected: Reply,
        got: Reply,
    },

    /// A binary reply could not be decoded.
    #[error("malformed reply: {0}")]
    Protocol(#[from] ProtocolError),

    /// The device went quiet for longer than the operational timeout.
    #[error("timed out after {after:?} waiting for {operation}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// A reply line ran past the length limit without a newline.
    #[error("{operation}: reply longer than {limit} bytes")]
    ReplyTooLong {
        operation: &'static str,
        limit: usize,
    },

    /// The device closed its end of the socket mid-exchange.
    #[error("device closed the connection")]
    ConnectionClosed,

    /// The session was already closed by [`OpiMachine::close`].
    #[error("session already closed")]
    SessionClosed,

    /// Any other socket error.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OpiError {
    /// Whether the connection is unusable after this error.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            OpiError::Unreachable { .. }
                | OpiError::Timeout { .. }
                | OpiError::ReplyTooLong { .. }
                | OpiError::ConnectionClosed
                | OpiError::SessionClosed
                | OpiError::Io(_)
        )
    }
}

/// The subject's answer to one presentation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PresentResponse {
    pub seen: bool,
    /// Reaction time in milliseconds.
    pub time: f64,
}

/// Arguments of `set_background`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundRequest {
    /// Background luminance in cd/m².  Required.
    pub lum: Option<f64>,
    /// Accepted for OPI parity; the device only takes a grey level.
    pub color: Rgb,
    pub fixation: Fixation,
    /// Side of the fixation cross image in pixels.
    pub fixation_size: u32,
    pub fixation_color: Rgb,
    pub eye: Eye,
}

impl BackgroundRequest {
    /// A request with the default cross fixation.
    pub fn new(lum: f64, eye: Eye) -> Self {
        Self {
            lum: Some(lum),
            eye,
            ..Self::default()
        }
    }
}

impl Default for BackgroundRequest {
    fn default() -> Self {
        Self {
            lum: None,
            color: Rgb::grey(255),
            fixation: Fixation::Cross,
            fixation_size: 21,
            fixation_color: Rgb([0, 128, 0]),
            eye: Eye::Left,
        }
    }
}

/// Everything a session knows, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub session_id: Uuid,
    /// `ip:port` of the headset, when connected over TCP.
    pub address: Option<String>,
    pub connected: bool,
    pub byte_order: &'static str,
    pub io_timeout_secs: f64,
    pub lut: Vec<f64>,
    pub degrees_to_pixels: String,
    #[serde(flatten)]
    pub geometry: ScreenGeometry,
    pub background_left: Option<u8>,
    pub background_right: Option<u8>,
}

/// The OPI calls shared by every perimeter binding.
#[async_trait]
pub trait OpiMachine: Send {
    /// Shows `stim` and waits for the subject's response.
    ///
    /// `next` is the stimulus the procedure intends to show afterwards, for
    /// devices that can prepare ahead.
    async fn present(
        &mut self,
        stim: &Stimulus,
        next: Option<&Stimulus>,
    ) -> Result<PresentResponse, OpiError>;

    /// Sets an eye's background luminance and fixation mark.
    async fn set_background(&mut self, request: &BackgroundRequest) -> Result<(), OpiError>;

    /// Snapshot of the session state.
    fn query_device(&self) -> DeviceSnapshot;

    /// Ends the session.  Later calls fail with [`OpiError::SessionClosed`].
    async fn close(&mut self) -> Result<(), OpiError>;
}
