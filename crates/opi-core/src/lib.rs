//! # opi-core
//!
//! Shared library for the OPI Daydream binding containing the device wire
//! protocol, the luminance calibration table, the stimulus model, and the
//! image synthesis used to draw stimuli and fixation marks.
//!
//! It has zero dependencies on sockets or async runtimes; the
//! `opi-daydream` crate owns the connection and drives the protocol.
//!
//! # Architecture overview
//!
//! The headset is a phone in a VR viewer running a small server.  A host
//! process talks to it over TCP using line-oriented ASCII commands mixed
//! with little-endian binary payloads.  Stimuli are not drawn by the device
//! from parameters: the host renders each stimulus into an RGB image, uploads
//! it, and then asks the device to flash it at a pixel position.
//!
//! - **`protocol`** – The command lines the host sends and the decoders for
//!   the fixed-size binary replies the device sends back.
//!
//! - **`domain`** – Pure logic: the 256-entry grey-level → cd/m² lookup
//!   table, the stimulus request types, the degrees → pixels projection, and
//!   the disc / cross image synthesis.

pub mod domain;
pub mod protocol;

pub use domain::image::{ImageError, Rgb, RgbImage};
pub use domain::luminance::{LuminanceTable, LutError, LUT_SIZE};
pub use domain::presentation::{FixationPlan, PlanError, StimulusPlan};
pub use domain::projection::{DegreesToPixels, LinearProjection, PixelPoint};
pub use domain::stimulus::{
    Eye, Fixation, KineticStimulus, StaticStimulus, Stimulus, StimulusError, StimulusKind,
    TemporalStimulus, ValidStatic,
};
pub use protocol::codec::{DeviceFault, PresentReply, ProtocolError, Reply, ScreenGeometry};
pub use protocol::commands::DeviceCommand;
