//! Domain entities for the OPI Daydream binding.
//!
//! Everything here is pure computation with no I/O, so it can be unit-tested
//! on any machine without a headset attached.

/// Grey level ↔ luminance calibration.
pub mod luminance;

/// Raw RGB images and the disc / cross synthesis.
pub mod image;

/// Degrees of visual angle → device pixel coordinates.
pub mod projection;

/// Stimulus request types and validation.
pub mod stimulus;

/// Turns a validated stimulus into the grey level, image and pixel position
/// the device needs.
pub mod presentation;
