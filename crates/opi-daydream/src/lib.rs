//! opi-daydream library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does opi-daydream do?
//!
//! It is the host side of one OPI (Open Perimetry Interface) binding: the
//! Daydream headset, a phone in a VR viewer that shows perimetry stimuli to
//! one eye at a time and reports whether the subject pressed the button.
//!
//! A typical session:
//!
//! 1. [`DeviceSession::initialise`] probes the headset, connects, and learns
//!    the screen geometry with `OPI_GET_RES`.
//! 2. [`DeviceSession::set_background`] fills an eye's background with a
//!    calibrated grey and optionally stamps a fixation cross on it.
//! 3. [`DeviceSession::present`] renders each stimulus as a disc image,
//!    uploads it, flashes it, and returns seen / reaction time.
//! 4. [`DeviceSession::close`] ends the session.
//!
//! [`DeviceSession::initialise`]: infrastructure::session::DeviceSession::initialise
//! [`DeviceSession::set_background`]: infrastructure::session::DeviceSession::set_background
//! [`DeviceSession::present`]: infrastructure::session::DeviceSession::present
//! [`DeviceSession::close`]: infrastructure::session::DeviceSession::close

/// Application layer: the OPI surface and use cases built on it.
pub mod application;

/// Infrastructure layer: socket session, configuration, simulated headset.
pub mod infrastructure;
