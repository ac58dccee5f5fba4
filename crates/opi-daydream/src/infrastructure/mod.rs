//! Infrastructure layer for the Daydream binding.
//!
//! Contains everything that touches sockets or files.
//!
//! **Dependency rule**: this layer may depend on `application` and `opi_core`,
//! but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`session`** – `DeviceSession`, the OPI machine for a real headset.
//!   Owns the TCP connection and speaks the command/reply protocol over it.
//!
//! - **`config`** – TOML configuration (device address, timeouts,
//!   calibration, log level) and stimulus script loading.
//!
//! - **`simulator`** – A TCP server that plays the headset's side of the
//!   protocol, for integration tests and dry runs without hardware.

pub mod config;
pub mod session;
pub mod simulator;
