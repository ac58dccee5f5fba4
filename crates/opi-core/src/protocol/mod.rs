//! Device wire protocol: command lines and binary reply decoding.

pub mod codec;
pub mod commands;

pub use codec::{DeviceFault, PresentReply, ProtocolError, Reply, ScreenGeometry};
pub use commands::DeviceCommand;
