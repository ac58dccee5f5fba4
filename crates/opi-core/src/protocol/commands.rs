//! Commands the host sends to the headset.
//!
//! Every command is one ASCII line: a keyword followed by space-separated
//! arguments and a single `\n`.
//!
//! ```text
//! OPI_GET_RES
//! OPI_IMAGE <width> <height>
//! OPI_MONO_PRESENT <eye> <x> <y> <duration_ms> <response_window_ms>
//! OPI_MONO_SET_BG <eye> <grey>
//! OPI_MONO_BG_ADD <eye> <x> <y>
//! OPI_CLOSE
//! ```

use std::fmt;

use crate::domain::projection::PixelPoint;
use crate::domain::stimulus::Eye;

/// One command line.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    /// Ask for the full-screen and per-eye resolutions.
    GetResolution,
    /// Announce an image upload of `width × height` pixels.
    Image { width: u32, height: u32 },
    /// Flash the last uploaded image at `at` and wait for a response.
    MonoPresent {
        eye: Eye,
        at: PixelPoint,
        duration: f64,
        response_window: f64,
    },
    /// Fill an eye's background with a grey level.
    MonoSetBackground { eye: Eye, grey: u8 },
    /// Stamp the last uploaded image onto an eye's background at `at`.
    MonoBackgroundAdd { eye: Eye, at: PixelPoint },
    /// End the session.
    Close,
}

impl DeviceCommand {
    /// The command keyword, e.g. `OPI_IMAGE`.
    pub fn keyword(&self) -> &'static str {
        match self {
            DeviceCommand::GetResolution => "OPI_GET_RES",
            DeviceCommand::Image { .. } => "OPI_IMAGE",
            DeviceCommand::MonoPresent { .. } => "OPI_MONO_PRESENT",
            DeviceCommand::MonoSetBackground { .. } => "OPI_MONO_SET_BG",
            DeviceCommand::MonoBackgroundAdd { .. } => "OPI_MONO_BG_ADD",
            DeviceCommand::Close => "OPI_CLOSE",
        }
    }

    /// The full line including the trailing `\n`.
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for DeviceCommand {
    /// Renders the line without its terminator.  `f64` arguments use Rust's
    /// shortest round-trip form, so `200.0` goes out as `200`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = self.keyword();
        match self {
            DeviceCommand::GetResolution | DeviceCommand::Close => f.write_str(keyword),
            DeviceCommand::Image { width, height } => write!(f, "{keyword} {width} {height}"),
            DeviceCommand::MonoPresent {
                eye,
                at,
                duration,
                response_window,
            } => write!(
                f,
                "{keyword} {eye} {} {} {duration} {response_window}",
                at.x, at.y
            ),
            DeviceCommand::MonoSetBackground { eye, grey } => write!(f, "{keyword} {eye} {grey}"),
            DeviceCommand::MonoBackgroundAdd { eye, at } => {
                write!(f, "{keyword} {eye} {} {}", at.x, at.y)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_resolution_line() {
        assert_eq!(DeviceCommand::GetResolution.to_line(), "OPI_GET_RES\n");
    }

    #[test]
    fn test_image_line_carries_dimensions() {
        let cmd = DeviceCommand::Image {
            width: 24,
            height: 16,
        };
        assert_eq!(cmd.to_line(), "OPI_IMAGE 24 16\n");
    }

    #[test]
    fn test_present_line_renders_whole_milliseconds_without_decimals() {
        // Arrange
        let cmd = DeviceCommand::MonoPresent {
            eye: Eye::Left,
            at: PixelPoint { x: -60, y: 60 },
            duration: 200.0,
            response_window: 1500.0,
        };

        // Act / Assert
        assert_eq!(cmd.to_string(), "OPI_MONO_PRESENT L -60 60 200 1500");
    }

    #[test]
    fn test_present_line_keeps_fractional_milliseconds() {
        let cmd = DeviceCommand::MonoPresent {
            eye: Eye::Right,
            at: PixelPoint { x: 0, y: 0 },
            duration: 16.5,
            response_window: 1000.0,
        };
        assert_eq!(cmd.to_string(), "OPI_MONO_PRESENT R 0 0 16.5 1000");
    }

    #[test]
    fn test_background_lines() {
        let set = DeviceCommand::MonoSetBackground {
            eye: Eye::Right,
            grey: 32,
        };
        let add = DeviceCommand::MonoBackgroundAdd {
            eye: Eye::Left,
            at: PixelPoint { x: 640, y: 360 },
        };
        assert_eq!(set.to_line(), "OPI_MONO_SET_BG R 32\n");
        assert_eq!(add.to_line(), "OPI_MONO_BG_ADD L 640 360\n");
    }

    #[test]
    fn test_close_line() {
        assert_eq!(DeviceCommand::Close.to_line(), "OPI_CLOSE\n");
        assert_eq!(DeviceCommand::Close.keyword(), "OPI_CLOSE");
    }
}
