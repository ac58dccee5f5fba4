//! Degrees of visual angle → device pixel coordinates.
//!
//! Perimetry positions and sizes are expressed in degrees from fixation.
//! How a degree maps to headset pixels depends on the lens and phone model,
//! so the mapping is supplied by the caller.  Any closure
//! `Fn(f64, f64) -> (f64, f64)` works; [`LinearProjection`] covers the common
//! constant pixels-per-degree case.

use serde::{Deserialize, Serialize};

/// A rounded pixel coordinate as sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    /// Rounds a fractional projection result to the nearest pixel.
    ///
    /// `None` when either coordinate is not finite or falls outside `i32`.
    pub fn round(x: f64, y: f64) -> Option<Self> {
        Some(Self {
            x: round_axis(x)?,
            y: round_axis(y)?,
        })
    }
}

fn round_axis(v: f64) -> Option<i32> {
    let v = v.round();
    (v.is_finite() && v >= f64::from(i32::MIN) && v <= f64::from(i32::MAX)).then_some(v as i32)
}

/// Maps a point in degrees to a point in device pixels.
#[cfg_attr(test, mockall::automock)]
pub trait DegreesToPixels: Send + Sync {
    /// Projects `(x, y)` degrees to fractional `(x, y)` pixels.
    fn to_pixels(&self, x: f64, y: f64) -> (f64, f64);

    /// Short description reported by device snapshots.
    fn describe(&self) -> String {
        "custom".to_string()
    }
}

impl<F> DegreesToPixels for F
where
    F: Fn(f64, f64) -> (f64, f64) + Send + Sync,
{
    fn to_pixels(&self, x: f64, y: f64) -> (f64, f64) {
        self(x, y)
    }
}

/// Constant pixels-per-degree scaling on each axis, origin at the eye centre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearProjection {
    pub pixels_per_degree_x: f64,
    pub pixels_per_degree_y: f64,
}

impl LinearProjection {
    pub fn new(pixels_per_degree_x: f64, pixels_per_degree_y: f64) -> Self {
        Self {
            pixels_per_degree_x,
            pixels_per_degree_y,
        }
    }
}

impl Default for LinearProjection {
    fn default() -> Self {
        Self::new(20.0, 20.0)
    }
}

impl DegreesToPixels for LinearProjection {
    fn to_pixels(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.pixels_per_degree_x, y * self.pixels_per_degree_y)
    }

    fn describe(&self) -> String {
        format!(
            "linear {} x {} px/deg",
            self.pixels_per_degree_x, self.pixels_per_degree_y
        )
    }
}
