//! Rendering plans: everything the device needs for one present or one
//! fixation mark, computed before any byte goes on the wire.

use thiserror::Error;
use tracing::trace;

use crate::domain::image::{ImageError, Rgb, RgbImage};
use crate::domain::luminance::LuminanceTable;
use crate::domain::projection::{DegreesToPixels, PixelPoint};
use crate::domain::stimulus::{Eye, ValidStatic};

/// Largest stimulus radius, in pixels, that will be rendered.
pub const MAX_RADIUS_PX: u32 = 2048;

/// Largest fixation mark side, in pixels.
pub const MAX_FIXATION_PX: u32 = 512;

/// Reasons a stimulus cannot be rendered.
#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    /// The size projects to less than one pixel of radius.
    #[error("stimulus size {size} deg projects to a radius of {radius_px} px; nothing to draw")]
    TooSmall { size: f64, radius_px: f64 },

    /// The size projects to a radius above [`MAX_RADIUS_PX`].
    #[error("stimulus size {size} deg projects to a radius of {radius_px} px (max {MAX_RADIUS_PX})")]
    TooLarge { size: f64, radius_px: f64 },

    /// A fixation mark of zero pixels was requested.
    #[error("fixation size must be at least one pixel")]
    EmptyFixation,

    /// A fixation mark above [`MAX_FIXATION_PX`] was requested.
    #[error("fixation size {size} px exceeds {MAX_FIXATION_PX} px")]
    FixationTooLarge { size: u32 },

    /// The projection mapped a point to no representable pixel.
    #[error("({x}, {y}) deg projects to ({px}, {py}) px, which is not a screen position")]
    OffScreen { x: f64, y: f64, px: f64, py: f64 },

    #[error(transparent)]
    Image(#[from] ImageError),
}

/// A static stimulus resolved to device units.
#[derive(Debug, Clone, PartialEq)]
pub struct StimulusPlan {
    pub eye: Eye,
    /// Grey level drawn inside the disc.
    pub grey: u8,
    pub radius_px: u32,
    /// Where the device centres the image, in eye-screen pixels.
    pub centre: PixelPoint,
    pub image: RgbImage,
    pub duration: f64,
    pub response_window: f64,
}

impl StimulusPlan {
    /// Resolves `stim` against the calibration and projection.
    ///
    /// The disc is drawn at the luminance's grey level on a square of the
    /// eye's current `background` grey.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::TooSmall`] / [`PlanError::TooLarge`] when the
    /// projected radius is out of the drawable range (NaN counts as too
    /// small), and [`PlanError::OffScreen`] when the centre projects to a
    /// non-finite or out-of-range pixel.
    pub fn for_static(
        stim: &ValidStatic,
        lut: &LuminanceTable,
        projection: &dyn DegreesToPixels,
        background: u8,
    ) -> Result<Self, PlanError> {
        let grey = lut.find_pixel_value(stim.level);

        let (radius_x, _) = projection.to_pixels(stim.size / 2.0, 0.0);
        let radius = radius_x.abs().round();
        if radius.is_nan() || radius < 1.0 {
            return Err(PlanError::TooSmall {
                size: stim.size,
                radius_px: radius_x,
            });
        }
        if radius > f64::from(MAX_RADIUS_PX) {
            return Err(PlanError::TooLarge {
                size: stim.size,
                radius_px: radius_x,
            });
        }
        let radius_px = radius as u32;

        let (cx, cy) = projection.to_pixels(stim.x, stim.y);
        let centre = PixelPoint::round(cx, cy).ok_or(PlanError::OffScreen {
            x: stim.x,
            y: stim.y,
            px: cx,
            py: cy,
        })?;
        trace!(
            "({}, {}) deg -> ({}, {}) px, size {} deg -> radius {radius_px} px",
            stim.x, stim.y, centre.x, centre.y, stim.size
        );

        Ok(Self {
            eye: stim.eye,
            grey,
            radius_px,
            centre,
            image: RgbImage::disc(radius_px, Rgb::grey(grey), Rgb::grey(background))?,
            duration: stim.duration,
            response_window: stim.response_window,
        })
    }
}

/// A cross-shaped fixation mark resolved to device units.
#[derive(Debug, Clone, PartialEq)]
pub struct FixationPlan {
    pub image: RgbImage,
    /// The fixation sits at the projection of `(0°, 0°)`.
    pub centre: PixelPoint,
}

impl FixationPlan {
    /// A `size × size` cross in `colour` on the eye's `background` grey.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::EmptyFixation`] when `size` is zero,
    /// [`PlanError::FixationTooLarge`] above [`MAX_FIXATION_PX`], and
    /// [`PlanError::OffScreen`] when the origin does not project to a pixel.
    pub fn cross(
        size: u32,
        colour: Rgb,
        background: u8,
        projection: &dyn DegreesToPixels,
    ) -> Result<Self, PlanError> {
        if size == 0 {
            return Err(PlanError::EmptyFixation);
        }
        if size > MAX_FIXATION_PX {
            return Err(PlanError::FixationTooLarge { size });
        }
        let (cx, cy) = projection.to_pixels(0.0, 0.0);
        let centre = PixelPoint::round(cx, cy).ok_or(PlanError::OffScreen {
            x: 0.0,
            y: 0.0,
            px: cx,
            py: cy,
        })?;
        Ok(Self {
            image: RgbImage::cross(size, colour, Rgb::grey(background))?,
            centre,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::projection::{LinearProjection, MockDegreesToPixels};
    use crate::domain::stimulus::StaticStimulus;
    use mockall::predicate::eq;

    fn stim(size: f64) -> ValidStatic {
        StaticStimulus::new(Eye::Right, 3.0, -3.0, size, 100.0, 200.0, 1500.0)
            .validate()
            .expect("complete")
    }

    #[test]
    fn test_plan_projects_half_size_for_radius_and_position_for_centre() {
        // Arrange
        let mut projection = MockDegreesToPixels::new();
        projection
            .expect_to_pixels()
            .with(eq(0.5), eq(0.0))
            .times(1)
            .returning(|_, _| (6.4, 0.0));
        projection
            .expect_to_pixels()
            .with(eq(3.0), eq(-3.0))
            .times(1)
            .returning(|_, _| (60.4, -59.6));
        let lut = LuminanceTable::linear(0.0, 255.0);

        // Act
        let plan = StimulusPlan::for_static(&stim(1.0), &lut, &projection, 10).expect("plan");

        // Assert
        assert_eq!(plan.radius_px, 6);
        assert_eq!(plan.centre, PixelPoint { x: 60, y: -60 });
        assert_eq!((plan.image.width(), plan.image.height()), (12, 12));
    }

    #[test]
    fn test_plan_draws_disc_at_grey_level_on_background() {
        // Arrange
        let lut = LuminanceTable::linear(0.0, 255.0);
        let projection = LinearProjection::new(20.0, 20.0);

        // Act
        let plan = StimulusPlan::for_static(&stim(1.0), &lut, &projection, 7).expect("plan");

        // Assert
        assert_eq!(plan.grey, 100);
        assert_eq!(plan.image.pixel(10, 10), Rgb::grey(100));
        assert_eq!(plan.image.pixel(0, 0), Rgb::grey(7));
        assert_eq!(plan.eye, Eye::Right);
    }

    #[test]
    fn test_plan_rejects_sub_pixel_radius() {
        let lut = LuminanceTable::default();
        let projection = LinearProjection::new(1.0, 1.0);

        let result = StimulusPlan::for_static(&stim(0.5), &lut, &projection, 0);

        assert!(matches!(result, Err(PlanError::TooSmall { .. })));
    }

    #[test]
    fn test_plan_rejects_oversized_radius() {
        let lut = LuminanceTable::default();
        let projection = LinearProjection::new(1000.0, 1000.0);

        let result = StimulusPlan::for_static(&stim(90.0), &lut, &projection, 0);

        assert!(matches!(result, Err(PlanError::TooLarge { .. })));
    }

    #[test]
    fn test_plan_uses_absolute_radius_for_mirrored_projection() {
        let lut = LuminanceTable::default();
        let mirrored = |x: f64, y: f64| (-x * 10.0, y * 10.0);

        let plan = StimulusPlan::for_static(&stim(1.0), &lut, &mirrored, 0).expect("plan");

        assert_eq!(plan.radius_px, 5);
        assert_eq!(plan.centre, PixelPoint { x: -30, y: -30 });
    }

    #[test]
    fn test_fixation_cross_is_centred_on_projected_origin() {
        // Arrange
        let mut projection = MockDegreesToPixels::new();
        projection
            .expect_to_pixels()
            .with(eq(0.0), eq(0.0))
            .returning(|_, _| (640.0, 360.0));

        // Act
        let plan = FixationPlan::cross(11, Rgb([0, 128, 0]), 30, &projection).expect("plan");

        // Assert
        assert_eq!(plan.centre, PixelPoint { x: 640, y: 360 });
        assert_eq!(plan.image.pixel(5, 0), Rgb([0, 128, 0]));
        assert_eq!(plan.image.pixel(0, 0), Rgb::grey(30));
    }

    #[test]
    fn test_fixation_of_zero_pixels_is_rejected() {
        let result = FixationPlan::cross(0, Rgb::grey(0), 0, &LinearProjection::default());
        assert_eq!(result, Err(PlanError::EmptyFixation));
    }

    #[test]
    fn test_plan_treats_nan_radius_as_too_small() {
        // Arrange: a projection that loses the size entirely
        let lut = LuminanceTable::default();
        let broken = |_: f64, _: f64| (f64::NAN, f64::NAN);

        // Act
        let result = StimulusPlan::for_static(&stim(1.0), &lut, &broken, 0);

        // Assert
        assert!(matches!(result, Err(PlanError::TooSmall { .. })));
    }

    #[test]
    fn test_plan_rejects_centre_outside_pixel_range() {
        // Arrange: the radius projects fine, the centre does not
        let mut projection = MockDegreesToPixels::new();
        projection
            .expect_to_pixels()
            .with(eq(0.5), eq(0.0))
            .returning(|_, _| (10.0, 0.0));
        projection
            .expect_to_pixels()
            .with(eq(3.0), eq(-3.0))
            .returning(|_, _| (f64::INFINITY, 0.0));
        let lut = LuminanceTable::default();

        // Act
        let result = StimulusPlan::for_static(&stim(1.0), &lut, &projection, 0);

        // Assert
        assert!(matches!(result, Err(PlanError::OffScreen { x, y, .. }) if x == 3.0 && y == -3.0));
    }

    #[test]
    fn test_fixation_above_limit_is_rejected_before_drawing() {
        // Arrange: the projection must not even be consulted
        let mut projection = MockDegreesToPixels::new();
        projection.expect_to_pixels().never();

        // Act
        let result = FixationPlan::cross(u32::MAX, Rgb::grey(0), 0, &projection);

        // Assert
        assert_eq!(result, Err(PlanError::FixationTooLarge { size: u32::MAX }));
        assert!(
            FixationPlan::cross(MAX_FIXATION_PX, Rgb::grey(0), 0, &LinearProjection::default())
                .is_ok()
        );
    }
}
