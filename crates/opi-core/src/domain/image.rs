//! Raw RGB images as the device consumes them.
//!
//! The device accepts images as an uncompressed stream of 8-bit `R, G, B`
//! triples, row-major, left to right, top to bottom.  [`RgbImage`] stores
//! exactly that byte layout so the upload is a single slice write.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bytes per pixel on the wire.
pub const BYTES_PER_PIXEL: usize = 3;

/// Longest side, in pixels, of any image built here.
pub const MAX_IMAGE_SIDE: u32 = 4096;

/// Errors raised when building an image.
#[derive(Debug, Error, PartialEq)]
pub enum ImageError {
    /// A side exceeds [`MAX_IMAGE_SIDE`], or the byte count overflows.
    #[error("image of {width}x{height} is too large (max side {MAX_IMAGE_SIDE})")]
    TooLarge { width: u32, height: u32 },

    /// The byte buffer does not hold `width × height × 3` bytes.
    #[error("image of {width}x{height} needs {expected} bytes, got {actual}")]
    SizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    /// An `R,G,B` colour string could not be parsed.
    #[error("invalid colour {0:?}: expected three comma-separated values 0-255")]
    InvalidColour(String),
}

/// One 8-bit RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    /// A neutral grey with all three channels at `level`.
    pub const fn grey(level: u8) -> Self {
        Self([level, level, level])
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "{r},{g},{b}")
    }
}

impl FromStr for Rgb {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let channels: Vec<u8> = s
            .split(',')
            .map(|c| c.trim().parse::<u8>())
            .collect::<Result<_, _>>()
            .map_err(|_| ImageError::InvalidColour(s.to_string()))?;
        let rgb: [u8; 3] = channels
            .try_into()
            .map_err(|_| ImageError::InvalidColour(s.to_string()))?;
        Ok(Self(rgb))
    }
}

/// A `width × height` image of RGB pixels in device byte order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RgbImage {
    /// An image with every pixel set to `fill`.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::TooLarge`] when either side exceeds
    /// [`MAX_IMAGE_SIDE`].
    pub fn new(width: u32, height: u32, fill: Rgb) -> Result<Self, ImageError> {
        if width > MAX_IMAGE_SIDE || height > MAX_IMAGE_SIDE {
            return Err(ImageError::TooLarge { width, height });
        }
        let len = byte_len(width, height).ok_or(ImageError::TooLarge { width, height })?;
        let mut data = Vec::with_capacity(len);
        for _ in 0..len / BYTES_PER_PIXEL {
            data.extend_from_slice(&fill.0);
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Wraps a caller-supplied row-major RGB buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::SizeMismatch`] unless `data.len()` is exactly
    /// `width × height × 3`, or [`ImageError::TooLarge`] when that product
    /// does not fit in `usize`.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, ImageError> {
        let expected = byte_len(width, height).ok_or(ImageError::TooLarge { width, height })?;
        if data.len() != expected {
            return Err(ImageError::SizeMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A filled disc on a square `2r × 2r` canvas.
    ///
    /// A pixel `(px, py)` is painted `foreground` when
    /// `(px - r)² + (py - r)² <= r`, and `background` otherwise.  The
    /// comparison is against the radius itself, not its square.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::TooLarge`] when `2r` exceeds [`MAX_IMAGE_SIDE`].
    pub fn disc(radius: u32, foreground: Rgb, background: Rgb) -> Result<Self, ImageError> {
        let side = radius.checked_mul(2).ok_or(ImageError::TooLarge {
            width: u32::MAX,
            height: u32::MAX,
        })?;
        let mut image = Self::new(side, side, background)?;
        let r = i64::from(radius);
        for py in 0..side {
            let dy = i64::from(py) - r;
            for px in 0..side {
                let dx = i64::from(px) - r;
                if dx * dx + dy * dy <= r {
                    image.set_pixel(px, py, foreground);
                }
            }
        }
        Ok(image)
    }

    /// A `size × size` square with one horizontal and one vertical line of
    /// `line` through the centre pixel `(size / 2, size / 2)`.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::TooLarge`] when `size` exceeds [`MAX_IMAGE_SIDE`].
    pub fn cross(size: u32, line: Rgb, background: Rgb) -> Result<Self, ImageError> {
        let mut image = Self::new(size, size, background)?;
        let centre = size / 2;
        for i in 0..size {
            image.set_pixel(i, centre, line);
            image.set_pixel(centre, i, line);
        }
        Ok(image)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of bytes uploaded after the `READY` gate.
    pub fn payload_len(&self) -> usize {
        self.data.len()
    }

    /// Pixel bytes in upload order.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Colour at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate lies outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Rgb {
        let i = self.offset(x, y);
        Rgb([self.data[i], self.data[i + 1], self.data[i + 2]])
    }

    /// Sets the colour at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate lies outside the image.
    pub fn set_pixel(&mut self, x: u32, y: u32, colour: Rgb) {
        let i = self.offset(x, y);
        self.data[i..i + BYTES_PER_PIXEL].copy_from_slice(&colour.0);
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) outside {}x{} image",
            self.width,
            self.height
        );
        (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL
    }
}

fn byte_len(width: u32, height: u32) -> Option<usize> {
    usize::try_from(width)
        .ok()?
        .checked_mul(usize::try_from(height).ok()?)?
        .checked_mul(BYTES_PER_PIXEL)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgb = Rgb::grey(255);
    const BLACK: Rgb = Rgb::grey(0);

    #[test]
    fn test_new_fills_every_pixel() {
        let image = RgbImage::new(4, 3, Rgb([1, 2, 3])).expect("image");
        assert_eq!(image.payload_len(), 4 * 3 * 3);
        assert!(image.as_bytes().chunks(3).all(|c| c == [1, 2, 3]));
    }

    #[test]
    fn test_from_raw_rejects_wrong_length() {
        let result = RgbImage::from_raw(2, 2, vec![0; 11]);
        assert_eq!(
            result,
            Err(ImageError::SizeMismatch {
                width: 2,
                height: 2,
                expected: 12,
                actual: 11,
            })
        );
    }

    #[test]
    fn test_new_rejects_side_above_limit_without_allocating() {
        // Arrange: u32::MAX squared would overflow a 32-bit usize
        let result = RgbImage::new(u32::MAX, u32::MAX, BLACK);

        // Assert
        assert_eq!(
            result,
            Err(ImageError::TooLarge {
                width: u32::MAX,
                height: u32::MAX,
            })
        );
        assert!(RgbImage::new(MAX_IMAGE_SIDE + 1, 1, BLACK).is_err());
        assert!(RgbImage::new(1, MAX_IMAGE_SIDE, BLACK).is_ok());
    }

    #[test]
    fn test_from_raw_with_overflowing_dimensions_is_too_large() {
        let result = RgbImage::from_raw(u32::MAX, u32::MAX, Vec::new());

        assert!(matches!(result, Err(ImageError::TooLarge { .. })));
    }

    #[test]
    fn test_disc_and_cross_reject_oversized_canvas() {
        assert!(RgbImage::disc(u32::MAX, WHITE, BLACK).is_err());
        assert!(RgbImage::disc(MAX_IMAGE_SIDE / 2 + 1, WHITE, BLACK).is_err());
        assert!(RgbImage::cross(u32::MAX, WHITE, BLACK).is_err());
    }

    #[test]
    fn test_from_raw_keeps_row_major_order() {
        // Arrange: 2×2 image, each pixel a distinct colour
        let data = vec![1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4];

        // Act
        let image = RgbImage::from_raw(2, 2, data).expect("valid");

        // Assert: (x, y) indexing walks rows first
        assert_eq!(image.pixel(1, 0), Rgb::grey(2));
        assert_eq!(image.pixel(0, 1), Rgb::grey(3));
    }

    #[test]
    fn test_disc_canvas_is_twice_the_radius() {
        let image = RgbImage::disc(5, WHITE, BLACK).expect("disc");
        assert_eq!((image.width(), image.height()), (10, 10));
    }

    #[test]
    fn test_disc_paints_centre_with_foreground() {
        let image = RgbImage::disc(5, WHITE, BLACK).expect("disc");
        assert_eq!(image.pixel(5, 5), WHITE);
    }

    #[test]
    fn test_disc_leaves_corners_as_background() {
        let image = RgbImage::disc(5, WHITE, BLACK).expect("disc");
        assert_eq!(image.pixel(0, 0), BLACK);
        assert_eq!(image.pixel(9, 9), BLACK);
    }

    #[test]
    fn test_disc_compares_squared_distance_to_radius() {
        // Arrange: radius 4, so the painted region is (dx² + dy²) <= 4
        let image = RgbImage::disc(4, WHITE, BLACK).expect("disc");

        // Assert: distance² == 4 is inside, distance² == 5 is outside
        assert_eq!(image.pixel(6, 4), WHITE); // dx = 2, dy = 0
        assert_eq!(image.pixel(6, 5), BLACK); // dx = 2, dy = 1
        assert_eq!(image.pixel(3, 3), WHITE); // dx = -1, dy = -1
    }

    #[test]
    fn test_cross_draws_lines_through_centre() {
        // Arrange
        let green = Rgb([0, 128, 0]);

        // Act
        let image = RgbImage::cross(5, green, BLACK).expect("cross");

        // Assert
        for i in 0..5 {
            assert_eq!(image.pixel(i, 2), green, "horizontal arm at x={i}");
            assert_eq!(image.pixel(2, i), green, "vertical arm at y={i}");
        }
        assert_eq!(image.pixel(0, 0), BLACK);
        assert_eq!(image.pixel(4, 1), BLACK);
    }

    #[test]
    fn test_rgb_parses_comma_separated_channels() {
        assert_eq!("0, 128,0".parse::<Rgb>(), Ok(Rgb([0, 128, 0])));
    }

    #[test]
    fn test_rgb_rejects_two_channels() {
        assert!(matches!("1,2".parse::<Rgb>(), Err(ImageError::InvalidColour(_))));
    }

    #[test]
    fn test_rgb_rejects_out_of_range_channel() {
        assert!("1,2,300".parse::<Rgb>().is_err());
    }

    #[test]
    fn test_rgb_display_round_trips_through_parse() {
        let colour = Rgb([12, 34, 56]);
        assert_eq!(colour.to_string().parse::<Rgb>(), Ok(colour));
    }
}
