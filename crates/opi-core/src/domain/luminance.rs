//! Grey level → luminance lookup table.
//!
//! The headset has no notion of cd/m²: it draws 8-bit grey levels.  A
//! photometer calibration measures the luminance produced by each of the 256
//! grey levels, and [`LuminanceTable::find_pixel_value`] inverts that
//! measurement to pick the grey level closest to a requested luminance.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of grey levels the device can display.
pub const LUT_SIZE: usize = 256;

/// Errors raised when building a [`LuminanceTable`].
#[derive(Debug, Error, PartialEq)]
pub enum LutError {
    /// The calibration does not cover exactly 256 grey levels.
    #[error("luminance table must have exactly {LUT_SIZE} entries, got {0}")]
    WrongLength(usize),

    /// An entry is NaN or infinite.
    #[error("luminance table entry {index} is not a finite number")]
    NotFinite { index: usize },
}

/// Calibration mapping each grey level (index 0–255) to its measured
/// luminance in cd/m².
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct LuminanceTable {
    values: [f64; LUT_SIZE],
}

impl LuminanceTable {
    /// Builds a table from exactly 256 finite values.
    ///
    /// # Errors
    ///
    /// Returns [`LutError::WrongLength`] for any other length and
    /// [`LutError::NotFinite`] for NaN / infinite entries.
    pub fn new(values: &[f64]) -> Result<Self, LutError> {
        let values: [f64; LUT_SIZE] = values
            .try_into()
            .map_err(|_| LutError::WrongLength(values.len()))?;
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(LutError::NotFinite { index });
        }
        Ok(Self { values })
    }

    /// A table rising linearly from `min` (grey 0) to `max` (grey 255).
    ///
    /// Used as the fallback when no photometer calibration is configured.
    pub fn linear(min: f64, max: f64) -> Self {
        let step = (max - min) / (LUT_SIZE - 1) as f64;
        let mut values = [0.0; LUT_SIZE];
        for (i, v) in values.iter_mut().enumerate() {
            *v = min + step * i as f64;
        }
        Self { values }
    }

    /// Luminance produced by `grey`.
    pub fn luminance(&self, grey: u8) -> f64 {
        self.values[grey as usize]
    }

    /// All 256 entries in grey-level order.
    pub fn values(&self) -> &[f64; LUT_SIZE] {
        &self.values
    }

    /// Grey level whose calibrated luminance is nearest to `cdm2`.
    ///
    /// Each candidate is scored as `|table[i] - cdm2| - 1` and the lowest
    /// score wins, first index on ties.  The constant offset is applied to
    /// every candidate alike and so never changes the winner.
    pub fn find_pixel_value(&self, cdm2: f64) -> u8 {
        let mut best = 0usize;
        let mut best_score = f64::INFINITY;
        for (i, v) in self.values.iter().enumerate() {
            let score = (v - cdm2).abs() - 1.0;
            if score < best_score {
                best = i;
                best_score = score;
            }
        }
        best as u8
    }
}

impl Default for LuminanceTable {
    fn default() -> Self {
        Self::linear(0.0, 400.0)
    }
}

impl TryFrom<Vec<f64>> for LuminanceTable {
    type Error = LutError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(&values)
    }
}

impl From<LuminanceTable> for Vec<f64> {
    fn from(table: LuminanceTable) -> Self {
        table.values.to_vec()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_short_table() {
        let result = LuminanceTable::new(&[1.0; 255]);
        assert_eq!(result, Err(LutError::WrongLength(255)));
    }

    #[test]
    fn test_new_rejects_long_table() {
        let result = LuminanceTable::new(&vec![1.0; 300]);
        assert_eq!(result, Err(LutError::WrongLength(300)));
    }

    #[test]
    fn test_new_rejects_nan_entry() {
        // Arrange
        let mut values = vec![10.0; LUT_SIZE];
        values[17] = f64::NAN;

        // Act
        let result = LuminanceTable::new(&values);

        // Assert
        assert_eq!(result, Err(LutError::NotFinite { index: 17 }));
    }

    #[test]
    fn test_linear_table_endpoints() {
        let lut = LuminanceTable::linear(0.0, 400.0);
        assert_eq!(lut.luminance(0), 0.0);
        assert!((lut.luminance(255) - 400.0).abs() < 1e-9);
    }

    #[test]
    fn test_find_pixel_value_inverts_every_grey_level() {
        // Arrange: a strictly increasing table has no near-duplicates
        let lut = LuminanceTable::linear(0.0, 400.0);

        // Act / Assert
        for g in 0..=255u8 {
            assert_eq!(lut.find_pixel_value(lut.luminance(g)), g, "grey level {g}");
        }
    }

    #[test]
    fn test_find_pixel_value_picks_nearest_entry() {
        let lut = LuminanceTable::linear(0.0, 255.0);
        assert_eq!(lut.find_pixel_value(10.4), 10);
        assert_eq!(lut.find_pixel_value(10.6), 11);
    }

    #[test]
    fn test_find_pixel_value_clamps_out_of_range_requests() {
        let lut = LuminanceTable::linear(5.0, 100.0);
        assert_eq!(lut.find_pixel_value(-50.0), 0);
        assert_eq!(lut.find_pixel_value(10_000.0), 255);
    }

    #[test]
    fn test_find_pixel_value_prefers_first_index_on_ties() {
        // Arrange: a flat calibration maps every grey level to the same value
        let lut = LuminanceTable::new(&[50.0; LUT_SIZE]).expect("valid table");

        // Act / Assert
        assert_eq!(lut.find_pixel_value(50.0), 0);
        assert_eq!(lut.find_pixel_value(12.0), 0);
    }

    #[test]
    fn test_default_table_is_linear_up_to_400() {
        assert_eq!(LuminanceTable::default(), LuminanceTable::linear(0.0, 400.0));
    }

    #[test]
    fn test_table_deserializes_from_toml_array() {
        // Arrange
        let values: Vec<String> = (0..LUT_SIZE).map(|i| format!("{}.5", i)).collect();
        let text = format!("lut = [{}]", values.join(", "));

        #[derive(Deserialize)]
        struct Wrapper {
            lut: LuminanceTable,
        }

        // Act
        let parsed: Wrapper = toml::from_str(&text).expect("deserialize");

        // Assert
        assert_eq!(parsed.lut.luminance(3), 3.5);
    }

    #[test]
    fn test_table_deserialization_enforces_length() {
        #[derive(Debug, Deserialize)]
        struct Wrapper {
            #[allow(dead_code)]
            lut: LuminanceTable,
        }

        let result: Result<Wrapper, _> = toml::from_str("lut = [1.0, 2.0, 3.0]");
        let err = result.expect_err("three entries must be rejected").to_string();
        assert!(err.contains("exactly 256"), "unexpected error: {err}");
    }
}
