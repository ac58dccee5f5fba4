//! Stimulus request types.
//!
//! OPI distinguishes static, kinetic and temporal stimuli.  The Daydream
//! device only implements static ones; the other two kinds exist so callers
//! written against the generic OPI surface get a clear "not supported"
//! answer instead of a type error.
//!
//! Static stimulus fields are optional because requests are often loaded
//! from files or built incrementally; [`StaticStimulus::validate`] turns a
//! request into a [`ValidStatic`] or names the first missing field.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation failures for a stimulus request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StimulusError {
    /// A required field was not supplied.
    #[error("no {0} in stimulus")]
    MissingField(&'static str),

    /// A numeric field was NaN or infinite.
    #[error("{field} in stimulus must be finite, got {value}")]
    NotFinite { field: &'static str, value: String },

    /// An eye string was neither `L` nor `R`.
    #[error("invalid eye {0:?}: expected L or R")]
    InvalidEye(String),

    /// A fixation string was neither `cross` nor `none`.
    #[error("invalid fixation {0:?}: expected cross or none")]
    InvalidFixation(String),
}

// ── Eye ───────────────────────────────────────────────────────────────────────

/// Which half of the headset screen a command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Eye {
    #[serde(rename = "L", alias = "left")]
    Left,
    #[serde(rename = "R", alias = "right")]
    Right,
}

impl Eye {
    /// The single-letter form used on the wire.
    pub fn as_wire(self) -> &'static str {
        match self {
            Eye::Left => "L",
            Eye::Right => "R",
        }
    }
}

impl fmt::Display for Eye {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl FromStr for Eye {
    type Err = StimulusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L" | "LEFT" => Ok(Eye::Left),
            "R" | "RIGHT" => Ok(Eye::Right),
            _ => Err(StimulusError::InvalidEye(s.to_string())),
        }
    }
}

// ── Fixation ──────────────────────────────────────────────────────────────────

/// Fixation mark drawn on top of the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fixation {
    None,
    #[default]
    Cross,
}

impl FromStr for Fixation {
    type Err = StimulusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Fixation::None),
            "cross" => Ok(Fixation::Cross),
            _ => Err(StimulusError::InvalidFixation(s.to_string())),
        }
    }
}

// ── Stimulus kinds ────────────────────────────────────────────────────────────

/// A flash of light at a fixed location.
///
/// Units: `x`, `y`, `size` in degrees; `level` in cd/m²; `duration` and
/// `response_window` in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticStimulus {
    pub eye: Option<Eye>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub size: Option<f64>,
    pub level: Option<f64>,
    pub duration: Option<f64>,
    pub response_window: Option<f64>,
}

/// A static stimulus with every field present.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidStatic {
    pub eye: Eye,
    pub x: f64,
    pub y: f64,
    pub size: f64,
    pub level: f64,
    pub duration: f64,
    pub response_window: f64,
}

impl StaticStimulus {
    /// A fully specified request.
    pub fn new(
        eye: Eye,
        x: f64,
        y: f64,
        size: f64,
        level: f64,
        duration: f64,
        response_window: f64,
    ) -> Self {
        Self {
            eye: Some(eye),
            x: Some(x),
            y: Some(y),
            size: Some(size),
            level: Some(level),
            duration: Some(duration),
            response_window: Some(response_window),
        }
    }

    /// Checks that all seven fields are present and every number is finite.
    ///
    /// # Errors
    ///
    /// Returns [`StimulusError::MissingField`] naming the first absent field,
    /// or [`StimulusError::NotFinite`] for the first NaN or infinite one.
    pub fn validate(&self) -> Result<ValidStatic, StimulusError> {
        Ok(ValidStatic {
            eye: self.eye.ok_or(StimulusError::MissingField("eye"))?,
            x: finite("x", self.x)?,
            y: finite("y", self.y)?,
            size: finite("size", self.size)?,
            level: finite("level", self.level)?,
            duration: finite("duration", self.duration)?,
            response_window: finite("response_window", self.response_window)?,
        })
    }
}

fn finite(field: &'static str, value: Option<f64>) -> Result<f64, StimulusError> {
    match value {
        None => Err(StimulusError::MissingField(field)),
        Some(v) if !v.is_finite() => Err(StimulusError::NotFinite {
            field,
            value: v.to_string(),
        }),
        Some(v) => Ok(v),
    }
}

/// A stimulus moving along a path of degree coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KineticStimulus {
    pub eye: Option<Eye>,
    pub path: Vec<(f64, f64)>,
    pub sizes: Vec<f64>,
    pub levels: Vec<f64>,
    /// Degrees per second along each path segment.
    pub speeds: Vec<f64>,
}

/// A flickering stimulus at a fixed location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemporalStimulus {
    pub eye: Option<Eye>,
    pub x: f64,
    pub y: f64,
    pub size: f64,
    /// Flicker frequency in Hz.
    pub rate: f64,
    pub duration: f64,
    pub response_window: f64,
}

/// Discriminant of [`Stimulus`], used in log lines and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StimulusKind {
    Static,
    Kinetic,
    Temporal,
}

impl fmt::Display for StimulusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StimulusKind::Static => "static",
            StimulusKind::Kinetic => "kinetic",
            StimulusKind::Temporal => "temporal",
        })
    }
}

/// Any OPI stimulus.
#[derive(Debug, Clone, PartialEq)]
pub enum Stimulus {
    Static(StaticStimulus),
    Kinetic(KineticStimulus),
    Temporal(TemporalStimulus),
}

impl Stimulus {
    pub fn kind(&self) -> StimulusKind {
        match self {
            Stimulus::Static(_) => StimulusKind::Static,
            Stimulus::Kinetic(_) => StimulusKind::Kinetic,
            Stimulus::Temporal(_) => StimulusKind::Temporal,
        }
    }
}

impl From<StaticStimulus> for Stimulus {
    fn from(s: StaticStimulus) -> Self {
        Stimulus::Static(s)
    }
}

impl From<KineticStimulus> for Stimulus {
    fn from(s: KineticStimulus) -> Self {
        Stimulus::Kinetic(s)
    }
}

impl From<TemporalStimulus> for Stimulus {
    fn from(s: TemporalStimulus) -> Self {
        Stimulus::Temporal(s)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
