//! Coordinate encodings.
//!
//! Three shapes cover every supported vendor format:
//!
//! 1. raw integer scaled by a power-of-ten divisor, signed either
//!    explicitly or by a hemisphere bit,
//! 2. degrees and minutes packed as `DDDMM.MMMM`-style digit groups with a
//!    hemisphere letter,
//! 3. IEEE float degrees.
//!
//! All of them normalize to signed decimal degrees.

#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum CoordinateError {
    #[error("invalid hemisphere character: {0:?}")]
    InvalidHemisphere(char),

    #[error("minutes component {minutes} out of range")]
    MinutesOutOfRange { minutes: f64 },

    #[error("{axis} out of range: {value}")]
    OutOfRange { axis: &'static str, value: f64 },
}

/// Direction letter fixing the sign of an unsigned coordinate magnitude.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hemisphere {
    North,
    South,
    East,
    West,
}

impl Hemisphere {
    pub fn from_char(c: char) -> Result<Self, CoordinateError> {
        match c {
            'N' | 'n' => Ok(Self::North),
            'S' | 's' => Ok(Self::South),
            'E' | 'e' => Ok(Self::East),
            'W' | 'w' => Ok(Self::West),
            _ => Err(CoordinateError::InvalidHemisphere(c)),
        }
    }

    pub fn sign(&self) -> f64 {
        match self {
            Self::North | Self::East => 1.0,
            Self::South | Self::West => -1.0,
        }
    }

    fn axis(&self) -> &'static str {
        match self {
            Self::North | Self::South => "latitude",
            Self::East | Self::West => "longitude",
        }
    }

    fn limit(&self) -> f64 {
        match self {
            Self::North | Self::South => 90.0,
            Self::East | Self::West => 180.0,
        }
    }
}

/// Decodes an already-signed scaled integer: `raw / 10^scale` degrees.
pub fn from_scaled(raw: i64, scale: u32) -> f64 {
    raw as f64 / 10f64.powi(scale as i32)
}

/// Decodes an unsigned scaled magnitude with a hemisphere sign.
///
/// The result is range-checked against the hemisphere's axis, so a raw
/// value that would place a latitude beyond the pole is rejected rather
/// than forwarded.
pub fn from_scaled_hemisphere(
    magnitude: u64,
    scale: u32,
    hemisphere: Hemisphere,
) -> Result<f64, CoordinateError> {
    let degrees = magnitude as f64 / 10f64.powi(scale as i32);
    if degrees > hemisphere.limit() {
        return Err(CoordinateError::OutOfRange {
            axis: hemisphere.axis(),
            value: degrees * hemisphere.sign(),
        });
    }
    Ok(degrees * hemisphere.sign())
}

/// Decodes a `DDDMM.MMMM` degree-minute group with a hemisphere letter.
///
/// `value` is the numeric reading of the digit group, e.g. `2212.8745`
/// for 22 degrees 12.8745 minutes.
pub fn from_degree_minutes(value: f64, hemisphere: Hemisphere) -> Result<f64, CoordinateError> {
    let degrees = (value / 100.0).trunc();
    let minutes = value - degrees * 100.0;
    if !(0.0..60.0).contains(&minutes) {
        return Err(CoordinateError::MinutesOutOfRange { minutes });
    }

    let result = degrees + minutes / 60.0;
    if result > hemisphere.limit() {
        return Err(CoordinateError::OutOfRange {
            axis: hemisphere.axis(),
            value: result * hemisphere.sign(),
        });
    }
    Ok(result * hemisphere.sign())
}
