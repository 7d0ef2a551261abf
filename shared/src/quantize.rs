/*!
Float to register-integer conversions.

Register encodings are computed in `f64` and then rounded. Quotients such as
`50 * hmax / 120 * 120 / hmax` carry float noise of a few ULP, so the
directed roundings first snap values that are within [`SNAP_TOLERANCE`] of
an integer.
*/

use crate::error::{Result, SharedError};
use num_traits::ToPrimitive;

/// Distance from an integer below which a quotient is treated as exact
pub const SNAP_TOLERANCE: f64 = 1e-6;

/// Snap `x` onto the nearest integer when it is within tolerance
pub fn snap(x: f64) -> f64 {
    let nearest = x.round();
    if (x - nearest).abs() < SNAP_TOLERANCE {
        nearest
    } else {
        x
    }
}

/// Ceiling that ignores float noise just above an integer
pub fn ceil(x: f64) -> f64 {
    snap(x).ceil()
}

/// Floor that ignores float noise just below an integer
pub fn floor(x: f64) -> f64 {
    snap(x).floor()
}

/// Convert an already-rounded quantity to an unsigned register value
pub fn to_u32(x: f64, quantity: &str) -> Result<u32> {
    x.to_u32().ok_or_else(|| {
        SharedError::range(format!("{} = {} is not representable as a register value", quantity, x))
    })
}

/// Narrow a register value read from the map to a smaller integer type
pub fn narrow<T: TryFrom<u32>>(value: u32, quantity: &str) -> Result<T> {
    T::try_from(value).map_err(|_| SharedError::range(format!("{} = {} is out of range", quantity, value)))
}

/// Like [`to_u32`], but negative or oversized inputs are clamped instead
/// of rejected. Returns the value and whether clamping happened.
pub fn to_u32_clamped(x: f64, max: u32) -> (u32, bool) {
    if x.is_nan() || x <= 0.0 {
        return (0, x < 0.0 || x.is_nan());
    }
    match x.to_u32() {
        Some(v) if v <= max => (v, false),
        _ => (max, true),
    }
}
