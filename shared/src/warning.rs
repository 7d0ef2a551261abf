/*!
Non-fatal conditions reported by the calculator setters.

A setter that clamps a value, or accepts a ROI that breaks the sensor's
row parity convention, still writes the registers. It returns the list of
[`ConfigWarning`]s so the caller can show them, and logs each one.
*/

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Warnings collected by a single operation
pub type Warnings = Vec<ConfigWarning>;

/// A non-fatal condition raised while encoding a register value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfigWarning {
    /// The requested value did not fit and was clamped
    Saturation {
        quantity: String,
        requested: f64,
        applied: f64,
    },
    /// ROI row start/end does not follow the odd/even convention
    Parity { quantity: String, value: u32 },
    /// The encoded values are internally inconsistent but still written
    Residual { quantity: String, detail: String },
}

impl ConfigWarning {
    /// Create a saturation warning and log it
    pub fn saturation(quantity: impl Into<String>, requested: f64, applied: f64) -> Self {
        let w = Self::Saturation {
            quantity: quantity.into(),
            requested,
            applied,
        };
        warn!("{}", w);
        w
    }

    /// Create a parity warning and log it
    pub fn parity(quantity: impl Into<String>, value: u32) -> Self {
        let w = Self::Parity {
            quantity: quantity.into(),
            value,
        };
        warn!("{}", w);
        w
    }

    /// Create a residual-consistency warning and log it
    pub fn residual(quantity: impl Into<String>, detail: impl Into<String>) -> Self {
        let w = Self::Residual {
            quantity: quantity.into(),
            detail: detail.into(),
        };
        warn!("{}", w);
        w
    }

    /// Check if this warning reports a clamped value
    pub fn is_saturation(&self) -> bool {
        matches!(self, Self::Saturation { .. })
    }

    /// Check if this warning reports a ROI parity violation
    pub fn is_parity(&self) -> bool {
        matches!(self, Self::Parity { .. })
    }
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Saturation {
                quantity,
                requested,
                applied,
            } => write!(
                f,
                "{} saturated: requested {}, applied {}",
                quantity, requested, applied
            ),
            Self::Parity { quantity, value } => {
                write!(f, "{} has unexpected parity: {}", quantity, value)
            }
            Self::Residual { quantity, detail } => write!(f, "{}: {}", quantity, detail),
        }
    }
}
