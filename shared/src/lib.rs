/*!
# Time-of-Flight Sensor Register Calculator

Register maps, bit-field codecs and physical-quantity calculators for the
EPC660 and MLX75027/MLX75026 time-of-flight image sensors.

## Core Types

- [`RegisterMap`] - Named bit-fields with their register addresses and values
- [`RegisterField`] - One field: address, bit range, value and documentation
- [`Epc660`] - EPC660 calculator
- [`Mlx7502x`] - MLX75027/MLX75026 calculator
- [`SensorCalculator`] - Operations both sensor families share

## Modules

- [`codec`] - Multi-byte values split across 8-bit fields
- [`csv_io`] - Field and register CSV import/export
- [`defaults`] - Built-in default register maps
- [`plan`] - Whole-configuration setters applied in dependency order
- [`snapshot`] - JSON camera configuration snapshots
- [`error`] - Common error types
*/

pub mod calculator;
pub mod codec;
pub mod csv_io;
pub mod defaults;
pub mod epc660;
pub mod error;
pub mod field;
pub mod mlx7502x;
pub mod plan;
pub mod quantize;
pub mod register_map;
pub mod snapshot;
pub mod warning;

// Re-export commonly used types
pub use calculator::{calculator_for, Binning, Clocks, ImageSize, Roi, SensorCalculator, SensorKind};
pub use epc660::{AngleUnit, Epc660, LedMode, OperatingMode};
pub use error::{Result, SharedError};
pub use field::{BitRange, RegisterField};
pub use mlx7502x::{DriveSignal, Mlx7502x, MlxVariant, PhaseMask, PixelDrive};
pub use plan::{Epc660Plan, MlxPlan};
pub use register_map::{RegisterImage, RegisterMap};
pub use snapshot::CameraConfig;
pub use warning::{ConfigWarning, Warnings};

/// Version information for the shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Sensor geometry and timing constants
pub mod sensor_limits {
    /// Last EPC660 ROI column (x coordinates are 4..=327 on the full array)
    pub const EPC660_COL_MAX: u32 = 327;

    /// Last EPC660 ROI row in the top half (the bottom half is mirrored)
    pub const EPC660_ROW_MAX: u32 = 125;

    /// EPC660 rows are read symmetrically: row `r` pairs with `251 - r`
    pub const EPC660_MIRROR_ROW: u32 = 251;

    /// MLX7502x internal reference clock, ticks per microsecond
    pub const MLX_TICKS_PER_US: f64 = 120.0;

    /// Maximum number of raw phases per MLX7502x depth frame
    pub const MLX_MAX_PHASES: usize = 8;

    /// Fixed MLX7502x per-frame setup time in microseconds
    pub const MLX_FRAME_SETUP_US: f64 = 500.0;
}
