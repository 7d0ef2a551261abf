/*!
The capability interface shared by the sensor calculators.

A calculator holds only the external parameters it needs (clock
frequencies, sensor variant). Register state always lives in the
[`RegisterMap`] passed to each call, so one calculator can serve any
number of maps.
*/

use crate::epc660::Epc660;
use crate::error::{Result, SharedError};
use crate::mlx7502x::Mlx7502x;
use crate::register_map::RegisterMap;
use crate::warning::Warnings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported sensor families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Epc660,
    Mlx75027,
    Mlx75026,
}

impl SensorKind {
    pub const ALL: [SensorKind; 3] = [Self::Epc660, Self::Mlx75027, Self::Mlx75026];

    /// Work out which sensor a register map describes from the fields it
    /// defines
    pub fn detect(map: &RegisterMap) -> Result<Self> {
        if map.contains("mod_clk_div") && map.contains("dll_crt") {
            Ok(Self::Epc660)
        } else if map.contains("ADELAY_COARSE") {
            Ok(Self::Mlx75026)
        } else if map.contains("HMAX_HI") && map.contains("FMOD_HI") {
            Ok(Self::Mlx75027)
        } else {
            Err(SharedError::consistency(
                "register map matches neither the EPC660 nor the MLX7502x schema",
            ))
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Epc660 => "epc660",
            Self::Mlx75027 => "mlx75027",
            Self::Mlx75026 => "mlx75026",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SensorKind {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SharedError::config(format!("Unknown sensor kind: '{}'", s)))
    }
}

/// Default EPC660 master clock in MHz
pub const DEFAULT_MCLK_MHZ: f64 = 96.0;

/// External clocks feeding the sensor. The MLX7502x derives everything
/// from its internal reference and ignores these.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Clocks {
    /// Master clock in MHz
    pub mclk_mhz: f64,
    /// External demodulation clock in MHz, used when external modulation
    /// is selected
    #[serde(default)]
    pub demod_clk_mhz: f64,
}

impl Clocks {
    pub fn new(mclk_mhz: f64, demod_clk_mhz: f64) -> Self {
        Self {
            mclk_mhz,
            demod_clk_mhz,
        }
    }
}

impl Default for Clocks {
    fn default() -> Self {
        Self::new(DEFAULT_MCLK_MHZ, 0.0)
    }
}

/// Readout window in sensor pixel coordinates, both ends inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub col_start: u32,
    pub col_end: u32,
    pub row_start: u32,
    pub row_end: u32,
}

impl Roi {
    pub fn new(col_start: u32, col_end: u32, row_start: u32, row_end: u32) -> Self {
        Self {
            col_start,
            col_end,
            row_start,
            row_end,
        }
    }

    /// Number of columns covered
    pub fn width(&self) -> u32 {
        (self.col_end + 1).saturating_sub(self.col_start)
    }

    /// Number of rows covered
    pub fn height(&self) -> u32 {
        (self.row_end + 1).saturating_sub(self.row_start)
    }
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cols {}..{}, rows {}..{}",
            self.col_start, self.col_end, self.row_start, self.row_end
        )
    }
}

/// Output image dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub rows: u32,
    pub cols: u32,
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// Binning configuration of either sensor family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Binning {
    /// EPC660: independent row and column dividers, each with an enable bit.
    /// Rows are divided by `2^row` (0..=3), columns by `2^col` (0..=1).
    RowColumn {
        row_enabled: bool,
        col_enabled: bool,
        row: u8,
        col: u8,
    },
    /// MLX7502x: one of four fixed modes, 0 = none .. 3 = 8x8
    Mode(u8),
}

/// The operations both sensor families support
pub trait SensorCalculator {
    fn kind(&self) -> SensorKind;

    /// Modulation frequency in MHz
    fn mod_freq_mhz(&self, map: &RegisterMap) -> Result<f64>;

    /// Program the modulation frequency; returns the achieved frequency
    fn set_mod_freq_mhz(&self, map: &mut RegisterMap, mhz: f64) -> Result<f64>;

    /// Integration times in microseconds, one per programmed time slot
    fn int_times_us(&self, map: &RegisterMap) -> Result<Vec<f64>>;

    fn set_int_times_us(&self, map: &mut RegisterMap, times_us: &[f64]) -> Result<Warnings>;

    fn roi(&self, map: &RegisterMap) -> Result<Roi>;

    fn set_roi(&self, map: &mut RegisterMap, roi: Roi) -> Result<Warnings>;

    fn binning(&self, map: &RegisterMap) -> Result<Binning>;

    fn set_binning(&self, map: &mut RegisterMap, binning: Binning) -> Result<()>;

    /// Size of the image delivered for the current ROI and binning
    fn image_size(&self, map: &RegisterMap) -> Result<ImageSize>;
}

/// Pick the calculator for a sensor family
pub fn calculator_for(kind: SensorKind, clocks: Clocks) -> Box<dyn SensorCalculator> {
    match kind {
        SensorKind::Epc660 => Box::new(Epc660::new(clocks)),
        SensorKind::Mlx75027 => Box::new(Mlx7502x::mlx75027()),
        SensorKind::Mlx75026 => Box::new(Mlx7502x::mlx75026()),
    }
}
