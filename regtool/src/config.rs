/*!
Configuration management for the register tool.
*/

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use shared::{Clocks, Epc660Plan, MlxPlan, RegisterMap, SensorKind};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub sensor: SensorConfig,

    /// Settings applied to EPC660 maps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epc660: Option<Epc660Plan>,

    /// Settings applied to MLX75027/MLX75026 maps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mlx: Option<MlxPlan>,
}

impl AppConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self {
            sensor: SensorConfig::default(),
            epc660: None,
            mlx: None,
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Sensor selection and clocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// `auto`, `epc660`, `mlx75027` or `mlx75026`
    pub kind: String,

    /// EPC660 master clock in MHz
    pub mclk_mhz: f64,

    /// EPC660 external demodulation clock in MHz
    #[serde(default)]
    pub demod_clk_mhz: f64,
}

impl SensorConfig {
    pub fn clocks(&self) -> Clocks {
        Clocks::new(self.mclk_mhz, self.demod_clk_mhz)
    }

    /// The configured sensor kind, or the one `map` describes when set to
    /// `auto`
    pub fn resolve_kind(&self, map: &RegisterMap) -> Result<SensorKind> {
        let detected = SensorKind::detect(map)?;
        if self.kind.eq_ignore_ascii_case("auto") {
            return Ok(detected);
        }
        let configured: SensorKind = self.kind.parse()?;
        if configured != detected {
            bail!("Config is for {} but the register map is {}", configured, detected);
        }
        Ok(configured)
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        let clocks = Clocks::default();
        Self {
            kind: "auto".to_string(),
            mclk_mhz: clocks.mclk_mhz,
            demod_clk_mhz: clocks.demod_clk_mhz,
        }
    }
}
