/*!
Camera configuration snapshots.

A [`CameraConfig`] records the folded register values of a map together
with the sensor family and clock it was computed for, so a configuration
can be stored as JSON and restored onto a fresh default map later.
*/

use crate::calculator::{Clocks, SensorKind};
use crate::error::{Result, SharedError};
use crate::register_map::{RegisterImage, RegisterMap};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Snapshot format version written by this crate
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub version: u32,
    pub sensor: SensorKind,
    pub mclk_mhz: f64,
    /// RFC 3339 local time of capture
    pub created: String,
    pub registers: RegisterImage,
    /// Wrapping sum of register addresses and values
    pub checksum: u32,
}

fn checksum_of(registers: &RegisterImage) -> u32 {
    registers
        .iter()
        .fold(0u32, |acc, (&addr, &value)| acc.wrapping_add(u32::from(addr)).wrapping_add(value))
}

impl CameraConfig {
    /// Snapshot the registers of `map`
    pub fn capture(map: &RegisterMap, sensor: SensorKind, clocks: Clocks) -> Self {
        let registers = map.to_registers();
        Self {
            version: SNAPSHOT_VERSION,
            sensor,
            mclk_mhz: clocks.mclk_mhz,
            created: chrono::Local::now().to_rfc3339(),
            checksum: checksum_of(&registers),
            registers,
        }
    }

    /// Check the version and checksum
    pub fn verify(&self) -> Result<()> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SharedError::invalid_file_format(format!(
                "Unsupported snapshot version {} (expected {})",
                self.version, SNAPSHOT_VERSION
            )));
        }
        let actual = checksum_of(&self.registers);
        if actual != self.checksum {
            return Err(SharedError::invalid_file_format(format!(
                "Snapshot checksum mismatch: stored 0x{:08X}, computed 0x{:08X}",
                self.checksum, actual
            )));
        }
        Ok(())
    }

    /// Write the registers into `map`, which must describe the same sensor.
    /// Returns the number of fields updated.
    pub fn apply_to(&self, map: &mut RegisterMap) -> Result<usize> {
        let kind = SensorKind::detect(map)?;
        if kind != self.sensor {
            return Err(SharedError::consistency(format!(
                "snapshot is for {}, register map is {}",
                self.sensor, kind
            )));
        }
        Ok(map.apply_registers(&self.registers))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        info!("Saved {} snapshot to {}", self.sensor, path.as_ref().display());
        Ok(())
    }

    /// Load and verify a snapshot
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: CameraConfig = serde_json::from_str(&content)?;
        config.verify()?;
        info!(
            "Loaded {} snapshot from {} ({} registers, created {})",
            config.sensor,
            path.as_ref().display(),
            config.registers.len(),
            config.created
        );
        Ok(config)
    }
}
