/*!
Whole-configuration setters.

A plan lists the settings to change; unset entries keep the map's current
values. [`Epc660Plan::apply`] and [`MlxPlan::apply`] write them in
dependency order inside one transaction: either every entry is applied or
the map is left untouched. Plans are serde types so they can come from a
TOML or JSON file.
*/

use crate::calculator::{Binning, Roi, SensorCalculator};
use crate::epc660::{AngleUnit, Epc660, LedMode, OperatingMode, DCS_COUNT};
use crate::error::{Result, SharedError};
use crate::mlx7502x::Mlx7502x;
use crate::register_map::RegisterMap;
use crate::sensor_limits::MLX_MAX_PHASES;
use crate::warning::Warnings;
use serde::{Deserialize, Serialize};
use tracing::info;

/// EPC660 settings, applied in field order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Epc660Plan {
    pub operating_mode: Option<OperatingMode>,
    /// Only used together with `operating_mode`
    pub hdr: bool,
    pub external_mod: Option<bool>,
    pub mod_freq_mhz: Option<f64>,
    pub roi: Option<Roi>,
    pub binning: Option<Binning>,
    pub phase_steps: Option<[u8; DCS_COUNT]>,
    pub led_modes: Option<[LedMode; DCS_COUNT]>,
    pub gray_led_mode: Option<LedMode>,
    pub abs: Option<[bool; DCS_COUNT]>,
    pub light_phase_deg: Option<f64>,
    pub int_times_ms: Option<Vec<f64>>,
}

impl Epc660Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mod_freq_mhz(mut self, mhz: f64) -> Self {
        self.mod_freq_mhz = Some(mhz);
        self
    }

    pub fn with_operating_mode(mut self, mode: OperatingMode, hdr: bool) -> Self {
        self.operating_mode = Some(mode);
        self.hdr = hdr;
        self
    }

    pub fn with_external_mod(mut self, external: bool) -> Self {
        self.external_mod = Some(external);
        self
    }

    pub fn with_phase_steps(mut self, steps: [u8; DCS_COUNT]) -> Self {
        self.phase_steps = Some(steps);
        self
    }

    pub fn with_led_modes(mut self, modes: [LedMode; DCS_COUNT]) -> Self {
        self.led_modes = Some(modes);
        self
    }

    pub fn with_int_times_ms(mut self, times: Vec<f64>) -> Self {
        self.int_times_ms = Some(times);
        self
    }

    pub fn with_roi(mut self, roi: Roi) -> Self {
        self.roi = Some(roi);
        self
    }

    pub fn with_binning(mut self, binning: Binning) -> Self {
        self.binning = Some(binning);
        self
    }

    pub fn with_light_phase_deg(mut self, degrees: f64) -> Self {
        self.light_phase_deg = Some(degrees);
        self
    }

    pub fn apply(&self, calc: &Epc660, map: &mut RegisterMap) -> Result<Warnings> {
        let warnings = map.transaction(|m| {
            let mut warnings = Warnings::new();
            if let Some(mode) = self.operating_mode {
                calc.set_operating_mode(m, mode, self.hdr)?;
            }
            if let Some(external) = self.external_mod {
                calc.set_external_mod(m, external)?;
            }
            if let Some(mhz) = self.mod_freq_mhz {
                calc.set_mod_freq_mhz(m, mhz)?;
            }
            if let Some(roi) = self.roi {
                calc.set_roi(m, roi)?;
            }
            if let Some(binning) = self.binning {
                SensorCalculator::set_binning(calc, m, binning)?;
            }
            if let Some(steps) = self.phase_steps {
                calc.set_phase_steps(m, steps)?;
            }
            if let Some(modes) = self.led_modes {
                for (dcs, mode) in modes.into_iter().enumerate() {
                    calc.set_led_mode(m, dcs, mode)?;
                }
            }
            if let Some(mode) = self.gray_led_mode {
                calc.set_gray_led_mode(m, mode)?;
            }
            if let Some(abs) = self.abs {
                for (dcs, on) in abs.into_iter().enumerate() {
                    calc.set_abs(m, dcs, on)?;
                }
            }
            if let Some(degrees) = self.light_phase_deg {
                warnings.extend(calc.set_light_phase(m, degrees, AngleUnit::Degrees)?);
            }
            // the tick length depends on the modulation clock set above
            if let Some(times) = &self.int_times_ms {
                warnings.extend(calc.set_int_times_ms(m, times)?);
            }
            Ok(warnings)
        })?;
        info!("Applied EPC660 plan with {} warnings", warnings.len());
        Ok(warnings)
    }
}

/// MLX7502x settings. Entries are applied in the order the HMAX-dependent
/// timing needs: link setup, geometry and phase sequence, pretime, phase
/// timing, modulation, then startup and frame timing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlxPlan {
    pub lanes: Option<u8>,
    pub output_mode: Option<u32>,
    pub speed_mbps: Option<u32>,
    pub roi: Option<Roi>,
    pub binning: Option<u8>,
    /// Grow the ROI to suit the binning mode instead of writing it as given
    pub fit_roi: bool,
    pub nraw: Option<u32>,
    pub phase_shifts: Option<Vec<f64>>,
    pub leden: Option<[bool; MLX_MAX_PHASES]>,
    pub preheat: Option<[bool; MLX_MAX_PHASES]>,
    pub premix: Option<[bool; MLX_MAX_PHASES]>,
    pub pretime_us: Option<f64>,
    pub int_times_us: Option<Vec<f64>>,
    pub idle_times_us: Option<Vec<f64>>,
    pub startup_time_us: Option<f64>,
    pub mod_freq_mhz: Option<f64>,
    pub duty_cycle: Option<f64>,
    pub analog_delay_us: Option<f64>,
    pub frame_time_us: Option<f64>,
    pub deadtime_us: Option<f64>,
}

impl MlxPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_link(mut self, lanes: u8, output_mode: u32, speed_mbps: u32) -> Self {
        self.lanes = Some(lanes);
        self.output_mode = Some(output_mode);
        self.speed_mbps = Some(speed_mbps);
        self
    }

    pub fn with_roi(mut self, roi: Roi) -> Self {
        self.roi = Some(roi);
        self
    }

    pub fn with_binning(mut self, mode: u8, fit_roi: bool) -> Self {
        self.binning = Some(mode);
        self.fit_roi = fit_roi;
        self
    }

    pub fn with_nraw(mut self, nraw: u32) -> Self {
        self.nraw = Some(nraw);
        self
    }

    pub fn with_phase_shifts(mut self, shifts: Vec<f64>) -> Self {
        self.phase_shifts = Some(shifts);
        self
    }

    pub fn with_preheat(mut self, flags: [bool; MLX_MAX_PHASES], pretime_us: f64) -> Self {
        self.preheat = Some(flags);
        self.pretime_us = Some(pretime_us);
        self
    }

    pub fn with_int_times_us(mut self, times: Vec<f64>) -> Self {
        self.int_times_us = Some(times);
        self
    }

    pub fn with_mod_freq_mhz(mut self, mhz: f64) -> Self {
        self.mod_freq_mhz = Some(mhz);
        self
    }

    pub fn with_duty_cycle(mut self, duty: f64) -> Self {
        self.duty_cycle = Some(duty);
        self
    }

    pub fn with_deadtime_us(mut self, dead_us: f64) -> Self {
        self.deadtime_us = Some(dead_us);
        self
    }

    pub fn apply(&self, calc: &Mlx7502x, map: &mut RegisterMap) -> Result<Warnings> {
        if self.frame_time_us.is_some() && self.deadtime_us.is_some() {
            return Err(SharedError::consistency("set either frame time or dead time, not both"));
        }

        let warnings = map.transaction(|m| {
            let mut warnings = Warnings::new();

            if let Some(lanes) = self.lanes {
                calc.set_lanes(m, lanes)?;
            }
            if let Some(mode) = self.output_mode {
                calc.set_output_mode(m, mode)?;
            }
            if let Some(speed) = self.speed_mbps {
                calc.set_speed(m, speed)?;
            }

            match (self.roi, self.binning) {
                (Some(roi), Some(mode)) if self.fit_roi => {
                    let (_, roi_warnings) = calc.set_binned_roi(m, roi, mode)?;
                    warnings.extend(roi_warnings);
                }
                (roi, mode) => {
                    if let Some(roi) = roi {
                        warnings.extend(calc.set_roi(m, roi)?);
                    }
                    if let Some(mode) = mode {
                        calc.set_binning(m, mode)?;
                    }
                }
            }

            if let Some(nraw) = self.nraw {
                calc.set_nraw(m, nraw)?;
            }
            if let Some(shifts) = &self.phase_shifts {
                calc.set_phase_shifts(m, shifts)?;
            }
            if let Some(flags) = self.leden {
                calc.set_leden(m, flags)?;
            }
            if let Some(flags) = self.preheat {
                calc.set_preheat(m, flags)?;
            }
            if let Some(flags) = self.premix {
                calc.set_premix(m, flags)?;
            }

            // PLL setup and the pixel reset timing follow HMAX and the
            // preheat/premix masks
            calc.refresh_derived(m)?;
            if let Some(pretime) = self.pretime_us {
                calc.set_pretime_us(m, pretime)?;
            }

            if let Some(times) = &self.int_times_us {
                calc.set_int_times_us(m, times)?;
            }
            if let Some(times) = &self.idle_times_us {
                warnings.extend(calc.set_idle_times_us(m, times)?);
            }

            if let Some(mhz) = self.mod_freq_mhz {
                calc.set_mod_freq_mhz(m, mhz)?;
            }
            if let Some(duty) = self.duty_cycle {
                warnings.extend(calc.set_duty_cycle(m, duty)?);
            }
            if let Some(delay) = self.analog_delay_us {
                warnings.extend(calc.set_analog_delay_us(m, delay)?);
            }

            if let Some(startup) = self.startup_time_us {
                warnings.extend(calc.set_startup_time_us(m, startup)?);
            }
            if let Some(frame_time) = self.frame_time_us {
                calc.set_frame_time_us(m, frame_time)?;
            }
            if let Some(dead) = self.deadtime_us {
                calc.set_deadtime_us(m, dead)?;
            }
            Ok(warnings)
        })?;
        info!("Applied {} plan with {} warnings", calc.variant().kind(), warnings.len());
        Ok(warnings)
    }
}
