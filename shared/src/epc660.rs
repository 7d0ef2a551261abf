/*!
EPC660 register calculator.

Translates between EPC660 register fields and physical settings:
modulation frequency, operating mode (normal, HDR, dual-phase, grayscale),
integration times, ROI and binning, and the DLL light-phase offset.

Integration time is counted in modulation clock ticks:

```text
t_int = (mod_clk_div + 1) / MCLK * (int_len + 1) * int_mult
```

With external modulation the tick is one `DEMOD_CLK` period instead.
*/

use crate::calculator::{Binning, Clocks, ImageSize, Roi, SensorCalculator, SensorKind};
use crate::codec::{pack_16, unpack_16};
use crate::error::{Result, SharedError};
use crate::quantize;
use crate::register_map::RegisterMap;
use crate::sensor_limits::{EPC660_COL_MAX, EPC660_MIRROR_ROW, EPC660_ROW_MAX};
use crate::warning::{ConfigWarning, Warnings};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

const INT_LEN: [&str; 2] = ["int_len_low", "int_len_hi"];
const INT_LEN2: [&str; 2] = ["int_len2_low", "int_len2_hi"];
const INT_MULT: [&str; 2] = ["int_mult_low", "int_mult_hi"];
const FINE_DLL: [&str; 2] = ["fine_dll_low", "fine_dll_hi"];
const ROI_COL_START: [&str; 2] = ["roi_top_leftx_low", "roi_top_leftx_hi"];
const ROI_COL_END: [&str; 2] = ["roi_bot_rightx_low", "roi_bot_rightx_hi"];

/// Largest multiplier tried by the integration-time solver
const MAX_INT_MULT: u32 = 1022;
const MAX_INT_LEN: u32 = 0xFFFF;

/// DLL step sizes in nanoseconds and their register limits
const COARSE_DLL_NS: f64 = 2.0;
const FINE_DLL_NS: f64 = 0.01;
const MAX_COARSE_DLL: u32 = 49;
const MAX_FINE_DLL: u32 = 799;

/// `dll_crt` values
const DLL_BYPASS: u32 = 1;
const DLL_ENABLED: u32 = 4;

/// `abs_n` value that enables background suppression
const ABS_ON: u32 = 3;

/// Number of DCS slots in the sequencer
pub const DCS_COUNT: usize = 4;

/// The three mutually exclusive sequencer configurations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    /// Four-DCS time-of-flight, optionally with HDR
    Normal,
    /// Two DCS captured at once in both pixel taps
    DualPhase,
    /// Grayscale (common-mode) imaging
    CommonMode,
}

/// Illumination drive during one DCS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedMode {
    Modulated,
    On,
    Off,
}

/// Unit of a light-phase angle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleUnit {
    #[default]
    Degrees,
    Radians,
}

impl AngleUnit {
    /// Angle of one full modulation period
    pub fn full_turn(&self) -> f64 {
        match self {
            Self::Degrees => 360.0,
            Self::Radians => 2.0 * PI,
        }
    }
}

/// EPC660 calculator for a given clock setup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Epc660 {
    clocks: Clocks,
}

impl Epc660 {
    pub fn new(clocks: Clocks) -> Self {
        Self { clocks }
    }

    pub fn clocks(&self) -> Clocks {
        self.clocks
    }

    pub fn external_mod(&self, map: &RegisterMap) -> Result<bool> {
        map.flag("mod_clk_src")
    }

    /// Select `DEMOD_CLK` (true) or the divided `MCLK` (false) as the
    /// modulation source
    pub fn set_external_mod(&self, map: &mut RegisterMap, external: bool) -> Result<()> {
        map.set_flag("mod_clk_src", external)
    }

    /// Modulation frequency in MHz
    pub fn mod_freq_mhz(&self, map: &RegisterMap) -> Result<f64> {
        if self.external_mod(map)? {
            Ok(self.clocks.demod_clk_mhz / 4.0)
        } else {
            let div = map.get("mod_clk_div")?;
            Ok(self.clocks.mclk_mhz / f64::from(div + 1) / 4.0)
        }
    }

    /// Nearest achievable internal modulation frequency: the divider and the
    /// frequency it produces
    pub fn closest_mod_freq(&self, mhz: f64) -> Result<(u8, f64)> {
        if !(mhz.is_finite() && mhz > 0.0) {
            return Err(SharedError::range(format!("modulation frequency {} MHz", mhz)));
        }
        let ideal = (self.clocks.mclk_mhz / (4.0 * mhz) - 1.0).round();
        let (div, _) = quantize::to_u32_clamped(ideal, u32::from(u8::MAX));
        let div = u8::try_from(div).unwrap_or(u8::MAX);
        Ok((div, self.clocks.mclk_mhz / f64::from(u32::from(div) + 1) / 4.0))
    }

    /// Program the divider closest to `mhz`. With external modulation there
    /// is nothing to program and the external frequency is returned.
    pub fn set_mod_freq_mhz(&self, map: &mut RegisterMap, mhz: f64) -> Result<f64> {
        if self.external_mod(map)? {
            debug!("External modulation selected, mod_clk_div left unchanged");
            return self.mod_freq_mhz(map);
        }
        let (div, actual) = self.closest_mod_freq(mhz)?;
        map.set("mod_clk_div", u32::from(div))?;
        debug!("mod_clk_div = {} ({} MHz requested, {} MHz actual)", div, mhz, actual);
        Ok(actual)
    }

    /// Current sequencer configuration
    pub fn operating_mode(&self, map: &RegisterMap) -> Result<OperatingMode> {
        let mod_sel = map.get("mod_sel")?;
        let num_dcs = map.get("num_dcs")?;
        let pixel_mode = map.get("pixel_mode")?;
        let dual_int = map.get("dual_int_mode")?;

        match (mod_sel, num_dcs) {
            (0, 1) if pixel_mode == 1 && dual_int == 1 => Ok(OperatingMode::DualPhase),
            (3, 0) => Ok(OperatingMode::CommonMode),
            (0, 3) => Ok(OperatingMode::Normal),
            _ => Err(SharedError::consistency(format!(
                "unrecognised sequencer state: mod_sel={} num_dcs={} pixel_mode={} dual_int_mode={}",
                mod_sel, num_dcs, pixel_mode, dual_int
            ))),
        }
    }

    /// Write all four sequencer fields for `mode`. `hdr` applies to the
    /// normal and grayscale modes; dual-phase always uses both taps.
    pub fn set_operating_mode(&self, map: &mut RegisterMap, mode: OperatingMode, hdr: bool) -> Result<()> {
        let (mod_sel, num_dcs, dual) = match mode {
            OperatingMode::DualPhase => (0, 1, true),
            OperatingMode::CommonMode => (3, 0, hdr),
            OperatingMode::Normal => (0, 3, hdr),
        };
        map.set("mod_sel", mod_sel)?;
        map.set("num_dcs", num_dcs)?;
        map.set_flag("pixel_mode", dual)?;
        map.set_flag("dual_int_mode", dual)
    }

    /// True when both pixel taps integrate separately
    pub fn hdr(&self, map: &RegisterMap) -> Result<bool> {
        Ok(map.flag("pixel_mode")? && map.flag("dual_int_mode")?)
    }

    /// Toggle HDR without touching the operating mode. Dual-phase mode needs
    /// both taps, so switching HDR off there is rejected.
    pub fn set_hdr(&self, map: &mut RegisterMap, on: bool) -> Result<()> {
        if !on && self.operating_mode(map)? == OperatingMode::DualPhase {
            return Err(SharedError::consistency("HDR cannot be disabled in dual-phase mode"));
        }
        map.set_flag("pixel_mode", on)?;
        map.set_flag("dual_int_mode", on)
    }

    fn phase_step_bank(&self, map: &RegisterMap) -> Result<&'static str> {
        let dual = map.get("mod_sel")? == 0
            && map.get("num_dcs")? == 1
            && self.hdr(map)?;
        Ok(if dual { "dcs_mgx1" } else { "dcs_mgx0" })
    }

    /// Phase step (0..3, quarter periods) of each DCS
    pub fn phase_steps(&self, map: &RegisterMap) -> Result<[u8; DCS_COUNT]> {
        let bank = self.phase_step_bank(map)?;
        let mut steps = [0u8; DCS_COUNT];
        for (n, step) in steps.iter_mut().enumerate() {
            let name = format!("{}_{}", bank, n);
            *step = quantize::narrow(map.get(&name)?, &name)?;
        }
        Ok(steps)
    }

    /// Program the DCS phase sequence into the bank used by the current mode
    pub fn set_phase_steps(&self, map: &mut RegisterMap, steps: [u8; DCS_COUNT]) -> Result<()> {
        if let Some(bad) = steps.iter().find(|&&s| s > 3) {
            return Err(SharedError::range(format!("phase step {} (must be 0..3)", bad)));
        }
        let bank = self.phase_step_bank(map)?;
        for (n, step) in steps.iter().enumerate() {
            map.set(&format!("{}_{}", bank, n), u32::from(*step))?;
        }
        Ok(())
    }

    pub fn led_mode(&self, map: &RegisterMap, dcs: usize) -> Result<LedMode> {
        check_dcs(dcs)?;
        led_mode_from(
            map,
            &format!("led_on_int_{}", dcs),
            &format!("led_off_int_{}", dcs),
        )
    }

    pub fn set_led_mode(&self, map: &mut RegisterMap, dcs: usize, mode: LedMode) -> Result<()> {
        check_dcs(dcs)?;
        write_led_mode(
            map,
            &format!("led_on_int_{}", dcs),
            &format!("led_off_int_{}", dcs),
            mode,
        )
    }

    /// Illumination during grayscale (common-mode) captures
    pub fn gray_led_mode(&self, map: &RegisterMap) -> Result<LedMode> {
        led_mode_from(map, "led_on_int_gray", "led_off_int_gray")
    }

    pub fn set_gray_led_mode(&self, map: &mut RegisterMap, mode: LedMode) -> Result<()> {
        write_led_mode(map, "led_on_int_gray", "led_off_int_gray", mode)
    }

    /// Background suppression of one DCS
    pub fn abs_enabled(&self, map: &RegisterMap, dcs: usize) -> Result<bool> {
        check_dcs(dcs)?;
        Ok(map.get(&format!("abs_{}", dcs))? != 0)
    }

    pub fn set_abs(&self, map: &mut RegisterMap, dcs: usize, on: bool) -> Result<()> {
        check_dcs(dcs)?;
        map.set(&format!("abs_{}", dcs), if on { ABS_ON } else { 0 })
    }

    /// Integration ticks per millisecond
    fn ticks_per_ms(&self, map: &RegisterMap) -> Result<f64> {
        let rate = if self.external_mod(map)? {
            self.clocks.demod_clk_mhz * 1e3
        } else {
            self.clocks.mclk_mhz * 1e3 / f64::from(map.get("mod_clk_div")? + 1)
        };
        if !(rate.is_finite() && rate > 0.0) {
            return Err(SharedError::range(format!(
                "integration clock of {} kHz; check mclk/demod_clk",
                rate
            )));
        }
        Ok(rate)
    }

    /// Integration times in milliseconds; two entries when HDR is active
    pub fn int_times_ms(&self, map: &RegisterMap) -> Result<Vec<f64>> {
        let rate = self.ticks_per_ms(map)?;
        let mult = f64::from(unpack_16(map, INT_MULT)?);
        let time_of = |len: u32| f64::from(len + 1) * mult / rate;

        let mut times = vec![time_of(unpack_16(map, INT_LEN)?)];
        if self.hdr(map)? {
            times.push(time_of(unpack_16(map, INT_LEN2)?));
        }
        Ok(times)
    }

    /// Program one integration time, or two when HDR is active. The largest
    /// multiplier that divides every tick count exactly is chosen, so the
    /// lengths stay small and both times share one multiplier.
    pub fn set_int_times_ms(&self, map: &mut RegisterMap, times_ms: &[f64]) -> Result<Warnings> {
        if times_ms.is_empty() || times_ms.len() > 2 {
            return Err(SharedError::range(format!(
                "{} integration times given, expected 1 or 2",
                times_ms.len()
            )));
        }
        if times_ms.len() == 2 && !self.hdr(map)? {
            return Err(SharedError::consistency(
                "a second integration time needs HDR or dual-phase mode",
            ));
        }

        let rate = self.ticks_per_ms(map)?;
        let ticks = times_ms
            .iter()
            .map(|&t| {
                if !(t.is_finite() && t > 0.0) {
                    return Err(SharedError::range(format!("integration time {} ms", t)));
                }
                let ticks = quantize::to_u32((t * rate).round(), "integration ticks")?;
                if ticks == 0 {
                    return Err(SharedError::range(format!("integration time {} ms is below one tick", t)));
                }
                Ok(ticks)
            })
            .collect::<Result<Vec<u32>>>()?;

        let mult = best_multiplier(&ticks);
        let mut warnings = Warnings::new();
        let mut lengths = Vec::with_capacity(ticks.len());
        for &t in &ticks {
            let len = t / mult - 1;
            if len > MAX_INT_LEN {
                warnings.push(ConfigWarning::saturation("int_len", f64::from(len), f64::from(MAX_INT_LEN)));
                lengths.push(MAX_INT_LEN);
            } else {
                lengths.push(len);
            }
        }
        debug!("int_mult = {}, int_len = {:?} for {:?} ticks", mult, lengths, ticks);

        pack_16(map, lengths[0], INT_LEN)?;
        if let Some(&len2) = lengths.get(1) {
            pack_16(map, len2, INT_LEN2)?;
        }
        pack_16(map, mult, INT_MULT)?;
        Ok(warnings)
    }

    /// Row and column binning dividers as (row_rudy, col_rudx)
    pub fn binning_dividers(&self, map: &RegisterMap) -> Result<(u8, u8)> {
        Ok((
            quantize::narrow(map.get("row_rudy")?, "row_rudy")?,
            quantize::narrow(map.get("col_rudx")?, "col_rudx")?,
        ))
    }

    pub fn set_binning_dividers(&self, map: &mut RegisterMap, row: u8, col: u8) -> Result<()> {
        if row > 3 {
            return Err(SharedError::range(format!("row binning {} (must be 0..3)", row)));
        }
        if col > 1 {
            return Err(SharedError::range(format!("column binning {} (must be 0..1)", col)));
        }
        map.set("row_rudy", u32::from(row))?;
        map.set("col_rudx", u32::from(col))
    }

    /// Binning enable bits as (rows, columns)
    pub fn bin_mode(&self, map: &RegisterMap) -> Result<(bool, bool)> {
        let bits = map.get("bin_mode")?;
        Ok((bits & 0x02 != 0, bits & 0x01 != 0))
    }

    pub fn set_bin_mode(&self, map: &mut RegisterMap, rows: bool, cols: bool) -> Result<()> {
        map.set("bin_mode", (u32::from(rows) << 1) | u32::from(cols))
    }

    pub fn roi(&self, map: &RegisterMap) -> Result<Roi> {
        Ok(Roi::new(
            unpack_16(map, ROI_COL_START)?,
            unpack_16(map, ROI_COL_END)?,
            map.get("roi_top_lefty")?,
            map.get("roi_bot_righty")?,
        ))
    }

    /// Set the readout window. Rows cover the top half of the array only;
    /// the bottom half is read out mirrored about row 125.
    pub fn set_roi(&self, map: &mut RegisterMap, roi: Roi) -> Result<()> {
        for (name, value, max) in [
            ("column start", roi.col_start, EPC660_COL_MAX),
            ("column end", roi.col_end, EPC660_COL_MAX),
            ("row start", roi.row_start, EPC660_ROW_MAX),
            ("row end", roi.row_end, EPC660_ROW_MAX),
        ] {
            if value > max {
                return Err(SharedError::range(format!("{} {} (must be 0..{})", name, value, max)));
            }
        }
        if roi.row_start > roi.row_end {
            return Err(SharedError::consistency("ROI row start is after row end"));
        }
        if roi.col_start > roi.col_end {
            return Err(SharedError::consistency("ROI column start is after column end"));
        }

        pack_16(map, roi.col_start, ROI_COL_START)?;
        pack_16(map, roi.col_end, ROI_COL_END)?;
        map.set("roi_top_lefty", roi.row_start)?;
        map.set("roi_bot_righty", roi.row_end)
    }

    /// The mirrored half of the ROI, in full-array row coordinates
    pub fn mirrored_roi(&self, map: &RegisterMap) -> Result<Roi> {
        let roi = self.roi(map)?;
        let span = roi
            .row_end
            .checked_sub(roi.row_start)
            .ok_or_else(|| SharedError::consistency("ROI row start is after row end"))?;
        let top = EPC660_MIRROR_ROW
            .checked_sub(roi.row_start)
            .and_then(|bottom| bottom.checked_sub(span).map(|top| (top, bottom)));
        let (top, bottom) = top.ok_or_else(|| {
            SharedError::consistency(format!(
                "ROI rows {}..{} do not mirror about row {}",
                roi.row_start, roi.row_end, EPC660_MIRROR_ROW
            ))
        })?;
        Ok(Roi::new(roi.col_start, roi.col_end, top, bottom))
    }

    pub fn image_size(&self, map: &RegisterMap) -> Result<ImageSize> {
        let roi = self.roi(map)?;
        let (row_bin, col_bin) = self.bin_mode(map)?;
        let (row_rudy, col_rudx) = self.binning_dividers(map)?;

        let row_div = if row_bin { 1u32 << row_rudy } else { 1 };
        let col_div = if col_bin { 1u32 << col_rudx } else { 1 };
        Ok(ImageSize {
            rows: 2 * roi.height() / row_div,
            cols: roi.width() / col_div,
        })
    }

    /// Illumination phase offset produced by the DLL. A bypassed DLL gives
    /// zero.
    pub fn light_phase(&self, map: &RegisterMap, unit: AngleUnit) -> Result<f64> {
        if map.get("dll_crt")? != DLL_ENABLED {
            return Ok(0.0);
        }
        let coarse = f64::from(map.get("coarse_dll")?);
        let fine = f64::from(unpack_16(map, FINE_DLL)?);
        let delay_ns = coarse * COARSE_DLL_NS + fine * FINE_DLL_NS;
        let period_ns = 1e3 / self.mod_freq_mhz(map)?;
        Ok(delay_ns / period_ns * unit.full_turn())
    }

    /// Program the DLL for a phase offset. Zero bypasses the DLL.
    pub fn set_light_phase(&self, map: &mut RegisterMap, phase: f64, unit: AngleUnit) -> Result<Warnings> {
        if phase == 0.0 {
            map.set("dll_crt", DLL_BYPASS)?;
            return Ok(Warnings::new());
        }
        if !(phase.is_finite() && phase > 0.0) {
            return Err(SharedError::range(format!("light phase {}", phase)));
        }

        let period_ns = 1e3 / self.mod_freq_mhz(map)?;
        let delay_ns = phase / unit.full_turn() * period_ns;
        let mut warnings = Warnings::new();

        let coarse_wanted = quantize::floor(delay_ns / COARSE_DLL_NS);
        let (coarse, clamped) = quantize::to_u32_clamped(coarse_wanted, MAX_COARSE_DLL);
        if clamped {
            warnings.push(ConfigWarning::saturation("coarse_dll", coarse_wanted, f64::from(coarse)));
        }

        let fine_wanted = ((delay_ns - f64::from(coarse) * COARSE_DLL_NS) / FINE_DLL_NS).round();
        let (fine, clamped) = quantize::to_u32_clamped(fine_wanted, MAX_FINE_DLL);
        if clamped {
            warnings.push(ConfigWarning::saturation("fine_dll", fine_wanted, f64::from(fine)));
        }

        debug!("DLL coarse = {}, fine = {} for {} ns", coarse, fine, delay_ns);
        map.set("dll_crt", DLL_ENABLED)?;
        map.set("coarse_dll", coarse)?;
        pack_16(map, fine, FINE_DLL)?;
        Ok(warnings)
    }
}

/// Greatest multiplier in 1..=MAX_INT_MULT dividing every tick count
fn best_multiplier(ticks: &[u32]) -> u32 {
    (1..=MAX_INT_MULT)
        .rev()
        .find(|m| ticks.iter().all(|t| t % m == 0))
        .unwrap_or(1)
}

fn check_dcs(dcs: usize) -> Result<()> {
    if dcs >= DCS_COUNT {
        return Err(SharedError::range(format!("DCS index {} (must be 0..{})", dcs, DCS_COUNT - 1)));
    }
    Ok(())
}

fn led_mode_from(map: &RegisterMap, on: &str, off: &str) -> Result<LedMode> {
    match (map.flag(on)?, map.flag(off)?) {
        (false, false) => Ok(LedMode::Modulated),
        (true, false) => Ok(LedMode::On),
        (false, true) => Ok(LedMode::Off),
        (true, true) => Err(SharedError::consistency(format!("{} and {} both set", on, off))),
    }
}

fn write_led_mode(map: &mut RegisterMap, on: &str, off: &str, mode: LedMode) -> Result<()> {
    map.set_flag(on, mode == LedMode::On)?;
    map.set_flag(off, mode == LedMode::Off)
}

impl SensorCalculator for Epc660 {
    fn kind(&self) -> SensorKind {
        SensorKind::Epc660
    }

    fn mod_freq_mhz(&self, map: &RegisterMap) -> Result<f64> {
        Epc660::mod_freq_mhz(self, map)
    }

    fn set_mod_freq_mhz(&self, map: &mut RegisterMap, mhz: f64) -> Result<f64> {
        Epc660::set_mod_freq_mhz(self, map, mhz)
    }

    fn int_times_us(&self, map: &RegisterMap) -> Result<Vec<f64>> {
        Ok(self.int_times_ms(map)?.into_iter().map(|t| t * 1e3).collect())
    }

    fn set_int_times_us(&self, map: &mut RegisterMap, times_us: &[f64]) -> Result<Warnings> {
        let times_ms: Vec<f64> = times_us.iter().map(|t| t / 1e3).collect();
        map.transaction(|m| self.set_int_times_ms(m, &times_ms))
    }

    fn roi(&self, map: &RegisterMap) -> Result<Roi> {
        Epc660::roi(self, map)
    }

    fn set_roi(&self, map: &mut RegisterMap, roi: Roi) -> Result<Warnings> {
        map.transaction(|m| Epc660::set_roi(self, m, roi))?;
        Ok(Warnings::new())
    }

    fn binning(&self, map: &RegisterMap) -> Result<Binning> {
        let (row_enabled, col_enabled) = self.bin_mode(map)?;
        let (row, col) = self.binning_dividers(map)?;
        Ok(Binning::RowColumn {
            row_enabled,
            col_enabled,
            row,
            col,
        })
    }

    fn set_binning(&self, map: &mut RegisterMap, binning: Binning) -> Result<()> {
        match binning {
            Binning::RowColumn {
                row_enabled,
                col_enabled,
                row,
                col,
            } => map.transaction(|m| {
                self.set_binning_dividers(m, row, col)?;
                self.set_bin_mode(m, row_enabled, col_enabled)
            }),
            Binning::Mode(_) => Err(SharedError::range("EPC660 binning is set per row and column")),
        }
    }

    fn image_size(&self, map: &RegisterMap) -> Result<ImageSize> {
        Epc660::image_size(self, map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults;

    const MCLK: f64 = 96.0;

    fn setup() -> (Epc660, RegisterMap) {
        (Epc660::new(Clocks::new(MCLK, 0.0)), defaults::epc660().unwrap())
    }

    fn round2(x: f64) -> f64 {
        (x * 100.0).round() / 100.0
    }

    #[test]
    fn test_mod_freq() {
        let (epc, mut map) = setup();
        assert_eq!(epc.mod_freq_mhz(&map).unwrap(), MCLK / 8.0);

        assert_eq!(epc.set_mod_freq_mhz(&mut map, 4.0).unwrap(), 4.0);
        assert_eq!(epc.mod_freq_mhz(&map).unwrap(), 4.0);

        epc.set_mod_freq_mhz(&mut map, 4.5).unwrap();
        assert_eq!(epc.mod_freq_mhz(&map).unwrap(), 4.8);

        assert!(epc.set_mod_freq_mhz(&mut map, 0.0).unwrap_err().is_range());
    }

    #[test]
    fn test_closest_mod_freq_clamps_divider() {
        let (epc, _) = setup();
        assert_eq!(epc.closest_mod_freq(1000.0).unwrap(), (0, 24.0));
        let (div, _) = epc.closest_mod_freq(0.01).unwrap();
        assert_eq!(div, 255);
    }

    #[test]
    fn test_external_mod() {
        let (_, mut map) = setup();
        let epc = Epc660::new(Clocks::new(MCLK, 80.0));
        assert!(!epc.external_mod(&map).unwrap());

        epc.set_external_mod(&mut map, true).unwrap();
        assert!(epc.external_mod(&map).unwrap());
        assert_eq!(epc.mod_freq_mhz(&map).unwrap(), 20.0);

        // divider is not used with external modulation
        assert_eq!(epc.set_mod_freq_mhz(&mut map, 4.0).unwrap(), 20.0);
        assert_eq!(map.get("mod_clk_div").unwrap(), 1);

        // 4800 ticks of 80 MHz
        assert!((epc.int_times_ms(&map).unwrap()[0] - 0.06).abs() < 1e-12);
    }

    #[test]
    fn test_int_times_single() {
        let (epc, mut map) = setup();
        assert!(!epc.hdr(&map).unwrap());
        assert_eq!(epc.int_times_ms(&map).unwrap().len(), 1);

        for t in [0.1, 0.25, 0.5, 0.75, 1.1] {
            let warnings = epc.set_int_times_ms(&mut map, &[t]).unwrap();
            assert!(warnings.is_empty());
            let times = epc.int_times_ms(&map).unwrap();
            assert_eq!(round2(times[0]), t);
        }
    }

    #[test]
    fn test_int_times_hdr() {
        let (epc, mut map) = setup();
        epc.set_operating_mode(&mut map, OperatingMode::Normal, true).unwrap();
        assert!(epc.hdr(&map).unwrap());
        assert_eq!(epc.int_times_ms(&map).unwrap().len(), 2);

        for (t1, t2) in [(0.1, 0.2), (0.1, 0.5), (0.1, 1.0)] {
            epc.set_int_times_ms(&mut map, &[t1, t2]).unwrap();
            let times = epc.int_times_ms(&map).unwrap();
            assert_eq!(round2(times[0]), t1);
            assert_eq!(round2(times[1]), t2);
        }

        epc.set_int_times_ms(&mut map, &[0.3, 0.3]).unwrap();
        let times = epc.int_times_ms(&map).unwrap();
        assert_eq!(round2(times[0]), 0.3);
        assert_eq!(round2(times[1]), 0.3);
    }

    #[test]
    fn test_int_times_rejects_bad_input() {
        let (epc, mut map) = setup();
        assert!(epc.set_int_times_ms(&mut map, &[]).unwrap_err().is_range());
        assert!(epc.set_int_times_ms(&mut map, &[0.1, 0.2, 0.3]).unwrap_err().is_range());
        assert!(epc.set_int_times_ms(&mut map, &[0.1, 0.2]).unwrap_err().is_consistency());
        assert!(epc.set_int_times_ms(&mut map, &[-1.0]).unwrap_err().is_range());
    }

    #[test]
    fn test_int_len_saturates() {
        let (epc, mut map) = setup();
        // 10000019 is prime, so the multiplier stays at 1
        let ticks_per_ms = MCLK * 1e3 / 2.0;
        let t = 10_000_019.0 / ticks_per_ms;
        let warnings = epc.set_int_times_ms(&mut map, &[t]).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].is_saturation());
        assert_eq!(unpack_16(&map, INT_LEN).unwrap(), MAX_INT_LEN);

        // with HDR only the long time saturates
        epc.set_operating_mode(&mut map, OperatingMode::Normal, true).unwrap();
        let warnings = epc.set_int_times_ms(&mut map, &[1031.0 / ticks_per_ms, t]).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(unpack_16(&map, INT_MULT).unwrap(), 1);
        assert_eq!(unpack_16(&map, INT_LEN).unwrap(), 1030);
        assert_eq!(unpack_16(&map, INT_LEN2).unwrap(), MAX_INT_LEN);
    }

    #[test]
    fn test_best_multiplier() {
        assert_eq!(best_multiplier(&[4800]), 960);
        assert_eq!(best_multiplier(&[4800, 9600]), 960);
        assert_eq!(best_multiplier(&[1021 * 2]), 1021);
        assert_eq!(best_multiplier(&[1031]), 1);
    }

    #[test]
    fn test_int_times_hdr_without_common_multiplier() {
        let (epc, mut map) = setup();
        epc.set_operating_mode(&mut map, OperatingMode::Normal, true).unwrap();
        let ticks_per_ms = MCLK * 1e3 / 2.0;

        // 1031 and 1033 are both prime
        let warnings = epc
            .set_int_times_ms(&mut map, &[1031.0 / ticks_per_ms, 1033.0 / ticks_per_ms])
            .unwrap();
        assert!(warnings.is_empty());
        assert_eq!(unpack_16(&map, INT_MULT).unwrap(), 1);
        assert_eq!(unpack_16(&map, INT_LEN).unwrap(), 1030);
        assert_eq!(unpack_16(&map, INT_LEN2).unwrap(), 1032);
    }

    #[test]
    fn test_int_mult_ceiling() {
        let (epc, mut map) = setup();
        let ticks_per_ms = MCLK * 1e3 / 2.0;

        // 1023 divides the tick count but is above the multiplier limit
        let ticks = 1023.0 * 1022.0;
        let warnings = epc.set_int_times_ms(&mut map, &[ticks / ticks_per_ms]).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(unpack_16(&map, INT_MULT).unwrap(), 1022);
        assert_eq!(unpack_16(&map, INT_LEN).unwrap(), 1022);

        // 2046 = 2 * 3 * 11 * 31; largest divisor up to 1022 is 682
        epc.set_int_times_ms(&mut map, &[2046.0 / ticks_per_ms]).unwrap();
        assert_eq!(unpack_16(&map, INT_MULT).unwrap(), 682);
        assert_eq!(unpack_16(&map, INT_LEN).unwrap(), 2);
    }

    #[test]
    fn test_operating_modes() {
        let (epc, mut map) = setup();
        assert_eq!(epc.operating_mode(&map).unwrap(), OperatingMode::Normal);

        epc.set_operating_mode(&mut map, OperatingMode::DualPhase, false).unwrap();
        assert_eq!(epc.operating_mode(&map).unwrap(), OperatingMode::DualPhase);
        assert!(epc.hdr(&map).unwrap());
        assert!(epc.set_hdr(&mut map, false).unwrap_err().is_consistency());

        epc.set_operating_mode(&mut map, OperatingMode::CommonMode, false).unwrap();
        assert_eq!(epc.operating_mode(&map).unwrap(), OperatingMode::CommonMode);
        assert!(!epc.hdr(&map).unwrap());

        epc.set_operating_mode(&mut map, OperatingMode::Normal, false).unwrap();
        epc.set_hdr(&mut map, true).unwrap();
        assert_eq!(epc.operating_mode(&map).unwrap(), OperatingMode::Normal);
        assert!(epc.hdr(&map).unwrap());

        map.set("num_dcs", 2).unwrap();
        assert!(epc.operating_mode(&map).unwrap_err().is_consistency());
    }

    #[test]
    fn test_phase_steps() {
        let (epc, mut map) = setup();
        assert_eq!(epc.phase_steps(&map).unwrap(), [0, 1, 2, 3]);

        epc.set_phase_steps(&mut map, [0, 2, 1, 3]).unwrap();
        assert_eq!(epc.phase_steps(&map).unwrap(), [0, 2, 1, 3]);
        assert_eq!(map.get("dcs_mgx0_1").unwrap(), 2);

        epc.set_operating_mode(&mut map, OperatingMode::DualPhase, false).unwrap();
        epc.set_phase_steps(&mut map, [3, 2, 1, 0]).unwrap();
        assert_eq!(epc.phase_steps(&map).unwrap(), [3, 2, 1, 0]);
        assert_eq!(map.get("dcs_mgx1_0").unwrap(), 3);
        assert_eq!(map.get("dcs_mgx0_0").unwrap(), 0);

        assert!(epc.set_phase_steps(&mut map, [0, 1, 2, 4]).unwrap_err().is_range());
    }

    #[test]
    fn test_roi_and_binning() {
        let (epc, mut map) = setup();
        epc.set_roi(&mut map, Roi::new(4, 323, 6, 125)).unwrap();
        assert_eq!(epc.image_size(&map).unwrap(), ImageSize { rows: 240, cols: 320 });

        epc.set_bin_mode(&mut map, true, true).unwrap();
        epc.set_binning_dividers(&mut map, 0, 0).unwrap();
        assert_eq!(epc.image_size(&map).unwrap(), ImageSize { rows: 240, cols: 320 });

        epc.set_binning_dividers(&mut map, 0, 1).unwrap();
        assert_eq!(epc.image_size(&map).unwrap(), ImageSize { rows: 240, cols: 160 });

        for (row, rows) in [(1, 120), (2, 60), (3, 30)] {
            epc.set_binning_dividers(&mut map, row, 0).unwrap();
            assert_eq!(epc.image_size(&map).unwrap(), ImageSize { rows, cols: 320 });
        }

        epc.set_bin_mode(&mut map, false, true).unwrap();
        assert_eq!(epc.image_size(&map).unwrap(), ImageSize { rows: 240, cols: 320 });
        assert_eq!(epc.bin_mode(&map).unwrap(), (false, true));

        epc.set_bin_mode(&mut map, false, false).unwrap();
        let roi = Roi::new(50, 269, 6, 125);
        epc.set_roi(&mut map, roi).unwrap();
        assert_eq!(epc.roi(&map).unwrap(), roi);
        assert_eq!(epc.image_size(&map).unwrap(), ImageSize { rows: 240, cols: 220 });

        let roi = Roi::new(50, 269, 76, 125);
        epc.set_roi(&mut map, roi).unwrap();
        assert_eq!(epc.roi(&map).unwrap(), roi);
        assert_eq!(epc.image_size(&map).unwrap(), ImageSize { rows: 100, cols: 220 });

        assert!(epc.set_binning_dividers(&mut map, 4, 0).unwrap_err().is_range());
        assert!(epc.set_binning_dividers(&mut map, 0, 2).unwrap_err().is_range());
    }

    #[test]
    fn test_roi_validation() {
        let (epc, mut map) = setup();
        assert!(epc.set_roi(&mut map, Roi::new(0, 328, 0, 125)).unwrap_err().is_range());
        assert!(epc.set_roi(&mut map, Roi::new(0, 327, 0, 126)).unwrap_err().is_range());
        assert!(epc.set_roi(&mut map, Roi::new(0, 327, 100, 50)).unwrap_err().is_consistency());
        assert!(epc.set_roi(&mut map, Roi::new(200, 100, 0, 125)).unwrap_err().is_consistency());
    }

    #[test]
    fn test_mirrored_roi() {
        let (epc, mut map) = setup();
        epc.set_roi(&mut map, Roi::new(4, 323, 6, 125)).unwrap();
        let mirrored = epc.mirrored_roi(&map).unwrap();
        assert_eq!(mirrored, Roi::new(4, 323, 126, 245));
    }

    #[test]
    fn test_mirrored_roi_rejects_bad_rows() {
        let (epc, mut map) = setup();
        // loaded maps are not validated by set_roi
        map.set("roi_top_lefty", 100).unwrap();
        map.set("roi_bot_righty", 50).unwrap();
        assert!(epc.mirrored_roi(&map).unwrap_err().is_consistency());

        map.set("roi_top_lefty", 252).unwrap();
        map.set("roi_bot_righty", 253).unwrap();
        assert!(epc.mirrored_roi(&map).unwrap_err().is_consistency());
    }

    #[test]
    fn test_light_phase() {
        let (epc, mut map) = setup();
        epc.set_mod_freq_mhz(&mut map, 24.0).unwrap();
        assert_eq!(epc.light_phase(&map, AngleUnit::Degrees).unwrap(), 0.0);

        for phase in [0.0, 45.0, 90.0, 135.0, 180.0] {
            epc.set_light_phase(&mut map, phase, AngleUnit::Degrees).unwrap();
            let read = epc.light_phase(&map, AngleUnit::Degrees).unwrap();
            assert_eq!(read.round(), phase);

            let rad = phase.to_radians();
            epc.set_light_phase(&mut map, rad, AngleUnit::Radians).unwrap();
            let read = epc.light_phase(&map, AngleUnit::Degrees).unwrap();
            assert_eq!(read.round(), phase);
        }

        epc.set_light_phase(&mut map, 0.0, AngleUnit::Degrees).unwrap();
        assert_eq!(map.get("dll_crt").unwrap(), DLL_BYPASS);
    }

    #[test]
    fn test_light_phase_saturates() {
        let (epc, mut map) = setup();
        epc.set_mod_freq_mhz(&mut map, 4.0).unwrap();
        // 250 ns period; 180 degrees is 125 ns, beyond 98 + 7.99 ns
        let warnings = epc.set_light_phase(&mut map, 180.0, AngleUnit::Degrees).unwrap();
        assert_eq!(map.get("coarse_dll").unwrap(), MAX_COARSE_DLL);
        assert_eq!(unpack_16(&map, FINE_DLL).unwrap(), MAX_FINE_DLL);
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().all(|w| w.is_saturation()));
    }

    #[test]
    fn test_led_and_abs() {
        let (epc, mut map) = setup();
        assert_eq!(epc.led_mode(&map, 2).unwrap(), LedMode::Modulated);

        epc.set_led_mode(&mut map, 2, LedMode::Off).unwrap();
        assert_eq!(epc.led_mode(&map, 2).unwrap(), LedMode::Off);
        epc.set_led_mode(&mut map, 2, LedMode::On).unwrap();
        assert_eq!(map.get("led_off_int_2").unwrap(), 0);
        assert_eq!(epc.led_mode(&map, 2).unwrap(), LedMode::On);

        epc.set_gray_led_mode(&mut map, LedMode::Off).unwrap();
        assert_eq!(epc.gray_led_mode(&map).unwrap(), LedMode::Off);

        epc.set_abs(&mut map, 1, true).unwrap();
        assert_eq!(map.get("abs_1").unwrap(), 3);
        assert!(epc.abs_enabled(&map, 1).unwrap());
        assert!(!epc.abs_enabled(&map, 0).unwrap());

        assert!(epc.led_mode(&map, 4).unwrap_err().is_range());
    }

    #[test]
    fn test_trait_binning() {
        let (epc, mut map) = setup();
        let calc: &dyn SensorCalculator = &epc;
        let binning = Binning::RowColumn {
            row_enabled: true,
            col_enabled: false,
            row: 2,
            col: 1,
        };
        calc.set_binning(&mut map, binning).unwrap();
        assert_eq!(calc.binning(&map).unwrap(), binning);
        assert_eq!(map.get("bin_mode").unwrap(), 0b10);
        assert!(calc.set_binning(&mut map, Binning::Mode(1)).unwrap_err().is_range());

        let before = map.clone();
        let bad = Binning::RowColumn {
            row_enabled: true,
            col_enabled: true,
            row: 1,
            col: 3,
        };
        assert!(calc.set_binning(&mut map, bad).is_err());
        assert_eq!(map, before);
    }

    #[test]
    fn test_trait_int_times_in_microseconds() {
        let (epc, mut map) = setup();
        let calc: &dyn SensorCalculator = &epc;
        assert!((calc.int_times_us(&map).unwrap()[0] - 100.0).abs() < 1e-9);
        calc.set_int_times_us(&mut map, &[500.0]).unwrap();
        assert_eq!(round2(epc.int_times_ms(&map).unwrap()[0]), 0.5);
    }
}
