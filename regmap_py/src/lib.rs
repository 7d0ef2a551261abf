/*!
# regmap_py - Register Calculator Bindings

Python access to the register map and the EPC660 / MLX75027 / MLX75026
calculators, for editors and visualizers written in Python.

## Usage

```python
import regmap_py

regs = regmap_py.RegisterMap.from_csv("mlx75027.csv")
mlx = regmap_py.Mlx7502x("mlx75027")

mlx.set_mod_freq(regs, 40.0)
mlx.set_int_times(regs, [500.0, 500.0, 500.0, 500.0])
print(mlx.fps(regs))

regs.to_csv("tuned.csv")
```

Errors map to `ValueError` (value out of range), `RuntimeError`
(inconsistent register state) and `IOError` (files). Clamped values and ROI
parity problems are reported as `RuntimeWarning`s.
*/

use numpy::{PyArray1, ToPyArray};
use pyo3::exceptions::{PyIOError, PyRuntimeError, PyRuntimeWarning, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyModule};
use pyo3::Bound;
use shared::{
    csv_io, defaults, AngleUnit, Binning, CameraConfig, Clocks, Epc660, Mlx7502x, MlxVariant,
    OperatingMode, RegisterImage, RegisterMap, Roi, SensorCalculator, SensorKind, SharedError,
    Warnings,
};
use shared::sensor_limits::MLX_MAX_PHASES;
use tracing::debug;

type RoiTuple = (u32, u32, u32, u32);

fn to_py_err(err: SharedError) -> PyErr {
    let msg = err.to_string();
    match err {
        SharedError::Range(_) => PyErr::new::<PyValueError, _>(msg),
        SharedError::Consistency(_) | SharedError::UnknownField(_) | SharedError::Config(_) => {
            PyErr::new::<PyRuntimeError, _>(msg)
        }
        SharedError::Io(_)
        | SharedError::Csv(_)
        | SharedError::Serde(_)
        | SharedError::InvalidFileFormat(_) => PyErr::new::<PyIOError, _>(msg),
    }
}

fn emit_warnings(py: Python<'_>, warnings: &Warnings) -> PyResult<()> {
    let category = py.get_type_bound::<PyRuntimeWarning>();
    for warning in warnings {
        PyErr::warn_bound(py, category.as_any(), &warning.to_string(), 1)?;
    }
    Ok(())
}

fn roi_from(roi: RoiTuple) -> Roi {
    Roi::new(roi.0, roi.1, roi.2, roi.3)
}

fn roi_tuple(roi: Roi) -> RoiTuple {
    (roi.col_start, roi.col_end, roi.row_start, roi.row_end)
}

fn phase_flags(flags: Vec<bool>) -> PyResult<[bool; MLX_MAX_PHASES]> {
    if flags.len() > MLX_MAX_PHASES {
        return Err(PyErr::new::<PyValueError, _>(format!(
            "{} flags given, at most {} phases",
            flags.len(),
            MLX_MAX_PHASES
        )));
    }
    let mut out = [false; MLX_MAX_PHASES];
    out[..flags.len()].copy_from_slice(&flags);
    Ok(out)
}

/// Python wrapper for the register map
#[pyclass(name = "RegisterMap")]
pub struct PyRegisterMap {
    inner: RegisterMap,
}

impl PyRegisterMap {
    /// Run a setter against the map, committing only on success
    fn update<T, F>(&mut self, f: F) -> PyResult<T>
    where
        F: FnOnce(&mut RegisterMap) -> shared::Result<T>,
    {
        self.inner.transaction(f).map_err(to_py_err)
    }
}

#[pymethods]
impl PyRegisterMap {
    /// Built-in default map for `sensor` ("epc660", "mlx75027", "mlx75026"),
    /// or an empty map
    #[new]
    #[pyo3(signature = (sensor=None))]
    fn new(sensor: Option<&str>) -> PyResult<Self> {
        let inner = match sensor {
            Some(name) => {
                let kind: SensorKind = name.parse().map_err(to_py_err)?;
                defaults::for_kind(kind).map_err(to_py_err)?
            }
            None => RegisterMap::new(),
        };
        Ok(PyRegisterMap { inner })
    }

    /// Load a map from a field CSV file
    #[staticmethod]
    fn from_csv(path: &str) -> PyResult<Self> {
        let inner = RegisterMap::from_csv_file(path).map_err(to_py_err)?;
        Ok(PyRegisterMap { inner })
    }

    fn to_csv(&self, path: &str) -> PyResult<()> {
        self.inner.to_csv_file(path).map_err(to_py_err)
    }

    /// Write the register-only CSV
    fn export_registers(&self, path: &str) -> PyResult<()> {
        csv_io::export_registers(path, &self.inner).map_err(to_py_err)
    }

    /// Apply a register-only CSV; returns the number of fields updated
    fn import_registers(&mut self, path: &str) -> PyResult<usize> {
        let image = csv_io::import_registers(path).map_err(to_py_err)?;
        Ok(self.inner.apply_registers(&image))
    }

    fn get(&self, name: &str) -> PyResult<u32> {
        self.inner.get(name).map_err(to_py_err)
    }

    fn set(&mut self, name: &str, value: u32) -> PyResult<()> {
        self.inner.set(name, value).map_err(to_py_err)
    }

    /// Field metadata as a dict
    fn field<'py>(&self, py: Python<'py>, name: &str) -> PyResult<Bound<'py, PyDict>> {
        let field = self.inner.field(name).map_err(to_py_err)?;
        let dict = PyDict::new_bound(py);
        dict.set_item("name", &field.name)?;
        dict.set_item("address", field.register_address)?;
        dict.set_item("bits", field.bits.to_string())?;
        dict.set_item("value", field.value())?;
        dict.set_item("section", &field.section)?;
        dict.set_item("description", &field.description)?;
        dict.set_item("value_meaning", &field.value_meaning)?;
        Ok(dict)
    }

    fn names(&self) -> Vec<String> {
        self.inner.names().map(str::to_string).collect()
    }

    /// Register address to folded value
    fn to_registers(&self) -> RegisterImage {
        self.inner.to_registers()
    }

    fn apply_registers(&mut self, registers: RegisterImage) -> usize {
        self.inner.apply_registers(&registers)
    }

    fn sensor_kind(&self) -> PyResult<String> {
        SensorKind::detect(&self.inner)
            .map(|kind| kind.to_string())
            .map_err(to_py_err)
    }

    /// Save a JSON register snapshot
    #[pyo3(signature = (path, mclk_mhz=96.0))]
    fn save_snapshot(&self, path: &str, mclk_mhz: f64) -> PyResult<()> {
        let kind = SensorKind::detect(&self.inner).map_err(to_py_err)?;
        CameraConfig::capture(&self.inner, kind, Clocks::new(mclk_mhz, 0.0))
            .save_to_file(path)
            .map_err(to_py_err)
    }

    /// Restore a JSON register snapshot; returns the number of fields
    /// updated
    fn load_snapshot(&mut self, path: &str) -> PyResult<usize> {
        let snapshot = CameraConfig::load_from_file(path).map_err(to_py_err)?;
        self.update(|m| snapshot.apply_to(m))
    }

    fn copy(&self) -> Self {
        PyRegisterMap {
            inner: self.inner.clone(),
        }
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn __contains__(&self, name: &str) -> bool {
        self.inner.contains(name)
    }

    fn __repr__(&self) -> String {
        match SensorKind::detect(&self.inner) {
            Ok(kind) => format!("RegisterMap({}, {} fields)", kind, self.inner.len()),
            Err(_) => format!("RegisterMap({} fields)", self.inner.len()),
        }
    }
}

fn parse_operating_mode(mode: &str) -> PyResult<OperatingMode> {
    match mode.to_ascii_lowercase().as_str() {
        "normal" => Ok(OperatingMode::Normal),
        "dual_phase" | "dualphase" => Ok(OperatingMode::DualPhase),
        "common_mode" | "commonmode" | "grayscale" => Ok(OperatingMode::CommonMode),
        _ => Err(PyErr::new::<PyValueError, _>(format!("Unknown operating mode: '{}'", mode))),
    }
}

fn angle_unit(degrees: bool) -> AngleUnit {
    if degrees {
        AngleUnit::Degrees
    } else {
        AngleUnit::Radians
    }
}

/// EPC660 calculator
#[pyclass(name = "Epc660")]
pub struct PyEpc660 {
    calc: Epc660,
}

#[pymethods]
impl PyEpc660 {
    #[new]
    #[pyo3(signature = (mclk_mhz=96.0, demod_clk_mhz=0.0))]
    fn new(mclk_mhz: f64, demod_clk_mhz: f64) -> Self {
        PyEpc660 {
            calc: Epc660::new(Clocks::new(mclk_mhz, demod_clk_mhz)),
        }
    }

    fn mod_freq(&self, map: &PyRegisterMap) -> PyResult<f64> {
        self.calc.mod_freq_mhz(&map.inner).map_err(to_py_err)
    }

    /// Returns the achieved frequency in MHz
    fn set_mod_freq(&self, map: &mut PyRegisterMap, mhz: f64) -> PyResult<f64> {
        map.update(|m| self.calc.set_mod_freq_mhz(m, mhz))
    }

    fn external_mod(&self, map: &PyRegisterMap) -> PyResult<bool> {
        self.calc.external_mod(&map.inner).map_err(to_py_err)
    }

    fn set_external_mod(&self, map: &mut PyRegisterMap, external: bool) -> PyResult<()> {
        map.update(|m| self.calc.set_external_mod(m, external))
    }

    /// "normal", "dual_phase" or "common_mode"
    fn operating_mode(&self, map: &PyRegisterMap) -> PyResult<String> {
        let mode = self.calc.operating_mode(&map.inner).map_err(to_py_err)?;
        Ok(match mode {
            OperatingMode::Normal => "normal",
            OperatingMode::DualPhase => "dual_phase",
            OperatingMode::CommonMode => "common_mode",
        }
        .to_string())
    }

    #[pyo3(signature = (map, mode, hdr=false))]
    fn set_operating_mode(&self, map: &mut PyRegisterMap, mode: &str, hdr: bool) -> PyResult<()> {
        let mode = parse_operating_mode(mode)?;
        map.update(|m| self.calc.set_operating_mode(m, mode, hdr))
    }

    fn hdr(&self, map: &PyRegisterMap) -> PyResult<bool> {
        self.calc.hdr(&map.inner).map_err(to_py_err)
    }

    fn set_hdr(&self, map: &mut PyRegisterMap, on: bool) -> PyResult<()> {
        map.update(|m| self.calc.set_hdr(m, on))
    }

    /// Integration times in milliseconds
    fn int_times<'py>(&self, py: Python<'py>, map: &PyRegisterMap) -> PyResult<Bound<'py, PyArray1<f64>>> {
        let times = self.calc.int_times_ms(&map.inner).map_err(to_py_err)?;
        Ok(times.to_pyarray_bound(py))
    }

    fn set_int_times(&self, py: Python<'_>, map: &mut PyRegisterMap, times_ms: Vec<f64>) -> PyResult<()> {
        let warnings = map.update(|m| self.calc.set_int_times_ms(m, &times_ms))?;
        emit_warnings(py, &warnings)
    }

    fn phase_steps(&self, map: &PyRegisterMap) -> PyResult<Vec<u8>> {
        Ok(self.calc.phase_steps(&map.inner).map_err(to_py_err)?.to_vec())
    }

    fn set_phase_steps(&self, map: &mut PyRegisterMap, steps: [u8; 4]) -> PyResult<()> {
        map.update(|m| self.calc.set_phase_steps(m, steps))
    }

    /// (col_start, col_end, row_start, row_end)
    fn roi(&self, map: &PyRegisterMap) -> PyResult<RoiTuple> {
        Ok(roi_tuple(self.calc.roi(&map.inner).map_err(to_py_err)?))
    }

    fn set_roi(&self, map: &mut PyRegisterMap, roi: RoiTuple) -> PyResult<()> {
        map.update(|m| self.calc.set_roi(m, roi_from(roi)))
    }

    fn mirrored_roi(&self, map: &PyRegisterMap) -> PyResult<RoiTuple> {
        Ok(roi_tuple(self.calc.mirrored_roi(&map.inner).map_err(to_py_err)?))
    }

    /// (row_enabled, col_enabled, row_divider_exp, col_divider_exp)
    fn binning(&self, map: &PyRegisterMap) -> PyResult<(bool, bool, u8, u8)> {
        let (row_enabled, col_enabled) = self.calc.bin_mode(&map.inner).map_err(to_py_err)?;
        let (row, col) = self.calc.binning_dividers(&map.inner).map_err(to_py_err)?;
        Ok((row_enabled, col_enabled, row, col))
    }

    fn set_binning(&self, map: &mut PyRegisterMap, binning: (bool, bool, u8, u8)) -> PyResult<()> {
        let (row_enabled, col_enabled, row, col) = binning;
        let binning = Binning::RowColumn {
            row_enabled,
            col_enabled,
            row,
            col,
        };
        map.update(|m| SensorCalculator::set_binning(&self.calc, m, binning))
    }

    /// (rows, cols)
    fn image_size(&self, map: &PyRegisterMap) -> PyResult<(u32, u32)> {
        let size = self.calc.image_size(&map.inner).map_err(to_py_err)?;
        Ok((size.rows, size.cols))
    }

    #[pyo3(signature = (map, degrees=true))]
    fn light_phase(&self, map: &PyRegisterMap, degrees: bool) -> PyResult<f64> {
        self.calc
            .light_phase(&map.inner, angle_unit(degrees))
            .map_err(to_py_err)
    }

    #[pyo3(signature = (map, phase, degrees=true))]
    fn set_light_phase(&self, py: Python<'_>, map: &mut PyRegisterMap, phase: f64, degrees: bool) -> PyResult<()> {
        let warnings = map.update(|m| self.calc.set_light_phase(m, phase, angle_unit(degrees)))?;
        emit_warnings(py, &warnings)
    }
}

/// MLX75027 / MLX75026 calculator
#[pyclass(name = "Mlx7502x")]
pub struct PyMlx7502x {
    calc: Mlx7502x,
}

#[pymethods]
impl PyMlx7502x {
    /// `variant` is "mlx75027" or "mlx75026"
    #[new]
    #[pyo3(signature = (variant="mlx75027"))]
    fn new(variant: &str) -> PyResult<Self> {
        let kind: SensorKind = variant.parse().map_err(to_py_err)?;
        let variant = MlxVariant::from_kind(kind)
            .ok_or_else(|| PyErr::new::<PyValueError, _>(format!("{} is not an MLX7502x sensor", kind)))?;
        debug!("Created {} calculator", kind);
        Ok(PyMlx7502x {
            calc: Mlx7502x::new(variant),
        })
    }

    #[getter]
    fn variant(&self) -> String {
        self.calc.variant().kind().to_string()
    }

    fn check(&self, map: &PyRegisterMap) -> PyResult<()> {
        self.calc.check(&map.inner).map_err(to_py_err)
    }

    fn lanes(&self, map: &PyRegisterMap) -> PyResult<u8> {
        self.calc.lanes(&map.inner).map_err(to_py_err)
    }

    fn set_lanes(&self, map: &mut PyRegisterMap, lanes: u8) -> PyResult<()> {
        map.update(|m| self.calc.set_lanes(m, lanes))
    }

    fn output_mode(&self, map: &PyRegisterMap) -> PyResult<u32> {
        self.calc.output_mode(&map.inner).map_err(to_py_err)
    }

    fn set_output_mode(&self, map: &mut PyRegisterMap, mode: u32) -> PyResult<()> {
        map.update(|m| self.calc.set_output_mode(m, mode))
    }

    fn hmax(&self, map: &PyRegisterMap) -> PyResult<u32> {
        self.calc.hmax(&map.inner).map_err(to_py_err)
    }

    fn set_hmax(&self, map: &mut PyRegisterMap, hmax: u32) -> PyResult<()> {
        map.update(|m| self.calc.set_hmax(m, hmax))
    }

    /// MIPI speed in Mbps
    fn speed(&self, map: &PyRegisterMap) -> PyResult<u32> {
        self.calc.speed(&map.inner).map_err(to_py_err)
    }

    /// Returns the HMAX written
    fn set_speed(&self, map: &mut PyRegisterMap, speed_mbps: u32) -> PyResult<u32> {
        map.update(|m| self.calc.set_speed(m, speed_mbps))
    }

    fn refresh_derived(&self, map: &mut PyRegisterMap) -> PyResult<()> {
        map.update(|m| self.calc.refresh_derived(m))
    }

    fn mod_freq(&self, map: &PyRegisterMap) -> PyResult<f64> {
        self.calc.mod_freq_mhz(&map.inner).map_err(to_py_err)
    }

    fn set_mod_freq(&self, map: &mut PyRegisterMap, mhz: f64) -> PyResult<f64> {
        map.update(|m| self.calc.set_mod_freq_mhz(m, mhz))
    }

    fn duty_cycle(&self, map: &PyRegisterMap) -> PyResult<f64> {
        self.calc.duty_cycle(&map.inner).map_err(to_py_err)
    }

    fn set_duty_cycle(&self, py: Python<'_>, map: &mut PyRegisterMap, duty: f64) -> PyResult<()> {
        let warnings = map.update(|m| self.calc.set_duty_cycle(m, duty))?;
        emit_warnings(py, &warnings)
    }

    fn analog_delay(&self, map: &PyRegisterMap) -> PyResult<f64> {
        self.calc.analog_delay_us(&map.inner).map_err(to_py_err)
    }

    fn set_analog_delay(&self, py: Python<'_>, map: &mut PyRegisterMap, delay_us: f64) -> PyResult<()> {
        let warnings = map.update(|m| self.calc.set_analog_delay_us(m, delay_us))?;
        emit_warnings(py, &warnings)
    }

    fn nraw(&self, map: &PyRegisterMap) -> PyResult<u32> {
        self.calc.nraw(&map.inner).map_err(to_py_err)
    }

    fn set_nraw(&self, map: &mut PyRegisterMap, nraw: u32) -> PyResult<()> {
        map.update(|m| self.calc.set_nraw(m, nraw))
    }

    fn phase_shifts<'py>(&self, py: Python<'py>, map: &PyRegisterMap) -> PyResult<Bound<'py, PyArray1<f64>>> {
        let shifts = self.calc.phase_shifts(&map.inner).map_err(to_py_err)?;
        Ok(shifts[..].to_pyarray_bound(py))
    }

    fn set_phase_shifts(&self, map: &mut PyRegisterMap, shifts: Vec<f64>) -> PyResult<()> {
        map.update(|m| self.calc.set_phase_shifts(m, &shifts))
    }

    fn leden(&self, map: &PyRegisterMap) -> PyResult<Vec<bool>> {
        Ok(self.calc.leden(&map.inner).map_err(to_py_err)?.to_vec())
    }

    fn set_leden(&self, map: &mut PyRegisterMap, flags: Vec<bool>) -> PyResult<()> {
        let flags = phase_flags(flags)?;
        map.update(|m| self.calc.set_leden(m, flags))
    }

    fn preheat(&self, map: &PyRegisterMap) -> PyResult<Vec<bool>> {
        Ok(self.calc.preheat(&map.inner).map_err(to_py_err)?.to_vec())
    }

    fn set_preheat(&self, map: &mut PyRegisterMap, flags: Vec<bool>) -> PyResult<()> {
        let flags = phase_flags(flags)?;
        map.update(|m| self.calc.set_preheat(m, flags))
    }

    fn premix(&self, map: &PyRegisterMap) -> PyResult<Vec<bool>> {
        Ok(self.calc.premix(&map.inner).map_err(to_py_err)?.to_vec())
    }

    fn set_premix(&self, map: &mut PyRegisterMap, flags: Vec<bool>) -> PyResult<()> {
        let flags = phase_flags(flags)?;
        map.update(|m| self.calc.set_premix(m, flags))
    }

    fn pretime(&self, map: &PyRegisterMap) -> PyResult<f64> {
        self.calc.pretime_us(&map.inner).map_err(to_py_err)
    }

    fn set_pretime(&self, map: &mut PyRegisterMap, pretime_us: f64) -> PyResult<()> {
        map.update(|m| self.calc.set_pretime_us(m, pretime_us))
    }

    /// Integration time of all 8 phases in microseconds
    fn int_times<'py>(&self, py: Python<'py>, map: &PyRegisterMap) -> PyResult<Bound<'py, PyArray1<f64>>> {
        let times = self.calc.int_times_us(&map.inner).map_err(to_py_err)?;
        Ok(times[..].to_pyarray_bound(py))
    }

    fn set_int_times(&self, map: &mut PyRegisterMap, times_us: Vec<f64>) -> PyResult<()> {
        map.update(|m| self.calc.set_int_times_us(m, &times_us))
    }

    fn idle_times<'py>(&self, py: Python<'py>, map: &PyRegisterMap) -> PyResult<Bound<'py, PyArray1<f64>>> {
        let times = self.calc.idle_times_us(&map.inner).map_err(to_py_err)?;
        Ok(times[..].to_pyarray_bound(py))
    }

    fn set_idle_times(&self, py: Python<'_>, map: &mut PyRegisterMap, times_us: Vec<f64>) -> PyResult<()> {
        let warnings = map.update(|m| self.calc.set_idle_times_us(m, &times_us))?;
        emit_warnings(py, &warnings)
    }

    fn startup_time(&self, map: &PyRegisterMap) -> PyResult<f64> {
        self.calc.startup_time_us(&map.inner).map_err(to_py_err)
    }

    fn set_startup_time(&self, py: Python<'_>, map: &mut PyRegisterMap, time_us: f64) -> PyResult<()> {
        let warnings = map.update(|m| self.calc.set_startup_time_us(m, time_us))?;
        emit_warnings(py, &warnings)
    }

    fn phase_times<'py>(&self, py: Python<'py>, map: &PyRegisterMap) -> PyResult<Bound<'py, PyArray1<f64>>> {
        let times = self.calc.phase_times_us(&map.inner).map_err(to_py_err)?;
        Ok(times[..].to_pyarray_bound(py))
    }

    #[pyo3(signature = (map, use_frame_time=true))]
    fn frame_time(&self, map: &PyRegisterMap, use_frame_time: bool) -> PyResult<f64> {
        self.calc
            .frame_time_us(&map.inner, use_frame_time)
            .map_err(to_py_err)
    }

    fn set_frame_time(&self, map: &mut PyRegisterMap, time_us: f64) -> PyResult<()> {
        map.update(|m| self.calc.set_frame_time_us(m, time_us))
    }

    fn deadtime(&self, map: &PyRegisterMap) -> PyResult<f64> {
        self.calc.deadtime_us(&map.inner).map_err(to_py_err)
    }

    fn set_deadtime(&self, map: &mut PyRegisterMap, dead_us: f64) -> PyResult<()> {
        map.update(|m| self.calc.set_deadtime_us(m, dead_us))
    }

    /// (depth_fps, raw_fps)
    fn fps(&self, map: &PyRegisterMap) -> PyResult<(f64, f64)> {
        self.calc.fps(&map.inner).map_err(to_py_err)
    }

    fn roi(&self, map: &PyRegisterMap) -> PyResult<RoiTuple> {
        Ok(roi_tuple(self.calc.roi(&map.inner).map_err(to_py_err)?))
    }

    fn set_roi(&self, py: Python<'_>, map: &mut PyRegisterMap, roi: RoiTuple) -> PyResult<()> {
        let warnings = map.update(|m| self.calc.set_roi(m, roi_from(roi)))?;
        emit_warnings(py, &warnings)
    }

    /// Fit the ROI to the binning mode and write both; returns the ROI used
    fn set_binned_roi(&self, py: Python<'_>, map: &mut PyRegisterMap, roi: RoiTuple, mode: u8) -> PyResult<RoiTuple> {
        let (fitted, warnings) = map.update(|m| self.calc.set_binned_roi(m, roi_from(roi), mode))?;
        emit_warnings(py, &warnings)?;
        Ok(roi_tuple(fitted))
    }

    fn binning(&self, map: &PyRegisterMap) -> PyResult<u8> {
        self.calc.binning(&map.inner).map_err(to_py_err)
    }

    fn set_binning(&self, map: &mut PyRegisterMap, mode: u8) -> PyResult<()> {
        map.update(|m| self.calc.set_binning(m, mode))
    }

    /// (rows, cols)
    fn image_size(&self, map: &PyRegisterMap) -> PyResult<(u32, u32)> {
        let size = self.calc.image_size(&map.inner).map_err(to_py_err)?;
        Ok((size.rows, size.cols))
    }
}

/// Python module definition
#[pymodule]
fn regmap_py(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyRegisterMap>()?;
    m.add_class::<PyEpc660>()?;
    m.add_class::<PyMlx7502x>()?;
    m.add("__version__", shared::VERSION)?;

    // Add module docstring
    m.add("__doc__", "Register calculator for EPC660 and MLX75027/75026 time-of-flight sensors")?;

    Ok(())
}
