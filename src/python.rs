use pyo3::exceptions::{PyConnectionError, PyIOError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyDict};

use crate::errors::DriverError;
use crate::headset::{Headset, HeadsetConfig};
use crate::logging;
use crate::parser::{ParseResult, Parser};
use crate::protocol::{self, DEFAULT_BAUD_RATE, SYNC_BYTE};
use crate::sample::{EegPower, Sample};

fn to_py_err(e: DriverError) -> PyErr {
    match e {
        DriverError::Serial(e) => PyConnectionError::new_err(e.to_string()),
        DriverError::Io(e) => PyIOError::new_err(e.to_string()),
        other => PyValueError::new_err(other.to_string()),
    }
}

/// Snapshot of decoded headset values.
///
/// Fields persist across frames: each one holds the last value the headset
/// sent for it, not necessarily from the latest frame.
#[pyclass(name = "Sample", frozen, eq)]
#[derive(Clone, PartialEq, Eq)]
struct PySample {
    #[pyo3(get)]
    poor_signal: u8,
    #[pyo3(get)]
    attention: u8,
    #[pyo3(get)]
    meditation: u8,
    #[pyo3(get)]
    heart_rate: u8,
    #[pyo3(get)]
    blink_strength: u8,
    #[pyo3(get)]
    raw_wave: i16,
    #[pyo3(get)]
    is_stat_packet: bool,
    #[pyo3(get)]
    earphone_misfit: bool,
    eeg_power: EegPower,
}

#[pymethods]
impl PySample {
    /// EEG band powers in wire order (delta .. mid_gamma).
    #[getter]
    fn eeg_power(&self) -> Vec<u32> {
        self.eeg_power.to_array().to_vec()
    }

    fn to_dict<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let dict = PyDict::new(py);
        dict.set_item("poor_signal", self.poor_signal)?;
        dict.set_item("attention", self.attention)?;
        dict.set_item("meditation", self.meditation)?;
        dict.set_item("heart_rate", self.heart_rate)?;
        dict.set_item("blink_strength", self.blink_strength)?;
        dict.set_item("raw_wave", self.raw_wave)?;
        dict.set_item("is_stat_packet", self.is_stat_packet)?;
        dict.set_item("earphone_misfit", self.earphone_misfit)?;
        for (name, value) in EegPower::BANDS.iter().zip(self.eeg_power.to_array()) {
            dict.set_item(*name, value)?;
        }
        Ok(dict)
    }

    fn __repr__(&self) -> String {
        format!(
            "Sample(signal={}, attention={}, meditation={}, raw={}, stat={})",
            self.poor_signal, self.attention, self.meditation, self.raw_wave, self.is_stat_packet
        )
    }
}

impl From<&Sample> for PySample {
    fn from(s: &Sample) -> Self {
        PySample {
            poor_signal: s.poor_signal,
            attention: s.attention,
            meditation: s.meditation,
            heart_rate: s.heart_rate,
            blink_strength: s.blink_strength,
            raw_wave: s.raw_wave,
            is_stat_packet: s.is_stat_packet,
            earphone_misfit: s.earphone_misfit,
            eeg_power: s.eeg_power,
        }
    }
}

/// Byte-at-a-time ThinkGear decoder.
///
/// Example:
///     >>> p = Parser()
///     >>> samples = p.feed_bytes(port.read(4096))
#[pyclass(name = "Parser")]
struct PyParser {
    inner: Parser,
}

#[pymethods]
impl PyParser {
    #[new]
    fn new() -> Self {
        PyParser {
            inner: Parser::new(),
        }
    }

    /// Feed one byte. Returns 0 (in progress), 1 (complete) or 2 (checksum error).
    fn feed(&mut self, byte: u8) -> u8 {
        self.inner.feed(byte) as u8
    }

    /// Feed a chunk and return a snapshot for every completed frame.
    fn feed_bytes(&mut self, data: &[u8]) -> Vec<PySample> {
        let mut out = Vec::new();
        self.inner.feed_slice(data, |s| out.push(PySample::from(s)));
        out
    }

    #[getter]
    fn sample(&self) -> PySample {
        PySample::from(self.inner.sample())
    }

    fn clear_earphone_misfit(&mut self) {
        self.inner.clear_earphone_misfit();
    }

    /// Cumulative decoder counters.
    fn stats<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let s = self.inner.stats();
        let dict = PyDict::new(py);
        dict.set_item("frames", s.frames)?;
        dict.set_item("checksum_errors", s.checksum_errors)?;
        dict.set_item("truncated_scans", s.truncated_scans)?;
        dict.set_item("aborted_scans", s.aborted_scans)?;
        dict.set_item("unknown_codes", s.unknown_codes)?;
        dict.set_item("unconsumed_debug_records", s.unconsumed_debug_records)?;
        Ok(dict)
    }

    fn __repr__(&self) -> String {
        format!("Parser(state={:?}, frames={})", self.inner.state(), self.inner.stats().frames)
    }
}

/// Headset on a serial port.
///
/// Args:
///     path: Serial device (e.g. "/dev/ttyUSB0" or "COM3").
///     baud: Baud rate. Default: 57600.
#[pyclass(name = "Headset", unsendable)]
struct PyHeadset {
    inner: Headset,
}

#[pymethods]
impl PyHeadset {
    #[new]
    #[pyo3(signature = (path, baud=DEFAULT_BAUD_RATE))]
    fn new(path: &str, baud: u32) -> PyResult<Self> {
        let config = HeadsetConfig {
            baud_rate: baud,
            ..HeadsetConfig::new(path)
        };
        Headset::open_serial(&config)
            .map(|inner| PyHeadset { inner })
            .map_err(to_py_err)
    }

    /// Read up to `n_samples` snapshots; fewer if the port times out.
    #[pyo3(signature = (n_samples=1))]
    fn read(&mut self, n_samples: usize) -> PyResult<Vec<PySample>> {
        self.inner
            .read_samples(n_samples)
            .map(|batch| batch.samples.iter().map(PySample::from).collect())
            .map_err(to_py_err)
    }
}

/// Wrap a payload into a complete frame.
#[pyfunction]
fn encode_frame<'py>(py: Python<'py>, payload: &[u8]) -> PyResult<Bound<'py, PyBytes>> {
    let frame = protocol::encode_frame(payload).map_err(to_py_err)?;
    Ok(PyBytes::new(py, &frame))
}

/// Route Rust log records into Python's `logging` at the given level.
#[pyfunction]
#[pyo3(signature = (level=None))]
fn set_log_level(py: Python<'_>, level: Option<&str>) -> PyResult<()> {
    logging::set_python_log_level_str(py, level)
}

#[pymodule]
fn thinkgear_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    logging::init_python_logging(m.py())?;

    m.add_class::<PyParser>()?;
    m.add_class::<PySample>()?;
    m.add_class::<PyHeadset>()?;
    m.add_function(wrap_pyfunction!(encode_frame, m)?)?;
    m.add_function(wrap_pyfunction!(set_log_level, m)?)?;

    m.add("SYNC_BYTE", SYNC_BYTE)?;
    m.add("DEFAULT_BAUD_RATE", DEFAULT_BAUD_RATE)?;
    m.add("PARSE_IN_PROGRESS", ParseResult::InProgress as u8)?;
    m.add("PARSE_COMPLETE", ParseResult::Complete as u8)?;
    m.add("PARSE_CHECKSUM_ERROR", ParseResult::ChecksumError as u8)?;

    Ok(())
}
