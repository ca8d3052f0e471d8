//! Logging setup.
//!
//! The library only emits records through the `log` facade. Binaries install
//! `env_logger`; the Python extension forwards records into `logging`.

use std::sync::Once;

use env_logger::Env;
use log::LevelFilter;

#[cfg(feature = "python")]
pub use self::python::{init_python_logging, reset_python_logging_cache, set_python_log_level_str};

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "THINKGEAR_LOG";

static RUST_LOG_ONCE: Once = Once::new();

fn env_level() -> LevelFilter {
    std::env::var(LOG_ENV_VAR)
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .as_deref()
        .and_then(|v| v.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info)
}

fn level_to_str(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}

fn parse_level(input: Option<&str>) -> Option<LevelFilter> {
    input.and_then(|s| s.parse::<LevelFilter>().ok())
}

/// Initialize logging for Rust binaries (stderr formatter) based on `THINKGEAR_LOG`/`RUST_LOG`.
pub fn init_rust_logging() {
    init_rust_logging_with(None);
}

/// Like [`init_rust_logging`], but an explicit level (e.g. from a CLI flag)
/// takes precedence over the environment. Unparsable levels are ignored.
pub fn init_rust_logging_with(level: Option<&str>) {
    let explicit = parse_level(level);
    RUST_LOG_ONCE.call_once(|| {
        let mut builder = match explicit {
            Some(level) => {
                let mut b = env_logger::Builder::new();
                b.filter_level(level);
                b
            }
            None => {
                let env = Env::default().filter_or(LOG_ENV_VAR, level_to_str(env_level()));
                env_logger::Builder::from_env(env)
            }
        };
        builder
            .format_timestamp_millis()
            .format_module_path(true)
            .format_target(true)
            .init();
    });
}

#[cfg(feature = "python")]
mod python {
    use std::collections::HashMap;
    use std::sync::{Mutex, Once};

    use log::{Level, LevelFilter, Log, Metadata, Record};
    use once_cell::sync::OnceCell;
    use pyo3::prelude::*;
    use pyo3::types::{PyAny, PyModule};

    use super::{env_level, parse_level};

    static PY_LOG_ONCE: Once = Once::new();
    static BRIDGE: OnceCell<&'static PyLogBridge> = OnceCell::new();

    /// Forwards `log` records to `logging.getLogger(<target with dots>)`.
    struct PyLogBridge {
        filter: Mutex<LevelFilter>,
        logging_mod: Py<PyModule>,
        loggers: Mutex<HashMap<String, Py<PyAny>>>,
    }

    fn py_level(level: Level) -> u32 {
        match level {
            Level::Error => 40,
            Level::Warn => 30,
            Level::Info => 20,
            Level::Debug => 10,
            Level::Trace => 5,
        }
    }

    impl PyLogBridge {
        fn logger_for(&self, py: Python<'_>, target: &str) -> PyResult<Py<PyAny>> {
            let mut loggers = self.loggers.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(logger) = loggers.get(target) {
                return Ok(logger.clone_ref(py));
            }
            let logger = self
                .logging_mod
                .bind(py)
                .call_method1("getLogger", (target,))?
                .unbind();
            loggers.insert(target.to_string(), logger.clone_ref(py));
            Ok(logger)
        }

        fn forward(&self, record: &Record) -> PyResult<()> {
            let target = record.target().replace("::", ".");
            let level = py_level(record.level());
            let message = record.args().to_string();
            Python::attach(|py| {
                let logger = self.logger_for(py, &target)?;
                let logger = logger.bind(py);
                if logger.call_method1("isEnabledFor", (level,))?.is_truthy()? {
                    logger.call_method1("log", (level, message))?;
                }
                Ok(())
            })
        }
    }

    impl Log for PyLogBridge {
        fn enabled(&self, metadata: &Metadata) -> bool {
            let filter = *self.filter.lock().unwrap_or_else(|e| e.into_inner());
            metadata.level().to_level_filter() <= filter
        }

        fn log(&self, record: &Record) {
            if !self.enabled(record.metadata()) {
                return;
            }
            if let Err(e) = self.forward(record) {
                Python::attach(|py| e.restore(py));
            }
        }

        fn flush(&self) {}
    }

    fn bridge(py: Python<'_>, level: LevelFilter) -> PyResult<&'static PyLogBridge> {
        BRIDGE
            .get_or_try_init(|| {
                let logging = py.import("logging")?;
                let bridge = PyLogBridge {
                    filter: Mutex::new(level),
                    logging_mod: logging.unbind(),
                    loggers: Mutex::new(HashMap::new()),
                };
                Ok::<_, PyErr>(&*Box::leak(Box::new(bridge)))
            })
            .copied()
    }

    /// Install the bridge so Rust logs flow into Python's `logging`.
    /// Safe to call multiple times; the logger is installed on first call.
    pub fn init_python_logging(py: Python<'_>) -> PyResult<()> {
        let level = env_level();
        let bridge = bridge(py, level)?;
        PY_LOG_ONCE.call_once(|| {
            if log::set_logger(bridge).is_ok() {
                log::set_max_level(level);
            }
        });
        Ok(())
    }

    /// Drop cached Python loggers (call after reconfiguring Python logging).
    pub fn reset_python_logging_cache() {
        if let Some(bridge) = BRIDGE.get() {
            if let Ok(mut loggers) = bridge.loggers.lock() {
                loggers.clear();
            }
        }
    }

    /// Set the bridge level from a string, falling back to the environment.
    pub fn set_python_log_level_str(py: Python<'_>, level: Option<&str>) -> PyResult<()> {
        let level = parse_level(level).unwrap_or_else(env_level);
        init_python_logging(py)?;
        if let Some(bridge) = BRIDGE.get() {
            if let Ok(mut filter) = bridge.filter.lock() {
                *filter = level;
            }
        }
        reset_python_logging_cache();
        log::set_max_level(level);
        Ok(())
    }
}
