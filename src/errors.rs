use std::io;
use thiserror::Error;

/// Errors surfaced by the byte-source side of the crate.
///
/// Frame-level anomalies (bad checksums, truncated records) are not errors:
/// they are reported through [`crate::ParseResult`] and the parser counters.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serial error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("payload too long: {len} bytes (max 255)")]
    PayloadTooLong { len: usize },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, DriverError>;
