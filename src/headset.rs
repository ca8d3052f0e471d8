//! Headset byte-source adapter.
//!
//! Pulls bytes from a serial port (or any [`Read`] source), drives a
//! [`Parser`] and hands back snapshots of the decoded [`Sample`].
//!
//! # Timing
//!
//! TGAM modules stream at 57600 baud: one raw-wave frame every ~2 ms and one
//! stat frame (poor signal, band powers, eSense values) about once a second.
//! The module sends no timestamps, so batches carry the host time at which the
//! read started.

use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::errors::{DriverError, Result};
use crate::parser::{ParseResult, Parser};
use crate::protocol::DEFAULT_BAUD_RATE;
use crate::sample::Sample;

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for serial reads
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Size of the intermediate read buffer
const READ_CHUNK: usize = 512;

// ============================================================================
// Data Types
// ============================================================================

/// Serial link settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadsetConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub path: String,
    pub baud_rate: u32,
    pub timeout: Duration,
}

impl Default for HeadsetConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl HeadsetConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// Result of reading several samples, including error statistics.
#[derive(Debug, Clone)]
pub struct SampleBatch {
    /// Snapshots taken after each completed frame.
    pub samples: Vec<Sample>,
    /// Microseconds since the headset was opened when the batch read started.
    pub timestamp_us: u64,
    /// Frames discarded because of a checksum mismatch.
    pub checksum_errors: usize,
    /// Accepted frames whose payload scan stopped early.
    pub truncated_frames: usize,
}

// ============================================================================
// Transport Abstraction
// ============================================================================

/// Trait for Read + Send, allowing different byte sources.
trait Transport: Read + Send {}
impl<T: Read + Send> Transport for T {}

// ============================================================================
// Headset
// ============================================================================

/// Drives a [`Parser`] from a byte source.
///
/// # Example
/// ```ignore
/// let mut headset = Headset::open_serial(&HeadsetConfig::new("/dev/ttyUSB0"))?;
/// let batch = headset.read_samples(512)?;
/// println!("{} samples, {} checksum errors", batch.samples.len(), batch.checksum_errors);
/// ```
pub struct Headset {
    transport: Box<dyn Transport>,
    parser: Parser,
    buf: [u8; READ_CHUNK],
    pos: usize,
    filled: usize,
    opened_at: Instant,
}

impl Headset {
    // ------------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------------

    /// Open a serial port with the given settings.
    pub fn open_serial(config: &HeadsetConfig) -> Result<Self> {
        if config.path.is_empty() {
            return Err(DriverError::InvalidArgument("serial path is empty".into()));
        }
        if config.baud_rate == 0 {
            return Err(DriverError::InvalidArgument("baud rate must be non-zero".into()));
        }

        let port = serialport::new(&config.path, config.baud_rate)
            .timeout(config.timeout)
            .open()?;
        debug!(
            "opened {} at {} baud (timeout {:?})",
            config.path, config.baud_rate, config.timeout
        );
        Ok(Self::from_reader(port))
    }

    /// Wrap an already-open byte source (capture file, socket, test cursor).
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self {
            transport: Box::new(reader),
            parser: Parser::new(),
            buf: [0u8; READ_CHUNK],
            pos: 0,
            filled: 0,
            opened_at: Instant::now(),
        }
    }

    // ------------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------------

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    pub fn parser_mut(&mut self) -> &mut Parser {
        &mut self.parser
    }

    pub fn elapsed_us(&self) -> u64 {
        self.opened_at.elapsed().as_micros() as u64
    }

    /// Read until the next frame completes.
    ///
    /// Returns `None` when the source reaches EOF or times out first. A
    /// partially received frame is kept and resumed on the next call.
    pub fn read_sample(&mut self) -> Result<Option<Sample>> {
        while let Some(byte) = self.next_byte()? {
            if self.parser.feed(byte) == ParseResult::Complete {
                return Ok(Some(*self.parser.sample()));
            }
        }
        Ok(None)
    }

    /// Read up to `n_samples` snapshots with error statistics.
    ///
    /// The batch is shorter than requested if the source runs dry.
    pub fn read_samples(&mut self, n_samples: usize) -> Result<SampleBatch> {
        let timestamp_us = self.elapsed_us();
        let before = self.parser.stats();
        let mut samples = Vec::with_capacity(n_samples);

        while samples.len() < n_samples {
            match self.read_sample()? {
                Some(sample) => samples.push(sample),
                None => break,
            }
        }

        let after = self.parser.stats();
        let checksum_errors = (after.checksum_errors - before.checksum_errors) as usize;
        let truncated_frames = ((after.truncated_scans + after.aborted_scans)
            - (before.truncated_scans + before.aborted_scans)) as usize;

        if checksum_errors > 0 {
            warn!(
                "checksum errors in batch: {} (suppressing per-frame logs)",
                checksum_errors
            );
        }
        if truncated_frames > 0 {
            warn!("truncated payloads in batch: {}", truncated_frames);
        }

        Ok(SampleBatch {
            samples,
            timestamp_us,
            checksum_errors,
            truncated_frames,
        })
    }

    // ------------------------------------------------------------------------
    // Internal Methods
    // ------------------------------------------------------------------------

    /// Next byte from the source, `None` on EOF or read timeout.
    fn next_byte(&mut self) -> Result<Option<u8>> {
        if self.pos >= self.filled {
            self.pos = 0;
            self.filled = 0;
            let n = loop {
                match self.transport.read(&mut self.buf) {
                    Ok(n) => break n,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                        return Ok(None)
                    }
                    Err(e) => return Err(e.into()),
                }
            };
            if n == 0 {
                return Ok(None);
            }
            self.filled = n;
        }

        let byte = self.buf[self.pos];
        self.pos += 1;
        Ok(Some(byte))
    }
}
