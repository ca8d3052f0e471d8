//! ThinkGear/TGAM headset decoder with optional Python bindings.
//!
//! TGAM modules (NeuroSky MindWave and clones) stream unframed bytes over a
//! UART. This crate turns that stream into [`Sample`] snapshots: poor-signal
//! quality, eight EEG band powers, eSense attention/meditation, heart rate,
//! blink strength and the raw waveform.
//!
//! # Usage
//!
//! 1. Feed every received byte to [`Parser::feed`], in arrival order.
//! 2. After each [`ParseResult::Complete`], read [`Parser::sample`] before the
//!    next frame completes; the decoder keeps a single snapshot.
//! 3. Treat the snapshot as "latest known values": fields persist until a later
//!    frame carries a record for them.
//!
//! [`Headset`] does the feeding for any [`std::io::Read`] source, including a
//! serial port opened through [`HeadsetConfig`].

mod errors;
mod headset;
pub mod logging;
mod parser;
pub mod protocol;
mod sample;

pub use errors::*;
pub use headset::{Headset, HeadsetConfig, SampleBatch};
pub use parser::{ParseResult, Parser, ParserState, ParserStats, ScanOutcome};
pub use protocol::{checksum, encode_frame, Code};
pub use sample::{is_misfit_signal, EegPower, Sample, EARPHONE_MISFIT_SIGNALS};

#[cfg(feature = "python")]
mod python;
