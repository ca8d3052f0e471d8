//! ThinkGear wire format.
//!
//! ```text
//! [0xAA] [0xAA] [L] [payload: L bytes] [checksum]
//! ```
//!
//! The payload is a sequence of TLV records. A record may be preceded by any
//! number of `0x55` extended-code bytes. Codes above `0x7F` carry an explicit
//! length byte; every other code has an implicit one-byte value.
//!
//! The checksum is the one's complement of the low byte of the payload sum.

use crate::errors::{DriverError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Frame synchronization byte, sent twice before every frame.
pub const SYNC_BYTE: u8 = 0xAA;

/// Extended-code escape byte.
pub const EXCODE_BYTE: u8 = 0x55;

/// Codes strictly above this value carry an explicit length byte.
pub const MULTI_BYTE_CODE_THRESHOLD: u8 = 0x7F;

/// Largest payload the one-byte length field can declare.
pub const MAX_PAYLOAD_LEN: usize = 0xFF;

/// Payloads longer than this are classified as stat packets.
pub const STAT_PACKET_MIN_LEN: usize = 4;

/// Default UART baud rate of TGAM modules.
pub const DEFAULT_BAUD_RATE: u32 = 57_600;

pub(crate) const RAW_WAVE_LEN: usize = 2;
pub(crate) const EEG_POWER_LEN: usize = 24;
pub(crate) const DEBUG_ONE_LEN: usize = 5;
pub(crate) const DEBUG_TWO_LEN: usize = 3;

// ============================================================================
// Codes
// ============================================================================

/// TLV record code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// Contact quality, 0 (good) to 200 (no contact).
    PoorSignal,
    HeartRate,
    /// eSense attention, 0-100.
    Attention,
    /// eSense meditation, 0-100.
    Meditation,
    BlinkStrength,
    /// Raw waveform sample, big-endian i16.
    RawWave,
    /// Eight 24-bit big-endian band powers.
    EegPower,
    DebugOne,
    DebugTwo,
    Unknown(u8),
}

impl Code {
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            0x02 => Code::PoorSignal,
            0x03 => Code::HeartRate,
            0x04 => Code::Attention,
            0x05 => Code::Meditation,
            0x16 => Code::BlinkStrength,
            0x80 => Code::RawWave,
            0x83 => Code::EegPower,
            0x84 => Code::DebugOne,
            0x85 => Code::DebugTwo,
            other => Code::Unknown(other),
        }
    }

    pub const fn to_byte(self) -> u8 {
        match self {
            Code::PoorSignal => 0x02,
            Code::HeartRate => 0x03,
            Code::Attention => 0x04,
            Code::Meditation => 0x05,
            Code::BlinkStrength => 0x16,
            Code::RawWave => 0x80,
            Code::EegPower => 0x83,
            Code::DebugOne => 0x84,
            Code::DebugTwo => 0x85,
            Code::Unknown(b) => b,
        }
    }

    /// Whether the code is followed by an explicit value-length byte.
    pub const fn is_multi_byte(self) -> bool {
        self.to_byte() > MULTI_BYTE_CODE_THRESHOLD
    }
}

// ============================================================================
// Checksum / encoding
// ============================================================================

/// Frame checksum: `(~sum(payload)) & 0xFF`.
pub fn checksum(payload: &[u8]) -> u8 {
    let sum = payload.iter().fold(0u32, |acc, &b| acc + u32::from(b));
    !(sum as u8)
}

/// Wrap a payload into a complete frame (sync, sync, length, payload, checksum).
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(DriverError::PayloadTooLong {
            len: payload.len(),
        });
    }

    let mut frame = Vec::with_capacity(payload.len() + 4);
    frame.push(SYNC_BYTE);
    frame.push(SYNC_BYTE);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);
    frame.push(checksum(payload));
    Ok(frame)
}
