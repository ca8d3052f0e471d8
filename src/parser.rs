//! Streaming ThinkGear packet decoder.
//!
//! The [`Parser`] is driven one byte at a time by whatever owns the serial
//! link. It recovers frame boundaries, verifies the checksum and decodes the
//! TLV payload into its [`Sample`].
//!
//! # Framing
//!
//! ```text
//! Sync --AA--> Check --AA--> PayloadLength --L--> Payload (L bytes) --> Checksum --> Sync
//!                  \--other--> Sync                   \--L == 0-----------^
//! ```
//!
//! A byte that fails the second sync check is dropped, not re-examined as a
//! first sync byte. Whatever the checksum outcome, framing restarts at `Sync`.
//!
//! # Output
//!
//! The sample is never cleared between frames. Each record only overwrites
//! the fields its code addresses, and the attention record consults the
//! poor-signal value stored by whichever frame last carried one.

use log::{debug, trace};
use serde::Serialize;

use crate::protocol::{
    Code, DEBUG_ONE_LEN, DEBUG_TWO_LEN, EEG_POWER_LEN, EXCODE_BYTE, MAX_PAYLOAD_LEN,
    RAW_WAVE_LEN, STAT_PACKET_MIN_LEN, SYNC_BYTE,
};
use crate::sample::{is_misfit_signal, EegPower, Sample};

// ============================================================================
// Data Types
// ============================================================================

/// Result of feeding one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ParseResult {
    /// Frame accumulation in progress (or still searching for sync).
    InProgress = 0,
    /// A frame passed its checksum; the sample has been updated.
    Complete = 1,
    /// A frame was received in full but its checksum did not match.
    ChecksumError = 2,
}

/// Framing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParserState {
    #[default]
    Sync,
    Check,
    PayloadLength,
    Payload,
    Checksum,
}

/// How the payload scan of the last accepted frame ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanOutcome {
    /// Every record was consumed up to the declared payload length.
    #[default]
    Clean,
    /// The record starting at `offset` declares more bytes than the payload
    /// holds. Its fields were left untouched and the scan stopped there.
    Truncated { offset: usize },
    /// The cursor failed to advance past `offset`; the rest was skipped.
    Aborted { offset: usize },
}

/// Cumulative decoder counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParserStats {
    pub frames: u64,
    pub checksum_errors: u64,
    pub truncated_scans: u64,
    pub aborted_scans: u64,
    pub unknown_codes: u64,
    /// Debug records whose declared length did not match, left unconsumed.
    pub unconsumed_debug_records: u64,
}

// ============================================================================
// Parser
// ============================================================================

/// Byte-at-a-time ThinkGear decoder.
///
/// One instance per connection. Not meant to be shared across threads; wrap
/// it in the caller's own synchronization if that is ever needed.
///
/// # Example
/// ```
/// use thinkgear_rs::{ParseResult, Parser};
///
/// let mut parser = Parser::new();
/// let frame = [0xAA, 0xAA, 0x04, 0x80, 0x02, 0x01, 0xF4, 0x88];
/// let mut last = ParseResult::InProgress;
/// for byte in frame {
///     last = parser.feed(byte);
/// }
/// assert_eq!(last, ParseResult::Complete);
/// assert_eq!(parser.sample().raw_wave, 500);
/// ```
#[derive(Debug, Clone)]
pub struct Parser {
    state: ParserState,
    payload: [u8; MAX_PAYLOAD_LEN + 1],
    payload_len: usize,
    received: usize,
    sum: u32,
    sample: Sample,
    last_scan: ScanOutcome,
    stats: ParserStats,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Sync,
            payload: [0u8; MAX_PAYLOAD_LEN + 1],
            payload_len: 0,
            received: 0,
            sum: 0,
            sample: Sample::default(),
            last_scan: ScanOutcome::Clean,
            stats: ParserStats::default(),
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Latest decoded values. Most meaningful right after a `Complete`.
    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn last_scan(&self) -> ScanOutcome {
        self.last_scan
    }

    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    /// Acknowledge the earphone-misfit flag. Decoding only ever sets it.
    pub fn clear_earphone_misfit(&mut self) {
        self.sample.earphone_misfit = false;
    }

    // ------------------------------------------------------------------------
    // Framing
    // ------------------------------------------------------------------------

    /// Feed the next byte from the link.
    ///
    /// On `Complete` the sample has already been updated. On `ChecksumError`
    /// nothing in the sample changes.
    pub fn feed(&mut self, byte: u8) -> ParseResult {
        match self.state {
            ParserState::Sync => {
                if byte == SYNC_BYTE {
                    self.state = ParserState::Check;
                }
            }
            ParserState::Check => {
                self.state = if byte == SYNC_BYTE {
                    ParserState::PayloadLength
                } else {
                    ParserState::Sync
                };
            }
            ParserState::PayloadLength => {
                self.payload_len = usize::from(byte);
                self.received = 0;
                self.sum = 0;
                self.state = if self.payload_len == 0 {
                    ParserState::Checksum
                } else {
                    ParserState::Payload
                };
            }
            ParserState::Payload => {
                self.payload[self.received] = byte;
                self.received += 1;
                self.sum += u32::from(byte);
                if self.received >= self.payload_len {
                    self.state = ParserState::Checksum;
                }
            }
            ParserState::Checksum => {
                self.state = ParserState::Sync;
                let expected = !(self.sum as u8);
                if byte != expected {
                    self.stats.checksum_errors += 1;
                    debug!(
                        "checksum mismatch: len={}, expected={:#04x}, received={:#04x}",
                        self.payload_len, expected, byte
                    );
                    return ParseResult::ChecksumError;
                }
                self.stats.frames += 1;
                self.decode_payload();
                return ParseResult::Complete;
            }
        }
        ParseResult::InProgress
    }

    /// Feed a chunk in order, calling `on_sample` after every completed frame.
    ///
    /// Returns the number of frames that completed.
    pub fn feed_slice<F>(&mut self, bytes: &[u8], mut on_sample: F) -> usize
    where
        F: FnMut(&Sample),
    {
        let mut completed = 0;
        for &byte in bytes {
            if self.feed(byte) == ParseResult::Complete {
                completed += 1;
                on_sample(&self.sample);
            }
        }
        completed
    }

    // ------------------------------------------------------------------------
    // Payload
    // ------------------------------------------------------------------------

    fn decode_payload(&mut self) {
        let len = self.payload_len;
        self.sample.is_stat_packet = len > STAT_PACKET_MIN_LEN;
        trace!(
            "frame accepted: len={}, payload={:02X?}",
            len,
            &self.payload[..len]
        );

        let mut cursor = 0;
        let mut outcome = ScanOutcome::Clean;
        // Every record consumes at least its code byte, so `len` passes is an upper bound.
        for _ in 0..len {
            if cursor >= len {
                break;
            }
            match self.decode_record(cursor, len) {
                Some(next) if next > cursor => cursor = next,
                Some(_) => {
                    outcome = ScanOutcome::Aborted { offset: cursor };
                    break;
                }
                None => {
                    outcome = ScanOutcome::Truncated { offset: cursor };
                    break;
                }
            }
        }

        match outcome {
            ScanOutcome::Clean => {}
            ScanOutcome::Truncated { offset } => {
                self.stats.truncated_scans += 1;
                debug!("truncated record at offset {offset} (payload len {len})");
            }
            ScanOutcome::Aborted { offset } => {
                self.stats.aborted_scans += 1;
                debug!("payload scan stalled at offset {offset} (payload len {len})");
            }
        }
        self.last_scan = outcome;
    }

    /// Decode the record at `start`. Returns the cursor for the next record,
    /// or `None` if the record runs past `len`.
    fn decode_record(&mut self, start: usize, len: usize) -> Option<usize> {
        let mut i = start;

        let mut excode_level = 0u8;
        while i < len && self.payload[i] == EXCODE_BYTE {
            excode_level = excode_level.saturating_add(1);
            i += 1;
        }
        if i >= len {
            return None;
        }

        let code = Code::from_byte(self.payload[i]);
        i += 1;
        let value_len = if code.is_multi_byte() {
            if i >= len {
                return None;
            }
            let l = usize::from(self.payload[i]);
            i += 1;
            l
        } else {
            1
        };
        let value_end = i + value_len;
        let fits = value_end <= len;

        trace!(
            "record: code={:#04x}, excode_level={}, value_len={}",
            code.to_byte(),
            excode_level,
            value_len
        );

        match code {
            Code::DebugOne | Code::DebugTwo => {
                let expected = if code == Code::DebugOne {
                    DEBUG_ONE_LEN
                } else {
                    DEBUG_TWO_LEN
                };
                if value_len != expected {
                    // Left unconsumed: the value bytes are scanned as records.
                    self.stats.unconsumed_debug_records += 1;
                    debug!(
                        "debug record {:#04x} with length {} (expected {}), not consumed",
                        code.to_byte(),
                        value_len,
                        expected
                    );
                    return Some(i);
                }
                return fits.then_some(value_end);
            }
            Code::Unknown(byte) => {
                self.stats.unknown_codes += 1;
                debug!("unknown code {byte:#04x} at offset {start}");
                return Some(i);
            }
            _ => {}
        }

        if !fits {
            return None;
        }
        let value = &self.payload[i..value_end];

        match code {
            Code::RawWave => {
                if value_len == RAW_WAVE_LEN {
                    self.sample.raw_wave = i16::from_be_bytes([value[0], value[1]]);
                }
            }
            Code::PoorSignal => self.sample.poor_signal = value[0],
            Code::EegPower => {
                if value_len >= EEG_POWER_LEN {
                    if let Some(power) = EegPower::from_be_bytes(value) {
                        self.sample.eeg_power = power;
                    }
                }
            }
            Code::Attention => {
                self.sample.attention = value[0];
                if is_misfit_signal(self.sample.poor_signal) {
                    self.sample.earphone_misfit = true;
                }
            }
            Code::HeartRate => self.sample.heart_rate = value[0],
            Code::Meditation => self.sample.meditation = value[0],
            Code::BlinkStrength => self.sample.blink_strength = value[0],
            Code::DebugOne | Code::DebugTwo | Code::Unknown(_) => {}
        }
        Some(value_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{checksum, encode_frame};

    fn feed_all(parser: &mut Parser, bytes: &[u8]) -> Vec<ParseResult> {
        bytes.iter().map(|&b| parser.feed(b)).collect()
    }

    fn feed_payload(parser: &mut Parser, payload: &[u8]) -> ParseResult {
        let frame = encode_frame(payload).unwrap();
        *feed_all(parser, &frame).last().unwrap()
    }

    #[test]
    fn state_walks_through_frame() {
        let mut p = Parser::new();
        assert_eq!(p.state(), ParserState::Sync);
        p.feed(0xAA);
        assert_eq!(p.state(), ParserState::Check);
        p.feed(0xAA);
        assert_eq!(p.state(), ParserState::PayloadLength);
        p.feed(0x02);
        assert_eq!(p.state(), ParserState::Payload);
        p.feed(0x04);
        assert_eq!(p.state(), ParserState::Payload);
        p.feed(0x10);
        assert_eq!(p.state(), ParserState::Checksum);
        assert_eq!(p.feed(checksum(&[0x04, 0x10])), ParseResult::Complete);
        assert_eq!(p.state(), ParserState::Sync);
        assert_eq!(p.sample().attention, 0x10);
    }

    #[test]
    fn zero_length_frame_goes_straight_to_checksum() {
        let mut p = Parser::new();
        let results = feed_all(&mut p, &[0xAA, 0xAA, 0x00, 0xFF]);
        assert_eq!(
            results,
            vec![
                ParseResult::InProgress,
                ParseResult::InProgress,
                ParseResult::InProgress,
                ParseResult::Complete
            ]
        );
        assert!(!p.sample().is_stat_packet);
        assert_eq!(p.last_scan(), ScanOutcome::Clean);
    }

    #[test]
    fn failed_second_sync_byte_is_dropped() {
        let mut p = Parser::new();
        // 0xAB fails the check; the following 0xAA starts a fresh search.
        p.feed(0xAA);
        p.feed(0xAB);
        assert_eq!(p.state(), ParserState::Sync);

        // "AA 00 AA": the 00 is dropped, the last AA is only a first sync byte.
        feed_all(&mut p, &[0xAA, 0x00, 0xAA]);
        assert_eq!(p.state(), ParserState::Check);
    }

    #[test]
    fn checksum_error_leaves_sample_untouched() {
        let mut p = Parser::new();
        assert_eq!(feed_payload(&mut p, &[0x04, 0x2A]), ParseResult::Complete);
        let before = *p.sample();

        let mut frame = encode_frame(&[0x04, 0x63, 0x05, 0x11]).unwrap();
        *frame.last_mut().unwrap() ^= 0x01;
        let results = feed_all(&mut p, &frame);
        assert_eq!(*results.last().unwrap(), ParseResult::ChecksumError);
        assert_eq!(*p.sample(), before);
        assert_eq!(p.state(), ParserState::Sync);
        assert_eq!(p.stats().checksum_errors, 1);
        assert_eq!(p.stats().frames, 1);
    }

    #[test]
    fn raw_wave_is_signed_big_endian() {
        let mut p = Parser::new();
        feed_payload(&mut p, &[0x80, 0x02, 0xFF, 0xFE]);
        assert_eq!(p.sample().raw_wave, -2);
        feed_payload(&mut p, &[0x80, 0x02, 0x01, 0xF4]);
        assert_eq!(p.sample().raw_wave, 500);
    }

    #[test]
    fn raw_wave_with_wrong_length_is_skipped() {
        let mut p = Parser::new();
        feed_payload(&mut p, &[0x80, 0x02, 0x00, 0x10]);
        feed_payload(&mut p, &[0x80, 0x03, 0x7F, 0x7F, 0x7F, 0x05, 0x21]);
        assert_eq!(p.sample().raw_wave, 0x10);
        assert_eq!(p.sample().meditation, 0x21);
        assert_eq!(p.last_scan(), ScanOutcome::Clean);
    }

    #[test]
    fn short_eeg_record_is_skipped_but_consumed() {
        let mut p = Parser::new();
        let mut payload = vec![0x83, 0x06, 1, 2, 3, 4, 5, 6];
        payload.extend_from_slice(&[0x03, 0x48]);
        feed_payload(&mut p, &payload);
        assert_eq!(p.sample().eeg_power, EegPower::default());
        assert_eq!(p.sample().heart_rate, 0x48);
    }

    #[test]
    fn escape_bytes_are_skipped() {
        let mut p = Parser::new();
        feed_payload(&mut p, &[0x55, 0x55, 0x16, 0x40, 0x55, 0x04, 0x33]);
        assert_eq!(p.sample().blink_strength, 0x40);
        assert_eq!(p.sample().attention, 0x33);
        assert_eq!(p.last_scan(), ScanOutcome::Clean);
    }

    #[test]
    fn trailing_escapes_truncate_the_scan() {
        let mut p = Parser::new();
        feed_payload(&mut p, &[0x05, 0x09, 0x55, 0x55]);
        assert_eq!(p.sample().meditation, 0x09);
        assert_eq!(p.last_scan(), ScanOutcome::Truncated { offset: 2 });
        assert_eq!(p.stats().truncated_scans, 1);
    }

    #[test]
    fn record_past_payload_end_updates_nothing() {
        let mut p = Parser::new();
        // EEG record declares 24 bytes but the frame ends after 4.
        feed_payload(&mut p, &[0x02, 0x00, 0x83, 0x18, 1, 2, 3, 4]);
        assert_eq!(p.sample().eeg_power, EegPower::default());
        assert_eq!(p.last_scan(), ScanOutcome::Truncated { offset: 2 });

        // Single-byte code as the last payload byte has no value to read.
        feed_payload(&mut p, &[0x03, 0x50, 0x04]);
        assert_eq!(p.sample().heart_rate, 0x50);
        assert_eq!(p.sample().attention, 0);
        assert_eq!(p.last_scan(), ScanOutcome::Truncated { offset: 2 });
    }

    #[test]
    fn multi_byte_code_without_length_byte_is_truncated() {
        let mut p = Parser::new();
        feed_payload(&mut p, &[0x05, 0x01, 0x80]);
        assert_eq!(p.sample().meditation, 0x01);
        assert_eq!(p.last_scan(), ScanOutcome::Truncated { offset: 2 });
    }

    #[test]
    fn matching_debug_records_are_consumed() {
        let mut p = Parser::new();
        feed_payload(
            &mut p,
            &[0x84, 0x05, 0x04, 0x04, 0x04, 0x04, 0x04, 0x85, 0x03, 0x05, 0x05, 0x05],
        );
        assert_eq!(p.sample().attention, 0);
        assert_eq!(p.sample().meditation, 0);
        assert_eq!(p.stats().unconsumed_debug_records, 0);
        assert_eq!(p.last_scan(), ScanOutcome::Clean);
    }

    #[test]
    fn mismatched_debug_record_value_is_rescanned_as_records() {
        let mut p = Parser::new();
        // Length 2 instead of 5: cursor stays after the length byte, so
        // 04 07 is read as an attention record.
        feed_payload(&mut p, &[0x84, 0x02, 0x04, 0x07]);
        assert_eq!(p.sample().attention, 0x07);
        assert_eq!(p.stats().unconsumed_debug_records, 1);

        feed_payload(&mut p, &[0x85, 0x01, 0x05, 0x0B]);
        assert_eq!(p.sample().meditation, 0x0B);
        assert_eq!(p.stats().unconsumed_debug_records, 2);
    }

    #[test]
    fn unknown_code_only_skips_its_code_byte() {
        let mut p = Parser::new();
        feed_payload(&mut p, &[0x06, 0x04, 0x09]);
        assert_eq!(p.sample().attention, 0x09);
        assert_eq!(p.stats().unknown_codes, 1);

        // Unknown multi-byte code: code and length byte are skipped only.
        feed_payload(&mut p, &[0x90, 0x02, 0x03, 0x44]);
        assert_eq!(p.sample().heart_rate, 0x44);
        assert_eq!(p.stats().unknown_codes, 2);
        assert_eq!(p.last_scan(), ScanOutcome::Clean);
    }

    #[test]
    fn stat_flag_follows_payload_length() {
        let mut p = Parser::new();
        feed_payload(&mut p, &[0x06, 0x06, 0x06, 0x06, 0x06]);
        assert!(p.sample().is_stat_packet);
        feed_payload(&mut p, &[0x80, 0x02, 0x00, 0x01]);
        assert!(!p.sample().is_stat_packet);
    }

    #[test]
    fn misfit_flag_is_sticky_until_cleared() {
        let mut p = Parser::new();
        feed_payload(&mut p, &[0x02, 200, 0x04, 0x00]);
        assert!(p.sample().earphone_misfit);

        feed_payload(&mut p, &[0x02, 0x00, 0x04, 0x30]);
        assert!(p.sample().earphone_misfit);

        p.clear_earphone_misfit();
        assert!(!p.sample().earphone_misfit);
        feed_payload(&mut p, &[0x04, 0x31]);
        assert!(!p.sample().earphone_misfit);
    }

    #[test]
    fn misfit_check_uses_poor_signal_order_within_frame() {
        let mut p = Parser::new();
        // Attention comes before the poor-signal record: the check sees the old value (0).
        feed_payload(&mut p, &[0x04, 0x10, 0x02, 0x1D]);
        assert!(!p.sample().earphone_misfit);
        assert_eq!(p.sample().poor_signal, 29);
    }

    #[test]
    fn max_length_frame_is_accepted() {
        let mut p = Parser::new();
        let mut payload = Vec::new();
        while payload.len() + 2 <= MAX_PAYLOAD_LEN {
            payload.extend_from_slice(&[0x16, 0x01]);
        }
        payload.push(0x06);
        assert_eq!(payload.len(), MAX_PAYLOAD_LEN);
        assert_eq!(feed_payload(&mut p, &payload), ParseResult::Complete);
        assert_eq!(p.sample().blink_strength, 0x01);
        assert_eq!(p.last_scan(), ScanOutcome::Clean);
    }

    #[test]
    fn feed_slice_reports_each_completion() {
        let mut p = Parser::new();
        let mut bytes = encode_frame(&[0x04, 0x01]).unwrap();
        bytes.extend(encode_frame(&[0x04, 0x02]).unwrap());
        bytes.extend(encode_frame(&[0x04, 0x03]).unwrap());

        let mut seen = Vec::new();
        let n = p.feed_slice(&bytes, |s| seen.push(s.attention));
        assert_eq!(n, 3);
        assert_eq!(seen, vec![1, 2, 3]);
    }
}
