//! Shared frame builders and fixtures.

// Not every test file uses every helper.
#![allow(dead_code)]

pub use thinkgear_rs::{
    checksum, encode_frame, EegPower, ParseResult, Parser, ParserState, Sample, ScanOutcome,
};

/// Stat payload from the TGAM datasheet notes: poor signal 200, band powers,
/// attention 0, meditation 0.
pub const REFERENCE_STAT_PAYLOAD: [u8; 32] = [
    0x02, 0xC8, 0x83, 0x18, //
    0x18, 0xD4, 0x8B, 0x13, 0xD1, 0x69, 0x02, 0x58, 0xC1, 0x17, 0x3B, 0xDC, //
    0x02, 0x50, 0x00, 0x03, 0xCB, 0x9D, 0x03, 0x6D, 0x3B, 0x03, 0x7E, 0x89, //
    0x04, 0x00, 0x05, 0x00,
];

pub const REFERENCE_STAT_CHECKSUM: u8 = 0x12;

/// Build a frame for `payload`, panicking on oversized payloads.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    encode_frame(payload).expect("payload fits in one frame")
}

/// Feed every byte, returning the per-byte results.
pub fn feed_all(parser: &mut Parser, bytes: &[u8]) -> Vec<ParseResult> {
    bytes.iter().map(|&b| parser.feed(b)).collect()
}

/// Feed one frame built from `payload` and return the result of its last byte.
pub fn feed_payload(parser: &mut Parser, payload: &[u8]) -> ParseResult {
    *feed_all(parser, &frame(payload))
        .last()
        .expect("frame is never empty")
}

/// Raw-wave record for `value`.
pub fn raw_record(value: i16) -> Vec<u8> {
    let [hi, lo] = value.to_be_bytes();
    vec![0x80, 0x02, hi, lo]
}

/// EEG power record for the eight bands in wire order.
pub fn eeg_record(bands: [u32; 8]) -> Vec<u8> {
    let mut out = vec![0x83, 0x18];
    for band in bands {
        let b = band.to_be_bytes();
        out.extend_from_slice(&b[1..]);
    }
    out
}

/// Tiny deterministic generator so property-style loops stay reproducible.
pub struct Lcg(u32);

impl Lcg {
    pub fn new(seed: u32) -> Self {
        Self(seed)
    }

    pub fn next_u8(&mut self) -> u8 {
        self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (self.0 >> 24) as u8
    }

    pub fn bytes(&mut self, n: usize) -> Vec<u8> {
        (0..n).map(|_| self.next_u8()).collect()
    }
}
