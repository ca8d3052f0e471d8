//! Decoded headset values.
//!
//! A [`Sample`] is a cumulative snapshot: each TLV record only overwrites the
//! fields its code addresses, so every field holds the latest value seen on
//! the link, possibly from an earlier frame.

use serde::Serialize;

/// Poor-signal readings that mean the headset is not worn correctly.
pub const EARPHONE_MISFIT_SIGNALS: [u8; 9] = [29, 54, 55, 56, 80, 81, 82, 107, 200];

/// Whether a poor-signal value is one of the misfit sentinels.
pub fn is_misfit_signal(poor_signal: u8) -> bool {
    EARPHONE_MISFIT_SIGNALS.contains(&poor_signal)
}

/// EEG band powers (24-bit unsigned, arbitrary units).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EegPower {
    pub delta: u32,
    pub theta: u32,
    pub low_alpha: u32,
    pub high_alpha: u32,
    pub low_beta: u32,
    pub high_beta: u32,
    pub low_gamma: u32,
    pub mid_gamma: u32,
}

impl EegPower {
    /// Band names in wire order.
    pub const BANDS: [&'static str; 8] = [
        "delta",
        "theta",
        "low_alpha",
        "high_alpha",
        "low_beta",
        "high_beta",
        "low_gamma",
        "mid_gamma",
    ];

    /// Decode eight consecutive big-endian 24-bit values.
    ///
    /// Returns `None` if fewer than 24 bytes are available.
    pub fn from_be_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 24 {
            return None;
        }
        let band = |n: usize| {
            let b = &bytes[n * 3..n * 3 + 3];
            (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2])
        };
        Some(Self {
            delta: band(0),
            theta: band(1),
            low_alpha: band(2),
            high_alpha: band(3),
            low_beta: band(4),
            high_beta: band(5),
            low_gamma: band(6),
            mid_gamma: band(7),
        })
    }

    /// Values in wire order, matching [`EegPower::BANDS`].
    pub fn to_array(&self) -> [u32; 8] {
        [
            self.delta,
            self.theta,
            self.low_alpha,
            self.high_alpha,
            self.low_beta,
            self.high_beta,
            self.low_gamma,
            self.mid_gamma,
        ]
    }
}

/// Latest known values decoded from the headset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Sample {
    /// Contact quality: 0 is best, 200 means no skin contact.
    pub poor_signal: u8,
    pub eeg_power: EegPower,
    /// eSense attention (0-100).
    pub attention: u8,
    /// eSense meditation (0-100).
    pub meditation: u8,
    pub heart_rate: u8,
    pub blink_strength: u8,
    /// Raw ADC waveform sample.
    pub raw_wave: i16,
    /// Set from the payload length of the last accepted frame (`L > 4`).
    pub is_stat_packet: bool,
    /// Sticky: set when an attention record arrives while the stored
    /// poor-signal value is a misfit sentinel, never cleared by decoding.
    pub earphone_misfit: bool,
}
