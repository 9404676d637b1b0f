//! Audio marker wire format
//!
//! A tone frame is `PREAMBLE_SYMBOLS` full-amplitude symbols with phases
//! `[0, π, 0]`, followed by the data symbols of one codeword at
//! `DATA_AMPLITUDE`. Every symbol lasts `cycles` carrier periods.
//!
//! Codeword layout (MSB first): `index << 4 | crc4(index)`.
//! - BPSK: 8 index bits, 12 symbols, bit 1 is phase π
//! - QPSK: 16 index bits, 10 symbols, two bits per symbol

use std::f64::consts::{FRAC_PI_4, PI};

use crate::TYPE_QPSK;

pub const PREAMBLE_SYMBOLS: usize = 3;

/// Preamble symbol signs (phase 0 or π)
pub const PREAMBLE_SIGNS: [f64; PREAMBLE_SYMBOLS] = [1.0, -1.0, 1.0];

/// Data symbol amplitude relative to the preamble
pub const DATA_AMPLITUDE: f64 = 0.5;

pub const CRC_BITS: u32 = 4;

/// x^4 + x + 1
pub const CRC4_POLY: u32 = 0b1_0011;

const NS_PER_SEC: u64 = 1_000_000_000;

/// Data symbol modulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modulation {
    Bpsk,
    Qpsk,
}

impl Modulation {
    pub fn from_flags(type_flags: u32) -> Self {
        if type_flags & TYPE_QPSK != 0 {
            Self::Qpsk
        } else {
            Self::Bpsk
        }
    }

    pub fn bits_per_symbol(&self) -> u32 {
        match self {
            Self::Bpsk => 1,
            Self::Qpsk => 2,
        }
    }

    /// Index bits carried by one codeword
    pub fn data_bits(&self) -> u32 {
        match self {
            Self::Bpsk => 8,
            Self::Qpsk => 16,
        }
    }

    pub fn codeword_bits(&self) -> u32 {
        self.data_bits() + CRC_BITS
    }

    pub fn data_symbols(&self) -> usize {
        (self.codeword_bits() / self.bits_per_symbol()) as usize
    }

    /// Carrier phase of one symbol's bits
    pub fn symbol_phase(&self, bits: u32) -> f64 {
        match self {
            Self::Bpsk => {
                if bits & 1 == 0 {
                    0.0
                } else {
                    PI
                }
            }
            Self::Qpsk => match bits & 0b11 {
                0b00 => FRAC_PI_4,
                0b10 => 3.0 * FRAC_PI_4,
                0b11 => -3.0 * FRAC_PI_4,
                _ => -FRAC_PI_4,
            },
        }
    }

    /// Inverse of [`Modulation::symbol_phase`] for a phase-corrected symbol
    pub fn symbol_bits(&self, re: f64, im: f64) -> u32 {
        match self {
            Self::Bpsk => u32::from(re < 0.0),
            Self::Qpsk => (u32::from(re < 0.0) << 1) | u32::from(im < 0.0),
        }
    }

    /// Split a codeword into per-symbol bit groups, MSB first
    pub fn split_codeword(&self, codeword: u32) -> Vec<u32> {
        let bps = self.bits_per_symbol();
        let mask = (1 << bps) - 1;
        (0..self.data_symbols())
            .rev()
            .map(|i| (codeword >> (i as u32 * bps)) & mask)
            .collect()
    }
}

/// CRC-4 long-division remainder of the low `bits` bits of `value`
pub fn crc4_remainder(value: u32, bits: u32) -> u32 {
    let mut rem = if bits >= u32::BITS {
        value
    } else {
        value & ((1 << bits) - 1)
    };
    for bit in (CRC_BITS..bits).rev() {
        if rem & (1 << bit) != 0 {
            rem ^= CRC4_POLY << (bit - CRC_BITS);
        }
    }
    rem & 0xF
}

/// Check nibble for `data_bits` bits of `data`
pub fn crc4(data: u32, data_bits: u32) -> u32 {
    crc4_remainder(data << CRC_BITS, data_bits + CRC_BITS)
}

/// Build the codeword transmitted for `index`
pub fn encode_codeword(index: u32, modulation: Modulation) -> u32 {
    let bits = modulation.data_bits();
    let data = index & ((1 << bits) - 1);
    (data << CRC_BITS) | crc4(data, bits)
}

/// Index carried by `codeword`, or `None` when the check nibble mismatches
pub fn decode_codeword(codeword: u32, modulation: Modulation) -> Option<u32> {
    if crc4_remainder(codeword, modulation.codeword_bits()) == 0 {
        Some(codeword >> CRC_BITS)
    } else {
        None
    }
}

/// Local oscillator phase at `ts_ns` for an integer carrier frequency
///
/// The phase repeats every second, so only the sub-second part of the
/// timestamp matters.
pub fn oscillator_phase(frequency_hz: u32, ts_ns: u64) -> f64 {
    let sub = (ts_ns % NS_PER_SEC) as f64 / NS_PER_SEC as f64;
    2.0 * PI * (frequency_hz as f64 * sub).fract()
}

/// Sample-level geometry of a tone frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToneGeometry {
    pub frequency_hz: u32,
    pub cycles_per_symbol: u32,
    pub sample_rate: u32,
    pub modulation: Modulation,
    /// Samples per symbol
    pub symbol_len: usize,
}

impl ToneGeometry {
    /// `None` when a symbol would span no samples
    pub fn new(
        frequency_hz: u32,
        cycles_per_symbol: u32,
        sample_rate: u32,
        type_flags: u32,
    ) -> Option<Self> {
        if frequency_hz == 0 || sample_rate == 0 {
            return None;
        }
        let symbol_len =
            (cycles_per_symbol as u64 * sample_rate as u64 / frequency_hz as u64) as usize;
        if symbol_len == 0 {
            return None;
        }
        Some(Self {
            frequency_hz,
            cycles_per_symbol,
            sample_rate,
            modulation: Modulation::from_flags(type_flags),
            symbol_len,
        })
    }

    pub fn data_symbols(&self) -> usize {
        self.modulation.data_symbols()
    }

    pub fn frame_symbols(&self) -> usize {
        PREAMBLE_SYMBOLS + self.data_symbols()
    }

    /// Frame length in samples
    pub fn frame_len(&self) -> usize {
        self.frame_symbols() * self.symbol_len
    }

    /// Duration of `samples` samples (ns)
    pub fn samples_to_ns(&self, samples: usize) -> u64 {
        (samples as u64 * NS_PER_SEC) / self.sample_rate as u64
    }

    /// Offset from frame start to the instant the marker stands for
    pub fn marker_offset_ns(&self, starts_at_sync: bool) -> u64 {
        if starts_at_sync {
            0
        } else {
            self.samples_to_ns(self.frame_len()) / 2
        }
    }

    /// Value of sample `offset` of a frame carrying `symbols` (bit groups
    /// from [`Modulation::split_codeword`]), taken at capture time `ts_ns`.
    /// Zero outside the frame.
    pub fn render_sample(&self, symbols: &[u32], offset: usize, ts_ns: u64, amplitude: f64) -> f64 {
        let symbol = offset / self.symbol_len;
        let (amp, phase) = if symbol < PREAMBLE_SYMBOLS {
            let phase = if PREAMBLE_SIGNS[symbol] < 0.0 { PI } else { 0.0 };
            (amplitude, phase)
        } else {
            match symbols.get(symbol - PREAMBLE_SYMBOLS) {
                Some(bits) if symbol < self.frame_symbols() => (
                    amplitude * DATA_AMPLITUDE,
                    self.modulation.symbol_phase(*bits),
                ),
                _ => return 0.0,
            }
        };
        amp * (oscillator_phase(self.frequency_hz, ts_ns) + phase).cos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_round_trip_and_single_bit_errors() {
        for data in (0u32..=0xFFFF).step_by(97).chain([0, 1, 0xFFFF]) {
            let codeword = encode_codeword(data, Modulation::Qpsk);
            assert_eq!(crc4_remainder(codeword, 20), 0, "data={data:#x}");
            assert_eq!(decode_codeword(codeword, Modulation::Qpsk), Some(data));
            for bit in 0..20 {
                let corrupted = codeword ^ (1 << bit);
                assert_ne!(crc4_remainder(corrupted, 20), 0, "data={data:#x} bit={bit}");
            }
        }
    }

    #[test]
    fn bpsk_codeword_is_twelve_bits() {
        let codeword = encode_codeword(0xA5, Modulation::Bpsk);
        assert!(codeword < 1 << 12);
        assert_eq!(decode_codeword(codeword, Modulation::Bpsk), Some(0xA5));
        assert_eq!(Modulation::Bpsk.data_symbols(), 12);
        assert_eq!(Modulation::Qpsk.data_symbols(), 10);
    }

    #[test]
    fn symbol_phase_inverts() {
        for modulation in [Modulation::Bpsk, Modulation::Qpsk] {
            for bits in 0..(1 << modulation.bits_per_symbol()) {
                let phase = modulation.symbol_phase(bits);
                assert_eq!(modulation.symbol_bits(phase.cos(), phase.sin()), bits);
            }
        }
    }

    #[test]
    fn split_codeword_is_msb_first() {
        let groups = Modulation::Qpsk.split_codeword(0b11_00_01_10_00_00_00_00_00_01);
        assert_eq!(groups.len(), 10);
        assert_eq!(&groups[..4], &[0b11, 0b00, 0b01, 0b10]);
        assert_eq!(groups[9], 0b01);
    }

    #[test]
    fn geometry_symbol_length() {
        let geometry = ToneGeometry::new(1000, 4, 48_000, 0).unwrap();
        assert_eq!(geometry.symbol_len, 192);
        assert_eq!(geometry.frame_len(), 15 * 192);
        assert_eq!(geometry.marker_offset_ns(true), 0);
        assert_eq!(geometry.marker_offset_ns(false), 30_000_000);
        assert!(ToneGeometry::new(32_000, 1, 8_000, 0).is_none());
    }

    #[test]
    fn oscillator_phase_wraps_each_second() {
        let a = oscillator_phase(1000, 250_000);
        let b = oscillator_phase(1000, 1_000_250_000);
        assert!((a - b).abs() < 1e-9);
        assert!((a - PI / 2.0).abs() < 1e-9);
    }
}
