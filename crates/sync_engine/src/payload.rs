//! Marker payload parser.
//!
//! Payloads are ASCII `key=value` pairs separated by commas:
//!
//! | key | field |
//! |-----|-------|
//! | `f` | tone frequency (Hz), 10..=32000 |
//! | `c` | cycles per symbol, 1..=f |
//! | `q` | quantization (ms), 1..=1000 |
//! | `i` | marker index |
//! | `I` | index modulus (default 256) |
//! | `t` | type flags (default 0) |
//!
//! Unknown keys are ignored.

use contracts::{index_bits, MarkerDescriptor};
use thiserror::Error;

const FREQUENCY_RANGE: std::ops::RangeInclusive<u32> = 10..=32_000;
const QUANTIZATION_RANGE: std::ops::RangeInclusive<u32> = 1..=1_000;
const MAX_INDEX_MODULUS: u32 = 1 << 16;

/// Reason a payload was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("malformed pair '{pair}'")]
    MalformedPair { pair: String },

    #[error("invalid value for key '{key}': {value}")]
    InvalidValue { key: char, value: String },

    #[error("'{key}' out of range: {value}")]
    OutOfRange { key: char, value: u32 },
}

/// Parse a payload, reporting why it was rejected
pub fn parse_payload(payload: &str) -> Result<MarkerDescriptor, PayloadError> {
    let mut desc = MarkerDescriptor::default();

    for pair in payload.split(',') {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| PayloadError::MalformedPair { pair: pair.into() })?;

        let mut chars = key.chars();
        let key = match (chars.next(), chars.next()) {
            (Some(k), None) => k,
            _ => return Err(PayloadError::MalformedPair { pair: pair.into() }),
        };

        let field = match key {
            'f' => &mut desc.frequency_hz,
            'c' => &mut desc.cycles_per_symbol,
            'q' => &mut desc.quantization_ms,
            'i' => &mut desc.index,
            'I' => &mut desc.index_modulus,
            't' => &mut desc.type_flags,
            _ => continue,
        };

        *field = value.trim().parse().map_err(|_| PayloadError::InvalidValue {
            key,
            value: value.into(),
        })?;
    }

    check_ranges(&desc)?;
    desc.valid = true;
    Ok(desc)
}

/// Parse a payload; rejected payloads come back with `valid == false`
pub fn parse(payload: &str) -> MarkerDescriptor {
    match parse_payload(payload) {
        Ok(desc) => desc,
        Err(e) => {
            tracing::debug!(payload, error = %e, "marker payload rejected");
            MarkerDescriptor::default()
        }
    }
}

fn check_ranges(desc: &MarkerDescriptor) -> Result<(), PayloadError> {
    if !FREQUENCY_RANGE.contains(&desc.frequency_hz) {
        return Err(PayloadError::OutOfRange {
            key: 'f',
            value: desc.frequency_hz,
        });
    }
    if !(1..=desc.frequency_hz).contains(&desc.cycles_per_symbol) {
        return Err(PayloadError::OutOfRange {
            key: 'c',
            value: desc.cycles_per_symbol,
        });
    }
    if !QUANTIZATION_RANGE.contains(&desc.quantization_ms) {
        return Err(PayloadError::OutOfRange {
            key: 'q',
            value: desc.quantization_ms,
        });
    }
    if !(2..=MAX_INDEX_MODULUS).contains(&desc.index_modulus) {
        return Err(PayloadError::OutOfRange {
            key: 'I',
            value: desc.index_modulus,
        });
    }
    if desc.index >> index_bits(desc.index_modulus) != 0 {
        return Err(PayloadError::OutOfRange {
            key: 'i',
            value: desc.index,
        });
    }
    Ok(())
}
