//! Marker descriptor and the events the sync engine emits.

use serde::{Deserialize, Serialize};

/// Audio burst starts at the sync transition instead of being centred on it
pub const TYPE_AUDIO_START_AT_SYNC: u32 = 1;

/// Audio data symbols carry two bits each
pub const TYPE_QPSK: u32 = 2;

/// Index space used when the payload carries no `I` key
pub const DEFAULT_INDEX_MODULUS: u32 = 256;

/// Parameters carried by one marker payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerDescriptor {
    /// Tone carrier frequency (Hz)
    pub frequency_hz: u32,
    /// Carrier cycles per data symbol
    pub cycles_per_symbol: u32,
    /// Marker cycle quantization (ms)
    pub quantization_ms: u32,
    /// Marker index within the current cycle space
    pub index: u32,
    /// Size of the index space
    pub index_modulus: u32,
    /// `TYPE_*` bits
    pub type_flags: u32,
    /// Whether every field passed its range check
    pub valid: bool,
}

impl Default for MarkerDescriptor {
    fn default() -> Self {
        Self {
            frequency_hz: 0,
            cycles_per_symbol: 0,
            quantization_ms: 0,
            index: 0,
            index_modulus: DEFAULT_INDEX_MODULUS,
            type_flags: 0,
            valid: false,
        }
    }
}

impl MarkerDescriptor {
    /// Number of bits needed to hold any index below the modulus
    pub fn index_bits(&self) -> u32 {
        index_bits(self.index_modulus)
    }
}

/// Bit width of the index space `modulus`
pub fn index_bits(modulus: u32) -> u32 {
    if modulus <= 1 {
        0
    } else {
        u32::BITS - (modulus - 1).leading_zeros()
    }
}

/// Which stream a one-sided detection came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerSide {
    Video,
    Audio,
}

impl MarkerSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

/// Located video transition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoMarkerEvent {
    /// Sub-frame transition time (ns, relative to pipeline start)
    pub timestamp: u64,
    pub score: f64,
    /// Most recent valid descriptor at detection time
    pub descriptor: MarkerDescriptor,
}

/// Decoded audio codeword
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioMarkerEvent {
    /// Corrected marker time (ns, relative to pipeline start)
    pub timestamp: u64,
    pub index: u32,
    pub score: f64,
    /// Audio channel the codeword was decoded from
    pub channel: usize,
    pub index_modulus: u32,
}

/// Completed video/audio pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFoundEvent {
    pub index: u32,
    pub video_ts: u64,
    pub audio_ts: u64,
}

impl SyncFoundEvent {
    /// Audio minus video, in nanoseconds
    pub fn latency_ns(&self) -> i64 {
        self.audio_ts as i64 - self.video_ts as i64
    }
}

/// Engine output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncEvent {
    VideoMarker(VideoMarkerEvent),
    AudioMarker(AudioMarkerEvent),
    SyncFound(SyncFoundEvent),
}

impl SyncEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::VideoMarker(_) => "video_marker",
            Self::AudioMarker(_) => "audio_marker",
            Self::SyncFound(_) => "sync_found",
        }
    }

    /// Timestamp the event refers to; for pairings, the video side
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::VideoMarker(e) => e.timestamp,
            Self::AudioMarker(e) => e.timestamp,
            Self::SyncFound(e) => e.video_ts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_bits_matches_modulus() {
        assert_eq!(index_bits(256), 8);
        assert_eq!(index_bits(255), 8);
        assert_eq!(index_bits(257), 9);
        assert_eq!(index_bits(65536), 16);
        assert_eq!(index_bits(2), 1);
    }

    #[test]
    fn latency_is_signed() {
        let early_audio = SyncFoundEvent {
            index: 1,
            video_ts: 2_000,
            audio_ts: 1_500,
        };
        assert_eq!(early_audio.latency_ns(), -500);
    }

    #[test]
    fn event_serializes_with_kind_tag() {
        let event = SyncEvent::SyncFound(SyncFoundEvent {
            index: 5,
            video_ts: 1000,
            audio_ts: 1200,
        });
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["kind"], "sync_found");
        assert_eq!(json["audio_ts"], 1200);
    }
}
