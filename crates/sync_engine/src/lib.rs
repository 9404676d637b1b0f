//! # Sync Engine
//!
//! 音视频同步标记检测引擎。
//!
//! 负责：
//! - 从视频帧中提取二维码标记并定位画面翻转时刻
//! - 从音频中解调音调标记及其序号
//! - 按序号配对视频与音频标记，输出延迟
//!
//! ## 使用示例
//!
//! ```ignore
//! use sync_engine::{EngineConfig, SyncSession};
//!
//! let mut session = SyncSession::new(&EngineConfig::default(), &format)?;
//!
//! for event in session.process_video(&frame) {
//!     // VideoMarker / SyncFound
//! }
//! for event in session.process_audio(&block) {
//!     // AudioMarker / SyncFound
//! }
//! ```

mod audio;
mod circular;
mod error;
mod matcher;
mod payload;
mod peak;
mod session;
mod shared;
mod sliding;
mod video;

pub use audio::ToneDemodulator;
pub use circular::{ambiguity_threshold, forward_distance, is_stale};
pub use error::{Result, SyncError};
pub use matcher::{SyncIndexMatcher, SyncRecord, DEFAULT_MAX_RECORDS};
pub use payload::{parse, parse_payload, PayloadError};
pub use peak::{Peak, PeakFinder};
pub use session::{AudioPath, SyncSession, VideoPath};
pub use shared::{OscillatorParams, SharedState, Snapshot};
pub use sliding::{Accumulate, SlidingSum, Tap, TapHistory};
pub use video::{luma_layout, VideoMarkerExtractor, VideoStep};

// Re-export contracts types
pub use contracts::{
    AudioBlock, AudioMarkerEvent, CaptureFormat, EngineConfig, MarkerDescriptor, MarkerSide,
    SyncEvent, SyncFoundEvent, VideoFrame, VideoMarkerEvent,
};
