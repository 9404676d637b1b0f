//! Sync event 指标收集模块
//!
//! 导出标记检测与配对指标，并在内存中聚合丢失标记与延迟统计。

use std::collections::BTreeMap;

use contracts::{AudioMarkerEvent, MarkerSide, SyncEvent, SyncFoundEvent, VideoMarkerEvent};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

const NS_PER_MS: f64 = 1_000_000.0;

/// 注册指标说明，安装导出器后调用一次
pub fn describe() {
    describe_counter!("avsync_events_total", "Engine events by kind");
    describe_gauge!("avsync_video_last_index", "Index of the last video marker");
    describe_gauge!("avsync_audio_last_index", "Index of the last audio marker per channel");
    describe_histogram!("avsync_video_marker_score", "Confirmed video peak scores");
    describe_histogram!("avsync_audio_marker_score", "Confirmed preamble scores");
    describe_gauge!("avsync_latency_ms", "Latest audio minus video latency (ms)");
    describe_histogram!("avsync_latency_ms_hist", "Audio minus video latency (ms)");
    describe_gauge!("avsync_sync_records_pending", "Unpaired sync records");
}

/// 从 SyncEvent 记录指标
///
/// 每次引擎产生事件时调用。
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_event;
///
/// for event in session.process_video(&frame) {
///     record_event(&event);
/// }
/// ```
pub fn record_event(event: &SyncEvent) {
    match event {
        SyncEvent::VideoMarker(marker) => {
            counter!("avsync_events_total", "kind" => "video_marker").increment(1);
            gauge!("avsync_video_last_index").set(f64::from(marker.descriptor.index));
            histogram!("avsync_video_marker_score").record(marker.score);
        }
        SyncEvent::AudioMarker(marker) => {
            counter!("avsync_events_total", "kind" => "audio_marker").increment(1);
            gauge!(
                "avsync_audio_last_index",
                "channel" => marker.channel.to_string()
            )
            .set(f64::from(marker.index));
            histogram!("avsync_audio_marker_score").record(marker.score);
        }
        SyncEvent::SyncFound(found) => {
            counter!("avsync_events_total", "kind" => "sync_found").increment(1);
            let latency_ms = found.latency_ns() as f64 / NS_PER_MS;
            gauge!("avsync_latency_ms").set(latency_ms);
            histogram!("avsync_latency_ms_hist").record(latency_ms);
        }
    }
}

/// 记录待配对记录数
pub fn record_pending_records(pending: usize) {
    gauge!("avsync_sync_records_pending").set(pending as f64);
}

/// Markers skipped between two consecutive detections
///
/// `last` is `None` before the first detection. Indices wrap at `modulus`.
pub fn missed_markers(index: u32, last: Option<u32>, modulus: u32) -> u64 {
    let Some(last) = last else {
        return 0;
    };
    if modulus == 0 || index == last.wrapping_add(1) {
        return 0;
    }
    let m = u64::from(modulus);
    (m + u64::from(index % modulus) - u64::from(last % modulus) - 1) % m
}

/// Per-side index tracking
#[derive(Debug, Clone, Default)]
pub struct SideStats {
    /// Markers received
    pub received: u64,
    /// Markers inferred lost from index gaps
    pub missed: u64,
    /// Last received index
    pub last_index: Option<u32>,
    /// Modulus reported with the last marker
    pub index_modulus: u32,
    /// Detection score
    pub score: RunningStats,
}

impl SideStats {
    fn record(&mut self, index: u32, modulus: u32, score: f64) {
        let previous_modulus = if self.index_modulus == 0 {
            modulus
        } else {
            self.index_modulus
        };
        self.missed += missed_markers(index, self.last_index, previous_modulus);
        self.last_index = Some(index);
        self.index_modulus = modulus;
        self.received += 1;
        self.score.push(score);
    }

    /// Share of expected markers that were missed (%)
    pub fn missed_percent(&self) -> f64 {
        let expected = self.received + self.missed;
        if expected == 0 {
            0.0
        } else {
            self.missed as f64 * 100.0 / expected as f64
        }
    }
}

/// 标记统计聚合器
///
/// 统计各路收到/丢失的标记数以及配对延迟。只有同步声道的音频标记参与
/// 序号统计，其他声道仅计数。
#[derive(Debug, Clone, Default)]
pub struct MarkerStatistics {
    sync_channel: usize,

    pub video: SideStats,

    pub audio: SideStats,

    /// 各声道音频标记数
    pub channel_markers: BTreeMap<usize, u64>,

    /// 配对数
    pub sync_found: u64,

    /// 最近一次配对
    pub last_sync: Option<SyncFoundEvent>,

    /// 延迟统计 (ms)
    pub latency_ms: RunningStats,

    /// 当前描述符的音调频率
    pub frequency_hz: Option<u32>,
}

impl MarkerStatistics {
    pub fn new(sync_channel: usize) -> Self {
        Self {
            sync_channel,
            ..Self::default()
        }
    }

    /// 更新聚合统计
    pub fn update(&mut self, event: &SyncEvent) {
        match event {
            SyncEvent::VideoMarker(marker) => self.on_video(marker),
            SyncEvent::AudioMarker(marker) => self.on_audio(marker),
            SyncEvent::SyncFound(found) => self.on_sync(found),
        }
    }

    fn on_video(&mut self, marker: &VideoMarkerEvent) {
        let desc = &marker.descriptor;
        self.video
            .record(desc.index, desc.index_modulus, marker.score);
        self.frequency_hz = Some(desc.frequency_hz);
    }

    fn on_audio(&mut self, marker: &AudioMarkerEvent) {
        *self.channel_markers.entry(marker.channel).or_insert(0) += 1;
        if marker.channel == self.sync_channel {
            self.audio
                .record(marker.index, marker.index_modulus, marker.score);
        }
    }

    fn on_sync(&mut self, found: &SyncFoundEvent) {
        self.sync_found += 1;
        self.last_sync = Some(*found);
        self.latency_ms.push(found.latency_ns() as f64 / NS_PER_MS);
    }

    pub fn side(&self, side: MarkerSide) -> &SideStats {
        match side {
            MarkerSide::Video => &self.video,
            MarkerSide::Audio => &self.audio,
        }
    }

    /// 生成摘要报告
    pub fn summary(&self) -> StatisticsSummary {
        StatisticsSummary {
            video_received: self.video.received,
            video_missed: self.video.missed,
            video_missed_percent: self.video.missed_percent(),
            audio_received: self.audio.received,
            audio_missed: self.audio.missed,
            audio_missed_percent: self.audio.missed_percent(),
            sync_found: self.sync_found,
            last_index: self.last_sync.map(|s| s.index),
            last_latency_ms: self
                .last_sync
                .map(|s| s.latency_ns() as f64 / NS_PER_MS),
            latency_ms: StatsSummary::from(&self.latency_ms),
            frequency_hz: self.frequency_hz,
            channel_markers: self.channel_markers.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::new(self.sync_channel);
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatisticsSummary {
    pub video_received: u64,
    pub video_missed: u64,
    pub video_missed_percent: f64,
    pub audio_received: u64,
    pub audio_missed: u64,
    pub audio_missed_percent: f64,
    pub sync_found: u64,
    pub last_index: Option<u32>,
    pub last_latency_ms: Option<f64>,
    pub latency_ms: StatsSummary,
    pub frequency_hz: Option<u32>,
    pub channel_markers: BTreeMap<usize, u64>,
}

impl std::fmt::Display for StatisticsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== A/V Sync Summary ===")?;
        writeln!(
            f,
            "Video markers: {} ({:.1}% missed)",
            self.video_received, self.video_missed_percent
        )?;
        writeln!(
            f,
            "Audio markers: {} ({:.1}% missed)",
            self.audio_received, self.audio_missed_percent
        )?;
        writeln!(f, "Sync found: {}", self.sync_found)?;

        match (self.last_index, self.last_latency_ms) {
            (Some(index), Some(latency)) => {
                let polarity = if latency >= 0.0 {
                    "audio lags video"
                } else {
                    "audio leads video"
                };
                writeln!(f, "Last: index {index}, {latency:.1} ms ({polarity})")?;
            }
            _ => writeln!(f, "Last: -")?,
        }
        writeln!(f, "Latency (ms): {}", self.latency_ms)?;

        if let Some(frequency) = self.frequency_hz {
            writeln!(f, "Tone frequency: {frequency} Hz")?;
        }
        if self.channel_markers.len() > 1 {
            writeln!(f, "Audio markers per channel:")?;
            for (channel, count) in &self.channel_markers {
                writeln!(f, "  {channel}: {count}")?;
            }
        }
        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::MarkerDescriptor;

    fn video(index: u32) -> SyncEvent {
        SyncEvent::VideoMarker(VideoMarkerEvent {
            timestamp: u64::from(index) * 1_000,
            score: 1.0,
            descriptor: MarkerDescriptor {
                frequency_hz: 1000,
                cycles_per_symbol: 4,
                quantization_ms: 100,
                index,
                valid: true,
                ..MarkerDescriptor::default()
            },
        })
    }

    fn audio(index: u32, channel: usize) -> SyncEvent {
        SyncEvent::AudioMarker(AudioMarkerEvent {
            timestamp: u64::from(index) * 1_000,
            index,
            score: 0.5,
            channel,
            index_modulus: 256,
        })
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for value in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(value);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_missed_markers_wraps() {
        assert_eq!(missed_markers(5, None, 256), 0);
        assert_eq!(missed_markers(6, Some(5), 256), 0);
        assert_eq!(missed_markers(8, Some(5), 256), 2);
        assert_eq!(missed_markers(1, Some(254), 256), 2);
        assert_eq!(missed_markers(0, Some(255), 256), 0);
        assert_eq!(missed_markers(5, Some(5), 256), 255);
    }

    #[test]
    fn test_statistics_update() {
        let mut stats = MarkerStatistics::new(0);
        for event in [video(1), video(2), video(5), audio(1, 0), audio(2, 1), audio(3, 0)] {
            stats.update(&event);
        }
        stats.update(&SyncEvent::SyncFound(SyncFoundEvent {
            index: 3,
            video_ts: 1_000_000,
            audio_ts: 3_500_000,
        }));

        assert_eq!(stats.video.received, 3);
        assert_eq!(stats.video.missed, 2);
        assert!((stats.video.missed_percent() - 40.0).abs() < 1e-9);
        // channel 1 does not count for index tracking
        assert_eq!(stats.audio.received, 2);
        assert_eq!(stats.audio.missed, 1);
        assert_eq!(stats.channel_markers.get(&1), Some(&1));
        assert_eq!(stats.frequency_hz, Some(1000));
        assert_eq!(stats.sync_found, 1);
        assert!((stats.latency_ms.mean() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_summary_display() {
        let mut stats = MarkerStatistics::new(0);
        stats.update(&video(1));
        stats.update(&SyncEvent::SyncFound(SyncFoundEvent {
            index: 1,
            video_ts: 2_000_000,
            audio_ts: 1_000_000,
        }));

        let output = stats.summary().to_string();
        assert!(output.contains("Video markers: 1 (0.0% missed)"));
        assert!(output.contains("-1.0 ms (audio leads video)"));
        assert!(output.contains("Tone frequency: 1000 Hz"));
    }

    #[test]
    fn test_reset_keeps_channel() {
        let mut stats = MarkerStatistics::new(1);
        stats.update(&audio(4, 1));
        stats.reset();
        assert_eq!(stats.audio.received, 0);
        stats.update(&audio(5, 1));
        assert_eq!(stats.audio.received, 1);
    }
}
