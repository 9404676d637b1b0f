//! LogSink - logs event summaries via tracing

use contracts::{ContractError, EventSink, SyncEvent};
use tracing::{debug, info, instrument};

/// Sink that logs engine events
///
/// Pairings go out at info level, single markers at debug.
pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn log_event(&self, event: &SyncEvent) {
        match event {
            SyncEvent::VideoMarker(marker) => debug!(
                sink = %self.name,
                timestamp = marker.timestamp,
                index = marker.descriptor.index,
                score = marker.score,
                "Video marker"
            ),
            SyncEvent::AudioMarker(marker) => debug!(
                sink = %self.name,
                timestamp = marker.timestamp,
                index = marker.index,
                channel = marker.channel,
                score = marker.score,
                "Audio marker"
            ),
            SyncEvent::SyncFound(found) => info!(
                sink = %self.name,
                index = found.index,
                video_ts = found.video_ts,
                audio_ts = found.audio_ts,
                latency_ms = found.latency_ns() as f64 / 1e6,
                "Sync found"
            ),
        }
    }
}

impl EventSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, event),
        fields(sink = %self.name, kind = event.kind())
    )]
    async fn write(&mut self, event: &SyncEvent) -> Result<(), ContractError> {
        self.log_event(event);
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}
