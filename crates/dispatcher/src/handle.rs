//! SinkHandle - 每个 sink 独立的有界队列与写入 task
//!
//! 检测链路只调用 `try_send`，慢 sink 只会丢自己的事件。

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use contracts::{EventSink, SyncEvent};

use crate::metrics::SinkMetrics;

pub struct SinkHandle {
    name: String,
    tx: mpsc::Sender<SyncEvent>,
    metrics: Arc<SinkMetrics>,
    worker: JoinHandle<()>,
}

impl SinkHandle {
    /// 启动 sink 的写入 task
    pub fn spawn<S: EventSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());
        let worker = tokio::spawn(drain(sink, rx, Arc::clone(&metrics), name.clone()));

        Self {
            name,
            tx,
            metrics,
            worker,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Queue an event without waiting; false when it was dropped
    pub fn try_send(&self, event: SyncEvent) -> bool {
        let rejected = match self.tx.try_send(event) {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                return true;
            }
            Err(TrySendError::Full(event)) => event,
            Err(TrySendError::Closed(event)) => {
                error!(sink = %self.name, kind = event.kind(), "sink task is gone");
                return false;
            }
        };
        self.metrics.inc_dropped_count();
        warn!(
            sink = %self.name,
            kind = rejected.kind(),
            timestamp = rejected.timestamp(),
            "sink queue full, event dropped"
        );
        false
    }

    /// 关闭队列，等待剩余事件写完
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            error!(error = ?e, "sink task panicked");
        }
    }
}

#[instrument(name = "sink_drain", skip(sink, rx, metrics), fields(sink = %name))]
async fn drain<S: EventSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<SyncEvent>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    while let Some(event) = rx.recv().await {
        metrics.set_queue_len(rx.len());
        if let Err(e) = sink.write(&event).await {
            // 写失败只计数，继续处理后续事件
            metrics.inc_failure_count();
            error!(kind = event.kind(), error = %e, "sink write failed");
        } else {
            metrics.record_write(&event);
        }
    }

    if let Err(e) = sink.flush().await {
        error!(error = %e, "final flush failed");
    }
    if let Err(e) = sink.close().await {
        error!(error = %e, "close failed");
    }
    debug!(written = metrics.write_count(), "sink drained");
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ContractError, SyncFoundEvent, VideoMarkerEvent};
    use tokio::time::{sleep, Duration};

    /// Records indices it accepted; refuses the ones in `reject`
    struct Recorder {
        accepted: Arc<std::sync::Mutex<Vec<u32>>>,
        reject: Vec<u32>,
        delay: Duration,
    }

    impl Recorder {
        fn new(reject: Vec<u32>, delay: Duration) -> (Self, Arc<std::sync::Mutex<Vec<u32>>>) {
            let accepted = Arc::new(std::sync::Mutex::new(Vec::new()));
            let sink = Self {
                accepted: Arc::clone(&accepted),
                reject,
                delay,
            };
            (sink, accepted)
        }
    }

    impl EventSink for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn write(&mut self, event: &SyncEvent) -> Result<(), ContractError> {
            sleep(self.delay).await;
            let SyncEvent::SyncFound(found) = event else {
                return Ok(());
            };
            if self.reject.contains(&found.index) {
                return Err(ContractError::sink_write("recorder", "rejected"));
            }
            self.accepted.lock().unwrap().push(found.index);
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    fn found(index: u32) -> SyncEvent {
        SyncEvent::SyncFound(SyncFoundEvent {
            index,
            video_ts: u64::from(index) * 300_000_000,
            audio_ts: u64::from(index) * 300_000_000 + 50_000,
        })
    }

    #[tokio::test]
    async fn test_events_written_in_order() {
        let (sink, accepted) = Recorder::new(vec![], Duration::ZERO);
        let handle = SinkHandle::spawn(sink, 16);

        assert!(handle.try_send(SyncEvent::VideoMarker(VideoMarkerEvent {
            timestamp: 0,
            score: 1.0,
            descriptor: Default::default(),
        })));
        for i in 0..5 {
            assert!(handle.try_send(found(i)));
        }

        let metrics = Arc::clone(handle.metrics());
        handle.shutdown().await;
        assert_eq!(*accepted.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        let snap = metrics.snapshot();
        assert_eq!(snap.video_markers, 1);
        assert_eq!(snap.sync_found, 5);
        assert_eq!(snap.dropped_count, 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_newest() {
        let (sink, accepted) = Recorder::new(vec![], Duration::from_millis(50));
        let handle = SinkHandle::spawn(sink, 2);

        let sent = (0..10).filter(|i| handle.try_send(found(*i))).count();
        assert!(sent < 10);

        let metrics = Arc::clone(handle.metrics());
        handle.shutdown().await;
        assert_eq!(metrics.dropped_count() as usize, 10 - sent);
        assert_eq!(accepted.lock().unwrap().len(), sent);
    }

    #[tokio::test]
    async fn test_failed_write_does_not_stop_sink() {
        let (sink, accepted) = Recorder::new(vec![1, 3], Duration::ZERO);
        let handle = SinkHandle::spawn(sink, 10);
        for i in 0..5 {
            handle.try_send(found(i));
        }

        let metrics = Arc::clone(handle.metrics());
        handle.shutdown().await;
        assert_eq!(*accepted.lock().unwrap(), vec![0, 2, 4]);
        assert_eq!(metrics.failure_count(), 2);
        assert_eq!(metrics.sync_found_count(), 3);
    }
}
