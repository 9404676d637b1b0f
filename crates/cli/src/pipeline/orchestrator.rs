//! Pipeline orchestrator - coordinates all components.
//!
//! The synthetic capture feeds two tasks, one per session path. Their events
//! are merged here, folded into statistics and forwarded to the dispatcher.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{RunConfig, SyncEvent};
use ingestion::{BackpressureConfig, DropPolicy, IngestionMetrics, SyntheticCapture};
use observability::{record_event, record_pending_records, MarkerStatistics};
use sync_engine::SyncSession;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::PipelineStats;
use crate::error::CliError;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub run: RunConfig,

    /// Stop after this many pairings (None = unlimited)
    pub max_syncs: Option<u64>,

    /// Pipeline timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Channel buffer size
    pub buffer_size: usize,

    pub drop_policy: DropPolicy,

    /// Pace the capture at the nominal rates
    pub realtime: bool,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until the capture ends, a limit is hit or `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<PipelineStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let run = &self.config.run;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let capture = SyntheticCapture::new(&run.capture, &run.pattern)
            .context("Failed to build test pattern")?;
        let session = SyncSession::new(&run.engine, &run.capture_format())
            .context("Failed to start sync session")?;
        let shared = session.shared().clone();
        let (mut video, mut audio) = session.split();

        // Dispatcher
        if run.sinks.is_empty() {
            warn!("No sinks configured - events will only be counted");
        }
        let (sink_tx, sink_rx) = mpsc::channel::<SyncEvent>(self.config.buffer_size);
        let dispatcher = dispatcher::create_dispatcher(run.sinks.clone(), sink_rx)
            .context("Failed to create dispatcher")?;
        let dispatcher_handle = dispatcher.spawn();
        info!(active_sinks = run.sinks.len(), "Dispatcher started");

        // Capture
        let capture_metrics = Arc::new(IngestionMetrics::new());
        let backpressure = BackpressureConfig::new(self.config.buffer_size, self.config.drop_policy)
            .realtime(self.config.realtime);
        let streams = capture.start(backpressure, Some(Arc::clone(&capture_metrics)));

        // One task per session path, merged into a single event stream
        let (events_tx, mut events_rx) = mpsc::channel::<SyncEvent>(self.config.buffer_size * 4);

        let video_task: JoinHandle<u64> = {
            let rx = streams.video.clone();
            let tx = events_tx.clone();
            tokio::spawn(async move {
                let mut frames = 0;
                while let Ok(frame) = rx.recv().await {
                    frames += 1;
                    for event in video.process_frame(&frame) {
                        if tx.send(event).await.is_err() {
                            return frames;
                        }
                    }
                }
                frames
            })
        };

        let audio_task: JoinHandle<u64> = {
            let rx = streams.audio.clone();
            let tx = events_tx;
            tokio::spawn(async move {
                let mut blocks = 0;
                while let Ok(block) = rx.recv().await {
                    blocks += 1;
                    for event in audio.process_block(&block) {
                        if tx.send(event).await.is_err() {
                            return blocks;
                        }
                    }
                }
                blocks
            })
        };
        drop(streams.video);
        drop(streams.audio);

        info!(
            max_syncs = ?self.config.max_syncs,
            realtime = self.config.realtime,
            "Pipeline running"
        );

        let mut stats = PipelineStats {
            markers: MarkerStatistics::new(run.engine.sync_channel),
            active_sinks: run.sinks.len(),
            ..Default::default()
        };

        let deadline = async {
            match self.config.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(shutdown);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                maybe_event = events_rx.recv() => {
                    let Some(event) = maybe_event else {
                        debug!("Both session paths finished");
                        break;
                    };
                    record_event(&event);
                    stats.markers.update(&event);
                    stats.events += 1;

                    if let SyncEvent::SyncFound(_) = event {
                        record_pending_records(shared.pending_records());
                    }
                    if sink_tx.send(event).await.is_err() {
                        warn!("Dispatcher channel closed");
                        break;
                    }

                    if let Some(max) = self.config.max_syncs {
                        if stats.markers.sync_found >= max {
                            info!(syncs = stats.markers.sync_found, "Reached max syncs limit");
                            break;
                        }
                    }
                }
                _ = &mut shutdown => {
                    warn!("Shutdown requested, stopping pipeline");
                    stats.interrupted = true;
                    break;
                }
                _ = &mut deadline => {
                    warn!(timeout = ?self.config.timeout, "Pipeline timed out");
                    stats.interrupted = true;
                    break;
                }
            }
        }

        // Shutdown
        info!("Shutting down pipeline...");
        capture.stop();
        drop(events_rx);

        stats.frames_processed = join_path("video", video_task).await?;
        stats.blocks_processed = join_path("audio", audio_task).await?;
        for handle in [streams.video_task, streams.audio_task] {
            if let Err(e) = handle.await {
                warn!(error = %e, "Capture task failed");
            }
        }
        stats.capture = capture_metrics.snapshot();

        drop(sink_tx);
        match tokio::time::timeout(Duration::from_secs(5), dispatcher_handle).await {
            Ok(Ok(sinks)) => stats.sinks = sinks,
            Ok(Err(e)) => warn!(error = %e, "Dispatcher task failed"),
            Err(_) => warn!("Dispatcher did not drain within 5s"),
        }

        stats.duration = start_time.elapsed();
        info!(
            duration_secs = stats.duration.as_secs_f64(),
            events = stats.events,
            syncs = stats.markers.sync_found,
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}

async fn join_path(path: &'static str, task: JoinHandle<u64>) -> Result<u64> {
    task.await
        .map_err(|source| CliError::DetectionTask { path, source }.into())
}
