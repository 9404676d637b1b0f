//! Pipeline statistics.

use std::time::Duration;

use observability::MarkerStatistics;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Video frames run through the engine
    pub frames_processed: u64,

    /// Audio blocks run through the engine
    pub blocks_processed: u64,

    /// Engine events forwarded to the dispatcher
    pub events: u64,

    /// Total duration of the pipeline run
    pub duration: Duration,

    /// Number of sinks that received data
    pub active_sinks: usize,

    /// Stopped by signal or timeout before the capture ended
    pub interrupted: bool,

    pub capture: ingestion::MetricsSnapshot,

    pub markers: MarkerStatistics,

    /// Final per-sink counters
    pub sinks: Vec<(String, dispatcher::MetricsSnapshot)>,
}

impl PipelineStats {
    /// Video frames per second of wall time
    pub fn fps(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.frames_processed as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Pipeline Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Video frames: {} ({:.1} fps)", self.frames_processed, self.fps());
        println!("   ├─ Audio blocks: {}", self.blocks_processed);
        println!("   ├─ Capture drops: {}", self.capture.dropped);
        println!("   ├─ Events: {}", self.events);
        println!("   └─ Active sinks: {}", self.active_sinks);
        if self.interrupted {
            println!("   (interrupted before the capture ended)");
        }

        println!();
        print!("{}", self.markers.summary());

        if !self.sinks.is_empty() {
            println!("\n📤 Sinks");
            for (i, (name, m)) in self.sinks.iter().enumerate() {
                let prefix = if i + 1 == self.sinks.len() { "└─" } else { "├─" };
                println!(
                    "   {} {}: {} written, {} failed, {} dropped",
                    prefix,
                    name,
                    m.write_count(),
                    m.failure_count,
                    m.dropped_count
                );
            }
        }

        println!();
    }
}
