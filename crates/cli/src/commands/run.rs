//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{error, info};

use contracts::RunConfig;

use crate::cli::RunArgs;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    let mut run = super::load_config(args.config.as_deref())?;

    if let Some(duration) = args.duration {
        info!(duration, "Overriding pattern duration from CLI");
        run.pattern.duration_s = duration;
    }
    if let Some(delay) = args.audio_delay_ns {
        info!(delay, "Overriding audio delay from CLI");
        run.pattern.audio_delay_ns = delay;
    }
    config_loader::ConfigLoader::validate(&run).context("Invalid configuration after overrides")?;

    info!(
        width = run.capture.width,
        height = run.capture.height,
        pixel_format = ?run.capture.pixel_format,
        sample_rate = run.capture.sample_rate,
        channels = run.capture.channels,
        sinks = run.sinks.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&run);
        return Ok(());
    }

    let pipeline = Pipeline::new(PipelineConfig {
        run,
        max_syncs: (args.max_syncs > 0).then_some(args.max_syncs),
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        buffer_size: args.buffer_size.max(1),
        drop_policy: args.drop_policy.into(),
        realtime: args.realtime,
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    });

    info!("Starting pipeline...");
    let stats = pipeline
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        syncs = stats.markers.sync_found,
        events = stats.events,
        duration_secs = stats.duration.as_secs_f64(),
        "Pipeline finished"
    );
    stats.print_summary();

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(run: &RunConfig) {
    let capture = &run.capture;
    let pattern = &run.pattern;

    println!("\n=== Configuration Summary ===\n");
    println!("Capture:");
    println!(
        "  Video: {}x{} {:?} @ {}/{} fps",
        capture.width, capture.height, capture.pixel_format, capture.fps_num, capture.fps_den
    );
    println!(
        "  Audio: {} Hz, {} channels, {} frames per block",
        capture.sample_rate, capture.channels, capture.block_size
    );
    println!("\nPattern:");
    println!(
        "  Tone: {} Hz, {} cycles per symbol, flags {}",
        pattern.frequency, pattern.cycles, pattern.type_flags
    );
    println!(
        "  Phase: {} frames, index modulus {}",
        pattern.quantization_frames, pattern.index_modulus
    );
    println!(
        "  Audio delay: {} ns, duration {} s",
        pattern.audio_delay_ns, pattern.duration_s
    );
    println!("\nEngine:");
    println!("  Sync channel: {}", run.engine.sync_channel);
    println!("  Video ring: {} frames", run.engine.video_buffer_len);

    if !run.sinks.is_empty() {
        println!("\nSinks ({}):", run.sinks.len());
        for sink in &run.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    println!();
}
