//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{RunConfig, TYPE_AUDIO_START_AT_SYNC};
use ingestion::TestPattern;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    capture: CaptureInfo,
    tone: ToneInfo,
    timing: TimingInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cycles: Vec<CycleInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct CaptureInfo {
    width: u32,
    height: u32,
    pixel_format: String,
    fps: f64,
    sample_rate: u32,
    channels: u16,
}

#[derive(Serialize)]
struct ToneInfo {
    frequency_hz: u32,
    cycles_per_symbol: u32,
    modulation: String,
    symbol_samples: usize,
    frame_symbols: usize,
    frame_samples: usize,
    frame_ms: f64,
    starts_at_sync: bool,
    marker_offset_ns: u64,
}

#[derive(Serialize)]
struct TimingInfo {
    quantization_frames: u32,
    cycle_frames: u64,
    cycle_ms: f64,
    index_modulus: u32,
    audio_delay_ns: i64,
    frame_count: u64,
    marker_count: u64,
}

#[derive(Serialize)]
struct CycleInfo {
    cycle: u64,
    index: u32,
    transition_frame: u64,
    transition_ns: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    tone_start_sample: Option<u64>,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    let run = super::load_config(args.config.as_deref())?;
    info!("Computing pattern timing");

    let pattern =
        TestPattern::new(&run.capture, &run.pattern).context("Failed to build test pattern")?;
    let info = build_config_info(&run, &pattern, args);

    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn build_config_info(run: &RunConfig, pattern: &TestPattern, args: &InfoArgs) -> ConfigInfo {
    let capture = &run.capture;
    let geometry = pattern.geometry();
    let starts_at_sync = run.pattern.type_flags & TYPE_AUDIO_START_AT_SYNC != 0;

    let cycles = (0..args.cycles.min(pattern.cycle_count()))
        .map(|cycle| CycleInfo {
            cycle,
            index: pattern.index(cycle),
            transition_frame: pattern.transition_frame(cycle),
            transition_ns: pattern.transition_ts(cycle),
            tone_start_sample: pattern.tone_start_sample(cycle),
        })
        .collect();

    let sinks = if args.sinks {
        run.sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
                queue_capacity: s.queue_capacity,
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", run.version),
        capture: CaptureInfo {
            width: capture.width,
            height: capture.height,
            pixel_format: format!("{:?}", capture.pixel_format),
            fps: f64::from(capture.fps_num) / f64::from(capture.fps_den),
            sample_rate: capture.sample_rate,
            channels: capture.channels,
        },
        tone: ToneInfo {
            frequency_hz: geometry.frequency_hz,
            cycles_per_symbol: geometry.cycles_per_symbol,
            modulation: format!("{:?}", geometry.modulation),
            symbol_samples: geometry.symbol_len,
            frame_symbols: geometry.frame_symbols(),
            frame_samples: geometry.frame_len(),
            frame_ms: geometry.samples_to_ns(geometry.frame_len()) as f64 / 1e6,
            starts_at_sync,
            marker_offset_ns: geometry.marker_offset_ns(starts_at_sync),
        },
        timing: TimingInfo {
            quantization_frames: run.pattern.quantization_frames,
            cycle_frames: pattern.cycle_frames(),
            cycle_ms: capture.frame_ts(pattern.cycle_frames()) as f64 / 1e6,
            index_modulus: run.pattern.index_modulus,
            audio_delay_ns: run.pattern.audio_delay_ns,
            frame_count: pattern.frame_count(),
            marker_count: pattern.cycle_count(),
        },
        cycles,
        sinks,
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                  avsync Pattern Information                  ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let c = &info.capture;
    println!("🎥 Capture");
    println!("   ├─ Version: {}", info.version);
    println!("   ├─ Video: {}x{} {} @ {:.3} fps", c.width, c.height, c.pixel_format, c.fps);
    println!("   └─ Audio: {} Hz, {} channels", c.sample_rate, c.channels);

    let t = &info.tone;
    println!("\n🔊 Tone Frame");
    println!("   ├─ Carrier: {} Hz, {} cycles per symbol", t.frequency_hz, t.cycles_per_symbol);
    println!("   ├─ Modulation: {}", t.modulation);
    println!(
        "   ├─ Symbols: {} x {} samples = {} samples ({:.2} ms)",
        t.frame_symbols, t.symbol_samples, t.frame_samples, t.frame_ms
    );
    println!(
        "   └─ Marker offset: {} ns ({})",
        t.marker_offset_ns,
        if t.starts_at_sync { "frame starts at sync" } else { "frame centred on sync" }
    );

    let m = &info.timing;
    println!("\n⏱  Pattern Timing");
    println!("   ├─ Phase: {} frames", m.quantization_frames);
    println!("   ├─ Cycle: {} frames ({:.2} ms)", m.cycle_frames, m.cycle_ms);
    println!("   ├─ Index modulus: {}", m.index_modulus);
    println!("   ├─ Audio delay: {} ns", m.audio_delay_ns);
    println!("   └─ Markers: {} in {} frames", m.marker_count, m.frame_count);

    if !info.cycles.is_empty() {
        println!("\n📍 Cycles");
        for (i, cycle) in info.cycles.iter().enumerate() {
            let prefix = if i + 1 == info.cycles.len() { "└─" } else { "├─" };
            let tone = cycle
                .tone_start_sample
                .map_or_else(|| "-".to_string(), |s| s.to_string());
            println!(
                "   {} #{} index {}: frame {} at {} ns, tone at sample {}",
                prefix, cycle.cycle, cycle.index, cycle.transition_frame, cycle.transition_ns, tone
            );
        }
    }

    if !info.sinks.is_empty() {
        println!("\n📤 Sinks ({})", info.sinks.len());
        for (i, sink) in info.sinks.iter().enumerate() {
            let prefix = if i + 1 == info.sinks.len() { "└─" } else { "├─" };
            println!(
                "   {} {} ({}, queue {})",
                prefix, sink.name, sink.sink_type, sink.queue_capacity
            );
        }
    }

    println!();
}
