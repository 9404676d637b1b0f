//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::tone::Modulation;
use contracts::RunConfig;
use ingestion::TestPattern;

use crate::cli::ValidateArgs;
use crate::error::CliError;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    resolution: String,
    pixel_format: String,
    sample_rate: u32,
    channels: u16,
    tone_hz: u32,
    modulation: String,
    index_modulus: u32,
    sink_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(CliError::missing_config(&args.config).to_string()),
            warnings: Vec::new(),
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(run) => ValidationResult {
            valid: true,
            config_path,
            error: None,
            warnings: collect_warnings(&run),
            summary: Some(summarize(&run)),
        },
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: Vec::new(),
            summary: None,
        },
    }
}

fn summarize(run: &RunConfig) -> ConfigSummary {
    ConfigSummary {
        version: format!("{:?}", run.version),
        resolution: format!("{}x{}", run.capture.width, run.capture.height),
        pixel_format: format!("{:?}", run.capture.pixel_format),
        sample_rate: run.capture.sample_rate,
        channels: run.capture.channels,
        tone_hz: run.pattern.frequency,
        modulation: format!("{:?}", Modulation::from_flags(run.pattern.type_flags)),
        index_modulus: run.pattern.index_modulus,
        sink_count: run.sinks.len(),
    }
}

/// Non-fatal issues
fn collect_warnings(run: &RunConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if run.sinks.is_empty() {
        warnings.push("No sinks configured - events will only be counted".to_string());
    }

    match TestPattern::new(&run.capture, &run.pattern) {
        Ok(pattern) => {
            if pattern.cycle_count() == 0 {
                warnings.push(format!(
                    "duration {} s ends before the first marker",
                    run.pattern.duration_s
                ));
            }
            let half_cycle_ns = pattern.capture().frame_ts(pattern.cycle_frames()) / 2;
            if run.pattern.audio_delay_ns.unsigned_abs() >= half_cycle_ns {
                warnings.push(format!(
                    "audio delay {} ns is over half a marker cycle ({} ns); pairings rely on the index alone",
                    run.pattern.audio_delay_ns, half_cycle_ns
                ));
            }
        }
        Err(e) => warnings.push(format!("test pattern cannot be generated: {e}")),
    }

    if run.pattern.amplitude < 0.05 {
        warnings.push(format!(
            "tone amplitude {} may fall below the audio detection threshold",
            run.pattern.amplitude
        ));
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Video: {} {}", summary.resolution, summary.pixel_format);
            println!("  Audio: {} Hz x {}", summary.sample_rate, summary.channels);
            println!(
                "  Tone: {} Hz {} (modulus {})",
                summary.tone_hz, summary.modulation, summary.index_modulus
            );
            println!("  Sinks: {}", summary.sink_count);
        }

        if !result.warnings.is_empty() {
            println!("\n⚠ Warnings:");
            for warning in &result.warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
