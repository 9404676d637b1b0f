//! 配置校验模块
//!
//! 校验规则：
//! - 数值范围 (`validator` 派生规则)
//! - 视频采样环长度为偶数
//! - sync_channel 小于音频通道数
//! - 像素格式带亮度平面
//! - 音调帧长度不超过视频标记时长
//! - sink 名称非空且唯一，file sink 需要 path

use std::collections::HashSet;

use contracts::tone::ToneGeometry;
use contracts::{ContractError, RunConfig, SinkType, TYPE_QPSK};
use validator::{Validate, ValidationErrors};

/// 校验 RunConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &RunConfig) -> Result<(), ContractError> {
    validate_ranges(config)?;
    validate_engine(config)?;
    validate_capture(config)?;
    validate_pattern(config)?;
    validate_sinks(config)?;
    Ok(())
}

/// 派生范围规则，按字段名取第一个错误
fn validate_ranges(config: &RunConfig) -> Result<(), ContractError> {
    first_error("engine", config.engine.validate())?;
    first_error("capture", config.capture.validate())?;
    first_error("pattern", config.pattern.validate())?;
    Ok(())
}

fn first_error(section: &str, result: Result<(), ValidationErrors>) -> Result<(), ContractError> {
    let Err(errors) = result else {
        return Ok(());
    };
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    let Some((field, errs)) = fields.into_iter().next() else {
        return Err(ContractError::config_validation(section, errors.to_string()));
    };
    let message = errs
        .first()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "invalid value".into());
    Err(ContractError::config_validation(
        format!("{section}.{field}"),
        message,
    ))
}

/// 校验引擎参数
fn validate_engine(config: &RunConfig) -> Result<(), ContractError> {
    let engine = &config.engine;
    if engine.video_buffer_len % 2 != 0 {
        return Err(ContractError::config_validation(
            "engine.video_buffer_len",
            format!("must be even, got {}", engine.video_buffer_len),
        ));
    }
    if engine.sync_channel >= usize::from(config.capture.channels) {
        return Err(ContractError::config_validation(
            "engine.sync_channel",
            format!(
                "channel {} out of range for {} audio channels",
                engine.sync_channel, config.capture.channels
            ),
        ));
    }
    Ok(())
}

/// 校验采集格式
fn validate_capture(config: &RunConfig) -> Result<(), ContractError> {
    let capture = &config.capture;
    if capture.pixel_format.luma_layout().is_none() {
        return Err(ContractError::config_validation(
            "capture.pixel_format",
            format!("{:?} has no luma plane", capture.pixel_format),
        ));
    }
    Ok(())
}

/// 校验测试图案
fn validate_pattern(config: &RunConfig) -> Result<(), ContractError> {
    let pattern = &config.pattern;
    let capture = &config.capture;

    if pattern.cycles > pattern.frequency {
        return Err(ContractError::config_validation(
            "pattern.cycles",
            format!(
                "cycles ({}) must be <= frequency ({})",
                pattern.cycles, pattern.frequency
            ),
        ));
    }
    if pattern.type_flags & TYPE_QPSK == 0 && pattern.index_modulus > 256 {
        return Err(ContractError::config_validation(
            "pattern.index_modulus",
            format!(
                "BPSK tone frames carry 8 bits, modulus {} needs QPSK",
                pattern.index_modulus
            ),
        ));
    }

    let geometry = ToneGeometry::new(
        pattern.frequency,
        pattern.cycles,
        capture.sample_rate,
        pattern.type_flags,
    )
    .ok_or_else(|| {
        ContractError::config_validation(
            "pattern.cycles",
            format!(
                "symbol of {} cycles at {} Hz is shorter than one sample",
                pattern.cycles, pattern.frequency
            ),
        )
    })?;

    let tone_ns = geometry.samples_to_ns(geometry.frame_len());
    let marker_ns = capture.frame_ts(2 * u64::from(pattern.quantization_frames));
    if tone_ns > marker_ns {
        return Err(ContractError::config_validation(
            "pattern.quantization_frames",
            format!("tone frame ({tone_ns} ns) longer than the video marker ({marker_ns} ns)"),
        ));
    }
    Ok(())
}

/// 校验 sink 配置
fn validate_sinks(config: &RunConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in config.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("sinks[{}].queue_capacity", sink.name),
                "queue_capacity must be > 0",
            ));
        }
        if sink.sink_type == SinkType::File && !sink.params.contains_key("path") {
            return Err(ContractError::config_validation(
                format!("sinks[{}].params.path", sink.name),
                "file sink requires a path",
            ));
        }
    }
    Ok(())
}
