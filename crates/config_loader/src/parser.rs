//! 配置文本解析
//!
//! TOML 为主，JSON 供脚本生成配置使用。

use contracts::{ContractError, RunConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// `.toml` / `.json`，大小写不敏感
    pub fn from_extension(ext: &str) -> Option<Self> {
        if ext.eq_ignore_ascii_case("toml") {
            Some(Self::Toml)
        } else if ext.eq_ignore_ascii_case("json") {
            Some(Self::Json)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
        }
    }
}

/// 解析配置文本，不做语义校验
pub fn parse(content: &str, format: ConfigFormat) -> Result<RunConfig, ContractError> {
    match format {
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| ContractError::syntax(format.name(), e))
        }
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ContractError::syntax(format.name(), e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{PixelFormat, SinkType};

    #[test]
    fn test_parse_toml_minimal() {
        let content = r#"
[capture]
width = 1280
height = 720

[[sinks]]
name = "log_sink"
sink_type = "log"
"#;
        let result = parse(content, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.capture.width, 1280);
        assert_eq!(config.capture.pixel_format, PixelFormat::Nv12);
        assert_eq!(config.capture.sample_rate, 48_000);
        assert_eq!(config.engine.video_buffer_len, 8);
        assert_eq!(config.pattern.frequency, 1000);
        assert_eq!(config.sinks[0].sink_type, SinkType::Log);
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "engine": { "sync_channel": 1, "audio_min_score": 0.1 },
            "capture": {
                "width": 640,
                "height": 360,
                "pixel_format": "i420",
                "fps_num": 30000,
                "fps_den": 1001
            },
            "pattern": { "type_flags": 2, "index_modulus": 1024 },
            "sinks": [{ "name": "out", "sink_type": "file", "params": { "path": "events.jsonl" } }]
        }"#;
        let result = parse(content, ConfigFormat::Json);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.engine.sync_channel, 1);
        assert_eq!(config.engine.max_records, 128);
        assert_eq!(config.capture.pixel_format, PixelFormat::I420);
        assert_eq!(config.pattern.index_modulus, 1024);
        assert_eq!(config.sinks[0].params["path"], "events.jsonl");
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let content = "invalid toml [[[";
        let err = parse(content, ConfigFormat::Toml).unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { source: Some(_), .. }));
        assert!(err.to_string().starts_with("config parse error: TOML parse error"));
    }

    #[test]
    fn test_unknown_pixel_format_is_parse_error() {
        let content = r#"
[capture]
width = 64
height = 64
pixel_format = "p010"
"#;
        assert!(matches!(
            parse(content, ConfigFormat::Toml),
            Err(ContractError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_format_from_extension() {
        for (ext, expected) in [
            ("toml", Some(ConfigFormat::Toml)),
            ("TOML", Some(ConfigFormat::Toml)),
            ("Json", Some(ConfigFormat::Json)),
            ("yaml", None),
        ] {
            assert_eq!(ConfigFormat::from_extension(ext), expected, "{ext}");
        }
    }
}
