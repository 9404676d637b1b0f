//! # Config Loader
//!
//! 读取 avsync 运行配置：采集格式、测试图案、检测引擎参数、sink 列表。
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("avsync.toml")).unwrap();
//! println!("{}x{} {:?}", config.capture.width, config.capture.height, config.capture.pixel_format);
//! ```

mod parser;
mod validator;

pub use contracts::RunConfig;
pub use parser::ConfigFormat;

use std::collections::HashMap;
use std::path::Path;

use contracts::{
    CaptureConfig, ConfigVersion, ContractError, EngineConfig, PatternConfig, PixelFormat,
    SinkConfig, SinkType,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Read, parse and check a config file; the extension picks the syntax
    pub fn load_from_path(path: &Path) -> Result<RunConfig, ContractError> {
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ContractError::config_parse("config file has no extension"))
            .and_then(|ext| {
                ConfigFormat::from_extension(ext).ok_or_else(|| {
                    ContractError::config_parse(format!("unsupported config format: .{ext}"))
                })
            })?;
        let content =
            std::fs::read_to_string(path).map_err(|e| ContractError::config_read(path, e))?;
        Self::load_from_str(&content, format)
    }

    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<RunConfig, ContractError> {
        let config = parser::parse(content, format)?;
        validator::validate(&config)?;
        Ok(config)
    }

    /// Configuration used when no file is given: 720p NV12 at 30 fps,
    /// stereo 48 kHz, default pattern, one log sink
    pub fn default_config() -> RunConfig {
        RunConfig {
            version: ConfigVersion::V1,
            engine: EngineConfig::default(),
            capture: CaptureConfig {
                width: 1280,
                height: 720,
                pixel_format: PixelFormat::Nv12,
                fps_num: 30,
                fps_den: 1,
                sample_rate: 48_000,
                channels: 2,
                block_size: 1024,
            },
            pattern: PatternConfig::default(),
            sinks: vec![SinkConfig {
                name: "log".into(),
                sink_type: SinkType::Log,
                queue_capacity: 100,
                params: HashMap::new(),
            }],
        }
    }

    /// Re-check a configuration after it was changed in code
    pub fn validate(config: &RunConfig) -> Result<(), ContractError> {
        validator::validate(config)
    }

    pub fn to_toml(config: &RunConfig) -> Result<String, ContractError> {
        toml::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    pub fn to_json(config: &RunConfig) -> Result<String, ContractError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}
