//! 分发器错误

use contracts::ContractError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatcherError {
    /// sink 打开失败（参数缺失、文件无法创建）
    #[error("cannot open sink '{name}': {source}")]
    SinkOpen {
        name: String,
        #[source]
        source: ContractError,
    },
}

impl DispatcherError {
    pub fn sink_open(name: impl Into<String>, source: ContractError) -> Self {
        Self::SinkOpen {
            name: name.into(),
            source,
        }
    }

    /// Name of the sink that failed
    pub fn sink_name(&self) -> &str {
        match self {
            Self::SinkOpen { name, .. } => name,
        }
    }
}
