//! Ingestion 错误类型

use contracts::PixelFormat;
use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 无法渲染的像素格式
    #[error("cannot render pixel format {format:?}")]
    UnsupportedFormat {
        /// 像素格式
        format: PixelFormat,
    },

    /// 测试图案参数无效
    #[error("invalid test pattern: {message}")]
    InvalidPattern {
        /// 错误消息
        message: String,
    },
}

impl IngestionError {
    pub fn invalid_pattern(message: impl Into<String>) -> Self {
        Self::InvalidPattern {
            message: message.into(),
        }
    }
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
