//! 命令行错误

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("config file {} does not exist", path.display())]
    MissingConfig { path: PathBuf },

    /// A video or audio detection task panicked or was cancelled
    #[error("{path} detection task ended abnormally: {source}")]
    DetectionTask {
        path: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },
}

impl CliError {
    pub fn missing_config(path: impl Into<PathBuf>) -> Self {
        Self::MissingConfig { path: path.into() }
    }
}
