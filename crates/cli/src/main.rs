//! # avsync
//!
//! 音视频同步标记检测工具。
//!
//! 子命令：
//! - `run`：生成测试图案并检测同步延迟
//! - `validate`：校验配置文件
//! - `info`：打印图案时序

mod cli;
mod commands;
mod error;
mod pipeline;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // .env 可选
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    observability::init_with_config(observability::ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port: None,
        default_log_level: log_level(&cli).to_string(),
    })?;
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), command = ?cli.command, "avsync");

    let outcome = match &cli.command {
        Commands::Run(args) => commands::run_pipeline(args).await,
        Commands::Validate(args) => commands::run_validate(args),
        Commands::Info(args) => commands::run_info(args),
    };
    if let Err(e) = &outcome {
        tracing::error!(error = %e, "avsync failed");
    }
    outcome
}

/// `RUST_LOG` wins over `-v` / `-q`
fn log_level(cli: &Cli) -> &'static str {
    match (cli.quiet, cli.verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    }
}
