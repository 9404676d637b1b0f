//! Command implementations.

mod info;
mod run;
mod validate;

use std::path::Path;

use anyhow::{Context, Result};
use contracts::RunConfig;
use tracing::info;

use crate::error::CliError;

pub use info::run_info;
pub use run::run_pipeline;
pub use validate::run_validate;

/// Load a configuration file, or the built-in defaults when none is given
fn load_config(path: Option<&Path>) -> Result<RunConfig> {
    let Some(path) = path else {
        info!("No configuration file given, using defaults");
        return Ok(config_loader::ConfigLoader::default_config());
    };
    if !path.exists() {
        return Err(CliError::missing_config(path).into());
    }
    config_loader::ConfigLoader::load_from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}
