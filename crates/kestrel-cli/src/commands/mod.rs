//! Subcommands.

pub(crate) mod clean;
pub(crate) mod path;
pub(crate) mod run;
pub(crate) mod supervise;

use std::path::Path;

use anyhow::{Context, Result};
use kestrel_config::ResolvedConfig;
use kestrel_core::KestrelHome;

use crate::config_bridge;

/// Load configuration and install logging.
pub(crate) fn boot(config: Option<&Path>, verbose: bool) -> Result<(ResolvedConfig, KestrelHome)> {
    let resolved = kestrel_config::Config::load(config).context("failed to load configuration")?;
    let home = KestrelHome::from_path(&resolved.home);

    let mut log_config = config_bridge::to_log_config(&resolved.config, &home.logs_dir());
    if verbose {
        "debug".clone_into(&mut log_config.level);
    }
    if let Err(e) = kestrel_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }
    Ok((resolved, home))
}
