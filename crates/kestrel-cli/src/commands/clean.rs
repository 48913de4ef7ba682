//! `kestrel clean`: drop the artifact cache.

use std::path::Path;

use anyhow::{Context, Result};
use kestrel_artifact::RepositorySource;

use crate::theme::Theme;

/// Delete the configured cache directory.
pub(crate) fn run(config: Option<&Path>) -> Result<()> {
    let resolved = kestrel_config::Config::load(config).context("failed to load configuration")?;
    let Some(cache) = resolved.config.cache.path else {
        println!("{}", Theme::warning("no cache configured"));
        return Ok(());
    };

    let removed = RepositorySource::new(&cache)
        .clear_cache()
        .with_context(|| format!("failed to clear {}", cache.display()))?;
    if removed {
        println!("{}", Theme::success(&format!("cleared {}", cache.display())));
    } else {
        println!("{}", Theme::success("cache already empty"));
    }
    Ok(())
}
