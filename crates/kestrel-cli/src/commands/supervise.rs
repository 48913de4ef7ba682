//! `kestrel supervise`: relaunch `kestrel run` on request.

use anyhow::{Context, Result};
use kestrel_kernel::{CommandSpawner, Supervisor};
use tracing::info;

use crate::RunArgs;
use crate::theme::Theme;

/// Arguments for the child, minus `--artifact-location`, which the
/// supervisor adds itself.
fn child_args(args: &RunArgs, verbose: bool) -> Vec<String> {
    let mut child = vec!["run".to_string()];
    if verbose {
        child.push("--verbose".to_string());
    }
    if let Some(config) = &args.config {
        child.push("--config".to_string());
        child.push(config.display().to_string());
    }
    for spec in &args.load {
        child.push("--load".to_string());
        child.push(spec.clone());
    }
    child
}

/// Supervise children until one exits without asking for a relaunch.
pub(crate) async fn run(args: &RunArgs, verbose: bool) -> Result<i32> {
    let (resolved, home) = super::boot(args.config.as_deref(), verbose)?;
    let program = std::env::current_exe().context("cannot locate the kestrel executable")?;
    let cache_dir = resolved
        .config
        .cache
        .path
        .clone()
        .unwrap_or_else(|| home.cache_dir());

    let supervisor = Supervisor::new(
        CommandSpawner::new(program),
        child_args(args, verbose),
        home.handoff_path(),
        cache_dir,
    )
    .max_restarts(resolved.config.launcher.max_restarts)
    .initial_location(args.artifact_location.clone());

    info!(max_restarts = resolved.config.launcher.max_restarts, "supervising");
    let disposition = tokio::task::spawn_blocking(move || supervisor.run())
        .await
        .context("supervisor task panicked")?;

    println!("{}", Theme::success(&format!("supervision ended: {disposition}")));
    Ok(disposition.code())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_child_args_omit_location() {
        let args = RunArgs {
            config: Some(PathBuf::from("/etc/kestrel.toml")),
            artifact_location: Some("/opt/kestrel".into()),
            load: vec!["org.example:widgets:1.0@none".into()],
        };
        assert_eq!(
            child_args(&args, true),
            vec![
                "run",
                "--verbose",
                "--config",
                "/etc/kestrel.toml",
                "--load",
                "org.example:widgets:1.0@none",
            ]
        );
    }
}
