//! `kestrel run`: one kernel, in this process.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use kestrel_artifact::IsolationPolicy;
use kestrel_core::Coordinate;
use kestrel_kernel::{ExitDisposition, Flow, KernelBuilder, Launcher};
use tracing::info;

use crate::RunArgs;
use crate::theme::Theme;

/// Parse `group:artifact:version[@policy]`. The policy defaults to `full`.
pub(crate) fn parse_load_spec(spec: &str) -> Result<(Coordinate, IsolationPolicy)> {
    let (coordinate, policy) = match spec.rsplit_once('@') {
        Some((coordinate, policy)) => (coordinate, policy.parse()?),
        None => (spec, IsolationPolicy::default()),
    };
    let coordinate = Coordinate::parse(coordinate)?;
    if !coordinate.is_versioned() {
        bail!("'{spec}' has no version");
    }
    Ok((coordinate, policy))
}

/// Boot, wait for ctrl-c or a termination request, return the exit code.
pub(crate) async fn run(args: &RunArgs, verbose: bool) -> Result<i32> {
    let (resolved, home) = super::boot(args.config.as_deref(), verbose)?;

    let mut builder =
        KernelBuilder::from_config(&resolved.config, args.artifact_location.as_deref())
            .context("invalid kernel configuration")?;
    for spec in &args.load {
        let (coordinate, isolation) =
            parse_load_spec(spec).with_context(|| format!("invalid --load '{spec}'"))?;
        builder = builder.preload(coordinate, isolation);
    }

    let kernel = Arc::new(builder.build());
    info!(
        kernel = %kernel.id(),
        artifact = %kernel.artifact(),
        config_files = resolved.loaded_files.len(),
        "booting"
    );
    println!("{}", Theme::header(&format!("kestrel {}", kernel.artifact())));

    let launcher = Launcher::new(Arc::clone(&kernel), home.handoff_path());
    let disposition = launcher
        .run(async { Flow::Continue(()) }, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    match disposition {
        ExitDisposition::Failure => {
            return Ok(crate::report_failure("kernel failed; see log for details"));
        },
        ExitDisposition::Terminate => println!("{}", Theme::success("kernel stopped")),
        ExitDisposition::Restart | ExitDisposition::Clean => {
            println!("{}", Theme::warning(&format!("kernel exiting for {disposition}")));
        },
    }
    Ok(disposition.code())
}
