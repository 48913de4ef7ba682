//! Parent-side half of the restart protocol.

use std::io;
use std::path::PathBuf;
use std::process::Command;

use tracing::{error, info, warn};

use kestrel_artifact::RepositorySource;

use super::{ExitDisposition, Handoff};
use crate::restart::Termination;

/// Argument the supervisor adds when relaunching from a new location.
pub const ARTIFACT_LOCATION_ARG: &str = "--artifact-location";

/// Runs one child to completion and reports its exit code.
pub trait ChildSpawner: Send + Sync {
    /// Run the child with `args` and wait for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the child cannot be spawned or waited on.
    fn run(&self, args: &[String]) -> io::Result<i32>;
}

impl<T: ChildSpawner + ?Sized> ChildSpawner for &T {
    fn run(&self, args: &[String]) -> io::Result<i32> {
        (**self).run(args)
    }
}

/// Spawns a real executable.
#[derive(Debug, Clone)]
pub struct CommandSpawner {
    program: PathBuf,
}

impl CommandSpawner {
    /// Spawn `program`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ChildSpawner for CommandSpawner {
    fn run(&self, args: &[String]) -> io::Result<i32> {
        let status = Command::new(&self.program).args(args).status()?;
        // Killed by a signal: no code, treat as failure.
        Ok(status.code().unwrap_or(ExitDisposition::Failure.code()))
    }
}

/// Relaunches a child process according to its exit disposition.
///
/// On `Restart` the child is relaunched with `--artifact-location` taken
/// from the handoff. On `Clean` the artifact cache is cleared first. Any
/// other disposition ends supervision.
pub struct Supervisor<S> {
    spawner: S,
    args: Vec<String>,
    handoff_path: PathBuf,
    cache_dir: PathBuf,
    max_restarts: u32,
    initial_location: Option<String>,
}

impl<S: ChildSpawner> Supervisor<S> {
    /// Supervise children started by `spawner` with `args`.
    #[must_use]
    pub fn new(
        spawner: S,
        args: Vec<String>,
        handoff_path: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            spawner,
            args,
            handoff_path: handoff_path.into(),
            cache_dir: cache_dir.into(),
            max_restarts: 16,
            initial_location: None,
        }
    }

    /// Location passed to the first child.
    #[must_use]
    pub fn initial_location(mut self, location: Option<String>) -> Self {
        self.initial_location = location;
        self
    }

    /// Upper bound on relaunches.
    #[must_use]
    pub fn max_restarts(mut self, max_restarts: u32) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    /// Run children until one exits without asking for a relaunch.
    ///
    /// Returns the last child's disposition, or `Failure` if it could not
    /// be spawned or the restart bound was reached.
    pub fn run(&self) -> ExitDisposition {
        let mut location = self.initial_location.clone();
        let mut restarts: u32 = 0;

        loop {
            let args = self.child_args(location.as_deref());
            let disposition = match self.spawner.run(&args) {
                Ok(code) => ExitDisposition::from_code(code),
                Err(e) => {
                    error!(error = %e, "failed to run child");
                    return ExitDisposition::Failure;
                },
            };
            info!(disposition = %disposition, restarts, "child exited");

            let handoff = match Handoff::read(&self.handoff_path) {
                Ok(handoff) => handoff,
                Err(e) => {
                    warn!(
                        path = %self.handoff_path.display(),
                        error = %e,
                        "unreadable handoff ignored"
                    );
                    None
                },
            };
            if let Err(e) = Handoff::remove(&self.handoff_path) {
                warn!(path = %self.handoff_path.display(), error = %e, "handoff not removed");
            }

            match disposition {
                ExitDisposition::Restart => {
                    if let Some(Termination::Restart { location: Some(next) }) =
                        handoff.as_ref().map(Handoff::termination)
                    {
                        location = Some(next);
                    }
                },
                ExitDisposition::Clean => self.clear_cache(),
                ExitDisposition::Terminate | ExitDisposition::Failure => return disposition,
            }

            if restarts >= self.max_restarts {
                error!(max_restarts = self.max_restarts, "restart limit reached");
                return ExitDisposition::Failure;
            }
            restarts = restarts.saturating_add(1);
            info!(
                restarts,
                location = location.as_deref().unwrap_or("-"),
                "relaunching"
            );
        }
    }

    fn child_args(&self, location: Option<&str>) -> Vec<String> {
        let mut args = self.args.clone();
        if let Some(location) = location {
            args.push(ARTIFACT_LOCATION_ARG.to_string());
            args.push(location.to_string());
        }
        args
    }

    fn clear_cache(&self) {
        match RepositorySource::new(&self.cache_dir).clear_cache() {
            Ok(true) => info!(path = %self.cache_dir.display(), "artifact cache cleared"),
            Ok(false) => {},
            Err(e) => warn!(
                path = %self.cache_dir.display(),
                error = %e,
                "failed to clear artifact cache"
            ),
        }
    }
}
