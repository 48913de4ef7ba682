//! Bootstrap and restart protocol.
//!
//! A [`Launcher`] runs one kernel to completion inside the child process and
//! turns the outcome into an [`ExitDisposition`]. A [`Supervisor`] in the
//! parent process reads that exit status plus the [`Handoff`] file and
//! decides whether to relaunch.

mod handoff;
mod launcher;
mod supervisor;

pub use handoff::Handoff;
pub use launcher::Launcher;
pub use supervisor::{ARTIFACT_LOCATION_ARG, ChildSpawner, CommandSpawner, Supervisor};

use std::fmt;

use crate::restart::Termination;

/// Exit status contract between launcher and supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitDisposition {
    /// Normal exit. Do not relaunch.
    Terminate,
    /// Startup or runtime failure. Do not relaunch.
    Failure,
    /// Relaunch, possibly from a new artifact location.
    Restart,
    /// Clear the artifact cache, then relaunch.
    Clean,
}

impl ExitDisposition {
    /// Process exit code.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Terminate => 0,
            Self::Failure => 1,
            Self::Restart => 3,
            Self::Clean => 4,
        }
    }

    /// Disposition for an exit code. Unknown codes are failures.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Terminate,
            3 => Self::Restart,
            4 => Self::Clean,
            _ => Self::Failure,
        }
    }

    /// Whether the supervisor should launch again.
    #[must_use]
    pub fn relaunches(self) -> bool {
        matches!(self, Self::Restart | Self::Clean)
    }
}

impl From<&Termination> for ExitDisposition {
    fn from(termination: &Termination) -> Self {
        match termination {
            Termination::Restart { .. } => Self::Restart,
            Termination::Clean => Self::Clean,
        }
    }
}

impl fmt::Display for ExitDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Terminate => "terminate",
            Self::Failure => "failure",
            Self::Restart => "restart",
            Self::Clean => "clean",
        })
    }
}
