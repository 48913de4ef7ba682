//! Runs one kernel inside the child process.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use super::{ExitDisposition, Handoff};
use crate::kernel::Kernel;
use crate::restart::Flow;

/// Drives a kernel from start to exit disposition.
#[derive(Debug)]
pub struct Launcher {
    kernel: Arc<Kernel>,
    handoff_path: PathBuf,
}

impl Launcher {
    /// Launch `kernel`, leaving handoffs at `handoff_path`.
    #[must_use]
    pub fn new(kernel: Arc<Kernel>, handoff_path: impl Into<PathBuf>) -> Self {
        Self {
            kernel,
            handoff_path: handoff_path.into(),
        }
    }

    /// The kernel being launched.
    #[must_use]
    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    /// Start the kernel and run until something asks it to terminate.
    ///
    /// The loop ends when `workload` yields [`Flow::Terminate`], when a
    /// request arrives through the kernel's termination handle, or when
    /// `shutdown` completes. A workload that yields [`Flow::Continue`] is
    /// done; the loop keeps waiting for the other two.
    ///
    /// After a full stop the pending request, if any, is written as a
    /// [`Handoff`]. `shutdown` maps to [`ExitDisposition::Terminate`] and
    /// discards any pending request.
    pub async fn run<W, S>(&self, workload: W, shutdown: S) -> ExitDisposition
    where
        W: Future<Output = Flow<()>>,
        S: Future<Output = ()>,
    {
        if let Err(e) = Handoff::remove(&self.handoff_path) {
            warn!(path = %self.handoff_path.display(), error = %e, "stale handoff not removed");
        }
        if let Err(e) = self.kernel.start() {
            error!(error = %e, "kernel failed to start");
            return ExitDisposition::Failure;
        }

        let mut termination_rx = self.kernel.take_termination_receiver();
        tokio::pin!(workload);
        tokio::pin!(shutdown);
        let mut workload_done = false;

        let restart_state = self.kernel.restart_state();
        let shutdown_requested = loop {
            tokio::select! {
                flow = &mut workload, if !workload_done => {
                    workload_done = true;
                    match flow {
                        Flow::Continue(()) => info!("workload finished, waiting for termination"),
                        Flow::Terminate(termination) => {
                            restart_state.record(termination);
                            break false;
                        },
                    }
                }
                Some(_) = async { termination_rx.as_mut()?.recv().await } => {
                    break false;
                }
                () = &mut shutdown => {
                    info!("received shutdown signal");
                    break true;
                }
            }
        };

        let reason = match restart_state.pending() {
            Some(termination) if !shutdown_requested => termination.operation().to_string(),
            _ => "shutdown".to_string(),
        };
        self.kernel.stop(Some(&reason));

        let Some(termination) = restart_state.take().filter(|_| !shutdown_requested) else {
            return ExitDisposition::Terminate;
        };

        let handoff = Handoff::new(&termination, Some(self.kernel.id()));
        match handoff.write(&self.handoff_path) {
            Ok(()) => {
                let disposition = ExitDisposition::from(&termination);
                info!(
                    disposition = %disposition,
                    location = termination.location().unwrap_or("-"),
                    "kernel terminated"
                );
                disposition
            },
            Err(e) => {
                error!(path = %self.handoff_path.display(), error = %e, "failed to write handoff");
                ExitDisposition::Failure
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use kestrel_core::{Coordinate, ServerState};

    use super::*;
    use crate::restart::Termination;

    fn kernel() -> Arc<Kernel> {
        Arc::new(Kernel::builder(Coordinate::parse("io.kestrel:kernel:0.1.0").unwrap()).build())
    }

    fn never() -> impl Future<Output = ()> {
        std::future::pending()
    }

    #[tokio::test]
    async fn test_workload_restart_writes_handoff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handoff.toml");
        let launcher = Launcher::new(kernel(), &path);

        let disposition = launcher
            .run(
                async {
                    Flow::Terminate(Termination::Restart {
                        location: Some("/opt/next".into()),
                    })
                },
                never(),
            )
            .await;

        assert_eq!(disposition, ExitDisposition::Restart);
        assert_eq!(launcher.kernel().status(), ServerState::Stopped);
        let handoff = Handoff::read(&path).unwrap().unwrap();
        assert_eq!(handoff.location.as_deref(), Some("/opt/next"));
        assert!(launcher.kernel().restart_state().pending().is_none());
    }

    #[tokio::test]
    async fn test_handle_request_ends_loop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handoff.toml");
        let launcher = Launcher::new(kernel(), &path);
        let handle = launcher.kernel().termination_handle();

        let disposition = launcher
            .run(
                async move {
                    handle.clean();
                    Flow::Continue(())
                },
                never(),
            )
            .await;

        assert_eq!(disposition, ExitDisposition::Clean);
        assert_eq!(
            Handoff::read(&path).unwrap().unwrap().termination(),
            Termination::Clean
        );
    }

    #[tokio::test]
    async fn test_shutdown_is_terminate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handoff.toml");
        std::fs::write(&path, "stale").unwrap();
        let launcher = Launcher::new(kernel(), &path);

        let disposition = launcher
            .run(
                async { Flow::Continue(()) },
                tokio::time::sleep(Duration::from_millis(10)),
            )
            .await;

        assert_eq!(disposition, ExitDisposition::Terminate);
        assert_eq!(launcher.kernel().status(), ServerState::Stopped);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_start_failure_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = kernel();
        kernel.start().unwrap();
        let launcher = Launcher::new(Arc::clone(&kernel), dir.path().join("handoff.toml"));

        let disposition = launcher.run(async { Flow::Continue(()) }, never()).await;
        assert_eq!(disposition, ExitDisposition::Failure);
        kernel.stop(None);
    }
}
