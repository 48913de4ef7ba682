//! The kernel server contract and its lifecycle state machine.
//!
//! ```text
//! Created ──start──▶ Starting ──ok──▶ Ready ──stop──▶ Stopping ──▶ Stopped
//!                       │
//!                       └──err──▶ Failed
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use kestrel_core::{ServerRole, ServerState};

use crate::error::{KernelError, KernelResult, ServerError, ServerResult};

/// One kernel subsystem.
///
/// `start` and `stop` are called at most once each, by [`ManagedServer`],
/// and never concurrently.
pub trait KernelServer: Send + Sync {
    /// The role this server fills.
    fn role(&self) -> ServerRole;

    /// Roles that must be `Ready` before this server starts.
    fn dependencies(&self) -> Vec<ServerRole> {
        default_dependencies(self.role())
    }

    /// Bring the subsystem up.
    ///
    /// # Errors
    ///
    /// Any error leaves the server `Failed`.
    fn start(&self) -> ServerResult<()>;

    /// Tear the subsystem down.
    ///
    /// # Errors
    ///
    /// Errors are logged; the server still ends `Stopped`.
    fn stop(&self) -> ServerResult<()>;
}

/// Every role before `role` in start order.
#[must_use]
pub fn default_dependencies(role: ServerRole) -> Vec<ServerRole> {
    ServerRole::START_ORDER
        .iter()
        .copied()
        .take_while(|r| *r != role)
        .collect()
}

/// Callback told about every state transition: `(role, from, to)`.
pub type TransitionHook<'a> = &'a dyn Fn(ServerRole, ServerState, ServerState);

/// A server plus its lifecycle state.
pub struct ManagedServer {
    server: Arc<dyn KernelServer>,
    state: Mutex<ServerState>,
}

impl std::fmt::Debug for ManagedServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedServer")
            .field("role", &self.role())
            .field("state", &self.state())
            .finish()
    }
}

impl ManagedServer {
    /// Wrap a server in state `Created`.
    #[must_use]
    pub fn new(server: Arc<dyn KernelServer>) -> Self {
        Self {
            server,
            state: Mutex::new(ServerState::Created),
        }
    }

    /// The wrapped server's role.
    #[must_use]
    pub fn role(&self) -> ServerRole {
        self.server.role()
    }

    /// The wrapped server's dependencies.
    #[must_use]
    pub fn dependencies(&self) -> Vec<ServerRole> {
        self.server.dependencies()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ServerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `Created → Starting → Ready`, or `→ Failed` on error.
    ///
    /// # Errors
    ///
    /// - [`KernelError::InvalidTransition`] unless the state is `Created`
    /// - [`KernelError::ServerStartFailure`] if setup fails
    pub fn start(&self, hook: TransitionHook<'_>) -> KernelResult<()> {
        self.enter(ServerState::Created, ServerState::Starting, "start", hook)?;

        match self.server.start() {
            Ok(()) => {
                self.set(ServerState::Ready, hook);
                Ok(())
            },
            Err(source) => {
                self.set(ServerState::Failed, hook);
                Err(KernelError::ServerStartFailure {
                    role: self.role(),
                    source,
                })
            },
        }
    }

    /// `Ready → Stopping → Stopped`. Teardown errors are logged.
    ///
    /// # Errors
    ///
    /// [`KernelError::InvalidTransition`] unless the state is `Ready`.
    pub fn stop(&self, hook: TransitionHook<'_>) -> KernelResult<()> {
        self.enter(ServerState::Ready, ServerState::Stopping, "stop", hook)?;

        if let Err(e) = self.server.stop() {
            warn!(role = %self.role(), error = %e, "server teardown failed");
        }
        self.set(ServerState::Stopped, hook);
        Ok(())
    }

    /// Mark the server `Failed` without starting it.
    pub(crate) fn fail(&self, source: ServerError, hook: TransitionHook<'_>) -> KernelError {
        self.set(ServerState::Failed, hook);
        KernelError::ServerStartFailure {
            role: self.role(),
            source,
        }
    }

    fn enter(
        &self,
        expected: ServerState,
        next: ServerState,
        action: &'static str,
        hook: TransitionHook<'_>,
    ) -> KernelResult<()> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != expected {
                return Err(KernelError::InvalidTransition {
                    subject: self.role().to_string(),
                    action,
                    state: *state,
                });
            }
            *state = next;
        }
        self.report(expected, next, hook);
        Ok(())
    }

    fn set(&self, next: ServerState, hook: TransitionHook<'_>) {
        let previous = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *state, next)
        };
        self.report(previous, next, hook);
    }

    fn report(&self, from: ServerState, to: ServerState, hook: TransitionHook<'_>) {
        info!(role = %self.role(), from = %from, to = %to, "server state changed");
        hook(self.role(), from, to);
    }
}
