//! Kestrel Kernel - server lifecycle and the restart protocol.
//!
//! The kernel owns four servers, started strictly in order:
//!
//! 1. **event bus** - delivers [`kestrel_events::KestrelEvent`]s
//! 2. **repository** - prepares the artifact cache
//! 3. **artifact** - the [`kestrel_artifact::ArtifactManager`] and its preload set
//! 4. **service** - the [`kestrel_artifact::ServiceRegistry`]
//!
//! A start failure rolls back every server that already reached `Ready`,
//! in reverse. `stop` walks the same list backwards.
//!
//! Restarts are values. Code inside the kernel returns
//! [`Flow::Terminate`] or calls a [`TerminationHandle`]; the [`Launcher`]
//! stops the kernel, writes a [`Handoff`] and exits with an
//! [`ExitDisposition`] that the [`Supervisor`] acts on.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use kestrel_core::Coordinate;
//! use kestrel_kernel::{Flow, Kernel, Launcher};
//!
//! # async fn boot() {
//! let artifact = Coordinate::parse("io.kestrel:kernel:0.1.0").unwrap();
//! let kernel = Arc::new(Kernel::builder(artifact).build());
//! let launcher = Launcher::new(Arc::clone(&kernel), "/tmp/kestrel/handoff.toml");
//! let disposition = launcher
//!     .run(async { Flow::Continue(()) }, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await;
//! std::process::exit(disposition.code());
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![allow(clippy::module_name_repetitions)]

pub mod prelude;

pub mod bootstrap;
mod error;
mod kernel;
mod restart;
mod server;
mod servers;

pub use bootstrap::{
    ARTIFACT_LOCATION_ARG, ChildSpawner, CommandSpawner, ExitDisposition, Handoff, Launcher,
    Supervisor,
};
pub use error::{KernelError, KernelResult, ServerError, ServerResult};
pub use kernel::{Kernel, KernelBuilder, LOCATION_REPOSITORY_ID, SYSTEM_SCOPE, VERSION_SYMBOL};
pub use restart::{Flow, RestartState, Termination, TerminationHandle};
pub use server::{KernelServer, ManagedServer, TransitionHook, default_dependencies};
pub use servers::{ArtifactServer, EventBusServer, RepositoryServer, ServiceServer};
