//! Kestrel Telemetry - Logging setup for the Kestrel microkernel.
//!
//! Every Kestrel crate logs through `tracing`. This crate installs the
//! global subscriber once, at the binary boundary.
//!
//! # Example
//!
//! ```rust,no_run
//! use kestrel_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), kestrel_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("kestrel_artifact=trace");
//!
//! setup_logging(&config)?;
//! tracing::info!("Logging ready");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
