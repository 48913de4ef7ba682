//! Kestrel Core - Shared types for the Kestrel microkernel.
//!
//! This crate provides:
//! - [`Coordinate`]: the group/artifact/version triple that names a loadable unit
//! - Canonical repository paths derived from a coordinate
//! - [`KestrelHome`]: the on-disk layout used by the launcher
//! - [`KernelId`]: the identity a loaded artifact keeps of its owning kernel
//! - [`ServerRole`] and [`ServerState`]: the kernel lifecycle vocabulary
//!
//! # Example
//!
//! ```rust
//! use kestrel_core::Coordinate;
//!
//! let c = Coordinate::parse("org.example:widgets:1.0").unwrap();
//! assert_eq!(c.path(), "org/example/widgets/1.0/");
//! assert_eq!(c.metadata_path(), "org/example/widgets/kestrel-metadata.toml");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod coordinate;
pub mod dirs;
pub mod error;
pub mod ids;
pub mod lifecycle;
pub mod prelude;

pub use coordinate::{
    ARCHIVE_EXTENSION, Coordinate, MANIFEST_EXTENSION, METADATA_FILE_NAME, PATH_SEPARATOR,
};
pub use dirs::KestrelHome;
pub use error::{CoordinateError, CoordinateResult};
pub use ids::KernelId;
pub use lifecycle::{ServerRole, ServerState};
