//! Kestrel Test - shared test utilities for the Kestrel crates.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! kestrel-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use kestrel_test::{ArtifactFixture, TestKernel};
//!
//! #[test]
//! fn widgets_load() {
//!     let fixture = ArtifactFixture::new().unwrap();
//!     let widgets = fixture.directory("org.example:widgets:1.0", &[("Widget", b"w")]).unwrap();
//!     let kernel = TestKernel::started(&fixture).unwrap();
//!     kernel.load(&widgets, IsolationPolicy::None).unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
