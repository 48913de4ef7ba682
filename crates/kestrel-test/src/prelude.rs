//! Prelude module - commonly used test utilities.
//!
//! Use `use kestrel_test::prelude::*;` to import all essential types.

pub use crate::{
    ArtifactFixture, CallLog, RecordingSubscriber, ScriptedServer, TestKernel, setup_test_logging,
};
