//! Prelude module - commonly used types for convenient import.
//!
//! Use `use kestrel_core::prelude::*;` to import all essential types.

pub use crate::{
    Coordinate, CoordinateError, CoordinateResult, KernelId, KestrelHome, ServerRole, ServerState,
};
