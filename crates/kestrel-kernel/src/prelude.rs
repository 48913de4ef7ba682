//! Prelude module - commonly used types for convenient import.
//!
//! Use `use kestrel_kernel::prelude::*;` to import all essential types.

pub use crate::{
    ExitDisposition, Flow, Kernel, KernelBuilder, KernelError, KernelResult, KernelServer,
    Launcher, ServerError, ServerResult, Termination, TerminationHandle,
};
