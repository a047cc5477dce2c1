//! Command job implementations.
//!
//! Every command is a [`JobSpec`] entry: a plain function from a
//! [`JobContext`](crate::process::JobContext) to the job future, plus its
//! argument arity and manual text. The registry built here is handed to the
//! kernel at startup; adding a command means adding one spec.

pub mod file;
pub mod proc;
pub mod text;

use crate::kernel::registry::Registry;

/// The full default command set.
pub fn default_registry() -> Registry {
    let mut registry = Registry::new();
    for spec in file::specs()
        .into_iter()
        .chain(text::specs())
        .chain(proc::specs())
    {
        registry.insert(spec);
    }
    registry
}
