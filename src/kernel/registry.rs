//! Name to job registry for spawnable processes.
//!
//! Every process type the kernel can create is one [`JobSpec`]: a factory
//! function plus the argument arity it accepts and its manual text. New
//! commands are new entries, nothing else changes.

use std::collections::HashMap;
use std::ops::RangeInclusive;

use crate::process::{JobContext, JobFuture};

/// Sole argument that makes any process print its manual instead of
/// doing its job. Matched case-insensitively.
pub const HELP_TOKEN: &str = "--help";

/// Factory for a process job. The returned future is the process body; it
/// owns the context and closes the output end when it finishes.
pub type JobFn = fn(JobContext) -> JobFuture;

pub struct JobSpec {
    /// Canonical lower-case command name.
    pub name: &'static str,
    /// Accepted number of command-specific arguments.
    pub arity: RangeInclusive<usize>,
    /// Manual page, also shown as the usage message on bad arguments.
    pub man: &'static str,
    pub job: JobFn,
}

#[derive(Default)]
pub struct Registry {
    specs: HashMap<&'static str, JobSpec>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, spec: JobSpec) {
        self.specs.insert(spec.name, spec);
    }

    /// Case-insensitive lookup.
    pub fn lookup(&self, name: &str) -> Option<&JobSpec> {
        self.specs.get(name.to_ascii_lowercase().as_str())
    }

    pub fn man_page(&self, name: &str) -> Option<&'static str> {
        self.lookup(name).map(|spec| spec.man)
    }
}

#[cfg(test)]
mod tests {
    use crate::commands;

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = commands::default_registry();
        assert!(registry.lookup("cat").is_some());
        assert!(registry.lookup("CAT").is_some());
        assert!(registry.lookup("SoRt").is_some());
        assert!(registry.lookup("nonexistent").is_none());
        assert!(registry.man_page("nonexistent").is_none());
    }

    #[test]
    fn default_registry_covers_the_command_set() {
        let registry = commands::default_registry();
        for name in ["cat", "grep", "ls", "ps", "sort", "wc", "kill", "man", "shutdown", "shell"] {
            assert!(registry.lookup(name).is_some(), "missing {name}");
            assert!(registry.man_page(name).unwrap().contains("Usage:"));
        }
    }
}
