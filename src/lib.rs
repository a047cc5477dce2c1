//! A miniature multi-process operating system simulation.
//!
//! The crate models a tiny OS on top of the host async runtime: a [`Kernel`]
//! owns the process table and allocates pids, a [`Shell`] parses command lines
//! into pipelines of processes joined by bounded byte pipes, and a small set
//! of command jobs (`cat`, `grep`, `sort`, `wc`, ...) read from and write to
//! those pipes. Each process runs as its own tokio task; killing a pid tears
//! down its whole subtree, children first, and signals blocked readers with a
//! reserved in-band interrupt marker.

pub mod commands;
pub mod console;
pub mod kernel;
pub mod pipe;
pub mod process;
pub mod shell;

pub use kernel::{Kernel, Pid, SpawnError, MAIN_SHELL_PID};
pub use shell::Shell;
