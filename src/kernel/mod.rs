//! The kernel: pid allocation, the process table and subtree teardown.
//!
//! The kernel is constructed once at startup and passed around by `Arc`;
//! there is no global instance. It is the only structure mutated from many
//! tasks at once, so the table sits behind a mutex that is never held across
//! an await point. Process records are owned by the table and refer to each
//! other by pid only.

pub mod registry;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::pipe::PipeWriter;
use crate::process::{self, JobContext, PendingStart};
use crate::shell::parser::Stage;
use crate::shell::Shell;

use self::registry::{JobSpec, Registry, HELP_TOKEN};

/// Process identifier. Monotonically assigned, never reused while live.
pub type Pid = u32;

/// The reserved pid of the main shell, first to be allocated.
pub const MAIN_SHELL_PID: Pid = 1;

/// Why a process could not be created. The table is left untouched in
/// every case.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("{0}: process not found")]
    NotFound(String),
    #[error("bad arguments for {name}")]
    BadArguments {
        name: &'static str,
        usage: &'static str,
    },
    #[error("unknown error of {0}")]
    Other(String),
}

impl SpawnError {
    /// The message the shell shows the user.
    pub fn user_message(&self) -> String {
        match self {
            SpawnError::NotFound(name) => format!("-msh: {name} is not a valid process"),
            SpawnError::BadArguments { usage, .. } => (*usage).to_string(),
            SpawnError::Other(name) => format!("-msh: unknown error of {name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Created,
    Running,
    Terminated,
}

/// Snapshot row for `ps`.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub parent_pid: Pid,
    pub name: &'static str,
    pub started: DateTime<Local>,
    pub state: ProcessState,
}

struct ProcessEntry {
    name: &'static str,
    pid: Pid,
    parent_pid: Pid,
    child_pids: Vec<Pid>,
    started: DateTime<Local>,
    state: ProcessState,
    /// Flips to true exactly once, on kill.
    kill_tx: watch::Sender<bool>,
    /// Clone of the process's output end, used to inject the interrupt
    /// marker on kill. The main shell has none.
    output_tap: Option<PipeWriter>,
    /// Job material consumed by `start`.
    pending: Option<PendingStart>,
}

struct Table {
    next_pid: Pid,
    entries: HashMap<Pid, ProcessEntry>,
}

impl Table {
    fn allocate(&mut self) -> Pid {
        let pid = self.next_pid;
        self.next_pid += 1;
        pid
    }
}

pub struct Kernel {
    registry: Registry,
    table: Mutex<Table>,
}

impl Kernel {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            table: Mutex::new(Table {
                next_pid: MAIN_SHELL_PID,
                entries: HashMap::new(),
            }),
        }
    }

    /// Register a shell that is driven externally rather than through
    /// [`Kernel::start`]. Returns its pid and the kill signal it must watch.
    pub fn register_shell(&self) -> (Pid, watch::Receiver<bool>) {
        let (kill_tx, kill_rx) = watch::channel(false);
        let mut table = self.table.lock().unwrap();
        let pid = table.allocate();
        table.entries.insert(
            pid,
            ProcessEntry {
                name: "shell",
                pid,
                parent_pid: 0,
                child_pids: Vec::new(),
                started: Local::now(),
                state: ProcessState::Running,
                kill_tx,
                output_tap: None,
                pending: None,
            },
        );
        debug!(pid, "shell registered");
        (pid, kill_rx)
    }

    /// Create a process for a pipeline stage without starting it.
    ///
    /// `output` is the write end the new process feeds; `stages` are the
    /// still-unconsumed stages to its left, spawned by the process itself
    /// once it runs. On failure the table is left exactly as it was.
    pub fn instantiate(
        &self,
        stage: &Stage,
        parent_pid: Pid,
        output: PipeWriter,
        stages: Vec<Stage>,
        shell: &Arc<Shell>,
    ) -> Result<Pid, SpawnError> {
        let spec: &JobSpec = self
            .registry
            .lookup(&stage.name)
            .ok_or_else(|| SpawnError::NotFound(stage.name.clone()))?;
        let help = stage.args.len() == 1 && stage.args[0].eq_ignore_ascii_case(HELP_TOKEN);
        if !help && !spec.arity.contains(&stage.args.len()) {
            return Err(SpawnError::BadArguments {
                name: spec.name,
                usage: spec.man,
            });
        }

        let output_tap = output.clone();
        let (feed, input) = crate::pipe::pipe();
        let (kill_tx, kill_rx) = watch::channel(false);

        let mut table = self.table.lock().unwrap();
        let pid = table.allocate();
        let ctx = JobContext::new(
            pid,
            parent_pid,
            stage.args.clone(),
            input,
            output,
            shell.clone(),
            !stages.is_empty(),
            kill_rx,
        );
        table.entries.insert(
            pid,
            ProcessEntry {
                name: spec.name,
                pid,
                parent_pid,
                child_pids: Vec::new(),
                started: Local::now(),
                state: ProcessState::Created,
                kill_tx,
                output_tap: Some(output_tap),
                pending: Some(PendingStart {
                    ctx,
                    stages,
                    feed,
                    job: spec.job,
                    help,
                    man: spec.man,
                }),
            },
        );
        if let Some(parent) = table.entries.get_mut(&parent_pid) {
            parent.child_pids.push(pid);
        }
        debug!(pid, name = spec.name, parent = parent_pid, "process created");
        Ok(pid)
    }

    /// Begin concurrent execution of a created process.
    pub fn start(&self, pid: Pid) {
        let pending = {
            let mut table = self.table.lock().unwrap();
            match table.entries.get_mut(&pid) {
                Some(entry) => {
                    entry.state = ProcessState::Running;
                    entry.pending.take()
                }
                None => None,
            }
        };
        if let Some(pending) = pending {
            debug!(pid, "process started");
            tokio::spawn(async move {
                process::run(pending).await;
            });
        }
    }

    /// Kill `pid` and every transitive descendant, children first.
    ///
    /// Each victim is removed from the table, its kill signal is raised and
    /// the interrupt marker is written into its output before the kernel's
    /// handle on that output is released. The victims' tasks unwind
    /// asynchronously by observing their pipes. Returns false for an
    /// unknown pid.
    pub async fn kill(&self, pid: Pid) -> bool {
        let mut victims = {
            let mut table = self.table.lock().unwrap();
            if !table.entries.contains_key(&pid) {
                return false;
            }
            let mut order = Vec::new();
            collect_subtree(&table.entries, pid, &mut order);
            order
                .into_iter()
                .filter_map(|victim| table.entries.remove(&victim))
                .collect::<Vec<_>>()
        };
        // Mark the whole subtree terminated before any marker is written, so
        // a reader woken by a marker never sees a half-killed subtree.
        for entry in victims.iter_mut() {
            entry.state = ProcessState::Terminated;
            let _ = entry.kill_tx.send(true);
        }
        for mut entry in victims {
            if let Some(tap) = entry.output_tap.take() {
                tap.interrupt().await;
            }
            debug!(pid = entry.pid, name = entry.name, "process killed");
        }
        true
    }

    /// Kill the main shell and with it everything else.
    pub async fn shutdown(&self) {
        info!("shutting down");
        self.kill(MAIN_SHELL_PID).await;
    }

    /// A process finished on its own and leaves the table.
    pub(crate) fn deregister(&self, pid: Pid) {
        let mut table = self.table.lock().unwrap();
        if table.entries.remove(&pid).is_some() {
            trace!(pid, "process deregistered");
        }
    }

    pub fn parent_of(&self, pid: Pid) -> Option<Pid> {
        let table = self.table.lock().unwrap();
        table.entries.get(&pid).map(|entry| entry.parent_pid)
    }

    /// Snapshot of all live processes, ordered by pid.
    pub fn processes(&self) -> Vec<ProcessInfo> {
        let table = self.table.lock().unwrap();
        let mut rows: Vec<ProcessInfo> = table
            .entries
            .values()
            .map(|entry| ProcessInfo {
                pid: entry.pid,
                parent_pid: entry.parent_pid,
                name: entry.name,
                started: entry.started,
                state: entry.state,
            })
            .collect();
        rows.sort_by_key(|info| info.pid);
        rows
    }

    pub fn man_page(&self, name: &str) -> Option<&'static str> {
        self.registry.man_page(name)
    }
}

/// Post-order walk: children before their parent. Pids whose entry is
/// already gone are skipped.
fn collect_subtree(entries: &HashMap<Pid, ProcessEntry>, pid: Pid, out: &mut Vec<Pid>) {
    let Some(entry) = entries.get(&pid) else {
        return;
    };
    for &child in &entry.child_pids {
        collect_subtree(entries, child, out);
    }
    out.push(pid);
}
