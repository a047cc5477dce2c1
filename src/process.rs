//! The process lifecycle shared by every command job.
//!
//! There is no type hierarchy: a process is one spawned task running this
//! module's lifecycle around a polymorphic job function from the registry.
//! The lifecycle first spawns the next pipeline stage (if any remain),
//! wiring that child's output to this process's input, then runs the job,
//! then removes the process from the table.
//!
//! Pipelines therefore come into existence right to left: the shell creates
//! the final stage, which creates its predecessor, and so on down to the
//! leftmost stage, each as a child of the one it feeds.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::trace;

use crate::kernel::registry::JobFn;
use crate::kernel::{Kernel, Pid};
use crate::pipe::{PipeError, PipeReader, PipeWriter};
use crate::shell::parser::Stage;
use crate::shell::Shell;

pub type JobFuture = Pin<Box<dyn Future<Output = Result<(), PipeError>> + Send>>;

/// Everything a job owns while it runs. The fixed construction contract:
/// pid, parent pid, input end, remaining stages and the shell reference,
/// followed by the command-specific string arguments.
pub struct JobContext {
    pub pid: Pid,
    pub parent_pid: Pid,
    pub args: Vec<String>,
    pub input: PipeReader,
    pub output: PipeWriter,
    pub shell: Arc<Shell>,
    pub(crate) piped: bool,
    pub(crate) killed: watch::Receiver<bool>,
}

impl JobContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        pid: Pid,
        parent_pid: Pid,
        args: Vec<String>,
        input: PipeReader,
        output: PipeWriter,
        shell: Arc<Shell>,
        piped: bool,
        killed: watch::Receiver<bool>,
    ) -> Self {
        Self {
            pid,
            parent_pid,
            args,
            input,
            output,
            shell,
            piped,
            killed,
        }
    }

    /// Whether the input end is fed by a predecessor stage. When false the
    /// process reads interactive lines relayed by the shell instead.
    pub fn has_piped_input(&self) -> bool {
        self.piped
    }

    /// One line of interactive input, or `None` on the end-of-input marker,
    /// a closed feed, or this process being killed.
    pub async fn get_line(&mut self) -> Option<String> {
        let shell = self.shell.clone();
        tokio::select! {
            line = shell.read_input_line() => line,
            _ = self.killed.changed() => None,
        }
    }
}

/// Job material prepared by the kernel at instantiation, consumed on start.
pub(crate) struct PendingStart {
    pub ctx: JobContext,
    /// Stages still to the left of this process.
    pub stages: Vec<Stage>,
    /// Write end of this process's own input pipe, handed to the next
    /// stage as its output.
    pub feed: PipeWriter,
    pub job: JobFn,
    pub help: bool,
    pub man: &'static str,
}

pub(crate) enum SpawnOutcome {
    /// The stage was a builtin; it ran inline and consumed no pid.
    Builtin,
    Spawned(Pid),
    /// Instantiation failed; the message is ready for the user.
    Failed(String),
}

/// Spawn the rightmost of `stages` as a process feeding `sink`, handing it
/// the stages to its left. Builtins are intercepted here: they run against
/// the owning shell, write straight into `sink` and never reach the kernel,
/// and any stages to their left are discarded.
pub(crate) async fn spawn_stages(
    kernel: &Kernel,
    shell: &Arc<Shell>,
    parent: Pid,
    mut stages: Vec<Stage>,
    mut sink: PipeWriter,
) -> SpawnOutcome {
    let Some(stage) = stages.pop() else {
        sink.close();
        return SpawnOutcome::Builtin;
    };
    if Shell::is_builtin(&stage.name) {
        shell.run_builtin(&stage, &sink).await;
        sink.close();
        return SpawnOutcome::Builtin;
    }
    match kernel.instantiate(&stage, parent, sink, stages, shell) {
        Ok(pid) => {
            kernel.start(pid);
            SpawnOutcome::Spawned(pid)
        }
        Err(err) => SpawnOutcome::Failed(err.user_message()),
    }
}

/// The lifecycle every started process runs, as its own task.
pub(crate) async fn run(start: PendingStart) {
    let PendingStart {
        ctx,
        stages,
        feed,
        job,
        help,
        man,
    } = start;
    let pid = ctx.pid;
    let kernel = ctx.shell.kernel().clone();

    if help {
        let _ = ctx.output.write_str(man).await;
        drop(ctx);
        drop(feed);
    } else {
        let run_job = if stages.is_empty() {
            // Leftmost stage: nothing feeds the input pipe.
            drop(feed);
            true
        } else {
            match spawn_stages(&kernel, &ctx.shell, pid, stages, feed).await {
                SpawnOutcome::Failed(message) => {
                    let _ = ctx.output.write_str(&message).await;
                    let _ = ctx.output.write_str("\n").await;
                    false
                }
                SpawnOutcome::Builtin | SpawnOutcome::Spawned(_) => true,
            }
        };
        if run_job {
            if let Err(err) = job(ctx).await {
                trace!(pid, %err, "job stopped early");
            }
        } else {
            drop(ctx);
        }
    }

    kernel.deregister(pid);
}
