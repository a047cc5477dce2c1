//! The shell: command execution, builtins and pipeline orchestration.
//!
//! The shell is itself a process. The main shell holds the reserved pid,
//! reads command lines from the console feed and streams pipeline output
//! back to the console; it stays in the process table until an explicit
//! shutdown. A nested `shell` pipeline stage runs the very same type in
//! piped mode, reading commands from its predecessor and writing each
//! command's output to its successor.

pub mod parser;
pub mod path;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::watch;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use crate::console::Console;
use crate::kernel::{Kernel, Pid, MAIN_SHELL_PID};
use crate::pipe::{self, PipeError, PipeReader, PipeWriter, END_OF_INPUT};
use crate::process::{self, JobContext, SpawnOutcome};

use self::parser::{Pipeline, Stage};

#[derive(Debug, Error)]
pub enum ShellError {
    /// The sandbox root could not be prepared. The only fatal condition.
    #[error("sandbox root unavailable: {0}")]
    Root(#[from] std::io::Error),
}

struct ShellState {
    current: PathBuf,
    /// Foreground pipeline leader, the target of an interactive cancel.
    running_pid: Option<Pid>,
}

pub struct Shell {
    pid: Pid,
    kernel: Arc<Kernel>,
    console: Arc<dyn Console>,
    root: PathBuf,
    interactive: bool,
    /// Output end towards the parent pipeline, piped mode only.
    piped_out: Option<PipeWriter>,
    state: Mutex<ShellState>,
    killed: watch::Receiver<bool>,
    /// Line-oriented input: the console feed for the main shell, the piped
    /// predecessor for a nested shell. Shared with relayed interactive
    /// reads, hence the async mutex.
    stdin: AsyncMutex<PipeReader>,
}

impl Shell {
    /// Create and register the main interactive shell. `root` is the
    /// sandbox directory; it must already exist.
    pub fn interactive(
        kernel: Arc<Kernel>,
        console: Arc<dyn Console>,
        feed: PipeReader,
        root: &Path,
    ) -> Result<Arc<Self>, ShellError> {
        let root = std::fs::canonicalize(root)?;
        let (pid, killed) = kernel.register_shell();
        debug_assert_eq!(pid, MAIN_SHELL_PID);
        Ok(Arc::new(Self {
            pid,
            kernel,
            console,
            root: root.clone(),
            interactive: true,
            piped_out: None,
            state: Mutex::new(ShellState {
                current: root,
                running_pid: None,
            }),
            killed,
            stdin: AsyncMutex::new(feed),
        }))
    }

    /// The job body of a `shell` pipeline stage: a nested shell that reads
    /// command lines from its piped input and writes every command's output
    /// to its own output end, newline terminated.
    pub(crate) async fn run_piped(ctx: JobContext) -> Result<(), PipeError> {
        let JobContext {
            pid,
            input,
            output,
            shell: parent,
            killed,
            ..
        } = ctx;
        let shell = Arc::new(Shell {
            pid,
            kernel: parent.kernel.clone(),
            console: parent.console.clone(),
            root: parent.root.clone(),
            interactive: false,
            piped_out: Some(output.clone()),
            state: Mutex::new(ShellState {
                current: parent.root.clone(),
                running_pid: None,
            }),
            killed: killed.clone(),
            stdin: AsyncMutex::new(input),
        });
        let mut out = output;
        let mut killed = killed;
        loop {
            if !shell.alive() {
                break;
            }
            let line = tokio::select! {
                line = shell.read_input_line() => line,
                _ = killed.changed() => None,
            };
            let Some(line) = line else { break };
            shell.clone().execute_command(&line).await;
        }
        out.close();
        Ok(())
    }

    /// The main shell's command loop. Runs until shutdown or until the
    /// console feed ends.
    pub async fn run(self: Arc<Self>) {
        self.console.set_prompt(&self.prompt());
        self.console.print_results("");
        let mut killed = self.killed.clone();
        loop {
            if !self.alive() {
                break;
            }
            let line = tokio::select! {
                line = self.read_input_line() => line,
                _ = killed.changed() => None,
            };
            let Some(line) = line else { break };
            self.clone().execute_command(&line).await;
        }
        if self.alive() {
            self.kernel.shutdown().await;
        }
        info!(pid = self.pid, "shell terminated");
    }

    /// Execute one command line to completion: parse, rewrite input
    /// redirection, wire up the pipeline and collect its terminal output.
    pub async fn execute_command(self: Arc<Self>, line: &str) {
        debug!(pid = self.pid, line, "executing command");
        if self.interactive {
            self.console.set_in_command(true);
        }

        let mut pipeline = parser::parse(line);
        if pipeline.stages.is_empty() {
            if self.interactive {
                self.console.print_results("");
                self.console.set_in_command(false);
            }
            return;
        }
        if let Some(input_file) = pipeline.input_file.take() {
            redirect_input(&mut pipeline, input_file);
        }

        // Fresh pipe forming the pipeline's terminal boundary.
        let (sink, mut collector) = pipe::pipe();
        match process::spawn_stages(&self.kernel, &self, self.pid, pipeline.stages, sink).await {
            SpawnOutcome::Spawned(pid) => {
                self.state.lock().unwrap().running_pid = Some(pid);
            }
            SpawnOutcome::Builtin => {}
            SpawnOutcome::Failed(message) => self.report(&message),
        }
        if !self.alive() {
            // `exit` took this shell down mid-command.
            return;
        }
        self.collect_output(&mut collector, pipeline.output_file.take())
            .await;
        self.state.lock().unwrap().running_pid = None;
        if self.interactive && self.alive() {
            self.console.set_in_command(false);
        }
    }

    /// Stream the pipeline's terminal output to its destination: a sandbox
    /// file, the console (line by line, as it arrives), or the parent
    /// pipeline in piped mode.
    async fn collect_output(&self, collector: &mut PipeReader, output_file: Option<String>) {
        if let Some(file) = output_file {
            let text = match collector.read_to_string().await {
                Ok(text) => text,
                Err(_) => {
                    if self.interactive {
                        self.console.print_results("");
                    }
                    return;
                }
            };
            if !self.alive() {
                return;
            }
            match self.resolve(&file) {
                Some(target) => {
                    if let Err(err) = tokio::fs::write(&target, text).await {
                        self.report(&format!("-msh: {file}: {err}"));
                    }
                }
                None => self.report(&format!("-msh: {file}: outside of the filesystem")),
            }
            if self.interactive {
                self.console.print_results("");
            }
        } else if self.interactive {
            loop {
                match collector.read_line().await {
                    Ok(chunk) if chunk.newline => self.console.print_line(&chunk.text),
                    Ok(chunk) => {
                        self.console.print_results(&chunk.text);
                        break;
                    }
                    Err(_) => {
                        // Killed pipeline: swallow the remainder.
                        self.console.print_results("");
                        break;
                    }
                }
            }
        } else {
            let Ok(text) = collector.read_to_string().await else {
                return;
            };
            if let Some(out) = &self.piped_out {
                let _ = out.write_str(&text).await;
                let _ = out.write_str("\n").await;
            }
        }
    }

    pub fn is_builtin(name: &str) -> bool {
        matches!(
            name.to_ascii_lowercase().as_str(),
            "cd" | "pwd" | "exit" | "echo"
        )
    }

    /// Run a builtin, writing whatever it produces into `sink`. The caller
    /// closes `sink` afterwards, so even silent builtins end the stream.
    pub(crate) async fn run_builtin(&self, stage: &Stage, sink: &PipeWriter) {
        match stage.name.to_ascii_lowercase().as_str() {
            "cd" => {
                let target = stage.args.first().map(String::as_str).unwrap_or("");
                self.cd(target);
            }
            "pwd" => {
                let _ = sink.write_str(&self.printable_current()).await;
            }
            "echo" => {
                let _ = sink.write_str(&stage.args.join(" ")).await;
            }
            "exit" => self.exit().await,
            _ => {}
        }
    }

    /// Change directory. Commits only when the target exists, is a
    /// directory and stays inside the sandbox; an escape attempt is a
    /// silent no-op.
    fn cd(&self, arg: &str) {
        if arg.is_empty() {
            self.state.lock().unwrap().current = self.root.clone();
        } else if let Some(target) = self.resolve(arg) {
            if !target.exists() {
                self.report(&format!("cd: {arg}: No such file or directory"));
            } else if !target.is_dir() {
                self.report(&format!("cd: {arg}: Not a directory"));
            } else {
                self.state.lock().unwrap().current = target;
            }
        }
        if self.interactive {
            self.console.set_prompt(&self.prompt());
        }
    }

    /// Exit this shell. The main shell takes the whole system with it.
    async fn exit(&self) {
        self.kernel.kill(self.pid).await;
        if self.pid == MAIN_SHELL_PID {
            self.kernel.shutdown().await;
        }
    }

    /// Interactive cancel: kill the foreground pipeline and any of its
    /// ancestors below this shell.
    pub async fn kill_current_process(&self) {
        let target = self.state.lock().unwrap().running_pid.take();
        let Some(mut pid) = target else { return };
        loop {
            let parent = self.kernel.parent_of(pid);
            self.kernel.kill(pid).await;
            match parent {
                Some(parent) if parent != self.pid => pid = parent,
                _ => break,
            }
        }
    }

    /// One line of interactive input for this shell or a process it relays
    /// for. `None` on the end-of-input marker, a closed feed, or an
    /// interrupt.
    pub(crate) async fn read_input_line(&self) -> Option<String> {
        let mut stdin = self.stdin.lock().await;
        let mut bytes = Vec::new();
        loop {
            match stdin.read_byte().await {
                Ok(Some(b'\n')) => return Some(String::from_utf8_lossy(&bytes).into_owned()),
                Ok(Some(END_OF_INPUT)) => return None,
                Ok(Some(b'\r')) => {}
                Ok(Some(byte)) => bytes.push(byte),
                Ok(None) => {
                    if bytes.is_empty() {
                        return None;
                    }
                    return Some(String::from_utf8_lossy(&bytes).into_owned());
                }
                Err(_) => return None,
            }
        }
    }

    /// Resolve a user path inside the sandbox.
    pub fn resolve(&self, input: &str) -> Option<PathBuf> {
        let current = self.state.lock().unwrap().current.clone();
        path::resolve(&self.root, &current, input)
    }

    pub fn printable_current(&self) -> String {
        let current = self.state.lock().unwrap().current.clone();
        path::printable(&self.root, &current)
    }

    /// Console prompt derived from the current directory.
    pub fn prompt(&self) -> String {
        let current = self.state.lock().unwrap().current.clone();
        let tail = if current == self.root {
            "/".to_string()
        } else {
            current
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "/".to_string())
        };
        format!("msh:{tail} root$ ")
    }

    /// Report an error line on the console.
    pub(crate) fn report(&self, message: &str) {
        self.console.print_line(message);
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn alive(&self) -> bool {
        !*self.killed.borrow()
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    pub fn running_process(&self) -> Option<Pid> {
        self.state.lock().unwrap().running_pid
    }
}

/// Input redirection binds to the final command only: all other stages are
/// discarded and a synthetic `cat <file>` stage becomes the new producer.
fn redirect_input(pipeline: &mut Pipeline, input_file: String) {
    let Some(last) = pipeline.stages.pop() else {
        return;
    };
    pipeline.stages.clear();
    pipeline
        .stages
        .push(Stage::new("cat", vec![input_file]));
    pipeline.stages.push(last);
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::commands;
    use crate::console::testing::RecordingConsole;
    use crate::pipe::PipeWriter;

    pub(crate) struct Fixture {
        pub kernel: Arc<Kernel>,
        pub shell: Arc<Shell>,
        pub console: Arc<RecordingConsole>,
        pub feed: PipeWriter,
        pub dir: tempfile::TempDir,
    }

    impl Fixture {
        pub fn write_file(&self, name: &str, contents: &str) {
            std::fs::write(self.dir.path().join(name), contents).unwrap();
        }

        pub async fn exec(&self, line: &str) {
            self.shell.clone().execute_command(line).await;
        }
    }

    pub(crate) fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let kernel = Arc::new(Kernel::new(commands::default_registry()));
        let console = Arc::new(RecordingConsole::default());
        let (feed, feed_reader) = crate::pipe::pipe();
        let shell = Shell::interactive(
            kernel.clone(),
            console.clone(),
            feed_reader,
            dir.path(),
        )
        .unwrap();
        Fixture {
            kernel,
            shell,
            console,
            feed,
            dir,
        }
    }
}

#[cfg(test)]
mod tests;
