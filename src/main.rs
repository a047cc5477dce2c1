//! Binary entry point: a terminal console wired to the main shell.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use lexopt::prelude::*;
use tokio::io::AsyncBufReadExt;

use minios::commands;
use minios::console::Console;
use minios::pipe::{self, END_OF_INPUT};
use minios::{Kernel, Shell};

const USAGE: &str = "Usage: minios [--root PATH]\n\n\
                     Start the simulated system with PATH as the sandbox root\n\
                     (default: ./filesystem).";

/// Line-oriented console on the host terminal.
struct StdioConsole {
    prompt: Mutex<String>,
    in_command: AtomicBool,
}

impl StdioConsole {
    fn new() -> Self {
        Self {
            prompt: Mutex::new(String::new()),
            in_command: AtomicBool::new(false),
        }
    }
}

impl Console for StdioConsole {
    fn print_line(&self, line: &str) {
        println!("{line}");
    }

    fn print_results(&self, result: &str) {
        if !result.is_empty() {
            println!("{result}");
        }
        print!("{}", self.prompt.lock().unwrap());
        let _ = std::io::stdout().flush();
    }

    fn set_in_command(&self, in_command: bool) {
        self.in_command.store(in_command, Ordering::Relaxed);
    }

    fn set_prompt(&self, prompt: &str) {
        *self.prompt.lock().unwrap() = prompt.to_string();
    }
}

fn parse_args() -> anyhow::Result<Option<PathBuf>> {
    let mut root = PathBuf::from("filesystem");
    let mut parser = lexopt::Parser::from_env();
    while let Some(arg) = parser.next()? {
        match arg {
            Long("root") => root = PathBuf::from(parser.value()?),
            Long("help") | Short('h') => {
                println!("{USAGE}");
                return Ok(None);
            }
            other => return Err(other.unexpected().into()),
        }
    }
    Ok(Some(root))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let Some(root) = parse_args()? else {
        return Ok(());
    };
    // The one fatal condition: without a sandbox root there is no system.
    std::fs::create_dir_all(&root)
        .with_context(|| format!("failed to create sandbox root {}", root.display()))?;

    let kernel = Arc::new(Kernel::new(commands::default_registry()));
    let console = Arc::new(StdioConsole::new());
    let (feed, feed_reader) = pipe::pipe();
    let shell = Shell::interactive(kernel, console, feed_reader, &root)?;

    // Terminal input task: every typed line goes into the console feed,
    // end of stdin becomes the end-of-input marker.
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if feed.write_str(&line).await.is_err() {
                return;
            }
            if feed.write_all(b"\n").await.is_err() {
                return;
            }
        }
        let _ = feed.write_all(&[END_OF_INPUT]).await;
    });

    // Ctrl-C cancels the foreground pipeline, not the system.
    let canceller = shell.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            canceller.kill_current_process().await;
        }
    });

    shell.run().await;
    Ok(())
}
