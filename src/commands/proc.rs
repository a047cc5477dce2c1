//! Process management commands: ps, kill, man, shutdown, and the nested
//! shell stage.

use itertools::Itertools;

use crate::kernel::registry::JobSpec;
use crate::kernel::Pid;
use crate::process::{JobContext, JobFuture};
use crate::shell::Shell;

pub(super) fn specs() -> Vec<JobSpec> {
    vec![
        JobSpec {
            name: "ps",
            arity: 0..=0,
            man: "Usage: ps\n\n\
                  Report a snapshot of the current processes.",
            job: ps,
        },
        JobSpec {
            name: "kill",
            arity: 1..=1,
            man: "Usage: kill PID\n\n\
                  Terminate the process with the given pid together with all\n\
                  of its children. Killing pid 1 shuts the system down.",
            job: kill,
        },
        JobSpec {
            name: "man",
            arity: 1..=1,
            man: "Usage: man COMMAND\n\n\
                  Show the manual for COMMAND.",
            job: man,
        },
        JobSpec {
            name: "shutdown",
            arity: 0..=0,
            man: "Usage: shutdown\n\n\
                  Terminate every process and close the system.",
            job: shutdown,
        },
        JobSpec {
            name: "shell",
            arity: 0..=0,
            man: "Usage: shell\n\n\
                  Run a nested command interpreter reading command lines from\n\
                  its input and writing each command's output to its output.",
            job: shell,
        },
    ]
}

fn ps(mut ctx: JobContext) -> JobFuture {
    Box::pin(async move {
        let own_pid = ctx.pid;
        let rows = ctx
            .shell
            .kernel()
            .processes()
            .into_iter()
            .filter(|info| info.pid != own_pid)
            .map(|info| {
                format!(
                    "{}\t{}\t{}\t{}",
                    info.pid,
                    info.parent_pid,
                    info.started.format("%H:%M:%S"),
                    info.name
                )
            })
            .join("\n");
        ctx.output.write_str("PID\tPPID\tSTARTED\tCOMMAND\n").await?;
        ctx.output.write_str(&rows).await?;
        if !rows.is_empty() {
            ctx.output.write_str("\n").await?;
        }
        ctx.output.close();
        Ok(())
    })
}

fn kill(mut ctx: JobContext) -> JobFuture {
    Box::pin(async move {
        let arg = ctx.args[0].clone();
        match arg.parse::<Pid>() {
            Ok(pid) => {
                if !ctx.shell.kernel().kill(pid).await {
                    ctx.output
                        .write_str(&format!("kill: {pid}: no such process"))
                        .await?;
                }
            }
            Err(_) => {
                ctx.output
                    .write_str(&format!("kill: {arg}: arguments must be process ids"))
                    .await?;
            }
        }
        ctx.output.close();
        Ok(())
    })
}

fn man(mut ctx: JobContext) -> JobFuture {
    Box::pin(async move {
        let name = ctx.args[0].clone();
        let page = ctx
            .shell
            .kernel()
            .man_page(&name)
            .or_else(|| builtin_man(&name));
        match page {
            Some(text) => ctx.output.write_str(text).await?,
            None => {
                ctx.output
                    .write_str(&format!("No manual entry for {name}"))
                    .await?
            }
        }
        ctx.output.close();
        Ok(())
    })
}

fn shutdown(mut ctx: JobContext) -> JobFuture {
    Box::pin(async move {
        ctx.shell.kernel().shutdown().await;
        ctx.output.close();
        Ok(())
    })
}

fn shell(ctx: JobContext) -> JobFuture {
    Box::pin(Shell::run_piped(ctx))
}

/// Manual pages for the shell builtins, which never reach the registry.
fn builtin_man(name: &str) -> Option<&'static str> {
    match name.to_ascii_lowercase().as_str() {
        "cd" => Some(
            "Usage: cd [PATH]\n\n\
             Change the current directory. Without PATH, return to the root.\n\
             The target must stay inside the sandbox.",
        ),
        "pwd" => Some(
            "Usage: pwd\n\n\
             Print the current directory, relative to the sandbox root.",
        ),
        "echo" => Some(
            "Usage: echo [WORD]...\n\n\
             Write the space-joined arguments.",
        ),
        "exit" => Some(
            "Usage: exit\n\n\
             Leave this shell. Exiting the main shell shuts the system down.",
        ),
        _ => None,
    }
}
