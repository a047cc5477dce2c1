//! Filesystem commands: cat, ls.

use itertools::Itertools;

use crate::kernel::registry::JobSpec;
use crate::process::{JobContext, JobFuture};

pub(super) fn specs() -> Vec<JobSpec> {
    vec![
        JobSpec {
            name: "cat",
            arity: 0..=1,
            man: "Usage: cat [FILE]\n\n\
                  Concatenate FILE to the standard output.\n\
                  With no FILE, copy piped input, or relay interactive input\n\
                  line by line until the end-of-input key.",
            job: cat,
        },
        JobSpec {
            name: "ls",
            arity: 0..=1,
            man: "Usage: ls [PATH]\n\n\
                  List the contents of PATH, or of the current directory.",
            job: ls,
        },
    ]
}

fn cat(mut ctx: JobContext) -> JobFuture {
    Box::pin(async move {
        if let Some(file) = ctx.args.first().cloned() {
            // Resolution failures and missing files read the same to the
            // user: nothing is written to the stream.
            let contents = match ctx.shell.resolve(&file) {
                Some(target) => tokio::fs::read(&target).await.ok(),
                None => None,
            };
            match contents {
                Some(bytes) => ctx.output.write_all(&bytes).await?,
                None => ctx
                    .shell
                    .report(&format!("cat: {file}: No such file or directory")),
            }
        } else if ctx.has_piped_input() {
            let text = ctx.input.read_to_string().await?;
            ctx.output.write_str(&text).await?;
        } else {
            while let Some(line) = ctx.get_line().await {
                ctx.output.write_str(&line).await?;
                ctx.output.write_str("\n").await?;
            }
        }
        ctx.output.close();
        Ok(())
    })
}

fn ls(mut ctx: JobContext) -> JobFuture {
    Box::pin(async move {
        let arg = ctx.args.first().cloned().unwrap_or_default();
        let listing = ctx
            .shell
            .resolve(&arg)
            .filter(|target| target.is_dir())
            .and_then(|target| std::fs::read_dir(target).ok());
        match listing {
            Some(entries) => {
                let names = entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.file_name().to_string_lossy().into_owned())
                    .sorted()
                    .join("\t");
                ctx.output.write_str(&names).await?;
            }
            None => ctx
                .shell
                .report(&format!("ls: {arg}: No such file or directory")),
        }
        ctx.output.close();
        Ok(())
    })
}
