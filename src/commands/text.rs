//! Text filter commands: grep, sort, wc.
//!
//! Filters fully drain their input before producing output. With no piped
//! predecessor they instead collect interactive lines relayed by the shell
//! until the end-of-input key.

use regex::Regex;

use crate::kernel::registry::JobSpec;
use crate::pipe::PipeError;
use crate::process::{JobContext, JobFuture};

pub(super) fn specs() -> Vec<JobSpec> {
    vec![
        JobSpec {
            name: "grep",
            arity: 1..=1,
            man: "Usage: grep PATTERN\n\n\
                  Print input lines matching PATTERN.\n\
                  PATTERN is a regular expression; an invalid pattern falls\n\
                  back to a literal substring match.",
            job: grep,
        },
        JobSpec {
            name: "sort",
            arity: 0..=0,
            man: "Usage: sort\n\n\
                  Sort input lines lexicographically.",
            job: sort,
        },
        JobSpec {
            name: "wc",
            arity: 0..=0,
            man: "Usage: wc\n\n\
                  Print the number of input lines.",
            job: wc,
        },
    ]
}

enum Matcher {
    Pattern(Regex),
    Literal(String),
}

impl Matcher {
    fn new(pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(regex) => Matcher::Pattern(regex),
            Err(_) => Matcher::Literal(pattern.to_string()),
        }
    }

    fn matches(&self, line: &str) -> bool {
        match self {
            Matcher::Pattern(regex) => regex.is_match(line),
            Matcher::Literal(literal) => line.contains(literal),
        }
    }
}

/// Drain this process's input source into lines.
async fn input_lines(ctx: &mut JobContext) -> Result<Vec<String>, PipeError> {
    if ctx.has_piped_input() {
        let text = ctx.input.read_to_string().await?;
        Ok(text.lines().map(str::to_string).collect())
    } else {
        let mut lines = Vec::new();
        while let Some(line) = ctx.get_line().await {
            lines.push(line);
        }
        Ok(lines)
    }
}

fn grep(mut ctx: JobContext) -> JobFuture {
    Box::pin(async move {
        let matcher = Matcher::new(&ctx.args[0]);
        let lines = input_lines(&mut ctx).await?;
        for line in lines {
            if matcher.matches(&line) {
                ctx.output.write_str(&line).await?;
                ctx.output.write_str("\n").await?;
            }
        }
        ctx.output.close();
        Ok(())
    })
}

fn sort(mut ctx: JobContext) -> JobFuture {
    Box::pin(async move {
        let mut lines = input_lines(&mut ctx).await?;
        lines.sort();
        for line in lines {
            ctx.output.write_str(&line).await?;
            ctx.output.write_str("\n").await?;
        }
        ctx.output.close();
        Ok(())
    })
}

fn wc(mut ctx: JobContext) -> JobFuture {
    Box::pin(async move {
        let lines = input_lines(&mut ctx).await?;
        ctx.output.write_str(&lines.len().to_string()).await?;
        ctx.output.close();
        Ok(())
    })
}
