//! End-to-end shell tests: builtins, pipelines, redirection, sandboxing,
//! interactive input and kill semantics, driven through a recording console.

use std::time::Duration;

use tokio::time::{sleep, timeout};

use super::testing::{fixture, Fixture};
use crate::kernel::MAIN_SHELL_PID;
use crate::pipe::END_OF_INPUT;

const FRUIT: &str = "banana\napple\ncherry\n";

fn live_pids(fx: &Fixture) -> Vec<u32> {
    fx.kernel.processes().iter().map(|p| p.pid).collect()
}

#[tokio::test]
async fn echo_is_a_builtin_and_creates_no_process() {
    let fx = fixture();
    fx.exec("echo hi").await;
    assert_eq!(fx.console.results().last().unwrap(), "hi");
    assert_eq!(live_pids(&fx), vec![MAIN_SHELL_PID]);
}

#[tokio::test]
async fn echo_joins_arguments_with_spaces() {
    let fx = fixture();
    fx.exec(r#"echo one "two three" four"#).await;
    assert_eq!(fx.console.results().last().unwrap(), "one two three four");
}

#[tokio::test]
async fn empty_line_just_reprompts() {
    let fx = fixture();
    fx.exec("").await;
    assert_eq!(fx.console.results(), vec![String::new()]);
    assert_eq!(live_pids(&fx), vec![MAIN_SHELL_PID]);
}

#[tokio::test]
async fn pwd_and_cd_stay_inside_the_sandbox() {
    let fx = fixture();
    std::fs::create_dir(fx.dir.path().join("sub")).unwrap();

    fx.exec("pwd").await;
    assert_eq!(fx.console.results().last().unwrap(), "/");

    fx.exec("cd sub").await;
    fx.exec("pwd").await;
    assert_eq!(fx.console.results().last().unwrap(), "/sub");
    assert_eq!(fx.console.last_prompt().unwrap(), "msh:sub root$ ");

    fx.exec("cd ..").await;
    fx.exec("pwd").await;
    assert_eq!(fx.console.results().last().unwrap(), "/");

    // At the root, `cd ..` is a no-op.
    fx.exec("cd ..").await;
    fx.exec("pwd").await;
    assert_eq!(fx.console.results().last().unwrap(), "/");
}

#[tokio::test]
async fn cd_to_missing_or_non_directory_targets_reports() {
    let fx = fixture();
    fx.write_file("plain.txt", "x");

    fx.exec("cd nowhere").await;
    assert!(fx
        .console
        .lines()
        .iter()
        .any(|l| l.contains("cd: nowhere: No such file or directory")));

    fx.exec("cd plain.txt").await;
    assert!(fx.console.lines().iter().any(|l| l.contains("Not a directory")));

    fx.exec("pwd").await;
    assert_eq!(fx.console.results().last().unwrap(), "/");
}

#[tokio::test]
async fn cat_of_a_missing_file_reports_and_writes_nothing() {
    let fx = fixture();
    fx.exec("cat missing.txt").await;
    assert!(fx
        .console
        .lines()
        .iter()
        .any(|l| l.contains("cat: missing.txt: No such file or directory")));
    assert_eq!(fx.console.results().last().unwrap(), "");
    assert_eq!(live_pids(&fx), vec![MAIN_SHELL_PID]);
}

#[tokio::test]
async fn pipeline_stages_all_leave_the_table() {
    let fx = fixture();
    fx.write_file("f.txt", FRUIT);
    fx.exec("cat f.txt | sort | wc").await;
    assert_eq!(fx.console.results().last().unwrap(), "3");
    assert_eq!(live_pids(&fx), vec![MAIN_SHELL_PID]);
}

#[tokio::test]
async fn a_pipeline_of_n_stages_consumes_exactly_n_pids() {
    let fx = fixture();
    fx.write_file("f.txt", FRUIT);
    // Pids 2, 3 and 4.
    fx.exec("cat f.txt | sort | wc").await;
    // The next pipeline gets pids 5 (cat, spawned first) and 6 (ps); ps sees
    // the shell and its downstream cat, but not the three finished stages.
    fx.exec("ps | cat").await;
    let lines = fx.console.lines();
    assert!(lines.iter().any(|l| l.starts_with("1\t0") && l.ends_with("shell")));
    assert!(lines.iter().any(|l| l.starts_with("5\t1") && l.ends_with("cat")));
    assert!(!lines.iter().any(|l| l.starts_with("2\t") || l.starts_with("3\t") || l.starts_with("4\t")));
}

#[tokio::test]
async fn sorting_twice_equals_sorting_once() {
    let fx = fixture();
    fx.write_file("f.txt", FRUIT);
    fx.exec("cat f.txt | sort > once.txt").await;
    fx.exec("cat f.txt | sort | sort > twice.txt").await;
    let once = std::fs::read_to_string(fx.dir.path().join("once.txt")).unwrap();
    let twice = std::fs::read_to_string(fx.dir.path().join("twice.txt")).unwrap();
    assert_eq!(once, "apple\nbanana\ncherry\n");
    assert_eq!(once, twice);
}

#[tokio::test]
async fn output_redirection_honors_quoting() {
    let fx = fixture();
    fx.write_file("f.txt", FRUIT);
    fx.exec(r#"cat f.txt > "out file""#).await;
    let copied = std::fs::read_to_string(fx.dir.path().join("out file")).unwrap();
    assert_eq!(copied, FRUIT);
}

#[tokio::test]
async fn output_redirection_outside_the_sandbox_is_refused() {
    let fx = fixture();
    fx.write_file("f.txt", FRUIT);
    fx.exec("cat f.txt > ../escape.txt").await;
    assert!(fx
        .console
        .lines()
        .iter()
        .any(|l| l.contains("outside of the filesystem")));
}

#[tokio::test]
async fn input_redirection_binds_to_the_final_stage_only() {
    let fx = fixture();
    fx.write_file("f.txt", FRUIT);

    fx.exec("wc < f.txt").await;
    assert_eq!(fx.console.results().last().unwrap(), "3");

    // Stages left of the final command are discarded by `<`.
    fx.exec("sort | wc < f.txt").await;
    assert_eq!(fx.console.results().last().unwrap(), "3");
}

#[tokio::test]
async fn interactive_wc_counts_relayed_lines() {
    let fx = fixture();
    fx.feed.write_str("a\nb\na\n").await.unwrap();
    fx.feed.write_all(&[END_OF_INPUT]).await.unwrap();
    fx.exec("wc").await;
    assert_eq!(fx.console.results().last().unwrap(), "3");
}

#[tokio::test]
async fn interactive_grep_filters_relayed_lines() {
    let fx = fixture();
    fx.feed.write_str("a\nb\na\n").await.unwrap();
    fx.feed.write_all(&[END_OF_INPUT]).await.unwrap();
    fx.exec("grep a").await;
    assert_eq!(fx.console.lines(), vec!["a".to_string(), "a".to_string()]);
}

#[tokio::test]
async fn grep_falls_back_to_literal_matching() {
    let fx = fixture();
    fx.write_file("odd.txt", "a[b\nplain\n");
    fx.exec("cat odd.txt | grep a[").await;
    assert_eq!(fx.console.lines(), vec!["a[b".to_string()]);
}

#[tokio::test]
async fn help_token_prints_the_manual() {
    let fx = fixture();
    fx.exec("sort --help").await;
    let all = fx.console.lines().join("\n");
    assert!(all.contains("Usage: sort"));
    assert_eq!(live_pids(&fx), vec![MAIN_SHELL_PID]);
}

#[tokio::test]
async fn man_covers_processes_and_builtins() {
    let fx = fixture();
    fx.exec("man wc").await;
    assert!(fx.console.lines().join("\n").contains("Usage: wc"));

    fx.exec("man cd").await;
    assert!(fx.console.lines().join("\n").contains("Usage: cd"));

    fx.exec("man nothing").await;
    let output = format!(
        "{}\n{}",
        fx.console.lines().join("\n"),
        fx.console.results().join("\n")
    );
    assert!(output.contains("No manual entry for nothing"));
}

#[tokio::test]
async fn unknown_commands_are_reported() {
    let fx = fixture();
    fx.exec("frobnicate now").await;
    assert!(fx
        .console
        .lines()
        .iter()
        .any(|l| l.contains("-msh: frobnicate is not a valid process")));
    assert_eq!(live_pids(&fx), vec![MAIN_SHELL_PID]);
}

#[tokio::test]
async fn bad_arguments_show_the_usage_text() {
    let fx = fixture();
    fx.exec("grep").await;
    assert!(fx.console.lines().join("\n").contains("Usage: grep"));
}

#[tokio::test]
async fn spawn_failures_inside_a_pipeline_reach_the_console_stream() {
    let fx = fixture();
    // The failing stage is spawned by `wc`, which writes the error to its
    // own output and skips counting.
    fx.exec("frobnicate | wc").await;
    let output = format!(
        "{}\n{}",
        fx.console.lines().join("\n"),
        fx.console.results().join("\n")
    );
    assert!(output.contains("-msh: frobnicate is not a valid process"));
    assert_eq!(live_pids(&fx), vec![MAIN_SHELL_PID]);
}

#[tokio::test]
async fn ps_lists_the_shell_but_not_itself() {
    let fx = fixture();
    fx.exec("ps").await;
    let lines = fx.console.lines();
    assert!(lines[0].starts_with("PID\tPPID\tSTARTED\tCOMMAND"));
    assert!(lines.iter().any(|l| l.contains("shell")));
    assert!(!lines.iter().skip(1).any(|l| l.contains("\tps")));
}

#[tokio::test]
async fn kill_of_an_unknown_pid_reports() {
    let fx = fixture();
    fx.exec("kill 99").await;
    assert_eq!(
        fx.console.results().last().unwrap(),
        "kill: 99: no such process"
    );
}

#[tokio::test]
async fn interactive_cancel_kills_the_foreground_pipeline() {
    let fx = fixture();
    let shell = fx.shell.clone();
    let command = tokio::spawn(async move { shell.execute_command("cat").await });

    // Wait for the pipeline leader to be registered as foreground.
    let mut waited = 0;
    while fx.shell.running_process().is_none() && waited < 500 {
        sleep(Duration::from_millis(10)).await;
        waited += 10;
    }
    assert!(fx.shell.running_process().is_some());

    fx.shell.kill_current_process().await;
    timeout(Duration::from_secs(5), command)
        .await
        .expect("cancelled pipeline must unwind")
        .unwrap();

    assert_eq!(live_pids(&fx), vec![MAIN_SHELL_PID]);
    assert!(fx.shell.alive());
    assert_eq!(fx.shell.running_process(), None);
}

#[tokio::test]
async fn exit_shuts_the_main_shell_down() {
    let fx = fixture();
    fx.exec("exit").await;
    assert!(!fx.shell.alive());
    assert!(fx.kernel.processes().is_empty());
}

#[tokio::test]
async fn shutdown_process_tears_everything_down() {
    let fx = fixture();
    fx.exec("shutdown").await;
    assert!(!fx.shell.alive());
    assert!(fx.kernel.processes().is_empty());
}

#[tokio::test]
async fn nested_shell_executes_piped_command_lines() {
    let fx = fixture();
    fx.write_file("script", "pwd\necho done\n");
    fx.exec("cat script | shell").await;
    let lines = fx.console.lines();
    assert!(lines.contains(&"/".to_string()));
    assert!(lines.contains(&"done".to_string()));
    assert_eq!(live_pids(&fx), vec![MAIN_SHELL_PID]);
}

#[tokio::test]
async fn builtin_inside_a_pipeline_feeds_the_next_stage() {
    let fx = fixture();
    fx.exec("echo hi | wc").await;
    assert_eq!(fx.console.results().last().unwrap(), "1");
    // Only the wc process consumed a pid; echo stayed a builtin.
    assert_eq!(live_pids(&fx), vec![MAIN_SHELL_PID]);
}
