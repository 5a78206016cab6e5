// tests/executor_basic.rs
#![cfg(unix)]

mod common;
use crate::common::{executor_with_lines, init_tracing, wait_for, wait_terminal, with_timeout};

use std::time::{Duration, Instant};

use cmdpool::errors::CommandFailure;
use cmdpool::exec::{Executor, LaunchSpec, MAX_LINE_BYTES, StopOutcome};
use cmdpool::types::CommandStatus;

#[tokio::test]
async fn two_echo_commands_both_complete_with_their_output() {
    init_tracing();
    let executor = Executor::default();

    let ids = executor.submit(["echo hello", "echo world"]).unwrap();
    assert_eq!(ids, vec!["cmd_0".to_string(), "cmd_1".to_string()]);

    let first = wait_terminal(&executor, "cmd_0").await;
    let second = wait_terminal(&executor, "cmd_1").await;

    assert_eq!(first.status, CommandStatus::Done);
    assert_eq!(first.output, vec!["hello".to_string()]);
    assert_eq!(first.last_error, None);
    assert!(first.ended_at.is_some());

    assert_eq!(second.status, CommandStatus::Done);
    assert_eq!(second.output, vec!["world".to_string()]);
}

#[tokio::test]
async fn missing_program_fails_with_spawn_error() {
    init_tracing();
    let executor = Executor::default();

    executor
        .launch(LaunchSpec::new("missing", "nonexistent_program_cmdpool_xyz --flag"))
        .unwrap();

    let view = wait_terminal(&executor, "missing").await;
    assert_eq!(view.status, CommandStatus::Failed);
    match view.last_error {
        Some(CommandFailure::Spawn { ref program, .. }) => {
            assert_eq!(program, "nonexistent_program_cmdpool_xyz");
        }
        other => panic!("expected spawn failure, got {other:?}"),
    }
    assert!(view.output.is_empty());
}

#[tokio::test]
async fn stopping_a_long_sleep_is_prompt() {
    init_tracing();
    let executor = Executor::default();
    executor.launch(LaunchSpec::new("sleeper", "sleep 30")).unwrap();

    wait_for(&executor, "sleeper", |v| v.status == CommandStatus::Running).await;

    let outcome = with_timeout(executor.stop("sleeper")).await.unwrap();
    assert_eq!(outcome, StopOutcome::Stopped);

    let view = executor.get("sleeper").unwrap();
    assert_eq!(view.status, CommandStatus::Stopped);
    assert_eq!(view.last_error, None);
    assert_eq!(view.pid, None);

    // The reaped process must not report an exit afterwards.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let later = executor.get("sleeper").unwrap();
    assert_eq!(later.status, CommandStatus::Stopped);
    assert_eq!(later.last_error, None);
    assert_eq!(later.ended_at, view.ended_at);
}

#[tokio::test]
async fn buffer_keeps_only_the_most_recent_lines() {
    init_tracing();
    let executor = executor_with_lines(1000);
    executor
        .launch(LaunchSpec::new(
            "counter",
            r#"sh -c "i=1; while [ $i -le 1500 ]; do echo $i; i=$((i+1)); done""#,
        ))
        .unwrap();

    let view = wait_terminal(&executor, "counter").await;
    assert_eq!(view.status, CommandStatus::Done);
    assert_eq!(view.output.len(), 1000);
    assert_eq!(view.total_lines, 1500);
    assert_eq!(view.output.first().map(String::as_str), Some("501"));
    assert_eq!(view.output.last().map(String::as_str), Some("1500"));
}

#[tokio::test]
async fn stderr_lines_are_tagged_in_the_shared_buffer() {
    init_tracing();
    let executor = Executor::default();
    executor
        .launch(LaunchSpec::new("mixed", r#"sh -c "echo out; echo err 1>&2""#))
        .unwrap();

    let view = wait_terminal(&executor, "mixed").await;
    assert_eq!(view.status, CommandStatus::Done);
    assert_eq!(view.output.len(), 2);
    assert!(view.output.contains(&"out".to_string()));
    assert!(view.output.contains(&"[STDERR] err".to_string()));
}

#[tokio::test]
async fn blank_command_line_fails_without_spawning() {
    init_tracing();
    let executor = Executor::default();
    let ids = executor.submit(["", "   "]).unwrap();

    for id in ids {
        let view = wait_terminal(&executor, &id).await;
        assert_eq!(view.status, CommandStatus::Failed);
        assert_eq!(view.last_error, Some(CommandFailure::EmptyCommand));
    }
}

#[tokio::test]
async fn non_zero_exit_records_the_code() {
    init_tracing();
    let executor = Executor::default();
    executor
        .launch(LaunchSpec::new("bad", r#"sh -c "echo partial; exit 7""#))
        .unwrap();

    let view = wait_terminal(&executor, "bad").await;
    assert_eq!(view.status, CommandStatus::Failed);
    assert_eq!(view.output, vec!["partial".to_string()]);
    assert_eq!(
        view.last_error,
        Some(CommandFailure::Exit {
            code: Some(7),
            signal: None
        })
    );
    assert_eq!(view.last_error.unwrap().to_string(), "exit status 7");
}

#[tokio::test]
async fn quoted_arguments_reach_the_process_intact() {
    init_tracing();
    let executor = Executor::default();
    executor
        .launch(LaunchSpec::new("quoted", r#"printf "%s|%s\n" "a b" c"#))
        .unwrap();

    let view = wait_terminal(&executor, "quoted").await;
    assert_eq!(view.output, vec!["a b|c".to_string()]);
}

#[tokio::test]
async fn working_dir_and_env_are_applied() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let executor = Executor::default();

    executor
        .launch(LaunchSpec::new("where", "pwd").dir(dir.path()))
        .unwrap();
    executor
        .launch(
            LaunchSpec::new("env", r#"sh -c "echo $CMDPOOL_TEST_VAR""#)
                .env("CMDPOOL_TEST_VAR", "from-env"),
        )
        .unwrap();

    let where_view = wait_terminal(&executor, "where").await;
    assert_eq!(where_view.status, CommandStatus::Done);
    let printed = std::fs::canonicalize(&where_view.output[0]).unwrap();
    assert_eq!(printed, std::fs::canonicalize(dir.path()).unwrap());

    let env_view = wait_terminal(&executor, "env").await;
    assert_eq!(env_view.output, vec!["from-env".to_string()]);
}

#[tokio::test]
async fn snapshot_is_a_detached_copy() {
    init_tracing();
    let executor = Executor::default();
    executor.submit(["echo one", "sleep 30"]).unwrap();
    wait_terminal(&executor, "cmd_0").await;

    let snapshot = executor.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot["cmd_0"].output, vec!["one".to_string()]);
    assert_eq!(snapshot["cmd_0"].seq, 0);
    assert_eq!(snapshot["cmd_1"].seq, 1);

    executor.stop("cmd_1").await.unwrap();

    // The earlier copy is unaffected by later changes.
    assert_ne!(snapshot["cmd_1"].status, CommandStatus::Stopped);
    assert_eq!(executor.get("cmd_1").unwrap().status, CommandStatus::Stopped);
}

#[tokio::test]
async fn a_failing_command_does_not_affect_its_neighbours() {
    init_tracing();
    let executor = Executor::default();
    executor
        .submit(["nonexistent_program_cmdpool_xyz", "echo fine"])
        .unwrap();

    let failed = wait_terminal(&executor, "cmd_0").await;
    let fine = wait_terminal(&executor, "cmd_1").await;
    assert_eq!(failed.status, CommandStatus::Failed);
    assert_eq!(fine.status, CommandStatus::Done);
    assert_eq!(fine.output, vec!["fine".to_string()]);
}

#[tokio::test]
async fn snapshots_never_see_the_buffer_shrink_while_output_streams() {
    init_tracing();
    let executor = executor_with_lines(1000);
    executor
        .launch(LaunchSpec::new(
            "stream",
            r#"sh -c "i=1; while [ $i -le 3000 ]; do echo $i; i=$((i+1)); done""#,
        ))
        .unwrap();

    let mut previous_len = 0usize;
    let mut previous_total = 0u64;
    loop {
        let view = executor.get("stream").unwrap();

        assert!(view.output.len() >= previous_len, "buffer shrank");
        assert!(view.total_lines >= previous_total, "line count went back");
        assert!(view.output.len() <= 1000);

        // Always a contiguous tail ending at the latest line.
        let numbers: Vec<u64> = view.output.iter().map(|l| l.parse().unwrap()).collect();
        if let Some(&last) = numbers.last() {
            assert_eq!(last, view.total_lines);
            let first = last + 1 - numbers.len() as u64;
            assert_eq!(numbers, (first..=last).collect::<Vec<_>>());
        }

        previous_len = view.output.len();
        previous_total = view.total_lines;
        if view.status.is_terminal() {
            assert_eq!(view.status, CommandStatus::Done);
            assert_eq!(view.total_lines, 3000);
            break;
        }
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn overlong_lines_are_split_into_chunks() {
    init_tracing();
    let executor = Executor::default();
    executor
        .launch(LaunchSpec::new(
            "wide",
            r#"sh -c "head -c 150000 /dev/zero | tr '\0' a; echo""#,
        ))
        .unwrap();

    let view = wait_terminal(&executor, "wide").await;
    assert_eq!(view.status, CommandStatus::Done);
    let lengths: Vec<usize> = view.output.iter().map(String::len).collect();
    assert_eq!(
        lengths,
        vec![MAX_LINE_BYTES, MAX_LINE_BYTES, 150_000 - 2 * MAX_LINE_BYTES]
    );
    assert!(view.output.iter().all(|l| l.bytes().all(|b| b == b'a')));
}

/// Whether `pid` is a live (non-zombie) process, read from procfs.
#[cfg(target_os = "linux")]
fn is_alive(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.trim_start().chars().next())
            .is_some_and(|state| state != 'Z' && state != 'X'),
        Err(_) => false,
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn stop_kills_background_children_too() {
    init_tracing();
    let executor = Executor::default();
    executor
        .launch(LaunchSpec::new(
            "tree",
            r#"sh -c "sleep 37.5 & echo $!; wait""#,
        ))
        .unwrap();

    let view = wait_for(&executor, "tree", |v| v.total_lines == 1).await;
    let grandchild: i32 = view.output[0].trim().parse().unwrap();
    assert!(is_alive(grandchild));

    let started = Instant::now();
    let outcome = with_timeout(executor.stop("tree")).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome, StopOutcome::Stopped);
    assert!(
        elapsed < Duration::from_millis(1500),
        "stop waited on open pipes: {elapsed:?}"
    );

    let deadline = Instant::now() + Duration::from_secs(2);
    while is_alive(grandchild) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!is_alive(grandchild), "sleep {grandchild} survived the stop");
}

#[tokio::test]
async fn snapshot_keys_sort_as_strings_and_seq_gives_launch_order() {
    init_tracing();
    let executor = Executor::default();
    let lines: Vec<String> = (0..12).map(|i| format!("echo {i}")).collect();
    let ids = executor.submit(lines).unwrap();

    let snapshot = executor.snapshot();
    let keys: Vec<&str> = snapshot.keys().map(String::as_str).collect();
    assert_eq!(&keys[..4], &["cmd_0", "cmd_1", "cmd_10", "cmd_11"]);

    let mut views: Vec<_> = snapshot.values().collect();
    views.sort_by_key(|v| v.seq);
    let by_seq: Vec<String> = views.iter().map(|v| v.id.clone()).collect();
    assert_eq!(by_seq, ids);

    executor.shutdown().await;
}
