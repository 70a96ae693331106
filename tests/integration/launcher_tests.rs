//! Process launcher supervision: exit capture, heartbeats, timeout and
//! cancellation teardown of the whole process group.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use codex_subagent::models::progress::ProgressReporter;
use codex_subagent::process::group::DirectChild;
use codex_subagent::process::{LaunchSpec, ProcessLauncher};
use codex_subagent::AppError;
use serial_test::serial;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::test_helpers::{fast_supervisor, write_script};

fn spec(program: PathBuf, dir: &Path) -> LaunchSpec {
    let env = HashMap::from([(
        "PATH".to_owned(),
        std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".into()),
    )]);
    LaunchSpec {
        program,
        args: vec!["hello world".into()],
        work_dir: Some(dir.to_path_buf()),
        env,
    }
}

// ── Normal exit ──────────────────────────────────────────────

#[tokio::test]
#[serial]
async fn captures_output_and_exit_code() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write_script(
        dir.path(),
        "agent",
        "echo \"out:$1\"\necho \"err:$FOO\" >&2\nexit 4\n",
    );
    let mut launch = spec(script, dir.path());
    launch.env.insert("FOO".into(), "bar".into());

    let output = ProcessLauncher::new(fast_supervisor())
        .run(
            &launch,
            Duration::from_secs(10),
            &ProgressReporter::disabled(),
            &CancellationToken::new(),
        )
        .await
        .expect("run");
    assert_eq!(output.exit_code, 4);
    assert_eq!(output.stdout, "out:hello world\n");
    assert_eq!(output.stderr, "err:bar\n");
    assert_eq!(output.combined(), "out:hello world\nerr:bar\n");
}

#[tokio::test]
#[serial]
async fn child_sees_only_the_resolved_environment() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write_script(dir.path(), "agent", "echo \"home=[$HOME]\"\n");

    let output = ProcessLauncher::new(fast_supervisor())
        .run(
            &spec(script, dir.path()),
            Duration::from_secs(10),
            &ProgressReporter::disabled(),
            &CancellationToken::new(),
        )
        .await
        .expect("run");
    assert_eq!(output.stdout, "home=[]\n");
}

#[tokio::test]
#[serial]
async fn heartbeats_are_reported_while_running() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write_script(dir.path(), "agent", "sleep 1\n");
    let (tx, mut rx) = mpsc::channel(64);

    let output = ProcessLauncher::new(fast_supervisor())
        .run(
            &spec(script, dir.path()),
            Duration::from_secs(10),
            &ProgressReporter::new(tx),
            &CancellationToken::new(),
        )
        .await
        .expect("run");
    assert_eq!(output.exit_code, 0);

    let mut beats = 0;
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.message, "Agent running...");
        beats += 1;
    }
    assert!(beats >= 2, "expected heartbeats, got {beats}");
}

// ── Launch failure ───────────────────────────────────────────

#[tokio::test]
#[serial]
async fn missing_program_is_a_launch_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = ProcessLauncher::new(fast_supervisor())
        .run(
            &spec(dir.path().join("no-such-agent"), dir.path()),
            Duration::from_secs(10),
            &ProgressReporter::disabled(),
            &CancellationToken::new(),
        )
        .await
        .expect_err("launch must fail");
    match err {
        AppError::LaunchFailure { command, reason } => {
            assert!(command.contains("no-such-agent"));
            assert!(reason.contains("not found"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ── Timeout teardown ─────────────────────────────────────────

#[tokio::test]
#[serial]
async fn timeout_kills_the_whole_group() {
    let dir = tempfile::tempdir().expect("tempdir");
    let marker = dir.path().join("grandchild-survived");
    let script = write_script(
        dir.path(),
        "agent",
        &format!(
            "(sleep 2; touch '{}') &\nsleep 30\n",
            marker.display()
        ),
    );

    let started = Instant::now();
    let err = ProcessLauncher::new(fast_supervisor())
        .run(
            &spec(script, dir.path()),
            Duration::from_millis(500),
            &ProgressReporter::disabled(),
            &CancellationToken::new(),
        )
        .await
        .expect_err("must time out");
    assert!(matches!(err, AppError::Timeout { .. }), "got {err}");
    assert!(err.to_string().contains("Timeout Seconds: 0.5"));
    assert!(started.elapsed() < Duration::from_secs(5));

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!marker.exists(), "grandchild outlived the timeout");
}

#[tokio::test]
#[serial]
async fn term_ignoring_child_is_force_killed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write_script(dir.path(), "agent", "trap '' TERM\nsleep 30\n");

    let started = Instant::now();
    let err = ProcessLauncher::new(fast_supervisor())
        .run(
            &spec(script, dir.path()),
            Duration::from_millis(300),
            &ProgressReporter::disabled(),
            &CancellationToken::new(),
        )
        .await
        .expect_err("must time out");
    assert!(matches!(err, AppError::Timeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
#[serial]
async fn descendants_holding_pipes_count_as_timeout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write_script(dir.path(), "agent", "sleep 30 &\necho leader done\n");

    let started = Instant::now();
    let err = ProcessLauncher::new(fast_supervisor())
        .run(
            &spec(script, dir.path()),
            Duration::from_millis(800),
            &ProgressReporter::disabled(),
            &CancellationToken::new(),
        )
        .await
        .expect_err("pipes held past deadline");
    assert!(matches!(err, AppError::Timeout { .. }), "got {err}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

// ── Cancellation ─────────────────────────────────────────────

#[tokio::test]
#[serial]
async fn cancellation_tears_down_the_child() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write_script(dir.path(), "agent", "sleep 30\n");
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = ProcessLauncher::new(fast_supervisor())
        .run(
            &spec(script, dir.path()),
            Duration::from_secs(30),
            &ProgressReporter::disabled(),
            &cancel,
        )
        .await
        .expect_err("cancelled");
    assert!(matches!(err, AppError::Cancelled { .. }));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
#[serial]
async fn cancellation_reaches_descendants_holding_pipes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write_script(dir.path(), "agent", "sleep 30 &\necho leader done\n");
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel(64);

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = ProcessLauncher::new(fast_supervisor())
        .run(
            &spec(script, dir.path()),
            Duration::from_secs(30),
            &ProgressReporter::new(tx),
            &cancel,
        )
        .await
        .expect_err("cancelled");
    assert!(matches!(err, AppError::Cancelled { .. }), "got {err}");
    assert!(started.elapsed() < Duration::from_secs(5));

    let mut beats = 0;
    while rx.try_recv().is_ok() {
        beats += 1;
    }
    assert!(beats >= 1, "expected heartbeats while output stayed open");
}

// ── Direct-child fallback ────────────────────────────────────

#[tokio::test]
#[serial]
async fn direct_child_tree_still_tears_down_on_timeout() {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let dir = tempfile::tempdir().expect("tempdir");
    let pid_file = dir.path().join("agent.pid");
    let script = write_script(
        dir.path(),
        "agent",
        &format!("echo $$ > '{}'\nexec sleep 30\n", pid_file.display()),
    );

    let launcher = ProcessLauncher::with_tree(Arc::new(DirectChild), fast_supervisor());
    let started = Instant::now();
    let err = launcher
        .run(
            &spec(script, dir.path()),
            Duration::from_millis(500),
            &ProgressReporter::disabled(),
            &CancellationToken::new(),
        )
        .await
        .expect_err("must time out");
    assert!(matches!(err, AppError::Timeout { .. }), "got {err}");
    assert!(started.elapsed() < Duration::from_secs(5));

    let pid: i32 = std::fs::read_to_string(&pid_file)
        .expect("pid file")
        .trim()
        .parse()
        .expect("pid");
    assert_eq!(kill(Pid::from_raw(pid), None), Err(Errno::ESRCH));
}
