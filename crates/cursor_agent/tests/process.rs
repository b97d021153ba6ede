//! Lifecycle tests against real child processes. The helper scripts ignore
//! all arguments, simulating cursor-agent accepting whatever flags the
//! wrapper injects.

use std::{os::unix::fs::PermissionsExt, path::PathBuf, time::Duration};

use cursor_agent::{AgentRequest, AgentSession};
use tokio::io::AsyncReadExt;

fn write_script(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("agent.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("writing test script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod test script");
    path
}

async fn read_stdout(sess: &mut AgentSession) -> String {
    let mut stdout = sess.take_stdout().expect("stdout pipe");
    let mut out = String::new();
    stdout.read_to_string(&mut out).await.expect("read stdout");
    out
}

#[tokio::test]
async fn start_spawns_process_and_captures_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let bin = write_script(&dir, "echo hello_world");

    let mut sess = AgentSession::start(&AgentRequest::new(&bin, ""))
        .await
        .expect("start failed");

    assert_eq!(read_stdout(&mut sess).await.trim(), "hello_world");

    let status = sess.wait().await.expect("wait failed");
    assert_eq!(status.code(), Some(0));
}

#[tokio::test]
async fn start_writes_prompt_to_stdin_and_closes_it() {
    let dir = tempfile::tempdir().unwrap();
    // cat exits once it reads EOF from stdin. If stdin were left open this
    // test would hang indefinitely.
    let bin = write_script(&dir, "cat");

    let mut sess = AgentSession::start(&AgentRequest::new(&bin, "hello from test"))
        .await
        .expect("start failed");

    let echoed = tokio::time::timeout(Duration::from_secs(5), read_stdout(&mut sess))
        .await
        .expect("cat did not see stdin EOF");
    assert_eq!(echoed, "hello from test");

    let status = sess.wait().await.expect("wait failed");
    assert_eq!(status.code(), Some(0));
}

#[tokio::test]
async fn start_fails_for_missing_binary() {
    let err = AgentSession::start(&AgentRequest::new(
        "/nonexistent/binary/that/does/not/exist",
        "test",
    ))
    .await
    .expect_err("expected spawn failure");
    assert!(err.to_string().contains("failed to spawn cursor-agent"));
}

#[tokio::test]
async fn wait_returns_the_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let bin = write_script(&dir, "exit 42");

    let mut sess = AgentSession::start(&AgentRequest::new(&bin, ""))
        .await
        .expect("start failed");
    let status = sess.wait().await.expect("wait failed");
    assert_eq!(status.code(), Some(42));
}

#[tokio::test]
async fn kill_sends_sigterm() {
    let dir = tempfile::tempdir().unwrap();
    let bin = write_script(&dir, "sleep 60");

    let mut sess = AgentSession::start(&AgentRequest::new(&bin, ""))
        .await
        .expect("start failed");
    tokio::time::sleep(Duration::from_millis(50)).await;

    sess.kill("test").await;

    let status = sess.wait().await.expect("wait failed");
    assert!(!status.success(), "sleep should have died to a signal");
}

#[tokio::test]
async fn kill_escalates_to_sigkill() {
    let dir = tempfile::tempdir().unwrap();
    // Traps SIGTERM and ignores it; only SIGKILL gets rid of it.
    let bin = write_script(&dir, "trap '' TERM\nsleep 60");

    let mut sess = AgentSession::start(&AgentRequest::new(&bin, ""))
        .await
        .expect("start failed");
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Grace is 5s; the whole escalation must finish well inside 15s.
    tokio::time::timeout(Duration::from_secs(15), sess.kill("test escalation"))
        .await
        .expect("kill did not return within 15s");

    let status = sess.wait().await.expect("wait failed");
    assert!(!status.success());
}

#[tokio::test]
async fn kill_on_already_dead_process_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let bin = write_script(&dir, "exit 0");

    let mut sess = AgentSession::start(&AgentRequest::new(&bin, ""))
        .await
        .expect("start failed");
    sess.wait().await.expect("wait failed");

    // Must return promptly and without panicking.
    tokio::time::timeout(Duration::from_secs(1), sess.kill("already dead"))
        .await
        .expect("kill on dead process should not block");
}

#[tokio::test]
async fn stderr_is_captured_separately() {
    let dir = tempfile::tempdir().unwrap();
    let bin = write_script(&dir, "echo error_output >&2");

    let mut sess = AgentSession::start(&AgentRequest::new(&bin, ""))
        .await
        .expect("start failed");

    let mut stderr = sess.take_stderr().expect("stderr pipe");
    let mut out = String::new();
    stderr.read_to_string(&mut out).await.expect("read stderr");
    assert_eq!(out.trim(), "error_output");

    sess.wait().await.expect("wait failed");
}

#[tokio::test]
async fn argv_reaches_the_child() {
    let dir = tempfile::tempdir().unwrap();
    let bin = write_script(&dir, "cat >/dev/null\nprintf '%s\\n' \"$@\"");

    let request = AgentRequest::new(&bin, "ignored").resume("sess-1").force(true);
    let mut sess = AgentSession::start(&request).await.expect("start failed");

    let out = read_stdout(&mut sess).await;
    let args: Vec<&str> = out.lines().collect();
    assert_eq!(
        args,
        [
            "--print",
            "--output-format",
            "stream-json",
            "--resume",
            "sess-1",
            "--force"
        ]
    );
    sess.wait().await.expect("wait failed");
}
