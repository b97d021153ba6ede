use std::{process::ExitStatus, time::Duration};

use nix::{
    sys::signal::{self, Signal},
    unistd::Pid,
};
use tokio::{
    io::AsyncWriteExt,
    process::{Child, ChildStderr, ChildStdout, Command},
    time,
};
use tracing::debug;

use crate::{AgentRequest, CursorAgentError};

/// Time to wait after SIGTERM before escalating to SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(5);
/// Poll cadence for both the kill liveness probe and the spawn retry.
const KILL_POLL: Duration = Duration::from_millis(50);
/// How long to keep retrying a spawn that fails with ETXTBSY. The agent's
/// installer rewrites the binary in place; a launch racing it sees the file
/// still open for write.
const SPAWN_BUSY_WINDOW: Duration = Duration::from_millis(250);

/// A running cursor-agent process.
///
/// Stdin is not exposed: the prompt is written and the pipe closed inside
/// [`start`](Self::start). The agent reads stdin to EOF before doing
/// anything, so a pipe left open is indistinguishable from an agent hang.
#[derive(Debug)]
pub struct AgentSession {
    child: Child,
    pid: Option<Pid>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

impl AgentSession {
    /// Spawns cursor-agent, delivers the prompt, and returns the session.
    ///
    /// Any failure to write or close stdin triggers a best-effort forceful
    /// kill of the child before the error is returned.
    pub async fn start(request: &AgentRequest) -> Result<Self, CursorAgentError> {
        let mut command = Command::new(request.binary_path());
        command
            .args(request.argv())
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let spawn_deadline = time::Instant::now() + SPAWN_BUSY_WINDOW;
        let mut child = loop {
            match command.spawn() {
                Ok(child) => break child,
                Err(source) => {
                    let busy = source.raw_os_error() == Some(nix::libc::ETXTBSY);
                    if busy && time::Instant::now() < spawn_deadline {
                        time::sleep(KILL_POLL).await;
                        continue;
                    }
                    return Err(CursorAgentError::Spawn {
                        binary: request.binary_path().to_path_buf(),
                        source,
                    });
                }
            }
        };
        let pid = child.id().map(|id| Pid::from_raw(id as i32));

        let mut stdin = child.stdin.take().ok_or(CursorAgentError::StdinUnavailable)?;
        let deliver = async {
            stdin.write_all(request.prompt_text().as_bytes()).await?;
            stdin.shutdown().await
        };
        if let Err(source) = deliver.await {
            let _ = child.start_kill();
            return Err(CursorAgentError::StdinWrite(source));
        }
        drop(stdin);

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        Ok(Self {
            child,
            pid,
            stdout,
            stderr,
        })
    }

    pub fn take_stdout(&mut self) -> Result<ChildStdout, CursorAgentError> {
        self.stdout.take().ok_or(CursorAgentError::StdoutUnavailable)
    }

    pub fn take_stderr(&mut self) -> Result<ChildStderr, CursorAgentError> {
        self.stderr.take().ok_or(CursorAgentError::StderrUnavailable)
    }

    /// Sends SIGTERM, polls liveness for up to the grace window, then sends
    /// SIGKILL if the process has not exited. This only sends signals; the
    /// caller must still [`wait`](Self::wait) to reap the process. Killing an
    /// already-dead process is a no-op. `reason` is for logging only.
    pub async fn kill(&self, reason: &str) {
        let Some(pid) = self.pid else {
            return;
        };
        debug!(%pid, reason, "terminating cursor-agent");

        if signal::kill(pid, Signal::SIGTERM).is_err() {
            // ESRCH: already gone.
            return;
        }

        let deadline = time::Instant::now() + KILL_GRACE;
        while time::Instant::now() < deadline {
            time::sleep(KILL_POLL).await;
            // Signal 0 probes existence without delivering anything.
            if signal::kill(pid, None).is_err() {
                return;
            }
        }

        debug!(%pid, "grace period expired, escalating to SIGKILL");
        let _ = signal::kill(pid, Signal::SIGKILL);
    }

    /// Blocks until the process exits and returns its status.
    pub async fn wait(&mut self) -> Result<ExitStatus, CursorAgentError> {
        self.child.wait().await.map_err(CursorAgentError::Wait)
    }
}
