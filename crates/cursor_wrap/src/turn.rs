//! The per-turn orchestrator: one agent invocation from spawn to teardown.
//!
//! Exactly three tasks are live during a turn: this select loop, the event
//! reader, and the stderr drainer. The monitor is owned by the loop, which
//! is its only writer, so it needs no lock.

use std::sync::Arc;

use cursor_agent::{read_events, AgentRequest, AgentSession, CursorAgentError};
use tokio::{process::ChildStderr, sync::mpsc, time};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    format::Formatter,
    logger::{attr, Attr, LogSession},
    monitor::{Monitor, Reason, Verdict},
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Terminal condition of a turn. Setup failures (spawn, pipes, prompt
/// delivery) are errors instead: the turn never ran.
#[derive(Debug)]
pub enum TurnOutcome {
    /// The agent emitted a result event and exited.
    NormalCompletion,
    /// The monitor confirmed a hang and the agent was killed.
    HangDetected(Reason),
    /// The agent closed stdout without ever emitting a result event.
    AbnormalExit(i32),
    /// A non-EOF I/O error on the agent's stdout.
    ReaderFailure,
    /// The invocation was cancelled (interrupt/termination signal).
    Cancelled,
}

#[derive(Debug)]
pub struct TurnResult {
    /// From the system/init event, if one was observed.
    pub session_id: Option<String>,
    pub outcome: TurnOutcome,
}

/// Runs a single agent invocation to completion.
pub async fn run_turn(
    request: &AgentRequest,
    cfg: &Config,
    fmtr: &mut dyn Formatter,
    log: &Arc<LogSession>,
    cancel: &CancellationToken,
) -> Result<TurnResult, CursorAgentError> {
    let mut sess = AgentSession::start(request).await?;

    let (event_tx, mut event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (err_tx, mut err_rx) = mpsc::channel(1);

    let stdout = sess.take_stdout()?;
    let stderr = sess.take_stderr()?;

    let reader = tokio::spawn(read_events(stdout, event_tx, err_tx, cancel.clone()));
    let drainer = tokio::spawn(drain_stderr(stderr, Arc::clone(log), cancel.clone()));

    let mut mon = Monitor::new(cfg.idle_timeout, cfg.tool_grace);

    let mut ticker = time::interval_at(
        time::Instant::now() + cfg.tick_interval,
        cfg.tick_interval,
    );

    let mut killed = false;
    let outcome = loop {
        tokio::select! {
            ev = event_rx.recv() => match ev {
                Some(ev) => {
                    // Forensic record first: the event must be on disk before
                    // any other consumer sees it.
                    log.raw_event(&ev);
                    if let Err(err) = fmtr.write_event(&ev) {
                        log.warn("formatter write error", &[attr("error", err.to_string())]);
                    }
                    let verdict = mon.process_event(&ev);
                    if verdict == Verdict::Waiting {
                        log.debug(
                            "verdict_waiting",
                            &[attr("event_type", ev.parsed.event_type.clone())],
                        );
                    }
                }
                None => {
                    // stdout EOF: the agent is exiting or has exited.
                    let status = sess.wait().await?;
                    let exit_code = status.code().unwrap_or(-1);
                    log.info(
                        "cursor-agent exited",
                        &[
                            attr("exit_code", exit_code),
                            attr("session_done", mon.session_done()),
                        ],
                    );
                    if mon.session_done() {
                        break TurnOutcome::NormalCompletion;
                    }
                    break TurnOutcome::AbnormalExit(exit_code);
                }
            },

            Some(err) = err_rx.recv() => {
                log.error("event reader failed", &[attr("error", err.to_string())]);
                sess.kill("reader error").await;
                killed = true;
                break TurnOutcome::ReaderFailure;
            },

            _ = ticker.tick() => {
                let (verdict, reason) = mon.check_timeout(mon.now());
                if verdict == Verdict::Hang {
                    log.error("hang detected", &reason_attrs(&reason));
                    sess.kill(&reason.to_string()).await;
                    killed = true;
                    break TurnOutcome::HangDetected(reason);
                }
            },

            () = cancel.cancelled() => {
                sess.kill("cancelled").await;
                killed = true;
                break TurnOutcome::Cancelled;
            },
        }
    };

    if killed {
        // Kill only signals; reap here so no zombie outlives the turn.
        let _ = sess.wait().await;
    }

    // Release a reader blocked on a full event channel before joining it.
    drop(event_rx);
    let _ = reader.await;
    let _ = drainer.await;

    if let Err(err) = fmtr.flush() {
        log.warn("formatter flush error", &[attr("error", err.to_string())]);
    }

    Ok(TurnResult {
        session_id: mon.session_id().map(str::to_string),
        outcome,
    })
}

/// Reads and logs the agent's stderr at DEBUG. Draining prevents the child
/// from blocking on a full pipe buffer; the lines are never parsed (the
/// agent mirrors its JSON stream there in stream-json mode, and parsing it
/// would double-count events).
async fn drain_stderr(stderr: ChildStderr, log: Arc<LogSession>, cancel: CancellationToken) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        let line = tokio::select! {
            res = lines.next_line() => match res {
                Ok(Some(line)) => line,
                Ok(None) => return,
                Err(err) => {
                    if !cancel.is_cancelled() {
                        log.warn("stderr read error", &[attr("error", err.to_string())]);
                    }
                    return;
                }
            },
            () = cancel.cancelled() => return,
        };
        log.debug("stderr", &[attr("line", line)]);
    }
}

/// Flattens a hang [`Reason`] into structured log attributes.
pub(crate) fn reason_attrs(reason: &Reason) -> Vec<Attr> {
    let mut attrs = vec![
        attr("idle_silence_ms", reason.idle_silence_ms),
        attr("open_call_count", reason.open_call_count as u64),
        attr("last_event_type", reason.last_event_type.clone()),
    ];
    for (i, call) in reason.open_calls.iter().enumerate() {
        attrs.push(attr(format!("open_call_{i}_id"), call.call_id.clone()));
        attrs.push(attr(format!("open_call_{i}_command"), call.command.clone()));
        attrs.push(attr(format!("open_call_{i}_elapsed_ms"), call.elapsed_ms));
        attrs.push(attr(format!("open_call_{i}_timeout_ms"), call.timeout_ms));
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::OpenCallDetail;

    #[test]
    fn reason_attrs_index_open_calls() {
        let reason = Reason {
            idle_silence_ms: 31_500,
            open_call_count: 2,
            last_event_type: "tool_call/started".to_string(),
            open_calls: vec![
                OpenCallDetail {
                    call_id: "call-a".to_string(),
                    command: "sleep 999".to_string(),
                    elapsed_ms: 31_500,
                    timeout_ms: 1_000,
                },
                OpenCallDetail {
                    call_id: "call-b".to_string(),
                    command: String::new(),
                    elapsed_ms: 2_000,
                    timeout_ms: 0,
                },
            ],
        };

        let attrs = reason_attrs(&reason);
        let get = |key: &str| {
            attrs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| panic!("missing attr {key}"))
        };

        assert_eq!(get("idle_silence_ms"), serde_json::json!(31_500));
        assert_eq!(get("open_call_count"), serde_json::json!(2));
        assert_eq!(get("open_call_0_id"), serde_json::json!("call-a"));
        assert_eq!(get("open_call_0_command"), serde_json::json!("sleep 999"));
        assert_eq!(get("open_call_1_elapsed_ms"), serde_json::json!(2_000));
        assert_eq!(get("open_call_1_timeout_ms"), serde_json::json!(0));
    }
}
