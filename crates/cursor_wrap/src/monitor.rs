//! The hang-detection state machine.
//!
//! The monitor consumes annotated events, tracks open tool calls, and
//! produces verdicts on timer ticks. Event ingestion never produces a Hang
//! verdict; only [`Monitor::check_timeout`] does, so a hang is always
//! backed by an observed tick whose timestamp demonstrates the silence.

use std::{
    collections::HashMap,
    fmt,
    sync::Arc,
    time::{Duration, SystemTime},
};

use cursor_agent::{AnnotatedEvent, SystemInit, ToolCallCompleted, ToolCallInfo, ToolCallStarted};

/// The hang-detection outcome at a moment in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Session completed or no anomaly.
    Ok,
    /// Tools running, within deadlines.
    Waiting,
    /// Hang detected.
    Hang,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Ok => f.write_str("OK"),
            Verdict::Waiting => f.write_str("Waiting"),
            Verdict::Hang => f.write_str("Hang"),
        }
    }
}

/// An in-flight tool invocation.
#[derive(Debug, Clone)]
pub struct OpenToolCall {
    pub call_id: String,
    pub model_call_id: String,
    pub started_at: SystemTime,
    /// From the tool args; 0 if unknown.
    pub timeout_ms: i64,
    /// Shell command, empty for non-shell tools.
    pub command: String,
}

/// Snapshot of an open tool call for diagnostic output.
#[derive(Debug, Clone)]
pub struct OpenCallDetail {
    pub call_id: String,
    pub command: String,
    pub elapsed_ms: i64,
    pub timeout_ms: i64,
}

/// Diagnostic context for a verdict, sufficient to reconstruct the decision
/// from the log alone.
#[derive(Debug, Clone, Default)]
pub struct Reason {
    pub idle_silence_ms: i64,
    pub open_call_count: usize,
    pub last_event_type: String,
    pub open_calls: Vec<OpenCallDetail>,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "idle {}ms, {} open calls, last event: {}",
            self.idle_silence_ms, self.open_call_count, self.last_event_type
        )?;
        for oc in &self.open_calls {
            let cmd = if oc.command.is_empty() {
                "(non-shell)"
            } else {
                &oc.command
            };
            write!(
                f,
                " [{} {} elapsed={}ms timeout={}ms]",
                oc.call_id, cmd, oc.elapsed_ms, oc.timeout_ms
            )?;
        }
        Ok(())
    }
}

/// Time source, injectable so tests can advance time without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Production clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

#[derive(Default)]
struct MonitorState {
    /// Keyed by call_id. Comparisons are byte-exact; observed call_id
    /// values contain literal newline bytes.
    open_calls: HashMap<String, OpenToolCall>,
    last_event_at: Option<SystemTime>,
    last_event_type: String,
    session_done: bool,
    session_id: Option<String>,
}

pub struct Monitor {
    clock: Arc<dyn Clock>,
    idle_timeout: Duration,
    tool_grace: Duration,
    state: MonitorState,
}

impl Monitor {
    pub fn new(idle_timeout: Duration, tool_grace: Duration) -> Self {
        Self::with_clock(idle_timeout, tool_grace, Arc::new(SystemClock))
    }

    pub fn with_clock(idle_timeout: Duration, tool_grace: Duration, clock: Arc<dyn Clock>) -> Self {
        // Start the idle timer immediately: silence right after spawn counts.
        let state = MonitorState {
            last_event_at: Some(clock.now()),
            ..MonitorState::default()
        };
        Self {
            clock,
            idle_timeout,
            tool_grace,
            state,
        }
    }

    /// Updates state for an incoming event. Returns [`Verdict::Ok`] or
    /// [`Verdict::Waiting`], never [`Verdict::Hang`].
    pub fn process_event(&mut self, ev: &AnnotatedEvent) -> Verdict {
        self.state.last_event_at = Some(ev.recv_time);
        self.state.last_event_type = ev.type_label();

        match (ev.parsed.event_type.as_str(), ev.parsed.subtype.as_str()) {
            ("system", "init") => {
                if let Ok(init) = serde_json::from_str::<SystemInit>(&ev.raw) {
                    self.state.session_id = Some(init.session_id);
                }
            }
            ("tool_call", "started") => {
                if let Ok(started) = serde_json::from_str::<ToolCallStarted>(&ev.raw) {
                    let mut oc = OpenToolCall {
                        call_id: started.call_id.clone(),
                        model_call_id: started.model_call_id,
                        started_at: ev.recv_time,
                        timeout_ms: 0,
                        command: String::new(),
                    };
                    // Shell tools declare a timeout and a command; everything
                    // else falls back to the idle timeout at check time.
                    if let Ok(info) = ToolCallInfo::parse(&started.tool_call) {
                        if info.tool_type == "shellToolCall" {
                            oc.timeout_ms = info.timeout_ms;
                            oc.command = info.command;
                        }
                    }
                    self.state.open_calls.insert(started.call_id, oc);
                }
            }
            ("tool_call", "completed") => {
                if let Ok(completed) = serde_json::from_str::<ToolCallCompleted>(&ev.raw) {
                    // Unmatched completions are tolerated silently.
                    self.state.open_calls.remove(&completed.call_id);
                }
            }
            ("result", _) => {
                self.state.session_done = true;
            }
            // Unknown event types still prove the stream is alive; the
            // last-event bookkeeping above is all they get.
            _ => {}
        }

        if self.state.open_calls.is_empty() {
            Verdict::Ok
        } else {
            Verdict::Waiting
        }
    }

    /// Evaluates the current state against timing. Called on timer ticks.
    pub fn check_timeout(&self, now: SystemTime) -> (Verdict, Reason) {
        let idle = elapsed(self.state.last_event_at, now);

        let mut reason = Reason {
            idle_silence_ms: duration_ms(idle),
            open_call_count: self.state.open_calls.len(),
            last_event_type: self.state.last_event_type.clone(),
            open_calls: Vec::new(),
        };

        if self.state.session_done {
            return (Verdict::Ok, reason);
        }

        if self.state.open_calls.is_empty() {
            if idle > self.idle_timeout {
                return (Verdict::Hang, reason);
            }
            return (Verdict::Ok, reason);
        }

        // Tools running. Each open call is measured from its own start: a
        // second tool starting resets the global last-event clock but must
        // not extend the first tool's deadline.
        let mut all_expired = true;
        for tool in self.state.open_calls.values() {
            let tool_elapsed = elapsed(Some(tool.started_at), now);
            let tool_deadline = if tool.timeout_ms == 0 {
                self.idle_timeout
            } else {
                Duration::from_millis(tool.timeout_ms.max(0) as u64) + self.tool_grace
            };
            reason.open_calls.push(OpenCallDetail {
                call_id: tool.call_id.clone(),
                command: tool.command.clone(),
                elapsed_ms: duration_ms(tool_elapsed),
                timeout_ms: tool.timeout_ms,
            });

            if tool_elapsed <= tool_deadline {
                all_expired = false;
            }
        }

        if all_expired {
            (Verdict::Hang, reason)
        } else {
            (Verdict::Waiting, reason)
        }
    }

    /// Current time from the monitor's clock.
    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }

    /// Whether a result event has been received.
    pub fn session_done(&self) -> bool {
        self.state.session_done
    }

    /// The session_id captured from the system/init event, if observed.
    pub fn session_id(&self) -> Option<&str> {
        self.state.session_id.as_deref()
    }
}

fn elapsed(since: Option<SystemTime>, now: SystemTime) -> Duration {
    since
        .and_then(|t| now.duration_since(t).ok())
        .unwrap_or_default()
}

fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}
