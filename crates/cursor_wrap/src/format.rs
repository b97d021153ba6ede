//! Renderers for agent events on the wrapper's stdout.

use std::io::{self, Write};

use cursor_agent::{
    AnnotatedEvent, AssistantMessage, ShellToolResult, ToolCallCompleted, ToolCallInfo,
    ToolCallStarted,
};
use serde_json::json;
use tracing::debug;

use crate::monitor::Reason;

/// The wrapper's output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Transparent passthrough of the agent's JSONL stream.
    StreamJson,
    /// Human-readable rendering.
    Text,
}

/// Renders cursor-agent events. One formatter instance lives for the whole
/// session; [`flush`](Self::flush) is called after each turn.
pub trait Formatter: Send {
    /// Renders a single event. Called for every event in the stream, in
    /// order; the formatter decides what to display.
    fn write_event(&mut self, ev: &AnnotatedEvent) -> io::Result<()>;

    /// Renders a hang detection message inline. Called by the session loop
    /// when a hang is detected in interactive mode.
    fn write_hang_indicator(&mut self, reason: &Reason) -> io::Result<()>;

    /// Called after each turn completes (result event received or stream
    /// ended); writes separators or finalizes buffered output.
    fn flush(&mut self) -> io::Result<()>;
}

pub fn new_formatter(format: OutputFormat, w: Box<dyn Write + Send>) -> Box<dyn Formatter> {
    match format {
        OutputFormat::StreamJson => Box::new(StreamJson { w }),
        OutputFormat::Text => Box::new(Text { w }),
    }
}

/// Transparent passthrough: writes the raw JSON line plus a newline, so the
/// wrapper's stdout is byte-identical to the agent's.
struct StreamJson {
    w: Box<dyn Write + Send>,
}

impl Formatter for StreamJson {
    fn write_event(&mut self, ev: &AnnotatedEvent) -> io::Result<()> {
        self.w.write_all(ev.raw.as_bytes())?;
        self.w.write_all(b"\n")?;
        self.w.flush()
    }

    fn write_hang_indicator(&mut self, reason: &Reason) -> io::Result<()> {
        let msg = json!({
            "type": "wrapper",
            "subtype": "hang_detected",
            "message": reason.to_string(),
        });
        writeln!(self.w, "{msg}")?;
        self.w.flush()
    }

    fn flush(&mut self) -> io::Result<()> {
        self.w.flush()
    }
}

/// Human-readable view of the agent's activity; the default for interactive
/// mode. Thinking, user, system, and result events are silent.
struct Text {
    w: Box<dyn Write + Send>,
}

impl Formatter for Text {
    fn write_event(&mut self, ev: &AnnotatedEvent) -> io::Result<()> {
        match (ev.parsed.event_type.as_str(), ev.parsed.subtype.as_str()) {
            ("assistant", _) => self.write_assistant(ev),
            ("tool_call", "started") => self.write_tool_call_started(ev),
            ("tool_call", "completed") => self.write_tool_call_completed(ev),
            _ => Ok(()),
        }
    }

    fn write_hang_indicator(&mut self, reason: &Reason) -> io::Result<()> {
        writeln!(self.w, "⚠ Hang detected — killed cursor-agent ({reason})")?;
        self.w.flush()
    }

    fn flush(&mut self) -> io::Result<()> {
        // Blank line to visually separate turns.
        self.w.write_all(b"\n")?;
        self.w.flush()
    }
}

impl Text {
    fn write_assistant(&mut self, ev: &AnnotatedEvent) -> io::Result<()> {
        let msg = match AssistantMessage::parse(&ev.raw) {
            Ok(msg) => msg,
            Err(err) => {
                debug!(error = %err, "text formatter: skipping assistant event");
                return Ok(());
            }
        };
        writeln!(self.w, "{}", msg.text)?;
        self.w.flush()
    }

    fn write_tool_call_started(&mut self, ev: &AnnotatedEvent) -> io::Result<()> {
        let started: ToolCallStarted = match serde_json::from_str(&ev.raw) {
            Ok(v) => v,
            Err(err) => {
                debug!(error = %err, "text formatter: skipping tool_call/started event");
                return Ok(());
            }
        };
        let info = match ToolCallInfo::parse(&started.tool_call) {
            Ok(info) => info,
            Err(err) => {
                debug!(error = %err, "text formatter: skipping tool_call/started event");
                return Ok(());
            }
        };

        if info.tool_type == "shellToolCall" {
            writeln!(self.w, "⏳ `{}`", info.command)?;
        } else if !info.path.is_empty() {
            writeln!(self.w, "⏳ {}: {}", info.tool_type, info.path)?;
        } else {
            writeln!(self.w, "⏳ {}", info.tool_type)?;
        }
        self.w.flush()
    }

    fn write_tool_call_completed(&mut self, ev: &AnnotatedEvent) -> io::Result<()> {
        let completed: ToolCallCompleted = match serde_json::from_str(&ev.raw) {
            Ok(v) => v,
            Err(err) => {
                debug!(error = %err, "text formatter: skipping tool_call/completed event");
                return Ok(());
            }
        };
        let info = match ToolCallInfo::parse(&completed.tool_call) {
            Ok(info) => info,
            Err(err) => {
                debug!(error = %err, "text formatter: skipping tool_call/completed event");
                return Ok(());
            }
        };

        if info.tool_type == "shellToolCall" {
            let result = match ShellToolResult::parse(&completed.tool_call) {
                Ok(result) => result,
                Err(err) => {
                    debug!(error = %err, "text formatter: skipping shell result rendering");
                    return Ok(());
                }
            };
            let seconds = result.execution_time as f64 / 1000.0;
            if result.exit_code == 0 {
                writeln!(self.w, "✓ `{}` ({seconds:.1}s, exit 0)", info.command)?;
            } else {
                writeln!(
                    self.w,
                    "✗ `{}` ({seconds:.1}s, exit {})",
                    info.command, result.exit_code
                )?;
            }
            return self.w.flush();
        }

        writeln!(self.w, "✓ {}", info.tool_type)?;
        self.w.flush()
    }
}
