#![forbid(unsafe_code)]
//! Async plumbing around the `cursor-agent` CLI in its headless
//! `--print --output-format stream-json` mode.
//!
//! This crate owns the child-process lifecycle (spawn, prompt delivery,
//! graceful-then-forceful termination, reaping), the argv contract, the
//! wire-protocol event types, and the line-oriented event reader that turns
//! the agent's stdout into a bounded channel of [`AnnotatedEvent`]s. Policy
//! (hang detection, rendering, logging) lives in the `cursor_wrap` binary.

mod error;
mod events;
mod process;
mod reader;
mod request;

pub use error::{CursorAgentError, EventParseError};
pub use events::{
    AnnotatedEvent, AssistantMessage, RawEvent, ShellToolResult, SystemInit, ToolCallCompleted,
    ToolCallInfo, ToolCallStarted,
};
pub use process::AgentSession;
pub use reader::read_events;
pub use request::AgentRequest;
