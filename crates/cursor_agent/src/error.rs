use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CursorAgentError {
    #[error("failed to spawn cursor-agent (binary={binary:?}): {source}")]
    Spawn {
        binary: PathBuf,
        source: std::io::Error,
    },
    #[error("internal error: missing stdin pipe")]
    StdinUnavailable,
    #[error("internal error: missing stdout pipe")]
    StdoutUnavailable,
    #[error("internal error: missing stderr pipe")]
    StderrUnavailable,
    #[error("failed writing prompt to stdin: {0}")]
    StdinWrite(std::io::Error),
    #[error("failed waiting for cursor-agent: {0}")]
    Wait(std::io::Error),
}

/// Failures while deep-parsing the optional content of a known event shape.
///
/// These are always recoverable: the caller skips whatever it was trying to
/// extract and moves on.
#[derive(Debug, Error)]
pub enum EventParseError {
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("tool_call is not an object")]
    NotAnObject,
    #[error("assistant event has no content")]
    EmptyContent,
    #[error("tool_call object has no keys")]
    EmptyToolCall,
    #[error("tool_call is not a shellToolCall")]
    NotShell,
}
