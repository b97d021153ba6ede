use std::time::SystemTime;

use serde::Deserialize;
use serde_json::Value;

use crate::EventParseError;

/// First-pass parse of every JSON line. Only the discriminator fields are
/// decoded; the full line is retained verbatim on the [`AnnotatedEvent`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub subtype: String,
}

/// A parsed event paired with the wrapper's receive timestamp.
///
/// `raw` holds the exact line as received from the agent, newline excluded.
#[derive(Debug, Clone)]
pub struct AnnotatedEvent {
    pub recv_time: SystemTime,
    pub raw: String,
    pub parsed: RawEvent,
}

impl AnnotatedEvent {
    /// `"type"` or `"type/subtype"` when a subtype is present.
    pub fn type_label(&self) -> String {
        if self.parsed.subtype.is_empty() {
            self.parsed.event_type.clone()
        } else {
            format!("{}/{}", self.parsed.event_type, self.parsed.subtype)
        }
    }
}

/// The `system`/`init` event.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemInit {
    pub session_id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub cwd: String,
    #[serde(default, rename = "permissionMode")]
    pub permission_mode: String,
}

/// Emitted when a tool begins execution.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallStarted {
    pub call_id: String,
    #[serde(default)]
    pub model_call_id: String,
    #[serde(default)]
    pub timestamp_ms: i64,
    #[serde(default)]
    pub tool_call: Value,
}

/// Emitted when a tool finishes.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallCompleted {
    pub call_id: String,
    #[serde(default)]
    pub model_call_id: String,
    #[serde(default)]
    pub timestamp_ms: i64,
    #[serde(default)]
    pub tool_call: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ShellToolArgs {
    #[serde(default)]
    command: String,
    #[serde(default)]
    timeout: i64,
}

/// Tool type and display-relevant args, extracted from the `tool_call`
/// field of a started or completed event.
#[derive(Debug, Clone, Default)]
pub struct ToolCallInfo {
    /// Key name of the single-key tool object: `"shellToolCall"`,
    /// `"lsToolCall"`, etc.
    pub tool_type: String,
    /// Populated when `tool_type == "shellToolCall"`.
    pub command: String,
    pub timeout_ms: i64,
    /// Populated when `tool_type == "lsToolCall"`.
    pub path: String,
}

impl ToolCallInfo {
    /// The `tool_call` field is an object with a single key identifying the
    /// tool type, e.g. `{"shellToolCall":{"args":{...}}}`.
    pub fn parse(tool_call: &Value) -> Result<Self, EventParseError> {
        let obj = tool_call.as_object().ok_or(EventParseError::NotAnObject)?;
        let (tool_type, tool_data) = obj
            .iter()
            .next()
            .ok_or(EventParseError::EmptyToolCall)?;

        let mut info = ToolCallInfo {
            tool_type: tool_type.clone(),
            ..ToolCallInfo::default()
        };

        match tool_type.as_str() {
            "shellToolCall" => {
                #[derive(Deserialize)]
                struct Shell {
                    #[serde(default)]
                    args: ShellToolArgs,
                }
                let shell: Shell = serde_json::from_value(tool_data.clone())?;
                info.command = shell.args.command;
                info.timeout_ms = shell.args.timeout;
            }
            "lsToolCall" => {
                #[derive(Deserialize, Default)]
                struct LsArgs {
                    #[serde(default)]
                    path: String,
                }
                #[derive(Deserialize)]
                struct Ls {
                    #[serde(default)]
                    args: LsArgs,
                }
                let ls: Ls = serde_json::from_value(tool_data.clone())?;
                info.path = ls.args.path;
            }
            _ => {}
        }

        Ok(info)
    }
}

/// Result fields of a completed `shellToolCall`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShellToolResult {
    #[serde(default, rename = "exitCode")]
    pub exit_code: i32,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    /// Milliseconds.
    #[serde(default, rename = "executionTime")]
    pub execution_time: i64,
}

impl ShellToolResult {
    pub fn parse(tool_call: &Value) -> Result<Self, EventParseError> {
        let shell_data = tool_call
            .get("shellToolCall")
            .ok_or(EventParseError::NotShell)?;
        #[derive(Deserialize, Default)]
        struct ShellResult {
            #[serde(default)]
            success: ShellToolResult,
        }
        #[derive(Deserialize)]
        struct Shell {
            #[serde(default)]
            result: ShellResult,
        }
        let shell: Shell = serde_json::from_value(shell_data.clone())?;
        Ok(shell.result.success)
    }
}

/// Text content of an `assistant` event.
#[derive(Debug, Clone)]
pub struct AssistantMessage {
    /// Extracted from `message.content[0].text`.
    pub text: String,
    /// Present for mid-turn messages, absent for the final response.
    pub model_call_id: String,
    /// True when `model_call_id` is absent or null.
    pub is_final: bool,
}

impl AssistantMessage {
    pub fn parse(raw: &str) -> Result<Self, EventParseError> {
        #[derive(Deserialize)]
        struct ContentItem {
            #[serde(default)]
            text: String,
        }
        #[derive(Deserialize, Default)]
        struct Message {
            #[serde(default)]
            content: Vec<ContentItem>,
        }
        #[derive(Deserialize)]
        struct Envelope {
            #[serde(default)]
            message: Message,
            #[serde(default)]
            model_call_id: Option<String>,
        }

        let envelope: Envelope = serde_json::from_str(raw)?;
        let first = envelope
            .message
            .content
            .into_iter()
            .next()
            .ok_or(EventParseError::EmptyContent)?;

        let model_call_id = envelope.model_call_id.unwrap_or_default();
        Ok(AssistantMessage {
            text: first.text,
            is_final: model_call_id.is_empty(),
            model_call_id,
        })
    }
}
