use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::format::OutputFormat;

/// Hang-detecting supervisor for the cursor-agent CLI.
///
/// Everything after `--` is passed through to cursor-agent verbatim.
#[derive(Parser, Debug)]
#[command(name = "cursor-wrap", version, about)]
pub struct Cli {
    /// Non-interactive mode: single prompt, exit after
    #[arg(short = 'p', long = "print")]
    pub print: bool,

    /// Output format (defaults to stream-json with -p, text otherwise)
    #[arg(long, value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Max silence with no open tool calls
    #[arg(long, value_parser = parse_duration, default_value = "60s")]
    pub idle_timeout: Duration,

    /// Extra time beyond a tool's declared timeout
    #[arg(long, value_parser = parse_duration, default_value = "30s")]
    pub tool_grace: Duration,

    /// How often to check for hangs
    #[arg(long, value_parser = parse_duration, default_value = "5s")]
    pub tick_interval: Duration,

    /// Directory for session log files (defaults to ~/.cursor-wrap/logs)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Console log level: debug|info|warn|error
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to the cursor-agent binary
    #[arg(long, default_value = "cursor-agent")]
    pub agent_bin: PathBuf,

    /// Model to pass to cursor-agent
    #[arg(long)]
    pub model: Option<String>,

    /// Workspace directory for cursor-agent
    #[arg(long)]
    pub workspace: Option<String>,

    /// Pass --force to cursor-agent
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub force: bool,

    /// Resume a previous session on the first turn
    #[arg(long, value_name = "SESSION_ID")]
    pub resume: Option<String>,

    /// Prompt re-sent automatically after a hang in interactive mode
    #[arg(long)]
    pub prompt_after_hang: Option<String>,

    /// Recovery attempts with --prompt-after-hang before giving up
    #[arg(long, default_value_t = 3)]
    pub max_hang_retries: u32,

    /// The prompt (read from stdin when omitted)
    pub prompt: Option<String>,

    /// Pass-through arguments for cursor-agent
    #[arg(last = true)]
    pub extra_args: Vec<String>,
}

/// Parses Go-style duration strings: `500ms`, `5s`, `2m`, `1h`, `1.5s`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let unit_start = s
        .find(|c: char| c.is_ascii_alphabetic())
        .ok_or_else(|| format!("missing unit in duration `{s}` (try `30s`)"))?;
    let (value, unit) = s.split_at(unit_start);
    let value: f64 = value
        .parse()
        .map_err(|_| format!("invalid duration `{s}`"))?;
    let secs = match unit {
        "ms" => value / 1000.0,
        "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        _ => return Err(format!("unknown duration unit `{unit}` in `{s}`")),
    };
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("invalid duration `{s}`"));
    }
    Ok(Duration::from_secs_f64(secs))
}
