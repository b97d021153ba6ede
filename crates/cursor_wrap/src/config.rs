use std::{path::PathBuf, time::Duration};

use cursor_agent::AgentRequest;
use tracing::Level;

use crate::{
    cli::Cli,
    format::OutputFormat,
    logger::{default_log_dir, parse_level, LogConfig},
};

/// Fully resolved wrapper configuration. Mode-dependent defaults (output
/// format, console log level) are applied here, after flag parsing.
#[derive(Debug, Clone)]
pub struct Config {
    pub print: bool,
    pub output_format: OutputFormat,

    pub idle_timeout: Duration,
    pub tool_grace: Duration,
    pub tick_interval: Duration,

    pub log: LogConfig,

    pub agent_bin: PathBuf,
    pub model: Option<String>,
    pub workspace: Option<String>,
    pub force: bool,
    pub extra_args: Vec<String>,
    /// Pre-seeded session id from `--resume`; empty on a fresh session.
    pub resume: Option<String>,

    pub prompt_after_hang: Option<String>,
    pub max_hang_retries: u32,
    pub positional_prompt: Option<String>,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Self {
        let output_format = cli.output_format.unwrap_or(if cli.print {
            OutputFormat::StreamJson
        } else {
            OutputFormat::Text
        });

        let console_level = match cli.log_level.as_deref() {
            Some(level) => parse_level(level),
            None if cli.print => Level::INFO,
            None => Level::WARN,
        };

        Self {
            print: cli.print,
            output_format,
            idle_timeout: cli.idle_timeout,
            tool_grace: cli.tool_grace,
            tick_interval: cli.tick_interval,
            log: LogConfig {
                dir: cli.log_dir.unwrap_or_else(default_log_dir),
                console_level,
                file_level: Level::DEBUG,
            },
            agent_bin: cli.agent_bin,
            model: cli.model,
            workspace: cli.workspace,
            force: cli.force,
            extra_args: cli.extra_args,
            resume: cli.resume.filter(|id| !id.is_empty()),
            prompt_after_hang: cli.prompt_after_hang,
            max_hang_retries: cli.max_hang_retries,
            positional_prompt: cli.prompt,
        }
    }

    /// Builds the spawn request for one turn. Session resumption is layered
    /// on by the session loop.
    pub fn agent_request(&self, prompt: &str) -> AgentRequest {
        let mut request = AgentRequest::new(&self.agent_bin, prompt)
            .force(self.force)
            .extra_args(self.extra_args.iter().cloned());
        if let Some(model) = self.model.as_deref() {
            request = request.model(model);
        }
        if let Some(workspace) = self.workspace.as_deref() {
            request = request.workspace(workspace);
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn config_from(args: &[&str]) -> Config {
        Config::from_cli(Cli::parse_from(args))
    }

    #[test]
    fn print_mode_defaults_to_stream_json_and_info() {
        let cfg = config_from(&["cursor-wrap", "-p", "hi"]);
        assert_eq!(cfg.output_format, OutputFormat::StreamJson);
        assert_eq!(cfg.log.console_level, Level::INFO);
        assert_eq!(cfg.log.file_level, Level::DEBUG);
    }

    #[test]
    fn interactive_mode_defaults_to_text_and_warn() {
        let cfg = config_from(&["cursor-wrap"]);
        assert_eq!(cfg.output_format, OutputFormat::Text);
        assert_eq!(cfg.log.console_level, Level::WARN);
    }

    #[test]
    fn explicit_flags_beat_mode_defaults() {
        let cfg = config_from(&[
            "cursor-wrap",
            "-p",
            "--output-format",
            "text",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cfg.output_format, OutputFormat::Text);
        assert_eq!(cfg.log.console_level, Level::DEBUG);
    }

    #[test]
    fn agent_request_carries_the_process_flags() {
        let cfg = config_from(&[
            "cursor-wrap",
            "--agent-bin",
            "/opt/agent",
            "--model",
            "gpt-test",
            "--workspace",
            "/tmp/ws",
            "do it",
            "--",
            "--x1",
        ]);
        let argv = cfg.agent_request("do it").argv();
        assert_eq!(
            argv,
            [
                "--print",
                "--output-format",
                "stream-json",
                "--force",
                "--model",
                "gpt-test",
                "--workspace",
                "/tmp/ws",
                "--x1",
            ]
        );
        assert_eq!(cfg.positional_prompt.as_deref(), Some("do it"));
    }

    #[test]
    fn max_hang_retries_defaults_to_three() {
        let cfg = config_from(&["cursor-wrap"]);
        assert_eq!(cfg.max_hang_retries, 3);

        let cfg = config_from(&["cursor-wrap", "--max-hang-retries", "10"]);
        assert_eq!(cfg.max_hang_retries, 10);
    }

    #[test]
    fn resume_pre_seeds_the_session_id() {
        let cfg = config_from(&["cursor-wrap", "--resume", "sess-1"]);
        assert_eq!(cfg.resume.as_deref(), Some("sess-1"));

        let cfg = config_from(&["cursor-wrap", "--resume", ""]);
        assert_eq!(cfg.resume, None);
    }
}
