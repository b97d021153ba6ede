//! The interactive session loop: prompt resolution, turn sequencing, and
//! session resumption.

use std::{
    io::{self, BufRead, IsTerminal, Read, Write},
    sync::Arc,
};

use cursor_agent::CursorAgentError;
use thiserror::Error;
use tokio::task;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    format::Formatter,
    logger::{attr, LogSession},
    monitor::Reason,
    turn::{run_turn, TurnOutcome},
};

#[derive(Debug, Error)]
pub enum WrapError {
    #[error("hang detected: {0}")]
    HangDetected(Reason),
    #[error("cursor-agent exited (code {0}) without emitting a result event")]
    AbnormalExit(i32),
    #[error("event reader failed")]
    ReaderFailure,
    #[error("interrupted")]
    Cancelled,
    #[error(transparent)]
    Agent(#[from] CursorAgentError),
    #[error("reading prompt: {0}")]
    Prompt(io::Error),
    #[error("no prompt provided (use a positional argument or pipe stdin)")]
    MissingPrompt,
}

impl WrapError {
    /// Stable, user-visible exit codes: 2 for hangs, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            WrapError::HangDetected(_) => 2,
            _ => 1,
        }
    }
}

/// Where prompts come from between turns. Wraps stdin in production; tests
/// substitute an in-memory reader.
pub struct PromptSource {
    reader: Box<dyn BufRead + Send>,
    tty: bool,
}

impl PromptSource {
    pub fn stdin() -> Self {
        let tty = io::stdin().is_terminal();
        Self {
            reader: Box::new(io::BufReader::new(io::stdin())),
            tty,
        }
    }

    pub fn from_reader(reader: impl BufRead + Send + 'static, tty: bool) -> Self {
        Self {
            reader: Box::new(reader),
            tty,
        }
    }

    fn is_tty(&self) -> bool {
        self.tty
    }

    /// Reads the rest of the input as one prompt (pipe mode).
    fn read_all(&mut self) -> io::Result<String> {
        let mut data = String::new();
        self.reader.read_to_string(&mut data)?;
        Ok(data)
    }

    /// Reads the next non-empty line, skipping blanks. Returns `None` on
    /// clean end-of-input. On a TTY, writes a prompt indicator to stderr
    /// first.
    fn next_prompt(&mut self) -> io::Result<Option<String>> {
        loop {
            if self.tty {
                eprint!("> ");
                let _ = io::stderr().flush();
            }
            let mut line = String::new();
            let n = self.reader.read_line(&mut line)?;
            let prompt = line.trim();
            if !prompt.is_empty() {
                return Ok(Some(prompt.to_string()));
            }
            if n == 0 {
                return Ok(None);
            }
            // Blank line: skip and read again.
        }
    }
}

/// Drives zero or more turns in sequence, reading prompts between turns in
/// interactive mode.
pub async fn run(
    cfg: &Config,
    mut prompts: PromptSource,
    fmtr: &mut dyn Formatter,
    log: &Arc<LogSession>,
    cancel: &CancellationToken,
) -> Result<(), WrapError> {
    let mut prompt = task::block_in_place(|| first_prompt(cfg, &mut prompts))?;

    if cfg.print && cfg.prompt_after_hang.is_some() {
        log.warn("--prompt-after-hang has no effect in -p (print) mode", &[]);
    }

    // Pre-seeded when --resume was passed; otherwise captured from the first
    // turn's system/init event.
    let mut session_id = cfg.resume.clone();
    let mut hang_retries: u32 = 0;

    loop {
        let mut request = cfg.agent_request(&prompt);
        if let Some(id) = session_id.as_deref() {
            request = request.resume(id);
        }

        let result = run_turn(&request, cfg, fmtr, log, cancel).await?;

        if session_id.is_none() {
            if let Some(id) = result.session_id.as_deref() {
                session_id = Some(id.to_string());
                log.info("session started", &[attr("session_id", id)]);
                log.set_session_id(id);
            }
        }

        match result.outcome {
            TurnOutcome::NormalCompletion => {}
            TurnOutcome::HangDetected(reason) => {
                if cfg.print {
                    // Non-interactive: exit on any error.
                    return Err(WrapError::HangDetected(reason));
                }
                // Interactive: only hangs are recoverable.
                if let Err(err) = fmtr.write_hang_indicator(&reason) {
                    log.warn(
                        "hang indicator write error",
                        &[attr("error", err.to_string())],
                    );
                }
                if let Some(recovery) = cfg.prompt_after_hang.clone() {
                    hang_retries += 1;
                    if hang_retries > cfg.max_hang_retries {
                        log.error(
                            "max hang retries exceeded",
                            &[attr("retries", hang_retries)],
                        );
                        return Err(WrapError::HangDetected(reason));
                    }
                    log.info(
                        "using prompt-after-hang",
                        &[attr("prompt", recovery.clone()), attr("retry", hang_retries)],
                    );
                    prompt = recovery;
                    continue;
                }
                log.warn("hang detected, awaiting next prompt", &[]);
            }
            TurnOutcome::AbnormalExit(code) => return Err(WrapError::AbnormalExit(code)),
            TurnOutcome::ReaderFailure => return Err(WrapError::ReaderFailure),
            TurnOutcome::Cancelled => return Err(WrapError::Cancelled),
        }

        if cfg.print {
            break; // single turn in non-interactive mode
        }

        match task::block_in_place(|| prompts.next_prompt()).map_err(WrapError::Prompt)? {
            Some(next) => prompt = next,
            None => break, // clean exit on stdin EOF / Ctrl+D
        }
    }

    Ok(())
}

/// Resolves the initial prompt. Precedence: positional arg, then stdin.
/// In print mode with no positional arg, piped stdin is read to EOF; in
/// interactive mode the first non-empty line is used.
fn first_prompt(cfg: &Config, prompts: &mut PromptSource) -> Result<String, WrapError> {
    if let Some(prompt) = cfg.positional_prompt.as_deref() {
        return Ok(prompt.to_string());
    }

    if cfg.print {
        if prompts.is_tty() {
            return Err(WrapError::MissingPrompt);
        }
        let data = prompts.read_all().map_err(WrapError::Prompt)?;
        let prompt = data.trim().to_string();
        if prompt.is_empty() {
            return Err(WrapError::MissingPrompt);
        }
        return Ok(prompt);
    }

    match prompts.next_prompt().map_err(WrapError::Prompt)? {
        Some(prompt) => Ok(prompt),
        None => Err(WrapError::Prompt(io::ErrorKind::UnexpectedEof.into())),
    }
}
