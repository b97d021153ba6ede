use std::{io, sync::Arc};

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

use cursor_wrap::{
    cli::Cli,
    config::Config,
    format::new_formatter,
    logger::{attr, LogSession},
    session::{self, PromptSource},
};

#[tokio::main]
async fn main() {
    let cfg = Config::from_cli(Cli::parse());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cfg.log.console_level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    // Interrupt/termination cancels the whole invocation; the orchestrator
    // kills the agent and unwinds.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
            cancel.cancel();
        });
    }

    let log = Arc::new(LogSession::open(&cfg.log));
    let mut fmtr = new_formatter(cfg.output_format, Box::new(io::stdout()));
    let prompts = PromptSource::stdin();

    if let Err(err) = session::run(&cfg, prompts, fmtr.as_mut(), &log, &cancel).await {
        log.error("fatal", &[attr("error", err.to_string())]);
        std::process::exit(err.exit_code());
    }
}
