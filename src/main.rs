use std::io;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use movegen_diff::archive::ArchiveReader;
use movegen_diff::config::Config;
use movegen_diff::controller::{request_stop, Controller, Outcome};
use movegen_diff::engine::EngineProcess;

/// Exit status of a run aborted by a repeated interrupt (128 + SIGINT).
const INTERRUPTED: i32 = 130;

fn run(config: &Config) -> anyhow::Result<Outcome> {
    let cancelled = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancelled);
    ctrlc::set_handler(move || {
        if request_stop(&handler_flag) {
            log::error!("Interrupted again, exiting without waiting for the engine");
            std::process::exit(INTERRUPTED);
        }
        log::warn!(
            "Interrupt received, stopping after the current move (interrupt again to exit \
             immediately)"
        );
    })
    .context("failed to install the interrupt handler")?;

    let archive = ArchiveReader::open(&config.archive)
        .with_context(|| format!("failed to open {}", config.archive.display()))?;
    let engine = EngineProcess::spawn(&config.engine, &config.engine_args)?;

    let mut controller = Controller::new(archive, engine, config.skip, cancelled);
    controller.run(&mut io::stdout().lock())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = Config::parse();
    movegen_diff::log_build_info();
    match run(&config) {
        Ok(outcome) if outcome.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        },
    }
}
