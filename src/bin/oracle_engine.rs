//! Engine that answers every request with the oracle's own move set. Faults can
//! be injected to check that the harness catches them.

use std::io;

use clap::Parser;
use movegen_diff::engine::loopback::{Faults, LoopbackEngine};

/// Speaks the harness protocol on standard streams, backed by the oracle.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Config {
    #[command(flatten)]
    faults: Faults,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let config = Config::parse();
    log::debug!("Injected faults: {:?}", config.faults);
    LoopbackEngine::new(config.faults).serve(&mut io::stdin().lock(), &mut io::stdout().lock())
}
