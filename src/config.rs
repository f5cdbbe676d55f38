//! Command-line configuration of the harness.

use std::path::PathBuf;

use clap::Parser;

/// Replays recorded games and checks that an external engine generates exactly
/// the legal moves the oracle does, leading to the same positions.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(version = crate::build::CLAP_LONG_VERSION, about)]
pub struct Config {
    /// PGN archive with the games to replay. Files ending in `.gz` are
    /// decompressed on the fly.
    pub archive: PathBuf,
    /// Executable of the engine under test.
    #[arg(long, value_name = "PATH")]
    pub engine: PathBuf,
    /// Argument passed to the engine. Can be repeated.
    #[arg(long = "engine-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub engine_args: Vec<String>,
    /// Number of games at the start of the archive that were already validated
    /// by a previous run.
    #[arg(long, value_name = "GAMES", default_value_t = 0)]
    pub skip: u64,
}
