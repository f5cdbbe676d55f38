//! Differential tester for chess move generators. For more information, see
//! [README].
//!
//! The harness replays recorded games from a PGN archive and, after every
//! move, asks an external engine for the full set of legal moves together with
//! the position each of them leads to. The answer is compared against
//! [shakmaty], which acts as the trusted oracle. The first divergence that can
//! not be explained by the 75-move rule stops the run with a report that is
//! enough to reproduce the bug.
//!
//! [README]: https://github.com/kirillbobyrev/movegen-diff/blob/main/README.md
//! [shakmaty]: https://docs.rs/shakmaty

// Rustdoc lints.
#![warn(
    rustdoc::private_doc_tests,
    rustdoc::missing_crate_level_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::invalid_codeblock_attributes,
    rustdoc::invalid_html_tags,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::bare_urls
)]

pub mod archive;
pub mod config;
pub mod controller;
pub mod divergence;
pub mod engine;
pub mod oracle;
pub mod position;
pub mod replay;

use shadow_rs::shadow;

shadow!(build);

/// Returns the full harness version that can be used to identify how it was
/// built in the first place.
#[must_use]
pub fn version() -> String {
    format!(
        "{} (commit {}, branch {})",
        build::PKG_VERSION,
        build::SHORT_COMMIT,
        build::BRANCH
    )
}

/// Logs the harness version and whether the build is clean on startup.
pub fn log_build_info() {
    log::info!("{} {}", env!("CARGO_PKG_NAME"), version());
    if !shadow_rs::git_clean() {
        log::warn!("Built with uncommitted changes");
    }
}
