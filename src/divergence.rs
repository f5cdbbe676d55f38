//! Compares the move sets reported by the oracle and the engine.
//!
//! A difference is either in the moves themselves (extra or missing moves) or
//! in the positions that common moves lead to. Move set differences are
//! tolerated once the halfmove clock reaches [`TOLERATED_HALFMOVE_CLOCK`]:
//! around the 75-move rule engines legitimately disagree on whether the game
//! is already over, and the oracle's own adjudication there is ambiguous.

use std::collections::BTreeSet;
use std::fmt;

use itertools::Itertools;
use shakmaty::{Chess, Position};

use crate::oracle::MoveSet;
use crate::position::{canonicalize, CanonicalKey};

/// Halfmove clock (75 full moves without a capture or pawn move) at which the
/// move sets are allowed to differ.
pub const TOLERATED_HALFMOVE_CLOCK: u32 = 150;

/// Classification of a single position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComparisonResult {
    /// Both generators agree.
    Match,
    /// The move sets differ close to the 75-move rule.
    Tolerated,
    /// The engine is wrong.
    Mismatch(MismatchRecord),
}

/// Everything needed to reproduce a divergence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MismatchRecord {
    /// Position in which the generators disagree.
    pub position: CanonicalKey,
    /// What exactly they disagree on.
    pub divergence: Divergence,
}

/// The two ways generators can disagree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Divergence {
    /// The sets of legal moves differ.
    MoveSet {
        /// Moves only the engine reported.
        engine_only: BTreeSet<String>,
        /// Moves only the oracle reported.
        oracle_only: BTreeSet<String>,
        /// All moves reported by the oracle.
        oracle_moves: Vec<String>,
        /// All moves reported by the engine.
        engine_moves: Vec<String>,
    },
    /// Both agree on the moves, but some of them lead to different positions.
    Resulting(Vec<ResultingMismatch>),
}

/// A move both generators reported, with the positions each claims it leads
/// to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultingMismatch {
    /// Move in UCI notation.
    pub uci: String,
    /// Position according to the oracle.
    pub oracle: CanonicalKey,
    /// Position according to the engine.
    pub engine: CanonicalKey,
}

/// Compares the move sets reported for `position`.
#[must_use]
pub fn compare(position: &Chess, oracle: &MoveSet, engine: &MoveSet) -> ComparisonResult {
    if !oracle.keys().eq(engine.keys()) {
        if position.halfmoves() >= TOLERATED_HALFMOVE_CLOCK {
            return ComparisonResult::Tolerated;
        }
        let oracle_moves: BTreeSet<_> = oracle.keys().cloned().collect();
        let engine_moves: BTreeSet<_> = engine.keys().cloned().collect();
        return ComparisonResult::Mismatch(MismatchRecord {
            position: canonicalize(position),
            divergence: Divergence::MoveSet {
                engine_only: &engine_moves - &oracle_moves,
                oracle_only: &oracle_moves - &engine_moves,
                oracle_moves: oracle_moves.into_iter().collect(),
                engine_moves: engine_moves.into_iter().collect(),
            },
        });
    }
    let broken = oracle
        .iter()
        .zip(engine.values())
        .filter(|((_, expected), actual)| expected != actual)
        .map(|((uci, expected), actual)| ResultingMismatch {
            uci: uci.clone(),
            oracle: expected.clone(),
            engine: actual.clone(),
        })
        .collect_vec();
    if broken.is_empty() {
        ComparisonResult::Match
    } else {
        ComparisonResult::Mismatch(MismatchRecord {
            position: canonicalize(position),
            divergence: Divergence::Resulting(broken),
        })
    }
}

const SEPARATOR: &str = "--------------------------";

#[allow(single_use_lifetimes)] // Eliding the lifetime in `impl Trait` is unstable.
fn braced<'a>(moves: impl IntoIterator<Item = &'a String>) -> String {
    format!("{{{}}}", moves.into_iter().join(", "))
}

impl fmt::Display for MismatchRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{SEPARATOR}")?;
        match &self.divergence {
            Divergence::MoveSet {
                engine_only,
                oracle_only,
                oracle_moves,
                engine_moves,
            } => {
                writeln!(f, "Different move set!")?;
                writeln!(f, "Invalid engine moves:")?;
                writeln!(f, "{}", braced(engine_only))?;
                writeln!(f, "Missing engine moves:")?;
                writeln!(f, "{}", braced(oracle_only))?;
                writeln!(f, "board: '{}'", self.position)?;
                writeln!(f, "oracle: {}", braced(oracle_moves))?;
                writeln!(f, "engine: {}", braced(engine_moves))?;
            },
            Divergence::Resulting(broken) => {
                writeln!(f, "board: '{}'", self.position)?;
                for mismatch in broken {
                    writeln!(f, "move: {}", mismatch.uci)?;
                    writeln!(f, "oracle: {}", mismatch.oracle)?;
                    writeln!(f, "engine: {}", mismatch.engine)?;
                    writeln!(f)?;
                }
            },
        }
        writeln!(f, "{SEPARATOR}")
    }
}
