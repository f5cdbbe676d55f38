//! The trusted side of the comparison: enumerates legal moves with [shakmaty]
//! and records the canonical position each of them leads to.
//!
//! [shakmaty]: https://docs.rs/shakmaty

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use shakmaty::{CastlingMode, Chess, Move, Position};
use thiserror::Error;

use crate::position::{canonicalize, CanonicalKey};

/// Moves in [UCI notation] mapped to the canonical positions they result in.
/// Ordered so that reports list moves deterministically.
///
/// [UCI notation]: https://www.chessprogramming.org/Algebraic_Chess_Notation#UCI
pub type MoveSet = BTreeMap<String, CanonicalKey>;

/// Violations of invariants the oracle library is trusted to uphold.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The same move notation was produced twice for a single position.
    #[error("oracle produced move {uci} twice in position '{position}'")]
    DuplicateMove {
        /// Offending move.
        uci: String,
        /// Position it was generated in.
        position: CanonicalKey,
    },
    /// A key could not be decoded back into a legal position.
    #[error("'{key}' is not a valid position: {reason}")]
    InvalidKey {
        /// Key as it was received.
        key: String,
        /// Decoder diagnostics.
        reason: String,
    },
}

/// Returns the UCI notation of a move in standard (non-960) castling mode,
/// e.g. `e1g1` for white short castling.
#[must_use]
pub fn uci(m: &Move) -> String {
    m.to_uci(CastlingMode::Standard).to_string()
}

/// Enumerates all legal moves in `position`. Each move is played on a scratch
/// copy, so the running position is never mutated.
///
/// # Errors
///
/// Returns [`OracleError::DuplicateMove`] if shakmaty generates the same
/// notation twice.
pub fn enumerate(position: &Chess) -> Result<MoveSet, OracleError> {
    let mut moves = MoveSet::new();
    for m in &position.legal_moves() {
        let mut scratch = position.clone();
        scratch.play_unchecked(m);
        match moves.entry(uci(m)) {
            Entry::Vacant(entry) => {
                let _ = entry.insert(canonicalize(&scratch));
            },
            Entry::Occupied(entry) => {
                return Err(OracleError::DuplicateMove {
                    uci: entry.key().clone(),
                    position: canonicalize(position),
                })
            },
        }
    }
    Ok(moves)
}
