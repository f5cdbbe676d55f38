//! Canonical encoding of chess positions.
//!
//! Two generators that replay the same game can disagree on incidental
//! bookkeeping: the oracle counts full moves from the start of the recorded
//! game while an engine that only ever sees single positions starts counting
//! from whatever it was sent. [`CanonicalKey`] is a [Forsyth-Edwards Notation]
//! (FEN) string with the fullmove number pinned to `1`, so that equivalent
//! positions compare equal byte-for-byte. The same string is sent to the engine
//! as a request.
//!
//! The en passant field is always rendered the way the FEN standard prescribes:
//! the target square is present whenever the last move was a double pawn push,
//! regardless of whether any pawn can actually capture. Both sides of the
//! comparison have to agree on this sub-format.
//!
//! [Forsyth-Edwards Notation]: https://www.chessprogramming.org/Forsyth-Edwards_Notation

use std::fmt;
use std::num::NonZeroU32;

use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Position};

use crate::oracle::OracleError;

/// Fullmove number every canonical position is pinned to.
pub const PINNED_FULLMOVES: NonZeroU32 = NonZeroU32::MIN;

/// Normalized FEN of a position. Two positions are considered the same iff
/// their keys are equal.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    /// Wraps a key received over the wire without validating it. Validation
    /// happens by comparison: a malformed key never equals an oracle key.
    #[must_use]
    pub fn from_wire(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as it is sent over the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes the key back into a position.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::InvalidKey`] if the key is not a FEN of a legal
    /// standard chess position.
    pub fn to_position(&self) -> Result<Chess, OracleError> {
        let invalid = |reason: String| OracleError::InvalidKey {
            key: self.0.clone(),
            reason,
        };
        let fen = Fen::from_ascii(self.0.as_bytes()).map_err(|e| invalid(e.to_string()))?;
        fen.into_position(CastlingMode::Standard)
            .map_err(|e| invalid(e.to_string()))
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Produces the canonical key of a position: everything is kept intact except
/// for the fullmove number, which is pinned to [`PINNED_FULLMOVES`].
#[must_use]
pub fn canonicalize(position: &Chess) -> CanonicalKey {
    let mut setup = position.clone().into_setup(EnPassantMode::Always);
    setup.fullmoves = PINNED_FULLMOVES;
    CanonicalKey(Fen::from_setup(setup).to_string())
}

/// Resets the fullmove number of a running position to [`PINNED_FULLMOVES`].
///
/// shakmaty does not expose the counter for mutation, so the position is
/// rebuilt from its setup. Everything else, including the en passant square,
/// survives the round trip.
///
/// # Errors
///
/// Only fails if the position can not be rebuilt from its own setup, which
/// would be a bug in the oracle.
pub fn pin_fullmoves(position: Chess) -> Result<Chess, OracleError> {
    if position.fullmoves() == PINNED_FULLMOVES {
        return Ok(position);
    }
    let mut setup = position.into_setup(EnPassantMode::Always);
    setup.fullmoves = PINNED_FULLMOVES;
    let fen = Fen::from_setup(setup);
    let key = fen.to_string();
    fen.into_position(CastlingMode::Standard)
        .map_err(|e| OracleError::InvalidKey {
            key,
            reason: e.to_string(),
        })
}
