//! Walks the mainline of a recorded game and hands every resulting position to
//! the caller. Correctness is not decided here: the visitor does the
//! comparison and tells the replayer whether to go on.

use std::ops::ControlFlow;

use shakmaty::{Chess, Position};

use crate::archive::{ArchiveError, GameRecord};
use crate::controller::RunState;
use crate::position::pin_fullmoves;

/// Plays every move of `game` from its starting position. After each move the
/// played-moves counter is bumped, the fullmove number is pinned and `visit` is
/// called with the new position. The starting position itself is not visited.
///
/// `interrupted` is polled before every move is applied. Once it returns a
/// reason, the game is abandoned without touching the counters.
///
/// Returns the first [`ControlFlow::Break`] produced by `interrupted` or
/// `visit`, or [`ControlFlow::Continue`] once the game is over.
///
/// # Errors
///
/// Fails with [`ArchiveError::IllegalMove`] if a recorded move is not legal in
/// the replayed position, and propagates any error from `visit`.
pub fn replay<B>(
    game: &GameRecord,
    state: &mut RunState,
    interrupted: impl Fn() -> Option<B>,
    mut visit: impl FnMut(&Chess, &mut RunState) -> anyhow::Result<ControlFlow<B>>,
) -> anyhow::Result<ControlFlow<B>> {
    let mut position = game.start.clone();
    for (ply, san) in game.moves.iter().enumerate() {
        if let Some(reason) = interrupted() {
            return Ok(ControlFlow::Break(reason));
        }
        let m = san
            .to_move(&position)
            .map_err(|source| ArchiveError::IllegalMove {
                game: game.index,
                ply: ply + 1,
                san: san.to_string(),
                source,
            })?;
        state.played_moves += 1;
        position.play_unchecked(&m);
        position = pin_fullmoves(position)?;
        if let ControlFlow::Break(reason) = visit(&position, state)? {
            return Ok(ControlFlow::Break(reason));
        }
    }
    Ok(ControlFlow::Continue(()))
}
