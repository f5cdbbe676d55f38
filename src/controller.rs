//! Drives a whole run: skips games validated by a previous run, replays the
//! rest and compares both generators after every move.
//!
//! The controller is the only place that decides how a run ends. Components
//! report what they found through return values and [`Controller::run`] turns
//! that into an [`Outcome`], printing the final statistics on every path.
//!
//! Cancellation is cooperative: the flag is only checked between games and
//! before each move is applied, never while the engine is answering a request,
//! because the protocol has no way to abort a request halfway. A cancelled run
//! therefore only counts moves that were compared.

use std::io::{Read, Write};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use shakmaty::{Chess, Position};

use crate::archive::ArchiveReader;
use crate::divergence::{compare, ComparisonResult, MismatchRecord};
use crate::engine::MoveGenerator;
use crate::oracle;
use crate::position::canonicalize;
use crate::replay::replay;

/// Counters of a single run. They are never persisted: resuming is done by
/// passing the number of already validated games as the skip count.
#[derive(Clone, Debug)]
pub struct RunState {
    /// Games read from the archive, including skipped ones.
    pub games: u64,
    /// Games that were validated by a previous run.
    pub skip_games: u64,
    /// Moves replayed from the archive.
    pub played_moves: u64,
    /// Moves reported by the engine.
    pub seen_moves: u64,
    started: Instant,
}

impl RunState {
    /// Creates the state of a run that skips `skip_games` games.
    #[must_use]
    pub fn new(skip_games: u64) -> Self {
        Self {
            games: 0,
            skip_games,
            played_moves: 0,
            seen_moves: 0,
            started: Instant::now(),
        }
    }

    /// Starts measuring time from now. Skipping does not count towards
    /// throughput.
    pub fn restart_clock(&mut self) {
        self.started = Instant::now();
    }

    /// Time since the clock was started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Games validated by this run.
    #[must_use]
    pub const fn compared_games(&self) -> u64 {
        self.games.saturating_sub(self.skip_games)
    }

    /// Replayed moves per second of wall time.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn moves_per_second(&self) -> f64 {
        let seconds = self.elapsed().as_secs_f64();
        if seconds > 0.0 {
            self.played_moves as f64 / seconds
        } else {
            0.0
        }
    }

    /// Writes the final statistics.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from the output stream.
    pub fn report(&self, out: &mut impl Write) -> std::io::Result<()> {
        writeln!(out, "Ran for: {:.3?}", self.elapsed())?;
        writeln!(out, "Ended on game {}", self.games)?;
        writeln!(
            out,
            "Games: {} Played moves: {} Seen moves: {}",
            self.compared_games(),
            self.played_moves,
            self.seen_moves
        )?;
        writeln!(out, "Moves per second: {:.1}", self.moves_per_second())
    }
}

/// How a run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Every game in the archive was validated.
    Exhausted,
    /// The operator interrupted the run.
    Cancelled,
    /// The engine disagrees with the oracle.
    Mismatch(MismatchRecord),
}

impl Outcome {
    /// Whether the run should exit with a success status.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self, Self::Mismatch(_))
    }
}

/// Raises the cancellation flag. Returns `true` if it had already been raised,
/// i.e. the operator asked to stop more than once.
#[must_use]
pub fn request_stop(cancelled: &AtomicBool) -> bool {
    cancelled.swap(true, Ordering::SeqCst)
}

/// Owns the archive, the engine and the run counters.
pub struct Controller<R: Read, G: MoveGenerator> {
    archive: ArchiveReader<R>,
    engine: G,
    cancelled: Arc<AtomicBool>,
    state: RunState,
}

impl<R: Read, G: MoveGenerator> Controller<R, G> {
    /// Creates a controller that skips the first `skip_games` games of the
    /// archive and stops as soon as `cancelled` is set.
    #[must_use]
    pub fn new(
        archive: ArchiveReader<R>,
        engine: G,
        skip_games: u64,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            archive,
            engine,
            cancelled,
            state: RunState::new(skip_games),
        }
    }

    /// Current counters.
    #[must_use]
    pub const fn state(&self) -> &RunState {
        &self.state
    }

    /// Gives the engine back, e.g. to inspect it after the run.
    pub fn into_engine(self) -> G {
        self.engine
    }

    /// Runs until the archive is exhausted, a mismatch is found or the run is
    /// cancelled. The report is written to `out` in every case, including
    /// fatal errors.
    ///
    /// # Errors
    ///
    /// Archive decoding, engine protocol and oracle failures are fatal and
    /// returned after the statistics are written.
    pub fn run(&mut self, out: &mut impl Write) -> anyhow::Result<Outcome> {
        let outcome = self.drive();
        match &outcome {
            Ok(Outcome::Exhausted) => {
                writeln!(out, "Finished archive {}", self.archive.name())?;
                self.state.report(out)?;
            },
            Ok(Outcome::Cancelled) => {
                log::warn!("Interrupted on game {}", self.state.games);
                self.state.report(out)?;
            },
            Ok(Outcome::Mismatch(record)) => {
                self.state.report(out)?;
                write!(out, "{record}")?;
            },
            Err(_) => self.state.report(out)?,
        }
        out.flush()?;
        outcome
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Advances past games validated by a previous run.
    fn skip(&mut self) -> anyhow::Result<ControlFlow<Outcome>> {
        while self.state.games < self.state.skip_games {
            if self.is_cancelled() {
                return Ok(ControlFlow::Break(Outcome::Cancelled));
            }
            if !self.archive.skip_game()? {
                log::warn!(
                    "Archive ended after {} games while skipping {}",
                    self.state.games,
                    self.state.skip_games
                );
                break;
            }
            self.state.games += 1;
        }
        if self.state.skip_games > 0 {
            log::info!("Finished skipping");
        }
        Ok(ControlFlow::Continue(()))
    }

    fn drive(&mut self) -> anyhow::Result<Outcome> {
        if let ControlFlow::Break(outcome) = self.skip()? {
            return Ok(outcome);
        }
        self.state.restart_clock();
        loop {
            if self.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }
            let Some(game) = self.archive.read_game()? else {
                return Ok(Outcome::Exhausted);
            };
            self.state.games += 1;
            log::debug!("Replaying game {} ({} moves)", game.index, game.moves.len());
            let engine = &mut self.engine;
            let cancelled = &self.cancelled;
            let flow = replay(
                &game,
                &mut self.state,
                || cancelled.load(Ordering::SeqCst).then_some(Outcome::Cancelled),
                |position, state| check_position(&mut *engine, position, state),
            )?;
            if let ControlFlow::Break(outcome) = flow {
                return Ok(outcome);
            }
        }
    }
}

/// Queries both generators for `position` and compares their answers.
fn check_position(
    engine: &mut impl MoveGenerator,
    position: &Chess,
    state: &mut RunState,
) -> anyhow::Result<ControlFlow<Outcome>> {
    let engine_moves = engine.generate(&canonicalize(position))?;
    state.seen_moves += engine_moves.len() as u64;
    let oracle_moves = oracle::enumerate(position)?;
    Ok(match compare(position, &oracle_moves, &engine_moves) {
        ComparisonResult::Match => ControlFlow::Continue(()),
        ComparisonResult::Tolerated => {
            log::debug!(
                "Tolerating different move sets at halfmove clock {} in '{}'",
                position.halfmoves(),
                canonicalize(position)
            );
            ControlFlow::Continue(())
        },
        ComparisonResult::Mismatch(record) => ControlFlow::Break(Outcome::Mismatch(record)),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::divergence::Divergence;
    use crate::engine::loopback::{Faults, LoopbackEngine};
    use crate::engine::ProtocolError;
    use crate::oracle::MoveSet;
    use crate::position::CanonicalKey;

    /// Counts requests and optionally raises the cancellation flag after a
    /// number of them.
    struct Counting {
        inner: LoopbackEngine,
        queries: usize,
        cancel_after: Option<(usize, Arc<AtomicBool>)>,
    }

    impl Counting {
        fn new(faults: Faults) -> Self {
            Self {
                inner: LoopbackEngine::new(faults),
                queries: 0,
                cancel_after: None,
            }
        }
    }

    impl MoveGenerator for Counting {
        fn generate(&mut self, position: &CanonicalKey) -> Result<MoveSet, ProtocolError> {
            self.queries += 1;
            if let Some((limit, flag)) = &self.cancel_after {
                if self.queries >= *limit {
                    flag.store(true, Ordering::SeqCst);
                }
            }
            self.inner.generate(position)
        }
    }

    const OPENINGS: &str = "1. e4 e5 2. Nf3 Nc6 3. Bb5 a6 4. Ba4 Nf6 5. O-O Be7 1/2-1/2\n\n\
                            1. d4 d5 2. Nc3 Nc6 3. Bf4 Bf5 4. Qd2 Qd7 5. O-O-O O-O-O *\n\n\
                            1. e4 Nf6 2. e5 d5 3. exd6 exd6 4. d4 *\n\n";

    fn controller(
        pgn: &str,
        engine: Counting,
        skip: u64,
    ) -> Controller<&[u8], Counting> {
        Controller::new(
            ArchiveReader::new(pgn.as_bytes()),
            engine,
            skip,
            Arc::new(AtomicBool::new(false)),
        )
    }

    fn run(controller: &mut Controller<&[u8], Counting>) -> (anyhow::Result<Outcome>, String) {
        let mut out = Vec::new();
        let outcome = controller.run(&mut out);
        (outcome, String::from_utf8(out).expect("UTF-8"))
    }

    fn omit(moves: &[&str]) -> Faults {
        Faults {
            omit: moves.iter().map(ToString::to_string).collect(),
            ..Faults::default()
        }
    }

    #[test]
    fn clean_run() {
        let mut controller = controller(OPENINGS, Counting::new(Faults::default()), 0);
        let (outcome, out) = run(&mut controller);
        assert_eq!(outcome.expect("no errors"), Outcome::Exhausted);
        let state = controller.state();
        assert_eq!(state.games, 3);
        assert_eq!(state.played_moves, 10 + 10 + 7);
        assert!(state.seen_moves > state.played_moves);
        assert!(out.starts_with("Finished archive <stream>\n"));
        assert!(out.contains("Ended on game 3\n"));
        assert!(out.contains("Games: 3 Played moves: 27 Seen moves: "));
        assert_eq!(controller.into_engine().queries, 27);
    }

    #[test]
    fn skip_and_resume() {
        let pgn = "1. e4 e5 *\n\n".repeat(10);
        let mut controller = controller(&pgn, Counting::new(Faults::default()), 5);
        let (outcome, out) = run(&mut controller);
        assert_eq!(outcome.expect("no errors"), Outcome::Exhausted);
        assert_eq!(controller.state().games, 10);
        assert_eq!(controller.state().played_moves, 10);
        assert!(out.contains("Ended on game 10\n"));
        assert!(out.contains("Games: 5 Played moves: 10 "));
        assert_eq!(controller.into_engine().queries, 10);
    }

    #[test]
    fn skipping_more_than_the_archive_holds() {
        let mut controller = controller(OPENINGS, Counting::new(Faults::default()), 10);
        let (outcome, out) = run(&mut controller);
        assert_eq!(outcome.expect("no errors"), Outcome::Exhausted);
        assert!(out.contains("Games: 0 Played moves: 0 Seen moves: 0\n"));
        assert_eq!(controller.into_engine().queries, 0);
    }

    #[test]
    fn missing_move_stops_the_run() {
        // Nf3 is first legal for White after 1. e4 e5.
        let mut controller = controller(OPENINGS, Counting::new(omit(&["g1f3"])), 0);
        let (outcome, out) = run(&mut controller);
        let Outcome::Mismatch(record) = outcome.expect("no errors") else {
            panic!("omitted move must be detected");
        };
        assert_eq!(
            record.position.as_str(),
            "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq e6 0 1"
        );
        match record.divergence {
            Divergence::MoveSet {
                engine_only,
                oracle_only,
                ..
            } => {
                assert!(engine_only.is_empty());
                assert_eq!(oracle_only, BTreeSet::from(["g1f3".to_string()]));
            },
            other => panic!("expected move set divergence, got {other:?}"),
        }
        assert_eq!(controller.state().played_moves, 2);
        assert!(out.contains("Games: 1 Played moves: 2 "));
        assert!(out.contains("Missing engine moves:\n{g1f3}\n"));
        assert!(!out.contains("Finished archive"));
    }

    #[test]
    fn wrong_resulting_position_stops_the_run() {
        let faults = Faults {
            flip_turn: vec!["e1c1".to_string()],
            ..Faults::default()
        };
        let mut controller = controller(OPENINGS, Counting::new(faults), 0);
        let (outcome, out) = run(&mut controller);
        let Outcome::Mismatch(record) = outcome.expect("no errors") else {
            panic!("wrong resulting position must be detected");
        };
        let Divergence::Resulting(broken) = record.divergence else {
            panic!("move sets are identical");
        };
        assert_eq!(broken.len(), 1);
        assert_eq!(broken[0].uci, "e1c1");
        // Long castling becomes legal in the second game after 4... Qd7.
        assert_eq!(controller.state().games, 2);
        assert!(out.contains("move: e1c1\n"));
    }

    #[test]
    fn duplicate_move_is_fatal() {
        let faults = Faults {
            duplicate: vec!["e7e5".to_string()],
            ..Faults::default()
        };
        let mut controller = controller(OPENINGS, Counting::new(faults), 0);
        let (outcome, out) = run(&mut controller);
        let error = outcome.expect_err("duplicate must abort the run");
        assert!(matches!(
            error.downcast_ref::<ProtocolError>(),
            Some(ProtocolError::DuplicateMove { uci, .. }) if uci == "e7e5"
        ));
        assert!(out.contains("Games: 1 Played moves: 1 Seen moves: 0\n"));
    }

    #[test]
    fn illegal_recorded_move_is_fatal() {
        let mut controller = controller("1. e4 e4 *\n\n", Counting::new(Faults::default()), 0);
        let (outcome, out) = run(&mut controller);
        assert!(outcome.is_err());
        assert!(out.contains("Played moves: 1 "));
    }

    #[test]
    fn tolerated_near_the_move_limit() {
        let pgn = |halfmoves: u32| {
            format!("[FEN \"4k3/8/8/8/8/8/8/R3K2R w KQ - {halfmoves} 1\"]\n\n1. Ra2 Kd7 2. Ke2 *\n\n")
        };
        let tolerant_pgn = pgn(149);
        let mut tolerant = controller(&tolerant_pgn, Counting::new(omit(&["e8f8"])), 0);
        let (outcome, _) = run(&mut tolerant);
        assert_eq!(outcome.expect("no errors"), Outcome::Exhausted);
        assert_eq!(tolerant.state().played_moves, 3);

        let strict_pgn = pgn(100);
        let mut strict = controller(&strict_pgn, Counting::new(omit(&["e8f8"])), 0);
        let (outcome, _) = run(&mut strict);
        assert!(matches!(outcome.expect("no errors"), Outcome::Mismatch(_)));
    }

    #[test]
    fn cancelled_before_start() {
        let mut controller = controller(OPENINGS, Counting::new(Faults::default()), 0);
        controller.cancelled.store(true, Ordering::SeqCst);
        let (outcome, out) = run(&mut controller);
        assert_eq!(outcome.expect("no errors"), Outcome::Cancelled);
        assert!(out.contains("Games: 0 Played moves: 0 Seen moves: 0\n"));
        assert_eq!(controller.into_engine().queries, 0);
    }

    #[test]
    fn cancelled_between_moves() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut engine = Counting::new(Faults::default());
        engine.cancel_after = Some((3, Arc::clone(&flag)));
        let mut controller =
            Controller::new(ArchiveReader::new(OPENINGS.as_bytes()), engine, 0, flag);
        let (outcome, out) = run(&mut controller);
        assert_eq!(outcome.expect("no errors"), Outcome::Cancelled);
        // The request in flight is completed, the next move is not played.
        assert_eq!(controller.state().played_moves, 3);
        assert!(out.contains("Played moves: 3 "));
        assert_eq!(controller.into_engine().queries, 3);
    }

    #[test]
    fn repeated_stop_requests() {
        let flag = AtomicBool::new(false);
        assert!(!request_stop(&flag));
        assert!(flag.load(Ordering::SeqCst));
        assert!(request_stop(&flag));
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn outcome_status() {
        assert!(Outcome::Exhausted.is_success());
        assert!(Outcome::Cancelled.is_success());
        assert!(!Outcome::Mismatch(MismatchRecord {
            position: canonicalize(&Chess::default()),
            divergence: Divergence::Resulting(Vec::new()),
        })
        .is_success());
    }
}
