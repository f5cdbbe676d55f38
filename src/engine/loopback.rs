//! Server side of the protocol backed by the oracle itself.
//!
//! A correct engine is indistinguishable from this one, which makes it useful
//! for checking the harness end-to-end. [`Faults`] inject the kinds of bugs
//! the harness has to catch: missing moves, duplicated response lines, wrong
//! resulting positions and an engine that exits halfway through a run.

use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};

use itertools::Itertools;

use crate::engine::{protocol, read_response, MoveGenerator, ProtocolError};
use crate::oracle::{self, MoveSet};
use crate::position::CanonicalKey;

/// Deliberate deviations from the oracle. Each option names moves in UCI
/// notation and only applies to positions where the move is legal.
#[derive(clap::Args, Clone, Debug, Default)]
pub struct Faults {
    /// Leave the move out of the response.
    #[arg(long, value_name = "UCI")]
    pub omit: Vec<String>,
    /// Report the move twice.
    #[arg(long, value_name = "UCI")]
    pub duplicate: Vec<String>,
    /// Report the resulting position with the wrong side to move.
    #[arg(long = "flip-turn", value_name = "UCI")]
    pub flip_turn: Vec<String>,
    /// Stop serving after answering this many requests.
    #[arg(long = "exit-after", value_name = "REQUESTS")]
    pub exit_after: Option<usize>,
}

/// Answers requests with the oracle's move sets, distorted by [`Faults`].
#[derive(Debug, Default)]
pub struct LoopbackEngine {
    omit: BTreeSet<String>,
    duplicate: BTreeSet<String>,
    flip_turn: BTreeSet<String>,
    exit_after: Option<usize>,
    served: usize,
}

impl LoopbackEngine {
    /// Creates an engine with the given faults.
    #[must_use]
    pub fn new(faults: Faults) -> Self {
        Self {
            omit: faults.omit.into_iter().collect(),
            duplicate: faults.duplicate.into_iter().collect(),
            flip_turn: faults.flip_turn.into_iter().collect(),
            exit_after: faults.exit_after,
            served: 0,
        }
    }

    fn is_exhausted(&self) -> bool {
        self.exit_after.is_some_and(|limit| self.served >= limit)
    }

    /// Writes the full response for `position`, including the sentinel.
    ///
    /// # Errors
    ///
    /// Fails if the request is not a valid position. Nothing is written in that
    /// case.
    pub fn respond(&self, position: &CanonicalKey, output: &mut impl Write) -> anyhow::Result<()> {
        let moves = oracle::enumerate(&position.to_position()?)?;
        for (uci, key) in &moves {
            if self.omit.contains(uci) {
                continue;
            }
            let key = if self.flip_turn.contains(uci) {
                flip_turn(key)
            } else {
                key.clone()
            };
            protocol::write_move(output, uci, &key)?;
            if self.duplicate.contains(uci) {
                protocol::write_move(output, uci, &key)?;
            }
        }
        protocol::write_done(output)?;
        Ok(())
    }

    /// Serves requests until `input` is exhausted or the `exit_after` limit is
    /// reached. Every response is flushed before the next request is read.
    ///
    /// # Errors
    ///
    /// Stops at the first request that is not a valid position or when either
    /// stream fails.
    pub fn serve(
        &mut self,
        input: &mut impl BufRead,
        output: &mut impl Write,
    ) -> anyhow::Result<()> {
        let mut line = String::new();
        while !self.is_exhausted() {
            line.clear();
            if input.read_line(&mut line)? == 0 {
                return Ok(());
            }
            let request = CanonicalKey::from_wire(protocol::strip_line_ending(&line));
            self.respond(&request, output)?;
            output.flush()?;
            self.served += 1;
        }
        log::info!("Exiting after {} requests", self.served);
        Ok(())
    }
}

impl MoveGenerator for LoopbackEngine {
    /// Goes through the same response parser as an engine process would. An
    /// invalid request or a reached `exit_after` limit closes the channel,
    /// just like the standalone server exiting would.
    fn generate(&mut self, position: &CanonicalKey) -> Result<MoveSet, ProtocolError> {
        let closed = || ProtocolError::ChannelClosed {
            position: position.clone(),
            moves_read: 0,
        };
        if self.is_exhausted() {
            return Err(closed());
        }
        let mut response = Vec::new();
        if let Err(e) = self.respond(position, &mut response) {
            log::error!("Loopback engine rejected request: {e:#}");
            return Err(closed());
        }
        self.served += 1;
        read_response(&mut io::Cursor::new(response), position)
    }
}

/// Swaps the side to move in a key.
fn flip_turn(key: &CanonicalKey) -> CanonicalKey {
    let flipped = key
        .as_str()
        .split(' ')
        .enumerate()
        .map(|(index, field)| match (index, field) {
            (1, "w") => "b",
            (1, "b") => "w",
            _ => field,
        })
        .join(" ");
    CanonicalKey::from_wire(flipped)
}
