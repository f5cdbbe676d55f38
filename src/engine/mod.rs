//! Client side of the line-oriented protocol spoken by the engine under test.
//!
//! The engine is a long-lived process that reads one [`CanonicalKey`] per line
//! from its standard input and answers with every legal move in that position
//! and the position it results in (see [`protocol`] for the exact framing).
//! Communication is strictly sequential: exactly one request is in flight and
//! [`MoveGenerator::generate`] blocks until the response is complete. There are no
//! timeouts and no retries: a broken engine is the bug the harness is looking
//! for, not a transient fault.

use std::collections::btree_map::Entry;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use thiserror::Error;

use crate::oracle::MoveSet;
use crate::position::CanonicalKey;

pub mod loopback;
pub mod protocol;

use protocol::Response;

/// Anything that can report the legal moves of a position together with the
/// positions they lead to.
pub trait MoveGenerator {
    /// Returns all legal moves in `position`.
    ///
    /// # Errors
    ///
    /// Any error is fatal for the run: the generator is either broken or gone.
    fn generate(&mut self, position: &CanonicalKey) -> Result<MoveSet, ProtocolError>;
}

/// Failures of the engine channel. None of them are recoverable.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The engine executable could not be started.
    #[error("failed to start engine {path}: {source}")]
    Spawn {
        /// Executable path.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Reading from or writing to the channel failed.
    #[error("engine channel failed: {0}")]
    Io(#[from] io::Error),
    /// The engine closed its output before terminating the response.
    #[error("engine channel closed after {moves_read} moves in position '{position}'")]
    ChannelClosed {
        /// Position the engine was queried for.
        position: CanonicalKey,
        /// Number of move lines received before the channel closed.
        moves_read: usize,
    },
    /// A response line is neither a move nor the sentinel.
    #[error("malformed engine response {line:?} in position '{position}'")]
    MalformedLine {
        /// Received line without its terminator.
        line: String,
        /// Position the engine was queried for.
        position: CanonicalKey,
    },
    /// The same move was reported twice in a single response, which means the
    /// response framing is broken.
    #[error("engine reported move {uci} twice in position '{position}'")]
    DuplicateMove {
        /// Offending move.
        uci: String,
        /// Position the engine was queried for.
        position: CanonicalKey,
    },
}

/// Reads a single response to the request for `position`, up to and including
/// the sentinel line.
pub(crate) fn read_response(
    input: &mut impl BufRead,
    position: &CanonicalKey,
) -> Result<MoveSet, ProtocolError> {
    let mut moves = MoveSet::new();
    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Err(ProtocolError::ChannelClosed {
                position: position.clone(),
                moves_read: moves.len(),
            });
        }
        match protocol::parse_response(protocol::strip_line_ending(&line)) {
            Some(Response::Done) => return Ok(moves),
            Some(Response::Move { uci, key }) => match moves.entry(uci.to_string()) {
                Entry::Vacant(entry) => {
                    let _ = entry.insert(CanonicalKey::from_wire(key));
                },
                Entry::Occupied(entry) => {
                    return Err(ProtocolError::DuplicateMove {
                        uci: entry.key().clone(),
                        position: position.clone(),
                    })
                },
            },
            None => {
                return Err(ProtocolError::MalformedLine {
                    line: protocol::strip_line_ending(&line).to_string(),
                    position: position.clone(),
                })
            },
        }
    }
}

/// Request/response channel over arbitrary streams. `input` is what the engine
/// writes, `output` is what the engine reads.
pub struct EngineSession<R: BufRead, W: Write> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> EngineSession<R, W> {
    /// Creates a session over already connected streams.
    #[must_use]
    pub const fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> MoveGenerator for EngineSession<R, W> {
    /// Sends `position` and blocks until the full response is read. A write to
    /// an engine that has already exited is reported as
    /// [`ProtocolError::ChannelClosed`].
    fn generate(&mut self, position: &CanonicalKey) -> Result<MoveSet, ProtocolError> {
        let sent = protocol::write_request(&mut self.output, position)
            .and_then(|()| self.output.flush());
        match sent {
            Ok(()) => {},
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                return Err(ProtocolError::ChannelClosed {
                    position: position.clone(),
                    moves_read: 0,
                })
            },
            Err(e) => return Err(e.into()),
        }
        read_response(&mut self.input, position)
    }
}

/// Engine running as a child process, talking over its standard streams. The
/// process is killed and reaped when this is dropped.
pub struct EngineProcess {
    child: Child,
    session: EngineSession<BufReader<ChildStdout>, ChildStdin>,
}

impl EngineProcess {
    /// Starts the engine. On Unix it is placed into its own process group so
    /// that an interrupt from the terminal only reaches the harness, which then
    /// gets a chance to shut down cleanly.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Spawn`] if the executable can not be started.
    pub fn spawn(path: &Path, args: &[String]) -> Result<Self, ProtocolError> {
        let mut command = Command::new(path);
        let _ = command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            let _ = command.process_group(0);
        }
        let mut child = command.spawn().map_err(|source| ProtocolError::Spawn {
            path: path.to_path_buf(),
            source,
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("engine stdin is not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("engine stdout is not piped"))?;
        log::info!("Started engine {} (pid {})", path.display(), child.id());
        Ok(Self {
            child,
            session: EngineSession::new(BufReader::new(stdout), stdin),
        })
    }
}

impl MoveGenerator for EngineProcess {
    fn generate(&mut self, position: &CanonicalKey) -> Result<MoveSet, ProtocolError> {
        self.session.generate(position)
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => log::info!("Engine exited with {status}"),
            Ok(None) => {
                log::debug!("Stopping engine (pid {})", self.child.id());
                if let Err(e) = self.child.kill() {
                    log::warn!("Failed to kill engine: {e}");
                }
                if let Err(e) = self.child.wait() {
                    log::warn!("Failed to reap engine: {e}");
                }
            },
            Err(e) => log::warn!("Failed to query engine status: {e}"),
        }
    }
}
