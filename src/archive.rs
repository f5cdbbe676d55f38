//! Streams recorded games out of a [PGN] archive.
//!
//! Only the mainline is kept: variations are skipped by the reader and
//! comments or annotations are ignored. Games that carry a `FEN` tag start from
//! that position instead of the standard one. Archives compressed with gzip
//! (`.gz`) are decompressed on the fly.
//!
//! [PGN]: https://www.chessprogramming.org/Portable_Game_Notation

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use pgn_reader::{BufferedReader, RawHeader, San, SanPlus, Skip, Visitor};
use shakmaty::fen::{Fen, ParseFenError};
use shakmaty::san::SanError;
use shakmaty::{CastlingMode, Chess, PositionError};
use thiserror::Error;

/// Archive decoding failures. All of them abort the run.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The archive could not be read.
    #[error("failed to read archive: {0}")]
    Io(#[from] io::Error),
    /// The `FEN` tag of a game can not be parsed.
    #[error("game {game}: invalid FEN tag: {source}")]
    InvalidFen {
        /// 1-based index of the game in the archive.
        game: u64,
        /// Parser diagnostics.
        #[source]
        source: ParseFenError,
    },
    /// The `FEN` tag of a game describes an illegal position.
    #[error("game {game}: illegal starting position: {source}")]
    IllegalPosition {
        /// 1-based index of the game in the archive.
        game: u64,
        /// Validation diagnostics.
        #[source]
        source: Box<PositionError<Chess>>,
    },
    /// A recorded move is not legal in the position it was played in.
    #[error("game {game}: illegal move {san} at ply {ply}: {source}")]
    IllegalMove {
        /// 1-based index of the game in the archive.
        game: u64,
        /// 1-based index of the move within the game.
        ply: usize,
        /// The move as it was recorded.
        san: String,
        /// Resolution diagnostics.
        #[source]
        source: SanError,
    },
}

/// Mainline of a single recorded game.
#[derive(Clone, Debug)]
pub struct GameRecord {
    /// 1-based index of the game in the archive.
    pub index: u64,
    /// Position the game starts from.
    pub start: Chess,
    /// Recorded moves in [Standard Algebraic Notation]. They are resolved
    /// against the running position during replay.
    ///
    /// [Standard Algebraic Notation]: https://www.chessprogramming.org/Algebraic_Chess_Notation#SAN
    pub moves: Vec<San>,
}

/// Collects the mainline of one game.
#[derive(Default)]
struct Mainline {
    index: u64,
    start: Option<Result<Chess, ArchiveError>>,
    moves: Vec<San>,
}

impl Visitor for Mainline {
    type Result = Result<GameRecord, ArchiveError>;

    fn begin_game(&mut self) {
        self.start = None;
        self.moves.clear();
    }

    fn header(&mut self, key: &[u8], value: RawHeader<'_>) {
        if key != b"FEN" {
            return;
        }
        let game = self.index;
        self.start = Some(
            Fen::from_ascii(value.as_bytes())
                .map_err(|source| ArchiveError::InvalidFen { game, source })
                .and_then(|fen| {
                    fen.into_position(CastlingMode::Standard).map_err(|source| {
                        ArchiveError::IllegalPosition {
                            game,
                            source: Box::new(source),
                        }
                    })
                }),
        );
    }

    fn san(&mut self, san_plus: SanPlus) {
        self.moves.push(san_plus.san);
    }

    fn begin_variation(&mut self) -> Skip {
        // Stay in the mainline.
        Skip(true)
    }

    fn end_game(&mut self) -> Self::Result {
        Ok(GameRecord {
            index: self.index,
            start: self.start.take().transpose()?.unwrap_or_default(),
            moves: std::mem::take(&mut self.moves),
        })
    }
}

/// Reads games one by one. Nothing is buffered beyond the game being decoded,
/// so archives of arbitrary size can be streamed.
pub struct ArchiveReader<R: Read> {
    name: String,
    reader: BufferedReader<R>,
    mainline: Mainline,
}

impl ArchiveReader<Box<dyn Read>> {
    /// Opens an archive on disk. Files ending in `.gz` are decompressed.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Io`] if the file can not be opened.
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path)?;
        let inner: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "gz") {
            Box::new(MultiGzDecoder::new(file))
        } else {
            Box::new(file)
        };
        Ok(Self::named(path.display().to_string(), inner))
    }
}

impl<R: Read> ArchiveReader<R> {
    /// Reads games from an arbitrary stream.
    pub fn new(inner: R) -> Self {
        Self::named("<stream>".to_string(), inner)
    }

    /// Reads games from a stream that is referred to as `name` in messages.
    pub fn named(name: String, inner: R) -> Self {
        Self {
            name,
            reader: BufferedReader::new(inner),
            mainline: Mainline::default(),
        }
    }

    /// Name of the archive: the path it was opened from, if any.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decodes the next game. Returns `None` once the archive is exhausted.
    ///
    /// # Errors
    ///
    /// Fails if the archive can not be read or the game has an invalid starting
    /// position.
    pub fn read_game(&mut self) -> Result<Option<GameRecord>, ArchiveError> {
        self.mainline.index += 1;
        match self.reader.read_game(&mut self.mainline)? {
            Some(game) => game.map(Some),
            None => {
                self.mainline.index -= 1;
                Ok(None)
            },
        }
    }

    /// Advances past the next game without decoding its moves. Returns `false`
    /// once the archive is exhausted.
    ///
    /// # Errors
    ///
    /// Fails if the archive can not be read.
    pub fn skip_game(&mut self) -> Result<bool, ArchiveError> {
        let skipped = self.reader.skip_game::<Mainline>()?;
        if skipped {
            self.mainline.index += 1;
        }
        Ok(skipped)
    }
}
