//! Wire format shared with the engine under test.
//!
//! Every request is a single line holding a [`CanonicalKey`]. The engine
//! answers with one line per legal move, `<move>\t<resulting key>`, followed by
//! a [`SENTINEL`] line. The framing is the compatibility boundary with existing
//! engines and must stay exactly as it is.

use std::io::Write;

use crate::position::CanonicalKey;

/// Terminates every response.
pub const SENTINEL: &str = "DONE";

/// Separates the move from the resulting position within a response line.
pub const SEPARATOR: char = '\t';

/// A single response line.
#[derive(Debug, PartialEq, Eq)]
pub enum Response<'a> {
    /// One legal move and the position it results in.
    Move {
        /// Move notation.
        uci: &'a str,
        /// Resulting canonical position.
        key: &'a str,
    },
    /// End of the response.
    Done,
}

/// Parses a response line with its line terminator already stripped. Returns
/// `None` if the line is neither the sentinel nor a separated pair.
#[must_use]
pub fn parse_response(line: &str) -> Option<Response<'_>> {
    if line == SENTINEL {
        return Some(Response::Done);
    }
    let (uci, key) = line.split_once(SEPARATOR)?;
    Some(Response::Move { uci, key })
}

/// Removes the trailing `\n` (and `\r`, if the engine writes CRLF).
#[must_use]
pub fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Writes a request line. The caller is responsible for flushing.
///
/// # Errors
///
/// Propagates I/O errors from the output stream.
pub fn write_request(output: &mut impl Write, key: &CanonicalKey) -> std::io::Result<()> {
    writeln!(output, "{key}")
}

/// Writes a single move line of a response.
///
/// # Errors
///
/// Propagates I/O errors from the output stream.
pub fn write_move(output: &mut impl Write, uci: &str, key: &CanonicalKey) -> std::io::Result<()> {
    writeln!(output, "{uci}{SEPARATOR}{key}")
}

/// Writes the sentinel that terminates a response.
///
/// # Errors
///
/// Propagates I/O errors from the output stream.
pub fn write_done(output: &mut impl Write) -> std::io::Result<()> {
    writeln!(output, "{SENTINEL}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sentinel() {
        assert_eq!(parse_response("DONE"), Some(Response::Done));
        // Only the exact sentinel terminates the response.
        assert_eq!(parse_response("DONE "), None);
        assert_eq!(parse_response("done"), None);
    }

    #[test]
    fn parse_move() {
        assert_eq!(
            parse_response("e2e4\trnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1"),
            Some(Response::Move {
                uci: "e2e4",
                key: "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1",
            })
        );
    }

    #[test]
    fn parse_malformed() {
        assert_eq!(parse_response(""), None);
        assert_eq!(parse_response("e2e4 rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR"), None);
    }

    #[test]
    fn line_endings() {
        assert_eq!(strip_line_ending("DONE\n"), "DONE");
        assert_eq!(strip_line_ending("DONE\r\n"), "DONE");
        assert_eq!(strip_line_ending("DONE"), "DONE");
    }

    #[test]
    fn write_response() {
        let mut output = Vec::new();
        let key = CanonicalKey::from_wire("8/8/8/8/8/8/8/K1k5 b - - 0 1");
        write_move(&mut output, "a1a2", &key).expect("writing to memory");
        write_done(&mut output).expect("writing to memory");
        assert_eq!(
            String::from_utf8(output).expect("UTF-8"),
            "a1a2\t8/8/8/8/8/8/8/K1k5 b - - 0 1\nDONE\n"
        );
    }
}
