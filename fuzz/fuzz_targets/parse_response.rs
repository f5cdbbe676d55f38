#![no_main]
use std::io::Cursor;

use libfuzzer_sys::fuzz_target;
use movegen_diff::engine::{EngineSession, MoveGenerator, ProtocolError};
use movegen_diff::position::CanonicalKey;

fuzz_target!(|data: &[u8]| {
    let key = CanonicalKey::from_wire("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1");
    let mut request = Vec::new();
    let mut session = EngineSession::new(Cursor::new(data), &mut request);
    match session.generate(&key) {
        Ok(moves) => assert!(moves.len() <= data.len()),
        Err(
            ProtocolError::Io(_)
            | ProtocolError::ChannelClosed { .. }
            | ProtocolError::MalformedLine { .. }
            | ProtocolError::DuplicateMove { .. },
        ) => {},
        Err(e) => panic!("unexpected error: {e}"),
    }
});
