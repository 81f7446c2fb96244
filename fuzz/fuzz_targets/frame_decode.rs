//! Fuzz target for FrameDecoder
//!
//! Feeds arbitrary bytes to a stream decoder in arbitrary chunk sizes.
//!
//! # Invariants
//!
//! - Decoding never panics; bad input is a structured error
//! - A partial frame is never an error, only `Ok(None)`
//! - Every decoded frame re-encodes to exactly the bytes it consumed

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parley_proto::{FrameDecoder, Framing};

#[derive(Debug, Arbitrary)]
struct Input {
    framing: Option<bool>,
    chunk: u8,
    data: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let mut decoder = match input.framing {
        None => FrameDecoder::new(),
        Some(false) => FrameDecoder::with_framing(Framing::Chat),
        Some(true) => FrameDecoder::with_framing(Framing::Monitor),
    };

    let chunk = usize::from(input.chunk.max(1));
    let mut consumed = 0usize;

    'feed: for piece in input.data.chunks(chunk) {
        decoder.extend(piece);
        loop {
            match decoder.next_frame() {
                Ok(Some(frame)) => {
                    let bytes = frame.to_bytes().expect("decoded frame must re-encode");
                    let end = consumed + bytes.len();
                    assert_eq!(&input.data[consumed..end], &bytes[..], "re-encode mismatch");
                    consumed = end;
                },
                Ok(None) => break,
                Err(_) => break 'feed,
            }
        }
    }
});
