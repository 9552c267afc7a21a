//! Incremental frame extraction over a growing byte buffer.
//!
//! Upstream chunks are appended to a reassembly buffer; complete frames
//! (everything up to and including a blank-line delimiter) are split off the
//! front and handed out verbatim. A scan cursor remembers how far the buffer
//! has already been searched, so each byte is inspected a bounded number of
//! times regardless of how the stream is chunked.

use bytes::{Bytes, BytesMut};

use crate::events::FRAME_DELIMITER;
use crate::types::{Error, Result};

/// Reassembly buffer for one relay session.
#[derive(Debug)]
pub struct Reframer {
    buf: BytesMut,
    /// Offset in `buf` before which no delimiter can start.
    cursor: usize,
    max_frame_bytes: usize,
}

impl Reframer {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            cursor: 0,
            max_frame_bytes,
        }
    }

    /// Append one upstream chunk.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Split off the next complete frame, delimiter included.
    ///
    /// Returns `Ok(None)` once the buffer holds only an unterminated prefix.
    /// Fails when a frame (complete or still accumulating) exceeds the
    /// configured maximum.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        match find_delimiter(&self.buf[self.cursor..]) {
            Some(offset) => {
                let end = self.cursor + offset + FRAME_DELIMITER.len();
                if end > self.max_frame_bytes {
                    return Err(self.oversized(end));
                }
                self.cursor = 0;
                Ok(Some(self.buf.split_to(end).freeze()))
            }
            None => {
                if self.buf.len() > self.max_frame_bytes {
                    return Err(self.oversized(self.buf.len()));
                }
                // A trailing '\n' may be the first half of a delimiter.
                self.cursor = self.buf.len().saturating_sub(FRAME_DELIMITER.len() - 1);
                Ok(None)
            }
        }
    }

    /// Drain the residual once upstream has ended.
    ///
    /// Whitespace-only residuals (stray newlines after the last frame) carry
    /// no event and are dropped.
    pub fn finish(&mut self) -> Option<Bytes> {
        self.cursor = 0;
        let residual = self.buf.split().freeze();
        if residual.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            Some(residual)
        }
    }

    /// Number of bytes awaiting a delimiter.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    fn oversized(&self, len: usize) -> Error {
        Error::stream_read(format!(
            "frame of {} bytes exceeds limit of {} bytes",
            len, self.max_frame_bytes
        ))
    }
}

fn find_delimiter(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(FRAME_DELIMITER.len())
        .position(|window| window == FRAME_DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const LIMIT: usize = 1024 * 1024;

    /// Feed `chunks` through a fresh reframer; returns frames plus the flushed residual.
    fn reframe(chunks: &[&[u8]]) -> Vec<Vec<u8>> {
        let mut reframer = Reframer::new(LIMIT);
        let mut frames = Vec::new();
        for chunk in chunks {
            reframer.push(chunk);
            while let Some(frame) = reframer.next_frame().unwrap() {
                frames.push(frame.to_vec());
            }
        }
        if let Some(residual) = reframer.finish() {
            frames.push(residual.to_vec());
        }
        frames
    }

    #[test]
    fn test_frame_split_across_chunks_is_joined() {
        let frames = reframe(&[
            b"data: {\"type\":\"chunk\",\"partial_content\":\"He",
            b"llo\"}\n\n",
        ]);
        assert_eq!(
            frames,
            vec![b"data: {\"type\":\"chunk\",\"partial_content\":\"Hello\"}\n\n".to_vec()]
        );
    }

    #[test]
    fn test_delimiter_split_across_chunks() {
        let frames = reframe(&[b"data: a\n", b"\ndata: b\n", b"\n"]);
        assert_eq!(frames, vec![b"data: a\n\n".to_vec(), b"data: b\n\n".to_vec()]);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let frames = reframe(&[b"data: 1\n\ndata: 2\n\ndata: 3"]);
        assert_eq!(
            frames,
            vec![
                b"data: 1\n\n".to_vec(),
                b"data: 2\n\n".to_vec(),
                // unterminated residual is flushed, not discarded
                b"data: 3".to_vec(),
            ]
        );
    }

    #[test]
    fn test_residual_is_retained_between_pushes() {
        let mut reframer = Reframer::new(LIMIT);
        reframer.push(b"data: 1\n\ndata: par");
        assert_eq!(&reframer.next_frame().unwrap().unwrap()[..], b"data: 1\n\n");
        assert!(reframer.next_frame().unwrap().is_none());
        assert_eq!(reframer.buffered(), b"data: par".len());

        reframer.push(b"tial\n\n");
        assert_eq!(
            &reframer.next_frame().unwrap().unwrap()[..],
            b"data: partial\n\n"
        );
        assert_eq!(reframer.buffered(), 0);
        assert!(reframer.finish().is_none());
    }

    #[test]
    fn test_whitespace_residual_is_dropped() {
        let mut reframer = Reframer::new(LIMIT);
        reframer.push(b"data: x\n\n\n");
        assert!(reframer.next_frame().unwrap().is_some());
        assert!(reframer.next_frame().unwrap().is_none());
        assert!(reframer.finish().is_none());
    }

    #[test]
    fn test_oversized_frame_is_rejected() {
        let mut reframer = Reframer::new(16);
        reframer.push(b"data: 0123456789abcdef");
        let err = reframer.next_frame().unwrap_err();
        assert!(matches!(err, Error::StreamReadFailure(_)));

        let mut reframer = Reframer::new(16);
        reframer.push(b"data: 0123456789abcdef\n\n");
        assert!(reframer.next_frame().is_err());
    }

    #[test]
    fn test_frame_at_limit_is_accepted() {
        let mut reframer = Reframer::new(9);
        reframer.push(b"data: 1\n\n");
        assert!(reframer.next_frame().unwrap().is_some());
    }

    fn split_at_points(data: &[u8], mut cuts: Vec<usize>) -> Vec<&[u8]> {
        cuts.iter_mut().for_each(|c| *c %= data.len() + 1);
        cuts.sort_unstable();
        cuts.dedup();
        let mut chunks = Vec::new();
        let mut start = 0;
        for cut in cuts {
            chunks.push(&data[start..cut]);
            start = cut;
        }
        chunks.push(&data[start..]);
        chunks
    }

    proptest! {
        #[test]
        fn prop_chunking_does_not_change_frames(
            events in proptest::collection::vec("[a-z \n{}\":]{0,24}", 0..12),
            tail in "[a-z\n]{0,8}",
            cuts in proptest::collection::vec(any::<usize>(), 0..16),
        ) {
            let mut stream = String::new();
            for event in &events {
                stream.push_str("data: ");
                stream.push_str(event);
                stream.push_str("\n\n");
            }
            stream.push_str(&tail);
            let data = stream.as_bytes();

            let whole = reframe(&[data]);
            let chunked = reframe(&split_at_points(data, cuts));
            prop_assert_eq!(&whole, &chunked);

            // Frames concatenate back to the original stream, minus a
            // whitespace-only tail.
            let joined: Vec<u8> = whole.concat();
            prop_assert!(data.starts_with(&joined));
            prop_assert!(data[joined.len()..].iter().all(u8::is_ascii_whitespace));
        }
    }
}
