//! Rendering of container log output.
//!
//! Engines hand back either labelled stdout/stderr chunks or the raw
//! multiplexed stream, where every frame starts with an 8-byte header:
//! stream byte (0 stdin, 1 stdout, 2 stderr), three zero bytes, then the
//! big-endian payload length.

use crate::engine::{LogChunk, LogStream};

const FRAME_HEADER_LEN: usize = 8;

/// Whether `data` starts with a multiplexing frame header.
pub fn looks_framed(data: &[u8]) -> bool {
    data.len() >= FRAME_HEADER_LEN && data[0] <= 2 && data[1..4] == [0, 0, 0]
}

/// Strip frame headers and concatenate the payloads.
///
/// A truncated final frame contributes whatever payload bytes are present.
pub fn demux(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut rest = data;
    while looks_framed(rest) {
        let len = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        let payload = &rest[FRAME_HEADER_LEN..];
        let take = len.min(payload.len());
        out.extend_from_slice(&payload[..take]);
        rest = &payload[take..];
    }
    // trailing bytes that are not a frame are kept verbatim
    out.extend_from_slice(rest);
    out
}

/// Drop lines identical to the line before them.
pub fn dedupe_consecutive(text: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = Vec::new();
    for line in text.lines() {
        if lines.last() != Some(&line) {
            lines.push(line);
        }
    }
    lines
}

/// Flatten log chunks into readable text.
pub fn render(chunks: &[LogChunk]) -> String {
    let mut bytes = Vec::new();
    for chunk in chunks {
        if chunk.stream == LogStream::Console && looks_framed(&chunk.data) {
            bytes.extend(demux(&chunk.data));
        } else {
            bytes.extend_from_slice(&chunk.data);
        }
    }
    let text = String::from_utf8_lossy(&bytes);
    dedupe_consecutive(&text).join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(stream: u8, payload: &str) -> Vec<u8> {
        let mut out = vec![stream, 0, 0, 0];
        out.extend_from_slice(&u32::try_from(payload.len()).unwrap().to_be_bytes());
        out.extend_from_slice(payload.as_bytes());
        out
    }

    #[test]
    fn demux_strips_headers() {
        let mut raw = frame(1, "hello\n");
        raw.extend(frame(2, "oops\n"));
        assert_eq!(demux(&raw), b"hello\noops\n");
    }

    #[test]
    fn demux_tolerates_truncated_frame() {
        let mut raw = frame(1, "complete\n");
        raw.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 50]);
        raw.extend_from_slice(b"partial");
        assert_eq!(demux(&raw), b"complete\npartial");
    }

    #[test]
    fn plain_text_is_not_framed() {
        assert!(!looks_framed(b"wine: starting\n"));
        assert!(!looks_framed(&[1, 0, 0]));
    }

    #[test]
    fn render_dedupes_repeated_lines() {
        let chunks = vec![
            LogChunk::new(LogStream::Stdout, "fixme:d3d\nfixme:d3d\nready\n"),
            LogChunk::new(LogStream::Console, frame(1, "fixme:d3d\nready\n")),
        ];
        assert_eq!(render(&chunks), "fixme:d3d\nready\nfixme:d3d\nready");
    }

    #[test]
    fn render_empty() {
        assert_eq!(render(&[]), "");
    }
}
