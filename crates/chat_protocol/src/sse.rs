/// Line prefix carrying one event payload.
pub const DATA_PREFIX: &str = "data:";

/// Incremental decoder turning network chunks into frame payloads.
///
/// A frame is emitted only once its line is terminated by `\n`. Bytes are
/// buffered undecoded so a chunk boundary inside a multi-byte character never
/// corrupts the payload.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to hold no `\n`.
    scanned: usize,
}

impl FrameDecoder {
    /// Feed arbitrary bytes into the decoder and drain complete frames.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();
        let mut line_start = 0;

        while let Some(offset) = self.buffer[self.scanned..]
            .iter()
            .position(|byte| *byte == b'\n')
        {
            let newline = self.scanned + offset;
            let line = String::from_utf8_lossy(&self.buffer[line_start..newline]);
            let line = line.strip_suffix('\r').unwrap_or(&line);

            if let Some(payload) = extract_data_payload(line) {
                frames.push(payload.to_owned());
            }
            line_start = newline + 1;
            self.scanned = line_start;
        }

        self.buffer.drain(..line_start);
        self.scanned = self.buffer.len();
        frames
    }

    /// Decode a complete byte sequence in one shot, discarding any partial tail.
    pub fn decode_all<'a>(chunks: impl IntoIterator<Item = &'a [u8]>) -> Vec<String> {
        let mut decoder = Self::default();
        let mut frames = Vec::new();
        for chunk in chunks {
            frames.extend(decoder.feed(chunk));
        }
        decoder.finish();
        frames
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Ends the stream. An unterminated trailing line is dropped, never emitted;
    /// the number of discarded bytes is returned for diagnostics.
    pub fn finish(self) -> usize {
        if !self.buffer.is_empty() {
            tracing::debug!(
                discarded_bytes = self.buffer.len(),
                "dropping unterminated trailing frame"
            );
        }
        self.buffer.len()
    }
}

fn extract_data_payload(line: &str) -> Option<&str> {
    let value = line.strip_prefix(DATA_PREFIX)?;
    let value = value.strip_prefix(' ').unwrap_or(value);
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::FrameDecoder;

    #[test]
    fn decode_frames_incrementally() {
        let mut decoder = FrameDecoder::default();

        let frames = decoder.feed(b"data: {\"type\":\"token\",\"content\":\"Hi\"}\n\n");
        assert_eq!(frames, vec![r#"{"type":"token","content":"Hi"}"#.to_string()]);
        assert!(decoder.is_empty_buffer());
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let frames = FrameDecoder::decode_all([b"data: {\"type\":\"done\"}\r\n\r\n".as_slice()]);
        assert_eq!(frames, vec![r#"{"type":"done"}"#.to_string()]);
    }

    #[test]
    fn byte_at_a_time_frame_is_scanned_once() {
        let input = format!("data: {{\"type\":\"token\",\"content\":\"{}\"}}\n", "x".repeat(512));
        let mut decoder = FrameDecoder::default();
        let mut frames = Vec::new();
        for byte in input.as_bytes() {
            frames.extend(decoder.feed(std::slice::from_ref(byte)));
            assert_eq!(decoder.scanned, decoder.buffer.len());
        }
        assert_eq!(frames.len(), 1);
        assert!(frames[0].ends_with(&format!("{}\"}}", "x".repeat(512))));
        assert!(decoder.is_empty_buffer());
    }

    #[test]
    fn finish_reports_discarded_tail() {
        let mut decoder = FrameDecoder::default();
        assert!(decoder.feed(b"data: {\"type\":\"tok").is_empty());
        assert_eq!(decoder.finish(), "data: {\"type\":\"tok".len());
    }
}
