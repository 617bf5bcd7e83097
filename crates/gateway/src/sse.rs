//! Server-Sent Events decoding for upstream streams.
//!
//! Frames are `data: <json>`-prefixed lines separated by blank lines; a
//! carry buffer handles frames split across TCP chunk boundaries.

use serde_json::Value;

/// One decoded SSE frame.
#[derive(Clone, Debug, PartialEq)]
pub struct SseFrame {
    /// The `event:` name, when the upstream sends named events.
    pub event: Option<String>,
    /// The `data:` payload, joined across continuation lines.
    pub data: String,
}

impl SseFrame {
    /// Parse the payload as JSON, if it is JSON.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.data).ok()
    }
}

/// Incremental SSE decoder with a carry buffer.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    pending_event: Option<String>,
    pending_data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return any frames completed by this chunk.
    ///
    /// A frame is complete at the first empty line after at least one
    /// `data:` line. `data: [DONE]` terminators are dropped. Comment lines
    /// (leading `:`) and unknown fields are ignored per the SSE grammar.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(frame) = self.take_pending() {
                    frames.push(frame);
                }
                continue;
            }

            if line.starts_with(':') {
                continue;
            }

            if let Some(name) = field_value(line, "event") {
                self.pending_event = Some(name.to_string());
            } else if let Some(data) = field_value(line, "data") {
                if data == "[DONE]" {
                    self.pending_event = None;
                    self.pending_data.clear();
                } else {
                    self.pending_data.push(data.to_string());
                }
            }
        }

        frames
    }

    /// Emit any frame left unterminated at end of stream.
    pub fn flush(&mut self) -> Option<SseFrame> {
        // Trailing bytes without a final newline still count as a data line.
        let remainder = std::mem::take(&mut self.buffer);
        let remainder = remainder.trim();
        if let Some(data) = field_value(remainder, "data") {
            if data != "[DONE]" {
                self.pending_data.push(data.to_string());
            }
        }
        self.take_pending()
    }

    fn take_pending(&mut self) -> Option<SseFrame> {
        if self.pending_data.is_empty() {
            self.pending_event = None;
            return None;
        }
        let frame = SseFrame {
            event: self.pending_event.take(),
            data: self.pending_data.join("\n"),
        };
        self.pending_data.clear();
        Some(frame)
    }
}

fn field_value<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(field)?;
    let rest = rest.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_decode() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.decode(b"data: {\"delta\":\"Hello\"}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].json().unwrap()["delta"], "Hello");
        assert_eq!(frames[0].event, None);
    }

    #[test]
    fn test_named_event() {
        let mut decoder = SseDecoder::new();
        let frames =
            decoder.decode(b"event: COMPLETE\ndata: {\"status\":\"COMPLETED\"}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("COMPLETE"));
        assert_eq!(frames[0].json().unwrap()["status"], "COMPLETED");
    }

    #[test]
    fn test_done_terminator_dropped() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.decode(b"data: {\"x\":1}\n\ndata: [DONE]\n\n");
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.decode(b"data: {\"cho").is_empty());
        let frames = decoder.decode(b"ice\":\"Hi\"}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].json().unwrap()["choice"], "Hi");
    }

    #[test]
    fn test_multi_line_data_joined() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.decode(b"data: line one\ndata: line two\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "line one\nline two");
    }

    #[test]
    fn test_comments_and_keepalives_ignored() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.decode(b": keep-alive\n\n\ndata: {\"x\":1}\n\n");
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.decode(b"data: {\"x\":1}\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].json().unwrap()["x"], 1);
    }

    #[test]
    fn test_flush_emits_unterminated_frame() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.decode(b"data: {\"x\":1}").is_empty());
        let frame = decoder.flush().unwrap();
        assert_eq!(frame.json().unwrap()["x"], 1);
    }

    #[test]
    fn test_multiple_frames_one_chunk() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.decode(b"data: {\"a\":1}\n\ndata: {\"a\":2}\n\ndata: {\"a\":3}\n\n");
        assert_eq!(frames.len(), 3);
    }
}
