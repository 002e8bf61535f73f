//! Incremental assembler for newline-delimited JSON chat streams.
//!
//! Ollama's `/api/chat` answers with one JSON object per line:
//! ```text
//! {"model":"deepseek-r1:7b","message":{"role":"assistant","content":"Hi"},"done":false}
//! {"model":"deepseek-r1:7b","message":{"role":"assistant","content":" there!"},"done":false}
//! ```
//! Chunks from the transport are cut at arbitrary byte offsets. The assembler
//! buffers bytes until a newline completes a line, pulls `message.content` out of
//! each line, and batches the fragments into incremental updates sized for a UI.

use serde_json::Value;
use tracing::Span;

/// Fragments containing any of these trigger an immediate flush.
pub const FLUSH_PUNCTUATION: [char; 8] = ['.', '?', '!', '。', '？', '！', '，', ','];

pub const DEFAULT_CHAR_THRESHOLD: usize = 5;

type TextCallback = Box<dyn FnMut(&str) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblerConfig {
    /// Accumulated characters that force a flush
    pub char_threshold: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            char_threshold: DEFAULT_CHAR_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    Idle,
    Receiving,
    Finished,
}

pub struct StreamAssembler {
    config: AssemblerConfig,
    span: Span,
    /// Bytes after the last newline seen
    buffer: Vec<u8>,
    /// Text not yet handed to `on_incremental`
    pending: String,
    pending_chars: usize,
    response: String,
    state: AssemblerState,
    on_incremental: Option<TextCallback>,
    on_complete: Option<TextCallback>,
}

impl StreamAssembler {
    /// All log records are emitted inside `span`, which the caller owns.
    pub fn new(config: AssemblerConfig, span: Span) -> Self {
        Self {
            config,
            span,
            buffer: Vec::new(),
            pending: String::new(),
            pending_chars: 0,
            response: String::new(),
            state: AssemblerState::Idle,
            on_incremental: None,
            on_complete: None,
        }
    }

    pub fn on_incremental(&mut self, callback: impl FnMut(&str) + Send + 'static) -> &mut Self {
        self.on_incremental = Some(Box::new(callback));
        self
    }

    pub fn on_complete(&mut self, callback: impl FnMut(&str) + Send + 'static) -> &mut Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    /// Text accumulated since the last flush.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Every fragment received so far in this stream.
    pub fn response(&self) -> &str {
        &self.response
    }

    /// Feed raw bytes from the HTTP response. Complete lines are processed now;
    /// the unterminated tail waits for the next chunk or `finish`.
    pub fn feed(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        self.state = AssemblerState::Receiving;
        self.buffer.extend_from_slice(chunk);

        let Some(last_newline) = self.buffer.iter().rposition(|&b| b == b'\n') else {
            return;
        };
        let complete: Vec<u8> = self.buffer.drain(..=last_newline).collect();
        for line in complete[..last_newline].split(|&b| b == b'\n') {
            self.process_line(line);
        }
    }

    /// Handle one logical line. Malformed lines are logged and skipped.
    pub fn process_line(&mut self, line: &[u8]) {
        let _entered = self.span.clone().entered();

        let text = match std::str::from_utf8(line) {
            Ok(text) => text.trim(),
            Err(e) => {
                tracing::warn!("dropping line with invalid UTF-8 ({} bytes): {}", line.len(), e);
                return;
            }
        };
        if text.is_empty() {
            return;
        }

        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("JSON parse failed ({}): {:?}", e, text);
                return;
            }
        };

        let fragment = value["message"]["content"].as_str().unwrap_or_default();
        if fragment.is_empty() {
            return;
        }

        self.pending.push_str(fragment);
        self.pending_chars += fragment.chars().count();
        self.response.push_str(fragment);

        if self.pending_chars >= self.config.char_threshold
            || fragment.contains(&FLUSH_PUNCTUATION[..])
        {
            self.flush();
        }
    }

    /// End of stream: process the unterminated tail, flush leftovers and report
    /// the full response. Buffers are cleared, so the next `feed` starts a new
    /// stream.
    pub fn finish(&mut self) -> String {
        if !self.buffer.is_empty() {
            let residual = std::mem::take(&mut self.buffer);
            {
                let _entered = self.span.clone().entered();
                tracing::debug!("processing residual buffer: {:?}", String::from_utf8_lossy(&residual));
            }
            self.process_line(&residual);
        }

        if !self.pending.is_empty() {
            self.flush();
        }

        let full = std::mem::take(&mut self.response);
        if let Some(callback) = self.on_complete.as_mut() {
            callback(&full);
        }

        self.clear();
        self.state = AssemblerState::Finished;
        full
    }

    /// Discard in-flight state without notifying anyone.
    pub fn reset(&mut self) {
        self.clear();
        self.state = AssemblerState::Idle;
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.pending.clear();
        self.pending_chars = 0;
        self.response.clear();
    }

    fn flush(&mut self) {
        let text = std::mem::take(&mut self.pending);
        self.pending_chars = 0;
        if let Some(callback) = self.on_incremental.as_mut() {
            callback(&text);
        }
    }
}

impl Default for StreamAssembler {
    fn default() -> Self {
        Self::new(AssemblerConfig::default(), Span::current())
    }
}

impl std::fmt::Debug for StreamAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamAssembler")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("buffered_bytes", &self.buffer.len())
            .field("pending", &self.pending)
            .field("response_len", &self.response.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        flushes: Arc<Mutex<Vec<String>>>,
        completes: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn flushes(&self) -> Vec<String> {
            self.flushes.lock().unwrap().clone()
        }

        fn completes(&self) -> Vec<String> {
            self.completes.lock().unwrap().clone()
        }
    }

    fn assembler(threshold: usize) -> (StreamAssembler, Recorder) {
        let flushes = Arc::new(Mutex::new(Vec::new()));
        let completes = Arc::new(Mutex::new(Vec::new()));
        let mut asm = StreamAssembler::new(
            AssemblerConfig {
                char_threshold: threshold,
            },
            Span::none(),
        );
        let f = flushes.clone();
        let c = completes.clone();
        asm.on_incremental(move |t| f.lock().unwrap().push(t.to_string()))
            .on_complete(move |t| c.lock().unwrap().push(t.to_string()));
        (asm, Recorder { flushes, completes })
    }

    fn line(content: &str) -> String {
        format!("{}\n", serde_json::json!({"message": {"content": content}}))
    }

    #[test]
    fn test_hi_there_example() {
        let (mut asm, rec) = assembler(5);
        asm.feed(b"{\"message\":{\"content\":\"Hi\"}}\n");
        assert!(rec.flushes().is_empty());
        assert_eq!(asm.pending(), "Hi");

        asm.feed(b"{\"message\":{\"content\":\" there!\"}}\n");
        assert_eq!(rec.flushes(), vec!["Hi there!"]);
        assert_eq!(asm.pending(), "");

        assert_eq!(asm.finish(), "Hi there!");
        assert_eq!(rec.flushes(), vec!["Hi there!"]);
        assert_eq!(rec.completes(), vec!["Hi there!"]);
    }

    #[test]
    fn test_short_fragments_flush_once_at_finish() {
        let (mut asm, rec) = assembler(50);
        let body = [line("a"), line("b"), line("c"), line("d")].concat();
        asm.feed(body.as_bytes());
        assert!(rec.flushes().is_empty());

        assert_eq!(asm.finish(), "abcd");
        assert_eq!(rec.flushes(), vec!["abcd"]);
        assert_eq!(rec.completes(), vec!["abcd"]);
    }

    #[test]
    fn test_threshold_counts_characters_not_bytes() {
        let (mut asm, rec) = assembler(5);
        // 4 characters, 12 bytes
        asm.feed(line("你好世界").as_bytes());
        assert!(rec.flushes().is_empty());
        asm.feed(line("啊").as_bytes());
        assert_eq!(rec.flushes(), vec!["你好世界啊"]);
    }

    #[test]
    fn test_punctuation_flushes_before_threshold() {
        let (mut asm, rec) = assembler(100);
        asm.feed(line("ok").as_bytes());
        asm.feed(line("，").as_bytes());
        assert_eq!(rec.flushes(), vec!["ok，"]);
        asm.feed(line("fine?").as_bytes());
        assert_eq!(rec.flushes(), vec!["ok，", "fine?"]);
    }

    #[test]
    fn test_only_fragment_punctuation_triggers() {
        // Punctuation already flushed is not re-checked.
        let (mut asm, rec) = assembler(100);
        asm.feed(line("x").as_bytes());
        asm.feed(line("y").as_bytes());
        assert!(rec.flushes().is_empty());
    }

    #[test]
    fn test_line_split_across_chunks() {
        let (mut asm, rec) = assembler(1);
        let body = line("hello");
        let (a, b) = body.as_bytes().split_at(10);
        asm.feed(a);
        assert!(rec.flushes().is_empty());
        assert_eq!(asm.state(), AssemblerState::Receiving);
        asm.feed(b);
        assert_eq!(rec.flushes(), vec!["hello"]);
    }

    #[test]
    fn test_multibyte_char_split_inside_line_is_reassembled() {
        let (mut asm, rec) = assembler(1);
        let body = line("é");
        let bytes = body.as_bytes();
        let split = body.find('é').unwrap() + 1;
        asm.feed(&bytes[..split]);
        asm.feed(&bytes[split..]);
        assert_eq!(rec.flushes(), vec!["é"]);
    }

    #[test]
    fn test_any_chunking_preserves_text() {
        let fragments = ["The ", "quick", " brown", " fox.", " 你好", "！", " ok", "", "end"];
        let body: String = fragments.iter().map(|f| line(f)).collect();
        let expected: String = fragments.concat();

        for size in 1..=body.len() {
            let (mut asm, rec) = assembler(5);
            for chunk in body.as_bytes().chunks(size) {
                asm.feed(chunk);
            }
            let full = asm.finish();
            assert_eq!(full, expected, "chunk size {size}");
            assert_eq!(rec.flushes().concat(), expected, "chunk size {size}");
        }
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let (mut asm, rec) = assembler(100);
        let body = format!("{}{{not json\n{}", line("left"), line("right"));
        asm.feed(body.as_bytes());
        assert_eq!(asm.finish(), "leftright");
        assert_eq!(rec.flushes(), vec!["leftright"]);
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let (mut asm, _rec) = assembler(100);
        asm.feed(b"\xff\xfe\n");
        asm.feed(line("ok").as_bytes());
        assert_eq!(asm.finish(), "ok");
    }

    #[test]
    fn test_missing_path_is_empty_fragment() {
        let (mut asm, rec) = assembler(1);
        asm.feed(b"{\"done\":true}\n{\"message\":{}}\n{\"message\":\"flat\"}\n[1,2]\n");
        asm.feed(b"{\"message\":{\"content\":42}}\n");
        assert!(rec.flushes().is_empty());
        assert_eq!(asm.finish(), "");
        assert!(rec.flushes().is_empty());
        assert_eq!(rec.completes(), vec![""]);
    }

    #[test]
    fn test_blank_and_crlf_lines() {
        let (mut asm, _rec) = assembler(100);
        let body = format!("\n\r\n   \n{}\r\n", line("x").trim_end());
        asm.feed(body.as_bytes());
        assert_eq!(asm.finish(), "x");
    }

    #[test]
    fn test_unterminated_trailing_line_counts_at_finish() {
        let (mut asm, rec) = assembler(100);
        asm.feed(line("a").as_bytes());
        asm.feed(br#"{"message":{"content":"b"}}"#);
        assert_eq!(asm.response(), "a");
        assert_eq!(asm.finish(), "ab");
        assert_eq!(rec.flushes(), vec!["ab"]);
    }

    #[test]
    fn test_unterminated_garbage_is_ignored_at_finish() {
        let (mut asm, rec) = assembler(100);
        asm.feed(line("a").as_bytes());
        asm.feed(b"{\"message\":{\"con");
        assert_eq!(asm.finish(), "a");
        assert_eq!(rec.completes(), vec!["a"]);
    }

    #[test]
    fn test_empty_chunk_is_noop() {
        let (mut asm, rec) = assembler(1);
        asm.feed(b"");
        assert_eq!(asm.state(), AssemblerState::Idle);
        assert!(rec.flushes().is_empty());
    }

    #[test]
    fn test_finish_resets_for_reuse() {
        let (mut asm, rec) = assembler(100);
        asm.feed(line("first").as_bytes());
        asm.feed(b"{\"message\"");
        asm.finish();
        assert_eq!(asm.state(), AssemblerState::Finished);
        assert_eq!(asm.pending(), "");
        assert_eq!(asm.response(), "");

        asm.feed(line("second").as_bytes());
        assert_eq!(asm.state(), AssemblerState::Receiving);
        assert_eq!(asm.finish(), "second");
        assert_eq!(rec.completes(), vec!["first", "second"]);
    }

    #[test]
    fn test_reset_discards_without_callbacks() {
        let (mut asm, rec) = assembler(100);
        asm.feed(line("abandoned").as_bytes());
        asm.reset();
        assert_eq!(asm.state(), AssemblerState::Idle);
        assert!(rec.flushes().is_empty());
        assert!(rec.completes().is_empty());
        assert_eq!(asm.finish(), "");
    }

    #[test]
    fn test_zero_threshold_flushes_every_fragment() {
        let (mut asm, rec) = assembler(0);
        asm.feed([line("a"), line("b")].concat().as_bytes());
        assert_eq!(rec.flushes(), vec!["a", "b"]);
    }

    #[test]
    fn test_no_callbacks_registered() {
        let mut asm = StreamAssembler::default();
        asm.feed(line("quiet.").as_bytes());
        assert_eq!(asm.finish(), "quiet.");
    }
}
