use std::time::Instant;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use chatwire_protocol::openai::chat_completions::ChatCompletionChunk;
use chatwire_protocol::{LineSplitter, StreamEvent, needs_buffering, sse_data};

use crate::error::RelayError;
use crate::upstream_client::ByteStream;

const DONE_SENTINEL: &str = "[DONE]";
const DOWNSTREAM_CHANNEL_CAPACITY: usize = 32;

/// Why a provider line produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Blank line, `:` comment, `event:` or any other non-`data:` line.
    NotData,
    /// `data: [DONE]`. End of stream is decided by the byte source, not this.
    Sentinel,
    Empty,
    /// Payload did not parse. Tolerated, never aborts the stream.
    Malformed,
    /// Parsed, but carries no text (role announcement, usage trailer, ...).
    NoDelta,
}

/// Result of interpreting one complete provider line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Delta(String),
    /// Text that arrived together with a finish reason.
    LastDelta(String),
    Finished,
    Skip(SkipReason),
    Abort(String),
}

pub fn classify_line(line: &str) -> LineOutcome {
    let Some(data) = sse_data(line) else {
        return LineOutcome::Skip(SkipReason::NotData);
    };
    if data.is_empty() {
        return LineOutcome::Skip(SkipReason::Empty);
    }
    if data == DONE_SENTINEL {
        return LineOutcome::Skip(SkipReason::Sentinel);
    }

    let chunk = match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => chunk,
        Err(_) => return LineOutcome::Skip(SkipReason::Malformed),
    };
    if let Some(error) = chunk.error {
        return LineOutcome::Abort(
            error
                .message
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| RelayError::StreamAborted(String::new()).to_string()),
        );
    }
    match (chunk.delta_text(), chunk.finish_reason().is_some()) {
        (Some(text), false) => LineOutcome::Delta(text.to_string()),
        (Some(text), true) => LineOutcome::LastDelta(text.to_string()),
        (None, true) => LineOutcome::Finished,
        (None, false) => LineOutcome::Skip(SkipReason::NoDelta),
    }
}

/// Full reply text of one stream plus how much of it the client has seen.
#[derive(Debug, Default, Clone)]
pub struct BufferState {
    text: String,
    emitted_len: usize,
}

impl BufferState {
    /// Appends a delta. Returns the full text when its tail is safe to show.
    pub fn append(&mut self, delta: &str) -> Option<String> {
        self.text.push_str(delta);
        if needs_buffering(&self.text) {
            return None;
        }
        self.emitted_len = self.text.len();
        Some(self.text.clone())
    }

    /// Releases a withheld tail, if any.
    pub fn flush(&mut self) -> Option<String> {
        if self.text.len() == self.emitted_len {
            return None;
        }
        self.emitted_len = self.text.len();
        Some(self.text.clone())
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn has_withheld(&self) -> bool {
        self.text.len() > self.emitted_len
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Open,
    Streaming,
    Done,
    Errored,
}

impl StreamPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamPhase::Done | StreamPhase::Errored)
    }
}

/// Turns provider SSE bytes into [`StreamEvent`]s for one stream.
///
/// Pure and synchronous: the caller feeds it bytes with [`Reframer::push`]
/// and reports the end of the source with [`Reframer::finish`] or
/// [`Reframer::fail`]. Exactly one terminal event is ever produced, and
/// nothing follows it.
#[derive(Debug)]
pub struct Reframer {
    splitter: LineSplitter,
    buffer: BufferState,
    model_label: String,
    phase: StreamPhase,
}

impl Reframer {
    pub fn new(model_label: impl Into<String>) -> Self {
        Self {
            splitter: LineSplitter::new(),
            buffer: BufferState::default(),
            model_label: model_label.into(),
            phase: StreamPhase::Open,
        }
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn text(&self) -> &str {
        self.buffer.text()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        if self.is_terminal() {
            return out;
        }
        for line in self.splitter.push(chunk) {
            self.handle_line(&line, &mut out);
            if self.is_terminal() {
                break;
            }
        }
        out
    }

    /// Clean end of the byte source.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        if self.is_terminal() {
            return out;
        }
        if let Some(rest) = self.splitter.finish() {
            self.handle_line(&rest, &mut out);
            if self.is_terminal() {
                return out;
            }
        }
        if let Some(text) = self.buffer.flush() {
            out.push(StreamEvent::content(text));
        }
        self.phase = StreamPhase::Done;
        out.push(StreamEvent::done(self.model_label.clone()));
        out
    }

    /// Aborts the stream. `None` once a terminal event was already produced.
    pub fn fail(&mut self, message: impl Into<String>) -> Option<StreamEvent> {
        if self.is_terminal() {
            return None;
        }
        self.phase = StreamPhase::Errored;
        Some(StreamEvent::error(message))
    }

    fn handle_delta(&mut self, text: &str, out: &mut Vec<StreamEvent>) {
        self.phase = StreamPhase::Streaming;
        if let Some(full) = self.buffer.append(text) {
            out.push(StreamEvent::content(full));
        }
    }

    fn handle_line(&mut self, line: &str, out: &mut Vec<StreamEvent>) {
        match classify_line(line) {
            LineOutcome::Delta(text) | LineOutcome::LastDelta(text) => {
                self.handle_delta(&text, out)
            }
            // Only ends this payload. The byte source decides when the
            // stream is over.
            LineOutcome::Finished => {}
            LineOutcome::Skip(reason) => {
                if reason == SkipReason::Malformed {
                    debug!(line = %truncate(line, 200), "skipping malformed upstream line");
                }
            }
            LineOutcome::Abort(message) => {
                warn!(error = %message, "upstream reported an error mid-stream");
                out.extend(self.fail(message));
            }
        }
    }
}

/// Drives a [`Reframer`] over an upstream byte source on its own task.
///
/// Returns encoded `data: <json>\n\n` frames. Dropping the receiver stops
/// the task, which drops `source` and with it the upstream connection.
pub fn spawn_reframe(
    source: ByteStream,
    model_label: String,
    trace_id: String,
) -> mpsc::Receiver<Bytes> {
    let (tx, rx) = mpsc::channel::<Bytes>(DOWNSTREAM_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let mut source = source;
        let mut reframer = Reframer::new(model_label);
        let started = Instant::now();

        loop {
            let next = tokio::select! {
                next = source.recv() => next,
                _ = tx.closed() => {
                    info!(
                        event = "downstream_disconnected",
                        trace_id = %trace_id,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "client went away; releasing upstream"
                    );
                    return;
                }
            };

            let events = match next {
                Some(Ok(chunk)) => reframer.push(&chunk),
                Some(Err(failure)) => {
                    warn!(
                        trace_id = %trace_id,
                        kind = ?failure.kind,
                        error = %failure.message,
                        "upstream stream failed"
                    );
                    reframer
                        .fail(RelayError::StreamAborted(failure.message).to_string())
                        .into_iter()
                        .collect()
                }
                None => reframer.finish(),
            };

            for event in events {
                if tx.send(event.to_sse_bytes()).await.is_err() {
                    return;
                }
            }
            if reframer.is_terminal() {
                break;
            }
        }

        info!(
            event = "stream_finished",
            trace_id = %trace_id,
            phase = ?reframer.phase(),
            chars = reframer.text().chars().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
        );
    });
    rx
}

/// A downstream stream holding a single event, for failures that happen
/// after the client was promised `text/event-stream`.
pub fn single_event_stream(event: StreamEvent) -> mpsc::Receiver<Bytes> {
    let (tx, rx) = mpsc::channel::<Bytes>(1);
    // Capacity 1 and a fresh channel: this cannot fail.
    let _ = tx.try_send(event.to_sse_bytes());
    rx
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_lines() {
        assert_eq!(
            classify_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#),
            LineOutcome::Delta("Hi".into())
        );
        assert_eq!(
            classify_line(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#),
            LineOutcome::Finished
        );
        assert_eq!(
            classify_line(r#"data: {"choices":[{"delta":{"content":"!"},"finish_reason":"stop"}]}"#),
            LineOutcome::LastDelta("!".into())
        );
        assert_eq!(
            classify_line("data: [DONE]"),
            LineOutcome::Skip(SkipReason::Sentinel)
        );
        assert_eq!(
            classify_line("data: not-json"),
            LineOutcome::Skip(SkipReason::Malformed)
        );
        assert_eq!(
            classify_line(": OPENROUTER PROCESSING"),
            LineOutcome::Skip(SkipReason::NotData)
        );
        assert_eq!(
            classify_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            LineOutcome::Skip(SkipReason::NoDelta)
        );
        assert_eq!(
            classify_line(r#"data: {"error":{"message":"overloaded"}}"#),
            LineOutcome::Abort("overloaded".into())
        );
    }

    #[test]
    fn buffer_withholds_and_flushes() {
        let mut buffer = BufferState::default();
        assert_eq!(buffer.append("Hi "), Some("Hi ".into()));
        assert_eq!(buffer.append("**"), None);
        assert!(buffer.has_withheld());
        assert_eq!(buffer.flush(), Some("Hi **".into()));
        assert_eq!(buffer.flush(), None);
    }

    #[test]
    fn fail_after_done_is_ignored() {
        let mut reframer = Reframer::new("X");
        assert_eq!(reframer.finish(), vec![StreamEvent::done("X")]);
        assert_eq!(reframer.fail("late"), None);
        assert!(reframer.push(b"data: {}\n").is_empty());
        assert_eq!(reframer.phase(), StreamPhase::Done);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("h\u{e9}llo", 2), "h\u{e9}");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
