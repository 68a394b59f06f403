use tracing::debug;

use chatwire_protocol::{LineSplitter, StreamEvent, needs_buffering, sse_data};

const UNEXPECTED_END: &str = "Stream ended unexpectedly";

/// Visible state of one pending reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewPhase {
    Thinking,
    Streaming,
    Settled,
}

/// Assistant message a stream settled into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantMessage {
    pub content: String,
    pub model: Option<String>,
    /// Synthesized apology rather than model output.
    pub is_error: bool,
}

impl AssistantMessage {
    pub fn apology(reason: &str) -> Self {
        Self {
            content: format!("Sorry, I encountered an error: {reason}"),
            model: None,
            is_error: true,
        }
    }
}

/// UI hooks driven by [`StreamConsumer`]. Every reply calls `thinking`
/// once and `settled` once; the rest depends on what arrives.
pub trait ChatView {
    fn thinking(&mut self) {}

    /// First `content` event of the reply.
    fn streaming_started(&mut self) {}

    /// Replaces the in-progress text. `text` is always the full reply so far.
    fn show_partial(&mut self, text: &str);

    fn settled(&mut self, message: &AssistantMessage);
}

/// Reads the relay's `data: {...}` envelope and drives a [`ChatView`].
///
/// Transport reads can split lines, so bytes are buffered per line exactly
/// as on the server side. The displayed text is replaced, never appended,
/// and is held back while its tail looks like a half-written markdown token.
#[derive(Debug)]
pub struct StreamConsumer {
    splitter: LineSplitter,
    text: String,
    phase: ViewPhase,
    settled: Option<AssistantMessage>,
}

impl Default for StreamConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamConsumer {
    pub fn new() -> Self {
        Self {
            splitter: LineSplitter::new(),
            text: String::new(),
            phase: ViewPhase::Thinking,
            settled: None,
        }
    }

    pub fn phase(&self) -> ViewPhase {
        self.phase
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn settlement(&self) -> Option<&AssistantMessage> {
        self.settled.as_ref()
    }

    /// Feeds one transport read. Returns the settled message once a
    /// terminal event has been seen.
    pub fn push(&mut self, chunk: &[u8], view: &mut dyn ChatView) -> Option<&AssistantMessage> {
        if self.settled.is_none() {
            for line in self.splitter.push(chunk) {
                self.handle_line(&line, view);
                if self.settled.is_some() {
                    break;
                }
            }
        }
        self.settled.as_ref()
    }

    /// The transport ended. A stream that closes without `done` or `error`
    /// still settles, as a failure.
    pub fn finish(&mut self, view: &mut dyn ChatView) -> AssistantMessage {
        if self.settled.is_none()
            && let Some(rest) = self.splitter.finish()
        {
            self.handle_line(&rest, view);
        }
        if self.settled.is_none() {
            self.fail(UNEXPECTED_END, view);
        }
        self.settled
            .clone()
            .unwrap_or_else(|| AssistantMessage::apology(UNEXPECTED_END))
    }

    /// Settles with an apology. No-op when already settled.
    pub fn fail(&mut self, reason: &str, view: &mut dyn ChatView) -> AssistantMessage {
        if let Some(message) = &self.settled {
            return message.clone();
        }
        let message = AssistantMessage::apology(reason);
        self.settle(message.clone(), view);
        message
    }

    fn handle_line(&mut self, line: &str, view: &mut dyn ChatView) {
        let Some(data) = sse_data(line) else {
            return;
        };
        let event = match serde_json::from_str::<StreamEvent>(data) {
            Ok(event) => event,
            Err(err) => {
                debug!(error = %err, "skipping undecodable envelope line");
                return;
            }
        };
        match event {
            StreamEvent::Content { content } => {
                if self.phase == ViewPhase::Thinking {
                    self.phase = ViewPhase::Streaming;
                    view.streaming_started();
                }
                self.text = content;
                if !needs_buffering(&self.text) {
                    view.show_partial(&self.text);
                }
            }
            StreamEvent::Done { model } => {
                view.show_partial(&self.text);
                let message = AssistantMessage {
                    content: self.text.clone(),
                    model: Some(model).filter(|m| !m.is_empty()),
                    is_error: false,
                };
                self.settle(message, view);
            }
            StreamEvent::Error { error } => {
                self.fail(&error, view);
            }
        }
    }

    fn settle(&mut self, message: AssistantMessage, view: &mut dyn ChatView) {
        self.phase = ViewPhase::Settled;
        view.settled(&message);
        self.settled = Some(message);
    }
}
