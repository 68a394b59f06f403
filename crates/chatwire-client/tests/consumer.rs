use chatwire_client::{AssistantMessage, ChatView, StreamConsumer, ViewPhase};

#[derive(Debug, Default)]
struct Recorder {
    log: Vec<String>,
}

impl ChatView for Recorder {
    fn thinking(&mut self) {
        self.log.push("thinking".into());
    }

    fn streaming_started(&mut self) {
        self.log.push("streaming".into());
    }

    fn show_partial(&mut self, text: &str) {
        self.log.push(format!("show:{text}"));
    }

    fn settled(&mut self, message: &AssistantMessage) {
        self.log.push(format!("settled:{}", message.content));
    }
}

fn content(text: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({ "type": "content", "content": text })
    )
}

#[test]
fn replaces_text_and_settles_on_done() {
    let mut view = Recorder::default();
    let mut consumer = StreamConsumer::new();
    assert_eq!(consumer.phase(), ViewPhase::Thinking);

    consumer.push(content("Hel").as_bytes(), &mut view);
    assert_eq!(consumer.phase(), ViewPhase::Streaming);
    consumer.push(content("Hello!").as_bytes(), &mut view);
    let settled = consumer
        .push(b"data: {\"type\":\"done\",\"model\":\"X\"}\n\n", &mut view)
        .cloned()
        .unwrap();

    assert_eq!(
        settled,
        AssistantMessage {
            content: "Hello!".into(),
            model: Some("X".into()),
            is_error: false,
        }
    );
    assert_eq!(
        view.log,
        vec![
            "streaming",
            "show:Hel",
            "show:Hello!",
            "show:Hello!",
            "settled:Hello!"
        ]
    );
}

#[test]
fn streaming_transition_happens_once() {
    let mut view = Recorder::default();
    let mut consumer = StreamConsumer::new();
    for text in ["a", "ab", "abc"] {
        consumer.push(content(text).as_bytes(), &mut view);
    }
    assert_eq!(view.log.iter().filter(|e| *e == "streaming").count(), 1);
}

#[test]
fn buffered_tail_is_not_shown_until_safe() {
    let mut view = Recorder::default();
    let mut consumer = StreamConsumer::new();
    consumer.push(content("Hello **").as_bytes(), &mut view);
    assert!(!view.log.iter().any(|e| e.starts_with("show:")));
    assert_eq!(consumer.text(), "Hello **");

    consumer.push(content("Hello **world**!").as_bytes(), &mut view);
    assert_eq!(view.log.last().map(String::as_str), Some("show:Hello **world**!"));
}

#[test]
fn envelope_split_across_reads() {
    let mut view = Recorder::default();
    let mut consumer = StreamConsumer::new();
    let frame = content("split");
    let (a, b) = frame.split_at(12);
    consumer.push(a.as_bytes(), &mut view);
    assert!(view.log.is_empty());
    consumer.push(b.as_bytes(), &mut view);
    assert_eq!(view.log, vec!["streaming", "show:split"]);
}

#[test]
fn error_event_settles_with_apology() {
    let mut view = Recorder::default();
    let mut consumer = StreamConsumer::new();
    consumer.push(content("partial").as_bytes(), &mut view);
    let settled = consumer
        .push(
            b"data: {\"type\":\"error\",\"error\":\"Stream processing error\"}\n\n",
            &mut view,
        )
        .cloned()
        .unwrap();
    assert!(settled.is_error);
    assert_eq!(
        settled.content,
        "Sorry, I encountered an error: Stream processing error"
    );
    assert_eq!(consumer.phase(), ViewPhase::Settled);
}

#[test]
fn stream_without_terminal_event_still_settles() {
    let mut view = Recorder::default();
    let mut consumer = StreamConsumer::new();
    consumer.push(content("half").as_bytes(), &mut view);
    let settled = consumer.finish(&mut view);
    assert!(settled.is_error);
    assert_eq!(consumer.phase(), ViewPhase::Settled);
    assert_eq!(
        view.log.iter().filter(|e| e.starts_with("settled:")).count(),
        1
    );
}

#[test]
fn malformed_envelope_lines_are_ignored() {
    let mut view = Recorder::default();
    let mut consumer = StreamConsumer::new();
    consumer.push(b"data: {broken\n\n: ping\n\n", &mut view);
    consumer.push(content("ok").as_bytes(), &mut view);
    consumer.push(b"data: {\"type\":\"done\",\"model\":\"X\"}", &mut view);
    let settled = consumer.finish(&mut view);
    assert_eq!(settled.content, "ok");
    assert!(!settled.is_error);
}
