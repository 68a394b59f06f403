use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chatwire_client::{
    AssistantMessage, ChatSession, ChatTransport, ChatView, ClientError, ConversationStore,
    EnvelopeStream, OutgoingMessage, StreamRequest,
};
use chatwire_protocol::Role;
use tokio::sync::mpsc;

struct CannedTransport {
    frames: Vec<&'static str>,
    refuse: Option<ClientError>,
    requests: Mutex<Vec<StreamRequest>>,
}

impl CannedTransport {
    fn replying(frames: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            frames,
            refuse: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn refusing(err: ClientError) -> Arc<Self> {
        Arc::new(Self {
            frames: Vec::new(),
            refuse: Some(err),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChatTransport for CannedTransport {
    async fn open_stream(&self, request: &StreamRequest) -> Result<EnvelopeStream, ClientError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(err) = &self.refuse {
            return Err(err.clone());
        }
        let (tx, rx) = mpsc::channel(self.frames.len().max(1));
        for frame in &self.frames {
            tx.try_send(Ok(Bytes::from_static(frame.as_bytes())))
                .unwrap();
        }
        Ok(rx)
    }
}

#[derive(Default)]
struct MemoryStore {
    fail_saves: bool,
    titles: Mutex<Vec<String>>,
    saved: Mutex<Vec<OutgoingMessage>>,
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_conversation(&self, title: &str) -> Result<String, ClientError> {
        self.titles.lock().unwrap().push(title.to_string());
        Ok("c-1".to_string())
    }

    async fn save_messages(&self, messages: Vec<OutgoingMessage>) -> Result<(), ClientError> {
        if self.fail_saves {
            return Err(ClientError::Http {
                status: 500,
                message: "db down".into(),
            });
        }
        self.saved.lock().unwrap().extend(messages);
        Ok(())
    }
}

#[derive(Default)]
struct Phases {
    thinking: usize,
    settled: Vec<AssistantMessage>,
}

impl ChatView for Phases {
    fn thinking(&mut self) {
        self.thinking += 1;
    }

    fn show_partial(&mut self, _text: &str) {}

    fn settled(&mut self, message: &AssistantMessage) {
        self.settled.push(message.clone());
    }
}

const HELLO: [&str; 3] = [
    "data: {\"type\":\"content\",\"content\":\"Hel\"}\n\n",
    "data: {\"type\":\"content\",\"content\":\"Hello!\"}\n\n",
    "data: {\"type\":\"done\",\"model\":\"X\"}\n\n",
];

#[tokio::test]
async fn reply_is_persisted_as_a_turn_pair() {
    let transport = CannedTransport::replying(HELLO.to_vec());
    let store = Arc::new(MemoryStore::default());
    let mut session = ChatSession::new(transport.clone(), 4000)
        .with_store(store.clone())
        .with_model("m1");
    let mut view = Phases::default();

    let reply = session.send("  Hi  ", &mut view).await.unwrap();
    assert_eq!(reply.content, "Hello!");
    assert_eq!(reply.model.as_deref(), Some("X"));
    assert_eq!(view.thinking, 1);
    assert_eq!(view.settled.len(), 1);

    let request = transport.requests.lock().unwrap()[0].clone();
    assert_eq!(request.model_id, "m1");
    assert_eq!(request.messages.len(), 1);
    assert_eq!(request.messages[0].content, "Hi");

    assert_eq!(*store.titles.lock().unwrap(), vec!["Hi".to_string()]);
    let saved = store.saved.lock().unwrap();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[0].role, Role::User);
    assert_eq!(saved[0].model_used, None);
    assert_eq!(saved[1].role, Role::Assistant);
    assert_eq!(saved[1].content, "Hello!");
    assert_eq!(saved[1].model_used.as_deref(), Some("X"));
    assert_eq!(session.conversation_id(), Some("c-1"));
    assert_eq!(session.transcript().len(), 2);
}

#[tokio::test]
async fn guest_mode_skips_persistence() {
    let transport = CannedTransport::replying(HELLO.to_vec());
    let mut session = ChatSession::new(transport, 4000).with_model("m1");
    let mut view = Phases::default();
    assert!(session.is_guest());

    let reply = session.send("Hi", &mut view).await.unwrap();
    assert_eq!(reply.content, "Hello!");
    assert_eq!(session.conversation_id(), None);
}

#[tokio::test]
async fn save_failure_is_swallowed() {
    let transport = CannedTransport::replying(HELLO.to_vec());
    let store = Arc::new(MemoryStore {
        fail_saves: true,
        ..MemoryStore::default()
    });
    let mut session = ChatSession::new(transport, 4000)
        .with_store(store)
        .with_model("m1");
    let mut view = Phases::default();

    let reply = session.send("Hi", &mut view).await.unwrap();
    assert!(!reply.is_error);
    assert_eq!(session.transcript().len(), 2);
}

#[tokio::test]
async fn input_guards_reject_before_sending() {
    let transport = CannedTransport::replying(HELLO.to_vec());
    let mut session = ChatSession::new(transport.clone(), 5);
    let mut view = Phases::default();

    assert_eq!(
        session.send("   ", &mut view).await,
        Err(ClientError::EmptyInput)
    );
    assert_eq!(
        session.send("Hi", &mut view).await,
        Err(ClientError::NoModel)
    );
    session.select_model("m1");
    assert_eq!(
        session.send("too long", &mut view).await,
        Err(ClientError::TooLong { max: 5 })
    );

    assert!(transport.requests.lock().unwrap().is_empty());
    assert!(
        session
            .send("", &mut view)
            .await
            .is_err_and(|err| err.is_input_guard())
    );
    assert_eq!(view.thinking, 0);
    assert!(session.transcript().is_empty());
}

#[tokio::test]
async fn refused_request_settles_with_apology() {
    let transport = CannedTransport::refusing(ClientError::Http {
        status: 404,
        message: "Model not found or inactive".into(),
    });
    let store = Arc::new(MemoryStore::default());
    let mut session = ChatSession::new(transport, 4000)
        .with_store(store.clone())
        .with_model("m1");
    let mut view = Phases::default();

    let reply = session.send("Hi", &mut view).await.unwrap();
    assert!(reply.is_error);
    assert_eq!(
        reply.content,
        "Sorry, I encountered an error: Model not found or inactive"
    );
    assert_eq!(view.settled.len(), 1);
    assert!(store.saved.lock().unwrap().is_empty());
}

#[tokio::test]
async fn follow_up_sends_full_history_to_same_conversation() {
    let store = Arc::new(MemoryStore::default());
    let transport = CannedTransport::replying(HELLO.to_vec());
    let mut session = ChatSession::new(transport.clone(), 4000)
        .with_store(store.clone())
        .with_model("m1");
    let mut view = Phases::default();

    session.send("Hi", &mut view).await.unwrap();
    session.send("Again", &mut view).await.unwrap();

    let requests = transport.requests.lock().unwrap();
    assert_eq!(requests[1].messages.len(), 3);
    assert_eq!(store.titles.lock().unwrap().len(), 1);
    assert_eq!(store.saved.lock().unwrap().len(), 4);
}
