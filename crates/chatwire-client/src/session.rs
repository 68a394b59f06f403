use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use chatwire_protocol::{Role, Turn};

use crate::consumer::{AssistantMessage, ChatView, StreamConsumer};
use crate::error::ClientError;

const TITLE_MAX_CHARS: usize = 50;

/// Envelope bytes as read from the relay. A read failure is the last item.
pub type EnvelopeStream = mpsc::Receiver<Result<Bytes, ClientError>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub messages: Vec<Turn>,
    #[serde(rename = "modelId")]
    pub model_id: String,
}

/// One row for `POST /api/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub model_used: Option<String>,
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// `Err` when the relay refused the request before streaming.
    async fn open_stream(&self, request: &StreamRequest) -> Result<EnvelopeStream, ClientError>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Returns the new conversation id.
    async fn create_conversation(&self, title: &str) -> Result<String, ClientError>;
    async fn save_messages(&self, messages: Vec<OutgoingMessage>) -> Result<(), ClientError>;
}

/// First 50 characters of the opening message, with `...` when cut.
pub fn conversation_title(first_message: &str) -> String {
    let mut chars = first_message.chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// One conversation as seen by a client: transcript, model choice and the
/// send loop tying transport, consumer and persistence together.
pub struct ChatSession {
    transport: Arc<dyn ChatTransport>,
    /// `None` in guest mode: nothing is persisted.
    store: Option<Arc<dyn ConversationStore>>,
    model_id: Option<String>,
    conversation_id: Option<String>,
    max_message_length: usize,
    transcript: Vec<Turn>,
}

impl ChatSession {
    pub fn new(transport: Arc<dyn ChatTransport>, max_message_length: usize) -> Self {
        Self {
            transport,
            store: None,
            model_id: None,
            conversation_id: None,
            max_message_length,
            transcript: Vec::new(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.select_model(model_id);
        self
    }

    /// Continues an existing conversation.
    pub fn resume(mut self, conversation_id: impl Into<String>, history: Vec<Turn>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self.transcript = history;
        self
    }

    pub fn select_model(&mut self, model_id: impl Into<String>) {
        let model_id = model_id.into();
        self.model_id = (!model_id.trim().is_empty()).then_some(model_id);
    }

    pub fn is_guest(&self) -> bool {
        self.store.is_none()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    /// Input guards. Nothing is sent when these fail.
    pub fn check_input(&self, input: &str) -> Result<String, ClientError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ClientError::EmptyInput);
        }
        if input.chars().count() > self.max_message_length {
            return Err(ClientError::TooLong {
                max: self.max_message_length,
            });
        }
        Ok(input.to_string())
    }

    /// Sends one user message and waits for the reply to settle.
    ///
    /// Only input guards are returned as `Err`. Every other failure settles
    /// the view with an apology message, which is also the returned value.
    pub async fn send(
        &mut self,
        input: &str,
        view: &mut dyn ChatView,
    ) -> Result<AssistantMessage, ClientError> {
        let content = self.check_input(input)?;
        let model_id = self.model_id.clone().ok_or(ClientError::NoModel)?;

        let user_turn = Turn::user(content);
        self.transcript.push(user_turn.clone());
        let request = StreamRequest {
            messages: self.transcript.clone(),
            model_id,
        };

        view.thinking();
        let mut consumer = StreamConsumer::new();
        let reply = match self.transport.open_stream(&request).await {
            Ok(stream) => drain(stream, &mut consumer, view).await,
            Err(err) => consumer.fail(&err.to_string(), view),
        };

        self.transcript.push(Turn::assistant(reply.content.clone()));
        if !reply.is_error {
            self.persist(&user_turn, &reply).await;
        }
        Ok(reply)
    }

    /// Best effort: the reply is already on screen, so failures are logged
    /// and dropped.
    async fn persist(&mut self, user_turn: &Turn, reply: &AssistantMessage) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let conversation_id = match &self.conversation_id {
            Some(id) => id.clone(),
            None => match store
                .create_conversation(&conversation_title(&user_turn.content))
                .await
            {
                Ok(id) => {
                    info!(conversation_id = %id, "conversation created");
                    self.conversation_id = Some(id.clone());
                    id
                }
                Err(err) => {
                    warn!(error = %err, "failed to create conversation");
                    return;
                }
            },
        };

        let rows = vec![
            OutgoingMessage {
                conversation_id: conversation_id.clone(),
                role: Role::User,
                content: user_turn.content.clone(),
                model_used: None,
            },
            OutgoingMessage {
                conversation_id,
                role: Role::Assistant,
                content: reply.content.clone(),
                model_used: reply.model.clone(),
            },
        ];
        if let Err(err) = store.save_messages(rows).await {
            warn!(error = %err, "failed to save conversation");
        }
    }
}

async fn drain(
    mut stream: EnvelopeStream,
    consumer: &mut StreamConsumer,
    view: &mut dyn ChatView,
) -> AssistantMessage {
    while let Some(item) = stream.recv().await {
        match item {
            Ok(chunk) => {
                if let Some(message) = consumer.push(&chunk, view) {
                    return message.clone();
                }
            }
            Err(err) => return consumer.fail(&err.to_string(), view),
        }
    }
    consumer.finish(view)
}
