use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::debug;
use wreq::{Client, Method};

use chatwire_protocol::Turn;

use crate::error::ClientError;
use crate::session::{
    ChatTransport, ConversationStore, EnvelopeStream, OutgoingMessage, StreamRequest,
};

const FALLBACK_STREAM_ERROR: &str = "Failed to get AI response";

/// Model choice as listed by `GET /api/models`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub provider: Option<String>,
}

/// The parts of `GET /api/settings` a client acts on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSettings {
    #[serde(default)]
    pub site_name: String,
    #[serde(default)]
    pub welcome_message: String,
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    #[serde(default)]
    pub enable_guest_access: bool,
}

fn default_max_message_length() -> usize {
    4000
}

#[derive(Deserialize)]
struct ModelsEnvelope {
    #[serde(default)]
    models: Vec<ModelSummary>,
}

#[derive(Deserialize)]
struct MessagesEnvelope {
    #[serde(default)]
    messages: Vec<Turn>,
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Talks to a chatwire server over HTTP. Serves as both the stream
/// transport and the conversation store.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, ClientError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|err| ClientError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub async fn models(&self) -> Result<Vec<ModelSummary>, ClientError> {
        let envelope: ModelsEnvelope = self.get_json("/api/models").await?;
        Ok(envelope.models)
    }

    pub async fn settings(&self) -> Result<ClientSettings, ClientError> {
        self.get_json("/api/settings").await
    }

    /// Stored turns of a conversation, oldest first.
    pub async fn history(&self, conversation_id: &str) -> Result<Vec<Turn>, ClientError> {
        let envelope: MessagesEnvelope = self
            .get_json(&format!("/api/conversations/{conversation_id}/messages"))
            .await?;
        Ok(envelope.messages)
    }

    fn request(&self, method: Method, path: &str) -> wreq::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = &self.token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let resp = self
            .request(Method::GET, path)
            .send()
            .await
            .map_err(transport)?;
        read_json(resp).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ClientError> {
        let resp = self
            .request(Method::POST, path)
            .header("content-type", "application/json")
            .body(encode(body)?)
            .send()
            .await
            .map_err(transport)?;
        read_json(resp).await
    }
}

#[async_trait]
impl ChatTransport for HttpBackend {
    async fn open_stream(&self, request: &StreamRequest) -> Result<EnvelopeStream, ClientError> {
        let body = serde_json::to_value(request).map_err(|err| ClientError::Decode(err.to_string()))?;
        let resp = self
            .request(Method::POST, "/api/chat/stream")
            .header("content-type", "application/json")
            .header("accept", "text/event-stream")
            .body(encode(&body)?)
            .send()
            .await
            .map_err(transport)?;
        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body = resp.bytes().await.unwrap_or_default();
            return Err(http_error(status, &body, FALLBACK_STREAM_ERROR));
        }

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let mut stream = resp.bytes_stream();
            loop {
                let next = tokio::select! {
                    next = stream.next() => next,
                    _ = tx.closed() => break,
                };
                let item = match next {
                    Some(Ok(chunk)) => Ok(chunk),
                    Some(Err(err)) => Err(transport(err)),
                    None => break,
                };
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
            }
            debug!("relay stream closed");
        });
        Ok(rx)
    }
}

#[async_trait]
impl ConversationStore for HttpBackend {
    async fn create_conversation(&self, title: &str) -> Result<String, ClientError> {
        let created: Created = self
            .post_json("/api/conversations", &serde_json::json!({ "title": title }))
            .await?;
        Ok(created.id)
    }

    async fn save_messages(&self, messages: Vec<OutgoingMessage>) -> Result<(), ClientError> {
        let _: serde_json::Value = self
            .post_json("/api/messages", &serde_json::json!({ "messages": messages }))
            .await?;
        Ok(())
    }
}

fn encode(body: &serde_json::Value) -> Result<Vec<u8>, ClientError> {
    serde_json::to_vec(body).map_err(|err| ClientError::Decode(err.to_string()))
}

fn transport(err: wreq::Error) -> ClientError {
    ClientError::Transport(err.to_string())
}

async fn read_json<T: DeserializeOwned>(resp: wreq::Response) -> Result<T, ClientError> {
    let status = resp.status().as_u16();
    let body = resp.bytes().await.map_err(transport)?;
    if !(200..300).contains(&status) {
        return Err(http_error(status, &body, "Request failed"));
    }
    serde_json::from_slice(&body).map_err(|err| ClientError::Decode(err.to_string()))
}

/// `{"error": "..."}` when the server sent one, the fallback otherwise.
fn http_error(status: u16, body: &Bytes, fallback: &str) -> ClientError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .map(|parsed| parsed.error)
        .ok()
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| fallback.to_string());
    ClientError::Http { status, message }
}
