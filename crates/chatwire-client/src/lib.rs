//! Client side of the chat relay: reads the `content` / `done` / `error`
//! envelope, drives a view through thinking, streaming and settled, and
//! saves finished turns on a best-effort basis.

pub mod consumer;
pub mod error;
pub mod http;
pub mod session;

pub use consumer::{AssistantMessage, ChatView, StreamConsumer, ViewPhase};
pub use error::ClientError;
pub use http::{ClientSettings, HttpBackend, ModelSummary};
pub use session::{
    ChatSession, ChatTransport, ConversationStore, EnvelopeStream, OutgoingMessage,
    StreamRequest, conversation_title,
};
