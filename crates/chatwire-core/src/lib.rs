//! Streaming chat relay: resolves a model, calls the provider once, and
//! reframes the provider's SSE into the application's `content` / `done` /
//! `error` envelope.

pub mod auth;
pub mod catalog;
pub mod error;
pub mod reframe;
pub mod relay;
pub mod settings;
pub mod upstream_client;

pub use auth::{AuthContext, AuthError, AuthProvider, StorageAuth, extract_bearer};
pub use catalog::{CatalogEntry, CatalogQuery, filter_catalog, search_models};
pub use chatwire_protocol::needs_buffering;
pub use error::RelayError;
pub use reframe::{
    BufferState, LineOutcome, Reframer, SkipReason, StreamPhase, classify_line,
    single_event_stream, spawn_reframe,
};
pub use relay::{
    ChatEngine, ChatRequest, ChatStream, Completion, ModelCatalog, RegisteredModel,
    ResolvedTarget, build_upstream_request,
};
pub use settings::{CachedSettings, SettingsProvider, SettingsSource, StaticSettings};
pub use upstream_client::{
    ByteStream, UpstreamClient, UpstreamClientConfig, UpstreamFailure, WreqUpstreamClient,
};
