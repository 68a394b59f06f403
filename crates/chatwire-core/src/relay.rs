use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use chatwire_common::{ProviderKind, SiteSettings};
use chatwire_protocol::openai::chat_completions::{ChatCompletionRequest, ChatCompletionResponse};
use chatwire_protocol::{StreamEvent, Turn};
use chatwire_storage::ChatStorage;

use crate::error::RelayError;
use crate::reframe::{single_event_stream, spawn_reframe};
use crate::settings::SettingsProvider;
use crate::upstream_client::{
    ByteStream, HttpMethod, UpstreamBody, UpstreamClient, UpstreamFailure, UpstreamHttpRequest,
    UpstreamHttpResponse,
};

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 4000;
const LOG_BODY_LIMIT: usize = 512;

/// Inbound body of `/api/chat` and `/api/chat/stream`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<Turn>,
    #[serde(rename = "modelId", default)]
    pub model_id: String,
}

impl ChatRequest {
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.messages.is_empty() {
            return Err(RelayError::validation("Messages are required"));
        }
        if self.model_id.trim().is_empty() {
            return Err(RelayError::validation("Model ID is required"));
        }
        Ok(())
    }
}

/// An active row of the model registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredModel {
    pub id: String,
    /// Display label, reported in `done`.
    pub name: String,
    pub model_id: String,
    pub provider: ProviderKind,
    pub api_key: Option<String>,
}

#[async_trait]
pub trait ModelCatalog: Send + Sync {
    async fn active_model(&self, id: &str) -> Result<Option<RegisteredModel>, RelayError>;
}

#[async_trait]
impl ModelCatalog for ChatStorage {
    async fn active_model(&self, id: &str) -> Result<Option<RegisteredModel>, RelayError> {
        let Some(row) = ChatStorage::active_model(self, id).await? else {
            return Ok(None);
        };
        let provider = ProviderKind::parse(&row.provider).ok_or_else(|| {
            RelayError::configuration(format!("Unknown provider '{}'", row.provider))
        })?;
        Ok(Some(RegisteredModel {
            id: row.id,
            name: row.name,
            model_id: row.model_id,
            provider,
            api_key: row.api_key,
        }))
    }
}

/// Everything needed to call upstream for one request.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub model: RegisteredModel,
    pub credential: String,
}

impl ResolvedTarget {
    /// Model key first, then the site key for the model's provider.
    pub fn resolve(model: RegisteredModel, settings: &SiteSettings) -> Result<Self, RelayError> {
        let own_key = model
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty());
        let credential = match own_key.or_else(|| settings.api_key_for(model.provider)) {
            Some(key) => key.to_string(),
            None => {
                return Err(RelayError::configuration(format!(
                    "{} API key not configured",
                    model.provider.capabilities().label
                )));
            }
        };
        Ok(Self { model, credential })
    }
}

pub fn build_upstream_request(
    target: &ResolvedTarget,
    turns: &[Turn],
    settings: &SiteSettings,
    site_url: &str,
    stream: bool,
) -> Result<UpstreamHttpRequest, RelayError> {
    let provider = target.model.provider;
    let body = ChatCompletionRequest {
        model: provider.native_model_id(&target.model.model_id).to_string(),
        messages: turns.to_vec(),
        temperature: Some(DEFAULT_TEMPERATURE),
        max_tokens: Some(DEFAULT_MAX_TOKENS),
        stream,
    };
    let body = serde_json::to_vec(&body)
        .map_err(|err| RelayError::configuration(format!("encode upstream request: {err}")))?;

    let mut headers = vec![
        (
            "authorization".to_string(),
            format!("Bearer {}", target.credential),
        ),
        ("content-type".to_string(), "application/json".to_string()),
        ("http-referer".to_string(), site_url.to_string()),
        ("x-title".to_string(), settings.site_name.clone()),
    ];
    if stream {
        headers.push(("accept".to_string(), "text/event-stream".to_string()));
    }

    Ok(UpstreamHttpRequest {
        method: HttpMethod::Post,
        url: provider.chat_completions_url(),
        headers,
        body: Some(Bytes::from(body)),
        is_stream: stream,
    })
}

/// Downstream half of a streaming call: SSE frames ready to write out.
#[derive(Debug)]
pub struct ChatStream {
    pub model_label: String,
    pub body: mpsc::Receiver<Bytes>,
}

/// Result of the one-shot call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    pub model: String,
    #[serde(default)]
    pub usage: Option<serde_json::Value>,
}

pub struct ChatEngine {
    client: Arc<dyn UpstreamClient>,
    catalog: Arc<dyn ModelCatalog>,
    settings: Arc<dyn SettingsProvider>,
    site_url: String,
}

impl ChatEngine {
    pub fn new(
        client: Arc<dyn UpstreamClient>,
        catalog: Arc<dyn ModelCatalog>,
        settings: Arc<dyn SettingsProvider>,
        site_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            catalog,
            settings,
            site_url: site_url.into(),
        }
    }

    pub fn settings(&self) -> &Arc<dyn SettingsProvider> {
        &self.settings
    }

    /// Validation and model/credential resolution. No network traffic.
    pub async fn resolve(&self, request: &ChatRequest) -> Result<ResolvedTarget, RelayError> {
        request.validate()?;
        let model = self
            .catalog
            .active_model(request.model_id.trim())
            .await?
            .ok_or(RelayError::ModelNotFound)?;
        ResolvedTarget::resolve(model, &self.settings.get())
    }

    /// Opens the upstream stream and hands back reframed SSE bytes.
    ///
    /// `Err` only for pre-flight failures. Once resolution succeeded the
    /// caller always gets a stream; upstream trouble arrives in it as one
    /// `error` event.
    pub async fn stream(
        &self,
        request: ChatRequest,
        trace_id: &str,
    ) -> Result<ChatStream, RelayError> {
        let target = self.resolve(&request).await?;
        let settings = self.settings.get();
        let upstream_req =
            build_upstream_request(&target, &request.messages, &settings, &self.site_url, true)?;
        let model_label = target.model.name.clone();

        info!(
            event = "upstream_request",
            trace_id = %trace_id,
            provider = %target.model.provider,
            model = %target.model.model_id,
            turns = request.messages.len(),
        );
        let started = Instant::now();
        let outcome = self.client.send(upstream_req).await;

        let body = match outcome {
            Ok(resp) if resp.is_success() => {
                info!(
                    event = "upstream_response",
                    trace_id = %trace_id,
                    status = resp.status,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                );
                spawn_reframe(
                    into_byte_stream(resp.body),
                    model_label.clone(),
                    trace_id.to_string(),
                )
            }
            Ok(resp) => {
                let err = status_error(resp, trace_id);
                single_event_stream(StreamEvent::error(err.to_string()))
            }
            Err(failure) => {
                let err = transport_error(failure, trace_id);
                single_event_stream(StreamEvent::error(err.to_string()))
            }
        };

        Ok(ChatStream { model_label, body })
    }

    /// Non-streaming variant; every failure is an `Err`.
    pub async fn complete(
        &self,
        request: ChatRequest,
        trace_id: &str,
    ) -> Result<Completion, RelayError> {
        let target = self.resolve(&request).await?;
        let settings = self.settings.get();
        let upstream_req =
            build_upstream_request(&target, &request.messages, &settings, &self.site_url, false)?;

        let started = Instant::now();
        let resp = self
            .client
            .send(upstream_req)
            .await
            .map_err(|failure| transport_error(failure, trace_id))?;
        if !resp.is_success() {
            return Err(status_error(resp, trace_id));
        }
        info!(
            event = "upstream_response",
            trace_id = %trace_id,
            status = resp.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
        );

        let UpstreamBody::Bytes(body) = resp.body else {
            return Err(RelayError::EmptyResponse);
        };
        let parsed: ChatCompletionResponse = serde_json::from_slice(&body).map_err(|err| {
            warn!(trace_id = %trace_id, error = %err, "undecodable completion body");
            RelayError::EmptyResponse
        })?;
        if let Some(error) = parsed.error.as_ref() {
            return Err(RelayError::UpstreamUnavailable {
                status: None,
                detail: error.message.clone().unwrap_or_default(),
            });
        }
        let content = parsed
            .first_content()
            .ok_or(RelayError::EmptyResponse)?
            .to_string();

        Ok(Completion {
            content,
            model: target.model.name,
            usage: parsed.usage,
        })
    }
}

fn status_error(resp: UpstreamHttpResponse, trace_id: &str) -> RelayError {
    let detail = match &resp.body {
        UpstreamBody::Bytes(bytes) => truncate_body(bytes),
        UpstreamBody::Stream(_) => String::new(),
    };
    warn!(
        event = "upstream_rejected",
        trace_id = %trace_id,
        status = resp.status,
        body = %detail,
    );
    RelayError::from_upstream_status(resp.status, detail)
}

fn transport_error(failure: UpstreamFailure, trace_id: &str) -> RelayError {
    warn!(
        event = "upstream_unreachable",
        trace_id = %trace_id,
        kind = ?failure.kind,
        error = %failure.message,
    );
    RelayError::UpstreamUnavailable {
        status: None,
        detail: failure.message,
    }
}

fn truncate_body(bytes: &Bytes) -> String {
    let end = bytes.len().min(LOG_BODY_LIMIT);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn into_byte_stream(body: UpstreamBody) -> ByteStream {
    match body {
        UpstreamBody::Stream(rx) => rx,
        UpstreamBody::Bytes(bytes) => {
            let (tx, rx) = mpsc::channel(1);
            let _ = tx.try_send(Ok(bytes));
            rx
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(provider: ProviderKind, api_key: Option<&str>) -> RegisteredModel {
        RegisteredModel {
            id: "m1".into(),
            name: "GPT-4o".into(),
            model_id: "openai/gpt-4o".into(),
            provider,
            api_key: api_key.map(str::to_string),
        }
    }

    #[test]
    fn validation_messages() {
        let empty = ChatRequest::default();
        assert_eq!(
            empty.validate(),
            Err(RelayError::validation("Messages are required"))
        );
        let no_model = ChatRequest {
            messages: vec![Turn::user("Hi")],
            model_id: "  ".into(),
        };
        assert_eq!(
            no_model.validate(),
            Err(RelayError::validation("Model ID is required"))
        );
    }

    #[test]
    fn model_key_wins_over_site_key() {
        let settings = SiteSettings {
            openrouter_api_key: Some("site-key".into()),
            ..SiteSettings::default()
        };
        let target =
            ResolvedTarget::resolve(model(ProviderKind::OpenRouter, Some("own")), &settings)
                .unwrap();
        assert_eq!(target.credential, "own");

        let target =
            ResolvedTarget::resolve(model(ProviderKind::OpenRouter, Some(" ")), &settings)
                .unwrap();
        assert_eq!(target.credential, "site-key");

        let err = ResolvedTarget::resolve(model(ProviderKind::OpenAi, None), &settings)
            .unwrap_err();
        assert_eq!(
            err,
            RelayError::configuration("OpenAI API key not configured")
        );
    }

    #[test]
    fn upstream_request_shape() {
        let settings = SiteSettings::default();
        let target = ResolvedTarget {
            model: model(ProviderKind::OpenAi, None),
            credential: "sk-1".into(),
        };
        let req = build_upstream_request(
            &target,
            &[Turn::user("Hi")],
            &settings,
            "http://localhost:3000",
            true,
        )
        .unwrap();
        assert_eq!(req.url, "https://api.openai.com/v1/chat/completions");
        assert!(req.is_stream);
        assert!(
            req.headers
                .contains(&("authorization".into(), "Bearer sk-1".into()))
        );
        assert!(
            req.headers
                .contains(&("x-title".into(), settings.site_name.clone()))
        );

        let body: serde_json::Value = serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 4000);
        assert_eq!(body["messages"][0]["role"], "user");
    }
}
