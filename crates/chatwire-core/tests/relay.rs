use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chatwire_common::{ProviderKind, SiteSettings};
use chatwire_core::upstream_client::{
    UpstreamBody, UpstreamFailure, UpstreamHttpRequest, UpstreamHttpResponse,
    UpstreamTransportErrorKind,
};
use chatwire_core::{
    ChatEngine, ChatRequest, ModelCatalog, RegisteredModel, RelayError, StaticSettings,
    UpstreamClient,
};
use chatwire_protocol::{LineSplitter, StreamEvent, Turn, sse_data};
use tokio::sync::mpsc;
use tokio::time::timeout;

enum Script {
    Stream(Vec<&'static str>),
    Status(u16, &'static str),
    Json(&'static str),
    Unreachable,
}

struct ScriptedClient {
    script: Mutex<Option<Script>>,
    seen: Mutex<Vec<UpstreamHttpRequest>>,
}

impl ScriptedClient {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(Some(script)),
            seen: Mutex::new(Vec::new()),
        })
    }
}

impl UpstreamClient for ScriptedClient {
    fn send<'a>(
        &'a self,
        req: UpstreamHttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamFailure>> + Send + 'a>>
    {
        self.seen.lock().unwrap().push(req);
        let script = self.script.lock().unwrap().take().expect("one call per test");
        Box::pin(async move {
            match script {
                Script::Stream(chunks) => {
                    let (tx, rx) = mpsc::channel(chunks.len().max(1));
                    for chunk in chunks {
                        tx.try_send(Ok(Bytes::from_static(chunk.as_bytes()))).unwrap();
                    }
                    Ok(UpstreamHttpResponse {
                        status: 200,
                        headers: Vec::new(),
                        body: UpstreamBody::Stream(rx),
                    })
                }
                Script::Status(status, body) => Ok(UpstreamHttpResponse {
                    status,
                    headers: Vec::new(),
                    body: UpstreamBody::Bytes(Bytes::from_static(body.as_bytes())),
                }),
                Script::Json(body) => Ok(UpstreamHttpResponse {
                    status: 200,
                    headers: Vec::new(),
                    body: UpstreamBody::Bytes(Bytes::from_static(body.as_bytes())),
                }),
                Script::Unreachable => Err(UpstreamFailure::new(
                    UpstreamTransportErrorKind::Connect,
                    "connection refused",
                )),
            }
        })
    }
}

struct OneModel;

#[async_trait]
impl ModelCatalog for OneModel {
    async fn active_model(&self, id: &str) -> Result<Option<RegisteredModel>, RelayError> {
        Ok((id == "m1").then(|| RegisteredModel {
            id: "m1".into(),
            name: "X".into(),
            model_id: "openai/gpt-4o".into(),
            provider: ProviderKind::OpenRouter,
            api_key: None,
        }))
    }
}

fn engine(client: Arc<ScriptedClient>, with_key: bool) -> ChatEngine {
    let settings = SiteSettings {
        openrouter_api_key: with_key.then(|| "or-key".to_string()),
        ..SiteSettings::default()
    };
    ChatEngine::new(
        client,
        Arc::new(OneModel),
        Arc::new(StaticSettings(Arc::new(settings))),
        "http://localhost:3000",
    )
}

fn hi() -> ChatRequest {
    ChatRequest {
        messages: vec![Turn::user("Hi")],
        model_id: "m1".into(),
    }
}

async fn collect(mut rx: mpsc::Receiver<Bytes>) -> Vec<StreamEvent> {
    let mut splitter = LineSplitter::new();
    let mut events = Vec::new();
    while let Some(chunk) = timeout(Duration::from_secs(2), rx.recv()).await.unwrap() {
        for line in splitter.push_bytes(&chunk) {
            if let Some(data) = sse_data(&line) {
                events.push(serde_json::from_str(data).unwrap());
            }
        }
    }
    events
}

#[tokio::test]
async fn end_to_end_hello() {
    let client = ScriptedClient::new(Script::Stream(vec![
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo!\"}}]}\n\n",
    ]));
    let stream = engine(client.clone(), true)
        .stream(hi(), "trace-1")
        .await
        .unwrap();
    assert_eq!(stream.model_label, "X");
    assert_eq!(
        collect(stream.body).await,
        vec![
            StreamEvent::content("Hel"),
            StreamEvent::content("Hello!"),
            StreamEvent::done("X"),
        ]
    );

    let seen = client.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].url, "https://openrouter.ai/api/v1/chat/completions");
    assert!(
        seen[0]
            .headers
            .contains(&("authorization".to_string(), "Bearer or-key".to_string()))
    );
}

#[tokio::test]
async fn pre_flight_failures_never_reach_upstream() {
    let client = ScriptedClient::new(Script::Unreachable);
    let engine_with_key = engine(client.clone(), true);

    let err = engine_with_key
        .stream(ChatRequest::default(), "t")
        .await
        .unwrap_err();
    assert_eq!(err, RelayError::validation("Messages are required"));

    let unknown = ChatRequest {
        model_id: "nope".into(),
        ..hi()
    };
    let err = engine_with_key.stream(unknown, "t").await.unwrap_err();
    assert_eq!(err, RelayError::ModelNotFound);

    let err = engine(client.clone(), false)
        .stream(hi(), "t")
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Configuration(_)));
    assert!(err.is_pre_flight());

    assert!(client.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn upstream_status_becomes_single_error_event() {
    for (status, message) in [
        (401, "Invalid API key"),
        (429, "Rate limit exceeded"),
        (500, "AI service temporarily unavailable"),
    ] {
        let client = ScriptedClient::new(Script::Status(status, "{\"error\":{}}"));
        let stream = engine(client, true).stream(hi(), "t").await.unwrap();
        assert_eq!(collect(stream.body).await, vec![StreamEvent::error(message)]);
    }
}

#[tokio::test]
async fn connection_failure_becomes_error_event() {
    let client = ScriptedClient::new(Script::Unreachable);
    let stream = engine(client, true).stream(hi(), "t").await.unwrap();
    assert_eq!(
        collect(stream.body).await,
        vec![StreamEvent::error("AI service temporarily unavailable")]
    );
}

#[tokio::test]
async fn one_shot_completion() {
    let client = ScriptedClient::new(Script::Json(
        r#"{"id":"c1","choices":[{"index":0,"message":{"role":"assistant","content":"Hello!"}}],"usage":{"total_tokens":7}}"#,
    ));
    let completion = engine(client.clone(), true)
        .complete(hi(), "t")
        .await
        .unwrap();
    assert_eq!(completion.content, "Hello!");
    assert_eq!(completion.model, "X");
    assert_eq!(completion.usage.unwrap()["total_tokens"], 7);
    assert!(!client.seen.lock().unwrap()[0].is_stream);
}

#[tokio::test]
async fn one_shot_errors() {
    let client = ScriptedClient::new(Script::Json(r#"{"choices":[]}"#));
    let err = engine(client, true).complete(hi(), "t").await.unwrap_err();
    assert_eq!(err, RelayError::EmptyResponse);

    let client = ScriptedClient::new(Script::Status(429, ""));
    let err = engine(client, true).complete(hi(), "t").await.unwrap_err();
    assert_eq!(err, RelayError::UpstreamRateLimited);
}
