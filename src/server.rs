//! @ai:module:intent HTTP surface: health, tool and model listing, test-set generation and the NDJSON benchmark stream
//! @ai:module:layer infrastructure
//! @ai:module:public_api AppState, router, serve, credentials_from_headers
//! @ai:module:stateless false

use crate::adapter::{self, ModelAdapter};
use crate::config::{BenchConfig, ProviderCredentials, RunSettings};
use crate::error::{AdapterError, GenerationError};
use crate::events::{EventEncoder, EventSink};
use crate::runner::{BenchmarkRunner, RunOutcome};
use crate::testset::{generate_testset, write_testset, BenchmarkRequest, Provider, TestsetGenerationRequest};
use crate::tools::ToolRegistry;
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;

/// Events buffered between the runner and the response body
const STREAM_BUFFER: usize = 32;

const NDJSON: &str = "application/x-ndjson";

/// Header name → credential slot; the value `empty` means "not provided"
const OPENAI_KEY_HEADER: &str = "x-openai-api-key";
const ANTHROPIC_KEY_HEADER: &str = "x-anthropic-api-key";
const DEEPSEEK_KEY_HEADER: &str = "x-deepseek-api-key";
const TAVILY_KEY_HEADER: &str = "x-tavily-api-key";
const OLLAMA_URL_HEADER: &str = "x-ollama-url";

/// @ai:intent Builds a runner for one request from the run's credentials
pub type RunnerFactory = dyn Fn(&BenchmarkRequest, &ProviderCredentials, &RunSettings) -> Result<BenchmarkRunner, AdapterError>
    + Send
    + Sync;

/// @ai:intent Builds a bare adapter for model listing and test-set generation
pub type AdapterFactory = dyn Fn(Provider, &ProviderCredentials, &RunSettings) -> Result<Arc<dyn ModelAdapter>, AdapterError>
    + Send
    + Sync;

/// @ai:intent Shared, read-only server state
#[derive(Clone)]
pub struct AppState {
    credentials: Arc<ProviderCredentials>,
    settings: Arc<RunSettings>,
    factory: Arc<RunnerFactory>,
    adapters: Arc<AdapterFactory>,
}

impl AppState {
    /// @ai:intent State whose runners talk to the real providers
    /// @ai:effects pure
    pub fn new(credentials: ProviderCredentials, settings: RunSettings) -> Self {
        Self {
            credentials: Arc::new(credentials),
            settings: Arc::new(settings),
            factory: Arc::new(BenchmarkRunner::connect),
            adapters: Arc::new(adapter::connect),
        }
    }

    pub fn with_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&BenchmarkRequest, &ProviderCredentials, &RunSettings) -> Result<BenchmarkRunner, AdapterError>
            + Send
            + Sync
            + 'static,
    {
        self.factory = Arc::new(factory);
        self
    }

    pub fn with_adapters<F>(mut self, adapters: F) -> Self
    where
        F: Fn(Provider, &ProviderCredentials, &RunSettings) -> Result<Arc<dyn ModelAdapter>, AdapterError>
            + Send
            + Sync
            + 'static,
    {
        self.adapters = Arc::new(adapters);
        self
    }

    fn credentials_for(&self, headers: &HeaderMap) -> ProviderCredentials {
        credentials_from_headers(headers).or((*self.credentials).clone())
    }
}

/// @ai:intent Assemble the application router
/// @ai:effects pure
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/health", get(health))
        .route("/api/tools", get(list_tools))
        .route("/api/models/{provider}", get(list_models))
        .route("/api/generate-testset", post(generate))
        .route("/api/benchmark", post(run_benchmark))
        .with_state(state)
}

/// @ai:intent Bind and serve until the process is stopped
/// @ai:effects network
pub async fn serve(config: &BenchConfig) -> anyhow::Result<()> {
    let credentials = config.providers.clone().or(ProviderCredentials::from_env());
    let state = AppState::new(credentials, config.run.clone());

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// @ai:intent Per-request credential overrides from `X-*` headers
/// @ai:effects pure
pub fn credentials_from_headers(headers: &HeaderMap) -> ProviderCredentials {
    let value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty() && *v != "empty")
            .map(str::to_string)
    };

    ProviderCredentials {
        openai_api_key: value(OPENAI_KEY_HEADER),
        anthropic_api_key: value(ANTHROPIC_KEY_HEADER),
        deepseek_api_key: value(DEEPSEEK_KEY_HEADER),
        tavily_api_key: value(TAVILY_KEY_HEADER),
        ollama_url: value(OLLAMA_URL_HEADER),
    }
}

fn error_response(status: StatusCode, error: &str, detail: impl Into<String>) -> Response {
    (status, Json(json!({ "error": error, "detail": detail.into() }))).into_response()
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_tools(State(state): State<AppState>) -> Json<Value> {
    let registry = ToolRegistry::with_defaults(&state.credentials);
    Json(json!({ "tools": registry.definitions() }))
}

/// Status for a failed provider call made on behalf of a client
fn adapter_status(err: &AdapterError) -> StatusCode {
    match err {
        AdapterError::Auth(_) => StatusCode::UNAUTHORIZED,
        AdapterError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        AdapterError::Provider { status, .. } if *status >= 400 => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        _ => StatusCode::BAD_GATEWAY,
    }
}

/// @ai:intent Models offered by one provider, using header credentials when given
/// @ai:effects network
async fn list_models(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
) -> Response {
    let provider: Provider = match provider.parse() {
        Ok(provider) => provider,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, "invalid_request", err.to_string()),
    };

    let credentials = state.credentials_for(&headers);
    let adapter = match (state.adapters)(provider, &credentials, &state.settings) {
        Ok(adapter) => adapter,
        Err(err) => {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "adapter_unavailable", err.to_string())
        }
    };

    match adapter.list_models().await {
        Ok(models) => Json(json!({ "provider": provider, "models": models })).into_response(),
        Err(err) => {
            tracing::warn!(%provider, "model listing failed: {err}");
            error_response(adapter_status(&err), "provider_error", err.to_string())
        }
    }
}

/// @ai:intent Generate a JSONL test set with a model
/// @ai:effects network
async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<TestsetGenerationRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, "invalid_request", rejection.body_text())
        }
    };
    if let Err(err) = request.validate() {
        return error_response(StatusCode::BAD_REQUEST, "invalid_request", err.to_string());
    }

    let credentials = state.credentials_for(&headers);
    let (provider, model) = match request.resolve_model(&credentials) {
        Ok(choice) => choice,
        Err(err) => return error_response(StatusCode::UNAUTHORIZED, "missing_credentials", err.to_string()),
    };
    let adapter = match (state.adapters)(provider, &credentials, &state.settings) {
        Ok(adapter) => adapter,
        Err(err) => {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "adapter_unavailable", err.to_string())
        }
    };

    let prompts = match generate_testset(adapter.as_ref(), &model, &request).await {
        Ok(prompts) => prompts,
        Err(GenerationError::Adapter(err)) => {
            return error_response(adapter_status(&err), "provider_error", err.to_string())
        }
        Err(err) => {
            tracing::warn!(topic = %request.topic, %provider, "test-set generation failed: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "generation_failed", err.to_string());
        }
    };

    let mut testset = Vec::new();
    if let Err(err) = write_testset(&mut testset, &prompts) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "generation_failed", err.to_string());
    }

    let testset = String::from_utf8_lossy(&testset);
    Json(json!({
        "testset": testset.trim_end(),
        "count": prompts.len(),
        "provider": provider,
        "model": model,
    }))
    .into_response()
}

/// @ai:intent Validate, spawn the run, and stream its events as NDJSON
/// @ai:post 4xx only before any event is produced
/// @ai:effects network, channel:read
async fn run_benchmark(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<BenchmarkRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, "invalid_request", rejection.body_text())
        }
    };

    if let Err(err) = request.validate() {
        tracing::warn!(name = %request.name, "rejected benchmark request: {err}");
        return error_response(StatusCode::BAD_REQUEST, "invalid_request", err.to_string());
    }

    let credentials = state.credentials_for(&headers);
    let runner = match (state.factory)(&request, &credentials, &state.settings) {
        Ok(runner) => runner,
        Err(err) => {
            tracing::error!(name = %request.name, "failed to set up adapters: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "adapter_unavailable", err.to_string());
        }
    };

    let (sink, rx) = EventSink::channel(STREAM_BUFFER);
    tokio::spawn(async move {
        match runner.run(&request, &sink).await {
            Ok(RunOutcome::Completed(_)) => {}
            Ok(RunOutcome::Aborted { processed }) => {
                tracing::info!(name = %request.name, processed, "client disconnected, run aborted");
            }
            Err(err) => tracing::error!(name = %request.name, "benchmark run failed: {err}"),
        }
    });

    let body = ReceiverStream::new(rx).map(|event| EventEncoder::encode(&event));

    (
        [
            (header::CONTENT_TYPE, NDJSON),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ScriptedAdapter;
    use crate::events::BenchEvent;
    use crate::testset::PromptItem;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    fn scripted_state(reply: &'static str) -> AppState {
        AppState::new(ProviderCredentials::default(), RunSettings::default()).with_factory(
            move |_request, _credentials, settings| {
                Ok(BenchmarkRunner::new(
                    Arc::new(ScriptedAdapter::fixed(reply)),
                    settings.clone(),
                ))
            },
        )
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn post_json(body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/benchmark")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_routes() {
        let app = router(scripted_state("ok"));
        for uri in ["/health", "/api/health"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_string(response).await, r#"{"status":"ok"}"#);
        }
    }

    #[tokio::test]
    async fn test_tools_listing() {
        let response = router(scripted_state("ok"))
            .oneshot(Request::builder().uri("/api/tools").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let value: Value = serde_json::from_str(&body_string(response).await).unwrap();
        let names: Vec<_> = value["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["math_eval", "tavily_search"]);
    }

    #[tokio::test]
    async fn test_benchmark_streams_ndjson() {
        let request = BenchmarkRequest::new(
            "http",
            crate::testset::Provider::OpenAi,
            "gpt-4o-mini",
            vec![PromptItem::new("1", "What is 2+2?").with_expected_answer("4")],
        );
        let response = router(scripted_state("4"))
            .oneshot(post_json(&serde_json::to_value(&request).unwrap()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], NDJSON);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");

        let body = body_string(response).await;
        assert!(body.ends_with('\n'));
        let events = EventEncoder::decode_all(&body).unwrap();
        let types: Vec<_> = events.iter().map(BenchEvent::event_type).collect();
        assert_eq!(types, vec!["answer", "eval", "summary"]);
    }

    #[tokio::test]
    async fn test_invalid_requests_are_rejected_before_streaming() {
        let app = router(scripted_state("4"));

        let empty = json!({"name": "x", "subject_provider": "openai", "subject_model": "m", "prompts": []});
        let response = app.clone().oneshot(post_json(&empty)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let value: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(value["error"], "invalid_request");
        assert_eq!(value["detail"], "benchmark request contains no prompts");

        let duplicate = json!({
            "name": "x", "subject_provider": "openai", "subject_model": "m",
            "prompts": [{"id": "a", "content": "q"}, {"id": "a", "content": "r"}]
        });
        let response = app.clone().oneshot(post_json(&duplicate)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let malformed = Request::builder()
            .method("POST")
            .uri("/api/benchmark")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(malformed).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_models_listing_uses_header_url() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"models": [{"name": "llama3:8b"}]})),
            )
            .mount(&server)
            .await;

        let app = router(AppState::new(ProviderCredentials::default(), RunSettings::default()));
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/models/ollama")
                    .header("X-Ollama-URL", server.uri())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let value: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(value["provider"], "ollama");
        assert_eq!(value["models"][0]["id"], "llama3:8b");

        let response = app
            .oneshot(Request::builder().uri("/api/models/mistral").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_models_listing_without_key_is_unauthorized() {
        let app = router(AppState::new(ProviderCredentials::default(), RunSettings::default()));
        let response = app
            .oneshot(Request::builder().uri("/api/models/openai").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    fn generation_state(reply: &'static str) -> AppState {
        scripted_state("unused").with_adapters(move |_provider, _credentials, _settings| {
            Ok(Arc::new(ScriptedAdapter::fixed(reply)) as Arc<dyn ModelAdapter>)
        })
    }

    fn post_generate(body: &Value, openai_key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/generate-testset")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(key) = openai_key {
            builder = builder.header("X-OpenAI-API-Key", key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_generate_testset_returns_jsonl() {
        let app = router(generation_state(
            "Sure!\n{\"id\": \"1\", \"content\": \"What is TCP?\", \"difficulty\": \"easy\"}\n{\"id\": \"2\", \"content\": \"What is UDP?\"}",
        ));
        let response = app
            .oneshot(post_generate(&json!({"topic": "networking", "numQuestions": 2}), Some("sk-header")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let value: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(value["count"], 2);
        assert_eq!(value["provider"], "openai");
        let prompts = crate::testset::parse_testset(value["testset"].as_str().unwrap()).unwrap();
        assert_eq!(prompts[1].content, "What is UDP?");
    }

    #[tokio::test]
    async fn test_generate_testset_errors() {
        let app = router(generation_state("no json here"));

        let response = app
            .clone()
            .oneshot(post_generate(&json!({"topic": "networking"}), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .clone()
            .oneshot(post_generate(&json!({"topic": ""}), Some("sk")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(post_generate(&json!({"topic": "networking"}), Some("sk")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let value: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(value["error"], "generation_failed");
    }

    #[test]
    fn test_header_overrides() {
        let mut headers = HeaderMap::new();
        headers.insert("X-OpenAI-API-Key", "sk-header".parse().unwrap());
        headers.insert("X-Anthropic-API-Key", "empty".parse().unwrap());
        headers.insert("X-Ollama-URL", "http://gpu-box:11434".parse().unwrap());

        let defaults = ProviderCredentials {
            openai_api_key: Some("sk-server".to_string()),
            anthropic_api_key: Some("ak-server".to_string()),
            ..ProviderCredentials::default()
        };
        let merged = credentials_from_headers(&headers).or(defaults);

        assert_eq!(merged.openai_api_key.as_deref(), Some("sk-header"));
        assert_eq!(merged.anthropic_api_key.as_deref(), Some("ak-server"));
        assert_eq!(merged.ollama_url.as_deref(), Some("http://gpu-box:11434"));
        assert_eq!(merged.tavily_api_key, None);
    }
}
