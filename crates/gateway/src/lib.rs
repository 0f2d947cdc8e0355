//! HTTP gateway for Folio.
//!
//! Routes:
//! - `GET /`: status probe listing the candidate models
//! - `GET /health`: liveness
//! - `POST /chat`, `POST /api/chat`: one chat turn (JSON or multipart)
//!
//! Every response carries anti-framing and no-sniff headers. Chat routes
//! are rate limited per caller.

pub mod chat;
pub mod rate_limit;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{
    Router,
    extract::{Request, State},
    middleware::{self, Next},
    response::{Json, Response},
    routing::{get, post},
};
use folio_chat::ChatPipeline;
use folio_core::provider::Provider;
use folio_core::usage::{NoopUsageSink, UsageSink};
use folio_providers::GeminiProvider;
use folio_telemetry::UsageRecorder;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use rate_limit::RateLimiter;

/// Multipart framing and the text field on top of the raw image.
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub pipeline: ChatPipeline,
    pub rate_limiter: Option<RateLimiter>,
    pub trust_forwarded_for: bool,
    pub max_upload_bytes: usize,
}

impl GatewayState {
    pub fn new(pipeline: ChatPipeline, gateway: &folio_config::GatewayConfig) -> Self {
        Self {
            max_upload_bytes: pipeline.max_upload_bytes(),
            pipeline,
            rate_limiter: RateLimiter::per_minute(gateway.rate_limit_per_minute),
            trust_forwarded_for: gateway.trust_forwarded_for,
        }
    }
}

pub type SharedState = Arc<GatewayState>;

/// Largest request body accepted. Base64 JSON images are 4/3 the size of
/// the raw bytes.
fn body_limit(max_upload_bytes: usize) -> usize {
    max_upload_bytes
        .saturating_mul(4)
        .div_ceil(3)
        .saturating_add(BODY_OVERHEAD_BYTES)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600));

    if allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(AllowOrigin::any());
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}

/// Build the router with every route and layer.
pub fn build_router(state: SharedState, gateway: &folio_config::GatewayConfig) -> Router {
    let limit = body_limit(state.max_upload_bytes);

    Router::new()
        .route("/", get(status_handler))
        .route("/health", get(health_handler))
        .route("/chat", post(chat::chat_handler))
        .route("/api/chat", post(chat::chat_handler))
        .layer(DefaultBodyLimit::max(limit))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_middleware,
        ))
        .layer(cors_layer(&gateway.allowed_origins))
        .layer(middleware::from_fn(security_headers))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway and serve until Ctrl-C / SIGTERM, then drain the
/// usage log.
pub async fn start(config: folio_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    config.require_api_key()?;

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let provider: Arc<dyn Provider> = Arc::new(GeminiProvider::from_config(&config)?);

    let recorder = if config.usage.enabled {
        match UsageRecorder::from_config(&config.usage).await {
            Ok(recorder) => Some(Arc::new(recorder)),
            Err(e) => {
                warn!(error = %e, "Usage logging disabled");
                None
            }
        }
    } else {
        None
    };
    let usage: Arc<dyn UsageSink> = match &recorder {
        Some(recorder) => recorder.clone(),
        None => Arc::new(NoopUsageSink),
    };

    let pipeline = ChatPipeline::from_config(&config, provider, usage);
    let state = Arc::new(GatewayState::new(pipeline, &config.gateway));
    let app = build_router(state, &config.gateway);

    info!(addr = %addr, models = ?config.models, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(recorder) = recorder {
        recorder.shutdown().await;
    }
    info!("Gateway stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

async fn security_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("frame-ancestors 'none'"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}

// --- Handlers ---

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub models: Vec<String>,
}

async fn status_handler(State(state): State<SharedState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".into(),
        models: state.pipeline.models().to_vec(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chat::ReplyBody;
    use folio_chat::PromptAssembler;
    use folio_core::error::ProviderError;
    use folio_core::persona::{KnowledgeBase, Persona};
    use folio_core::prompt::PromptPayload;
    use folio_core::provider::Generation;
    use folio_core::usage::{UsageRecord, UsageStatus};
    use folio_media::MediaNormalizer;
    use folio_providers::ModelFallback;
    use http_body_util::BodyExt;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tower::ServiceExt;

    const UPLOAD_LIMIT: usize = 32 * 1024;

    struct ScriptedProvider {
        scripts: HashMap<String, Result<String, ProviderError>>,
        calls: Mutex<Vec<(String, PromptPayload)>>,
    }

    impl ScriptedProvider {
        fn new(scripts: Vec<(&str, Result<&str, ProviderError>)>) -> Arc<Self> {
            Arc::new(Self {
                scripts: scripts
                    .into_iter()
                    .map(|(m, r)| (m.to_string(), r.map(String::from)))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn last_prompt(&self) -> PromptPayload {
            self.calls.lock().unwrap().last().unwrap().1.clone()
        }
    }

    #[async_trait::async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(
            &self,
            model: &str,
            prompt: &PromptPayload,
        ) -> Result<Generation, ProviderError> {
            self.calls
                .lock()
                .unwrap()
                .push((model.to_string(), prompt.clone()));
            match self.scripts.get(model) {
                Some(Ok(text)) => Ok(Generation {
                    text: text.clone(),
                    model: model.to_string(),
                }),
                Some(Err(e)) => Err(e.clone()),
                None => Err(ProviderError::ModelNotFound(model.to_string())),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        records: Mutex<Vec<UsageRecord>>,
    }

    impl UsageSink for RecordingSink {
        fn record(&self, record: UsageRecord) {
            self.records.lock().unwrap().push(record);
        }
    }

    fn app_with(
        provider: Arc<ScriptedProvider>,
        models: &[&str],
        usage: Arc<RecordingSink>,
        gateway: folio_config::GatewayConfig,
    ) -> Router {
        let fallback = ModelFallback::new(provider, models.iter().map(|m| m.to_string()).collect())
            .with_usage_sink(usage);
        let pipeline = ChatPipeline::new(
            PromptAssembler::new(Persona::builtin(), KnowledgeBase::none()),
            MediaNormalizer::new(UPLOAD_LIMIT, 512, 80),
            fallback,
        );
        let state = Arc::new(GatewayState::new(pipeline, &gateway));
        build_router(state, &gateway)
    }

    fn app(provider: Arc<ScriptedProvider>, models: &[&str]) -> Router {
        app_with(
            provider,
            models,
            Arc::new(RecordingSink::default()),
            folio_config::GatewayConfig::default(),
        )
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn post_multipart(uri: &str, message: &str, image: Option<&[u8]>) -> Request<Body> {
        let boundary = "folio-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"message\"\r\n\r\n{message}\r\n"
            )
            .as_bytes(),
        );
        if let Some(image) = image {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"a.png\"\r\nContent-Type: image/png\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(image);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn reply_of(response: Response) -> ReplyBody {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn png() -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        image::RgbImage::from_pixel(4, 4, image::Rgb([9, 9, 9]))
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[tokio::test]
    async fn status_probe_lists_models() {
        let provider = ScriptedProvider::new(vec![]);
        let response = app(provider.clone(), &["gemini-2.5-flash", "gemini-2.0-flash"])
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let status: StatusResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(status.status, "ok");
        assert_eq!(status.models, vec!["gemini-2.5-flash", "gemini-2.0-flash"]);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn health_endpoint() {
        let response = app(ScriptedProvider::new(vec![]), &["m"])
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn security_headers_on_every_response() {
        let response = app(ScriptedProvider::new(vec![]), &["m"])
            .oneshot(post_json("/chat", serde_json::json!({"message": ""})))
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers["x-frame-options"], "DENY");
        assert_eq!(headers["content-security-policy"], "frame-ancestors 'none'");
        assert_eq!(headers["x-content-type-options"], "nosniff");
    }

    #[tokio::test]
    async fn json_chat_returns_reply_and_model() {
        let provider = ScriptedProvider::new(vec![("m1", Ok("Hi, I'm Ada's assistant."))]);
        for uri in ["/chat", "/api/chat"] {
            let response = app(provider.clone(), &["m1"])
                .oneshot(post_json(uri, serde_json::json!({"message": "Hello"})))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let reply = reply_of(response).await;
            assert_eq!(reply.reply, "Hi, I'm Ada's assistant.");
            assert_eq!(reply.model.as_deref(), Some("m1"));
        }
    }

    #[tokio::test]
    async fn empty_message_is_bad_request() {
        let provider = ScriptedProvider::new(vec![("m1", Ok("unused"))]);
        let response = app(provider.clone(), &["m1"])
            .oneshot(post_json("/chat", serde_json::json!({"message": "   "})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let reply = reply_of(response).await;
        assert!(reply.model.is_none());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn multipart_text_and_image() {
        let provider = ScriptedProvider::new(vec![("m1", Ok("A grey square."))]);
        let response = app(provider.clone(), &["m1"])
            .oneshot(post_multipart("/chat", "What is this?", Some(&png())))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let prompt = provider.last_prompt();
        assert_eq!(prompt.parts().len(), 2);
        assert!(prompt.parts()[0].is_text());
        assert!(prompt.parts()[1].is_media());
    }

    #[tokio::test]
    async fn multipart_oversized_image_rejected() {
        let provider = ScriptedProvider::new(vec![("m1", Ok("unused"))]);
        let big = vec![0u8; UPLOAD_LIMIT + 1];
        let response = app(provider.clone(), &["m1"])
            .oneshot(post_multipart("/chat", "hi", Some(&big)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn json_oversized_image_rejected() {
        use base64::Engine;
        let provider = ScriptedProvider::new(vec![("m1", Ok("unused"))]);
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(vec![7u8; UPLOAD_LIMIT + 10]);
        let response = app(provider.clone(), &["m1"])
            .oneshot(post_json(
                "/chat",
                serde_json::json!({"message": "hi", "image": encoded}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn corrupt_image_still_answers() {
        use base64::Engine;
        let provider = ScriptedProvider::new(vec![("m1", Ok("text only"))]);
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"not really a png");
        let response = app(provider.clone(), &["m1"])
            .oneshot(post_json(
                "/chat",
                serde_json::json!({"message": "Describe", "image": encoded}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(!provider.last_prompt().has_media());
    }

    #[tokio::test]
    async fn fatal_upstream_error_is_generic_500() {
        let provider = ScriptedProvider::new(vec![(
            "m1",
            Err(ProviderError::AuthenticationFailed("API key AIza-leaked invalid".into())),
        )]);
        let response = app(provider, &["m1", "m2"])
            .oneshot(post_json("/chat", serde_json::json!({"message": "Hello"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let reply = reply_of(response).await;
        assert!(!reply.reply.contains("AIza"));
        assert!(reply.model.is_none());
    }

    #[tokio::test]
    async fn exhausted_candidates_is_503() {
        let provider = ScriptedProvider::new(vec![(
            "m1",
            Err(ProviderError::RateLimited {
                retry_after_secs: None,
            }),
        )]);
        let response = app(provider.clone(), &["m1", "m2"])
            .oneshot(post_json("/chat", serde_json::json!({"message": "Hello"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn rate_limit_applies_to_chat_only() {
        let provider = ScriptedProvider::new(vec![("m1", Ok("ok"))]);
        let gateway = folio_config::GatewayConfig {
            rate_limit_per_minute: 1,
            ..Default::default()
        };
        let app = app_with(provider, &["m1"], Arc::new(RecordingSink::default()), gateway);

        let first = app
            .clone()
            .oneshot(post_json("/chat", serde_json::json!({"message": "a"})))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .clone()
            .oneshot(post_json("/chat", serde_json::json!({"message": "b"})))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key("retry-after"));

        let probe = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(probe.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn usage_records_trusted_forwarded_caller() {
        let provider = ScriptedProvider::new(vec![("m1", Ok("ok"))]);
        let usage = Arc::new(RecordingSink::default());
        let gateway = folio_config::GatewayConfig {
            trust_forwarded_for: true,
            ..Default::default()
        };
        let app = app_with(provider, &["m1"], usage.clone(), gateway);

        let mut req = post_json("/chat", serde_json::json!({"message": "hi"}));
        req.headers_mut()
            .insert("x-forwarded-for", "198.51.100.23".parse().unwrap());
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let records = usage.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].caller, "198.51.100.23");
        assert_eq!(records[0].model, "m1");
        assert_eq!(records[0].status, UsageStatus::Success);
    }

    #[tokio::test]
    async fn cors_preflight_for_configured_origin() {
        let gateway = folio_config::GatewayConfig {
            allowed_origins: vec!["https://ada.dev".into()],
            ..Default::default()
        };
        let app = app_with(
            ScriptedProvider::new(vec![]),
            &["m1"],
            Arc::new(RecordingSink::default()),
            gateway,
        );

        let req = Request::builder()
            .method("OPTIONS")
            .uri("/chat")
            .header("origin", "https://ada.dev")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "https://ada.dev"
        );
    }

    #[test]
    fn body_limit_covers_base64_overhead() {
        assert!(body_limit(3 * 1024) >= 4 * 1024 + BODY_OVERHEAD_BYTES);
    }
}
