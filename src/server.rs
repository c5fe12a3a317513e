//! HTTP API server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Service description and profile summary |
//! | `GET`  | `/health` | Backend status |
//! | `GET`  | `/api/test` | Quick liveness check with feature flags |
//! | `POST` | `/api/query` | Answer a question: `{"query": "..."}` |
//! | `GET`  | `/api/analytics` | Aggregate chat analytics |
//!
//! # Error Contract
//!
//! Every response is JSON. Errors use a flat body:
//!
//! ```json
//! { "error": "Query is required" }
//! ```
//!
//! Validation failures are `400`. A missing analytics database is `503`.
//! A panic inside a handler becomes a `500` whose body also carries an
//! apologetic `content` string, so chat clients always have text to show.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; `OPTIONS` preflight is
//! answered by the CORS layer.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::any::Any as PanicPayload;
use std::sync::Arc;
use std::time::Instant;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::analytics::AnalyticsStore;
use crate::config::Config;
use crate::error::QueryError;
use crate::models::ChatLog;
use crate::pipeline::{QueryMetadata, TwinPipeline};

const APOLOGY: &str =
    "I'm having trouble processing your question right now. Please try again in a moment.";

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<TwinPipeline>,
    analytics: Option<AnalyticsStore>,
    /// `[analytics]` was configured, whether or not the store opened.
    analytics_configured: bool,
}

/// Starts the HTTP server.
///
/// Loads the knowledge base, builds the pipeline, opens the analytics store
/// (when configured) and serves on `[server].bind` until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = Arc::new(TwinPipeline::from_config(config)?);
    run_server_with_pipeline(config, pipeline).await
}

/// Starts the HTTP server around an already-built pipeline.
pub async fn run_server_with_pipeline(
    config: &Config,
    pipeline: Arc<TwinPipeline>,
) -> anyhow::Result<()> {
    let analytics = match &config.analytics {
        Some(cfg) => match AnalyticsStore::connect(cfg).await {
            Ok(store) => Some(store),
            Err(e) => {
                warn!(error = %e, path = %cfg.path.display(), "analytics unavailable; chats will not be logged");
                None
            }
        },
        None => None,
    };

    let app = build_router(config, pipeline, analytics);

    let bind_addr = &config.server.bind;
    println!("Digital twin listening on http://{}", bind_addr);
    info!(bind = %bind_addr, "server starting");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router with CORS, request tracing and panic recovery.
pub fn build_router(
    config: &Config,
    pipeline: Arc<TwinPipeline>,
    analytics: Option<AnalyticsStore>,
) -> Router {
    let state = AppState {
        pipeline,
        analytics,
        analytics_configured: config.analytics.is_some(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/api/test", get(handle_test))
        .route("/api/query", post(handle_query))
        .route("/api/analytics", get(handle_analytics))
        .fallback(handle_not_found)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

/// Internal error type that converts into a flat JSON error body.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
    content: Option<&'static str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.message });
        if let Some(content) = self.content {
            body["content"] = Value::from(content);
        }
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
        content: None,
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: message.into(),
        content: Some(APOLOGY),
    }
}

impl From<QueryError> for AppError {
    fn from(e: QueryError) -> Self {
        bad_request(e.to_string())
    }
}

fn handle_panic(payload: Box<dyn PanicPayload + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(detail, "request handler panicked");
    internal("Internal server error").into_response()
}

async fn handle_not_found() -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        message: "Not found".to_string(),
        content: None,
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

// ============ GET / ============

async fn handle_root(State(state): State<AppState>) -> Json<Value> {
    let personal = &state.pipeline.knowledge().personal;
    Json(json!({
        "service": "Digital Twin API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "description": "Ask questions about a professional profile in natural language.",
        "endpoints": {
            "health": "GET /health",
            "test": "GET /api/test",
            "query": "POST /api/query",
            "analytics": "GET /api/analytics",
        },
        "profile": {
            "name": personal.name,
            "title": personal.title,
            "location": personal.location,
            "summary": personal.summary,
        },
    }))
}

// ============ GET /health ============

async fn handle_health(State(state): State<AppState>) -> Json<Value> {
    let database = match &state.analytics {
        Some(store) => match store.ping().await {
            Ok(()) => "connected",
            Err(e) => {
                warn!(error = %e, "analytics database ping failed");
                "error"
            }
        },
        None if state.analytics_configured => "error",
        None => "missing",
    };
    let backends = state.pipeline.status();
    let configured = |on: bool| if on { "configured" } else { "missing" };

    let (status, message) = if database == "error" {
        ("degraded", "Digital twin is running; analytics database unavailable")
    } else {
        ("healthy", "Digital twin is running")
    };

    Json(json!({
        "status": status,
        "timestamp": now_rfc3339(),
        "services": {
            "database": database,
            "vector_db": configured(backends.remote_retrieval),
            "groq_api": configured(backends.remote_generation),
        },
        "message": message,
    }))
}

// ============ GET /api/test ============

async fn handle_test(State(state): State<AppState>) -> Json<Value> {
    let backends = state.pipeline.status();
    Json(json!({
        "message": "Digital twin API is working",
        "timestamp": now_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "ok",
        "features": {
            "vector_search": backends.remote_retrieval,
            "ai_generation": backends.remote_generation,
            "analytics": state.analytics.is_some(),
            "answer_cache": backends.cache_active,
        },
    }))
}

// ============ POST /api/query ============

/// Handler for `POST /api/query`.
///
/// The body is parsed by hand so that a non-JSON body gets the same flat
/// 400 error as every other validation failure. A missing or non-string
/// `query` is treated as empty.
async fn handle_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let started = Instant::now();

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|_| bad_request("Request body must be a JSON object"))?;
    let query = payload
        .get("query")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let answer = state.pipeline.answer(query).await?;
    let elapsed = started.elapsed();

    let logged = match &state.analytics {
        Some(store) => {
            let log = ChatLog {
                query: query.trim().to_string(),
                response: answer.content.clone(),
                response_time: elapsed.as_secs_f64(),
                vector_hits: answer.vector_hits as i64,
                category: answer.category.to_string(),
                created_at: chrono::Utc::now().timestamp(),
                user_ip: client_ip(&headers),
                user_agent: header_str(&headers, "user-agent"),
            };
            match store.log_chat(&log).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "failed to log chat");
                    false
                }
            }
        }
        None => false,
    };

    info!(
        category = %answer.category,
        source = answer.source.as_str(),
        chars = answer.content.chars().count(),
        elapsed_ms = elapsed.as_millis() as u64,
        cached = answer.cached,
        "query answered"
    );

    let metadata = QueryMetadata::new(query, &answer, elapsed, logged);
    Ok(Json(json!({
        "content": answer.content,
        "metadata": metadata,
    })))
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// First hop of `X-Forwarded-For`, else `X-Real-IP`.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty())
        .or_else(|| header_str(headers, "x-real-ip"))
}

// ============ GET /api/analytics ============

async fn handle_analytics(State(state): State<AppState>) -> Result<Response, AppError> {
    let Some(store) = &state.analytics else {
        let body = json!({
            "error": "Analytics database not configured",
            "generated_at": now_rfc3339(),
        });
        return Ok((StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response());
    };

    match store.get_analytics().await {
        Ok(report) => Ok(Json(report).into_response()),
        Err(e) => {
            error!(error = %e, "analytics query failed");
            Err(AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: format!("Analytics query failed: {}", e),
                content: None,
            })
        }
    }
}
