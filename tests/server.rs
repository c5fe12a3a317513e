//! End-to-end tests for the HTTP API.
//!
//! Each test starts the real server on a free port, talks to it with
//! reqwest, and aborts it at the end. Remote retrieval is exercised against
//! an in-process mock of the vector index `query-data` endpoint.

use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use digital_twin::config::{AnalyticsConfig, Config};
use digital_twin::generation::ComposingGenerator;
use digital_twin::knowledge::KnowledgeBase;
use digital_twin::pipeline::TwinPipeline;
use digital_twin::retrieval::UpstashRetriever;
use digital_twin::server::run_server_with_pipeline;
use digital_twin::verify;

const MOCK_TOKEN: &str = "test-readonly-token";

// ─── Helpers ────────────────────────────────────────────────────────

fn profile_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/profile.json")
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

fn test_config(port: u16, analytics: Option<&TempDir>) -> Config {
    let mut cfg = Config::minimal(profile_path());
    cfg.server.bind = format!("127.0.0.1:{}", port);
    cfg.analytics = analytics.map(|dir| AnalyticsConfig {
        path: dir.path().join("analytics.sqlite"),
        response_max_chars: 1000,
    });
    cfg
}

/// Start the server for `cfg` with backends built from the config.
async fn start(cfg: Config) -> (String, tokio::task::JoinHandle<anyhow::Result<()>>) {
    let pipeline = Arc::new(TwinPipeline::from_config(&cfg).unwrap());
    start_with_pipeline(cfg, pipeline).await
}

async fn start_with_pipeline(
    cfg: Config,
    pipeline: Arc<TwinPipeline>,
) -> (String, tokio::task::JoinHandle<anyhow::Result<()>>) {
    let base = format!("http://{}", cfg.server.bind);
    let port: u16 = cfg.server.bind.rsplit(':').next().unwrap().parse().unwrap();
    let handle = tokio::spawn(async move { run_server_with_pipeline(&cfg, pipeline).await });
    wait_for_server(port).await;
    (base, handle)
}

async fn post_query(base: &str, body: Value) -> (StatusCode, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{}/api/query", base))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
    (status, resp.json().await.unwrap())
}

/// Serve a fake vector index that answers every query with one match of
/// the given score. Requests without the expected bearer token get a 401.
async fn start_mock_index(score: f64) -> (String, tokio::task::JoinHandle<()>) {
    let app = Router::new().route(
        "/query-data",
        post(move |headers: HeaderMap, Json(body): Json<Value>| async move {
            let authorized = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                == Some(format!("Bearer {}", MOCK_TOKEN).as_str());
            if !authorized {
                return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" })));
            }
            assert_eq!(body["includeMetadata"], true);
            assert!(body["data"].is_string());
            (
                StatusCode::OK,
                Json(json!({
                    "result": [{
                        "id": "project_billing_migration",
                        "score": score,
                        "metadata": {
                            "type": "project",
                            "title": "Billing Platform Migration",
                            "content": "Migrated the billing platform to the cloud with zero downtime.",
                            "tags": ["billing", "migration"],
                            "importance": "high"
                        }
                    }]
                })),
            )
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), handle)
}

fn pipeline_with_index(cfg: &Config, index_url: &str) -> Arc<TwinPipeline> {
    let knowledge = Arc::new(KnowledgeBase::load(&cfg.knowledge.path).unwrap());
    let retriever =
        UpstashRetriever::with_endpoint(index_url, MOCK_TOKEN, Duration::from_secs(5)).unwrap();
    Arc::new(TwinPipeline::with_backends(
        cfg,
        knowledge,
        Arc::new(retriever),
        Arc::new(ComposingGenerator),
    ))
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_root_describes_service_and_profile() {
    let (base, handle) = start(test_config(find_free_port(), None)).await;

    let body: Value = reqwest::get(format!("{}/", base)).await.unwrap().json().await.unwrap();
    assert_eq!(body["service"], "Digital Twin API");
    assert_eq!(body["status"], "running");
    assert_eq!(body["profile"]["name"], "Alex Morgan");
    assert_eq!(body["endpoints"]["query"], "POST /api/query");

    handle.abort();
}

#[tokio::test]
async fn test_health_without_backends() {
    let (base, handle) = start(test_config(find_free_port(), None)).await;

    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["services"]["database"], "missing");
    assert_eq!(body["services"]["vector_db"], "missing");
    assert_eq!(body["services"]["groq_api"], "missing");
    assert!(body["timestamp"].is_string());

    handle.abort();
}

#[tokio::test]
async fn test_api_test_endpoint_reports_features() {
    let (base, handle) = start(test_config(find_free_port(), None)).await;

    let body: Value = reqwest::get(format!("{}/api/test", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["features"]["vector_search"], false);
    assert_eq!(body["features"]["analytics"], false);
    assert_eq!(body["features"]["answer_cache"], true);

    handle.abort();
}

#[tokio::test]
async fn test_query_validation_errors() {
    let (base, handle) = start(test_config(find_free_port(), None)).await;

    let (status, body) = post_query(&base, json!({ "query": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Query is required" }));

    let (status, body) = post_query(&base, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Query is required");

    let (status, body) = post_query(&base, json!({ "query": 42 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Query is required");

    let (status, body) = post_query(&base, json!({ "query": "a".repeat(1001) })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("too long"));
    assert!(message.contains("1000"));

    handle.abort();
}

#[tokio::test]
async fn test_query_rejects_non_json_body() {
    let (base, handle) = start(test_config(find_free_port(), None)).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/query", base))
        .header("content-type", "text/plain")
        .body("what are your skills")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Request body must be a JSON object");

    handle.abort();
}

#[tokio::test]
async fn test_query_answers_competencies() {
    let (base, handle) = start(test_config(find_free_port(), None)).await;

    let (status, body) = post_query(&base, json!({ "query": "What are your core skills?" })).await;
    assert_eq!(status, StatusCode::OK);

    let content = body["content"].as_str().unwrap();
    assert!(!content.is_empty());
    let metadata = &body["metadata"];
    assert_eq!(metadata["category"], "competencies");
    assert_eq!(metadata["vector_hits"], 0);
    assert_eq!(metadata["query_length"], 26);
    assert_eq!(metadata["logged"], false);
    assert_eq!(
        metadata["response_length"].as_u64().unwrap() as usize,
        content.chars().count()
    );

    handle.abort();
}

#[tokio::test]
async fn test_repeated_query_is_served_from_cache() {
    let (base, handle) = start(test_config(find_free_port(), None)).await;

    let query = json!({ "query": "How do you handle conflict?" });
    let (_, first) = post_query(&base, query.clone()).await;
    let (_, second) = post_query(&base, query).await;

    assert_eq!(first["content"], second["content"]);
    assert_eq!(first["metadata"]["cached"], false);
    assert_eq!(second["metadata"]["cached"], true);
    assert_eq!(second["metadata"]["category"], "stakeholder_management");

    handle.abort();
}

#[tokio::test]
async fn test_cors_headers_and_preflight() {
    let (base, handle) = start(test_config(find_free_port(), None)).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/health", base))
        .header("origin", "https://portfolio.example.com")
        .send()
        .await
        .unwrap();
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );

    let preflight = client
        .request(reqwest::Method::OPTIONS, format!("{}/api/query", base))
        .header("origin", "https://portfolio.example.com")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .send()
        .await
        .unwrap();
    assert!(preflight.status().is_success());
    assert!(preflight.headers().contains_key("access-control-allow-methods"));

    handle.abort();
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let (base, handle) = start(test_config(find_free_port(), None)).await;

    let resp = reqwest::get(format!("{}/api/nope", base)).await.unwrap();
    assert_eq!(resp.status().as_u16(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Not found");

    handle.abort();
}

#[tokio::test]
async fn test_analytics_unavailable_without_database() {
    let (base, handle) = start(test_config(find_free_port(), None)).await;

    let resp = reqwest::get(format!("{}/api/analytics", base)).await.unwrap();
    assert_eq!(resp.status().as_u16(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Analytics database not configured");
    assert!(body["generated_at"].is_string());

    handle.abort();
}

#[tokio::test]
async fn test_queries_are_logged_and_aggregated() {
    let tmp = TempDir::new().unwrap();
    let (base, handle) = start(test_config(find_free_port(), Some(&tmp))).await;

    let health: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["services"]["database"], "connected");

    for query in ["What are your core skills?", "What are your strengths?"] {
        let (status, body) = post_query(&base, json!({ "query": query })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["metadata"]["logged"], true);
    }
    let (status, _) = post_query(&base, json!({ "query": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let report: Value = reqwest::get(format!("{}/api/analytics", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["total_chats"], 2);
    assert_eq!(report["popular_categories"][0]["type"], "competencies");
    assert_eq!(report["popular_categories"][0]["count"], 2);
    assert_eq!(report["recent_activity"][0]["count"], 2);

    handle.abort();
}

#[tokio::test]
async fn test_verify_passes_against_running_server() {
    let tmp = TempDir::new().unwrap();
    let (base, handle) = start(test_config(find_free_port(), Some(&tmp))).await;

    let report = verify::verify(&base).await.unwrap();
    assert_eq!(report.failed(), 0);
    assert_eq!(report.passed(), 4);
    // No remote backends, so the query probe is skipped.
    assert_eq!(report.skipped(), 1);

    handle.abort();
}

#[tokio::test]
async fn test_vector_index_results_above_threshold() {
    let (index_url, index_handle) = start_mock_index(0.92).await;
    let cfg = test_config(find_free_port(), None);
    let pipeline = pipeline_with_index(&cfg, &index_url);
    let (base, handle) = start_with_pipeline(cfg, pipeline).await;

    let health: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["services"]["vector_db"], "configured");

    let (status, body) =
        post_query(&base, json!({ "query": "Tell me about the support portal" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["vector_hits"], 1);
    assert!(body["content"]
        .as_str()
        .unwrap()
        .contains("Migrated the billing platform to the cloud"));

    handle.abort();
    index_handle.abort();
}

#[tokio::test]
async fn test_low_scores_fall_back_to_local_ranking() {
    let (index_url, index_handle) = start_mock_index(0.1).await;
    let cfg = test_config(find_free_port(), None);
    let pipeline = pipeline_with_index(&cfg, &index_url);
    let (base, handle) = start_with_pipeline(cfg, pipeline).await;

    let (status, body) =
        post_query(&base, json!({ "query": "Tell me about the support portal" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["vector_hits"], 0);
    let content = body["content"].as_str().unwrap();
    assert!(!content.contains("billing platform"));
    assert!(content.contains("support portal"));

    handle.abort();
    index_handle.abort();
}

#[tokio::test]
async fn test_rejected_token_falls_back_to_local_ranking() {
    let (index_url, index_handle) = start_mock_index(0.92).await;
    let cfg = test_config(find_free_port(), None);
    let knowledge = Arc::new(KnowledgeBase::load(&cfg.knowledge.path).unwrap());
    let retriever =
        UpstashRetriever::with_endpoint(&index_url, "wrong-token", Duration::from_secs(5))
            .unwrap();
    let pipeline = Arc::new(TwinPipeline::with_backends(
        &cfg,
        knowledge,
        Arc::new(retriever),
        Arc::new(ComposingGenerator),
    ));
    let (base, handle) = start_with_pipeline(cfg, pipeline).await;

    let (status, body) =
        post_query(&base, json!({ "query": "Tell me about the support portal" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["vector_hits"], 0);
    assert!(body["content"].as_str().unwrap().contains("support portal"));

    handle.abort();
    index_handle.abort();
}
