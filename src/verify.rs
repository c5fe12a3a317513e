//! Deployment verification.
//!
//! `twin verify <base_url>` exercises a running deployment endpoint by
//! endpoint. The query check only runs when the deployment reports both a
//! vector index and a generation key; the analytics check only runs when its
//! database is connected. Skipped checks do not count as failures.

use anyhow::{bail, Result};
use serde_json::Value;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_QUERY: &str = "Tell me about yourself";

/// Result of one endpoint check.
#[derive(Debug, Clone)]
pub struct Check {
    pub name: &'static str,
    pub outcome: Outcome,
    pub details: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Fail,
    Skip,
}

#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub checks: Vec<Check>,
}

impl VerifyReport {
    pub fn passed(&self) -> usize {
        self.count(Outcome::Pass)
    }

    pub fn failed(&self) -> usize {
        self.count(Outcome::Fail)
    }

    pub fn skipped(&self) -> usize {
        self.count(Outcome::Skip)
    }

    fn count(&self, outcome: Outcome) -> usize {
        self.checks.iter().filter(|c| c.outcome == outcome).count()
    }
}

/// HTTP status and JSON body; transport errors yield no status.
async fn fetch(
    client: &reqwest::Client,
    url: &str,
    body: Option<&Value>,
) -> (Option<u16>, Value) {
    let request = match body {
        Some(b) => client.post(url).json(b),
        None => client.get(url),
    };
    match request.send().await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            let json = resp
                .json::<Value>()
                .await
                .unwrap_or_else(|_| serde_json::json!({"error": "Invalid JSON response"}));
            (Some(status), json)
        }
        Err(e) => (None, serde_json::json!({ "error": e.to_string() })),
    }
}

fn check(name: &'static str, ok: bool, details: Vec<String>) -> Check {
    Check {
        name,
        outcome: if ok { Outcome::Pass } else { Outcome::Fail },
        details,
    }
}

fn failure_details(status: Option<u16>, body: &Value) -> Vec<String> {
    vec![
        format!(
            "status: {}",
            status.map_or("no response".to_string(), |s| s.to_string())
        ),
        format!("response: {}", body),
    ]
}

/// Run every check against `base_url`.
pub async fn verify(base_url: &str) -> Result<VerifyReport> {
    let base = base_url.trim_end_matches('/');
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?;
    let mut report = VerifyReport::default();

    let (status, body) = fetch(&client, &format!("{}/", base), None).await;
    let ok = status == Some(200) && body.get("service").is_some();
    report.checks.push(check(
        "Home endpoint",
        ok,
        if ok {
            vec![format!("version: {}", body["version"])]
        } else {
            failure_details(status, &body)
        },
    ));

    let (status, health) = fetch(&client, &format!("{}/health", base), None).await;
    let ok = status == Some(200) && health["status"] == "healthy";
    let services = health.get("services").cloned().unwrap_or(Value::Null);
    let service_lines: Vec<String> = services
        .as_object()
        .map(|m| m.iter().map(|(k, v)| format!("{}: {}", k, v)).collect())
        .unwrap_or_default();
    report.checks.push(check(
        "Health check",
        ok,
        if ok {
            service_lines
        } else {
            failure_details(status, &health)
        },
    ));

    let (status, body) = fetch(&client, &format!("{}/api/test", base), None).await;
    let ok = status == Some(200) && body.get("message").is_some();
    report.checks.push(check(
        "API test endpoint",
        ok,
        if ok {
            vec![format!("message: {}", body["message"])]
        } else {
            failure_details(status, &body)
        },
    ));

    let configured = |key: &str| {
        matches!(
            services[key].as_str(),
            Some("configured") | Some("connected")
        )
    };
    if configured("vector_db") && configured("groq_api") {
        let probe = serde_json::json!({ "query": PROBE_QUERY });
        let (status, body) = fetch(&client, &format!("{}/api/query", base), Some(&probe)).await;
        let ok = status == Some(200) && body.get("content").is_some();
        report.checks.push(check(
            "Query endpoint",
            ok,
            if ok {
                vec![
                    format!(
                        "response length: {} characters",
                        body["content"].as_str().map_or(0, |c| c.chars().count())
                    ),
                    format!("response time: {}s", body["metadata"]["response_time"]),
                    format!("vector hits: {}", body["metadata"]["vector_hits"]),
                ]
            } else {
                failure_details(status, &body)
            },
        ));
    } else {
        report.checks.push(Check {
            name: "Query endpoint",
            outcome: Outcome::Skip,
            details: vec!["vector index or generation API not configured".to_string()],
        });
    }

    if services["database"] == "connected" {
        let (status, body) = fetch(&client, &format!("{}/api/analytics", base), None).await;
        let ok = status == Some(200) && body.get("total_chats").is_some();
        report.checks.push(check(
            "Analytics endpoint",
            ok,
            if ok {
                vec![
                    format!("total chats: {}", body["total_chats"]),
                    format!("avg response time: {}s", body["avg_response_time"]),
                ]
            } else {
                failure_details(status, &body)
            },
        ));
    } else {
        report.checks.push(Check {
            name: "Analytics endpoint",
            outcome: Outcome::Skip,
            details: vec!["analytics database not connected".to_string()],
        });
    }

    Ok(report)
}

/// `twin verify`: print PASS/FAIL/SKIP lines and fail if any check failed.
pub async fn run_verify(base_url: &str) -> Result<()> {
    println!("Digital Twin — Deployment Verification");
    println!("======================================");
    println!();
    println!("  Target: {}", base_url.trim_end_matches('/'));
    println!("  Time:   {}", chrono::Utc::now().to_rfc3339());
    println!();

    let report = verify(base_url).await?;

    for c in &report.checks {
        let tag = match c.outcome {
            Outcome::Pass => "PASS",
            Outcome::Fail => "FAIL",
            Outcome::Skip => "SKIP",
        };
        println!("  {}: {}", tag, c.name);
        for line in &c.details {
            println!("        {}", line);
        }
    }

    println!();
    println!(
        "  {} passed, {} failed, {} skipped",
        report.passed(),
        report.failed(),
        report.skipped()
    );
    println!();

    if report.failed() > 0 {
        bail!("{} verification check(s) failed", report.failed());
    }
    Ok(())
}
