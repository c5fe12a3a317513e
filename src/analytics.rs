//! Chat analytics.
//!
//! Every served query is appended to `chat_logs`, and the per-category row in
//! `popular_questions` is upserted in the same transaction. Writes are
//! best-effort from the caller's point of view: the HTTP handler logs a
//! failure and still answers. [`AnalyticsStore::get_analytics`] produces the
//! aggregate report served by `GET /api/analytics` and printed by
//! `twin analytics`.

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::config::{AnalyticsConfig, Config};
use crate::db;
use crate::migrate;
use crate::models::ChatLog;

const QUESTION_TEXT_MAX_CHARS: usize = 200;
const DAY_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize)]
pub struct PopularCategory {
    #[serde(rename = "type")]
    pub kind: String,
    pub count: i64,
    pub avg_time: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryActivity {
    pub category: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    /// Chats in the last 30 days.
    pub total_chats: i64,
    /// Seconds, 2 decimal places, last 30 days.
    pub avg_response_time: f64,
    /// 1 decimal place, last 30 days.
    pub avg_vector_hits: f64,
    /// Top 10 categories by all-time ask count.
    pub popular_categories: Vec<PopularCategory>,
    /// Chats per category in the last 7 days, most active first.
    pub recent_activity: Vec<CategoryActivity>,
    pub generated_at: String,
}

#[derive(Clone)]
pub struct AnalyticsStore {
    pool: SqlitePool,
    response_max_chars: usize,
}

impl AnalyticsStore {
    /// Open the database and make sure the schema exists.
    pub async fn connect(config: &AnalyticsConfig) -> Result<Self> {
        let pool = db::connect(&config.path).await?;
        migrate::migrate(&pool).await?;
        Ok(Self {
            pool,
            response_max_chars: config.response_max_chars,
        })
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Append a chat log and bump the category aggregate.
    pub async fn log_chat(&self, log: &ChatLog) -> Result<()> {
        let response = truncate_chars(&log.response, self.response_max_chars);
        let question_text = truncate_chars(&log.query, QUESTION_TEXT_MAX_CHARS);

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO chat_logs
                (query, response, response_time, vector_hits, query_category,
                 user_ip, user_agent, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.query)
        .bind(response)
        .bind(log.response_time)
        .bind(log.vector_hits)
        .bind(&log.category)
        .bind(&log.user_ip)
        .bind(&log.user_agent)
        .bind(log.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO popular_questions
                (question_type, question_text, ask_count, avg_response_time, last_asked)
            VALUES (?, ?, 1, ?, ?)
            ON CONFLICT(question_type) DO UPDATE SET
                ask_count = popular_questions.ask_count + 1,
                avg_response_time =
                    (popular_questions.avg_response_time + excluded.avg_response_time) / 2,
                question_text = excluded.question_text,
                last_asked = excluded.last_asked
            "#,
        )
        .bind(&log.category)
        .bind(question_text)
        .bind(log.response_time)
        .bind(log.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            category = %log.category,
            response_time = log.response_time,
            "chat logged"
        );
        Ok(())
    }

    pub async fn get_analytics(&self) -> Result<AnalyticsReport> {
        self.report_at(chrono::Utc::now()).await
    }

    async fn report_at(&self, now: chrono::DateTime<chrono::Utc>) -> Result<AnalyticsReport> {
        let now_ts = now.timestamp();

        let stats = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_chats,
                AVG(response_time) AS avg_response_time,
                AVG(vector_hits) AS avg_vector_hits
            FROM chat_logs
            WHERE created_at > ?
            "#,
        )
        .bind(now_ts - 30 * DAY_SECS)
        .fetch_one(&self.pool)
        .await?;

        let popular_rows = sqlx::query(
            r#"
            SELECT question_type, ask_count, avg_response_time
            FROM popular_questions
            ORDER BY ask_count DESC
            LIMIT 10
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let recent_rows = sqlx::query(
            r#"
            SELECT query_category, COUNT(*) AS count
            FROM chat_logs
            WHERE created_at > ?
            GROUP BY query_category
            ORDER BY count DESC
            "#,
        )
        .bind(now_ts - 7 * DAY_SECS)
        .fetch_all(&self.pool)
        .await?;

        let avg_response_time: Option<f64> = stats.try_get("avg_response_time")?;
        let avg_vector_hits: Option<f64> = stats.try_get("avg_vector_hits")?;

        Ok(AnalyticsReport {
            total_chats: stats.try_get("total_chats")?,
            avg_response_time: round_to(avg_response_time.unwrap_or(0.0), 2),
            avg_vector_hits: round_to(avg_vector_hits.unwrap_or(0.0), 1),
            popular_categories: popular_rows
                .iter()
                .map(|row| PopularCategory {
                    kind: row.get("question_type"),
                    count: row.get("ask_count"),
                    avg_time: round_to(row.get("avg_response_time"), 2),
                })
                .collect(),
            recent_activity: recent_rows
                .iter()
                .map(|row| CategoryActivity {
                    category: row.get("query_category"),
                    count: row.get("count"),
                })
                .collect(),
            generated_at: now.to_rfc3339(),
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// First `max` characters of `text`, never splitting a character.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// `twin analytics`: print the aggregate report.
pub async fn run_analytics(config: &Config) -> Result<()> {
    let Some(analytics) = &config.analytics else {
        bail!("No [analytics] section in config");
    };

    let store = AnalyticsStore::connect(analytics).await?;
    let report = store.get_analytics().await?;

    println!("Digital Twin — Analytics");
    println!("========================");
    println!();
    println!("  Database:          {}", analytics.path.display());
    println!();
    println!("  Chats (30 days):   {}", report.total_chats);
    println!("  Avg response:      {:.2}s", report.avg_response_time);
    println!("  Avg vector hits:   {:.1}", report.avg_vector_hits);

    if !report.popular_categories.is_empty() {
        println!();
        println!("  Popular categories:");
        println!("  {:<26} {:>8} {:>10}", "CATEGORY", "ASKED", "AVG TIME");
        println!("  {}", "-".repeat(46));
        for p in &report.popular_categories {
            println!("  {:<26} {:>8} {:>9.2}s", p.kind, p.count, p.avg_time);
        }
    }

    if !report.recent_activity.is_empty() {
        println!();
        println!("  Last 7 days:");
        for a in &report.recent_activity {
            println!("  {:<26} {:>8}", a.category, a.count);
        }
    }

    println!();

    store.close().await;
    Ok(())
}
