use anyhow::{bail, Result};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the analytics tables on an open pool. Idempotent.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    // One row per served query
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chat_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            query TEXT NOT NULL,
            response TEXT NOT NULL,
            response_time REAL NOT NULL,
            vector_hits INTEGER NOT NULL DEFAULT 0,
            query_category TEXT NOT NULL,
            user_ip TEXT,
            user_agent TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Per-category aggregates
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS popular_questions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            question_type TEXT NOT NULL UNIQUE,
            question_text TEXT NOT NULL,
            ask_count INTEGER NOT NULL DEFAULT 1,
            avg_response_time REAL NOT NULL DEFAULT 0,
            last_asked INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chat_logs_created_at ON chat_logs(created_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chat_logs_category ON chat_logs(query_category)")
        .execute(pool)
        .await?;

    Ok(())
}

/// `twin init`: create the analytics schema at the configured path.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let Some(analytics) = &config.analytics else {
        bail!("No [analytics] section in config; nothing to initialize");
    };

    let pool = db::connect(&analytics.path).await?;
    migrate(&pool).await?;
    pool.close().await;
    Ok(())
}
