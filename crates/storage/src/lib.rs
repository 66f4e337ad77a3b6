use anyhow::Result;
use chrono::Utc;
use prefs::{parse_sound_flag, SOUND_PREF_KEY};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

pub const INIT_SQL: &str = include_str!("../../../scripts/init_db.sql");

pub const REQUIRED_TABLES: &[&str] = &["runs", "preferences", "notifications", "incidents"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRecord {
    pub style: String,
    pub title: String,
    pub body: String,
    pub ts_ms: i64,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(path: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(path)
            .await?;
        run_init_sql(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn insert_run(&self, run_id: &str, git_sha: Option<&str>) -> Result<()> {
        let host = hostname::get()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let ts_ms = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT OR REPLACE INTO runs (run_id, started_at_ms, git_sha, host) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(run_id)
        .bind(ts_ms)
        .bind(git_sha)
        .bind(host)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Names from [`REQUIRED_TABLES`] that do not exist in the database.
    pub async fn validate_required_tables(&self) -> Result<Vec<String>> {
        let mut missing = Vec::new();
        for table in REQUIRED_TABLES {
            let found: Option<String> = sqlx::query_scalar(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            )
            .bind(*table)
            .fetch_optional(&self.pool)
            .await?;
            if found.is_none() {
                missing.push(table.to_string());
            }
        }
        Ok(missing)
    }

    pub async fn get_pref(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar("SELECT value FROM preferences WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn set_pref(&self, key: &str, value: &str) -> Result<()> {
        let ts_ms = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT INTO preferences (key, value, updated_at_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at_ms = excluded.updated_at_ms",
        )
        .bind(key)
        .bind(value)
        .bind(ts_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_sound_enabled(&self) -> Result<bool> {
        let raw = self.get_pref(SOUND_PREF_KEY).await?;
        Ok(parse_sound_flag(raw.as_deref()))
    }

    pub async fn save_sound_enabled(&self, enabled: bool) -> Result<()> {
        self.set_pref(SOUND_PREF_KEY, if enabled { "true" } else { "false" })
            .await
    }

    pub async fn log_notification(
        &self,
        run_id: &str,
        style: &str,
        title: &str,
        body: &str,
    ) -> Result<()> {
        let ts_ms = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT INTO notifications (run_id, ts_ms, style, title, body) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(run_id)
        .bind(ts_ms)
        .bind(style)
        .bind(title)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent first.
    pub async fn recent_notifications(&self, limit: i64) -> Result<Vec<NotificationRecord>> {
        let rows: Vec<(String, String, String, i64)> = sqlx::query_as(
            "SELECT style, title, body, ts_ms FROM notifications ORDER BY id DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(style, title, body, ts_ms)| NotificationRecord {
                style,
                title,
                body,
                ts_ms,
            })
            .collect())
    }

    pub async fn log_incident(
        &self,
        run_id: &str,
        severity: &str,
        kind: &str,
        message: &str,
    ) -> Result<()> {
        let ts_ms = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT INTO incidents (run_id, ts_ms, severity, kind, message) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(run_id)
        .bind(ts_ms)
        .bind(severity)
        .bind(kind)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub async fn init_sqlite(path: &str) -> Result<Store> {
    let store = Store::connect(path).await?;
    info!(path = path, "sqlite initialized");
    Ok(store)
}

async fn run_init_sql(pool: &SqlitePool) -> Result<()> {
    for statement in INIT_SQL.split(';') {
        let trimmed = statement.trim();
        if trimmed.is_empty() {
            continue;
        }
        sqlx::query(trimmed).execute(pool).await?;
    }
    Ok(())
}
