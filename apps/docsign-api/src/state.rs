//! Application state for DocSign API

use anyhow::Result;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::PathBuf;

/// Hours a signing session stays valid unless `SESSION_TTL_HOURS` says otherwise.
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 72;

pub struct AppState {
    pub db: SqlitePool,
    pub session_ttl_hours: i64,
}

impl AppState {
    pub async fn new() -> Result<Self> {
        // Get database path from env or use default
        let db_path = std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            let data_dir = dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("docsign-api");
            std::fs::create_dir_all(&data_dir).ok();
            format!("sqlite:{}/docsign.db?mode=rwc", data_dir.display())
        });
        let session_ttl_hours = std::env::var("SESSION_TTL_HOURS")
            .ok()
            .and_then(|h| h.parse().ok())
            .unwrap_or(DEFAULT_SESSION_TTL_HOURS);

        tracing::info!("Connecting to database: {}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_path)
            .await?;

        Self::from_pool(pool, session_ttl_hours).await
    }

    /// Private in-memory database, used by tests.
    pub async fn in_memory() -> Result<Self> {
        // Every connection to :memory: is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool, DEFAULT_SESSION_TTL_HOURS).await
    }

    async fn from_pool(pool: SqlitePool, session_ttl_hours: i64) -> Result<Self> {
        Self::run_migrations(&pool).await?;
        Ok(Self {
            db: pool,
            session_ttl_hours,
        })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        tracing::info!("Running database migrations...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS templates (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                pdf_data BLOB NOT NULL,
                page_count INTEGER NOT NULL,
                coordinates_json TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                template_id TEXT NOT NULL REFERENCES templates(id),
                document_name TEXT NOT NULL,
                signer_name TEXT NOT NULL DEFAULT '',
                signer_email TEXT NOT NULL DEFAULT '',
                document_hash TEXT NOT NULL,
                pdf_data BLOB NOT NULL,
                signed_pdf BLOB,
                signed_hash TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                document_id TEXT NOT NULL REFERENCES documents(id),
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                expires_at TEXT
            )
            "#,
        )
        .execute(pool)
        .await?;

        // Index for fast lookups
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status)
            "#,
        )
        .execute(pool)
        .await?;

        tracing::info!("Migrations complete");
        Ok(())
    }
}

/// Get platform-specific data directory
mod dirs {
    use std::path::PathBuf;

    pub fn data_dir() -> Option<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            None
        }
    }
}
