//! Database module for the SQLite member store.
//!
//! The store is written by external tools; this crate only reads it. Triggers
//! on `members` bump `meta.revision_id` so that changes can be detected.

mod repository;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            schema_version INTEGER NOT NULL DEFAULT 1,
            revision_id INTEGER NOT NULL DEFAULT 0,
            generated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        INSERT OR IGNORE INTO meta (id, schema_version, revision_id, generated_at)
        VALUES (1, 1, 0, datetime('now'));
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS members (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'Member',
            batch TEXT,
            status TEXT,
            skills TEXT,
            avatar_url TEXT,
            github_url TEXT,
            github_handle TEXT,
            linkedin_url TEXT,
            bio TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_members_created_at ON members(created_at DESC);")
        .execute(pool)
        .await?;

    // One trigger per statement kind; the feed does not distinguish them.
    for (name, event) in [
        ("members_revision_insert", "INSERT"),
        ("members_revision_update", "UPDATE"),
        ("members_revision_delete", "DELETE"),
    ] {
        let statement = format!(
            r#"
            CREATE TRIGGER IF NOT EXISTS {name} AFTER {event} ON members
            BEGIN
                UPDATE meta SET revision_id = revision_id + 1, generated_at = datetime('now')
                WHERE id = 1;
            END;
            "#
        );
        sqlx::query(&statement).execute(pool).await?;
    }

    Ok(())
}
