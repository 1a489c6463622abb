//! Read-only repository over the member store.

use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::errors::DirectoryError;
use crate::models::Member;

/// Column list served by the read endpoint, in response order.
const MEMBER_COLUMNS: &str = "id, name, role, batch, status, skills, avatar_url, github_url, \
     github_handle, linkedin_url, bio, created_at";

/// Database repository for member reads.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get the current revision ID. It moves on every insert, update or delete.
    pub async fn revision_id(&self) -> Result<i64, DirectoryError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("revision_id"))
    }

    /// List all members, newest first.
    ///
    /// Timestamps are compared as instants, so RFC 3339 and SQLite's own
    /// `YYYY-MM-DD HH:MM:SS` text sort together. Rows that cannot be read are
    /// skipped.
    pub async fn list_members(&self) -> Result<Vec<Member>, DirectoryError> {
        let query = format!(
            "SELECT {} FROM members ORDER BY julianday(created_at) DESC, created_at DESC",
            MEMBER_COLUMNS
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        Ok(rows
            .iter()
            .filter_map(|row| match member_from_row(row) {
                Ok(member) => Some(member),
                Err(e) => {
                    let id: Option<String> = row.try_get("id").ok();
                    warn!(?id, error = %e, "Skipping unreadable member row");
                    None
                }
            })
            .collect())
    }
}

// Helper functions for row conversion

fn member_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Member, sqlx::Error> {
    let skills_str: Option<String> = row.try_get("skills")?;
    Ok(Member {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        role: row.try_get("role")?,
        batch: row.try_get("batch")?,
        status: row.try_get("status")?,
        skills: skills_str.map(|s| parse_json_array(&s)).unwrap_or_default(),
        avatar_url: row.try_get("avatar_url")?,
        github_url: row.try_get("github_url")?,
        github_handle: row.try_get("github_handle")?,
        linkedin_url: row.try_get("linkedin_url")?,
        bio: row.try_get("bio")?,
        created_at: row.try_get("created_at")?,
    })
}

fn parse_json_array(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}
