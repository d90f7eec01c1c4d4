//! Chatbot conversation state.
//!
//! Each conversation is a row keyed by a UUID carried in a session cookie, so
//! a text-only follow-up can be answered against the previously uploaded image
//! from any server instance.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::Result;

#[derive(Debug, Clone, FromRow)]
pub struct ChatSession {
    pub id: Uuid,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ChatSessionRepository {
    pool: PgPool,
}

impl ChatSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Look up a session, treating rows idle longer than `ttl_seconds` as
    /// gone. The cookie's `Max-Age` alone is not enough; clients choose their
    /// own cookies, so the TTL has to hold server-side too.
    pub async fn find_active(&self, id: Uuid, ttl_seconds: u64) -> Result<Option<ChatSession>> {
        let session = sqlx::query_as::<_, ChatSession>(
            "SELECT id, image_url, created_at, updated_at
             FROM chat_sessions
             WHERE id = $1
               AND updated_at >= now() - make_interval(secs => $2)",
        )
        .bind(id)
        .bind(ttl_seconds as f64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Delete sessions idle longer than `ttl_seconds`, returning the number of
    /// rows removed. Keeps the table from growing without bound.
    pub async fn prune_expired(&self, ttl_seconds: u64) -> Result<u64> {
        let pruned = sqlx::query(
            "DELETE FROM chat_sessions
             WHERE updated_at < now() - make_interval(secs => $1)",
        )
        .bind(ttl_seconds as f64)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(pruned)
    }

    pub async fn set_image_url(&self, id: Uuid, image_url: &str) -> Result<ChatSession> {
        let session = sqlx::query_as::<_, ChatSession>(
            "INSERT INTO chat_sessions (id, image_url)
             VALUES ($1, $2)
             ON CONFLICT (id)
             DO UPDATE SET image_url = EXCLUDED.image_url, updated_at = now()
             RETURNING id, image_url, created_at, updated_at",
        )
        .bind(id)
        .bind(image_url)
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }
}
