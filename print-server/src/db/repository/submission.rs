//! Submission Repository
//!
//! One row per envelope identifier. Inserts are idempotent so broker
//! redeliveries never produce a second row.

use super::RepoResult;
use serde::Serialize;
use shared::Envelope;
use sqlx::SqlitePool;

/// Stored guestbook entry (image bytes are never persisted)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct SubmissionRecord {
    pub identifier: String,
    pub title: Option<String>,
    pub text: String,
    pub has_image: bool,
    /// Kept for abuse tracking, never served over HTTP
    #[serde(skip_serializing)]
    pub client_address: String,
    /// Milliseconds since the Unix epoch
    pub created_at: i64,
    pub printed: bool,
}

impl From<&Envelope> for SubmissionRecord {
    fn from(envelope: &Envelope) -> Self {
        Self {
            identifier: envelope.identifier.to_string(),
            title: envelope.title.clone(),
            text: envelope.text.clone(),
            has_image: envelope.image.is_some(),
            client_address: envelope.client_address.clone(),
            created_at: envelope.timestamp.timestamp_millis(),
            printed: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

/// Insert a new record; an existing identifier leaves the table untouched
pub async fn insert(pool: &SqlitePool, record: &SubmissionRecord) -> RepoResult<InsertOutcome> {
    let result = sqlx::query(
        "INSERT INTO submissions (identifier, title, text, has_image, client_address, created_at, printed) \
         VALUES (?, ?, ?, ?, ?, ?, 0) \
         ON CONFLICT(identifier) DO NOTHING",
    )
    .bind(&record.identifier)
    .bind(&record.title)
    .bind(&record.text)
    .bind(record.has_image)
    .bind(&record.client_address)
    .bind(record.created_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        Ok(InsertOutcome::AlreadyExists)
    } else {
        Ok(InsertOutcome::Inserted)
    }
}

pub async fn exists(pool: &SqlitePool, identifier: &str) -> RepoResult<bool> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM submissions WHERE identifier = ? LIMIT 1")
            .bind(identifier)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

/// Flag a record as rendered. Returns false for unknown identifiers.
pub async fn mark_printed(pool: &SqlitePool, identifier: &str) -> RepoResult<bool> {
    let result = sqlx::query("UPDATE submissions SET printed = 1 WHERE identifier = ?")
        .bind(identifier)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn find(pool: &SqlitePool, identifier: &str) -> RepoResult<Option<SubmissionRecord>> {
    let record = sqlx::query_as::<_, SubmissionRecord>(
        "SELECT identifier, title, text, has_image, client_address, created_at, printed \
         FROM submissions WHERE identifier = ?",
    )
    .bind(identifier)
    .fetch_optional(pool)
    .await?;
    Ok(record)
}

/// Guestbook page, newest first
pub async fn list(pool: &SqlitePool, offset: i64, limit: i64) -> RepoResult<Vec<SubmissionRecord>> {
    let records = sqlx::query_as::<_, SubmissionRecord>(
        "SELECT identifier, title, text, has_image, client_address, created_at, printed \
         FROM submissions ORDER BY created_at DESC, identifier DESC LIMIT ? OFFSET ?",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(records)
}

pub async fn count(pool: &SqlitePool) -> RepoResult<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM submissions")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
