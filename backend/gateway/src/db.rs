//! Database layer — migrations, the submission ledger and the credential cache.

use serde::Serialize;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::info;

use crate::calls::SubmissionKind;
use crate::errors::Result;
use crate::tracker::{Resolution, SubmissionState};
use crate::wallet::JobHandle;

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };
    // Create the database file on first start.
    let url = if url.contains(":memory:") || url.contains("mode=") {
        url
    } else if url.contains('?') {
        format!("{url}&mode=rwc")
    } else {
        format!("{url}?mode=rwc")
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

/// Single-connection in-memory database with migrations applied.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

// ─────────────────────────────────────────────────────────
// Submission ledger
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SubmissionRecord {
    pub id: i64,
    pub job_id: String,
    pub kind: String,
    pub network: String,
    pub sender: String,
    pub campaign_id: Option<String>,
    pub amount: Option<String>,
    pub state: String,
    pub order_status: Option<String>,
    pub attempts: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SubmissionRecord {
    pub fn submission_state(&self) -> SubmissionState {
        SubmissionState::from_db(&self.state)
    }
}

#[derive(Debug, Clone)]
pub struct NewSubmission<'a> {
    pub job: &'a JobHandle,
    pub kind: SubmissionKind,
    pub network: &'a str,
    pub sender: &'a str,
    pub campaign_id: Option<String>,
    pub amount: Option<String>,
}

/// Record a freshly accepted job as `pending`.
pub async fn insert_submission(pool: &SqlitePool, new: &NewSubmission<'_>) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO submissions (job_id, kind, network, sender, campaign_id, amount, state)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(new.job.as_str())
    .bind(new.kind.as_str())
    .bind(new.network)
    .bind(new.sender)
    .bind(&new.campaign_id)
    .bind(&new.amount)
    .bind(SubmissionState::Pending.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

/// Store the outcome of one or more order-history lookups.
///
/// Resolved rows are never rewritten, and a timed-out row only moves on to a
/// resolved state. Returns whether the row changed.
pub async fn record_resolution(pool: &SqlitePool, job: &JobHandle, resolution: &Resolution) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE submissions
        SET    state        = ?2,
               order_status = COALESCE(?3, order_status),
               attempts     = attempts + ?4,
               updated_at   = strftime('%s', 'now')
        WHERE  job_id = ?1
          AND  state NOT IN ('success', 'failure')
          AND  (state <> 'timed_out' OR ?2 IN ('success', 'failure'))
        "#,
    )
    .bind(job.as_str())
    .bind(resolution.state.as_str())
    .bind(resolution.order.as_ref().map(|o| o.status.clone()))
    .bind(resolution.attempts as i64)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn get_submission(pool: &SqlitePool, job_id: &str) -> Result<Option<SubmissionRecord>> {
    let row = sqlx::query_as::<_, SubmissionRecord>(
        r#"
        SELECT id, job_id, kind, network, sender, campaign_id, amount, state,
               order_status, attempts, created_at, updated_at
        FROM   submissions
        WHERE  job_id = ?1
        "#,
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// All submissions from `sender`, newest first.
pub async fn get_submissions_for_sender(pool: &SqlitePool, sender: &str) -> Result<Vec<SubmissionRecord>> {
    let rows = sqlx::query_as::<_, SubmissionRecord>(
        r#"
        SELECT id, job_id, kind, network, sender, campaign_id, amount, state,
               order_status, attempts, created_at, updated_at
        FROM   submissions
        WHERE  sender = ?1
        ORDER  BY id DESC
        "#,
    )
    .bind(sender)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Credential cache
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CachedCredential {
    pub subject_address: String,
    pub credential: String,
    pub issued_at: i64,
}

pub async fn save_credential(pool: &SqlitePool, subject: &str, credential: &str, issued_at: i64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO credentials (subject_address, credential, issued_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(subject_address) DO UPDATE SET
            credential = excluded.credential,
            issued_at  = excluded.issued_at
        "#,
    )
    .bind(subject)
    .bind(credential)
    .bind(issued_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_credential(pool: &SqlitePool, subject: &str) -> Result<Option<CachedCredential>> {
    let row = sqlx::query_as::<_, CachedCredential>(
        "SELECT subject_address, credential, issued_at FROM credentials WHERE subject_address = ?1",
    )
    .bind(subject)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
