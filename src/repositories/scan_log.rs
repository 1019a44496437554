use crate::entities::ScanLog;
use anyhow::{Result, bail};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

const SCAN_LOG_COLUMNS: &str = "id, user_id, status, started_at, completed_at, \
     emails_processed, subscriptions_found, error_message";

/// Outcome of the trigger's conditional insert.
#[derive(Debug, Clone)]
pub enum ScanStart {
    /// A new running scan log was created for the caller.
    Started(ScanLog),
    /// A scan was already running; no new log was created.
    AlreadyRunning(ScanLog),
}

#[derive(Clone)]
pub struct ScanLogRepository {
    pool: Pool<Postgres>,
}

impl ScanLogRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Create a running scan log unless one already exists for the user.
    ///
    /// Check-then-create is a single conditional insert against the partial
    /// unique index on `(user_id) WHERE status = 'running'`, so two
    /// simultaneous triggers cannot both start a pipeline.
    pub async fn start_scan(&self, user_id: Uuid) -> Result<ScanStart> {
        // One retry covers the window where the running scan we lost to
        // finishes before we can read it back.
        for _ in 0..2 {
            let inserted = sqlx::query_as::<_, ScanLog>(&format!(
                r#"
                INSERT INTO scan_logs (user_id)
                VALUES ($1)
                ON CONFLICT (user_id) WHERE status = 'running' DO NOTHING
                RETURNING {SCAN_LOG_COLUMNS}
                "#
            ))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(log) = inserted {
                return Ok(ScanStart::Started(log));
            }
            if let Some(existing) = self.find_running(user_id).await? {
                return Ok(ScanStart::AlreadyRunning(existing));
            }
        }
        bail!("scan log state changed concurrently for user {user_id}");
    }

    pub async fn find_running(&self, user_id: Uuid) -> Result<Option<ScanLog>> {
        let log = sqlx::query_as::<_, ScanLog>(&format!(
            r#"
            SELECT {SCAN_LOG_COLUMNS}
            FROM scan_logs
            WHERE user_id = $1 AND status = 'running'
            "#
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(log)
    }

    pub async fn latest_for_user(&self, user_id: Uuid) -> Result<Option<ScanLog>> {
        let log = sqlx::query_as::<_, ScanLog>(&format!(
            r#"
            SELECT {SCAN_LOG_COLUMNS}
            FROM scan_logs
            WHERE user_id = $1
            ORDER BY started_at DESC
            LIMIT 1
            "#
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(log)
    }

    /// Terminal transition: pipeline completed.
    pub async fn mark_completed(
        &self,
        id: Uuid,
        emails_processed: i32,
        subscriptions_found: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE scan_logs
            SET status = 'completed',
                completed_at = now(),
                emails_processed = $2,
                subscriptions_found = $3
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(id)
        .bind(emails_processed)
        .bind(subscriptions_found)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Terminal transition: pipeline failed.
    pub async fn mark_failed(&self, id: Uuid, error_message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE scan_logs
            SET status = 'failed',
                completed_at = now(),
                error_message = $2
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(id)
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
