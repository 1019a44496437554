use crate::entities::{BillingFrequency, Subscription, SubscriptionCategory};
use anyhow::Result;
use chrono::NaiveDate;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, organization_id, name, cost, billing_frequency, \
     category, next_billing_date, status, is_manual, is_pending_review, \
     email_source, created_at, updated_at";

/// One scan detection, ready to be written.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub name: String,
    pub organization_id: Option<Uuid>,
    pub cost: Option<f64>,
    pub billing_frequency: Option<BillingFrequency>,
    pub category: Option<SubscriptionCategory>,
    pub next_billing_date: Option<NaiveDate>,
    pub status: String,
    pub is_pending_review: bool,
    pub email_source: Option<String>,
}

/// Partial update for user-driven edits; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionChanges {
    pub name: Option<String>,
    pub cost: Option<f64>,
    pub billing_frequency: Option<BillingFrequency>,
    pub category: Option<SubscriptionCategory>,
    pub next_billing_date: Option<NaiveDate>,
    pub status: Option<String>,
    pub is_pending_review: Option<bool>,
}

#[derive(Clone)]
pub struct SubscriptionRepository {
    pool: Pool<Postgres>,
}

impl SubscriptionRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Remove the user's scan-sourced rows before a new scan. Manual entries
    /// are user data and survive.
    pub async fn clear_scanned(&self, user_id: Uuid) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM subscriptions WHERE user_id = $1 AND is_manual = false")
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    /// Bulk upsert of scan detections, keyed by (user_id, name). Runs in one
    /// transaction: a failed write aborts the whole batch and the scan.
    pub async fn upsert_detected(
        &self,
        user_id: Uuid,
        detections: &[NewSubscription],
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for detection in detections {
            sqlx::query(
                r#"
                INSERT INTO subscriptions
                      (user_id, organization_id, name, cost, billing_frequency,
                       category, next_billing_date, status, is_manual,
                       is_pending_review, email_source)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, false, $9, $10)
                ON CONFLICT (user_id, name) DO UPDATE
                  SET organization_id   = EXCLUDED.organization_id,
                      cost              = EXCLUDED.cost,
                      billing_frequency = EXCLUDED.billing_frequency,
                      category          = EXCLUDED.category,
                      next_billing_date = EXCLUDED.next_billing_date,
                      status            = EXCLUDED.status,
                      is_manual         = false,
                      is_pending_review = EXCLUDED.is_pending_review,
                      email_source      = EXCLUDED.email_source,
                      updated_at        = now()
                "#,
            )
            .bind(user_id)
            .bind(detection.organization_id)
            .bind(&detection.name)
            .bind(detection.cost)
            .bind(detection.billing_frequency)
            .bind(detection.category)
            .bind(detection.next_billing_date)
            .bind(&detection.status)
            .bind(detection.is_pending_review)
            .bind(&detection.email_source)
            .execute(&mut *tx)
            .await?;
            written += 1;
        }

        tx.commit().await?;
        Ok(written)
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM subscriptions
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn find(&self, user_id: Uuid, id: Uuid) -> Result<Option<Subscription>> {
        let row = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM subscriptions
            WHERE id = $1 AND user_id = $2
            "#
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Insert a user-entered subscription.
    pub async fn create_manual(
        &self,
        user_id: Uuid,
        detection: &NewSubscription,
    ) -> Result<Subscription> {
        let row = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            INSERT INTO subscriptions
                  (user_id, organization_id, name, cost, billing_frequency,
                   category, next_billing_date, status, is_manual,
                   is_pending_review, email_source)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, true, false, NULL)
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(detection.organization_id)
        .bind(&detection.name)
        .bind(detection.cost)
        .bind(detection.billing_frequency)
        .bind(detection.category)
        .bind(detection.next_billing_date)
        .bind(&detection.status)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Apply a partial update; absent fields keep their stored value.
    pub async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        changes: &SubscriptionChanges,
    ) -> Result<Option<Subscription>> {
        let row = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            UPDATE subscriptions
            SET name              = COALESCE($3, name),
                cost              = COALESCE($4, cost),
                billing_frequency = COALESCE($5, billing_frequency),
                category          = COALESCE($6, category),
                next_billing_date = COALESCE($7, next_billing_date),
                status            = COALESCE($8, status),
                is_pending_review = COALESCE($9, is_pending_review),
                updated_at        = now()
            WHERE id = $1 AND user_id = $2
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .bind(&changes.name)
        .bind(changes.cost)
        .bind(changes.billing_frequency)
        .bind(changes.category)
        .bind(changes.next_billing_date)
        .bind(&changes.status)
        .bind(changes.is_pending_review)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
