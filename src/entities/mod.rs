use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// --- PostgreSQL Enums ---

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[sqlx(type_name = "scan_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Running,
    Completed,
    Failed,
}

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[sqlx(type_name = "billing_frequency", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BillingFrequency {
    Monthly,
    Yearly,
    Quarterly,
    Weekly,
    Daily,
}

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[sqlx(type_name = "subscription_category", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionCategory {
    Entertainment,
    Productivity,
    News,
    Utility,
    Health,
    Finance,
    Education,
    Shopping,
    Other,
}

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

/// --- Tables ---

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub pw_hash: String,
    pub created_at: DateTime<Utc>,
}

/// One execution of the mailbox scan pipeline. Created with status=running;
/// exactly one terminal update (completed or failed) closes it.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct ScanLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: ScanStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub emails_processed: i32,
    pub subscriptions_found: i32,
    pub error_message: Option<String>,
}

/// A detected or manually entered recurring subscription. Upserted by
/// (user_id, name); manual rows are never touched by the scan pipeline.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub name: String,
    pub cost: Option<f64>,
    pub billing_frequency: Option<BillingFrequency>,
    pub category: Option<SubscriptionCategory>,
    pub next_billing_date: Option<NaiveDate>,
    pub status: String,
    pub is_manual: bool,
    pub is_pending_review: bool,
    pub email_source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Reference data describing a known provider. Owned by the platform and
/// never mutated by the scan pipeline.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub category: Option<SubscriptionCategory>,
    pub logo_url: Option<String>,
    pub website_url: Option<String>,
    pub pricing_plans: Option<serde_json::Value>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Job {
    pub id: Uuid,
    pub kind: String,               // logical job name
    pub payload: serde_json::Value, // job data as JSONB
    pub run_at: DateTime<Utc>,      // next time the job is eligible
    pub attempts: i32,              // execution attempts so far
    pub max_attempts: i32,          // maximum attempts before giving up
    pub backoff_seconds: i32,       // populated when job fails
    pub status: JobStatus,
    pub last_error: Option<String>,
    pub visibility_till: Option<DateTime<Utc>>, // set while "running"
    pub reserved_by: Option<Uuid>,              // worker instance id
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
