use crate::entities::Organization;
use anyhow::Result;
use sqlx::{Pool, Postgres};

/// Read-only access to the platform-owned provider reference data.
#[derive(Clone)]
pub struct OrganizationRepository {
    pool: Pool<Postgres>,
}

impl OrganizationRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Organization>> {
        let org = sqlx::query_as::<_, Organization>(
            r#"
            SELECT id, name, category, logo_url, website_url, pricing_plans,
                   is_verified, created_at, updated_at
            FROM organizations
            WHERE lower(name) = lower($1)
            "#,
        )
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(org)
    }
}
