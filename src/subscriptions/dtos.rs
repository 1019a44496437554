use crate::entities::{BillingFrequency, SubscriptionCategory};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::ToSchema;

const MAX_NAME_LEN: usize = 200;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSubscriptionRequest {
    pub name: String,
    pub cost: Option<f64>,
    pub billing_frequency: Option<BillingFrequency>,
    pub category: Option<SubscriptionCategory>,
    pub next_billing_date: Option<NaiveDate>,
    pub status: Option<String>,
}

impl CreateSubscriptionRequest {
    pub fn validate(&self) -> Result<(), String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err("Name is required".to_string());
        }
        if name.len() > MAX_NAME_LEN {
            return Err("Name too long".to_string());
        }
        if let Some(cost) = self.cost
            && (!cost.is_finite() || cost < 0.0)
        {
            return Err("Cost must be a non-negative number".to_string());
        }
        Ok(())
    }
}

/// Partial update; omitted fields are left unchanged. Clearing
/// `is_pending_review` is how a user confirms a scanned subscription.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateSubscriptionRequest {
    pub name: Option<String>,
    pub cost: Option<f64>,
    pub billing_frequency: Option<BillingFrequency>,
    pub category: Option<SubscriptionCategory>,
    pub next_billing_date: Option<NaiveDate>,
    pub status: Option<String>,
    pub is_pending_review: Option<bool>,
}

impl UpdateSubscriptionRequest {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            let name = name.trim();
            if name.is_empty() {
                return Err("Name cannot be empty".to_string());
            }
            if name.len() > MAX_NAME_LEN {
                return Err("Name too long".to_string());
            }
        }
        if let Some(cost) = self.cost
            && (!cost.is_finite() || cost < 0.0)
        {
            return Err("Cost must be a non-negative number".to_string());
        }
        Ok(())
    }
}
