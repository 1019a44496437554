use crate::repositories::{
    ScanLogRepository, SubscriptionRepository, UserRepository, UserRepositoryTrait,
};
use sqlx::{Pool, Postgres};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub user_repo: Arc<dyn UserRepositoryTrait + Send + Sync>,
    pub scan_logs: ScanLogRepository,
    pub subscriptions: SubscriptionRepository,
    pub db_pool: Pool<Postgres>,
}

impl AppState {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            user_repo: Arc::new(UserRepository::new(pool.clone())),
            scan_logs: ScanLogRepository::new(pool.clone()),
            subscriptions: SubscriptionRepository::new(pool.clone()),
            db_pool: pool,
        }
    }
}
