use crate::extract::ExtractionClient;
use crate::jobs::handler::JobHandler;
use crate::mailbox::MailboxClient;
use crate::repositories::{OrganizationRepository, ScanLogRepository, SubscriptionRepository};
use crate::scan::{ScanContext, run_scan};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{Span, error, info, instrument};
use uuid::Uuid;

pub const SCAN_MAILBOX_JOB_KIND: &str = "scan_mailbox";

#[derive(Debug, Serialize, Deserialize)]
pub struct ScanMailboxPayload {
    pub user_id: Uuid,
    pub scan_log_id: Uuid,
}

/// Runs the mailbox scan pipeline and finalizes the scan log.
///
/// The terminal scan-log update happens here in every case: completed with
/// counts on success, failed with the error message otherwise. Scan jobs are
/// enqueued with `max_attempts = 1` - a failed scan is never re-run
/// automatically, the user triggers a new one.
#[derive(Clone)]
pub struct ScanMailboxJobHandler {
    mailbox: Arc<MailboxClient>,
    extractor: Arc<ExtractionClient>,
}

impl ScanMailboxJobHandler {
    pub fn new(mailbox: Arc<MailboxClient>, extractor: Arc<ExtractionClient>) -> Self {
        Self { mailbox, extractor }
    }
}

#[async_trait]
impl JobHandler for ScanMailboxJobHandler {
    #[instrument(skip(self, pool, span), fields(user_id, scan_log_id))]
    async fn run(
        &self,
        payload: serde_json::Value,
        pool: &PgPool,
        span: Span,
    ) -> anyhow::Result<()> {
        let payload: ScanMailboxPayload = serde_json::from_value(payload)?;
        span.record("user_id", tracing::field::display(payload.user_id));
        span.record("scan_log_id", tracing::field::display(payload.scan_log_id));

        let scan_logs = ScanLogRepository::new(pool.clone());
        let ctx = ScanContext {
            mailbox: self.mailbox.clone(),
            extractor: self.extractor.clone(),
            subscriptions: SubscriptionRepository::new(pool.clone()),
            organizations: OrganizationRepository::new(pool.clone()),
        };

        match run_scan(&ctx, payload.user_id).await {
            Ok(outcome) => {
                info!(
                    emails_processed = outcome.emails_processed,
                    subscriptions_found = outcome.subscriptions_found,
                    "scan completed"
                );
                scan_logs
                    .mark_completed(
                        payload.scan_log_id,
                        outcome.emails_processed,
                        outcome.subscriptions_found,
                    )
                    .await?;
                Ok(())
            }
            Err(scan_error) => {
                error!(error = %scan_error, "scan failed");
                scan_logs
                    .mark_failed(payload.scan_log_id, &scan_error.to_string())
                    .await?;
                Err(scan_error)
            }
        }
    }

    fn kind(&self) -> &'static str {
        SCAN_MAILBOX_JOB_KIND
    }
}
