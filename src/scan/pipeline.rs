//! The background scan pipeline: provider search, message fetch and decode,
//! batched extraction, dedup, confidence scoring, and the final bulk upsert.
//!
//! Failure policy: a provider or message that errors is skipped and logged;
//! an extraction call that errors skips that email; only a failed write
//! aborts the scan and propagates to the finalizer.

use crate::extract::{ExtractedSubscription, ExtractionClient, parse};
use crate::mailbox::{MailboxClient, MailboxError, body, types::{Message, MessageRef}};
use crate::providers::{self, Provider};
use crate::repositories::{NewSubscription, OrganizationRepository, SubscriptionRepository};
use crate::scan::confidence::{self, Evidence, REVIEW_THRESHOLD};
use crate::scan::dedupe::{Deduper, DetectionKey};
use crate::scan::rank;
use anyhow::Result;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Bounded worker count for provider searches and message fetches.
pub const SEARCH_CONCURRENCY: usize = 5;
/// Per-provider cap on search results.
const PER_PROVIDER_MAX_RESULTS: u32 = 20;
/// Inter-request pause to stay under the mailbox API's rate limits.
const INTER_REQUEST_DELAY: Duration = Duration::from_millis(150);
/// Only the top-N ranked candidates proceed to extraction.
const MAX_EXTRACTION_CANDIDATES: usize = 50;
/// Extraction runs in small sequential batches with a pause between them;
/// the extraction service rate-limits harder than the mailbox API.
const EXTRACTION_BATCH_SIZE: usize = 3;
const EXTRACTION_BATCH_DELAY: Duration = Duration::from_millis(500);

/// Everything the pipeline needs besides the user it runs for.
pub struct ScanContext {
    pub mailbox: Arc<MailboxClient>,
    pub extractor: Arc<ExtractionClient>,
    pub subscriptions: SubscriptionRepository,
    pub organizations: OrganizationRepository,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    pub emails_processed: i32,
    pub subscriptions_found: i32,
}

/// A decoded email waiting for extraction.
#[derive(Debug, Clone)]
struct EmailCandidate {
    provider: &'static Provider,
    message_id: String,
    subject: String,
    sender: String,
    received_ms: Option<i64>,
    body: String,
}

/// A candidate plus what the extraction service made of it.
#[derive(Debug, Clone)]
struct Detection {
    candidate: EmailCandidate,
    extracted: ExtractedSubscription,
}

/// Run one full scan for `user_id`. Returns the counts for the finalizer;
/// the only error that escapes is a failed write.
#[instrument(skip(ctx), fields(user_id = %user_id))]
pub async fn run_scan(ctx: &ScanContext, user_id: Uuid) -> Result<ScanOutcome> {
    let refs = search_providers(&ctx.mailbox).await?;
    info!(message_refs = refs.len(), "provider search finished");

    let candidates = fetch_candidates(&ctx.mailbox, refs).await?;
    let candidates = prioritize(candidates);
    let emails_processed = candidates.len() as i32;
    info!(candidates = emails_processed, "message fetch finished");

    let detections = extract_batches(&ctx.extractor, &candidates).await;
    info!(detections = detections.len(), "extraction finished");

    let rows = assemble_rows(ctx, detections).await;
    let subscriptions_found = if rows.is_empty() {
        0
    } else {
        ctx.subscriptions.upsert_detected(user_id, &rows).await? as i32
    };
    info!(subscriptions_found, "subscription write finished");

    Ok(ScanOutcome {
        emails_processed,
        subscriptions_found,
    })
}

/// Search every provider's query with bounded concurrency. A failed search
/// contributes zero messages. Message ids are deduplicated across providers
/// so one email matching two queries is fetched once.
async fn search_providers(
    mailbox: &Arc<MailboxClient>,
) -> Result<Vec<(&'static Provider, MessageRef)>> {
    let semaphore = Arc::new(Semaphore::new(SEARCH_CONCURRENCY));
    let mut tasks = JoinSet::new();

    for provider in providers::all() {
        let permit = semaphore.clone().acquire_owned().await?;
        let mailbox = Arc::clone(mailbox);
        tasks.spawn(async move {
            let _permit = permit;
            sleep(INTER_REQUEST_DELAY).await;
            match search_with_retry(&mailbox, provider).await {
                Ok(refs) => (provider, refs),
                Err(e) => {
                    warn!(provider = provider.name, error = %e, "provider search failed, skipping");
                    (provider, Vec::new())
                }
            }
        });
    }

    let mut seen_ids = HashSet::new();
    let mut refs = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((provider, provider_refs)) => {
                for message_ref in provider_refs {
                    if seen_ids.insert(message_ref.id.clone()) {
                        refs.push((provider, message_ref));
                    }
                }
            }
            Err(e) => warn!(error = %e, "search task failed"),
        }
    }
    Ok(refs)
}

/// Fetch message details with bounded concurrency and decode their bodies.
/// Messages that fail to fetch or decode to a usable body are dropped.
async fn fetch_candidates(
    mailbox: &Arc<MailboxClient>,
    refs: Vec<(&'static Provider, MessageRef)>,
) -> Result<Vec<EmailCandidate>> {
    let semaphore = Arc::new(Semaphore::new(SEARCH_CONCURRENCY));
    let mut tasks = JoinSet::new();

    for (provider, message_ref) in refs {
        let permit = semaphore.clone().acquire_owned().await?;
        let mailbox = Arc::clone(mailbox);
        tasks.spawn(async move {
            let _permit = permit;
            sleep(INTER_REQUEST_DELAY).await;
            let message = match fetch_with_retry(&mailbox, &message_ref.id).await {
                Ok(message) => message,
                Err(e) => {
                    warn!(message_id = %message_ref.id, error = %e, "message fetch failed, skipping");
                    return None;
                }
            };

            let Some(text) = body::extract_text(&message) else {
                debug!(message_id = %message.id, "body empty or too short, discarding");
                return None;
            };

            Some(EmailCandidate {
                provider,
                message_id: message.id.clone(),
                subject: message.subject().to_string(),
                sender: message.sender().to_string(),
                received_ms: message.internal_date_ms(),
                body: text,
            })
        });
    }

    let mut candidates = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Some(candidate)) => candidates.push(candidate),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "message fetch task failed"),
        }
    }
    Ok(candidates)
}

/// One retry for transient upstream failures; anything else (including a 401
/// that survived the client's own refresh-and-replay) is final for the unit.
async fn search_with_retry(
    mailbox: &MailboxClient,
    provider: &Provider,
) -> Result<Vec<MessageRef>, MailboxError> {
    match mailbox
        .list_messages(provider.query, PER_PROVIDER_MAX_RESULTS)
        .await
    {
        Err(e) if e.should_retry() => {
            debug!(provider = provider.name, error = %e, "search failed, retrying once");
            sleep(INTER_REQUEST_DELAY).await;
            mailbox
                .list_messages(provider.query, PER_PROVIDER_MAX_RESULTS)
                .await
        }
        other => other,
    }
}

async fn fetch_with_retry(mailbox: &MailboxClient, id: &str) -> Result<Message, MailboxError> {
    match mailbox.get_message(id).await {
        Err(e) if e.should_retry() => {
            debug!(message_id = %id, error = %e, "message fetch failed, retrying once");
            sleep(INTER_REQUEST_DELAY).await;
            mailbox.get_message(id).await
        }
        other => other,
    }
}

/// Rank by recency plus provider boost and keep the top-N, bounding the
/// extraction work per scan regardless of mailbox size.
fn prioritize(candidates: Vec<EmailCandidate>) -> Vec<EmailCandidate> {
    let now_ms = Utc::now().timestamp_millis();
    let scored = candidates
        .into_iter()
        .map(|c| {
            (
                rank::score(c.received_ms, now_ms, c.provider.priority_boost),
                c,
            )
        })
        .collect();
    rank::take_top(scored, MAX_EXTRACTION_CANDIDATES)
}

/// Run extraction in small sequential batches. Per-email failures are
/// logged and skipped; they never abort the batch.
async fn extract_batches(
    extractor: &ExtractionClient,
    candidates: &[EmailCandidate],
) -> Vec<Detection> {
    let mut detections = Vec::new();

    for (batch_index, batch) in candidates.chunks(EXTRACTION_BATCH_SIZE).enumerate() {
        if batch_index > 0 {
            sleep(EXTRACTION_BATCH_DELAY).await;
        }
        for candidate in batch {
            match extractor.extract(&candidate.body).await {
                Ok(extracted) if !extracted.is_empty() => detections.push(Detection {
                    candidate: candidate.clone(),
                    extracted,
                }),
                Ok(_) => {
                    debug!(message_id = %candidate.message_id, "no subscription in email");
                }
                Err(e) => {
                    warn!(message_id = %candidate.message_id, error = %e, "extraction failed, skipping email");
                }
            }
        }
    }
    detections
}

/// Dedup detections, score confidence, link organizations, and shape the
/// rows for the bulk upsert.
async fn assemble_rows(ctx: &ScanContext, detections: Vec<Detection>) -> Vec<NewSubscription> {
    let mut dedupe = Deduper::new();
    let mut rows = Vec::new();

    for detection in detections {
        let Some(mut row) = detection_row(&detection) else {
            continue;
        };

        let key = DetectionKey::new(
            &row.name,
            row.cost,
            detection.extracted.next_billing_date,
        );
        if !dedupe.insert(key) {
            debug!(provider = %row.name, "duplicate detection discarded");
            continue;
        }

        // Link the platform's reference row when one exists. A failed lookup
        // only loses the link; the write decides whether the scan fails.
        match ctx.organizations.find_by_name(&row.name).await {
            Ok(Some(org)) => row.organization_id = Some(org.id),
            Ok(None) => {}
            Err(e) => warn!(provider = %row.name, error = %e, "organization lookup failed"),
        }

        rows.push(row);
    }
    rows
}

/// Pure shaping of one detection into a subscription row. Returns `None`
/// when the extraction carried no provider name.
fn detection_row(detection: &Detection) -> Option<NewSubscription> {
    let candidate = &detection.candidate;
    let extracted = &detection.extracted;
    let name = extracted.provider.clone()?;

    // Domain evidence is judged against the table entry for the extracted
    // name when we know it, else against the provider whose query found the
    // email.
    let table_entry = providers::find(&name).unwrap_or(candidate.provider);
    let evidence = Evidence {
        domain_match: providers::domain_matches(table_entry, &candidate.sender),
        subject_keyword: confidence::subject_has_keyword(&candidate.subject),
        complete_fields: extracted.amount.is_some() && extracted.next_billing_date.is_some(),
    };
    let score = confidence::score(evidence);

    Some(NewSubscription {
        name,
        organization_id: None,
        cost: extracted.amount,
        billing_frequency: parse::infer_frequency(&candidate.body),
        category: Some(table_entry.category),
        next_billing_date: extracted.next_billing_date,
        status: extracted
            .status
            .clone()
            .unwrap_or_else(|| "active".to_string()),
        is_pending_review: score < REVIEW_THRESHOLD,
        email_source: Some(candidate.sender.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::BillingFrequency;

    fn netflix_candidate() -> EmailCandidate {
        EmailCandidate {
            provider: providers::find("Netflix").unwrap(),
            message_id: "m1".to_string(),
            subject: "Your Netflix payment receipt".to_string(),
            sender: "info@netflix.com".to_string(),
            received_ms: Some(1_714_000_000_000),
            body: "Your Netflix payment of $15.49 was processed for your monthly plan."
                .to_string(),
        }
    }

    fn extraction(provider: &str, amount: Option<f64>) -> ExtractedSubscription {
        ExtractedSubscription {
            provider: Some(provider.to_string()),
            amount,
            next_billing_date: chrono::NaiveDate::from_ymd_opt(2026, 9, 1),
            status: Some("active".to_string()),
        }
    }

    #[test]
    fn strong_evidence_skips_review() {
        let detection = Detection {
            candidate: netflix_candidate(),
            extracted: extraction("Netflix", Some(15.49)),
        };
        let row = detection_row(&detection).unwrap();
        assert_eq!(row.name, "Netflix");
        assert_eq!(row.cost, Some(15.49));
        assert_eq!(row.billing_frequency, Some(BillingFrequency::Monthly));
        assert!(!row.is_pending_review);
        assert_eq!(row.email_source.as_deref(), Some("info@netflix.com"));
    }

    #[test]
    fn weak_evidence_is_flagged_for_review() {
        let mut candidate = netflix_candidate();
        candidate.sender = "newsletter@somewhere-else.example".to_string();
        candidate.subject = "Quick note".to_string();
        let detection = Detection {
            candidate,
            extracted: ExtractedSubscription {
                provider: Some("Netflix".to_string()),
                amount: None,
                next_billing_date: None,
                status: None,
            },
        };
        let row = detection_row(&detection).unwrap();
        assert!(row.is_pending_review);
        assert_eq!(row.status, "active");
    }

    #[test]
    fn empty_extraction_produces_no_row() {
        let detection = Detection {
            candidate: netflix_candidate(),
            extracted: ExtractedSubscription::default(),
        };
        assert!(detection_row(&detection).is_none());
    }

    #[test]
    fn unknown_provider_falls_back_to_the_search_provider() {
        let detection = Detection {
            candidate: netflix_candidate(),
            extracted: extraction("Netflix Premium Ultra", Some(22.99)),
        };
        let row = detection_row(&detection).unwrap();
        // Unknown name, but the searching provider's domain still matches.
        assert!(!row.is_pending_review);
        assert_eq!(row.name, "Netflix Premium Ultra");
    }
}
