//! Candidate prioritization: newer mail scores higher, a short allowlist of
//! high-value providers gets a fixed boost, and only the top-N candidates
//! proceed to extraction so a huge mailbox cannot blow up a scan.

/// Recency decays linearly to zero over this horizon.
const RECENCY_HORIZON_DAYS: f64 = 365.0;
const MAX_RECENCY_SCORE: f64 = 100.0;

/// Score one candidate from its delivery time and provider boost. `now_ms`
/// is passed in so scoring stays deterministic under test.
pub fn score(received_ms: Option<i64>, now_ms: i64, priority_boost: f64) -> f64 {
    let recency = match received_ms {
        Some(ts) => {
            let age_days = ((now_ms - ts).max(0) as f64) / 86_400_000.0;
            MAX_RECENCY_SCORE * (1.0 - (age_days / RECENCY_HORIZON_DAYS).min(1.0))
        }
        // Undated mail ranks behind everything dated.
        None => 0.0,
    };
    recency + priority_boost
}

/// Keep the `limit` best-scoring items, highest first.
pub fn take_top<T>(mut scored: Vec<(f64, T)>, limit: usize) -> Vec<T> {
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored.into_iter().map(|(_, item)| item).collect()
}
