//! In-scan deduplication of extracted detections.
//!
//! Repeated billing emails from the same provider for the same amount and
//! date describe one subscription; the first detection wins and later ones
//! are discarded.

use chrono::NaiveDate;
use std::collections::HashSet;

/// Composite identity of one detection within a scan. Amounts are keyed in
/// cents so float noise cannot split a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DetectionKey {
    provider: String,
    amount_cents: Option<i64>,
    next_billing_date: Option<NaiveDate>,
}

impl DetectionKey {
    pub fn new(provider: &str, amount: Option<f64>, next_billing_date: Option<NaiveDate>) -> Self {
        Self {
            provider: provider.trim().to_lowercase(),
            amount_cents: amount.map(|a| (a * 100.0).round() as i64),
            next_billing_date,
        }
    }
}

#[derive(Debug, Default)]
pub struct Deduper {
    seen: HashSet<DetectionKey>,
}

impl Deduper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the key is new (first seen wins).
    pub fn insert(&mut self, key: DetectionKey) -> bool {
        self.seen.insert(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn identical_detections_collapse() {
        let mut dedupe = Deduper::new();
        assert!(dedupe.insert(DetectionKey::new("Netflix", Some(15.49), date(2026, 9, 1))));
        assert!(!dedupe.insert(DetectionKey::new("Netflix", Some(15.49), date(2026, 9, 1))));
        assert_eq!(dedupe.len(), 1);
    }

    #[test]
    fn provider_comparison_ignores_case_and_whitespace() {
        let mut dedupe = Deduper::new();
        assert!(dedupe.insert(DetectionKey::new("Netflix", Some(15.49), None)));
        assert!(!dedupe.insert(DetectionKey::new("  netflix ", Some(15.49), None)));
    }

    #[test]
    fn float_noise_does_not_split_keys() {
        let a = DetectionKey::new("Spotify", Some(9.99), None);
        let b = DetectionKey::new("Spotify", Some(9.990000000000001), None);
        assert_eq!(a, b);
    }

    #[test]
    fn differing_amount_or_date_is_a_distinct_detection() {
        let mut dedupe = Deduper::new();
        assert!(dedupe.insert(DetectionKey::new("Netflix", Some(15.49), date(2026, 9, 1))));
        assert!(dedupe.insert(DetectionKey::new("Netflix", Some(22.99), date(2026, 9, 1))));
        assert!(dedupe.insert(DetectionKey::new("Netflix", Some(15.49), date(2026, 10, 1))));
        assert_eq!(dedupe.len(), 3);
    }
}
