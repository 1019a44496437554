//! Fail-open parsing of the structured-extraction response.
//!
//! The external service is asked for a JSON object with exactly four fields;
//! in practice the content comes back fenced, prefixed with prose, or not as
//! JSON at all. A malformed response must not fail the scan, so every parse
//! path degrades to an empty result instead of erroring.

use crate::entities::BillingFrequency;
use chrono::NaiveDate;
use serde_json::Value;

/// Fields the extraction service is asked to produce for one email.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedSubscription {
    pub provider: Option<String>,
    pub amount: Option<f64>,
    pub next_billing_date: Option<NaiveDate>,
    pub status: Option<String>,
}

impl ExtractedSubscription {
    /// An extraction without a provider name identifies nothing.
    pub fn is_empty(&self) -> bool {
        self.provider.is_none()
    }
}

/// Parse the model's response content. Never fails: anything that cannot be
/// understood comes back as the empty extraction.
pub fn parse_extraction(content: &str) -> ExtractedSubscription {
    let Some(json) = extract_json_object(content) else {
        return ExtractedSubscription::default();
    };

    let Ok(value) = serde_json::from_str::<Value>(&json) else {
        return ExtractedSubscription::default();
    };

    ExtractedSubscription {
        provider: string_field(&value, &["provider", "provider_name", "name"]),
        amount: amount_field(&value, &["amount", "billing_amount", "cost"]),
        next_billing_date: date_field(&value, &["next_billing_date", "next_billing"]),
        status: string_field(&value, &["status"]),
    }
}

/// Infer a billing cadence from the raw email text. The extraction contract
/// is fixed at four fields, so cadence comes from keyword evidence instead.
pub fn infer_frequency(text: &str) -> Option<BillingFrequency> {
    let lower = text.to_lowercase();
    if lower.contains("monthly") || lower.contains("per month") || lower.contains("/month") {
        Some(BillingFrequency::Monthly)
    } else if lower.contains("yearly")
        || lower.contains("annual")
        || lower.contains("per year")
        || lower.contains("/year")
    {
        Some(BillingFrequency::Yearly)
    } else if lower.contains("quarterly") {
        Some(BillingFrequency::Quarterly)
    } else if lower.contains("weekly") || lower.contains("per week") {
        Some(BillingFrequency::Weekly)
    } else {
        None
    }
}

/// Pull the first JSON object out of the content, tolerating markdown fences
/// and surrounding prose.
fn extract_json_object(content: &str) -> Option<String> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(content[start..=end].to_string())
}

fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null") && !s.eq_ignore_ascii_case("unknown"))
            .map(str::to_string)
    })
}

/// Amounts arrive as numbers, "15.49", or "$15.49".
fn amount_field(value: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| {
        let field = value.get(key)?;
        if let Some(n) = field.as_f64() {
            return (n.is_finite() && n >= 0.0).then_some(n);
        }
        let s = field.as_str()?;
        let cleaned: String = s
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
    })
}

fn date_field(value: &Value, keys: &[&str]) -> Option<NaiveDate> {
    keys.iter().find_map(|key| {
        let s = value.get(key)?.as_str()?;
        // Accept plain dates and timestamps with a date prefix.
        let date_part = s.get(..10).unwrap_or(s);
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_clean_response() {
        let content = r#"{"provider": "Netflix", "amount": 15.49, "next_billing_date": "2026-09-01", "status": "active"}"#;
        let result = parse_extraction(content);
        assert_eq!(result.provider.as_deref(), Some("Netflix"));
        assert_eq!(result.amount, Some(15.49));
        assert_eq!(
            result.next_billing_date,
            Some(NaiveDate::from_ymd_opt(2026, 9, 1).unwrap())
        );
        assert_eq!(result.status.as_deref(), Some("active"));
    }

    #[test]
    fn tolerates_markdown_fences_and_prose() {
        let content = "Here is the extraction:\n```json\n{\"provider\": \"Spotify\", \"amount\": \"$9.99\"}\n```";
        let result = parse_extraction(content);
        assert_eq!(result.provider.as_deref(), Some("Spotify"));
        assert_eq!(result.amount, Some(9.99));
    }

    #[test]
    fn malformed_content_yields_empty_result() {
        assert!(parse_extraction("I could not find a subscription.").is_empty());
        assert!(parse_extraction("{not json at all").is_empty());
        assert!(parse_extraction("").is_empty());
    }

    #[test]
    fn null_and_unknown_strings_are_treated_as_absent() {
        let content = r#"{"provider": "null", "amount": null, "status": "unknown"}"#;
        let result = parse_extraction(content);
        assert!(result.is_empty());
        assert!(result.status.is_none());
    }

    #[test]
    fn negative_and_non_finite_amounts_are_rejected() {
        let content = r#"{"provider": "X", "amount": -4.2}"#;
        assert_eq!(parse_extraction(content).amount, None);
    }

    #[test]
    fn date_with_timestamp_suffix_is_accepted() {
        let content = r#"{"provider": "X", "next_billing_date": "2026-09-01T00:00:00Z"}"#;
        let result = parse_extraction(content);
        assert_eq!(
            result.next_billing_date,
            Some(NaiveDate::from_ymd_opt(2026, 9, 1).unwrap())
        );
    }

    #[test]
    fn frequency_inference_covers_the_common_phrasings() {
        assert_eq!(
            infer_frequency("billed monthly at $15.49"),
            Some(BillingFrequency::Monthly)
        );
        assert_eq!(
            infer_frequency("your annual plan renews"),
            Some(BillingFrequency::Yearly)
        );
        assert_eq!(
            infer_frequency("quarterly invoice attached"),
            Some(BillingFrequency::Quarterly)
        );
        assert_eq!(infer_frequency("thanks for your order"), None);
    }
}
