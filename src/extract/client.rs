use crate::config::Config;
use crate::extract::parse::{ExtractedSubscription, parse_extraction};
use once_cell::sync::Lazy;
use reqwest::{Client, ClientBuilder};
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Input text is truncated to bound cost and latency per email.
pub const MAX_INPUT_CHARS: usize = 4000;

const SYSTEM_PROMPT: &str = "You are a subscription detection assistant. You read one email and \
     report whether it concerns a paid recurring subscription. Respond with \
     JSON only, no prose.";

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    ClientBuilder::new()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(60))
        .build()
        .expect("Failed to build HTTP client")
});

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("extraction API key is not configured")]
    MissingApiKey,

    #[error("extraction request failed: {0}")]
    Request(String),

    #[error("extraction API returned {0}")]
    Http(reqwest::StatusCode),
}

/// Client for the chat-completions-style structured-extraction service.
///
/// A non-success HTTP response is an [`ExtractionError`] the caller handles
/// per email; a response that arrives but cannot be parsed degrades to the
/// empty extraction instead, since one garbled reply must not fail a scan.
pub struct ExtractionClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ExtractionClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            http: HTTP_CLIENT.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.extraction_api_url(),
            config.extraction_api_key(),
            config.extraction_model(),
        )
    }

    /// Extract subscription fields from one email's text.
    #[instrument(skip_all, fields(input_chars = email_text.chars().count()))]
    pub async fn extract(
        &self,
        email_text: &str,
    ) -> Result<ExtractedSubscription, ExtractionError> {
        if self.api_key.is_empty() {
            return Err(ExtractionError::MissingApiKey);
        }

        let truncated: String = email_text.chars().take(MAX_INPUT_CHARS).collect();
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt(&truncated)},
            ],
            "temperature": 0.2,
            "max_tokens": 500,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExtractionError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractionError::Http(status));
        }

        // From here on everything is fail-open: a reply we cannot read is an
        // empty extraction, not a scan failure.
        let payload: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "extraction response was not JSON");
                return Ok(ExtractedSubscription::default());
            }
        };

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default();
        let extracted = parse_extraction(content);
        debug!(empty = extracted.is_empty(), "extraction parsed");
        Ok(extracted)
    }
}

fn user_prompt(email_text: &str) -> String {
    format!(
        "Extract subscription details from this email. Respond with a JSON \
         object with exactly these four fields:\n\
         {{\"provider\": \"service name or null\", \
         \"amount\": 0.00, \
         \"next_billing_date\": \"YYYY-MM-DD or null\", \
         \"status\": \"active|trial|cancelled or null\"}}\n\n\
         Email:\n{email_text}"
    )
}
