use crate::config::Config;
use crate::mailbox::{
    errors::MailboxError,
    token::TokenManager,
    types::{Message, MessageListResponse, MessageRef},
};
use once_cell::sync::Lazy;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

const USER_AGENT: &str = "SubwatchScanner/0.1 (+https://subwatch.example.com)";

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    ClientBuilder::new()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .user_agent(USER_AGENT)
        .build()
        .expect("Failed to build HTTP client")
});

/// Read-only client for a Gmail-shaped mailbox search API.
///
/// Every request carries the current access token and retries exactly once
/// after a coordinated token refresh when the upstream answers 401.
pub struct MailboxClient {
    http: Client,
    base_url: String,
    tokens: Arc<TokenManager>,
}

impl MailboxClient {
    pub fn new(base_url: impl Into<String>, tokens: Arc<TokenManager>) -> Self {
        let base_url = base_url.into();
        Self {
            http: HTTP_CLIENT.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let tokens = Arc::new(TokenManager::from_config(HTTP_CLIENT.clone(), config));
        Self::new(config.mailbox_api_url(), tokens)
    }

    /// Search for message ids matching `query`, bounded to `max_results`.
    #[instrument(skip(self), fields(query = %query))]
    pub async fn list_messages(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<MessageRef>, MailboxError> {
        let url = self.endpoint("users/me/messages")?;
        let max = max_results.to_string();
        let list: MessageListResponse = self
            .authorized_get(url, &[("q", query), ("maxResults", &max)])
            .await?;
        debug!(count = list.messages.len(), "message search completed");
        Ok(list.messages)
    }

    /// Fetch one message with its full nested payload.
    #[instrument(skip(self))]
    pub async fn get_message(&self, id: &str) -> Result<Message, MailboxError> {
        let url = self.endpoint(&format!("users/me/messages/{id}"))?;
        self.authorized_get(url, &[("format", "full")]).await
    }

    fn endpoint(&self, path: &str) -> Result<Url, MailboxError> {
        Ok(Url::parse(&format!("{}/{}", self.base_url, path))?)
    }

    /// GET with bearer auth; on 401 performs the single coordinated refresh
    /// and replays the request once with the new credential.
    async fn authorized_get<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<T, MailboxError> {
        let (token, generation) = self.tokens.current().await?;

        let response = self
            .http
            .get(url.clone())
            .query(query)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(MailboxError::from_reqwest_error)?;

        let response = if response.status() == StatusCode::UNAUTHORIZED {
            warn!("mailbox request unauthorized, refreshing credential");
            let (token, _) = self.tokens.refreshed(generation).await?;
            self.http
                .get(url)
                .query(query)
                .bearer_auth(&token)
                .send()
                .await
                .map_err(MailboxError::from_reqwest_error)?
        } else {
            response
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(MailboxError::Unauthorized);
        }
        if !status.is_success() {
            return Err(MailboxError::Http {
                status,
                retriable: status.is_server_error(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| MailboxError::MalformedResponse(e.to_string()))
    }
}
