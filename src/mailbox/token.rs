//! Access-credential management for the mailbox API.
//!
//! The access token expires; concurrent fetch workers must not each issue
//! their own refresh when that happens. Refresh runs while holding the state
//! mutex and bumps a generation counter, so the first worker to observe the
//! expiry performs the one refresh and every worker queued behind the lock
//! sees the bumped generation and reuses the fresh token instead of
//! refreshing again.

use crate::config::Config;
use crate::mailbox::errors::MailboxError;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// Opaque marker for "the token I was handed". Passed back on a 401 so the
/// manager can tell whether that token has already been replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenGeneration(u64);

#[derive(Debug, Default)]
struct TokenState {
    access_token: Option<String>,
    generation: u64,
}

pub struct TokenManager {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    state: Mutex<TokenState>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl TokenManager {
    pub fn new(
        http: Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
            state: Mutex::new(TokenState::default()),
        }
    }

    pub fn from_config(http: Client, config: &Config) -> Self {
        Self::new(
            http,
            config.mailbox_token_url(),
            config.mailbox_client_id(),
            config.mailbox_client_secret(),
            config.mailbox_refresh_token(),
        )
    }

    /// Current access token, refreshing first if none has been obtained yet.
    pub async fn current(&self) -> Result<(String, TokenGeneration), MailboxError> {
        let mut state = self.state.lock().await;
        if state.access_token.is_none() {
            self.refresh_locked(&mut state).await?;
        }
        Ok((
            state.access_token.clone().expect("token set by refresh"),
            TokenGeneration(state.generation),
        ))
    }

    /// Called after a 401. Refreshes unless the token the caller saw has
    /// already been replaced by another worker, in which case the existing
    /// replacement is returned as-is.
    pub async fn refreshed(
        &self,
        stale: TokenGeneration,
    ) -> Result<(String, TokenGeneration), MailboxError> {
        let mut state = self.state.lock().await;
        if state.generation == stale.0 || state.access_token.is_none() {
            self.refresh_locked(&mut state).await?;
        } else {
            debug!("token already refreshed by a concurrent worker, reusing");
        }
        Ok((
            state.access_token.clone().expect("token set by refresh"),
            TokenGeneration(state.generation),
        ))
    }

    #[instrument(skip_all)]
    async fn refresh_locked(&self, state: &mut TokenState) -> Result<(), MailboxError> {
        if self.refresh_token.is_empty() || self.client_id.is_empty() {
            return Err(MailboxError::MissingCredentials);
        }

        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(MailboxError::from_reqwest_error)?;

        if !response.status().is_success() {
            return Err(MailboxError::RefreshFailed(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| MailboxError::RefreshFailed(e.to_string()))?;

        state.access_token = Some(token.access_token);
        state.generation += 1;
        info!(generation = state.generation, "mailbox access token refreshed");
        Ok(())
    }
}
