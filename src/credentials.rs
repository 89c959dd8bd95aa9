use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::models::TokenGrant;
use crate::PartyError;

/// Tokens handed over by the authorization-code flow.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
    pub ttl_secs: u64,
}

/// Performs the refresh-token exchange with the authorization server.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, PartyError>;
}

/// Refresh grant against `{accounts_base}/api/token` using HTTP Basic client auth.
pub struct AccountsRefresher {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl AccountsRefresher {
    pub fn new(
        client: Client,
        accounts_base: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            token_url: format!("{}/api/token", accounts_base.trim_end_matches('/')),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

#[async_trait]
impl TokenRefresher for AccountsRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, PartyError> {
        let form = serde_urlencoded::to_string([
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])?;

        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(form)
            .send()
            .await
            .map_err(|e| PartyError::CredentialRenewalFailed(format!("token request: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response.text().await.unwrap_or_default();
            return Err(PartyError::CredentialRenewalFailed(format!(
                "token endpoint answered {status}: {body_text}"
            )));
        }

        response.json::<TokenGrant>().await.map_err(|e| {
            PartyError::CredentialRenewalFailed(format!("malformed token response: {e}"))
        })
    }
}

struct LeaseState {
    access_token: String,
    refresh_token: String,
    issued_at_ms: u64,
    ttl_secs: u64,
    // Set when a renewal failed; cleared only by `install`.
    poisoned: Option<String>,
}

impl LeaseState {
    fn is_valid(&self, now_ms: u64) -> bool {
        !self.access_token.is_empty()
            && now_ms <= self.issued_at_ms.saturating_add(self.ttl_secs.saturating_mul(1000))
    }
}

fn preview(token: &str) -> String {
    token.chars().take(8).collect()
}

/// The bearer token backing every remote call, with its validity window.
///
/// Renewal runs while holding the lease lock, so callers that notice expiry
/// at the same moment queue up behind a single refresh exchange and then see
/// the renewed token. Once a renewal fails, [`access_token`](Self::access_token)
/// fails fast until [`install`](Self::install) hands over fresh credentials.
pub struct CredentialLease {
    state: Mutex<LeaseState>,
    clock: Arc<dyn Clock>,
    refresher: Arc<dyn TokenRefresher>,
}

impl CredentialLease {
    pub fn new(
        credentials: Credentials,
        clock: Arc<dyn Clock>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        let issued_at_ms = clock.now_ms();
        Self {
            state: Mutex::new(LeaseState {
                access_token: credentials.access_token,
                refresh_token: credentials.refresh_token,
                issued_at_ms,
                ttl_secs: credentials.ttl_secs,
                poisoned: None,
            }),
            clock,
            refresher,
        }
    }

    /// `now <= issued_at + ttl * 1000`, and a token is actually held.
    pub async fn is_valid(&self) -> bool {
        let state = self.state.lock().await;
        state.is_valid(self.clock.now_ms())
    }

    pub async fn is_poisoned(&self) -> bool {
        self.state.lock().await.poisoned.is_some()
    }

    pub async fn issued_at_ms(&self) -> u64 {
        self.state.lock().await.issued_at_ms
    }

    /// Runs the refresh exchange now, regardless of validity.
    pub async fn renew(&self) -> Result<(), PartyError> {
        let mut state = self.state.lock().await;
        self.renew_locked(&mut state).await
    }

    /// Returns a token that is valid as of this call, renewing first if needed.
    pub async fn access_token(&self) -> Result<String, PartyError> {
        let mut state = self.state.lock().await;
        if let Some(reason) = &state.poisoned {
            warn!("Refusing remote call: credentials need re-authentication");
            return Err(PartyError::CredentialRenewalFailed(reason.clone()));
        }
        if !state.is_valid(self.clock.now_ms()) {
            debug!("Access token expired, renewing before use.");
            self.renew_locked(&mut state).await?;
        }
        Ok(state.access_token.clone())
    }

    /// Replaces the held credentials wholesale, e.g. after a human re-authenticated.
    pub async fn install(&self, credentials: Credentials) {
        let mut state = self.state.lock().await;
        *state = LeaseState {
            access_token: credentials.access_token,
            refresh_token: credentials.refresh_token,
            issued_at_ms: self.clock.now_ms(),
            ttl_secs: credentials.ttl_secs,
            poisoned: None,
        };
        info!("Installed new credentials.");
    }

    async fn renew_locked(&self, state: &mut LeaseState) -> Result<(), PartyError> {
        info!("Refreshing access token...");
        match self.refresher.refresh(&state.refresh_token).await {
            Ok(grant) => {
                let old_token_preview = preview(&state.access_token);
                let refresh_token = grant
                    .refresh_token
                    .unwrap_or_else(|| state.refresh_token.clone());
                *state = LeaseState {
                    access_token: grant.access_token,
                    refresh_token,
                    issued_at_ms: self.clock.now_ms(),
                    ttl_secs: grant.expires_in,
                    poisoned: None,
                };
                debug!(
                    old = %old_token_preview,
                    new = %preview(&state.access_token),
                    ttl_secs = state.ttl_secs,
                    "Access token refreshed."
                );
                Ok(())
            }
            Err(e) => {
                let reason = match e {
                    PartyError::CredentialRenewalFailed(reason) => reason,
                    other => other.to_string(),
                };
                error!(error = %reason, "Failed to refresh access token; re-authentication required");
                state.poisoned = Some(reason.clone());
                Err(PartyError::CredentialRenewalFailed(reason))
            }
        }
    }
}

impl std::fmt::Debug for CredentialLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialLease").finish_non_exhaustive()
    }
}
