//! OAuth authentication for Gmail API
//!
//! Handles OAuth 2.0 authentication flow including:
//! - Loading the cached token at startup
//! - Silent refresh of expiring access tokens
//! - Interactive browser-based consent when no usable token exists
//!
//! All of it happens behind one async mutex, so concurrent callers never
//! start a second refresh or a second consent prompt.

use serde::Deserialize;
use tokio::sync::Mutex;
use yup_oauth2::ApplicationSecret;

use crate::config::Config;
use crate::error::{AuthError, GmailMcpError, Result};
use crate::gmail::consent::{AuthorizationGrant, BrowserConsent, ConsentFlow, ConsentRequest};
use crate::gmail::store::{now_secs, CredentialStore, StoredCredentials, TokenResponse};

/// Refresh tokens this many seconds before they expire
const REFRESH_THRESHOLD_SECS: i64 = 300;

/// Where the process stands with respect to Gmail authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated(StoredCredentials),
}

/// Error body returned by the token endpoint
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

enum RefreshOutcome {
    Refreshed(StoredCredentials),
    Revoked,
}

/// OAuth authenticator
pub struct Authenticator {
    /// Configuration
    config: Config,

    /// HTTP client
    http_client: reqwest::Client,

    /// Client secret and token cache on disk
    store: CredentialStore,

    /// Interactive consent
    consent: Box<dyn ConsentFlow>,

    /// Current state; the lock doubles as the single-flight guard
    state: Mutex<AuthState>,
}

impl Authenticator {
    /// Create an authenticator that asks for consent through the browser
    pub async fn new(config: Config) -> Result<Self> {
        let consent = BrowserConsent::new(config.oauth_callback_port, config.consent_timeout);
        Self::with_consent(config, Box::new(consent)).await
    }

    /// Create an authenticator with a custom consent flow
    pub async fn with_consent(config: Config, consent: Box<dyn ConsentFlow>) -> Result<Self> {
        let store = CredentialStore::new(&config);
        let state = Self::load_state(&store, &config.scopes).await;

        Ok(Self {
            config,
            http_client: reqwest::Client::new(),
            store,
            consent,
            state: Mutex::new(state),
        })
    }

    /// Read the token cache once at startup
    async fn load_state(store: &CredentialStore, scopes: &[String]) -> AuthState {
        match store.load_token().await {
            Ok(Some(creds)) if creds.covers_scopes(scopes) => {
                tracing::debug!("Loaded cached credentials from {}", store.token_path().display());
                AuthState::Authenticated(creds)
            }
            Ok(Some(_)) => {
                tracing::warn!("Cached credentials lack required scopes; authorization will be requested again");
                AuthState::Unauthenticated
            }
            Ok(None) => AuthState::Unauthenticated,
            Err(e) => {
                tracing::warn!("Ignoring unreadable token cache: {}", e);
                AuthState::Unauthenticated
            }
        }
    }

    /// Check if we have credentials
    pub async fn is_authenticated(&self) -> bool {
        matches!(*self.state.lock().await, AuthState::Authenticated(_))
    }

    /// Snapshot of the current state
    pub async fn state(&self) -> AuthState {
        self.state.lock().await.clone()
    }

    /// Get a valid access token, refreshing or asking for consent if necessary
    pub async fn get_access_token(&self) -> Result<String> {
        let mut state = self.state.lock().await;

        let current = match &*state {
            AuthState::Authenticated(creds) => Some(creds.clone()),
            AuthState::Unauthenticated => None,
        };

        if let Some(ref creds) = current {
            if !creds.is_expiring(now_secs(), REFRESH_THRESHOLD_SECS) {
                return Ok(creds.access_token.clone());
            }
        }

        let secret = self.store.load_client_secret().await?;

        if let Some(creds) = current.filter(|c| c.refresh_token.is_some()) {
            match self.refresh(&secret, &creds).await? {
                RefreshOutcome::Refreshed(refreshed) => {
                    self.store.save_token(&refreshed).await?;
                    let token = refreshed.access_token.clone();
                    *state = AuthState::Authenticated(refreshed);
                    return Ok(token);
                }
                RefreshOutcome::Revoked => {
                    tracing::warn!("Refresh token was revoked; discarding cached credentials");
                    self.store.delete_token().await?;
                    *state = AuthState::Unauthenticated;
                }
            }
        }

        let creds = self.run_consent(&secret).await?;
        let token = creds.access_token.clone();
        *state = AuthState::Authenticated(creds);
        Ok(token)
    }

    /// Run the consent flow unconditionally, replacing any cached credentials
    pub async fn authenticate_interactive(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let secret = self.store.load_client_secret().await?;
        let creds = self.run_consent(&secret).await?;
        *state = AuthState::Authenticated(creds);
        Ok(())
    }

    /// Refresh the access token using the refresh token
    async fn refresh(
        &self,
        secret: &ApplicationSecret,
        creds: &StoredCredentials,
    ) -> Result<RefreshOutcome> {
        let refresh_token = creds.refresh_token.as_deref().unwrap_or_default();
        tracing::info!("Access token expired or expiring; refreshing");

        let params = [
            ("client_id", secret.client_id.as_str()),
            ("client_secret", secret.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http_client
            .post(&secret.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                GmailMcpError::Auth(AuthError::TokenRefreshFailed {
                    message: e.to_string(),
                })
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            if let Ok(err) = serde_json::from_str::<TokenErrorResponse>(&text) {
                if err.error == "invalid_grant" {
                    tracing::debug!(
                        "Token endpoint rejected refresh token: {}",
                        err.error_description.as_deref().unwrap_or("invalid_grant")
                    );
                    return Ok(RefreshOutcome::Revoked);
                }
            }

            return Err(GmailMcpError::Auth(AuthError::TokenRefreshFailed {
                message: format!("{}: {}", status, text),
            }));
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            GmailMcpError::Auth(AuthError::TokenRefreshFailed {
                message: e.to_string(),
            })
        })?;

        Ok(RefreshOutcome::Refreshed(StoredCredentials::from_response(
            token_response,
            Some(creds),
        )))
    }

    /// The `Unauthenticated -> Authenticated` transition
    async fn run_consent(&self, secret: &ApplicationSecret) -> Result<StoredCredentials> {
        tracing::info!("No usable Gmail credentials; starting interactive authorization");

        let request = ConsentRequest {
            client_id: secret.client_id.clone(),
            auth_uri: secret.auth_uri.clone(),
            scopes: self.config.scopes.clone(),
            state: uuid::Uuid::new_v4().to_string(),
        };

        let grant = self.consent.authorize(&request).await?;
        let creds = self.exchange_code(secret, &grant).await?;
        self.store.save_token(&creds).await?;

        tracing::info!("Gmail authorization completed");
        Ok(creds)
    }

    /// Exchange authorization code for tokens
    async fn exchange_code(
        &self,
        secret: &ApplicationSecret,
        grant: &AuthorizationGrant,
    ) -> Result<StoredCredentials> {
        let params = [
            ("client_id", secret.client_id.as_str()),
            ("client_secret", secret.client_secret.as_str()),
            ("code", grant.code.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", grant.redirect_uri.as_str()),
        ];

        let response = self
            .http_client
            .post(&secret.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                GmailMcpError::Auth(AuthError::TokenExchangeFailed {
                    message: e.to_string(),
                })
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GmailMcpError::Auth(AuthError::TokenExchangeFailed {
                message: format!("{}: {}", status, text),
            }));
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            GmailMcpError::Auth(AuthError::TokenExchangeFailed {
                message: e.to_string(),
            })
        })?;

        Ok(StoredCredentials::from_response(token_response, None))
    }
}
