//! Interactive OAuth consent
//!
//! The user-facing half of the authorization-code flow: send the user to
//! Google's consent page and collect the code from the loopback redirect.

use std::collections::HashMap;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tokio::sync::{oneshot, Mutex};

use crate::error::{AuthError, GmailMcpError, Result};

const CALLBACK_PATH: &str = "/oauth2callback";

/// Everything needed to build the consent page URL
#[derive(Debug, Clone)]
pub struct ConsentRequest {
    pub client_id: String,
    pub auth_uri: String,
    pub scopes: Vec<String>,
    /// Anti-forgery value echoed back on the redirect
    pub state: String,
}

impl ConsentRequest {
    /// Generate the authorization URL for a given redirect URI
    pub fn authorization_url(&self, redirect_uri: &str) -> String {
        let scopes = self.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
            self.auth_uri,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(&self.state)
        )
    }
}

/// Redirect URI for the loopback listener; names the address actually bound
fn redirect_uri(port: u16) -> String {
    format!("http://127.0.0.1:{}{}", port, CALLBACK_PATH)
}

/// Authorization code together with the redirect URI it was issued for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationGrant {
    pub code: String,
    pub redirect_uri: String,
}

/// Obtains an authorization code from the user
#[async_trait]
pub trait ConsentFlow: Send + Sync {
    async fn authorize(&self, request: &ConsentRequest) -> Result<AuthorizationGrant>;
}

/// Consent through the system browser and a loopback HTTP listener
pub struct BrowserConsent {
    port: u16,
    timeout: Duration,
}

impl BrowserConsent {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }
}

#[derive(Debug)]
enum CallbackOutcome {
    Code(String),
    Denied(String),
    StateMismatch,
}

#[derive(Clone)]
struct CallbackState {
    expected_state: String,
    tx: Arc<Mutex<Option<oneshot::Sender<CallbackOutcome>>>>,
}

async fn handle_callback(
    State(state): State<CallbackState>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<&'static str> {
    let (outcome, page) = match (params.get("code"), params.get("error")) {
        _ if params.get("state") != Some(&state.expected_state) => (
            CallbackOutcome::StateMismatch,
            "<html><body><h1>Authentication failed</h1><p>State mismatch.</p></body></html>",
        ),
        (Some(code), _) => (
            CallbackOutcome::Code(code.clone()),
            "<html><body><h1>Authentication successful!</h1><p>You can close this window.</p></body></html>",
        ),
        (None, Some(error)) => (
            CallbackOutcome::Denied(error.clone()),
            "<html><body><h1>Authentication failed</h1><p>Access was not granted.</p></body></html>",
        ),
        (None, None) => (
            CallbackOutcome::Denied("no authorization code received".to_string()),
            "<html><body><h1>Authentication failed</h1><p>No authorization code received.</p></body></html>",
        ),
    };

    if let Some(tx) = state.tx.lock().await.take() {
        let _ = tx.send(outcome);
    }

    Html(page)
}

#[async_trait]
impl ConsentFlow for BrowserConsent {
    async fn authorize(&self, request: &ConsentRequest) -> Result<AuthorizationGrant> {
        let addr = std::net::SocketAddr::from(([127, 0, 0, 1], self.port));
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            GmailMcpError::Auth(AuthError::CallbackError {
                message: format!("cannot listen on {}: {}", addr, e),
            })
        })?;
        let port = listener.local_addr()?.port();
        let redirect_uri = redirect_uri(port);

        let auth_url = request.authorization_url(&redirect_uri);
        tracing::info!("Please visit this URL to authorize Gmail access: {}", auth_url);

        if let Err(e) = open::that(&auth_url) {
            tracing::warn!("Could not open browser automatically: {}. Please open the URL manually.", e);
        }

        let (tx, rx) = oneshot::channel();
        let state = CallbackState {
            expected_state: request.state.clone(),
            tx: Arc::new(Mutex::new(Some(tx))),
        };

        let app = Router::new()
            .route(CALLBACK_PATH, get(handle_callback))
            .with_state(state);

        tracing::info!("Waiting for authorization callback on port {}...", port);

        let server = axum::serve(listener, app).into_future();

        let outcome = tokio::select! {
            result = server => {
                return Err(GmailMcpError::Auth(AuthError::CallbackError {
                    message: match result {
                        Ok(()) => "callback server stopped unexpectedly".to_string(),
                        Err(e) => e.to_string(),
                    },
                }));
            }
            outcome = tokio::time::timeout(self.timeout, rx) => outcome,
        };

        match outcome {
            Ok(Ok(CallbackOutcome::Code(code))) => Ok(AuthorizationGrant { code, redirect_uri }),
            Ok(Ok(CallbackOutcome::Denied(reason))) => {
                Err(GmailMcpError::Auth(AuthError::ConsentDenied { reason }))
            }
            Ok(Ok(CallbackOutcome::StateMismatch)) => {
                Err(GmailMcpError::Auth(AuthError::StateMismatch))
            }
            Ok(Err(_)) => Err(GmailMcpError::Auth(AuthError::ConsentDenied {
                reason: "authorization was cancelled".to_string(),
            })),
            Err(_) => Err(GmailMcpError::Auth(AuthError::ConsentTimedOut {
                secs: self.timeout.as_secs(),
            })),
        }
    }
}
