//! Credential storage
//!
//! Reads the OAuth client secret and keeps the token cache on disk. The
//! cache is replaced atomically so a crash mid-write never leaves a torn
//! file behind.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use yup_oauth2::ApplicationSecret;

use crate::config::Config;
use crate::error::{AuthError, GmailMcpError, Result};

/// Stored credentials (tokens)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    /// Access token
    pub access_token: String,

    /// Refresh token
    pub refresh_token: Option<String>,

    /// Token type (usually "Bearer")
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Expiry timestamp (Unix seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,

    /// Granted scopes, space separated
    #[serde(default)]
    pub scope: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Token response from the OAuth token endpoint
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: String,
}

impl StoredCredentials {
    /// Build credentials from a token endpoint response.
    ///
    /// Refresh responses usually omit the refresh token and sometimes the
    /// scope; both are carried over from `previous`.
    pub fn from_response(response: TokenResponse, previous: Option<&StoredCredentials>) -> Self {
        let scope = if response.scope.is_empty() {
            previous.map(|p| p.scope.clone()).unwrap_or_default()
        } else {
            response.scope
        };

        Self {
            access_token: response.access_token,
            refresh_token: response
                .refresh_token
                .or_else(|| previous.and_then(|p| p.refresh_token.clone())),
            token_type: response.token_type,
            expiry_date: response.expires_in.map(|e| now_secs() + e),
            scope,
        }
    }

    /// True when the access token expires within `threshold_secs`
    pub fn is_expiring(&self, now: i64, threshold_secs: i64) -> bool {
        match self.expiry_date {
            Some(expiry) => expiry - now < threshold_secs,
            None => false,
        }
    }

    /// True when every scope in `required` was granted.
    ///
    /// An empty scope string means the grant predates scope tracking and is
    /// accepted as-is.
    pub fn covers_scopes(&self, required: &[String]) -> bool {
        if self.scope.trim().is_empty() {
            return true;
        }
        let granted: Vec<&str> = self.scope.split_whitespace().collect();
        required.iter().all(|s| granted.contains(&s.as_str()))
    }
}

/// Current Unix time in seconds
pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// On-disk home of the client secret and the token cache
#[derive(Debug, Clone)]
pub struct CredentialStore {
    secret_path: PathBuf,
    token_path: PathBuf,
}

impl CredentialStore {
    pub fn new(config: &Config) -> Self {
        Self {
            secret_path: config.oauth_path.clone(),
            token_path: config.credentials_path.clone(),
        }
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// Load the OAuth client secret ("installed" or "web" format)
    pub async fn load_client_secret(&self) -> Result<ApplicationSecret> {
        let path = self.secret_path.display().to_string();

        let content = match tokio::fs::read(&self.secret_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GmailMcpError::Auth(AuthError::ClientSecretNotFound { path }));
            }
            Err(e) => {
                return Err(GmailMcpError::Auth(AuthError::InvalidClientSecret {
                    path,
                    message: e.to_string(),
                }));
            }
        };

        let secret = yup_oauth2::parse_application_secret(content).map_err(|e| {
            GmailMcpError::Auth(AuthError::InvalidClientSecret {
                path: path.clone(),
                message: e.to_string(),
            })
        })?;

        if secret.client_id.is_empty() || secret.token_uri.is_empty() || secret.auth_uri.is_empty() {
            return Err(GmailMcpError::Auth(AuthError::InvalidClientSecret {
                path,
                message: "client_id, auth_uri and token_uri are required".to_string(),
            }));
        }

        Ok(secret)
    }

    /// Load the token cache; `None` when there is no cache yet
    pub async fn load_token(&self) -> Result<Option<StoredCredentials>> {
        let content = match tokio::fs::read_to_string(&self.token_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.store_error(e)),
        };

        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Atomically replace the token cache
    pub async fn save_token(&self, credentials: &StoredCredentials) -> Result<()> {
        let content = serde_json::to_string_pretty(credentials)?;

        if let Some(parent) = self.token_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.store_error(e))?;
            }
        }

        let tmp_path = self.token_path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content)
            .await
            .map_err(|e| self.store_error(e))?;
        restrict_permissions(&tmp_path)
            .await
            .map_err(|e| self.store_error(e))?;
        tokio::fs::rename(&tmp_path, &self.token_path)
            .await
            .map_err(|e| self.store_error(e))?;

        tracing::debug!("Saved token cache to {}", self.token_path.display());
        Ok(())
    }

    /// Remove the token cache, if any
    pub async fn delete_token(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.token_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.store_error(e)),
        }
    }

    fn store_error(&self, source: std::io::Error) -> GmailMcpError {
        GmailMcpError::Auth(AuthError::TokenStore {
            path: self.token_path.display().to_string(),
            source,
        })
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
