//! Configuration management for the Gmail MCP Server
//!
//! Handles paths, environment variables, and configuration loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, GmailMcpError, Result};

/// Client secret file name, as downloaded from the Google Cloud console
pub const CLIENT_SECRET_FILE: &str = "credentials.json";

/// Token cache file name
pub const TOKEN_FILE: &str = "token.json";

/// Configuration for the Gmail MCP Server
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the OAuth client secret file
    pub oauth_path: PathBuf,

    /// Path to the token cache (access/refresh tokens)
    pub credentials_path: PathBuf,

    /// Loopback port for the OAuth callback; 0 picks a free port
    pub oauth_callback_port: u16,

    /// How long to wait for the user to finish the browser consent
    pub consent_timeout: Duration,

    /// Gmail API base URL
    pub api_base_url: String,

    /// Gmail API scopes
    pub scopes: Vec<String>,
}

impl Config {
    /// Create a configuration from the environment.
    ///
    /// Files live in `GMAIL_MCP_DIR` or, by default, the working directory the
    /// host assistant launched us in.
    pub fn new() -> Result<Self> {
        let base_dir = match std::env::var("GMAIL_MCP_DIR") {
            Ok(dir) => expand_home(&dir),
            Err(_) => std::env::current_dir().map_err(|e| {
                GmailMcpError::Config(ConfigError::NoWorkingDir {
                    message: e.to_string(),
                })
            })?,
        };

        let mut config = Self::in_dir(&base_dir);

        if let Ok(path) = std::env::var("GMAIL_OAUTH_PATH") {
            config.oauth_path = expand_home(&path);
        }

        if let Ok(path) = std::env::var("GMAIL_CREDENTIALS_PATH") {
            config.credentials_path = expand_home(&path);
        }

        if let Ok(port) = std::env::var("GMAIL_OAUTH_PORT") {
            config.oauth_callback_port = port.parse().map_err(|_| {
                GmailMcpError::Config(ConfigError::InvalidEnvVar {
                    var: "GMAIL_OAUTH_PORT".to_string(),
                    value: port.clone(),
                })
            })?;
        }

        Ok(config)
    }

    /// Configuration with both files inside `dir` and default settings
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            oauth_path: dir.join(CLIENT_SECRET_FILE),
            credentials_path: dir.join(TOKEN_FILE),
            oauth_callback_port: 0,
            consent_timeout: Duration::from_secs(300),
            api_base_url: gmail::API_BASE_URL.to_string(),
            scopes: gmail::SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Check if the OAuth client secret file exists
    pub fn oauth_keys_exist(&self) -> bool {
        self.oauth_path.exists()
    }
}

/// Expand a leading `~/` to the user's home directory
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Gmail API constants
pub mod gmail {
    /// Base URL for Gmail API
    pub const API_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";

    /// User ID for the authenticated user
    pub const USER_ID: &str = "me";

    /// Scopes requested during consent
    pub const SCOPES: &[&str] = &[
        "https://www.googleapis.com/auth/gmail.readonly",
        "https://www.googleapis.com/auth/gmail.compose",
        "https://www.googleapis.com/auth/gmail.modify",
    ];

    /// Largest page Gmail returns from messages.list
    pub const MAX_PAGE_SIZE: u32 = 500;

    pub mod labels {
        pub const INBOX: &str = "INBOX";
    }
}
