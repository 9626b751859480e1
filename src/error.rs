//! Error types for the Gmail MCP Server
//!
//! Every failure is reported to the assistant as one of four kinds: auth,
//! api, validation or not-found. See [`GmailMcpError::kind`].

use std::fmt;

use thiserror::Error;

/// Main error type for the Gmail MCP Server
#[derive(Error, Debug)]
pub enum GmailMcpError {
    /// OAuth credential and token errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Gmail API errors
    #[error("Gmail API error: {0}")]
    Api(#[from] ApiError),

    /// Caller input rejected before any request was made
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The referenced message does not exist
    #[error("Message not found: {message_id}")]
    NotFound { message_id: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// MCP protocol errors
    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// OAuth credential and token errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("OAuth client secret file not found: {path}")]
    ClientSecretNotFound { path: String },

    #[error("Invalid OAuth client secret file {path}: {message}")]
    InvalidClientSecret { path: String, message: String },

    #[error("Failed to refresh access token: {message}")]
    TokenRefreshFailed { message: String },

    #[error("Token exchange failed: {message}")]
    TokenExchangeFailed { message: String },

    #[error("Authorization was denied: {reason}")]
    ConsentDenied { reason: String },

    #[error("Timed out after {secs} seconds waiting for authorization")]
    ConsentTimedOut { secs: u64 },

    #[error("OAuth state mismatch in authorization callback")]
    StateMismatch,

    #[error("OAuth callback error: {message}")]
    CallbackError { message: String },

    #[error("Failed to access token cache {path}: {source}")]
    TokenStore {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Gmail API errors
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{operation} failed ({status}): {body}")]
    RequestFailed {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("{operation} was rate limited: {body}")]
    RateLimited { operation: String, body: String },

    #[error("Unexpected response: {message}")]
    UnexpectedResponse { message: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Working directory not available: {message}")]
    NoWorkingDir { message: String },

    #[error("Invalid value for {var}: {value}")]
    InvalidEnvVar { var: String, value: String },
}

/// Validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid email address: {email}")]
    InvalidEmail { email: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid parameter: {name} - {message}")]
    InvalidParameter { name: String, message: String },
}

/// MCP protocol errors
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Invalid tool arguments: {message}")]
    InvalidArguments { message: String },
}

/// The four error kinds reported to the RPC caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    Api,
    Validation,
    NotFound,
}

impl ErrorKind {
    /// Wire name used in the error envelope
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth_error",
            ErrorKind::Api => "api_error",
            ErrorKind::Validation => "validation_error",
            ErrorKind::NotFound => "not_found",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GmailMcpError {
    /// Classify this error for the caller.
    ///
    /// Local file and configuration problems only arise while handling
    /// credentials, so they count as auth errors. Transport and decoding
    /// failures come from the remote service.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GmailMcpError::Auth(_) | GmailMcpError::Config(_) | GmailMcpError::Io(_) => {
                ErrorKind::Auth
            }
            GmailMcpError::Api(_) | GmailMcpError::Http(_) | GmailMcpError::Json(_) => {
                ErrorKind::Api
            }
            GmailMcpError::Validation(_) | GmailMcpError::Mcp(_) => ErrorKind::Validation,
            GmailMcpError::NotFound { .. } => ErrorKind::NotFound,
        }
    }
}

/// Result type alias for Gmail MCP operations
pub type Result<T> = std::result::Result<T, GmailMcpError>;

impl From<validator::ValidationErrors> for GmailMcpError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let (name, message) = errors
            .field_errors()
            .into_iter()
            .next()
            .map(|(field, errs)| {
                let message = errs
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| e.code.to_string())
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                (field.to_string(), message)
            })
            .unwrap_or_else(|| ("arguments".to_string(), errors.to_string()));

        GmailMcpError::Validation(ValidationError::InvalidParameter { name, message })
    }
}
