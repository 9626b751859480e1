//! Gmail API client
//!
//! High-level client for the three operations the server exposes: listing
//! the inbox, drafting a reply and drafting a new message.

use std::sync::Arc;

use crate::config::gmail::{labels, API_BASE_URL, MAX_PAGE_SIZE, USER_ID};
use crate::error::{ApiError, GmailMcpError, Result, ValidationError};
use crate::gmail::auth::Authenticator;
use crate::gmail::types::*;
use crate::gmail::utils::{
    create_email_message, encode_raw_message, extract_address, find_header, parse_recipients,
    reply_subject, DraftRequest, Recipient, ReplyContext, DEFAULT_SUBJECT,
};

/// Error text Gmail returns for a malformed message id
const INVALID_ID_MESSAGE: &str = "Invalid id value";

/// Gmail API client
pub struct GmailClient {
    /// HTTP client
    http_client: reqwest::Client,

    /// OAuth authenticator
    authenticator: Arc<Authenticator>,

    /// API base URL
    base_url: String,
}

impl GmailClient {
    /// Create a new Gmail client
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            authenticator,
            base_url: API_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Get a valid access token
    async fn access_token(&self) -> Result<String> {
        self.authenticator.get_access_token().await
    }

    /// Base URL for messages
    fn messages_url(&self) -> String {
        format!("{}/users/{}/messages", self.base_url, USER_ID)
    }

    /// Base URL for drafts
    fn drafts_url(&self) -> String {
        format!("{}/users/{}/drafts", self.base_url, USER_ID)
    }

    // ==================== Inbox ====================

    /// List the most recent inbox messages, one page at a time
    pub async fn list_recent(&self, limit: u32, page_token: Option<&str>) -> Result<EmailPage> {
        if limit == 0 {
            return Err(GmailMcpError::Validation(ValidationError::InvalidParameter {
                name: "limit".to_string(),
                message: "must be a positive integer".to_string(),
            }));
        }
        let limit = limit.min(MAX_PAGE_SIZE);
        let page_token = page_token.filter(|t| !t.is_empty());

        let token = self.access_token().await?;

        let mut query = vec![
            ("labelIds", labels::INBOX.to_string()),
            ("maxResults", limit.to_string()),
        ];
        if let Some(page_token) = page_token {
            query.push(("pageToken", page_token.to_string()));
        }

        let response = self
            .http_client
            .get(self.messages_url())
            .bearer_auth(&token)
            .query(&query)
            .send()
            .await?;

        let message_list: MessageList = read_json(response, "List messages").await?;
        tracing::debug!(
            "Listed {} inbox messages (next page: {})",
            message_list.messages.len(),
            message_list.next_page_token.is_some()
        );

        let mut emails = Vec::with_capacity(message_list.messages.len());
        for msg_ref in message_list.messages.iter().take(limit as usize) {
            match self.get_metadata(&token, &msg_ref.id, &["From", "Subject", "Date"]).await {
                Ok(message) => emails.push(summarize(message, &msg_ref.thread_id)),
                Err(GmailMcpError::NotFound { message_id }) => {
                    tracing::debug!("Message {} disappeared while listing; skipping", message_id);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(EmailPage {
            emails,
            next_page_token: message_list.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    /// Get a message's headers
    async fn get_metadata(&self, token: &str, message_id: &str, headers: &[&str]) -> Result<Message> {
        let url = format!(
            "{}/{}",
            self.messages_url(),
            urlencoding::encode(message_id)
        );

        let mut query = vec![("format", "metadata")];
        query.extend(headers.iter().map(|h| ("metadataHeaders", *h)));

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .query(&query)
            .send()
            .await?;

        let not_found = || GmailMcpError::NotFound {
            message_id: message_id.to_string(),
        };

        match response.status().as_u16() {
            404 => Err(not_found()),
            400 => {
                // Gmail answers ids that cannot exist with 400 rather than 404
                let body = response.text().await.unwrap_or_default();
                if body.contains(INVALID_ID_MESSAGE) {
                    Err(not_found())
                } else {
                    Err(GmailMcpError::Api(ApiError::RequestFailed {
                        operation: "Get message".to_string(),
                        status: 400,
                        body,
                    }))
                }
            }
            _ => read_json(response, "Get message").await,
        }
    }

    // ==================== Drafts ====================

    /// Draft a reply to an existing message, in the same thread
    pub async fn create_reply_draft(&self, message_id: &str, body: &str) -> Result<DraftReceipt> {
        let message_id = message_id.trim();
        if message_id.is_empty() {
            return Err(GmailMcpError::Validation(ValidationError::MissingField {
                field: "message_id".to_string(),
            }));
        }

        let token = self.access_token().await?;
        let parent = self
            .get_metadata(
                &token,
                message_id,
                &["From", "Reply-To", "Subject", "Message-ID", "References"],
            )
            .await?;

        let request = reply_request(&parent, body)?;
        self.create_draft_request(&token, request).await
    }

    /// Draft a new message
    pub async fn create_draft<S: AsRef<str>>(
        &self,
        to: &[S],
        subject: &str,
        body: &str,
    ) -> Result<DraftReceipt> {
        let to = parse_recipients(to)?;

        let request = DraftRequest {
            to,
            subject: subject.to_string(),
            body: body.to_string(),
            reply: None,
        };

        let token = self.access_token().await?;
        self.create_draft_request(&token, request).await
    }

    async fn create_draft_request(&self, token: &str, request: DraftRequest) -> Result<DraftReceipt> {
        let raw = create_email_message(&request)?;
        let thread_id = request.reply.as_ref().and_then(|r| r.thread_id.clone());

        let body = CreateDraftRequest {
            message: DraftMessage {
                raw: encode_raw_message(&raw),
                thread_id: thread_id.clone(),
            },
        };

        let response = self
            .http_client
            .post(self.drafts_url())
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let draft: Draft = read_json(response, "Create draft").await?;
        tracing::info!("Created draft {}", draft.id);

        let subject = if request.subject.trim().is_empty() {
            DEFAULT_SUBJECT.to_string()
        } else {
            request.subject.clone()
        };

        Ok(DraftReceipt {
            draft_id: draft.id,
            message_id: draft.message.id,
            thread_id: draft.message.thread_id.or(thread_id),
            to: request.to_header(),
            subject,
        })
    }
}

/// Turn a metadata response into a summary, filling in defaults
fn summarize(message: Message, listed_thread_id: &str) -> EmailSummary {
    let payload = message.payload.as_ref();
    let header = |name: &str| {
        payload
            .and_then(|p| find_header(p, name))
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.to_string())
    };

    EmailSummary {
        thread_id: message
            .thread_id
            .clone()
            .unwrap_or_else(|| listed_thread_id.to_string()),
        sender: header("From").unwrap_or_else(|| "Unknown Sender".to_string()),
        subject: header("Subject").unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
        date: header("Date").unwrap_or_default(),
        snippet: message
            .snippet
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "No Snippet".to_string()),
        timestamp: message.internal_date.as_deref().and_then(|d| d.parse().ok()),
        id: message.id,
    }
}

/// Work out recipient, subject and threading headers for a reply
fn reply_request(parent: &Message, body: &str) -> Result<DraftRequest> {
    let payload = parent.payload.as_ref();
    let header = |name: &str| payload.and_then(|p| find_header(p, name)).map(str::trim);

    let reply_to = header("Reply-To")
        .filter(|v| !v.is_empty())
        .or_else(|| header("From"))
        .unwrap_or("");

    let recipient = Recipient::parse(extract_address(reply_to)).map_err(|_| {
        GmailMcpError::Api(ApiError::UnexpectedResponse {
            message: format!(
                "message {} has no usable sender address ({:?})",
                parent.id, reply_to
            ),
        })
    })?;

    let parent_message_id = header("Message-ID")
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string());

    let mut references: Vec<String> = header("References")
        .map(|v| v.split_whitespace().map(|r| r.to_string()).collect())
        .unwrap_or_default();
    if let Some(ref id) = parent_message_id {
        if !references.contains(id) {
            references.push(id.clone());
        }
    }

    Ok(DraftRequest {
        to: vec![recipient],
        subject: reply_subject(header("Subject").unwrap_or("")),
        body: body.to_string(),
        reply: Some(ReplyContext {
            thread_id: parent.thread_id.clone(),
            in_reply_to: parent_message_id,
            references,
        }),
    })
}

/// Decode a successful response or turn the failure into an API error
async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation: &str,
) -> Result<T> {
    let status = response.status();

    if status.is_success() {
        return response.json().await.map_err(|e| {
            GmailMcpError::Api(ApiError::UnexpectedResponse {
                message: format!("{}: {}", operation, e),
            })
        });
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!("{} failed with {}", operation, status);

    if status.as_u16() == 429 {
        Err(GmailMcpError::Api(ApiError::RateLimited {
            operation: operation.to_string(),
            body,
        }))
    } else {
        Err(GmailMcpError::Api(ApiError::RequestFailed {
            operation: operation.to_string(),
            status: status.as_u16(),
            body,
        }))
    }
}
