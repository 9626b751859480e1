//! MCP Tool definitions and handlers
//!
//! Defines the three Gmail tools and their implementations.

use std::sync::Arc;

use schemars::{schema_for, JsonSchema};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::error::{GmailMcpError, McpError, Result};
use crate::gmail::client::GmailClient;
use crate::gmail::types::DraftReceipt;
use crate::gmail::utils::DEFAULT_SUBJECT;
use crate::mcp::types::{CallToolResult, Tool};

pub const READ_EMAILS: &str = "read_emails";
pub const CREATE_REPLY_DRAFT: &str = "create_reply_draft";
pub const CREATE_NEW_EMAIL_DRAFT: &str = "create_new_email_draft";

/// Arguments for `read_emails`
#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct ReadEmailsArgs {
    /// How many inbox messages to return (at most 500 per page)
    #[serde(default = "default_max_results")]
    #[validate(range(min = 1, message = "must be a positive integer"))]
    pub max_results: u32,

    /// Token from a previous call's `nextPageToken`
    #[serde(default)]
    pub page_token: Option<String>,
}

fn default_max_results() -> u32 {
    5
}

/// Arguments for `create_reply_draft`
#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CreateReplyDraftArgs {
    /// ID of the message being replied to
    #[validate(length(min = 1, message = "must not be empty"))]
    pub email_id: String,

    /// Plain-text body of the reply
    pub reply_text: String,
}

/// One address or a list of them
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Recipients {
    One(String),
    Many(Vec<String>),
}

impl Recipients {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Recipients::One(r) => vec![r],
            Recipients::Many(rs) => rs,
        }
    }
}

/// Arguments for `create_new_email_draft`
#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CreateNewEmailDraftArgs {
    /// Recipient address or addresses; may be left empty
    #[serde(default)]
    pub recipient: Option<Recipients>,

    #[serde(default = "default_subject")]
    pub subject: String,

    #[serde(default)]
    pub body_text: String,
}

fn default_subject() -> String {
    DEFAULT_SUBJECT.to_string()
}

/// Draft receipt plus a human-readable status line
#[derive(Debug, Serialize)]
struct DraftResult {
    #[serde(flatten)]
    receipt: DraftReceipt,
    status: String,
}

/// Tool handler
pub struct ToolHandler {
    gmail_client: Arc<GmailClient>,
}

impl ToolHandler {
    /// Create a new tool handler
    pub fn new(gmail_client: Arc<GmailClient>) -> Self {
        Self { gmail_client }
    }

    /// List all available tools
    pub fn list_tools(&self) -> Vec<Tool> {
        vec![
            tool_def(
                READ_EMAILS,
                "Lists the most recent inbox emails with sender, subject, snippet and date. Pass nextPageToken back as page_token to get the following page.",
                input_schema::<ReadEmailsArgs>(),
            ),
            tool_def(
                CREATE_REPLY_DRAFT,
                "Creates a draft reply to an existing email, in the same thread",
                input_schema::<CreateReplyDraftArgs>(),
            ),
            tool_def(
                CREATE_NEW_EMAIL_DRAFT,
                "Creates a new email draft",
                input_schema::<CreateNewEmailDraftArgs>(),
            ),
        ]
    }

    /// Call a tool by name
    pub async fn call_tool(&self, name: &str, args: Value) -> CallToolResult {
        let result = match name {
            READ_EMAILS => self.handle_read_emails(args).await,
            CREATE_REPLY_DRAFT => self.handle_create_reply_draft(args).await,
            CREATE_NEW_EMAIL_DRAFT => self.handle_create_new_email_draft(args).await,
            _ => Err(McpError::UnknownTool {
                name: name.to_string(),
            }
            .into()),
        };

        match result {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Tool {} failed: {}", name, e);
                CallToolResult::from(e)
            }
        }
    }

    // ==================== Tool Handlers ====================

    async fn handle_read_emails(&self, args: Value) -> Result<CallToolResult> {
        let args: ReadEmailsArgs = parse_args(args)?;

        let page = self
            .gmail_client
            .list_recent(args.max_results, args.page_token.as_deref())
            .await?;

        Ok(CallToolResult::json(&page))
    }

    async fn handle_create_reply_draft(&self, args: Value) -> Result<CallToolResult> {
        let args: CreateReplyDraftArgs = parse_args(args)?;

        let receipt = self
            .gmail_client
            .create_reply_draft(&args.email_id, &args.reply_text)
            .await?;

        let status = format!("Reply draft created for {}", receipt.to);
        Ok(CallToolResult::json(&DraftResult { receipt, status }))
    }

    async fn handle_create_new_email_draft(&self, args: Value) -> Result<CallToolResult> {
        let args: CreateNewEmailDraftArgs = parse_args(args)?;
        let recipients = args.recipient.map(Recipients::into_vec).unwrap_or_default();

        let receipt = self
            .gmail_client
            .create_draft(&recipients, &args.subject, &args.body_text)
            .await?;

        let status = if receipt.to.is_empty() {
            "Draft created without recipients".to_string()
        } else {
            format!("Draft created for {}", receipt.to)
        };
        Ok(CallToolResult::json(&DraftResult { receipt, status }))
    }
}

/// Deserialize and validate tool arguments; a missing object counts as `{}`
fn parse_args<T: DeserializeOwned + Validate>(args: Value) -> Result<T> {
    let args = if args.is_null() { json!({}) } else { args };

    let parsed: T = serde_json::from_value(args).map_err(|e| {
        GmailMcpError::from(McpError::InvalidArguments {
            message: e.to_string(),
        })
    })?;
    parsed.validate()?;

    Ok(parsed)
}

// ==================== Schema Definitions ====================

fn tool_def(name: &str, description: &str, input_schema: Value) -> Tool {
    Tool {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema,
    }
}

fn input_schema<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| json!({"type": "object"}))
}
