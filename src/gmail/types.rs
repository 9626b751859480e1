//! Gmail API type definitions
//!
//! These types mirror the Gmail API responses and are used for serialization/deserialization,
//! plus the summaries handed back to the assistant.

use serde::{Deserialize, Serialize};

/// A Gmail message part (MIME part)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    /// Headers for this part
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<Header>,
}

/// Header in a message part
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    /// Header name
    pub name: String,

    /// Header value
    pub value: String,
}

/// A Gmail message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message ID
    pub id: String,

    /// Thread ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    /// Snippet (preview text)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,

    /// Message payload (headers only with format=metadata)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<MessagePart>,

    /// Internal date (epoch millis, as a string)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_date: Option<String>,
}

/// List of messages response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageList {
    /// Messages in this page
    #[serde(default)]
    pub messages: Vec<MessageRef>,

    /// Next page token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Reference to a message (id and thread_id only)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    /// Message ID
    pub id: String,

    /// Thread ID
    #[serde(default)]
    pub thread_id: String,
}

/// Gmail draft
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    /// Draft ID
    pub id: String,

    /// The message
    pub message: Message,
}

/// Draft message body for drafts.create
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftMessage {
    /// Raw RFC 5322 message (base64url encoded)
    pub raw: String,

    /// Thread ID (for replies)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// Request to create a draft
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDraftRequest {
    /// The message
    pub message: DraftMessage,
}

/// One inbox entry as shown to the assistant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSummary {
    pub id: String,
    pub thread_id: String,
    pub sender: String,
    pub subject: String,
    pub snippet: String,
    /// `Date` header as sent
    pub date: String,
    /// Gmail's received time, epoch milliseconds
    pub timestamp: Option<i64>,
}

/// One page of inbox summaries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailPage {
    #[serde(rename = "email_list")]
    pub emails: Vec<EmailSummary>,

    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

/// What a created draft looks like to the assistant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftReceipt {
    pub draft_id: String,
    pub message_id: String,
    pub thread_id: Option<String>,
    /// Recipients, comma separated; empty for an unaddressed draft
    pub to: String,
    pub subject: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_deserialize() {
        let json = r#"{"id":"123","threadId":"456","labelIds":["INBOX"],"internalDate":"1731401723000"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, "123");
        assert_eq!(msg.thread_id, Some("456".to_string()));
        assert_eq!(msg.internal_date.as_deref(), Some("1731401723000"));
    }

    #[test]
    fn test_message_list_last_page() {
        let json = r#"{"messages":[{"id":"a","threadId":"t"}],"resultSizeEstimate":1}"#;
        let list: MessageList = serde_json::from_str(json).unwrap();
        assert_eq!(list.messages.len(), 1);
        assert!(list.next_page_token.is_none());

        let empty: MessageList = serde_json::from_str(r#"{"resultSizeEstimate":0}"#).unwrap();
        assert!(empty.messages.is_empty());
    }

    #[test]
    fn test_draft_request_serialize() {
        let request = CreateDraftRequest {
            message: DraftMessage {
                raw: "cmF3".to_string(),
                thread_id: Some("thread-1".to_string()),
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["message"]["raw"], "cmF3");
        assert_eq!(json["message"]["threadId"], "thread-1");
    }

    #[test]
    fn test_email_page_wire_names() {
        let page = EmailPage {
            emails: vec![],
            next_page_token: None,
        };
        let json = serde_json::to_value(&page).unwrap();
        assert!(json["email_list"].is_array());
        assert!(json["nextPageToken"].is_null());
    }
}
