//! Gmail utility functions
//!
//! Recipient validation, header helpers and draft message construction.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use mail_builder::headers::address::Address;
use mail_builder::headers::raw::Raw;
use mail_builder::MessageBuilder;

use crate::error::{GmailMcpError, Result, ValidationError};
use crate::gmail::types::MessagePart;

/// Subject used when the caller or the parent message has none
pub const DEFAULT_SUBJECT: &str = "No Subject";

/// Validate a bare email address
pub fn validate_email(email: &str) -> bool {
    !email.chars().any(char::is_whitespace) && validator::validate_email(email)
}

/// Pull the bare address out of `"Name <user@example.com>"`
pub fn extract_address(raw: &str) -> &str {
    let raw = raw.trim();
    match (raw.rfind('<'), raw.rfind('>')) {
        (Some(start), Some(end)) if start < end => raw[start + 1..end].trim(),
        _ => raw,
    }
}

/// A draft recipient, optionally with a display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub name: Option<String>,
    pub email: String,
}

impl Recipient {
    /// Parse `user@example.com` or `Name <user@example.com>`
    pub fn parse(raw: &str) -> Result<Self> {
        let email = extract_address(raw);
        if !validate_email(email) {
            return Err(GmailMcpError::Validation(ValidationError::InvalidEmail {
                email: raw.trim().to_string(),
            }));
        }

        let name = raw
            .trim()
            .rfind('<')
            .map(|i| raw.trim()[..i].trim().trim_matches('"').to_string())
            .filter(|n| !n.is_empty());

        Ok(Self {
            name,
            email: email.to_string(),
        })
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name {
            Some(ref name) => write!(f, "{} <{}>", name, self.email),
            None => f.write_str(&self.email),
        }
    }
}

/// Split a `To`-style list on commas outside quotes and angle brackets
pub fn split_addresses(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut in_angle = false;
    let mut start = 0;

    for (i, c) in raw.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => in_angle = true,
            '>' if !in_quotes => in_angle = false,
            ',' if !in_quotes && !in_angle => {
                parts.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts
}

/// Parse every non-blank recipient, failing on the first invalid one.
///
/// Each entry may itself hold a comma-separated list.
pub fn parse_recipients<S: AsRef<str>>(raw: &[S]) -> Result<Vec<Recipient>> {
    raw.iter()
        .flat_map(|r| split_addresses(r.as_ref()))
        .filter(|r| !r.trim().is_empty())
        .map(Recipient::parse)
        .collect()
}

/// Prefix `Re: ` unless the subject already carries it
pub fn reply_subject(subject: &str) -> String {
    let subject = subject.trim();
    if subject.is_empty() {
        return format!("Re: {}", DEFAULT_SUBJECT);
    }
    let already_reply = subject
        .get(..3)
        .map(|p| p.eq_ignore_ascii_case("re:"))
        .unwrap_or(false);
    if already_reply {
        subject.to_string()
    } else {
        format!("Re: {}", subject)
    }
}

/// Find header value by name (case-insensitive)
pub fn find_header<'a>(part: &'a MessagePart, name: &str) -> Option<&'a str> {
    part.headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

/// Threading information for a reply draft
#[derive(Debug, Clone, Default)]
pub struct ReplyContext {
    pub thread_id: Option<String>,
    /// Parent `Message-ID`
    pub in_reply_to: Option<String>,
    /// Parent `References` followed by the parent `Message-ID`
    pub references: Vec<String>,
}

/// Everything needed to build a draft
#[derive(Debug, Clone)]
pub struct DraftRequest {
    pub to: Vec<Recipient>,
    pub subject: String,
    pub body: String,
    pub reply: Option<ReplyContext>,
}

impl DraftRequest {
    /// Recipients as they appear in the `To` header
    pub fn to_header(&self) -> String {
        self.to
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Build the RFC 5322 message for a draft
pub fn create_email_message(request: &DraftRequest) -> Result<Vec<u8>> {
    let subject = if request.subject.trim().is_empty() {
        DEFAULT_SUBJECT
    } else {
        request.subject.as_str()
    };

    let mut builder = MessageBuilder::new()
        .subject(subject)
        .text_body(request.body.as_str());

    if !request.to.is_empty() {
        let addresses: Vec<Address> = request
            .to
            .iter()
            .map(|r| Address::new_address(r.name.as_deref(), r.email.as_str()))
            .collect();
        builder = builder.to(Address::new_list(addresses));
    }

    if let Some(ref reply) = request.reply {
        if let Some(ref parent) = reply.in_reply_to {
            builder = builder.header("In-Reply-To", Raw::new(parent.as_str()));
        }
        if !reply.references.is_empty() {
            builder = builder.header("References", Raw::new(reply.references.join(" ")));
        }
    }

    Ok(builder.write_to_vec()?)
}

/// Encode a raw email message for Gmail API (base64url, no padding)
pub fn encode_raw_message(message: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(message)
}
