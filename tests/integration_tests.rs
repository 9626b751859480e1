//! Integration tests for the Gmail Reader MCP Server
//!
//! These tests drive the MCP server end to end against a mocked Gmail API
//! and token endpoint - they don't make real API calls.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{body_partial_json, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gmail_reader_mcp::config::Config;
use gmail_reader_mcp::gmail::auth::Authenticator;
use gmail_reader_mcp::gmail::client::GmailClient;
use gmail_reader_mcp::gmail::consent::{AuthorizationGrant, ConsentFlow, ConsentRequest};
use gmail_reader_mcp::gmail::store::now_secs;
use gmail_reader_mcp::mcp::server::McpServer;
use gmail_reader_mcp::{ErrorKind, GmailMcpError};

/// Consent that approves immediately and counts its prompts
struct ApprovingConsent {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ConsentFlow for ApprovingConsent {
    async fn authorize(&self, _request: &ConsentRequest) -> gmail_reader_mcp::Result<AuthorizationGrant> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AuthorizationGrant {
            code: "code-1".to_string(),
            redirect_uri: "http://127.0.0.1:1/oauth2callback".to_string(),
        })
    }
}

struct Harness {
    gmail: MockServer,
    dir: TempDir,
    consents: Arc<AtomicUsize>,
}

impl Harness {
    /// Mock server plus a working directory holding a client secret
    async fn new() -> Self {
        let gmail = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let secret = json!({
            "installed": {
                "client_id": "client-1",
                "client_secret": "secret-1",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": format!("{}/token", gmail.uri()),
                "redirect_uris": ["http://localhost"]
            }
        });
        std::fs::write(dir.path().join("credentials.json"), secret.to_string()).unwrap();

        Self {
            gmail,
            dir,
            consents: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Same, with a valid cached token so no consent is needed
    async fn authorized() -> Self {
        let harness = Self::new().await;
        write_token(harness.dir.path(), "valid-token", now_secs() + 3600);
        harness
    }

    async fn client(&self) -> GmailClient {
        let consent = ApprovingConsent {
            calls: self.consents.clone(),
        };
        let authenticator = Authenticator::with_consent(Config::in_dir(self.dir.path()), Box::new(consent))
            .await
            .unwrap();
        GmailClient::new(Arc::new(authenticator)).with_base_url(self.gmail.uri())
    }

    async fn server(&self) -> McpServer {
        McpServer::new(Arc::new(self.client().await))
    }
}

fn write_token(dir: &Path, access_token: &str, expiry: i64) {
    let creds = json!({
        "access_token": access_token,
        "refresh_token": "refresh-1",
        "token_type": "Bearer",
        "expiry_date": expiry,
        "scope": ""
    });
    std::fs::write(dir.join("token.json"), creds.to_string()).unwrap();
}

fn metadata(id: &str, thread: &str, headers: &[(&str, &str)]) -> Value {
    json!({
        "id": id,
        "threadId": thread,
        "labelIds": ["INBOX"],
        "snippet": format!("snippet of {}", id),
        "internalDate": "1731401723000",
        "payload": {
            "mimeType": "text/plain",
            "headers": headers
                .iter()
                .map(|(n, v)| json!({"name": n, "value": v}))
                .collect::<Vec<_>>()
        }
    })
}

async fn mount_metadata(server: &MockServer, id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/users/me/messages/{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(metadata(
            id,
            &format!("thread-{}", id),
            &[
                ("From", "Alice <alice@example.com>"),
                ("Subject", &format!("Subject {}", id)),
                ("Date", "Tue, 12 Nov 2024 09:15:23 +0000"),
            ],
        )))
        .mount(server)
        .await;
}

async fn mount_draft_created(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/users/me/drafts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "draft-1",
            "message": {"id": "draft-msg-1", "threadId": "thread-x"}
        })))
        .mount(server)
        .await;
}

/// Call a tool through the server; returns `(is_error, parsed text content)`
async fn call_tool(server: &mut McpServer, name: &str, arguments: Value) -> (bool, Value) {
    let request = json!({
        "jsonrpc": "2.0",
        "id": 7,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    });
    let response = server.handle_message(&request.to_string()).await.unwrap();
    assert!(response.error.is_none());

    let result = response.result.unwrap();
    let text = result["content"][0]["text"].as_str().unwrap();
    (
        result["isError"].as_bool().unwrap_or(false),
        serde_json::from_str(text).unwrap(),
    )
}

fn decode_draft_raw(body: &[u8]) -> String {
    let request: Value = serde_json::from_slice(body).unwrap();
    let raw = request["message"]["raw"].as_str().unwrap();
    String::from_utf8(URL_SAFE_NO_PAD.decode(raw).unwrap()).unwrap()
}

mod read_emails_tests {
    use super::*;

    #[tokio::test]
    async fn test_pages_follow_each_other() {
        let harness = Harness::authorized().await;

        Mock::given(method("GET"))
            .and(path("/users/me/messages"))
            .and(query_param("labelIds", "INBOX"))
            .and(query_param("maxResults", "2"))
            .and(query_param_is_missing("pageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{"id": "a", "threadId": "thread-a"}, {"id": "b", "threadId": "thread-b"}],
                "nextPageToken": "page-2"
            })))
            .mount(&harness.gmail)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages"))
            .and(query_param("pageToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{"id": "c", "threadId": "thread-c"}]
            })))
            .mount(&harness.gmail)
            .await;
        for id in ["a", "b", "c"] {
            mount_metadata(&harness.gmail, id).await;
        }

        let mut server = harness.server().await;

        let (is_error, first) = call_tool(&mut server, "read_emails", json!({"max_results": 2})).await;
        assert!(!is_error);
        assert_eq!(first["nextPageToken"], "page-2");
        let first_ids: Vec<&str> = first["email_list"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["id"].as_str().unwrap())
            .collect();
        assert_eq!(first_ids, vec!["a", "b"]);
        assert_eq!(first["email_list"][0]["sender"], "Alice <alice@example.com>");
        assert_eq!(first["email_list"][0]["subject"], "Subject a");
        assert_eq!(first["email_list"][0]["thread_id"], "thread-a");

        let (_, second) = call_tool(
            &mut server,
            "read_emails",
            json!({"max_results": 2, "page_token": "page-2"}),
        )
        .await;
        assert_eq!(second["email_list"].as_array().unwrap().len(), 1);
        assert_eq!(second["email_list"][0]["id"], "c");
        assert!(second["nextPageToken"].is_null());
    }

    #[tokio::test]
    async fn test_empty_inbox() {
        let harness = Harness::authorized().await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"resultSizeEstimate": 0})))
            .mount(&harness.gmail)
            .await;

        let client = harness.client().await;
        let page = assert_ok!(client.list_recent(5, None).await);
        assert!(page.emails.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_vanished_message_is_skipped() {
        let harness = Harness::authorized().await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{"id": "gone", "threadId": "t"}, {"id": "a", "threadId": "thread-a"}]
            })))
            .mount(&harness.gmail)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&harness.gmail)
            .await;
        mount_metadata(&harness.gmail, "a").await;

        let client = harness.client().await;
        let page = assert_ok!(client.list_recent(5, None).await);
        assert_eq!(page.emails.len(), 1);
        assert_eq!(page.emails[0].id, "a");
    }

    #[tokio::test]
    async fn test_limit_is_clamped() {
        let harness = Harness::authorized().await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages"))
            .and(query_param("maxResults", "500"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&harness.gmail)
            .await;

        let client = harness.client().await;
        assert_ok!(client.list_recent(10_000, None).await);
    }

    #[tokio::test]
    async fn test_zero_limit_is_rejected_without_a_request() {
        let harness = Harness::authorized().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount(&harness.gmail)
            .await;

        let mut server = harness.server().await;
        let (is_error, envelope) = call_tool(&mut server, "read_emails", json!({"max_results": 0})).await;
        assert!(is_error);
        assert_eq!(envelope["error"]["kind"], "validation_error");
    }

    #[tokio::test]
    async fn test_rate_limit_is_api_error() {
        let harness = Harness::authorized().await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&harness.gmail)
            .await;

        let mut server = harness.server().await;
        let (is_error, envelope) = call_tool(&mut server, "read_emails", json!({})).await;
        assert!(is_error);
        assert_eq!(envelope["error"]["kind"], "api_error");
        assert!(envelope["error"]["message"].as_str().unwrap().contains("quota exceeded"));
    }
}

mod draft_tests {
    use super::*;

    #[tokio::test]
    async fn test_new_draft() {
        let harness = Harness::authorized().await;
        mount_draft_created(&harness.gmail).await;

        let mut server = harness.server().await;
        let (is_error, result) = call_tool(
            &mut server,
            "create_new_email_draft",
            json!({"recipient": "bob@example.com", "subject": "Hello", "body_text": "Hi Bob"}),
        )
        .await;

        assert!(!is_error);
        assert_eq!(result["draft_id"], "draft-1");
        assert_eq!(result["message_id"], "draft-msg-1");
        assert_eq!(result["to"], "bob@example.com");
        assert_eq!(result["subject"], "Hello");
        assert!(result["status"].as_str().unwrap().contains("bob@example.com"));

        let requests = harness.gmail.received_requests().await.unwrap();
        let raw = decode_draft_raw(&requests[0].body);
        assert!(raw.contains("bob@example.com"));
        assert!(raw.contains("Subject: Hello"));
        assert!(raw.contains("Hi Bob"));
    }

    #[tokio::test]
    async fn test_new_draft_without_recipients() {
        let harness = Harness::authorized().await;
        mount_draft_created(&harness.gmail).await;

        let mut server = harness.server().await;
        let (is_error, result) = call_tool(&mut server, "create_new_email_draft", json!({})).await;

        assert!(!is_error);
        assert_eq!(result["to"], "");
        assert_eq!(result["subject"], "No Subject");
    }

    #[tokio::test]
    async fn test_invalid_recipient_sends_nothing() {
        let harness = Harness::authorized().await;
        Mock::given(method("POST"))
            .and(path("/users/me/drafts"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&harness.gmail)
            .await;

        let mut server = harness.server().await;
        let (is_error, envelope) = call_tool(
            &mut server,
            "create_new_email_draft",
            json!({"recipient": ["ok@example.com", "not-an-address"]}),
        )
        .await;

        assert!(is_error);
        assert_eq!(envelope["error"]["kind"], "validation_error");
        assert!(envelope["error"]["message"].as_str().unwrap().contains("not-an-address"));
    }

    #[tokio::test]
    async fn test_reply_draft_threads_with_parent() {
        let harness = Harness::authorized().await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages/parent-1"))
            .and(query_param("format", "metadata"))
            .respond_with(ResponseTemplate::new(200).set_body_json(metadata(
                "parent-1",
                "thread-9",
                &[
                    ("From", "Carol <carol@example.com>"),
                    ("Subject", "Quarterly numbers"),
                    ("Message-ID", "<parent-1@mail.example.com>"),
                ],
            )))
            .mount(&harness.gmail)
            .await;
        Mock::given(method("POST"))
            .and(path("/users/me/drafts"))
            .and(body_partial_json(json!({"message": {"threadId": "thread-9"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "draft-2",
                "message": {"id": "draft-msg-2", "threadId": "thread-9"}
            })))
            .expect(1)
            .mount(&harness.gmail)
            .await;

        let mut server = harness.server().await;
        let (is_error, result) = call_tool(
            &mut server,
            "create_reply_draft",
            json!({"email_id": "parent-1", "reply_text": "Looks good"}),
        )
        .await;

        assert!(!is_error);
        assert_eq!(result["draft_id"], "draft-2");
        assert_eq!(result["thread_id"], "thread-9");
        assert_eq!(result["to"], "carol@example.com");
        assert_eq!(result["subject"], "Re: Quarterly numbers");

        let requests = harness.gmail.received_requests().await.unwrap();
        let draft = requests.iter().find(|r| r.method.as_str() == "POST").unwrap();
        let raw = decode_draft_raw(&draft.body);
        assert!(raw.contains("In-Reply-To: <parent-1@mail.example.com>"));
        assert!(raw.contains("References: <parent-1@mail.example.com>"));
        assert!(raw.contains("Looks good"));
    }

    #[tokio::test]
    async fn test_reply_to_missing_message_is_not_found() {
        let harness = Harness::authorized().await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages/nope"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": 404, "message": "Requested entity was not found."}
            })))
            .mount(&harness.gmail)
            .await;

        let client = harness.client().await;
        let err = assert_err!(client.create_reply_draft("nope", "hello").await);
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let mut server = harness.server().await;
        let (is_error, envelope) = call_tool(
            &mut server,
            "create_reply_draft",
            json!({"email_id": "nope", "reply_text": "hello"}),
        )
        .await;
        assert!(is_error);
        assert_eq!(envelope["error"]["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_reply_to_malformed_id_is_not_found() {
        let harness = Harness::authorized().await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages/made-up-id"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": 400, "message": "Invalid id value", "status": "INVALID_ARGUMENT"}
            })))
            .mount(&harness.gmail)
            .await;
        Mock::given(method("POST"))
            .and(path("/users/me/drafts"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&harness.gmail)
            .await;

        let mut server = harness.server().await;
        let (is_error, envelope) = call_tool(
            &mut server,
            "create_reply_draft",
            json!({"email_id": "made-up-id", "reply_text": "hello"}),
        )
        .await;
        assert!(is_error);
        assert_eq!(envelope["error"]["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_other_bad_request_stays_api_error() {
        let harness = Harness::authorized().await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages/m1"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Bad metadataHeaders"))
            .mount(&harness.gmail)
            .await;

        let client = harness.client().await;
        let err = assert_err!(client.create_reply_draft("m1", "hello").await);
        assert_eq!(err.kind(), ErrorKind::Api);
        assert!(err.to_string().contains("Bad metadataHeaders"));
    }

    #[tokio::test]
    async fn test_new_draft_with_comma_separated_recipients() {
        let harness = Harness::authorized().await;
        mount_draft_created(&harness.gmail).await;

        let mut server = harness.server().await;
        let (is_error, result) = call_tool(
            &mut server,
            "create_new_email_draft",
            json!({"recipient": "alice@example.com, bob@example.com", "subject": "Sync"}),
        )
        .await;

        assert!(!is_error);
        assert_eq!(result["to"], "alice@example.com, bob@example.com");

        let requests = harness.gmail.received_requests().await.unwrap();
        let raw = decode_draft_raw(&requests[0].body);
        assert!(raw.contains("alice@example.com"));
        assert!(raw.contains("bob@example.com"));
    }
}

mod auth_flow_tests {
    use super::*;

    #[tokio::test]
    async fn test_first_tool_call_runs_consent_once() {
        let harness = Harness::new().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh-token",
                "refresh_token": "refresh-2",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&harness.gmail)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(2)
            .mount(&harness.gmail)
            .await;

        let mut server = harness.server().await;
        let (is_error, _) = call_tool(&mut server, "read_emails", json!({})).await;
        assert!(!is_error);
        let (is_error, _) = call_tool(&mut server, "read_emails", json!({})).await;
        assert!(!is_error);

        assert_eq!(harness.consents.load(Ordering::SeqCst), 1);
        assert!(harness.dir.path().join("token.json").exists());

        let requests = harness.gmail.received_requests().await.unwrap();
        let listed = requests.iter().find(|r| r.method.as_str() == "GET").unwrap();
        assert_eq!(
            listed.headers.get("authorization").unwrap().to_str().unwrap(),
            "Bearer fresh-token"
        );
    }

    #[tokio::test]
    async fn test_missing_client_secret_is_auth_error() {
        let gmail = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount(&gmail)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let authenticator = Authenticator::new(Config::in_dir(dir.path())).await.unwrap();
        let client = GmailClient::new(Arc::new(authenticator)).with_base_url(gmail.uri());
        let mut server = McpServer::new(Arc::new(client));

        let (is_error, envelope) = call_tool(&mut server, "read_emails", json!({})).await;
        assert!(is_error);
        assert_eq!(envelope["error"]["kind"], "auth_error");
        assert!(envelope["error"]["message"].as_str().unwrap().contains("credentials.json"));
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_before_listing() {
        let harness = Harness::new().await;
        write_token(harness.dir.path(), "old-token", now_secs() - 60);
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-token",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&harness.gmail)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&harness.gmail)
            .await;

        let client = harness.client().await;
        assert_ok!(client.list_recent(3, None).await);
        assert_eq!(harness.consents.load(Ordering::SeqCst), 0);

        let saved = std::fs::read_to_string(harness.dir.path().join("token.json")).unwrap();
        assert!(saved.contains("new-token"));
        assert!(saved.contains("refresh-1"));
    }
}

mod protocol_tests {
    use super::*;

    #[tokio::test]
    async fn test_stdio_session() {
        let harness = Harness::authorized().await;
        let mut server = harness.server().await;

        let input = [
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {
                "protocolVersion": "2024-11-05",
                "clientInfo": {"name": "test-client", "version": "1.0.0"},
                "capabilities": {}
            }}),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
            json!({"jsonrpc": "2.0", "id": 3, "method": "prompts/list"}),
        ]
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("\n");
        let input = format!("{}\nnot json at all\n", input);

        let mut output = Vec::new();
        assert_ok!(server.run(input.as_bytes(), &mut output).await);
        assert!(server.is_initialized());

        let responses: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(responses.len(), 4);

        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["result"]["protocolVersion"], "2024-11-05");

        let mut names: Vec<&str> = responses[1]["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        names.sort_unstable();
        assert_eq!(names, vec!["create_new_email_draft", "create_reply_draft", "read_emails"]);
        for tool in responses[1]["result"]["tools"].as_array().unwrap() {
            assert_eq!(tool["inputSchema"]["type"], "object");
        }

        assert_eq!(responses[2]["id"], 3);
        assert_eq!(responses[2]["error"]["code"], -32601);

        assert!(responses[3]["id"].is_null());
        assert_eq!(responses[3]["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn test_malformed_arguments_are_validation_errors() {
        let harness = Harness::authorized().await;
        let mut server = harness.server().await;

        let (is_error, envelope) =
            call_tool(&mut server, "create_reply_draft", json!({"email_id": 42})).await;
        assert!(is_error);
        assert_eq!(envelope["error"]["kind"], "validation_error");

        let (is_error, envelope) =
            call_tool(&mut server, "create_reply_draft", json!({"email_id": "", "reply_text": "x"})).await;
        assert!(is_error);
        assert_eq!(envelope["error"]["kind"], "validation_error");
    }

    #[test]
    fn test_error_kinds_have_wire_names() {
        let err = GmailMcpError::NotFound {
            message_id: "x".to_string(),
        };
        assert_eq!(err.kind().as_str(), "not_found");
        assert_eq!(ErrorKind::Auth.as_str(), "auth_error");
        assert_eq!(ErrorKind::Api.as_str(), "api_error");
        assert_eq!(ErrorKind::Validation.as_str(), "validation_error");
    }
}
