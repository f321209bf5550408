//! Gmail API gateway backing the `search_emails` tool: lists matching
//! messages, fetches full message details, renders them for the model

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use futures_util::future::join_all;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Redacted projection of one matched email returned to the caller.
/// The body and attachments only ever appear in the rendered text shown
/// to the model.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EmailRecord {
    pub message_id: String,
    pub from_email: String,
    pub subject: String,
    pub date: String,
}

/// What one search produced: the text rendering fed back to the model
/// and the structured records accumulated for the caller.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    pub rendered: String,
    pub records: Vec<EmailRecord>,
}

/// The mailbox-query capability the chat loop depends on.
#[async_trait]
pub trait MailSearch {
    async fn search(&self, token: &str, query: &str, limit: usize) -> Result<SearchOutcome, Error>;
}

// Message structures from the Gmail API documentation

#[derive(Debug, Deserialize)]
pub struct MessageId {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ListMessagesResponse {
    pub messages: Option<Vec<MessageId>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub id: String,
    pub payload: Option<MessagePayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagePayload {
    pub headers: Option<Vec<MessageHeader>>,
    pub body: Option<MessagePartBody>,
    pub parts: Option<Vec<MessagePart>>,
    #[serde(rename = "mimeType")]
    pub mimetype: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagePart {
    #[serde(rename = "mimeType")]
    pub mimetype: String,
    pub filename: Option<String>,
    pub body: Option<MessagePartBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagePartBody {
    // Base64 encoded
    pub data: Option<String>,
    #[serde(rename = "attachmentId")]
    pub attachment_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

/// One fetched message reduced to the fields the assistant works with.
/// The `Display` impl is the exact rendering shown to the model.
#[derive(Debug, Clone)]
pub struct RenderedMessage {
    pub message_id: String,
    pub from_email: String,
    pub subject: String,
    pub date: String,
    pub body: String,
    pub attachments: Vec<String>,
}

impl fmt::Display for RenderedMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<From>{}</From>\n<Subject>{}</Subject>\n<Date>{}</Date>\n<Body>{}</Body>",
            self.from_email, self.subject, self.date, self.body
        )?;
        if !self.attachments.is_empty() {
            write!(f, "\n<Attachments>{}</Attachments>", self.attachments.join(", "))?;
        }
        Ok(())
    }
}

fn decode_base64(data: &str) -> String {
    URL_SAFE
        .decode(data)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| {
            tracing::error!("Base64 decode failed for message body");
            String::new()
        })
}

fn html_to_text(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    html2text::from_read(html.as_bytes(), 80).unwrap_or_default()
}

/// Extract the body text and attachment filenames from a message payload.
///
/// A message either has a top-level `body.data` (with the payload
/// `mimeType` saying whether it's plain text or HTML) or one or more
/// `parts`. Parts with a filename are attachments; otherwise the plain
/// text part wins over the HTML one.
pub fn extract_body(payload: &MessagePayload) -> (String, Vec<String>) {
    let mut attachments = Vec::new();
    let mut text_body = String::new();
    let mut html_body = String::new();

    if let Some(parts) = &payload.parts {
        for part in parts {
            if let Some(filename) = part.filename.as_deref().filter(|f| !f.is_empty()) {
                attachments.push(filename.to_string());
                continue;
            }
            let data = part
                .body
                .as_ref()
                .filter(|body| body.attachment_id.is_none())
                .and_then(|body| body.data.as_deref());
            let Some(data) = data else { continue };
            if part.mimetype == "text/plain" && text_body.is_empty() {
                text_body = decode_base64(data);
            } else if part.mimetype == "text/html" && html_body.is_empty() {
                html_body = decode_base64(data);
            }
        }
    } else if let Some(data) = payload.body.as_ref().and_then(|body| body.data.as_deref()) {
        match payload.mimetype.as_deref() {
            Some("text/html") => html_body = decode_base64(data),
            _ => text_body = decode_base64(data),
        }
    }

    let body = if text_body.is_empty() {
        html_to_text(&html_body)
    } else {
        text_body
    };
    (body, attachments)
}

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+|www\.\S+").expect("Invalid URL regex"));
static REPLY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^On .{0,200}wrote:").expect("Invalid reply regex"));

/// Normalize a message body before showing it to the model: drop the
/// quoted reply tail, strip URLs and quoted lines, and collapse blank
/// lines.
pub fn clean_message_body(body: &str) -> String {
    let body = match REPLY_PATTERN.find(body) {
        Some(m) => &body[..m.start()],
        None => body,
    };
    let body = URL_PATTERN.replace_all(body, "");
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('>'))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct GmailSearchGateway {
    http: Client,
    api_hostname: String,
}

impl GmailSearchGateway {
    pub fn new(api_hostname: &str) -> Self {
        Self {
            http: Client::new(),
            api_hostname: api_hostname.trim_end_matches("/").to_string(),
        }
    }

    async fn list_message_ids(&self, token: &str, query: &str) -> Result<Vec<MessageId>, Error> {
        let url = format!("{}/gmail/v1/users/me/messages", self.api_hostname);
        let res = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("q", query)])
            .timeout(Duration::from_secs(30))
            .send()
            .await?;
        let status = res.status();
        let text = res.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("Message list failed: {} ({})", status, text);
        }
        let msgs: ListMessagesResponse = serde_json::from_str(&text)?;
        Ok(msgs.messages.unwrap_or_default())
    }

    async fn fetch_message(&self, token: &str, message_id: &str) -> Result<RenderedMessage, Error> {
        tracing::debug!("Getting message details for {}", message_id);
        let url = format!("{}/gmail/v1/users/me/messages/{}", self.api_hostname, message_id);
        let res = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("format", "full")])
            .timeout(Duration::from_secs(30))
            .send()
            .await?;
        let status = res.status();
        let text = res.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("Message fetch failed: {} ({})", status, text);
        }
        let message: Message = serde_json::from_str(&text)?;
        let payload = message
            .payload
            .ok_or_else(|| anyhow!("Message {} has no payload", message.id))?;

        let headers = payload.headers.clone().unwrap_or_default();
        let header = |name: &str| {
            headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name))
                .map(|h| h.value.clone())
                .unwrap_or_default()
        };

        let (body, attachments) = extract_body(&payload);
        Ok(RenderedMessage {
            message_id: message.id,
            from_email: header("From"),
            subject: header("Subject"),
            date: header("Date"),
            body: clean_message_body(&body),
            attachments,
        })
    }
}

#[async_trait]
impl MailSearch for GmailSearchGateway {
    async fn search(&self, token: &str, query: &str, limit: usize) -> Result<SearchOutcome, Error> {
        let ids = self.list_message_ids(token, query).await?;
        tracing::info!("Received {} messages for query", ids.len());

        // Fetch details concurrently but keep the listing order
        let fetches = ids
            .iter()
            .take(limit)
            .map(|m| self.fetch_message(token, &m.id));
        let results = join_all(fetches).await;

        let mut rendered = Vec::new();
        let mut records = Vec::new();
        for result in results {
            match result {
                Ok(msg) => {
                    records.push(EmailRecord {
                        message_id: msg.message_id.clone(),
                        from_email: msg.from_email.clone(),
                        subject: msg.subject.clone(),
                        date: msg.date.clone(),
                    });
                    rendered.push(msg.to_string());
                }
                // A single broken message shouldn't sink the whole
                // search result
                Err(e) => tracing::error!("Fetching message details failed: {}", e),
            }
        }

        let rendered = rendered.join("\n").trim().to_string();
        if rendered.is_empty() {
            return Ok(SearchOutcome {
                rendered: String::from("Some error occurred in fetching emails. Please try again."),
                records: Vec::new(),
            });
        }
        Ok(SearchOutcome { rendered, records })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn it_renders_a_message_with_attachments() {
        let msg = RenderedMessage {
            message_id: String::from("abc123"),
            from_email: String::from("alice@example.com"),
            subject: String::from("Dinner"),
            date: String::from("Mon, 3 Jun 2024 10:00:00 +0000"),
            body: String::from("See you at 7"),
            attachments: vec![String::from("menu.pdf"), String::from("map.png")],
        };
        assert_eq!(
            msg.to_string(),
            "<From>alice@example.com</From>\n<Subject>Dinner</Subject>\n<Date>Mon, 3 Jun 2024 10:00:00 +0000</Date>\n<Body>See you at 7</Body>\n<Attachments>menu.pdf, map.png</Attachments>"
        );
    }

    #[test]
    fn it_renders_a_message_without_attachments() {
        let msg = RenderedMessage {
            message_id: String::from("abc123"),
            from_email: String::from("alice@example.com"),
            subject: String::from("Dinner"),
            date: String::from("Mon, 3 Jun 2024 10:00:00 +0000"),
            body: String::from("See you at 7"),
            attachments: vec![],
        };
        assert!(!msg.to_string().contains("<Attachments>"));
    }

    #[test]
    fn it_cleans_urls_and_quoted_replies_from_bodies() {
        let body = "Check this out: https://example.com/offer\n\n> quoted line\nSee you soon\nOn Mon, Jun 3, 2024 at 10:00 AM Alice <alice@example.com> wrote:\nOld reply text";
        let cleaned = clean_message_body(body);
        assert_eq!(cleaned, "Check this out:\nSee you soon");
    }

    #[test]
    fn it_prefers_the_plain_text_part_and_collects_attachments() {
        let payload: MessagePayload = serde_json::from_value(json!({
            "headers": [],
            "parts": [
                { "mimeType": "application/pdf", "filename": "report.pdf", "body": { "attachmentId": "att1" } },
                { "mimeType": "text/html", "body": { "data": URL_SAFE.encode("<p>Hello</p>") } },
                { "mimeType": "text/plain", "body": { "data": URL_SAFE.encode("Hello plain") } }
            ]
        }))
        .expect("Payload should deserialize");

        let (body, attachments) = extract_body(&payload);
        assert_eq!(body, "Hello plain");
        assert_eq!(attachments, vec![String::from("report.pdf")]);
    }

    #[test]
    fn it_falls_back_to_the_top_level_html_body() {
        let payload: MessagePayload = serde_json::from_value(json!({
            "mimeType": "text/html",
            "body": { "data": URL_SAFE.encode("<p>Hello html</p>") }
        }))
        .expect("Payload should deserialize");

        let (body, attachments) = extract_body(&payload);
        assert_eq!(body.trim(), "Hello html");
        assert!(attachments.is_empty());
    }

    #[tokio::test]
    async fn it_searches_and_renders_messages_in_listing_order() -> Result<()> {
        let mut server = mockito::Server::new_async().await;

        let _list = server
            .mock("GET", "/gmail/v1/users/me/messages")
            .match_query(mockito::Matcher::UrlEncoded(
                "q".into(),
                "from:alice@example.com".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "messages": [{ "id": "m1" }, { "id": "m2" }] }).to_string())
            .create_async()
            .await;

        let message = |id: &str, subject: &str| {
            json!({
                "id": id,
                "payload": {
                    "headers": [
                        { "name": "From", "value": "alice@example.com" },
                        { "name": "Subject", "value": subject },
                        { "name": "Date", "value": "Mon, 3 Jun 2024 10:00:00 +0000" }
                    ],
                    "mimeType": "text/plain",
                    "body": { "data": URL_SAFE.encode("Hello there") }
                }
            })
        };
        let _m1 = server
            .mock("GET", "/gmail/v1/users/me/messages/m1")
            .match_query(mockito::Matcher::UrlEncoded("format".into(), "full".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(message("m1", "First").to_string())
            .create_async()
            .await;
        let _m2 = server
            .mock("GET", "/gmail/v1/users/me/messages/m2")
            .match_query(mockito::Matcher::UrlEncoded("format".into(), "full".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(message("m2", "Second").to_string())
            .create_async()
            .await;

        let gateway = GmailSearchGateway::new(&server.url());
        let outcome = gateway
            .search("test-token", "from:alice@example.com", 10)
            .await?;

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].message_id, "m1");
        assert_eq!(outcome.records[0].subject, "First");
        assert_eq!(outcome.records[1].message_id, "m2");
        assert!(outcome.rendered.contains("<Subject>First</Subject>"));
        assert!(outcome.rendered.contains("<Body>Hello there</Body>"));

        Ok(())
    }

    #[tokio::test]
    async fn it_returns_the_error_sentinel_when_nothing_matches() -> Result<()> {
        let mut server = mockito::Server::new_async().await;

        let _list = server
            .mock("GET", "/gmail/v1/users/me/messages")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({}).to_string())
            .create_async()
            .await;

        let gateway = GmailSearchGateway::new(&server.url());
        let outcome = gateway.search("test-token", "from:nobody", 10).await?;

        assert_eq!(
            outcome.rendered,
            "Some error occurred in fetching emails. Please try again."
        );
        assert!(outcome.records.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn it_fails_when_the_listing_call_is_rejected() {
        let mut server = mockito::Server::new_async().await;

        let _list = server
            .mock("GET", "/gmail/v1/users/me/messages")
            .match_query(mockito::Matcher::Any)
            .with_status(401)
            .with_body(r#"{"error": "invalid credentials"}"#)
            .create_async()
            .await;

        let gateway = GmailSearchGateway::new(&server.url());
        let result = gateway.search("bad-token", "from:alice", 10).await;

        assert!(result.is_err());
    }
}
