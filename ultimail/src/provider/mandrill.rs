//! Mandrill email provider integration.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::{DeliveryReceipt, MailError, MailOptions, Message, Provider, Result};

/// Mandrill configuration.
#[derive(Debug, Clone)]
pub struct MandrillConfig {
    /// API key.
    pub api_key: String,
    /// API endpoint (defaults to production).
    pub endpoint: String,
    /// Ask Mandrill to queue the message and return immediately.
    pub asynchronous: bool,
}

impl MandrillConfig {
    /// Create a new Mandrill configuration.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: "https://mandrillapp.com/api/1.0/messages/send.json".to_string(),
            asynchronous: true,
        }
    }

    /// Set a custom endpoint (for testing).
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Wait for Mandrill to process the message before responding.
    pub fn synchronous(mut self) -> Self {
        self.asynchronous = false;
        self
    }
}

/// Mandrill provider.
pub struct MandrillProvider {
    client: Client,
    config: MandrillConfig,
}

impl MandrillProvider {
    /// Create a new Mandrill provider.
    pub fn new(config: MandrillConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Provider for MandrillProvider {
    async fn dispatch(&self, message: &Message, _options: &MailOptions) -> Result<DeliveryReceipt> {
        let request = SendRequest {
            key: &self.config.api_key,
            message: MandrillMessage::from_message(message)?,
            is_async: self.config.asynchronous,
        };

        debug!(
            to = ?message.to(),
            subject = ?message.subject(),
            "Sending email via Mandrill"
        );

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| MailError::Network(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let detail = serde_json::from_str::<MandrillError>(&body)
                .map(|e| format!("{}: {}", e.name, e.message))
                .unwrap_or(body);
            return Err(MailError::Provider(format!("Mandrill error {}: {}", status, detail)));
        }

        let raw: serde_json::Value = serde_json::from_str(&body)?;
        let results: Vec<RecipientStatus> = serde_json::from_value(raw.clone())?;

        if let Some(rejected) = results
            .iter()
            .find(|r| r.status == "rejected" || r.status == "invalid")
        {
            warn!(email = %rejected.email, status = %rejected.status, "Mandrill rejected recipient");
            return Err(MailError::Provider(format!(
                "Mandrill {} {}: {}",
                rejected.status,
                rejected.email,
                rejected.reject_reason.as_deref().unwrap_or("no reason given")
            )));
        }

        let receipt = DeliveryReceipt::new(self.name()).response(raw);
        Ok(match results.into_iter().find_map(|r| r.id) {
            Some(id) => receipt.message_id(id),
            None => receipt,
        })
    }

    fn name(&self) -> &str {
        "mandrill"
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    key: &'a str,
    message: MandrillMessage,
    #[serde(rename = "async")]
    is_async: bool,
}

#[derive(Debug, Serialize)]
struct MandrillMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    subject: String,
    from_email: String,
    to: Vec<Recipient>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    headers: HashMap<String, String>,
    // CSS is already inlined by the styling handler
    inline_css: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<MandrillAttachment>,
}

#[derive(Debug, Serialize)]
struct Recipient {
    email: String,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct MandrillAttachment {
    #[serde(rename = "type")]
    mime_type: String,
    name: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct RecipientStatus {
    email: String,
    status: String,
    reject_reason: Option<String>,
    #[serde(rename = "_id")]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MandrillError {
    name: String,
    message: String,
}

impl MandrillMessage {
    fn from_message(message: &Message) -> Result<Self> {
        let from = message.from().ok_or(MailError::Validation("from"))?;

        let to = [
            ("to", message.to()),
            ("cc", message.cc()),
            ("bcc", message.bcc()),
        ]
        .into_iter()
        .flat_map(|(kind, addresses)| {
            addresses.iter().map(move |email| Recipient {
                email: email.clone(),
                kind,
            })
        })
        .collect();

        let mut headers = HashMap::new();
        if let Some(reply_to) = message.reply_to() {
            headers.insert("Reply-To".to_string(), reply_to.to_string());
        }

        let attachments = message
            .attachments()
            .iter()
            .map(|a| MandrillAttachment {
                mime_type: a.mime_type.clone(),
                name: a.filename.clone(),
                content: base64::engine::general_purpose::STANDARD.encode(&a.content),
            })
            .collect();

        Ok(Self {
            html: message.html_body().map(str::to_string),
            text: message.plain_body().map(str::to_string),
            subject: message.subject().unwrap_or_default().to_string(),
            from_email: from.to_string(),
            to,
            headers,
            inline_css: false,
            attachments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn prepared() -> Message {
        let mut message = Message::new();
        message
            .set_to("a@example.com")
            .set_bcc("hidden@example.com")
            .set_from("webmaster@example.com")
            .set_reply_to("help@example.com")
            .set_subject("Welcome")
            .set_html_body("<p>Hi</p>");
        message
    }

    #[test]
    fn test_recipients_are_typed() {
        let payload = serde_json::to_value(MandrillMessage::from_message(&prepared()).unwrap()).unwrap();

        assert_eq!(
            payload["to"],
            json!([
                { "email": "a@example.com", "type": "to" },
                { "email": "hidden@example.com", "type": "bcc" }
            ])
        );
        assert_eq!(payload["headers"]["Reply-To"], json!("help@example.com"));
        assert_eq!(payload["inline_css"], json!(false));
    }

    #[tokio::test]
    async fn test_mandrill_dispatch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "key": "key", "async": true })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "email": "a@example.com", "status": "queued", "_id": "abc123" }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let provider = MandrillProvider::new(MandrillConfig::new("key").endpoint(server.uri()));
        let receipt = provider.dispatch(&prepared(), &MailOptions::new()).await.unwrap();

        assert_eq!(receipt.message_id.as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn test_mandrill_synchronous_send() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "async": false })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "email": "a@example.com", "status": "sent", "_id": "sync1" }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let config = MandrillConfig::new("key").endpoint(server.uri()).synchronous();
        assert!(!config.asynchronous);

        let receipt = MandrillProvider::new(config)
            .dispatch(&prepared(), &MailOptions::new())
            .await
            .unwrap();
        assert_eq!(receipt.message_id.as_deref(), Some("sync1"));
    }

    #[tokio::test]
    async fn test_mandrill_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "email": "a@example.com", "status": "rejected", "reject_reason": "hard-bounce" }
            ])))
            .mount(&server)
            .await;

        let provider = MandrillProvider::new(MandrillConfig::new("key").endpoint(server.uri()));
        let err = provider.dispatch(&prepared(), &MailOptions::new()).await.unwrap_err();

        assert!(matches!(err, MailError::Provider(ref m) if m.contains("hard-bounce")));
    }
}
