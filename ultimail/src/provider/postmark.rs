//! Postmark email provider integration.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{DeliveryReceipt, MailError, MailOptions, Message, Provider, Result};

/// Postmark configuration.
#[derive(Debug, Clone)]
pub struct PostmarkConfig {
    /// Server API token.
    pub server_token: String,
    /// API endpoint (defaults to production).
    pub endpoint: String,
}

impl PostmarkConfig {
    /// Create a new Postmark configuration.
    pub fn new(server_token: impl Into<String>) -> Self {
        Self {
            server_token: server_token.into(),
            endpoint: "https://api.postmarkapp.com/email".to_string(),
        }
    }

    /// Set a custom endpoint (for testing).
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Postmark provider.
pub struct PostmarkProvider {
    client: Client,
    config: PostmarkConfig,
}

impl PostmarkProvider {
    /// Create a new Postmark provider.
    pub fn new(config: PostmarkConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Provider for PostmarkProvider {
    async fn dispatch(&self, message: &Message, _options: &MailOptions) -> Result<DeliveryReceipt> {
        let payload = PostmarkPayload::from_message(message)?;

        debug!(
            to = ?message.to(),
            subject = ?message.subject(),
            "Sending email via Postmark"
        );

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("X-Postmark-Server-Token", &self.config.server_token)
            .header("Accept", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| MailError::Network(e.to_string()))?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(60);
            return Err(MailError::RateLimited(retry_after));
        }

        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let detail = serde_json::from_str::<PostmarkResponse>(&body)
                .map(|r| format!("{} (code {})", r.message, r.error_code))
                .unwrap_or(body);
            return Err(MailError::Provider(format!("Postmark error {}: {}", status, detail)));
        }

        let raw: serde_json::Value = serde_json::from_str(&body)?;
        let parsed: PostmarkResponse = serde_json::from_value(raw.clone())?;

        debug!(message_id = ?parsed.message_id, "Email sent successfully via Postmark");

        let receipt = DeliveryReceipt::new(self.name()).response(raw);
        Ok(match parsed.message_id {
            Some(id) => receipt.message_id(id),
            None => receipt,
        })
    }

    fn name(&self) -> &str {
        "postmark"
    }
}

/// Postmark API payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkPayload {
    from: String,
    to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bcc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<String>,
    subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    html_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text_body: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<PostmarkAttachment>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkAttachment {
    name: String,
    content: String,
    content_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkResponse {
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    message: String,
    #[serde(rename = "MessageID")]
    message_id: Option<String>,
}

fn join(addresses: &[String]) -> Option<String> {
    (!addresses.is_empty()).then(|| addresses.join(","))
}

impl PostmarkPayload {
    fn from_message(message: &Message) -> Result<Self> {
        let from = message.from().ok_or(MailError::Validation("from"))?;

        let attachments = message
            .attachments()
            .iter()
            .map(|a| PostmarkAttachment {
                name: a.filename.clone(),
                content: base64::engine::general_purpose::STANDARD.encode(&a.content),
                content_type: a.mime_type.clone(),
            })
            .collect();

        Ok(Self {
            from: from.to_string(),
            to: message.to().join(","),
            cc: join(message.cc()),
            bcc: join(message.bcc()),
            reply_to: message.reply_to().map(str::to_string),
            subject: message.subject().unwrap_or_default().to_string(),
            html_body: message.html_body().map(str::to_string),
            text_body: message.plain_body().map(str::to_string),
            attachments,
        })
    }
}
