//! SMTP provider.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use std::time::Duration;
use tracing::{debug, info};

use crate::{DeliveryReceipt, MailError, MailOptions, Message, Provider, Result};

/// SMTP security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmtpSecurity {
    /// No encryption (port 25, not recommended).
    None,
    /// STARTTLS upgrade (port 587).
    #[default]
    StartTls,
    /// Implicit TLS (port 465).
    Tls,
}

/// SMTP configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// SMTP server host.
    pub host: String,
    /// SMTP server port.
    pub port: u16,
    /// Security mode.
    pub security: SmtpSecurity,
    /// Username for authentication.
    pub username: Option<String>,
    /// Password for authentication.
    pub password: Option<String>,
    /// Connection timeout.
    pub timeout: Duration,
}

impl SmtpConfig {
    /// Create a new SMTP configuration.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 587,
            security: SmtpSecurity::StartTls,
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Set credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Use STARTTLS security (port 587).
    pub fn starttls(mut self) -> Self {
        self.security = SmtpSecurity::StartTls;
        self.port = 587;
        self
    }

    /// Use implicit TLS security (port 465).
    pub fn tls(mut self) -> Self {
        self.security = SmtpSecurity::Tls;
        self.port = 465;
        self
    }

    /// Use no encryption, e.g. for a local relay or mail catcher.
    pub fn insecure(mut self) -> Self {
        self.security = SmtpSecurity::None;
        self.port = 25;
        self
    }

    /// Set the connection timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Postmark's SMTP relay; the server token is both username and password.
    pub fn postmark(server_token: impl Into<String>) -> Self {
        let token = server_token.into();
        Self::new("smtp.postmarkapp.com")
            .starttls()
            .credentials(token.clone(), token)
    }

    /// Mandrill's SMTP relay.
    pub fn mandrill(username: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::new("smtp.mandrillapp.com")
            .starttls()
            .credentials(username, api_key)
    }
}

/// SMTP provider.
pub struct SmtpProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    config: SmtpConfig,
}

impl SmtpProvider {
    /// Create a new SMTP provider.
    pub async fn new(config: SmtpConfig) -> Result<Self> {
        let mut builder = match config.security {
            SmtpSecurity::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            }
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            }
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?,
        };

        builder = builder.port(config.port).timeout(Some(config.timeout));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let transport = builder.build();

        info!(
            host = %config.host,
            port = config.port,
            security = ?config.security,
            "SMTP provider initialized"
        );

        Ok(Self { transport, config })
    }

    /// Get the configuration.
    pub fn config(&self) -> &SmtpConfig {
        &self.config
    }

    /// Test the SMTP connection.
    pub async fn test_connection(&self) -> Result<bool> {
        self.transport
            .test_connection()
            .await
            .map_err(MailError::from)
    }
}

#[async_trait]
impl Provider for SmtpProvider {
    async fn dispatch(&self, message: &Message, _options: &MailOptions) -> Result<DeliveryReceipt> {
        let email = build_message(message)?;

        debug!(
            to = ?message.to(),
            subject = ?message.subject(),
            "Sending email via SMTP"
        );

        let response = self.transport.send(email).await?;

        debug!(code = %response.code(), "Email accepted by SMTP server");
        Ok(DeliveryReceipt::new(self.name()).response(serde_json::json!({
            "code": response.code().to_string(),
            "message": response.message().collect::<Vec<_>>(),
        })))
    }

    fn name(&self) -> &str {
        "smtp"
    }
}

enum Body {
    Single(SinglePart),
    Alternative(MultiPart),
}

fn mailbox(address: &str) -> Result<Mailbox> {
    Ok(address.parse::<Mailbox>()?)
}

/// Convert a prepared message into a lettre message.
pub(crate) fn build_message(message: &Message) -> Result<lettre::Message> {
    message.validate()?;

    let from = message.from().ok_or(MailError::Validation("from"))?;
    let mut builder = lettre::Message::builder()
        .from(mailbox(from)?)
        .subject(message.subject().unwrap_or_default());

    for address in message.to() {
        builder = builder.to(mailbox(address)?);
    }
    for address in message.cc() {
        builder = builder.cc(mailbox(address)?);
    }
    for address in message.bcc() {
        builder = builder.bcc(mailbox(address)?);
    }
    if let Some(reply_to) = message.reply_to() {
        builder = builder.reply_to(mailbox(reply_to)?);
    }

    let body = match (message.html_body(), message.plain_body()) {
        (Some(html), Some(text)) => Body::Alternative(MultiPart::alternative_plain_html(
            text.to_string(),
            html.to_string(),
        )),
        (Some(html), None) => Body::Single(SinglePart::html(html.to_string())),
        (None, Some(text)) => Body::Single(SinglePart::plain(text.to_string())),
        (None, None) => return Err(MailError::Validation("htmlBody/plainBody")),
    };

    if message.attachments().is_empty() {
        let email = match body {
            Body::Single(part) => builder.singlepart(part)?,
            Body::Alternative(parts) => builder.multipart(parts)?,
        };
        return Ok(email);
    }

    let mut mixed = match body {
        Body::Single(part) => MultiPart::mixed().singlepart(part),
        Body::Alternative(parts) => MultiPart::mixed().multipart(parts),
    };
    for attachment in message.attachments() {
        let content_type = ContentType::parse(&attachment.mime_type).map_err(|_| {
            MailError::InvalidInput(format!(
                "attachment {} has an invalid MIME type {:?}",
                attachment.filename, attachment.mime_type
            ))
        })?;
        mixed = mixed.singlepart(
            lettre::message::Attachment::new(attachment.filename.clone())
                .body(attachment.content.clone(), content_type),
        );
    }

    Ok(builder.multipart(mixed)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared() -> Message {
        let mut message = Message::new();
        message
            .set_to("Josh <josh@example.com>, other@example.com")
            .set_from("webmaster@example.com")
            .set_subject("Welcome")
            .set_html_body("<h1>Hi</h1>")
            .set_plain_body("Hi");
        message
    }

    #[test]
    fn test_smtp_config_builder() {
        let config = SmtpConfig::new("smtp.example.com")
            .starttls()
            .credentials("user", "pass");

        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.port, 587);
        assert_eq!(config.security, SmtpSecurity::StartTls);
        assert_eq!(config.username.as_deref(), Some("user"));

        let postmark = SmtpConfig::postmark("token");
        assert_eq!(postmark.host, "smtp.postmarkapp.com");
        assert_eq!(postmark.username.as_deref(), Some("token"));
    }

    #[test]
    fn test_build_message() {
        let email = build_message(&prepared()).unwrap();
        let raw = String::from_utf8(email.formatted()).unwrap();

        assert!(raw.contains("Subject: Welcome"));
        assert!(raw.contains("josh@example.com"));
        assert!(raw.contains("multipart/alternative"));
    }

    #[test]
    fn test_build_message_with_attachment() {
        let mut message = prepared();
        message.attach("report.csv", "text/csv", b"a,b".to_vec());

        let raw = String::from_utf8(build_message(&message).unwrap().formatted()).unwrap();
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("report.csv"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_smtp_error() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let provider = SmtpProvider::new(
            SmtpConfig::new("127.0.0.1")
                .insecure()
                .port(port)
                .timeout(Duration::from_secs(2)),
        )
        .await
        .unwrap();

        assert_eq!(provider.config().port, port);
        assert!(matches!(provider.test_connection().await, Err(MailError::Smtp(_))));
    }

    #[test]
    fn test_build_message_rejects_bad_mime_type() {
        let mut message = prepared();
        message.attach("report.bin", "not a mime type", vec![0, 1]);

        let err = build_message(&message).unwrap_err();
        assert!(matches!(err, MailError::InvalidInput(ref m) if m.contains("report.bin")));
    }

    #[test]
    fn test_build_message_rejects_bad_address() {
        let mut message = prepared();
        message.set_from("not an address");
        assert!(matches!(build_message(&message), Err(MailError::Provider(_))));
    }
}
