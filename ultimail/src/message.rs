//! Email message value object.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Attachment, IntoAddressList, MailError, MailOptions, Result};

/// Types that can be normalized into an optional text field.
///
/// Text is trimmed; empty or whitespace-only text becomes absent.
pub trait IntoText {
    /// Convert into a trimmed, non-empty string.
    fn into_text(self) -> Option<String>;
}

impl IntoText for &str {
    fn into_text(self) -> Option<String> {
        let trimmed = self.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

impl IntoText for String {
    fn into_text(self) -> Option<String> {
        self.as_str().into_text()
    }
}

impl IntoText for &String {
    fn into_text(self) -> Option<String> {
        self.as_str().into_text()
    }
}

impl<T: IntoText> IntoText for Option<T> {
    fn into_text(self) -> Option<String> {
        self.and_then(IntoText::into_text)
    }
}

/// An email in preparation.
///
/// Fields are private and normalized by their setters: address lists are
/// always lists of trimmed strings, text fields are never whitespace-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    to: Vec<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
    from: Option<String>,
    reply_to: Option<String>,
    subject: Option<String>,
    html_body: Option<String>,
    plain_body: Option<String>,
    attachments: Vec<Attachment>,
}

impl Message {
    /// Create a new empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a message from options, applying every recognized field.
    pub fn from_options(options: &MailOptions) -> Self {
        let mut message = Self::new();
        message.apply_options(options);
        message
    }

    pub fn set_to(&mut self, to: impl IntoAddressList) -> &mut Self {
        self.to = to.into_address_list();
        self
    }

    pub fn set_cc(&mut self, cc: impl IntoAddressList) -> &mut Self {
        self.cc = cc.into_address_list();
        self
    }

    pub fn set_bcc(&mut self, bcc: impl IntoAddressList) -> &mut Self {
        self.bcc = bcc.into_address_list();
        self
    }

    pub fn set_from(&mut self, from: impl IntoText) -> &mut Self {
        self.from = from.into_text();
        self
    }

    pub fn set_reply_to(&mut self, reply_to: impl IntoText) -> &mut Self {
        self.reply_to = reply_to.into_text();
        self
    }

    pub fn set_subject(&mut self, subject: impl IntoText) -> &mut Self {
        self.subject = subject.into_text();
        self
    }

    pub fn set_html_body(&mut self, html: impl IntoText) -> &mut Self {
        self.html_body = html.into_text();
        self
    }

    pub fn set_plain_body(&mut self, text: impl IntoText) -> &mut Self {
        self.plain_body = text.into_text();
        self
    }

    /// Append an attachment.
    pub fn attach(
        &mut self,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> &mut Self {
        self.attachments
            .push(Attachment::new(filename, mime_type, content));
        self
    }

    /// Replace all attachments.
    pub fn set_attachments(&mut self, attachments: impl IntoIterator<Item = Attachment>) -> &mut Self {
        self.attachments = attachments.into_iter().collect();
        self
    }

    /// Apply every field that is set in `options`. Unset fields are left as is.
    pub fn apply_options(&mut self, options: &MailOptions) -> &mut Self {
        if let Some(to) = &options.to {
            self.set_to(to);
        }
        if let Some(cc) = &options.cc {
            self.set_cc(cc);
        }
        if let Some(bcc) = &options.bcc {
            self.set_bcc(bcc);
        }
        if let Some(from) = &options.from {
            self.set_from(from);
        }
        if let Some(reply_to) = &options.reply_to {
            self.set_reply_to(reply_to);
        }
        if let Some(subject) = &options.subject {
            self.set_subject(subject);
        }
        if let Some(attachments) = &options.attachments {
            self.set_attachments(attachments.iter().cloned());
        }
        self
    }

    /// Set several fields at once from a JSON object.
    ///
    /// Keys without a matching field (`htmlBody`, `replyTo`, ...) are ignored.
    /// A JSON array has no field keys and is accepted as a no-op; any other
    /// value is rejected with [`MailError::InvalidInput`].
    pub fn set(&mut self, values: &Value) -> Result<&mut Self> {
        let fields = match values {
            Value::Object(fields) => fields,
            Value::Array(_) => return Ok(self),
            other => {
                return Err(MailError::InvalidInput(format!(
                    "You must provide a hash of values to set(), got {}",
                    json_kind(other)
                )));
            }
        };

        for (key, value) in fields {
            match key.as_str() {
                "to" => {
                    self.to = addresses_from_json(key, value)?;
                }
                "cc" => {
                    self.cc = addresses_from_json(key, value)?;
                }
                "bcc" => {
                    self.bcc = addresses_from_json(key, value)?;
                }
                "from" => {
                    self.set_from(value.as_str());
                }
                "replyTo" => {
                    self.set_reply_to(value.as_str());
                }
                "subject" => {
                    self.set_subject(value.as_str());
                }
                "htmlBody" => {
                    self.set_html_body(value.as_str());
                }
                "plainBody" => {
                    self.set_plain_body(value.as_str());
                }
                "attachments" => {
                    let attachments: Vec<Attachment> = if value.is_null() {
                        Vec::new()
                    } else {
                        serde_json::from_value(value.clone()).map_err(|e| {
                            MailError::InvalidInput(format!("attachments: {}", e))
                        })?
                    };
                    self.set_attachments(attachments);
                }
                _ => {}
            }
        }

        Ok(self)
    }

    /// Owned copy of one field as JSON, `None` for unknown keys.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self.to_value() {
            Value::Object(mut fields) => fields.remove(key),
            _ => None,
        }
    }

    /// Owned copy of the whole message as JSON.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Independent copy of the current state.
    pub fn snapshot(&self) -> Message {
        self.clone()
    }

    pub fn to(&self) -> &[String] {
        &self.to
    }

    pub fn cc(&self) -> &[String] {
        &self.cc
    }

    pub fn bcc(&self) -> &[String] {
        &self.bcc
    }

    pub fn from(&self) -> Option<&str> {
        self.from.as_deref()
    }

    pub fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn html_body(&self) -> Option<&str> {
        self.html_body.as_deref()
    }

    pub fn plain_body(&self) -> Option<&str> {
        self.plain_body.as_deref()
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Check that the message can be handed to a provider.
    pub fn validate(&self) -> Result<()> {
        if self.to.is_empty() {
            return Err(MailError::Validation("to"));
        }
        if self.subject.is_none() {
            return Err(MailError::Validation("subject"));
        }
        if self.from.is_none() {
            return Err(MailError::Validation("from"));
        }
        if self.html_body.is_none() && self.plain_body.is_none() {
            return Err(MailError::Validation("htmlBody/plainBody"));
        }
        Ok(())
    }
}

fn addresses_from_json(key: &str, value: &Value) -> Result<Vec<String>> {
    match value {
        Value::String(text) => Ok(text.into_address_list()),
        Value::Array(items) => {
            let mut addresses = Vec::with_capacity(items.len());
            for item in items {
                let address = item.as_str().ok_or_else(|| {
                    MailError::InvalidInput(format!(
                        "{} must contain only strings, got {}",
                        key,
                        json_kind(item)
                    ))
                })?;
                addresses.push(address);
            }
            Ok(addresses.into_address_list())
        }
        _ => Ok(Vec::new()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sendable() -> Message {
        let mut message = Message::new();
        message
            .set_to("recipient@example.com")
            .set_from("sender@example.com")
            .set_subject("Test")
            .set_plain_body("Hello, world!");
        message
    }

    #[test]
    fn test_setters_normalize() {
        let mut message = Message::new();
        message
            .set_to(" a@example.com, b@example.com ")
            .set_cc(vec!["c@example.com "])
            .set_bcc(None::<String>)
            .set_subject("  Hi  ")
            .set_reply_to("   ");

        assert_eq!(message.to(), ["a@example.com", "b@example.com"]);
        assert_eq!(message.cc(), ["c@example.com"]);
        assert!(message.bcc().is_empty());
        assert_eq!(message.subject(), Some("Hi"));
        assert_eq!(message.reply_to(), None);
    }

    #[test]
    fn test_set_ignores_unknown_keys() {
        let mut message = sendable();
        message.set(&json!({ "unknownKey": 1 })).unwrap();
        assert_eq!(message, sendable());
    }

    #[test]
    fn test_set_rejects_non_objects() {
        let mut message = Message::new();
        let err = message.set(&json!("not-an-object")).unwrap_err();
        assert!(matches!(err, MailError::InvalidInput(_)));
        assert!(message.set(&json!(42)).is_err());
        assert!(message.set(&json!(["to"])).is_ok());
    }

    #[test]
    fn test_set_applies_known_keys() {
        let mut message = Message::new();
        message
            .set(&json!({
                "to": ["a@example.com", " b@example.com"],
                "from": "sender@example.com",
                "replyTo": 7,
                "htmlBody": "<p>Hi</p>",
                "attachments": [
                    { "filename": "a.txt", "mimeType": "text/plain", "content": [104, 105] }
                ]
            }))
            .unwrap();

        assert_eq!(message.to(), ["a@example.com", "b@example.com"]);
        assert_eq!(message.from(), Some("sender@example.com"));
        assert_eq!(message.reply_to(), None);
        assert_eq!(message.html_body(), Some("<p>Hi</p>"));
        assert_eq!(message.attachments()[0].content, b"hi");
    }

    #[test]
    fn test_get_returns_copies() {
        let message = sendable();

        let mut to = message.get("to").unwrap();
        to.as_array_mut().unwrap().clear();

        assert_eq!(message.to(), ["recipient@example.com"]);
        assert_eq!(message.get("plainBody"), Some(json!("Hello, world!")));
        assert_eq!(message.get("htmlBody"), Some(Value::Null));
        assert_eq!(message.get("nope"), None);
    }

    #[test]
    fn test_attachments_append_and_replace() {
        let mut message = Message::new();
        message
            .attach("a.txt", "text/plain", b"a".to_vec())
            .attach("b.txt", "text/plain", b"b".to_vec());
        assert_eq!(message.attachments().len(), 2);

        message.set_attachments(vec![Attachment::from_bytes("c.pdf", vec![0])]);
        assert_eq!(message.attachments().len(), 1);
        assert_eq!(message.attachments()[0].filename, "c.pdf");
    }

    #[test]
    fn test_validate_names_missing_field() {
        assert!(sendable().validate().is_ok());

        let mut message = sendable();
        message.set_to(Vec::<String>::new());
        assert!(matches!(message.validate(), Err(MailError::Validation("to"))));

        let mut message = sendable();
        message.set_subject("");
        assert!(matches!(message.validate(), Err(MailError::Validation("subject"))));

        let mut message = sendable();
        message.set_from(None::<&str>);
        assert!(matches!(message.validate(), Err(MailError::Validation("from"))));

        let mut message = sendable();
        message.set_plain_body("");
        assert!(matches!(
            message.validate(),
            Err(MailError::Validation("htmlBody/plainBody"))
        ));
    }
}
