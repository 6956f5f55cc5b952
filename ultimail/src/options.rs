//! Mailer and per-call options.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::{Attachment, Result};

/// Address field input: a comma-delimited string or a list of addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AddressInput {
    /// Already split list.
    List(Vec<String>),
    /// Comma-delimited string, e.g. `"a@example.com, b@example.com"`.
    Text(String),
}

impl AddressInput {
    /// Split, trim and drop empty entries.
    pub fn normalize(&self) -> Vec<String> {
        match self {
            Self::List(items) => normalize_all(items.iter().map(String::as_str)),
            Self::Text(text) => normalize_all(text.split(',')),
        }
    }
}

impl Default for AddressInput {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

fn normalize_all<'a>(items: impl Iterator<Item = &'a str>) -> Vec<String> {
    items
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Types that can be normalized into an address list.
///
/// Mirrors the way single addresses are accepted elsewhere: strings are
/// split on commas, sequences are taken entry by entry, absent input yields an
/// empty list.
pub trait IntoAddressList {
    /// Convert into a trimmed list of addresses.
    fn into_address_list(self) -> Vec<String>;
}

impl IntoAddressList for AddressInput {
    fn into_address_list(self) -> Vec<String> {
        self.normalize()
    }
}

impl IntoAddressList for &AddressInput {
    fn into_address_list(self) -> Vec<String> {
        self.normalize()
    }
}

impl<T: IntoAddressList> IntoAddressList for Option<T> {
    fn into_address_list(self) -> Vec<String> {
        self.map(IntoAddressList::into_address_list)
            .unwrap_or_default()
    }
}

impl IntoAddressList for &str {
    fn into_address_list(self) -> Vec<String> {
        normalize_all(self.split(','))
    }
}

impl IntoAddressList for String {
    fn into_address_list(self) -> Vec<String> {
        self.as_str().into_address_list()
    }
}

impl IntoAddressList for &String {
    fn into_address_list(self) -> Vec<String> {
        self.as_str().into_address_list()
    }
}

impl IntoAddressList for Vec<String> {
    fn into_address_list(self) -> Vec<String> {
        normalize_all(self.iter().map(String::as_str))
    }
}

impl IntoAddressList for Vec<&str> {
    fn into_address_list(self) -> Vec<String> {
        normalize_all(self.into_iter())
    }
}

impl IntoAddressList for &[&str] {
    fn into_address_list(self) -> Vec<String> {
        normalize_all(self.iter().copied())
    }
}

impl IntoAddressList for &[String] {
    fn into_address_list(self) -> Vec<String> {
        normalize_all(self.iter().map(String::as_str))
    }
}

impl<const N: usize> IntoAddressList for [&str; N] {
    fn into_address_list(self) -> Vec<String> {
        normalize_all(self.into_iter())
    }
}

impl From<&str> for AddressInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AddressInput {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for AddressInput {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<Vec<&str>> for AddressInput {
    fn from(value: Vec<&str>) -> Self {
        Self::List(value.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for AddressInput {
    fn from(value: [&str; N]) -> Self {
        Self::List(value.into_iter().map(str::to_string).collect())
    }
}

/// Recognized mailer-level and per-call options.
///
/// Every field is optional: `None` means "not supplied", so a per-call value
/// only overrides a mailer default when it is actually set. Field names
/// serialize in camelCase so templates see `replyTo`, `layoutTemplate` etc.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MailOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<AddressInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cc: Option<AddressInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bcc: Option<AddressInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
    /// Template variables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Map<String, Value>>,
    /// Directory of the layout template wrapping every body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout_template: Option<PathBuf>,
    /// Inline CSS into the HTML body (defaults to `true`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub styles: Option<bool>,
}

impl MailOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the to recipients.
    pub fn to(mut self, to: impl Into<AddressInput>) -> Self {
        self.to = Some(to.into());
        self
    }

    /// Set the CC recipients.
    pub fn cc(mut self, cc: impl Into<AddressInput>) -> Self {
        self.cc = Some(cc.into());
        self
    }

    /// Set the BCC recipients.
    pub fn bcc(mut self, bcc: impl Into<AddressInput>) -> Self {
        self.bcc = Some(bcc.into());
        self
    }

    /// Set the from address.
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Set the reply-to address.
    pub fn reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Set the subject, overriding any `subject.txt` in the template.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Add an attachment.
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.get_or_insert_with(Vec::new).push(attachment);
        self
    }

    /// Set a single template variable.
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables
            .get_or_insert_with(Map::new)
            .insert(name.into(), value.into());
        self
    }

    /// Replace all template variables.
    pub fn variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Set the layout template directory.
    pub fn layout_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.layout_template = Some(path.into());
        self
    }

    /// Enable or disable CSS inlining.
    pub fn styles(mut self, enabled: bool) -> Self {
        self.styles = Some(enabled);
        self
    }

    /// Whether CSS inlining is enabled.
    pub fn styles_enabled(&self) -> bool {
        self.styles.unwrap_or(true)
    }

    /// Layer `overrides` on top of `self`, producing a new value.
    ///
    /// Fields set in `overrides` win. Variables are merged one level deep so
    /// mailer-wide variables stay visible next to per-call ones.
    pub fn merge(&self, overrides: &MailOptions) -> MailOptions {
        let variables = match (&self.variables, &overrides.variables) {
            (Some(base), Some(extra)) => {
                let mut merged = base.clone();
                merged.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
                Some(merged)
            }
            (base, extra) => extra.clone().or_else(|| base.clone()),
        };

        MailOptions {
            to: overrides.to.clone().or_else(|| self.to.clone()),
            cc: overrides.cc.clone().or_else(|| self.cc.clone()),
            bcc: overrides.bcc.clone().or_else(|| self.bcc.clone()),
            from: overrides.from.clone().or_else(|| self.from.clone()),
            reply_to: overrides.reply_to.clone().or_else(|| self.reply_to.clone()),
            subject: overrides.subject.clone().or_else(|| self.subject.clone()),
            attachments: overrides
                .attachments
                .clone()
                .or_else(|| self.attachments.clone()),
            variables,
            layout_template: overrides
                .layout_template
                .clone()
                .or_else(|| self.layout_template.clone()),
            styles: overrides.styles.or(self.styles),
        }
    }

    /// Whether no option is set at all.
    pub fn is_empty(&self) -> bool {
        *self == MailOptions::default()
    }

    /// The options as a flat JSON object, the lowest layer of the template
    /// variable namespace.
    pub fn to_variables(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_address_normalization() {
        assert_eq!(
            " a@example.com ,b@example.com".into_address_list(),
            vec!["a@example.com", "b@example.com"]
        );
        assert_eq!(
            vec![" a@example.com", "b@example.com "].into_address_list(),
            vec!["a@example.com", "b@example.com"]
        );
        assert!("".into_address_list().is_empty());
        assert!(None::<AddressInput>.into_address_list().is_empty());
        assert!(AddressInput::default().normalize().is_empty());
    }

    #[test]
    fn test_merge_overrides_win() {
        let defaults = MailOptions::new()
            .from("webmaster@example.com")
            .subject("Default")
            .variable("brandName", "Widgets")
            .styles(true);
        let call = MailOptions::new()
            .to("user@example.com")
            .subject("Hello")
            .variable("firstName", "Josh")
            .styles(false);

        let merged = defaults.merge(&call);

        assert_eq!(merged.from.as_deref(), Some("webmaster@example.com"));
        assert_eq!(merged.subject.as_deref(), Some("Hello"));
        assert_eq!(merged.to, Some(AddressInput::from("user@example.com")));
        assert!(!merged.styles_enabled());

        let vars = merged.variables.unwrap();
        assert_eq!(vars["brandName"], json!("Widgets"));
        assert_eq!(vars["firstName"], json!("Josh"));

        // merging never mutates the defaults
        assert_eq!(defaults.subject.as_deref(), Some("Default"));
    }

    #[test]
    fn test_styles_default_on() {
        assert!(MailOptions::new().styles_enabled());
    }

    #[test]
    fn test_from_json() {
        let options = MailOptions::from_json(
            r#"{
                "from": "webmaster@example.com",
                "cc": ["a@example.com", "b@example.com"],
                "replyTo": "help@example.com",
                "layoutTemplate": "templates/layout",
                "styles": false,
                "variables": { "website": "https://example.com" }
            }"#,
        )
        .unwrap();

        assert_eq!(options.reply_to.as_deref(), Some("help@example.com"));
        assert_eq!(
            options.cc.unwrap().normalize(),
            vec!["a@example.com", "b@example.com"]
        );
        assert_eq!(options.layout_template, Some(PathBuf::from("templates/layout")));
        assert_eq!(options.styles, Some(false));
    }

    #[test]
    fn test_to_variables_uses_camel_case() {
        let vars = MailOptions::new()
            .reply_to("help@example.com")
            .to_variables()
            .unwrap();

        assert_eq!(vars["replyTo"], json!("help@example.com"));
        assert!(!vars.contains_key("subject"));
    }
}
