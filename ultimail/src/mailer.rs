//! High-level mailer interface.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::template::{compose_variables, load_template, resolve_template_path};
use crate::{
    AddressInput, Capability, DeliveryReceipt, HandlerRegistry, IntoText, MailError,
    MailOptions, Message, Middleware, Next, Provider, Result, StylingHandler, TemplateBundle,
    TemplatingHandler,
};

/// Pipeline stage, used in logs and to classify errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Idle,
    Loading,
    Composing,
    Rendering,
    Styling,
    Middleware,
    Dispatching,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Composing => "composing",
            Self::Rendering => "rendering",
            Self::Styling => "styling",
            Self::Middleware => "middleware",
            Self::Dispatching => "dispatching",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// How `send` applies call options to an already built message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverridePolicy {
    /// Only fields the caller set in this call override the message.
    #[default]
    ExplicitOnly,
    /// Mailer defaults merged with the call options override the message.
    Merged,
}

/// Mailer configuration.
///
/// Built once and shared read-only by every call; per-call options are merged
/// into a fresh value instead of mutating the defaults.
#[derive(Debug, Clone, Default)]
pub struct MailerConfig {
    /// Default options for every message.
    pub defaults: MailOptions,
    /// Override behaviour for pre-built messages.
    pub override_policy: OverridePolicy,
}

impl MailerConfig {
    /// Create a configuration with the given defaults.
    pub fn new(defaults: MailOptions) -> Self {
        Self {
            defaults,
            override_policy: OverridePolicy::default(),
        }
    }

    /// Set the override policy.
    pub fn override_policy(mut self, policy: OverridePolicy) -> Self {
        self.override_policy = policy;
        self
    }
}

/// Input to [`Mailer::send`]: a template directory or a prepared message.
#[derive(Debug, Clone)]
pub enum SendInput {
    Template(PathBuf),
    Message(Message),
}

impl From<Message> for SendInput {
    fn from(message: Message) -> Self {
        Self::Message(message)
    }
}

impl From<PathBuf> for SendInput {
    fn from(path: PathBuf) -> Self {
        Self::Template(path)
    }
}

impl From<&Path> for SendInput {
    fn from(path: &Path) -> Self {
        Self::Template(path.to_path_buf())
    }
}

impl From<&str> for SendInput {
    fn from(path: &str) -> Self {
        Self::Template(PathBuf::from(path))
    }
}

impl From<String> for SendInput {
    fn from(path: String) -> Self {
        Self::Template(PathBuf::from(path))
    }
}

/// Email composition pipeline.
///
/// ```rust,ignore
/// use ultimail::{Mailer, MailOptions, PostmarkConfig, PostmarkProvider};
///
/// let mut mailer = Mailer::new(
///     MailOptions::new()
///         .from("webmaster@example.com")
///         .variable("brandName", "Amazing Widgets"),
/// );
/// mailer.configure_provider(PostmarkProvider::new(PostmarkConfig::new("server-token")));
///
/// let receipt = mailer
///     .send("emails/welcome", Some(MailOptions::new().to("user@example.com")))
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct Mailer {
    config: Arc<MailerConfig>,
    handlers: HandlerRegistry,
}

impl Mailer {
    /// Create a mailer with default options and the built-in templating and
    /// styling handlers.
    pub fn new(defaults: MailOptions) -> Self {
        Self::with_config(MailerConfig::new(defaults))
    }

    /// Create a mailer from a full configuration.
    #[allow(unused_mut)]
    pub fn with_config(config: MailerConfig) -> Self {
        let mut handlers = HandlerRegistry::new();

        #[cfg(feature = "handlebars")]
        handlers.set_templating(Arc::new(crate::HandlebarsTemplating::new()));

        #[cfg(feature = "css-inline")]
        handlers.set_styling(Arc::new(crate::CssInlineStyling::new()));

        Self {
            config: Arc::new(config),
            handlers,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &MailerConfig {
        &self.config
    }

    /// Get the handler registration table.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Replace the templating handler.
    pub fn configure_templating(&mut self, handler: impl TemplatingHandler + 'static) -> &mut Self {
        self.handlers.set_templating(Arc::new(handler));
        self
    }

    /// Replace the styling handler.
    pub fn configure_styling(&mut self, handler: impl StylingHandler + 'static) -> &mut Self {
        self.handlers.set_styling(Arc::new(handler));
        self
    }

    /// Set the delivery provider.
    pub fn configure_provider(&mut self, provider: impl Provider + 'static) -> &mut Self {
        self.handlers.set_provider(Arc::new(provider));
        self
    }

    /// Put a handler into a caller-defined named slot.
    ///
    /// Fails with [`MailError::Config`] for the built-in `templating`,
    /// `styling` and `provider` slots.
    pub fn configure(&mut self, name: impl Into<String>, handler: impl Middleware + 'static) -> Result<&mut Self> {
        self.handlers.set_named(name, Arc::new(handler))?;
        Ok(self)
    }

    /// Append an anonymous middleware, run for every prepared message.
    pub fn use_middleware(&mut self, middleware: impl Middleware + 'static) -> &mut Self {
        self.handlers.push(Arc::new(middleware));
        self
    }

    /// Set the delivery provider, builder style.
    pub fn with_provider(mut self, provider: impl Provider + 'static) -> Self {
        self.configure_provider(provider);
        self
    }

    /// Check whether a named slot holds a handler.
    pub fn is_configured(&self, capability: impl Into<Capability>) -> bool {
        self.handlers.is_configured(&capability.into())
    }

    /// Run the handler in a caller-defined slot against a message.
    pub async fn run_handler(&self, name: &str, message: &mut Message, options: &MailOptions) -> Result<()> {
        let handler = self.handlers.named(name)?;
        handler.handle(message, options, Next::new(&[])).await
    }

    /// Prepare an email from a template directory without sending it.
    ///
    /// Pass the returned message to [`Mailer::send`] to deliver it later.
    pub async fn prepare(&self, template: impl AsRef<Path>, options: MailOptions) -> Result<Message> {
        let options = self.config.defaults.merge(&options);
        let mut message = Message::from_options(&options);

        self.prepare_message(&mut message, template.as_ref(), &options)
            .await
            .inspect_err(|e| warn!(stage = %e.stage(), error = %e, "Email preparation failed"))?;

        trace!(stage = %Stage::Done, "Email prepared");
        Ok(message)
    }

    /// Prepare and send an email.
    ///
    /// A template path runs the whole pipeline. A [`Message`] is assumed to be
    /// prepared already and goes straight to dispatch after `options` (if any)
    /// are applied to it according to the [`OverridePolicy`].
    pub async fn send(
        &self,
        input: impl Into<SendInput>,
        options: Option<MailOptions>,
    ) -> Result<DeliveryReceipt> {
        let merged = match &options {
            Some(call) => self.config.defaults.merge(call),
            None => self.config.defaults.clone(),
        };

        let message = match input.into() {
            SendInput::Template(template) => {
                let mut message = Message::from_options(&merged);
                self.prepare_message(&mut message, &template, &merged)
                    .await
                    .inspect_err(|e| warn!(stage = %e.stage(), error = %e, "Email preparation failed"))?;
                message
            }
            SendInput::Message(mut message) => {
                if let Some(call) = &options {
                    match self.config.override_policy {
                        OverridePolicy::ExplicitOnly => message.apply_options(call),
                        OverridePolicy::Merged => message.apply_options(&merged),
                    };
                }
                message
            }
        };

        self.dispatch(message, &merged).await
    }

    /// Send to the given addresses, overriding any `to` in the options.
    pub async fn send_to(
        &self,
        to: impl Into<AddressInput>,
        input: impl Into<SendInput>,
        options: Option<MailOptions>,
    ) -> Result<DeliveryReceipt> {
        let options = options.unwrap_or_default().to(to);
        self.send(input, Some(options)).await
    }

    /// Send the given bodies as-is.
    ///
    /// Skips loading, templating, styling and middleware; only the provider
    /// runs. Placeholders in the bodies are sent verbatim.
    pub async fn quick_send(
        &self,
        options: MailOptions,
        html_body: impl IntoText,
        plain_body: impl IntoText,
    ) -> Result<DeliveryReceipt> {
        let options = self.config.defaults.merge(&options);
        let mut message = Message::from_options(&options);

        if let Some(html) = html_body.into_text() {
            message.set_html_body(html);
        }
        if let Some(text) = plain_body.into_text() {
            message.set_plain_body(text);
        }

        self.dispatch(message, &options).await
    }

    /// Load, compose, render, style and run middleware on `message`.
    async fn prepare_message(&self, message: &mut Message, template: &Path, options: &MailOptions) -> Result<()> {
        let actual_path = resolve_template_path(Some(template))?.ok_or_else(|| {
            MailError::TemplateMissing("You must provide the path to a template directory".to_string())
        })?;
        let layout_path = resolve_template_path(options.layout_template.as_deref())?;

        debug!(
            stage = %Stage::Loading,
            template = %actual_path.display(),
            layout = ?layout_path,
            "Loading email templates"
        );
        let (actual, layout) = tokio::try_join!(
            load_template(Some(&actual_path)),
            load_template(layout_path.as_deref()),
        )?;
        let mut actual = actual.ok_or_else(|| MailError::NoBodyContent(actual_path.clone()))?;
        let mut layout = layout;

        trace!(stage = %Stage::Composing, "Composing template variables");
        resolve_subject(options, &mut actual, layout.as_mut());
        let extra = (!actual.subject.is_empty()).then(|| {
            let mut extra = serde_json::Map::new();
            extra.insert("subject".to_string(), actual.subject.clone().into());
            extra
        });
        let variables = compose_variables(options, extra)?;

        trace!(stage = %Stage::Rendering, "Rendering templates");
        self.handlers
            .templating()?
            .render(message, &actual, layout.as_ref(), &variables, options)
            .await?;

        if options.styles_enabled() && message.html_body().is_some() {
            trace!(stage = %Stage::Styling, "Inlining styles");
            let css = combined_css(&actual, layout.as_ref());
            self.handlers.styling()?.inline(message, &css, options).await?;
        }

        trace!(
            stage = %Stage::Middleware,
            count = self.handlers.middleware().len(),
            "Running middleware"
        );
        self.handlers.run_middleware(message, options).await
    }

    /// Validate and hand the message to the provider.
    async fn dispatch(&self, message: Message, options: &MailOptions) -> Result<DeliveryReceipt> {
        message.validate()?;
        let provider = self.handlers.provider()?;

        debug!(
            stage = %Stage::Dispatching,
            provider = provider.name(),
            recipients = message.to().len(),
            subject = ?message.subject(),
            "Dispatching email"
        );

        let receipt = provider
            .dispatch(&message, options)
            .await
            .inspect_err(|e| warn!(provider = provider.name(), error = %e, "Email dispatch failed"))?;

        debug!(stage = %Stage::Done, message_id = ?receipt.message_id, "Email dispatched");
        Ok(receipt)
    }
}

/// Make the actual and layout templates agree on a subject.
///
/// An explicit `options.subject` wins for both. Otherwise, with a layout, the
/// actual template's subject is shared with the layout, or the layout's is
/// borrowed when the actual template has none.
fn resolve_subject(options: &MailOptions, actual: &mut TemplateBundle, layout: Option<&mut TemplateBundle>) {
    if let Some(subject) = options.subject.as_deref().filter(|s| !s.is_empty()) {
        actual.subject = subject.to_string();
        if let Some(layout) = layout {
            layout.subject = subject.to_string();
        }
    } else if let Some(layout) = layout {
        if actual.subject.is_empty() {
            actual.subject = layout.subject.clone();
        } else {
            layout.subject = actual.subject.clone();
        }
    }
}

/// Layout CSS first so the actual template's rules win the cascade.
fn combined_css(actual: &TemplateBundle, layout: Option<&TemplateBundle>) -> String {
    let layout_css = layout.map(|l| l.css.as_str()).unwrap_or_default();
    format!("{}\n\n{}", layout_css, actual.css)
}

/// Await `future` and hand its result to `callback`.
///
/// Adapter for callers that prefer completion callbacks over awaiting the
/// returned future; success and failure reach the callback unchanged.
pub async fn complete<T, Fut, F>(future: Fut, callback: F)
where
    Fut: Future<Output = Result<T>>,
    F: FnOnce(Result<T>),
{
    callback(future.await);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryProvider;
    use async_trait::async_trait;
    use serde_json::Value;

    fn mailer() -> (Mailer, MemoryProvider) {
        let provider = MemoryProvider::new();
        let mailer = Mailer::new(MailOptions::new().from("webmaster@example.com"))
            .with_provider(provider.clone());
        (mailer, provider)
    }

    fn prepared() -> Message {
        let mut message = Message::new();
        message
            .set_to("user@example.com")
            .set_from("webmaster@example.com")
            .set_subject("Prepared")
            .set_plain_body("Body");
        message
    }

    struct Panicking;

    #[async_trait]
    impl TemplatingHandler for Panicking {
        async fn render(
            &self,
            _message: &mut Message,
            _actual: &TemplateBundle,
            _layout: Option<&TemplateBundle>,
            _variables: &Value,
            _options: &MailOptions,
        ) -> Result<()> {
            panic!("templating must not run");
        }
    }

    #[test]
    fn test_resolve_subject_option_wins() {
        let options = MailOptions::new().subject("X");
        let mut actual = TemplateBundle::new("a", "", "body", "Y", "");
        let mut layout = TemplateBundle::new("l", "", "{{content}}", "Z", "");

        resolve_subject(&options, &mut actual, Some(&mut layout));

        assert_eq!(actual.subject, "X");
        assert_eq!(layout.subject, "X");
    }

    #[test]
    fn test_resolve_subject_shares_between_bundles() {
        let options = MailOptions::new();

        let mut actual = TemplateBundle::new("a", "", "body", "Actual", "");
        let mut layout = TemplateBundle::new("l", "", "{{content}}", "Layout", "");
        resolve_subject(&options, &mut actual, Some(&mut layout));
        assert_eq!(layout.subject, "Actual");

        let mut actual = TemplateBundle::new("a", "", "body", "", "");
        let mut layout = TemplateBundle::new("l", "", "{{content}}", "Layout", "");
        resolve_subject(&options, &mut actual, Some(&mut layout));
        assert_eq!(actual.subject, "Layout");
    }

    #[test]
    fn test_combined_css_order() {
        let actual = TemplateBundle::new("a", "", "", "", "body{color:blue}");
        let layout = TemplateBundle::new("l", "", "", "", "body{color:red}");

        assert_eq!(
            combined_css(&actual, Some(&layout)),
            "body{color:red}\n\nbody{color:blue}"
        );
        assert_eq!(combined_css(&actual, None), "\n\nbody{color:blue}");
    }

    #[tokio::test]
    async fn test_quick_send_sends_bodies_verbatim() {
        let (mut mailer, provider) = mailer();
        mailer.configure_templating(Panicking);

        mailer
            .quick_send(
                MailOptions::new().to("a@b.com").from("c@d.com").subject("Hi"),
                "<p>Hi {{name}}</p>",
                "Hi {{name}}",
            )
            .await
            .unwrap();

        let sent = provider.sent();
        assert_eq!(sent[0].html_body(), Some("<p>Hi {{name}}</p>"));
        assert_eq!(sent[0].plain_body(), Some("Hi {{name}}"));
        assert_eq!(sent[0].from(), Some("c@d.com"));
    }

    #[tokio::test]
    async fn test_send_prepared_message_skips_pipeline() {
        let (mut mailer, provider) = mailer();
        mailer.configure_templating(Panicking);

        mailer
            .send(prepared(), Some(MailOptions::new().subject("Overridden")))
            .await
            .unwrap();

        let sent = provider.sent();
        assert_eq!(sent[0].subject(), Some("Overridden"));
        assert_eq!(sent[0].plain_body(), Some("Body"));
    }

    #[tokio::test]
    async fn test_override_policy() {
        let defaults = MailOptions::new().from("default@example.com");

        let provider = MemoryProvider::new();
        let explicit = Mailer::new(defaults.clone()).with_provider(provider.clone());
        explicit
            .send(prepared(), Some(MailOptions::new().cc("cc@example.com")))
            .await
            .unwrap();
        assert_eq!(provider.sent()[0].from(), Some("webmaster@example.com"));
        assert_eq!(provider.sent()[0].cc(), ["cc@example.com"]);

        let provider = MemoryProvider::new();
        let merged = Mailer::with_config(
            MailerConfig::new(defaults).override_policy(OverridePolicy::Merged),
        )
        .with_provider(provider.clone());
        merged
            .send(prepared(), Some(MailOptions::new()))
            .await
            .unwrap();
        assert_eq!(provider.sent()[0].from(), Some("default@example.com"));
    }

    #[tokio::test]
    async fn test_send_without_options_leaves_message() {
        let (mailer, provider) = mailer();
        let mut message = prepared();
        message.set_from("someone@example.com");

        mailer.send(message, None).await.unwrap();

        assert_eq!(provider.sent()[0].from(), Some("someone@example.com"));
    }

    #[tokio::test]
    async fn test_send_to_forces_recipients() {
        let (mailer, provider) = mailer();

        mailer
            .send_to("forced@example.com, second@example.com", prepared(), None)
            .await
            .unwrap();

        assert_eq!(
            provider.sent()[0].to(),
            ["forced@example.com", "second@example.com"]
        );
    }

    #[tokio::test]
    async fn test_dispatch_validation_errors() {
        let (mailer, provider) = mailer();

        let cases = [
            (MailOptions::new().subject("S"), Some("Hi"), "to"),
            (MailOptions::new().to("a@b.com"), Some("Hi"), "subject"),
            (MailOptions::new().to("a@b.com").subject("S"), None, "htmlBody/plainBody"),
        ];
        for (options, body, field) in cases {
            let err = mailer.quick_send(options, None::<&str>, body).await.unwrap_err();
            assert!(matches!(err, MailError::Validation(f) if f == field), "expected {field}");
        }

        let bare = Mailer::new(MailOptions::new()).with_provider(provider.clone());
        let err = bare
            .quick_send(MailOptions::new().to("a@b.com").subject("S"), "<p>x</p>", None::<&str>)
            .await
            .unwrap_err();
        assert!(matches!(err, MailError::Validation("from")));

        assert!(provider.is_empty());
    }

    #[tokio::test]
    async fn test_missing_provider() {
        let mailer = Mailer::new(MailOptions::new());
        let err = mailer.send(prepared(), None).await.unwrap_err();

        assert!(matches!(err, MailError::Config(_)));
        assert_eq!(err.stage(), Stage::Dispatching);
        assert!(!mailer.is_configured("provider"));
    }

    #[tokio::test]
    async fn test_prepare_requires_template_path() {
        let (mailer, _) = mailer();
        let err = mailer.prepare("", MailOptions::new()).await.unwrap_err();
        assert!(matches!(err, MailError::TemplateMissing(_)));
    }

    #[tokio::test]
    async fn test_complete_reports_both_outcomes() {
        let (mailer, _) = mailer();

        let mut delivered = None;
        complete(mailer.send(prepared(), None), |result| {
            delivered = Some(result.map(|r| r.provider));
        })
        .await;
        assert_eq!(delivered.unwrap().unwrap(), "memory");

        let mut failed = None;
        complete(mailer.send(Message::new(), None), |result| {
            failed = Some(result.is_err());
        })
        .await;
        assert_eq!(failed, Some(true));
    }

    #[cfg(feature = "handlebars")]
    #[test]
    fn test_defaults_registered() {
        let mailer = Mailer::new(MailOptions::new());
        assert!(mailer.is_configured(Capability::Templating));
        assert!(!mailer.is_configured(Capability::Provider));
    }
}
