//! Handlebars templating handler.

use async_trait::async_trait;
use handlebars::{Handlebars, no_escape};
use serde_json::Value;
use tracing::debug;

use crate::template::{HTML_BODY_FILE, PLAIN_BODY_FILE, SUBJECT_FILE};
use crate::{MailError, MailOptions, Message, Result, TemplateBundle, TemplatingHandler};

/// Variable the rendered body is exposed as when rendering a layout.
pub const CONTENT_VARIABLE: &str = "content";

/// Default templating handler backed by Handlebars.
///
/// HTML templates are HTML-escaped, text and subject templates are not. Use
/// `{{{content}}}` in an HTML layout to insert the rendered body unescaped.
pub struct HandlebarsTemplating {
    html: Handlebars<'static>,
    text: Handlebars<'static>,
}

impl HandlebarsTemplating {
    /// Create a new Handlebars handler.
    pub fn new() -> Self {
        let html = Handlebars::new();
        let mut text = Handlebars::new();
        text.register_escape_fn(no_escape);
        Self { html, text }
    }

    /// Fail on missing variables instead of rendering them empty.
    pub fn strict(mut self) -> Self {
        self.html.set_strict_mode(true);
        self.text.set_strict_mode(true);
        self
    }

    /// Register a helper for both HTML and text templates.
    pub fn register_helper<H>(mut self, name: &str, helper: H) -> Self
    where
        H: handlebars::HelperDef + Clone + Send + Sync + 'static,
    {
        self.html.register_helper(name, Box::new(helper.clone()));
        self.text.register_helper(name, Box::new(helper));
        self
    }

    /// Register a partial template for both HTML and text templates.
    pub fn register_partial(mut self, name: &str, content: &str) -> Result<Self> {
        self.html
            .register_partial(name, content)
            .map_err(|e| MailError::render(name, e))?;
        self.text
            .register_partial(name, content)
            .map_err(|e| MailError::render(name, e))?;
        Ok(self)
    }
}

impl Default for HandlebarsTemplating {
    fn default() -> Self {
        Self::new()
    }
}

fn render(engine: &Handlebars<'static>, identity: &str, source: &str, variables: &Value) -> Result<String> {
    engine
        .render_template(source, variables)
        .map_err(|e| MailError::render(identity, e))
}

/// Render one body slot of the actual template, then wrap it in the same slot
/// of the layout when the layout has one.
fn render_body(
    engine: &Handlebars<'static>,
    file: &str,
    actual: (&TemplateBundle, &str),
    layout: Option<(&TemplateBundle, &str)>,
    variables: &Value,
) -> Result<Option<String>> {
    let (bundle, source) = actual;
    if source.is_empty() {
        return Ok(None);
    }

    let content = render(engine, &bundle.identity(file), source, variables)?;

    let Some((layout, layout_source)) = layout.filter(|(_, s)| !s.is_empty()) else {
        return Ok(Some(content));
    };

    let mut wrapped = variables.clone();
    if let Value::Object(map) = &mut wrapped {
        map.insert(CONTENT_VARIABLE.to_string(), Value::String(content));
    }

    render(engine, &layout.identity(file), layout_source, &wrapped).map(Some)
}

#[async_trait]
impl TemplatingHandler for HandlebarsTemplating {
    async fn render(
        &self,
        message: &mut Message,
        actual: &TemplateBundle,
        layout: Option<&TemplateBundle>,
        variables: &Value,
        _options: &MailOptions,
    ) -> Result<()> {
        if !actual.subject.is_empty() {
            let subject = render(&self.text, &actual.identity(SUBJECT_FILE), &actual.subject, variables)?;
            message.set_subject(subject);
        }

        let html = render_body(
            &self.html,
            HTML_BODY_FILE,
            (actual, &actual.html_body),
            layout.map(|l| (l, l.html_body.as_str())),
            variables,
        )?;
        if html.is_some() {
            message.set_html_body(html);
        }

        let text = render_body(
            &self.text,
            PLAIN_BODY_FILE,
            (actual, &actual.plain_body),
            layout.map(|l| (l, l.plain_body.as_str())),
            variables,
        )?;
        if text.is_some() {
            message.set_plain_body(text);
        }

        debug!(
            template = %actual.path.display(),
            layout = ?layout.map(|l| l.path.display().to_string()),
            "Rendered email template"
        );

        Ok(())
    }
}
