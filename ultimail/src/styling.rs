//! CSS inlining via `css-inline`.

use async_trait::async_trait;
use css_inline::CSSInliner;
use std::borrow::Cow;
use tracing::debug;

use crate::{MailOptions, Message, Result, StylingHandler};

/// Default styling handler.
///
/// The template stylesheet is applied as extra CSS together with any
/// `<style>` blocks already present in the HTML.
#[derive(Debug, Clone, Default)]
pub struct CssInlineStyling {
    keep_style_tags: bool,
}

impl CssInlineStyling {
    /// Create a new styling handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `<style>` blocks in the output after inlining them.
    pub fn keep_style_tags(mut self, keep: bool) -> Self {
        self.keep_style_tags = keep;
        self
    }
}

#[async_trait]
impl StylingHandler for CssInlineStyling {
    async fn inline(&self, message: &mut Message, css: &str, _options: &MailOptions) -> Result<()> {
        let Some(html) = message.html_body() else {
            return Ok(());
        };

        let has_css = !css.trim().is_empty();
        if !has_css && !html.to_ascii_lowercase().contains("<style") {
            return Ok(());
        }

        // remote <link> stylesheets are left in place for the mail client
        let inliner = CSSInliner::options()
            .keep_style_tags(self.keep_style_tags)
            .load_remote_stylesheets(false)
            .extra_css(has_css.then(|| Cow::Owned(css.to_string())))
            .build();

        let inlined = inliner.inline(html)?;

        debug!(css_bytes = css.len(), "Inlined CSS into HTML body");
        message.set_html_body(inlined);
        Ok(())
    }
}
