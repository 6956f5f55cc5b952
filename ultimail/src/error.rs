//! Mail error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::Stage;

/// Result type for mail operations.
pub type Result<T> = std::result::Result<T, MailError>;

/// Mail errors.
#[derive(Debug, Error)]
pub enum MailError {
    /// A setter or bulk `set` was given a value of the wrong shape.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A template file could not be read.
    #[error("Failed to load template {}: {source}", .path.display())]
    TemplateLoad {
        /// File or directory being loaded.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// No template directory was given where one is required.
    #[error("Template error: {0}")]
    TemplateMissing(String),

    /// Neither `body.html` nor `body.txt` exists in a template directory.
    #[error("Can't find either \"body.html\" or \"body.txt\". At least one must exist in \"{}\"", .0.display())]
    NoBodyContent(PathBuf),

    /// The template engine failed to compile or render a template.
    #[error("Failed to render template {template}: {message}")]
    TemplateRender {
        /// Identity of the offending template (e.g. `welcome/body.html`).
        template: String,
        /// Engine error message.
        message: String,
    },

    /// CSS inlining failed.
    #[error("Styling error: {0}")]
    Styling(String),

    /// A required handler is not configured.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The message is not eligible for sending.
    #[error("Missing required field: {0}")]
    Validation(&'static str),

    /// Provider API error.
    #[error("Provider error: {0}")]
    Provider(String),

    /// SMTP error.
    #[error("SMTP error: {0}")]
    Smtp(String),

    /// Network error.
    #[error("Network error: {0}")]
    Network(String),

    /// Rate limited by the provider.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl MailError {
    /// The pipeline stage this error aborts.
    pub fn stage(&self) -> Stage {
        match self {
            Self::InvalidInput(_) => Stage::Idle,
            Self::TemplateLoad { .. }
            | Self::TemplateMissing(_)
            | Self::NoBodyContent(_)
            | Self::Io(_) => Stage::Loading,
            Self::Serialization(_) => Stage::Composing,
            Self::TemplateRender { .. } => Stage::Rendering,
            Self::Styling(_) => Stage::Styling,
            Self::Config(_)
            | Self::Validation(_)
            | Self::Provider(_)
            | Self::Smtp(_)
            | Self::Network(_)
            | Self::RateLimited(_) => Stage::Dispatching,
        }
    }

    /// Whether this error came out of the delivery transport.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::Smtp(_) | Self::Network(_) | Self::RateLimited(_)
        )
    }

    pub(crate) fn load(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::TemplateLoad {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn render(template: impl Into<String>, message: impl ToString) -> Self {
        Self::TemplateRender {
            template: template.into(),
            message: message.to_string(),
        }
    }
}

impl From<lettre::transport::smtp::Error> for MailError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        Self::Smtp(err.to_string())
    }
}

impl From<lettre::address::AddressError> for MailError {
    fn from(err: lettre::address::AddressError) -> Self {
        Self::Provider(format!("invalid address: {}", err))
    }
}

impl From<lettre::error::Error> for MailError {
    fn from(err: lettre::error::Error) -> Self {
        Self::Smtp(err.to_string())
    }
}

impl From<serde_json::Error> for MailError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(feature = "css-inline")]
impl From<css_inline::InlineError> for MailError {
    fn from(err: css_inline::InlineError) -> Self {
        Self::Styling(err.to_string())
    }
}
