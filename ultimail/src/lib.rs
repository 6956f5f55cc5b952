//! # Ultimail
//!
//! Compose emails from template directories and hand them to a delivery provider.
//!
//! ## Features
//!
//! - **Template Directories**: `body.html`, `body.txt`, `subject.txt` and `styles.css` per email
//! - **Layouts**: Wrap any email in a shared layout through the `content` variable
//! - **CSS Inlining**: Stylesheets are inlined into the HTML body before sending
//! - **Middleware**: Inspect or rewrite prepared messages before dispatch
//! - **Providers**: SMTP, Postmark and Mandrill integrations, plus an in-memory outbox
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ultimail::{MailOptions, Mailer, SmtpConfig, SmtpProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = SmtpProvider::new(
//!         SmtpConfig::new("smtp.example.com").credentials("user@example.com", "password"),
//!     )
//!     .await?;
//!
//!     let mailer = Mailer::new(
//!         MailOptions::new()
//!             .from("webmaster@example.com")
//!             .layout_template("emails/layout"),
//!     )
//!     .with_provider(provider);
//!
//!     mailer
//!         .send(
//!             "emails/welcome",
//!             Some(MailOptions::new().to("josh@example.com").variable("name", "Josh")),
//!         )
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Prepare Now, Send Later
//!
//! ```rust,ignore
//! let message = mailer
//!     .prepare("emails/receipt", MailOptions::new().to("josh@example.com"))
//!     .await?;
//!
//! // Already rendered and styled; only dispatch runs here.
//! mailer.send(message, None).await?;
//! ```

mod attachment;
mod error;
mod handler;
mod mailer;
mod message;
mod options;
mod provider;
mod template;

#[cfg(feature = "handlebars")]
mod templating;

#[cfg(feature = "css-inline")]
mod styling;

pub use attachment::Attachment;
pub use error::{MailError, Result};
pub use handler::{
    Capability, HandlerRegistry, Middleware, Next, Provider, StylingHandler, TemplatingHandler,
};
pub use mailer::{Mailer, MailerConfig, OverridePolicy, SendInput, Stage, complete};
pub use message::{IntoText, Message};
pub use options::{AddressInput, IntoAddressList, MailOptions};
pub use provider::{DeliveryReceipt, MemoryProvider, SmtpConfig, SmtpProvider, SmtpSecurity};
pub use template::{
    HTML_BODY_FILE, PLAIN_BODY_FILE, STYLES_FILE, SUBJECT_FILE, TemplateBundle,
    compose_variables, load_template, resolve_template_path,
};

#[cfg(feature = "handlebars")]
pub use templating::{CONTENT_VARIABLE, HandlebarsTemplating};

#[cfg(feature = "css-inline")]
pub use styling::CssInlineStyling;

#[cfg(feature = "postmark")]
pub use provider::{PostmarkConfig, PostmarkProvider};

#[cfg(feature = "mandrill")]
pub use provider::{MandrillConfig, MandrillProvider};

/// Prelude for common imports.
///
/// ```
/// use ultimail::prelude::*;
/// ```
pub mod prelude {
    pub use crate::attachment::Attachment;
    pub use crate::error::{MailError, Result};
    pub use crate::handler::{Middleware, Next, Provider, StylingHandler, TemplatingHandler};
    pub use crate::mailer::{Mailer, MailerConfig, OverridePolicy, complete};
    pub use crate::message::Message;
    pub use crate::options::MailOptions;
    pub use crate::provider::{DeliveryReceipt, MemoryProvider, SmtpConfig, SmtpProvider};

    #[cfg(feature = "handlebars")]
    pub use crate::HandlebarsTemplating;

    #[cfg(feature = "css-inline")]
    pub use crate::CssInlineStyling;

    #[cfg(feature = "postmark")]
    pub use crate::provider::{PostmarkConfig, PostmarkProvider};

    #[cfg(feature = "mandrill")]
    pub use crate::provider::{MandrillConfig, MandrillProvider};
}
