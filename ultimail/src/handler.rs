// Handler capabilities and the middleware chain

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

use crate::{DeliveryReceipt, MailError, MailOptions, Message, Result, TemplateBundle};

/// Renders template bundles onto a message.
///
/// Implementations must render the actual template first and, when a layout
/// is given, render the layout with the actual output available as the
/// `content` variable.
#[async_trait]
pub trait TemplatingHandler: Send + Sync {
    async fn render(
        &self,
        message: &mut Message,
        actual: &TemplateBundle,
        layout: Option<&TemplateBundle>,
        variables: &Value,
        options: &MailOptions,
    ) -> Result<()>;
}

/// Inlines CSS into a message's HTML body.
#[async_trait]
pub trait StylingHandler: Send + Sync {
    async fn inline(&self, message: &mut Message, css: &str, options: &MailOptions) -> Result<()>;
}

/// Delivers a finished message.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Send the message, returning the provider's receipt.
    async fn dispatch(&self, message: &Message, options: &MailOptions) -> Result<DeliveryReceipt>;

    /// Short provider name used in logs and receipts.
    fn name(&self) -> &str {
        "provider"
    }
}

/// Middleware run for every prepared message.
///
/// A middleware continues the chain by calling [`Next::run`]; returning
/// without calling it stops the remaining middleware silently.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, message: &mut Message, options: &MailOptions, next: Next<'_>) -> Result<()>;
}

/// The rest of the middleware chain.
pub struct Next<'a> {
    remaining: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Middleware>]) -> Self {
        Self { remaining: chain }
    }

    /// Run the next middleware, or finish if none are left.
    pub async fn run(self, message: &mut Message, options: &MailOptions) -> Result<()> {
        match self.remaining.split_first() {
            Some((middleware, rest)) => {
                trace!(remaining = rest.len(), "Executing middleware");
                middleware.handle(message, options, Next::new(rest)).await
            }
            None => {
                trace!("Middleware chain complete");
                Ok(())
            }
        }
    }

    /// Number of middleware still to run.
    pub fn len(&self) -> usize {
        self.remaining.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// Named handler slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    Templating,
    Styling,
    Provider,
    /// Caller-defined slot holding a middleware-shaped handler.
    Custom(String),
}

impl Capability {
    pub fn name(&self) -> &str {
        match self {
            Self::Templating => "templating",
            Self::Styling => "styling",
            Self::Provider => "provider",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for Capability {
    fn from(name: &str) -> Self {
        match name {
            "templating" => Self::Templating,
            "styling" => Self::Styling,
            "provider" => Self::Provider,
            other => Self::Custom(other.to_string()),
        }
    }
}

/// Handler registration table.
///
/// Holds at most one handler per named slot plus the ordered anonymous
/// middleware list. Cloning is cheap; handlers are shared.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    templating: Option<Arc<dyn TemplatingHandler>>,
    styling: Option<Arc<dyn StylingHandler>>,
    provider: Option<Arc<dyn Provider>>,
    named: HashMap<String, Arc<dyn Middleware>>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_templating(&mut self, handler: Arc<dyn TemplatingHandler>) {
        self.templating = Some(handler);
    }

    pub fn set_styling(&mut self, handler: Arc<dyn StylingHandler>) {
        self.styling = Some(handler);
    }

    pub fn set_provider(&mut self, provider: Arc<dyn Provider>) {
        self.provider = Some(provider);
    }

    /// Occupy a caller-defined slot, replacing any previous handler.
    ///
    /// Built-in slot names are rejected; use the typed setters for those.
    pub fn set_named(&mut self, name: impl Into<String>, handler: Arc<dyn Middleware>) -> Result<()> {
        let name = name.into();
        custom_slot(&name)?;
        self.named.insert(name, handler);
        Ok(())
    }

    /// Append an anonymous middleware.
    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.middleware.push(middleware);
    }

    /// Empty a named slot.
    pub fn remove(&mut self, capability: &Capability) {
        match capability {
            Capability::Templating => self.templating = None,
            Capability::Styling => self.styling = None,
            Capability::Provider => self.provider = None,
            Capability::Custom(name) => {
                self.named.remove(name);
            }
        }
    }

    pub fn is_configured(&self, capability: &Capability) -> bool {
        match capability {
            Capability::Templating => self.templating.is_some(),
            Capability::Styling => self.styling.is_some(),
            Capability::Provider => self.provider.is_some(),
            Capability::Custom(name) => self.named.contains_key(name),
        }
    }

    pub fn templating(&self) -> Result<&Arc<dyn TemplatingHandler>> {
        self.templating
            .as_ref()
            .ok_or_else(|| missing(&Capability::Templating))
    }

    pub fn styling(&self) -> Result<&Arc<dyn StylingHandler>> {
        self.styling
            .as_ref()
            .ok_or_else(|| missing(&Capability::Styling))
    }

    pub fn provider(&self) -> Result<&Arc<dyn Provider>> {
        self.provider
            .as_ref()
            .ok_or_else(|| missing(&Capability::Provider))
    }

    pub fn named(&self, name: &str) -> Result<&Arc<dyn Middleware>> {
        custom_slot(name)?;
        self.named
            .get(name)
            .ok_or_else(|| missing(&Capability::Custom(name.to_string())))
    }

    /// The anonymous middleware in registration order.
    pub fn middleware(&self) -> &[Arc<dyn Middleware>] {
        &self.middleware
    }

    /// Run every anonymous middleware against the message.
    pub async fn run_middleware(&self, message: &mut Message, options: &MailOptions) -> Result<()> {
        Next::new(&self.middleware).run(message, options).await
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("templating", &self.templating.is_some())
            .field("styling", &self.styling.is_some())
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .field("named", &self.named.keys().collect::<Vec<_>>())
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

fn custom_slot(name: &str) -> Result<()> {
    match Capability::from(name) {
        Capability::Custom(_) => Ok(()),
        reserved => Err(MailError::Config(format!(
            "\"{}\" is a built-in handler slot and cannot hold middleware",
            reserved
        ))),
    }
}

fn missing(capability: &Capability) -> MailError {
    MailError::Config(format!(
        "You must configure a \"{}\" handler",
        capability
    ))
}
