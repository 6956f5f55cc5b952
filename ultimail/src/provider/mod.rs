//! Delivery providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::{MailOptions, Message, Provider, Result};

mod smtp;

#[cfg(feature = "postmark")]
mod postmark;

#[cfg(feature = "mandrill")]
mod mandrill;

pub use smtp::{SmtpConfig, SmtpProvider, SmtpSecurity};

#[cfg(feature = "postmark")]
pub use postmark::{PostmarkConfig, PostmarkProvider};

#[cfg(feature = "mandrill")]
pub use mandrill::{MandrillConfig, MandrillProvider};

/// Result of a successful dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Name of the provider that accepted the message.
    pub provider: String,
    /// Provider-assigned message ID, when the provider returns one.
    pub message_id: Option<String>,
    /// Raw provider response.
    pub response: Option<serde_json::Value>,
}

impl DeliveryReceipt {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Self::default()
        }
    }

    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn response(mut self, response: serde_json::Value) -> Self {
        self.response = Some(response);
        self
    }
}

/// Provider that keeps every dispatched message in memory.
///
/// Clones share the same outbox, so a clone kept by a test sees messages sent
/// through the mailer.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    outbox: Arc<Mutex<Vec<Message>>>,
}

impl MemoryProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far, oldest first.
    pub fn sent(&self) -> Vec<Message> {
        self.outbox
            .lock()
            .map(|outbox| outbox.clone())
            .unwrap_or_default()
    }

    /// Number of messages sent so far.
    pub fn len(&self) -> usize {
        self.outbox.lock().map(|outbox| outbox.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    async fn dispatch(&self, message: &Message, _options: &MailOptions) -> Result<DeliveryReceipt> {
        let id = {
            let mut outbox = self
                .outbox
                .lock()
                .map_err(|_| crate::MailError::Provider("outbox lock poisoned".to_string()))?;
            outbox.push(message.snapshot());
            outbox.len()
        };

        debug!(id, to = ?message.to(), "Stored email in memory outbox");
        Ok(DeliveryReceipt::new(self.name()).message_id(format!("memory-{}", id)))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
