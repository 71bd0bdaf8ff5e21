//! Log-only delivery for development setups without an SMTP server.

use async_trait::async_trait;
use tracing::info;

use crate::{channel::DeliveryChannel, error::ChannelError, types::OutboundMessage};

/// Writes every message to the log instead of sending it. Never fails.
pub struct LogChannel {
    name: String,
}

impl LogChannel {
    /// `name` is the ledger tag to report, usually the channel being stood in for.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl DeliveryChannel for LogChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
        info!(
            channel = %self.name,
            recipient = %msg.recipient,
            subject = %msg.subject,
            "dry-run delivery (message not sent)"
        );
        Ok(())
    }
}
