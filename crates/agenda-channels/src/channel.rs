use async_trait::async_trait;

use crate::{error::ChannelError, types::OutboundMessage};

/// Common interface implemented by every delivery adapter (SMTP email, log-only, …).
///
/// Implementations must be `Send + Sync` so the scheduler task can hold one
/// behind an `Arc` for its whole lifetime.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Stable lowercase tag for this channel (e.g. `"email"`).
    ///
    /// The tag is stored in the notification ledger as part of the dedup key.
    fn name(&self) -> &str;

    /// Deliver a single message to its recipient.
    ///
    /// Implementations apply their own transport-level timeout; a call that
    /// returns `Err` has not delivered the message.
    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError>;
}
