use serde::{Deserialize, Serialize};

/// A message to be delivered through a [`DeliveryChannel`](crate::DeliveryChannel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Channel-native address of the recipient (an email address for SMTP).
    pub recipient: String,

    pub subject: String,

    /// Plain-text body.
    pub body: String,
}
