pub mod channel;
pub mod email;
pub mod error;
pub mod log;
pub mod render;
pub mod types;

pub use channel::DeliveryChannel;
pub use email::EmailChannel;
pub use error::ChannelError;
pub use log::LogChannel;
pub use render::render_reminder;
pub use types::OutboundMessage;
