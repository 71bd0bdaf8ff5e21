//! SMTP email delivery (STARTTLS + login) built on `lettre`.

use std::time::Duration;

use agenda_core::{config::SmtpConfig, EMAIL_CHANNEL};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{self, authentication::Credentials},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, info, warn};

use crate::{channel::DeliveryChannel, error::ChannelError, types::OutboundMessage};

/// Sends reminders through an SMTP relay.
///
/// Settings are checked on every send rather than at construction so a
/// misconfigured server shows up as failed ledger entries instead of keeping
/// the process from starting.
pub struct EmailChannel {
    config: SmtpConfig,
}

impl EmailChannel {
    pub fn new(config: SmtpConfig) -> Self {
        if config.host.to_lowercase().contains("gmail") {
            info!("Gmail SMTP detected: use an app password and port 587 (STARTTLS)");
        }
        Self { config }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    fn validate(&self) -> Result<(), ChannelError> {
        let missing = self.config.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ChannelError::ConfigError(format!(
                "missing SMTP settings: {}",
                missing.join(", ")
            )))
        }
    }

    fn build_message(&self, msg: &OutboundMessage) -> Result<Message, ChannelError> {
        let from: Mailbox = self
            .config
            .from
            .parse()
            .map_err(|e| ChannelError::ConfigError(format!("invalid SMTP_FROM address: {e}")))?;
        let to: Mailbox = msg
            .recipient
            .parse()
            .map_err(|e| ChannelError::SendFailed(format!("invalid recipient address: {e}")))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(msg.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(msg.body.clone())
            .map_err(|e| ChannelError::SendFailed(format!("could not build message: {e}")))
    }

    fn build_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, ChannelError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?
            .port(self.config.port)
            .credentials(Credentials::new(
                self.config.user.clone(),
                self.config.password.clone(),
            ))
            .timeout(Some(self.timeout()))
            .build();
        Ok(transport)
    }
}

#[async_trait]
impl DeliveryChannel for EmailChannel {
    fn name(&self) -> &str {
        EMAIL_CHANNEL
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
        self.validate()?;
        let email = self.build_message(msg)?;
        let transport = self.build_transport()?;

        debug!(recipient = %msg.recipient, host = %self.config.host, "sending email");

        // The transport timeout covers each SMTP command; the outer one bounds
        // the whole exchange (connect, STARTTLS, auth, DATA).
        let timeout = self.timeout();
        match tokio::time::timeout(timeout, transport.send(email)).await {
            Ok(Ok(_response)) => {
                info!(recipient = %msg.recipient, subject = %msg.subject, "email sent");
                Ok(())
            }
            Ok(Err(e)) => {
                let err = classify_smtp_error(&e, timeout);
                warn!(recipient = %msg.recipient, error = %err, "email delivery failed");
                Err(err)
            }
            Err(_) => {
                let ms = millis(timeout);
                warn!(recipient = %msg.recipient, timeout_ms = ms, "email delivery timed out");
                Err(ChannelError::Timeout { ms })
            }
        }
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Map a transport error onto the channel taxonomy.
fn classify_smtp_error(e: &smtp::Error, timeout: Duration) -> ChannelError {
    if e.is_timeout() {
        return ChannelError::Timeout {
            ms: millis(timeout),
        };
    }
    // 530/534/535: authentication required / rejected
    let auth_rejected = e
        .status()
        .map(|code| matches!(code.to_string().as_str(), "530" | "534" | "535"))
        .unwrap_or(false);
    if auth_rejected {
        ChannelError::AuthFailed(e.to_string())
    } else if e.is_permanent() || e.is_transient() {
        ChannelError::SendFailed(e.to_string())
    } else {
        ChannelError::ConnectionFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> OutboundMessage {
        OutboundMessage {
            recipient: "ana@example.com".into(),
            subject: "Reminder: Dentist".into(),
            body: "body".into(),
        }
    }

    #[tokio::test]
    async fn missing_settings_fail_without_network() {
        let channel = EmailChannel::new(SmtpConfig {
            host: "smtp.example.com".into(),
            ..Default::default()
        });
        let err = channel.send(&message()).await.unwrap_err();
        match err {
            ChannelError::ConfigError(detail) => {
                assert!(detail.contains("SMTP_USER"));
                assert!(detail.contains("SMTP_PASSWORD"));
                assert!(detail.contains("SMTP_FROM"));
                assert!(!detail.contains("SMTP_HOST"));
            }
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn timeout_millis_saturate() {
        assert_eq!(millis(Duration::from_secs(20)), 20_000);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn builds_plain_text_message() {
        let channel = EmailChannel::new(SmtpConfig {
            host: "smtp.example.com".into(),
            user: "mailer".into(),
            password: "secret".into(),
            from: "Agenda <agenda@example.com>".into(),
            ..Default::default()
        });
        let email = channel.build_message(&message()).unwrap();
        let raw = String::from_utf8(email.formatted()).unwrap();
        assert!(raw.contains("Subject: Reminder: Dentist"));
        assert!(raw.contains("To: ana@example.com"));
    }

    #[test]
    fn bad_recipient_is_a_send_failure() {
        let channel = EmailChannel::new(SmtpConfig {
            host: "smtp.example.com".into(),
            user: "mailer".into(),
            password: "secret".into(),
            from: "agenda@example.com".into(),
            ..Default::default()
        });
        let mut msg = message();
        msg.recipient = "not an address".into();
        assert!(matches!(
            channel.build_message(&msg),
            Err(ChannelError::SendFailed(_))
        ));
    }
}
