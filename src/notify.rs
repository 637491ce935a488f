// =============================================================================
// Notification delivery — SMTP sink behind a trait boundary
// =============================================================================
//
// The sink never raises past its boundary: every failure mode (no recipient,
// SMTP not configured, transport error) comes back as a `Delivery` with
// `delivered: false` and a reason, so the worker can log it and move on to
// the next rule.
// =============================================================================

use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{debug, warn};

use crate::config::SmtpConfig;
use crate::error::NotificationError;

/// Outcome of one delivery attempt.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub delivered: bool,
    pub detail: String,
}

impl Delivery {
    fn sent() -> Self {
        Self {
            delivered: true,
            detail: "sent".to_string(),
        }
    }

    fn failed(reason: impl std::fmt::Display) -> Self {
        Self {
            delivered: false,
            detail: reason.to_string(),
        }
    }
}

/// Sink for alert notifications. `destination` overrides the configured
/// default recipient when present.
pub trait NotificationSink: Send + Sync {
    fn send(&self, subject: &str, body: &str, destination: Option<&str>) -> Delivery;
}

/// SMTP-backed sink.
pub struct EmailNotifier {
    smtp: SmtpConfig,
}

impl EmailNotifier {
    pub fn new(smtp: SmtpConfig) -> Self {
        Self { smtp }
    }

    fn deliver(&self, subject: &str, body: &str, to: &str) -> Result<(), NotificationError> {
        let from: Mailbox = self
            .smtp
            .from
            .parse()
            .map_err(|e| NotificationError::Transport(format!("bad sender address: {e}")))?;
        let to: Mailbox = to
            .parse()
            .map_err(|e| NotificationError::Transport(format!("bad recipient address: {e}")))?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| NotificationError::Transport(format!("building message: {e}")))?;

        let mut builder = if self.smtp.starttls {
            SmtpTransport::starttls_relay(&self.smtp.host)
                .map_err(|e| NotificationError::Transport(format!("starttls setup: {e}")))?
        } else {
            SmtpTransport::builder_dangerous(&self.smtp.host)
        };
        builder = builder.port(self.smtp.port);
        if !self.smtp.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                self.smtp.username.clone(),
                self.smtp.password.clone(),
            ));
        }

        builder
            .build()
            .send(&message)
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        Ok(())
    }
}

impl NotificationSink for EmailNotifier {
    fn send(&self, subject: &str, body: &str, destination: Option<&str>) -> Delivery {
        let Some(to) = destination
            .map(str::to_string)
            .or_else(|| self.smtp.default_to.clone())
        else {
            return Delivery::failed(NotificationError::NoRecipient);
        };

        if !self.smtp.enabled() {
            return Delivery::failed(NotificationError::NotEnabled);
        }

        match self.deliver(subject, body, &to) {
            Ok(()) => {
                debug!(to, subject, "notification delivered");
                Delivery::sent()
            }
            Err(e) => {
                warn!(to, error = %e, "notification delivery failed");
                Delivery::failed(e)
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn smtp(host: &str, user: &str, to: Option<&str>) -> SmtpConfig {
        SmtpConfig {
            host: host.into(),
            port: 587,
            username: user.into(),
            password: String::new(),
            starttls: true,
            allow_anonymous: false,
            from: "alerts@localhost".into(),
            default_to: to.map(str::to_string),
        }
    }

    #[test]
    fn fails_closed_without_a_recipient() {
        let sink = EmailNotifier::new(smtp("smtp.example.com", "mailer", None));
        let outcome = sink.send("subject", "body", None);
        assert!(!outcome.delivered);
        assert!(outcome.detail.contains("no recipient"));
    }

    #[test]
    fn fails_closed_when_smtp_is_not_configured() {
        let sink = EmailNotifier::new(smtp("", "", Some("ops@example.com")));
        let outcome = sink.send("subject", "body", None);
        assert!(!outcome.delivered);
        assert!(outcome.detail.contains("not enabled"));
    }

    #[test]
    fn explicit_destination_bypasses_the_default_recipient_check() {
        // Still fails (no SMTP host) but gets past recipient resolution.
        let sink = EmailNotifier::new(smtp("", "", None));
        let outcome = sink.send("subject", "body", Some("ops@example.com"));
        assert!(!outcome.delivered);
        assert!(outcome.detail.contains("not enabled"));
    }
}
