//! Outbound delivery of the digest email via SMTP.

use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use crate::error::DeliveryError;

/// SMTP connection settings plus the sender address.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

/// Sends plain text email via SMTP.
pub struct EmailSender {
    config: SmtpConfig,
}

impl EmailSender {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Send a plain text email. Returns the Message-ID assigned to it.
    pub fn send(&self, to: &str, subject: &str, body: &str) -> Result<String, DeliveryError> {
        let credentials = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::relay(&self.config.host)
            .map_err(|e| DeliveryError::SendFailed {
                host: self.config.host.clone(),
                reason: format!("SMTP relay error: {e}"),
            })?
            .port(self.config.port)
            .credentials(credentials)
            .build();

        let message_id = generate_message_id(&self.config.host);

        let email = Message::builder()
            .from(self.config.from_address.parse().map_err(|e| {
                DeliveryError::InvalidAddress {
                    address: self.config.from_address.clone(),
                    reason: format!("{e}"),
                }
            })?)
            .to(to.parse().map_err(|e| DeliveryError::InvalidAddress {
                address: to.to_string(),
                reason: format!("{e}"),
            })?)
            .subject(subject)
            .message_id(Some(message_id.clone()))
            .body(body.to_string())
            .map_err(|e| DeliveryError::SendFailed {
                host: self.config.host.clone(),
                reason: format!("Failed to build email: {e}"),
            })?;

        transport.send(&email).map_err(|e| DeliveryError::SendFailed {
            host: self.config.host.clone(),
            reason: format!("SMTP send failed: {e}"),
        })?;

        tracing::info!(to, message_id = %message_id, "Email sent");
        Ok(message_id)
    }
}

/// RFC 5322 style Message-ID: `<uuid@host>`.
fn generate_message_id(host: &str) -> String {
    format!("<{}@{}>", Uuid::new_v4(), host)
}
