//! SMTP forwarding — re-emits the untouched original message to a relay.

use async_trait::async_trait;
use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::info;

use crate::error::{ForwardError, Result};
use crate::session::{Hook, Transaction};

/// Forwarding configuration.
pub struct ForwarderConfig {
    /// Relay hostname.
    pub host: String,
    /// Submission port; 587 when unset.
    pub port: Option<u16>,
    /// SMTP credentials (username, password).
    pub credentials: Option<(String, String)>,
    /// Destination mailboxes.
    pub recipients: Vec<String>,
}

/// A [`Hook`] that re-submits the transaction's raw bytes over SMTP.
///
/// The message body is the byte-identical original; only the envelope is
/// rewritten (sender from the transaction, recipients from the config).
#[derive(Debug)]
pub struct Forwarder {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    recipients: Vec<lettre::Address>,
}

impl Forwarder {
    /// Builds the transport and parses the destination mailboxes up front.
    pub fn new(config: ForwarderConfig) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| ForwardError::Transport(e.to_string()))?
            .port(config.port.unwrap_or(587));
        if let Some((user, password)) = config.credentials {
            builder = builder.credentials(Credentials::new(user, password));
        }

        let recipients = config
            .recipients
            .iter()
            .map(|r| {
                r.parse::<lettre::Address>()
                    .map_err(|_| ForwardError::InvalidRecipient(r.clone()).into())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            transport: builder.build(),
            recipients,
        })
    }
}

#[async_trait]
impl Hook for Forwarder {
    async fn send(&self, tx: &Transaction) -> Result<()> {
        let sender = tx
            .sender_address()
            .parse::<lettre::Address>()
            .map_err(|e| ForwardError::Envelope(e.to_string()))?;
        let envelope = Envelope::new(Some(sender), self.recipients.clone())
            .map_err(|e| ForwardError::Envelope(e.to_string()))?;

        self.transport
            .send_raw(&envelope, tx.raw())
            .await
            .map_err(|e| ForwardError::Transport(e.to_string()))?;
        info!(id = %tx.id(), recipients = self.recipients.len(), "message forwarded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(recipients: &[&str]) -> ForwarderConfig {
        ForwarderConfig {
            host: "smtp.mail.com".to_string(),
            port: None,
            credentials: Some(("user".to_string(), "pass".to_string())),
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn builds_with_valid_recipients() {
        assert!(Forwarder::new(config(&["team@mail.com"])).is_ok());
    }

    #[test]
    fn rejects_invalid_recipient() {
        let err = Forwarder::new(config(&["not an address"])).unwrap_err();
        assert!(err.to_string().contains("not an address"));
    }
}
