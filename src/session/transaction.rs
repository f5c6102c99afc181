//! Immutable record of one accepted mail message.

use std::sync::Arc;

use mail_parser::MessageParser;
use uuid::Uuid;

use crate::address::Address;
use crate::error::SessionError;

/// Envelope fields extracted once at construction.
///
/// Owned copies — the raw bytes stay untouched alongside them so forwarding
/// hooks can re-emit the exact original message.
#[derive(Debug, Default)]
struct Envelope {
    from: String,
    to: String,
    subject: String,
    text: String,
    html: String,
}

/// One accepted mail message plus envelope metadata.
///
/// Built exactly once per accepted message and never mutated afterwards.
/// Cloning is cheap: the combinators hand one copy to every concurrently
/// running filter and hook.
#[derive(Debug, Clone)]
pub struct Transaction {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    id: Uuid,
    sender: Address,
    rcpt: Address,
    envelope: Envelope,
    raw: Vec<u8>,
}

impl Transaction {
    /// Parses `raw` into an envelope and builds the Transaction.
    ///
    /// # Errors
    /// [`SessionError::Envelope`] when the message cannot be parsed.
    pub fn new(
        id: Uuid,
        sender: Address,
        rcpt: Address,
        raw: Vec<u8>,
    ) -> Result<Self, SessionError> {
        let envelope = parse_envelope(&raw)?;
        Ok(Self {
            inner: Arc::new(Inner {
                id,
                sender,
                rcpt,
                envelope,
                raw,
            }),
        })
    }

    /// Correlation id, shared with the originating session.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// The SMTP MAIL FROM address.
    pub fn sender_address(&self) -> String {
        self.inner.sender.to_string()
    }

    pub fn sender_name(&self) -> &str {
        self.inner.sender.name()
    }

    /// The SMTP RCPT TO address.
    pub fn rcpt_address(&self) -> String {
        self.inner.rcpt.to_string()
    }

    pub fn rcpt_name(&self) -> &str {
        self.inner.rcpt.name()
    }

    /// The `From` header, rendered as `Name <user@domain>` or bare
    /// `user@domain`.
    pub fn from(&self) -> &str {
        &self.inner.envelope.from
    }

    /// The `To` header, rendered like [`Transaction::from`].
    pub fn to(&self) -> &str {
        &self.inner.envelope.to
    }

    /// The `Subject` header, empty if absent.
    pub fn subject(&self) -> &str {
        &self.inner.envelope.subject
    }

    /// The plain-text body, empty if absent.
    pub fn text(&self) -> &str {
        &self.inner.envelope.text
    }

    /// The HTML body, empty if absent.
    pub fn html(&self) -> &str {
        &self.inner.envelope.html
    }

    /// The unmodified original message, byte-identical to the input.
    pub fn raw(&self) -> &[u8] {
        &self.inner.raw
    }
}

fn parse_envelope(raw: &[u8]) -> Result<Envelope, SessionError> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| SessionError::Envelope("message could not be parsed".to_string()))?;

    Ok(Envelope {
        from: format_mailbox(message.from().and_then(|a| a.first())),
        to: format_mailbox(message.to().and_then(|a| a.first())),
        subject: message.subject().unwrap_or_default().to_string(),
        text: message
            .body_text(0)
            .map(|t| t.to_string())
            .unwrap_or_default(),
        html: message
            .body_html(0)
            .map(|h| h.to_string())
            .unwrap_or_default(),
    })
}

/// Renders a parsed mailbox back into header form.
fn format_mailbox(addr: Option<&mail_parser::Addr<'_>>) -> String {
    let Some(addr) = addr else {
        return String::new();
    };
    let address = addr.address().unwrap_or_default();
    match addr.name() {
        Some(name) if !name.is_empty() => format!("{name} <{address}>"),
        _ => address.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(body: &str) -> Vec<u8> {
        format!(
            "From: alice <alice@mail.com>\r\nTo: bob <bob@mail.com>\r\nSubject: Subject\r\n\r\n{body}"
        )
        .into_bytes()
    }

    fn transaction(raw: Vec<u8>) -> Transaction {
        Transaction::new(
            Uuid::new_v4(),
            Address::parse("alice@mail.com").unwrap(),
            Address::parse("bob@mail.com").unwrap(),
            raw,
        )
        .unwrap()
    }

    #[test]
    fn envelope_fields_are_extracted() {
        let tx = transaction(mail("hello"));
        assert_eq!(tx.sender_address(), "alice@mail.com");
        assert_eq!(tx.rcpt_address(), "bob@mail.com");
        assert_eq!(tx.from(), "alice <alice@mail.com>");
        assert_eq!(tx.to(), "bob <bob@mail.com>");
        assert_eq!(tx.subject(), "Subject");
        assert_eq!(tx.text(), "hello");
    }

    #[test]
    fn raw_bytes_are_byte_identical() {
        let raw = mail("payload line one\r\npayload line two");
        let tx = transaction(raw.clone());
        assert_eq!(tx.raw(), raw.as_slice());
    }

    #[test]
    fn clones_share_the_same_message() {
        let tx = transaction(mail("hello"));
        let copy = tx.clone();
        assert_eq!(tx.id(), copy.id());
        assert_eq!(tx.raw().as_ptr(), copy.raw().as_ptr());
    }
}
