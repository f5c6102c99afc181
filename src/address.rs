//! Validated mail-identity value type.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use crate::error::AddressError;

/// Mailbox grammar: local part, `@`, dotted domain with a 2–4 character
/// final label.
static MAILBOX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.-]+@([\w-]+\.)+[\w-]{2,4}$").unwrap());

/// An email address.
///
/// Immutable once constructed; two addresses are equal when their canonical
/// `user@domain` forms are equal. The display name never participates in
/// equality.
#[derive(Debug, Clone, Eq)]
pub struct Address {
    user: String,
    domain: String,
    name: String,
}

impl Address {
    /// Parses an address-spec, optionally with a display name
    /// (`Alice <alice@mail.com>` or bare `alice@mail.com`).
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();
        let (name, spec) = match (trimmed.find('<'), trimmed.rfind('>')) {
            (Some(open), Some(close)) if open < close => {
                (trimmed[..open].trim(), trimmed[open + 1..close].trim())
            }
            _ => ("", trimmed),
        };

        if !MAILBOX.is_match(spec) {
            return Err(AddressError::Invalid {
                input: input.to_string(),
            });
        }
        let (user, domain) = spec.split_once('@').ok_or_else(|| AddressError::Invalid {
            input: input.to_string(),
        })?;

        Ok(Self {
            user: user.to_string(),
            domain: domain.to_string(),
            name: name.trim_matches('"').to_string(),
        })
    }

    /// Composes and validates an address from user and domain parts.
    pub fn new(user: &str, domain: &str) -> Result<Self, AddressError> {
        Self::parse(&format!("{user}@{domain}"))
    }

    /// Generates an address with a UUID-v4 local part, for disposable-alias
    /// issuance.
    pub fn random(domain: &str) -> Result<Self, AddressError> {
        Self::new(&Uuid::new_v4().to_string(), domain)
    }

    /// The local part, e.g. `alice` in `alice@mail.com`.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// The domain part, e.g. `mail.com` in `alice@mail.com`.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The display name, e.g. `Alice` in `Alice <alice@mail.com>`. May be
    /// empty.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.domain)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.user == other.user && self.domain == other.domain
    }
}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.user.hash(state);
        self.domain.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_composes_canonical_form() {
        let addr = Address::new("alice", "localhost.lan").unwrap();
        assert_eq!(addr.to_string(), "alice@localhost.lan");
    }

    #[test]
    fn parse_round_trips_composed_address() {
        let addr = Address::new("alice", "mail.com").unwrap();
        let reparsed = Address::parse(&addr.to_string()).unwrap();
        assert_eq!(addr, reparsed);
    }

    #[test]
    fn parse_accepts_display_name() {
        let addr = Address::parse("Alice <alice@mail.com>").unwrap();
        assert_eq!(addr.name(), "Alice");
        assert_eq!(addr.user(), "alice");
        assert_eq!(addr.domain(), "mail.com");
        assert_eq!(addr.to_string(), "alice@mail.com");
    }

    #[test]
    fn parse_rejects_missing_at() {
        assert!(Address::parse("alicemail.com").is_err());
    }

    #[test]
    fn parse_rejects_dotless_domain() {
        assert!(Address::parse("alice@localhost").is_err());
    }

    #[test]
    fn parse_rejects_short_final_label() {
        assert!(Address::parse("alice@mail.c").is_err());
    }

    #[test]
    fn parse_rejects_long_final_label() {
        assert!(Address::parse("alice@mail.museum").is_err());
    }

    #[test]
    fn random_generates_valid_address() {
        let addr = Address::random("localhost.lan").unwrap();
        assert_eq!(addr.domain(), "localhost.lan");
        assert!(Address::parse(&addr.to_string()).is_ok());
    }

    #[test]
    fn equality_ignores_display_name() {
        let plain = Address::parse("alice@mail.com").unwrap();
        let named = Address::parse("Alice <alice@mail.com>").unwrap();
        assert_eq!(plain, named);
    }
}
