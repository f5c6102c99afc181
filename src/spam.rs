//! Spam filters.

use async_trait::async_trait;
use regex::Regex;

use crate::address::Address;
use crate::error::{ConfigError, Result, SessionError};
use crate::session::{Filter, Transaction};

/// Rejects transactions whose envelope `To` header does not match the SMTP
/// RCPT address.
///
/// Aliased delivery is point-to-point; a mismatch usually means the message
/// was blind-copied or relayed through a list.
pub struct RcptMismatch;

#[async_trait]
impl Filter for RcptMismatch {
    async fn validate(&self, tx: &Transaction) -> Result<()> {
        let to = Address::parse(tx.to())
            .map_err(|_| SessionError::Envelope("missing or unparsable To header".to_string()))?;
        let rcpt = tx.rcpt_address();
        if rcpt != to.to_string() {
            return Err(SessionError::Rejected(format!(
                "rcpt {rcpt} and to {to} are mismatched"
            ))
            .into());
        }
        Ok(())
    }
}

/// Rejects transactions whose RCPT or `To` address matches any of a list of
/// regex patterns.
pub struct Blacklist {
    patterns: Vec<Regex>,
}

impl Blacklist {
    /// Compiles the patterns up front; an invalid pattern fails construction
    /// rather than every transaction.
    pub fn new<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    ConfigError::InvalidValue {
                        key: "blacklist pattern".to_string(),
                        message: e.to_string(),
                    }
                    .into()
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }
}

#[async_trait]
impl Filter for Blacklist {
    async fn validate(&self, tx: &Transaction) -> Result<()> {
        let to = Address::parse(tx.to())
            .map_err(|_| SessionError::Envelope("missing or unparsable To header".to_string()))?
            .to_string();
        let rcpt = tx.rcpt_address();
        for pattern in &self.patterns {
            if pattern.is_match(&rcpt) || pattern.is_match(&to) {
                return Err(SessionError::Rejected(format!(
                    "address {rcpt} is blacklisted"
                ))
                .into());
            }
        }
        Ok(())
    }
}
