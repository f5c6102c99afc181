//! Error types for Mailway.

use std::time::Duration;

use crate::exec::Aggregate;

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Address error: {0}")]
    Address(#[from] AddressError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    #[error("Forwarding error: {0}")]
    Forward(#[from] ForwardError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Mail address parsing/validation errors.
#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("'{input}' is not a valid mailbox address")]
    Invalid { input: String },
}

/// Transaction pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("sender was never set")]
    MissingSender,

    #[error("recipient was never set")]
    MissingRecipient,

    #[error("message data was never set")]
    MissingData,

    #[error("malformed message envelope: {0}")]
    Envelope(String),

    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("delivery failed: {0}")]
    Delivery(Aggregate<Error>),

    #[error("transaction pipeline timed out after {after:?}")]
    Timeout { after: Duration },
}

/// Webhook construction and dispatch errors.
///
/// Dispatch failures are deliberately opaque: the remote response body is
/// never carried upstream, only the status code.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("webhook endpoint must not be empty")]
    EmptyEndpoint,

    #[error("invalid webhook id: {0}")]
    InvalidId(String),

    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("invalid header value for {name}")]
    InvalidHeader { name: &'static str },

    #[error("template failed to compile: {0}")]
    TemplateCompile(String),

    #[error("template failed to render: {0}")]
    TemplateRender(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("endpoint responded with error status {status}")]
    Status { status: u16 },
}

/// SMTP forwarding errors.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("invalid forwarding recipient '{0}'")]
    InvalidRecipient(String),

    #[error("invalid envelope: {0}")]
    Envelope(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),
}

/// Registry persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("record not found: {entity} {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("migration failed: {0}")]
    Migration(String),
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
