//! Mailway — a mail-to-webhook relay.
//!
//! Recipient addresses are dynamically provisioned aliases, each bound at
//! runtime to zero or more delivery actions. Inbound SMTP transactions flow
//! through a per-recipient filter pipeline (fail-fast) and a hook pipeline
//! (best-effort) under a single deadline.

pub mod address;
pub mod config;
pub mod error;
pub mod exec;
pub mod forward;
pub mod http;
pub mod mailbox;
pub mod session;
pub mod smtp;
pub mod spam;
pub mod store;
pub mod webhook;

pub use address::Address;
pub use error::{Error, Result};
pub use mailbox::{Mailbox, MailboxConfig};
pub use session::{Filter, Hook, Session, Transaction};
pub use webhook::{Blueprint, Webhook};
