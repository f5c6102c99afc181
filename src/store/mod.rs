//! Persistence layer — libSQL-backed registry of aliases, webhooks, and
//! their bindings, plus the filter/hook capabilities built on top of it.

pub mod libsql_backend;
pub mod migrations;
pub mod sets;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use sets::{KnownRecipient, RegistryHooks};
pub use traits::{Registry, WebhookRecord};
