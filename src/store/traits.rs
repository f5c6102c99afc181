//! The `Registry` trait — async interface over persisted relay configuration.

use async_trait::async_trait;
use uuid::Uuid;

use crate::address::Address;
use crate::error::{DatabaseError, Result};
use crate::webhook::{Blueprint, Webhook};

/// A persisted webhook description.
///
/// Row-level mirror of [`Blueprint`] with a typed id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRecord {
    pub id: Uuid,
    pub endpoint: String,
    pub auth: String,
    pub schema: String,
    pub method: String,
    pub content_type: String,
}

impl WebhookRecord {
    /// Captures a constructed webhook into a record.
    pub fn from_webhook(webhook: &Webhook) -> Self {
        let bp = webhook.to_blueprint();
        Self {
            id: webhook.id().as_uuid(),
            endpoint: bp.endpoint,
            auth: bp.auth,
            schema: bp.schema,
            method: bp.method,
            content_type: bp.content_type,
        }
    }

    pub fn to_blueprint(&self) -> Blueprint {
        Blueprint {
            id: self.id.to_string(),
            endpoint: self.endpoint.clone(),
            method: self.method.clone(),
            auth: self.auth.clone(),
            schema: self.schema.clone(),
            content_type: self.content_type.clone(),
        }
    }

    /// Reconstructs the dispatchable webhook.
    pub fn into_webhook(&self) -> Result<Webhook> {
        Webhook::from_blueprint(&self.to_blueprint())
    }
}

/// Backend-agnostic registry of provisioned addresses, webhooks, and their
/// bindings.
///
/// Implementations are called concurrently from overlapping transactions and
/// must be internally synchronized or stateless.
#[async_trait]
pub trait Registry: Send + Sync {
    // ── Addresses ───────────────────────────────────────────────────

    /// Persist a provisioned alias.
    async fn create_address(&self, addr: &Address) -> std::result::Result<(), DatabaseError>;

    /// All provisioned aliases.
    async fn list_addresses(&self) -> std::result::Result<Vec<Address>, DatabaseError>;

    /// Whether `addr` is a provisioned alias.
    async fn address_exists(&self, addr: &Address) -> std::result::Result<bool, DatabaseError>;

    // ── Webhooks ────────────────────────────────────────────────────

    /// Insert or update a webhook record by id.
    async fn upsert_webhook(&self, record: &WebhookRecord)
    -> std::result::Result<(), DatabaseError>;

    /// Fetch one webhook record.
    ///
    /// # Errors
    /// [`DatabaseError::NotFound`] when no record has the id.
    async fn find_webhook(&self, id: Uuid) -> std::result::Result<WebhookRecord, DatabaseError>;

    /// All webhook records.
    async fn list_webhooks(&self) -> std::result::Result<Vec<WebhookRecord>, DatabaseError>;

    // ── Bindings ────────────────────────────────────────────────────

    /// Bind a webhook to an alias.
    async fn bind(&self, addr: &Address, webhook: Uuid)
    -> std::result::Result<(), DatabaseError>;

    /// Remove a binding.
    async fn unbind(
        &self,
        addr: &Address,
        webhook: Uuid,
    ) -> std::result::Result<(), DatabaseError>;

    /// All webhook records bound to an alias.
    async fn webhooks_for(
        &self,
        addr: &Address,
    ) -> std::result::Result<Vec<WebhookRecord>, DatabaseError>;
}
