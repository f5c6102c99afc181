//! libSQL backend — async [`Registry`] implementation.
//!
//! Supports local file and in-memory databases. `libsql::Connection` is
//! `Send + Sync` and safe for concurrent async use, so one backend instance
//! serves every overlapping session.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;
use uuid::Uuid;

use crate::address::Address;
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{Registry, WebhookRecord};

const WEBHOOK_COLUMNS: &str = "id, endpoint, auth, schema, method, content_type";

/// libSQL registry backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Opens (or creates) a local database file and runs migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Open(format!("failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Open(e.to_string()))?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Open(e.to_string()))?;

        migrations::run(&conn).await?;
        info!(path = %path.display(), "registry database opened");
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Creates an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| DatabaseError::Open(e.to_string()))?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Open(e.to_string()))?;

        migrations::run(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }
}

fn query_err(e: libsql::Error) -> DatabaseError {
    DatabaseError::Query(e.to_string())
}

fn row_to_record(row: &libsql::Row) -> Result<WebhookRecord, DatabaseError> {
    let id: String = row.get(0).map_err(query_err)?;
    let id = Uuid::parse_str(&id)
        .map_err(|_| DatabaseError::Corrupt(format!("webhook id '{id}' is not a uuid")))?;
    Ok(WebhookRecord {
        id,
        endpoint: row.get(1).map_err(query_err)?,
        auth: row.get(2).map_err(query_err)?,
        schema: row.get(3).map_err(query_err)?,
        method: row.get(4).map_err(query_err)?,
        content_type: row.get(5).map_err(query_err)?,
    })
}

#[async_trait]
impl Registry for LibSqlBackend {
    async fn create_address(&self, addr: &Address) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO addresses (address, created_at) VALUES (?1, ?2)",
                params![addr.to_string(), Utc::now().to_rfc3339()],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn list_addresses(&self) -> Result<Vec<Address>, DatabaseError> {
        let mut rows = self
            .conn
            .query("SELECT address FROM addresses ORDER BY address", ())
            .await
            .map_err(query_err)?;

        let mut addresses = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            let raw: String = row.get(0).map_err(query_err)?;
            let addr = Address::parse(&raw)
                .map_err(|_| DatabaseError::Corrupt(format!("stored address '{raw}'")))?;
            addresses.push(addr);
        }
        Ok(addresses)
    }

    async fn address_exists(&self, addr: &Address) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM addresses WHERE address = ?1",
                params![addr.to_string()],
            )
            .await
            .map_err(query_err)?;
        Ok(rows.next().await.map_err(query_err)?.is_some())
    }

    async fn upsert_webhook(&self, record: &WebhookRecord) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO webhooks (id, endpoint, auth, schema, method, content_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (id) DO UPDATE SET
                    endpoint = ?2, auth = ?3, schema = ?4, method = ?5, content_type = ?6",
                params![
                    record.id.to_string(),
                    record.endpoint.clone(),
                    record.auth.clone(),
                    record.schema.clone(),
                    record.method.clone(),
                    record.content_type.clone(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn find_webhook(&self, id: Uuid) -> Result<WebhookRecord, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {WEBHOOK_COLUMNS} FROM webhooks WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => row_to_record(&row),
            None => Err(DatabaseError::NotFound {
                entity: "webhook",
                id: id.to_string(),
            }),
        }
    }

    async fn list_webhooks(&self) -> Result<Vec<WebhookRecord>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {WEBHOOK_COLUMNS} FROM webhooks ORDER BY created_at"),
                (),
            )
            .await
            .map_err(query_err)?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            records.push(row_to_record(&row)?);
        }
        Ok(records)
    }

    async fn bind(&self, addr: &Address, webhook: Uuid) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO addresses_webhooks (address, webhook_id) VALUES (?1, ?2)",
                params![addr.to_string(), webhook.to_string()],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn unbind(&self, addr: &Address, webhook: Uuid) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "DELETE FROM addresses_webhooks WHERE address = ?1 AND webhook_id = ?2",
                params![addr.to_string(), webhook.to_string()],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn webhooks_for(&self, addr: &Address) -> Result<Vec<WebhookRecord>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {WEBHOOK_COLUMNS_PREFIXED} FROM webhooks
                     JOIN addresses_webhooks ON webhooks.id = addresses_webhooks.webhook_id
                     WHERE addresses_webhooks.address = ?1"
                ),
                params![addr.to_string()],
            )
            .await
            .map_err(query_err)?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            records.push(row_to_record(&row)?);
        }
        Ok(records)
    }
}

const WEBHOOK_COLUMNS_PREFIXED: &str = "webhooks.id, webhooks.endpoint, webhooks.auth, \
     webhooks.schema, webhooks.method, webhooks.content_type";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::{Blueprint, Webhook};

    fn record(endpoint: &str) -> WebhookRecord {
        let webhook = Webhook::from_blueprint(&Blueprint {
            endpoint: endpoint.to_string(),
            method: "POST".to_string(),
            schema: r#"{"msg":"{{.Text}}"}"#.to_string(),
            content_type: "application/json".to_string(),
            ..Blueprint::default()
        })
        .unwrap();
        WebhookRecord::from_webhook(&webhook)
    }

    #[tokio::test]
    async fn addresses_round_trip() {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        let addr = Address::parse("alice@mail.com").unwrap();

        backend.create_address(&addr).await.unwrap();
        assert!(backend.address_exists(&addr).await.unwrap());
        assert_eq!(backend.list_addresses().await.unwrap(), vec![addr]);

        let unknown = Address::parse("nobody@mail.com").unwrap();
        assert!(!backend.address_exists(&unknown).await.unwrap());
    }

    #[tokio::test]
    async fn webhooks_round_trip() {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        let record = record("http://hooks.local/a");

        backend.upsert_webhook(&record).await.unwrap();
        assert_eq!(backend.find_webhook(record.id).await.unwrap(), record);
        assert_eq!(backend.list_webhooks().await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn find_webhook_reports_missing_record() {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        match backend.find_webhook(Uuid::new_v4()).await {
            Err(DatabaseError::NotFound { entity, .. }) => assert_eq!(entity, "webhook"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_existing_record() {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        let mut record = record("http://hooks.local/a");
        backend.upsert_webhook(&record).await.unwrap();

        record.endpoint = "http://hooks.local/b".to_string();
        backend.upsert_webhook(&record).await.unwrap();

        let found = backend.find_webhook(record.id).await.unwrap();
        assert_eq!(found.endpoint, "http://hooks.local/b");
        assert_eq!(backend.list_webhooks().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn bindings_resolve_per_address() {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        let alice = Address::parse("alice@mail.com").unwrap();
        let bob = Address::parse("bob@mail.com").unwrap();
        let record = record("http://hooks.local/a");

        backend.upsert_webhook(&record).await.unwrap();
        backend.bind(&alice, record.id).await.unwrap();

        assert_eq!(backend.webhooks_for(&alice).await.unwrap(), vec![record.clone()]);
        assert!(backend.webhooks_for(&bob).await.unwrap().is_empty());

        backend.unbind(&alice, record.id).await.unwrap();
        assert!(backend.webhooks_for(&alice).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_backed_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.db");
        let addr = Address::parse("alice@mail.com").unwrap();

        {
            let backend = LibSqlBackend::new_local(&path).await.unwrap();
            backend.create_address(&addr).await.unwrap();
        }

        let reopened = LibSqlBackend::new_local(&path).await.unwrap();
        assert!(reopened.address_exists(&addr).await.unwrap());
    }
}
