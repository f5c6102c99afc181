//! Registry-backed filter and hook capabilities.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::address::Address;
use crate::error::{Error, Result, SessionError};
use crate::exec::{self, Op};
use crate::session::{Filter, Hook, HookSet, Transaction};
use crate::store::traits::Registry;

/// Rejects transactions unless both the RCPT address and the envelope `To`
/// address are provisioned aliases.
///
/// The two lookups run concurrently, failing fast on the first miss.
pub struct KnownRecipient {
    registry: Arc<dyn Registry>,
}

impl KnownRecipient {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Filter for KnownRecipient {
    async fn validate(&self, tx: &Transaction) -> Result<()> {
        let checks: [fn(&Transaction) -> String; 2] = [
            |tx| tx.rcpt_address(),
            |tx| tx.to().to_string(),
        ];
        let ops: Vec<Op<Transaction, Error>> = checks
            .into_iter()
            .map(|selector| {
                let registry = Arc::clone(&self.registry);
                let op = move |tx: Transaction| -> BoxFuture<'static, Result<()>> {
                    Box::pin(async move {
                        let addr = Address::parse(&selector(&tx))?;
                        if registry.address_exists(&addr).await? {
                            Ok(())
                        } else {
                            Err(SessionError::Rejected(format!(
                                "address {addr} is not provisioned"
                            ))
                            .into())
                        }
                    })
                };
                Box::new(op) as Op<Transaction, Error>
            })
            .collect();
        exec::run_all(tx.clone(), ops).await
    }
}

/// Resolves, per recipient alias, every webhook bound to it.
pub struct RegistryHooks {
    registry: Arc<dyn Registry>,
}

impl RegistryHooks {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl HookSet for RegistryHooks {
    async fn find_hooks(&self, addr: &Address) -> Result<Vec<Arc<dyn Hook>>> {
        let records = self.registry.webhooks_for(addr).await?;
        let mut hooks: Vec<Arc<dyn Hook>> = Vec::with_capacity(records.len());
        for record in records {
            hooks.push(Arc::new(record.into_webhook()?));
        }
        Ok(hooks)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::store::libsql_backend::LibSqlBackend;
    use crate::store::traits::WebhookRecord;
    use crate::webhook::{Blueprint, Webhook};

    fn transaction(rcpt: &str, to_header: &str) -> Transaction {
        let mail = format!(
            "From: alice <alice@mail.com>\r\nTo: {to_header}\r\nSubject: Subject\r\n\r\nhello"
        );
        Transaction::new(
            Uuid::new_v4(),
            Address::parse("alice@mail.com").unwrap(),
            Address::parse(rcpt).unwrap(),
            mail.into_bytes(),
        )
        .unwrap()
    }

    async fn registry_with(addr: &str) -> Arc<dyn Registry> {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        backend
            .create_address(&Address::parse(addr).unwrap())
            .await
            .unwrap();
        Arc::new(backend)
    }

    #[tokio::test]
    async fn known_recipient_passes_provisioned_alias() {
        let registry = registry_with("bob@mail.com").await;
        let filter = KnownRecipient::new(registry);
        let tx = transaction("bob@mail.com", "bob@mail.com");
        filter.validate(&tx).await.unwrap();
    }

    #[tokio::test]
    async fn known_recipient_rejects_unknown_alias() {
        let registry = registry_with("bob@mail.com").await;
        let filter = KnownRecipient::new(registry);
        let tx = transaction("eve@mail.com", "eve@mail.com");
        assert!(filter.validate(&tx).await.is_err());
    }

    #[tokio::test]
    async fn registry_hooks_resolve_bound_webhooks() {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        let alias = Address::parse("bob@mail.com").unwrap();
        let webhook = Webhook::from_blueprint(&Blueprint {
            endpoint: "http://hooks.local/a".to_string(),
            ..Blueprint::default()
        })
        .unwrap();
        let record = WebhookRecord::from_webhook(&webhook);
        backend.upsert_webhook(&record).await.unwrap();
        backend.bind(&alias, record.id).await.unwrap();
        let registry: Arc<dyn Registry> = Arc::new(backend);

        let set = RegistryHooks::new(registry);
        assert_eq!(set.find_hooks(&alias).await.unwrap().len(), 1);

        let other = Address::parse("eve@mail.com").unwrap();
        assert!(set.find_hooks(&other).await.unwrap().is_empty());
    }
}
