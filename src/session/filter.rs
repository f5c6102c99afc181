//! Validation capability and composition.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::address::Address;
use crate::error::{Error, Result};
use crate::exec::{self, Op};
use crate::session::Transaction;

/// Decides whether a transaction should be received.
#[async_trait]
pub trait Filter: Send + Sync {
    /// Returns an error if the transaction is invalid.
    async fn validate(&self, tx: &Transaction) -> Result<()>;
}

/// A list of filters validated concurrently, failing fast.
///
/// Which member's error wins is a race; on success all members have run.
#[derive(Clone, Default)]
pub struct Filters {
    members: Vec<Arc<dyn Filter>>,
}

impl Filters {
    pub fn new(members: Vec<Arc<dyn Filter>>) -> Self {
        Self { members }
    }

    pub fn push(&mut self, filter: Arc<dyn Filter>) {
        self.members.push(filter);
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub async fn validate(&self, tx: &Transaction) -> Result<()> {
        let ops: Vec<Op<Transaction, Error>> = self
            .members
            .iter()
            .map(|member| {
                let member = Arc::clone(member);
                let op = move |tx: Transaction| -> BoxFuture<'static, Result<()>> {
                    Box::pin(async move { member.validate(&tx).await })
                };
                Box::new(op) as Op<Transaction, Error>
            })
            .collect();
        exec::run_all(tx.clone(), ops).await
    }
}

#[async_trait]
impl Filter for Filters {
    async fn validate(&self, tx: &Transaction) -> Result<()> {
        Filters::validate(self, tx).await
    }
}

impl From<Vec<Arc<dyn Filter>>> for Filters {
    fn from(members: Vec<Arc<dyn Filter>>) -> Self {
        Self::new(members)
    }
}

/// A set of filters keyed by recipient address.
///
/// Implementations may be static or dynamic (a database lookup); they must be
/// safe for concurrent invocation and must not mutate shared state as a side
/// effect of resolution.
#[async_trait]
pub trait FilterSet: Send + Sync {
    /// Returns the filters bound to `addr`, empty if none match.
    async fn find_filters(&self, addr: &Address) -> Result<Vec<Arc<dyn Filter>>>;
}

/// Resolves the filters applicable to a transaction.
///
/// A session registers any number of providers; their results are
/// concatenated — without deduplication — before execution.
#[async_trait]
pub trait FilterProvider: Send + Sync {
    async fn filters_for(&self, tx: &Transaction) -> Result<Vec<Arc<dyn Filter>>>;
}

/// A fixed filter list acts as its own provider.
#[async_trait]
impl FilterProvider for Filters {
    async fn filters_for(&self, _tx: &Transaction) -> Result<Vec<Arc<dyn Filter>>> {
        Ok(self.members.clone())
    }
}

/// Adapts a [`FilterSet`] into a provider keyed by the transaction's `To`
/// recipient.
///
/// Extracts the recipient from the `To` header (failing if it is
/// unparsable), then queries the set; the resolved filters join the commit
/// fan-out like any statically registered ones.
pub struct SetFilterProvider {
    set: Arc<dyn FilterSet>,
}

impl SetFilterProvider {
    pub fn new(set: Arc<dyn FilterSet>) -> Self {
        Self { set }
    }
}

#[async_trait]
impl FilterProvider for SetFilterProvider {
    async fn filters_for(&self, tx: &Transaction) -> Result<Vec<Arc<dyn Filter>>> {
        let addr = Address::parse(tx.to())?;
        self.set.find_filters(&addr).await
    }
}
