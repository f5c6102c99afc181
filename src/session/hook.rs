//! Delivery capability and composition.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::error;

use crate::address::Address;
use crate::error::{Error, Result, SessionError};
use crate::exec::{self, Op};
use crate::session::Transaction;

/// Delivers a transaction to an external system.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Returns an error if sending fails.
    async fn send(&self, tx: &Transaction) -> Result<()>;
}

/// How a [`Hooks`] list reacts to a member failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    /// Fail on the first error observed.
    FailFast,
    /// Always run every member; aggregate the errors.
    BestEffort,
}

/// A list of hooks executed concurrently.
///
/// The default, best-effort strategy guarantees that one failing delivery
/// never blocks delivery to the others.
#[derive(Clone)]
pub struct Hooks {
    members: Vec<Arc<dyn Hook>>,
    strategy: Strategy,
}

impl Hooks {
    /// Best-effort list: every member runs, errors are aggregated into
    /// [`SessionError::Delivery`], each one logged as it is collected.
    pub fn some(members: Vec<Arc<dyn Hook>>) -> Self {
        Self {
            members,
            strategy: Strategy::BestEffort,
        }
    }

    /// Fail-fast list: the first member error aborts the wait.
    pub fn all(members: Vec<Arc<dyn Hook>>) -> Self {
        Self {
            members,
            strategy: Strategy::FailFast,
        }
    }

    pub fn push(&mut self, hook: Arc<dyn Hook>) {
        self.members.push(hook);
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn ops(&self) -> Vec<Op<Transaction, Error>> {
        self.members
            .iter()
            .map(|member| {
                let member = Arc::clone(member);
                let op = move |tx: Transaction| -> BoxFuture<'static, Result<()>> {
                    Box::pin(async move { member.send(&tx).await })
                };
                Box::new(op) as Op<Transaction, Error>
            })
            .collect()
    }

    pub async fn send(&self, tx: &Transaction) -> Result<()> {
        match self.strategy {
            Strategy::FailFast => exec::run_all(tx.clone(), self.ops()).await,
            Strategy::BestEffort => match exec::run_some(tx.clone(), self.ops()).await {
                Ok(()) => Ok(()),
                Err(aggregate) => {
                    for e in aggregate.errors() {
                        error!(id = %tx.id(), error = %e, "hook delivery failed");
                    }
                    Err(SessionError::Delivery(aggregate).into())
                }
            },
        }
    }
}

impl Default for Hooks {
    fn default() -> Self {
        Self::some(Vec::new())
    }
}

#[async_trait]
impl Hook for Hooks {
    async fn send(&self, tx: &Transaction) -> Result<()> {
        Hooks::send(self, tx).await
    }
}

impl From<Vec<Arc<dyn Hook>>> for Hooks {
    fn from(members: Vec<Arc<dyn Hook>>) -> Self {
        Self::some(members)
    }
}

/// A set of hooks keyed by recipient address.
///
/// Implementations must be safe for concurrent invocation across overlapping
/// transactions.
#[async_trait]
pub trait HookSet: Send + Sync {
    /// Returns the hooks bound to `addr`, empty if none match.
    async fn find_hooks(&self, addr: &Address) -> Result<Vec<Arc<dyn Hook>>>;
}

/// Resolves the hooks applicable to a transaction.
#[async_trait]
pub trait HookProvider: Send + Sync {
    async fn hooks_for(&self, tx: &Transaction) -> Result<Vec<Arc<dyn Hook>>>;
}

/// A fixed hook list acts as its own provider.
#[async_trait]
impl HookProvider for Hooks {
    async fn hooks_for(&self, _tx: &Transaction) -> Result<Vec<Arc<dyn Hook>>> {
        Ok(self.members.clone())
    }
}

/// Adapts a [`HookSet`] into a provider keyed by the transaction's `To`
/// recipient.
pub struct SetHookProvider {
    set: Arc<dyn HookSet>,
}

impl SetHookProvider {
    pub fn new(set: Arc<dyn HookSet>) -> Self {
        Self { set }
    }
}

#[async_trait]
impl HookProvider for SetHookProvider {
    async fn hooks_for(&self, tx: &Transaction) -> Result<Vec<Arc<dyn Hook>>> {
        let addr = Address::parse(tx.to())?;
        self.set.find_hooks(&addr).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use uuid::Uuid;

    use super::*;

    fn transaction() -> Transaction {
        let mail = b"From: alice <alice@mail.com>\r\nTo: bob <bob@mail.com>\r\n\
            Subject: Subject\r\n\r\nhello"
            .to_vec();
        Transaction::new(
            Uuid::new_v4(),
            Address::parse("alice@mail.com").unwrap(),
            Address::parse("bob@mail.com").unwrap(),
            mail,
        )
        .unwrap()
    }

    struct CountingHook(Arc<AtomicUsize>);

    #[async_trait]
    impl Hook for CountingHook {
        async fn send(&self, _tx: &Transaction) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHook;

    #[async_trait]
    impl Hook for FailingHook {
        async fn send(&self, _tx: &Transaction) -> Result<()> {
            Err(SessionError::Rejected("down".to_string()).into())
        }
    }

    #[tokio::test]
    async fn best_effort_runs_every_member_despite_failures() {
        let counter = Arc::new(AtomicUsize::new(0));
        let members: Vec<Arc<dyn Hook>> = vec![
            Arc::new(FailingHook),
            Arc::new(CountingHook(Arc::clone(&counter))),
            Arc::new(CountingHook(Arc::clone(&counter))),
        ];

        let err = Hooks::some(members).send(&transaction()).await.unwrap_err();
        match err {
            Error::Session(SessionError::Delivery(aggregate)) => {
                assert_eq!(aggregate.len(), 1)
            }
            other => panic!("expected Delivery, got {other:?}"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fail_fast_reports_the_first_error() {
        let members: Vec<Arc<dyn Hook>> = vec![Arc::new(FailingHook)];
        let err = Hooks::all(members).send(&transaction()).await.unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::Rejected(_))));
    }

    #[tokio::test]
    async fn empty_list_delivers_nothing_and_succeeds() {
        Hooks::default().send(&transaction()).await.unwrap();
    }
}
