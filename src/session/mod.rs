//! Per-message transaction pipeline.
//!
//! A [`Session`] accumulates sender, recipient, and raw data, then
//! [`Session::commit`] builds a [`Transaction`], resolves the applicable
//! filters and hooks, and runs validation (fail-fast) followed by delivery
//! (best-effort) under a single deadline.

mod filter;
mod hook;
mod transaction;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time;
use tracing::error;
use uuid::Uuid;

use crate::address::Address;
use crate::error::{Result, SessionError};

pub use filter::{Filter, FilterProvider, FilterSet, Filters, SetFilterProvider};
pub use hook::{Hook, HookProvider, HookSet, Hooks, SetHookProvider};
pub use transaction::Transaction;

/// Default deadline for the whole validate-and-deliver pipeline.
pub const DEFAULT_COMMIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Session configuration.
///
/// Cheap to clone; provider lists are shared behind `Arc`.
#[derive(Clone)]
pub struct SessionConfig {
    /// Filter resolvers, invoked per transaction; results are concatenated
    /// without deduplication.
    pub filters: Vec<Arc<dyn FilterProvider>>,
    /// Hook resolvers, same contract as `filters`.
    pub hooks: Vec<Arc<dyn HookProvider>>,
    /// Deadline for commit's resolve-validate-deliver pipeline.
    pub timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            hooks: Vec::new(),
            timeout: DEFAULT_COMMIT_TIMEOUT,
        }
    }
}

/// Mutable accumulator for one logical unit of work.
///
/// Methods are sequential — a Session is not meant to be shared across
/// tasks. Concurrency exists only inside commit's internal fan-out.
pub struct Session {
    id: Uuid,
    sender: Option<Address>,
    rcpt: Option<Address>,
    data: Option<Box<dyn AsyncRead + Send + Unpin>>,
    config: SessionConfig,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: None,
            rcpt: None,
            data: None,
            config,
        }
    }

    /// Correlation id, stamped onto every transaction this session commits.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Parses a sender address and stores it.
    pub fn set_mail(&mut self, addr: &str) -> Result<()> {
        self.sender = Some(Address::parse(addr)?);
        Ok(())
    }

    /// Parses a recipient address and stores it.
    pub fn set_rcpt(&mut self, addr: &str) -> Result<()> {
        self.rcpt = Some(Address::parse(addr)?);
        Ok(())
    }

    /// Stores the raw message stream without parsing it.
    ///
    /// Parsing is deferred to commit so a malformed envelope only surfaces
    /// when the message is actually needed.
    pub fn set_data(&mut self, reader: impl AsyncRead + Send + Unpin + 'static) {
        self.data = Some(Box::new(reader));
    }

    /// Drops sender, recipient, and data; configuration is retained.
    pub fn reset(&mut self) {
        self.sender = None;
        self.rcpt = None;
        self.data = None;
    }

    /// Builds, validates, and delivers a [`Transaction`].
    ///
    /// Filters run concurrently and fail fast; all of them must pass before
    /// any hook runs. Hooks run concurrently best-effort — individual
    /// failures are aggregated, never blocking sibling deliveries. The whole
    /// pipeline is bounded by [`SessionConfig::timeout`]; on expiry, commit
    /// returns [`SessionError::Timeout`] and in-flight operations are
    /// abandoned rather than cancelled.
    ///
    /// # Errors
    /// - a `Missing*` variant when sender, recipient, or data was never set
    /// - [`SessionError::Envelope`] when the data is not parsable mail
    /// - the first filter rejection, or a [`SessionError::Delivery`]
    ///   aggregate of hook failures
    pub async fn commit(&mut self) -> Result<()> {
        let tx = self.take_transaction().await?;
        let deadline = self.config.timeout;

        let pipeline = async {
            let mut filters: Vec<Arc<dyn Filter>> = Vec::new();
            for provider in &self.config.filters {
                filters.extend(provider.filters_for(&tx).await?);
            }
            let mut hooks: Vec<Arc<dyn Hook>> = Vec::new();
            for provider in &self.config.hooks {
                hooks.extend(provider.hooks_for(&tx).await?);
            }

            if let Err(e) = Filters::new(filters).validate(&tx).await {
                error!(
                    id = %tx.id(),
                    sender = %tx.sender_address(),
                    rcpt = %tx.rcpt_address(),
                    subject = %tx.subject(),
                    reason = %e,
                    "validation failure"
                );
                return Err(e);
            }
            Hooks::some(hooks).send(&tx).await
        };

        match time::timeout(deadline, pipeline).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout { after: deadline }.into()),
        }
    }

    /// Consumes the accumulated fields into a [`Transaction`].
    ///
    /// The raw stream is read exactly once; the captured bytes stay
    /// byte-identical to the input while the envelope is parsed from them.
    async fn take_transaction(&mut self) -> Result<Transaction> {
        let sender = self.sender.clone().ok_or(SessionError::MissingSender)?;
        let rcpt = self.rcpt.clone().ok_or(SessionError::MissingRecipient)?;
        let mut data = self.data.take().ok_or(SessionError::MissingData)?;

        let mut raw = Vec::new();
        data.read_to_end(&mut raw)
            .await
            .map_err(|e| SessionError::Envelope(format!("failed to read message data: {e}")))?;

        Ok(Transaction::new(self.id, sender, rcpt, raw)?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use async_trait::async_trait;

    use super::*;
    use crate::error::Error;

    fn mail(message: &str) -> Cursor<Vec<u8>> {
        let mail = format!(
            "From: alice <alice@mail.com>\r\nTo: bob <bob@mail.com>\r\nSubject: Subject\r\n\r\n{message}"
        );
        Cursor::new(mail.into_bytes())
    }

    fn populated(config: SessionConfig) -> Session {
        let mut session = Session::new(config);
        session.set_mail("alice <alice@mail.com>").unwrap();
        session.set_rcpt("bob <bob@mail.com>").unwrap();
        session.set_data(mail("hello"));
        session
    }

    #[derive(Default)]
    struct SpyHook {
        seen: Mutex<Option<Transaction>>,
    }

    #[async_trait]
    impl Hook for SpyHook {
        async fn send(&self, tx: &Transaction) -> Result<()> {
            *self.seen.lock().unwrap() = Some(tx.clone());
            Ok(())
        }
    }

    struct RejectingFilter;

    #[async_trait]
    impl Filter for RejectingFilter {
        async fn validate(&self, _tx: &Transaction) -> Result<()> {
            Err(SessionError::Rejected("no".to_string()).into())
        }
    }

    struct CountingFilter(Arc<AtomicUsize>);

    #[async_trait]
    impl Filter for CountingFilter {
        async fn validate(&self, _tx: &Transaction) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct StallingHook;

    #[async_trait]
    impl Hook for StallingHook {
        async fn send(&self, _tx: &Transaction) -> Result<()> {
            time::sleep(Duration::from_secs(10)).await;
            Ok(())
        }
    }

    struct FailingHook;

    #[async_trait]
    impl Hook for FailingHook {
        async fn send(&self, _tx: &Transaction) -> Result<()> {
            Err(SessionError::Rejected("unreachable endpoint".to_string()).into())
        }
    }

    #[tokio::test]
    async fn commit_succeeds_without_filters_or_hooks() {
        let mut session = populated(SessionConfig::default());
        session.commit().await.unwrap();
    }

    #[tokio::test]
    async fn commit_hands_the_transaction_to_hooks() {
        let spy = Arc::new(SpyHook::default());
        let config = SessionConfig {
            hooks: vec![Arc::new(Hooks::some(vec![spy.clone()]))],
            ..SessionConfig::default()
        };
        let mut session = populated(config);
        session.commit().await.unwrap();

        let seen = spy.seen.lock().unwrap().clone().expect("hook not called");
        assert_eq!(seen.sender_address(), "alice@mail.com");
        assert_eq!(seen.rcpt_address(), "bob@mail.com");
        assert_eq!(seen.text(), "hello");
    }

    #[tokio::test]
    async fn commit_requires_sender() {
        let mut session = Session::new(SessionConfig::default());
        session.set_rcpt("bob@mail.com").unwrap();
        session.set_data(mail("hello"));

        match session.commit().await {
            Err(Error::Session(SessionError::MissingSender)) => {}
            other => panic!("expected MissingSender, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn commit_requires_recipient() {
        let mut session = Session::new(SessionConfig::default());
        session.set_mail("alice@mail.com").unwrap();
        session.set_data(mail("hello"));

        match session.commit().await {
            Err(Error::Session(SessionError::MissingRecipient)) => {}
            other => panic!("expected MissingRecipient, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn commit_requires_data() {
        let mut session = Session::new(SessionConfig::default());
        session.set_mail("alice@mail.com").unwrap();
        session.set_rcpt("bob@mail.com").unwrap();

        match session.commit().await {
            Err(Error::Session(SessionError::MissingData)) => {}
            other => panic!("expected MissingData, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn set_mail_rejects_malformed_address() {
        let mut session = Session::new(SessionConfig::default());
        assert!(session.set_mail("not-an-address").is_err());
    }

    #[tokio::test]
    async fn rejecting_filter_aborts_commit() {
        let config = SessionConfig {
            filters: vec![Arc::new(Filters::new(vec![Arc::new(RejectingFilter)]))],
            ..SessionConfig::default()
        };
        let mut session = populated(config);
        assert!(session.commit().await.is_err());
    }

    #[tokio::test]
    async fn no_hook_runs_when_a_filter_rejects() {
        let spy = Arc::new(SpyHook::default());
        let config = SessionConfig {
            filters: vec![Arc::new(Filters::new(vec![Arc::new(RejectingFilter)]))],
            hooks: vec![Arc::new(Hooks::some(vec![spy.clone()]))],
            ..SessionConfig::default()
        };
        let mut session = populated(config);
        assert!(session.commit().await.is_err());
        assert!(spy.seen.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_registrations_run_twice() {
        let counter = Arc::new(AtomicUsize::new(0));
        let filter: Arc<dyn Filter> = Arc::new(CountingFilter(Arc::clone(&counter)));
        let config = SessionConfig {
            filters: vec![
                Arc::new(Filters::new(vec![Arc::clone(&filter)])),
                Arc::new(Filters::new(vec![filter])),
            ],
            ..SessionConfig::default()
        };
        let mut session = populated(config);
        session.commit().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stalled_hook_hits_the_deadline() {
        let timeout = Duration::from_millis(200);
        let config = SessionConfig {
            hooks: vec![Arc::new(Hooks::some(vec![Arc::new(StallingHook)]))],
            timeout,
            ..SessionConfig::default()
        };
        let mut session = populated(config);

        let start = Instant::now();
        match session.commit().await {
            Err(Error::Session(SessionError::Timeout { .. })) => {}
            other => panic!("expected Timeout, got {other:?}"),
        }
        // Commit must return at the deadline, not when the hook finishes.
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn hook_failures_are_aggregated() {
        let spy = Arc::new(SpyHook::default());
        let hooks: Vec<Arc<dyn Hook>> =
            vec![Arc::new(FailingHook), spy.clone(), Arc::new(FailingHook)];
        let config = SessionConfig {
            hooks: vec![Arc::new(Hooks::some(hooks))],
            ..SessionConfig::default()
        };
        let mut session = populated(config);

        match session.commit().await {
            Err(Error::Session(SessionError::Delivery(aggregate))) => {
                assert_eq!(aggregate.len(), 2);
            }
            other => panic!("expected Delivery, got {other:?}"),
        }
        // The healthy sibling still delivered.
        assert!(spy.seen.lock().unwrap().is_some());
    }

    #[tokio::test]
    async fn reset_clears_fields_but_keeps_configuration() {
        let mut session = populated(SessionConfig::default());
        session.reset();

        match session.commit().await {
            Err(Error::Session(SessionError::MissingSender)) => {}
            other => panic!("expected MissingSender after reset, got {other:?}"),
        }

        // The session is reusable for the next message.
        session.set_mail("alice@mail.com").unwrap();
        session.set_rcpt("bob@mail.com").unwrap();
        session.set_data(mail("again"));
        session.commit().await.unwrap();
    }
}
