//! Mailbox — the configured bundle a protocol adapter mints sessions from.

use std::sync::Arc;
use std::time::Duration;

use crate::session::{
    DEFAULT_COMMIT_TIMEOUT, Filter, FilterProvider, FilterSet, Filters, Hook, HookProvider,
    HookSet, Hooks, Session, SessionConfig, SetFilterProvider, SetHookProvider,
};

/// Mailbox configuration with named fields.
///
/// Plain filters and hooks apply to every transaction; sets are resolved per
/// recipient alias at commit time.
pub struct MailboxConfig {
    pub filters: Vec<Arc<dyn Filter>>,
    pub filter_sets: Vec<Arc<dyn FilterSet>>,
    pub hooks: Vec<Arc<dyn Hook>>,
    pub hook_sets: Vec<Arc<dyn HookSet>>,
    /// Deadline applied to every commit.
    pub timeout: Duration,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            filter_sets: Vec::new(),
            hooks: Vec::new(),
            hook_sets: Vec::new(),
            timeout: DEFAULT_COMMIT_TIMEOUT,
        }
    }
}

/// An immutable, shareable session factory.
///
/// One mailbox serves every connection; each logical unit of work gets a
/// fresh [`Session`] carrying the same providers.
#[derive(Clone)]
pub struct Mailbox {
    session_config: SessionConfig,
}

impl Mailbox {
    pub fn new(config: MailboxConfig) -> Self {
        let mut filters: Vec<Arc<dyn FilterProvider>> = Vec::new();
        if !config.filters.is_empty() {
            filters.push(Arc::new(Filters::new(config.filters)));
        }
        for set in config.filter_sets {
            filters.push(Arc::new(SetFilterProvider::new(set)));
        }

        let mut hooks: Vec<Arc<dyn HookProvider>> = Vec::new();
        if !config.hooks.is_empty() {
            hooks.push(Arc::new(Hooks::some(config.hooks)));
        }
        for set in config.hook_sets {
            hooks.push(Arc::new(SetHookProvider::new(set)));
        }

        Self {
            session_config: SessionConfig {
                filters,
                hooks,
                timeout: config.timeout,
            },
        }
    }

    /// Mints a session carrying this mailbox's configuration.
    pub fn session(&self) -> Session {
        Session::new(self.session_config.clone())
    }
}
