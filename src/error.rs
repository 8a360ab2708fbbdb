use std::time::Duration;

use thiserror::Error;

/// Failures originating in the cache layer itself.
///
/// Callers of [`CacheRealmProvider`](crate::provider::CacheRealmProvider) never see this type directly: every backing
/// store error type implements `From<CacheError>`, so these failures surface through the store's own error semantics.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("timed out after {timeout:?} waiting for the cluster lock on '{key}'")]
    LockTimeout { key: String, timeout: Duration },

    #[error("cluster lock on '{key}' cannot be granted: {reason}")]
    LockFailed { key: String, reason: String },

    #[error("cannot access the backing store without an active transaction")]
    NoActiveTransaction,

    #[error("invalidation observer failed: {0}")]
    Observer(String),

    #[error("failed to build {what}: {reason}")]
    Builder { what: &'static str, reason: String },

    #[error("invalid cache configuration: {0}")]
    Config(String),
}

impl CacheError {
    pub(crate) fn builder<E: std::fmt::Display>(what: &'static str, err: E) -> Self {
        Self::Builder {
            what,
            reason: err.to_string(),
        }
    }
}

/// Failures of the unit-of-work lifecycle.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("transaction is already active")]
    AlreadyActive,

    #[error("transaction is not active")]
    NotActive,

    #[error("transaction was marked rollback-only and has been rolled back")]
    RolledBack,

    #[error("prepare phase failed: {0}")]
    Prepare(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("commit failed: {0}")]
    Commit(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("after-completion failed: {0}")]
    AfterCompletion(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Hook(Box<dyn std::error::Error + Send + Sync>),
}

impl TransactionError {
    pub fn hook<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Hook(Box::new(err))
    }

    // Strip an outer Hook wrapper so phase errors don't nest twice.
    pub(crate) fn into_source(self) -> Box<dyn std::error::Error + Send + Sync> {
        match self {
            Self::Hook(err) => err,
            other => Box::new(other),
        }
    }
}

impl From<CacheError> for TransactionError {
    fn from(err: CacheError) -> Self {
        Self::hook(err)
    }
}

