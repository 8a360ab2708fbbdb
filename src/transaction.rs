//! Unit-of-work lifecycle.
//!
//! The cache only supplies hooks; [`TransactionManager`] is the minimal host that drives them in order and makes sure
//! after-completion runs exactly once whatever the outcome.

use std::{
    fmt::{Debug, Display},
    sync::Arc,
};

use async_trait::async_trait;
use fieldx::fxstruct;
use tracing::{debug, warn};

use crate::error::TransactionError;

/// A participant in a unit of work.
#[async_trait]
pub trait TransactionHook: Debug + Send + Sync + 'static {
    async fn begin(&self) -> Result<(), TransactionError>;
    async fn commit(&self) -> Result<(), TransactionError>;
    async fn rollback(&self) -> Result<(), TransactionError>;
    fn set_rollback_only(&self);
    fn rollback_only(&self) -> bool;
    fn is_active(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Inactive,
    Active,
    Preparing,
    Committing,
    RollingBack,
}

impl Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Preparing => "preparing",
            Self::Committing => "committing",
            Self::RollingBack => "rolling back",
        })
    }
}

type Hooks = Vec<Arc<dyn TransactionHook>>;

/// Drives three lists of hooks through `begin → prepare → commit | rollback → after-completion`.
///
/// A failing prepare hook, a rollback-only mark or a failing ordinary commit turns a commit into a rollback.
#[fxstruct(sync, get(off))]
pub struct TransactionManager {
    #[fieldx(lock, private, get(copy, vis(pub)), set, default(TransactionState::Inactive))]
    state: TransactionState,

    #[fieldx(lock, private, get(copy), set, default(false))]
    doomed: bool,

    #[fieldx(lock, private, get, get_mut, default(Vec::new()))]
    prepare: Hooks,

    #[fieldx(lock, private, get, get_mut, default(Vec::new()))]
    ordinary: Hooks,

    #[fieldx(lock, private, get, get_mut, default(Vec::new()))]
    after_completion: Hooks,
}

impl TransactionManager {
    /// Hook run before any ordinary commit. A failure here aborts the unit of work.
    pub async fn enlist_prepare(&self, hook: Arc<dyn TransactionHook>) -> Result<(), TransactionError> {
        self.join(&hook).await?;
        self.prepare_mut().push(hook);
        Ok(())
    }

    pub async fn enlist(&self, hook: Arc<dyn TransactionHook>) -> Result<(), TransactionError> {
        self.join(&hook).await?;
        self.ordinary_mut().push(hook);
        Ok(())
    }

    /// Hook run exactly once after the outcome is known, on commit and on rollback alike.
    pub async fn enlist_after_completion(&self, hook: Arc<dyn TransactionHook>) -> Result<(), TransactionError> {
        self.join(&hook).await?;
        self.after_completion_mut().push(hook);
        Ok(())
    }

    // Hooks enlisted into a running unit of work start immediately.
    async fn join(&self, hook: &Arc<dyn TransactionHook>) -> Result<(), TransactionError> {
        if self.is_active() {
            hook.begin().await?;
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.state() != TransactionState::Inactive
    }

    pub fn set_rollback_only(&self) {
        self.set_doomed(true);
    }

    pub fn rollback_only(&self) -> bool {
        self.doomed()
    }

    pub async fn begin(&self) -> Result<(), TransactionError> {
        if self.is_active() {
            return Err(TransactionError::AlreadyActive);
        }
        self.set_doomed(false);

        let hooks = self.all_hooks();
        for hook in hooks {
            hook.begin().await?;
        }
        self.set_state(TransactionState::Active);
        debug!("unit of work started");
        Ok(())
    }

    pub async fn commit(&self) -> Result<(), TransactionError> {
        if self.state() != TransactionState::Active {
            return Err(TransactionError::NotActive);
        }

        self.set_state(TransactionState::Preparing);
        let mut failure = None;
        let prepare = Self::snapshot(&self.prepare());
        for hook in prepare {
            if let Err(err) = hook.commit().await {
                warn!(%err, "prepare hook failed");
                failure = Some(TransactionError::Prepare(err.into_source()));
                break;
            }
        }

        if failure.is_none() && self.rollback_only() {
            failure = Some(TransactionError::RolledBack);
        }

        let ordinary = Self::snapshot(&self.ordinary());
        let mut committed = 0;
        if failure.is_none() {
            self.set_state(TransactionState::Committing);
            for hook in &ordinary {
                if let Err(err) = hook.commit().await {
                    warn!(%err, "commit hook failed");
                    failure = Some(TransactionError::Commit(err.into_source()));
                    break;
                }
                committed += 1;
            }
        }

        if let Some(failure) = failure {
            self.set_state(TransactionState::RollingBack);
            for hook in ordinary.iter().skip(committed) {
                if let Err(err) = hook.rollback().await {
                    warn!(%err, "rollback hook failed");
                }
            }
            if let Err(err) = self.complete(false).await {
                warn!(%err, "after-completion failed while rolling back");
            }
            return Err(failure);
        }

        self.complete(true).await
    }

    pub async fn rollback(&self) -> Result<(), TransactionError> {
        if !matches!(self.state(), TransactionState::Active | TransactionState::Preparing) {
            return Err(TransactionError::NotActive);
        }

        self.set_state(TransactionState::RollingBack);
        let mut first_error = None;
        let ordinary = Self::snapshot(&self.ordinary());
        for hook in ordinary {
            if let Err(err) = hook.rollback().await {
                warn!(%err, "rollback hook failed");
                first_error.get_or_insert(err);
            }
        }

        let completed = self.complete(false).await;
        match first_error {
            Some(err) => Err(err),
            None => completed,
        }
    }

    // Every after-completion hook runs, even when an earlier one fails. The state is back to inactive on return.
    async fn complete(&self, committed: bool) -> Result<(), TransactionError> {
        let mut first_error = None;
        let hooks = Self::snapshot(&self.after_completion());
        for hook in hooks {
            let outcome = if committed {
                hook.commit().await
            }
            else {
                hook.rollback().await
            };
            if let Err(err) = outcome {
                warn!(%err, committed, "after-completion hook failed");
                first_error.get_or_insert(err);
            }
        }

        self.set_state(TransactionState::Inactive);
        debug!(committed, "unit of work completed");
        match first_error {
            Some(err) => Err(TransactionError::AfterCompletion(err.into_source())),
            None => Ok(()),
        }
    }

    fn all_hooks(&self) -> Hooks {
        let mut hooks = Self::snapshot(&self.prepare());
        hooks.extend(Self::snapshot(&self.ordinary()));
        hooks.extend(Self::snapshot(&self.after_completion()));
        hooks
    }

    // Hooks are awaited without holding the list lock.
    fn snapshot(hooks: &Hooks) -> Hooks {
        hooks.iter().cloned().collect()
    }
}

impl Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("state", &self.state())
            .field("rollback_only", &self.rollback_only())
            .field("prepare", &self.prepare().len())
            .field("ordinary", &self.ordinary().len())
            .field("after_completion", &self.after_completion().len())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Default)]
    struct Recorder {
        name:    &'static str,
        journal: Arc<Mutex<Vec<String>>>,
        fail:    AtomicBool,
        active:  AtomicBool,
        doomed:  AtomicBool,
    }

    impl Recorder {
        fn new(name: &'static str, journal: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                journal: Arc::clone(journal),
                ..Default::default()
            })
        }

        fn failing(self: Arc<Self>) -> Arc<Self> {
            self.fail.store(true, Ordering::SeqCst);
            self
        }

        fn note(&self, what: &str) {
            self.journal.lock().push(format!("{}:{what}", self.name));
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("{0} refused")]
    struct Refused(&'static str);

    #[async_trait]
    impl TransactionHook for Recorder {
        async fn begin(&self) -> Result<(), TransactionError> {
            self.active.store(true, Ordering::SeqCst);
            self.note("begin");
            Ok(())
        }

        async fn commit(&self) -> Result<(), TransactionError> {
            self.note("commit");
            self.active.store(false, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(TransactionError::hook(Refused(self.name)));
            }
            Ok(())
        }

        async fn rollback(&self) -> Result<(), TransactionError> {
            self.note("rollback");
            self.active.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn set_rollback_only(&self) {
            self.doomed.store(true, Ordering::SeqCst);
        }

        fn rollback_only(&self) -> bool {
            self.doomed.load(Ordering::SeqCst)
        }

        fn is_active(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }
    }

    async fn manager(
        journal: &Arc<Mutex<Vec<String>>>,
        failing_prepare: bool,
        failing_commit: bool,
    ) -> TransactionManager {
        let tm = TransactionManager::new();
        let prepare = Recorder::new("prepare", journal);
        let ordinary = Recorder::new("store", journal);
        tm.enlist_prepare(if failing_prepare { prepare.failing() } else { prepare })
            .await
            .unwrap();
        tm.enlist(if failing_commit { ordinary.failing() } else { ordinary })
            .await
            .unwrap();
        tm.enlist_after_completion(Recorder::new("after", journal)).await.unwrap();
        tm
    }

    #[tokio::test]
    async fn commit_runs_every_phase_in_order() {
        let journal = Arc::default();
        let tm = manager(&journal, false, false).await;
        tm.begin().await.unwrap();
        assert_eq!(tm.state(), TransactionState::Active);
        tm.commit().await.unwrap();
        assert_eq!(tm.state(), TransactionState::Inactive);

        assert_eq!(
            *journal.lock(),
            vec![
                "prepare:begin",
                "store:begin",
                "after:begin",
                "prepare:commit",
                "store:commit",
                "after:commit"
            ]
        );
    }

    #[tokio::test]
    async fn failed_prepare_rolls_back() {
        let journal = Arc::default();
        let tm = manager(&journal, true, false).await;
        tm.begin().await.unwrap();
        let err = tm.commit().await.unwrap_err();
        assert!(matches!(err, TransactionError::Prepare(_)), "{err:?}");
        assert!(!tm.is_active());

        let journal = journal.lock();
        assert!(!journal.contains(&"store:commit".to_string()));
        assert!(journal.contains(&"store:rollback".to_string()));
        assert_eq!(journal.last().map(String::as_str), Some("after:rollback"));
    }

    #[tokio::test]
    async fn rollback_only_turns_commit_into_rollback() {
        let journal = Arc::default();
        let tm = manager(&journal, false, false).await;
        tm.begin().await.unwrap();
        tm.set_rollback_only();
        assert!(tm.rollback_only());
        assert!(matches!(tm.commit().await, Err(TransactionError::RolledBack)));
        assert_eq!(journal.lock().last().map(String::as_str), Some("after:rollback"));

        // The mark doesn't survive into the next unit of work.
        tm.begin().await.unwrap();
        assert!(!tm.rollback_only());
    }

    #[tokio::test]
    async fn failed_commit_still_completes_once() {
        let journal = Arc::default();
        let tm = manager(&journal, false, true).await;
        tm.begin().await.unwrap();
        assert!(matches!(tm.commit().await, Err(TransactionError::Commit(_))));

        let after = journal
            .lock()
            .iter()
            .filter(|e| e.starts_with("after:") && !e.ends_with("begin"))
            .cloned()
            .collect::<Vec<_>>();
        assert_eq!(after, vec!["after:rollback"]);
    }

    #[tokio::test]
    async fn misuse_is_reported() {
        let tm = TransactionManager::new();
        assert!(matches!(tm.commit().await, Err(TransactionError::NotActive)));
        assert!(matches!(tm.rollback().await, Err(TransactionError::NotActive)));
        tm.begin().await.unwrap();
        assert!(matches!(tm.begin().await, Err(TransactionError::AlreadyActive)));
        tm.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn late_enlisted_hook_begins_immediately() {
        let journal = Arc::default();
        let tm = TransactionManager::new();
        tm.begin().await.unwrap();
        let hook = Recorder::new("late", &journal);
        tm.enlist_after_completion(hook.clone()).await.unwrap();
        assert!(hook.is_active());
        tm.commit().await.unwrap();
        assert!(!hook.is_active());
    }
}
