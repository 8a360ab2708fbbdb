use std::{
    fmt::Display,
    sync::atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};

/// Totally ordered staleness stamp. Issued by [`RevisionCounter`] and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(u64);

impl Revision {
    pub const ZERO: Revision = Revision(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Revision {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Process-wide monotonic counter stamping snapshots and invalidations.
///
/// Shared as `Arc<RevisionCounter>` and injected into whatever needs it; there is no global instance.
#[derive(Debug, Default)]
pub struct RevisionCounter {
    counter: AtomicU64,
}

impl RevisionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(revision: Revision) -> Self {
        Self {
            counter: AtomicU64::new(revision.value()),
        }
    }

    #[inline]
    pub fn current(&self) -> Revision {
        Revision(self.counter.load(Ordering::Acquire))
    }

    /// Atomically bumps the counter and returns the new value. No two callers ever get the same revision.
    #[inline]
    pub fn advance(&self) -> Revision {
        Revision(self.counter.fetch_add(1, Ordering::AcqRel) + 1)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{collections::HashSet, sync::Arc};

    #[test]
    fn advance_is_monotonic() {
        let counter = RevisionCounter::starting_at(Revision::new(4));
        assert_eq!(counter.current(), Revision::new(4));
        assert_eq!(counter.advance(), Revision::new(5));
        assert_eq!(counter.advance(), Revision::new(6));
        assert_eq!(counter.current(), Revision::new(6));
    }

    #[test]
    fn advance_never_repeats_across_threads() {
        let counter = Arc::new(RevisionCounter::new());
        let handles = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || (0..500).map(|_| counter.advance()).collect::<Vec<_>>())
            })
            .collect::<Vec<_>>();

        let mut seen = HashSet::new();
        for handle in handles {
            for rev in handle.join().unwrap() {
                assert!(seen.insert(rev), "revision {rev} issued twice");
            }
        }
        assert_eq!(seen.len(), 4000);
        assert_eq!(counter.current(), Revision::new(4000));
    }
}
