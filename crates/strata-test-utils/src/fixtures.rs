//! Instrumented element types for lifecycle tests.
//!
//! - [`Counted`]: an 8-byte element that records every construction, clone
//!   and drop, with an injectable clone panic.
//! - [`Injected`]: the error returned by deliberately failing constructors.
//!
//! Counters are thread-local and keyed by a const tag, so tests running in
//! parallel never see each other's numbers and one row can carry several
//! independently counted fields.

use std::cell::RefCell;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;

/// Lifecycle totals for one tag on the current thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counts {
    pub created: usize,
    pub defaulted: usize,
    pub cloned: usize,
    pub dropped: usize,
}

impl Counts {
    /// Values constructed by any route.
    pub fn constructed(&self) -> usize {
        self.created + self.defaulted + self.cloned
    }

    /// Values constructed and not yet dropped.
    pub fn live(&self) -> isize {
        self.constructed() as isize - self.dropped as isize
    }
}

#[derive(Default)]
struct Ledger {
    counts: Counts,
    fail_clone_after: Option<usize>,
}

thread_local! {
    static LEDGERS: RefCell<HashMap<usize, Ledger>> = RefCell::new(HashMap::new());
}

fn with_ledger<R>(tag: usize, f: impl FnOnce(&mut Ledger) -> R) -> Option<R> {
    LEDGERS
        .try_with(|ledgers| f(ledgers.borrow_mut().entry(tag).or_default()))
        .ok()
}

/// A counted `u64`.
pub struct Counted<const TAG: usize> {
    pub value: u64,
}

impl<const TAG: usize> Counted<TAG> {
    pub fn new(value: u64) -> Self {
        with_ledger(TAG, |l| l.counts.created += 1);
        Self { value }
    }

    /// Totals for this tag since the last [`reset`](Self::reset).
    pub fn counts() -> Counts {
        with_ledger(TAG, |l| l.counts).unwrap_or_default()
    }

    /// Zero the totals and disarm any injected failure.
    pub fn reset() {
        with_ledger(TAG, |l| *l = Ledger::default());
    }

    /// Let `n` more clones succeed, then panic on the next one.
    pub fn fail_clone_after(n: usize) {
        with_ledger(TAG, |l| l.fail_clone_after = Some(n));
    }
}

impl<const TAG: usize> Clone for Counted<TAG> {
    fn clone(&self) -> Self {
        let fail = with_ledger(TAG, |l| match l.fail_clone_after {
            Some(0) => {
                l.fail_clone_after = None;
                true
            }
            Some(n) => {
                l.fail_clone_after = Some(n - 1);
                l.counts.cloned += 1;
                false
            }
            None => {
                l.counts.cloned += 1;
                false
            }
        })
        .unwrap_or(false);
        if fail {
            panic!("injected clone failure (tag {TAG})");
        }
        Self { value: self.value }
    }
}

impl<const TAG: usize> Default for Counted<TAG> {
    fn default() -> Self {
        with_ledger(TAG, |l| l.counts.defaulted += 1);
        Self { value: 0 }
    }
}

impl<const TAG: usize> Drop for Counted<TAG> {
    fn drop(&mut self) {
        with_ledger(TAG, |l| l.counts.dropped += 1);
    }
}

impl<const TAG: usize> PartialEq for Counted<TAG> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<const TAG: usize> Eq for Counted<TAG> {}

impl<const TAG: usize> fmt::Debug for Counted<TAG> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Counted<{TAG}>({})", self.value)
    }
}

/// Error produced by a constructor told to fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Injected {
    pub reason: &'static str,
}

impl Injected {
    pub fn new(reason: &'static str) -> Self {
        Self { reason }
    }
}

impl fmt::Display for Injected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "injected failure: {}", self.reason)
    }
}

impl Error for Injected {}
