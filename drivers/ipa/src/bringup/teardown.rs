//! # Teardown Chain
//!
//! A LIFO stack of release actions, one per acquired resource. Unwinding
//! pops and runs them newest first; dropping the chain unwinds whatever
//! is left, so an early return can never leak an acquisition. A single
//! [`Release`] is a guard in the same sense: it runs when dropped.
//!
//! ```text
//!   push(1) push(2) push(3)        unwind()
//!   ┌───┬───┬───┐                  3 ──▶ 2 ──▶ 1
//!   │ 1 │ 2 │ 3 │ ◀── top
//!   └───┴───┴───┘
//! ```

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

/// Release action for one acquired resource; runs at most once, on
/// [`TeardownChain`] unwind or when dropped
pub struct Release(Option<Box<dyn FnOnce() + Send>>);

impl Release {
    /// Nothing to undo
    pub fn none() -> Self {
        Self(None)
    }

    /// Undo with `f`
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(f)))
    }

    /// Whether running this does anything
    pub fn is_noop(&self) -> bool {
        self.0.is_none()
    }

    fn run(mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl Drop for Release {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl fmt::Debug for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_noop() { "Release(none)" } else { "Release(..)" })
    }
}

/// Release actions keyed by the step that acquired them
pub struct TeardownChain<S: Copy + fmt::Display> {
    entries: Vec<(S, Release)>,
    released: u32,
}

impl<S: Copy + PartialEq + fmt::Display> TeardownChain<S> {
    /// Empty chain
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            released: 0,
        }
    }

    /// Record the release action of a step that just succeeded
    pub fn push(&mut self, step: S, release: Release) {
        self.entries.push((step, release));
    }

    /// Run one step's release ahead of the rest.
    ///
    /// Returns `false` if the step has no entry.
    pub fn release(&mut self, step: S) -> bool {
        match self.entries.iter().position(|(s, _)| *s == step) {
            Some(at) => {
                let (_, release) = self.entries.remove(at);
                release.run();
                self.released += 1;
                true
            },
            None => false,
        }
    }

    /// Run every release action, newest first; returns the steps in the
    /// order they were undone
    pub fn unwind(&mut self) -> Vec<S> {
        let mut undone = Vec::with_capacity(self.entries.len());
        while let Some((step, release)) = self.entries.pop() {
            log::debug!("IPA: undo {}", step);
            release.run();
            self.released += 1;
            undone.push(step);
        }
        undone
    }

    /// Steps still holding a resource, oldest first
    pub fn steps(&self) -> impl Iterator<Item = S> + '_ {
        self.entries.iter().map(|(s, _)| *s)
    }

    /// Number of pending entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Release actions run so far
    pub fn released(&self) -> u32 {
        self.released
    }
}

impl<S: Copy + PartialEq + fmt::Display + Send + 'static> TeardownChain<S> {
    /// Fold the whole chain into a single release action, for steps with
    /// sub-steps of their own
    pub fn into_release(self) -> Release {
        if self.is_empty() {
            return Release::none();
        }
        let mut chain = self;
        Release::new(move || {
            chain.unwind();
        })
    }
}

impl<S: Copy + PartialEq + fmt::Display> Default for TeardownChain<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Copy + fmt::Display> Drop for TeardownChain<S> {
    fn drop(&mut self) {
        while let Some((step, release)) = self.entries.pop() {
            log::debug!("IPA: undo {} on drop", step);
            release.run();
        }
    }
}

impl<S: Copy + fmt::Display + fmt::Debug> fmt::Debug for TeardownChain<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter().map(|(s, _)| s)).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use spin::Mutex;
    use std::vec;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> Release) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let make = move |n: u32| {
            let sink = sink.clone();
            Release::new(move || sink.lock().push(n))
        };
        (log, make)
    }

    #[test]
    fn test_unwind_is_lifo() {
        let (log, make) = recorder();
        let mut chain = TeardownChain::new();
        for n in 1..=4u32 {
            chain.push(n, make(n));
        }

        assert_eq!(chain.unwind(), vec![4, 3, 2, 1]);
        assert_eq!(*log.lock(), vec![4, 3, 2, 1]);
        assert!(chain.is_empty());
        assert_eq!(chain.released(), 4);

        // Second unwind is a no-op
        assert!(chain.unwind().is_empty());
        assert_eq!(log.lock().len(), 4);
    }

    #[test]
    fn test_early_release_runs_once() {
        let (log, make) = recorder();
        let mut chain = TeardownChain::new();
        chain.push(1u32, make(1));
        chain.push(2, make(2));
        chain.push(3, make(3));

        assert!(chain.release(2));
        assert!(!chain.release(2));
        assert_eq!(chain.unwind(), vec![3, 1]);
        assert_eq!(*log.lock(), vec![2, 3, 1]);
    }

    #[test]
    fn test_drop_unwinds() {
        let (log, make) = recorder();
        {
            let mut chain = TeardownChain::new();
            chain.push(1u32, make(1));
            chain.push(2, Release::none());
            chain.push(3, make(3));
        }
        assert_eq!(*log.lock(), vec![3, 1]);
    }

    #[test]
    fn test_dropped_release_runs_once() {
        let (log, make) = recorder();
        let release = make(7);
        drop(release);
        assert_eq!(*log.lock(), vec![7]);
    }

    #[test]
    fn test_nested_chain_folds() {
        let (log, make) = recorder();
        let mut inner = TeardownChain::new();
        inner.push(10u32, make(10));
        inner.push(11, make(11));

        let mut outer = TeardownChain::new();
        outer.push(1u32, make(1));
        outer.push(2, inner.into_release());
        outer.unwind();

        assert_eq!(*log.lock(), vec![11, 10, 1]);
        assert!(TeardownChain::<u32>::new().into_release().is_noop());
    }
}
