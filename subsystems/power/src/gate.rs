//! # Power Gate
//!
//! A reference count under a spinlock. The lock covers the count and the
//! hardware transition at a boundary crossing, never the work done while
//! the gate is held open.

use alloc::boxed::Box;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use ipa_core::{Error, Result};
use spin::Mutex;

// =============================================================================
// POWER SEQUENCE
// =============================================================================

/// The hardware side of the gate
pub trait PowerSequence: Send + Sync {
    /// Bring clocks and bus up. On error, anything this call enabled has
    /// already been undone.
    fn power_on(&self) -> Result<()>;

    /// Take clocks and bus down, in the reverse order of `power_on`
    fn power_off(&self);
}

// =============================================================================
// GATE
// =============================================================================

struct GateState {
    count: u32,
    powered: bool,
}

/// Transition counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GateStats {
    /// Successful power-on transitions
    pub enables: u32,
    /// Power-off transitions
    pub disables: u32,
    /// Power-on attempts that failed
    pub failed_enables: u32,
}

/// Reference-counted power gate
pub struct PowerGate {
    state: Mutex<GateState>,
    sequence: Box<dyn PowerSequence>,
    enables: AtomicU32,
    disables: AtomicU32,
    failed_enables: AtomicU32,
}

impl PowerGate {
    /// Create a gate; hardware starts unpowered
    pub fn new(sequence: Box<dyn PowerSequence>) -> Self {
        Self {
            state: Mutex::new(GateState {
                count: 0,
                powered: false,
            }),
            sequence,
            enables: AtomicU32::new(0),
            disables: AtomicU32::new(0),
            failed_enables: AtomicU32::new(0),
        }
    }

    /// Take a reference, powering the hardware up if it is down.
    ///
    /// The count is incremented even when power-on fails, so every call
    /// needs a matching [`release`](Self::release). An unpowered gate
    /// retries power-on at the next `acquire`.
    pub fn acquire(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.count = match state.count.checked_add(1) {
            Some(count) => count,
            None => panic!("IPA power gate reference count overflow"),
        };
        log::debug!("IPA: active clients = {}", state.count);

        if state.powered {
            return Ok(());
        }

        match self.sequence.power_on() {
            Ok(()) => {
                state.powered = true;
                self.enables.fetch_add(1, Ordering::Relaxed);
                log::info!("IPA: clocks enabled");
                Ok(())
            },
            Err(e) => {
                self.failed_enables.fetch_add(1, Ordering::Relaxed);
                log::error!("IPA: clock enable failed: {}", e);
                Err(Error::Sequencing)
            },
        }
    }

    /// Drop a reference, powering the hardware down on the last one.
    ///
    /// # Panics
    ///
    /// Releasing more references than were acquired is a contract
    /// violation and panics.
    pub fn release(&self) {
        let mut state = self.state.lock();
        if state.count == 0 {
            panic!("IPA power gate released more times than acquired");
        }
        state.count -= 1;
        log::debug!("IPA: active clients = {}", state.count);

        if state.count == 0 && state.powered {
            self.sequence.power_off();
            state.powered = false;
            self.disables.fetch_add(1, Ordering::Relaxed);
            log::info!("IPA: clocks disabled");
        }
    }

    /// Acquire and return a guard that releases on drop
    pub fn hold(&self) -> Result<PowerHold<'_>> {
        // Built before acquiring: a failed power-on still took a reference.
        let hold = PowerHold { gate: self };
        self.acquire()?;
        Ok(hold)
    }

    /// Current reference count
    pub fn count(&self) -> u32 {
        self.state.lock().count
    }

    /// Whether the hardware is currently powered
    pub fn is_powered(&self) -> bool {
        self.state.lock().powered
    }

    /// Transition counters
    pub fn stats(&self) -> GateStats {
        GateStats {
            enables: self.enables.load(Ordering::Relaxed),
            disables: self.disables.load(Ordering::Relaxed),
            failed_enables: self.failed_enables.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for PowerGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PowerGate")
            .field("count", &state.count)
            .field("powered", &state.powered)
            .finish()
    }
}

/// One reference on a [`PowerGate`], released on drop
#[must_use = "the gate is released as soon as the hold is dropped"]
pub struct PowerHold<'a> {
    gate: &'a PowerGate,
}

impl Drop for PowerHold<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

impl fmt::Debug for PowerHold<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PowerHold").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use core::sync::atomic::AtomicBool;
    use std::thread;
    use std::vec::Vec;

    #[derive(Default)]
    struct Counting {
        on: AtomicU32,
        off: AtomicU32,
        fail_next: AtomicBool,
        live: AtomicBool,
    }

    impl PowerSequence for Arc<Counting> {
        fn power_on(&self) -> Result<()> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(Error::Sequencing);
            }
            assert!(!self.live.swap(true, Ordering::SeqCst), "double enable");
            self.on.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn power_off(&self) {
            assert!(self.live.swap(false, Ordering::SeqCst), "double disable");
            self.off.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn gate() -> (PowerGate, Arc<Counting>) {
        let seq = Arc::new(Counting::default());
        (PowerGate::new(Box::new(seq.clone())), seq)
    }

    #[test]
    fn test_transitions_only_at_boundaries() {
        let (gate, seq) = gate();

        gate.acquire().unwrap();
        gate.acquire().unwrap();
        assert_eq!(seq.on.load(Ordering::SeqCst), 1);
        assert!(gate.is_powered());

        gate.release();
        assert!(gate.is_powered());
        assert_eq!(seq.off.load(Ordering::SeqCst), 0);

        gate.release();
        assert!(!gate.is_powered());
        assert_eq!(gate.count(), 0);
        assert_eq!(seq.off.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_enabled_iff_count_positive() {
        let (gate, _seq) = gate();
        let ops = [true, true, false, true, false, false, true, false];

        for acquire in ops {
            if acquire {
                gate.acquire().unwrap();
            } else {
                gate.release();
            }
            assert_eq!(gate.is_powered(), gate.count() > 0);
        }
        assert_eq!(gate.stats().enables, gate.stats().disables);
    }

    #[test]
    fn test_failed_enable_keeps_count() {
        let (gate, seq) = gate();
        seq.fail_next.store(true, Ordering::SeqCst);

        assert_eq!(gate.acquire(), Err(Error::Sequencing));
        assert_eq!(gate.count(), 1);
        assert!(!gate.is_powered());
        assert_eq!(gate.stats().failed_enables, 1);

        gate.release();
        assert_eq!(gate.count(), 0);
        assert_eq!(seq.off.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unpowered_gate_retries() {
        let (gate, seq) = gate();
        seq.fail_next.store(true, Ordering::SeqCst);

        assert!(gate.acquire().is_err());
        gate.acquire().unwrap();
        assert!(gate.is_powered());
        assert_eq!(gate.count(), 2);

        gate.release();
        gate.release();
        assert_eq!(seq.on.load(Ordering::SeqCst), 1);
        assert_eq!(seq.off.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_hold_releases_on_drop() {
        let (gate, _seq) = gate();
        {
            let _hold = gate.hold().unwrap();
            assert_eq!(gate.count(), 1);
        }
        assert_eq!(gate.count(), 0);
        assert!(!gate.is_powered());
    }

    #[test]
    fn test_failed_hold_releases() {
        let (gate, seq) = gate();
        seq.fail_next.store(true, Ordering::SeqCst);

        assert!(gate.hold().is_err());
        assert_eq!(gate.count(), 0);
    }

    #[test]
    #[should_panic(expected = "released more times than acquired")]
    fn test_extra_release_panics() {
        let (gate, _seq) = gate();
        gate.release();
    }

    #[test]
    fn test_two_threads_disable_once() {
        let (gate, seq) = gate();
        let gate = Arc::new(gate);

        gate.acquire().unwrap();
        let other = {
            let gate = gate.clone();
            thread::spawn(move || gate.acquire().unwrap())
        };
        other.join().unwrap();

        let other = {
            let gate = gate.clone();
            thread::spawn(move || gate.release())
        };
        gate.release();
        other.join().unwrap();

        assert_eq!(gate.count(), 0);
        assert_eq!(seq.on.load(Ordering::SeqCst), 1);
        assert_eq!(seq.off.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_churn() {
        let (gate, seq) = gate();
        let gate = Arc::new(gate);

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        gate.acquire().unwrap();
                        assert!(gate.is_powered());
                        gate.release();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(gate.count(), 0);
        assert!(!gate.is_powered());
        let (on, off) = (seq.on.load(Ordering::SeqCst), seq.off.load(Ordering::SeqCst));
        assert_eq!(on, off);
        assert_eq!(gate.stats().enables, on);
    }
}
