//! # Clock Tree
//!
//! Clock handles per hardware generation, and the enable/disable order
//! the generation needs. Second-generation parts gate a single core
//! clock; first-generation parts also gate the interface, source, bus and
//! inactivity clocks.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use ipa_core::{HwCapabilities, HwMode, HwVersion, Result};
use ipa_hal::{BusClient, BusScaling, Clock, ClockProvider};

use crate::gate::PowerSequence;

/// Interface clock rate on first-generation parts
pub const CNOC_CLK_RATE: u64 = 75_000_000;

/// Bus vote level while powered
const BUS_LEVEL_ACTIVE: u32 = 1;

const CORE_CLK: &str = "core_clk";
const IFACE_CLK: &str = "iface_clk";
const CORE_SRC_CLK: &str = "core_src_clk";
const BUS_CLK: &str = "bus_clk";
const INACTIVITY_CLK: &str = "inactivity_clk";

const V1_CLOCKS: [&str; 5] = [CORE_CLK, IFACE_CLK, CORE_SRC_CLK, BUS_CLK, INACTIVITY_CLK];
const V2_CLOCKS: [&str; 1] = [CORE_CLK];

// =============================================================================
// HANDLES
// =============================================================================

/// Clock handles obtained at attach
#[derive(Clone)]
pub struct ClockHandles {
    version: HwVersion,
    clocks: Vec<Arc<dyn Clock>>,
}

impl ClockHandles {
    /// Obtain every clock the generation needs.
    ///
    /// A missing clock fails with `NoDevice`; handles already obtained are
    /// put back first.
    pub fn get(provider: &dyn ClockProvider, version: HwVersion) -> Result<Self> {
        let names: &[&'static str] = if version.is_v1() { &V1_CLOCKS } else { &V2_CLOCKS };
        let mut clocks = Vec::with_capacity(names.len());

        for &name in names {
            match provider.get(name) {
                Ok(clock) => clocks.push(clock),
                Err(e) => {
                    log::error!("IPA: failed to get {}: {}", name, e);
                    for clock in clocks.drain(..).rev() {
                        provider.put(clock);
                    }
                    return Err(ipa_core::Error::NoDevice);
                },
            }
        }

        Ok(Self { version, clocks })
    }

    /// Return every handle to the provider, in reverse order of `get`
    pub fn put(self, provider: &dyn ClockProvider) {
        for clock in self.clocks.into_iter().rev() {
            provider.put(clock);
        }
    }

    fn named(&self, name: &str) -> Option<&Arc<dyn Clock>> {
        self.clocks.iter().find(|c| c.name() == name)
    }
}

impl fmt::Debug for ClockHandles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.clocks.iter().map(|c| c.name())).finish()
    }
}

// =============================================================================
// SEQUENCE
// =============================================================================

#[derive(Clone, Copy)]
enum ClockOp {
    Prepare,
    Enable,
    SetRate(u64),
}

/// Hardware power sequence: clocks in generation order, then the bus vote
pub struct ClockTree {
    ops: Vec<(Arc<dyn Clock>, ClockOp)>,
    bus: Arc<dyn BusScaling>,
    bus_client: BusClient,
    mode: HwMode,
}

impl ClockTree {
    /// Build the sequence for the bound generation
    pub fn new(
        handles: &ClockHandles,
        caps: &HwCapabilities,
        mode: HwMode,
        bus: Arc<dyn BusScaling>,
        bus_client: BusClient,
    ) -> Result<Self> {
        let plan: &[(&str, ClockOp)] = if handles.version.is_v1() {
            &[
                (IFACE_CLK, ClockOp::Prepare),
                (IFACE_CLK, ClockOp::Enable),
                (IFACE_CLK, ClockOp::SetRate(CNOC_CLK_RATE)),
                (CORE_SRC_CLK, ClockOp::SetRate(caps.clock_rate_hz)),
                (CORE_CLK, ClockOp::Prepare),
                (BUS_CLK, ClockOp::Prepare),
                (INACTIVITY_CLK, ClockOp::Prepare),
                (CORE_CLK, ClockOp::Enable),
                (BUS_CLK, ClockOp::Enable),
                (INACTIVITY_CLK, ClockOp::Enable),
            ]
        } else {
            &[
                (CORE_CLK, ClockOp::Prepare),
                (CORE_CLK, ClockOp::Enable),
                (CORE_CLK, ClockOp::SetRate(caps.clock_rate_hz)),
            ]
        };

        let mut ops = Vec::with_capacity(plan.len());
        for (name, op) in plan {
            let clock = handles.named(name).ok_or(ipa_core::Error::NoDevice)?;
            ops.push((clock.clone(), *op));
        }

        Ok(Self {
            ops,
            bus,
            bus_client,
            mode,
        })
    }

    fn undo(&self, done: usize) {
        for (clock, op) in self.ops[..done].iter().rev() {
            match op {
                ClockOp::Enable => clock.disable(),
                ClockOp::Prepare => clock.unprepare(),
                ClockOp::SetRate(_) => {},
            }
        }
    }
}

impl PowerSequence for ClockTree {
    fn power_on(&self) -> Result<()> {
        if !self.mode.manages_clocks() {
            return Ok(());
        }

        for (done, (clock, op)) in self.ops.iter().enumerate() {
            let step = match op {
                ClockOp::Prepare => clock.prepare(),
                ClockOp::Enable => clock.enable(),
                ClockOp::SetRate(hz) => clock.set_rate(*hz),
            };
            if let Err(e) = step {
                log::error!("IPA: {} sequencing failed: {}", clock.name(), e);
                self.undo(done);
                return Err(e);
            }
        }

        if let Err(e) = self.bus.vote(self.bus_client, BUS_LEVEL_ACTIVE) {
            log::error!("IPA: bus vote failed: {}", e);
            self.undo(self.ops.len());
            return Err(e);
        }
        Ok(())
    }

    fn power_off(&self) {
        if !self.mode.manages_clocks() {
            return;
        }

        if let Err(e) = self.bus.vote(self.bus_client, 0) {
            log::warn!("IPA: bus unvote failed: {}", e);
        }
        self.undo(self.ops.len());
    }
}

impl fmt::Debug for ClockTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClockTree")
            .field("steps", &self.ops.len())
            .field("mode", &self.mode)
            .finish()
    }
}
