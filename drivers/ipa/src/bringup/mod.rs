//! # Bring-up Orchestrator
//!
//! Seventeen steps, each recording its release action as it commits.
//! A failure at step k unwinds steps k-1..1 in reverse; whatever step k
//! had half-acquired is undone by the step itself.
//!
//! ```text
//!  Context ─▶ BusClient ─▶ ClockHandles ─▶ PowerHold ─▶ RegisterMap
//!     ─▶ HardwareInit ─▶ Transport ─▶ Pools ─▶ Tables ─▶ EmptyTable
//!     ─▶ Endpoints ─▶ FilterWorkaround ─▶ PipeMemory ─▶ DeviceNode
//!     ─▶ ResourceManager ─▶ Interrupts ─▶ TetherBridge ─▶ Ready
//! ```
//!
//! At `Ready` the bring-up power hold is dropped; every other entry stays
//! on the chain until the device is shut down.

pub mod devnode;
pub mod pipes;
pub mod pools;
pub mod step;
pub mod tables;
pub mod teardown;

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use ipa_core::{
    DriverFlags, Error, HwCapabilities, IpFamily, PlatformResources, DRV_NAME, NUM_PIPES,
};
use ipa_hal::{BamProperties, DevNumber, DmaRegion, FilterMatch, Platform, SramBudget};
use ipa_power::{ClockHandles, ClockTree, PowerGate};

pub use pipes::{SystemPipes, DEFAULT_ROUTE_TABLE};
pub use pools::{ObjectKind, PoolSet};
pub use step::BringupStep;
pub use tables::{Endpoint, EndpointTable, HandleKind, HandleRegistry, Tables};
pub use teardown::{Release, TeardownChain};

/// Transport summing and event thresholds
const BAM_THRESHOLD: u32 = 0x10;

/// Offset of the transport configuration-bits register
const BAM_CNFG_BITS: u32 = 0x7c;

/// Size of the zeroed placeholder table
const EMPTY_TABLE_LEN: usize = 4;

/// Filter match that no real packet carries
const DUMMY_PROTOCOL: u8 = 0xFF;

// =============================================================================
// CONTEXT
// =============================================================================

/// Everything bring-up produced that the running device reads
#[derive(Debug)]
pub struct DeviceContext {
    /// Attach descriptor
    pub resources: PlatformResources,
    /// Bound capability table
    pub caps: HwCapabilities,
    /// Power gate
    pub gate: Arc<PowerGate>,
    /// On-chip memory budget
    pub sram: SramBudget,
    /// Object pools
    pub pools: PoolSet,
    /// Endpoints and handles
    pub tables: Arc<Tables>,
    /// Placeholder table
    pub empty_table: DmaRegion,
    /// Device node number
    pub dev: DevNumber,
}

// =============================================================================
// FAILURE
// =============================================================================

/// A bring-up that did not reach `Ready`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BringupFailure {
    /// Step that failed
    pub step: BringupStep,
    /// Why it failed
    pub error: Error,
    /// Steps undone, in the order they were undone
    pub unwound: Vec<BringupStep>,
}

impl fmt::Display for BringupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bring-up failed at {}: {} ({} steps unwound)",
            self.step,
            self.error,
            self.unwound.len()
        )
    }
}

impl From<BringupFailure> for Error {
    fn from(failure: BringupFailure) -> Self {
        failure.error
    }
}

type StepResult<T> = core::result::Result<T, (BringupStep, Error)>;

fn at(step: BringupStep) -> impl FnOnce(Error) -> (BringupStep, Error) {
    move |e| (step, e)
}

fn fail(step: BringupStep, mapped: Error) -> impl FnOnce(Error) -> (BringupStep, Error) {
    move |e| {
        log::error!("IPA: {}: {}", step, e);
        (step, mapped)
    }
}

// =============================================================================
// ORCHESTRATOR
// =============================================================================

/// Runs bring-up once for one device
pub struct Orchestrator {
    resources: PlatformResources,
    platform: Platform,
    chain: TeardownChain<BringupStep>,
}

impl Orchestrator {
    /// Prepare bring-up of the device described by `resources`
    pub fn new(resources: PlatformResources, platform: Platform) -> Self {
        Self {
            resources,
            platform,
            chain: TeardownChain::new(),
        }
    }

    /// Run every step.
    ///
    /// On success returns the context and the chain holding every
    /// remaining release action. On failure everything acquired has
    /// been released.
    pub fn run(
        mut self,
    ) -> core::result::Result<(DeviceContext, TeardownChain<BringupStep>), BringupFailure> {
        match self.bring_up() {
            Ok(ctx) => {
                self.chain.release(BringupStep::PowerHold);
                log::info!("IPA: {} ready ({})", DRV_NAME, ctx.caps.version);
                Ok((ctx, core::mem::take(&mut self.chain)))
            },
            Err((step, error)) => {
                log::error!("IPA: {} failed: {}", step, error);
                let unwound = self.chain.unwind();
                for step in &unwound {
                    log::warn!("IPA: unwound {}", step);
                }
                Err(BringupFailure {
                    step,
                    error,
                    unwound,
                })
            },
        }
    }

    fn commit(&mut self, step: BringupStep, release: Release) {
        log::info!("IPA: {} done", step);
        self.chain.push(step, release);
    }

    fn bring_up(&mut self) -> StepResult<DeviceContext> {
        use BringupStep as Step;

        let r = self.resources;
        let p = self.platform.clone();

        // 1
        let caps = HwCapabilities::bind(r.hw_version).map_err(at(Step::Context))?;
        self.commit(Step::Context, Release::none());

        // 2
        let bus_client = p.bus.register(DRV_NAME).map_err(fail(Step::BusClient, Error::NoDevice))?;
        let bus = p.bus.clone();
        self.commit(Step::BusClient, Release::new(move || bus.unregister(bus_client)));

        // 3
        let handles = ClockHandles::get(&*p.clocks, caps.version).map_err(at(Step::ClockHandles))?;
        let (clocks, held) = (p.clocks.clone(), handles.clone());
        self.commit(Step::ClockHandles, Release::new(move || held.put(&*clocks)));

        // 4
        let tree = ClockTree::new(&handles, &caps, r.hw_mode, p.bus.clone(), bus_client)
            .map_err(at(Step::PowerHold))?;
        let gate = Arc::new(PowerGate::new(Box::new(tree)));
        if let Err(e) = gate.acquire() {
            gate.release();
            return Err((Step::PowerHold, e));
        }
        let held = gate.clone();
        self.commit(Step::PowerHold, Release::new(move || held.release()));

        // 5
        let regs = p
            .io
            .map(r.ipa_regs.base, r.ipa_regs.size)
            .map_err(fail(Step::RegisterMap, Error::MappingFailed))?;
        let (io, window) = (p.io.clone(), regs.clone());
        self.commit(Step::RegisterMap, Release::new(move || io.unmap(window)));

        // 6
        p.controller
            .init_hw(&*regs)
            .map_err(fail(Step::HardwareInit, Error::NoDevice))?;
        let sram = p.controller.sram_budget(&*regs);
        if caps.sram_required > sram.available() {
            log::error!(
                "IPA: on-chip memory too small: need {:#x}, have {:#x}",
                caps.sram_required,
                sram.available()
            );
            return Err((Step::HardwareInit, Error::OutOfMemory));
        }
        self.commit(Step::HardwareInit, Release::none());

        // 7
        let bam = p
            .transport
            .register_device(&BamProperties {
                phys_addr: r.bam_regs.base,
                virt_size: r.bam_regs.size,
                irq: r.bam_irq,
                num_pipes: NUM_PIPES as u32,
                summing_threshold: BAM_THRESHOLD,
                event_threshold: BAM_THRESHOLD,
                ee: r.ee,
            })
            .map_err(fail(Step::Transport, Error::ProbeDeferred))?;
        let transport = p.transport.clone();
        let registration = Release::new(move || transport.deregister_device(bam));
        match p.io.map(r.bam_regs.base, r.bam_regs.size) {
            Ok(window) => {
                window.write32(BAM_CNFG_BITS, caps.bam_cfg_bits);
                p.io.unmap(window);
            },
            Err(e) => {
                // Dropping the registration deregisters
                drop(registration);
                return Err(fail(Step::Transport, Error::NoDevice)(e));
            },
        }
        self.commit(Step::Transport, registration);

        // 8
        let (pools, release) = PoolSet::create(&p.memory, &caps).map_err(at(Step::Pools))?;
        self.commit(Step::Pools, release);

        // 9
        let tables = Arc::new(Tables::new());
        self.commit(Step::Tables, Release::none());

        // 10
        let empty_table = p
            .memory
            .alloc_coherent(EMPTY_TABLE_LEN)
            .map_err(fail(Step::EmptyTable, Error::OutOfMemory))?;
        let memory = p.memory.clone();
        self.commit(Step::EmptyTable, Release::new(move || memory.free_coherent(empty_table)));

        // 11
        let release = SystemPipes {
            transport: &p.transport,
            rules: &p.rules,
            caps: &caps,
            sram,
            tables: &tables,
        }
        .setup()
        .map_err(at(Step::Endpoints))?;
        self.commit(Step::Endpoints, release);

        // 12
        for family in IpFamily::ALL {
            let matches = match family {
                IpFamily::V4 => FilterMatch::Protocol(DUMMY_PROTOCOL),
                IpFamily::V6 => FilterMatch::NextHeader(DUMMY_PROTOCOL),
            };
            let rule = p
                .rules
                .add_global_filter(family, matches, DEFAULT_ROUTE_TABLE)
                .map_err(fail(Step::FilterWorkaround, Error::NoDevice))?;
            tables.handles.insert(rule, HandleKind::Filter(family));
        }
        self.commit(Step::FilterWorkaround, Release::none());

        // 13
        if r.pipe_mem.is_empty() {
            self.commit(Step::PipeMemory, Release::none());
        } else {
            let pool = p
                .memory
                .create_pipe_mem(r.pipe_mem.base, r.pipe_mem.size)
                .map_err(fail(Step::PipeMemory, Error::OutOfMemory))?;
            let memory = p.memory.clone();
            self.commit(Step::PipeMemory, Release::new(move || memory.destroy_pipe_mem(pool)));
        }

        // 14
        let (dev, release) = devnode::create(&p.chardev).map_err(at(Step::DeviceNode))?;
        self.commit(Step::DeviceNode, release);

        // 15
        p.resource_manager
            .initialize()
            .map_err(fail(Step::ResourceManager, Error::NoDevice))?;
        let rm = p.resource_manager.clone();
        self.commit(Step::ResourceManager, Release::new(move || rm.shutdown()));

        // 16
        p.interrupts
            .init(r.ipa_irq, r.ee)
            .map_err(fail(Step::Interrupts, Error::NoDevice))?;
        self.commit(Step::Interrupts, Release::none());

        // 17
        if r.flags.contains(DriverFlags::TETHER_BRIDGE) {
            p.tether.init().map_err(fail(Step::TetherBridge, Error::NoDevice))?;
            let tether = p.tether.clone();
            self.commit(Step::TetherBridge, Release::new(move || tether.shutdown()));
        } else {
            self.commit(Step::TetherBridge, Release::none());
        }

        Ok(DeviceContext {
            resources: r,
            caps,
            gate,
            sram,
            pools,
            tables,
            empty_table,
            dev,
        })
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("resources", &self.resources)
            .field("committed", &self.chain)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipa_core::{HwMode, MemRegion};
    use ipa_hal::mock::{Call, MockPlatform, Site};
    use std::vec;

    const IPA_BASE: u64 = 0xfd4c_0000;
    const BAM_BASE: u64 = 0xfd4c_4000;

    fn resources(version: u32) -> PlatformResources {
        PlatformResources::new(
            MemRegion::new(IPA_BASE, 0x4000),
            MemRegion::new(BAM_BASE, 0x1_0000),
            version,
        )
        .with_irqs(29, 28)
    }

    type Attached = (DeviceContext, TeardownChain<BringupStep>);

    fn run(mock: &MockPlatform, res: PlatformResources) -> core::result::Result<Attached, BringupFailure> {
        Orchestrator::new(res, mock.platform()).run()
    }

    fn descending(n: usize) -> Vec<BringupStep> {
        (1..n).rev().filter_map(BringupStep::from_index).collect()
    }

    #[test]
    fn test_full_bringup() {
        let mock = MockPlatform::new();
        let (ctx, chain) = run(&mock, resources(3)).unwrap();

        // Power hold dropped at Ready; everything else pending
        assert_eq!(chain.len(), 16);
        assert!(!chain.steps().any(|s| s == BringupStep::PowerHold));
        assert_eq!(ctx.gate.count(), 0);
        assert!(!ctx.gate.is_powered());
        assert!(mock.enabled_clocks().is_empty());

        assert_eq!(ctx.tables.endpoints.connected(), 3);
        assert!(ctx.pools.cache(ObjectKind::Header).is_some());
        assert_eq!(mock.count(&Call::TetherInit), 0);
        assert!(mock.calls().contains(&Call::Write32 {
            base: BAM_BASE,
            offset: BAM_CNFG_BITS,
            value: 0xFFFF_E004,
        }));
        assert!(mock.calls().contains(&Call::IrqInit { irq: 29, ee: 0 }));
    }

    #[test]
    fn test_power_hold_spans_bringup() {
        let mock = MockPlatform::new();
        let (_ctx, _chain) = run(&mock, resources(1)).unwrap();

        let on = mock.position(&Call::BusVote(1)).unwrap();
        let off = mock.position(&Call::BusVote(0)).unwrap();
        let first_map = mock.position(&Call::Map(IPA_BASE)).unwrap();
        let irq = mock.position(&Call::IrqInit { irq: 29, ee: 0 }).unwrap();
        assert!(on < first_map);
        assert!(irq < off);
        assert_eq!(mock.bus_level(), 0);
    }

    #[test]
    fn test_failure_at_every_step_is_symmetric() {
        let sites = [
            (2, Site::BusRegister, Error::NoDevice),
            (3, Site::ClockGet, Error::NoDevice),
            (4, Site::ClockEnable, Error::Sequencing),
            (5, Site::Map, Error::MappingFailed),
            (6, Site::InitHw, Error::NoDevice),
            (7, Site::BamRegister, Error::ProbeDeferred),
            (8, Site::CacheCreate, Error::OutOfMemory),
            (10, Site::CoherentAlloc, Error::OutOfMemory),
            (11, Site::PipeConnect, Error::NoDevice),
            (12, Site::GlobalFilterAdd, Error::NoDevice),
            (13, Site::PipeMemCreate, Error::OutOfMemory),
            (14, Site::ClassCreate, Error::NoDevice),
            (15, Site::RmInit, Error::NoDevice),
            (16, Site::IrqInit, Error::NoDevice),
            (17, Site::TetherInit, Error::NoDevice),
        ];

        for (index, site, expected) in sites {
            let mock = MockPlatform::new();
            mock.fail(site, 1, Error::InvalidArgument);
            let res = resources(3)
                .with_pipe_mem(MemRegion::new(0x7000_0000, 0x1000))
                .with_flags(DriverFlags::TETHER_BRIDGE);

            let failure = run(&mock, res).map(|_| ()).unwrap_err();
            assert_eq!(failure.step.index(), index, "{:?}", site);
            assert_eq!(failure.error, expected, "{:?}", site);
            assert_eq!(failure.unwound, descending(index), "{:?}", site);
            assert!(mock.live().is_empty(), "{:?} leaked {:?}", site, mock.live());
            assert!(mock.enabled_clocks().is_empty(), "{:?}", site);
        }
    }

    #[test]
    fn test_unsupported_version_fails_first_step() {
        let mock = MockPlatform::new();
        let failure = run(&mock, resources(7)).map(|_| ()).unwrap_err();

        assert_eq!(failure.step, BringupStep::Context);
        assert_eq!(failure.error, Error::UnsupportedHardware);
        assert!(failure.unwound.is_empty());
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_second_pool_failure() {
        let mock = MockPlatform::new();
        mock.fail(Site::CacheCreate, 2, Error::OutOfMemory);

        let failure = run(&mock, resources(3)).map(|_| ()).unwrap_err();
        assert_eq!(failure.step, BringupStep::Pools);
        assert_eq!(failure.unwound, descending(8));

        assert_eq!(mock.count(&Call::CacheCreate("IPA FLT")), 1);
        assert_eq!(mock.count(&Call::CacheDestroy("IPA FLT")), 1);
        for kind in &ObjectKind::ALL[1..] {
            assert_eq!(mock.count(&Call::CacheCreate(kind.cache_name())), 0);
            assert_eq!(mock.count(&Call::CacheDestroy(kind.cache_name())), 0);
        }
        // Pool 1 goes before anything step 7 acquired
        let pool = mock.position(&Call::CacheDestroy("IPA FLT")).unwrap();
        let bam = mock.position(&Call::BamDeregister).unwrap();
        assert!(pool < bam);
        assert!(mock.live().is_empty());
    }

    #[test]
    fn test_sram_too_small() {
        let mock = MockPlatform::new();
        mock.set_sram(SramBudget {
            size: 0x1000,
            restricted: 0x800,
        });

        let failure = run(&mock, resources(3)).map(|_| ()).unwrap_err();
        assert_eq!(failure.step, BringupStep::HardwareInit);
        assert_eq!(failure.error, Error::OutOfMemory);
        assert!(mock.live().is_empty());
    }

    #[test]
    fn test_bam_window_failure_deregisters() {
        let mock = MockPlatform::new();
        // First map is the IPA window, second the BAM window
        mock.fail(Site::Map, 2, Error::OutOfMemory);

        let failure = run(&mock, resources(1)).map(|_| ()).unwrap_err();
        assert_eq!(failure.step, BringupStep::Transport);
        assert_eq!(failure.error, Error::NoDevice);
        assert_eq!(mock.count(&Call::BamDeregister), 1);
        assert_eq!(failure.unwound, descending(7));
        assert!(mock.live().is_empty());
    }

    #[test]
    fn test_virtual_mode_skips_clocks() {
        let mock = MockPlatform::new();
        let (ctx, _chain) = run(&mock, resources(3).with_mode(HwMode::Virtual)).unwrap();

        assert!(!mock.calls().iter().any(|c| matches!(c, Call::ClockEnable(_))));
        assert_eq!(ctx.gate.stats().enables, 1);
    }

    #[test]
    fn test_failure_display() {
        let failure = BringupFailure {
            step: BringupStep::Pools,
            error: Error::OutOfMemory,
            unwound: vec![BringupStep::Transport],
        };
        let text = std::format!("{}", failure);
        assert!(text.contains("step 8 (pools)"));
        assert_eq!(Error::from(failure), Error::OutOfMemory);
    }
}
