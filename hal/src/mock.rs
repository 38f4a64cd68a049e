//! # Mock Platform
//!
//! A recording implementation of every HAL service, for tests.
//!
//! All services share one ordered journal of the calls that succeeded,
//! so a test can assert the exact acquire/release order across services.
//! Any fallible call site can be told to fail on its n-th invocation; a
//! failed call is not journaled and acquires nothing.
//!
//! ```text
//!   fail(Site::CacheCreate, 2, Error::OutOfMemory)
//!
//!   create_cache("IPA FLT")  -> Ok, journaled
//!   create_cache("IPA RT")   -> Err(OutOfMemory), not journaled
//! ```

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use ipa_core::caps::DmaPoolSpec;
use ipa_core::{Client, Error, IpFamily, Result, RuleHandle};
use spin::Mutex;

use crate::clock::{BusClient, BusScaling, Clock, ClockProvider};
use crate::memory::{CacheHandle, DmaPoolHandle, DmaRegion, KernelMemory, PipeMemHandle};
use crate::mmio::{IoMapper, RegisterWindow};
use crate::services::{
    CdevHandle, CharDevRegistry, ClassHandle, DevNumber, FilterMatch, HwController,
    InterruptController, ResourceManager, RuleEngine, SramBudget, TetherBridge,
};
use crate::transport::{BamHandle, BamProperties, ImmediateCommand, PipeConfig, PipeHandle, Transport};
use crate::Platform;

// =============================================================================
// JOURNAL
// =============================================================================

/// A successful service call
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Call {
    // Clocks and bus
    ClockGet(&'static str),
    ClockPut(&'static str),
    ClockPrepare(&'static str),
    ClockEnable(&'static str),
    ClockSetRate(&'static str, u64),
    ClockDisable(&'static str),
    ClockUnprepare(&'static str),
    BusRegister,
    BusVote(u32),
    BusUnregister,

    // Registers
    Map(u64),
    Unmap(u64),
    Write32 { base: u64, offset: u32, value: u32 },
    InitHw,

    // Transport
    BamRegister,
    BamDeregister,
    PipeConnect(Client),
    PipeDisconnect(Client),
    Immediate(ImmediateCommand),

    // Memory
    CacheCreate(&'static str),
    CacheDestroy(&'static str),
    DmaPoolCreate(&'static str),
    DmaPoolDestroy(&'static str),
    CoherentAlloc(usize),
    CoherentFree(usize),
    PipeMemCreate,
    PipeMemDestroy,

    // Rules
    HeaderAdd(String),
    HeaderDel(String),
    RouteAdd(IpFamily),
    RouteDel(IpFamily),
    RouteExceptions(Client),
    GlobalFilterAdd(IpFamily, FilterMatch),

    // Device node
    ClassCreate,
    ClassDestroy,
    RegionAlloc,
    RegionUnregister,
    NodeCreate,
    NodeDestroy,
    CdevAdd,
    CdevDel,

    // Misc
    RmInit,
    RmShutdown,
    IrqInit { irq: u32, ee: u32 },
    TetherInit,
    TetherShutdown,
}

/// Fallible call sites that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum Site {
    ClockGet,
    ClockPrepare,
    ClockEnable,
    ClockSetRate,
    BusRegister,
    BusVote,
    Map,
    InitHw,
    BamRegister,
    PipeConnect,
    Immediate,
    CacheCreate,
    DmaPoolCreate,
    CoherentAlloc,
    PipeMemCreate,
    HeaderAdd,
    RouteAdd,
    RouteExceptions,
    GlobalFilterAdd,
    ClassCreate,
    RegionAlloc,
    NodeCreate,
    CdevAdd,
    RmInit,
    IrqInit,
    TetherInit,
}

#[derive(Debug, Clone, Copy)]
struct Fault {
    site: Site,
    nth: u32,
    error: Error,
}

// Keys for live resources that have no handle of their own
const NODE_KEY: u32 = 0x8000_0000;
const RM_KEY: u32 = 0x8000_0001;
const TETHER_KEY: u32 = 0x8000_0002;

#[derive(Default)]
struct MockState {
    journal: Vec<Call>,
    faults: Vec<Fault>,
    hits: BTreeMap<Site, u32>,
    /// Acquired and not yet released, keyed by handle
    live: BTreeMap<u32, Call>,
    prepared: BTreeMap<&'static str, u32>,
    enabled: BTreeMap<&'static str, u32>,
    bus_level: u32,
    registers: BTreeMap<(u64, u32), u32>,
    sram: SramBudget,
}

impl MockState {
    fn check(&mut self, site: Site) -> Result<()> {
        let hit = self.hits.entry(site).or_insert(0);
        *hit += 1;
        let hit = *hit;
        match self.faults.iter().find(|f| f.site == site && f.nth == hit) {
            Some(fault) => Err(fault.error),
            None => Ok(()),
        }
    }

    fn acquire(&mut self, key: u32, call: Call) {
        self.journal.push(call.clone());
        self.live.insert(key, call);
    }

    fn release(&mut self, key: u32) -> Option<Call> {
        self.live.remove(&key)
    }
}

// =============================================================================
// MOCK PLATFORM
// =============================================================================

/// Recording mock of every platform service
#[derive(Clone)]
pub struct MockPlatform {
    state: Arc<Mutex<MockState>>,
    next_handle: Arc<AtomicU32>,
}

impl fmt::Debug for MockPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockPlatform")
            .field("calls", &state.journal.len())
            .field("live", &state.live.len())
            .finish()
    }
}

impl MockPlatform {
    /// Create a mock with a roomy on-chip memory budget
    pub fn new() -> Self {
        let state = MockState {
            sram: SramBudget {
                size: 0x4000,
                restricted: 0x800,
            },
            ..MockState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            next_handle: Arc::new(AtomicU32::new(1)),
        }
    }

    /// Bundle this mock as a `Platform`
    pub fn platform(&self) -> Platform {
        let this = Arc::new(self.clone());
        Platform {
            clocks: this.clone(),
            bus: this.clone(),
            io: this.clone(),
            controller: this.clone(),
            transport: this.clone(),
            memory: this.clone(),
            rules: this.clone(),
            chardev: this.clone(),
            resource_manager: this.clone(),
            interrupts: this.clone(),
            tether: this,
        }
    }

    /// Make the `nth` call (1-based) at `site` fail with `error`
    pub fn fail(&self, site: Site, nth: u32, error: Error) {
        self.state.lock().faults.push(Fault { site, nth, error });
    }

    /// Override the reported on-chip memory budget
    pub fn set_sram(&self, sram: SramBudget) {
        self.state.lock().sram = sram;
    }

    /// Every successful call so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().journal.clone()
    }

    /// Forget the journal, keeping live resources and faults
    pub fn clear_calls(&self) {
        self.state.lock().journal.clear();
    }

    /// Number of journaled calls equal to `call`
    pub fn count(&self, call: &Call) -> usize {
        self.state.lock().journal.iter().filter(|c| *c == call).count()
    }

    /// Position of the first journaled call equal to `call`
    pub fn position(&self, call: &Call) -> Option<usize> {
        self.state.lock().journal.iter().position(|c| c == call)
    }

    /// Acquisitions not yet released
    pub fn live(&self) -> Vec<Call> {
        self.state.lock().live.values().cloned().collect()
    }

    /// Clocks currently enabled
    pub fn enabled_clocks(&self) -> Vec<&'static str> {
        let state = self.state.lock();
        state.enabled.iter().filter(|(_, n)| **n > 0).map(|(name, _)| *name).collect()
    }

    /// Current bus vote level
    pub fn bus_level(&self) -> u32 {
        self.state.lock().bus_level
    }

    fn handle(&self) -> u32 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// CLOCKS AND BUS
// =============================================================================

struct MockClock {
    name: &'static str,
    state: Arc<Mutex<MockState>>,
}

impl Clock for MockClock {
    fn name(&self) -> &'static str {
        self.name
    }

    fn prepare(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.check(Site::ClockPrepare)?;
        *state.prepared.entry(self.name).or_insert(0) += 1;
        state.journal.push(Call::ClockPrepare(self.name));
        Ok(())
    }

    fn enable(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.check(Site::ClockEnable)?;
        *state.enabled.entry(self.name).or_insert(0) += 1;
        state.journal.push(Call::ClockEnable(self.name));
        Ok(())
    }

    fn set_rate(&self, hz: u64) -> Result<()> {
        let mut state = self.state.lock();
        state.check(Site::ClockSetRate)?;
        state.journal.push(Call::ClockSetRate(self.name, hz));
        Ok(())
    }

    fn disable(&self) {
        let mut state = self.state.lock();
        if let Some(n) = state.enabled.get_mut(self.name) {
            *n = n.saturating_sub(1);
        }
        state.journal.push(Call::ClockDisable(self.name));
    }

    fn unprepare(&self) {
        let mut state = self.state.lock();
        if let Some(n) = state.prepared.get_mut(self.name) {
            *n = n.saturating_sub(1);
        }
        state.journal.push(Call::ClockUnprepare(self.name));
    }
}

impl ClockProvider for MockPlatform {
    fn get(&self, name: &'static str) -> Result<Arc<dyn Clock>> {
        let key = self.handle();
        let mut state = self.state.lock();
        state.check(Site::ClockGet)?;
        state.acquire(key, Call::ClockGet(name));
        Ok(Arc::new(MockClock {
            name,
            state: self.state.clone(),
        }))
    }

    fn put(&self, clock: Arc<dyn Clock>) {
        let name = clock.name();
        let mut state = self.state.lock();
        let key = state
            .live
            .iter()
            .find(|(_, call)| **call == Call::ClockGet(name))
            .map(|(key, _)| *key);
        if let Some(key) = key {
            state.release(key);
        }
        state.journal.push(Call::ClockPut(name));
    }
}

impl BusScaling for MockPlatform {
    fn register(&self, _name: &'static str) -> Result<BusClient> {
        let key = self.handle();
        let mut state = self.state.lock();
        state.check(Site::BusRegister)?;
        state.acquire(key, Call::BusRegister);
        Ok(BusClient(key))
    }

    fn vote(&self, _client: BusClient, level: u32) -> Result<()> {
        let mut state = self.state.lock();
        state.check(Site::BusVote)?;
        state.bus_level = level;
        state.journal.push(Call::BusVote(level));
        Ok(())
    }

    fn unregister(&self, client: BusClient) {
        let mut state = self.state.lock();
        state.release(client.0);
        state.journal.push(Call::BusUnregister);
    }
}

// =============================================================================
// REGISTERS
// =============================================================================

struct MockWindow {
    base: u64,
    size: u64,
    state: Arc<Mutex<MockState>>,
}

impl RegisterWindow for MockWindow {
    fn base(&self) -> u64 {
        self.base
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn read32(&self, offset: u32) -> u32 {
        let state = self.state.lock();
        state.registers.get(&(self.base, offset)).copied().unwrap_or(0)
    }

    fn write32(&self, offset: u32, value: u32) {
        let mut state = self.state.lock();
        state.registers.insert((self.base, offset), value);
        state.journal.push(Call::Write32 {
            base: self.base,
            offset,
            value,
        });
    }
}

impl IoMapper for MockPlatform {
    fn map(&self, base: u64, size: u64) -> Result<Arc<dyn RegisterWindow>> {
        let key = self.handle();
        let mut state = self.state.lock();
        state.check(Site::Map)?;
        state.acquire(key, Call::Map(base));
        Ok(Arc::new(MockWindow {
            base,
            size,
            state: self.state.clone(),
        }))
    }

    fn unmap(&self, window: Arc<dyn RegisterWindow>) {
        let base = window.base();
        let mut state = self.state.lock();
        let key = state
            .live
            .iter()
            .find(|(_, call)| **call == Call::Map(base))
            .map(|(key, _)| *key);
        if let Some(key) = key {
            state.release(key);
        }
        state.journal.push(Call::Unmap(base));
    }
}

impl HwController for MockPlatform {
    fn init_hw(&self, _regs: &dyn RegisterWindow) -> Result<()> {
        let mut state = self.state.lock();
        state.check(Site::InitHw)?;
        state.journal.push(Call::InitHw);
        Ok(())
    }

    fn sram_budget(&self, _regs: &dyn RegisterWindow) -> SramBudget {
        self.state.lock().sram
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

impl Transport for MockPlatform {
    fn register_device(&self, _props: &BamProperties) -> Result<BamHandle> {
        let key = self.handle();
        let mut state = self.state.lock();
        state.check(Site::BamRegister)?;
        state.acquire(key, Call::BamRegister);
        Ok(BamHandle(key))
    }

    fn deregister_device(&self, handle: BamHandle) {
        let mut state = self.state.lock();
        state.release(handle.0);
        state.journal.push(Call::BamDeregister);
    }

    fn connect(&self, config: &PipeConfig) -> Result<PipeHandle> {
        let key = self.handle();
        let mut state = self.state.lock();
        state.check(Site::PipeConnect)?;
        state.acquire(key, Call::PipeConnect(config.client));
        Ok(PipeHandle(key))
    }

    fn disconnect(&self, pipe: PipeHandle) {
        let mut state = self.state.lock();
        if let Some(Call::PipeConnect(client)) = state.release(pipe.0) {
            state.journal.push(Call::PipeDisconnect(client));
        }
    }

    fn send_immediate(&self, command: ImmediateCommand) -> Result<()> {
        let mut state = self.state.lock();
        state.check(Site::Immediate)?;
        state.journal.push(Call::Immediate(command));
        Ok(())
    }
}

// =============================================================================
// MEMORY
// =============================================================================

impl KernelMemory for MockPlatform {
    fn create_cache(&self, name: &'static str, _object_size: usize) -> Result<CacheHandle> {
        let key = self.handle();
        let mut state = self.state.lock();
        state.check(Site::CacheCreate)?;
        state.acquire(key, Call::CacheCreate(name));
        Ok(CacheHandle(key))
    }

    fn destroy_cache(&self, cache: CacheHandle) {
        let mut state = self.state.lock();
        if let Some(Call::CacheCreate(name)) = state.release(cache.0) {
            state.journal.push(Call::CacheDestroy(name));
        }
    }

    fn create_dma_pool(&self, spec: &DmaPoolSpec) -> Result<DmaPoolHandle> {
        let key = self.handle();
        let mut state = self.state.lock();
        state.check(Site::DmaPoolCreate)?;
        state.acquire(key, Call::DmaPoolCreate(spec.name));
        Ok(DmaPoolHandle(key))
    }

    fn destroy_dma_pool(&self, pool: DmaPoolHandle) {
        let mut state = self.state.lock();
        if let Some(Call::DmaPoolCreate(name)) = state.release(pool.0) {
            state.journal.push(Call::DmaPoolDestroy(name));
        }
    }

    fn alloc_coherent(&self, size: usize) -> Result<DmaRegion> {
        let key = self.handle();
        let mut state = self.state.lock();
        state.check(Site::CoherentAlloc)?;
        state.acquire(key, Call::CoherentAlloc(size));
        Ok(DmaRegion {
            dma_addr: u64::from(key) << 12,
            size,
        })
    }

    fn free_coherent(&self, region: DmaRegion) {
        let mut state = self.state.lock();
        state.release((region.dma_addr >> 12) as u32);
        state.journal.push(Call::CoherentFree(region.size));
    }

    fn create_pipe_mem(&self, _base: u64, _size: u64) -> Result<PipeMemHandle> {
        let key = self.handle();
        let mut state = self.state.lock();
        state.check(Site::PipeMemCreate)?;
        state.acquire(key, Call::PipeMemCreate);
        Ok(PipeMemHandle(key))
    }

    fn destroy_pipe_mem(&self, pool: PipeMemHandle) {
        let mut state = self.state.lock();
        state.release(pool.0);
        state.journal.push(Call::PipeMemDestroy);
    }
}

// =============================================================================
// RULES
// =============================================================================

impl RuleEngine for MockPlatform {
    fn add_header(&self, name: &str, _len: u32) -> Result<RuleHandle> {
        let key = self.handle();
        let mut state = self.state.lock();
        state.check(Site::HeaderAdd)?;
        state.acquire(key, Call::HeaderAdd(name.to_string()));
        Ok(RuleHandle(key))
    }

    fn del_header(&self, header: RuleHandle) {
        let mut state = self.state.lock();
        if let Some(Call::HeaderAdd(name)) = state.release(header.0) {
            state.journal.push(Call::HeaderDel(name));
        }
    }

    fn add_route(
        &self,
        family: IpFamily,
        _table: &str,
        _dst: Client,
        _header: RuleHandle,
    ) -> Result<RuleHandle> {
        let key = self.handle();
        let mut state = self.state.lock();
        state.check(Site::RouteAdd)?;
        state.acquire(key, Call::RouteAdd(family));
        Ok(RuleHandle(key))
    }

    fn del_route(&self, rule: RuleHandle) {
        let mut state = self.state.lock();
        if let Some(Call::RouteAdd(family)) = state.release(rule.0) {
            state.journal.push(Call::RouteDel(family));
        }
    }

    fn route_exceptions(&self, dst: Client, _header: RuleHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.check(Site::RouteExceptions)?;
        state.journal.push(Call::RouteExceptions(dst));
        Ok(())
    }

    fn add_global_filter(
        &self,
        family: IpFamily,
        matches: FilterMatch,
        _table: &str,
    ) -> Result<RuleHandle> {
        let key = self.handle();
        let mut state = self.state.lock();
        state.check(Site::GlobalFilterAdd)?;
        state.journal.push(Call::GlobalFilterAdd(family, matches));
        Ok(RuleHandle(key))
    }
}

// =============================================================================
// DEVICE NODE AND MISC
// =============================================================================

impl CharDevRegistry for MockPlatform {
    fn create_class(&self, _name: &'static str) -> Result<ClassHandle> {
        let key = self.handle();
        let mut state = self.state.lock();
        state.check(Site::ClassCreate)?;
        state.acquire(key, Call::ClassCreate);
        Ok(ClassHandle(key))
    }

    fn destroy_class(&self, class: ClassHandle) {
        let mut state = self.state.lock();
        state.release(class.0);
        state.journal.push(Call::ClassDestroy);
    }

    fn alloc_region(&self, _name: &'static str, _count: u32) -> Result<DevNumber> {
        let key = self.handle();
        let mut state = self.state.lock();
        state.check(Site::RegionAlloc)?;
        state.acquire(key, Call::RegionAlloc);
        Ok(DevNumber { major: key, minor: 0 })
    }

    fn unregister_region(&self, dev: DevNumber, _count: u32) {
        let mut state = self.state.lock();
        state.release(dev.major);
        state.journal.push(Call::RegionUnregister);
    }

    fn create_node(&self, _class: ClassHandle, _dev: DevNumber, _name: &'static str) -> Result<()> {
        let mut state = self.state.lock();
        state.check(Site::NodeCreate)?;
        state.acquire(NODE_KEY, Call::NodeCreate);
        Ok(())
    }

    fn destroy_node(&self, _class: ClassHandle, _dev: DevNumber) {
        let mut state = self.state.lock();
        state.release(NODE_KEY);
        state.journal.push(Call::NodeDestroy);
    }

    fn add_cdev(&self, _dev: DevNumber, _count: u32) -> Result<CdevHandle> {
        let key = self.handle();
        let mut state = self.state.lock();
        state.check(Site::CdevAdd)?;
        state.acquire(key, Call::CdevAdd);
        Ok(CdevHandle(key))
    }

    fn del_cdev(&self, cdev: CdevHandle) {
        let mut state = self.state.lock();
        state.release(cdev.0);
        state.journal.push(Call::CdevDel);
    }
}

impl ResourceManager for MockPlatform {
    fn initialize(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.check(Site::RmInit)?;
        state.acquire(RM_KEY, Call::RmInit);
        Ok(())
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        state.release(RM_KEY);
        state.journal.push(Call::RmShutdown);
    }
}

impl InterruptController for MockPlatform {
    fn init(&self, irq: u32, ee: u32) -> Result<()> {
        let mut state = self.state.lock();
        state.check(Site::IrqInit)?;
        state.journal.push(Call::IrqInit { irq, ee });
        Ok(())
    }
}

impl TetherBridge for MockPlatform {
    fn init(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.check(Site::TetherInit)?;
        state.acquire(TETHER_KEY, Call::TetherInit);
        Ok(())
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        state.release(TETHER_KEY);
        state.journal.push(Call::TetherShutdown);
    }
}
