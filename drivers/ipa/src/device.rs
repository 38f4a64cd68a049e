//! # Device Node
//!
//! Attach entry point, the live device, and the sessions opened on its
//! node. A session is bound to the one device context; every control
//! call on it goes through the device's decoder.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use ipa_core::{
    A2Direction, A2PipeConnection, Client, DriverFlags, Error, MemRegion, PlatformResources,
    Result, DRV_NAME,
};
use ipa_hal::Platform;
use ipa_power::PowerGate;
use spin::RwLock;

use crate::bringup::{
    BringupFailure, BringupStep, DeviceContext, Endpoint, Orchestrator, TeardownChain,
};
use crate::control::{ControlDecoder, ControlHandler, DecoderStats, UserMemory};

// =============================================================================
// DRIVER
// =============================================================================

/// Driver identification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverInfo {
    /// Driver name
    pub name: &'static str,
    /// Driver version
    pub version: &'static str,
    /// Description
    pub description: &'static str,
    /// Device-tree compatible strings served
    pub compatible: &'static [&'static str],
}

/// The IPA driver
pub struct IpaDriver {
    info: DriverInfo,
    platform: Platform,
    handler: Arc<dyn ControlHandler>,
}

impl IpaDriver {
    /// Create the driver over the platform services and the request
    /// handler that backs the control node
    pub fn new(platform: Platform, handler: Arc<dyn ControlHandler>) -> Self {
        Self {
            info: DriverInfo {
                name: DRV_NAME,
                version: env!("CARGO_PKG_VERSION"),
                description: "IPA packet-offload accelerator",
                compatible: &["qcom,ipa"],
            },
            platform,
            handler,
        }
    }

    /// Driver identification
    pub fn info(&self) -> &DriverInfo {
        &self.info
    }

    /// Whether a device-tree node with `compatible` is served
    pub fn matches(&self, compatible: &str) -> bool {
        self.info.compatible.contains(&compatible)
    }

    /// Bring up the device described by `resources`
    pub fn probe(&self, resources: PlatformResources) -> core::result::Result<Device, BringupFailure> {
        if let Err(error) = resources.validate() {
            log::error!("IPA: bad attach resources: {}", error);
            return Err(BringupFailure {
                step: BringupStep::Context,
                error,
                unwound: Vec::new(),
            });
        }

        let (ctx, chain) = Orchestrator::new(resources, self.platform.clone()).run()?;
        let decoder = ControlDecoder::new(ctx.gate.clone(), self.handler.clone());
        Ok(Device {
            shared: Arc::new(Shared {
                ctx,
                decoder,
                live: RwLock::new(true),
            }),
            chain,
        })
    }
}

impl fmt::Debug for IpaDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpaDriver").field("info", &self.info).finish()
    }
}

// =============================================================================
// DEVICE
// =============================================================================

struct Shared {
    ctx: DeviceContext,
    decoder: ControlDecoder,
    /// Requests hold this for read across dispatch; detach takes it for
    /// write before anything is released.
    live: RwLock<bool>,
}

impl Shared {
    fn retire(&self) {
        *self.live.write() = false;
    }
}

/// A device that completed bring-up
///
/// Dropping the device detaches it just like [`Device::shutdown`].
pub struct Device {
    shared: Arc<Shared>,
    chain: TeardownChain<BringupStep>,
}

impl Device {
    /// Open a session on the device node
    pub fn open(&self) -> Session {
        Session {
            shared: self.shared.clone(),
        }
    }

    /// Bring-up results
    pub fn context(&self) -> &DeviceContext {
        &self.shared.ctx
    }

    /// Power gate shared by every request
    pub fn gate(&self) -> &Arc<PowerGate> {
        &self.shared.ctx.gate
    }

    /// Connected system endpoint for `client`
    pub fn endpoint(&self, client: Client) -> Option<Endpoint> {
        self.shared.ctx.tables.endpoints.lookup(client)
    }

    /// Decoder counters
    pub fn stats(&self) -> DecoderStats {
        self.shared.decoder.stats()
    }

    /// Whether the A2 bridge is routed through BAM-DMA
    pub fn uses_bamdma_a2_bridge(&self) -> bool {
        self.shared
            .ctx
            .resources
            .flags
            .contains(DriverFlags::BAMDMA_A2_BRIDGE)
    }

    /// A2 mux pipe connection for `dir`, for the A2 mux driver
    pub fn a2_mux_pipe(&self, dir: A2Direction) -> Result<A2PipeConnection> {
        match self.shared.ctx.resources.a2_service() {
            Some(a2) => Ok(*a2.pipe(dir)),
            None => Err(Error::NoDevice),
        }
    }

    /// A2 BAM register window and interrupt line
    pub fn a2_mux_bam(&self) -> Result<(MemRegion, u32)> {
        match self.shared.ctx.resources.a2_service() {
            Some(a2) => Ok((a2.bam_regs, a2.bam_irq)),
            None => Err(Error::NoDevice),
        }
    }

    /// Tear the device down; returns the steps undone, in order.
    ///
    /// Waits for requests already running to finish. Sessions still open
    /// afterwards fail every call with `NoDevice`.
    pub fn shutdown(mut self) -> Vec<BringupStep> {
        self.shared.retire();
        let undone = self.chain.unwind();
        log::info!("IPA: shut down, {} steps undone", undone.len());
        undone
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // The chain unwinds after this returns
        self.shared.retire();
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("dev", &self.shared.ctx.dev)
            .field("version", &self.shared.ctx.caps.version)
            .field("steps", &self.chain)
            .finish()
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// One open handle on the device node
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Run one control request
    pub fn control(&self, raw: u32, arg: &mut dyn UserMemory) -> Result<u32> {
        let live = self.shared.live.read();
        if !*live {
            return Err(Error::NoDevice);
        }
        self.shared.decoder.dispatch(raw, arg)
    }

    /// `ioctl` entry: the request's value, or a negative errno
    pub fn ioctl(&self, raw: u32, arg: &mut dyn UserMemory) -> i64 {
        match self.control(raw, arg) {
            Ok(value) => i64::from(value),
            Err(e) => e.to_return_code(),
        }
    }

    /// `ioctl` entry for 32-bit callers
    #[cfg(feature = "compat")]
    pub fn compat_ioctl(&self, raw: u32, arg: &mut dyn UserMemory) -> i64 {
        match crate::control::compat::translate(raw) {
            Ok(native) => self.ioctl(native, arg),
            Err(e) => e.to_return_code(),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("live", &*self.shared.live.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::abi::{QueryProps, RouteTableIndex};
    use crate::control::{Opcode, Payload, UserSlice, UserValue};
    use core::mem::size_of;
    use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use ipa_core::error::errno;
    use ipa_core::A2Resources;
    use ipa_hal::mock::{Call, MockPlatform};
    use std::vec;

    /// Records whether the clocks were up while it ran
    struct Recorder {
        mock: MockPlatform,
        powered_calls: AtomicUsize,
    }

    impl ControlHandler for Recorder {
        fn handle(&self, payload: &mut Payload<'_>) -> Result<()> {
            if !self.mock.enabled_clocks().is_empty() {
                self.powered_calls.fetch_add(1, Ordering::SeqCst);
            }
            if payload.opcode() == Opcode::QueryRtTableIndex {
                let mut index: RouteTableIndex = payload.header()?;
                index.idx = 5;
                payload.set_header(&index)?;
            }
            Ok(())
        }

        fn handle_value(&self, opcode: Opcode, arg: usize) -> Result<u32> {
            match opcode {
                Opcode::QueryEpMapping => Ok(arg as u32 * 2),
                _ => Ok(0),
            }
        }
    }

    fn resources() -> PlatformResources {
        PlatformResources::new(
            MemRegion::new(0xfd4c_0000, 0x4000),
            MemRegion::new(0xfd4c_4000, 0x1_0000),
            3,
        )
        .with_irqs(29, 28)
    }

    /// Parks inside the handler until let go
    struct Parked {
        entered: AtomicBool,
        go: AtomicBool,
    }

    impl ControlHandler for Parked {
        fn handle(&self, _payload: &mut Payload<'_>) -> Result<()> {
            Ok(())
        }

        fn handle_value(&self, _opcode: Opcode, _arg: usize) -> Result<u32> {
            self.entered.store(true, Ordering::SeqCst);
            while !self.go.load(Ordering::SeqCst) {
                std::thread::yield_now();
            }
            Ok(0)
        }
    }

    fn attach() -> (Device, MockPlatform, Arc<Recorder>) {
        let mock = MockPlatform::new();
        let recorder = Arc::new(Recorder {
            mock: mock.clone(),
            powered_calls: AtomicUsize::new(0),
        });
        let driver = IpaDriver::new(mock.platform(), recorder.clone());
        let device = driver.probe(resources()).unwrap();
        (device, mock, recorder)
    }

    #[test]
    fn test_driver_info() {
        let mock = MockPlatform::new();
        let driver = IpaDriver::new(mock.platform(), Arc::new(Recorder {
            mock: mock.clone(),
            powered_calls: AtomicUsize::new(0),
        }));
        assert_eq!(driver.info().name, "ipa");
        assert!(driver.matches("qcom,ipa"));
        assert!(!driver.matches("qcom,bam"));
    }

    #[test]
    fn test_request_runs_powered() {
        let (device, mock, recorder) = attach();
        assert!(mock.enabled_clocks().is_empty());

        let mut index = RouteTableIndex {
            ip: 0,
            ..bytemuck::Zeroable::zeroed()
        };
        let session = device.open();
        let rc = session.ioctl(
            Opcode::QueryRtTableIndex.command().raw(),
            &mut UserSlice::new(bytemuck::bytes_of_mut(&mut index)),
        );

        assert_eq!(rc, 0);
        assert_eq!(index.idx, 5);
        assert_eq!(recorder.powered_calls.load(Ordering::SeqCst), 1);
        assert!(mock.enabled_clocks().is_empty());
        assert_eq!(device.gate().count(), 0);
    }

    #[test]
    fn test_scalar_value_and_errno() {
        let (device, _mock, _recorder) = attach();
        let session = device.open();

        let cmd = Opcode::QueryEpMapping.command().raw();
        assert_eq!(session.ioctl(cmd, &mut UserValue(21)), 42);

        let bogus = Opcode::QueryEpMapping.command().with_size(8).raw();
        assert_eq!(session.ioctl(bogus, &mut UserValue(0)), -(errno::ENOTTY as i64));
    }

    #[test]
    fn test_over_limit_count() {
        let (device, _mock, recorder) = attach();
        let session = device.open();

        let header = QueryProps {
            num_props: 1000,
            ..bytemuck::Zeroable::zeroed()
        };
        let mut bytes = vec![0u8; size_of::<QueryProps>()];
        bytes.copy_from_slice(bytemuck::bytes_of(&header));

        let cmd = Opcode::QueryIntfTxProps.command().raw();
        assert_eq!(
            session.control(cmd, &mut UserSlice::new(&mut bytes)),
            Err(Error::InvalidArgument)
        );

        assert_eq!(device.stats().payload_allocations, 0);
        assert_eq!(recorder.powered_calls.load(Ordering::SeqCst), 0);
        assert_eq!(device.gate().count(), 0);
        assert!(!device.gate().is_powered());
    }

    #[cfg(all(feature = "compat", target_pointer_width = "64"))]
    #[test]
    fn test_compat_ioctl() {
        let (device, _mock, _recorder) = attach();
        let session = device.open();

        let mut index: RouteTableIndex = bytemuck::Zeroable::zeroed();
        let narrow = Opcode::QueryRtTableIndex.spec().compat_command().raw();
        let rc = session.compat_ioctl(narrow, &mut UserSlice::new(bytemuck::bytes_of_mut(&mut index)));
        assert_eq!(rc, 0);
        assert_eq!(index.idx, 5);

        let native = Opcode::QueryRtTableIndex.command().raw();
        assert_eq!(
            session.compat_ioctl(native, &mut UserValue(0)),
            -(errno::ENOIOCTLCMD as i64)
        );
    }

    #[test]
    fn test_shutdown_unwinds_everything() {
        let (device, mock, _recorder) = attach();
        let session = device.open();
        assert!(device.endpoint(Client::AppsLanCons).is_some());

        let undone = device.shutdown();
        let expected: Vec<BringupStep> = BringupStep::ALL
            .iter()
            .rev()
            .copied()
            .filter(|s| *s != BringupStep::PowerHold)
            .collect();
        assert_eq!(undone, expected);
        assert!(mock.live().is_empty());

        // The bus client is the last thing released
        let calls = mock.calls();
        assert_eq!(calls.last(), Some(&Call::BusUnregister));

        let cmd = Opcode::CommitHeader.command().raw();
        assert_eq!(session.control(cmd, &mut UserValue(0)), Err(Error::NoDevice));
    }

    #[test]
    fn test_drop_detaches_sessions() {
        let (device, mock, recorder) = attach();
        let session = device.open();

        drop(device);
        assert!(mock.live().is_empty());
        let journal = mock.calls().len();

        let mut index: RouteTableIndex = bytemuck::Zeroable::zeroed();
        let cmd = Opcode::QueryRtTableIndex.command().raw();
        assert_eq!(
            session.control(cmd, &mut UserSlice::new(bytemuck::bytes_of_mut(&mut index))),
            Err(Error::NoDevice)
        );
        assert_eq!(
            session.ioctl(Opcode::Dump.command().raw(), &mut UserValue(0)),
            -(errno::ENODEV as i64)
        );

        // Nothing reached the released clocks or bus client
        assert_eq!(mock.calls().len(), journal);
        assert_eq!(recorder.powered_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_shutdown_waits_for_running_request() {
        let mock = MockPlatform::new();
        let parked = Arc::new(Parked {
            entered: AtomicBool::new(false),
            go: AtomicBool::new(false),
        });
        let driver = IpaDriver::new(mock.platform(), parked.clone());
        let device = driver.probe(resources()).unwrap();
        let session = device.open();

        let request = std::thread::spawn(move || {
            session.control(Opcode::Dump.command().raw(), &mut UserValue(0))
        });
        while !parked.entered.load(Ordering::SeqCst) {
            std::thread::yield_now();
        }

        let before = mock.calls().len();
        let detach = std::thread::spawn(move || device.shutdown());
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!detach.is_finished());
        assert!(!mock.live().is_empty());
        assert!(!mock.enabled_clocks().is_empty());

        parked.go.store(true, Ordering::SeqCst);
        assert_eq!(request.join().unwrap(), Ok(0));
        let undone = detach.join().unwrap();
        assert_eq!(undone.len(), BringupStep::ALL.len() - 1);
        assert!(mock.live().is_empty());

        // The request powers down before teardown touches anything
        assert_eq!(mock.calls()[before], Call::BusVote(0));
    }

    #[test]
    fn test_a2_mux_info() {
        let mock = MockPlatform::new();
        let driver = IpaDriver::new(mock.platform(), Arc::new(Recorder {
            mock: mock.clone(),
            powered_calls: AtomicUsize::new(0),
        }));

        let a2 = A2Resources {
            bam_regs: MemRegion::new(0xfc83_4000, 0x1_9000),
            bam_irq: 61,
            a2_to_ipa: A2PipeConnection {
                src_pipe_index: 2,
                dst_pipe_index: 8,
                ..A2PipeConnection::default()
            },
            ipa_to_a2: A2PipeConnection {
                src_pipe_index: 9,
                dst_pipe_index: 3,
                ..A2PipeConnection::default()
            },
        };
        let device = driver
            .probe(
                resources()
                    .with_flags(DriverFlags::A2_SERVICE | DriverFlags::BAMDMA_A2_BRIDGE)
                    .with_a2(a2),
            )
            .unwrap();

        assert!(device.uses_bamdma_a2_bridge());
        assert_eq!(device.a2_mux_pipe(A2Direction::A2ToIpa).unwrap().dst_pipe_index, 8);
        assert_eq!(device.a2_mux_pipe(A2Direction::IpaToA2).unwrap().src_pipe_index, 9);
        assert_eq!(
            device.a2_mux_bam(),
            Ok((MemRegion::new(0xfc83_4000, 0x1_9000), 61))
        );

        let (plain, _mock, _recorder) = attach();
        assert!(!plain.uses_bamdma_a2_bridge());
        assert_eq!(plain.a2_mux_pipe(A2Direction::A2ToIpa), Err(Error::NoDevice));
        assert_eq!(plain.a2_mux_bam(), Err(Error::NoDevice));
    }

    #[test]
    fn test_a2_service_without_resources_fails_probe() {
        let mock = MockPlatform::new();
        let driver = IpaDriver::new(mock.platform(), Arc::new(Recorder {
            mock: mock.clone(),
            powered_calls: AtomicUsize::new(0),
        }));
        let failure = driver
            .probe(resources().with_flags(DriverFlags::A2_SERVICE))
            .map(|_| ())
            .unwrap_err();
        assert_eq!(failure.error, Error::NoDevice);
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_probe_rejects_bad_resources() {
        let mock = MockPlatform::new();
        let driver = IpaDriver::new(mock.platform(), Arc::new(Recorder {
            mock: mock.clone(),
            powered_calls: AtomicUsize::new(0),
        }));

        let failure = driver
            .probe(PlatformResources::new(MemRegion::new(0, 0), MemRegion::new(0x1000, 0x100), 3))
            .map(|_| ())
            .unwrap_err();
        assert_eq!(failure.error, Error::InvalidArgument);
        assert!(failure.unwound.is_empty());
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_concurrent_sessions() {
        let (device, mock, recorder) = attach();
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let session = device.open();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let mut index: RouteTableIndex = bytemuck::Zeroable::zeroed();
                        let rc = session.ioctl(
                            Opcode::QueryRtTableIndex.command().raw(),
                            &mut UserSlice::new(bytemuck::bytes_of_mut(&mut index)),
                        );
                        assert_eq!(rc, 0);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(recorder.powered_calls.load(Ordering::SeqCst), 200);
        assert_eq!(device.gate().count(), 0);
        assert!(mock.enabled_clocks().is_empty());
        let stats = device.gate().stats();
        assert_eq!(stats.enables, stats.disables);
    }
}
