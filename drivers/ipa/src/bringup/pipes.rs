//! # System Endpoints
//!
//! The driver's own data path: command producer, exception header and
//! default routes, LAN consumer, LAN-WAN producer. Sub-steps unwind in
//! reverse on failure, and the whole set folds into one release action.

use alloc::sync::Arc;
use core::fmt;

use ipa_core::{Client, Error, HwCapabilities, IpFamily, Result, RuleHandle};
use ipa_hal::{ImmediateCommand, PipeConfig, RuleEngine, SramBudget, Transport};

use super::tables::{HandleKind, Tables};
use super::teardown::{Release, TeardownChain};

/// Routing table holding the default routes
pub const DEFAULT_ROUTE_TABLE: &str = "ipa_dflt_rt";

const CMD_FIFO_SIZE: u32 = 0x800;
const LAN_FIFO_SIZE: u32 = 0x800;
const LAN_WAN_FIFO_SIZE: u32 = 0x1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipeStep {
    Endpoint(Client),
    ExceptionHeader,
    DefaultRoute(IpFamily),
}

impl fmt::Display for PipeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Endpoint(client) => write!(f, "endpoint {:?}", client),
            Self::ExceptionHeader => f.write_str("exception header"),
            Self::DefaultRoute(family) => write!(f, "default {:?} route", family),
        }
    }
}

/// Services the endpoints are built from
pub struct SystemPipes<'a> {
    /// Transport pipes
    pub transport: &'a Arc<dyn Transport>,
    /// Header and routing rules
    pub rules: &'a Arc<dyn RuleEngine>,
    /// Bound capabilities
    pub caps: &'a HwCapabilities,
    /// On-chip memory reported at hardware init
    pub sram: SramBudget,
    /// Tables to record endpoints and handles in
    pub tables: &'a Arc<Tables>,
}

impl SystemPipes<'_> {
    /// Bring every endpoint up; fails with `NoDevice` after undoing
    /// whatever sub-steps had completed
    pub fn setup(&self) -> Result<Release> {
        self.build().map(TeardownChain::into_release).map_err(|e| {
            log::error!("IPA: system pipes: {}", e);
            Error::NoDevice
        })
    }

    fn build(&self) -> Result<TeardownChain<PipeStep>> {
        let mut chain = TeardownChain::new();

        chain.push(
            PipeStep::Endpoint(Client::AppsCmdProd),
            self.connect(Client::AppsCmdProd, CMD_FIFO_SIZE, 0)?,
        );

        if self.caps.sram_tables {
            self.init_sram_tables()?;
        }

        let header = self.exception_header(&mut chain)?;

        for family in IpFamily::ALL {
            let rule = self.rules.add_route(
                family,
                DEFAULT_ROUTE_TABLE,
                Client::AppsLanCons,
                header,
            )?;
            self.tables.handles.insert(rule, HandleKind::Route(family));
            let (rules, tables) = (self.rules.clone(), self.tables.clone());
            chain.push(
                PipeStep::DefaultRoute(family),
                Release::new(move || {
                    tables.handles.remove(rule);
                    rules.del_route(rule);
                }),
            );
        }

        chain.push(
            PipeStep::Endpoint(Client::AppsLanCons),
            self.connect(Client::AppsLanCons, LAN_FIFO_SIZE, self.caps.exception_header.len)?,
        );
        chain.push(
            PipeStep::Endpoint(Client::AppsLanWanProd),
            self.connect(Client::AppsLanWanProd, LAN_WAN_FIFO_SIZE, 0)?,
        );

        Ok(chain)
    }

    fn connect(&self, client: Client, desc_fifo_size: u32, header_len: u32) -> Result<Release> {
        let pipe = self.transport.connect(&PipeConfig {
            client,
            desc_fifo_size,
            header_len,
        })?;
        self.tables.endpoints.install(client, pipe);

        let (transport, tables) = (self.transport.clone(), self.tables.clone());
        Ok(Release::new(move || {
            tables.endpoints.remove(client);
            transport.disconnect(pipe);
        }))
    }

    fn init_sram_tables(&self) -> Result<()> {
        self.transport.send_immediate(ImmediateCommand::InitSram {
            restricted: self.sram.restricted,
            size: self.sram.available(),
        })?;
        self.transport.send_immediate(ImmediateCommand::InitHeaderTable)?;
        for family in IpFamily::ALL {
            self.transport.send_immediate(ImmediateCommand::InitRoutingTable(family))?;
        }
        for family in IpFamily::ALL {
            self.transport.send_immediate(ImmediateCommand::InitFilterTable(family))?;
        }
        Ok(())
    }

    fn exception_header(&self, chain: &mut TeardownChain<PipeStep>) -> Result<RuleHandle> {
        let spec = self.caps.exception_header;
        let header = self.rules.add_header(spec.name, spec.len)?;
        self.tables.handles.insert(header, HandleKind::Header);

        let (rules, tables) = (self.rules.clone(), self.tables.clone());
        chain.push(
            PipeStep::ExceptionHeader,
            Release::new(move || {
                tables.handles.remove(header);
                rules.del_header(header);
            }),
        );

        self.rules.route_exceptions(Client::AppsLanCons, header)?;
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipa_hal::mock::{Call, MockPlatform, Site};
    use std::string::ToString;
    use std::vec;
    use std::vec::Vec;

    struct Rig {
        mock: MockPlatform,
        transport: Arc<dyn Transport>,
        rules: Arc<dyn RuleEngine>,
        tables: Arc<Tables>,
    }

    fn rig() -> Rig {
        let mock = MockPlatform::new();
        Rig {
            transport: Arc::new(mock.clone()),
            rules: Arc::new(mock.clone()),
            tables: Arc::new(Tables::new()),
            mock,
        }
    }

    fn setup(rig: &Rig, version: u32) -> Result<Release> {
        let caps = HwCapabilities::bind(version).unwrap();
        SystemPipes {
            transport: &rig.transport,
            rules: &rig.rules,
            caps: &caps,
            sram: SramBudget {
                size: 0x4000,
                restricted: 0x800,
            },
            tables: &rig.tables,
        }
        .setup()
    }

    #[test]
    fn test_v2_order() {
        let rig = rig();
        let _release = setup(&rig, 3).unwrap();

        let calls = rig.mock.calls();
        let expected: Vec<Call> = vec![
            Call::PipeConnect(Client::AppsCmdProd),
            Call::Immediate(ImmediateCommand::InitSram {
                restricted: 0x800,
                size: 0x3800,
            }),
            Call::Immediate(ImmediateCommand::InitHeaderTable),
            Call::Immediate(ImmediateCommand::InitRoutingTable(IpFamily::V4)),
            Call::Immediate(ImmediateCommand::InitRoutingTable(IpFamily::V6)),
            Call::Immediate(ImmediateCommand::InitFilterTable(IpFamily::V4)),
            Call::Immediate(ImmediateCommand::InitFilterTable(IpFamily::V6)),
            Call::HeaderAdd("ipa_lan_hdr".to_string()),
            Call::RouteExceptions(Client::AppsLanCons),
            Call::RouteAdd(IpFamily::V4),
            Call::RouteAdd(IpFamily::V6),
            Call::PipeConnect(Client::AppsLanCons),
            Call::PipeConnect(Client::AppsLanWanProd),
        ];
        assert_eq!(calls, expected);
        assert_eq!(rig.tables.endpoints.connected(), 3);
        assert_eq!(rig.tables.handles.len(), 3);
    }

    #[test]
    fn test_v1_skips_sram_commands() {
        let rig = rig();
        let _release = setup(&rig, 1).unwrap();

        assert!(!rig.mock.calls().iter().any(|c| matches!(c, Call::Immediate(_))));
        assert_eq!(rig.mock.count(&Call::HeaderAdd("ipa_excp_hdr".to_string())), 1);
    }

    #[test]
    fn test_teardown_mirrors_setup() {
        let rig = rig();
        let release = setup(&rig, 3).unwrap();
        rig.mock.clear_calls();

        drop(release);

        let expected: Vec<Call> = vec![
            Call::PipeDisconnect(Client::AppsLanWanProd),
            Call::PipeDisconnect(Client::AppsLanCons),
            Call::RouteDel(IpFamily::V6),
            Call::RouteDel(IpFamily::V4),
            Call::HeaderDel("ipa_lan_hdr".to_string()),
            Call::PipeDisconnect(Client::AppsCmdProd),
        ];
        assert_eq!(rig.mock.calls(), expected);
        assert!(rig.mock.live().is_empty());
        assert_eq!(rig.tables.endpoints.connected(), 0);
        assert!(rig.tables.handles.is_empty());
    }

    #[test]
    fn test_partial_failure_unwinds_substeps() {
        let rig = rig();
        // Second route (v6) fails
        rig.mock.fail(Site::RouteAdd, 2, Error::OutOfMemory);

        assert_eq!(setup(&rig, 3).map(|_| ()), Err(Error::NoDevice));

        let calls = rig.mock.calls();
        let tail = &calls[calls.len() - 3..];
        assert_eq!(
            tail,
            &[
                Call::RouteDel(IpFamily::V4),
                Call::HeaderDel("ipa_lan_hdr".to_string()),
                Call::PipeDisconnect(Client::AppsCmdProd),
            ]
        );
        assert_eq!(rig.mock.count(&Call::PipeConnect(Client::AppsLanCons)), 0);
        assert!(rig.mock.live().is_empty());
    }

    #[test]
    fn test_exception_routing_failure_drops_header() {
        let rig = rig();
        rig.mock.fail(Site::RouteExceptions, 1, Error::OutOfMemory);

        assert_eq!(setup(&rig, 1).map(|_| ()), Err(Error::NoDevice));
        assert_eq!(rig.mock.count(&Call::HeaderDel("ipa_excp_hdr".to_string())), 1);
        assert!(rig.mock.live().is_empty());
    }
}
