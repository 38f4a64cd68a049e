//! In-memory endpoint table and rule handle registry.
//!
//! Neither touches hardware; they record what bring-up installed so
//! teardown and the request path can find it.

use alloc::collections::BTreeMap;
use core::fmt;

use ipa_core::{Client, IpFamily, RuleHandle, NUM_PIPES};
use ipa_hal::PipeHandle;
use spin::Mutex;

/// A connected system endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Client the pipe serves
    pub client: Client,
    /// Transport pipe
    pub pipe: PipeHandle,
}

/// Pipe-indexed table of connected endpoints
pub struct EndpointTable {
    slots: Mutex<[Option<Endpoint>; NUM_PIPES]>,
}

impl EndpointTable {
    /// Empty table
    pub fn new() -> Self {
        Self {
            slots: Mutex::new([None; NUM_PIPES]),
        }
    }

    /// Record a connected endpoint in its client's pipe slot
    pub fn install(&self, client: Client, pipe: PipeHandle) {
        let mut slots = self.slots.lock();
        let slot = &mut slots[client.pipe()];
        if slot.is_some() {
            log::warn!("IPA: pipe {} already in use", client.pipe());
        }
        *slot = Some(Endpoint { client, pipe });
    }

    /// Clear a client's slot
    pub fn remove(&self, client: Client) -> Option<Endpoint> {
        self.slots.lock()[client.pipe()].take()
    }

    /// Endpoint serving `client`, if connected
    pub fn lookup(&self, client: Client) -> Option<Endpoint> {
        self.slots.lock()[client.pipe()]
    }

    /// Number of connected endpoints
    pub fn connected(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.is_some()).count()
    }
}

impl Default for EndpointTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EndpointTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock();
        f.debug_map()
            .entries(slots.iter().enumerate().filter_map(|(i, s)| s.map(|e| (i, e.client))))
            .finish()
    }
}

/// What a rule handle refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    /// Header table entry
    Header,
    /// Routing rule
    Route(IpFamily),
    /// Filter rule
    Filter(IpFamily),
}

/// Rule handles issued to the driver itself
#[derive(Debug, Default)]
pub struct HandleRegistry {
    handles: Mutex<BTreeMap<RuleHandle, HandleKind>>,
}

impl HandleRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a handle
    pub fn insert(&self, handle: RuleHandle, kind: HandleKind) {
        self.handles.lock().insert(handle, kind);
    }

    /// Forget a handle
    pub fn remove(&self, handle: RuleHandle) -> Option<HandleKind> {
        self.handles.lock().remove(&handle)
    }

    /// Kind of a recorded handle
    pub fn get(&self, handle: RuleHandle) -> Option<HandleKind> {
        self.handles.lock().get(&handle).copied()
    }

    /// Number of recorded handles
    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    /// Whether nothing is recorded
    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }
}

/// Tables built at step 9
#[derive(Debug, Default)]
pub struct Tables {
    /// Connected endpoints
    pub endpoints: EndpointTable,
    /// Driver-owned rule handles
    pub handles: HandleRegistry,
}

impl Tables {
    /// Empty tables
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_slots_follow_pipes() {
        let table = EndpointTable::new();
        table.install(Client::AppsLanCons, PipeHandle(9));

        assert_eq!(table.lookup(Client::AppsLanCons).map(|e| e.pipe), Some(PipeHandle(9)));
        assert_eq!(table.lookup(Client::AppsCmdProd), None);
        assert_eq!(table.connected(), 1);

        assert!(table.remove(Client::AppsLanCons).is_some());
        assert!(table.remove(Client::AppsLanCons).is_none());
        assert_eq!(table.connected(), 0);
    }

    #[test]
    fn test_registry() {
        let registry = HandleRegistry::new();
        registry.insert(RuleHandle(3), HandleKind::Route(IpFamily::V6));

        assert_eq!(registry.get(RuleHandle(3)), Some(HandleKind::Route(IpFamily::V6)));
        assert_eq!(registry.remove(RuleHandle(3)), Some(HandleKind::Route(IpFamily::V6)));
        assert!(registry.is_empty());
    }
}
