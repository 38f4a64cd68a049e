//! # Control ABI
//!
//! Argument structures exchanged with callers. Every structure is plain
//! old data with no padding, so it can be read from and written to the
//! caller's bytes without alignment requirements. Rule bodies and match
//! attributes are opaque here; their encoding belongs to the rule engine.

use bytemuck::{Pod, Zeroable};
use ipa_core::RESOURCE_NAME_MAX;
use static_assertions::const_assert_eq;

/// Fixed-length, NUL-padded resource name
pub type Name = [u8; RESOURCE_NAME_MAX];

/// Opaque encoded rule body
pub type RuleBody = [u8; 64];

/// Opaque encoded match attributes
pub type Attributes = [u8; 32];

// =============================================================================
// HEADERS
// =============================================================================

/// Add header entries
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct AddHeaders {
    /// Commit the table after adding
    pub commit: u32,
    /// Number of [`HeaderEntry`] that follow
    pub num_hdrs: u32,
}

/// One header to add
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct HeaderEntry {
    /// Header name
    pub name: Name,
    /// Header bytes
    pub hdr: [u8; 64],
    /// Valid bytes in `hdr`
    pub hdr_len: u32,
    /// Header is completed by the hardware
    pub is_partial: u32,
    /// Out: assigned handle
    pub hdr_hdl: u32,
    /// Out: per-entry status
    pub status: i32,
}

/// Delete by handle (headers, routing and filter rules)
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct DelHeaders {
    /// Commit the table after deleting
    pub commit: u32,
    /// Number of [`HandleDelete`] that follow
    pub num_hdls: u32,
}

/// One handle to delete
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct HandleDelete {
    /// Handle to delete
    pub hdl: u32,
    /// Out: per-entry status
    pub status: i32,
}

/// Copy a header's bytes by name
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct CopyHeader {
    /// Header name
    pub name: Name,
    /// Out: header bytes
    pub hdr: [u8; 64],
    /// Out: valid bytes in `hdr`
    pub hdr_len: u32,
    /// Out: header is partial
    pub is_partial: u32,
}

/// Look up a header handle by name
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct GetHeader {
    /// Header name
    pub name: Name,
    /// Out: handle
    pub hdl: u32,
}

// =============================================================================
// ROUTING AND FILTERING
// =============================================================================

/// Add routing rules to a named table
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct AddRoutes {
    /// Commit the table after adding
    pub commit: u32,
    /// Address family
    pub ip: u32,
    /// Routing table name
    pub rt_tbl_name: Name,
    /// Number of [`RouteEntry`] that follow
    pub num_rules: u32,
}

/// One routing rule to add
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct RouteEntry {
    /// Append rather than prepend
    pub at_rear: u32,
    /// Encoded rule
    pub rule: RuleBody,
    /// Out: assigned handle
    pub rt_rule_hdl: u32,
    /// Out: per-entry status
    pub status: i32,
}

/// Delete rules of one family by handle
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct DelRules {
    /// Commit the table after deleting
    pub commit: u32,
    /// Address family
    pub ip: u32,
    /// Number of [`HandleDelete`] that follow
    pub num_hdls: u32,
}

/// Add filter rules for an endpoint or globally
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct AddFilters {
    /// Commit the table after adding
    pub commit: u32,
    /// Address family
    pub ip: u32,
    /// Endpoint the rules apply to
    pub ep: u32,
    /// Rules are global rather than per endpoint
    pub global: u32,
    /// Number of [`FilterEntry`] that follow
    pub num_rules: u32,
}

/// One filter rule to add
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct FilterEntry {
    /// Append rather than prepend
    pub at_rear: u32,
    /// Encoded rule
    pub rule: RuleBody,
    /// Out: assigned handle
    pub flt_rule_hdl: u32,
    /// Out: per-entry status
    pub status: i32,
}

/// Look up a routing table by name, taking a reference
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct GetRouteTable {
    /// Address family
    pub ip: u32,
    /// Table name
    pub name: Name,
    /// Out: handle
    pub hdl: u32,
}

/// Look up a routing table's hardware index by name
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct RouteTableIndex {
    /// Address family
    pub ip: u32,
    /// Table name
    pub name: Name,
    /// Out: index
    pub idx: u32,
}

/// Translate match attributes into hardware equations
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct GenerateFilterEq {
    /// Address family
    pub ip: u32,
    /// Match attributes
    pub attrib: Attributes,
    /// Out: equation form
    pub eq_attrib: [u8; 64],
}

// =============================================================================
// INTERFACE QUERIES
// =============================================================================

/// Query how many properties an interface has
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct QueryInterface {
    /// Interface name
    pub name: Name,
    /// Out: transmit properties
    pub num_tx_props: u32,
    /// Out: receive properties
    pub num_rx_props: u32,
    /// Out: extended properties
    pub num_ext_props: u32,
    /// Out: exception pipe
    pub excp_pipe: u32,
}

/// Query an interface's properties of one kind
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct QueryProps {
    /// Interface name
    pub name: Name,
    /// Number of property slots that follow
    pub num_props: u32,
}

/// Transmit property
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct TxProp {
    /// Address family
    pub ip: u32,
    /// Match attributes
    pub attrib: Attributes,
    /// Destination pipe
    pub dst_pipe: u32,
    /// Header to add
    pub hdr_name: Name,
}

/// Receive property
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct RxProp {
    /// Address family
    pub ip: u32,
    /// Match attributes
    pub attrib: Attributes,
    /// Source pipe
    pub src_pipe: u32,
}

/// Extended property
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct ExtProp {
    /// Address family
    pub ip: u32,
    /// Match equations
    pub eq_attrib: Attributes,
    /// Filter action
    pub action: u32,
    /// Routing table index
    pub rt_tbl_idx: u32,
    /// Mux identifier
    pub mux_id: u32,
}

// =============================================================================
// NAT
// =============================================================================

/// Allocate the NAT table device memory
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct NatAllocMem {
    /// Device name
    pub dev_name: Name,
    /// Requested size
    pub size: u32,
    /// Out: offset of the allocation
    pub offset: u32,
}

/// Initialise an IPv4 NAT table
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
#[allow(missing_docs)]
pub struct NatInit {
    pub tbl_index: u32,
    pub ipv4_rules_offset: u32,
    pub expn_rules_offset: u32,
    pub index_offset: u32,
    pub index_expn_offset: u32,
    pub table_entries: u32,
    pub expn_table_entries: u32,
    pub ip_addr: u32,
}

/// Batch of NAT table writes
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct NatDma {
    /// Number of [`NatDmaEntry`] that follow
    pub entries: u32,
}

/// One NAT table write
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
#[allow(missing_docs)]
pub struct NatDmaEntry {
    pub table_index: u32,
    pub base_addr: u32,
    pub offset: u32,
    pub data: u32,
}

/// Delete an IPv4 NAT table
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
#[allow(missing_docs)]
pub struct NatDel {
    pub table_index: u32,
    pub public_ip_addr: u32,
}

// =============================================================================
// MISC
// =============================================================================

/// Message header; `msg_len` bytes of message follow
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct MsgMeta {
    /// Message type
    pub msg_type: u32,
    /// Length of the message body
    pub msg_len: u32,
}

/// Resource manager dependency between two resources
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct RmDependency {
    /// Dependent resource
    pub resource_name: u32,
    /// Resource it depends on
    pub depends_on_name: u32,
}

/// Program the QMAP id of a client
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct WriteQmapId {
    /// Client endpoint
    pub client: u32,
    /// QMAP id
    pub qmap_id: u32,
}

// =============================================================================
// LAYOUT PINS
// =============================================================================

const_assert_eq!(core::mem::size_of::<AddHeaders>(), 8);
const_assert_eq!(core::mem::size_of::<HeaderEntry>(), 112);
const_assert_eq!(core::mem::size_of::<HandleDelete>(), 8);
const_assert_eq!(core::mem::size_of::<CopyHeader>(), 104);
const_assert_eq!(core::mem::size_of::<AddRoutes>(), 44);
const_assert_eq!(core::mem::size_of::<RouteEntry>(), 76);
const_assert_eq!(core::mem::size_of::<DelRules>(), 12);
const_assert_eq!(core::mem::size_of::<AddFilters>(), 20);
const_assert_eq!(core::mem::size_of::<FilterEntry>(), 76);
const_assert_eq!(core::mem::size_of::<GetRouteTable>(), 40);
const_assert_eq!(core::mem::size_of::<GenerateFilterEq>(), 100);
const_assert_eq!(core::mem::size_of::<QueryInterface>(), 48);
const_assert_eq!(core::mem::size_of::<QueryProps>(), 36);
const_assert_eq!(core::mem::size_of::<TxProp>(), 72);
const_assert_eq!(core::mem::size_of::<RxProp>(), 40);
const_assert_eq!(core::mem::size_of::<ExtProp>(), 48);
const_assert_eq!(core::mem::size_of::<NatInit>(), 32);
const_assert_eq!(core::mem::size_of::<NatDmaEntry>(), 16);
const_assert_eq!(core::mem::size_of::<MsgMeta>(), 8);
