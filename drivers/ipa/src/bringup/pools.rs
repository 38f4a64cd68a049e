//! # Object Pools
//!
//! Six fixed-size object caches for the rule, table and packet-wrapper
//! bookkeeping, plus the descriptor DMA pool. Created once at bring-up
//! and read-only afterwards.

use alloc::sync::Arc;
use arrayvec::ArrayVec;
use core::fmt;

use ipa_core::{Error, HwCapabilities, Result};
use ipa_hal::{CacheHandle, DmaPoolHandle, KernelMemory};

use super::teardown::{Release, TeardownChain};

/// Kinds of object the caches hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Filter rule entry
    FilterRule,
    /// Routing rule entry
    RouteRule,
    /// Header table entry
    Header,
    /// Routing table
    RouteTable,
    /// Outbound packet wrapper
    TxPacketWrapper,
    /// Inbound packet wrapper
    RxPacketWrapper,
}

impl ObjectKind {
    /// Every kind, in creation order
    pub const ALL: [ObjectKind; 6] = [
        Self::FilterRule,
        Self::RouteRule,
        Self::Header,
        Self::RouteTable,
        Self::TxPacketWrapper,
        Self::RxPacketWrapper,
    ];

    /// Cache name
    pub const fn cache_name(self) -> &'static str {
        match self {
            Self::FilterRule => "IPA FLT",
            Self::RouteRule => "IPA RT",
            Self::Header => "IPA HDR",
            Self::RouteTable => "IPA RT TBL",
            Self::TxPacketWrapper => "IPA TX PKT WRAPPER",
            Self::RxPacketWrapper => "IPA RX PKT WRAPPER",
        }
    }

    /// Object size in bytes
    pub const fn object_size(self) -> usize {
        match self {
            Self::FilterRule => 96,
            Self::RouteRule => 88,
            Self::Header => 128,
            Self::RouteTable => 112,
            Self::TxPacketWrapper => 64,
            Self::RxPacketWrapper => 80,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cache_name())
    }
}

/// Handles of every pool created at bring-up
#[derive(Debug, Clone)]
pub struct PoolSet {
    caches: ArrayVec<(ObjectKind, CacheHandle), 6>,
    dma_pool: DmaPoolHandle,
}

impl PoolSet {
    /// Create the caches in order, then the DMA pool.
    ///
    /// A failure destroys only the pools created before it and reports
    /// `OutOfMemory`.
    pub fn create(memory: &Arc<dyn KernelMemory>, caps: &HwCapabilities) -> Result<(Self, Release)> {
        let mut chain = TeardownChain::new();
        let mut caches = ArrayVec::new();

        for kind in ObjectKind::ALL {
            let cache = memory
                .create_cache(kind.cache_name(), kind.object_size())
                .map_err(|e| {
                    log::error!("IPA: {} cache: {}", kind, e);
                    Error::OutOfMemory
                })?;
            let mem = memory.clone();
            chain.push(kind.cache_name(), Release::new(move || mem.destroy_cache(cache)));
            caches.push((kind, cache));
        }

        let spec = caps.dma_pool;
        let dma_pool = memory.create_dma_pool(&spec).map_err(|e| {
            log::error!("IPA: DMA pool {}: {}", spec.name, e);
            Error::OutOfMemory
        })?;
        let mem = memory.clone();
        chain.push(spec.name, Release::new(move || mem.destroy_dma_pool(dma_pool)));

        Ok((Self { caches, dma_pool }, chain.into_release()))
    }

    /// Cache holding objects of `kind`
    pub fn cache(&self, kind: ObjectKind) -> Option<CacheHandle> {
        self.caches.iter().find(|(k, _)| *k == kind).map(|(_, c)| *c)
    }

    /// Descriptor DMA pool
    pub fn dma_pool(&self) -> DmaPoolHandle {
        self.dma_pool
    }
}
