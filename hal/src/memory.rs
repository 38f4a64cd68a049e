//! # Kernel Memory Services
//!
//! Fixed-size object caches, descriptor DMA pools, coherent blocks and the
//! flat pipe-memory allocator.

use ipa_core::caps::DmaPoolSpec;
use ipa_core::Result;

handle_type!(
    /// Fixed-size object cache
    CacheHandle
);

handle_type!(
    /// Descriptor DMA pool
    DmaPoolHandle
);

handle_type!(
    /// Flat pipe-memory allocator
    PipeMemHandle
);

/// A DMA-coherent memory block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaRegion {
    /// Bus address seen by the hardware
    pub dma_addr: u64,
    /// Size in bytes
    pub size: usize,
}

/// Kernel memory services
pub trait KernelMemory: Send + Sync {
    /// Create a cache of `object_size`-byte objects
    fn create_cache(&self, name: &'static str, object_size: usize) -> Result<CacheHandle>;

    /// Destroy a cache
    fn destroy_cache(&self, cache: CacheHandle);

    /// Create a descriptor DMA pool
    fn create_dma_pool(&self, spec: &DmaPoolSpec) -> Result<DmaPoolHandle>;

    /// Destroy a descriptor DMA pool
    fn destroy_dma_pool(&self, pool: DmaPoolHandle);

    /// Allocate a zero-filled coherent block
    fn alloc_coherent(&self, size: usize) -> Result<DmaRegion>;

    /// Free a coherent block
    fn free_coherent(&self, region: DmaRegion);

    /// Create an allocator over the flat pipe-memory region
    fn create_pipe_mem(&self, base: u64, size: u64) -> Result<PipeMemHandle>;

    /// Destroy the pipe-memory allocator
    fn destroy_pipe_mem(&self, pool: PipeMemHandle);
}
