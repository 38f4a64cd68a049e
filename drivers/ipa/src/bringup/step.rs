//! Bring-up steps, in execution order.

use core::fmt;

/// One step of device bring-up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BringupStep {
    /// Driver context and capability table
    Context,
    /// Bus bandwidth client
    BusClient,
    /// Clock handles
    ClockHandles,
    /// Power gate held for the duration of bring-up
    PowerHold,
    /// IPA register window
    RegisterMap,
    /// Hardware init and on-chip memory check
    HardwareInit,
    /// Transport registration and configuration bits
    Transport,
    /// Object caches and descriptor DMA pool
    Pools,
    /// Endpoint table and handle registry
    Tables,
    /// Zeroed placeholder table
    EmptyTable,
    /// System endpoints, exception header, default routes
    Endpoints,
    /// Global filter rules
    FilterWorkaround,
    /// Flat pipe memory
    PipeMemory,
    /// Character device node
    DeviceNode,
    /// Resource manager
    ResourceManager,
    /// Interrupt wiring
    Interrupts,
    /// Tethering bridge
    TetherBridge,
}

impl BringupStep {
    /// Every step, in order
    pub const ALL: [BringupStep; 17] = [
        Self::Context,
        Self::BusClient,
        Self::ClockHandles,
        Self::PowerHold,
        Self::RegisterMap,
        Self::HardwareInit,
        Self::Transport,
        Self::Pools,
        Self::Tables,
        Self::EmptyTable,
        Self::Endpoints,
        Self::FilterWorkaround,
        Self::PipeMemory,
        Self::DeviceNode,
        Self::ResourceManager,
        Self::Interrupts,
        Self::TetherBridge,
    ];

    /// 1-based position in the sequence
    pub const fn index(self) -> usize {
        self as usize + 1
    }

    /// Step at a 1-based position
    pub fn from_index(index: usize) -> Option<Self> {
        index.checked_sub(1).and_then(|i| Self::ALL.get(i).copied())
    }

    /// Short name for logs
    pub const fn name(self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::BusClient => "bus client",
            Self::ClockHandles => "clock handles",
            Self::PowerHold => "power hold",
            Self::RegisterMap => "register map",
            Self::HardwareInit => "hardware init",
            Self::Transport => "transport",
            Self::Pools => "pools",
            Self::Tables => "tables",
            Self::EmptyTable => "empty table",
            Self::Endpoints => "endpoints",
            Self::FilterWorkaround => "filter workaround",
            Self::PipeMemory => "pipe memory",
            Self::DeviceNode => "device node",
            Self::ResourceManager => "resource manager",
            Self::Interrupts => "interrupts",
            Self::TetherBridge => "tether bridge",
        }
    }
}

impl fmt::Display for BringupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({})", self.index(), self.name())
    }
}
