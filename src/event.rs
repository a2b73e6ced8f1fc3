//! Event vocabulary shared by the memory model components.
//!
//! Everything in the simulator is driven by these events; the top-level
//! dispatch loop routes each one to the component that owns it.

/// Identifies one of the two memory tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TierId {
    Dram,
    Pcm,
}

impl TierId {
    pub fn name(self) -> &'static str {
        match self {
            TierId::Dram => "dram",
            TierId::Pcm => "pcm",
        }
    }
}

/// A step in a bank's row-buffer sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankStep {
    /// The row activation finished.
    Opened,
    /// The row close (precharge/writeback) finished.
    Closed,
    /// The column access finished; data is ready for the bus.
    AccessReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Bank {
        tier: TierId,
        bank: usize,
        step: BankStep,
    },
    /// A bus transfer on `tier` on behalf of `bank` completed.
    BusTransfer { tier: TierId, bank: usize },
    /// Issue more block reads for the migration of `page`.
    MigrationCopy { page: u64 },
    /// Issue more block writes for the migration of `page`.
    MigrationWrite { page: u64 },
    /// The lump-sum PCM write timer for the migration of `page` expired.
    MigrationTimer { page: u64 },
    /// Deliver queued buffer-served completions to their callers.
    Notify,
}
