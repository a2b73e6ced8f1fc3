use crate::engine::Cycle;
use crate::event::TierId;
use crate::mem::request::{ClientId, MemoryRequest};

/// Per-block progress of a migration. Transitions are monotonic; only a
/// whole-entry rollback reverts anything, and that happens by erasure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// Read has not been sent to the source tier.
    NotRead,
    /// Read is outstanding at the source tier.
    Reading,
    /// Read returned; data sits in the migration buffer, write not yet sent.
    Buffered,
    /// Write to the destination tier has been sent (or elided).
    Written,
}

/// A foreground requester waiting on an in-flight migration block.
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub request: MemoryRequest,
    pub client: ClientId,
}

#[derive(Debug)]
pub struct BlockEntry {
    pub state: BlockState,
    /// Set when a foreground write landed in the buffered copy.
    pub dirty: bool,
    /// Internal id of the outstanding read, while READING.
    pub request: Option<u64>,
    /// Requesters piggybacking on the outstanding read.
    pub callers: Vec<Caller>,
    pub start_time: Cycle,
}

impl BlockEntry {
    fn new() -> Self {
        Self {
            state: BlockState::NotRead,
            dirty: false,
            request: None,
            callers: Vec::new(),
            start_time: 0,
        }
    }
}

#[derive(Debug)]
pub struct MigrationEntry {
    pub src_page: u64,
    pub dest_page: u64,
    pub src: TierId,
    pub dest: TierId,
    /// Spacing between successive block reads / writes.
    pub read_delay: Cycle,
    pub write_delay: Cycle,

    pub blocks: Vec<BlockEntry>,
    pub blocks_left_to_read: u32,
    pub blocks_left_to_complete_read: u32,
    pub blocks_left_to_write: u32,
    /// Next block to send a read for; == blocks.len() when all reads issued.
    pub next_read_block: usize,
    /// Next block to send a write for; writes go out strictly in block order.
    pub next_write_block: usize,
    /// Destination writes sent but not yet acknowledged by the tier.
    pub writes_outstanding: u32,

    pub rolled_back: bool,
    /// The completion threshold fired; the policy has been told the page now
    /// belongs to the destination.
    pub completed: bool,
    pub write_event_pending: bool,
    pub last_write: Option<Cycle>,
    pub start_time: Cycle,
}

impl MigrationEntry {
    pub fn new(
        src_page: u64,
        dest_page: u64,
        src: TierId,
        dest: TierId,
        read_delay: Cycle,
        write_delay: Cycle,
        blocks_per_page: u32,
        start_time: Cycle,
    ) -> Self {
        Self {
            src_page,
            dest_page,
            src,
            dest,
            read_delay,
            write_delay,
            blocks: (0..blocks_per_page).map(|_| BlockEntry::new()).collect(),
            blocks_left_to_read: blocks_per_page,
            blocks_left_to_complete_read: blocks_per_page,
            blocks_left_to_write: blocks_per_page,
            next_read_block: 0,
            next_write_block: 0,
            writes_outstanding: 0,
            rolled_back: false,
            completed: false,
            write_event_pending: false,
            last_write: None,
            start_time,
        }
    }

    pub fn blocks_written(&self) -> u32 {
        self.blocks.len() as u32 - self.blocks_left_to_write
    }

    /// No outstanding tier traffic remains; a rolled-back entry may be
    /// erased. Rollback discounts never-issued reads, so this waits only on
    /// reads in flight and unacknowledged writes.
    pub fn is_drained(&self) -> bool {
        self.blocks_left_to_complete_read == 0 && self.writes_outstanding == 0
    }
}
