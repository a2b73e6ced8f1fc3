use crate::event::TierId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

impl AccessKind {
    pub fn is_read(self) -> bool {
        matches!(self, AccessKind::Read)
    }

    pub fn is_write(self) -> bool {
        matches!(self, AccessKind::Write)
    }
}

/// Handle for an external requester registered with the top-level system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub usize);

/// Where a completion should be delivered. The hybrid controller issues its
/// own traffic to the tiers, so tiers never talk to external clients about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Hybrid,
    Client(ClientId),
}

/// A memory request as seen by the core. Created by the caller, passed by
/// value, and handed back unchanged (modulo internal address rewriting, which
/// is undone before delivery) when the access completes. The core keeps
/// per-request timing in side tables, never in the request itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRequest {
    pub id: u64,
    pub addr: u64,
    pub kind: AccessKind,
    /// Higher value = more urgent.
    pub priority: u8,
    /// `None` for controller-generated migration traffic.
    pub pid: Option<usize>,
    /// Opaque slot for the caller; the core never touches it.
    pub user: u64,
}

impl MemoryRequest {
    pub fn read(id: u64, addr: u64) -> Self {
        Self {
            id,
            addr,
            kind: AccessKind::Read,
            priority: 0,
            pid: None,
            user: 0,
        }
    }

    pub fn write(id: u64, addr: u64) -> Self {
        Self {
            kind: AccessKind::Write,
            ..Self::read(id, addr)
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_pid(mut self, pid: usize) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn with_user(mut self, user: u64) -> Self {
        self.user = user;
        self
    }
}

/// A completion leaving a tier: the serviced request and where it goes.
pub type Completion = (MemoryRequest, Endpoint);

/// Notices the core raises for external clients. The top-level system owns
/// the client registry and forwards these after each handler runs.
#[derive(Debug, Clone, Copy)]
pub enum ClientNotice {
    Completed { client: ClientId, request: MemoryRequest },
    Unstalled { client: ClientId },
}

/// Which tier a physical address belongs to, given the DRAM/PCM boundary.
pub fn tier_of_addr(addr: u64, pcm_offset: u64) -> TierId {
    if addr < pcm_offset {
        TierId::Dram
    } else {
        TierId::Pcm
    }
}
