pub mod bank;
pub mod bus;
pub mod mapping;
pub mod request;
pub mod stats;
pub mod tier;

pub use bank::{Bank, BankAccess, BankOutput, MemoryType, RowBufferPolicy, RowState};
pub use bus::Bus;
pub use mapping::{AddressMapping, Location, MappingType};
pub use request::{
    tier_of_addr, AccessKind, ClientId, ClientNotice, Completion, Endpoint, MemoryRequest,
};
pub use stats::{BankStats, BusStats, TierSnapshot};
pub use tier::{MemoryTier, TierConfig, TierOutput};
