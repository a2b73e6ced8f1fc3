pub mod config;
pub mod report;
pub mod top;
pub mod trace;

pub use config::{Config, SimConfig, SimulatorConfig};
pub use top::{MemoryClient, SharedClient, SimTop, SystemSnapshot};
pub use trace::{load_trace, replay, ReplayClient, TraceCommand, TraceStream};
