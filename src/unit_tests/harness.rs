//! Shared scaffolding for the unit tests: small configurations, a recording
//! client, and a dispatch loop for driving a tier without the full system.

use std::sync::{Arc, RwLock};

use crate::engine::{Cycle, EventQueue};
use crate::event::{Event, TierId};
use crate::hybrid::HybridConfig;
use crate::mem::bank::MemoryType;
use crate::mem::mapping::MappingType;
use crate::mem::request::{ClientId, Endpoint, MemoryRequest};
use crate::mem::tier::{MemoryTier, TierConfig};
use crate::sim::config::SimulatorConfig;
use crate::sim::top::{MemoryClient, SimTop};

/// Bank timing used by the scheduling scenarios: open 10, access 4, close 10,
/// no bus latency.
pub fn bank_tier_config() -> TierConfig {
    TierConfig {
        mapping_type: MappingType::RowRankBankCol,
        num_ranks: 1,
        banks_per_rank: 4,
        rows_per_bank: 64,
        blocks_per_row: 8,
        block_size: 64,
        open_latency: 10,
        close_latency: 10,
        access_latency: 4,
        bus_latency: 0,
        queue_cap: 0,
        ..TierConfig::default()
    }
}

pub fn make_tier(config: TierConfig) -> (EventQueue<Event>, MemoryTier) {
    let tier = MemoryTier::new(TierId::Dram, Arc::new(config), u64::MAX).expect("valid config");
    (EventQueue::new(), tier)
}

/// System configuration used by the hybrid/migration scenarios. Blocks of a
/// page land in distinct banks (rank/bank bits right below the column bits),
/// a DRAM read completes in 20 cycles and a PCM access in 34, and both tiers
/// are 128 KiB so DRAM pages are 0..512 and PCM pages 512..1024.
pub fn small_system_config() -> SimulatorConfig {
    let mut config = SimulatorConfig::default();
    config.sim.num_processes = 2;
    config.dram = TierConfig {
        mapping_type: MappingType::RowColRankBank,
        num_ranks: 1,
        banks_per_rank: 4,
        rows_per_bank: 64,
        blocks_per_row: 8,
        block_size: 64,
        open_latency: 16,
        close_latency: 10,
        access_latency: 4,
        bus_latency: 0,
        queue_cap: 0,
        ..TierConfig::default()
    };
    config.pcm = TierConfig {
        mapping_type: MappingType::RowColRankBank,
        num_ranks: 1,
        banks_per_rank: 4,
        rows_per_bank: 64,
        blocks_per_row: 8,
        block_size: 64,
        open_latency: 30,
        close_latency: 40,
        access_latency: 4,
        bus_latency: 0,
        queue_cap: 0,
        memory_type: MemoryType::NonDestructiveReads,
        ..TierConfig::default()
    };
    config.hybrid = HybridConfig {
        page_size: 256,
        dram_migration_read_delay: 0,
        dram_migration_write_delay: 0,
        pcm_migration_read_delay: 0,
        pcm_migration_write_delay: 0,
        ..HybridConfig::default()
    };
    config
}

pub const PAGE_SIZE: u64 = 256;
pub const BLOCK_SIZE: u64 = 64;
/// First PCM page in `small_system_config`.
pub const PCM_PAGE_BASE: u64 = 512;

pub fn block_addr(page: u64, block: u64) -> u64 {
    page * PAGE_SIZE + block * BLOCK_SIZE
}

#[derive(Default)]
pub struct Recorder {
    pub completions: Vec<(MemoryRequest, Cycle)>,
    pub unstalls: u64,
}

impl Recorder {
    pub fn completion_time(&self, id: u64) -> Option<Cycle> {
        self.completions
            .iter()
            .find(|(request, _)| request.id == id)
            .map(|(_, at)| *at)
    }
}

impl MemoryClient for Recorder {
    fn access_completed(&mut self, request: &MemoryRequest, now: Cycle) {
        self.completions.push((*request, now));
    }

    fn unstall(&mut self, _now: Cycle) {
        self.unstalls += 1;
    }
}

pub fn test_top(config: SimulatorConfig) -> (SimTop, Arc<RwLock<Recorder>>, ClientId) {
    let mut top = SimTop::new(Arc::new(config)).expect("valid config");
    let recorder = Arc::new(RwLock::new(Recorder::default()));
    let client = top.register_client(recorder.clone());
    (top, recorder, client)
}

pub struct TierRun {
    pub completions: Vec<(Cycle, MemoryRequest)>,
    pub unstalls: Vec<Endpoint>,
}

/// Dispatch every event up to `limit` against a lone tier, collecting what it
/// produced, and park the clock at `limit`.
pub fn run_tier(engine: &mut EventQueue<Event>, tier: &mut MemoryTier, limit: Cycle) -> TierRun {
    let mut run = TierRun {
        completions: Vec::new(),
        unstalls: Vec::new(),
    };
    while let Some(event) = engine.pop_due(limit) {
        let out = match event {
            Event::Bank { bank, step, .. } => tier.handle_bank_event(engine, bank, step),
            Event::BusTransfer { bank, .. } => tier.handle_bus_event(engine, bank),
            _ => continue,
        };
        for (request, _) in out.completions {
            run.completions.push((engine.now(), request));
        }
        run.unstalls.extend(out.unstalls);
    }
    engine.advance_to(limit);
    run
}

pub const CLIENT: Endpoint = Endpoint::Client(ClientId(0));
