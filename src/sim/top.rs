use std::sync::{Arc, RwLock};

use anyhow::Result;
use serde::Serialize;

use crate::engine::{Cycle, EventQueue};
use crate::event::{Event, TierId};
use crate::hybrid::{
    CountEntry, HybridController, HybridSummary, PolicyEvent, ProgressEntry,
};
use crate::mem::request::{ClientId, ClientNotice, Endpoint, MemoryRequest};
use crate::mem::stats::TierSnapshot;
use crate::mem::tier::{MemoryTier, TierOutput};
use crate::sim::config::SimulatorConfig;

/// The upstream interface: what the cache hierarchy above the memory system
/// must provide to receive completions and retry notifications.
pub trait MemoryClient {
    fn access_completed(&mut self, request: &MemoryRequest, now: Cycle);
    fn unstall(&mut self, now: Cycle);
}

pub type SharedClient = Arc<RwLock<dyn MemoryClient>>;

/// The assembled memory system: event engine, both tiers, the hybrid
/// controller, and the registry of external clients.
pub struct SimTop {
    engine: EventQueue<Event>,
    dram: MemoryTier,
    pcm: MemoryTier,
    hybrid: HybridController,
    clients: Vec<SharedClient>,
    run_limit: u64,
}

impl SimTop {
    pub fn new(config: Arc<SimulatorConfig>) -> Result<SimTop> {
        let debug_start = config.sim.debug_start;
        let dram = MemoryTier::new(TierId::Dram, Arc::new(config.dram.clone()), debug_start)?;
        let pcm = MemoryTier::new(TierId::Pcm, Arc::new(config.pcm.clone()), debug_start)?;
        let hybrid = HybridController::new(
            Arc::new(config.hybrid.clone()),
            config.dram.block_size,
            config.pcm_offset(),
            config.sim.num_processes,
            debug_start,
        );
        Ok(SimTop {
            engine: EventQueue::new(),
            dram,
            pcm,
            hybrid,
            clients: Vec::new(),
            run_limit: config.sim.run_limit,
        })
    }

    pub fn register_client(&mut self, client: SharedClient) -> ClientId {
        self.clients.push(client);
        ClientId(self.clients.len() - 1)
    }

    pub fn now(&self) -> Cycle {
        self.engine.now()
    }

    pub fn events_dispatched(&self) -> u64 {
        self.engine.dispatched()
    }

    /// Submit a foreground request on behalf of a registered client. A false
    /// return means the target tier is saturated; retry after `unstall`.
    pub fn access(&mut self, request: MemoryRequest, client: ClientId) -> bool {
        self.hybrid
            .access(&mut self.engine, &mut self.dram, &mut self.pcm, request, client)
    }

    pub fn copy_page(&mut self, src_page: u64, dest_page: u64) {
        self.hybrid.copy_page(&mut self.engine, src_page, dest_page);
    }

    pub fn rollback(&mut self, src_page: u64) {
        self.hybrid
            .rollback(&mut self.engine, &mut self.dram, &mut self.pcm, src_page);
    }

    pub fn read_counts_and_progress(
        &mut self,
        counts: &mut Vec<CountEntry>,
        progress: &mut Vec<ProgressEntry>,
    ) {
        self.hybrid.read_counts_and_progress(counts, progress);
    }

    pub fn drain_policy_events(&mut self) -> Vec<PolicyEvent> {
        self.hybrid.drain_policy_events()
    }

    /// Whether a (non-erased) migration entry exists for the page.
    pub fn migration_active(&self, page: u64) -> bool {
        self.hybrid.migration_of(page).is_some()
    }

    /// Whether a rolled-back migration of `page` is still draining.
    pub fn rollback_draining(&self, page: u64) -> bool {
        self.hybrid.rollback_draining(page)
    }

    /// Dispatch every event with a timestamp at or before `limit`, then park
    /// the clock there so follow-up injections carry the right timestamp.
    pub fn run_until(&mut self, limit: Cycle) {
        while let Some(event) = self.engine.pop_due(limit) {
            self.dispatch(event);
        }
        self.engine.advance_to(limit);
    }

    pub fn run_to_completion(&mut self) {
        let limit = if self.run_limit > 0 {
            self.run_limit
        } else {
            u64::MAX
        };
        while let Some(event) = self.engine.pop_due(limit) {
            self.dispatch(event);
        }
    }

    /// Dispatch a single event. Returns false when the queue is empty.
    pub fn step(&mut self) -> bool {
        match self.engine.next_timestamp() {
            Some(at) => {
                let event = self.engine.pop_due(at).expect("event at peeked timestamp");
                self.dispatch(event);
                true
            }
            None => false,
        }
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::Bank { tier, bank, step } => {
                let out = match tier {
                    TierId::Dram => self.dram.handle_bank_event(&mut self.engine, bank, step),
                    TierId::Pcm => self.pcm.handle_bank_event(&mut self.engine, bank, step),
                };
                self.deliver(tier, out);
            }
            Event::BusTransfer { tier, bank } => {
                let out = match tier {
                    TierId::Dram => self.dram.handle_bus_event(&mut self.engine, bank),
                    TierId::Pcm => self.pcm.handle_bus_event(&mut self.engine, bank),
                };
                self.deliver(tier, out);
            }
            Event::MigrationCopy { page } => {
                self.hybrid
                    .handle_copy(&mut self.engine, &mut self.dram, &mut self.pcm, page);
            }
            Event::MigrationWrite { page } => {
                self.hybrid
                    .handle_write(&mut self.engine, &mut self.dram, &mut self.pcm, page);
            }
            Event::MigrationTimer { page } => {
                self.hybrid.handle_timer(&mut self.engine, page);
            }
            Event::Notify => {
                let notices = self.hybrid.drain_notifications();
                self.forward(notices);
            }
        }
    }

    fn deliver(&mut self, tier: TierId, out: TierOutput) {
        for (request, origin) in out.completions {
            match origin {
                Endpoint::Hybrid => {
                    let notices = self.hybrid.access_completed(&mut self.engine, request, tier);
                    self.forward(notices);
                }
                Endpoint::Client(client) => {
                    self.forward(vec![ClientNotice::Completed { client, request }]);
                }
            }
        }
        for origin in out.unstalls {
            match origin {
                Endpoint::Hybrid => {
                    let notices =
                        self.hybrid
                            .unstall(&mut self.engine, &mut self.dram, &mut self.pcm, tier);
                    self.forward(notices);
                }
                Endpoint::Client(client) => {
                    self.forward(vec![ClientNotice::Unstalled { client }]);
                }
            }
        }
    }

    fn forward(&mut self, notices: Vec<ClientNotice>) {
        let now = self.engine.now();
        for notice in notices {
            match notice {
                ClientNotice::Completed { client, request } => {
                    self.clients[client.0]
                        .write()
                        .expect("client lock poisoned")
                        .access_completed(&request, now);
                }
                ClientNotice::Unstalled { client } => {
                    self.clients[client.0]
                        .write()
                        .expect("client lock poisoned")
                        .unstall(now);
                }
            }
        }
    }

    pub fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot {
            cycles: self.engine.now(),
            events_dispatched: self.engine.dispatched(),
            dram: self.dram.snapshot(),
            pcm: self.pcm.snapshot(),
            hybrid: self.hybrid.stats().summary(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemSnapshot {
    pub cycles: u64,
    pub events_dispatched: u64,
    pub dram: TierSnapshot,
    pub pcm: TierSnapshot,
    pub hybrid: HybridSummary,
}
