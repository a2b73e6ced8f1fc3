use std::collections::VecDeque;

use crate::engine::{Cycle, EventQueue};
use crate::event::{Event, TierId};
use crate::mem::stats::BusStats;

/// The serial data bus shared by the banks of one tier. At most one transfer
/// is in flight; waiting banks are granted strictly FIFO.
#[derive(Debug)]
pub struct Bus {
    tier: TierId,
    latency: Cycle,
    busy: bool,
    waiting: VecDeque<usize>,
    busy_since: Cycle,
    stats: BusStats,
}

impl Bus {
    pub fn new(tier: TierId, latency: Cycle) -> Self {
        Self {
            tier,
            latency,
            busy: false,
            waiting: VecDeque::new(),
            busy_since: 0,
            stats: BusStats::default(),
        }
    }

    /// A bank asks for the bus. If free, its transfer-complete event is
    /// scheduled immediately; otherwise the bank queues.
    pub fn request(&mut self, engine: &mut EventQueue<Event>, bank: usize) {
        if self.busy {
            self.waiting.push_back(bank);
            self.stats.record_queued(self.waiting.len());
            return;
        }
        self.begin_transfer(engine, bank);
    }

    /// The scheduled transfer finished; grant the next waiter, if any.
    pub fn transfer_completed(&mut self, engine: &mut EventQueue<Event>) {
        debug_assert!(self.busy, "bus transfer completed while idle");
        self.busy = false;
        self.stats
            .record_transfer(engine.now().saturating_sub(self.busy_since));
        if let Some(next) = self.waiting.pop_front() {
            self.begin_transfer(engine, next);
        }
    }

    fn begin_transfer(&mut self, engine: &mut EventQueue<Event>, bank: usize) {
        self.busy = true;
        self.busy_since = engine.now();
        engine.schedule(
            self.latency,
            Event::BusTransfer {
                tier: self.tier,
                bank,
            },
        );
    }

    pub fn stats(&self) -> &BusStats {
        &self.stats
    }
}
