use std::ops::AddAssign;

use serde::Serialize;

use crate::engine::Cycle;

/// Counters kept by one bank. Monotonic; reset only at construction.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BankStats {
    num_read_requests: u64,
    num_write_requests: u64,
    read_queue_time: u64,
    write_queue_time: u64,
    read_total_time: u64,
    write_total_time: u64,

    row_buffer_hits: u64,
    row_buffer_misses: u64,

    num_opens: u64,
    num_accesses: u64,
    num_closes: u64,
    open_time: u64,
    access_time: u64,
    close_time: u64,

    num_rars: u64,
    num_raws: u64,
    num_wars: u64,
    num_waws: u64,

    wait_lower_priority_time: u64,
    wait_same_priority_time: u64,
    wait_higher_priority_time: u64,

    rejected_requests: u64,
}

impl BankStats {
    pub fn record_request(&mut self, is_read: bool) {
        if is_read {
            self.num_read_requests = self.num_read_requests.saturating_add(1);
        } else {
            self.num_write_requests = self.num_write_requests.saturating_add(1);
        }
    }

    pub fn record_reject(&mut self) {
        self.rejected_requests = self.rejected_requests.saturating_add(1);
    }

    pub fn record_queue_time(&mut self, is_read: bool, cycles: Cycle) {
        if is_read {
            self.read_queue_time = self.read_queue_time.saturating_add(cycles);
        } else {
            self.write_queue_time = self.write_queue_time.saturating_add(cycles);
        }
    }

    pub fn record_total_time(&mut self, is_read: bool, cycles: Cycle) {
        if is_read {
            self.read_total_time = self.read_total_time.saturating_add(cycles);
        } else {
            self.write_total_time = self.write_total_time.saturating_add(cycles);
        }
    }

    pub fn record_selection(&mut self, row_hit: bool) {
        if row_hit {
            self.row_buffer_hits = self.row_buffer_hits.saturating_add(1);
        } else {
            self.row_buffer_misses = self.row_buffer_misses.saturating_add(1);
        }
    }

    pub fn record_open(&mut self, cycles: Cycle) {
        self.num_opens = self.num_opens.saturating_add(1);
        self.open_time = self.open_time.saturating_add(cycles);
    }

    pub fn record_access(&mut self, cycles: Cycle) {
        self.num_accesses = self.num_accesses.saturating_add(1);
        self.access_time = self.access_time.saturating_add(cycles);
    }

    pub fn record_close(&mut self, cycles: Cycle) {
        self.num_closes = self.num_closes.saturating_add(1);
        self.close_time = self.close_time.saturating_add(cycles);
    }

    pub fn record_rar(&mut self) {
        self.num_rars = self.num_rars.saturating_add(1);
    }

    pub fn record_raw(&mut self) {
        self.num_raws = self.num_raws.saturating_add(1);
    }

    pub fn record_war(&mut self) {
        self.num_wars = self.num_wars.saturating_add(1);
    }

    pub fn record_waw(&mut self) {
        self.num_waws = self.num_waws.saturating_add(1);
    }

    pub fn record_wait(&mut self, lower: bool, same: bool, higher: bool, cycles: Cycle) {
        if lower {
            self.wait_lower_priority_time = self.wait_lower_priority_time.saturating_add(cycles);
        }
        if same {
            self.wait_same_priority_time = self.wait_same_priority_time.saturating_add(cycles);
        }
        if higher {
            self.wait_higher_priority_time = self.wait_higher_priority_time.saturating_add(cycles);
        }
    }

    pub fn num_read_requests(&self) -> u64 {
        self.num_read_requests
    }

    pub fn num_write_requests(&self) -> u64 {
        self.num_write_requests
    }

    pub fn read_queue_time(&self) -> u64 {
        self.read_queue_time
    }

    pub fn write_queue_time(&self) -> u64 {
        self.write_queue_time
    }

    pub fn read_total_time(&self) -> u64 {
        self.read_total_time
    }

    pub fn write_total_time(&self) -> u64 {
        self.write_total_time
    }

    pub fn row_buffer_hits(&self) -> u64 {
        self.row_buffer_hits
    }

    pub fn row_buffer_misses(&self) -> u64 {
        self.row_buffer_misses
    }

    pub fn num_opens(&self) -> u64 {
        self.num_opens
    }

    pub fn num_accesses(&self) -> u64 {
        self.num_accesses
    }

    pub fn num_closes(&self) -> u64 {
        self.num_closes
    }

    pub fn num_rars(&self) -> u64 {
        self.num_rars
    }

    pub fn num_raws(&self) -> u64 {
        self.num_raws
    }

    pub fn num_wars(&self) -> u64 {
        self.num_wars
    }

    pub fn num_waws(&self) -> u64 {
        self.num_waws
    }

    pub fn wait_lower_priority_time(&self) -> u64 {
        self.wait_lower_priority_time
    }

    pub fn wait_same_priority_time(&self) -> u64 {
        self.wait_same_priority_time
    }

    pub fn wait_higher_priority_time(&self) -> u64 {
        self.wait_higher_priority_time
    }

    pub fn rejected_requests(&self) -> u64 {
        self.rejected_requests
    }
}

impl AddAssign<&BankStats> for BankStats {
    fn add_assign(&mut self, other: &BankStats) {
        self.num_read_requests = self.num_read_requests.saturating_add(other.num_read_requests);
        self.num_write_requests = self
            .num_write_requests
            .saturating_add(other.num_write_requests);
        self.read_queue_time = self.read_queue_time.saturating_add(other.read_queue_time);
        self.write_queue_time = self.write_queue_time.saturating_add(other.write_queue_time);
        self.read_total_time = self.read_total_time.saturating_add(other.read_total_time);
        self.write_total_time = self.write_total_time.saturating_add(other.write_total_time);
        self.row_buffer_hits = self.row_buffer_hits.saturating_add(other.row_buffer_hits);
        self.row_buffer_misses = self.row_buffer_misses.saturating_add(other.row_buffer_misses);
        self.num_opens = self.num_opens.saturating_add(other.num_opens);
        self.num_accesses = self.num_accesses.saturating_add(other.num_accesses);
        self.num_closes = self.num_closes.saturating_add(other.num_closes);
        self.open_time = self.open_time.saturating_add(other.open_time);
        self.access_time = self.access_time.saturating_add(other.access_time);
        self.close_time = self.close_time.saturating_add(other.close_time);
        self.num_rars = self.num_rars.saturating_add(other.num_rars);
        self.num_raws = self.num_raws.saturating_add(other.num_raws);
        self.num_wars = self.num_wars.saturating_add(other.num_wars);
        self.num_waws = self.num_waws.saturating_add(other.num_waws);
        self.wait_lower_priority_time = self
            .wait_lower_priority_time
            .saturating_add(other.wait_lower_priority_time);
        self.wait_same_priority_time = self
            .wait_same_priority_time
            .saturating_add(other.wait_same_priority_time);
        self.wait_higher_priority_time = self
            .wait_higher_priority_time
            .saturating_add(other.wait_higher_priority_time);
        self.rejected_requests = self.rejected_requests.saturating_add(other.rejected_requests);
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BusStats {
    transfers: u64,
    busy_time: u64,
    queued_grants: u64,
    max_queue_depth: u64,
}

impl BusStats {
    pub fn record_transfer(&mut self, busy_cycles: Cycle) {
        self.transfers = self.transfers.saturating_add(1);
        self.busy_time = self.busy_time.saturating_add(busy_cycles);
    }

    pub fn record_queued(&mut self, depth: usize) {
        self.queued_grants = self.queued_grants.saturating_add(1);
        self.max_queue_depth = self.max_queue_depth.max(depth as u64);
    }

    pub fn transfers(&self) -> u64 {
        self.transfers
    }

    pub fn busy_time(&self) -> u64 {
        self.busy_time
    }

    pub fn queued_grants(&self) -> u64 {
        self.queued_grants
    }

    pub fn max_queue_depth(&self) -> u64 {
        self.max_queue_depth
    }
}

/// Snapshot of one tier: per-bank counters, their sum, and the bus. Derived
/// ratios are computed here rather than stored.
#[derive(Debug, Clone, Serialize)]
pub struct TierSnapshot {
    pub banks: Vec<BankStats>,
    pub total: BankStats,
    pub bus: BusStats,
    pub row_buffer_hit_fraction: f64,
    pub avg_read_latency: f64,
    pub avg_write_latency: f64,
}

impl TierSnapshot {
    pub fn new(banks: Vec<BankStats>, bus: BusStats) -> Self {
        let mut total = BankStats::default();
        for bank in &banks {
            total += bank;
        }
        let selections = total.row_buffer_hits() + total.row_buffer_misses();
        Self {
            row_buffer_hit_fraction: ratio(total.row_buffer_hits(), selections),
            avg_read_latency: ratio(total.read_total_time(), total.num_read_requests()),
            avg_write_latency: ratio(total.write_total_time(), total.num_write_requests()),
            banks,
            total,
            bus,
        }
    }
}

pub(crate) fn ratio(num: u64, denom: u64) -> f64 {
    if denom == 0 {
        0.0
    } else {
        num as f64 / denom as f64
    }
}
