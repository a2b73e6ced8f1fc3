use std::collections::HashMap;

use serde::Serialize;

use crate::engine::Cycle;

/// Per-page access counts for the external migration policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountEntry {
    pub page: u64,
    pub reads: u64,
    pub writes: u64,
}

/// Progress of one in-flight migration, as seen by the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressEntry {
    pub src_page: u64,
    pub dest_page: u64,
    pub blocks_written: u32,
    pub blocks_total: u32,
    pub start_time: Cycle,
}

/// Controller-to-policy notices. The policy driver owns the controller, so
/// the reverse direction is a mailbox it drains rather than a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyEvent {
    /// The completion threshold fired; routing authority for the page has
    /// moved to the destination tier.
    Completed { src_page: u64, dest_page: u64 },
    /// The migration finished and its entry was erased.
    Finished { src_page: u64, dest_page: u64 },
    /// A rolled-back migration finished draining and was erased.
    RollbackDrained { src_page: u64 },
}

#[derive(Debug, Default)]
pub struct MonitorTable {
    counts: HashMap<u64, (u64, u64)>,
    events: Vec<PolicyEvent>,
}

impl MonitorTable {
    pub fn record_access(&mut self, page: u64, is_read: bool) {
        let entry = self.counts.entry(page).or_insert((0, 0));
        if is_read {
            entry.0 = entry.0.saturating_add(1);
        } else {
            entry.1 = entry.1.saturating_add(1);
        }
    }

    /// Hand the accumulated counts to the policy and start a fresh epoch.
    pub fn drain_counts(&mut self) -> Vec<CountEntry> {
        let mut out: Vec<CountEntry> = self
            .counts
            .drain()
            .map(|(page, (reads, writes))| CountEntry {
                page,
                reads,
                writes,
            })
            .collect();
        out.sort_by_key(|entry| entry.page);
        out
    }

    pub fn push_event(&mut self, event: PolicyEvent) {
        self.events.push(event);
    }

    pub fn drain_events(&mut self) -> Vec<PolicyEvent> {
        std::mem::take(&mut self.events)
    }
}
