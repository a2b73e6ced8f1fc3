use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::engine::{Cycle, EventQueue};
use crate::event::{BankStep, Event, TierId};
use crate::mem::request::{Completion, Endpoint, MemoryRequest};
use crate::mem::stats::BankStats;
use crate::mem::tier::TierConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RowBufferPolicy {
    #[default]
    OpenPage,
    ClosedPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    #[default]
    DestructiveReads,
    NonDestructiveReads,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowState {
    Closed,
    Opening,
    OpenClean,
    OpenDirty,
    Closing,
}

/// A request sitting in the bank queue, with the timing side-table the core
/// keeps instead of mutating the request.
#[derive(Debug)]
struct QueuedRequest {
    request: MemoryRequest,
    origin: Endpoint,
    row: u64,
    column: u64,
    block_addr: u64,
    /// Arrival order across priority levels, for dependence classification.
    seq: u64,
    enqueued_at: Cycle,
    waited_on_lower: bool,
    waited_on_same: bool,
    waited_on_higher: bool,
    /// Younger reads to the same block piggybacking on this access.
    merged: Vec<(MemoryRequest, Endpoint, Cycle)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Opening,
    Closing,
    Accessing,
    Transferring,
}

#[derive(Debug)]
struct InFlight {
    entry: QueuedRequest,
    phase: Phase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankAccess {
    Rejected,
    Accepted { dequeued: bool },
}

/// What a bank event produced, for the tier to act on: completions to funnel
/// upstream, whether queue capacity was freed (the tier's unstall edge), and
/// whether the bank now wants the bus.
#[derive(Debug, Default)]
pub struct BankOutput {
    pub completions: Vec<Completion>,
    pub dequeued: bool,
    pub wants_bus: bool,
}

pub struct Bank {
    tier: TierId,
    index: usize,
    config: Arc<TierConfig>,
    debug_start: Cycle,

    state: RowState,
    row: u64,
    dirty_columns: u64,
    pending_close_cost: Cycle,

    /// priority -> FIFO, highest priority served first. Levels are removed
    /// when drained so iteration only sees live ones.
    queue: BTreeMap<u8, VecDeque<QueuedRequest>>,
    current: Option<InFlight>,
    arrival_seq: u64,

    stats: BankStats,
}

impl Bank {
    pub fn new(tier: TierId, index: usize, config: Arc<TierConfig>, debug_start: Cycle) -> Self {
        Self {
            tier,
            index,
            config,
            debug_start,
            state: RowState::Closed,
            row: 0,
            dirty_columns: 0,
            pending_close_cost: 0,
            queue: BTreeMap::new(),
            current: None,
            arrival_seq: 0,
            stats: BankStats::default(),
        }
    }

    pub fn stats(&self) -> &BankStats {
        &self.stats
    }

    pub fn state(&self) -> RowState {
        self.state
    }

    pub fn open_row(&self) -> Option<u64> {
        match self.state {
            RowState::OpenClean | RowState::OpenDirty => Some(self.row),
            _ => None,
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.values().map(|level| level.len()).sum()
    }

    fn row_op_in_flight(&self) -> bool {
        self.current.is_some() || matches!(self.state, RowState::Opening | RowState::Closing)
    }

    /// Accept or reject a request. Acceptance is the obligation to eventually
    /// produce a completion for it.
    pub fn access(
        &mut self,
        engine: &mut EventQueue<Event>,
        request: MemoryRequest,
        origin: Endpoint,
        row: u64,
        column: u64,
        block_addr: u64,
    ) -> BankAccess {
        if let Some(cap) = self.config.queue_cap_value() {
            let level_len = self.queue.get(&request.priority).map_or(0, |l| l.len());
            if level_len >= cap {
                self.stats.record_reject();
                return BankAccess::Rejected;
            }
        }

        let now = engine.now();
        if self.record_dependences(engine, request, origin, block_addr) {
            // Read merged onto an older queued read to the same block.
            self.stats.record_request(true);
            return BankAccess::Accepted { dequeued: false };
        }
        self.stats.record_request(request.kind.is_read());

        if now >= self.debug_start {
            trace!(
                "{}.bank{}: queue {:?} id={} addr={:#x} row={} prio={}",
                self.tier.name(),
                self.index,
                request.kind,
                request.id,
                request.addr,
                row,
                request.priority
            );
        }

        let seq = self.arrival_seq;
        self.arrival_seq += 1;
        self.queue
            .entry(request.priority)
            .or_default()
            .push_back(QueuedRequest {
                request,
                origin,
                row,
                column,
                block_addr,
                seq,
                enqueued_at: now,
                waited_on_lower: false,
                waited_on_same: false,
                waited_on_higher: false,
                merged: Vec::new(),
            });

        let mut dequeued = false;
        if !self.row_op_in_flight() {
            dequeued = self.select_and_start(engine);
        }
        BankAccess::Accepted { dequeued }
    }

    /// Same-block dependence bookkeeping against the newest older access to
    /// the block. Returns true when the new request was merged (read behind
    /// an older queued read) and must not be enqueued.
    fn record_dependences(
        &mut self,
        engine: &EventQueue<Event>,
        request: MemoryRequest,
        origin: Endpoint,
        block_addr: u64,
    ) -> bool {
        // (arrival seq, queue position or None for the in-flight request,
        // whether that older access is a read)
        let mut newest: Option<(u64, Option<(u8, usize)>, bool)> = None;
        for (&prio, level) in self.queue.iter() {
            for (idx, older) in level.iter().enumerate() {
                if older.block_addr == block_addr
                    && newest.map_or(true, |(seq, _, _)| older.seq > seq)
                {
                    newest = Some((older.seq, Some((prio, idx)), older.request.kind.is_read()));
                }
            }
        }
        if let Some(current) = &self.current {
            if current.entry.block_addr == block_addr
                && newest.map_or(true, |(seq, _, _)| current.entry.seq > seq)
            {
                newest = Some((
                    current.entry.seq,
                    None,
                    current.entry.request.kind.is_read(),
                ));
            }
        }
        let Some((_, position, older_is_read)) = newest else {
            return false;
        };
        match (older_is_read, request.kind.is_read()) {
            (true, true) => {
                self.stats.record_rar();
                if let Some((prio, idx)) = position {
                    let level = self.queue.get_mut(&prio).expect("matched level exists");
                    level[idx].merged.push((request, origin, engine.now()));
                    return true;
                }
            }
            (true, false) => self.stats.record_war(),
            (false, true) => self.stats.record_raw(),
            (false, false) => self.stats.record_waw(),
        }
        false
    }

    /// Pick the next request per the scheduling policy: highest non-empty
    /// priority level, row hit preferred within it, FIFO tie-break. With
    /// `first_ready_across_priorities` any row hit wins first, scanning
    /// priorities high to low.
    fn select_request(&self) -> Option<(u8, usize)> {
        let open_row = self.open_row();
        if self.config.first_ready_across_priorities {
            if let Some(row) = open_row {
                for (&prio, level) in self.queue.iter().rev() {
                    if let Some(idx) = level.iter().position(|q| q.row == row) {
                        return Some((prio, idx));
                    }
                }
            }
        }
        let (&prio, level) = self.queue.iter().rev().next()?;
        let idx = open_row
            .and_then(|row| level.iter().position(|q| q.row == row))
            .unwrap_or(0);
        Some((prio, idx))
    }

    fn select_and_start(&mut self, engine: &mut EventQueue<Event>) -> bool {
        debug_assert!(!self.row_op_in_flight());
        let Some((prio, idx)) = self.select_request() else {
            return false;
        };

        for (&level_prio, level) in self.queue.iter_mut() {
            for (i, passed) in level.iter_mut().enumerate() {
                if level_prio == prio && i == idx {
                    continue;
                }
                match prio.cmp(&passed.request.priority) {
                    Ordering::Less => passed.waited_on_lower = true,
                    Ordering::Equal => passed.waited_on_same = true,
                    Ordering::Greater => passed.waited_on_higher = true,
                }
            }
        }

        let level = self.queue.get_mut(&prio).expect("selected level exists");
        let entry = level.remove(idx).expect("selected index exists");
        if level.is_empty() {
            self.queue.remove(&prio);
        }

        let now = engine.now();
        let waited = now - entry.enqueued_at;
        let hit = self.open_row() == Some(entry.row);
        self.stats.record_selection(hit);
        self.stats
            .record_queue_time(entry.request.kind.is_read(), waited);
        self.stats.record_wait(
            entry.waited_on_lower,
            entry.waited_on_same,
            entry.waited_on_higher,
            waited,
        );

        self.current = Some(InFlight {
            entry,
            phase: Phase::Accessing,
        });
        self.advance_current(engine);
        true
    }

    /// Drive the row-buffer sequence for the current request from whatever
    /// state the bank is in.
    fn advance_current(&mut self, engine: &mut EventQueue<Event>) {
        let row = self
            .current
            .as_ref()
            .expect("advance_current without a request")
            .entry
            .row;
        match self.state {
            RowState::Closed => {
                self.state = RowState::Opening;
                self.set_phase(Phase::Opening);
                self.schedule_step(engine, self.config.open_latency, BankStep::Opened);
            }
            RowState::OpenClean | RowState::OpenDirty if self.row == row => {
                self.set_phase(Phase::Accessing);
                self.schedule_step(engine, self.config.access_latency, BankStep::AccessReady);
            }
            RowState::OpenClean | RowState::OpenDirty => {
                self.set_phase(Phase::Closing);
                if self.begin_close(engine) {
                    self.advance_current(engine);
                }
            }
            RowState::Opening | RowState::Closing => panic!(
                "{}.bank{}: starting a row operation while one is in flight (state {:?})",
                self.tier.name(),
                self.index,
                self.state
            ),
        }
    }

    /// Start closing the open row. Returns true if the close was immediate
    /// (non-destructive reads, clean row); otherwise a Closed event is
    /// scheduled and the caller waits for it.
    fn begin_close(&mut self, engine: &mut EventQueue<Event>) -> bool {
        debug_assert!(matches!(
            self.state,
            RowState::OpenClean | RowState::OpenDirty
        ));
        if self.config.memory_type == MemoryType::NonDestructiveReads
            && self.state == RowState::OpenClean
        {
            self.state = RowState::Closed;
            self.dirty_columns = 0;
            self.stats.record_close(0);
            return true;
        }
        self.pending_close_cost = self.close_cost();
        self.state = RowState::Closing;
        self.schedule_step(engine, self.pending_close_cost, BankStep::Closed);
        false
    }

    fn close_cost(&self) -> Cycle {
        if self.config.long_close_latency {
            self.config.close_latency * (1 + self.dirty_columns.count_ones() as u64)
        } else {
            self.config.close_latency
        }
    }

    pub fn handle_step(&mut self, engine: &mut EventQueue<Event>, step: BankStep) -> BankOutput {
        let mut out = BankOutput::default();
        match step {
            BankStep::Opened => {
                assert_eq!(
                    self.state,
                    RowState::Opening,
                    "{}.bank{}: open finished in state {:?}",
                    self.tier.name(),
                    self.index,
                    self.state
                );
                let current = self.current.as_mut().expect("open without a request");
                self.state = RowState::OpenClean;
                self.row = current.entry.row;
                current.phase = Phase::Accessing;
                self.stats.record_open(self.config.open_latency);
                self.schedule_step(engine, self.config.access_latency, BankStep::AccessReady);
            }
            BankStep::Closed => {
                assert_eq!(
                    self.state,
                    RowState::Closing,
                    "{}.bank{}: close finished in state {:?}",
                    self.tier.name(),
                    self.index,
                    self.state
                );
                self.state = RowState::Closed;
                self.dirty_columns = 0;
                self.stats.record_close(self.pending_close_cost);
                if self.current.is_some() {
                    self.advance_current(engine);
                } else if !self.queue.is_empty() {
                    out.dequeued = self.select_and_start(engine);
                }
            }
            BankStep::AccessReady => {
                let current = self.current.as_mut().expect("access without a request");
                assert_eq!(
                    current.phase,
                    Phase::Accessing,
                    "{}.bank{}: access finished in phase {:?}",
                    self.tier.name(),
                    self.index,
                    current.phase
                );
                self.stats.record_access(self.config.access_latency);
                if current.entry.request.kind.is_write() {
                    self.dirty_columns |= 1 << current.entry.column;
                    self.state = RowState::OpenDirty;
                }
                current.phase = Phase::Transferring;
                out.wants_bus = true;
            }
        }
        out
    }

    /// The bus finished moving this bank's data: the access is complete.
    pub fn transfer_completed(&mut self, engine: &mut EventQueue<Event>) -> BankOutput {
        let inflight = self.current.take().expect("bus transfer without a request");
        assert_eq!(
            inflight.phase,
            Phase::Transferring,
            "{}.bank{}: bus transfer in phase {:?}",
            self.tier.name(),
            self.index,
            inflight.phase
        );

        let now = engine.now();
        let entry = inflight.entry;
        self.stats
            .record_total_time(entry.request.kind.is_read(), now - entry.enqueued_at);

        if now >= self.debug_start {
            trace!(
                "{}.bank{}: completed id={} addr={:#x} (+{} merged)",
                self.tier.name(),
                self.index,
                entry.request.id,
                entry.request.addr,
                entry.merged.len()
            );
        }

        let mut out = BankOutput::default();
        out.completions.push((entry.request, entry.origin));
        for (request, origin, enqueued_at) in entry.merged {
            self.stats
                .record_total_time(request.kind.is_read(), now - enqueued_at);
            out.completions.push((request, origin));
        }

        if self.config.row_buffer_policy == RowBufferPolicy::ClosedPage
            && self.open_row().is_some()
            && !self.queue_targets_row(self.row)
        {
            self.begin_close(engine);
        }
        if !self.row_op_in_flight() && !self.queue.is_empty() {
            out.dequeued = self.select_and_start(engine);
        }
        out
    }

    fn queue_targets_row(&self, row: u64) -> bool {
        self.queue
            .values()
            .any(|level| level.iter().any(|q| q.row == row))
    }

    fn set_phase(&mut self, phase: Phase) {
        if let Some(current) = self.current.as_mut() {
            current.phase = phase;
        }
    }

    fn schedule_step(&self, engine: &mut EventQueue<Event>, delay: Cycle, step: BankStep) {
        engine.schedule(
            delay,
            Event::Bank {
                tier: self.tier,
                bank: self.index,
                step,
            },
        );
    }
}
