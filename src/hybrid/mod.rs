pub mod migration;
pub mod monitor;
pub mod stats;

pub use migration::{BlockEntry, BlockState, Caller, MigrationEntry};
pub use monitor::{CountEntry, MonitorTable, PolicyEvent, ProgressEntry};
pub use stats::{HybridStats, HybridSummary};

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use log::debug;
use serde::Deserialize;

use crate::engine::{Cycle, EventQueue};
use crate::event::{Event, TierId};
use crate::mem::request::{
    tier_of_addr, AccessKind, ClientId, ClientNotice, Endpoint, MemoryRequest,
};
use crate::mem::tier::MemoryTier;

/// Ids the controller assigns to its own migration traffic live above this
/// base so they can never collide with caller-chosen ids.
pub const INTERNAL_ID_BASE: u64 = 1 << 63;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HybridConfig {
    pub page_size: u64,
    pub dram_migration_read_delay: u64,
    pub dram_migration_write_delay: u64,
    pub pcm_migration_read_delay: u64,
    pub pcm_migration_write_delay: u64,
    /// Remaining block-writes at or below which routing authority flips to
    /// the destination; 0 disables the early flip.
    pub completion_threshold: u32,
    pub elide_clean_dram_blocks: bool,
    pub fixed_pcm_migration_cost: bool,
    pub pcm_migration_cost: u64,
    /// Addresses below this belong to DRAM; 0 means "DRAM tier size".
    pub pcm_offset: u64,
    pub migration_priority: u8,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            page_size: 4096,
            dram_migration_read_delay: 4,
            dram_migration_write_delay: 4,
            pcm_migration_read_delay: 8,
            pcm_migration_write_delay: 32,
            completion_threshold: 0,
            elide_clean_dram_blocks: false,
            fixed_pcm_migration_cost: false,
            pcm_migration_cost: 10_000,
            pcm_offset: 0,
            migration_priority: 0,
        }
    }
}

/// Routing context for one outbound request, kept until its completion.
#[derive(Debug, Clone, Copy)]
struct CallbackEntry {
    /// `None` for controller-generated migration traffic.
    client: Option<ClientId>,
    /// The address the caller used, restored before delivery.
    callback_addr: u64,
    part_of_migration: bool,
    /// Source page of the migration this request belongs to, if any.
    page: u64,
    start_time: Cycle,
}

enum Route {
    Tier(TierId, u64),
    Buffer,
    Defer,
}

pub struct HybridController {
    config: Arc<HybridConfig>,
    blocks_per_page: u32,
    page_bits: u32,
    block_bits: u32,
    pcm_offset: u64,
    debug_start: Cycle,

    migrations: HashMap<u64, MigrationEntry>,
    /// Source page -> destination page of migrations abandoned but still
    /// draining outstanding tier traffic.
    rolled_back: HashMap<u64, u64>,
    callbacks: HashMap<u64, CallbackEntry>,

    /// Pages whose migration stalled while reading from / writing to a tier.
    stalled_on_read: Vec<u64>,
    stalled_on_write: Vec<u64>,
    /// Foreground callers stalled per tier, in registration order.
    dram_stalled: Vec<ClientId>,
    pcm_stalled: Vec<ClientId>,
    /// Deferred callers re-routed at rollback that hit a saturated tier.
    pending_reroutes: Vec<(TierId, Caller)>,

    /// Buffer-served completions awaiting the zero-delay NOTIFY event.
    notifications: VecDeque<(ClientId, MemoryRequest)>,

    /// Per-DRAM-page block dirtiness since the page arrived, for elision.
    dirties: HashMap<u64, Vec<bool>>,
    /// DRAM page -> PCM page it was last copied in from, unmodified.
    provenance: HashMap<u64, u64>,

    monitor: MonitorTable,
    next_internal_id: u64,
    stats: HybridStats,
}

fn tier_mut<'a>(
    tier: TierId,
    dram: &'a mut MemoryTier,
    pcm: &'a mut MemoryTier,
) -> &'a mut MemoryTier {
    match tier {
        TierId::Dram => dram,
        TierId::Pcm => pcm,
    }
}

impl HybridController {
    pub fn new(
        config: Arc<HybridConfig>,
        block_size: u64,
        pcm_offset: u64,
        num_processes: usize,
        debug_start: Cycle,
    ) -> Self {
        let blocks_per_page = (config.page_size / block_size) as u32;
        Self {
            blocks_per_page,
            page_bits: config.page_size.trailing_zeros(),
            block_bits: block_size.trailing_zeros(),
            pcm_offset,
            debug_start,
            config,
            migrations: HashMap::new(),
            rolled_back: HashMap::new(),
            callbacks: HashMap::new(),
            stalled_on_read: Vec::new(),
            stalled_on_write: Vec::new(),
            dram_stalled: Vec::new(),
            pcm_stalled: Vec::new(),
            pending_reroutes: Vec::new(),
            notifications: VecDeque::new(),
            dirties: HashMap::new(),
            provenance: HashMap::new(),
            monitor: MonitorTable::default(),
            next_internal_id: INTERNAL_ID_BASE,
            stats: HybridStats::new(num_processes),
        }
    }

    pub fn stats(&self) -> &HybridStats {
        &self.stats
    }

    pub fn page_of(&self, addr: u64) -> u64 {
        addr >> self.page_bits
    }

    fn block_of(&self, addr: u64) -> usize {
        ((addr & (self.config.page_size - 1)) >> self.block_bits) as usize
    }

    fn page_base(&self, page: u64) -> u64 {
        page << self.page_bits
    }

    fn block_addr(&self, page: u64, block: usize) -> u64 {
        self.page_base(page) | ((block as u64) << self.block_bits)
    }

    fn alloc_internal_id(&mut self) -> u64 {
        let id = self.next_internal_id;
        self.next_internal_id += 1;
        id
    }

    pub fn migration_of(&self, page: u64) -> Option<&MigrationEntry> {
        self.migrations.get(&page)
    }

    /// Whether a rolled-back migration of `page` is still draining.
    pub fn rollback_draining(&self, page: u64) -> bool {
        self.rolled_back.contains_key(&page)
    }

    /// Foreground entry point. Returns false when the target tier rejected
    /// the request; the caller must retry after its unstall notice.
    pub fn access(
        &mut self,
        engine: &mut EventQueue<Event>,
        dram: &mut MemoryTier,
        pcm: &mut MemoryTier,
        request: MemoryRequest,
        client: ClientId,
    ) -> bool {
        debug_assert!(
            request.id < INTERNAL_ID_BASE,
            "caller request ids must stay below the internal id space"
        );
        let page = self.page_of(request.addr);
        let block = self.block_of(request.addr);
        self.monitor.record_access(page, request.kind.is_read());

        let route = match self.migrations.get_mut(&page) {
            Some(entry) if entry.rolled_back => Route::Tier(entry.src, request.addr),
            Some(entry) => match entry.blocks[block].state {
                BlockState::Written => {
                    let dest_addr =
                        (entry.dest_page << self.page_bits) | (request.addr & (self.config.page_size - 1));
                    Route::Tier(entry.dest, dest_addr)
                }
                BlockState::Buffered => {
                    if request.kind.is_write() {
                        entry.blocks[block].dirty = true;
                    }
                    Route::Buffer
                }
                BlockState::Reading => {
                    entry.blocks[block].callers.push(Caller { request, client });
                    Route::Defer
                }
                BlockState::NotRead => Route::Tier(entry.src, request.addr),
            },
            None => Route::Tier(tier_of_addr(request.addr, self.pcm_offset), request.addr),
        };

        match route {
            Route::Defer => true,
            Route::Buffer => {
                self.stats.record_buffer(request.kind.is_read());
                self.notifications.push_back((client, request));
                engine.schedule(0, Event::Notify);
                true
            }
            Route::Tier(tier, effective_addr) => {
                self.route_foreground(engine, dram, pcm, request, client, tier, effective_addr)
            }
        }
    }

    fn route_foreground(
        &mut self,
        engine: &mut EventQueue<Event>,
        dram: &mut MemoryTier,
        pcm: &mut MemoryTier,
        request: MemoryRequest,
        client: ClientId,
        tier: TierId,
        effective_addr: u64,
    ) -> bool {
        let mut routed = request;
        routed.addr = effective_addr;
        if !tier_mut(tier, dram, pcm).access(engine, routed, Endpoint::Hybrid) {
            let stalled = match tier {
                TierId::Dram => &mut self.dram_stalled,
                TierId::Pcm => &mut self.pcm_stalled,
            };
            if !stalled.contains(&client) {
                stalled.push(client);
            }
            return false;
        }
        let previous = self.callbacks.insert(
            request.id,
            CallbackEntry {
                client: Some(client),
                callback_addr: request.addr,
                part_of_migration: false,
                page: 0,
                start_time: engine.now(),
            },
        );
        assert!(
            previous.is_none(),
            "request id {} is already in flight",
            request.id
        );
        self.stats.record_access(tier, request.kind, request.pid);
        if request.kind.is_write() && tier == TierId::Dram {
            let page = self.page_of(effective_addr);
            let block = self.block_of(effective_addr);
            if let Some(bits) = self.dirties.get_mut(&page) {
                bits[block] = true;
            }
        }
        true
    }

    /// A tier finished one of our requests.
    pub fn access_completed(
        &mut self,
        engine: &mut EventQueue<Event>,
        request: MemoryRequest,
        from: TierId,
    ) -> Vec<ClientNotice> {
        let cb = self.callbacks.remove(&request.id).unwrap_or_else(|| {
            panic!(
                "completion for unknown request id {} from {}",
                request.id,
                from.name()
            )
        });
        let elapsed = engine.now() - cb.start_time;
        if cb.part_of_migration {
            self.stats.record_copy_time(from, request.kind, elapsed);
            match request.kind {
                AccessKind::Read => self.migration_read_returned(engine, cb.page, request),
                AccessKind::Write => self.migration_write_returned(engine, cb.page),
            }
            Vec::new()
        } else {
            self.stats
                .record_access_time(from, request.kind, request.pid, elapsed);
            let mut restored = request;
            restored.addr = cb.callback_addr;
            vec![ClientNotice::Completed {
                client: cb.client.expect("foreground callback without a client"),
                request: restored,
            }]
        }
    }

    fn migration_read_returned(
        &mut self,
        engine: &mut EventQueue<Event>,
        page: u64,
        request: MemoryRequest,
    ) {
        let mut entry = self.migrations.remove(&page).unwrap_or_else(|| {
            panic!("migration read returned for page {page:#x} with no entry")
        });
        entry.blocks_left_to_complete_read -= 1;

        if entry.rolled_back {
            if entry.is_drained() {
                self.rolled_back.remove(&page);
                self.monitor
                    .push_event(PolicyEvent::RollbackDrained { src_page: page });
            } else {
                self.migrations.insert(page, entry);
            }
            return;
        }

        let block = self.block_of(request.addr);
        let slot = &mut entry.blocks[block];
        assert_eq!(
            slot.state,
            BlockState::Reading,
            "page {page:#x} block {block}: read returned in state {:?}",
            slot.state
        );
        slot.state = BlockState::Buffered;
        slot.request = None;
        let mut released = 0;
        for caller in slot.callers.drain(..) {
            if caller.request.kind.is_write() {
                slot.dirty = true;
            }
            self.stats.record_buffer(caller.request.kind.is_read());
            self.notifications.push_back((caller.client, caller.request));
            released += 1;
        }
        if released > 0 {
            engine.schedule(0, Event::Notify);
        }

        if self.config.fixed_pcm_migration_cost && entry.dest == TierId::Pcm {
            if entry.blocks_left_to_complete_read == 0 {
                engine.schedule(
                    self.config.pcm_migration_cost,
                    Event::MigrationTimer { page },
                );
            }
        } else if !entry.write_event_pending {
            let now = engine.now();
            let at = entry
                .last_write
                .map(|last| last + entry.write_delay)
                .unwrap_or(now)
                .max(now);
            engine.schedule(at - now, Event::MigrationWrite { page });
            entry.write_event_pending = true;
        }
        self.migrations.insert(page, entry);
    }

    fn migration_write_returned(&mut self, engine: &mut EventQueue<Event>, page: u64) {
        let mut entry = self.migrations.remove(&page).unwrap_or_else(|| {
            panic!("migration write returned for page {page:#x} with no entry")
        });
        entry.writes_outstanding -= 1;

        if entry.rolled_back {
            if entry.is_drained() {
                self.rolled_back.remove(&page);
                self.monitor
                    .push_event(PolicyEvent::RollbackDrained { src_page: page });
            } else {
                self.migrations.insert(page, entry);
            }
            return;
        }

        if entry.blocks_left_to_write == 0 && entry.writes_outstanding == 0 {
            self.finish_migration(engine, page, entry);
        } else {
            self.migrations.insert(page, entry);
        }
    }

    /// Start migrating `src_page` to `dest_page`. One migration per source
    /// page; source and destination pages must not take part in any other
    /// in-flight (or still-draining) migration.
    pub fn copy_page(&mut self, engine: &mut EventQueue<Event>, src_page: u64, dest_page: u64) {
        if self.migrations.contains_key(&src_page) {
            panic!("page {src_page:#x} is already being migrated");
        }
        if self.migrations.contains_key(&dest_page)
            || self
                .migrations
                .values()
                .any(|e| e.dest_page == src_page || e.dest_page == dest_page)
        {
            panic!(
                "migration {src_page:#x} -> {dest_page:#x} overlaps an in-flight migration"
            );
        }

        let src = tier_of_addr(self.page_base(src_page), self.pcm_offset);
        let dest = tier_of_addr(self.page_base(dest_page), self.pcm_offset);
        let read_delay = match src {
            TierId::Dram => self.config.dram_migration_read_delay,
            TierId::Pcm => self.config.pcm_migration_read_delay,
        };
        let write_delay = match dest {
            TierId::Dram => self.config.dram_migration_write_delay,
            TierId::Pcm => self.config.pcm_migration_write_delay,
        };

        let now = engine.now();
        if now >= self.debug_start {
            debug!(
                "copy page {:#x} ({}) -> {:#x} ({}) at {}",
                src_page,
                src.name(),
                dest_page,
                dest.name(),
                now
            );
        }
        self.stats.record_page_copy(dest);
        self.migrations.insert(
            src_page,
            MigrationEntry::new(
                src_page,
                dest_page,
                src,
                dest,
                read_delay,
                write_delay,
                self.blocks_per_page,
                now,
            ),
        );
        engine.schedule(0, Event::MigrationCopy { page: src_page });
    }

    /// COPY event: issue block reads round-robin from `next_read_block`.
    pub fn handle_copy(
        &mut self,
        engine: &mut EventQueue<Event>,
        dram: &mut MemoryTier,
        pcm: &mut MemoryTier,
        page: u64,
    ) {
        let Some(mut entry) = self.migrations.remove(&page) else {
            return; // erased by a drained rollback; stale event
        };
        if entry.rolled_back {
            self.migrations.insert(page, entry);
            return;
        }

        let now = engine.now();
        while entry.blocks_left_to_read > 0 {
            let block = entry.next_read_block;
            debug_assert_eq!(entry.blocks[block].state, BlockState::NotRead);
            let id = self.alloc_internal_id();
            let request = MemoryRequest {
                id,
                addr: self.block_addr(page, block),
                kind: AccessKind::Read,
                priority: self.config.migration_priority,
                pid: None,
                user: 0,
            };
            if tier_mut(entry.src, dram, pcm).access(engine, request, Endpoint::Hybrid) {
                self.callbacks.insert(
                    id,
                    CallbackEntry {
                        client: None,
                        callback_addr: request.addr,
                        part_of_migration: true,
                        page,
                        start_time: now,
                    },
                );
                let slot = &mut entry.blocks[block];
                slot.state = BlockState::Reading;
                slot.request = Some(id);
                slot.start_time = now;
                entry.blocks_left_to_read -= 1;
                entry.next_read_block += 1;
                self.stats.record_copy_access(entry.src, AccessKind::Read);
                if entry.read_delay > 0 && entry.blocks_left_to_read > 0 {
                    engine.schedule(entry.read_delay, Event::MigrationCopy { page });
                    break;
                }
            } else {
                if !self.stalled_on_read.contains(&page) {
                    self.stalled_on_read.push(page);
                }
                break;
            }
        }
        self.migrations.insert(page, entry);
    }

    /// WRITE event: issue block writes in block order from `next_write_block`.
    pub fn handle_write(
        &mut self,
        engine: &mut EventQueue<Event>,
        dram: &mut MemoryTier,
        pcm: &mut MemoryTier,
        page: u64,
    ) {
        let Some(mut entry) = self.migrations.remove(&page) else {
            return;
        };
        entry.write_event_pending = false;
        if entry.rolled_back
            || (self.config.fixed_pcm_migration_cost && entry.dest == TierId::Pcm)
        {
            self.migrations.insert(page, entry);
            return;
        }

        let now = engine.now();
        while entry.blocks_left_to_write > 0 {
            let block = entry.next_write_block;
            if entry.blocks[block].state != BlockState::Buffered {
                break; // its read has not returned yet
            }

            if self.can_elide(&entry, page, block) {
                entry.blocks[block].state = BlockState::Written;
                entry.blocks_left_to_write -= 1;
                entry.next_write_block += 1;
                self.check_threshold(&mut entry);
                continue;
            }

            let id = self.alloc_internal_id();
            let request = MemoryRequest {
                id,
                addr: self.block_addr(entry.dest_page, block),
                kind: AccessKind::Write,
                priority: self.config.migration_priority,
                pid: None,
                user: 0,
            };
            if tier_mut(entry.dest, dram, pcm).access(engine, request, Endpoint::Hybrid) {
                self.callbacks.insert(
                    id,
                    CallbackEntry {
                        client: None,
                        callback_addr: request.addr,
                        part_of_migration: true,
                        page,
                        start_time: now,
                    },
                );
                entry.blocks[block].state = BlockState::Written;
                entry.blocks_left_to_write -= 1;
                entry.next_write_block += 1;
                entry.writes_outstanding += 1;
                entry.last_write = Some(now);
                self.stats.record_copy_access(entry.dest, AccessKind::Write);
                self.check_threshold(&mut entry);
                if entry.write_delay > 0 && entry.blocks_left_to_write > 0 {
                    engine.schedule(entry.write_delay, Event::MigrationWrite { page });
                    entry.write_event_pending = true;
                    break;
                }
            } else {
                if !self.stalled_on_write.contains(&page) {
                    self.stalled_on_write.push(page);
                }
                break;
            }
        }

        if entry.blocks_left_to_write == 0 && entry.writes_outstanding == 0 {
            self.finish_migration(engine, page, entry);
        } else {
            self.migrations.insert(page, entry);
        }
    }

    /// A clean DRAM block may skip its PCM write only when provenance proves
    /// the destination page still holds identical data: this page previously
    /// migrated in from exactly that PCM page and the block was never dirtied
    /// in DRAM or in the migration buffer.
    fn can_elide(&self, entry: &MigrationEntry, page: u64, block: usize) -> bool {
        self.config.elide_clean_dram_blocks
            && entry.src == TierId::Dram
            && entry.dest == TierId::Pcm
            && !entry.blocks[block].dirty
            && self.provenance.get(&page) == Some(&entry.dest_page)
            && self
                .dirties
                .get(&page)
                .map_or(false, |bits| !bits[block])
    }

    fn check_threshold(&mut self, entry: &mut MigrationEntry) {
        if self.config.completion_threshold > 0
            && !entry.completed
            && entry.blocks_left_to_write <= self.config.completion_threshold
            && entry.blocks_left_to_write > 0
        {
            entry.completed = true;
            self.monitor.push_event(PolicyEvent::Completed {
                src_page: entry.src_page,
                dest_page: entry.dest_page,
            });
        }
    }

    /// Fixed-cost PCM write timer expired: the whole page flips to WRITTEN.
    pub fn handle_timer(&mut self, engine: &mut EventQueue<Event>, page: u64) {
        let Some(mut entry) = self.migrations.remove(&page) else {
            return;
        };
        if entry.rolled_back {
            self.migrations.insert(page, entry);
            return;
        }
        assert_eq!(
            entry.blocks_left_to_complete_read, 0,
            "page {page:#x}: fixed-cost timer fired with reads outstanding"
        );
        for slot in entry.blocks.iter_mut() {
            debug_assert_eq!(slot.state, BlockState::Buffered);
            slot.state = BlockState::Written;
        }
        entry.blocks_left_to_write = 0;
        entry.next_write_block = entry.blocks.len();
        self.finish_migration(engine, page, entry);
    }

    fn finish_migration(&mut self, engine: &mut EventQueue<Event>, page: u64, entry: MigrationEntry) {
        let now = engine.now();
        self.stats
            .record_page_copy_time(entry.dest, now - entry.start_time);
        match (entry.src, entry.dest) {
            (TierId::Pcm, TierId::Dram) => {
                self.provenance.insert(entry.dest_page, page);
                self.dirties
                    .insert(entry.dest_page, vec![false; self.blocks_per_page as usize]);
            }
            (TierId::Dram, _) => {
                self.provenance.remove(&page);
                self.dirties.remove(&page);
            }
            _ => {}
        }
        if now >= self.debug_start {
            debug!(
                "migration {:#x} -> {:#x} finished at {}",
                page, entry.dest_page, now
            );
        }
        self.monitor.push_event(PolicyEvent::Finished {
            src_page: page,
            dest_page: entry.dest_page,
        });
    }

    /// Abandon an in-flight migration: discard buffered writes, re-route
    /// deferred callers to the source tier, and drain outstanding traffic.
    pub fn rollback(
        &mut self,
        engine: &mut EventQueue<Event>,
        dram: &mut MemoryTier,
        pcm: &mut MemoryTier,
        src_page: u64,
    ) {
        let mut entry = self.migrations.remove(&src_page).unwrap_or_else(|| {
            panic!("rollback of page {src_page:#x} with no active migration")
        });
        if entry.rolled_back {
            panic!("page {src_page:#x} is already rolled back");
        }
        if entry.completed {
            panic!(
                "rollback of page {src_page:#x} after its completion threshold fired"
            );
        }
        entry.rolled_back = true;
        self.rolled_back.insert(src_page, entry.dest_page);
        self.stalled_on_read.retain(|p| *p != src_page);
        self.stalled_on_write.retain(|p| *p != src_page);
        // Blocks whose read was never issued have no tier traffic to drain;
        // only reads already in flight are waited for.
        entry.blocks_left_to_complete_read -= entry.blocks_left_to_read;
        entry.blocks_left_to_read = 0;

        if engine.now() >= self.debug_start {
            debug!(
                "rollback of {:#x} -> {:#x}, {} reads outstanding",
                src_page, entry.dest_page, entry.blocks_left_to_complete_read
            );
        }

        let src = entry.src;
        for slot in entry.blocks.iter_mut() {
            let callers: Vec<Caller> = slot.callers.drain(..).collect();
            for caller in callers {
                self.reroute(engine, dram, pcm, src, caller);
            }
        }

        if entry.is_drained() {
            self.rolled_back.remove(&src_page);
            self.monitor
                .push_event(PolicyEvent::RollbackDrained { src_page });
        } else {
            self.migrations.insert(src_page, entry);
        }
    }

    fn reroute(
        &mut self,
        engine: &mut EventQueue<Event>,
        dram: &mut MemoryTier,
        pcm: &mut MemoryTier,
        tier: TierId,
        caller: Caller,
    ) {
        if tier_mut(tier, dram, pcm).access(engine, caller.request, Endpoint::Hybrid) {
            self.callbacks.insert(
                caller.request.id,
                CallbackEntry {
                    client: Some(caller.client),
                    callback_addr: caller.request.addr,
                    part_of_migration: false,
                    page: 0,
                    start_time: engine.now(),
                },
            );
            self.stats
                .record_access(tier, caller.request.kind, caller.request.pid);
        } else {
            self.pending_reroutes.push((tier, caller));
        }
    }

    /// A tier freed queue space: resume parked migration work and wake
    /// stalled foreground callers in registration order.
    pub fn unstall(
        &mut self,
        engine: &mut EventQueue<Event>,
        dram: &mut MemoryTier,
        pcm: &mut MemoryTier,
        tier: TierId,
    ) -> Vec<ClientNotice> {
        let mut keep = Vec::new();
        for page in std::mem::take(&mut self.stalled_on_read) {
            match self.migrations.get(&page) {
                Some(entry) if !entry.rolled_back && entry.src == tier => {
                    engine.schedule(0, Event::MigrationCopy { page });
                }
                Some(entry) if !entry.rolled_back => keep.push(page),
                _ => {}
            }
        }
        self.stalled_on_read = keep;

        let mut keep = Vec::new();
        for page in std::mem::take(&mut self.stalled_on_write) {
            match self.migrations.get_mut(&page) {
                Some(entry) if !entry.rolled_back && entry.dest == tier => {
                    if !entry.write_event_pending {
                        entry.write_event_pending = true;
                        engine.schedule(0, Event::MigrationWrite { page });
                    }
                }
                Some(entry) if !entry.rolled_back => keep.push(page),
                _ => {}
            }
        }
        self.stalled_on_write = keep;

        let (mine, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending_reroutes)
            .into_iter()
            .partition(|(t, _)| *t == tier);
        self.pending_reroutes = rest;
        for (_, caller) in mine {
            self.reroute(engine, dram, pcm, tier, caller);
        }

        let stalled = match tier {
            TierId::Dram => std::mem::take(&mut self.dram_stalled),
            TierId::Pcm => std::mem::take(&mut self.pcm_stalled),
        };
        stalled
            .into_iter()
            .map(|client| ClientNotice::Unstalled { client })
            .collect()
    }

    /// NOTIFY event: deliver buffer-served completions in registration order.
    pub fn drain_notifications(&mut self) -> Vec<ClientNotice> {
        self.notifications
            .drain(..)
            .map(|(client, request)| ClientNotice::Completed { client, request })
            .collect()
    }

    /// Snapshot for the external policy: drains the per-page access counts
    /// (each call starts a fresh monitoring epoch) and copies per-migration
    /// progress.
    pub fn read_counts_and_progress(
        &mut self,
        counts: &mut Vec<CountEntry>,
        progress: &mut Vec<ProgressEntry>,
    ) {
        counts.clear();
        counts.extend(self.monitor.drain_counts());
        progress.clear();
        let mut entries: Vec<&MigrationEntry> = self
            .migrations
            .values()
            .filter(|entry| !entry.rolled_back)
            .collect();
        entries.sort_by_key(|entry| entry.src_page);
        progress.extend(entries.into_iter().map(|entry| ProgressEntry {
            src_page: entry.src_page,
            dest_page: entry.dest_page,
            blocks_written: entry.blocks_written(),
            blocks_total: entry.blocks.len() as u32,
            start_time: entry.start_time,
        }));
    }

    pub fn drain_policy_events(&mut self) -> Vec<PolicyEvent> {
        self.monitor.drain_events()
    }
}
