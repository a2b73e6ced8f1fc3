use serde::Serialize;

use crate::engine::Cycle;
use crate::event::TierId;
use crate::mem::request::AccessKind;
use crate::mem::stats::ratio;

/// Counters kept by the hybrid controller: foreground traffic per tier,
/// buffer-served traffic, migration copy traffic, page copies, and per-pid
/// breakdowns. Fractions and averages are derived in `summary()`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HybridStats {
    dram_reads: u64,
    dram_writes: u64,
    pcm_reads: u64,
    pcm_writes: u64,
    reads_from_buffer: u64,
    writes_to_buffer: u64,

    dram_read_time: u64,
    dram_write_time: u64,
    pcm_read_time: u64,
    pcm_write_time: u64,

    dram_copy_reads: u64,
    dram_copy_writes: u64,
    pcm_copy_reads: u64,
    pcm_copy_writes: u64,

    dram_copy_read_time: u64,
    dram_copy_write_time: u64,
    pcm_copy_read_time: u64,
    pcm_copy_write_time: u64,

    /// Page copies by destination: dram_page_copies means migrate TO dram.
    dram_page_copies: u64,
    pcm_page_copies: u64,
    dram_page_copy_time: u64,
    pcm_page_copy_time: u64,

    dram_reads_per_pid: Vec<u64>,
    dram_writes_per_pid: Vec<u64>,
    pcm_reads_per_pid: Vec<u64>,
    pcm_writes_per_pid: Vec<u64>,
    dram_read_time_per_pid: Vec<u64>,
    dram_write_time_per_pid: Vec<u64>,
    pcm_read_time_per_pid: Vec<u64>,
    pcm_write_time_per_pid: Vec<u64>,
}

impl HybridStats {
    pub fn new(num_processes: usize) -> Self {
        Self {
            dram_reads_per_pid: vec![0; num_processes],
            dram_writes_per_pid: vec![0; num_processes],
            pcm_reads_per_pid: vec![0; num_processes],
            pcm_writes_per_pid: vec![0; num_processes],
            dram_read_time_per_pid: vec![0; num_processes],
            dram_write_time_per_pid: vec![0; num_processes],
            pcm_read_time_per_pid: vec![0; num_processes],
            pcm_write_time_per_pid: vec![0; num_processes],
            ..Self::default()
        }
    }

    pub fn record_access(&mut self, tier: TierId, kind: AccessKind, pid: Option<usize>) {
        let (counter, per_pid) = match (tier, kind) {
            (TierId::Dram, AccessKind::Read) => (&mut self.dram_reads, &mut self.dram_reads_per_pid),
            (TierId::Dram, AccessKind::Write) => {
                (&mut self.dram_writes, &mut self.dram_writes_per_pid)
            }
            (TierId::Pcm, AccessKind::Read) => (&mut self.pcm_reads, &mut self.pcm_reads_per_pid),
            (TierId::Pcm, AccessKind::Write) => {
                (&mut self.pcm_writes, &mut self.pcm_writes_per_pid)
            }
        };
        *counter = counter.saturating_add(1);
        if let Some(pid) = pid {
            if let Some(slot) = per_pid.get_mut(pid) {
                *slot = slot.saturating_add(1);
            }
        }
    }

    pub fn record_access_time(
        &mut self,
        tier: TierId,
        kind: AccessKind,
        pid: Option<usize>,
        cycles: Cycle,
    ) {
        let (counter, per_pid) = match (tier, kind) {
            (TierId::Dram, AccessKind::Read) => {
                (&mut self.dram_read_time, &mut self.dram_read_time_per_pid)
            }
            (TierId::Dram, AccessKind::Write) => {
                (&mut self.dram_write_time, &mut self.dram_write_time_per_pid)
            }
            (TierId::Pcm, AccessKind::Read) => {
                (&mut self.pcm_read_time, &mut self.pcm_read_time_per_pid)
            }
            (TierId::Pcm, AccessKind::Write) => {
                (&mut self.pcm_write_time, &mut self.pcm_write_time_per_pid)
            }
        };
        *counter = counter.saturating_add(cycles);
        if let Some(pid) = pid {
            if let Some(slot) = per_pid.get_mut(pid) {
                *slot = slot.saturating_add(cycles);
            }
        }
    }

    pub fn record_buffer(&mut self, is_read: bool) {
        if is_read {
            self.reads_from_buffer = self.reads_from_buffer.saturating_add(1);
        } else {
            self.writes_to_buffer = self.writes_to_buffer.saturating_add(1);
        }
    }

    pub fn record_copy_access(&mut self, tier: TierId, kind: AccessKind) {
        let counter = match (tier, kind) {
            (TierId::Dram, AccessKind::Read) => &mut self.dram_copy_reads,
            (TierId::Dram, AccessKind::Write) => &mut self.dram_copy_writes,
            (TierId::Pcm, AccessKind::Read) => &mut self.pcm_copy_reads,
            (TierId::Pcm, AccessKind::Write) => &mut self.pcm_copy_writes,
        };
        *counter = counter.saturating_add(1);
    }

    pub fn record_copy_time(&mut self, tier: TierId, kind: AccessKind, cycles: Cycle) {
        let counter = match (tier, kind) {
            (TierId::Dram, AccessKind::Read) => &mut self.dram_copy_read_time,
            (TierId::Dram, AccessKind::Write) => &mut self.dram_copy_write_time,
            (TierId::Pcm, AccessKind::Read) => &mut self.pcm_copy_read_time,
            (TierId::Pcm, AccessKind::Write) => &mut self.pcm_copy_write_time,
        };
        *counter = counter.saturating_add(cycles);
    }

    pub fn record_page_copy(&mut self, dest: TierId) {
        match dest {
            TierId::Dram => self.dram_page_copies = self.dram_page_copies.saturating_add(1),
            TierId::Pcm => self.pcm_page_copies = self.pcm_page_copies.saturating_add(1),
        }
    }

    pub fn record_page_copy_time(&mut self, dest: TierId, cycles: Cycle) {
        match dest {
            TierId::Dram => {
                self.dram_page_copy_time = self.dram_page_copy_time.saturating_add(cycles)
            }
            TierId::Pcm => self.pcm_page_copy_time = self.pcm_page_copy_time.saturating_add(cycles),
        }
    }

    pub fn dram_reads(&self) -> u64 {
        self.dram_reads
    }

    pub fn dram_writes(&self) -> u64 {
        self.dram_writes
    }

    pub fn pcm_reads(&self) -> u64 {
        self.pcm_reads
    }

    pub fn pcm_writes(&self) -> u64 {
        self.pcm_writes
    }

    pub fn reads_from_buffer(&self) -> u64 {
        self.reads_from_buffer
    }

    pub fn writes_to_buffer(&self) -> u64 {
        self.writes_to_buffer
    }

    pub fn dram_page_copies(&self) -> u64 {
        self.dram_page_copies
    }

    pub fn pcm_page_copies(&self) -> u64 {
        self.pcm_page_copies
    }

    pub fn dram_copy_reads(&self) -> u64 {
        self.dram_copy_reads
    }

    pub fn pcm_copy_writes(&self) -> u64 {
        self.pcm_copy_writes
    }

    pub fn dram_reads_per_pid(&self) -> &[u64] {
        &self.dram_reads_per_pid
    }

    pub fn dram_writes_per_pid(&self) -> &[u64] {
        &self.dram_writes_per_pid
    }

    pub fn pcm_reads_per_pid(&self) -> &[u64] {
        &self.pcm_reads_per_pid
    }

    pub fn pcm_writes_per_pid(&self) -> &[u64] {
        &self.pcm_writes_per_pid
    }

    pub fn summary(&self) -> HybridSummary {
        let total_reads = self.dram_reads + self.pcm_reads;
        let total_writes = self.dram_writes + self.pcm_writes;
        let total_accesses = total_reads + total_writes;
        let dram_accesses = self.dram_reads + self.dram_writes;
        let pcm_accesses = self.pcm_reads + self.pcm_writes;
        let total_access_time = self.dram_read_time
            + self.dram_write_time
            + self.pcm_read_time
            + self.pcm_write_time;
        HybridSummary {
            stats: self.clone(),
            total_reads,
            total_writes,
            total_accesses,
            dram_access_fraction: ratio(dram_accesses, total_accesses),
            pcm_access_fraction: ratio(pcm_accesses, total_accesses),
            dram_read_fraction: ratio(self.dram_reads, total_reads),
            pcm_read_fraction: ratio(self.pcm_reads, total_reads),
            dram_write_fraction: ratio(self.dram_writes, total_writes),
            pcm_write_fraction: ratio(self.pcm_writes, total_writes),
            avg_dram_read_time: ratio(self.dram_read_time, self.dram_reads),
            avg_dram_write_time: ratio(self.dram_write_time, self.dram_writes),
            avg_pcm_read_time: ratio(self.pcm_read_time, self.pcm_reads),
            avg_pcm_write_time: ratio(self.pcm_write_time, self.pcm_writes),
            avg_access_time: ratio(total_access_time, total_accesses),
            avg_dram_page_copy_time: ratio(self.dram_page_copy_time, self.dram_page_copies),
            avg_pcm_page_copy_time: ratio(self.pcm_page_copy_time, self.pcm_page_copies),
        }
    }
}

/// Snapshot with the derived quantities evaluated.
#[derive(Debug, Clone, Serialize)]
pub struct HybridSummary {
    pub stats: HybridStats,
    pub total_reads: u64,
    pub total_writes: u64,
    pub total_accesses: u64,
    pub dram_access_fraction: f64,
    pub pcm_access_fraction: f64,
    pub dram_read_fraction: f64,
    pub pcm_read_fraction: f64,
    pub dram_write_fraction: f64,
    pub pcm_write_fraction: f64,
    pub avg_dram_read_time: f64,
    pub avg_dram_write_time: f64,
    pub avg_pcm_read_time: f64,
    pub avg_pcm_write_time: f64,
    pub avg_access_time: f64,
    pub avg_dram_page_copy_time: f64,
    pub avg_pcm_page_copy_time: f64,
}
