use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;

use crate::engine::{Cycle, EventQueue};
use crate::event::{BankStep, Event, TierId};
use crate::mem::bank::{Bank, BankAccess, BankOutput, MemoryType, RowBufferPolicy};
use crate::mem::bus::Bus;
use crate::mem::mapping::{AddressMapping, MappingType};
use crate::mem::request::{Completion, Endpoint, MemoryRequest};
use crate::mem::stats::TierSnapshot;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TierConfig {
    pub mapping_type: MappingType,
    pub num_ranks: u64,
    pub banks_per_rank: u64,
    pub rows_per_bank: u64,
    pub blocks_per_row: u64,
    pub block_size: u64,

    pub open_latency: u64,
    pub close_latency: u64,
    pub access_latency: u64,
    pub bus_latency: u64,
    pub long_close_latency: bool,
    pub row_buffer_policy: RowBufferPolicy,
    pub memory_type: MemoryType,
    pub first_ready_across_priorities: bool,
    /// Per-priority bank queue cap; 0 means uncapped.
    pub queue_cap: usize,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            mapping_type: MappingType::RowRankBankCol,
            num_ranks: 1,
            banks_per_rank: 8,
            rows_per_bank: 4096,
            blocks_per_row: 64,
            block_size: 64,
            open_latency: 14,
            close_latency: 14,
            access_latency: 10,
            bus_latency: 4,
            long_close_latency: false,
            row_buffer_policy: RowBufferPolicy::OpenPage,
            memory_type: MemoryType::DestructiveReads,
            first_ready_across_priorities: false,
            queue_cap: 64,
        }
    }
}

impl TierConfig {
    pub fn total_size(&self) -> u64 {
        self.num_ranks * self.banks_per_rank * self.rows_per_bank * self.blocks_per_row
            * self.block_size
    }

    pub fn queue_cap_value(&self) -> Option<usize> {
        if self.queue_cap == 0 {
            None
        } else {
            Some(self.queue_cap)
        }
    }

    pub fn mapping(&self) -> Result<AddressMapping> {
        AddressMapping::new(
            self.mapping_type,
            self.num_ranks,
            self.banks_per_rank,
            self.rows_per_bank,
            self.blocks_per_row,
            self.block_size,
        )
    }

    pub fn validate(&self) -> Result<()> {
        self.mapping()?;
        ensure!(
            self.blocks_per_row <= 64,
            "blocks_per_row must fit the 64-bit dirty-column set, got {}",
            self.blocks_per_row
        );
        Ok(())
    }
}

/// What handling one event did to a tier: completions to funnel upstream and
/// stalled callers to wake.
#[derive(Debug, Default)]
pub struct TierOutput {
    pub completions: Vec<Completion>,
    pub unstalls: Vec<Endpoint>,
}

/// A memory tier: address decoder in front of a set of banks sharing a bus.
pub struct MemoryTier {
    id: TierId,
    mapping: AddressMapping,
    banks: Vec<Bank>,
    bus: Bus,
    /// Callers rejected by a saturated bank, in registration order.
    stalled: Vec<Endpoint>,
}

impl MemoryTier {
    pub fn new(id: TierId, config: Arc<TierConfig>, debug_start: Cycle) -> Result<Self> {
        config
            .validate()
            .with_context(|| format!("invalid {} tier configuration", id.name()))?;
        let mapping = config.mapping()?;
        let banks = (0..mapping.num_banks())
            .map(|index| Bank::new(id, index, Arc::clone(&config), debug_start))
            .collect();
        Ok(Self {
            id,
            banks,
            bus: Bus::new(id, config.bus_latency),
            mapping,
            stalled: Vec::new(),
        })
    }

    pub fn id(&self) -> TierId {
        self.id
    }

    pub fn mapping(&self) -> &AddressMapping {
        &self.mapping
    }

    pub fn total_size(&self) -> u64 {
        self.mapping.total_size()
    }

    /// Route a request to its bank. On rejection the caller is recorded for a
    /// later unstall notification and `false` is returned.
    pub fn access(
        &mut self,
        engine: &mut EventQueue<Event>,
        request: MemoryRequest,
        origin: Endpoint,
    ) -> bool {
        let addr = request.addr;
        let bank_id = self.mapping.bank_id(addr);
        let row = self.mapping.row_index(addr);
        let column = self.mapping.column_index(addr);
        let block_addr = self.mapping.block_address(addr);
        match self.banks[bank_id].access(engine, request, origin, row, column, block_addr) {
            BankAccess::Rejected => {
                if !self.stalled.contains(&origin) {
                    self.stalled.push(origin);
                }
                false
            }
            BankAccess::Accepted { .. } => true,
        }
    }

    pub fn handle_bank_event(
        &mut self,
        engine: &mut EventQueue<Event>,
        bank: usize,
        step: BankStep,
    ) -> TierOutput {
        let out = self.banks[bank].handle_step(engine, step);
        self.collect(engine, bank, out)
    }

    pub fn handle_bus_event(&mut self, engine: &mut EventQueue<Event>, bank: usize) -> TierOutput {
        let out = self.banks[bank].transfer_completed(engine);
        self.bus.transfer_completed(engine);
        self.collect(engine, bank, out)
    }

    fn collect(&mut self, engine: &mut EventQueue<Event>, bank: usize, out: BankOutput) -> TierOutput {
        if out.wants_bus {
            self.bus.request(engine, bank);
        }
        let unstalls = if out.dequeued && !self.stalled.is_empty() {
            std::mem::take(&mut self.stalled)
        } else {
            Vec::new()
        };
        TierOutput {
            completions: out.completions,
            unstalls,
        }
    }

    pub fn snapshot(&self) -> TierSnapshot {
        TierSnapshot::new(
            self.banks.iter().map(|bank| *bank.stats()).collect(),
            *self.bus.stats(),
        )
    }
}
