use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// How a physical address is cut into device coordinates, high bits first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MappingType {
    /// row . rank . bank . column . block
    #[default]
    RowRankBankCol,
    /// row . column . rank . bank . block
    RowColRankBank,
    /// rank . bank . row . column . block
    RankBankRowCol,
}

/// A decomposed physical address. `reassemble` on the owning mapping is the
/// exact inverse of `decompose`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub rank: u64,
    pub bank: u64,
    pub row: u64,
    pub column: u64,
    pub byte: u64,
}

#[derive(Debug, Clone)]
pub struct AddressMapping {
    mapping_type: MappingType,
    num_ranks: u64,
    banks_per_rank: u64,
    rows_per_bank: u64,
    blocks_per_row: u64,
    block_size: u64,

    rank_width: u32,
    bank_width: u32,
    row_width: u32,
    column_width: u32,
    block_width: u32,

    rank_offset: u32,
    bank_offset: u32,
    row_offset: u32,
    column_offset: u32,

    rank_mask: u64,
    bank_mask: u64,
    row_mask: u64,
    column_mask: u64,
    block_mask: u64,
}

fn width_of(name: &str, value: u64) -> Result<u32> {
    if value == 0 || !value.is_power_of_two() {
        bail!("{name} must be a power of two, got {value}");
    }
    Ok(value.trailing_zeros())
}

impl AddressMapping {
    pub fn new(
        mapping_type: MappingType,
        num_ranks: u64,
        banks_per_rank: u64,
        rows_per_bank: u64,
        blocks_per_row: u64,
        block_size: u64,
    ) -> Result<Self> {
        let rank_width = width_of("num_ranks", num_ranks)?;
        let bank_width = width_of("banks_per_rank", banks_per_rank)?;
        let row_width = width_of("rows_per_bank", rows_per_bank)?;
        let column_width = width_of("blocks_per_row", blocks_per_row)?;
        let block_width = width_of("block_size", block_size)?;

        // Field offsets from low to high, per the selected cut order.
        let (rank_offset, bank_offset, row_offset, column_offset) = match mapping_type {
            MappingType::RowRankBankCol => {
                let column = block_width;
                let bank = column + column_width;
                let rank = bank + bank_width;
                let row = rank + rank_width;
                (rank, bank, row, column)
            }
            MappingType::RowColRankBank => {
                let bank = block_width;
                let rank = bank + bank_width;
                let column = rank + rank_width;
                let row = column + column_width;
                (rank, bank, row, column)
            }
            MappingType::RankBankRowCol => {
                let column = block_width;
                let row = column + column_width;
                let bank = row + row_width;
                let rank = bank + bank_width;
                (rank, bank, row, column)
            }
        };

        let mask = |width: u32, offset: u32| ((1u64 << width) - 1) << offset;

        Ok(Self {
            mapping_type,
            num_ranks,
            banks_per_rank,
            rows_per_bank,
            blocks_per_row,
            block_size,
            rank_width,
            bank_width,
            row_width,
            column_width,
            block_width,
            rank_offset,
            bank_offset,
            row_offset,
            column_offset,
            rank_mask: mask(rank_width, rank_offset),
            bank_mask: mask(bank_width, bank_offset),
            row_mask: mask(row_width, row_offset),
            column_mask: mask(column_width, column_offset),
            block_mask: (1u64 << block_width) - 1,
        })
    }

    pub fn mapping_type(&self) -> MappingType {
        self.mapping_type
    }

    pub fn num_banks(&self) -> usize {
        (self.num_ranks * self.banks_per_rank) as usize
    }

    pub fn blocks_per_row(&self) -> u64 {
        self.blocks_per_row
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn total_size(&self) -> u64 {
        self.num_ranks * self.banks_per_rank * self.rows_per_bank * self.blocks_per_row
            * self.block_size
    }

    pub fn rank_index(&self, addr: u64) -> u64 {
        (addr & self.rank_mask) >> self.rank_offset
    }

    pub fn bank_index(&self, addr: u64) -> u64 {
        (addr & self.bank_mask) >> self.bank_offset
    }

    pub fn row_index(&self, addr: u64) -> u64 {
        (addr & self.row_mask) >> self.row_offset
    }

    pub fn column_index(&self, addr: u64) -> u64 {
        (addr & self.column_mask) >> self.column_offset
    }

    /// Flattened bank id consumed by the tier: rank bits above bank bits.
    pub fn bank_id(&self, addr: u64) -> usize {
        ((self.rank_index(addr) << self.bank_width) | self.bank_index(addr)) as usize
    }

    /// Address aligned down to the block; the dedup key in bank queues and the
    /// unit of bus transfer.
    pub fn block_address(&self, addr: u64) -> u64 {
        addr & !self.block_mask
    }

    pub fn decompose(&self, addr: u64) -> Location {
        Location {
            rank: self.rank_index(addr),
            bank: self.bank_index(addr),
            row: self.row_index(addr),
            column: self.column_index(addr),
            byte: addr & self.block_mask,
        }
    }

    pub fn reassemble(&self, loc: Location) -> u64 {
        (loc.rank << self.rank_offset)
            | (loc.bank << self.bank_offset)
            | (loc.row << self.row_offset)
            | (loc.column << self.column_offset)
            | loc.byte
    }
}
