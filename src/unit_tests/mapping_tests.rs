use crate::mem::mapping::{AddressMapping, Location, MappingType};

fn mapping(mapping_type: MappingType) -> AddressMapping {
    AddressMapping::new(mapping_type, 2, 8, 1024, 64, 64).expect("valid geometry")
}

const ALL_TYPES: [MappingType; 3] = [
    MappingType::RowRankBankCol,
    MappingType::RowColRankBank,
    MappingType::RankBankRowCol,
];

#[test]
fn decompose_reassemble_round_trips() {
    let addrs = [
        0u64,
        1,
        63,
        64,
        0x1234,
        0xdead_beef % (2 * 8 * 1024 * 64 * 64),
        2 * 8 * 1024 * 64 * 64 - 1,
    ];
    for mapping_type in ALL_TYPES {
        let m = mapping(mapping_type);
        for addr in addrs {
            assert_eq!(
                m.reassemble(m.decompose(addr)),
                addr,
                "round trip failed for {addr:#x} under {mapping_type:?}"
            );
        }
    }
}

#[test]
fn fields_stay_in_range() {
    for mapping_type in ALL_TYPES {
        let m = mapping(mapping_type);
        for addr in (0..m.total_size()).step_by(4097) {
            let loc = m.decompose(addr);
            assert!(loc.rank < 2);
            assert!(loc.bank < 8);
            assert!(loc.row < 1024);
            assert!(loc.column < 64);
            assert!(loc.byte < 64);
        }
    }
}

#[test]
fn bank_id_places_rank_above_bank() {
    let m = mapping(MappingType::RowRankBankCol);
    let addr = m.reassemble(Location {
        rank: 1,
        bank: 3,
        row: 0,
        column: 0,
        byte: 0,
    });
    assert_eq!(m.bank_id(addr), (1 << 3) | 3);
    assert_eq!(m.num_banks(), 16);
}

#[test]
fn block_address_aligns_down() {
    let m = mapping(MappingType::RowRankBankCol);
    assert_eq!(m.block_address(0), 0);
    assert_eq!(m.block_address(63), 0);
    assert_eq!(m.block_address(64), 64);
    assert_eq!(m.block_address(0x12345), 0x12345 & !63);
}

#[test]
fn row_col_rank_bank_interleaves_blocks_across_banks() {
    // With rank/bank right above the block bits, consecutive blocks land in
    // consecutive banks; that is what makes page copies parallel.
    let m = AddressMapping::new(MappingType::RowColRankBank, 1, 4, 64, 8, 64).unwrap();
    for block in 0..4u64 {
        assert_eq!(m.bank_id(block * 64), block as usize);
    }
    assert_eq!(m.bank_id(4 * 64), 0);
}

#[test]
fn total_size_is_the_product() {
    let m = mapping(MappingType::RankBankRowCol);
    assert_eq!(m.total_size(), 2 * 8 * 1024 * 64 * 64);
}

#[test]
fn rejects_non_power_of_two_geometry() {
    assert!(AddressMapping::new(MappingType::RowRankBankCol, 3, 8, 1024, 64, 64).is_err());
    assert!(AddressMapping::new(MappingType::RowRankBankCol, 2, 8, 1000, 64, 64).is_err());
    assert!(AddressMapping::new(MappingType::RowRankBankCol, 2, 8, 1024, 64, 0).is_err());
}
