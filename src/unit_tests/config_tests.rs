use crate::mem::bank::{MemoryType, RowBufferPolicy};
use crate::mem::mapping::MappingType;
use crate::mem::request::AccessKind;
use crate::sim::config::SimulatorConfig;
use crate::sim::report::key_value_lines;
use crate::sim::trace::parse_trace_line;
use crate::unit_tests::harness::{small_system_config, test_top};

#[test]
fn parses_a_full_configuration() {
    let text = r#"
        [sim]
        num_processes = 4
        debug_start = 1000

        [dram]
        mapping_type = "row_col_rank_bank"
        num_ranks = 2
        banks_per_rank = 8
        rows_per_bank = 1024
        blocks_per_row = 64
        block_size = 64
        open_latency = 11
        close_latency = 11
        access_latency = 5
        row_buffer_policy = "closed_page"

        [pcm]
        num_ranks = 2
        banks_per_rank = 8
        rows_per_bank = 4096
        blocks_per_row = 64
        block_size = 64
        memory_type = "non_destructive_reads"

        [hybrid]
        page_size = 4096
        completion_threshold = 8
        elide_clean_dram_blocks = true
    "#;
    let config = SimulatorConfig::from_toml_str(text).expect("config parses");
    assert_eq!(config.sim.num_processes, 4);
    assert_eq!(config.dram.mapping_type, MappingType::RowColRankBank);
    assert_eq!(config.dram.row_buffer_policy, RowBufferPolicy::ClosedPage);
    assert_eq!(config.dram.open_latency, 11);
    assert_eq!(config.pcm.memory_type, MemoryType::NonDestructiveReads);
    assert_eq!(config.hybrid.completion_threshold, 8);
    assert!(config.hybrid.elide_clean_dram_blocks);
    // pcm_offset defaults to the dram tier size
    assert_eq!(config.pcm_offset(), 2 * 8 * 1024 * 64 * 64);
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let config = SimulatorConfig::from_toml_str("").expect("empty config is valid");
    assert_eq!(config.sim.num_processes, 1);
    assert_eq!(config.dram.block_size, config.pcm.block_size);
}

#[test]
fn rejects_non_power_of_two_rows() {
    let text = r#"
        [dram]
        rows_per_bank = 1000
    "#;
    assert!(SimulatorConfig::from_toml_str(text).is_err());
}

#[test]
fn rejects_inconsistent_pcm_offset() {
    let text = r#"
        [hybrid]
        pcm_offset = 4096
    "#;
    assert!(SimulatorConfig::from_toml_str(text).is_err());
}

#[test]
fn rejects_mismatched_block_sizes() {
    let text = r#"
        [dram]
        block_size = 64
        [pcm]
        block_size = 128
    "#;
    assert!(SimulatorConfig::from_toml_str(text).is_err());
}

#[test]
fn rejects_wide_dirty_column_sets() {
    let text = r#"
        [dram]
        blocks_per_row = 128
    "#;
    assert!(SimulatorConfig::from_toml_str(text).is_err());
}

#[test]
fn trace_lines_parse() {
    let command = parse_trace_line("100 r 0x2000 3").unwrap().unwrap();
    assert_eq!(command.cycle, 100);
    assert_eq!(command.kind, AccessKind::Read);
    assert_eq!(command.addr, 0x2000);
    assert_eq!(command.priority, 3);

    let command = parse_trace_line("5 W 4096").unwrap().unwrap();
    assert_eq!(command.kind, AccessKind::Write);
    assert_eq!(command.addr, 4096);
    assert_eq!(command.priority, 0);

    assert!(parse_trace_line("").unwrap().is_none());
    assert!(parse_trace_line("# comment").unwrap().is_none());
    assert!(parse_trace_line("10 x 0x0").is_err());
    assert!(parse_trace_line("10 r").is_err());
}

#[test]
fn report_flattens_the_snapshot() {
    let (mut top, _recorder, client) = test_top(small_system_config());
    assert!(top.access(
        crate::mem::request::MemoryRequest::read(1, 0x200),
        client
    ));
    top.run_to_completion();
    let lines = key_value_lines(&top.snapshot());
    assert!(lines.iter().any(|line| line == "cycles=20"));
    assert!(lines
        .iter()
        .any(|line| line == "hybrid.stats.dram_reads=1"));
    assert!(lines
        .iter()
        .any(|line| line.starts_with("dram.total.row_buffer_misses=")));
}
