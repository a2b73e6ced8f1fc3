use crate::hybrid::PolicyEvent;
use crate::mem::request::MemoryRequest;
use crate::unit_tests::harness::{block_addr, small_system_config, test_top, PCM_PAGE_BASE};

const DRAM_PAGE: u64 = 2;
const PCM_PAGE: u64 = PCM_PAGE_BASE + 1;

#[test]
fn foreground_read_piggybacks_on_an_inflight_block_read() {
    let (mut top, recorder, client) = test_top(small_system_config());
    top.copy_page(DRAM_PAGE, PCM_PAGE);
    top.run_until(5);
    // block 2 is READING (its read was issued at t=0 and completes at t=20)
    let read = MemoryRequest::read(1, block_addr(DRAM_PAGE, 2));
    assert!(top.access(read, client));
    top.run_until(25);
    assert_eq!(recorder.read().unwrap().completion_time(1), Some(20));

    top.run_to_completion();
    let snapshot = top.snapshot();
    // exactly the four migration reads hit DRAM; the foreground read was
    // served out of the buffer, never re-issued to the source
    assert_eq!(snapshot.dram.total.num_read_requests(), 4);
    assert_eq!(snapshot.hybrid.stats.reads_from_buffer(), 1);
    assert_eq!(snapshot.pcm.total.num_write_requests(), 4);
    assert!(top
        .drain_policy_events()
        .contains(&PolicyEvent::Finished {
            src_page: DRAM_PAGE,
            dest_page: PCM_PAGE,
        }));
    assert!(!top.migration_active(DRAM_PAGE));
}

#[test]
fn written_blocks_route_to_the_destination_tier() {
    let mut config = small_system_config();
    config.hybrid.pcm_migration_write_delay = 40;
    let (mut top, recorder, client) = test_top(config);
    top.copy_page(DRAM_PAGE, PCM_PAGE);
    top.run_until(30);
    // block 0's write was sent at t=20, so the block is WRITTEN
    assert!(top.access(MemoryRequest::read(1, block_addr(DRAM_PAGE, 0)), client));
    top.run_to_completion();
    // the read queued behind the migration write in the PCM bank: the write
    // completes at t=54, the row hit adds the access latency
    assert_eq!(recorder.read().unwrap().completion_time(1), Some(58));
    assert_eq!(top.snapshot().hybrid.stats.pcm_reads(), 1);
}

#[test]
fn rollback_stops_remaining_writes_and_restores_source_routing() {
    let mut config = small_system_config();
    config.hybrid.pcm_migration_write_delay = 40;
    let (mut top, recorder, client) = test_top(config);
    top.copy_page(DRAM_PAGE, PCM_PAGE);
    // writes go out at t=20, 60, 100, 140; roll back after the second
    top.run_until(70);
    top.rollback(DRAM_PAGE);
    // the write sent at t=60 has not returned yet
    assert!(top.rollback_draining(DRAM_PAGE));
    top.run_to_completion();
    assert!(!top.rollback_draining(DRAM_PAGE));

    let snapshot = top.snapshot();
    assert_eq!(snapshot.pcm.total.num_write_requests(), 2);
    assert!(top
        .drain_policy_events()
        .contains(&PolicyEvent::RollbackDrained { src_page: DRAM_PAGE }));
    assert!(!top.migration_active(DRAM_PAGE));

    // the page now routes to the source tier only
    assert!(top.access(MemoryRequest::read(9, block_addr(DRAM_PAGE, 3)), client));
    top.run_to_completion();
    assert!(recorder.read().unwrap().completion_time(9).is_some());
    assert_eq!(top.snapshot().hybrid.stats.dram_reads(), 1);
}

#[test]
fn rollback_reroutes_deferred_callers_to_the_source() {
    // PCM -> DRAM migration so the reads are slow enough to roll back under.
    let (mut top, recorder, client) = test_top(small_system_config());
    top.copy_page(PCM_PAGE, DRAM_PAGE);
    top.run_until(5);
    let deferred = MemoryRequest::read(1, block_addr(PCM_PAGE, 1));
    assert!(top.access(deferred, client));
    top.run_until(10);
    top.rollback(PCM_PAGE);
    top.run_to_completion();

    // the deferred read was re-issued to the PCM bank and completed after the
    // in-flight migration read it queued behind (t=34 + access 4)
    assert_eq!(recorder.read().unwrap().completion_time(1), Some(38));
    let snapshot = top.snapshot();
    assert_eq!(snapshot.dram.total.num_write_requests(), 0);
    assert!(top
        .drain_policy_events()
        .contains(&PolicyEvent::RollbackDrained { src_page: PCM_PAGE }));
}

#[test]
fn rollback_during_staggered_read_issue_still_drains() {
    // With a read spacing the copy issues one read per firing: t=0, 10, 20,
    // 30. Rolling back at t=15 leaves blocks 2 and 3 never read; only the
    // two in-flight reads (returning at t=20 and t=30) must drain.
    let mut config = small_system_config();
    config.hybrid.dram_migration_read_delay = 10;
    let (mut top, _recorder, _client) = test_top(config);
    top.copy_page(DRAM_PAGE, PCM_PAGE);
    top.run_until(15);
    top.rollback(DRAM_PAGE);
    assert!(top.rollback_draining(DRAM_PAGE));
    top.run_to_completion();

    assert!(!top.rollback_draining(DRAM_PAGE));
    assert!(!top.migration_active(DRAM_PAGE));
    assert!(top
        .drain_policy_events()
        .contains(&PolicyEvent::RollbackDrained { src_page: DRAM_PAGE }));
    let snapshot = top.snapshot();
    assert_eq!(snapshot.dram.total.num_read_requests(), 2);
    assert_eq!(snapshot.pcm.total.num_write_requests(), 0);

    // the source page is free to migrate again
    top.copy_page(DRAM_PAGE, PCM_PAGE);
    top.run_to_completion();
    assert!(top
        .drain_policy_events()
        .contains(&PolicyEvent::Finished {
            src_page: DRAM_PAGE,
            dest_page: PCM_PAGE,
        }));
    let snapshot = top.snapshot();
    assert_eq!(snapshot.dram.total.num_read_requests(), 6);
    assert_eq!(snapshot.pcm.total.num_write_requests(), 4);
}

#[test]
fn rollback_before_any_read_drains_immediately() {
    let mut config = small_system_config();
    config.hybrid.dram_migration_read_delay = 10;
    let (mut top, _recorder, _client) = test_top(config);
    top.copy_page(DRAM_PAGE, PCM_PAGE);
    // no event has run: every block is still unread, nothing to drain
    top.rollback(DRAM_PAGE);
    assert!(!top.rollback_draining(DRAM_PAGE));
    assert!(!top.migration_active(DRAM_PAGE));
    assert!(top
        .drain_policy_events()
        .contains(&PolicyEvent::RollbackDrained { src_page: DRAM_PAGE }));

    top.copy_page(DRAM_PAGE, PCM_PAGE);
    top.run_to_completion();
    assert_eq!(top.snapshot().dram.total.num_read_requests(), 4);
    assert!(top
        .drain_policy_events()
        .contains(&PolicyEvent::Finished {
            src_page: DRAM_PAGE,
            dest_page: PCM_PAGE,
        }));
}

#[test]
fn completion_threshold_flips_routing_early() {
    let mut config = small_system_config();
    config.hybrid.pcm_migration_write_delay = 40;
    config.hybrid.completion_threshold = 1;
    let (mut top, recorder, client) = test_top(config);
    top.copy_page(DRAM_PAGE, PCM_PAGE);
    top.run_until(101);
    // blocks_left_to_write reached 1 when the third write went out at t=100
    assert!(top
        .drain_policy_events()
        .contains(&PolicyEvent::Completed {
            src_page: DRAM_PAGE,
            dest_page: PCM_PAGE,
        }));

    top.run_until(105);
    // the last block is still BUFFERED: served from the buffer, not re-read
    assert!(top.access(MemoryRequest::read(1, block_addr(DRAM_PAGE, 3)), client));
    top.run_until(106);
    assert_eq!(recorder.read().unwrap().completion_time(1), Some(105));

    top.run_to_completion();
    let snapshot = top.snapshot();
    assert_eq!(snapshot.hybrid.stats.reads_from_buffer(), 1);
    assert_eq!(snapshot.pcm.total.num_write_requests(), 4);
    assert!(top
        .drain_policy_events()
        .contains(&PolicyEvent::Finished {
            src_page: DRAM_PAGE,
            dest_page: PCM_PAGE,
        }));
}

#[test]
fn fixed_pcm_cost_replaces_per_block_writes() {
    let mut config = small_system_config();
    config.hybrid.fixed_pcm_migration_cost = true;
    config.hybrid.pcm_migration_cost = 100;
    let (mut top, recorder, client) = test_top(config);
    top.copy_page(DRAM_PAGE, PCM_PAGE);

    top.run_until(50);
    // every block is BUFFERED while the lump timer runs
    assert!(top.access(MemoryRequest::read(1, block_addr(DRAM_PAGE, 1)), client));
    top.run_until(60);
    assert_eq!(recorder.read().unwrap().completion_time(1), Some(50));

    top.run_to_completion();
    // reads finished at t=20, timer fires at t=120
    assert_eq!(top.now(), 120);
    let snapshot = top.snapshot();
    assert_eq!(snapshot.pcm.total.num_write_requests(), 0);
    assert!(top
        .drain_policy_events()
        .contains(&PolicyEvent::Finished {
            src_page: DRAM_PAGE,
            dest_page: PCM_PAGE,
        }));
    assert!(!top.migration_active(DRAM_PAGE));
}

#[test]
fn migrating_back_restores_dram_routing() {
    let (mut top, recorder, client) = test_top(small_system_config());
    top.copy_page(DRAM_PAGE, PCM_PAGE);
    top.run_to_completion();
    top.copy_page(PCM_PAGE, DRAM_PAGE);
    top.run_to_completion();
    assert!(!top.migration_active(DRAM_PAGE));
    assert!(!top.migration_active(PCM_PAGE));

    assert!(top.access(MemoryRequest::read(1, block_addr(DRAM_PAGE, 0)), client));
    top.run_to_completion();
    assert!(recorder.read().unwrap().completion_time(1).is_some());
    let hybrid = top.snapshot().hybrid;
    assert_eq!(hybrid.stats.dram_reads(), 1);
    assert_eq!(hybrid.stats.pcm_reads(), 0);
    assert_eq!(hybrid.stats.dram_page_copies(), 1);
    assert_eq!(hybrid.stats.pcm_page_copies(), 1);
}

#[test]
fn clean_blocks_are_elided_when_provenance_proves_equivalence() {
    let mut config = small_system_config();
    config.hybrid.elide_clean_dram_blocks = true;
    let (mut top, _recorder, client) = test_top(config);

    // bring the page into DRAM, establishing provenance
    top.copy_page(PCM_PAGE, DRAM_PAGE);
    top.run_to_completion();
    // dirty exactly one block in DRAM
    assert!(top.access(MemoryRequest::write(1, block_addr(DRAM_PAGE, 1)), client));
    top.run_to_completion();

    // migrating back writes only the dirty block
    top.copy_page(DRAM_PAGE, PCM_PAGE);
    top.run_to_completion();
    let snapshot = top.snapshot();
    assert_eq!(snapshot.pcm.total.num_write_requests(), 1);
    assert_eq!(snapshot.hybrid.stats.pcm_copy_writes(), 1);
    assert!(top
        .drain_policy_events()
        .contains(&PolicyEvent::Finished {
            src_page: DRAM_PAGE,
            dest_page: PCM_PAGE,
        }));
}

#[test]
fn fully_clean_pages_migrate_back_without_any_writes() {
    let mut config = small_system_config();
    config.hybrid.elide_clean_dram_blocks = true;
    let (mut top, _recorder, _client) = test_top(config);
    top.copy_page(PCM_PAGE, DRAM_PAGE);
    top.run_to_completion();
    top.copy_page(DRAM_PAGE, PCM_PAGE);
    top.run_to_completion();
    let snapshot = top.snapshot();
    assert_eq!(snapshot.pcm.total.num_write_requests(), 0);
    assert!(!top.migration_active(DRAM_PAGE));
}

#[test]
fn elision_needs_provenance_not_just_clean_blocks() {
    let mut config = small_system_config();
    config.hybrid.elide_clean_dram_blocks = true;
    let (mut top, _recorder, _client) = test_top(config);
    // first-ever migration of this page: nothing proves the PCM copy matches
    top.copy_page(DRAM_PAGE, PCM_PAGE);
    top.run_to_completion();
    assert_eq!(top.snapshot().pcm.total.num_write_requests(), 4);
}

#[test]
fn progress_snapshot_tracks_written_blocks() {
    let mut config = small_system_config();
    config.hybrid.pcm_migration_write_delay = 40;
    let (mut top, _recorder, _client) = test_top(config);
    top.copy_page(DRAM_PAGE, PCM_PAGE);
    top.run_until(70);

    let mut counts = Vec::new();
    let mut progress = Vec::new();
    top.read_counts_and_progress(&mut counts, &mut progress);
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].src_page, DRAM_PAGE);
    assert_eq!(progress[0].dest_page, PCM_PAGE);
    assert_eq!(progress[0].blocks_written, 2);
    assert_eq!(progress[0].blocks_total, 4);
    assert_eq!(progress[0].start_time, 0);
}

#[test]
#[should_panic(expected = "already being migrated")]
fn double_migration_of_a_page_is_fatal() {
    let (mut top, _recorder, _client) = test_top(small_system_config());
    top.copy_page(DRAM_PAGE, PCM_PAGE);
    top.copy_page(DRAM_PAGE, PCM_PAGE + 1);
}

#[test]
#[should_panic(expected = "overlaps an in-flight migration")]
fn sharing_a_destination_page_is_fatal() {
    let (mut top, _recorder, _client) = test_top(small_system_config());
    top.copy_page(DRAM_PAGE, PCM_PAGE);
    top.copy_page(DRAM_PAGE + 1, PCM_PAGE);
}

#[test]
#[should_panic(expected = "no active migration")]
fn rollback_of_an_unknown_page_is_fatal() {
    let (mut top, _recorder, _client) = test_top(small_system_config());
    top.rollback(DRAM_PAGE);
}
