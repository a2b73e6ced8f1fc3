use crate::mem::mapping::Location;
use crate::mem::request::{ClientId, Endpoint, MemoryRequest};
use crate::mem::tier::MemoryTier;
use crate::unit_tests::harness::{bank_tier_config, make_tier, run_tier, CLIENT};

fn addr(tier: &MemoryTier, bank: u64, row: u64, column: u64) -> u64 {
    tier.mapping().reassemble(Location {
        rank: 0,
        bank,
        row,
        column,
        byte: 0,
    })
}

#[test]
fn requests_to_distinct_banks_overlap() {
    let (mut engine, mut tier) = make_tier(bank_tier_config());
    assert!(tier.access(&mut engine, MemoryRequest::read(1, addr(&tier, 0, 7, 0)), CLIENT));
    assert!(tier.access(&mut engine, MemoryRequest::read(2, addr(&tier, 1, 3, 0)), CLIENT));
    let run = run_tier(&mut engine, &mut tier, 100);
    // both banks open and access in parallel; the zero-latency bus adds nothing
    assert_eq!(run.completions[0].0, 14);
    assert_eq!(run.completions[1].0, 14);
}

#[test]
fn bus_transfers_serialize_fifo() {
    let mut config = bank_tier_config();
    config.bus_latency = 3;
    let (mut engine, mut tier) = make_tier(config);
    assert!(tier.access(&mut engine, MemoryRequest::read(1, addr(&tier, 0, 7, 0)), CLIENT));
    assert!(tier.access(&mut engine, MemoryRequest::read(2, addr(&tier, 1, 7, 0)), CLIENT));
    let run = run_tier(&mut engine, &mut tier, 100);
    // both rows are ready at t=14; bank 0 asked first, bank 1 waits its turn
    assert_eq!(run.completions[0], (17, MemoryRequest::read(1, addr(&tier, 0, 7, 0))));
    assert_eq!(run.completions[1], (20, MemoryRequest::read(2, addr(&tier, 1, 7, 0))));
    let snapshot = tier.snapshot();
    assert_eq!(snapshot.bus.transfers(), 2);
    assert_eq!(snapshot.bus.queued_grants(), 1);
}

#[test]
fn rejection_records_the_caller_for_unstall() {
    let mut config = bank_tier_config();
    config.queue_cap = 1;
    let (mut engine, mut tier) = make_tier(config);
    // first is selected, second fills the level, third bounces
    assert!(tier.access(&mut engine, MemoryRequest::read(1, addr(&tier, 0, 7, 0)), CLIENT));
    assert!(tier.access(&mut engine, MemoryRequest::read(2, addr(&tier, 0, 8, 0)), CLIENT));
    let rejected = Endpoint::Client(ClientId(9));
    assert!(!tier.access(&mut engine, MemoryRequest::read(3, addr(&tier, 0, 9, 0)), rejected));

    let run = run_tier(&mut engine, &mut tier, 100);
    // the queued request was dequeued at t=14, freeing the level
    assert_eq!(run.unstalls, vec![rejected]);
}

#[test]
fn unstall_fires_once_per_stalled_caller() {
    let mut config = bank_tier_config();
    config.queue_cap = 1;
    let (mut engine, mut tier) = make_tier(config);
    assert!(tier.access(&mut engine, MemoryRequest::read(1, addr(&tier, 0, 7, 0)), CLIENT));
    assert!(tier.access(&mut engine, MemoryRequest::read(2, addr(&tier, 0, 8, 0)), CLIENT));
    let rejected = Endpoint::Client(ClientId(9));
    assert!(!tier.access(&mut engine, MemoryRequest::read(3, addr(&tier, 0, 9, 0)), rejected));
    assert!(!tier.access(&mut engine, MemoryRequest::read(4, addr(&tier, 0, 9, 1)), rejected));
    let run = run_tier(&mut engine, &mut tier, 200);
    assert_eq!(run.unstalls, vec![rejected]);
}

#[test]
fn completions_carry_the_origin_endpoint() {
    let (mut engine, mut tier) = make_tier(bank_tier_config());
    let other = Endpoint::Client(ClientId(7));
    assert!(tier.access(&mut engine, MemoryRequest::read(1, addr(&tier, 0, 7, 0)), other));
    let mut done = Vec::new();
    while let Some(event) = engine.pop_due(100) {
        let out = match event {
            crate::event::Event::Bank { bank, step, .. } => {
                tier.handle_bank_event(&mut engine, bank, step)
            }
            crate::event::Event::BusTransfer { bank, .. } => {
                tier.handle_bus_event(&mut engine, bank)
            }
            _ => continue,
        };
        done.extend(out.completions);
    }
    assert_eq!(done, vec![(MemoryRequest::read(1, addr(&tier, 0, 7, 0)), other)]);
}
