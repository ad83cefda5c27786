// Allocation queue benchmarks.
//
// Measures `execute_allocation` when the queue head sits behind a long run
// of aborted entries, which the dispatcher skips in a single bounded loop,
// and the cost of the per-call state checkpoint as the queue grows.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

use treasury_contracts::{Collaborators, Treasury, TreasuryConfig};
use treasury_protocol::memory::{MemoryFarmRegistry, MemoryLedger, MemoryOracle, MemoryRouter};
use treasury_protocol::{Address, ManualClock};

struct Setup {
    treasury: Treasury,
    guardian: Address,
}

/// Treasury with `aborted` aborted allocations followed by one pending one.
fn setup(aborted: u64) -> Setup {
    let ledger = Arc::new(MemoryLedger::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
    ));
    let governor = Address::from_label("governor");
    let guardian = Address::from_label("guardian");
    let treasury_addr = Address::from_label("treasury");
    let token = Address::from_label("usdc");
    ledger.mint(&token, &treasury_addr, 1_000_000_000).unwrap();

    let mut config = TreasuryConfig::new(governor, guardian, treasury_addr);
    config.allocation_delay_secs = 0;
    let collaborators = Collaborators {
        ledger: ledger.clone(),
        router: Arc::new(MemoryRouter::new(ledger.clone())),
        farms: Arc::new(MemoryFarmRegistry::new(ledger)),
        oracle: Arc::new(MemoryOracle::new()),
    };
    let mut treasury = Treasury::new(&config, collaborators, clock).unwrap();

    let recipient = Address::from_label("grantee");
    for id in 0..aborted {
        treasury
            .request_allocation(&governor, recipient, vec![token], vec![1])
            .unwrap();
        treasury.abort_allocation(&guardian, id).unwrap();
    }
    treasury
        .request_allocation(&governor, recipient, vec![token], vec![1])
        .unwrap();

    Setup { treasury, guardian }
}

fn bench_execute_after_aborted_prefix(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation/execute_after_aborted");
    for aborted in [0u64, 10, 100, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(aborted), &aborted, |b, &n| {
            b.iter_batched(
                || setup(n),
                |mut s| s.treasury.execute_allocation(&s.guardian).unwrap(),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let s = setup(1_000);
    c.bench_function("allocation/snapshot_1000", |b| {
        b.iter(|| s.treasury.snapshot());
    });
}

criterion_group!(benches, bench_execute_after_aborted_prefix, bench_snapshot);
criterion_main!(benches);
