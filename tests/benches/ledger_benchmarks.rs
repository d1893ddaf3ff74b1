//! # BeanBlock Ledger Benchmarks
//!
//! | Subsystem | Operation | Target |
//! |-----------|-----------|--------|
//! | bb-01 Fingerprint Store | insert + token lookup | < 10µs |
//! | bb-02 Submission Queue | enqueue (validate + insert) | < 50µs |
//! | shared-types | CID validation | < 1µs |

use std::sync::Arc;
use std::time::Duration;

use bb_01_fingerprint_store::{FingerprintStore, InMemoryFingerprintStore, StoreConfig};
use bb_02_submission_queue::{QueueConfig, SubmissionApi, SubmissionQueue};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use shared_bus::InMemoryEventBus;
use shared_types::{
    Cid, IdempotencyToken, ProductId, RequestId, SubmissionRecord, SystemTimeSource, WriteRequest,
};

fn emission_request(product: u64, token: &str) -> WriteRequest {
    WriteRequest::set_carbon_emission(
        ProductId::new(product).unwrap(),
        1500,
        "kgCO2e",
        IdempotencyToken::new(token).unwrap(),
        0,
    )
}

// ============================================================================
// BB-01: Fingerprint Store
// ============================================================================

fn bench_fingerprint_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("bb-01-fingerprint-store");
    group.measurement_time(Duration::from_secs(5));

    for preload in [1_000_u64, 10_000] {
        let store = InMemoryFingerprintStore::new(StoreConfig::default());
        for i in 1..=preload {
            let request = emission_request(i, &format!("preload-{i}"));
            store
                .insert_pending(SubmissionRecord::pending(RequestId::new(), &request, 0))
                .unwrap();
        }

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("insert_then_lookup", preload),
            &preload,
            |b, preload| {
                let mut next = preload + 1;
                b.iter(|| {
                    let token = format!("bench-{next}");
                    let request = emission_request(next, &token);
                    next += 1;
                    store
                        .insert_pending(SubmissionRecord::pending(RequestId::new(), &request, 0))
                        .unwrap();
                    black_box(store.get_by_token(request.idempotency_token()))
                })
            },
        );
    }

    group.finish();
}

// ============================================================================
// BB-02: Submission Queue
// ============================================================================

fn bench_enqueue(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let store = Arc::new(InMemoryFingerprintStore::default());
    let queue = SubmissionQueue::new(
        store,
        Arc::new(InMemoryEventBus::new()),
        Arc::new(SystemTimeSource),
        QueueConfig {
            max_queue_depth: usize::MAX,
            ..QueueConfig::default()
        },
    );

    let mut group = c.benchmark_group("bb-02-submission-queue");
    let mut product = 0_u64;
    group.bench_function("enqueue_new_key", |b| {
        b.iter(|| {
            product += 1;
            let request = emission_request(product, &format!("enqueue-{product}"));
            black_box(runtime.block_on(queue.enqueue(request)).unwrap())
        })
    });

    let replay = emission_request(u64::MAX / 2, "replayed");
    runtime.block_on(queue.enqueue(replay.clone())).unwrap();
    group.bench_function("enqueue_replay", |b| {
        b.iter(|| black_box(runtime.block_on(queue.enqueue(replay.clone())).unwrap()))
    });

    group.finish();
}

// ============================================================================
// shared-types: CID validation
// ============================================================================

fn bench_cid_validation(c: &mut Criterion) {
    const ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let cids: Vec<String> = (0..256)
        .map(|_| {
            let body: String = (0..44)
                .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
                .collect();
            format!("Qm{body}")
        })
        .collect();

    c.bench_function("cid_v0_parse", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % cids.len();
            black_box(Cid::parse(cids[i].as_str()).is_ok())
        })
    });
}

criterion_group!(benches, bench_fingerprint_store, bench_enqueue, bench_cid_validation);
criterion_main!(benches);
