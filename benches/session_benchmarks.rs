use std::sync::Arc;

use chatrelay::sessions::{HistoryStorage, InMemoryHistoryStorage, SessionRegistry, SqliteHistoryStorage};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn bench_append_at_bound(c: &mut Criterion) {
    let rt = runtime();
    let storage: Arc<dyn HistoryStorage> = Arc::new(InMemoryHistoryStorage::new());
    let registry = SessionRegistry::new(storage, 10);
    let store = registry.resolve("bench");

    // Fill to the bound so every iteration also evicts.
    rt.block_on(async {
        for i in 0..10 {
            store.append(&format!("warmup {i}")).await.unwrap();
        }
    });

    c.bench_function("append_memory_full_history", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(store.append("a typical chat message").await.unwrap());
        });
    });
}

fn bench_append_sqlite(c: &mut Criterion) {
    let rt = runtime();
    let dir = tempfile::TempDir::new().unwrap();
    let storage: Arc<dyn HistoryStorage> =
        Arc::new(SqliteHistoryStorage::open(&dir.path().join("bench.db")).unwrap());
    let registry = SessionRegistry::new(storage, 10);
    let store = registry.resolve("bench");

    c.bench_function("append_sqlite", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(store.append("a typical chat message").await.unwrap());
        });
    });
}

fn bench_resolve(c: &mut Criterion) {
    let storage: Arc<dyn HistoryStorage> = Arc::new(InMemoryHistoryStorage::new());
    let registry = SessionRegistry::new(storage, 10);
    let held: Vec<_> = (0..100).map(|i| registry.resolve(&format!("s{i}"))).collect();

    c.bench_function("resolve_live_session", |b| {
        b.iter(|| black_box(registry.resolve("s42")));
    });

    drop(held);
}

criterion_group!(
    benches,
    bench_append_at_bound,
    bench_append_sqlite,
    bench_resolve
);
criterion_main!(benches);
