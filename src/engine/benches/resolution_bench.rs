//! Resolution pipeline benchmarks
//!
//! Measures the cold path (full inheritance resolution + calculator build)
//! and the hot path (cached point lookups) at varying node counts.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tokio::runtime::Runtime;
use uuid::Uuid;
use warden_engine::cacheddata::{CachedDataManager, EngineContext};
use warden_engine::model::{DataType, InMemoryGroupRegistry, InMemoryTrackRegistry, User};
use warden_engine::node::Node;
use warden_engine::query::QueryOptions;

fn build_fixture(node_count: usize) -> (Arc<User>, Arc<EngineContext>) {
    let groups = Arc::new(InMemoryGroupRegistry::new());
    let tracks = Arc::new(InMemoryTrackRegistry::new());

    // a small inheritance chain with bulk permissions on the leaf
    let base = groups.get_or_create("base");
    for i in 0..node_count {
        base.holder()
            .nodes(DataType::Enduring)
            .add(Node::permission(&format!("perm.node.{}", i)).build());
    }
    base.holder()
        .nodes(DataType::Enduring)
        .add(Node::prefix("[Base]", 10).build());

    let mid = groups.get_or_create("mid");
    mid.holder()
        .nodes(DataType::Enduring)
        .add(Node::inheritance("base").build());
    mid.holder()
        .nodes(DataType::Enduring)
        .add(Node::permission("perm.mid.*").build());

    let user = Arc::new(User::new(Uuid::new_v4(), Some("bench")));
    user.holder()
        .nodes(DataType::Enduring)
        .add(Node::inheritance("mid").build());

    let ctx = Arc::new(EngineContext::new(groups, tracks));
    (user, ctx)
}

fn bench_cold_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("cold_resolution");

    for node_count in [10, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::new("nodes", node_count),
            node_count,
            |b, &count| {
                let (user, ctx) = build_fixture(count);
                let query = QueryOptions::non_contextual();
                b.iter(|| {
                    let manager = CachedDataManager::for_user(user.clone(), ctx.clone());
                    let data = manager.permission_data().calculate(&query).unwrap();
                    black_box(data.query_permission("perm.node.0").result())
                });
            },
        );
    }
    group.finish();
}

fn bench_cached_lookup(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("cached_lookup");

    for node_count in [10, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::new("nodes", node_count),
            node_count,
            |b, &count| {
                let (user, ctx) = build_fixture(count);
                let manager = CachedDataManager::for_user(user, ctx);
                let query = QueryOptions::non_contextual();
                let data = rt.block_on(manager.get_permission_data(&query)).unwrap();

                b.iter(|| black_box(data.query_permission("perm.node.0").result()));
            },
        );
    }
    group.finish();
}

fn bench_meta_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("meta_resolution");

    group.bench_function("prefix_stack", |b| {
        let (user, ctx) = build_fixture(100);
        let manager = CachedDataManager::for_user(user, ctx);
        let query = QueryOptions::non_contextual();
        b.iter(|| {
            let meta = manager.meta_data().calculate(&query).unwrap();
            black_box(meta.query_prefix().map(|s| s.to_string()))
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_cold_resolution,
    bench_cached_lookup,
    bench_meta_resolution
);
criterion_main!(benches);
