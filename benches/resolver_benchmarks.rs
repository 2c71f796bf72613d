//! Resolution benchmarks for flagpole

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use flagpole::{
    Bucketer, Context, ContextSerializer, FeatureDefinition, FeatureResolver, Scope,
    VariantWeights,
};

fn bucketing_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("bucketing");
    group.throughput(Throughput::Elements(1));

    group.bench_function("bucket", |b| {
        b.iter(|| Bucketer::bucket(black_box("new-checkout"), black_box("User|123456")))
    });

    let weights = VariantWeights::new(
        "theme",
        [("control", 25), ("blue", 25), ("green", 25), ("red", 25)],
    )
    .unwrap();
    group.bench_function("variant_4_way", |b| {
        b.iter(|| {
            Bucketer::variant(black_box("theme"), black_box("User|123456"), &weights).len()
        })
    });

    group.finish();
}

fn serialization_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("context_serialization");
    group.throughput(Throughput::Elements(1));

    let serializer = ContextSerializer::new();
    let plain = Context::entity("User", 42);
    let scoped = plain.with_scope(
        Scope::new("tenant")
            .with("id", 7)
            .with("region", "eu-west-1"),
    );

    group.bench_function("entity", |b| {
        b.iter(|| serializer.serialize(black_box(&plain), None))
    });
    group.bench_function("entity_with_scope", |b| {
        b.iter(|| serializer.serialize(black_box(&scoped), None))
    });

    group.finish();
}

fn resolution_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("resolution");
    group.throughput(Throughput::Elements(1));

    let base = rt.block_on(async {
        FeatureResolver::builder()
            .define(FeatureDefinition::percentage("rollout", 50))
            .define(FeatureDefinition::boolean("base", true))
            .define(FeatureDefinition::boolean("addon", true).requires(["base"]))
            .build()
            .await
            .unwrap()
    });

    // Warm the store so cold lookups read instead of writing
    let context = Context::entity("User", 1);
    let mut warm = base.fork();
    rt.block_on(async {
        for feature in ["rollout", "base", "addon"] {
            warm.resolve(feature, &context).await.unwrap();
        }
    });

    let cached = tokio::sync::Mutex::new(warm);
    group.bench_function("cache_hit", |b| {
        b.to_async(&rt).iter(|| async {
            let value = cached
                .lock()
                .await
                .resolve(black_box("rollout"), &context)
                .await
                .unwrap();
            black_box(value)
        });
    });

    group.bench_function("store_read", |b| {
        b.to_async(&rt).iter(|| async {
            let mut resolver = base.fork();
            black_box(resolver.resolve(black_box("rollout"), &context).await.unwrap())
        });
    });

    group.bench_function("with_requirement", |b| {
        b.to_async(&rt).iter(|| async {
            let mut resolver = base.fork();
            black_box(resolver.resolve(black_box("addon"), &context).await.unwrap())
        });
    });

    group.finish();
}

fn first_write_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("first_write");

    for contexts in [10u64, 100, 1000] {
        group.throughput(Throughput::Elements(contexts));
        group.bench_with_input(
            BenchmarkId::new("fresh_contexts", contexts),
            &contexts,
            |b, &contexts| {
                b.to_async(&rt).iter(|| async move {
                    let mut resolver = FeatureResolver::builder()
                        .define(FeatureDefinition::percentage("rollout", 50))
                        .build()
                        .await
                        .unwrap();
                    for id in 0..contexts {
                        resolver
                            .resolve("rollout", &Context::entity("User", id))
                            .await
                            .unwrap();
                    }
                    black_box(resolver.cache().len())
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bucketing_benchmark,
    serialization_benchmark,
    resolution_benchmark,
    first_write_benchmark,
);

criterion_main!(benches);
