use std::hint::black_box;

use core_objects::{build_default_registry, persistence, TerrainType, TypeRegistry};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

fn all_keys(registry: &TypeRegistry) -> Vec<(core_objects::ObjectTypeId, core_objects::SubtypeId)> {
    registry
        .containers()
        .flat_map(|container| {
            container
                .subtype_ids()
                .into_iter()
                .map(move |subid| (container.id(), subid))
        })
        .collect()
}

fn bench_lookup(c: &mut Criterion) {
    let registry = build_default_registry().expect("builtin content should load");
    let keys = all_keys(&registry);

    c.bench_function("handler_for", |b| {
        b.iter(|| {
            for (id, subid) in &keys {
                black_box(registry.handler_for(*id, *subid));
            }
        })
    });

    c.bench_function("handler_for_name", |b| {
        b.iter(|| {
            black_box(registry.handler_for_name("resource", "gold"));
            black_box(registry.handler_for_name("core:town", "castle"));
            black_box(registry.handler_for_name("monster", "missing"));
        })
    });

    let mut group = c.benchmark_group("templates_for");
    for terrain in [TerrainType::Grass, TerrainType::Water, TerrainType::Rock] {
        group.bench_with_input(
            BenchmarkId::new("terrain", terrain.name()),
            &terrain,
            |b, &terrain| {
                b.iter(|| {
                    for (id, subid) in &keys {
                        if let Some(handler) = registry.handler_for(*id, *subid) {
                            black_box(handler.templates_for(terrain));
                        }
                    }
                })
            },
        );
    }
    group.finish();
}

fn bench_persistence(c: &mut Criterion) {
    let registry = build_default_registry().expect("builtin content should load");
    let bytes = persistence::encode(&registry).expect("registry should encode");

    c.bench_function("encode", |b| {
        b.iter(|| black_box(persistence::encode(&registry).expect("registry should encode")))
    });

    c.bench_function("decode", |b| {
        let mut target = TypeRegistry::new();
        b.iter(|| {
            persistence::decode_into(&mut target, black_box(&bytes)).expect("payload should decode")
        })
    });
}

criterion_group!(benches, bench_lookup, bench_persistence);
criterion_main!(benches);
