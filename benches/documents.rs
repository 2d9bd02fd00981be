use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode, Throughput};
use rand::{rngs::StdRng, Rng, SeedableRng};

use nfsgate::files::parse_range;
use nfsgate::storage::DocumentStore;
use nfsgate::types::RoleRecord;

fn roles(n: u32) -> Vec<RoleRecord> {
    (1..=n)
        .map(|id| RoleRecord { id, name: format!("role-{}", id), permissions: vec!["files:read".into(), "files:write".into()] })
        .collect()
}

fn bench_documents(c: &mut Criterion) {
    let sizes = [100u32, 1_000u32];
    let mut group = c.benchmark_group("document_store");
    group.sampling_mode(SamplingMode::Flat);
    group.sample_size(20);

    for &n in &sizes {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store: DocumentStore<RoleRecord> = DocumentStore::new(tmp.path().join("roles.json"));
        store.save(&roles(n)).expect("seed");

        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("load", n), &n, |b, _| {
            b.iter(|| criterion::black_box(store.load().expect("load")));
        });

        // insert then remove keeps the collection size stable across iterations
        group.bench_with_input(BenchmarkId::new("insert_remove", n), &n, |b, &n| {
            let extra = n + 1;
            b.iter(|| {
                store
                    .insert(RoleRecord { id: extra, name: "extra".into(), permissions: vec![] })
                    .expect("insert");
                store.remove(&extra).expect("remove");
            });
        });

        group.bench_with_input(BenchmarkId::new("update_rand", n), &n, |b, &n| {
            let mut rng = StdRng::seed_from_u64(0xBEEF_CAFE);
            b.iter(|| {
                let id = rng.gen_range(1..=n);
                store
                    .update(&id, |r| {
                        r.permissions.push("audit:read".into());
                        r.permissions.pop();
                        Ok(())
                    })
                    .expect("update");
            });
        });
    }
    group.finish();

    let mut ranges = c.benchmark_group("range_header");
    ranges.bench_function("parse", |b| {
        b.iter(|| criterion::black_box(parse_range(criterion::black_box("bytes=100-199"), 1_000)))
    });
    ranges.finish();
}

criterion_group!(benches, bench_documents);
criterion_main!(benches);
