use criterion::{BatchSize, Criterion};

use super::{memory, tree};

pub fn bench(c: &mut Criterion) {
    let memory = memory(1 << 28);
    let live = tree(&memory, 14);
    memory.add_root(live).unwrap();

    c.bench_function("collect_live_tree", |b| {
        b.iter(|| memory.collect());
    });

    c.bench_function("collect_garbage_tree", |b| {
        b.iter_batched(
            || {
                tree(&memory, 12);
            },
            |_| memory.collect(),
            BatchSize::PerIteration,
        );
    });

    c.bench_function("verify_heap", |b| {
        b.iter(|| memory.verify_heap().unwrap());
    });
}
