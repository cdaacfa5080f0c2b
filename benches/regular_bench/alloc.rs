use criterion::Criterion;

use super::{memory, PAIR, PAIR_BYTES};

pub fn bench(c: &mut Criterion) {
    // Nothing is rooted, so a full heap is recovered by collecting.
    let memory = memory(1 << 26);
    memory.init_save_stack();

    c.bench_function("alloc_pair", |b| {
        b.iter(|| {
            let _object = memory.new_object(PAIR, PAIR_BYTES).unwrap();
        })
    });

    c.bench_function("alloc_array_64", |b| {
        b.iter(|| {
            let _array = memory.new_array(64).unwrap();
        })
    });

    c.bench_function("alloc_large_array", |b| {
        b.iter(|| {
            let _array = memory.new_array(4096).unwrap();
        })
    });
}
