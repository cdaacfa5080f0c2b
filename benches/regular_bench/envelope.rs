use criterion::Criterion;

use objmem::vm::NullActivity;

use super::{memory, tree};

pub fn bench(c: &mut Criterion) {
    let sender = memory(1 << 26);
    let receiver = memory(1 << 28);
    let receiver_object = tree(&sender, 10);
    sender.add_root(receiver_object).unwrap();

    c.bench_function("pack_tree", |b| {
        b.iter(|| sender.pack(&NullActivity, receiver_object).unwrap());
    });

    let envelope = sender.pack(&NullActivity, receiver_object).unwrap();
    c.bench_function("unpack_tree", |b| {
        b.iter(|| receiver.unpack(&NullActivity, &envelope).unwrap());
    });
}
