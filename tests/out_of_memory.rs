mod common;

use common::*;
use objmem::{AllocationError, Memory, MemoryError};

const HEAP: usize = 64 * 1024;

fn small_memory() -> Memory {
    let mut builder = builder();
    assert!(builder.set_option("maxHeapSize", &HEAP.to_string()));
    builder.build()
}

#[test]
fn live_data_exhausts_the_heap() {
    let memory = small_memory();
    let root = memory.new_array(1).unwrap();
    memory.add_root(root).unwrap();

    let mut links = 0;
    let error = loop {
        let head = memory.array_get(root, 0).unwrap();
        match memory.new_object(PAIR, PAIR_BYTES) {
            Ok(link) => {
                memory.set_field(link, 0, head).unwrap();
                memory.array_set(root, 0, Some(link)).unwrap();
                links += 1;
            }
            Err(e) => break e,
        }
        assert!(links * PAIR_BYTES < HEAP, "allocation never failed");
    };
    assert!(matches!(
        error,
        MemoryError::Allocation(AllocationError::HeapOutOfMemory { .. })
    ));
    assert!(memory.stats().committed_bytes <= HEAP);
    assert_eq!(memory.stats().live_objects(), links + 1);

    // Dropping the chain makes room again.
    memory.array_set(root, 0, None).unwrap();
    memory.collect();
    assert!(memory.new_object(PAIR, PAIR_BYTES).is_ok());
}

#[test]
fn garbage_is_collected_on_demand() {
    let memory = small_memory();
    // Ten times the heap in short-lived objects.
    for _ in 0..(10 * HEAP / (PAIR_BYTES + 24)) {
        pair(&memory, None, None);
    }
    let stats = memory.stats();
    assert!(stats.collections > 0);
    assert!(stats.committed_bytes <= HEAP);
}

#[test]
fn oversized_objects_fail_at_once() {
    let memory = small_memory();
    let result = memory.new_array(HEAP);
    assert!(matches!(
        result,
        Err(MemoryError::Allocation(AllocationError::HeapOutOfMemory { .. }))
    ));
    assert_eq!(memory.stats().collections, 1);
    // Smaller requests are unaffected.
    assert!(memory.new_array(16).is_ok());
}

fn is_out_of_memory<T>(result: Result<T, MemoryError>) -> bool {
    matches!(
        result,
        Err(MemoryError::Allocation(AllocationError::HeapOutOfMemory { .. }))
    )
}

#[test]
fn unrepresentable_sizes_are_out_of_memory() {
    let memory = small_memory();
    assert!(is_out_of_memory(memory.new_array(1 << 61)));
    assert!(is_out_of_memory(memory.new_array(usize::MAX)));
    assert!(is_out_of_memory(memory.new_identity_table(usize::MAX / 2)));
    assert!(is_out_of_memory(memory.new_behaviour(PAIR, usize::MAX)));
    assert!(is_out_of_memory(memory.new_object(PAIR, usize::MAX - 8)));
    assert!(is_out_of_memory(memory.old_object(PAIR, usize::MAX)));
    // Rejected before any collection is attempted.
    assert_eq!(memory.stats().collections, 0);
    assert_eq!(memory.stats().live_objects(), 0);
}

#[test]
fn sizes_beyond_the_heap_are_out_of_memory() {
    let memory = small_memory();
    assert!(is_out_of_memory(memory.new_array(1 << 58)));
    assert!(is_out_of_memory(memory.new_object(PAIR, usize::MAX - 1024)));
    assert!(is_out_of_memory(memory.new_bytes(&vec![7u8; 2 * HEAP])));
    assert!(memory.stats().committed_bytes <= HEAP);

    let root = memory.new_array(4).unwrap();
    memory.add_root(root).unwrap();
    let a = pair(&memory, None, None);
    memory.array_set(root, 3, Some(a)).unwrap();
    memory.collect();
    assert_eq!(memory.array_get(root, 3).unwrap(), Some(a));
    memory.verify_heap().unwrap();
}
