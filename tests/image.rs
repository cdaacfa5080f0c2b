mod common;

use std::fs;

use common::*;
use objmem::memory_manager::{objmem_init, process_bulk};
use objmem::util::heap::SegmentKind;
use objmem::{ImageError, TypeCode};

/// Save an image whose only root is an array holding a pair of byte strings and a cycle.
fn save_sample(name: &str) -> std::path::PathBuf {
    let memory = memory();
    let left = memory.new_bytes(b"left").unwrap();
    let right = memory.new_bytes(b"right").unwrap();
    let data = pair(&memory, Some(left), Some(right));
    let cycle = pair(&memory, None, None);
    memory.set_field(cycle, 0, Some(cycle)).unwrap();
    let root = memory.new_array(2).unwrap();
    memory.array_set(root, 0, Some(data)).unwrap();
    memory.array_set(root, 1, Some(cycle)).unwrap();

    let path = temp_path(name);
    let bytes = memory.save_image(&[root], &path).unwrap();
    assert!(bytes > 0);
    path
}

#[test]
fn restored_objects_are_permanent() {
    let path = save_sample("permanent.img");
    let memory = memory();
    let roots = memory.restore_image(&path).unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(roots.len(), 1);
    let root = roots[0];
    assert_eq!(memory.type_of(root).unwrap(), TypeCode::ARRAY);
    assert!(memory.is_old_space(root).unwrap());
    let data = memory.array_get(root, 0).unwrap().unwrap();
    let cycle = memory.array_get(root, 1).unwrap().unwrap();
    assert_eq!(memory.bytes(first(&memory, data).unwrap()).unwrap(), b"left");
    assert_eq!(memory.bytes(second(&memory, data).unwrap()).unwrap(), b"right");
    assert_eq!(first(&memory, cycle), Some(cycle));

    // Old space is never swept, even once the roots are gone.
    assert!(memory.remove_root(root));
    let summary = memory.collect();
    assert_eq!(summary.reclaimed_objects(), 0);
    assert!(memory.is_valid_object(data));
    assert!(memory.is_old_space(data).unwrap());
    memory.verify_heap().unwrap();
}

#[test]
fn restored_objects_keep_new_objects_alive() {
    let path = save_sample("barrier.img");
    let memory = memory();
    let roots = memory.restore_image(&path).unwrap();
    fs::remove_file(&path).unwrap();
    let cycle = memory.array_get(roots[0], 1).unwrap().unwrap();

    let young = pair(&memory, None, None);
    memory.set_field(cycle, 1, Some(young)).unwrap();
    memory.collect();
    memory.collect();
    assert!(memory.is_valid_object(young));

    memory.set_field(cycle, 1, None).unwrap();
    memory.collect();
    assert!(!memory.is_valid_object(young));
}

#[test]
fn images_need_the_magic_number() {
    let path = temp_path("magic.img");
    fs::write(&path, b"not an image at all").unwrap();
    let result = memory().restore_image(&path);
    fs::remove_file(&path).unwrap();
    assert!(matches!(result, Err(ImageError::BadMagic)));
}

#[test]
fn images_carry_a_version() {
    let path = temp_path("version.img");
    let mut contents = b"OBJMIMG\0".to_vec();
    contents.extend_from_slice(&2u32.to_le_bytes());
    contents.extend_from_slice(&0u64.to_le_bytes());
    fs::write(&path, contents).unwrap();
    let result = memory().restore_image(&path);
    fs::remove_file(&path).unwrap();
    assert!(matches!(result, Err(ImageError::UnsupportedVersion(2))));
}

#[test]
fn truncated_images_are_rejected() {
    let path = save_sample("truncated.img");
    let contents = fs::read(&path).unwrap();
    fs::write(&path, &contents[..contents.len() - 8]).unwrap();
    let memory = memory();
    let result = memory.restore_image(&path);
    fs::remove_file(&path).unwrap();
    assert!(matches!(result, Err(ImageError::Io(_))));
    assert_eq!(memory.stats().sets[SegmentKind::Old].live_objects, 0);
}

#[test]
fn boot_image_is_restored_at_init() {
    let path = save_sample("boot.img");
    let mut builder = builder();
    assert!(process_bulk(
        &mut builder,
        &format!("restoreImage=true imagePath={}", path.display())
    ));
    let memory = objmem_init(builder).unwrap();
    fs::remove_file(&path).unwrap();

    // The root array, two pairs and two byte strings.
    let stats = memory.stats();
    assert_eq!(stats.sets[SegmentKind::Old].live_objects, 5);
    assert_eq!(memory.collect().reclaimed_objects(), 0);
}
