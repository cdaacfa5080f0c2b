//! Runtime-to-objmem interface: initialization entry points.
//!
//! A runtime initializes its object memory in the following steps:
//!
//! 1. Create a [`MemoryBuilder`]. Options are read from `OBJMEM_*` environment variables.
//! 2. Override options with [`process()`] or [`process_bulk()`], and register the runtime's
//!    types with [`MemoryBuilder::register_type`].
//! 3. Create the memory with [`objmem_init()`]. If the `restore_image` option is set, the
//!    image at `image_path` is loaded into old space and its roots are registered.
//! 4. Once the runtime is ready to anchor new objects, call [`Memory::init_save_stack`]. Until
//!    then, objects are not protected by the save stack and a collection may reclaim any
//!    object that is not reachable from a root.

use crate::memory::{Memory, MemoryBuilder};
use crate::util::error::ImageError;

/// Create an object memory from `builder`.
///
/// This attempts to initialize a logger. A runtime with its own logger should install it
/// before calling this function.
pub fn objmem_init(builder: MemoryBuilder) -> Result<Box<Memory>, ImageError> {
    match crate::util::logger::try_init() {
        Ok(_) => debug!("objmem initialized the logger."),
        Err(_) => debug!(
            "objmem failed to initialize the logger. Possibly a logger has been initialized by user."
        ),
    }
    let memory = Box::new(builder.build());
    info!(
        "Initialized object memory: {} byte segments, {} byte heap limit",
        memory.options().segment_size,
        memory.options().max_heap_size
    );
    if memory.options().orphan_check {
        warn!("Orphan checking is enabled. Every collection validates every reference. Slow performance should be expected.");
    }
    if memory.options().restore_image {
        let path = memory.options().image_path.clone();
        let roots = memory.restore_image(&path)?;
        debug!("Boot image provided {} roots", roots.len());
    }
    Ok(memory)
}

/// Process an option, given its camelCase or snake_case name and its value. Returns false
/// if the option is unknown or the value is rejected, in which case the option keeps its
/// previous value.
///
/// Arguments:
/// * `builder`: The builder the option is set on.
/// * `name`: The name of the option.
/// * `value`: The option value as a string.
pub fn process(builder: &mut MemoryBuilder, name: &str, value: &str) -> bool {
    builder.set_option(name, value)
}

/// Process multiple options given as `key=value` pairs separated by white space. Returns
/// true only if every pair was accepted.
///
/// Arguments:
/// * `builder`: The builder the options are set on.
/// * `options`: The options, such as `"maxHeapSize=67108864 orphanCheck=true"`.
pub fn process_bulk(builder: &mut MemoryBuilder, options: &str) -> bool {
    builder.set_options_bulk_by_str(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_util::fixtures::builder;

    #[test]
    fn process_options() {
        let mut builder = builder();
        assert!(process(&mut builder, "liveStackSize", "32"));
        assert!(!process(&mut builder, "liveStackSize", "one"));
        assert!(process_bulk(&mut builder, "orphanCheck=true dumpEnable=false"));
        let memory = objmem_init(builder).unwrap();
        assert_eq!(memory.options().live_stack_size, 32);
        assert!(memory.options().orphan_check);
    }

    #[test]
    fn missing_boot_image_is_an_error() {
        let mut builder = builder();
        assert!(process_bulk(
            &mut builder,
            "restoreImage=true imagePath=/nonexistent/objmem/boot.img"
        ));
        assert!(matches!(objmem_init(builder), Err(ImageError::Io(_))));
    }
}
