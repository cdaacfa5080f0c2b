use std::fmt::Write as _;
use std::path::PathBuf;

use itertools::Itertools;

use crate::util::dump::write_memory_dump;
use crate::util::error::ConsistencyError;
use crate::util::heap::SegmentMap;
use crate::util::options::Options;
use crate::vm::TypeTable;

/// Render the diagnostic report for a consistency failure: the error, then every object of
/// the ancestry chain with its header.
fn diagnostics(error: &ConsistencyError, storage: &SegmentMap, types: &TypeTable) -> String {
    let mut report = String::new();
    let _ = writeln!(report, "===== Internal Error in object memory =====");
    let _ = writeln!(report, "{}", error);
    let _ = writeln!(
        report,
        "ancestry: {}",
        error.ancestry.iter().map(|o| o.to_string()).join(" <- ")
    );
    for object in &error.ancestry {
        if storage.is_mapped(object.to_raw_address()) {
            let header = storage.header(*object);
            let _ = writeln!(
                report,
                "  {} {} size={} {:?}",
                object,
                types.name(header.type_code()),
                header.size(),
                header
            );
        }
    }
    report
}

fn diagnostics_path() -> PathBuf {
    std::env::temp_dir().join(format!("objmem-fatal-{}.txt", std::process::id()))
}

/// Report a corrupted heap and abort. The diagnostics go to a temporary file; a raw memory
/// dump is written too if dumps are enabled.
pub(crate) fn fatal_consistency_error(
    error: &ConsistencyError,
    storage: &SegmentMap,
    types: &TypeTable,
    options: &Options,
) -> ! {
    error!("Heap consistency check failed: {}", error);
    let path = diagnostics_path();
    match std::fs::write(&path, diagnostics(error, storage, types)) {
        Ok(()) => error!("Diagnostics written to {}", path.display()),
        Err(e) => error!("Unable to write diagnostics to {}: {}", path.display(), e),
    }
    if options.dump_enable {
        if let Err(e) = write_memory_dump(storage, &options.dump_path) {
            error!("Unable to write memory dump: {}", e);
        }
    }
    panic!("object memory is corrupt: {}", error);
}
