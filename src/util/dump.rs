//! Raw memory dumps for postmortem debugging.
//!
//! The dump is a sequence of segment records. Each record is three native-endian words
//! (set kind index, start address, size in bytes) followed by the segment's raw words.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use enum_map::Enum;

use crate::util::heap::{Segment, SegmentMap};

fn write_segment<W: Write>(out: &mut W, segment: &Segment) -> io::Result<()> {
    let record = [
        segment.kind().into_usize(),
        segment.start().as_usize(),
        segment.size(),
    ];
    out.write_all(bytemuck::cast_slice(&record))?;
    out.write_all(bytemuck::cast_slice(segment.words()))
}

/// Write every segment of `storage` to `path`.
pub fn write_memory_dump(storage: &SegmentMap, path: &Path) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    let mut segments = 0;
    for segment in storage.segments() {
        write_segment(&mut out, segment)?;
        segments += 1;
    }
    out.flush()?;
    info!("Dumped {} segments to {}", segments, path.display());
    Ok(())
}
