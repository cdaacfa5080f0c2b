use crate::util::conversions::raw_align_up;

/// log2 of the number of bytes in a megabyte
pub const LOG_BYTES_IN_MBYTE: u8 = 20;
/// The number of bytes in a megabyte
pub const BYTES_IN_MBYTE: usize = 1 << LOG_BYTES_IN_MBYTE;

/// log2 of the number of bytes in a kilobyte
pub const LOG_BYTES_IN_KBYTE: u8 = 10;
/// The number of bytes in a kilobyte
pub const BYTES_IN_KBYTE: usize = 1 << LOG_BYTES_IN_KBYTE;

#[cfg(target_pointer_width = "32")]
/// log2 of the number of bytes in a word
pub const LOG_BYTES_IN_WORD: u8 = 2;
#[cfg(target_pointer_width = "64")]
/// log2 of the number of bytes in a word
pub const LOG_BYTES_IN_WORD: u8 = 3;
/// The number of bytes in a word
pub const BYTES_IN_WORD: usize = 1 << LOG_BYTES_IN_WORD;

/// log2 of the allocation grain. Every object size is a multiple of the grain.
pub const LOG_BYTES_IN_GRAIN: u8 = 3;
/// The allocation grain in bytes
pub const BYTES_IN_GRAIN: usize = 1 << LOG_BYTES_IN_GRAIN;

static_assertions::const_assert!(BYTES_IN_GRAIN >= BYTES_IN_WORD);
static_assertions::const_assert_eq!(BYTES_IN_WORD, std::mem::size_of::<usize>());

/// Number of words in the object header: size, flag bits, behaviour.
pub const HEADER_WORDS: usize = 3;
/// Bytes reserved for the header in front of every object body.
pub const HEADER_BYTES: usize = raw_align_up(HEADER_WORDS * BYTES_IN_WORD, BYTES_IN_GRAIN);
/// Smallest object (or dead block) that can exist in a segment: a bare header.
pub const MIN_OBJECT_SIZE: usize = HEADER_BYTES;

/// Word index of the size field inside the header.
pub const SIZE_WORD: usize = 0;
/// Word index of the flag bits inside the header.
pub const FLAGS_WORD: usize = 1;
/// Word index of the behaviour field inside the header.
pub const BEHAVIOUR_WORD: usize = 2;

/// First address handed out to segments. Anything below is never a heap address, so small
/// buffer offsets can never be mistaken for objects.
pub const HEAP_START: usize = 0x1000_0000;

/// Address space reserved per pool.
pub const POOL_SIZE: usize = 4 << LOG_BYTES_IN_MBYTE;

/// Default size of a normal segment.
pub const DEFAULT_SEGMENT_SIZE: usize = 64 << LOG_BYTES_IN_KBYTE;
/// Default lower bound for a large segment.
pub const DEFAULT_LARGE_SEGMENT_SIZE: usize = 512 << LOG_BYTES_IN_KBYTE;
/// Objects at or above this size are allocated in the large segment set.
pub const DEFAULT_LARGE_OBJECT_THRESHOLD: usize = 4 << LOG_BYTES_IN_KBYTE;
/// Default ceiling on committed segment memory.
pub const DEFAULT_MAX_HEAP_SIZE: usize = 512 << LOG_BYTES_IN_MBYTE;
/// Allocation volume after which a failed allocation collects before growing the heap.
pub const DEFAULT_COLLECTION_THRESHOLD: usize = 4 << LOG_BYTES_IN_MBYTE;

/// Initial number of entries in the live stack.
pub const DEFAULT_LIVE_STACK_SIZE: usize = 4096;
/// Initial number of entries in the save stack.
pub const DEFAULT_SAVE_STACK_SIZE: usize = 100;
/// Initial capacity of the growable identity buckets (save table, remembered set, ...).
pub const DEFAULT_BUCKET_SIZE: usize = 64;
