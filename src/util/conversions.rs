use crate::util::constants::*;

/* Alignment */

pub const fn raw_align_up(val: usize, align: usize) -> usize {
    // See https://github.com/rust-lang/rust/blob/e620d0f337d0643c757bab791fc7d88d63217704/src/libcore/alloc.rs#L192
    val.wrapping_add(align).wrapping_sub(1) & !align.wrapping_sub(1)
}

pub const fn raw_is_aligned(val: usize, align: usize) -> bool {
    val & align.wrapping_sub(1) == 0
}

/// Round a requested object size up to the allocation grain, never below the minimum object size.
pub const fn grain_align_up(size: usize) -> usize {
    let aligned = raw_align_up(size, BYTES_IN_GRAIN);
    if aligned < MIN_OBJECT_SIZE {
        MIN_OBJECT_SIZE
    } else {
        aligned
    }
}

/// Is this a size an object or dead block may legally have?
pub const fn is_valid_object_size(size: usize) -> bool {
    size >= MIN_OBJECT_SIZE && raw_is_aligned(size, BYTES_IN_GRAIN)
}

/* Conversion */

pub const fn bytes_to_words(bytes: usize) -> usize {
    bytes >> LOG_BYTES_IN_WORD
}

pub const fn words_to_bytes(words: usize) -> usize {
    words << LOG_BYTES_IN_WORD
}

/// Bytes in `words` words, or `None` if that does not fit in a `usize`.
pub const fn checked_words_to_bytes(words: usize) -> Option<usize> {
    words.checked_mul(BYTES_IN_WORD)
}

/// Total object size needed for a body of `body_bytes`, or `None` if the aligned size
/// overflows.
pub fn object_size_for_body(body_bytes: usize) -> Option<usize> {
    let size = HEADER_BYTES.checked_add(body_bytes)?;
    size.checked_add(BYTES_IN_GRAIN - 1)?;
    Some(grain_align_up(size))
}
