//! The flat buffer shared by envelopes and images.
//!
//! A buffer is a sequence of objects laid out exactly as in a segment: each one a header
//! followed by its body, sizes in bytes, each object starting where the previous one ends.
//! References are replaced by byte offsets from the start of the buffer. The first object is
//! a bare placeholder header, so offset 0 is never an object and stands for null.

use crate::util::constants::{BYTES_IN_WORD, HEADER_WORDS, LOG_BYTES_IN_WORD, MIN_OBJECT_SIZE};
use crate::util::conversions::{bytes_to_words, is_valid_object_size};
use crate::util::error::TraversalError;
use crate::util::header::{MarkValue, ObjectHeader};
use crate::vm::{TypeCode, TypeTable};

/// A buffer under construction.
#[derive(Clone, Debug, Default)]
pub struct FlatBuffer {
    words: Vec<usize>,
}

impl FlatBuffer {
    /// A buffer holding only the placeholder.
    pub fn new() -> Self {
        let mut buffer = FlatBuffer { words: vec![] };
        let placeholder = ObjectHeader::init_header(MIN_OBJECT_SIZE, MarkValue::CLEAR, TypeCode::PLACEHOLDER);
        let offset = buffer.reserve(MIN_OBJECT_SIZE);
        buffer.write_header(offset, &placeholder.for_flatten());
        buffer
    }

    /// Size of the buffer in bytes. This is also the offset of the next object.
    pub fn len_bytes(&self) -> usize {
        self.words.len() << LOG_BYTES_IN_WORD
    }

    /// Append `size` zeroed bytes and return their offset.
    pub fn reserve(&mut self, size: usize) -> usize {
        let offset = self.len_bytes();
        self.words.resize(self.words.len() + bytes_to_words(size), 0);
        offset
    }

    pub fn load(&self, offset: usize) -> usize {
        self.words[offset >> LOG_BYTES_IN_WORD]
    }

    pub fn store(&mut self, offset: usize, value: usize) {
        self.words[offset >> LOG_BYTES_IN_WORD] = value;
    }

    pub fn write_header(&mut self, offset: usize, header: &ObjectHeader) {
        let index = offset >> LOG_BYTES_IN_WORD;
        self.words[index..index + HEADER_WORDS].copy_from_slice(&header.encode());
    }

    /// Copy `body` in after the header of the object at `offset`.
    pub fn write_body(&mut self, offset: usize, body: &[usize]) {
        let index = (offset >> LOG_BYTES_IN_WORD) + HEADER_WORDS;
        self.words[index..index + body.len()].copy_from_slice(body);
    }

    pub fn words(&self) -> &[usize] {
        &self.words
    }

    pub fn into_words(self) -> Vec<usize> {
        self.words
    }
}

fn malformed(offset: usize, reason: &'static str) -> TraversalError {
    TraversalError::Malformed { offset, reason }
}

/// Walk the objects of an untrusted buffer, checking that they tile it exactly and have
/// known types. Returns the offset of every object, the placeholder first.
pub fn validate(words: &[usize], types: &TypeTable) -> Result<Vec<usize>, TraversalError> {
    let total = words.len() * BYTES_IN_WORD;
    let mut starts = vec![];
    let mut offset = 0;
    while offset < total {
        if total - offset < MIN_OBJECT_SIZE {
            return Err(malformed(offset, "truncated object header"));
        }
        let index = offset >> LOG_BYTES_IN_WORD;
        let header = ObjectHeader::decode(&words[index..index + HEADER_WORDS]);
        let size = header.size();
        if !is_valid_object_size(size) || size > total - offset {
            return Err(malformed(offset, "invalid object size"));
        }
        if header.is_dead_object() {
            return Err(malformed(offset, "dead object in buffer"));
        }
        if !types.is_known(header.type_code()) {
            return Err(malformed(offset, "unknown type code"));
        }
        starts.push(offset);
        offset += size;
    }
    match starts.first() {
        Some(&0) if ObjectHeader::decode(&words[..HEADER_WORDS]).type_code() == TypeCode::PLACEHOLDER => {}
        _ => return Err(malformed(0, "missing placeholder")),
    }
    if starts.len() < 2 {
        return Err(malformed(0, "no objects after the placeholder"));
    }
    Ok(starts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::constants::HEADER_BYTES;

    fn with_array(len: usize) -> FlatBuffer {
        let mut buffer = FlatBuffer::new();
        let size = HEADER_BYTES + (1 + len) * BYTES_IN_WORD;
        let offset = buffer.reserve(size);
        buffer.write_header(offset, &ObjectHeader::init_header(size, MarkValue::CLEAR, TypeCode::ARRAY));
        buffer.store(offset + HEADER_BYTES, len);
        buffer
    }

    #[test]
    fn placeholder_comes_first() {
        let buffer = FlatBuffer::new();
        assert_eq!(buffer.len_bytes(), MIN_OBJECT_SIZE);
        // A placeholder alone is not a valid buffer.
        assert!(validate(buffer.words(), &TypeTable::new()).is_err());
        let buffer = with_array(2);
        assert_eq!(validate(buffer.words(), &TypeTable::new()).unwrap(), vec![0, MIN_OBJECT_SIZE]);
    }

    #[test]
    fn rejects_bad_sizes() {
        let types = TypeTable::new();
        let mut words = with_array(2).into_words();
        let array = MIN_OBJECT_SIZE / BYTES_IN_WORD;
        words[array] = 12;
        assert!(matches!(
            validate(&words, &types),
            Err(TraversalError::Malformed { offset, .. }) if offset == MIN_OBJECT_SIZE
        ));
        words[array] = 4096;
        assert!(validate(&words, &types).is_err());
        // Truncated: half an object at the end.
        let mut words = with_array(2).into_words();
        words.extend([48, 0]);
        assert!(validate(&words, &types).is_err());
    }

    #[test]
    fn rejects_unknown_types() {
        let mut words = with_array(1).into_words();
        let array = MIN_OBJECT_SIZE / BYTES_IN_WORD;
        let size = ObjectHeader::decode(&words[array..array + HEADER_WORDS]).size();
        let header = ObjectHeader::init_header(size, MarkValue::CLEAR, TypeCode(200));
        words[array..array + HEADER_WORDS].copy_from_slice(&header.encode());
        assert!(matches!(
            validate(&words, &TypeTable::new()),
            Err(TraversalError::Malformed { reason: "unknown type code", .. })
        ));
    }

    #[test]
    fn rejects_missing_placeholder() {
        let words = with_array(1).into_words();
        let without = &words[MIN_OBJECT_SIZE / BYTES_IN_WORD..];
        assert!(matches!(
            validate(without, &TypeTable::new()),
            Err(TraversalError::Malformed { reason: "missing placeholder", .. })
        ));
    }
}
