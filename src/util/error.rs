//! Error types of the memory manager.

use std::fmt;
use std::io;

use crate::util::{Address, ObjectReference};
use crate::vm::TypeCode;

/// The heap cannot provide the requested memory, even after collecting and growing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AllocationError {
    HeapOutOfMemory { requested: usize },
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AllocationError::HeapOutOfMemory { requested } => {
                write!(f, "out of object memory allocating {} bytes", requested)
            }
        }
    }
}

impl std::error::Error for AllocationError {}

/// Misuse of the object access API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemoryError {
    Allocation(AllocationError),
    /// The reference does not name an object in this memory.
    InvalidReference(ObjectReference),
    IndexOutOfBounds {
        object: ObjectReference,
        index: usize,
        len: usize,
    },
    WrongType {
        object: ObjectReference,
        expected: TypeCode,
        found: TypeCode,
    },
    /// An identity table has no free pair left.
    TableFull(ObjectReference),
    UnknownType(TypeCode),
    DuplicateType(TypeCode),
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MemoryError::Allocation(e) => write!(f, "{}", e),
            MemoryError::InvalidReference(r) => write!(f, "{} is not a live object", r),
            MemoryError::IndexOutOfBounds { object, index, len } => {
                write!(f, "index {} out of bounds for {} (length {})", index, object, len)
            }
            MemoryError::WrongType {
                object,
                expected,
                found,
            } => write!(f, "{} has type {}, expected {}", object, found, expected),
            MemoryError::TableFull(t) => write!(f, "identity table {} is full", t),
            MemoryError::UnknownType(c) => write!(f, "type code {} is not registered", c),
            MemoryError::DuplicateType(c) => write!(f, "type code {} is already registered", c),
        }
    }
}

impl std::error::Error for MemoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MemoryError::Allocation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AllocationError> for MemoryError {
    fn from(e: AllocationError) -> Self {
        MemoryError::Allocation(e)
    }
}

/// What is wrong with a reference found by the validating mark.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OrphanKind {
    /// Points outside every segment.
    OutsideHeap,
    /// Not aligned to the allocation grain.
    Misaligned,
    /// The header's size is not a valid object size, or runs past the segment.
    BadSize(usize),
    /// Points at free space.
    DeadObject,
    /// Points into the middle of an object.
    NotObjectStart,
    UnknownType(TypeCode),
    /// A segment whose objects do not tile it exactly.
    MalformedSegment { at: Address, size: usize },
}

impl fmt::Display for OrphanKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OrphanKind::OutsideHeap => write!(f, "reference outside object memory"),
            OrphanKind::Misaligned => write!(f, "misaligned reference"),
            OrphanKind::BadSize(size) => write!(f, "invalid object size {}", size),
            OrphanKind::DeadObject => write!(f, "reference to a dead object"),
            OrphanKind::NotObjectStart => write!(f, "reference into the middle of an object"),
            OrphanKind::UnknownType(code) => write!(f, "unknown type code {}", code),
            OrphanKind::MalformedSegment { at, size } => {
                write!(f, "malformed segment: size {} at {}", size, at)
            }
        }
    }
}

/// An internal consistency violation: the heap has been corrupted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsistencyError {
    /// The bad reference (or segment position).
    pub reference: Address,
    pub kind: OrphanKind,
    /// Objects leading to the bad reference, innermost first.
    pub ancestry: Vec<ObjectReference>,
}

impl fmt::Display for ConsistencyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} at {}", self.kind, self.reference)?;
        if let Some(referrer) = self.ancestry.first() {
            write!(f, " (referenced from {})", referrer)?;
        }
        Ok(())
    }
}

impl std::error::Error for ConsistencyError {}

/// Errors raised while visiting a reference in one of the special traversal modes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TraversalError {
    /// A flat buffer holds an offset that does not name an object of the buffer.
    Malformed { offset: usize, reason: &'static str },
    /// A proxy tag that the receiving memory does not know.
    UnresolvedProxy { tag: usize },
    Consistency(ConsistencyError),
}

impl fmt::Display for TraversalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TraversalError::Malformed { offset, reason } => {
                write!(f, "malformed data at offset {:#x}: {}", offset, reason)
            }
            TraversalError::UnresolvedProxy { tag } => write!(f, "unresolved proxy tag {}", tag),
            TraversalError::Consistency(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for TraversalError {}

impl From<ConsistencyError> for TraversalError {
    fn from(e: ConsistencyError) -> Self {
        TraversalError::Consistency(e)
    }
}

/// Errors packing or unpacking an envelope.
#[derive(Debug)]
pub enum EnvelopeError {
    Malformed { offset: usize, reason: &'static str },
    UnresolvedProxy { tag: usize },
    Allocation(AllocationError),
    Memory(MemoryError),
    Io(io::Error),
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EnvelopeError::Malformed { offset, reason } => {
                write!(f, "malformed envelope at offset {:#x}: {}", offset, reason)
            }
            EnvelopeError::UnresolvedProxy { tag } => {
                write!(f, "envelope refers to unknown proxy tag {}", tag)
            }
            EnvelopeError::Allocation(e) => write!(f, "{}", e),
            EnvelopeError::Memory(e) => write!(f, "{}", e),
            EnvelopeError::Io(e) => write!(f, "envelope i/o: {}", e),
        }
    }
}

impl std::error::Error for EnvelopeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EnvelopeError::Allocation(e) => Some(e),
            EnvelopeError::Memory(e) => Some(e),
            EnvelopeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AllocationError> for EnvelopeError {
    fn from(e: AllocationError) -> Self {
        EnvelopeError::Allocation(e)
    }
}

impl From<MemoryError> for EnvelopeError {
    fn from(e: MemoryError) -> Self {
        EnvelopeError::Memory(e)
    }
}

impl From<io::Error> for EnvelopeError {
    fn from(e: io::Error) -> Self {
        EnvelopeError::Io(e)
    }
}

impl From<TraversalError> for EnvelopeError {
    fn from(e: TraversalError) -> Self {
        match e {
            TraversalError::Malformed { offset, reason } => {
                EnvelopeError::Malformed { offset, reason }
            }
            TraversalError::UnresolvedProxy { tag } => EnvelopeError::UnresolvedProxy { tag },
            TraversalError::Consistency(e) => EnvelopeError::Malformed {
                offset: e.reference.as_usize(),
                reason: "inconsistent object",
            },
        }
    }
}

/// Errors saving or restoring an image.
#[derive(Debug)]
pub enum ImageError {
    Io(io::Error),
    BadMagic,
    UnsupportedVersion(usize),
    Malformed { offset: usize, reason: &'static str },
    Allocation(AllocationError),
    Memory(MemoryError),
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ImageError::Io(e) => write!(f, "image i/o: {}", e),
            ImageError::BadMagic => write!(f, "not an object memory image"),
            ImageError::UnsupportedVersion(v) => write!(f, "unsupported image version {}", v),
            ImageError::Malformed { offset, reason } => {
                write!(f, "malformed image at offset {:#x}: {}", offset, reason)
            }
            ImageError::Allocation(e) => write!(f, "{}", e),
            ImageError::Memory(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ImageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImageError::Io(e) => Some(e),
            ImageError::Allocation(e) => Some(e),
            ImageError::Memory(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ImageError {
    fn from(e: io::Error) -> Self {
        ImageError::Io(e)
    }
}

impl From<AllocationError> for ImageError {
    fn from(e: AllocationError) -> Self {
        ImageError::Allocation(e)
    }
}

impl From<MemoryError> for ImageError {
    fn from(e: MemoryError) -> Self {
        ImageError::Memory(e)
    }
}

impl From<TraversalError> for ImageError {
    fn from(e: TraversalError) -> Self {
        match e {
            TraversalError::Malformed { offset, reason } => ImageError::Malformed { offset, reason },
            TraversalError::UnresolvedProxy { .. } => ImageError::Malformed {
                offset: 0,
                reason: "image contains a proxy",
            },
            TraversalError::Consistency(e) => ImageError::Malformed {
                offset: e.reference.as_usize(),
                reason: "inconsistent object",
            },
        }
    }
}

impl From<EnvelopeError> for ImageError {
    fn from(e: EnvelopeError) -> Self {
        match e {
            EnvelopeError::Malformed { offset, reason } => ImageError::Malformed { offset, reason },
            EnvelopeError::UnresolvedProxy { .. } => ImageError::Malformed {
                offset: 0,
                reason: "image contains a proxy",
            },
            EnvelopeError::Allocation(e) => ImageError::Allocation(e),
            EnvelopeError::Memory(e) => ImageError::Memory(e),
            EnvelopeError::Io(e) => ImageError::Io(e),
        }
    }
}
