use bytemuck::NoUninit;

use std::fmt;
use std::num::NonZeroUsize;
use std::ops::*;

use crate::util::constants::{BYTES_IN_WORD, HEADER_BYTES};

/// size in bytes
pub type ByteSize = usize;

/// Address represents a location in the object memory. Addresses are not host pointers:
/// they name a word inside one of the segments owned by the segment map, and all reads
/// and writes go through the segment that contains them. This keeps address arithmetic
/// (object walking, slot offsets) free of undefined behaviour.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, Hash, PartialOrd, Ord, PartialEq, NoUninit)]
pub struct Address(usize);

/// Address + ByteSize (positive)
impl Add<ByteSize> for Address {
    type Output = Address;
    fn add(self, offset: ByteSize) -> Address {
        Address(self.0 + offset)
    }
}

/// Address += ByteSize (positive)
impl AddAssign<ByteSize> for Address {
    fn add_assign(&mut self, offset: ByteSize) {
        self.0 += offset;
    }
}

/// Address - ByteSize (positive)
impl Sub<ByteSize> for Address {
    type Output = Address;
    fn sub(self, offset: ByteSize) -> Address {
        Address(self.0 - offset)
    }
}

/// Address - Address (the first address must be higher)
impl Sub<Address> for Address {
    type Output = ByteSize;
    fn sub(self, other: Address) -> ByteSize {
        debug_assert!(
            self.0 >= other.0,
            "for (addr_a - addr_b), a({}) needs to be larger than b({})",
            self,
            other
        );
        self.0 - other.0
    }
}

impl Address {
    /// creates an arbitrary Address
    pub const fn from_usize(raw: usize) -> Address {
        Address(raw)
    }

    /// is this address aligned to the given alignment
    pub const fn is_aligned_to(self, align: usize) -> bool {
        use crate::util::conversions;
        conversions::raw_is_aligned(self.0, align)
    }

    /// converts the Address into a usize
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

/// allows Display format the Address (as a hex value with 0x prefix)
impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// allows Debug format the Address (as a hex value with 0x prefix)
impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// ObjectReference represents the identity of a heap object. It is the address of the
/// object's header. Compared with Address, operations allowed on ObjectReference are very
/// limited: no arithmetic, only conversion to the header/body addresses. An object reference
/// is never null; a nullable reference is `Option<ObjectReference>`, which has the same size
/// as a word and is stored in memory as `0` for `None`.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, Hash, PartialOrd, Ord, PartialEq)]
pub struct ObjectReference(NonZeroUsize);

impl ObjectReference {
    /// Cast the object reference to its raw address.
    pub fn to_raw_address(self) -> Address {
        Address(self.0.get())
    }

    /// Cast a raw address to an object reference. Returns `None` for the zero address.
    pub fn from_raw_address(addr: Address) -> Option<ObjectReference> {
        NonZeroUsize::new(addr.0).map(ObjectReference)
    }

    /// Decode a word loaded from a reference slot.
    pub fn from_word(word: usize) -> Option<ObjectReference> {
        NonZeroUsize::new(word).map(ObjectReference)
    }

    /// Encode a nullable reference as the word stored in a reference slot.
    pub fn to_word(reference: Option<ObjectReference>) -> usize {
        reference.map_or(0, |r| r.0.get())
    }

    /// Address of the `index`th word of the object's body.
    pub fn body_word(self, index: usize) -> Address {
        self.to_raw_address() + HEADER_BYTES + index * BYTES_IN_WORD
    }

    /// Address of the `index`th word of the object's header.
    pub fn header_word(self, index: usize) -> Address {
        self.to_raw_address() + index * BYTES_IN_WORD
    }

    /// returns the ObjectReference
    pub fn value(self) -> usize {
        self.0.get()
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}

impl fmt::Debug for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}

#[cfg(test)]
mod tests {
    use crate::util::constants::*;
    use crate::util::{Address, ObjectReference};

    #[test]
    fn is_aligned_to() {
        assert!(Address::from_usize(0).is_aligned_to(8));
        assert!(!Address::from_usize(1).is_aligned_to(8));
        assert!(Address::from_usize(24).is_aligned_to(8));
    }

    #[test]
    fn null_reference() {
        assert_eq!(ObjectReference::from_raw_address(Address::from_usize(0)), None);
        assert_eq!(ObjectReference::from_word(0), None);
        assert_eq!(ObjectReference::to_word(None), 0);
    }

    #[test]
    fn reference_word_round_trip() {
        let obj = ObjectReference::from_word(HEAP_START).unwrap();
        assert_eq!(ObjectReference::to_word(Some(obj)), HEAP_START);
        assert_eq!(obj.to_raw_address(), Address::from_usize(HEAP_START));
        assert_eq!(
            obj.body_word(1),
            Address::from_usize(HEAP_START + HEADER_BYTES + BYTES_IN_WORD)
        );
        assert_eq!(obj.header_word(2), Address::from_usize(HEAP_START + 2 * BYTES_IN_WORD));
    }
}
