//! Envelopes: object graphs flattened for transfer to another memory.
//!
//! Packing copies the receiver and its transitive closure into a [`FlatBuffer`]. Unpacking
//! ("puffing") validates the buffer, copies it into the heap in one block and turns it back
//! into live objects in two passes: relocation, then proxy binding and rehashing.
//!
//! The transfer format written by [`Envelope::to_bytes`] is one word holding the byte count,
//! then the buffer words in native byte order.

use std::io::{self, Read, Write};

use crate::util::constants::BYTES_IN_WORD;
use crate::util::error::EnvelopeError;

pub mod buffer;
mod flatten;
mod proxy;
mod puff;
mod relocate;

pub use self::buffer::FlatBuffer;
pub use self::flatten::Flattener;
pub use self::proxy::ProxyRegistry;
pub use self::relocate::{Relocator, Unflattener};

pub(crate) use self::flatten::pack;
pub(crate) use self::puff::puff;

/// A packed object graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    words: Vec<usize>,
}

impl Envelope {
    pub(crate) fn from_buffer(buffer: FlatBuffer) -> Self {
        Envelope {
            words: buffer.into_words(),
        }
    }

    /// Wrap words received from elsewhere. They are validated when unpacked.
    pub fn from_words(words: Vec<usize>) -> Self {
        Envelope { words }
    }

    pub fn words(&self) -> &[usize] {
        &self.words
    }

    pub fn len_bytes(&self) -> usize {
        self.words.len() * BYTES_IN_WORD
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(BYTES_IN_WORD + self.len_bytes());
        bytes.extend_from_slice(&self.len_bytes().to_ne_bytes());
        bytes.extend_from_slice(bytemuck::cast_slice(&self.words));
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        if bytes.len() < BYTES_IN_WORD {
            return Err(EnvelopeError::Malformed {
                offset: 0,
                reason: "missing length word",
            });
        }
        let (count, rest) = bytes.split_at(BYTES_IN_WORD);
        let count: usize = bytemuck::pod_read_unaligned(count);
        if count != rest.len() || count % BYTES_IN_WORD != 0 {
            return Err(EnvelopeError::Malformed {
                offset: 0,
                reason: "length word does not match the data",
            });
        }
        let words = rest
            .chunks_exact(BYTES_IN_WORD)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        Ok(Envelope { words })
    }

    pub fn write_to<W: Write>(&self, destination: &mut W) -> io::Result<()> {
        destination.write_all(&self.to_bytes())
    }

    pub fn read_from<R: Read>(source: &mut R) -> Result<Self, EnvelopeError> {
        let mut bytes = vec![];
        source.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_carry_the_length() {
        let envelope = Envelope::from_words(vec![1, 2, 3]);
        let bytes = envelope.to_bytes();
        assert_eq!(bytes.len(), 4 * BYTES_IN_WORD);
        assert_eq!(Envelope::from_bytes(&bytes).unwrap(), envelope);
        assert!(Envelope::from_bytes(&bytes[..bytes.len() - 1]).is_err());
        assert!(Envelope::from_bytes(&bytes[..3]).is_err());
    }

    #[test]
    fn read_and_write() {
        let envelope = Envelope::from_words(vec![7; 5]);
        let mut sink = vec![];
        envelope.write_to(&mut sink).unwrap();
        let read = Envelope::read_from(&mut sink.as_slice()).unwrap();
        assert_eq!(read.words(), envelope.words());
    }
}
