use std::fmt;
use std::sync::Arc;

use crate::util::error::MemoryError;
use crate::vm::builtin;
use crate::vm::Traceable;

/// The type code stored in every object header. It is the primitive behaviour of the object:
/// the index of its entry in the [`TypeTable`]. Type codes survive flattening unchanged, so
/// two memories that register the same types under the same codes can exchange envelopes
/// and images.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeCode(pub u16);

impl TypeCode {
    /// Header-only filler. Used for the offset-0 object of flat buffers.
    pub const PLACEHOLDER: TypeCode = TypeCode(0);
    /// A non-primitive behaviour object.
    pub const BEHAVIOUR: TypeCode = TypeCode(1);
    /// A length-prefixed array of references.
    pub const ARRAY: TypeCode = TypeCode(2);
    /// A length-prefixed byte string.
    pub const BYTES: TypeCode = TypeCode(3);
    /// A stand-in for an object that cannot be flattened.
    pub const PROXY: TypeCode = TypeCode(4);
    /// An identity-hashed table of references.
    pub const IDENTITY_TABLE: TypeCode = TypeCode(5);
    /// The first code available to the runtime for its own types.
    pub const FIRST_USER: TypeCode = TypeCode(16);

    pub const fn is_builtin(self) -> bool {
        self.0 < Self::FIRST_USER.0
    }
}

impl fmt::Debug for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TypeCode({})", self.0)
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The static per-process behaviour table. Built once by the memory builder and shared,
/// read-only, by the collector and the envelope code.
pub struct TypeTable {
    types: Vec<Option<Arc<dyn Traceable>>>,
}

impl TypeTable {
    /// A table holding only the built-in types.
    pub fn new() -> Self {
        let mut table = TypeTable {
            types: vec![None; TypeCode::FIRST_USER.0 as usize],
        };
        for (code, ty) in builtin::builtin_types() {
            table.types[code.0 as usize] = Some(ty);
        }
        table
    }

    /// Register a runtime type. Built-in codes cannot be replaced and a code can only be
    /// registered once.
    pub fn register(&mut self, code: TypeCode, ty: Arc<dyn Traceable>) -> Result<(), MemoryError> {
        if code.is_builtin() || self.is_known(code) {
            return Err(MemoryError::DuplicateType(code));
        }
        let index = code.0 as usize;
        if self.types.len() <= index {
            self.types.resize(index + 1, None);
        }
        trace!("Registered type {} as {}", ty.name(), code);
        self.types[index] = Some(ty);
        Ok(())
    }

    pub fn get(&self, code: TypeCode) -> Option<&Arc<dyn Traceable>> {
        self.types.get(code.0 as usize).and_then(|t| t.as_ref())
    }

    pub fn is_known(&self, code: TypeCode) -> bool {
        self.get(code).is_some()
    }

    /// Name of the type for diagnostics.
    pub fn name(&self, code: TypeCode) -> &'static str {
        self.get(code).map_or("<unknown>", |t| t.name())
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}
