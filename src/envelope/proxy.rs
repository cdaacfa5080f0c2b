use std::collections::HashMap;

use crate::util::bucket::GrowableBucket;
use crate::util::ObjectReference;

/// Objects that are replaced by a tag when they cross an envelope boundary, such as
/// per-process singletons. Each side of an envelope registers its own object under the
/// shared tag; unpacking binds the tag to the receiving side's object.
#[derive(Default)]
pub struct ProxyRegistry {
    tags: GrowableBucket<usize>,
    objects: HashMap<usize, ObjectReference>,
}

impl ProxyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `tag` to `object`, replacing any earlier binding of either.
    pub fn register(&mut self, object: ObjectReference, tag: usize) {
        if let Some(old_tag) = self.tags.remove(object) {
            self.objects.remove(&old_tag);
        }
        if let Some(old_object) = self.objects.insert(tag, object) {
            self.tags.remove(old_object);
        }
        self.tags.put(tag, object);
    }

    pub fn tag_of(&self, object: ObjectReference) -> Option<usize> {
        self.tags.get(object)
    }

    pub fn resolve(&self, tag: usize) -> Option<ObjectReference> {
        self.objects.get(&tag).copied()
    }

    /// Registered objects are kept alive by the collector.
    pub fn objects(&self) -> impl Iterator<Item = ObjectReference> + '_ {
        self.objects.values().copied()
    }
}
