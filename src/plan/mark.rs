//! The mark/sweep collection.

use enum_map::EnumMap;

use crate::plan::context::TraversalContext;
use crate::plan::heap::Heap;
use crate::plan::orphan::OrphanMarker;
use crate::plan::tracing::collect_slots;
use crate::policy::SweepSummary;
use crate::util::error::{ConsistencyError, TraversalError};
use crate::util::header::MarkValue;
use crate::util::heap::SegmentKind;
use crate::util::panic::fatal_consistency_error;
use crate::util::ObjectReference;

/// What one collection did.
#[derive(Copy, Clone, Debug, Default)]
pub struct CollectionSummary {
    pub mark: Option<MarkValue>,
    pub swept: EnumMap<SegmentKind, SweepSummary>,
    pub uninits_queued: usize,
}

impl CollectionSummary {
    pub fn live_objects(&self) -> usize {
        self.swept.values().map(|s| s.live_objects).sum()
    }

    pub fn reclaimed_objects(&self) -> usize {
        self.swept.values().map(|s| s.reclaimed_objects).sum()
    }
}

impl Heap {
    /// Mark one object. Objects without references are done once their behaviour is
    /// marked; the others are pushed for scanning.
    pub(crate) fn mark(&mut self, object: ObjectReference) {
        let mut header = self.storage.header(object);
        if header.is_old_space() || header.is_object_live(self.mark) {
            return;
        }
        header.set_object_mark(self.mark);
        self.storage.set_header(object, &header);
        if header.has_references() {
            self.live_stack.push(Some(object));
        } else if let Some(behaviour) = header.behaviour() {
            self.mark(behaviour);
        }
    }

    /// Mark the reference slots of a popped object.
    fn live(&mut self, object: ObjectReference) {
        for slot in collect_slots(&self.types, &self.storage, object, false) {
            if let Some(referent) = slot.load(&self.storage) {
                self.mark(referent);
            }
        }
    }

    /// Mark everything reachable from `root`.
    pub(crate) fn mark_objects_main(&mut self, root: ObjectReference) {
        self.live_stack.push_sentinel();
        self.mark(root);
        while let Some(object) = self.live_stack.pop() {
            if let Some(behaviour) = self.storage.header(object).behaviour() {
                self.mark(behaviour);
            }
            self.live(object);
        }
    }

    fn mark_root(
        &mut self,
        root: ObjectReference,
        checker: &mut Option<TraversalContext>,
    ) -> Result<(), ConsistencyError> {
        match checker {
            Some(context) => match context.trace_from(self, root) {
                Ok(_) => Ok(()),
                Err(TraversalError::Consistency(e)) => Err(e),
                Err(e) => panic!("unexpected {} while checking the heap", e),
            },
            None => {
                self.mark_objects_main(root);
                Ok(())
            }
        }
    }

    fn is_live(&self, object: ObjectReference) -> bool {
        let header = self.storage.header(object);
        header.is_old_space() || header.is_object_live(self.mark)
    }

    /// Run a full collection. A consistency failure found by the validating mark is fatal.
    pub fn collect(&mut self) -> CollectionSummary {
        let validate = self.options.orphan_check;
        match self.collect_with(validate) {
            Ok(summary) => summary,
            Err(e) => fatal_consistency_error(&e, &self.storage, &self.types, &self.options),
        }
    }

    /// Run a full validating collection, returning the first consistency failure instead
    /// of aborting. Nothing is swept if validation fails.
    pub fn verify(&mut self) -> Result<CollectionSummary, ConsistencyError> {
        self.collect_with(true)
    }

    fn collect_with(&mut self, validate: bool) -> Result<CollectionSummary, ConsistencyError> {
        let previous = self.mark;
        self.mark = self.mark.flip();
        let result = self.mark_and_sweep(validate);
        self.live_stack.reset();
        if result.is_err() {
            self.abandon_mark(previous);
        }
        result
    }

    fn mark_and_sweep(&mut self, validate: bool) -> Result<CollectionSummary, ConsistencyError> {
        let mut checker = if validate {
            Some(TraversalContext::OrphanCheck(OrphanMarker::new(
                &self.storage,
                self.options.live_stack_size,
            )?))
        } else {
            None
        };
        let mut summary = CollectionSummary {
            mark: Some(self.mark),
            ..Default::default()
        };

        let mut roots = self.roots.clone();
        roots.extend(self.save_table.held());
        roots.extend(self.old2new.keys());
        roots.extend(self.pending_uninits.iter().copied());
        roots.extend(self.proxies.objects());
        for root in roots {
            self.mark_root(root, &mut checker)?;
        }

        // Entries already reached are protected elsewhere. The rest are kept for this one
        // collection. Either way the stack is emptied.
        let saved = self
            .save_stack
            .as_mut()
            .map(|s| s.take_all())
            .unwrap_or_default();
        for object in saved {
            if !self.is_live(object) {
                self.mark_root(object, &mut checker)?;
            }
        }

        for object in self.uninit_table.keys() {
            if self.is_live(object) {
                continue;
            }
            self.mark_root(object, &mut checker)?;
            self.storage.update_header(object, |h| {
                h.set_uninit_pending(true);
                h.set_has_uninit(false);
            });
            self.uninit_table.remove(object);
            self.pending_uninits.push(object);
            summary.uninits_queued += 1;
        }

        for kind in [SegmentKind::Normal, SegmentKind::Large] {
            summary.swept[kind] = self.sets[kind].sweep(&mut self.storage, self.mark)?;
        }
        self.trigger.on_gc_end();
        info!(
            "Collection {}: {} live objects, {} reclaimed, {} bytes free{}",
            self.trigger.collections(),
            summary.live_objects(),
            summary.reclaimed_objects(),
            summary.swept.values().map(|s| s.free_bytes).sum::<usize>(),
            if validate { " (validated)" } else { "" }
        );
        Ok(summary)
    }

    /// Undo a partial mark: every object gets `previous` again, as if just allocated, so the
    /// next collection starts from a consistent state.
    fn abandon_mark(&mut self, previous: MarkValue) {
        self.mark = previous;
        for kind in [SegmentKind::Normal, SegmentKind::Large] {
            for &start in self.sets[kind].segments() {
                let objects: Vec<_> = match self.storage.segment(start) {
                    Some(segment) => segment
                        .objects()
                        .map_while(|o| o.ok())
                        .filter(|(_, h)| !h.is_dead_object())
                        .map(|(addr, _)| addr)
                        .collect(),
                    None => continue,
                };
                for addr in objects {
                    if let Some(object) = ObjectReference::from_raw_address(addr) {
                        self.storage
                            .update_header(object, |h| h.set_object_mark(previous));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_util::fixtures::{heap, pair};

    #[test]
    fn each_collection_flips_the_mark() {
        let mut heap = heap();
        let root = pair(&mut heap, None, None);
        heap.add_root(root);
        let first = heap.collect();
        assert_eq!(first.mark, Some(MarkValue::FIRST.flip()));
        assert!(heap.storage.header(root).is_object_live(heap.mark));
        let second = heap.collect();
        assert_eq!(second.mark, Some(MarkValue::FIRST));
        assert!(heap.storage.header(root).is_object_live(heap.mark));
    }

    #[test]
    fn behaviours_of_leaf_objects_are_marked() {
        let mut heap = heap();
        let behaviour = pair(&mut heap, None, None);
        let leaf = pair(&mut heap, None, None);
        heap.storage.update_header(leaf, |h| {
            h.set_has_no_references();
            h.set_behaviour(Some(behaviour));
        });
        heap.add_root(leaf);
        let summary = heap.collect();
        assert_eq!(summary.live_objects(), 2);
    }

    #[test]
    fn overflowing_save_stack_drops_the_oldest() {
        let mut heap = heap();
        heap.init_save_stack();
        let capacity = heap.options.save_stack_size;
        let objects: Vec<_> = (0..capacity + 4).map(|_| pair(&mut heap, None, None)).collect();
        let summary = heap.collect();
        assert_eq!(summary.reclaimed_objects(), 4);
        assert!(objects[..4].iter().all(|o| !heap.is_valid_object(*o)));
        assert!(objects[4..].iter().all(|o| heap.is_valid_object(*o)));
    }

    #[test]
    fn failed_verification_restores_the_mark() {
        let mut heap = heap();
        let root = pair(&mut heap, None, None);
        let garbage = pair(&mut heap, None, None);
        heap.add_root(root);
        heap.storage.set_body_word(root, 0, 0x100);
        let before = heap.mark;
        let error = heap.verify().unwrap_err();
        assert_eq!(error.ancestry, vec![root]);
        assert_eq!(heap.mark, before);
        for object in [root, garbage] {
            assert!(heap.storage.header(object).is_object_live(before));
        }
    }
}
