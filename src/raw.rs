use crate::node::Node;
use crossbeam_epoch::{Atomic, Guard, Owned};
use std::sync::atomic::Ordering;

/// Largest supported exponent; the directory addresses up to `2^31` buckets
/// through 32 top-level slots.
pub(crate) const MAX_EXPONENT: u32 = 31;

/// One generation of bucket slots.
///
/// Top-level slot `k` holds a segment of `max(1, 2^(k-1))` buckets. A
/// segment is published once by the grow that creates its generation and is
/// never replaced; its slots start out null and are filled in lazily as
/// sentinels are materialized.
pub(crate) struct Segment<K, V> {
    buckets: Box<[Atomic<Node<K, V>>]>,
}

impl<K, V> Segment<K, V> {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            buckets: vec![Atomic::null(); len].into_boxed_slice(),
        }
    }
}

/// The two-level bucket directory.
///
/// Bucket pointers are lookup shortcuts into the list, not owners: the nodes
/// they reference belong to the list and are only ever freed through it.
pub(crate) struct Directory<K, V> {
    slots: [Atomic<Segment<K, V>>; MAX_EXPONENT as usize + 1],
}

/// Maps a bucket index to its `(slot, offset)` directory coordinates.
pub(crate) fn coords(index: u32) -> (usize, usize) {
    if index == 0 {
        (0, 0)
    } else {
        let k = (32 - index.leading_zeros()) as usize;
        (k, (index - (1 << (k - 1))) as usize)
    }
}

/// Length of the segment stored in top-level slot `k`.
pub(crate) fn segment_len(k: usize) -> usize {
    if k == 0 {
        1
    } else {
        1 << (k - 1)
    }
}

/// The parent of bucket `index > 0`: the index with its highest set bit
/// cleared. Parents are always materialized before their children, forming a
/// tree rooted at bucket 0.
pub(crate) fn parent(index: u32) -> u32 {
    debug_assert_ne!(index, 0);
    index & !(1 << (31 - index.leading_zeros()))
}

impl<K, V> Directory<K, V> {
    /// Creates the directory with generation 0 published and its single
    /// bucket pointing at `head`, the bucket-0 sentinel.
    pub(crate) fn new(head: &Atomic<Node<K, V>>) -> Self {
        let slots = std::array::from_fn(|_| Atomic::null());
        let directory = Self { slots };
        let first = Segment {
            buckets: vec![head.clone()].into_boxed_slice(),
        };
        directory.slots[0].store(Owned::new(first), Ordering::Release);
        directory
    }

    /// Returns the bucket slot for `index`, or `None` if the top-level slot
    /// of its generation has not been published yet (the caller then
    /// re-reads the exponent and remaps).
    pub(crate) fn bucket<'g>(
        &'g self,
        index: u32,
        guard: &'g Guard,
    ) -> Option<&'g Atomic<Node<K, V>>> {
        let (k, j) = coords(index);
        let segment = self.slots[k].load(Ordering::Acquire, guard);
        // safety: segments are never unlinked before the directory is
        // dropped, which cannot happen while we hold a &self
        let segment = unsafe { segment.as_ref() }?;
        debug_assert_eq!(segment.buckets.len(), segment_len(k));
        Some(&segment.buckets[j])
    }

    /// Publishes the segment for generation `k`. Returns `false` if another
    /// thread already published it, in which case the allocation is dropped.
    pub(crate) fn publish(&self, k: usize, segment: Segment<K, V>, guard: &Guard) -> bool {
        debug_assert_eq!(segment.buckets.len(), segment_len(k));
        self.slots[k]
            .compare_exchange(
                crossbeam_epoch::Shared::null(),
                Owned::new(segment),
                Ordering::Release,
                Ordering::Relaxed,
                guard,
            )
            .is_ok()
    }
}

impl<K, V> Drop for Directory<K, V> {
    fn drop(&mut self) {
        // safety: we have &mut self, so no other thread holds a guard into
        // the directory; the bucket slots are weak references and must not
        // be freed here
        let guard = unsafe { crossbeam_epoch::unprotected() };
        for slot in &self.slots {
            let segment = slot.load(Ordering::Relaxed, guard);
            if !segment.is_null() {
                drop(unsafe { segment.into_owned() });
            }
        }
    }
}
