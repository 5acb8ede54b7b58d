use crossbeam_epoch::Atomic;

/// A node in the split-ordered list.
///
/// Sentinels and real entries share one node type so that a single sorted
/// list can hold both; the `entry` payload tells them apart.
#[derive(Debug)]
pub(crate) struct Node<K, V> {
    /// The raw 32-bit hash of the key, or the bucket index for sentinels.
    pub(crate) hash: u32,
    /// Bit-reversed `hash`. The low bit is 1 for real entries and 0 for
    /// sentinels, so a bucket's sentinel always sorts strictly before every
    /// entry in that bucket.
    pub(crate) sort_key: u32,
    pub(crate) entry: Entry<K, V>,
    /// The next node in sort-key order. A tag of 1 on this pointer marks
    /// *this* node as logically deleted.
    pub(crate) next: Atomic<Node<K, V>>,
}

/// Payload of a list node.
#[derive(Debug)]
pub(crate) enum Entry<K, V> {
    /// Permanent left-anchor for a bucket; carries no data and is never
    /// unlinked.
    Sentinel,
    /// A live key-value mapping. The value sits behind an atomic pointer so
    /// that an overwrite is a single word swap.
    Mapping { key: K, value: Atomic<V> },
}

/// Sort key of a real entry with the given hash.
pub(crate) fn entry_key(hash: u32) -> u32 {
    hash.reverse_bits() | 1
}

/// Sort key of the sentinel anchoring the given bucket.
pub(crate) fn sentinel_key(index: u32) -> u32 {
    index.reverse_bits() & !1
}

impl<K, V> Node<K, V> {
    pub(crate) fn sentinel(index: u32) -> Self {
        Self {
            hash: index,
            sort_key: sentinel_key(index),
            entry: Entry::Sentinel,
            next: Atomic::null(),
        }
    }

    pub(crate) fn mapping(hash: u32, key: K, value: Atomic<V>) -> Self {
        Self {
            hash,
            sort_key: entry_key(hash),
            entry: Entry::Mapping { key, value },
            next: Atomic::null(),
        }
    }

    pub(crate) fn is_sentinel(&self) -> bool {
        matches!(self.entry, Entry::Sentinel)
    }

    pub(crate) fn as_mapping(&self) -> Option<(&K, &Atomic<V>)> {
        if let Entry::Mapping { ref key, ref value } = self.entry {
            Some((key, value))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn sentinel_sorts_before_its_entries() {
        // bucket 1 at exponent 2 holds hashes 1, 5, 9, ...
        for hash in [1u32, 5, 9, 13, 0xffff_fffd] {
            assert!(sentinel_key(1) < entry_key(hash));
        }
        assert_eq!(sentinel_key(0), 0);
        assert_eq!(entry_key(0), 1);
    }

    #[test]
    fn buckets_interleave_across_generations() {
        // growing from 2^e to 2^(e+1) buckets places bucket i + 2^e between
        // bucket i and the next bucket of generation e
        assert!(sentinel_key(0) < sentinel_key(2));
        assert!(sentinel_key(2) < sentinel_key(1));
        assert!(sentinel_key(1) < sentinel_key(3));
        // and an entry keeps sorting after the finer sentinel that takes it
        // over at generation e + 1
        let hash = 6; // bucket 2 of 4, bucket 6 of 8
        assert!(sentinel_key(2) < sentinel_key(6));
        assert!(sentinel_key(6) < entry_key(hash));
    }

    #[test]
    fn top_bit_hashes_share_a_sort_key() {
        // reversal folds bit 31 into the flag bit, so these two hashes tie
        // and must be told apart by the `hash` field
        let h = 0x1234_5678;
        assert_eq!(entry_key(h), entry_key(h ^ 0x8000_0000));
    }

    #[test]
    fn node_flavors() {
        let s = Node::<u32, u32>::sentinel(3);
        assert!(s.is_sentinel());
        assert!(s.as_mapping().is_none());
        assert_eq!(s.hash, 3);
        assert_eq!(s.sort_key & 1, 0);

        let n = Node::mapping(3, 3u32, Atomic::new(7u32));
        assert!(!n.is_sentinel());
        assert_eq!(n.as_mapping().unwrap().0, &3);
        assert_eq!(n.sort_key & 1, 1);
        assert!(s.sort_key < n.sort_key);

        // reclaim the value we allocated above
        let (_, value) = n.as_mapping().unwrap();
        // safety: the node was never shared
        let guard = unsafe { crossbeam_epoch::unprotected() };
        drop(unsafe { value.load(Ordering::Relaxed, guard).into_owned() });
    }
}
