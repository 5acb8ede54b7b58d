use crate::map::VerifyError;
use crate::node::Node;
use crossbeam_epoch::{Atomic, Guard, Owned, Shared};
use std::sync::atomic::Ordering;

/// The single sorted linked list backing the whole table.
///
/// Ordering and deletion follow Harris' scheme: nodes are kept sorted by
/// `sort_key`, and deleting a node happens in two steps. First the deleter
/// CASes a mark (pointer tag 1) onto the victim's own `next` field, which
/// logically removes it; then the victim is unlinked from its predecessor
/// with a second CAS. Any search that passes a marked node completes the
/// unlink on the way, so a failed second step is always made up for later.
pub(crate) struct List<K, V> {
    /// The permanent head of the list: the sentinel for bucket 0.
    pub(crate) head: Atomic<Node<K, V>>,
}

/// A bracketing position in the list: `curr` is the first live node whose
/// sort key is at least the probe key (or null past the end), and `prev` is
/// the link that points at it.
pub(crate) struct Position<'g, K, V> {
    pub(crate) prev: &'g Atomic<Node<K, V>>,
    pub(crate) curr: Shared<'g, Node<K, V>>,
}

impl<K, V> List<K, V> {
    /// Finds the first live node with `sort_key >= probe`, starting from the
    /// link `start`, and unlinks any logically deleted node passed on the
    /// way.
    ///
    /// `start` must be the `next` link of a node that can never be deleted
    /// (a sentinel) or the list head.
    pub(crate) fn search<'g>(
        &'g self,
        start: &'g Atomic<Node<K, V>>,
        probe: u32,
        guard: &'g Guard,
    ) -> Position<'g, K, V> {
        'retry: loop {
            let mut prev = start;
            // `start` belongs to a sentinel and sentinels are never marked,
            // so this load is untagged
            let mut curr = prev.load(Ordering::SeqCst, guard);
            loop {
                // safety: `curr` was read under `guard`, and unlinked nodes
                // are only retired, never freed, while the epoch is pinned
                let node = match unsafe { curr.as_ref() } {
                    Some(node) => node,
                    None => return Position { prev, curr },
                };
                let next = node.next.load(Ordering::SeqCst, guard);
                if next.tag() != 0 {
                    // `node` is logically deleted; unlink it before moving
                    // on. the CAS fails if `prev` changed under us (or the
                    // node owning `prev` was itself marked), and then the
                    // walk must restart
                    match prev.compare_exchange(
                        curr,
                        next.with_tag(0),
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                        guard,
                    ) {
                        Ok(_) => {
                            // safety: the node is unreachable now and we are
                            // the thread that unlinked it; its value was
                            // already taken out by whoever marked it
                            unsafe { guard.defer_destroy(curr) };
                            curr = next.with_tag(0);
                        }
                        Err(_) => continue 'retry,
                    }
                } else {
                    if node.sort_key >= probe {
                        return Position { prev, curr };
                    }
                    prev = &node.next;
                    curr = next;
                }
            }
        }
    }

    /// Splices `node` in between `pos.prev` and `pos.curr`. On contention
    /// the allocation is handed back so the caller can retry.
    pub(crate) fn insert<'g>(
        &self,
        pos: &Position<'g, K, V>,
        node: Owned<Node<K, V>>,
        guard: &'g Guard,
    ) -> Result<Shared<'g, Node<K, V>>, Owned<Node<K, V>>> {
        // the CAS below releases this store
        node.next.store(pos.curr, Ordering::Relaxed);
        match pos
            .prev
            .compare_exchange(pos.curr, node, Ordering::SeqCst, Ordering::SeqCst, guard)
        {
            Ok(node) => Ok(node),
            Err(e) => Err(e.new),
        }
    }

    /// Deletes exactly `pos.curr`, whose successor the caller observed as
    /// `next`. Returns `false` if the node was already marked or the gap
    /// changed, in which case the caller re-searches.
    ///
    /// Only the value cell is taken out by the caller (the marker); the node
    /// itself is retired by whichever thread wins the physical unlink.
    pub(crate) fn remove<'g>(
        &self,
        pos: &Position<'g, K, V>,
        next: Shared<'g, Node<K, V>>,
        guard: &'g Guard,
    ) -> bool {
        // safety: as in `search`, `pos.curr` was read under `guard`
        let node = unsafe { pos.curr.deref() };
        debug_assert!(!node.is_sentinel());
        // logical delete: mark the victim's own next pointer
        if node
            .next
            .compare_exchange(
                next,
                next.with_tag(1),
                Ordering::SeqCst,
                Ordering::SeqCst,
                guard,
            )
            .is_err()
        {
            return false;
        }
        // best-effort physical unlink; a later search finishes the job if
        // this loses
        if pos
            .prev
            .compare_exchange(pos.curr, next, Ordering::SeqCst, Ordering::SeqCst, guard)
            .is_ok()
        {
            // safety: unreachable now, and we won the unlink
            unsafe { guard.defer_destroy(pos.curr) };
        }
        true
    }

    /// Checks that the list is well-formed: sort keys never decrease, and
    /// every node's sort-key parity matches its flavor.
    pub(crate) fn verify(&self, guard: &Guard) -> Result<(), VerifyError> {
        let mut prev_key = None;
        let mut curr = self.head.load(Ordering::SeqCst, guard);
        // safety: as in `search`
        while let Some(node) = unsafe { curr.as_ref() } {
            if let Some(prev) = prev_key {
                if node.sort_key < prev {
                    return Err(VerifyError::OutOfOrder {
                        prev,
                        next: node.sort_key,
                    });
                }
            }
            if node.is_sentinel() == (node.sort_key & 1 == 1) {
                return Err(VerifyError::ParityViolation {
                    sort_key: node.sort_key,
                });
            }
            prev_key = Some(node.sort_key);
            curr = node.next.load(Ordering::SeqCst, guard).with_tag(0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::entry_key;
    use crossbeam_epoch::{self as epoch, Atomic};
    use std::sync::atomic::Ordering;

    fn new_list() -> List<usize, usize> {
        // safety: nothing is shared yet
        let guard = unsafe { epoch::unprotected() };
        let head = Owned::new(Node::sentinel(0)).into_shared(guard);
        List {
            head: Atomic::from(head),
        }
    }

    fn insert_mapping(list: &List<usize, usize>, key: usize, value: usize) {
        let guard = &epoch::pin();
        let hash = key as u32;
        let node = Owned::new(Node::mapping(hash, key, Atomic::new(value)));
        let start = unsafe { &list.head.load(Ordering::SeqCst, guard).deref().next };
        let pos = list.search(start, entry_key(hash), guard);
        list.insert(&pos, node, guard).ok().unwrap();
    }

    fn destroy(list: List<usize, usize>) {
        // safety: the test is done with the list and holds the only handle
        let guard = unsafe { epoch::unprotected() };
        let mut curr = list.head.load(Ordering::SeqCst, guard);
        while !curr.is_null() {
            // safety: we own every remaining node
            let node = unsafe { curr.into_owned() };
            if let Some((_, value)) = node.as_mapping() {
                let v = value.load(Ordering::SeqCst, guard);
                if !v.is_null() {
                    drop(unsafe { v.into_owned() });
                }
            }
            curr = node.next.load(Ordering::SeqCst, guard).with_tag(0);
        }
    }

    #[test]
    fn search_brackets_by_sort_key() {
        let list = new_list();
        for key in [4usize, 1, 3] {
            insert_mapping(&list, key, key * 10);
        }
        let guard = &epoch::pin();
        assert!(list.verify(guard).is_ok());

        // probing for 2 lands on 1's node: by reversed-bit order the list
        // reads 4, 1, 3, and 1 is the first sort key at least as large
        let start = unsafe { &list.head.load(Ordering::SeqCst, guard).deref().next };
        let pos = list.search(start, entry_key(2), guard);
        let node = unsafe { pos.curr.deref() };
        assert_eq!(node.hash, 1);

        // probing past the largest key yields a null bracket
        let pos = list.search(start, u32::MAX, guard);
        assert!(pos.curr.is_null());

        destroy(list);
    }

    #[test]
    fn remove_unlinks_exact_node() {
        let list = new_list();
        for key in [1usize, 2, 3] {
            insert_mapping(&list, key, key);
        }
        let guard = &epoch::pin();
        let start = unsafe { &list.head.load(Ordering::SeqCst, guard).deref().next };

        let pos = list.search(start, entry_key(2), guard);
        let node = unsafe { pos.curr.deref() };
        let next = node.next.load(Ordering::SeqCst, guard);
        // take the value out, as the map layer (the marker) would
        let value = node.as_mapping().unwrap().1;
        let v = value.swap(Shared::null(), Ordering::SeqCst, guard);
        assert!(list.remove(&pos, next, guard));
        drop(unsafe { v.into_owned() });

        // deleting the same node again fails: it is already marked
        assert!(!list.remove(&pos, next, guard));

        // 2 is gone; its successor in reversed-bit order (1) takes its place
        let pos = list.search(start, entry_key(2), guard);
        assert_eq!(unsafe { pos.curr.deref() }.hash, 1);
        assert!(list.verify(guard).is_ok());

        destroy(list);
    }

    #[test]
    fn search_skips_and_unlinks_marked_nodes() {
        let list = new_list();
        for key in [1usize, 2] {
            insert_mapping(&list, key, key);
        }
        let guard = &epoch::pin();
        let start = unsafe { &list.head.load(Ordering::SeqCst, guard).deref().next };

        // mark 2 logically deleted without unlinking it
        let pos = list.search(start, entry_key(2), guard);
        let node = unsafe { pos.curr.deref() };
        assert_eq!(node.hash, 2);
        let next = node.next.load(Ordering::SeqCst, guard);
        let v = node
            .as_mapping()
            .unwrap()
            .1
            .swap(Shared::null(), Ordering::SeqCst, guard);
        assert!(node
            .next
            .compare_exchange(
                next,
                next.with_tag(1),
                Ordering::SeqCst,
                Ordering::SeqCst,
                guard,
            )
            .is_ok());
        drop(unsafe { v.into_owned() });

        // a search right past it observes only live nodes
        let pos = list.search(start, entry_key(2), guard);
        assert_eq!(unsafe { pos.curr.deref() }.hash, 1);
        assert!(list.verify(guard).is_ok());

        destroy(list);
    }

    #[test]
    fn insert_detects_contention() {
        let list = new_list();
        insert_mapping(&list, 2, 2);
        let guard = &epoch::pin();
        let start = unsafe { &list.head.load(Ordering::SeqCst, guard).deref().next };

        // a stale position: bracket computed before a competing insert
        let stale = list.search(start, entry_key(1), guard);
        insert_mapping(&list, 1, 1);

        let node = Owned::new(Node::mapping(1, 1, Atomic::null()));
        let node = list.insert(&stale, node, guard).err().unwrap();
        drop(node);

        destroy(list);
    }
}
