use crate::list::List;
use crate::node::Node;
use crossbeam_epoch::{Guard, Shared};
use std::sync::atomic::Ordering;

/// Walks the live nodes of the split-ordered list, skipping sentinels and
/// logically deleted entries.
#[derive(Debug)]
pub(crate) struct NodeIter<'g, K, V> {
    curr: Shared<'g, Node<K, V>>,
    guard: &'g Guard,
}

impl<'g, K, V> NodeIter<'g, K, V> {
    pub(crate) fn new(list: &'g List<K, V>, guard: &'g Guard) -> Self {
        Self {
            curr: list.head.load(Ordering::SeqCst, guard),
            guard,
        }
    }
}

impl<'g, K, V> Iterator for NodeIter<'g, K, V> {
    type Item = &'g Node<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            // safety: nodes read under the guard stay valid until it drops
            let node = unsafe { self.curr.as_ref() }?;
            let next = node.next.load(Ordering::SeqCst, self.guard);
            self.curr = next.with_tag(0);
            if !node.is_sentinel() && next.tag() == 0 {
                return Some(node);
            }
        }
    }
}

/// An iterator over a map's entries.
///
/// See [`HashMap::iter`](crate::HashMap::iter) for details.
#[derive(Debug)]
pub struct Iter<'g, K, V> {
    pub(crate) node_iter: NodeIter<'g, K, V>,
    pub(crate) guard: &'g Guard,
}

impl<'g, K, V> Iterator for Iter<'g, K, V> {
    type Item = (&'g K, &'g V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let node = self.node_iter.next()?;
            let (key, cell) = node.as_mapping().unwrap();
            let value = cell.load(Ordering::SeqCst, self.guard);
            // an empty cell means a deleter got here first
            if !value.is_null() {
                // safety: the value was reachable under our guard; see
                // `HashMap::get`
                return Some((key, unsafe { value.deref() }));
            }
        }
    }
}

/// An iterator over a map's keys.
///
/// See [`HashMap::keys`](crate::HashMap::keys) for details.
#[derive(Debug)]
pub struct Keys<'g, K, V> {
    pub(crate) node_iter: NodeIter<'g, K, V>,
}

impl<'g, K, V> Iterator for Keys<'g, K, V> {
    type Item = &'g K;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.node_iter.next()?;
        Some(node.as_mapping().unwrap().0)
    }
}

/// An iterator over a map's values.
///
/// See [`HashMap::values`](crate::HashMap::values) for details.
#[derive(Debug)]
pub struct Values<'g, K, V> {
    pub(crate) node_iter: NodeIter<'g, K, V>,
    pub(crate) guard: &'g Guard,
}

impl<'g, K, V> Iterator for Values<'g, K, V> {
    type Item = &'g V;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let node = self.node_iter.next()?;
            let value = node.as_mapping().unwrap().1.load(Ordering::SeqCst, self.guard);
            if !value.is_null() {
                // safety: as in `Iter`
                return Some(unsafe { value.deref() });
            }
        }
    }
}
