use crate::iter::*;
use crate::list::{List, Position};
use crate::node::{self, Node};
use crate::raw::{self, Directory, Segment, MAX_EXPONENT};
use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use std::borrow::Borrow;
use std::error::Error;
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{BuildHasher, Hash, Hasher};
use std::iter::FromIterator;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// The fraction of the active bucket count that the entry count may reach
/// before the table grows. The table doubles, so the effective load stays
/// between half this value and this value.
const DEFAULT_LOAD_FACTOR: f64 = 0.5;

/// A lock-free concurrent hash map built on a split-ordered list.
///
/// All entries live in a single sorted lock-free linked list; buckets are
/// lazily created sentinel nodes inside that list, addressed through a
/// two-level directory of atomic pointers. Growing the table publishes a new
/// directory generation and bumps an exponent; no entry is ever rehashed or
/// moved.
///
/// The map uses [`Guard`]s to control the lifetime of the resources that get
/// stored in and extracted from it. Guards are acquired through
/// [`epoch::pin`], [`HashMap::guard`], or [`HashMap::pin`]. For more
/// information, see the [notes in the crate-level documentation].
///
/// [notes in the crate-level documentation]: index.html#a-note-on-guard-and-memory-use
pub struct HashMap<K, V, S = crate::DefaultHashBuilder> {
    /// The split-ordered list holding every sentinel and entry.
    list: List<K, V>,

    /// Two-level directory of sentinel shortcuts into the list.
    directory: Directory<K, V>,

    /// log2 of the active bucket count. Monotonically non-decreasing, and
    /// only advances after the top-level directory slot for the new
    /// generation has been published.
    exponent: AtomicU32,

    /// Number of live entries.
    count: AtomicUsize,

    /// Growth threshold as a fraction of the active bucket count.
    load_factor: f64,

    /// Collector that all `Guard` references used for operations on this map
    /// must be tied to. It is important that they all associate with the
    /// _same_ collector, since the lifetime of anything extracted from the
    /// map is tied to an epoch of that collector. We check every external
    /// guard that is passed in against the collector the map was created
    /// with.
    collector: epoch::Collector,

    build_hasher: S,
}

/// Where a key-probe landed in the list.
enum FindResult<'g, K, V> {
    /// A live entry with the probe's hash and an equal key; `next` is the
    /// successor that was observed unmarked.
    Found {
        pos: Position<'g, K, V>,
        next: Shared<'g, Node<K, V>>,
    },
    /// No such entry; `pos` brackets the gap where one would be spliced.
    Absent { pos: Position<'g, K, V> },
}

/// The error type for the [`HashMap::verify`] structural check.
///
/// Describes the first violation found. This is a testing aid, not a
/// recovery mechanism: a verified map has a sorted list whose sentinels all
/// match the directory slots addressing them.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VerifyError {
    /// Two consecutive list nodes whose sort keys decrease.
    OutOfOrder {
        /// Sort key of the earlier node.
        prev: u32,
        /// Sort key of the node that follows it.
        next: u32,
    },
    /// A node whose sort-key parity contradicts its flavor (sentinels carry
    /// an even sort key, entries an odd one).
    ParityViolation {
        /// The offending sort key.
        sort_key: u32,
    },
    /// A sentinel present in the list whose bucket slot is still empty.
    SentinelUnpublished {
        /// The bucket the sentinel anchors.
        bucket: u32,
    },
    /// A bucket slot naming a different node than the sentinel found in the
    /// list.
    SentinelMismatch {
        /// The bucket whose slot disagrees with the list.
        bucket: u32,
    },
}

impl Display for VerifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            VerifyError::OutOfOrder { prev, next } => {
                write!(f, "sort key {:#010x} follows {:#010x}", next, prev)
            }
            VerifyError::ParityViolation { sort_key } => {
                write!(f, "node flavor contradicts sort key {:#010x}", sort_key)
            }
            VerifyError::SentinelUnpublished { bucket } => {
                write!(f, "sentinel for bucket {} is not in its slot", bucket)
            }
            VerifyError::SentinelMismatch { bucket } => {
                write!(f, "slot for bucket {} names a different node", bucket)
            }
        }
    }
}

impl Error for VerifyError {}

impl<K, V> HashMap<K, V, crate::DefaultHashBuilder> {
    /// Creates an empty map: exponent 0, a single bucket, and the default
    /// load factor of 0.5.
    ///
    /// # Examples
    ///
    /// ```
    /// use splinter::HashMap;
    /// let map: HashMap<&str, i32> = HashMap::new();
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty map that grows once the entry count exceeds
    /// `load_factor` times the bucket count.
    ///
    /// # Panics
    ///
    /// Panics if `load_factor` is not strictly positive.
    pub fn with_load_factor(load_factor: f64) -> Self {
        assert!(load_factor > 0.0, "load factor must be strictly positive");
        let mut map = Self::default();
        map.load_factor = load_factor;
        map
    }
}

impl<K, V, S> Default for HashMap<K, V, S>
where
    S: Default,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> HashMap<K, V, S> {
    /// Creates an empty map which will use `hash_builder` to hash keys.
    ///
    /// Warning: `hash_builder` is normally randomly generated, and is
    /// designed to allow the map to be resistant to attacks that cause many
    /// collisions and very poor performance. Setting it manually using this
    /// function can expose a DoS attack vector.
    ///
    /// # Examples
    ///
    /// ```
    /// use splinter::{DefaultHashBuilder, HashMap};
    ///
    /// let map = HashMap::with_hasher(DefaultHashBuilder::default());
    /// map.pin().insert(1, 2);
    /// ```
    pub fn with_hasher(hash_builder: S) -> Self {
        // the bucket-0 sentinel is created up front; it is the permanent
        // head of the list and the root of the bucket tree
        let head = Atomic::new(Node::sentinel(0));
        let directory = Directory::new(&head);
        Self {
            list: List { head },
            directory,
            exponent: AtomicU32::new(0),
            count: AtomicUsize::new(0),
            load_factor: DEFAULT_LOAD_FACTOR,
            collector: epoch::default_collector().clone(),
            build_hasher: hash_builder,
        }
    }

    /// Pin a `Guard` for use with this map.
    ///
    /// Keep in mind that for as long as you hold onto this `Guard`, you are
    /// preventing the collection of garbage generated by the map.
    pub fn guard(&self) -> epoch::Guard {
        self.collector.register().pin()
    }

    #[inline]
    fn check_guard(&self, guard: &Guard) {
        // guard.collector() may be `None` if it is unprotected
        if let Some(c) = guard.collector() {
            assert_eq!(c, &self.collector);
        }
    }

    /// Returns the number of entries in the map.
    ///
    /// # Examples
    ///
    /// ```
    /// use splinter::HashMap;
    ///
    /// let map = HashMap::new();
    ///
    /// map.pin().insert(1, "a");
    /// map.pin().insert(2, "b");
    /// assert!(map.pin().len() == 2);
    /// ```
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Returns `true` if the map is empty. Otherwise returns `false`.
    ///
    /// # Examples
    ///
    /// ```
    /// use splinter::HashMap;
    ///
    /// let map = HashMap::new();
    /// assert!(map.pin().is_empty());
    /// map.pin().insert("a", 1);
    /// assert!(!map.pin().is_empty());
    /// ```
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// An iterator visiting all key-value pairs in sort-key order.
    ///
    /// The iterator element type is `(&'g K, &'g V)`.
    ///
    /// The iterator is a walk over the live list, not a snapshot: entries
    /// inserted or removed while it runs may or may not be observed.
    pub fn iter<'g>(&'g self, guard: &'g Guard) -> Iter<'g, K, V> {
        self.check_guard(guard);
        Iter {
            node_iter: NodeIter::new(&self.list, guard),
            guard,
        }
    }

    /// An iterator visiting all keys in sort-key order.
    ///
    /// The iterator element type is `&'g K`.
    pub fn keys<'g>(&'g self, guard: &'g Guard) -> Keys<'g, K, V> {
        self.check_guard(guard);
        Keys {
            node_iter: NodeIter::new(&self.list, guard),
        }
    }

    /// An iterator visiting all values in sort-key order.
    ///
    /// The iterator element type is `&'g V`.
    pub fn values<'g>(&'g self, guard: &'g Guard) -> Values<'g, K, V> {
        self.check_guard(guard);
        Values {
            node_iter: NodeIter::new(&self.list, guard),
            guard,
        }
    }

    /// Checks the structural invariants of the map: the list is sorted and
    /// well-formed, and every sentinel in it is exactly the node that the
    /// directory slot for its bucket names.
    ///
    /// Returns the first violation found. Intended for tests and debugging;
    /// the check is not atomic with respect to concurrent operations.
    pub fn verify(&self, guard: &Guard) -> Result<(), VerifyError> {
        self.check_guard(guard);
        self.list.verify(guard)?;

        let mut curr = self.list.head.load(Ordering::SeqCst, guard);
        // safety: nodes read under the guard stay valid until it is dropped
        while let Some(node) = unsafe { curr.as_ref() } {
            if node.is_sentinel() {
                // a sentinel's hash field is its bucket index
                let slot = self
                    .directory
                    .bucket(node.hash, guard)
                    .map(|slot| slot.load(Ordering::Acquire, guard));
                match slot {
                    Some(slot) if slot == curr => {}
                    Some(slot) if slot.is_null() => {
                        return Err(VerifyError::SentinelUnpublished { bucket: node.hash })
                    }
                    _ => return Err(VerifyError::SentinelMismatch { bucket: node.hash }),
                }
            }
            curr = node.next.load(Ordering::SeqCst, guard).with_tag(0);
        }
        Ok(())
    }
}

// ===
// the following methods require thread-safety bounds since they may insert
// keys and values, or hand out references whose destruction is deferred
// until an arbitrary later epoch.
// ===

impl<K, V, S> HashMap<K, V, S>
where
    K: 'static + Sync + Send + Hash + Eq,
    V: 'static + Sync + Send,
    S: BuildHasher,
{
    fn hash<Q: ?Sized + Hash>(&self, key: &Q) -> u32 {
        let mut h = self.build_hasher.build_hasher();
        key.hash(&mut h);
        // the split-ordering math operates on 32-bit hashes
        h.finish() as u32
    }

    /// Resolves the bucket for `hash` to its sentinel, materializing the
    /// sentinel if this is the first access to the bucket.
    fn bucket_for<'g>(&'g self, hash: u32, guard: &'g Guard) -> Shared<'g, Node<K, V>> {
        loop {
            let exponent = self.exponent.load(Ordering::Acquire);
            let index = hash & ((1u32 << exponent) - 1);
            if let Some(sentinel) = self.bucket_at(index, guard) {
                return sentinel;
            }
            // the generation for `index` is not published yet; re-read the
            // exponent and remap
        }
    }

    fn bucket_at<'g>(&'g self, index: u32, guard: &'g Guard) -> Option<Shared<'g, Node<K, V>>> {
        let slot = self.directory.bucket(index, guard)?;
        let sentinel = slot.load(Ordering::Acquire, guard);
        if !sentinel.is_null() {
            return Some(sentinel);
        }
        debug_assert_ne!(index, 0, "bucket 0 is published at construction");
        self.materialize(index, slot, guard)
    }

    /// Creates the sentinel for bucket `index`, links it into the list right
    /// of its parent bucket's sentinel, and publishes it in `slot`.
    ///
    /// Racing materializers converge on a single node: whoever links a
    /// sentinel first wins, and everyone else abandons their allocation and
    /// adopts the winner, found either through the list search or through
    /// the slot itself.
    fn materialize<'g>(
        &'g self,
        index: u32,
        slot: &'g Atomic<Node<K, V>>,
        guard: &'g Guard,
    ) -> Option<Shared<'g, Node<K, V>>> {
        // the parent (highest set bit cleared) is always materialized first;
        // the recursion is bounded by the exponent cap
        let parent = self.bucket_at(raw::parent(index), guard)?;
        // safety: sentinels are never unlinked
        let start = &unsafe { parent.deref() }.next;

        let probe = node::sentinel_key(index);
        let mut sentinel = Owned::new(Node::sentinel(index));
        let winner = loop {
            let pos = self.list.search(start, probe, guard);
            // safety: as in `search`
            if let Some(found) = unsafe { pos.curr.as_ref() } {
                if found.sort_key == probe {
                    // another thread already linked this bucket's sentinel
                    break pos.curr;
                }
            }
            match self.list.insert(&pos, sentinel, guard) {
                Ok(linked) => break linked,
                // something landed in our gap; look again
                Err(ours) => sentinel = ours,
            }
        };

        // publish the shortcut. a bucket's sentinel is unique in the list,
        // so losing this race means the winner published the same node
        match slot.compare_exchange(
            Shared::null(),
            winner,
            Ordering::Release,
            Ordering::Acquire,
            guard,
        ) {
            Ok(sentinel) => Some(sentinel),
            Err(published) => Some(published.current),
        }
    }

    /// Walks the bucket for a node matching `hash` and `key`.
    ///
    /// The walk covers the *entire* run of tied sort keys: bit reversal
    /// folds the top hash bit into the entry flag, so two distinct hashes
    /// can share a sort key, and the run must be disambiguated per node by
    /// `hash` and key equality.
    fn find<'g, Q>(&'g self, hash: u32, key: &Q, guard: &'g Guard) -> FindResult<'g, K, V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let probe = node::entry_key(hash);
        'retry: loop {
            let sentinel = self.bucket_for(hash, guard);
            // safety: sentinels are never unlinked
            let start = &unsafe { sentinel.deref() }.next;
            let mut pos = self.list.search(start, probe, guard);
            loop {
                // safety: nodes read under the guard stay valid until it
                // is dropped
                let node = match unsafe { pos.curr.as_ref() } {
                    Some(node) if node.sort_key == probe => node,
                    _ => return FindResult::Absent { pos },
                };
                let next = node.next.load(Ordering::SeqCst, guard);
                if next.tag() != 0 {
                    // deleted while we were walking the tied run
                    continue 'retry;
                }
                // the probe key is odd, so every tied node is a real entry
                let (k, _) = node.as_mapping().unwrap();
                if node.hash == hash && k.borrow() == key {
                    return FindResult::Found { pos, next };
                }
                pos = Position {
                    prev: &node.next,
                    curr: next,
                };
            }
        }
    }

    /// Returns a reference to the value corresponding to `key`.
    ///
    /// Returns `None` if this map contains no mapping for the key.
    ///
    /// The key may be any borrowed form of the map's key type, but `Hash`
    /// and `Eq` on the borrowed form must match those for the key type.
    ///
    /// # Examples
    ///
    /// ```
    /// use splinter::HashMap;
    ///
    /// let map = HashMap::new();
    /// let guard = map.guard();
    /// map.insert(1, "a", &guard);
    /// assert_eq!(map.get(&1, &guard), Some(&"a"));
    /// assert_eq!(map.get(&2, &guard), None);
    /// ```
    pub fn get<'g, Q>(&'g self, key: &Q, guard: &'g Guard) -> Option<&'g V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.check_guard(guard);
        let hash = self.hash(key);
        match self.find(hash, key, guard) {
            FindResult::Found { pos, .. } => {
                // safety: found nodes were read under the guard
                let (_, cell) = unsafe { pos.curr.deref() }.as_mapping().unwrap();
                let value = cell.load(Ordering::SeqCst, guard);
                if value.is_null() {
                    // the entry was deleted between the walk and this load
                    return None;
                }
                // safety: a deleter retires the value only after emptying
                // the cell, and we loaded it from the cell while pinned, so
                // it cannot be freed before our guard is dropped
                Some(unsafe { value.deref() })
            }
            FindResult::Absent { .. } => None,
        }
    }

    /// Tests if `key` is a key in this map.
    ///
    /// The key may be any borrowed form of the map's key type, but `Hash`
    /// and `Eq` on the borrowed form must match those for the key type.
    pub fn contains_key<Q>(&self, key: &Q, guard: &Guard) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.get(key, guard).is_some()
    }

    /// Maps `key` to `value` in this map.
    ///
    /// If the map already had this key present, the value is swapped in
    /// place and the old value is returned. The key is not updated. If the
    /// key was absent, a new entry is spliced into the list and `None` is
    /// returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use splinter::HashMap;
    ///
    /// let map = HashMap::new();
    /// let guard = map.guard();
    /// assert_eq!(map.insert(37, "a", &guard), None);
    /// assert_eq!(map.insert(37, "b", &guard), Some(&"a"));
    /// assert_eq!(map.get(&37, &guard), Some(&"b"));
    /// ```
    pub fn insert<'g>(&'g self, key: K, value: V, guard: &'g Guard) -> Option<&'g V> {
        self.check_guard(guard);
        let hash = self.hash(&key);
        let value = Owned::new(value).into_shared(guard);
        let mut node = Owned::new(Node::mapping(hash, key, Atomic::from(value)));
        'retry: loop {
            let found = {
                let (key, _) = node.as_mapping().unwrap();
                self.find(hash, key, guard)
            };
            match found {
                FindResult::Found { pos, .. } => {
                    // safety: as in `get`
                    let (_, cell) = unsafe { pos.curr.deref() }.as_mapping().unwrap();
                    let mut current = cell.load(Ordering::SeqCst, guard);
                    let previous = loop {
                        if current.is_null() {
                            // a deleter emptied the cell: the entry is
                            // logically gone, so insert a fresh one
                            continue 'retry;
                        }
                        match cell.compare_exchange(
                            current,
                            value,
                            Ordering::SeqCst,
                            Ordering::SeqCst,
                            guard,
                        ) {
                            Ok(_) => break current,
                            Err(e) => current = e.current,
                        }
                    };
                    // our spare node was never linked; dropping it frees the
                    // key copy but not the value, which now lives in the map
                    drop(node);
                    // safety: the previous value is out of the cell, so no
                    // new reader can acquire it; current holders are pinned
                    // to this epoch or earlier
                    unsafe { guard.defer_destroy(previous) };
                    // safety: `previous` stays valid until our guard drops
                    return Some(unsafe { previous.deref() });
                }
                FindResult::Absent { pos } => match self.list.insert(&pos, node, guard) {
                    Ok(_) => {
                        self.add_count(1, guard);
                        return None;
                    }
                    // the gap changed under us; take the node back and retry
                    Err(ours) => node = ours,
                },
            }
        }
    }

    /// Removes the key-value pair for `key` from the map, returning the
    /// value that was mapped at the moment of removal.
    ///
    /// Returns `None` if the key was not in the map.
    ///
    /// The key may be any borrowed form of the map's key type, but `Hash`
    /// and `Eq` on the borrowed form must match those for the key type.
    ///
    /// # Examples
    ///
    /// ```
    /// use splinter::HashMap;
    ///
    /// let map = HashMap::new();
    /// let guard = map.guard();
    /// map.insert(1, "a", &guard);
    /// assert_eq!(map.remove(&1, &guard), Some(&"a"));
    /// assert_eq!(map.remove(&1, &guard), None);
    /// ```
    pub fn remove<'g, Q>(&'g self, key: &Q, guard: &'g Guard) -> Option<&'g V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.check_guard(guard);
        let hash = self.hash(key);
        loop {
            match self.find(hash, key, guard) {
                FindResult::Absent { .. } => return None,
                FindResult::Found { pos, next } => {
                    // safety: as in `get`
                    let (_, cell) = unsafe { pos.curr.deref() }.as_mapping().unwrap();
                    if !self.list.remove(&pos, next, guard) {
                        // the gap changed or another deleter won; look again
                        continue;
                    }
                    // we won the logical deletion, so the cell is ours to
                    // empty. an overwrite that lands before this swap is
                    // what we return; one that lands after fails its CAS on
                    // the empty cell and reinserts the key
                    let value = cell.swap(Shared::null(), Ordering::SeqCst, guard);
                    debug_assert!(!value.is_null());
                    self.add_count(-1, guard);
                    // safety: the cell is empty, so no new reader can reach
                    // the value; current holders are pinned to this epoch
                    unsafe { guard.defer_destroy(value) };
                    // safety: `value` stays valid until our guard drops
                    return Some(unsafe { value.deref() });
                }
            }
        }
    }

    /// Collects the live entries into a `std::collections::HashMap`.
    ///
    /// Best-effort: concurrent operations may or may not be reflected. For
    /// debugging and tests.
    pub fn to_hash_map(&self, guard: &Guard) -> std::collections::HashMap<K, V>
    where
        K: Clone,
        V: Clone,
    {
        self.iter(guard)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn add_count(&self, n: isize, guard: &Guard) {
        let count = if n >= 0 {
            self.count.fetch_add(n as usize, Ordering::SeqCst) + n as usize
        } else {
            self.count.fetch_sub(-n as usize, Ordering::SeqCst) - (-n as usize)
        };
        // grow once the load factor is exceeded. a lagging exponent is never
        // wrong: a coarser bucket is still a valid left-anchor for all the
        // finer buckets it will split into
        let exponent = self.exponent.load(Ordering::Acquire);
        if count as f64 > self.load_factor * (1u64 << exponent) as f64 {
            self.grow(guard);
        }
    }

    /// Publishes the next directory generation and advances the exponent.
    ///
    /// Never rehashes: the newly addressable buckets stay empty in their
    /// slots and are materialized lazily by later operations.
    fn grow(&self, guard: &Guard) {
        let exponent = self.exponent.load(Ordering::Acquire);
        if exponent >= MAX_EXPONENT {
            return;
        }
        let next = exponent + 1;
        // generation `next` holds 2^exponent buckets
        let segment = Segment::new(1usize << exponent);
        if self.directory.publish(next as usize, segment, guard) {
            // the release pairs with the acquire on every exponent load: a
            // thread that observes the bumped exponent also observes the
            // slot published above. if this CAS fails, a later grow already
            // advanced past us
            let _ = self.exponent.compare_exchange(
                exponent,
                next,
                Ordering::Release,
                Ordering::Relaxed,
            );
        }
        // if the publish lost, the winning thread owns the exponent bump
    }
}

impl<K, V, S> Clone for HashMap<K, V, S>
where
    K: 'static + Sync + Send + Clone + Hash + Eq,
    V: 'static + Sync + Send + Clone,
    S: BuildHasher + Clone,
{
    fn clone(&self) -> Self {
        let mut cloned = Self::with_hasher(self.build_hasher.clone());
        cloned.load_factor = self.load_factor;
        {
            let guard = self.guard();
            let cloned_guard = cloned.guard();
            for (k, v) in self.iter(&guard) {
                cloned.insert(k.clone(), v.clone(), &cloned_guard);
            }
        }
        cloned
    }
}

impl<K, V, S> Debug for HashMap<K, V, S>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let guard = self.guard();
        f.debug_map().entries(self.iter(&guard)).finish()
    }
}

impl<K, V, S> PartialEq for HashMap<K, V, S>
where
    K: 'static + Sync + Send + Hash + Eq,
    V: 'static + Sync + Send + PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let our_guard = self.guard();
        let their_guard = other.guard();
        self.iter(&our_guard)
            .all(|(key, value)| other.get(key, &their_guard).map_or(false, |v| *value == *v))
    }
}

impl<K, V, S> Eq for HashMap<K, V, S>
where
    K: 'static + Sync + Send + Hash + Eq,
    V: 'static + Sync + Send + Eq,
    S: BuildHasher,
{
}

impl<K, V, S> Extend<(K, V)> for &HashMap<K, V, S>
where
    K: 'static + Sync + Send + Hash + Eq,
    V: 'static + Sync + Send,
    S: BuildHasher,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        let guard = self.guard();
        for (key, value) in iter {
            self.insert(key, value, &guard);
        }
    }
}

impl<K, V, S> FromIterator<(K, V)> for HashMap<K, V, S>
where
    K: 'static + Sync + Send + Hash + Eq,
    V: 'static + Sync + Send,
    S: BuildHasher + Default,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let map = Self::default();
        (&map).extend(iter);
        map
    }
}

impl<K, V, S> Drop for HashMap<K, V, S> {
    fn drop(&mut self) {
        // safety: we have &mut self, so every guard handed out for this map
        // has been dropped and no references into it remain. nodes that
        // were unlinked earlier sit in the collector's queue and are freed
        // by it; everything still linked, including marked nodes whose
        // unlink never finished, is owned by us here.
        let guard = unsafe { epoch::unprotected() };
        let mut curr = self.list.head.load(Ordering::Relaxed, guard);
        while !curr.is_null() {
            // safety: see above
            let node = unsafe { curr.into_owned() };
            if let Some((_, cell)) = node.as_mapping() {
                let value = cell.load(Ordering::Relaxed, guard);
                if !value.is_null() {
                    // safety: values are freed exactly once, by whoever
                    // takes them out of their cell; here that is the map itself
                    drop(unsafe { value.into_owned() });
                }
            }
            curr = node.next.load(Ordering::Relaxed, guard).with_tag(0);
        }
        // the directory frees its segments on its own drop; its bucket
        // slots were only shortcuts into the list freed above
    }
}
