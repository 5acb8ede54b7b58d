//! A lock-free concurrent hash map backed by a split-ordered list.
//!
//! The map supports any number of concurrent readers and writers with no
//! locks, no spinning, and no blocking: every operation either completes or
//! retries because some other thread made progress. It is an implementation
//! of the *split-ordered list* of Shalev and Shavit ("Split-ordered lists:
//! Lock-free extensible hash tables", JACM 2006).
//!
//! # How it works
//!
//! All entries live in one sorted lock-free linked list. An entry's sort key
//! is the *bit-reversal* of its 32-bit hash, with the low bit set; a bucket
//! is a permanent *sentinel* node whose sort key is the bit-reversal of the
//! bucket index, with the low bit clear. Bit reversal makes the buckets of
//! each power-of-two generation interleave with the previous one, so growing
//! the table is just publishing a larger bucket directory and bumping an
//! exponent; no entry is ever rehashed or moved, and a thread with a stale
//! exponent merely starts its walk from a coarser (but still correct)
//! sentinel.
//!
//! The directory is a two-level array of atomic pointers resolved entirely
//! with single-word compare-and-swap, and sentinels are materialized lazily
//! the first time their bucket is probed.
//!
//! # A note on `Guard` and memory use
//!
//! This map (like the `crossbeam` ecosystem it builds on) uses epoch-based
//! memory reclamation. Removed entries and overwritten values are not freed
//! immediately, since other threads may still be reading them; instead they
//! are *retired*, and freed once every thread active at the time of removal
//! has moved on. Threads declare activity with a [`Guard`](epoch::Guard):
//! acquire one with [`HashMap::guard`] (or use [`HashMap::pin`] to bundle a
//! guard with the map reference), and every reference you get out of the map
//! stays valid as long as that guard is alive. Holding a guard for a long
//! time delays reclamation of everything retired since it was acquired, so
//! re-pin periodically in long-running threads.
//!
//! # Examples
//!
//! ```
//! use splinter::HashMap;
//!
//! let map = HashMap::new();
//!
//! // pin() ties a guard to the reference for simple call sites
//! map.pin().insert("apple", 3);
//! map.pin().insert("pear", 5);
//! assert_eq!(map.pin().get(&"apple"), Some(&3));
//!
//! // or manage the guard yourself to amortize it across calls
//! let guard = map.guard();
//! assert_eq!(map.insert("apple", 4, &guard), Some(&3));
//! assert_eq!(map.remove(&"pear", &guard), Some(&5));
//! assert_eq!(map.len(), 1);
//! ```
//!
//! Sharing across threads:
//!
//! ```
//! use splinter::HashMap;
//! use std::sync::Arc;
//!
//! let map = Arc::new(HashMap::new());
//!
//! let handles: Vec<_> = (0..4)
//!     .map(|t| {
//!         let map = Arc::clone(&map);
//!         std::thread::spawn(move || {
//!             let guard = map.guard();
//!             for i in 0..64 {
//!                 map.insert((t, i), t * i, &guard);
//!             }
//!         })
//!     })
//!     .collect();
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//!
//! assert_eq!(map.len(), 4 * 64);
//! ```
#![deny(missing_docs, missing_debug_implementations, unreachable_pub)]
#![warn(rust_2018_idioms)]

mod iter;
mod list;
mod map;
mod map_ref;
mod node;
mod raw;

#[cfg(feature = "serde")]
mod serde_impls;

pub use iter::{Iter, Keys, Values};
pub use map::{HashMap, VerifyError};
pub use map_ref::HashMapRef;

/// Re-export of [`crossbeam_epoch`], whose guards control when this map's
/// garbage is reclaimed.
pub use crossbeam_epoch as epoch;

/// The default hash builder: `ahash`, a fast hasher with per-map random
/// state.
pub type DefaultHashBuilder = ahash::RandomState;
