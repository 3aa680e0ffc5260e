//! Generic open-chained hash table with incremental growth.
//!
//! This is the associative container used throughout the daemon to index
//! peers, pieces, and torrents by key. Records are moved into the table and
//! chained through slot indices in an internal arena, so inserting never
//! allocates per record once a slot has been recycled, and a [`Handle`]
//! gives O(1) access to a record independent of its key.
//!
//! The table starts with a single bucket and grows whenever the load factor
//! exceeds 4/5 after an insertion. Growth keeps the bucket count odd
//! (`2n + 1`) to reduce systematic collisions. If the new bucket array
//! cannot be allocated, growth is skipped and the table keeps operating at
//! the higher load factor; `insert` never fails.
//!
//! # Example
//!
//! ```
//! use btcore::table::{Keyed, Table};
//!
//! struct Torrent {
//!     info_hash: [u8; 20],
//!     name: String,
//! }
//!
//! impl Keyed for Torrent {
//!     type Key = [u8; 20];
//!     fn key(&self) -> &[u8; 20] {
//!         &self.info_hash
//!     }
//! }
//!
//! let mut torrents = Table::new();
//! torrents.insert(Torrent {
//!     info_hash: [7; 20],
//!     name: "example".into(),
//! });
//! assert!(torrents.find(&[7; 20]).is_some());
//! ```

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};

/// Gives the table access to the key stored inside a record.
///
/// The key must live inside the record itself; the table never copies it.
pub trait Keyed {
    /// The key type records are addressed by.
    type Key: Hash + Eq;

    /// Returns a reference to this record's key.
    fn key(&self) -> &Self::Key;
}

/// A stable reference to a record stored in a [`Table`].
///
/// Handles are invalidated when their record is removed; a stale handle
/// resolves to `None` (or to an unrelated record if the slot has been
/// reused).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u32);

enum Slot<T> {
    Occupied { item: T, next: Option<u32> },
    Vacant { next_free: Option<u32> },
}

/// A duplicate-free hash table over records that carry their own key.
///
/// The table does not check for duplicate keys on insertion; inserting two
/// records with equal keys leaves both stored, with only the most recently
/// inserted visible to [`find`](Table::find) until it is removed.
pub struct Table<T: Keyed, S: BuildHasher = RandomState> {
    buckets: Vec<Option<u32>>,
    slots: Vec<Slot<T>>,
    free: Option<u32>,
    len: usize,
    hasher: S,
}

impl<T: Keyed> Table<T> {
    /// Creates an empty table with a single bucket.
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }
}

impl<T: Keyed> Default for Table<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Keyed, S: BuildHasher> Table<T, S> {
    /// Creates an empty table using the given hasher.
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            buckets: vec![None],
            slots: Vec::new(),
            free: None,
            len: 0,
            hasher,
        }
    }

    /// Number of records currently stored, O(1).
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Moves `item` into the table and returns a handle to it.
    ///
    /// The record is pushed onto the head of its bucket's chain. Growth is
    /// triggered when the load factor exceeds 4/5; a failed growth
    /// allocation is ignored and the table stays at its current capacity,
    /// so this call never fails.
    pub fn insert(&mut self, item: T) -> Handle {
        let bi = self.bucket_of(item.key());
        let next = self.buckets[bi];
        let idx = self.alloc_slot(item, next);
        self.buckets[bi] = Some(idx);
        self.len += 1;
        if self.len > self.buckets.len() * 4 / 5 {
            self.grow();
        }
        Handle(idx)
    }

    /// Returns the first record whose key equals `key`, if any.
    pub fn find(&self, key: &T::Key) -> Option<&T> {
        let i = self.find_index(key)?;
        Some(self.item(i))
    }

    /// Mutable variant of [`find`](Table::find).
    pub fn find_mut(&mut self, key: &T::Key) -> Option<&mut T> {
        let i = self.find_index(key)?;
        match &mut self.slots[i as usize] {
            Slot::Occupied { item, .. } => Some(item),
            Slot::Vacant { .. } => unreachable!(),
        }
    }

    /// Resolves a handle to its record, O(1).
    pub fn get(&self, handle: Handle) -> Option<&T> {
        match self.slots.get(handle.0 as usize)? {
            Slot::Occupied { item, .. } => Some(item),
            Slot::Vacant { .. } => None,
        }
    }

    /// Mutable variant of [`get`](Table::get).
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        match self.slots.get_mut(handle.0 as usize)? {
            Slot::Occupied { item, .. } => Some(item),
            Slot::Vacant { .. } => None,
        }
    }

    /// Unlinks and returns the first record whose key equals `key`.
    ///
    /// Returns `None` if no record matches. The record's slot is recycled
    /// for later insertions.
    pub fn remove(&mut self, key: &T::Key) -> Option<T> {
        let bi = self.bucket_of(key);
        let mut prev: Option<u32> = None;
        let mut cur = self.buckets[bi];
        while let Some(i) = cur {
            if self.item(i).key() == key {
                break;
            }
            prev = Some(i);
            cur = self.chain_next(i);
        }
        let i = cur?;
        let next = self.chain_next(i);
        match prev {
            None => self.buckets[bi] = next,
            Some(p) => self.set_chain_next(p, next),
        }
        let slot = std::mem::replace(
            &mut self.slots[i as usize],
            Slot::Vacant { next_free: self.free },
        );
        self.free = Some(i);
        self.len -= 1;
        match slot {
            Slot::Occupied { item, .. } => Some(item),
            Slot::Vacant { .. } => unreachable!(),
        }
    }

    /// Collects references to every record in bucket-then-chain order.
    ///
    /// The relative order across buckets is unspecified; within a chain it
    /// is stable between mutations.
    pub fn to_vec(&self) -> Vec<&T> {
        self.iter().collect()
    }

    /// Lazy single-pass iterator over every record.
    ///
    /// The `&self` borrow keeps the table immutable for the iterator's
    /// lifetime, so the chains cannot shift mid-walk.
    pub fn iter(&self) -> Iter<'_, T, S> {
        Iter {
            table: self,
            bucket: 0,
            cur: None,
            yielded: 0,
        }
    }

    fn bucket_of(&self, key: &T::Key) -> usize {
        (self.hasher.hash_one(key) % self.buckets.len() as u64) as usize
    }

    fn item(&self, i: u32) -> &T {
        match &self.slots[i as usize] {
            Slot::Occupied { item, .. } => item,
            Slot::Vacant { .. } => unreachable!("chain points at vacant slot"),
        }
    }

    fn chain_next(&self, i: u32) -> Option<u32> {
        match &self.slots[i as usize] {
            Slot::Occupied { next, .. } => *next,
            Slot::Vacant { .. } => unreachable!("chain points at vacant slot"),
        }
    }

    fn set_chain_next(&mut self, i: u32, next: Option<u32>) {
        match &mut self.slots[i as usize] {
            Slot::Occupied { next: n, .. } => *n = next,
            Slot::Vacant { .. } => unreachable!("chain points at vacant slot"),
        }
    }

    fn find_index(&self, key: &T::Key) -> Option<u32> {
        let mut cur = self.buckets[self.bucket_of(key)];
        while let Some(i) = cur {
            if self.item(i).key() == key {
                return Some(i);
            }
            cur = self.chain_next(i);
        }
        None
    }

    fn alloc_slot(&mut self, item: T, next: Option<u32>) -> u32 {
        match self.free {
            Some(i) => {
                let next_free = match &self.slots[i as usize] {
                    Slot::Vacant { next_free } => *next_free,
                    Slot::Occupied { .. } => unreachable!("free list points at occupied slot"),
                };
                self.free = next_free;
                self.slots[i as usize] = Slot::Occupied { item, next };
                i
            }
            None => {
                self.slots.push(Slot::Occupied { item, next });
                (self.slots.len() - 1) as u32
            }
        }
    }

    /// Rehashes every record into `2n + 1` buckets.
    ///
    /// Each old chain is reversed before relinking so that chain order
    /// after growth matches insertion order the same way it did before.
    /// On allocation failure the table silently stays at its current
    /// bucket count.
    fn grow(&mut self) {
        let ncnt = 2 * self.buckets.len() + 1;
        let mut nbuckets: Vec<Option<u32>> = Vec::new();
        if nbuckets.try_reserve_exact(ncnt).is_err() {
            return;
        }
        nbuckets.resize(ncnt, None);
        let obuckets = std::mem::replace(&mut self.buckets, nbuckets);
        for head in obuckets {
            let mut cur = self.reverse_chain(head);
            while let Some(i) = cur {
                let next = self.chain_next(i);
                let bi = self.bucket_of(self.item(i).key());
                self.set_chain_next(i, self.buckets[bi]);
                self.buckets[bi] = Some(i);
                cur = next;
            }
        }
    }

    fn reverse_chain(&mut self, head: Option<u32>) -> Option<u32> {
        let mut prev = None;
        let mut cur = head;
        while let Some(i) = cur {
            let next = self.chain_next(i);
            self.set_chain_next(i, prev);
            prev = Some(i);
            cur = next;
        }
        prev
    }
}

/// Iterator returned by [`Table::iter`].
pub struct Iter<'a, T: Keyed, S: BuildHasher = RandomState> {
    table: &'a Table<T, S>,
    bucket: usize,
    cur: Option<u32>,
    yielded: usize,
}

impl<'a, T: Keyed, S: BuildHasher> Iterator for Iter<'a, T, S> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.yielded == self.table.len {
            return None;
        }
        let mut cur = match self.cur {
            Some(i) => self.table.chain_next(i),
            None => self.table.buckets[self.bucket],
        };
        let i = loop {
            match cur {
                Some(i) => break i,
                None => {
                    self.bucket += 1;
                    cur = self.table.buckets[self.bucket];
                }
            }
        };
        self.cur = Some(i);
        self.yielded += 1;
        Some(self.table.item(i))
    }
}

#[cfg(test)]
mod tests;
