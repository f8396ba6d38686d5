//! Importance-sorted view over the queue store.
//!
//! The drop engine scans messages from most to least disposable. Rather than
//! re-sorting on every pass, the queue caches this view while flow-controlled
//! and patches it in place: evicted entries become tombstones, insertions
//! reuse an adjacent tombstone or widen the array, and the whole thing is
//! compacted once tombstones outnumber live entries two to one. The view is
//! dropped when flow control ends.

use std::cmp::Ordering;

use crate::store::{NodeKey, Store};

#[derive(Debug)]
pub(crate) struct SortIndex {
    // A slot is either a live store key or a tombstone.
    slots: Vec<Option<NodeKey>>,
}

impl SortIndex {
    /// Build from every live message, most disposable first. The sort is
    /// stable over transmit order, so equally-ranked messages keep their
    /// enqueue order and draining stays deterministic after drops.
    pub fn build(store: &Store) -> Self {
        let mut keys: Vec<NodeKey> = Vec::with_capacity(store.len());
        keys.extend(store.iter_keys());
        keys.sort_by(|a, b| store.get(*a).cmp_disposable(store.get(*b)));
        Self {
            slots: keys.into_iter().map(Some).collect(),
        }
    }

    /// Total slots, tombstones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, offset: usize) -> Option<NodeKey> {
        self.slots[offset]
    }

    /// Mark the slot at `offset` dead without shifting anything.
    pub fn tombstone(&mut self, offset: usize) {
        self.slots[offset] = None;
    }

    /// Insert `key` before the slot at `offset`, which must rank at least as
    /// high as `key`. Reuses the tombstone just below `offset` when there is
    /// one; otherwise widens the array and shifts the rest right.
    pub fn insert_before(&mut self, offset: usize, key: NodeKey, store: &Store) {
        debug_assert!(offset < self.slots.len());
        debug_assert!(self.slots[offset].map_or(true, |at| {
            store.get(at).cmp_disposable(store.get(key)) != Ordering::Less
        }));

        if offset > 0 && self.slots[offset - 1].is_none() {
            self.slots[offset - 1] = Some(key);
            return;
        }
        self.slots.insert(offset, Some(key));
    }

    /// Insert `key` at its sorted position, located by binary search. The
    /// array may contain tombstones, so a midpoint probe that lands on one
    /// scans outward for the nearest live neighbors and narrows the range
    /// from whichever of them brackets `key`.
    pub fn insert(&mut self, key: NodeKey, store: &Store) {
        let n = self.slots.len();
        if n == 0 {
            self.slots.push(Some(key));
            return;
        }

        let rank = |a: NodeKey, b: NodeKey| store.get(a).cmp_disposable(store.get(b));

        // Cheaper than the slot at the front: insert there.
        if let Some(first) = self.slots[0] {
            if rank(key, first) != Ordering::Greater {
                self.insert_before(0, key, store);
                return;
            }
        }
        // Dearer than the slot at the back: append.
        if let Some(last) = self.slots[n - 1] {
            if rank(key, last) != Ordering::Less {
                self.slots.push(Some(key));
                return;
            }
        }

        let mut low: isize = 0;
        let mut high: isize = n as isize - 1;

        while low <= high {
            let mid = low + (high - low) / 2;

            let Some(probe) = self.slots[mid as usize] else {
                // Landed on a tombstone: find the nearest live slots inside
                // [low, high] on each side.
                let mut below: isize = -1;
                let mut i = mid - 1;
                while i >= low {
                    if self.slots[i as usize].is_some() {
                        below = i;
                        break;
                    }
                    i -= 1;
                }
                let mut above: isize = -1;
                let mut i = mid + 1;
                while i <= high {
                    if self.slots[i as usize].is_some() {
                        above = i;
                        break;
                    }
                    i += 1;
                }

                if below < 0 && above < 0 {
                    // Nothing live in range; the midpoint slot will do.
                    self.slots[mid as usize] = Some(key);
                    return;
                }
                if below < 0 {
                    low = mid + 1;
                    continue;
                }
                if above < 0 {
                    high = mid - 1;
                    continue;
                }
                if below <= low + 1 && above >= high - 1 {
                    // Only tombstones strictly between the live neighbors.
                    self.slots[mid as usize] = Some(key);
                    return;
                }
                let below_key = self.slots[below as usize].expect("scanned live slot");
                let above_key = self.slots[above as usize].expect("scanned live slot");
                if rank(key, below_key) == Ordering::Less {
                    high = below - 1;
                    continue;
                }
                if rank(key, above_key) == Ordering::Greater {
                    low = above + 1;
                    continue;
                }
                // The live neighbors bracket `key`.
                low = below + 1;
                high = above - 1;
                continue;
            };

            match rank(probe, key) {
                Ordering::Equal => {
                    self.insert_before(mid as usize, key, store);
                    return;
                }
                Ordering::Less => low = mid + 1,
                Ordering::Greater => high = mid - 1,
            }
        }

        let low = low as usize;
        if low >= self.slots.len() {
            self.slots.push(Some(key));
        } else if self.slots[low].is_none() {
            self.slots[low] = Some(key);
        } else {
            self.insert_before(low, key, store);
        }
    }

    /// Drop `key` from the view. `live_count` is the store's message count
    /// after the removal; once the array is more than three times that,
    /// tombstones are swept out in one pass instead of adding another.
    pub fn remove(&mut self, key: NodeKey, live_count: usize) {
        if self.slots.len() > live_count * 3 {
            self.slots.retain(|slot| match slot {
                Some(k) => *k != key,
                None => false,
            });
            return;
        }
        match self.slots.iter().position(|slot| *slot == Some(key)) {
            Some(offset) => self.slots[offset] = None,
            None => {
                debug_assert!(false, "message missing from sort index");
                log::error!("sort index out of sync: removed message not indexed");
            }
        }
    }

    #[cfg(test)]
    fn live_keys(&self) -> Vec<NodeKey> {
        self.slots.iter().filter_map(|s| *s).collect()
    }

    /// Every live, fully-unsent message is indexed exactly once and live
    /// slots are in non-decreasing disposability order.
    #[cfg(test)]
    pub fn is_coherent(&self, store: &Store) -> bool {
        let live = self.live_keys();
        let sorted = live.windows(2).all(|w| {
            store.get(w[0]).cmp_disposable(store.get(w[1])) != Ordering::Greater
        });
        let covered = store
            .iter_keys()
            .filter(|k| store.get(*k).is_unread())
            .all(|k| live.iter().filter(|x| **x == k).count() == 1);
        sorted && covered
    }
}
