// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Slot storage for rendered positions with generational handles and dirty
//! tracking.

use std::collections::BTreeMap;

use understory_dirty::{Channel, CycleHandling, DirtyTracker};

use super::id::PositionKey;
use super::RenderedPosition;

/// Storage for all rendered positions of one engine.
///
/// Positions are addressed by [`PositionKey`] handles and looked up by id
/// through a string index. Removed positions free their slot for reuse and
/// bump its generation, so a key held across a timer or message boundary
/// never resolves to a different position.
#[derive(Debug)]
pub struct PositionStore<E> {
    slots: Vec<Option<RenderedPosition<E>>>,
    generation: Vec<u32>,
    free_list: Vec<u32>,
    index: BTreeMap<String, PositionKey>,
    dirty: DirtyTracker<u32>,
}

impl<E> Default for PositionStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> PositionStore<E> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            generation: Vec::new(),
            free_list: Vec::new(),
            index: BTreeMap::new(),
            dirty: DirtyTracker::with_cycle_handling(CycleHandling::Error),
        }
    }

    // -- Allocation API --

    /// Stores a position and returns its handle.
    ///
    /// A position already stored under the same id is removed first and
    /// returned alongside the new key.
    pub fn insert(
        &mut self,
        position: RenderedPosition<E>,
    ) -> (PositionKey, Option<RenderedPosition<E>>) {
        let replaced = self
            .key_of(&position.id)
            .and_then(|key| self.remove(key));

        let id = position.id.clone();
        let idx = if let Some(idx) = self.free_list.pop() {
            self.slots[idx as usize] = Some(position);
            idx
        } else {
            let idx = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
            self.slots.push(Some(position));
            self.generation.push(0);
            idx
        };

        let key = PositionKey::new(idx, self.generation[idx as usize]);
        self.index.insert(id, key);
        (key, replaced)
    }

    /// Removes a position, freeing its slot.
    ///
    /// Returns `None` for a stale key.
    pub fn remove(&mut self, key: PositionKey) -> Option<RenderedPosition<E>> {
        if !self.is_alive(key) {
            return None;
        }
        let idx = key.idx as usize;
        let position = self.slots[idx].take()?;
        self.index.remove(&position.id);
        self.dirty.remove_key(key.idx);
        // Bump generation so old handles immediately fail validation.
        self.generation[idx] += 1;
        self.free_list.push(key.idx);
        Some(position)
    }

    /// Returns whether the handle refers to a live position.
    #[must_use]
    pub fn is_alive(&self, key: PositionKey) -> bool {
        let idx = key.idx as usize;
        idx < self.slots.len() && self.generation[idx] == key.generation && self.slots[idx].is_some()
    }

    // -- Lookup API --

    /// The handle for `id`.
    #[must_use]
    pub fn key_of(&self, id: &str) -> Option<PositionKey> {
        self.index.get(id).copied()
    }

    /// The position behind `key`.
    #[must_use]
    pub fn get(&self, key: PositionKey) -> Option<&RenderedPosition<E>> {
        if !self.is_alive(key) {
            return None;
        }
        self.slots[key.idx as usize].as_ref()
    }

    /// Mutable access to the position behind `key`.
    pub fn get_mut(&mut self, key: PositionKey) -> Option<&mut RenderedPosition<E>> {
        if !self.is_alive(key) {
            return None;
        }
        self.slots[key.idx as usize].as_mut()
    }

    /// The position with id `id`.
    #[must_use]
    pub fn by_id(&self, id: &str) -> Option<&RenderedPosition<E>> {
        self.key_of(id).and_then(|key| self.get(key))
    }

    /// All handles, ordered by position id.
    #[must_use]
    pub fn keys(&self) -> Vec<PositionKey> {
        self.index.values().copied().collect()
    }

    /// All positions, ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = (PositionKey, &RenderedPosition<E>)> {
        self.index
            .values()
            .filter_map(|&key| self.get(key).map(|p| (key, p)))
    }

    /// Number of stored positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    // -- Dirty tracking --

    /// Marks one position stale on `channel`.
    pub fn mark_stale(&mut self, key: PositionKey, channel: Channel) {
        if self.is_alive(key) {
            self.dirty.mark(key.idx, channel);
        }
    }

    /// Marks every position matching `filter` stale on `channel`.
    pub fn mark_stale_where(
        &mut self,
        channel: Channel,
        mut filter: impl FnMut(&RenderedPosition<E>) -> bool,
    ) {
        let mut marked = Vec::new();
        for (key, position) in self.iter() {
            if filter(position) {
                marked.push(key);
            }
        }
        for key in marked {
            self.dirty.mark(key.idx, channel);
        }
    }

    /// Drains `channel` and returns the live positions that were marked, in
    /// slot order.
    pub fn drain_stale(&mut self, channel: Channel) -> Vec<PositionKey> {
        let drained: Vec<u32> = self.dirty.drain(channel).deterministic().run().collect();
        drained
            .into_iter()
            .filter_map(|idx| {
                let key = PositionKey::new(idx, *self.generation.get(idx as usize)?);
                self.is_alive(key).then_some(key)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PositionConfig;
    use crate::dirty;
    use crate::platform::MountedFrame;
    use crate::position::Status;
    use crate::time::HostTime;

    fn rendered(id: &str) -> RenderedPosition<u32> {
        let config = PositionConfig::new(id, "slot", 300.0, 250.0).unwrap();
        RenderedPosition::new(
            config,
            MountedFrame {
                wrapper: 0,
                frame: 1,
                shim: None,
            },
            HostTime(0),
        )
    }

    #[test]
    fn insert_lookup_remove() {
        let mut store = PositionStore::new();
        let (key, replaced) = store.insert(rendered("p1"));
        assert!(replaced.is_none());
        assert_eq!(store.key_of("p1"), Some(key));
        assert_eq!(store.by_id("p1").map(RenderedPosition::id), Some("p1"));
        assert_eq!(store.len(), 1);

        let removed = store.remove(key).unwrap();
        assert_eq!(removed.id(), "p1");
        assert!(store.is_empty());
        assert!(store.get(key).is_none());
        assert!(store.remove(key).is_none(), "second remove is a no-op");
    }

    #[test]
    fn stale_keys_never_resolve_after_reuse() {
        let mut store = PositionStore::new();
        let (old, _) = store.insert(rendered("p1"));
        store.remove(old);
        let (new, _) = store.insert(rendered("p2"));
        assert_eq!(old.index(), new.index(), "slot is reused");
        assert_ne!(old.generation(), new.generation());
        assert!(store.get(old).is_none());
        assert_eq!(store.get(new).map(RenderedPosition::id), Some("p2"));
    }

    #[test]
    fn insert_replaces_same_id() {
        let mut store = PositionStore::new();
        let (first, _) = store.insert(rendered("p1"));
        let (second, replaced) = store.insert(rendered("p1"));
        assert!(replaced.is_some());
        assert!(!store.is_alive(first));
        assert_eq!(store.key_of("p1"), Some(second));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn drain_stale_filters_and_skips_removed() {
        let mut store = PositionStore::new();
        let (a, _) = store.insert(rendered("a"));
        let (b, _) = store.insert(rendered("b"));
        let (c, _) = store.insert(rendered("c"));
        store.get_mut(b).unwrap().status = Status::Rendered;
        store.get_mut(c).unwrap().status = Status::Rendered;

        store.mark_stale_where(dirty::SCROLL, |p| p.status().is_loaded());
        store.mark_stale(a, dirty::RESIZE);
        store.remove(c);

        assert_eq!(store.drain_stale(dirty::SCROLL), vec![b]);
        assert_eq!(store.drain_stale(dirty::RESIZE), vec![a]);
        assert!(store.drain_stale(dirty::SCROLL).is_empty(), "drain clears");
    }
}
