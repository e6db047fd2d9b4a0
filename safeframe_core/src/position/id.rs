// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rendered position identity.

use core::fmt;

/// A handle to a rendered position in a [`PositionStore`](super::PositionStore).
///
/// Contains both a slot index and a generation counter so that stale handles
/// can be detected after a position is nuked and the slot is reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PositionKey {
    /// Slot index into the store.
    pub(crate) idx: u32,
    /// Generation counter; must match the store's generation for this slot.
    pub(crate) generation: u32,
}

impl PositionKey {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self { idx, generation }
    }

    /// Returns the raw slot index (for diagnostics only).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }

    /// Returns the generation counter.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PositionKey({}@gen{})", self.idx, self.generation)
    }
}
