// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dirty-tracking channel constants.
//!
//! Rendered positions are marked stale (via [`understory_dirty`]) when the
//! host document moves under them. Each channel is an independent trigger
//! class and is drained once when its debounce timer fires:
//!
//! - [`SCROLL`]: the window scrolled. Positions whose geometry is already
//!   kept current by a per-element scroll watch are not marked.
//! - [`RESIZE`]: the window resized. Every live position is marked.
//!
//! Both channels are local-only: positions do not depend on each other, so
//! no dependency edges are ever added and marks never propagate.
//!
//! Draining happens in
//! [`PositionStore::drain_stale`](crate::position::PositionStore::drain_stale),
//! which returns the slots in deterministic order so that geometry pushes go
//! out in a stable sequence.

use understory_dirty::Channel;

/// Window scroll moved positions not covered by a scroll-ancestor watch.
pub const SCROLL: Channel = Channel::new(0);

/// Window resize may have moved or clipped every position.
pub const RESIZE: Channel = Channel::new(1);
