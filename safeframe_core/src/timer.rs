// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Engine-owned timers.
//!
//! The engine cannot sleep or register callbacks itself. Instead every
//! pending timer lives in a [`TimerQueue`]; the backend arms one host timer
//! for [`TimerQueue::next_deadline`] and calls back into the engine when it
//! fires, which then pops every due entry.
//!
//! Each [`TimerKind`] has at most one pending entry: arming a kind that is
//! already pending replaces its deadline. This gives debouncing for free.

use crate::position::PositionKey;
use crate::time::{Duration, HostTime};

/// What a timer is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// A position's frame has not signalled load yet.
    RenderTimeout(PositionKey),
    /// Debounced window scroll.
    ScrollDebounce,
    /// Debounced window resize.
    ResizeDebounce,
    /// Debounced focus/blur.
    FocusDebounce,
    /// Debounced scroll of a position's scrollable ancestor.
    ElementScroll(PositionKey),
    /// Flush of queued outbound acknowledgements.
    DeferredSend,
}

impl TimerKind {
    /// The position this timer belongs to, if it is per-position.
    #[must_use]
    pub const fn position(self) -> Option<PositionKey> {
        match self {
            Self::RenderTimeout(key) | Self::ElementScroll(key) => Some(key),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    kind: TimerKind,
    deadline: HostTime,
    seq: u64,
}

/// Pending timers, at most one per [`TimerKind`].
#[derive(Clone, Debug, Default)]
pub struct TimerQueue {
    entries: Vec<Entry>,
    next_seq: u64,
}

impl TimerQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `kind` to fire at `now + delay`, replacing any pending entry of
    /// the same kind.
    pub fn arm(&mut self, kind: TimerKind, now: HostTime, delay: Duration) {
        self.cancel(kind);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(Entry {
            kind,
            deadline: now + delay,
            seq,
        });
    }

    /// Arms `kind` only if it is not already pending.
    ///
    /// Returns whether a new entry was created.
    pub fn arm_if_idle(&mut self, kind: TimerKind, now: HostTime, delay: Duration) -> bool {
        if self.is_armed(kind) {
            return false;
        }
        self.arm(kind, now, delay);
        true
    }

    /// Cancels `kind`. Returns whether it was pending.
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.kind != kind);
        before != self.entries.len()
    }

    /// Cancels every timer belonging to `key`.
    pub fn cancel_position(&mut self, key: PositionKey) {
        self.entries.retain(|e| e.kind.position() != Some(key));
    }

    /// Cancels everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Whether `kind` is pending.
    #[must_use]
    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.entries.iter().any(|e| e.kind == kind)
    }

    /// The pending deadline for `kind`.
    #[must_use]
    pub fn deadline(&self, kind: TimerKind) -> Option<HostTime> {
        self.entries
            .iter()
            .find(|e| e.kind == kind)
            .map(|e| e.deadline)
    }

    /// The earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<HostTime> {
        self.entries.iter().map(|e| e.deadline).min()
    }

    /// Removes and returns every timer due at `now`, earliest first.
    ///
    /// Timers with equal deadlines come out in the order they were armed.
    pub fn pop_due(&mut self, now: HostTime) -> Vec<TimerKind> {
        let mut due: Vec<Entry> = Vec::new();
        self.entries.retain(|e| {
            if e.deadline <= now {
                due.push(*e);
                false
            } else {
                true
            }
        });
        due.sort_by_key(|e| (e.deadline, e.seq));
        due.into_iter().map(|e| e.kind).collect()
    }

    /// Number of pending timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::PositionKey;

    #[test]
    fn rearming_replaces_deadline() {
        let mut timers = TimerQueue::new();
        timers.arm(TimerKind::ScrollDebounce, HostTime(0), Duration(750));
        timers.arm(TimerKind::ScrollDebounce, HostTime(500), Duration(750));
        assert_eq!(timers.len(), 1);
        assert_eq!(timers.deadline(TimerKind::ScrollDebounce), Some(HostTime(1250)));
        assert!(timers.pop_due(HostTime(750)).is_empty());
        assert_eq!(timers.pop_due(HostTime(1250)), vec![TimerKind::ScrollDebounce]);
        assert!(timers.is_empty());
    }

    #[test]
    fn arm_if_idle_keeps_first_deadline() {
        let mut timers = TimerQueue::new();
        assert!(timers.arm_if_idle(TimerKind::FocusDebounce, HostTime(0), Duration(2)));
        assert!(!timers.arm_if_idle(TimerKind::FocusDebounce, HostTime(1), Duration(2)));
        assert_eq!(timers.deadline(TimerKind::FocusDebounce), Some(HostTime(2)));
    }

    #[test]
    fn pop_due_orders_by_deadline_then_arm_order() {
        let key = PositionKey::new(0, 0);
        let mut timers = TimerQueue::new();
        timers.arm(TimerKind::ResizeDebounce, HostTime(0), Duration(10));
        timers.arm(TimerKind::RenderTimeout(key), HostTime(0), Duration(5));
        timers.arm(TimerKind::DeferredSend, HostTime(0), Duration(10));
        assert_eq!(timers.next_deadline(), Some(HostTime(5)));
        assert_eq!(
            timers.pop_due(HostTime(20)),
            vec![
                TimerKind::RenderTimeout(key),
                TimerKind::ResizeDebounce,
                TimerKind::DeferredSend,
            ]
        );
    }

    #[test]
    fn cancel_position_leaves_shared_timers() {
        let a = PositionKey::new(0, 0);
        let b = PositionKey::new(1, 0);
        let mut timers = TimerQueue::new();
        timers.arm(TimerKind::RenderTimeout(a), HostTime(0), Duration(5));
        timers.arm(TimerKind::ElementScroll(a), HostTime(0), Duration(5));
        timers.arm(TimerKind::ElementScroll(b), HostTime(0), Duration(5));
        timers.arm(TimerKind::ScrollDebounce, HostTime(0), Duration(5));
        timers.cancel_position(a);
        assert_eq!(timers.len(), 2);
        assert!(timers.is_armed(TimerKind::ElementScroll(b)));
        assert!(timers.cancel(TimerKind::ScrollDebounce));
        assert!(!timers.cancel(TimerKind::ScrollDebounce));
    }
}
