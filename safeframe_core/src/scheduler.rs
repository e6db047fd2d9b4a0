// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Debounced geometry and focus updates.
//!
//! Host events arrive in bursts (a scroll gesture fires dozens of `scroll`
//! events). The [`UpdateScheduler`] turns each burst into one pending timer
//! per trigger class in the engine's [`TimerQueue`]; every new event pushes
//! the deadline back, so the update runs once the burst has been quiet for
//! the configured delay.
//!
//! | trigger               | timer                          | default |
//! |-----------------------|--------------------------------|---------|
//! | window `scroll`       | [`TimerKind::ScrollDebounce`]  | 750 ms  |
//! | window `resize`       | [`TimerKind::ResizeDebounce`]  | 750 ms  |
//! | window `focus`/`blur` | [`TimerKind::FocusDebounce`]   | 2 ms    |
//! | ancestor `scroll`     | [`TimerKind::ElementScroll`]   | 750 ms  |

use crate::position::PositionKey;
use crate::time::{Duration, HostTime};
use crate::timer::{TimerKind, TimerQueue};

/// Configuration for the [`UpdateScheduler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Quiet period after the last window scroll.
    pub scroll_debounce: Duration,
    /// Quiet period after the last window resize.
    pub resize_debounce: Duration,
    /// Quiet period after the last focus change.
    pub focus_debounce: Duration,
    /// Quiet period after the last scroll of a watched ancestor.
    pub element_scroll_debounce: Duration,
}

impl SchedulerConfig {
    /// Default configuration for browsers.
    #[must_use]
    pub const fn web() -> Self {
        Self {
            scroll_debounce: Duration(750),
            resize_debounce: Duration(750),
            focus_debounce: Duration(2),
            element_scroll_debounce: Duration(750),
        }
    }

    /// Short delays for interactive demos and tests that step time by hand.
    #[must_use]
    pub const fn responsive() -> Self {
        Self {
            scroll_debounce: Duration(50),
            resize_debounce: Duration(50),
            focus_debounce: Duration(1),
            element_scroll_debounce: Duration(50),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::web()
    }
}

/// Arms debounce timers and tracks the focus state to report.
#[derive(Clone, Debug, Default)]
pub struct UpdateScheduler {
    config: SchedulerConfig,
    pending_focus: Option<bool>,
    reported_focus: Option<bool>,
}

impl UpdateScheduler {
    /// Creates a scheduler with the given configuration.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            pending_focus: None,
            reported_focus: None,
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Records a window scroll.
    pub fn window_scrolled(&self, timers: &mut TimerQueue, now: HostTime) {
        timers.arm(TimerKind::ScrollDebounce, now, self.config.scroll_debounce);
    }

    /// Records a window resize.
    pub fn window_resized(&self, timers: &mut TimerQueue, now: HostTime) {
        timers.arm(TimerKind::ResizeDebounce, now, self.config.resize_debounce);
    }

    /// Records a scroll of `key`'s watched ancestor.
    pub fn element_scrolled(&self, timers: &mut TimerQueue, now: HostTime, key: PositionKey) {
        timers.arm(
            TimerKind::ElementScroll(key),
            now,
            self.config.element_scroll_debounce,
        );
    }

    /// Records a focus change. Only the latest state in a burst is reported.
    pub fn focus_changed(&mut self, timers: &mut TimerQueue, now: HostTime, focused: bool) {
        self.pending_focus = Some(focused);
        timers.arm(TimerKind::FocusDebounce, now, self.config.focus_debounce);
    }

    /// Takes the focus state to report when the focus timer fires.
    ///
    /// Returns `None` if the burst ended where the last report left off.
    pub fn take_focus(&mut self) -> Option<bool> {
        let focused = self.pending_focus.take()?;
        if self.reported_focus == Some(focused) {
            return None;
        }
        self.reported_focus = Some(focused);
        Some(focused)
    }

    /// Forgets pending and reported focus state.
    pub fn reset(&mut self) {
        self.pending_focus = None;
        self.reported_focus = None;
    }
}
