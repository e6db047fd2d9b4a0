// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host-supplied callbacks.
//!
//! The host observes the engine (and can veto expand/collapse) through a
//! [`Hooks`] implementation installed on the
//! [`Configuration`](crate::config::Configuration). Every method has a
//! default that does nothing and lets processing continue.
//!
//! A hook returning [`HookError`] never stops the engine: the error is
//! recorded as a `CallbackFailure` in the error log and processing continues
//! as though the hook had succeeded (a failed veto check counts as
//! [`Verdict::Proceed`]).

use std::fmt;

use kurbo::Vec2;

use crate::wire::Command;

/// Outcome of a [`Hooks::before_pos_msg`] check.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Let the command run.
    #[default]
    Proceed,
    /// Abort the command with no state change and no reply.
    Cancel,
}

/// A failure reported by a host hook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookError(String);

impl HookError {
    /// Creates an error with a description.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// The description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hook failed: {}", self.0)
    }
}

impl core::error::Error for HookError {}

/// Callbacks invoked by the engine.
pub trait Hooks {
    /// Called before an expand or collapse is applied.
    ///
    /// `delta` is the requested growth (`dx`, `dy`), zero for collapse.
    ///
    /// # Errors
    ///
    /// An error is logged and treated as [`Verdict::Proceed`].
    fn before_pos_msg(
        &mut self,
        position: &str,
        command: Command,
        delta: Vec2,
    ) -> Result<Verdict, HookError> {
        _ = (position, command, delta);
        Ok(Verdict::Proceed)
    }

    /// Called after a command was applied, and with `"render-timeout"`
    /// when a render times out.
    ///
    /// # Errors
    ///
    /// An error is logged; processing continues.
    fn pos_msg(&mut self, position: &str, command: &str, data: &str) -> Result<(), HookError> {
        _ = (position, command, data);
        Ok(())
    }

    /// Called when a frame is mounted.
    ///
    /// # Errors
    ///
    /// An error is logged; the render continues.
    fn start_pos_render(&mut self, position: &str) -> Result<(), HookError> {
        _ = position;
        Ok(())
    }

    /// Called when a frame signals load.
    ///
    /// # Errors
    ///
    /// An error is logged; the position stays rendered.
    fn end_pos_render(&mut self, position: &str) -> Result<(), HookError> {
        _ = position;
        Ok(())
    }

    /// Called when a render could not start.
    fn failure(&mut self, position: &str, reason: &str) {
        _ = (position, reason);
    }
}

/// [`Hooks`] that do nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHooks;

impl Hooks for NoHooks {}
