// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the engine.
//!
//! This module provides a [`TraceSink`] trait with one method per event the
//! engine reports. All method bodies default to no-ops, so implementing only
//! the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing. When **on**, each
//! method performs a single `Option` branch before dispatching.
//!
//! The trace is the only place where dropped messages and denied commands
//! are visible: they are deliberately kept out of the
//! [`ErrorLog`](crate::error::ErrorLog).
//!
//! # Crate features
//!
//! - `trace` enables the `Tracer` method bodies (one branch per call).

use crate::channel::{DropReason, Transport};
use crate::error::ErrorKind;
use crate::geometry::ExpansionEnvelope;
use crate::time::HostTime;
use crate::wire::Command;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Render lifecycle step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderPhase {
    /// The frame was mounted and the timeout armed.
    Start,
    /// The frame signalled load.
    Loaded,
    /// The timeout fired before load.
    TimedOut,
}

/// What happened to an inbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageOutcome {
    /// Validated and handed to the dispatcher.
    Accepted,
    /// Dropped without dispatch.
    Dropped(DropReason),
    /// The native messaging probe came back.
    Probe,
}

/// What the dispatcher did with a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandOutcome {
    /// State changed and a reply was queued.
    Applied,
    /// The request was structurally invalid (e.g. did not grow the box).
    Rejected,
    /// A `before_pos_msg` hook vetoed the command.
    Cancelled,
    /// The position lacks the required capability.
    Denied,
    /// Nothing to do in the current state.
    Ignored,
}

/// Why geometry was pushed to a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateReason {
    /// Window scroll.
    Scroll,
    /// Window resize.
    Resize,
    /// Scroll of the position's scrollable ancestor.
    ElementScroll,
    /// The frame asked with `geom-update`.
    Requested,
    /// The frame finished loading.
    Loaded,
    /// An expand or collapse changed the frame.
    Command,
}

/// Which host listener changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    /// The host-wide inbound message listener.
    Message,
    /// Window `scroll`, `resize`, `focus`, and `blur`.
    Window,
    /// A scroll watch on one position's ancestor.
    ElementScroll,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted at render lifecycle transitions.
#[derive(Clone, Copy, Debug)]
pub struct RenderEvent<'a> {
    /// When it happened.
    pub now: HostTime,
    /// Position id.
    pub position: &'a str,
    /// Which transition.
    pub phase: RenderPhase,
}

/// Emitted when a position is torn down.
#[derive(Clone, Copy, Debug)]
pub struct NukeEvent<'a> {
    /// When it happened.
    pub now: HostTime,
    /// Position id.
    pub position: &'a str,
}

/// Emitted for every inbound payload.
#[derive(Clone, Copy, Debug)]
pub struct MessageEvent<'a> {
    /// When it arrived.
    pub now: HostTime,
    /// Claimed position id (may be empty for malformed payloads).
    pub position: &'a str,
    /// Claimed verb (may be empty).
    pub verb: &'a str,
    /// What happened to it.
    pub outcome: MessageOutcome,
}

/// Emitted after the dispatcher handles a command.
#[derive(Clone, Copy, Debug)]
pub struct CommandEvent<'a> {
    /// When it was handled.
    pub now: HostTime,
    /// Position id.
    pub position: &'a str,
    /// The command.
    pub command: Command,
    /// What the dispatcher did.
    pub outcome: CommandOutcome,
}

/// Emitted for every outbound message.
#[derive(Clone, Copy, Debug)]
pub struct SendEvent<'a> {
    /// When it was sent.
    pub now: HostTime,
    /// Position id.
    pub position: &'a str,
    /// The command sent.
    pub command: Command,
    /// Transport used.
    pub transport: Transport,
    /// Whether the host reports it was dispatched.
    pub dispatched: bool,
}

/// Emitted when geometry is pushed to a frame.
#[derive(Clone, Copy, Debug)]
pub struct GeometryEvent<'a> {
    /// When it was computed.
    pub now: HostTime,
    /// Position id.
    pub position: &'a str,
    /// The computed geometry.
    pub envelope: &'a ExpansionEnvelope,
    /// Why it was pushed.
    pub reason: UpdateReason,
}

/// Emitted for every failure, logged or not.
#[derive(Clone, Copy, Debug)]
pub struct ErrorEvent<'a> {
    /// When it happened.
    pub now: HostTime,
    /// Classification.
    pub kind: ErrorKind,
    /// Affected position, if any.
    pub position: Option<&'a str>,
    /// Detail.
    pub message: &'a str,
}

/// Emitted when a host listener is attached or detached.
#[derive(Clone, Copy, Debug)]
pub struct ListenerEvent<'a> {
    /// When it changed.
    pub now: HostTime,
    /// Which listener.
    pub listener: ListenerKind,
    /// Position id for per-position listeners.
    pub position: Option<&'a str>,
    /// `true` when attached, `false` when detached.
    pub attached: bool,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the engine.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called at render lifecycle transitions.
    fn on_render(&mut self, e: &RenderEvent<'_>) {
        _ = e;
    }

    /// Called when a position is nuked.
    fn on_nuke(&mut self, e: &NukeEvent<'_>) {
        _ = e;
    }

    /// Called for every inbound payload.
    fn on_message(&mut self, e: &MessageEvent<'_>) {
        _ = e;
    }

    /// Called after a command is handled.
    fn on_command(&mut self, e: &CommandEvent<'_>) {
        _ = e;
    }

    /// Called for every outbound message.
    fn on_send(&mut self, e: &SendEvent<'_>) {
        _ = e;
    }

    /// Called when geometry is pushed.
    fn on_geometry(&mut self, e: &GeometryEvent<'_>) {
        _ = e;
    }

    /// Called for every failure.
    fn on_error(&mut self, e: &ErrorEvent<'_>) {
        _ = e;
    }

    /// Called when a host listener is attached or detached.
    fn on_listener(&mut self, e: &ListenerEvent<'_>) {
        _ = e;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

macro_rules! dispatch {
    ($(#[$doc:meta])* $name:ident => $method:ident($event:ident)) => {
        $(#[$doc])*
        #[inline]
        pub fn $name(&mut self, e: &$event<'_>) {
            #[cfg(feature = "trace")]
            if let Some(s) = &mut self.sink {
                s.$method(e);
            }
            #[cfg(not(feature = "trace"))]
            {
                _ = e;
            }
        }
    };
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    dispatch!(
        /// Emits a [`RenderEvent`].
        render => on_render(RenderEvent)
    );
    dispatch!(
        /// Emits a [`NukeEvent`].
        nuke => on_nuke(NukeEvent)
    );
    dispatch!(
        /// Emits a [`MessageEvent`].
        message => on_message(MessageEvent)
    );
    dispatch!(
        /// Emits a [`CommandEvent`].
        command => on_command(CommandEvent)
    );
    dispatch!(
        /// Emits a [`SendEvent`].
        send => on_send(SendEvent)
    );
    dispatch!(
        /// Emits a [`GeometryEvent`].
        geometry => on_geometry(GeometryEvent)
    );
    dispatch!(
        /// Emits an [`ErrorEvent`].
        error => on_error(ErrorEvent)
    );
    dispatch!(
        /// Emits a [`ListenerEvent`].
        listener => on_listener(ListenerEvent)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nuke_event() -> NukeEvent<'static> {
        NukeEvent {
            now: HostTime(6),
            position: "p1",
        }
    }

    #[test]
    fn noop_sink_compiles() {
        let mut sink = NoopSink;
        sink.on_nuke(&nuke_event());
        sink.on_error(&ErrorEvent {
            now: HostTime(0),
            kind: ErrorKind::Timeout,
            position: Some("p1"),
            message: "render timed out",
        });
    }

    #[test]
    fn tracer_none_does_nothing() {
        let mut tracer = Tracer::none();
        tracer.nuke(&nuke_event());
        tracer.render(&RenderEvent {
            now: HostTime(0),
            position: "p1",
            phase: RenderPhase::Start,
        });
    }

    #[cfg(feature = "trace")]
    #[test]
    fn tracer_dispatches_to_sink() {
        struct RecordingSink {
            nuked: Vec<String>,
        }
        impl TraceSink for RecordingSink {
            fn on_nuke(&mut self, e: &NukeEvent<'_>) {
                self.nuked.push(e.position.to_owned());
            }
        }

        let mut sink = RecordingSink { nuked: Vec::new() };
        let mut tracer = Tracer::new(&mut sink);
        tracer.nuke(&nuke_event());
        // Access sink after tracer is dropped.
        drop(tracer);
        assert_eq!(sink.nuked, ["p1"]);
    }
}
