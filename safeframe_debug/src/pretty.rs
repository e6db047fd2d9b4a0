// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! are host milliseconds.

use std::io::Write;

use safeframe_core::trace::{
    CommandEvent, CommandOutcome, ErrorEvent, GeometryEvent, ListenerEvent, ListenerKind,
    MessageEvent, MessageOutcome, NukeEvent, RenderEvent, RenderPhase, SendEvent, TraceSink,
    UpdateReason,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink").finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>) -> Self {
        Self { writer }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    /// Returns the destination, consuming the sink.
    pub fn into_writer(self) -> W {
        self.writer
    }
}

pub(crate) fn phase_name(phase: RenderPhase) -> &'static str {
    match phase {
        RenderPhase::Start => "start",
        RenderPhase::Loaded => "loaded",
        RenderPhase::TimedOut => "timed-out",
    }
}

pub(crate) fn outcome_name(outcome: CommandOutcome) -> &'static str {
    match outcome {
        CommandOutcome::Applied => "applied",
        CommandOutcome::Rejected => "rejected",
        CommandOutcome::Cancelled => "cancelled",
        CommandOutcome::Denied => "denied",
        CommandOutcome::Ignored => "ignored",
    }
}

pub(crate) fn reason_name(reason: UpdateReason) -> &'static str {
    match reason {
        UpdateReason::Scroll => "scroll",
        UpdateReason::Resize => "resize",
        UpdateReason::ElementScroll => "element-scroll",
        UpdateReason::Requested => "requested",
        UpdateReason::Loaded => "loaded",
        UpdateReason::Command => "command",
    }
}

pub(crate) fn listener_name(listener: ListenerKind) -> &'static str {
    match listener {
        ListenerKind::Message => "message",
        ListenerKind::Window => "window",
        ListenerKind::ElementScroll => "element-scroll",
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_render(&mut self, e: &RenderEvent<'_>) {
        let _ = writeln!(
            self.writer,
            "[render] {}ms pos={} {}",
            e.now.millis(),
            e.position,
            phase_name(e.phase),
        );
    }

    fn on_nuke(&mut self, e: &NukeEvent<'_>) {
        let _ = writeln!(self.writer, "[nuke] {}ms pos={}", e.now.millis(), e.position);
    }

    fn on_message(&mut self, e: &MessageEvent<'_>) {
        let outcome = match e.outcome {
            MessageOutcome::Accepted => "accepted",
            MessageOutcome::Dropped(reason) => reason.as_str(),
            MessageOutcome::Probe => "probe",
        };
        let _ = writeln!(
            self.writer,
            "[message] {}ms pos={} cmd={} {outcome}",
            e.now.millis(),
            e.position,
            e.verb,
        );
    }

    fn on_command(&mut self, e: &CommandEvent<'_>) {
        let _ = writeln!(
            self.writer,
            "[command] {}ms pos={} {} {}",
            e.now.millis(),
            e.position,
            e.command,
            outcome_name(e.outcome),
        );
    }

    fn on_send(&mut self, e: &SendEvent<'_>) {
        let delivered = if e.dispatched { "ok" } else { "FAILED" };
        let _ = writeln!(
            self.writer,
            "[send] {}ms pos={} {} via={:?} {delivered}",
            e.now.millis(),
            e.position,
            e.command,
            e.transport,
        );
    }

    fn on_geometry(&mut self, e: &GeometryEvent<'_>) {
        let r = e.envelope.rect.rect;
        let _ = writeln!(
            self.writer,
            "[geometry] {}ms pos={} {} rect=({}, {}, {}, {}) iv={:.2} viv={:.2}",
            e.now.millis(),
            e.position,
            reason_name(e.reason),
            r.x0,
            r.y0,
            r.x1,
            r.y1,
            e.envelope.intersection_ratio,
            e.envelope.viewport_ratio,
        );
    }

    fn on_error(&mut self, e: &ErrorEvent<'_>) {
        let _ = writeln!(
            self.writer,
            "[error] {}ms {} pos={} {}",
            e.now.millis(),
            e.kind.as_str(),
            e.position.unwrap_or("-"),
            e.message,
        );
    }

    fn on_listener(&mut self, e: &ListenerEvent<'_>) {
        let state = if e.attached { "attached" } else { "detached" };
        let _ = writeln!(
            self.writer,
            "[listener] {}ms {} pos={} {state}",
            e.now.millis(),
            listener_name(e.listener),
            e.position.unwrap_or("-"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safeframe_core::channel::DropReason;
    use safeframe_core::time::HostTime;

    fn output(sink: PrettyPrintSink<Vec<u8>>) -> String {
        String::from_utf8(sink.into_writer()).unwrap()
    }

    #[test]
    fn pretty_print_render() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_render(&RenderEvent {
            now: HostTime(1500),
            position: "p1",
            phase: RenderPhase::TimedOut,
        });
        let output = output(sink);
        assert!(output.contains("[render]"), "got: {output}");
        assert!(output.contains("1500ms pos=p1 timed-out"), "got: {output}");
    }

    #[test]
    fn dropped_message_shows_reason() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_message(&MessageEvent {
            now: HostTime(3),
            position: "p1",
            verb: "exp-ovr",
            outcome: MessageOutcome::Dropped(DropReason::GuidMismatch),
        });
        let output = output(sink);
        assert!(output.contains("cmd=exp-ovr guid-mismatch"), "got: {output}");
    }
}
