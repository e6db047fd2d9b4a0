// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! JSON journal of trace events.
//!
//! [`JournalSink`] keeps every event as a JSON object of the form
//! `{"ts": <ms>, "event": <name>, ...fields}`. [`JournalSink::export`]
//! writes them out as one JSON array, suitable for attaching to a bug report
//! or diffing two runs.

use std::io::{self, Write};

use serde_json::{Value, json};

use safeframe_core::trace::{
    CommandEvent, ErrorEvent, GeometryEvent, ListenerEvent, MessageEvent, MessageOutcome,
    NukeEvent, RenderEvent, SendEvent, TraceSink,
};

use crate::pretty::{listener_name, outcome_name, phase_name, reason_name};

/// Collects trace events as JSON values.
#[derive(Debug, Default)]
pub struct JournalSink {
    events: Vec<Value>,
}

impl JournalSink {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The collected events, oldest first.
    #[must_use]
    pub fn events(&self) -> &[Value] {
        &self.events
    }

    /// Number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events named `event`.
    pub fn named<'a>(&'a self, event: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.events.iter().filter(move |e| e["event"] == event)
    }

    /// Writes the journal as a pretty-printed JSON array.
    ///
    /// # Errors
    ///
    /// Returns any error from the writer.
    pub fn export(&self, writer: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer_pretty(writer, &self.events)?;
        Ok(())
    }

    fn push(&mut self, value: Value) {
        self.events.push(value);
    }
}

impl TraceSink for JournalSink {
    fn on_render(&mut self, e: &RenderEvent<'_>) {
        self.push(json!({
            "ts": e.now.millis(),
            "event": "render",
            "pos": e.position,
            "phase": phase_name(e.phase),
        }));
    }

    fn on_nuke(&mut self, e: &NukeEvent<'_>) {
        self.push(json!({
            "ts": e.now.millis(),
            "event": "nuke",
            "pos": e.position,
        }));
    }

    fn on_message(&mut self, e: &MessageEvent<'_>) {
        let (outcome, reason) = match e.outcome {
            MessageOutcome::Accepted => ("accepted", None),
            MessageOutcome::Dropped(reason) => ("dropped", Some(reason.as_str())),
            MessageOutcome::Probe => ("probe", None),
        };
        self.push(json!({
            "ts": e.now.millis(),
            "event": "message",
            "pos": e.position,
            "cmd": e.verb,
            "outcome": outcome,
            "reason": reason,
        }));
    }

    fn on_command(&mut self, e: &CommandEvent<'_>) {
        self.push(json!({
            "ts": e.now.millis(),
            "event": "command",
            "pos": e.position,
            "cmd": e.command.as_str(),
            "outcome": outcome_name(e.outcome),
        }));
    }

    fn on_send(&mut self, e: &SendEvent<'_>) {
        self.push(json!({
            "ts": e.now.millis(),
            "event": "send",
            "pos": e.position,
            "cmd": e.command.as_str(),
            "transport": format!("{:?}", e.transport),
            "dispatched": e.dispatched,
        }));
    }

    fn on_geometry(&mut self, e: &GeometryEvent<'_>) {
        let r = e.envelope.rect.rect;
        self.push(json!({
            "ts": e.now.millis(),
            "event": "geometry",
            "pos": e.position,
            "reason": reason_name(e.reason),
            "rect": [r.x0, r.y0, r.x1, r.y1],
            "iv": e.envelope.intersection_ratio,
            "viv": e.envelope.viewport_ratio,
            "root": e.envelope.reference_is_root,
        }));
    }

    fn on_error(&mut self, e: &ErrorEvent<'_>) {
        self.push(json!({
            "ts": e.now.millis(),
            "event": "error",
            "kind": e.kind.as_str(),
            "pos": e.position,
            "message": e.message,
        }));
    }

    fn on_listener(&mut self, e: &ListenerEvent<'_>) {
        self.push(json!({
            "ts": e.now.millis(),
            "event": "listener",
            "listener": listener_name(e.listener),
            "pos": e.position,
            "attached": e.attached,
        }));
    }
}
