// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The render lifecycle, command dispatcher, and update loop.
//!
//! [`Engine`] owns everything one host page needs: the configuration, the
//! rendered positions, the message channels, the timer queue, the update
//! scheduler, the outbound queue, and the error log. It is a synchronous
//! state machine; a backend driver feeds it host events and timer firings
//! and re-arms a single host timer for [`Engine::next_deadline`] after every
//! call.
//!
//! ```text
//!   render ──► mount frame, open channel, arm timeout
//!                 │
//!   on_frame_loaded ──► Rendered ──► on_message ──► dispatch ──► outbox
//!                                                                  │
//!   on_timer ◄── DeferredSend (delay 0) ◄──────────────────────────┘
//!      │
//!      ├── RenderTimeout  ──► TimedOut ──► nuke
//!      ├── Scroll/Resize  ──► geom-update to stale positions
//!      ├── ElementScroll  ──► geom-update to one position
//!      └── FocusDebounce  ──► focus-change to every position
//! ```
//!
//! Replies are never sent from inside [`Engine::on_message`]: they are
//! queued and flushed by a zero-delay timer, so a frame that answers a reply
//! synchronously cannot re-enter the dispatcher.

use std::collections::VecDeque;
use std::fmt;

use kurbo::Vec2;

use crate::channel::{ChannelRegistry, Delivery, Transport};
use crate::coerce;
use crate::command::{self, Cancelled, CollapseError, ExpandError, ExpandRequest, Proceed};
use crate::config::{Capability, Configuration};
use crate::cookie::{self, CookieWrite};
use crate::dirty;
use crate::error::{ConfigError, ErrorEntry, ErrorKind, ErrorLog};
use crate::geometry::{ExpansionEnvelope, GeometryOptions, bounds_of};
use crate::hooks::{HookError, Hooks, Verdict};
use crate::platform::{FrameSpec, Host};
use crate::position::{
    Content, DiscoveredPosition, Position, PositionKey, PositionStore, RenderedPosition,
    RenderedSnapshot, Status,
};
use crate::scheduler::{SchedulerConfig, UpdateScheduler};
use crate::time::{Duration, HostTime};
use crate::timer::{TimerKind, TimerQueue};
use crate::trace::{
    CommandEvent, CommandOutcome, ErrorEvent, GeometryEvent, ListenerEvent, ListenerKind,
    MessageEvent, MessageOutcome, NukeEvent, RenderEvent, RenderPhase, SendEvent, TraceSink,
    Tracer, UpdateReason,
};
use crate::wire::{self, Command, Message, Record};

/// What the engine is doing, as reported by [`Engine::status`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EngineStatus {
    /// Nothing pending.
    Idle,
    /// At least one frame has not loaded yet.
    Rendering,
    /// A reply is queued for the frame.
    SendingMsgDown(Command),
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => Ok(()),
            Self::Rendering => f.write_str("rendering"),
            Self::SendingMsgDown(command) => write!(f, "sending-msg-down-{command}"),
        }
    }
}

#[derive(Clone, Debug)]
struct Outgoing {
    position: String,
    command: Command,
    record: Record,
}

/// Host-side engine for sandboxed content frames.
pub struct Engine<H: Host> {
    host: H,
    config: Option<Configuration>,
    store: PositionStore<H::Element>,
    registry: ChannelRegistry<H::Element>,
    timers: TimerQueue,
    scheduler: UpdateScheduler,
    geometry: GeometryOptions,
    outbox: VecDeque<Outgoing>,
    errors: ErrorLog,
    window_listeners: bool,
    sink: Option<Box<dyn TraceSink>>,
}

impl<H: Host> fmt::Debug for Engine<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("positions", &self.store.len())
            .field("timers", &self.timers.len())
            .field("outbox", &self.outbox.len())
            .field("errors", &self.errors.len())
            .field("window_listeners", &self.window_listeners)
            .finish_non_exhaustive()
    }
}

fn tracer(sink: &mut Option<Box<dyn TraceSink>>) -> Tracer<'_> {
    match sink {
        Some(s) => Tracer::new(&mut **s),
        None => Tracer::none(),
    }
}

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

/// Runs the `before_pos_msg` hook as a command gate.
///
/// A failing hook counts as proceed; its error is handed back through
/// `failed` for logging.
fn gate(
    config: &mut Option<Configuration>,
    position: &str,
    command: Command,
    delta: Vec2,
    failed: &mut Option<HookError>,
) -> Result<Proceed, Cancelled> {
    let Some(config) = config.as_mut() else {
        return Ok(Proceed);
    };
    match config.hooks_mut().before_pos_msg(position, command, delta) {
        Ok(Verdict::Proceed) => Ok(Proceed),
        Ok(Verdict::Cancel) => Err(Cancelled),
        Err(err) => {
            *failed = Some(err);
            Ok(Proceed)
        }
    }
}

impl<H: Host> Engine<H> {
    /// Creates an unconfigured engine with the default scheduler.
    #[must_use]
    pub fn new(host: H) -> Self {
        Self::with_scheduler(host, SchedulerConfig::default())
    }

    /// Creates an unconfigured engine with the given debounce delays.
    #[must_use]
    pub fn with_scheduler(host: H, scheduler: SchedulerConfig) -> Self {
        Self {
            host,
            config: None,
            store: PositionStore::new(),
            registry: ChannelRegistry::new(),
            timers: TimerQueue::new(),
            scheduler: UpdateScheduler::new(scheduler),
            geometry: GeometryOptions::default(),
            outbox: VecDeque::new(),
            errors: ErrorLog::default(),
            window_listeners: false,
            sink: None,
        }
    }

    /// Replaces the geometry options.
    #[must_use]
    pub fn with_geometry_options(mut self, options: GeometryOptions) -> Self {
        self.geometry = options;
        self
    }

    /// Installs a trace sink and returns the previous one.
    ///
    /// Events are only delivered when the `trace` feature is enabled.
    pub fn set_trace_sink(
        &mut self,
        sink: Option<Box<dyn TraceSink>>,
    ) -> Option<Box<dyn TraceSink>> {
        core::mem::replace(&mut self.sink, sink)
    }

    // -- Accessors --

    /// The host.
    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Mutable access to the host.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> Option<&Configuration> {
        self.config.as_ref()
    }

    /// Recorded failures.
    #[must_use]
    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    /// The transport the next outbound message will use.
    #[must_use]
    pub fn transport(&self) -> Transport {
        self.registry.transport()
    }

    /// The earliest pending timer deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<HostTime> {
        self.timers.next_deadline()
    }

    /// A snapshot of the rendered position `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<RenderedSnapshot> {
        self.store.by_id(id).map(|p| p.snapshot())
    }

    /// Snapshots of every rendered position, ordered by id.
    #[must_use]
    pub fn snapshots(&self) -> Vec<RenderedSnapshot> {
        self.store.iter().map(|(_, p)| p.snapshot()).collect()
    }

    /// What the engine is doing.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        if let Some(out) = self.outbox.front() {
            return EngineStatus::SendingMsgDown(out.command);
        }
        if self.store.iter().any(|(_, p)| p.status == Status::Pending) {
            EngineStatus::Rendering
        } else {
            EngineStatus::Idle
        }
    }

    // -- Lifecycle --

    /// Installs a configuration, tearing down every rendered position.
    ///
    /// # Errors
    ///
    /// Returns the validation error; the previous configuration stays.
    pub fn configure(&mut self, now: HostTime, config: Configuration) -> Result<(), ConfigError> {
        if let Err(err) = config.validate() {
            self.record_error(now, ErrorKind::InvalidConfig, None, &err.to_string());
            return Err(err);
        }
        if !self.store.is_empty() {
            self.nuke_all(now);
        }
        self.config = Some(config);
        Ok(())
    }

    /// Renders `position` into its destination element.
    ///
    /// A live position with the same id is torn down first. The engine's
    /// configuration wins over a config carried inline by the position.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NotConfigured`] before [`configure`](Self::configure),
    /// [`ConfigError::UnknownPosition`] without a position config,
    /// [`ConfigError::DestinationNotFound`] if the destination element cannot
    /// be found or replaced. All are logged as `InvalidConfig`; the latter
    /// two also fire the `failure` hook.
    pub fn render(&mut self, now: HostTime, position: Position) -> Result<PositionKey, ConfigError> {
        let id = position.id().to_owned();
        let Some(config) = self.config.as_ref() else {
            let err = ConfigError::NotConfigured;
            self.record_error(now, ErrorKind::InvalidConfig, Some(&id), &err.to_string());
            return Err(err);
        };
        let render_file = config.render_file().to_owned();
        let origin = config.render_origin();
        let timeout = config.timeout();
        let debug = config.debug();
        let Some(pos_config) = config.position(&id).or(position.config()).cloned() else {
            return Err(self.render_failed(now, &id, ConfigError::UnknownPosition(id.clone())));
        };

        if let Some(key) = self.store.key_of(&id) {
            self.nuke_key(now, key);
        }

        let missing = || ConfigError::DestinationNotFound {
            id: id.clone(),
            destination: pos_config.destination_id().to_owned(),
        };
        let Some(destination) = self.host.element_by_id(pos_config.destination_id()) else {
            let err = missing();
            return Err(self.render_failed(now, &id, err));
        };
        let geometry = bounds_of(&self.host, &destination, &self.geometry).envelope;
        let guid = self.registry.next_guid();

        let mut payload = Record::new();
        payload.insert("id", id.as_str());
        payload.insert(wire::KEY_GUID, guid.as_str());
        payload.insert("host", self.host.origin());
        match position.content() {
            Content::Markup(markup) => payload.insert("html", markup.as_str()),
            Content::Source(source) => payload.insert("src", source.as_str()),
        }
        payload.insert_record("meta", &position.metadata().to_record());
        payload.insert_record("conf", &pos_config.to_record());
        payload.insert_record(wire::KEY_GEOM, &geometry.to_record());
        payload.insert("focus", flag(self.host.has_focus()));
        if debug {
            payload.insert("debug", "1");
        }

        let spec = FrameSpec {
            position_id: id.clone(),
            destination_id: pos_config.destination_id().to_owned(),
            src: render_file,
            name: payload.encode(),
            width: pos_config.width(),
            height: pos_config.height(),
            z_index: pos_config.z_index(),
            background_color: pos_config.background_color().to_owned(),
            custom_css: pos_config.custom_css().to_owned(),
        };
        let Some(mounted) = self.host.mount_frame(&spec) else {
            let err = missing();
            return Err(self.render_failed(now, &id, err));
        };

        let was_listening = self.registry.is_listening();
        self.registry
            .open_with_guid(&mut self.host, &id, mounted.frame.clone(), origin, guid);
        if !was_listening {
            tracer(&mut self.sink).listener(&ListenerEvent {
                now,
                listener: ListenerKind::Message,
                position: None,
                attached: true,
            });
        }

        let mut rendered = RenderedPosition::new(pos_config, mounted, now);
        rendered.geometry = geometry;
        let (key, _) = self.store.insert(rendered);
        self.timers.arm(TimerKind::RenderTimeout(key), now, timeout);
        self.attach_window_listeners(now);

        tracer(&mut self.sink).render(&RenderEvent {
            now,
            position: &id,
            phase: RenderPhase::Start,
        });
        self.call_hook(now, &id, |h| h.start_pos_render(&id));
        Ok(key)
    }

    /// Renders several positions; returns how many started.
    pub fn render_all(
        &mut self,
        now: HostTime,
        positions: impl IntoIterator<Item = Position>,
    ) -> usize {
        positions
            .into_iter()
            .filter_map(|p| self.render(now, p).ok())
            .count()
    }

    /// Renders a position found by a discovery collaborator.
    ///
    /// # Errors
    ///
    /// Conversion errors (missing content, bad inline config) and every
    /// error of [`render`](Self::render).
    pub fn render_discovered(
        &mut self,
        now: HostTime,
        found: DiscoveredPosition,
    ) -> Result<PositionKey, ConfigError> {
        let id = found.id.clone();
        match Position::try_from(found) {
            Ok(position) => self.render(now, position),
            Err(err) => {
                self.record_error(now, ErrorKind::InvalidConfig, Some(&id), &err.to_string());
                Err(err)
            }
        }
    }

    /// The frame of `id` finished loading.
    ///
    /// Returns `false` if `id` is unknown or not pending.
    pub fn on_frame_loaded(&mut self, now: HostTime, id: &str) -> bool {
        let Some(key) = self.store.key_of(id) else {
            return false;
        };
        let Some(position) = self.store.get_mut(key) else {
            return false;
        };
        if position.status != Status::Pending {
            return false;
        }
        position.status = Status::Rendered;
        self.timers.cancel(TimerKind::RenderTimeout(key));
        tracer(&mut self.sink).render(&RenderEvent {
            now,
            position: id,
            phase: RenderPhase::Loaded,
        });
        self.refresh_geometry(now, key, UpdateReason::Loaded);
        self.call_hook(now, id, |h| h.end_pos_render(id));
        true
    }

    /// Tears down the given positions, or all of them when `ids` is empty.
    ///
    /// Unknown ids are ignored. Returns how many were removed.
    pub fn nuke<I>(&mut self, now: HostTime, ids: I) -> usize
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut requested = false;
        let mut keys = Vec::new();
        for id in ids {
            requested = true;
            if let Some(key) = self.store.key_of(id.as_ref()) {
                keys.push(key);
            }
        }
        if !requested {
            keys = self.store.keys();
        }
        keys.into_iter()
            .filter(|&key| self.nuke_key(now, key))
            .count()
    }

    /// Tears down every position and detaches every listener.
    pub fn dispose(&mut self, now: HostTime) {
        self.nuke_all(now);
        if self.registry.is_listening() {
            tracer(&mut self.sink).listener(&ListenerEvent {
                now,
                listener: ListenerKind::Message,
                position: None,
                attached: false,
            });
        }
        self.registry.close_all(&mut self.host);
        self.detach_window_listeners(now);
        self.timers.clear();
        self.outbox.clear();
        self.scheduler.reset();
    }

    /// Collapses an expanded position from the host side.
    ///
    /// The frame is told with `collapsed`. Returns whether it collapsed.
    pub fn collapse(&mut self, now: HostTime, id: &str) -> bool {
        let Some(key) = self.store.key_of(id) else {
            return false;
        };
        let outcome = self.collapse_key(now, key, true);
        tracer(&mut self.sink).command(&CommandEvent {
            now,
            position: id,
            command: Command::Collapsed,
            outcome,
        });
        outcome == CommandOutcome::Applied
    }

    /// Sends a host message down to a loaded frame.
    pub fn send_message(&mut self, now: HostTime, id: &str, text: &str) -> bool {
        let Some(position) = self.store.by_id(id) else {
            return false;
        };
        if !position.status.is_loaded() {
            return false;
        }
        self.queue_send(now, id, Command::Msg, Record::new().with("msg", text));
        true
    }

    // -- Host events --

    /// Handles an inbound message from window `source`.
    ///
    /// Returns whether the payload was meant for this engine (an accepted
    /// command or the messaging probe); the backend stops propagation then.
    pub fn on_message(&mut self, now: HostTime, payload: &str, source: Option<&H::Window>) -> bool {
        match self.registry.receive(&self.host, payload, source) {
            Delivery::Probe => {
                tracer(&mut self.sink).message(&MessageEvent {
                    now,
                    position: "",
                    verb: "",
                    outcome: MessageOutcome::Probe,
                });
                true
            }
            Delivery::Dropped {
                reason,
                position,
                verb,
            } => {
                tracer(&mut self.sink).message(&MessageEvent {
                    now,
                    position: &position,
                    verb: &verb,
                    outcome: MessageOutcome::Dropped(reason),
                });
                let claimed = (!position.is_empty()).then_some(position.as_str());
                self.record_error(now, ErrorKind::ProtocolViolation, claimed, reason.as_str());
                false
            }
            Delivery::Accepted(message) => {
                tracer(&mut self.sink).message(&MessageEvent {
                    now,
                    position: &message.pos,
                    verb: &message.verb,
                    outcome: MessageOutcome::Accepted,
                });
                self.dispatch(now, &message);
                true
            }
        }
    }

    /// The window scrolled.
    pub fn on_scroll(&mut self, now: HostTime) {
        if !self.store.is_empty() {
            self.scheduler.window_scrolled(&mut self.timers, now);
        }
    }

    /// The window was resized.
    pub fn on_resize(&mut self, now: HostTime) {
        if !self.store.is_empty() {
            self.scheduler.window_resized(&mut self.timers, now);
        }
    }

    /// The window gained or lost focus.
    pub fn on_focus_change(&mut self, now: HostTime, focused: bool) {
        if !self.store.is_empty() {
            self.scheduler
                .focus_changed(&mut self.timers, now, focused);
        }
    }

    /// A watched scroll ancestor scrolled.
    ///
    /// Returns whether any position watches `element`.
    pub fn on_element_scroll(&mut self, now: HostTime, element: &H::Element) -> bool {
        let keys: Vec<PositionKey> = self
            .store
            .iter()
            .filter(|(_, p)| p.scroll_watch.as_ref() == Some(element))
            .map(|(key, _)| key)
            .collect();
        for &key in &keys {
            self.scheduler.element_scrolled(&mut self.timers, now, key);
        }
        !keys.is_empty()
    }

    /// Runs every timer due at `now`.
    ///
    /// Timers armed while handling (such as the deferred send) wait for the
    /// next call.
    pub fn on_timer(&mut self, now: HostTime) {
        for kind in self.timers.pop_due(now) {
            match kind {
                TimerKind::RenderTimeout(key) => self.render_timed_out(now, key),
                TimerKind::ScrollDebounce => {
                    self.store.mark_stale_where(dirty::SCROLL, |p| {
                        p.status.is_loaded() && p.scroll_watch.is_none()
                    });
                    for key in self.store.drain_stale(dirty::SCROLL) {
                        self.push_geometry(now, key, UpdateReason::Scroll);
                    }
                }
                TimerKind::ResizeDebounce => {
                    self.store
                        .mark_stale_where(dirty::RESIZE, |p| p.status.is_loaded());
                    for key in self.store.drain_stale(dirty::RESIZE) {
                        self.push_geometry(now, key, UpdateReason::Resize);
                    }
                }
                TimerKind::FocusDebounce => {
                    if let Some(focused) = self.scheduler.take_focus() {
                        let loaded: Vec<String> = self
                            .store
                            .iter()
                            .filter(|(_, p)| p.status.is_loaded())
                            .map(|(_, p)| p.id.clone())
                            .collect();
                        for id in loaded {
                            let record = Record::new().with("focus", flag(focused));
                            self.queue_send(now, &id, Command::FocusChange, record);
                        }
                    }
                }
                TimerKind::ElementScroll(key) => {
                    self.push_geometry(now, key, UpdateReason::ElementScroll);
                }
                TimerKind::DeferredSend => self.flush_outbox(now),
            }
        }
    }

    // -- Internals: lifecycle --

    fn nuke_all(&mut self, now: HostTime) {
        self.nuke(now, core::iter::empty::<&str>());
    }

    fn nuke_key(&mut self, now: HostTime, key: PositionKey) -> bool {
        let Some(mut position) = self.store.remove(key) else {
            return false;
        };
        position.status = Status::Disposed;
        self.timers.cancel_position(key);
        self.outbox.retain(|out| out.position != position.id);
        if let Some(watch) = position.scroll_watch.take() {
            self.host.unwatch_scroll(&watch);
            tracer(&mut self.sink).listener(&ListenerEvent {
                now,
                listener: ListenerKind::ElementScroll,
                position: Some(&position.id),
                attached: false,
            });
        }
        self.host.remove_shim(&mut position.mounted);
        self.host
            .unmount_frame(&position.mounted, position.config.destination_id());

        let was_listening = self.registry.is_listening();
        self.registry.close(&mut self.host, &position.id);
        if was_listening && !self.registry.is_listening() {
            tracer(&mut self.sink).listener(&ListenerEvent {
                now,
                listener: ListenerKind::Message,
                position: None,
                attached: false,
            });
        }
        tracer(&mut self.sink).nuke(&NukeEvent {
            now,
            position: &position.id,
        });
        if self.store.is_empty() {
            self.detach_window_listeners(now);
        }
        true
    }

    fn render_failed(&mut self, now: HostTime, id: &str, err: ConfigError) -> ConfigError {
        let reason = err.to_string();
        if let Some(config) = self.config.as_mut() {
            config.hooks_mut().failure(id, &reason);
        }
        self.record_error(now, ErrorKind::InvalidConfig, Some(id), &reason);
        err
    }

    fn render_timed_out(&mut self, now: HostTime, key: PositionKey) {
        let Some(position) = self.store.get_mut(key) else {
            return;
        };
        if position.status != Status::Pending {
            return;
        }
        position.status = Status::TimedOut;
        let id = position.id.clone();
        tracer(&mut self.sink).render(&RenderEvent {
            now,
            position: &id,
            phase: RenderPhase::TimedOut,
        });
        self.nuke_key(now, key);
        self.call_hook(now, &id, |h| h.pos_msg(&id, "render-timeout", ""));
        let timeout = self.config.as_ref().map_or(Duration::ZERO, Configuration::timeout);
        self.record_error(
            now,
            ErrorKind::Timeout,
            Some(&id),
            &format!("frame did not load within {} ms", timeout.millis()),
        );
    }

    fn attach_window_listeners(&mut self, now: HostTime) {
        if self.window_listeners {
            return;
        }
        self.host.set_window_listeners(true);
        self.window_listeners = true;
        tracer(&mut self.sink).listener(&ListenerEvent {
            now,
            listener: ListenerKind::Window,
            position: None,
            attached: true,
        });
    }

    fn detach_window_listeners(&mut self, now: HostTime) {
        if !self.window_listeners {
            return;
        }
        self.host.set_window_listeners(false);
        self.window_listeners = false;
        for kind in [
            TimerKind::ScrollDebounce,
            TimerKind::ResizeDebounce,
            TimerKind::FocusDebounce,
        ] {
            self.timers.cancel(kind);
        }
        self.scheduler.reset();
        tracer(&mut self.sink).listener(&ListenerEvent {
            now,
            listener: ListenerKind::Window,
            position: None,
            attached: false,
        });
    }

    // -- Internals: geometry --

    /// Recomputes and stores the geometry of `key`'s frame, moving the
    /// scroll watch if the scrollable ancestor changed.
    fn refresh_geometry(
        &mut self,
        now: HostTime,
        key: PositionKey,
        reason: UpdateReason,
    ) -> Option<ExpansionEnvelope> {
        let position = self.store.get(key)?;
        let frame = position.mounted.frame.clone();
        if self.host.client_rect(&frame).is_none() {
            let id = position.id.clone();
            self.record_error(
                now,
                ErrorKind::GeometryReadFailure,
                Some(&id),
                "frame rectangle unreadable",
            );
        }
        let bounds = bounds_of(&self.host, &frame, &self.geometry);
        let watch = bounds.scroll_ancestor().cloned();

        let position = self.store.get_mut(key)?;
        position.geometry = bounds.envelope;
        if position.scroll_watch != watch {
            if let Some(old) = position.scroll_watch.take() {
                self.host.unwatch_scroll(&old);
                tracer(&mut self.sink).listener(&ListenerEvent {
                    now,
                    listener: ListenerKind::ElementScroll,
                    position: Some(&position.id),
                    attached: false,
                });
            }
            if let Some(new) = watch {
                if self.host.watch_scroll(&new) {
                    position.scroll_watch = Some(new);
                    tracer(&mut self.sink).listener(&ListenerEvent {
                        now,
                        listener: ListenerKind::ElementScroll,
                        position: Some(&position.id),
                        attached: true,
                    });
                }
            }
        }
        tracer(&mut self.sink).geometry(&GeometryEvent {
            now,
            position: &position.id,
            envelope: &position.geometry,
            reason,
        });
        Some(position.geometry)
    }

    fn push_geometry(&mut self, now: HostTime, key: PositionKey, reason: UpdateReason) {
        let Some(position) = self.store.get(key) else {
            return;
        };
        if !position.status.is_loaded() {
            return;
        }
        let id = position.id.clone();
        if let Some(envelope) = self.refresh_geometry(now, key, reason) {
            let mut record = Record::new();
            record.insert_record(wire::KEY_GEOM, &envelope.to_record());
            self.queue_send(now, &id, Command::GeomUpdate, record);
        }
    }

    // -- Internals: dispatch --

    fn dispatch(&mut self, now: HostTime, message: &Message) {
        let Some(command) = message.command() else {
            return;
        };
        let Some(key) = self.store.key_of(&message.pos) else {
            return;
        };
        let outcome = match command {
            Command::ExpandOverlay => self.expand(now, key, &message.record, false),
            Command::ExpandPush => self.expand(now, key, &message.record, true),
            Command::Collapse => self.collapse_key(now, key, false),
            Command::Msg => {
                let text = coerce::to_str(message.record.get("msg"));
                self.call_hook(now, &message.pos, |h| h.pos_msg(&message.pos, "msg", text));
                CommandOutcome::Applied
            }
            Command::Error => {
                let text = coerce::to_str(message.record.get("msg"));
                self.record_error(now, ErrorKind::FrameReported, Some(&message.pos), text);
                self.call_hook(now, &message.pos, |h| h.pos_msg(&message.pos, "error", text));
                CommandOutcome::Applied
            }
            Command::GeomUpdate => self.geometry_requested(now, key),
            Command::ReadCookie => self.read_cookie(now, key, &message.record),
            Command::WriteCookie => self.write_cookie(now, key, &message.record),
            Command::Collapsed | Command::Expand | Command::FocusChange => CommandOutcome::Ignored,
        };
        tracer(&mut self.sink).command(&CommandEvent {
            now,
            position: &message.pos,
            command,
            outcome,
        });
    }

    fn deny(&mut self, now: HostTime, id: &str, command: Command) -> CommandOutcome {
        self.record_error(
            now,
            ErrorKind::CapabilityDenied,
            Some(id),
            &format!("`{command}` is not granted"),
        );
        CommandOutcome::Denied
    }

    fn expand(&mut self, now: HostTime, key: PositionKey, record: &Record, push: bool) -> CommandOutcome {
        let (verb, capability) = if push {
            (Command::ExpandPush, Capability::ExpandPush)
        } else {
            (Command::ExpandOverlay, Capability::ExpandOverlay)
        };
        let Some(position) = self.store.get(key) else {
            return CommandOutcome::Ignored;
        };
        if !position.status.is_loaded() {
            return CommandOutcome::Ignored;
        }
        let id = position.id.clone();
        if !position.config.allows(capability) {
            return self.deny(now, &id, verb);
        }
        let Some(request) = ExpandRequest::from_record(record) else {
            return CommandOutcome::Rejected;
        };

        let mut hook_error = None;
        let config = &mut self.config;
        let planned = command::plan_expand(position, &request, push, |delta| {
            gate(config, &id, verb, delta, &mut hook_error)
        });
        if let Some(err) = hook_error {
            self.record_error(now, ErrorKind::CallbackFailure, Some(&id), err.message());
        }
        let plan = match planned {
            Ok(plan) => plan,
            Err(ExpandError::NoGrowth) => return CommandOutcome::Rejected,
            Err(ExpandError::Cancelled) => return CommandOutcome::Cancelled,
        };

        let stacking_shim = self.host.capabilities().stacking_shim;
        let Some(position) = self.store.get_mut(key) else {
            return CommandOutcome::Ignored;
        };
        position.expansion = Some(plan.expansion);
        position.z_index = plan.frame_box.z_index;
        position.status = Status::Expanded;
        self.host.set_frame_box(&position.mounted.frame, &plan.frame_box);
        if let Some(size) = plan.wrapper {
            self.host.set_wrapper_size(&position.mounted.wrapper, size);
        }
        if stacking_shim {
            self.host.place_shim(&mut position.mounted, &plan.frame_box);
        }
        let offset = plan.expansion.offset();
        let size = position.size();

        let geometry = self
            .refresh_geometry(now, key, UpdateReason::Command)
            .unwrap_or_default();
        let mut delta = Record::new();
        delta.insert_num("dx", offset.x);
        delta.insert_num("dy", offset.y);
        let mut reply = delta.clone();
        reply.insert_num("w", size.width);
        reply.insert_num("h", size.height);
        reply.insert_record(wire::KEY_GEOM, &geometry.to_record());
        self.queue_send(now, &id, Command::Expand, reply);
        self.call_hook(now, &id, |h| h.pos_msg(&id, verb.as_str(), &delta.encode()));
        CommandOutcome::Applied
    }

    fn collapse_key(&mut self, now: HostTime, key: PositionKey, host_initiated: bool) -> CommandOutcome {
        let Some(position) = self.store.get(key) else {
            return CommandOutcome::Ignored;
        };
        if !position.status.is_loaded() {
            return CommandOutcome::Ignored;
        }
        let id = position.id.clone();

        let mut hook_error = None;
        let config = &mut self.config;
        let planned = command::plan_collapse(position, |delta| {
            gate(config, &id, Command::Collapse, delta, &mut hook_error)
        });
        if let Some(err) = hook_error {
            self.record_error(now, ErrorKind::CallbackFailure, Some(&id), err.message());
        }
        let plan = match planned {
            Ok(plan) => plan,
            Err(CollapseError::NotExpanded) => return CommandOutcome::Ignored,
            Err(CollapseError::Cancelled) => return CommandOutcome::Cancelled,
        };

        let Some(position) = self.store.get_mut(key) else {
            return CommandOutcome::Ignored;
        };
        position.expansion = None;
        position.z_index = plan.frame_box.z_index;
        position.status = Status::Collapsed;
        self.host.set_frame_box(&position.mounted.frame, &plan.frame_box);
        if let Some(size) = plan.wrapper {
            self.host.set_wrapper_size(&position.mounted.wrapper, size);
        }
        self.host.remove_shim(&mut position.mounted);

        let geometry = self
            .refresh_geometry(now, key, UpdateReason::Command)
            .unwrap_or_default();
        let mut reply = Record::new();
        reply.insert_record(wire::KEY_GEOM, &geometry.to_record());
        let verb = if host_initiated {
            Command::Collapsed
        } else {
            Command::Collapse
        };
        self.queue_send(now, &id, verb, reply);
        self.call_hook(now, &id, |h| h.pos_msg(&id, verb.as_str(), ""));
        CommandOutcome::Applied
    }

    fn geometry_requested(&mut self, now: HostTime, key: PositionKey) -> CommandOutcome {
        let Some(position) = self.store.get(key) else {
            return CommandOutcome::Ignored;
        };
        if !position.status.is_loaded() {
            return CommandOutcome::Ignored;
        }
        let id = position.id.clone();
        let Some(envelope) = self.refresh_geometry(now, key, UpdateReason::Requested) else {
            return CommandOutcome::Ignored;
        };
        let mut record = Record::new();
        record.insert_record(wire::KEY_GEOM, &envelope.to_record());
        self.queue_send(now, &id, Command::GeomUpdate, record);
        CommandOutcome::Applied
    }

    fn read_cookie(&mut self, now: HostTime, key: PositionKey, record: &Record) -> CommandOutcome {
        let Some(position) = self.store.get(key) else {
            return CommandOutcome::Ignored;
        };
        if !position.status.is_loaded() {
            return CommandOutcome::Ignored;
        }
        let id = position.id.clone();
        if !position.config.allows(Capability::ReadCookie) {
            return self.deny(now, &id, Command::ReadCookie);
        }
        let name = coerce::to_str(record.get("key"));
        if !cookie::is_valid_name(name) {
            return CommandOutcome::Rejected;
        }
        let value = self
            .host
            .cookie_string()
            .and_then(|jar| cookie::read(&jar, name))
            .unwrap_or_default();

        let Some(envelope) = self.refresh_geometry(now, key, UpdateReason::Requested) else {
            return CommandOutcome::Ignored;
        };
        let mut reply = Record::new().with("key", name).with("value", value.as_str());
        reply.insert_record(wire::KEY_GEOM, &envelope.to_record());
        self.queue_send(now, &id, Command::ReadCookie, reply);
        self.call_hook(now, &id, |h| h.pos_msg(&id, "read-cookie", name));
        CommandOutcome::Applied
    }

    fn write_cookie(&mut self, now: HostTime, key: PositionKey, record: &Record) -> CommandOutcome {
        let Some(position) = self.store.get(key) else {
            return CommandOutcome::Ignored;
        };
        if !position.status.is_loaded() {
            return CommandOutcome::Ignored;
        }
        let id = position.id.clone();
        if !position.config.allows(Capability::WriteCookie) {
            return self.deny(now, &id, Command::WriteCookie);
        }
        let Some(write) = CookieWrite::new(
            coerce::to_str(record.get("key")),
            coerce::to_str(record.get("value")),
        ) else {
            return CommandOutcome::Rejected;
        };
        if !self.host.set_cookie_string(&write.header()) {
            return CommandOutcome::Rejected;
        }
        let Some(envelope) = self.refresh_geometry(now, key, UpdateReason::Requested) else {
            return CommandOutcome::Ignored;
        };

        let mut reply = Record::new()
            .with("key", write.name())
            .with("value", write.value());
        reply.insert_record(wire::KEY_GEOM, &envelope.to_record());
        self.queue_send(now, &id, Command::WriteCookie, reply);
        self.call_hook(now, &id, |h| h.pos_msg(&id, "write-cookie", write.name()));
        CommandOutcome::Applied
    }

    // -- Internals: outbound --

    fn queue_send(&mut self, now: HostTime, position: &str, command: Command, mut record: Record) {
        record.insert(wire::KEY_CMD, command.as_str());
        self.outbox.push_back(Outgoing {
            position: position.to_owned(),
            command,
            record,
        });
        self.timers
            .arm_if_idle(TimerKind::DeferredSend, now, Duration::ZERO);
    }

    fn flush_outbox(&mut self, now: HostTime) {
        let msg_file = self
            .config
            .as_ref()
            .and_then(Configuration::msg_file)
            .map(str::to_owned);
        while let Some(Outgoing {
            position,
            command,
            record,
        }) = self.outbox.pop_front()
        {
            let Some(sent) = self
                .registry
                .send(&mut self.host, &position, record, msg_file.as_deref())
            else {
                continue;
            };
            tracer(&mut self.sink).send(&SendEvent {
                now,
                position: &position,
                command,
                transport: sent.transport,
                dispatched: sent.dispatched,
            });
        }
    }

    // -- Internals: failures --

    fn record_error(&mut self, now: HostTime, kind: ErrorKind, position: Option<&str>, message: &str) {
        tracer(&mut self.sink).error(&ErrorEvent {
            now,
            kind,
            position,
            message,
        });
        if kind.is_logged() {
            self.errors.push(ErrorEntry {
                kind,
                position: position.map(str::to_owned),
                message: message.to_owned(),
                at: now,
            });
        }
    }

    fn call_hook<T>(
        &mut self,
        now: HostTime,
        position: &str,
        f: impl FnOnce(&mut dyn Hooks) -> Result<T, HookError>,
    ) -> Option<T> {
        let result = f(self.config.as_mut()?.hooks_mut());
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.record_error(now, ErrorKind::CallbackFailure, Some(position), err.message());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use kurbo::{Rect, Size};

    use super::*;
    use crate::config::PositionConfig;
    use crate::platform::{BoxStyle, Overflow, PlatformCapabilities, ScrollMetrics};
    use crate::sim::{HookCall, NodeId, RecordingHooks, SimHost};

    const RENDER_FILE: &str = "https://frames.example/sf/render.html";

    fn page() -> SimHost {
        let mut host = SimHost::new(Size::new(1000.0, 800.0));
        let root = host.root();
        host.add_element(root, Some("slot"), Rect::new(100.0, 100.0, 400.0, 350.0));
        host
    }

    fn p1() -> PositionConfig {
        PositionConfig::new("p1", "slot", 300.0, 250.0).unwrap()
    }

    fn engine_with(host: SimHost, position: PositionConfig) -> (Engine<SimHost>, RecordingHooks) {
        let hooks = RecordingHooks::new();
        let config = Configuration::new(RENDER_FILE)
            .unwrap()
            .with_timeout(Duration(5))
            .with_hooks(hooks.clone())
            .with_position(position);
        let mut engine = Engine::new(host);
        engine.configure(HostTime(0), config).unwrap();
        (engine, hooks)
    }

    fn run_until(engine: &mut Engine<SimHost>, now: HostTime) {
        while engine.next_deadline().is_some_and(|d| d <= now) {
            engine.on_timer(now);
        }
    }

    /// Renders `id`, completes the messaging probe, and signals load.
    fn loaded(engine: &mut Engine<SimHost>, id: &str) {
        engine
            .render(HostTime(0), Position::markup(id, "<div/>"))
            .unwrap();
        for probe in engine.host_mut().take_self_posts() {
            assert!(engine.on_message(HostTime(0), &probe, None), "probe is consumed");
        }
        assert!(engine.on_frame_loaded(HostTime(1), id));
    }

    fn frame_of(engine: &Engine<SimHost>, id: &str) -> NodeId {
        engine.store.by_id(id).unwrap().mounted.frame
    }

    fn from_frame(engine: &mut Engine<SimHost>, now: HostTime, id: &str, body: &str) -> bool {
        let guid = engine.registry.get(id).unwrap().guid().as_str().to_owned();
        let window = engine.host().frame_window(&frame_of(engine, id));
        let payload = format!("pos={id}&guid={guid}&{body}");
        engine.on_message(now, &payload, window.as_ref())
    }

    /// Flushes the outbox and returns the decoded replies.
    fn replies(engine: &mut Engine<SimHost>, now: HostTime) -> Vec<Record> {
        run_until(engine, now);
        engine
            .host_mut()
            .take_posted()
            .iter()
            .map(|p| Record::decode(&p.payload))
            .collect()
    }

    #[test]
    fn render_mounts_frame_with_construction_payload() {
        let (mut engine, hooks) = engine_with(page(), p1());
        let position = Position::markup("p1", "<div/>")
            .with_metadata(crate::metadata::PositionMetadata::new([("site", "news")]));
        engine.render(HostTime(0), position).unwrap();

        let spec = &engine.host().mounts()[0];
        assert_eq!(spec.src, RENDER_FILE);
        assert_eq!((spec.width, spec.height), (300.0, 250.0));
        let payload = Record::decode(&spec.name);
        assert_eq!(payload.get("id"), Some("p1"));
        assert_eq!(payload.get("html"), Some("<div/>"));
        assert_eq!(payload.get("host"), Some(SimHost::ORIGIN));
        assert_eq!(payload.get("focus"), Some("1"));
        assert_eq!(
            payload.get("guid"),
            engine.registry.get("p1").map(|c| c.guid().as_str())
        );
        assert_eq!(payload.record("meta").unwrap().record("shared").unwrap().get("site"), Some("news"));
        assert_eq!(payload.record("conf").unwrap().get("dest"), Some("slot"));
        let geom = ExpansionEnvelope::from_record(&payload.record("geom").unwrap());
        assert_eq!(geom.rect.rect, Rect::new(100.0, 100.0, 400.0, 350.0));

        assert_eq!(engine.get("p1").unwrap().status, Status::Pending);
        assert_eq!(engine.status(), EngineStatus::Rendering);
        assert_eq!(engine.status().to_string(), "rendering");
        assert!(engine.host().message_listener());
        assert!(engine.host().window_listeners());
        assert_eq!(hooks.calls(), vec![HookCall::StartRender("p1".into())]);
    }

    #[test]
    fn render_timeout_nukes_and_notifies_once() {
        let (mut engine, hooks) = engine_with(page(), p1());
        engine
            .render(HostTime(0), Position::markup("p1", "<div/>"))
            .unwrap();
        run_until(&mut engine, HostTime(4));
        assert!(engine.get("p1").is_some(), "not yet timed out");

        run_until(&mut engine, HostTime(6));
        assert!(engine.get("p1").is_none());
        assert_eq!(hooks.pos_msg_count("p1", "render-timeout"), 1);
        let placeholder = engine.host().element_by_id("slot").unwrap();
        assert!(engine.host().children(placeholder).is_empty());
        let entry = engine.errors().latest().unwrap();
        assert_eq!(entry.kind, ErrorKind::Timeout);
        assert_eq!(entry.position.as_deref(), Some("p1"));
        assert!(!engine.host().message_listener());
        assert!(!engine.host().window_listeners());

        run_until(&mut engine, HostTime(100));
        assert_eq!(hooks.pos_msg_count("p1", "render-timeout"), 1);
        assert_eq!(engine.next_deadline(), None);
    }

    #[test]
    fn load_cancels_timeout() {
        let (mut engine, hooks) = engine_with(page(), p1());
        loaded(&mut engine, "p1");
        run_until(&mut engine, HostTime(100));
        assert_eq!(engine.get("p1").unwrap().status, Status::Rendered);
        assert!(hooks.calls().contains(&HookCall::EndRender("p1".into())));
        assert!(!engine.on_frame_loaded(HostTime(101), "p1"), "second load is ignored");
        assert_eq!(engine.status(), EngineStatus::Idle);
    }

    #[test]
    fn expand_then_collapse_round_trips() {
        let (mut engine, hooks) = engine_with(page(), p1());
        loaded(&mut engine, "p1");
        let frame = frame_of(&engine, "p1");
        let before = engine.host().rect(frame);

        assert!(from_frame(&mut engine, HostTime(10), "p1", "cmd=exp-ovr&dx=50&dy=0"));
        let expanded = engine.get("p1").unwrap();
        assert_eq!(expanded.status, Status::Expanded);
        assert_eq!(expanded.size, Size::new(350.0, 250.0));
        assert_eq!(expanded.offset, Vec2::new(50.0, 0.0));
        assert!(expanded.expanded);
        assert!(expanded.size.width > expanded.declared_size.width);
        assert_eq!(expanded.z_index, Some(command::EXPAND_Z_INDEX));
        assert_eq!(engine.host().rect(frame), Some(Rect::new(100.0, 100.0, 450.0, 350.0)));
        assert_eq!(engine.status(), EngineStatus::SendingMsgDown(Command::Expand));

        let sent = replies(&mut engine, HostTime(10));
        assert_eq!(sent.len(), 1, "reply waits for the deferred send");
        assert_eq!(sent[0].get("cmd"), Some("expand"));
        assert_eq!(sent[0].get("dx"), Some("50"));
        assert_eq!(sent[0].get("w"), Some("350"));
        assert_eq!(sent[0].get("h"), Some("250"));
        assert!(sent[0].record("geom").is_some());

        assert!(from_frame(&mut engine, HostTime(20), "p1", "cmd=collapse"));
        let collapsed = engine.get("p1").unwrap();
        assert_eq!(collapsed.status, Status::Collapsed);
        assert_eq!(collapsed.size, Size::new(300.0, 250.0));
        assert!(!collapsed.expanded);
        assert_eq!(collapsed.offset, Vec2::ZERO);
        assert_eq!(collapsed.z_index, None);
        assert_eq!(engine.host().rect(frame), before);
        assert_eq!(engine.host().z_index(frame), None);
        let sent = replies(&mut engine, HostTime(20));
        assert_eq!(sent[0].get("cmd"), Some("collapse"));

        assert!(hooks.calls().contains(&HookCall::BeforePosMsg {
            position: "p1".into(),
            command: Command::Collapse,
            delta: Vec2::ZERO,
        }));
        assert_eq!(hooks.pos_msg_count("p1", "exp-ovr"), 1);
    }

    #[test]
    fn expansion_must_grow() {
        let (mut engine, _) = engine_with(page(), p1());
        loaded(&mut engine, "p1");
        from_frame(&mut engine, HostTime(10), "p1", "cmd=exp-ovr&dx=0&dy=0");
        from_frame(&mut engine, HostTime(10), "p1", "cmd=exp-ovr");
        assert!(!engine.get("p1").unwrap().expanded);
        assert!(replies(&mut engine, HostTime(10)).is_empty());

        from_frame(&mut engine, HostTime(11), "p1", "cmd=exp-ovr&t=20&b=0");
        let snapshot = engine.get("p1").unwrap();
        assert_eq!(snapshot.size, Size::new(300.0, 270.0));
        assert_eq!(snapshot.offset, Vec2::new(0.0, -20.0));
    }

    #[test]
    fn mismatched_guid_never_reaches_dispatcher() {
        let (mut engine, hooks) = engine_with(page(), p1());
        loaded(&mut engine, "p1");
        let calls = hooks.calls().len();
        let window = engine.host().frame_window(&frame_of(&engine, "p1"));
        let forged = "pos=p1&cmd=exp-ovr&dx=50&guid=0123456789abcdef0123456789abcdef";
        assert!(!engine.on_message(HostTime(10), forged, window.as_ref()));
        assert_eq!(hooks.calls().len(), calls);
        assert!(!engine.get("p1").unwrap().expanded);
        assert!(engine.errors().is_empty(), "protocol drops are not logged");

        let guid = engine.registry.get("p1").unwrap().guid().as_str().to_owned();
        let padded = format!("pos=p1&cmd=exp-ovr&dx=50&guid=%20{guid}%20");
        assert!(
            !engine.on_message(HostTime(11), &padded, window.as_ref()),
            "padded guid does not match"
        );
        assert!(!engine.get("p1").unwrap().expanded);
    }

    #[test]
    fn veto_cancels_without_mutation_or_reply() {
        let (mut engine, hooks) = engine_with(page(), p1());
        loaded(&mut engine, "p1");
        hooks.set_veto(true);
        from_frame(&mut engine, HostTime(10), "p1", "cmd=exp-ovr&dx=50");
        assert!(!engine.get("p1").unwrap().expanded);
        assert!(replies(&mut engine, HostTime(10)).is_empty());
        assert_eq!(hooks.pos_msg_count("p1", "exp-ovr"), 0);
    }

    #[test]
    fn failing_hook_is_logged_and_processing_continues() {
        let (mut engine, hooks) = engine_with(page(), p1());
        loaded(&mut engine, "p1");
        hooks.set_failing(true);
        from_frame(&mut engine, HostTime(10), "p1", "cmd=exp-ovr&dx=50");
        assert!(engine.get("p1").unwrap().expanded);
        let failures = engine
            .errors()
            .iter()
            .filter(|e| e.kind == ErrorKind::CallbackFailure)
            .count();
        assert_eq!(failures, 2, "gate and pos_msg both failed");
    }

    #[test]
    fn push_expansion_grows_wrapper() {
        let config = p1().with_capability(Capability::ExpandPush, true);
        let (mut engine, _) = engine_with(page(), config);
        loaded(&mut engine, "p1");
        let wrapper = engine.store.by_id("p1").unwrap().mounted.wrapper;
        from_frame(&mut engine, HostTime(10), "p1", "cmd=exp-push&dx=0&dy=100");
        assert_eq!(engine.host().rect(wrapper), Some(Rect::new(100.0, 100.0, 400.0, 450.0)));
        from_frame(&mut engine, HostTime(11), "p1", "cmd=collapse");
        assert_eq!(engine.host().rect(wrapper), Some(Rect::new(100.0, 100.0, 400.0, 350.0)));
    }

    #[test]
    fn expansion_needs_capability() {
        let config = p1().with_capability(Capability::ExpandOverlay, false);
        let (mut engine, _) = engine_with(page(), config);
        loaded(&mut engine, "p1");
        from_frame(&mut engine, HostTime(10), "p1", "cmd=exp-ovr&dx=50");
        from_frame(&mut engine, HostTime(10), "p1", "cmd=exp-push&dx=50");
        assert!(!engine.get("p1").unwrap().expanded);
        assert!(replies(&mut engine, HostTime(10)).is_empty());
    }

    #[test]
    fn stacking_shim_follows_expansion() {
        let mut host = page();
        host.set_capabilities(PlatformCapabilities {
            stacking_shim: true,
            ..PlatformCapabilities::default()
        });
        let (mut engine, _) = engine_with(host, p1());
        loaded(&mut engine, "p1");
        from_frame(&mut engine, HostTime(10), "p1", "cmd=exp-ovr&dx=50");
        let shim = engine.store.by_id("p1").unwrap().mounted.shim.unwrap();
        assert_eq!(engine.host().z_index(shim), Some(command::EXPAND_Z_INDEX - 1));
        from_frame(&mut engine, HostTime(11), "p1", "cmd=collapse");
        assert!(engine.store.by_id("p1").unwrap().mounted.shim.is_none());
        assert!(!engine.host().is_attached(shim));
    }

    #[test]
    fn host_collapse_replies_collapsed() {
        let (mut engine, _) = engine_with(page(), p1());
        loaded(&mut engine, "p1");
        assert!(!engine.collapse(HostTime(5), "p1"), "not expanded yet");
        from_frame(&mut engine, HostTime(10), "p1", "cmd=exp-ovr&dx=50");
        replies(&mut engine, HostTime(10));
        assert!(engine.collapse(HostTime(11), "p1"));
        let sent = replies(&mut engine, HostTime(11));
        assert_eq!(sent[0].get("cmd"), Some("collapsed"));
    }

    #[test]
    fn write_cookie_without_capability_is_silent() {
        let (mut engine, _) = engine_with(page(), p1());
        loaded(&mut engine, "p1");
        from_frame(&mut engine, HostTime(10), "p1", "cmd=write-cookie&key=uid&value=42");
        assert!(engine.host().cookie_writes().is_empty());
        assert!(replies(&mut engine, HostTime(10)).is_empty());
        assert!(engine.errors().is_empty(), "denials are not logged");
    }

    #[test]
    fn cookies_with_capability() {
        let config = p1()
            .with_capability(Capability::ReadCookie, true)
            .with_capability(Capability::WriteCookie, true);
        let (mut engine, _) = engine_with(page(), config);
        loaded(&mut engine, "p1");

        from_frame(&mut engine, HostTime(10), "p1", "cmd=write-cookie&key=uid&value=a%20b");
        let header = &engine.host().cookie_writes()[0];
        assert!(header.starts_with("uid=a%20b;"));
        assert!(header.contains("max-age=86400"));
        assert!(header.contains("SameSite=None; Secure"));
        let sent = replies(&mut engine, HostTime(10));
        assert_eq!(sent[0].get("cmd"), Some("write-cookie"));
        assert_eq!(sent[0].get("value"), Some("a b"));

        engine.host_mut().scroll_to(Vec2::new(0.0, 120.0));
        from_frame(&mut engine, HostTime(11), "p1", "cmd=read-cookie&key=uid");
        let sent = replies(&mut engine, HostTime(11));
        assert_eq!(sent[0].get("cmd"), Some("read-cookie"));
        assert_eq!(sent[0].get("value"), Some("a b"));
        let geom = ExpansionEnvelope::from_record(&sent[0].record("geom").unwrap());
        assert_eq!(geom.viewport.y0, 120.0, "echoes live geometry, not the load-time copy");
    }

    #[test]
    fn cookies_wait_for_load() {
        let config = p1()
            .with_capability(Capability::ReadCookie, true)
            .with_capability(Capability::WriteCookie, true);
        let (mut engine, hooks) = engine_with(page(), config);
        engine
            .render(HostTime(0), Position::markup("p1", "<div/>"))
            .unwrap();
        for probe in engine.host_mut().take_self_posts() {
            engine.on_message(HostTime(0), &probe, None);
        }
        engine.host_mut().set_cookie("uid", "42");

        from_frame(&mut engine, HostTime(1), "p1", "cmd=write-cookie&key=uid&value=7");
        from_frame(&mut engine, HostTime(1), "p1", "cmd=read-cookie&key=uid");
        assert!(engine.host().cookie_writes().is_empty());
        assert!(replies(&mut engine, HostTime(1)).is_empty());
        assert_eq!(hooks.pos_msg_count("p1", "read-cookie"), 0);
        assert_eq!(hooks.pos_msg_count("p1", "write-cookie"), 0);

        assert!(engine.on_frame_loaded(HostTime(2), "p1"));
        from_frame(&mut engine, HostTime(3), "p1", "cmd=read-cookie&key=uid");
        let sent = replies(&mut engine, HostTime(3));
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].get("value"), Some("42"));
    }

    #[test]
    fn frame_errors_and_messages_reach_hooks() {
        let (mut engine, hooks) = engine_with(page(), p1());
        loaded(&mut engine, "p1");
        from_frame(&mut engine, HostTime(10), "p1", "cmd=error&msg=creative%20broke");
        from_frame(&mut engine, HostTime(10), "p1", "cmd=msg&msg=hello");
        let entry = engine.errors().latest().unwrap();
        assert_eq!(entry.kind, ErrorKind::FrameReported);
        assert_eq!(entry.message, "creative broke");
        assert_eq!(hooks.pos_msg_count("p1", "error"), 1);
        assert!(hooks.calls().contains(&HookCall::PosMsg {
            position: "p1".into(),
            command: "msg".into(),
            data: "hello".into(),
        }));
    }

    #[test]
    fn geometry_request_is_answered() {
        let (mut engine, _) = engine_with(page(), p1());
        loaded(&mut engine, "p1");
        from_frame(&mut engine, HostTime(10), "p1", "cmd=geom-update");
        let sent = replies(&mut engine, HostTime(10));
        assert_eq!(sent[0].get("cmd"), Some("geom-update"));
        let geom = ExpansionEnvelope::from_record(&sent[0].record("geom").unwrap());
        assert_eq!(geom.intersection_ratio, 1.0);
        assert!(geom.reference_is_root);
    }

    #[test]
    fn window_scroll_is_debounced() {
        let (mut engine, _) = engine_with(page(), p1());
        loaded(&mut engine, "p1");
        for t in [100, 200, 300] {
            engine.on_scroll(HostTime(t));
        }
        assert!(replies(&mut engine, HostTime(1000)).is_empty());
        let sent = replies(&mut engine, HostTime(1050));
        assert_eq!(sent.len(), 1, "one update per burst");
        assert_eq!(sent[0].get("cmd"), Some("geom-update"));
    }

    #[test]
    fn focus_change_reports_latest_state() {
        let (mut engine, _) = engine_with(page(), p1());
        loaded(&mut engine, "p1");
        engine.on_focus_change(HostTime(10), false);
        engine.on_focus_change(HostTime(11), true);
        engine.on_focus_change(HostTime(11), false);
        let sent = replies(&mut engine, HostTime(20));
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].get("cmd"), Some("focus-change"));
        assert_eq!(sent[0].get("focus"), Some("0"));
    }

    /// A page whose `slot` sits inside a vertically scrolling box.
    fn scroller_page() -> (SimHost, NodeId) {
        let mut host = SimHost::new(Size::new(1000.0, 800.0));
        let root = host.root();
        let scroller = host.add_element(root, None, Rect::new(0.0, 0.0, 500.0, 400.0));
        host.set_style(
            scroller,
            BoxStyle {
                overflow_y: Overflow::Scroll,
                ..BoxStyle::default()
            },
        );
        host.set_metrics(
            scroller,
            ScrollMetrics {
                scroll_width: 485.0,
                scroll_height: 2000.0,
                client_width: 485.0,
                client_height: 400.0,
                offset_width: 500.0,
                offset_height: 400.0,
            },
        );
        host.add_element(scroller, Some("slot"), Rect::new(0.0, 0.0, 300.0, 250.0));
        (host, scroller)
    }

    #[test]
    fn scrollable_ancestor_gets_its_own_watch() {
        let (host, scroller) = scroller_page();
        let (mut engine, _) = engine_with(host, p1());
        loaded(&mut engine, "p1");
        assert_eq!(engine.host().watched(), vec![scroller]);

        engine.on_scroll(HostTime(10));
        assert!(replies(&mut engine, HostTime(2000)).is_empty(), "window scroll skips watched positions");

        assert!(engine.on_element_scroll(HostTime(3000), &scroller));
        let sent = replies(&mut engine, HostTime(3750));
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].get("cmd"), Some("geom-update"));

        engine.nuke(HostTime(4000), ["p1"]);
        assert!(engine.host().watched().is_empty());
    }

    #[test]
    fn resize_reaches_watched_positions_once_per_burst() {
        let (host, scroller) = scroller_page();
        let (mut engine, _) = engine_with(host, p1());
        loaded(&mut engine, "p1");
        assert_eq!(engine.host().watched(), vec![scroller]);
        run_until(&mut engine, HostTime(1));
        engine.host_mut().take_posted();

        engine.on_resize(HostTime(1000));
        engine.on_resize(HostTime(1500));
        assert!(
            replies(&mut engine, HostTime(1750)).is_empty(),
            "second resize restarts the debounce"
        );
        let sent = replies(&mut engine, HostTime(2250));
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].get("cmd"), Some("geom-update"));
        assert!(replies(&mut engine, HostTime(5000)).is_empty());
    }

    #[test]
    fn nuke_is_idempotent_and_empty_means_all() {
        let mut host = page();
        let root = host.root();
        host.add_element(root, Some("slot2"), Rect::new(500.0, 100.0, 800.0, 350.0));
        let config = Configuration::new(RENDER_FILE)
            .unwrap()
            .with_position(p1())
            .with_position(PositionConfig::new("p2", "slot2", 300.0, 250.0).unwrap());
        let mut engine = Engine::new(host);
        engine.configure(HostTime(0), config).unwrap();
        loaded(&mut engine, "p1");
        loaded(&mut engine, "p2");

        assert_eq!(engine.nuke(HostTime(5), ["unknown"]), 0);
        assert_eq!(engine.nuke(HostTime(5), ["p1"]), 1);
        assert_eq!(engine.nuke(HostTime(5), ["p1"]), 0);
        assert!(engine.host().window_listeners(), "p2 still rendered");
        assert_eq!(engine.nuke(HostTime(6), core::iter::empty::<&str>()), 1);
        assert!(engine.snapshots().is_empty());
        assert!(!engine.host().window_listeners());
        assert!(engine.host().element_by_id("slot").is_some());
        assert!(engine.host().element_by_id("slot2").is_some());
    }

    #[test]
    fn rerender_replaces_live_position() {
        let (mut engine, _) = engine_with(page(), p1());
        loaded(&mut engine, "p1");
        let first = frame_of(&engine, "p1");
        engine
            .render(HostTime(10), Position::source("p1", "https://ads.example/c.html"))
            .unwrap();
        assert_ne!(frame_of(&engine, "p1"), first);
        assert_eq!(engine.snapshots().len(), 1);
        assert!(!engine.host().is_attached(first));
        let payload = Record::decode(&engine.host().mounts()[1].name);
        assert_eq!(payload.get("src"), Some("https://ads.example/c.html"));
    }

    #[test]
    fn configure_replaces_and_nukes() {
        let (mut engine, _) = engine_with(page(), p1());
        loaded(&mut engine, "p1");
        let zero = Configuration::new(RENDER_FILE).unwrap().with_timeout(Duration::ZERO);
        assert_eq!(engine.configure(HostTime(5), zero), Err(ConfigError::ZeroTimeout));
        assert!(engine.get("p1").is_some(), "invalid config changes nothing");

        let next = Configuration::new(RENDER_FILE).unwrap().with_position(p1());
        engine.configure(HostTime(6), next).unwrap();
        assert!(engine.get("p1").is_none());
    }

    #[test]
    fn render_failures_are_reported() {
        let mut engine = Engine::new(page());
        assert_eq!(
            engine.render(HostTime(0), Position::markup("p1", "x")),
            Err(ConfigError::NotConfigured)
        );

        let (mut engine, hooks) = engine_with(page(), p1());
        let err = engine
            .render(HostTime(0), Position::markup("p9", "x"))
            .unwrap_err();
        assert_eq!(err, ConfigError::UnknownPosition("p9".into()));
        assert!(matches!(&hooks.calls()[0], HookCall::Failure { position, .. } if position == "p9"));
        assert_eq!(engine.errors().latest().unwrap().kind, ErrorKind::InvalidConfig);

        let inline = PositionConfig::new("p9", "missing", 10.0, 10.0).unwrap();
        let err = engine
            .render(HostTime(0), Position::markup("p9", "x").with_config(inline))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::DestinationNotFound {
                id: "p9".into(),
                destination: "missing".into(),
            }
        );
        assert!(!engine.host().message_listener());
    }

    #[test]
    fn proxy_transport_without_native_messaging() {
        let mut host = page();
        host.set_capabilities(PlatformCapabilities {
            native_messaging: false,
            ..PlatformCapabilities::default()
        });
        let config = Configuration::new(RENDER_FILE)
            .unwrap()
            .with_msg_file("https://host.example/sf/msg.html")
            .with_position(p1());
        let mut engine = Engine::new(host);
        engine.configure(HostTime(0), config).unwrap();
        loaded(&mut engine, "p1");
        assert_eq!(engine.transport(), Transport::Proxy);
        assert!(engine.send_message(HostTime(5), "p1", "hi"));
        run_until(&mut engine, HostTime(5));
        let proxied = engine.host_mut().take_proxied();
        assert_eq!(proxied.len(), 1);
        assert_eq!(proxied[0].proxy_url, "https://host.example/sf/msg.html");
        assert_eq!(Record::decode(&proxied[0].payload).get("msg"), Some("hi"));
    }

    #[test]
    fn dispose_detaches_everything() {
        let (mut engine, _) = engine_with(page(), p1());
        loaded(&mut engine, "p1");
        engine.on_scroll(HostTime(5));
        engine.dispose(HostTime(6));
        assert!(engine.snapshots().is_empty());
        assert!(!engine.host().message_listener());
        assert!(!engine.host().window_listeners());
        assert_eq!(engine.next_deadline(), None);
        assert!(!engine.send_message(HostTime(7), "p1", "late"));
    }

    #[test]
    fn discovered_positions_render() {
        let (mut engine, _) = engine_with(page(), p1());
        let found = DiscoveredPosition {
            id: "p1".into(),
            markup: Some("<b>hi</b>".into()),
            ..DiscoveredPosition::default()
        };
        assert!(engine.render_discovered(HostTime(0), found).is_ok());
        let empty = DiscoveredPosition {
            id: "p1".into(),
            ..DiscoveredPosition::default()
        };
        assert!(matches!(
            engine.render_discovered(HostTime(0), empty),
            Err(ConfigError::MissingContent { .. })
        ));
    }
}
