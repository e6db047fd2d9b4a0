// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Event-loop driver.
//!
//! [`Driver`] owns the [`Engine`] and the JS closures that feed it: the
//! window `message`, `scroll`, `resize`, `focus`, and `blur` listeners, the
//! per-element `scroll` listener, the frame `load` listener, and one
//! `setTimeout` callback. After every call into the engine the driver reads
//! [`Engine::next_deadline`] and keeps exactly one host timer armed for it.
//!
//! Closures hold a `Weak` reference to the driver state, so dropping the
//! [`Driver`] tears everything down even while listeners are still attached.
//! Events that arrive while the engine is already borrowed (from inside a
//! hook, say) are dropped.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use web_sys::{Element, Event, MessageEvent};

use safeframe_core::config::Configuration;
use safeframe_core::position::{Position, PositionKey, RenderedSnapshot};
use safeframe_core::scheduler::SchedulerConfig;
use safeframe_core::time::HostTime;
use safeframe_core::trace::TraceSink;
use safeframe_core::{Engine, EngineStatus};

use crate::host::{Callbacks, POSITION_ATTR, WebHost};
use crate::{BackendError, now};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_name = "setTimeout")]
    fn set_timeout(callback: &JsValue, ms: i32) -> i32;

    #[wasm_bindgen(js_name = "clearTimeout")]
    fn clear_timeout(id: i32);
}

type EventClosure = Closure<dyn FnMut(Event)>;
type TimerClosure = Closure<dyn FnMut()>;

struct Inner {
    engine: RefCell<Engine<WebHost>>,

    /// Event listener closures; their JS handles live in the host.
    listeners: RefCell<Vec<EventClosure>>,

    /// The `setTimeout` callback, shared by every arming.
    timer: RefCell<Option<TimerClosure>>,

    /// The pending `setTimeout` id and the deadline it was armed for.
    armed: Cell<Option<(i32, HostTime)>>,
}

/// Milliseconds to wait for `deadline`, clamped to what `setTimeout` takes.
pub(crate) fn delay_ms(deadline: HostTime, now: HostTime) -> i32 {
    i32::try_from(deadline.saturating_duration_since(now).millis()).unwrap_or(i32::MAX)
}

impl Inner {
    /// Runs `f` on the engine and re-arms the host timer.
    ///
    /// Returns `None` if the engine is already borrowed.
    fn call<T>(&self, f: impl FnOnce(&mut Engine<WebHost>, HostTime) -> T) -> Option<T> {
        let result = {
            let mut engine = self.engine.try_borrow_mut().ok()?;
            f(&mut engine, now())
        };
        self.rearm();
        Some(result)
    }

    fn rearm(&self) {
        let Ok(engine) = self.engine.try_borrow() else {
            return;
        };
        let deadline = engine.next_deadline();
        drop(engine);

        let current = self.armed.get();
        if current.map(|(_, at)| at) == deadline {
            return;
        }
        if let Some((id, _)) = current {
            clear_timeout(id);
        }
        self.armed.set(None);
        let Some(deadline) = deadline else {
            return;
        };
        if let Some(ref closure) = *self.timer.borrow() {
            let id = set_timeout(closure.as_ref().unchecked_ref(), delay_ms(deadline, now()));
            self.armed.set(Some((id, deadline)));
        }
    }

    fn fire_timer(&self) {
        self.armed.set(None);
        self.call(|engine, now| engine.on_timer(now));
    }
}

/// Owns the engine and wires it to the browser event loop.
///
/// Create with [`Driver::new`], then [`configure`](Self::configure) and
/// [`render`](Self::render). Dropping the driver disposes every position
/// and detaches every listener.
pub struct Driver {
    inner: Rc<Inner>,
}

fn listener(
    weak: &Weak<Inner>,
    f: impl Fn(&mut Engine<WebHost>, HostTime, &Event) + 'static,
) -> EventClosure {
    let weak = weak.clone();
    Closure::wrap(Box::new(move |event: Event| {
        if let Some(inner) = weak.upgrade() {
            inner.call(|engine, now| f(engine, now, &event));
        }
    }) as Box<dyn FnMut(Event)>)
}

fn on_message(engine: &mut Engine<WebHost>, now: HostTime, event: &Event) {
    let Some(message) = event.dyn_ref::<MessageEvent>() else {
        return;
    };
    let Some(payload) = message.data().as_string() else {
        return;
    };
    let source = message.source().map(JsValue::from);
    if engine.on_message(now, &payload, source.as_ref()) {
        event.stop_propagation();
    }
}

fn on_element_scroll(engine: &mut Engine<WebHost>, now: HostTime, event: &Event) {
    if let Some(element) = event.current_target().and_then(|t| t.dyn_into::<Element>().ok()) {
        engine.on_element_scroll(now, &element);
    }
}

fn on_frame_load(engine: &mut Engine<WebHost>, now: HostTime, event: &Event) {
    let id = event
        .current_target()
        .and_then(|t| t.dyn_into::<Element>().ok())
        .and_then(|frame| frame.get_attribute(POSITION_ATTR));
    if let Some(id) = id {
        engine.on_frame_loaded(now, &id);
    }
}

impl Driver {
    /// Binds to the current page with the web debounce delays.
    ///
    /// # Errors
    ///
    /// Any error from [`WebHost::new`].
    pub fn new() -> Result<Self, BackendError> {
        Self::with_scheduler(SchedulerConfig::web())
    }

    /// Binds to the current page with the given debounce delays.
    ///
    /// # Errors
    ///
    /// Any error from [`WebHost::new`].
    pub fn with_scheduler(scheduler: SchedulerConfig) -> Result<Self, BackendError> {
        let host = WebHost::new()?;
        let inner = Rc::new(Inner {
            engine: RefCell::new(Engine::with_scheduler(host, scheduler)),
            listeners: RefCell::new(Vec::new()),
            timer: RefCell::new(None),
            armed: Cell::new(None),
        });
        let weak = Rc::downgrade(&inner);

        let closures = [
            listener(&weak, on_message),
            listener(&weak, |engine, now, _| engine.on_scroll(now)),
            listener(&weak, |engine, now, _| engine.on_resize(now)),
            listener(&weak, |engine, now, _| engine.on_focus_change(now, true)),
            listener(&weak, |engine, now, _| engine.on_focus_change(now, false)),
            listener(&weak, on_element_scroll),
            listener(&weak, on_frame_load),
        ];
        let handle = |i: usize| -> js_sys::Function {
            closures[i].as_ref().unchecked_ref::<js_sys::Function>().clone()
        };
        let callbacks = Callbacks {
            message: handle(0),
            scroll: handle(1),
            resize: handle(2),
            focus: handle(3),
            blur: handle(4),
            element_scroll: handle(5),
            frame_load: handle(6),
        };
        inner.engine.borrow_mut().host_mut().install(callbacks);
        inner.listeners.borrow_mut().extend(closures);

        let timer_weak = weak.clone();
        let timer = Closure::wrap(Box::new(move || {
            if let Some(inner) = timer_weak.upgrade() {
                inner.fire_timer();
            }
        }) as Box<dyn FnMut()>);
        *inner.timer.borrow_mut() = Some(timer);

        Ok(Self { inner })
    }

    /// Runs `f` with the engine and the current time, then re-arms the timer.
    ///
    /// # Errors
    ///
    /// [`BackendError::Busy`] when called from inside an engine callback.
    pub fn with_engine<T>(
        &self,
        f: impl FnOnce(&mut Engine<WebHost>, HostTime) -> T,
    ) -> Result<T, BackendError> {
        self.inner.call(f).ok_or(BackendError::Busy)
    }

    /// Installs a configuration. See [`Engine::configure`].
    ///
    /// # Errors
    ///
    /// [`BackendError::Config`] for an invalid configuration.
    pub fn configure(&self, config: Configuration) -> Result<(), BackendError> {
        self.with_engine(|engine, now| engine.configure(now, config))?
            .map_err(BackendError::from)
    }

    /// Renders a position. See [`Engine::render`].
    ///
    /// # Errors
    ///
    /// [`BackendError::Config`] if the render could not start.
    pub fn render(&self, position: Position) -> Result<PositionKey, BackendError> {
        self.with_engine(|engine, now| engine.render(now, position))?
            .map_err(BackendError::from)
    }

    /// Tears down positions; all of them when `ids` is empty.
    ///
    /// # Errors
    ///
    /// [`BackendError::Busy`] when called from inside an engine callback.
    pub fn nuke(&self, ids: &[&str]) -> Result<usize, BackendError> {
        self.with_engine(|engine, now| engine.nuke(now, ids.iter().copied()))
    }

    /// Collapses an expanded position from the host side.
    ///
    /// # Errors
    ///
    /// [`BackendError::Busy`] when called from inside an engine callback.
    pub fn collapse(&self, id: &str) -> Result<bool, BackendError> {
        self.with_engine(|engine, now| engine.collapse(now, id))
    }

    /// Sends a host message down to a loaded frame.
    ///
    /// # Errors
    ///
    /// [`BackendError::Busy`] when called from inside an engine callback.
    pub fn send_message(&self, id: &str, text: &str) -> Result<bool, BackendError> {
        self.with_engine(|engine, now| engine.send_message(now, id, text))
    }

    /// A snapshot of position `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<RenderedSnapshot> {
        self.inner.engine.try_borrow().ok()?.get(id)
    }

    /// What the engine is doing; idle while the engine is borrowed.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        self.inner
            .engine
            .try_borrow()
            .map_or(EngineStatus::Idle, |engine| engine.status())
    }

    /// Installs a trace sink and returns the previous one.
    ///
    /// # Errors
    ///
    /// [`BackendError::Busy`] when called from inside an engine callback.
    pub fn set_trace_sink(
        &self,
        sink: Option<Box<dyn TraceSink>>,
    ) -> Result<Option<Box<dyn TraceSink>>, BackendError> {
        self.with_engine(|engine, _| engine.set_trace_sink(sink))
    }

    /// Whether a host timer is pending.
    #[must_use]
    pub fn timer_armed(&self) -> bool {
        self.inner.armed.get().is_some()
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        if let Ok(mut engine) = self.inner.engine.try_borrow_mut() {
            engine.dispose(now());
        }
        if let Some((id, _)) = self.inner.armed.take() {
            clear_timeout(id);
        }
        // Drop the JS closures so they don't leak.
        self.inner.timer.borrow_mut().take();
        self.inner.listeners.borrow_mut().clear();
    }
}

impl core::fmt::Debug for Driver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Driver")
            .field("engine", &self.inner.engine)
            .field("armed", &self.inner.armed.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_is_clamped() {
        assert_eq!(delay_ms(HostTime(1_750), HostTime(1_000)), 750);
        assert_eq!(delay_ms(HostTime(10), HostTime(20)), 0, "overdue fires at once");
        assert_eq!(delay_ms(HostTime(u64::MAX), HostTime(0)), i32::MAX);
    }
}
