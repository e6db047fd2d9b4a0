// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simulated host page that exercises the tracing and diagnostics pipeline.
//!
//! Renders two positions into a scripted [`SimHost`], lets one of them time
//! out, drives the other through load, expansion, a page scroll, a host
//! message, and a collapse, then tears everything down. Events go to both a
//! [`PrettyPrintSink`] on stderr and a [`JournalSink`], which is exported as
//! JSON to `trace.json`.

use std::cell::RefCell;
use std::fs::File;
use std::io::BufWriter;
use std::rc::Rc;

use kurbo::{Rect, Size, Vec2};

use safeframe_core::Engine;
use safeframe_core::config::{Configuration, PositionConfig};
use safeframe_core::platform::Host;
use safeframe_core::position::Position;
use safeframe_core::sim::{RecordingHooks, SimHost};
use safeframe_core::time::{Duration, HostTime};
use safeframe_core::trace::{
    CommandEvent, ErrorEvent, GeometryEvent, ListenerEvent, MessageEvent, NukeEvent, RenderEvent,
    SendEvent, TraceSink,
};
use safeframe_core::wire::Record;

use safeframe_debug::journal::JournalSink;
use safeframe_debug::pretty::PrettyPrintSink;

const RENDER_FILE: &str = "https://frames.example/sf/render.html";
const RENDER_TIMEOUT: Duration = Duration(3_000);

/// Forwards every event to a pretty printer and a shared journal.
struct Tee {
    pretty: PrettyPrintSink,
    journal: Rc<RefCell<JournalSink>>,
}

macro_rules! tee {
    ($($name:ident: $event:ident),* $(,)?) => {
        $(
            fn $name(&mut self, e: &$event<'_>) {
                self.pretty.$name(e);
                self.journal.borrow_mut().$name(e);
            }
        )*
    };
}

impl TraceSink for Tee {
    tee! {
        on_render: RenderEvent,
        on_nuke: NukeEvent,
        on_message: MessageEvent,
        on_command: CommandEvent,
        on_send: SendEvent,
        on_geometry: GeometryEvent,
        on_error: ErrorEvent,
        on_listener: ListenerEvent,
    }
}

fn page() -> SimHost {
    let mut host = SimHost::new(Size::new(1280.0, 800.0));
    let root = host.root();
    host.add_element(root, Some("top"), Rect::new(140.0, 20.0, 868.0, 110.0));
    host.add_element(root, Some("rail"), Rect::new(960.0, 200.0, 1260.0, 450.0));
    host
}

/// Runs every timer due at or before `now`.
fn run_until(engine: &mut Engine<SimHost>, now: HostTime) {
    while engine.next_deadline().is_some_and(|d| d <= now) {
        engine.on_timer(now);
    }
}

/// Sends `body` to the engine as if it came from position `id`'s frame.
fn from_frame(engine: &mut Engine<SimHost>, now: HostTime, id: &str, body: &str) -> bool {
    let guid = engine
        .host()
        .mounts()
        .iter()
        .rev()
        .find(|spec| spec.position_id == id)
        .and_then(|spec| Record::decode(&spec.name).get("guid").map(str::to_owned))
        .unwrap_or_default();
    let window = engine
        .host()
        .element_by_id(&format!("{id}_frame"))
        .and_then(|frame| engine.host().frame_window(&frame));
    let payload = format!("pos={id}&guid={guid}&{body}");
    engine.on_message(now, &payload, window.as_ref())
}

fn main() {
    let journal = Rc::new(RefCell::new(JournalSink::new()));
    let hooks = RecordingHooks::new();

    let config = Configuration::new(RENDER_FILE)
        .expect("valid render file")
        .with_timeout(RENDER_TIMEOUT)
        .with_hooks(hooks.clone())
        .with_position(PositionConfig::new("leaderboard", "top", 728.0, 90.0).expect("valid size"))
        .with_position(PositionConfig::new("rail", "rail", 300.0, 250.0).expect("valid size"));

    let mut engine = Engine::new(page());
    engine.set_trace_sink(Some(Box::new(Tee {
        pretty: PrettyPrintSink::stderr(),
        journal: Rc::clone(&journal),
    })));
    engine
        .configure(HostTime(0), config)
        .expect("configuration accepted");

    // -- render ------------------------------------------------------------
    let mut now = HostTime(10);
    for (id, markup) in [("leaderboard", "<a href=#>lb</a>"), ("rail", "<div>rail</div>")] {
        engine
            .render(now, Position::markup(id, markup))
            .expect("render starts");
    }
    for probe in engine.host_mut().take_self_posts() {
        engine.on_message(now, &probe, None);
    }

    // Only the rail frame ever loads; the leaderboard times out.
    now = HostTime(250);
    engine.on_frame_loaded(now, "rail");
    run_until(&mut engine, now);

    // -- commands from the rail frame --------------------------------------
    now = HostTime(1_000);
    from_frame(&mut engine, now, "rail", "cmd=geom-update");
    from_frame(&mut engine, now, "rail", "cmd=exp-ovr&l=300&b=150");
    run_until(&mut engine, now);
    let posted = engine.host_mut().take_posted().len();
    println!("rail is {}; {posted} replies sent", engine.status());

    // -- page scroll while expanded ----------------------------------------
    now = HostTime(1_500);
    engine.host_mut().scroll_to(Vec2::new(0.0, 180.0));
    engine.on_scroll(now);
    run_until(&mut engine, HostTime(5_000));

    // -- host side ---------------------------------------------------------
    now = HostTime(5_100);
    engine.send_message(now, "rail", "hello from the host");
    engine.collapse(now, "rail");
    run_until(&mut engine, now);

    if let Some(rail) = engine.get("rail") {
        println!("rail: {:?} at {}x{}", rail.status, rail.size.width, rail.size.height);
    }
    println!(
        "leaderboard timed out: {}",
        hooks.pos_msg_count("leaderboard", "render-timeout") == 1
    );

    now = HostTime(6_000);
    let removed = engine.nuke(now, std::iter::empty::<&str>());
    println!("nuked {removed} position(s); {} error(s) logged", engine.errors().len());

    // Flush the pretty printer and release the journal handle.
    drop(engine.set_trace_sink(None));

    // -- export ------------------------------------------------------------
    let path = "trace.json";
    let file = File::create(path).expect("failed to create trace.json");
    let mut writer = BufWriter::new(file);
    let journal = journal.borrow();
    journal
        .export(&mut writer)
        .expect("failed to write trace journal");
    println!("Wrote {path} ({} events)", journal.len());
}
