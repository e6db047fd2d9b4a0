// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host-side engine for sandboxed cross-origin content frames.
//!
//! `safeframe_core` renders third-party content into isolated frames placed
//! over host-page destination elements, validates the commands those frames
//! send back, applies expansions and collapses, and keeps every frame
//! informed of its geometry as the page scrolls and resizes. It does not
//! touch a real DOM: a backend implements the [`Host`](platform::Host)
//! trait and drives the [`Engine`] with events and timer firings.
//!
//! # Architecture
//!
//! ```text
//!   Backend (DOM events, setTimeout)
//!       │
//!       ▼
//!   Engine::on_message ──► ChannelRegistry::receive ──► dispatch
//!       │                                                 │
//!       │                  plan_expand / plan_collapse ◄──┘
//!       ▼                              │
//!   Engine::on_timer ◄── TimerQueue ◄──┴── outbox (deferred send)
//!       │
//!       ▼
//!   bounds_of ──► ExpansionEnvelope ──► geom-update to the frame
//! ```
//!
//! **[`engine`]**: The [`Engine`]: render lifecycle, command dispatch,
//! update loop, and deferred outbound queue.
//!
//! **[`config`]**: Engine-wide [`Configuration`](config::Configuration) and
//! per-position [`PositionConfig`](config::PositionConfig) with capabilities.
//!
//! **[`position`]**: Position content, lifecycle status, and the
//! generational [`PositionStore`](position::PositionStore).
//!
//! **[`channel`]**: Per-frame channels with GUID and sender validation, and
//! the native/proxy transport choice.
//!
//! **[`command`]**: Expand and collapse planning.
//!
//! **[`geometry`]**: Clipping-aware bounds, expansion room, visibility
//! ratios, and the grid-sampled occlusion estimate.
//!
//! **[`scheduler`]** and **[`timer`]**: Debounced scroll, resize, and focus
//! updates over a deadline-ordered timer queue.
//!
//! **[`wire`]**: The URL-encoded key/value record format.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types,
//! with a zero-overhead [`Tracer`](trace::Tracer) wrapper.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).
//! - `sim` (disabled by default): Exposes the in-memory [`sim`] host for
//!   demos and downstream tests.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod channel;
pub mod coerce;
pub mod command;
pub mod config;
pub mod cookie;
pub mod dirty;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod hooks;
pub mod metadata;
pub mod platform;
pub mod position;
pub mod scheduler;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod time;
pub mod timer;
pub mod trace;
pub mod wire;

pub use engine::{Engine, EngineStatus};
