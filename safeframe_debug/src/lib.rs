// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pretty-printing and JSON journal export for safeframe diagnostics.
//!
//! This crate provides [`TraceSink`](safeframe_core::trace::TraceSink)
//! implementations for development and post-mortem analysis:
//!
//! - [`pretty::PrettyPrintSink`]: human-readable one-line-per-event output.
//! - [`journal::JournalSink`]: events kept as JSON objects and written out
//!   as one JSON array with [`journal::JournalSink::export`].

pub mod journal;
pub mod pretty;
