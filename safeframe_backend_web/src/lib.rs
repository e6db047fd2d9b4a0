// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Web backend for safeframe.
//!
//! This crate provides integration with browser APIs:
//!
//! - [`WebHost`]: the live DOM as a [`Host`](safeframe_core::platform::Host)
//!   (layout reads, frame mounting, `postMessage`, cookies)
//! - [`Driver`]: event listeners and a single re-armed `setTimeout` feeding
//!   the [`Engine`](safeframe_core::Engine)
//!
//! It only does useful work on `wasm32-unknown-unknown` in a browser main
//! thread.

mod driver;
mod host;

use core::fmt;

use wasm_bindgen::prelude::*;

pub use driver::Driver;
pub use host::{POSITION_ATTR, WebHost};

use safeframe_core::error::ConfigError;
use safeframe_core::time::HostTime;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = performance, js_name = "now")]
    fn performance_now() -> f64;
}

/// Returns the current host time from `performance.now()`, in milliseconds.
#[must_use]
pub fn now() -> HostTime {
    millis_to_host_time(performance_now())
}

pub(crate) fn millis_to_host_time(ms: f64) -> HostTime {
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "performance.now() returns a small positive f64; NaN and negatives saturate to 0"
    )]
    let ms = ms as u64;
    HostTime(ms)
}

/// Errors from the web backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendError {
    /// No global `window` (not running in a browser main thread).
    NoWindow,
    /// The window has no document, or the document has no root element.
    NoDocument,
    /// The engine is in use; the call came from inside an engine callback.
    Busy,
    /// The engine rejected a configuration or render.
    Config(ConfigError),
}

impl From<ConfigError> for BackendError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoWindow => f.write_str("no global window"),
            Self::NoDocument => f.write_str("window has no document"),
            Self::Busy => f.write_str("engine is busy"),
            Self::Config(err) => write!(f, "configuration error: {err}"),
        }
    }
}

impl core::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            _ => None,
        }
    }
}
