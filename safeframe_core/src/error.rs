// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error taxonomy, the bounded error log, and configuration errors.
//!
//! Nothing the engine does at runtime is fatal to the host page. Failures
//! are classified by [`ErrorKind`] and either stored in the engine-owned
//! [`ErrorLog`] or reported only to the trace sink:
//!
//! | kind                  | stored | typical cause                          |
//! |-----------------------|--------|----------------------------------------|
//! | `Timeout`             | yes    | frame never signalled load             |
//! | `CallbackFailure`     | yes    | a host hook returned an error          |
//! | `InvalidConfig`       | yes    | render without a usable configuration  |
//! | `FrameReported`       | yes    | frame sent an `error` command          |
//! | `ProtocolViolation`   | no     | bad GUID, wrong sender, malformed data |
//! | `CapabilityDenied`    | no     | command for an undeclared capability   |
//! | `GeometryReadFailure` | no     | detached or cross-origin node          |
//!
//! Protocol drops and denials never reach the log so that a hostile frame
//! cannot flood it.

use std::collections::VecDeque;
use std::fmt;

use crate::time::HostTime;

/// Classification of runtime failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A render did not complete within the configured timeout.
    Timeout,
    /// An inbound message failed validation and was dropped.
    ProtocolViolation,
    /// A command required a capability the position does not declare.
    CapabilityDenied,
    /// A DOM read failed; geometry degraded to zero.
    GeometryReadFailure,
    /// A host hook failed; processing continued.
    CallbackFailure,
    /// A render or configure call was rejected.
    InvalidConfig,
    /// A content frame reported an error of its own.
    FrameReported,
}

impl ErrorKind {
    /// Whether failures of this kind are stored in the [`ErrorLog`].
    #[must_use]
    pub const fn is_logged(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::CallbackFailure | Self::InvalidConfig | Self::FrameReported
        )
    }

    /// Short stable name, used by trace sinks.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ProtocolViolation => "protocol-violation",
            Self::CapabilityDenied => "capability-denied",
            Self::GeometryReadFailure => "geometry-read-failure",
            Self::CallbackFailure => "callback-failure",
            Self::InvalidConfig => "invalid-config",
            Self::FrameReported => "frame-reported",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorEntry {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Affected position, if any.
    pub position: Option<String>,
    /// Human-readable detail.
    pub message: String,
    /// When it was recorded.
    pub at: HostTime,
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.position {
            Some(pos) => write!(f, "[{}] {pos}: {}", self.kind, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// Bounded FIFO of [`ErrorEntry`] values.
///
/// When full, the oldest entry is evicted.
#[derive(Clone, Debug)]
pub struct ErrorLog {
    entries: VecDeque<ErrorEntry>,
    capacity: usize,
    evicted: u64,
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

impl ErrorLog {
    /// Default number of retained entries.
    pub const DEFAULT_CAPACITY: usize = 256;

    /// Creates a log that retains at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    /// Appends an entry, evicting the oldest one when full.
    pub fn push(&mut self, entry: ErrorEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.evicted += 1;
        }
        self.entries.push_back(entry);
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &ErrorEntry> {
        self.entries.iter()
    }

    /// The most recent entry.
    #[must_use]
    pub fn latest(&self) -> Option<&ErrorEntry> {
        self.entries.back()
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries dropped because the log was full.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Errors from validating a [`Configuration`](crate::config::Configuration)
/// or [`PositionConfig`](crate::config::PositionConfig).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The position has no destination element id.
    MissingDestination {
        /// Position id.
        id: String,
    },
    /// A width or height is not a positive pixel value.
    InvalidDimension {
        /// `"width"` or `"height"`.
        field: &'static str,
        /// The rejected input.
        value: String,
    },
    /// A width or height uses a relative unit (`%`, `em`, ...).
    RelativeUnit {
        /// `"width"` or `"height"`.
        field: &'static str,
        /// The rejected input.
        value: String,
    },
    /// A `size` shorthand is not of the form `WIDTHxHEIGHT`.
    InvalidSize(String),
    /// The render template reference is not an absolute URL.
    InvalidRenderFile(String),
    /// The render timeout is zero.
    ZeroTimeout,
    /// Render was called before any configuration was supplied.
    NotConfigured,
    /// No position configuration exists for the id.
    UnknownPosition(String),
    /// A position has neither markup nor a source URL.
    MissingContent {
        /// Position id.
        id: String,
    },
    /// The destination element is not in the document.
    DestinationNotFound {
        /// Position id.
        id: String,
        /// Destination element id.
        destination: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDestination { id } => {
                write!(f, "position `{id}` has no destination element id")
            }
            Self::InvalidDimension { field, value } => {
                write!(f, "{field} `{value}` is not a positive pixel length")
            }
            Self::RelativeUnit { field, value } => {
                write!(f, "{field} `{value}` uses a relative unit; only pixels are supported")
            }
            Self::InvalidSize(value) => write!(f, "size `{value}` is not of the form WxH"),
            Self::InvalidRenderFile(value) => {
                write!(f, "render file `{value}` is not an absolute URL")
            }
            Self::ZeroTimeout => f.write_str("render timeout must be greater than zero"),
            Self::NotConfigured => f.write_str("no configuration has been supplied"),
            Self::UnknownPosition(id) => write!(f, "no configuration for position `{id}`"),
            Self::MissingContent { id } => write!(f, "position `{id}` has no markup or source"),
            Self::DestinationNotFound { id, destination } => {
                write!(f, "destination `{destination}` of position `{id}` not found")
            }
        }
    }
}

impl core::error::Error for ConfigError {}
