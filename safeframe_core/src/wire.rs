// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Wire format shared by the host and content frames.
//!
//! A message is a flat [`Record`]: string keys mapped to string values,
//! serialized as `key=value` pairs joined by `&`. Keys and values are
//! percent-encoded, so values may themselves contain encoded records (the
//! geometry envelope travels that way).
//!
//! Every inbound message must carry:
//!
//! | key    | meaning                                    |
//! |--------|--------------------------------------------|
//! | `pos`  | position id                                |
//! | `cmd`  | one of the [`Command`] verbs               |
//! | `guid` | the channel's session token                |
//!
//! [`Message::parse`] enforces those requirements; anything else is a
//! [`ProtocolError`] and the message is dropped by the caller.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

use crate::coerce;

/// Required key: position id.
pub const KEY_POS: &str = "pos";
/// Required key: command verb.
pub const KEY_CMD: &str = "cmd";
/// Required key: channel session token.
pub const KEY_GUID: &str = "guid";
/// Serialized [`ExpansionEnvelope`](crate::geometry::ExpansionEnvelope).
pub const KEY_GEOM: &str = "geom";

/// A flat, ordered key/value record.
///
/// Keys are kept sorted so that encoding is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Record {
    fields: BTreeMap<String, String>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a field, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts a number using the shortest round-tripping representation
    /// (`50`, not `50.0`).
    pub fn insert_num(&mut self, key: impl Into<String>, value: f64) {
        self.insert(key, format_num(value));
    }

    /// Inserts a nested record as an encoded value.
    pub fn insert_record(&mut self, key: impl Into<String>, nested: &Self) {
        self.insert(key, nested.encode());
    }

    /// Returns the value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Returns the value for `key` coerced to a number, clamped to
    /// `[min, max]`.
    #[must_use]
    pub fn num(&self, key: &str, default: f64, min: f64, max: f64) -> f64 {
        coerce::to_num(self.get(key), default, min, max)
    }

    /// Decodes the value for `key` as a nested record.
    ///
    /// A missing key yields `None`; a malformed value yields whatever pairs
    /// could be recovered.
    #[must_use]
    pub fn record(&self, key: &str) -> Option<Self> {
        self.get(key).map(Self::decode)
    }

    /// Removes and returns the value for `key`.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.fields.remove(key)
    }

    /// Returns whether `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns whether the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over fields in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.fields.iter()
    }

    /// Serializes the record as percent-encoded `key=value&...`.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.fields {
            if !out.is_empty() {
                out.push('&');
            }
            out.push_str(&urlencoding::encode(key));
            out.push('=');
            out.push_str(&urlencoding::encode(value));
        }
        out
    }

    /// Parses a record from its encoded form.
    ///
    /// Decoding never fails. Pairs without `=` or with an empty key are
    /// skipped, and a component with an invalid escape sequence is kept as
    /// raw text. When a key repeats, the last value wins.
    #[must_use]
    pub fn decode(input: &str) -> Self {
        let mut record = Self::new();
        for pair in input.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let key = unescape(key);
            if key.is_empty() {
                continue;
            }
            record.insert(key, unescape(value));
        }
        record
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}

fn unescape(component: &str) -> String {
    urlencoding::decode(component).map_or_else(|_| component.to_owned(), |s| s.into_owned())
}

/// Formats a number without a trailing `.0` for integral values.
#[must_use]
pub fn format_num(value: f64) -> String {
    if value.is_finite() {
        format!("{value}")
    } else {
        "0".to_owned()
    }
}

/// Command verbs exchanged between host and frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    /// Frame asks to expand over host content (`exp-ovr`).
    ExpandOverlay,
    /// Frame asks to expand and push host content aside (`exp-push`).
    ExpandPush,
    /// Frame asks to collapse, or host confirms a frame-initiated collapse.
    Collapse,
    /// Host reports a host-initiated collapse.
    Collapsed,
    /// Free-form message.
    Msg,
    /// Frame reports an error.
    Error,
    /// Geometry refresh request or push.
    GeomUpdate,
    /// Frame asks to read a host cookie.
    ReadCookie,
    /// Frame asks to write a host cookie.
    WriteCookie,
    /// Host acknowledges an expansion (outbound only).
    Expand,
    /// Host reports a focus change (outbound only).
    FocusChange,
}

impl Command {
    /// Parses a wire verb.
    #[must_use]
    pub fn parse(verb: &str) -> Option<Self> {
        Some(match verb {
            "exp-ovr" => Self::ExpandOverlay,
            "exp-push" => Self::ExpandPush,
            "collapse" => Self::Collapse,
            "collapsed" => Self::Collapsed,
            "msg" => Self::Msg,
            "error" => Self::Error,
            "geom-update" => Self::GeomUpdate,
            "read-cookie" => Self::ReadCookie,
            "write-cookie" => Self::WriteCookie,
            "expand" => Self::Expand,
            "focus-change" => Self::FocusChange,
            _ => return None,
        })
    }

    /// Returns the wire verb.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExpandOverlay => "exp-ovr",
            Self::ExpandPush => "exp-push",
            Self::Collapse => "collapse",
            Self::Collapsed => "collapsed",
            Self::Msg => "msg",
            Self::Error => "error",
            Self::GeomUpdate => "geom-update",
            Self::ReadCookie => "read-cookie",
            Self::WriteCookie => "write-cookie",
            Self::Expand => "expand",
            Self::FocusChange => "focus-change",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons an inbound payload is not a valid message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    /// A required key is missing or empty.
    MissingField(&'static str),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(key) => write!(f, "message is missing required field `{key}`"),
        }
    }
}

impl core::error::Error for ProtocolError {}

/// A structurally valid inbound message.
///
/// The verb is kept raw so that unknown verbs can still be traced before they
/// are ignored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Position id (`pos`).
    pub pos: String,
    /// Raw command verb (`cmd`).
    pub verb: String,
    /// Channel session token (`guid`).
    pub guid: String,
    /// All fields, including the required ones.
    pub record: Record,
}

impl Message {
    /// Decodes and validates an inbound payload.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingField`] if `pos`, `cmd`, or `guid` is
    /// absent or empty.
    pub fn parse(payload: &str) -> Result<Self, ProtocolError> {
        Self::from_record(Record::decode(payload))
    }

    /// Validates an already decoded record.
    ///
    /// # Errors
    ///
    /// See [`parse`](Self::parse).
    pub fn from_record(record: Record) -> Result<Self, ProtocolError> {
        let required = |key: &'static str, trim: bool| {
            record
                .get(key)
                .map(|v| if trim { v.trim() } else { v })
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
                .ok_or(ProtocolError::MissingField(key))
        };
        let pos = required(KEY_POS, true)?;
        let verb = required(KEY_CMD, true)?;
        // The guid is a secret and is compared byte for byte.
        let guid = required(KEY_GUID, false)?;
        Ok(Self {
            pos,
            verb,
            guid,
            record,
        })
    }

    /// Returns the parsed command, or `None` for an unknown verb.
    #[must_use]
    pub fn command(&self) -> Option<Command> {
        Command::parse(&self.verb)
    }
}
