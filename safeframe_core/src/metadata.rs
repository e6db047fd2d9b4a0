// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Position metadata.
//!
//! Metadata is a set of shared key/value pairs visible to every consumer,
//! plus at most one private set owned by a named namespace. It is fixed at
//! construction; there are no mutators.
//!
//! On the wire (the `meta` field of the construction payload) it is a record
//! with up to three nested fields:
//!
//! | key       | value                           |
//! |-----------|---------------------------------|
//! | `shared`  | encoded record of shared pairs  |
//! | `owner`   | private namespace               |
//! | `private` | encoded record of private pairs |

use crate::wire::Record;

/// Immutable metadata attached to a [`Position`](crate::position::Position).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PositionMetadata {
    shared: Record,
    private: Option<(String, Record)>,
}

impl PositionMetadata {
    /// Creates metadata from shared pairs.
    #[must_use]
    pub fn new<K, V>(shared: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            shared: shared.into_iter().collect(),
            private: None,
        }
    }

    /// Attaches the private pairs owned by `owner`, replacing any previous
    /// private set.
    #[must_use]
    pub fn with_private<K, V>(
        mut self,
        owner: impl Into<String>,
        values: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.private = Some((owner.into(), values.into_iter().collect()));
        self
    }

    /// Looks up a value.
    ///
    /// With `owner`, the owner's private value wins when present. Private
    /// values are never visible to other owners or without one.
    #[must_use]
    pub fn value(&self, key: &str, owner: Option<&str>) -> Option<&str> {
        let private = match (&self.private, owner) {
            (Some((name, values)), Some(owner)) if name == owner => values.get(key),
            _ => None,
        };
        private.or_else(|| self.shared.get(key))
    }

    /// The private namespace, if any.
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.private.as_ref().map(|(owner, _)| owner.as_str())
    }

    /// The shared pairs.
    #[must_use]
    pub fn shared(&self) -> &Record {
        &self.shared
    }

    /// Whether there is neither shared nor private data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.is_empty() && self.private.is_none()
    }

    /// Serializes for the construction payload.
    #[must_use]
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        if !self.shared.is_empty() {
            record.insert_record("shared", &self.shared);
        }
        if let Some((owner, values)) = &self.private {
            record.insert("owner", owner.clone());
            record.insert_record("private", values);
        }
        record
    }

    /// Parses [`to_record`](Self::to_record) output.
    #[must_use]
    pub fn from_record(record: &Record) -> Self {
        let shared = record.record("shared").unwrap_or_default();
        let private = record
            .get("owner")
            .filter(|o| !o.is_empty())
            .map(|owner| (owner.to_owned(), record.record("private").unwrap_or_default()));
        Self { shared, private }
    }
}
