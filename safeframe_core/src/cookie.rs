// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host-domain cookie access on behalf of content frames.
//!
//! Frames never see the cookie jar. They may read one named cookie or write
//! one, and only when the position declares the matching capability. Values
//! are percent-encoded on write and decoded on read. Written cookies last
//! one day and carry `SameSite=None; Secure` so that they survive cross-site
//! frame contexts.

use crate::time::Duration;

/// Whether `name` is a valid cookie name (an RFC 6265 token).
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_graphic()
                && !matches!(
                    b,
                    b'(' | b')'
                        | b'<'
                        | b'>'
                        | b'@'
                        | b','
                        | b';'
                        | b':'
                        | b'\\'
                        | b'"'
                        | b'/'
                        | b'['
                        | b']'
                        | b'?'
                        | b'='
                        | b'{'
                        | b'}'
                )
        })
}

/// Looks up `name` in a `document.cookie` style string.
///
/// Returns the percent-decoded value of the first matching entry.
#[must_use]
pub fn read(jar: &str, name: &str) -> Option<String> {
    jar.split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| {
            let value = value.trim();
            urlencoding::decode(value).map_or_else(|_| value.to_owned(), |v| v.into_owned())
        })
}

/// A cookie assignment ready to hand to the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CookieWrite {
    name: String,
    value: String,
    max_age: Duration,
}

impl CookieWrite {
    /// Prepares a one-day cookie. Returns `None` for an invalid name.
    #[must_use]
    pub fn new(name: &str, value: &str) -> Option<Self> {
        is_valid_name(name).then(|| Self {
            name: name.to_owned(),
            value: value.to_owned(),
            max_age: Duration::DAY,
        })
    }

    /// Cookie name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unencoded value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The `document.cookie` assignment string.
    #[must_use]
    pub fn header(&self) -> String {
        format!(
            "{}={}; max-age={}; path=/; SameSite=None; Secure",
            self.name,
            urlencoding::encode(&self.value),
            self.max_age.secs()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_tokens() {
        assert!(is_valid_name("session_id"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("a b"));
        assert!(!is_valid_name("a=b"));
        assert!(!is_valid_name("a;b"));
    }

    #[test]
    fn read_finds_named_entry() {
        let jar = "theme=dark; seg=a%20b;empty=; seg=second";
        assert_eq!(read(jar, "seg").as_deref(), Some("a b"));
        assert_eq!(read(jar, "empty").as_deref(), Some(""));
        assert_eq!(read(jar, "missing"), None);
        assert_eq!(read("", "theme"), None);
    }

    #[test]
    fn write_header_has_fixed_attributes() {
        let write = CookieWrite::new("seg", "a b&c").unwrap();
        assert_eq!(
            write.header(),
            "seg=a%20b%26c; max-age=86400; path=/; SameSite=None; Secure"
        );
        assert!(CookieWrite::new("bad name", "x").is_none());
    }
}
