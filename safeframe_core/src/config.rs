// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Engine and position configuration.
//!
//! A [`Configuration`] is supplied once per engine (replacing it nukes every
//! rendered position). It carries the render template URL, the render
//! timeout, the host [`Hooks`], and one [`PositionConfig`] per position id.
//!
//! A `PositionConfig` is the contract for one position: where it goes, how
//! big it is, and which [`Capability`] values the frame may exercise. Every
//! capability except [`Capability::ExpandOverlay`] is off unless granted.

use std::collections::BTreeMap;
use std::fmt;

use crate::coerce;
use crate::error::ConfigError;
use crate::hooks::{Hooks, NoHooks};
use crate::time::Duration;
use crate::wire::Record;

/// A permission a frame needs before a command is honored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Expand over host content (`exp-ovr`).
    ExpandOverlay,
    /// Expand by pushing host content (`exp-push`).
    ExpandPush,
    /// Background (`bg`).
    Background,
    /// Pinned placement (`pin`).
    Pin,
    /// Read a host cookie (`read-cookie`).
    ReadCookie,
    /// Write a host cookie (`write-cookie`).
    WriteCookie,
}

impl Capability {
    /// Every capability, in wire order.
    pub const ALL: [Self; 6] = [
        Self::ExpandOverlay,
        Self::ExpandPush,
        Self::Background,
        Self::Pin,
        Self::ReadCookie,
        Self::WriteCookie,
    ];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExpandOverlay => "exp-ovr",
            Self::ExpandPush => "exp-push",
            Self::Background => "bg",
            Self::Pin => "pin",
            Self::ReadCookie => "read-cookie",
            Self::WriteCookie => "write-cookie",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    const fn bit(self) -> u8 {
        match self {
            Self::ExpandOverlay => 1 << 0,
            Self::ExpandPush => 1 << 1,
            Self::Background => 1 << 2,
            Self::Pin => 1 << 3,
            Self::ReadCookie => 1 << 4,
            Self::WriteCookie => 1 << 5,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of granted [`Capability`] values.
///
/// The default grants only [`Capability::ExpandOverlay`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capabilities(u8);

impl Default for Capabilities {
    fn default() -> Self {
        Self::NONE.with(Capability::ExpandOverlay, true)
    }
}

impl Capabilities {
    /// Nothing granted.
    pub const NONE: Self = Self(0);

    /// Whether `capability` is granted.
    #[must_use]
    pub const fn contains(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    /// Grants or revokes `capability`.
    #[must_use]
    pub const fn with(self, capability: Capability, granted: bool) -> Self {
        if granted {
            Self(self.0 | capability.bit())
        } else {
            Self(self.0 & !capability.bit())
        }
    }

    /// Iterates over granted capabilities.
    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL.into_iter().filter(move |c| self.contains(*c))
    }

    /// Serializes as `name=1|0` pairs for every capability.
    #[must_use]
    pub fn to_record(self) -> Record {
        Capability::ALL
            .into_iter()
            .map(|c| (c.as_str(), if self.contains(c) { "1" } else { "0" }))
            .collect()
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(Capability::as_str)).finish()
    }
}

/// Parses a pixel length such as `300` or `300px`.
///
/// # Errors
///
/// Relative units are rejected with [`ConfigError::RelativeUnit`]; anything
/// else that is not a positive finite number with [`ConfigError::InvalidDimension`].
pub fn parse_length(field: &'static str, value: &str) -> Result<f64, ConfigError> {
    let raw = value.trim();
    const RELATIVE: [&str; 8] = ["%", "em", "rem", "vw", "vh", "vmin", "vmax", "ex"];
    if RELATIVE.iter().any(|unit| raw.ends_with(unit)) {
        return Err(ConfigError::RelativeUnit {
            field,
            value: value.to_owned(),
        });
    }
    let n = coerce::to_num(Some(raw), f64::NAN, f64::MIN, f64::MAX);
    if n.is_finite() && n > 0.0 {
        Ok(n)
    } else {
        Err(ConfigError::InvalidDimension {
            field,
            value: value.to_owned(),
        })
    }
}

/// Default frame target window.
pub const DEFAULT_TARGET: &str = "_top";

/// Declared geometry and capability contract for one position.
#[derive(Clone, Debug, PartialEq)]
pub struct PositionConfig {
    id: String,
    destination_id: String,
    width: f64,
    height: f64,
    z_index: Option<i32>,
    target_window_name: String,
    background_color: String,
    custom_css: String,
    capabilities: Capabilities,
}

impl PositionConfig {
    /// Creates a config with pixel dimensions.
    ///
    /// An empty `id` is replaced with an `sf_pos<N>` id when the config is
    /// added to a [`Configuration`].
    ///
    /// # Errors
    ///
    /// Fails for an empty destination or non-positive dimensions.
    pub fn new(
        id: impl Into<String>,
        destination_id: impl Into<String>,
        width: f64,
        height: f64,
    ) -> Result<Self, ConfigError> {
        let id = id.into().trim().to_owned();
        let destination_id = destination_id.into().trim().to_owned();
        if destination_id.is_empty() {
            return Err(ConfigError::MissingDestination { id });
        }
        for (field, value) in [("width", width), ("height", height)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidDimension {
                    field,
                    value: value.to_string(),
                });
            }
        }
        Ok(Self {
            id,
            destination_id,
            width,
            height,
            z_index: None,
            target_window_name: DEFAULT_TARGET.to_owned(),
            background_color: "transparent".to_owned(),
            custom_css: String::new(),
            capabilities: Capabilities::default(),
        })
    }

    /// Creates a config from CSS-style dimension strings.
    ///
    /// # Errors
    ///
    /// See [`parse_length`].
    pub fn with_lengths(
        id: impl Into<String>,
        destination_id: impl Into<String>,
        width: &str,
        height: &str,
    ) -> Result<Self, ConfigError> {
        let width = parse_length("width", width)?;
        let height = parse_length("height", height)?;
        Self::new(id, destination_id, width, height)
    }

    /// Creates a config from a `WIDTHxHEIGHT` size shorthand (`300x250`).
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidSize`] when the shorthand is malformed.
    pub fn with_size(
        id: impl Into<String>,
        destination_id: impl Into<String>,
        size: &str,
    ) -> Result<Self, ConfigError> {
        let (w, h) = size
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| ConfigError::InvalidSize(size.to_owned()))?;
        let width =
            parse_length("width", w).map_err(|_| ConfigError::InvalidSize(size.to_owned()))?;
        let height =
            parse_length("height", h).map_err(|_| ConfigError::InvalidSize(size.to_owned()))?;
        Self::new(id, destination_id, width, height)
    }

    /// Creates a config from an inline record.
    ///
    /// Recognized keys: `dest`, `w`, `h`, `size` (used when `w`/`h` are
    /// absent), `z`, `tgt`, `bg`, `css`, and one key per capability name
    /// holding a truthy or falsy value.
    ///
    /// # Errors
    ///
    /// Any validation failure of the constructors above.
    pub fn from_record(id: impl Into<String>, record: &Record) -> Result<Self, ConfigError> {
        let destination = coerce::to_str(record.get("dest"));
        let mut config = match (record.get("w"), record.get("h"), record.get("size")) {
            (Some(w), Some(h), _) => Self::with_lengths(id, destination, w, h)?,
            (_, _, Some(size)) => Self::with_size(id, destination, size)?,
            (w, _, None) => Self::with_lengths(id, destination, w.unwrap_or(""), "")?,
        };
        if record.contains("z") {
            let z = coerce::to_int(record.get("z"), 0, i64::from(i32::MIN), i64::from(i32::MAX));
            config.z_index = i32::try_from(z).ok();
        }
        if let Some(target) = record.get("tgt") {
            config = config.with_target_window_name(target);
        }
        if let Some(bg) = record.get("bg").filter(|v| !v.is_empty()) {
            config.background_color = bg.to_owned();
        }
        if let Some(css) = record.get("css") {
            config.custom_css = css.to_owned();
        }
        for capability in Capability::ALL {
            if let Some(value) = record.get(capability.as_str()) {
                config.capabilities = config
                    .capabilities
                    .with(capability, coerce::to_bool(Some(value)));
            }
        }
        Ok(config)
    }

    /// Sets the stacking order of the frame.
    #[must_use]
    pub fn with_z_index(mut self, z_index: i32) -> Self {
        self.z_index = Some(z_index);
        self
    }

    /// Sets the window that frame navigations target.
    ///
    /// `_self` would let the frame navigate itself out of its sandbox, so it
    /// is replaced with `_top`, as is an empty name.
    #[must_use]
    pub fn with_target_window_name(mut self, name: &str) -> Self {
        let name = name.trim();
        self.target_window_name = if name.is_empty() || name.eq_ignore_ascii_case("_self") {
            DEFAULT_TARGET.to_owned()
        } else {
            name.to_owned()
        };
        self
    }

    /// Sets the frame background color.
    #[must_use]
    pub fn with_background_color(mut self, color: impl Into<String>) -> Self {
        self.background_color = color.into();
        self
    }

    /// Sets extra CSS for the frame element.
    #[must_use]
    pub fn with_custom_css(mut self, css: impl Into<String>) -> Self {
        self.custom_css = css.into();
        self
    }

    /// Grants or revokes one capability.
    #[must_use]
    pub fn with_capability(mut self, capability: Capability, granted: bool) -> Self {
        self.capabilities = self.capabilities.with(capability, granted);
        self
    }

    /// Replaces the capability set.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Position id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Host element the frame replaces.
    #[must_use]
    pub fn destination_id(&self) -> &str {
        &self.destination_id
    }

    /// Declared width in pixels.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Declared height in pixels.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.height
    }

    /// Declared stacking order.
    #[must_use]
    pub fn z_index(&self) -> Option<i32> {
        self.z_index
    }

    /// Target window name for frame navigations.
    #[must_use]
    pub fn target_window_name(&self) -> &str {
        &self.target_window_name
    }

    /// Frame background color.
    #[must_use]
    pub fn background_color(&self) -> &str {
        &self.background_color
    }

    /// Extra CSS for the frame element.
    #[must_use]
    pub fn custom_css(&self) -> &str {
        &self.custom_css
    }

    /// Granted capabilities.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Whether `capability` is granted.
    #[must_use]
    pub fn allows(&self, capability: Capability) -> bool {
        self.capabilities.contains(capability)
    }

    /// Serializes the parts a frame may see (the `conf` payload field).
    #[must_use]
    pub fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("dest", self.destination_id.clone())
            .with("tgt", self.target_window_name.clone())
            .with("bg", self.background_color.clone())
            .with("css", self.custom_css.clone());
        record.insert_num("w", self.width);
        record.insert_num("h", self.height);
        if let Some(z) = self.z_index {
            record.insert("z", z.to_string());
        }
        record.insert_record("supports", &self.capabilities.to_record());
        record
    }
}

/// Engine-wide configuration.
pub struct Configuration {
    render_file: String,
    msg_file: Option<String>,
    timeout: Duration,
    debug: bool,
    positions: BTreeMap<String, PositionConfig>,
    hooks: Box<dyn Hooks>,
    next_auto_id: u32,
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("render_file", &self.render_file)
            .field("msg_file", &self.msg_file)
            .field("timeout", &self.timeout)
            .field("debug", &self.debug)
            .field("positions", &self.positions)
            .finish_non_exhaustive()
    }
}

impl Configuration {
    /// Default render timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(60_000);

    /// Creates a configuration for the given render template URL.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidRenderFile`] if `render_file` is not an absolute
    /// URL.
    pub fn new(render_file: &str) -> Result<Self, ConfigError> {
        let render_file = render_file.trim();
        if url::Url::parse(render_file).is_err() {
            return Err(ConfigError::InvalidRenderFile(render_file.to_owned()));
        }
        Ok(Self {
            render_file: render_file.to_owned(),
            msg_file: None,
            timeout: Self::DEFAULT_TIMEOUT,
            debug: false,
            positions: BTreeMap::new(),
            hooks: Box::new(NoHooks),
            next_auto_id: 0,
        })
    }

    /// Sets the render timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the proxy message file used when native messaging is unavailable.
    #[must_use]
    pub fn with_msg_file(mut self, msg_file: impl Into<String>) -> Self {
        self.msg_file = Some(msg_file.into());
        self
    }

    /// Enables debug mode (forwarded to frames in the construction payload).
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Installs host hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: impl Hooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    /// Builder-style [`add_position`](Self::add_position).
    #[must_use]
    pub fn with_position(mut self, config: PositionConfig) -> Self {
        self.add_position(config);
        self
    }

    /// Adds or replaces a position config and returns its id.
    ///
    /// An empty id is replaced with the next free `sf_pos<N>`.
    pub fn add_position(&mut self, mut config: PositionConfig) -> String {
        if config.id.is_empty() {
            loop {
                let candidate = format!("sf_pos{}", self.next_auto_id);
                self.next_auto_id += 1;
                if !self.positions.contains_key(&candidate) {
                    config.id = candidate;
                    break;
                }
            }
        }
        let id = config.id.clone();
        self.positions.insert(id.clone(), config);
        id
    }

    /// Checks engine-level invariants.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ZeroTimeout`] for a zero timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout == Duration::ZERO {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// The render template URL.
    #[must_use]
    pub fn render_file(&self) -> &str {
        &self.render_file
    }

    /// The origin of the render template, if it has a tuple origin.
    #[must_use]
    pub fn render_origin(&self) -> Option<String> {
        let url = url::Url::parse(&self.render_file).ok()?;
        let origin = url.origin();
        origin.is_tuple().then(|| origin.ascii_serialization())
    }

    /// The proxy message file.
    #[must_use]
    pub fn msg_file(&self) -> Option<&str> {
        self.msg_file.as_deref()
    }

    /// The render timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Debug mode.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// The config for `id`.
    #[must_use]
    pub fn position(&self, id: &str) -> Option<&PositionConfig> {
        self.positions.get(id)
    }

    /// All position configs, ordered by id.
    pub fn positions(&self) -> impl Iterator<Item = &PositionConfig> {
        self.positions.values()
    }

    pub(crate) fn hooks_mut(&mut self) -> &mut dyn Hooks {
        self.hooks.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths_accept_pixels_only() {
        assert_eq!(parse_length("width", "300"), Ok(300.0));
        assert_eq!(parse_length("width", " 300px "), Ok(300.0));
        assert!(matches!(
            parse_length("width", "50%"),
            Err(ConfigError::RelativeUnit { field: "width", .. })
        ));
        assert!(matches!(
            parse_length("height", "2em"),
            Err(ConfigError::RelativeUnit { .. })
        ));
        assert!(matches!(
            parse_length("height", "0"),
            Err(ConfigError::InvalidDimension { .. })
        ));
        assert!(matches!(
            parse_length("height", "tall"),
            Err(ConfigError::InvalidDimension { .. })
        ));
    }

    #[test]
    fn size_shorthand() {
        let config = PositionConfig::with_size("p1", "slot", "300x250").unwrap();
        assert_eq!((config.width(), config.height()), (300.0, 250.0));
        assert_eq!(
            PositionConfig::with_size("p1", "slot", "300by250"),
            Err(ConfigError::InvalidSize("300by250".into()))
        );
    }

    #[test]
    fn defaults() {
        let config = PositionConfig::new("p1", "slot", 300.0, 250.0).unwrap();
        assert_eq!(config.target_window_name(), "_top");
        assert_eq!(config.background_color(), "transparent");
        assert!(config.allows(Capability::ExpandOverlay));
        assert!(!config.allows(Capability::ExpandPush));
        assert!(!config.allows(Capability::WriteCookie));
        assert_eq!(config.z_index(), None);
    }

    #[test]
    fn self_target_is_replaced() {
        let config = PositionConfig::new("p1", "slot", 300.0, 250.0)
            .unwrap()
            .with_target_window_name("_self");
        assert_eq!(config.target_window_name(), "_top");
        let config = config.with_target_window_name("_blank");
        assert_eq!(config.target_window_name(), "_blank");
    }

    #[test]
    fn destination_is_required() {
        assert_eq!(
            PositionConfig::new("p1", " ", 300.0, 250.0),
            Err(ConfigError::MissingDestination { id: "p1".into() })
        );
    }

    #[test]
    fn inline_record_config() {
        let record = Record::decode("dest=slot&size=728x90&z=5&tgt=_self&write-cookie=true&exp-ovr=0");
        let config = PositionConfig::from_record("p2", &record).unwrap();
        assert_eq!(config.destination_id(), "slot");
        assert_eq!(config.width(), 728.0);
        assert_eq!(config.z_index(), Some(5));
        assert_eq!(config.target_window_name(), "_top");
        assert!(config.allows(Capability::WriteCookie));
        assert!(!config.allows(Capability::ExpandOverlay));

        let record = Record::decode("dest=slot&w=50%25&h=90");
        assert!(matches!(
            PositionConfig::from_record("p3", &record),
            Err(ConfigError::RelativeUnit { .. })
        ));
    }

    #[test]
    fn auto_ids() {
        let mut configuration = Configuration::new("https://frames.example/render.html").unwrap();
        let a = configuration.add_position(PositionConfig::new("", "a", 1.0, 1.0).unwrap());
        let b = configuration.add_position(PositionConfig::new("", "b", 1.0, 1.0).unwrap());
        assert_eq!(a, "sf_pos0");
        assert_eq!(b, "sf_pos1");
        assert_eq!(configuration.position("sf_pos1").map(PositionConfig::destination_id), Some("b"));
    }

    #[test]
    fn render_file_must_be_absolute() {
        assert_eq!(
            Configuration::new("/render.html").map(|_| ()),
            Err(ConfigError::InvalidRenderFile("/render.html".into()))
        );
        let configuration = Configuration::new("https://frames.example:8443/r/render.html").unwrap();
        assert_eq!(
            configuration.render_origin().as_deref(),
            Some("https://frames.example:8443")
        );
        assert_eq!(configuration.timeout(), Duration::from_millis(60_000));
        assert!(configuration.with_timeout(Duration::ZERO).validate().is_err());
    }

    #[test]
    fn capability_record() {
        let caps = Capabilities::NONE.with(Capability::ReadCookie, true);
        let record = caps.to_record();
        assert_eq!(record.get("read-cookie"), Some("1"));
        assert_eq!(record.get("exp-ovr"), Some("0"));
        assert_eq!(format!("{caps:?}"), r#"{"read-cookie"}"#);
        assert_eq!(Capability::parse("exp-push"), Some(Capability::ExpandPush));
    }
}
