// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Platform contract for host integrations.
//!
//! The engine never touches a document directly. Every DOM read, frame
//! mutation, message transmission, listener registration, and cookie access
//! goes through the [`Host`] trait, which backend crates implement (the web
//! backend with `web-sys`, tests with [`SimHost`](crate::sim::SimHost)).
//!
//! Engine-specific differences (whether native cross-document messaging
//! exists, whether computed styles or hit testing are available, whether the
//! stacking shim is needed) are reported once through
//! [`PlatformCapabilities`]. Protocol and geometry code branch on those
//! flags only, never on engine identity.
//!
//! # Failure policy
//!
//! Reads return `Option`: `None` means "could not be determined" (detached
//! node, cross-origin access, missing API). Writes return `bool` or nothing.
//! Implementations must not panic; the engine turns `None` into zero
//! geometry and `false` into a traced, non-fatal outcome.

use core::fmt::Debug;

use kurbo::{Point, Rect, Size, Vec2};

/// Platform features resolved once when the engine starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlatformCapabilities {
    /// `postMessage`-style native messaging is claimed by the platform.
    ///
    /// The engine still verifies it with a self-addressed probe before use.
    pub native_messaging: bool,
    /// Computed styles can be read (needed to find clipping ancestors).
    pub computed_style: bool,
    /// Point hit testing is available (needed for occlusion sampling).
    pub hit_testing: bool,
    /// Expanded frames need a lower-stacked shim element behind them.
    pub stacking_shim: bool,
}

impl Default for PlatformCapabilities {
    fn default() -> Self {
        Self {
            native_messaging: true,
            computed_style: true,
            hit_testing: true,
            stacking_shim: false,
        }
    }
}

/// A CSS `overflow` keyword for one axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Overflow {
    /// `visible`.
    #[default]
    Visible,
    /// `hidden`.
    Hidden,
    /// `clip`.
    Clip,
    /// `scroll`.
    Scroll,
    /// `auto` (and the legacy `overlay`).
    Auto,
}

impl Overflow {
    /// Parses a computed `overflow-x`/`overflow-y` value.
    ///
    /// Unrecognized values map to [`Visible`](Self::Visible).
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "hidden" => Self::Hidden,
            "clip" => Self::Clip,
            "scroll" => Self::Scroll,
            "auto" | "overlay" => Self::Auto,
            _ => Self::Visible,
        }
    }

    /// Content outside the box is cut off without scrolling.
    #[must_use]
    pub const fn clips(self) -> bool {
        matches!(self, Self::Hidden | Self::Clip)
    }

    /// The box can scroll on this axis.
    #[must_use]
    pub const fn scrolls(self) -> bool {
        matches!(self, Self::Scroll | Self::Auto)
    }
}

/// A CSS `clip: rect(top, right, bottom, left)` value.
///
/// Offsets follow CSS semantics: all four are measured from the element's
/// top-left border edge, and `None` stands for `auto` (the corresponding
/// border edge).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ClipRect {
    /// Top offset.
    pub top: Option<f64>,
    /// Right offset, measured from the left edge.
    pub right: Option<f64>,
    /// Bottom offset, measured from the top edge.
    pub bottom: Option<f64>,
    /// Left offset.
    pub left: Option<f64>,
}

impl ClipRect {
    /// Parses a computed `clip` value such as `rect(0px, 300px, 250px, 0px)`.
    ///
    /// Returns `None` for `auto`, unparseable values, or anything that is not
    /// a `rect()`. Both comma and space separators are accepted.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let inner = value
            .trim()
            .strip_prefix("rect(")?
            .strip_suffix(')')?
            .trim();
        let parts: Vec<&str> = inner
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|p| !p.is_empty())
            .collect();
        let &[top, right, bottom, left] = parts.as_slice() else {
            return None;
        };
        // Outer `None`: unparseable. Inner `None`: `auto`.
        let offset = |raw: &str| -> Option<Option<f64>> {
            if raw.eq_ignore_ascii_case("auto") {
                return Some(None);
            }
            let raw = raw.strip_suffix("px").unwrap_or(raw);
            raw.parse::<f64>().ok().filter(|v| v.is_finite()).map(Some)
        };
        Some(Self {
            top: offset(top)?,
            right: offset(right)?,
            bottom: offset(bottom)?,
            left: offset(left)?,
        })
    }

    /// Whether every offset is zero or `auto`.
    ///
    /// A zero clip rect is how engines report "no clip" in some computed
    /// style implementations, so it is not treated as clipping.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        [self.top, self.right, self.bottom, self.left]
            .iter()
            .all(|v| v.is_none_or(|v| v == 0.0))
    }

    /// Returns the visible region of `border_box` under this clip.
    #[must_use]
    pub fn apply(&self, border_box: Rect) -> Rect {
        let clipped = Rect::new(
            self.left.map_or(border_box.x0, |l| border_box.x0 + l),
            self.top.map_or(border_box.y0, |t| border_box.y0 + t),
            self.right.map_or(border_box.x1, |r| border_box.x0 + r),
            self.bottom.map_or(border_box.y1, |b| border_box.y0 + b),
        );
        border_box.intersect(clipped)
    }
}

/// The subset of an element's computed style the geometry engine reads.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoxStyle {
    /// Horizontal overflow.
    pub overflow_x: Overflow,
    /// Vertical overflow.
    pub overflow_y: Overflow,
    /// Explicit `clip` rect, if any.
    pub clip: Option<ClipRect>,
    /// Numeric `z-index`, or `None` for `auto`.
    pub z_index: Option<i32>,
}

impl BoxStyle {
    /// The box cuts off descendants on at least one side.
    #[must_use]
    pub fn clips(&self) -> bool {
        self.overflow_x.clips()
            || self.overflow_y.clips()
            || self.clip.is_some_and(|c| !c.is_zero())
    }
}

/// Scroll and client extents of an element, in CSS pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScrollMetrics {
    /// Total scrollable content width.
    pub scroll_width: f64,
    /// Total scrollable content height.
    pub scroll_height: f64,
    /// Inner width excluding scrollbars.
    pub client_width: f64,
    /// Inner height excluding scrollbars.
    pub client_height: f64,
    /// Outer width including scrollbars.
    pub offset_width: f64,
    /// Outer height including scrollbars.
    pub offset_height: f64,
}

impl ScrollMetrics {
    /// Content overflows horizontally.
    #[must_use]
    pub fn overflows_x(&self) -> bool {
        self.scroll_width > self.client_width
    }

    /// Content overflows vertically.
    #[must_use]
    pub fn overflows_y(&self) -> bool {
        self.scroll_height > self.client_height
    }

    /// Thickness of the vertical scrollbar (eats into room on the right).
    #[must_use]
    pub fn vertical_bar(&self) -> f64 {
        (self.offset_width - self.client_width).max(0.0)
    }

    /// Thickness of the horizontal scrollbar (eats into room at the bottom).
    #[must_use]
    pub fn horizontal_bar(&self) -> f64 {
        (self.offset_height - self.client_height).max(0.0)
    }
}

/// The visible window onto the document.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    /// Page scroll offset (document coordinates of the viewport origin).
    pub scroll: Vec2,
    /// Viewport size.
    pub size: Size,
}

impl Viewport {
    /// The viewport as a rectangle in document coordinates.
    #[must_use]
    pub fn rect(&self) -> Rect {
        Rect::from_origin_size(self.scroll.to_point(), self.size)
    }
}

/// Everything a backend needs to create a content frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSpec {
    /// Position id; also used to derive element ids.
    pub position_id: String,
    /// Host element replaced by the frame's wrapper.
    pub destination_id: String,
    /// Frame `src`: the render template URL.
    pub src: String,
    /// Frame `name`: the encoded construction payload.
    pub name: String,
    /// Frame width in pixels.
    pub width: f64,
    /// Frame height in pixels.
    pub height: f64,
    /// Stacking order, if declared.
    pub z_index: Option<i32>,
    /// CSS background color of the frame.
    pub background_color: String,
    /// Extra CSS applied to the frame element.
    pub custom_css: String,
}

/// Position and size of a frame relative to its wrapper.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameBox {
    /// Left offset (negative when expanded leftward).
    pub left: f64,
    /// Top offset (negative when expanded upward).
    pub top: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
    /// Stacking order; `None` clears it.
    pub z_index: Option<i32>,
}

/// Elements a backend created for one rendered position.
#[derive(Clone, Debug, PartialEq)]
pub struct MountedFrame<E> {
    /// Wrapper that replaced the destination element and holds layout space.
    pub wrapper: E,
    /// The sandboxed content frame.
    pub frame: E,
    /// Stacking shim, present only while expanded on platforms that need it.
    pub shim: Option<E>,
}

/// A host document as seen by the engine.
///
/// See the [module docs](self) for the failure policy.
pub trait Host {
    /// Handle to a document element.
    type Element: Clone + PartialEq + Debug;
    /// Handle to a browsing context (the `source` of an inbound message).
    type Window: Clone + PartialEq + Debug;

    /// Reports platform features. Called once per engine.
    fn capabilities(&self) -> PlatformCapabilities;

    // -- Document reads --

    /// The document root element.
    fn root(&self) -> Self::Element;

    /// Looks up an element by id.
    fn element_by_id(&self, id: &str) -> Option<Self::Element>;

    /// The parent element, or `None` at the root or for detached nodes.
    fn parent(&self, element: &Self::Element) -> Option<Self::Element>;

    /// The element's border box in viewport coordinates.
    fn client_rect(&self, element: &Self::Element) -> Option<Rect>;

    /// The element's computed style.
    fn style(&self, element: &Self::Element) -> Option<BoxStyle>;

    /// The element's scroll extents.
    fn scroll_metrics(&self, element: &Self::Element) -> Option<ScrollMetrics>;

    /// Current viewport scroll offset and size.
    fn viewport(&self) -> Viewport;

    /// Topmost element at a point in viewport coordinates.
    fn element_from_point(&self, point: Point) -> Option<Self::Element>;

    /// Whether the host window currently has focus.
    fn has_focus(&self) -> bool;

    /// The host page's origin (`scheme://host[:port]`).
    fn origin(&self) -> String;

    // -- Frames --

    /// Replaces the destination element with a wrapper holding a new frame.
    ///
    /// Returns `None` if the destination does not exist or creation failed.
    fn mount_frame(&mut self, spec: &FrameSpec) -> Option<MountedFrame<Self::Element>>;

    /// Removes the frame, its wrapper, and any shim, restoring an empty
    /// placeholder element with id `destination_id`.
    fn unmount_frame(&mut self, mounted: &MountedFrame<Self::Element>, destination_id: &str);

    /// Moves and resizes the frame inside its wrapper.
    fn set_frame_box(&mut self, frame: &Self::Element, frame_box: &FrameBox);

    /// Resizes the wrapper, displacing host layout.
    fn set_wrapper_size(&mut self, wrapper: &Self::Element, size: Size);

    /// Places a stacking shim behind the frame.
    ///
    /// Only called when [`PlatformCapabilities::stacking_shim`] is set.
    fn place_shim(&mut self, mounted: &mut MountedFrame<Self::Element>, frame_box: &FrameBox) {
        _ = (mounted, frame_box);
    }

    /// Removes the stacking shim, if any.
    fn remove_shim(&mut self, mounted: &mut MountedFrame<Self::Element>) {
        _ = mounted;
    }

    /// The browsing context hosted by `frame`.
    fn frame_window(&self, frame: &Self::Element) -> Option<Self::Window>;

    // -- Messaging --

    /// Posts `payload` to the frame's window via native messaging.
    fn post_message(&mut self, frame: &Self::Element, payload: &str, target_origin: &str) -> bool;

    /// Sends `payload` through a proxy frame loaded from `proxy_url`.
    ///
    /// The proxy transport is an external collaborator; the default reports
    /// that nothing was dispatched.
    fn proxy_send(&mut self, frame: &Self::Element, proxy_url: &str, payload: &str) -> bool {
        _ = (frame, proxy_url, payload);
        false
    }

    /// Posts `payload` to the host's own window (the native messaging probe).
    fn post_to_self(&mut self, payload: &str) -> bool;

    // -- Listeners --

    /// Attaches or detaches the host-wide inbound message listener.
    fn set_message_listener(&mut self, attached: bool);

    /// Attaches or detaches window `scroll`, `resize`, `focus`, `blur`.
    fn set_window_listeners(&mut self, attached: bool);

    /// Starts forwarding `scroll` events from `element`.
    fn watch_scroll(&mut self, element: &Self::Element) -> bool;

    /// Stops forwarding `scroll` events from `element`.
    fn unwatch_scroll(&mut self, element: &Self::Element);

    // -- Cookies --

    /// The raw `document.cookie` string.
    fn cookie_string(&self) -> Option<String>;

    /// Assigns one `document.cookie` entry.
    fn set_cookie_string(&mut self, cookie: &str) -> bool;
}

/// Returns whether `ancestor` is a strict ancestor of `element`.
///
/// The walk is bounded so that a misbehaving host cannot loop forever.
pub fn is_ancestor<H: Host + ?Sized>(host: &H, ancestor: &H::Element, element: &H::Element) -> bool {
    const MAX_DEPTH: usize = 1024;
    let mut current = host.parent(element);
    for _ in 0..MAX_DEPTH {
        match current {
            Some(node) if node == *ancestor => return true,
            Some(node) => current = host.parent(&node),
            None => return false,
        }
    }
    false
}
