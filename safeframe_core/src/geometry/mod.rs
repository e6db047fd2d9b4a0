// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Geometry engine.
//!
//! Computes, for an element hosting a content frame:
//!
//! - its own rectangle in document coordinates ([`rect_of`]);
//! - the *reference node* that limits how much of it can be seen: the nearest
//!   ancestor that clips or scrolls, or the document root;
//! - how far it may grow in each direction before hitting that limit;
//! - what fraction of it is visible, optionally reduced by foreign content
//!   stacked over it ([`occlusion`]).
//!
//! The result is an [`ExpansionEnvelope`], which is also what frames receive
//! in the `geom` field of most host messages.
//!
//! All reads go through [`Host`](crate::platform::Host). An unreadable node
//! produces zero geometry, never an error.

mod bounds;
pub mod occlusion;

pub use bounds::{Bounds, bounds_of, rect_of};

use kurbo::Rect;

use crate::wire::Record;

/// An element's border box in document coordinates plus its stacking order.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ElementRect {
    /// Border box, document coordinates.
    pub rect: Rect,
    /// Computed `z-index` (`auto` reads as 0).
    pub z_index: i32,
}

impl ElementRect {
    /// A zero rectangle, used whenever geometry cannot be read.
    pub const ZERO: Self = Self {
        rect: Rect::ZERO,
        z_index: 0,
    };

    /// Top edge.
    #[must_use]
    pub fn top(&self) -> f64 {
        self.rect.y0
    }

    /// Left edge.
    #[must_use]
    pub fn left(&self) -> f64 {
        self.rect.x0
    }

    /// Right edge.
    #[must_use]
    pub fn right(&self) -> f64 {
        self.rect.x1
    }

    /// Bottom edge.
    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.rect.y1
    }

    /// Width.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.rect.width()
    }

    /// Height.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.rect.height()
    }
}

/// Distances on each side of a box.
///
/// Used both for expansion room (how far an element may grow) and for
/// expansion requests (how far a frame wants to grow).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Insets {
    /// Distance above.
    pub top: f64,
    /// Distance to the left.
    pub left: f64,
    /// Distance to the right.
    pub right: f64,
    /// Distance below.
    pub bottom: f64,
}

impl Insets {
    /// No room on any side.
    pub const ZERO: Self = Self {
        top: 0.0,
        left: 0.0,
        right: 0.0,
        bottom: 0.0,
    };

    /// Total horizontal extent (`left + right`).
    #[must_use]
    pub fn horizontal(&self) -> f64 {
        self.left + self.right
    }

    /// Total vertical extent (`top + bottom`).
    #[must_use]
    pub fn vertical(&self) -> f64 {
        self.top + self.bottom
    }

    /// Replaces negative sides with zero.
    #[must_use]
    pub fn clamp_non_negative(self) -> Self {
        Self {
            top: self.top.max(0.0),
            left: self.left.max(0.0),
            right: self.right.max(0.0),
            bottom: self.bottom.max(0.0),
        }
    }
}

/// Tuning for [`bounds_of`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeometryOptions {
    /// Run the occlusion sampling pass.
    pub occlusion: bool,
    /// Samples per axis for occlusion (the grid is `density × density`),
    /// capped at [`occlusion::MAX_GRID_DENSITY`].
    pub grid_density: u32,
}

impl Default for GeometryOptions {
    fn default() -> Self {
        Self {
            occlusion: true,
            grid_density: 10,
        }
    }
}

/// Full geometry report for one element.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ExpansionEnvelope {
    /// The element itself.
    pub rect: ElementRect,
    /// The viewport, document coordinates.
    pub viewport: Rect,
    /// The reference node's visible box, document coordinates.
    pub reference: Rect,
    /// Whether the reference node is the document root.
    pub reference_is_root: bool,
    /// Room to grow on each side.
    pub expansion: Insets,
    /// The reference node can scroll horizontally.
    pub can_scroll_x: bool,
    /// The reference node can scroll vertically.
    pub can_scroll_y: bool,
    /// Visible share of the element's width, `0.0..=1.0`.
    pub visible_fraction_x: f64,
    /// Visible share of the element's height, `0.0..=1.0`.
    pub visible_fraction_y: f64,
    /// Visible share of the element's area inside the reference node.
    pub intersection_ratio: f64,
    /// Visible share of the element's area inside the viewport.
    pub viewport_ratio: f64,
}

impl ExpansionEnvelope {
    /// Serializes the envelope as nested wire records.
    ///
    /// | key    | fields                                 |
    /// |--------|----------------------------------------|
    /// | `self` | `t l r b w h z xiv yiv iv viv`         |
    /// | `win`  | `t l r b w h`                          |
    /// | `par`  | `t l r b w h root`                     |
    /// | `exp`  | `t l r b xs yxs`                       |
    #[must_use]
    pub fn to_record(&self) -> Record {
        let mut own = rect_record(self.rect.rect);
        own.insert("z", self.rect.z_index.to_string());
        own.insert_num("xiv", self.visible_fraction_x);
        own.insert_num("yiv", self.visible_fraction_y);
        own.insert_num("iv", self.intersection_ratio);
        own.insert_num("viv", self.viewport_ratio);

        let mut par = rect_record(self.reference);
        par.insert("root", bool_flag(self.reference_is_root));

        let mut exp = Record::new();
        exp.insert_num("t", self.expansion.top);
        exp.insert_num("l", self.expansion.left);
        exp.insert_num("r", self.expansion.right);
        exp.insert_num("b", self.expansion.bottom);
        exp.insert("xs", bool_flag(self.can_scroll_x));
        exp.insert("yxs", bool_flag(self.can_scroll_y));

        let mut record = Record::new();
        record.insert_record("self", &own);
        record.insert_record("win", &rect_record(self.viewport));
        record.insert_record("par", &par);
        record.insert_record("exp", &exp);
        record
    }

    /// Rebuilds an envelope from [`to_record`](Self::to_record) output.
    ///
    /// Missing or malformed fields read as zero.
    #[must_use]
    pub fn from_record(record: &Record) -> Self {
        let own = record.record("self").unwrap_or_default();
        let win = record.record("win").unwrap_or_default();
        let par = record.record("par").unwrap_or_default();
        let exp = record.record("exp").unwrap_or_default();
        let unit = |r: &Record, key: &str| r.num(key, 0.0, 0.0, 1.0);
        #[expect(
            clippy::cast_possible_truncation,
            reason = "z-index is clamped to the i32 range"
        )]
        let z_index = own.num("z", 0.0, f64::from(i32::MIN), f64::from(i32::MAX)) as i32;
        Self {
            rect: ElementRect {
                rect: record_rect(&own),
                z_index,
            },
            viewport: record_rect(&win),
            reference: record_rect(&par),
            reference_is_root: par.get("root") == Some("1"),
            expansion: Insets {
                top: exp.num("t", 0.0, 0.0, f64::MAX),
                left: exp.num("l", 0.0, 0.0, f64::MAX),
                right: exp.num("r", 0.0, 0.0, f64::MAX),
                bottom: exp.num("b", 0.0, 0.0, f64::MAX),
            },
            can_scroll_x: exp.get("xs") == Some("1"),
            can_scroll_y: exp.get("yxs") == Some("1"),
            visible_fraction_x: unit(&own, "xiv"),
            visible_fraction_y: unit(&own, "yiv"),
            intersection_ratio: unit(&own, "iv"),
            viewport_ratio: unit(&own, "viv"),
        }
    }
}

fn bool_flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

fn rect_record(rect: Rect) -> Record {
    let mut record = Record::new();
    record.insert_num("t", rect.y0);
    record.insert_num("l", rect.x0);
    record.insert_num("r", rect.x1);
    record.insert_num("b", rect.y1);
    record.insert_num("w", rect.width());
    record.insert_num("h", rect.height());
    record
}

fn record_rect(record: &Record) -> Rect {
    let coord = |key: &str| record.num(key, 0.0, f64::MIN, f64::MAX);
    Rect::new(coord("l"), coord("t"), coord("r"), coord("b"))
}
