// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Grid-sampled occlusion estimate.
//!
//! The element's rectangle is sampled on a `density × density` grid of cell
//! centers. Every distinct foreign element found on top (not the element,
//! not one of its ancestors, not one of its descendants) is a candidate
//! occluder, and only the candidate whose overlap with the visible region is
//! largest is reported.
//!
//! This is an approximation: several partial occluders are not combined, and
//! occluders smaller than a grid cell can be missed entirely.

use kurbo::{Point, Rect};

use crate::platform::{Host, is_ancestor};

use super::rect_of;

/// The occluder selected by [`largest_occluder`].
#[derive(Clone, Debug, PartialEq)]
pub struct Occluder<E> {
    /// The foreign element on top.
    pub element: E,
    /// Its overlap with the visible region, document coordinates.
    pub overlap: Rect,
}

/// Upper bound on samples per axis.
pub const MAX_GRID_DENSITY: u32 = 64;

/// Returns the sample points for `rect`, in document coordinates.
///
/// `density` is clamped to [`MAX_GRID_DENSITY`].
#[must_use]
pub fn sample_points(rect: Rect, density: u32) -> Vec<Point> {
    let density = density.min(MAX_GRID_DENSITY);
    let n = f64::from(density);
    let cell_w = rect.width() / n;
    let cell_h = rect.height() / n;
    let mut points = Vec::with_capacity((density as usize).saturating_mul(density as usize));
    for row in 0..density {
        for col in 0..density {
            points.push(Point::new(
                rect.x0 + (f64::from(col) + 0.5) * cell_w,
                rect.y0 + (f64::from(row) + 0.5) * cell_h,
            ));
        }
    }
    points
}

/// Finds the foreign element covering the largest part of `visible`.
///
/// `rect` is the element's own box and `visible` the part of it inside the
/// reference node, both in document coordinates. Sample points outside the
/// viewport are skipped since hit testing cannot see them.
pub fn largest_occluder<H: Host + ?Sized>(
    host: &H,
    element: &H::Element,
    rect: Rect,
    visible: Rect,
    density: u32,
) -> Option<Occluder<H::Element>> {
    if density == 0 || rect.area() <= 0.0 {
        return None;
    }
    let viewport = host.viewport();
    let window = viewport.rect();

    let mut candidates: Vec<H::Element> = Vec::new();
    for point in sample_points(rect, density) {
        if !window.contains(point) {
            continue;
        }
        let Some(hit) = host.element_from_point(point - viewport.scroll) else {
            continue;
        };
        if hit == *element
            || candidates.contains(&hit)
            || is_ancestor(host, &hit, element)
            || is_ancestor(host, element, &hit)
        {
            continue;
        }
        candidates.push(hit);
    }

    candidates
        .into_iter()
        .filter_map(|candidate| {
            let overlap = rect_of(host, &candidate).rect.intersect(visible);
            (overlap.area() > 0.0).then_some(Occluder {
                element: candidate,
                overlap,
            })
        })
        .max_by(|a, b| a.overlap.area().total_cmp(&b.overlap.area()))
}
