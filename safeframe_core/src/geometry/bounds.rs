// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Element rectangles, reference-node discovery, and expansion room.

use kurbo::Rect;

use crate::platform::{BoxStyle, Host, ScrollMetrics};

use super::occlusion;
use super::{ElementRect, ExpansionEnvelope, GeometryOptions, Insets};

/// Maximum number of ancestors inspected when looking for a reference node.
const MAX_DEPTH: usize = 1024;

/// Geometry of one element together with the node that constrains it.
#[derive(Clone, Debug, PartialEq)]
pub struct Bounds<E> {
    /// The computed envelope.
    pub envelope: ExpansionEnvelope,
    /// The clipping or scrolling ancestor, or `None` for the document root.
    pub reference: Option<E>,
    /// The reference node can scroll on at least one axis.
    pub reference_scrollable: bool,
}

impl<E> Bounds<E> {
    /// Returns the reference node only if it is a scrollable ancestor.
    ///
    /// This is the node whose `scroll` events must be watched for this
    /// element's geometry to stay current.
    #[must_use]
    pub fn scroll_ancestor(&self) -> Option<&E> {
        self.reference
            .as_ref()
            .filter(|_| self.reference_scrollable)
    }
}

/// Returns `element`'s border box in document coordinates.
///
/// Returns [`ElementRect::ZERO`] when the host cannot report a rectangle.
pub fn rect_of<H: Host + ?Sized>(host: &H, element: &H::Element) -> ElementRect {
    let Some(client) = host.client_rect(element) else {
        return ElementRect::ZERO;
    };
    if !client.is_finite() {
        return ElementRect::ZERO;
    }
    let z_index = host.style(element).and_then(|s| s.z_index).unwrap_or(0);
    ElementRect {
        rect: client + host.viewport().scroll,
        z_index,
    }
}

struct Reference<E> {
    node: Option<E>,
    visible: Rect,
    can_scroll_x: bool,
    can_scroll_y: bool,
}

/// Finds the nearest ancestor of `element` that clips or scrolls.
///
/// Falls back to the root, whose visible box is the viewport. Without
/// computed styles every element is measured against the root.
fn find_reference<H: Host + ?Sized>(host: &H, element: &H::Element) -> Reference<H::Element> {
    let root = host.root();
    if host.capabilities().computed_style {
        let mut current = host.parent(element);
        for _ in 0..MAX_DEPTH {
            let Some(node) = current else {
                break;
            };
            if node == root {
                break;
            }
            if let Some(style) = host.style(&node) {
                let metrics = host.scroll_metrics(&node).unwrap_or_default();
                let can_scroll_x = style.overflow_x.scrolls() && metrics.overflows_x();
                let can_scroll_y = style.overflow_y.scrolls() && metrics.overflows_y();
                if style.clips() || can_scroll_x || can_scroll_y {
                    let border = rect_of(host, &node).rect;
                    let visible = visible_box(
                        border,
                        &style,
                        &metrics,
                        can_scroll_x || can_scroll_y,
                    );
                    return Reference {
                        node: Some(node),
                        visible,
                        can_scroll_x,
                        can_scroll_y,
                    };
                }
            }
            current = host.parent(&node);
        }
    }

    let metrics = host.scroll_metrics(&root).unwrap_or_default();
    Reference {
        node: None,
        visible: visible_box(host.viewport().rect(), &BoxStyle::default(), &metrics, true),
        can_scroll_x: metrics.overflows_x(),
        can_scroll_y: metrics.overflows_y(),
    }
}

/// The part of `border` that can show descendants: the CSS clip applied,
/// then scrollbars removed from the right and bottom.
fn visible_box(border: Rect, style: &BoxStyle, metrics: &ScrollMetrics, scrollable: bool) -> Rect {
    let mut visible = match style.clip {
        Some(clip) if !clip.is_zero() => clip.apply(border),
        _ => border,
    };
    if scrollable {
        visible.x1 = (visible.x1 - metrics.vertical_bar()).max(visible.x0);
        visible.y1 = (visible.y1 - metrics.horizontal_bar()).max(visible.y0);
    }
    visible
}

fn fraction(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        (part / whole).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Computes the full [`ExpansionEnvelope`] for `element`.
///
/// Never fails: unreadable nodes produce zero rectangles, which in turn give
/// zero fractions.
pub fn bounds_of<H: Host + ?Sized>(
    host: &H,
    element: &H::Element,
    options: &GeometryOptions,
) -> Bounds<H::Element> {
    let rect = rect_of(host, element);
    let viewport = host.viewport().rect();
    let reference = find_reference(host, element);
    let own = rect.rect;
    let limit = reference.visible;

    let expansion = Insets {
        top: own.y0 - limit.y0,
        left: own.x0 - limit.x0,
        right: limit.x1 - own.x1,
        bottom: limit.y1 - own.y1,
    }
    .clamp_non_negative();

    let overlap = own.intersect(limit);
    let area = own.area();
    let mut visible_fraction_x = fraction(overlap.width(), own.width());
    let mut visible_fraction_y = fraction(overlap.height(), own.height());
    let mut intersection_ratio = fraction(overlap.area(), area);
    let viewport_ratio = fraction(own.intersect(viewport).area(), area);

    if options.occlusion
        && options.grid_density > 0
        && intersection_ratio > 0.5
        && host.capabilities().hit_testing
    {
        if let Some(hit) =
            occlusion::largest_occluder(host, element, own, overlap, options.grid_density)
        {
            let covered = hit.overlap;
            visible_fraction_x = (visible_fraction_x - fraction(covered.width(), own.width())).max(0.0);
            visible_fraction_y =
                (visible_fraction_y - fraction(covered.height(), own.height())).max(0.0);
            intersection_ratio = (intersection_ratio - fraction(covered.area(), area)).max(0.0);
        }
    }

    Bounds {
        envelope: ExpansionEnvelope {
            rect,
            viewport,
            reference: limit,
            reference_is_root: reference.node.is_none(),
            expansion,
            can_scroll_x: reference.can_scroll_x,
            can_scroll_y: reference.can_scroll_y,
            visible_fraction_x,
            visible_fraction_y,
            intersection_ratio,
            viewport_ratio,
        },
        reference_scrollable: reference.node.is_some()
            && (reference.can_scroll_x || reference.can_scroll_y),
        reference: reference.node,
    }
}

#[cfg(test)]
mod tests {
    use kurbo::{Size, Vec2};

    use super::*;
    use crate::platform::{ClipRect, Overflow, PlatformCapabilities};
    use crate::sim::SimHost;

    fn host() -> SimHost {
        SimHost::new(Size::new(1000.0, 800.0))
    }

    #[test]
    fn rect_of_adds_page_scroll() {
        let mut host = host();
        let root = host.root();
        let el = host.add_element(root, Some("slot"), Rect::new(10.0, 500.0, 310.0, 750.0));
        host.scroll_to(Vec2::new(0.0, 200.0));
        let rect = rect_of(&host, &el);
        assert_eq!(rect.rect, Rect::new(10.0, 500.0, 310.0, 750.0));
        assert_eq!(rect.width(), 300.0);
        assert_eq!(rect.height(), 250.0);
    }

    #[test]
    fn detached_element_reads_as_zero() {
        let mut host = host();
        let root = host.root();
        let el = host.add_element(root, None, Rect::new(10.0, 10.0, 20.0, 20.0));
        host.detach(el);
        assert_eq!(rect_of(&host, &el), ElementRect::ZERO);
        let bounds = bounds_of(&host, &el, &GeometryOptions::default());
        assert_eq!(bounds.envelope.intersection_ratio, 0.0);
        assert_eq!(bounds.envelope.visible_fraction_x, 0.0);
    }

    #[test]
    fn root_reference_fully_visible_is_exactly_one() {
        let mut host = host();
        let root = host.root();
        let el = host.add_element(root, Some("slot"), Rect::new(100.0, 100.0, 400.0, 350.0));
        let bounds = bounds_of(&host, &el, &GeometryOptions::default());
        let env = bounds.envelope;
        assert!(env.reference_is_root);
        assert_eq!(bounds.reference, None);
        assert_eq!(env.intersection_ratio, 1.0);
        assert_eq!(env.viewport_ratio, 1.0);
        assert_eq!(env.visible_fraction_x, 1.0);
        assert_eq!(
            env.expansion,
            Insets {
                top: 100.0,
                left: 100.0,
                right: 600.0,
                bottom: 450.0,
            }
        );
    }

    #[test]
    fn half_scrolled_out_of_viewport() {
        let mut host = host();
        let root = host.root();
        let el = host.add_element(root, None, Rect::new(0.0, 0.0, 300.0, 200.0));
        host.scroll_to(Vec2::new(0.0, 100.0));
        let env = bounds_of(&host, &el, &GeometryOptions::default()).envelope;
        assert_eq!(env.visible_fraction_x, 1.0);
        assert_eq!(env.visible_fraction_y, 0.5);
        assert_eq!(env.intersection_ratio, 0.5);
        assert_eq!(env.expansion.top, 0.0, "room clamps at zero");
    }

    #[test]
    fn hidden_overflow_ancestor_is_reference() {
        let mut host = host();
        let root = host.root();
        let clip = host.add_element(root, None, Rect::new(0.0, 0.0, 400.0, 300.0));
        host.set_style(
            clip,
            BoxStyle {
                overflow_x: Overflow::Hidden,
                ..BoxStyle::default()
            },
        );
        let el = host.add_element(clip, None, Rect::new(50.0, 50.0, 350.0, 300.0));
        let bounds = bounds_of(&host, &el, &GeometryOptions::default());
        assert_eq!(bounds.reference, Some(clip));
        assert!(!bounds.reference_scrollable);
        assert!(bounds.scroll_ancestor().is_none());
        let env = bounds.envelope;
        assert!(!env.reference_is_root);
        assert_eq!(env.expansion.left, 50.0);
        assert_eq!(env.expansion.right, 50.0);
        assert_eq!(env.expansion.bottom, 0.0);
    }

    #[test]
    fn css_clip_narrows_room() {
        let mut host = host();
        let root = host.root();
        let clip = host.add_element(root, None, Rect::new(0.0, 0.0, 400.0, 300.0));
        host.set_style(
            clip,
            BoxStyle {
                clip: Some(ClipRect {
                    top: Some(10.0),
                    right: Some(380.0),
                    bottom: None,
                    left: None,
                }),
                ..BoxStyle::default()
            },
        );
        let el = host.add_element(clip, None, Rect::new(50.0, 50.0, 350.0, 250.0));
        let env = bounds_of(&host, &el, &GeometryOptions::default()).envelope;
        assert_eq!(env.expansion.top, 40.0);
        assert_eq!(env.expansion.right, 30.0);
    }

    #[test]
    fn scrollable_ancestor_subtracts_scrollbar() {
        let mut host = host();
        let root = host.root();
        let scroller = host.add_element(root, None, Rect::new(0.0, 0.0, 400.0, 300.0));
        host.set_style(
            scroller,
            BoxStyle {
                overflow_y: Overflow::Auto,
                ..BoxStyle::default()
            },
        );
        host.set_metrics(
            scroller,
            ScrollMetrics {
                scroll_width: 385.0,
                scroll_height: 900.0,
                client_width: 385.0,
                client_height: 300.0,
                offset_width: 400.0,
                offset_height: 300.0,
            },
        );
        let el = host.add_element(scroller, None, Rect::new(0.0, 0.0, 300.0, 250.0));
        let bounds = bounds_of(&host, &el, &GeometryOptions::default());
        assert_eq!(bounds.scroll_ancestor(), Some(&scroller));
        let env = bounds.envelope;
        assert!(env.can_scroll_y);
        assert!(!env.can_scroll_x);
        assert_eq!(env.expansion.right, 85.0);
    }

    #[test]
    fn auto_overflow_without_overflowing_content_is_not_reference() {
        let mut host = host();
        let root = host.root();
        let wrapper = host.add_element(root, None, Rect::new(0.0, 0.0, 400.0, 300.0));
        host.set_style(
            wrapper,
            BoxStyle {
                overflow_y: Overflow::Auto,
                ..BoxStyle::default()
            },
        );
        let el = host.add_element(wrapper, None, Rect::new(0.0, 0.0, 300.0, 250.0));
        let bounds = bounds_of(&host, &el, &GeometryOptions::default());
        assert!(bounds.envelope.reference_is_root);
    }

    #[test]
    fn without_computed_style_root_is_always_reference() {
        let mut host = host();
        host.set_capabilities(PlatformCapabilities {
            computed_style: false,
            ..PlatformCapabilities::default()
        });
        let root = host.root();
        let clip = host.add_element(root, None, Rect::new(0.0, 0.0, 400.0, 300.0));
        host.set_style(
            clip,
            BoxStyle {
                overflow_x: Overflow::Hidden,
                ..BoxStyle::default()
            },
        );
        let el = host.add_element(clip, None, Rect::new(50.0, 50.0, 350.0, 300.0));
        assert!(bounds_of(&host, &el, &GeometryOptions::default()).envelope.reference_is_root);
    }
}
