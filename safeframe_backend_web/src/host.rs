// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! DOM implementation of [`Host`].
//!
//! [`WebHost`] reads layout from the live document and creates the wrapper
//! and frame elements for each position. Elements are `web_sys::Element`;
//! windows are compared as plain `JsValue`s, which is what a
//! `MessageEvent::source` hands back.
//!
//! Listener callbacks are owned by the [`Driver`](crate::Driver). The host
//! only holds their JS function handles so it can add and remove them when
//! the engine asks.

use kurbo::{Point, Rect, Size};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, Element, HtmlDocument, HtmlElement, HtmlIFrameElement, Window};

use safeframe_core::platform::{
    BoxStyle, ClipRect, FrameBox, FrameSpec, Host, MountedFrame, Overflow, PlatformCapabilities,
    ScrollMetrics, Viewport,
};

use crate::BackendError;

/// Attribute carrying the position id on a mounted frame.
pub const POSITION_ATTR: &str = "data-sf-pos";

/// JS handles of the driver's event callbacks.
#[derive(Clone, Debug)]
pub(crate) struct Callbacks {
    pub(crate) message: js_sys::Function,
    pub(crate) scroll: js_sys::Function,
    pub(crate) resize: js_sys::Function,
    pub(crate) focus: js_sys::Function,
    pub(crate) blur: js_sys::Function,
    pub(crate) element_scroll: js_sys::Function,
    pub(crate) frame_load: js_sys::Function,
}

/// The browser document as a [`Host`].
#[derive(Debug)]
pub struct WebHost {
    window: Window,
    document: Document,
    root: Element,
    callbacks: Option<Callbacks>,
}

impl WebHost {
    /// Binds to the global window and document.
    ///
    /// # Errors
    ///
    /// [`BackendError::NoWindow`] or [`BackendError::NoDocument`] outside a
    /// browser main thread or before the document has a root element.
    pub fn new() -> Result<Self, BackendError> {
        let window = web_sys::window().ok_or(BackendError::NoWindow)?;
        let document = window.document().ok_or(BackendError::NoDocument)?;
        let root = document
            .document_element()
            .ok_or(BackendError::NoDocument)?;
        Ok(Self {
            window,
            document,
            root,
            callbacks: None,
        })
    }

    /// The bound window.
    #[must_use]
    pub fn window(&self) -> &Window {
        &self.window
    }

    pub(crate) fn install(&mut self, callbacks: Callbacks) {
        self.callbacks = Some(callbacks);
    }

    fn listen(&self, target: &web_sys::EventTarget, event: &str, attached: bool, f: &js_sys::Function) {
        // Adding the same function twice is a no-op in the DOM, as is
        // removing one that was never added.
        let _ = if attached {
            target.add_event_listener_with_callback(event, f)
        } else {
            target.remove_event_listener_with_callback(event, f)
        };
    }

    fn create(&self, tag: &str) -> Option<Element> {
        self.document.create_element(tag).ok()
    }
}

fn set_style(element: &Element, properties: &[(&str, &str)]) {
    let Some(html) = element.dyn_ref::<HtmlElement>() else {
        return;
    };
    let style = html.style();
    for (name, value) in properties {
        let _ = style.set_property(name, value);
    }
}

pub(crate) fn px(value: f64) -> String {
    format!("{value}px")
}

/// Parses a computed `z-index`; `auto` and garbage read as unset.
pub(crate) fn parse_z_index(value: &str) -> Option<i32> {
    value.trim().parse().ok()
}

impl Host for WebHost {
    type Element = Element;
    type Window = JsValue;

    fn capabilities(&self) -> PlatformCapabilities {
        PlatformCapabilities {
            native_messaging: js_sys::Reflect::has(&self.window, &JsValue::from_str("postMessage"))
                .unwrap_or(false),
            ..PlatformCapabilities::default()
        }
    }

    fn root(&self) -> Element {
        self.root.clone()
    }

    fn element_by_id(&self, id: &str) -> Option<Element> {
        self.document.get_element_by_id(id)
    }

    fn parent(&self, element: &Element) -> Option<Element> {
        element.parent_element()
    }

    fn client_rect(&self, element: &Element) -> Option<Rect> {
        if !element.is_connected() {
            return None;
        }
        let r = element.get_bounding_client_rect();
        Some(Rect::new(r.left(), r.top(), r.right(), r.bottom()))
    }

    fn style(&self, element: &Element) -> Option<BoxStyle> {
        let computed = self.window.get_computed_style(element).ok()??;
        let prop = |name: &str| computed.get_property_value(name).unwrap_or_default();
        Some(BoxStyle {
            overflow_x: Overflow::parse(&prop("overflow-x")),
            overflow_y: Overflow::parse(&prop("overflow-y")),
            clip: ClipRect::parse(&prop("clip")),
            z_index: parse_z_index(&prop("z-index")),
        })
    }

    fn scroll_metrics(&self, element: &Element) -> Option<ScrollMetrics> {
        let html = element.dyn_ref::<HtmlElement>()?;
        Some(ScrollMetrics {
            scroll_width: f64::from(element.scroll_width()),
            scroll_height: f64::from(element.scroll_height()),
            client_width: f64::from(element.client_width()),
            client_height: f64::from(element.client_height()),
            offset_width: f64::from(html.offset_width()),
            offset_height: f64::from(html.offset_height()),
        })
    }

    fn viewport(&self) -> Viewport {
        let scroll = kurbo::Vec2::new(
            self.window.scroll_x().unwrap_or(0.0),
            self.window.scroll_y().unwrap_or(0.0),
        );
        // The document element's client box excludes scroll bars.
        let client = Some(Size::new(
            f64::from(self.root.client_width()),
            f64::from(self.root.client_height()),
        ))
        .filter(|s| s.width > 0.0 && s.height > 0.0);
        let size = client.unwrap_or_else(|| {
            let dim = |v: Result<JsValue, JsValue>| v.ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
            Size::new(dim(self.window.inner_width()), dim(self.window.inner_height()))
        });
        Viewport { scroll, size }
    }

    fn element_from_point(&self, point: Point) -> Option<Element> {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "elementFromPoint takes CSS pixels as float; f32 covers any viewport"
        )]
        let (x, y) = (point.x as f32, point.y as f32);
        self.document.element_from_point(x, y)
    }

    fn has_focus(&self) -> bool {
        self.document.has_focus().unwrap_or(false)
    }

    fn origin(&self) -> String {
        self.window.location().origin().unwrap_or_default()
    }

    fn mount_frame(&mut self, spec: &FrameSpec) -> Option<MountedFrame<Element>> {
        let destination = self.document.get_element_by_id(&spec.destination_id)?;
        let wrapper = self.create("div")?;
        wrapper.set_id(&format!("{}_wrapper", spec.position_id));
        set_style(
            &wrapper,
            &[
                ("position", "relative"),
                ("display", "inline-block"),
                ("width", &px(spec.width)),
                ("height", &px(spec.height)),
            ],
        );

        let frame = self.create("iframe")?.dyn_into::<HtmlIFrameElement>().ok()?;
        frame.set_id(&format!("{}_frame", spec.position_id));
        frame.set_src(&spec.src);
        frame.set_name(&spec.name);
        frame.set_width(&spec.width.to_string());
        frame.set_height(&spec.height.to_string());
        let _ = frame.set_attribute(POSITION_ATTR, &spec.position_id);
        let _ = frame.set_attribute("frameborder", "0");
        let _ = frame.set_attribute("scrolling", "no");
        let _ = frame.set_attribute("allowtransparency", "true");
        let z_index = spec.z_index.map(|z| z.to_string()).unwrap_or_default();
        set_style(
            &frame,
            &[
                ("position", "absolute"),
                ("left", "0px"),
                ("top", "0px"),
                ("border", "0"),
                ("width", &px(spec.width)),
                ("height", &px(spec.height)),
                ("background-color", &spec.background_color),
                ("z-index", &z_index),
            ],
        );
        if !spec.custom_css.is_empty() {
            let style = frame.style();
            style.set_css_text(&format!("{}{}", style.css_text(), spec.custom_css));
        }
        if let Some(callbacks) = &self.callbacks {
            self.listen(&frame, "load", true, &callbacks.frame_load);
        }

        wrapper.append_child(&frame).ok()?;
        destination.replace_with_with_node_1(&wrapper).ok()?;
        Some(MountedFrame {
            wrapper,
            frame: frame.into(),
            shim: None,
        })
    }

    fn unmount_frame(&mut self, mounted: &MountedFrame<Element>, destination_id: &str) {
        if let Some(callbacks) = &self.callbacks {
            self.listen(&mounted.frame, "load", false, &callbacks.frame_load);
        }
        if let Some(shim) = &mounted.shim {
            shim.remove();
        }
        let Some(placeholder) = self.create("div") else {
            mounted.wrapper.remove();
            return;
        };
        placeholder.set_id(destination_id);
        if mounted.wrapper.replace_with_with_node_1(&placeholder).is_err() {
            mounted.wrapper.remove();
        }
    }

    fn set_frame_box(&mut self, frame: &Element, frame_box: &FrameBox) {
        let z_index = frame_box.z_index.map(|z| z.to_string()).unwrap_or_default();
        set_style(
            frame,
            &[
                ("left", &px(frame_box.left)),
                ("top", &px(frame_box.top)),
                ("width", &px(frame_box.width)),
                ("height", &px(frame_box.height)),
                ("z-index", &z_index),
            ],
        );
        let _ = frame.set_attribute("width", &frame_box.width.to_string());
        let _ = frame.set_attribute("height", &frame_box.height.to_string());
    }

    fn set_wrapper_size(&mut self, wrapper: &Element, size: Size) {
        set_style(
            wrapper,
            &[("width", &px(size.width)), ("height", &px(size.height))],
        );
    }

    fn frame_window(&self, frame: &Element) -> Option<JsValue> {
        frame
            .dyn_ref::<HtmlIFrameElement>()?
            .content_window()
            .map(JsValue::from)
    }

    fn post_message(&mut self, frame: &Element, payload: &str, target_origin: &str) -> bool {
        let Some(window) = frame
            .dyn_ref::<HtmlIFrameElement>()
            .and_then(HtmlIFrameElement::content_window)
        else {
            return false;
        };
        window
            .post_message(&JsValue::from_str(payload), target_origin)
            .is_ok()
    }

    fn post_to_self(&mut self, payload: &str) -> bool {
        let origin = self.origin();
        let target = if origin.is_empty() || origin == "null" {
            "*"
        } else {
            origin.as_str()
        };
        self.window
            .post_message(&JsValue::from_str(payload), target)
            .is_ok()
    }

    fn set_message_listener(&mut self, attached: bool) {
        if let Some(callbacks) = &self.callbacks {
            self.listen(&self.window, "message", attached, &callbacks.message);
        }
    }

    fn set_window_listeners(&mut self, attached: bool) {
        if let Some(callbacks) = &self.callbacks {
            for (event, f) in [
                ("scroll", &callbacks.scroll),
                ("resize", &callbacks.resize),
                ("focus", &callbacks.focus),
                ("blur", &callbacks.blur),
            ] {
                self.listen(&self.window, event, attached, f);
            }
        }
    }

    fn watch_scroll(&mut self, element: &Element) -> bool {
        let Some(callbacks) = &self.callbacks else {
            return false;
        };
        element
            .add_event_listener_with_callback("scroll", &callbacks.element_scroll)
            .is_ok()
    }

    fn unwatch_scroll(&mut self, element: &Element) {
        if let Some(callbacks) = &self.callbacks {
            self.listen(element, "scroll", false, &callbacks.element_scroll);
        }
    }

    fn cookie_string(&self) -> Option<String> {
        self.document.dyn_ref::<HtmlDocument>()?.cookie().ok()
    }

    fn set_cookie_string(&mut self, cookie: &str) -> bool {
        self.document
            .dyn_ref::<HtmlDocument>()
            .is_some_and(|doc| doc.set_cookie(cookie).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn z_index_parsing() {
        assert_eq!(parse_z_index("10"), Some(10));
        assert_eq!(parse_z_index(" -2 "), Some(-2));
        assert_eq!(parse_z_index("auto"), None, "auto is unset");
    }

    #[test]
    fn pixel_lengths() {
        assert_eq!(px(300.0), "300px");
        assert_eq!(px(-12.5), "-12.5px");
    }
}
