// Copyright 2026 the Safeframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-memory host for tests and demos.
//!
//! [`SimHost`] is a scripted document: a flat node table with parent links,
//! document-space rectangles, computed styles, and scroll metrics set by the
//! caller. Frames get their own [`WindowId`]. Everything the engine sends out
//! (posted messages, proxy sends, self-posts, cookie writes, mounted frame
//! specs) is recorded for inspection.
//!
//! Hit testing picks the topmost attached node by `z-index` (unset counts as
//! zero), then by insertion order, so nodes added later paint on top.
//!
//! [`RecordingHooks`] records every [`Hooks`] call and can veto or fail on
//! demand. Clones share one log, so a test keeps a handle after moving a
//! clone into the configuration.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use kurbo::{Point, Rect, Size, Vec2};

use crate::hooks::{HookError, Hooks, Verdict};
use crate::platform::{
    BoxStyle, FrameBox, FrameSpec, Host, MountedFrame, PlatformCapabilities, ScrollMetrics,
    Viewport,
};
use crate::wire::Command;

/// Handle to a simulated element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

/// Handle to a simulated browsing context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowId(u32);

/// A message posted to a frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Posted {
    /// Receiving frame.
    pub frame: NodeId,
    /// Encoded payload.
    pub payload: String,
    /// Target origin it was addressed to.
    pub target_origin: String,
}

/// A message relayed through the proxy transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proxied {
    /// Receiving frame.
    pub frame: NodeId,
    /// Proxy document URL.
    pub proxy_url: String,
    /// Encoded payload.
    pub payload: String,
}

#[derive(Clone, Debug)]
struct Node {
    id: Option<String>,
    parent: Option<NodeId>,
    rect: Rect,
    style: BoxStyle,
    metrics: Option<ScrollMetrics>,
    window: Option<WindowId>,
    attached: bool,
}

/// A scripted document implementing [`Host`].
#[derive(Clone, Debug)]
pub struct SimHost {
    nodes: Vec<Node>,
    viewport: Viewport,
    capabilities: PlatformCapabilities,
    focused: bool,
    origin: String,
    next_window: u32,
    message_listener: bool,
    window_listeners: bool,
    watched: BTreeSet<NodeId>,
    replaced: BTreeMap<NodeId, Rect>,
    mounts: Vec<FrameSpec>,
    posted: Vec<Posted>,
    proxied: Vec<Proxied>,
    self_posts: Vec<String>,
    jar: BTreeMap<String, String>,
    cookie_writes: Vec<String>,
}

impl SimHost {
    /// Origin reported by [`Host::origin`].
    pub const ORIGIN: &'static str = "https://host.example";

    /// Creates a document whose root covers a viewport of `size`.
    #[must_use]
    pub fn new(size: Size) -> Self {
        let root = Node {
            id: None,
            parent: None,
            rect: Rect::from_origin_size(Point::ORIGIN, size),
            style: BoxStyle::default(),
            metrics: None,
            window: None,
            attached: true,
        };
        Self {
            nodes: vec![root],
            viewport: Viewport {
                scroll: Vec2::ZERO,
                size,
            },
            capabilities: PlatformCapabilities::default(),
            focused: true,
            origin: Self::ORIGIN.to_owned(),
            next_window: 0,
            message_listener: false,
            window_listeners: false,
            watched: BTreeSet::new(),
            replaced: BTreeMap::new(),
            mounts: Vec::new(),
            posted: Vec::new(),
            proxied: Vec::new(),
            self_posts: Vec::new(),
            jar: BTreeMap::new(),
            cookie_writes: Vec::new(),
        }
    }

    // -- Document building --

    /// Adds an element under `parent` at `rect` (document coordinates).
    pub fn add_element(&mut self, parent: NodeId, id: Option<&str>, rect: Rect) -> NodeId {
        self.push(Node {
            id: id.map(str::to_owned),
            parent: Some(parent),
            rect,
            style: BoxStyle::default(),
            metrics: None,
            window: None,
            attached: true,
        })
    }

    /// Adds a frame element with its own window.
    pub fn add_frame(&mut self, parent: NodeId, rect: Rect) -> NodeId {
        let window = self.new_window();
        let node = self.add_element(parent, None, rect);
        self.nodes[node.0 as usize].window = Some(window);
        node
    }

    /// Sets an element's computed style.
    pub fn set_style(&mut self, node: NodeId, style: BoxStyle) {
        if let Some(n) = self.node_mut(node) {
            n.style = style;
        }
    }

    /// Sets an element's scroll extents.
    pub fn set_metrics(&mut self, node: NodeId, metrics: ScrollMetrics) {
        if let Some(n) = self.node_mut(node) {
            n.metrics = Some(metrics);
        }
    }

    /// Scrolls the page.
    pub fn scroll_to(&mut self, scroll: Vec2) {
        self.viewport.scroll = scroll;
    }

    /// Resizes the viewport (and the root with it).
    pub fn resize_viewport(&mut self, size: Size) {
        self.viewport.size = size;
        self.nodes[0].rect = Rect::from_origin_size(Point::ORIGIN, size);
    }

    /// Removes an element (and so its subtree) from the document.
    pub fn detach(&mut self, node: NodeId) {
        if node.0 != 0 {
            if let Some(n) = self.node_mut(node) {
                n.attached = false;
            }
        }
    }

    /// Overrides the reported platform capabilities.
    pub fn set_capabilities(&mut self, capabilities: PlatformCapabilities) {
        self.capabilities = capabilities;
    }

    /// Sets whether the host window has focus.
    pub fn set_focus(&mut self, focused: bool) {
        self.focused = focused;
    }

    /// Stores a cookie directly in the jar (value taken as already encoded).
    pub fn set_cookie(&mut self, name: &str, value: &str) {
        self.jar.insert(name.to_owned(), value.to_owned());
    }

    // -- Inspection --

    /// Attached children of `node`, in insertion order.
    #[must_use]
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.ids()
            .filter(|&id| self.nodes[id.0 as usize].parent == Some(node) && self.is_attached(id))
            .collect()
    }

    /// The element's document-space rectangle.
    #[must_use]
    pub fn rect(&self, node: NodeId) -> Option<Rect> {
        self.is_attached(node)
            .then(|| self.nodes[node.0 as usize].rect)
    }

    /// The element's `z-index`.
    #[must_use]
    pub fn z_index(&self, node: NodeId) -> Option<i32> {
        self.node(node).and_then(|n| n.style.z_index)
    }

    /// Whether `node` and all of its ancestors are in the document.
    #[must_use]
    pub fn is_attached(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            let Some(n) = self.node(id) else {
                return false;
            };
            if !n.attached {
                return false;
            }
            current = n.parent;
        }
        true
    }

    /// Whether the inbound message listener is attached.
    #[must_use]
    pub fn message_listener(&self) -> bool {
        self.message_listener
    }

    /// Whether the window listeners are attached.
    #[must_use]
    pub fn window_listeners(&self) -> bool {
        self.window_listeners
    }

    /// Elements whose `scroll` events are forwarded.
    #[must_use]
    pub fn watched(&self) -> Vec<NodeId> {
        self.watched.iter().copied().collect()
    }

    /// Every frame spec mounted so far.
    #[must_use]
    pub fn mounts(&self) -> &[FrameSpec] {
        &self.mounts
    }

    /// Every cookie assignment so far.
    #[must_use]
    pub fn cookie_writes(&self) -> &[String] {
        &self.cookie_writes
    }

    /// Drains natively posted messages.
    pub fn take_posted(&mut self) -> Vec<Posted> {
        core::mem::take(&mut self.posted)
    }

    /// Drains proxied messages.
    pub fn take_proxied(&mut self) -> Vec<Proxied> {
        core::mem::take(&mut self.proxied)
    }

    /// Drains messages posted to the host's own window.
    pub fn take_self_posts(&mut self) -> Vec<String> {
        core::mem::take(&mut self.self_posts)
    }

    // -- Internals --

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(node);
        id
    }

    fn new_window(&mut self) -> WindowId {
        self.next_window += 1;
        WindowId(self.next_window)
    }

    fn ids(&self) -> impl DoubleEndedIterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).filter_map(|i| u32::try_from(i).ok().map(NodeId))
    }

    fn node(&self, node: NodeId) -> Option<&Node> {
        self.nodes.get(node.0 as usize)
    }

    fn node_mut(&mut self, node: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(node.0 as usize)
    }

    fn attached_node(&self, node: NodeId) -> Option<&Node> {
        self.is_attached(node).then(|| self.node(node)).flatten()
    }
}

impl Host for SimHost {
    type Element = NodeId;
    type Window = WindowId;

    fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities
    }

    fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.ids()
            .rev()
            .find(|&n| self.nodes[n.0 as usize].id.as_deref() == Some(id) && self.is_attached(n))
    }

    fn parent(&self, element: &NodeId) -> Option<NodeId> {
        self.attached_node(*element)?.parent
    }

    fn client_rect(&self, element: &NodeId) -> Option<Rect> {
        let rect = self.attached_node(*element)?.rect;
        Some(rect - self.viewport.scroll)
    }

    fn style(&self, element: &NodeId) -> Option<BoxStyle> {
        Some(self.attached_node(*element)?.style)
    }

    fn scroll_metrics(&self, element: &NodeId) -> Option<ScrollMetrics> {
        let node = self.attached_node(*element)?;
        Some(node.metrics.unwrap_or_else(|| {
            let size = node.rect.size();
            ScrollMetrics {
                scroll_width: size.width,
                scroll_height: size.height,
                client_width: size.width,
                client_height: size.height,
                offset_width: size.width,
                offset_height: size.height,
            }
        }))
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn element_from_point(&self, point: Point) -> Option<NodeId> {
        let doc = point + self.viewport.scroll;
        self.ids()
            .filter(|&n| self.is_attached(n) && self.nodes[n.0 as usize].rect.contains(doc))
            .max_by_key(|&n| (self.nodes[n.0 as usize].style.z_index.unwrap_or(0), n))
    }

    fn has_focus(&self) -> bool {
        self.focused
    }

    fn origin(&self) -> String {
        self.origin.clone()
    }

    fn mount_frame(&mut self, spec: &FrameSpec) -> Option<MountedFrame<NodeId>> {
        let destination = self.element_by_id(&spec.destination_id)?;
        let dest = self.nodes[destination.0 as usize].clone();
        self.nodes[destination.0 as usize].attached = false;

        let rect = Rect::from_origin_size(dest.rect.origin(), Size::new(spec.width, spec.height));
        let wrapper = self.push(Node {
            id: Some(format!("{}_wrapper", spec.position_id)),
            parent: dest.parent,
            rect,
            style: BoxStyle::default(),
            metrics: None,
            window: None,
            attached: true,
        });
        self.replaced.insert(wrapper, dest.rect);
        let window = self.new_window();
        let frame = self.push(Node {
            id: Some(format!("{}_frame", spec.position_id)),
            parent: Some(wrapper),
            rect,
            style: BoxStyle {
                z_index: spec.z_index,
                ..BoxStyle::default()
            },
            metrics: None,
            window: Some(window),
            attached: true,
        });
        self.mounts.push(spec.clone());
        Some(MountedFrame {
            wrapper,
            frame,
            shim: None,
        })
    }

    fn unmount_frame(&mut self, mounted: &MountedFrame<NodeId>, destination_id: &str) {
        let parent = self.node(mounted.wrapper).and_then(|n| n.parent);
        let rect = self
            .replaced
            .remove(&mounted.wrapper)
            .or_else(|| self.node(mounted.wrapper).map(|n| n.rect))
            .unwrap_or_default();
        for node in [Some(mounted.wrapper), Some(mounted.frame), mounted.shim]
            .into_iter()
            .flatten()
        {
            self.detach(node);
            self.watched.remove(&node);
        }
        self.push(Node {
            id: Some(destination_id.to_owned()),
            parent: parent.or(Some(NodeId(0))),
            rect,
            style: BoxStyle::default(),
            metrics: None,
            window: None,
            attached: true,
        });
    }

    fn set_frame_box(&mut self, frame: &NodeId, frame_box: &FrameBox) {
        let origin = self
            .node(*frame)
            .and_then(|n| n.parent)
            .and_then(|w| self.node(w))
            .map_or(Point::ORIGIN, |w| w.rect.origin());
        if let Some(n) = self.node_mut(*frame) {
            n.rect = Rect::from_origin_size(
                origin + Vec2::new(frame_box.left, frame_box.top),
                Size::new(frame_box.width, frame_box.height),
            );
            n.style.z_index = frame_box.z_index;
        }
    }

    fn set_wrapper_size(&mut self, wrapper: &NodeId, size: Size) {
        if let Some(n) = self.node_mut(*wrapper) {
            n.rect = Rect::from_origin_size(n.rect.origin(), size);
        }
    }

    fn place_shim(&mut self, mounted: &mut MountedFrame<NodeId>, frame_box: &FrameBox) {
        self.remove_shim(mounted);
        let Some(rect) = self.rect(mounted.frame) else {
            return;
        };
        let parent = self.node(mounted.wrapper).and_then(|n| n.parent);
        let shim = self.push(Node {
            id: None,
            parent,
            rect,
            style: BoxStyle {
                z_index: frame_box.z_index.map(|z| z.saturating_sub(1)),
                ..BoxStyle::default()
            },
            metrics: None,
            window: None,
            attached: true,
        });
        mounted.shim = Some(shim);
    }

    fn remove_shim(&mut self, mounted: &mut MountedFrame<NodeId>) {
        if let Some(shim) = mounted.shim.take() {
            self.detach(shim);
        }
    }

    fn frame_window(&self, frame: &NodeId) -> Option<WindowId> {
        self.node(*frame)?.window
    }

    fn post_message(&mut self, frame: &NodeId, payload: &str, target_origin: &str) -> bool {
        if !self.is_attached(*frame) || self.frame_window(frame).is_none() {
            return false;
        }
        self.posted.push(Posted {
            frame: *frame,
            payload: payload.to_owned(),
            target_origin: target_origin.to_owned(),
        });
        true
    }

    fn proxy_send(&mut self, frame: &NodeId, proxy_url: &str, payload: &str) -> bool {
        self.proxied.push(Proxied {
            frame: *frame,
            proxy_url: proxy_url.to_owned(),
            payload: payload.to_owned(),
        });
        true
    }

    fn post_to_self(&mut self, payload: &str) -> bool {
        if !self.capabilities.native_messaging {
            return false;
        }
        self.self_posts.push(payload.to_owned());
        true
    }

    fn set_message_listener(&mut self, attached: bool) {
        self.message_listener = attached;
    }

    fn set_window_listeners(&mut self, attached: bool) {
        self.window_listeners = attached;
    }

    fn watch_scroll(&mut self, element: &NodeId) -> bool {
        if !self.is_attached(*element) {
            return false;
        }
        self.watched.insert(*element);
        true
    }

    fn unwatch_scroll(&mut self, element: &NodeId) {
        self.watched.remove(element);
    }

    fn cookie_string(&self) -> Option<String> {
        Some(
            self.jar
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    fn set_cookie_string(&mut self, cookie: &str) -> bool {
        let pair = cookie.split(';').next().unwrap_or_default();
        let Some((name, value)) = pair.split_once('=') else {
            return false;
        };
        self.jar.insert(name.trim().to_owned(), value.trim().to_owned());
        self.cookie_writes.push(cookie.to_owned());
        true
    }
}

/// One recorded [`Hooks`] call.
#[derive(Clone, Debug, PartialEq)]
pub enum HookCall {
    /// [`Hooks::before_pos_msg`].
    BeforePosMsg {
        /// Position id.
        position: String,
        /// Command being gated.
        command: Command,
        /// Requested growth.
        delta: Vec2,
    },
    /// [`Hooks::pos_msg`].
    PosMsg {
        /// Position id.
        position: String,
        /// Command name.
        command: String,
        /// Command data.
        data: String,
    },
    /// [`Hooks::start_pos_render`].
    StartRender(String),
    /// [`Hooks::end_pos_render`].
    EndRender(String),
    /// [`Hooks::failure`].
    Failure {
        /// Position id.
        position: String,
        /// Reason.
        reason: String,
    },
}

#[derive(Debug, Default)]
struct HookState {
    calls: Vec<HookCall>,
    veto: bool,
    failing: bool,
}

/// [`Hooks`] that record every call.
#[derive(Clone, Debug, Default)]
pub struct RecordingHooks {
    state: Rc<RefCell<HookState>>,
}

impl RecordingHooks {
    /// Creates an empty recorder that lets everything proceed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `before_pos_msg` return [`Verdict::Cancel`].
    pub fn set_veto(&self, veto: bool) {
        self.state.borrow_mut().veto = veto;
    }

    /// Makes every fallible hook return an error.
    pub fn set_failing(&self, failing: bool) {
        self.state.borrow_mut().failing = failing;
    }

    /// All calls so far.
    #[must_use]
    pub fn calls(&self) -> Vec<HookCall> {
        self.state.borrow().calls.clone()
    }

    /// Number of `pos_msg` calls for `position` and `command`.
    #[must_use]
    pub fn pos_msg_count(&self, position: &str, command: &str) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| {
                matches!(c, HookCall::PosMsg { position: p, command: cmd, .. }
                    if p == position && cmd == command)
            })
            .count()
    }

    fn record(&self, call: HookCall) -> Result<(), HookError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(call);
        if state.failing {
            return Err(HookError::new("recording hook set to fail"));
        }
        Ok(())
    }
}

impl Hooks for RecordingHooks {
    fn before_pos_msg(
        &mut self,
        position: &str,
        command: Command,
        delta: Vec2,
    ) -> Result<Verdict, HookError> {
        self.record(HookCall::BeforePosMsg {
            position: position.to_owned(),
            command,
            delta,
        })?;
        Ok(if self.state.borrow().veto {
            Verdict::Cancel
        } else {
            Verdict::Proceed
        })
    }

    fn pos_msg(&mut self, position: &str, command: &str, data: &str) -> Result<(), HookError> {
        self.record(HookCall::PosMsg {
            position: position.to_owned(),
            command: command.to_owned(),
            data: data.to_owned(),
        })
    }

    fn start_pos_render(&mut self, position: &str) -> Result<(), HookError> {
        self.record(HookCall::StartRender(position.to_owned()))
    }

    fn end_pos_render(&mut self, position: &str) -> Result<(), HookError> {
        self.record(HookCall::EndRender(position.to_owned()))
    }

    fn failure(&mut self, position: &str, reason: &str) {
        _ = self.record(HookCall::Failure {
            position: position.to_owned(),
            reason: reason.to_owned(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(dest: &str) -> FrameSpec {
        FrameSpec {
            position_id: "p1".into(),
            destination_id: dest.into(),
            src: "https://frames.example/render.html".into(),
            name: String::new(),
            width: 300.0,
            height: 250.0,
            z_index: None,
            background_color: "transparent".into(),
            custom_css: String::new(),
        }
    }

    #[test]
    fn hit_testing_prefers_z_then_insertion() {
        let mut host = SimHost::new(Size::new(500.0, 500.0));
        let root = host.root();
        let low = host.add_element(root, None, Rect::new(0.0, 0.0, 100.0, 100.0));
        let high = host.add_element(root, None, Rect::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(host.element_from_point(Point::new(5.0, 5.0)), Some(high));
        host.set_style(
            low,
            BoxStyle {
                z_index: Some(2),
                ..BoxStyle::default()
            },
        );
        assert_eq!(host.element_from_point(Point::new(5.0, 5.0)), Some(low));
        assert_eq!(host.element_from_point(Point::new(400.0, 400.0)), Some(root));
    }

    #[test]
    fn mount_and_unmount_restore_placeholder() {
        let mut host = SimHost::new(Size::new(500.0, 500.0));
        let root = host.root();
        let slot = host.add_element(root, Some("slot"), Rect::new(10.0, 20.0, 110.0, 120.0));
        host.add_element(slot, None, Rect::new(10.0, 20.0, 50.0, 50.0));

        let mounted = host.mount_frame(&spec("slot")).unwrap();
        assert!(host.element_by_id("slot").is_none(), "destination replaced");
        assert_eq!(host.rect(mounted.frame), Some(Rect::new(10.0, 20.0, 310.0, 270.0)));
        assert!(host.frame_window(&mounted.frame).is_some());

        host.unmount_frame(&mounted, "slot");
        let placeholder = host.element_by_id("slot").unwrap();
        assert_ne!(placeholder, slot);
        assert!(host.children(placeholder).is_empty());
        assert!(!host.is_attached(mounted.frame));
        assert_eq!(host.mount_frame(&spec("missing")), None);
    }

    #[test]
    fn cookies_round_trip_through_the_jar() {
        let mut host = SimHost::new(Size::new(10.0, 10.0));
        host.set_cookie("a", "1");
        assert!(host.set_cookie_string("b=two%20words; max-age=86400; path=/"));
        assert_eq!(host.cookie_string().as_deref(), Some("a=1; b=two%20words"));
        assert_eq!(host.cookie_writes().len(), 1);
        assert!(!host.set_cookie_string("garbage"));
    }

    #[test]
    fn recording_hooks_share_state_across_clones() {
        let hooks = RecordingHooks::new();
        let mut clone = hooks.clone();
        clone.pos_msg("p1", "msg", "hi").unwrap();
        hooks.set_veto(true);
        assert_eq!(
            clone.before_pos_msg("p1", Command::Collapse, Vec2::ZERO),
            Ok(Verdict::Cancel)
        );
        assert_eq!(hooks.pos_msg_count("p1", "msg"), 1);
        hooks.set_failing(true);
        assert!(clone.start_pos_render("p1").is_err());
        assert_eq!(hooks.calls().len(), 3);
    }
}
