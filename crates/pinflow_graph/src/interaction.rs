// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-frame interaction state machine.
//!
//! [`Graph::update`] runs once per rendered frame:
//! sample input, resolve hover, dispatch gestures, run node bodies, sweep destroyed
//! nodes and stale dynamic pins, lay out, then hand everything to the renderer.

use crate::evaluation::Eval;
use crate::geometry::CubicBezier;
use crate::graph::{ConnectionError, Graph};
use crate::link::{Link, LinkId};
use crate::node::{Node, NodeId};
use crate::pin::{AnyPin, ConnectionFilter, InPin, OutPin, PinData, PinKind, PinRef, PinStyle, PinUid};
use crate::render::{LinkVisual, NodeVisual, PinVisual, Renderer};
use egui::{Pos2, Rect, Vec2};

/// Called when a link drag is released over empty space, with the source pin
pub type DroppedLinkCallback = Box<dyn FnMut(&mut Graph, PinRef)>;

/// Called on right-click, with the hovered node if any
pub type ContextMenuCallback = Box<dyn FnMut(&mut Graph, Option<NodeId>)>;

/// Pointer and keyboard state for one frame (screen space)
#[derive(Debug, Clone, Default)]
pub struct FrameInput {
    /// Pointer position, if over the canvas
    pub pointer: Option<Pos2>,
    /// Primary button went down this frame
    pub primary_pressed: bool,
    /// Primary button is held
    pub primary_down: bool,
    /// Primary button went up this frame
    pub primary_released: bool,
    /// Secondary button was clicked this frame
    pub secondary_clicked: bool,
    /// Delete key was pressed this frame
    pub delete_pressed: bool,
    /// Held modifiers
    pub modifiers: egui::Modifiers,
    /// Held keys
    pub keys_down: Vec<egui::Key>,
}

impl FrameInput {
    /// Pointer resting at `pointer`
    pub fn hover(pointer: Pos2) -> Self {
        Self {
            pointer: Some(pointer),
            ..Self::default()
        }
    }

    /// Primary button pressed at `pointer`
    pub fn press(pointer: Pos2) -> Self {
        Self {
            primary_pressed: true,
            primary_down: true,
            ..Self::hover(pointer)
        }
    }

    /// Primary button held at `pointer`
    pub fn drag(pointer: Pos2) -> Self {
        Self {
            primary_down: true,
            ..Self::hover(pointer)
        }
    }

    /// Primary button released at `pointer`
    pub fn release(pointer: Pos2) -> Self {
        Self {
            primary_released: true,
            ..Self::hover(pointer)
        }
    }

    /// Set the held modifiers
    pub fn with_modifiers(mut self, modifiers: egui::Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Add a held key
    pub fn with_key(mut self, key: egui::Key) -> Self {
        self.keys_down.push(key);
        self
    }

    fn additive(&self) -> bool {
        self.modifiers.ctrl || self.modifiers.command
    }
}

/// Elements under the pointer this frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hover {
    /// Pin whose hit box contains the pointer
    pub pin: Option<PinRef>,
    /// Link nearest the pointer, within the hover radius
    pub link: Option<LinkId>,
    /// Topmost node under the pointer
    pub node: Option<NodeId>,
}

/// The one element that reacts to the pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoverTarget {
    /// A pin
    Pin(PinRef),
    /// A link
    Link(LinkId),
    /// A node body
    Node(NodeId),
    /// Nothing
    Background,
}

impl Hover {
    /// Primary hover: pins over links over nodes over background
    pub fn primary(&self) -> HoverTarget {
        if let Some(pin) = self.pin {
            HoverTarget::Pin(pin)
        } else if let Some(link) = self.link {
            HoverTarget::Link(link)
        } else if let Some(node) = self.node {
            HoverTarget::Node(node)
        } else {
            HoverTarget::Background
        }
    }
}

/// Single-use token for this frame's primary press
#[derive(Debug, Clone, Copy, Default)]
pub struct ClickToken {
    pressed: bool,
    used: bool,
}

impl ClickToken {
    /// Whether a press happened this frame and nothing has claimed it
    pub fn available(&self) -> bool {
        self.pressed && !self.used
    }

    /// Claim the press; `false` if there was none or it is already claimed
    pub fn consume(&mut self) -> bool {
        if !self.available() {
            return false;
        }
        self.used = true;
        true
    }

    /// Hand the token back
    pub fn release(&mut self) {
        self.used = false;
    }

    fn arm(&mut self, pressed: bool) {
        self.pressed = pressed;
    }
}

#[derive(Debug, Default)]
pub(crate) struct InteractionState {
    pub(crate) hover: Hover,
    /// Pin a link drag started from
    pub(crate) drag_out: Option<PinRef>,
    pub(crate) click: ClickToken,
    dragging_node: bool,
    dragging_node_next: bool,
    /// Pointer in grid space
    pointer: Option<Pos2>,
    pointer_screen: Option<Pos2>,
    pointer_delta: Vec2,
    last_rejection: Option<ConnectionError>,
}

impl Graph {
    /// Run one frame of interaction and hand the result to `renderer`
    pub fn update(&mut self, input: &FrameInput, renderer: &mut dyn Renderer) {
        self.frame += 1;
        self.layout_nodes(renderer);
        self.sample(input);
        self.resolve_hover();
        self.dispatch(input);
        self.run_bodies();
        self.sweep();
        self.layout_nodes(renderer);
        self.render(renderer);
    }

    fn sample(&mut self, input: &FrameInput) {
        let view = self.view();
        let state = &mut self.state;
        state.click.release();
        state.click.arm(input.primary_pressed);
        state.dragging_node = state.dragging_node_next;

        state.pointer_delta = match (state.pointer_screen, input.pointer) {
            (Some(before), Some(now)) => view.delta_to_grid(now - before),
            _ => Vec2::ZERO,
        };
        state.pointer_screen = input.pointer;
        state.pointer = input.pointer.map(|p| view.to_grid(p));

        for node in self.nodes_mut() {
            node.commit_staged();
        }
    }

    fn resolve_hover(&mut self) {
        let mut hover = Hover::default();
        if let (Some(pointer), Some(screen)) = (self.state.pointer, self.state.pointer_screen) {
            let radius = self.config.layout.socket_hit_radius;
            hover.pin = self
                .nodes()
                .rev()
                .filter(|node| !node.is_destroyed())
                .flat_map(Node::pins)
                .find(|pin| pin.hit_rect(radius).contains(pointer))
                .map(|pin| pin.pin_ref());
            hover.node = self
                .nodes()
                .rev()
                .find(|node| !node.is_destroyed() && node.rect().contains(pointer))
                .map(Node::id);
            hover.link = self.nearest_link(screen);
        }

        let ids: Vec<LinkId> = self.link_ids().collect();
        for id in ids {
            if let Some(link) = self.link_mut(id) {
                link.set_hovered(hover.link == Some(id));
            }
        }
        self.state.hover = hover;
    }

    /// Link closest to a screen point, within the hover radius
    fn nearest_link(&self, screen: Pos2) -> Option<LinkId> {
        let view = self.view();
        let radius = self.config.link_hover_radius;
        let steps = self.config.curve_samples;
        self.links()
            .filter_map(|link| {
                let (from, to) = self.link_endpoints(link)?;
                let curve = CubicBezier::cable(view.to_screen(from), view.to_screen(to));
                let distance = curve.distance_to(screen, steps);
                (distance <= radius).then_some((link.id(), distance))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    /// Output and input sockets of a link (grid space)
    fn link_endpoints(&self, link: &Link) -> Option<(Pos2, Pos2)> {
        let from = self.output_pin(link.output())?.socket();
        let to = self.input_pin(link.input())?.socket();
        Some((from, to))
    }

    fn dispatch(&mut self, input: &FrameInput) {
        let additive = input.additive();
        if input.primary_pressed {
            self.press(additive);
        }

        if input.primary_down && !input.primary_pressed && self.state.dragging_node {
            let delta = self.state.pointer_delta;
            let step = self.config.snap_step();
            if delta != Vec2::ZERO {
                for node in self.nodes_mut().filter(|node| node.is_dragged()) {
                    node.drag_by(delta, step);
                }
            }
        }

        if input.primary_released {
            self.release(input);
        }

        if input.secondary_clicked {
            let hovered = self.state.hover.node;
            if let Some(mut callback) = self.on_context_menu.take() {
                callback(self, hovered);
                if self.on_context_menu.is_none() {
                    self.on_context_menu = Some(callback);
                }
            }
        }

        if input.delete_pressed {
            self.delete_selection();
        }
    }

    fn press(&mut self, additive: bool) {
        let target = self.state.hover.primary();
        if !matches!(target, HoverTarget::Link(_)) && !additive {
            self.select_links(|_| false);
        }
        // Background presses stay available to node bodies
        if target == HoverTarget::Background {
            if !additive {
                for node in self.nodes_mut() {
                    node.select(false);
                }
            }
            return;
        }
        if !self.state.click.consume() {
            return;
        }

        match target {
            HoverTarget::Pin(pin) => {
                tracing::trace!(?pin, "link drag started");
                self.state.drag_out = Some(pin);
            }
            HoverTarget::Link(link) => {
                if additive {
                    self.select_link(link, true);
                } else {
                    self.select_links(|id| id == link);
                }
            }
            HoverTarget::Node(node) => self.press_node(node, additive),
            HoverTarget::Background => {}
        }
    }

    fn press_node(&mut self, pressed: NodeId, additive: bool) {
        let was_selected = self.node(pressed).is_some_and(Node::is_selected);
        let keep_group = was_selected || additive;

        for node in self.nodes_mut() {
            if node.id() == pressed {
                node.select(true);
                node.set_dragged(true);
            } else if keep_group {
                let selected = node.is_selected();
                node.set_dragged(selected);
            } else {
                node.select(false);
                node.set_dragged(false);
            }
        }
        self.state.dragging_node_next = true;
        tracing::trace!(node = ?pressed, keep_group, "node pressed");
    }

    fn release(&mut self, input: &FrameInput) {
        if let Some(source) = self.state.drag_out.take() {
            let hover = self.state.hover;
            let gate = self
                .config
                .dropped_link_key
                .map_or(true, |key| input.keys_down.contains(&key));
            match hover.pin {
                Some(target) if target != source => self.finish_link(source, target),
                None if hover.node.is_none() && gate => self.fire_dropped_link(source),
                _ => {}
            }
        }

        for node in self.nodes_mut() {
            node.set_dragged(false);
        }
        self.state.dragging_node_next = false;
    }

    fn finish_link(&mut self, source: PinRef, target: PinRef) {
        let (output, input) = match (source.kind, target.kind) {
            (PinKind::Output, PinKind::Input) => (source, target),
            (PinKind::Input, PinKind::Output) => (target, source),
            _ => {
                self.state.last_rejection = Some(ConnectionError::WrongDirection);
                return;
            }
        };

        if self.get_link(input).is_some_and(|link| link.output() == output) {
            tracing::trace!(?output, ?input, "existing link dropped again, removing it");
            self.disconnect(input);
            return;
        }

        match self.create_link(output, input) {
            Ok(_) => self.state.last_rejection = None,
            Err(err) => {
                tracing::trace!(%err, "link drop rejected");
                self.state.last_rejection = Some(err);
            }
        }
    }

    fn fire_dropped_link(&mut self, source: PinRef) {
        if let Some(mut callback) = self.on_dropped_link.take() {
            callback(self, source);
            if self.on_dropped_link.is_none() {
                self.on_dropped_link = Some(callback);
            }
        }
    }

    fn delete_selection(&mut self) {
        let links: Vec<LinkId> = self.links().filter(|l| l.is_selected()).map(Link::id).collect();
        for link in links {
            self.delete_link(link);
        }
        let nodes: Vec<NodeId> = self.nodes().filter(|n| n.is_selected()).map(Node::id).collect();
        for node in nodes {
            self.destroy_node(node);
        }
    }

    fn select_links(&mut self, selected: impl Fn(LinkId) -> bool) {
        let ids: Vec<LinkId> = self.link_ids().collect();
        for id in ids {
            if let Some(link) = self.link_mut(id) {
                link.set_selected(selected(id));
            }
        }
    }

    /// Select or deselect a link
    pub fn select_link(&mut self, link: LinkId, selected: bool) -> bool {
        match self.link_mut(link) {
            Some(link) => {
                link.set_selected(selected);
                true
            }
            None => false,
        }
    }

    fn run_bodies(&mut self) {
        let ids: Vec<NodeId> = self.node_ids().collect();
        for id in ids {
            let Some(mut body) = self
                .node_mut(id)
                .filter(|node| !node.is_destroyed())
                .and_then(Node::take_body)
            else {
                continue;
            };
            body.draw(&mut NodeUi { graph: self, node: id });
            if let Some(node) = self.node_mut(id) {
                node.restore_body(body);
            }
        }
    }

    fn sweep(&mut self) {
        let doomed: Vec<NodeId> = self.nodes().filter(|n| n.is_destroyed()).map(Node::id).collect();
        for node in doomed {
            self.remove_node(node);
        }

        let frame = self.frame;
        let stale: Vec<PinRef> = self.nodes().flat_map(|node| node.stale_dynamic_pins(frame)).collect();
        for pin in stale {
            tracing::debug!(?pin, "dynamic pin not declared this frame, dropping it");
            match pin.kind {
                PinKind::Input => self.drop_input(pin.node, pin.uid),
                PinKind::Output => self.drop_output(pin.node, pin.uid),
            };
        }
    }

    fn layout_nodes(&mut self, renderer: &mut dyn Renderer) {
        let metrics = self.config.layout;
        for node in self.nodes_mut() {
            node.layout(&metrics, renderer);
        }
    }

    fn render(&self, renderer: &mut dyn Renderer) {
        let view = self.view();
        let screen_rect = |rect: Rect| Rect::from_min_max(view.to_screen(rect.min), view.to_screen(rect.max));

        for link in self.links() {
            let Some((from, to)) = self.link_endpoints(link) else {
                continue;
            };
            let color = self
                .output_pin(link.output())
                .map_or(PinStyle::default().color, |pin| AnyPin::Output(pin).style().color);
            renderer.link(&LinkVisual {
                id: link.id(),
                from: view.to_screen(from),
                to: view.to_screen(to),
                color,
                hovered: link.is_hovered(),
                selected: link.is_selected(),
            });
        }

        if let (Some(source), Some(pointer)) = (self.state.drag_out, self.state.pointer) {
            if let Some(anchor) = self.pin(source).map(|pin| pin.socket()) {
                let (from, to) = match source.kind {
                    PinKind::Output => (anchor, pointer),
                    PinKind::Input => (pointer, anchor),
                };
                renderer.pending_link(view.to_screen(from), view.to_screen(to));
            }
        }

        for node in self.nodes() {
            renderer.node(&NodeVisual {
                id: node.id(),
                title: node.title(),
                rect: screen_rect(node.rect()),
                header: screen_rect(node.header_rect()),
                zoom: view.zoom,
                selected: node.is_selected(),
                hovered: self.state.hover.node == Some(node.id()),
                dragged: node.is_dragged(),
            });

            for pin in node.pins() {
                let visual = PinVisual {
                    pin: pin.pin_ref(),
                    kind: pin.kind(),
                    name: pin.name(),
                    rect: screen_rect(pin.rect()),
                    socket: view.to_screen(pin.socket()),
                    style: pin.style(),
                    zoom: view.zoom,
                    connected: pin.is_connected(),
                    hovered: self.state.hover.pin == Some(pin.pin_ref()),
                };
                match pin.render_hook() {
                    Some(hook) => hook(&visual, &mut *renderer),
                    None => renderer.pin(&visual),
                }
            }
        }
    }

    /// Run `callback` when a link drag ends over empty space
    pub fn on_dropped_link(&mut self, callback: impl FnMut(&mut Graph, PinRef) + 'static) {
        self.on_dropped_link = Some(Box::new(callback));
    }

    /// Run `callback` on right-click
    pub fn on_context_menu(&mut self, callback: impl FnMut(&mut Graph, Option<NodeId>) + 'static) {
        self.on_context_menu = Some(Box::new(callback));
    }

    /// Pointer position in grid space as of the last update
    pub fn pointer_grid(&self) -> Option<Pos2> {
        self.state.pointer
    }

    /// Add `node` with its corner at the pointer, or where it stands when there is no pointer
    pub fn place_node(&mut self, node: Node) -> NodeId {
        match self.state.pointer_screen {
            Some(screen) => self.place_node_at(screen, node),
            None => self.add_node(node),
        }
    }

    /// Add `node` with its corner at the screen position `screen`
    pub fn place_node_at(&mut self, screen: Pos2, mut node: Node) -> NodeId {
        node.set_position(self.to_grid(screen));
        self.add_node(node)
    }

    /// Everything under the pointer as of the last update
    pub fn hover(&self) -> Hover {
        self.state.hover
    }

    /// Hovered pin
    pub fn hovered_pin(&self) -> Option<PinRef> {
        self.state.hover.pin
    }

    /// Hovered node
    pub fn hovered_node(&self) -> Option<NodeId> {
        self.state.hover.node
    }

    /// Hovered link
    pub fn hovered_link(&self) -> Option<LinkId> {
        self.state.hover.link
    }

    /// Pin a link drag started from, while the drag lasts
    pub fn dragged_link(&self) -> Option<PinRef> {
        self.state.drag_out
    }

    /// Abandon the link drag in progress without linking or firing the dropped-link callback
    pub fn cancel_link_drag(&mut self) -> Option<PinRef> {
        let source = self.state.drag_out.take();
        if source.is_some() {
            tracing::trace!(?source, "link drag cancelled");
        }
        source
    }

    /// Whether nodes are being dragged this frame
    pub fn is_dragging_nodes(&self) -> bool {
        self.state.dragging_node
    }

    /// Most recent connection error raised by a link drop
    pub fn last_rejection(&self) -> Option<&ConnectionError> {
        self.state.last_rejection.as_ref()
    }
}

/// Handle given to node bodies during [`Graph::update`]
pub struct NodeUi<'a> {
    graph: &'a mut Graph,
    node: NodeId,
}

impl<'a> NodeUi<'a> {
    /// ID of the node being drawn
    pub fn id(&self) -> NodeId {
        self.node
    }

    /// Current frame number
    pub fn frame(&self) -> u64 {
        self.graph.frame
    }

    /// The whole graph
    pub fn graph(&self) -> &Graph {
        &*self.graph
    }

    /// The node being drawn
    pub fn node(&self) -> Option<&Node> {
        self.graph.node(self.node)
    }

    /// The node being drawn, mutably
    pub fn node_mut(&mut self) -> Option<&mut Node> {
        self.graph.node_mut(self.node)
    }

    /// Declare a dynamic input for this frame and read its value.
    ///
    /// Dynamic pins not declared during a frame are removed at the end of it.
    pub fn show_input<T: PinData>(
        &mut self,
        uid: impl Into<PinUid>,
        name: impl Into<String>,
        default: T,
        filter: ConnectionFilter,
    ) -> T {
        let uid = uid.into();
        let (id, frame) = (self.node, self.graph.frame);
        let Some(node) = self.graph.node_mut(id) else {
            return default;
        };
        let pin = PinRef::input(id, uid);
        if node.input(uid).is_none() {
            node.add_input(uid, name, default, filter, None);
            node.touch_dynamic(pin, frame);
        } else if node.is_dynamic(pin) {
            node.touch_dynamic(pin, frame);
        }
        self.graph.value(InPin::<T>::new(id, uid))
    }

    /// Declare a dynamic output for this frame with its producer
    pub fn show_output<T, F>(&mut self, uid: impl Into<PinUid>, name: impl Into<String>, behaviour: F) -> OutPin<T>
    where
        T: PinData,
        F: Fn(&Eval<'_>) -> T + 'static,
    {
        let uid = uid.into();
        let (id, frame) = (self.node, self.graph.frame);
        let handle = OutPin::new(id, uid);
        let Some(node) = self.graph.node_mut(id) else {
            return handle;
        };
        let pin = PinRef::output(id, uid);
        if node.output(uid).is_none() {
            node.add_output::<T>(uid, name, None);
            node.touch_dynamic(pin, frame);
        } else if node.is_dynamic(pin) {
            node.touch_dynamic(pin, frame);
        }
        node.set_behaviour(handle, behaviour);
        handle
    }

    /// Read any input pin
    pub fn value<T: PinData>(&self, pin: InPin<T>) -> T {
        self.graph.value(pin)
    }

    /// Read an input of this node
    pub fn input<T: PinData>(&self, uid: impl Into<PinUid>) -> T {
        self.graph.value(InPin::new(self.node, uid.into()))
    }

    /// Whether an input of this node is connected
    pub fn is_connected(&self, uid: impl Into<PinUid>) -> bool {
        self.graph.is_connected(PinRef::input(self.node, uid))
    }

    /// Whether the pointer is over this node
    pub fn is_hovered(&self) -> bool {
        self.graph.state.hover.node == Some(self.node)
    }

    /// Claim this frame's click, if nothing else did
    pub fn consume_click(&mut self) -> bool {
        self.graph.state.click.consume()
    }

    /// Hand a claimed click back
    pub fn release_click(&mut self) {
        self.graph.state.click.release();
    }

    /// Mark this node for removal
    pub fn destroy(&mut self) {
        self.graph.destroy_node(self.node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GridTransform;
    use crate::render::{HeadlessRenderer, PinRenderHook};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Default)]
    struct RecordingRenderer {
        text: HeadlessRenderer,
        nodes: usize,
        pins: usize,
        links: Vec<LinkVisual>,
        pending: Vec<(Pos2, Pos2)>,
    }

    impl Renderer for RecordingRenderer {
        fn text_size(&mut self, text: &str) -> Vec2 {
            self.text.text_size(text)
        }

        fn node(&mut self, _node: &NodeVisual<'_>) {
            self.nodes += 1;
        }

        fn pin(&mut self, _pin: &PinVisual<'_>) {
            self.pins += 1;
        }

        fn link(&mut self, link: &LinkVisual) {
            self.links.push(*link);
        }

        fn pending_link(&mut self, from: Pos2, to: Pos2) {
            self.pending.push((from, to));
        }
    }

    fn frame(graph: &mut Graph, input: FrameInput) {
        graph.update(&input, &mut HeadlessRenderer::default());
    }

    fn idle(graph: &mut Graph) {
        frame(graph, FrameInput::default());
    }

    fn socket(graph: &Graph, pin: impl Into<PinRef>) -> Pos2 {
        graph
            .pin(pin.into())
            .map(|pin| graph.to_screen(pin.socket()))
            .unwrap_or(Pos2::ZERO)
    }

    fn center(graph: &Graph, node: NodeId) -> Pos2 {
        graph
            .node(node)
            .map(|node| graph.to_screen(node.rect().center()))
            .unwrap_or(Pos2::ZERO)
    }

    fn constant(graph: &mut Graph, value: i32, x: f32) -> OutPin<i32> {
        let mut node = Node::new("Const").with_position(x, 0.0);
        let out = node.add_output::<i32>("out", "Out", None);
        node.set_behaviour(out, move |_| value);
        graph.add_node(node);
        out
    }

    fn sink(graph: &mut Graph, x: f32) -> InPin<i32> {
        let mut node = Node::new("Sink").with_position(x, 0.0);
        let input = node.add_input("in", "In", 0i32, ConnectionFilter::none(), None);
        graph.add_node(node);
        input
    }

    fn drag_link(graph: &mut Graph, from: Pos2, to: Pos2) {
        frame(graph, FrameInput::press(from));
        frame(graph, FrameInput::drag(to));
        frame(graph, FrameInput::release(to));
    }

    #[test]
    fn test_hover_priority() {
        let node = NodeId::new();
        let pin = PinRef::input(node, "in");
        let link = LinkId::new();
        let full = Hover {
            pin: Some(pin),
            link: Some(link),
            node: Some(node),
        };
        assert_eq!(full.primary(), HoverTarget::Pin(pin));
        assert_eq!(Hover { pin: None, ..full }.primary(), HoverTarget::Link(link));
        assert_eq!(
            Hover {
                pin: None,
                link: None,
                node: Some(node)
            }
            .primary(),
            HoverTarget::Node(node)
        );
        assert_eq!(Hover::default().primary(), HoverTarget::Background);
    }

    #[test]
    fn test_click_token_is_single_use() {
        let mut token = ClickToken::default();
        assert!(!token.consume());

        token.arm(true);
        assert!(token.consume());
        assert!(!token.consume());
        token.release();
        assert!(token.available());
    }

    #[test]
    fn test_drag_link_between_pins() {
        let mut graph = Graph::default();
        let out = constant(&mut graph, 5, 0.0);
        let input = sink(&mut graph, 300.0);
        idle(&mut graph);

        let next = FrameInput::press(socket(&graph, out));
        frame(&mut graph, next);
        assert_eq!(graph.dragged_link(), Some(out.pin_ref()));
        let next = FrameInput::release(socket(&graph, input));
        frame(&mut graph, next);

        assert!(graph.dragged_link().is_none());
        assert_eq!(graph.value(input), 5);
        assert!(graph.last_rejection().is_none());
    }

    #[test]
    fn test_drag_from_input_is_oriented() {
        let mut graph = Graph::default();
        let out = constant(&mut graph, 9, 0.0);
        let input = sink(&mut graph, 300.0);
        idle(&mut graph);

        let (from, to) = (socket(&graph, input), socket(&graph, out));
        drag_link(&mut graph, from, to);
        assert_eq!(graph.get_link(input).map(Link::output), Some(out.pin_ref()));
        assert_eq!(graph.value(input), 9);
    }

    #[test]
    fn test_dropping_existing_link_again_removes_it() {
        let mut graph = Graph::default();
        let out = constant(&mut graph, 5, 0.0);
        let input = sink(&mut graph, 300.0);
        idle(&mut graph);

        let (from, to) = (socket(&graph, out), socket(&graph, input));
        drag_link(&mut graph, from, to);
        assert_eq!(graph.link_count(), 1);
        drag_link(&mut graph, from, to);
        assert_eq!(graph.link_count(), 0);
        assert!(!graph.is_connected(input));
    }

    #[test]
    fn test_rejected_drop_is_recorded() {
        let mut graph = Graph::default();
        let out = constant(&mut graph, 5, 0.0);
        let mut node = Node::new("Text").with_position(300.0, 0.0);
        let text = node.add_input("in", "In", String::new(), ConnectionFilter::none(), None);
        graph.add_node(node);
        idle(&mut graph);

        let (from, to) = (socket(&graph, out), socket(&graph, text));
        drag_link(&mut graph, from, to);
        assert_eq!(graph.link_count(), 0);
        assert!(matches!(
            graph.last_rejection(),
            Some(ConnectionError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_dropped_link_callback_on_empty_space() {
        let mut graph = Graph::default();
        let out = constant(&mut graph, 5, 0.0);
        idle(&mut graph);

        let dropped = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&dropped);
        graph.on_dropped_link(move |_, pin| log.borrow_mut().push(pin));

        let (from, to) = (socket(&graph, out), Pos2::new(600.0, 400.0));
        drag_link(&mut graph, from, to);
        assert_eq!(*dropped.borrow(), vec![out.pin_ref()]);
    }

    #[test]
    fn test_dropped_link_callback_respects_key() {
        let mut graph = Graph::with_config(
            "Gated",
            crate::config::EditorConfig::default().with_dropped_link_key(egui::Key::Space),
        );
        let out = constant(&mut graph, 5, 0.0);
        idle(&mut graph);

        let count = Rc::new(Cell::new(0));
        let counter = Rc::clone(&count);
        graph.on_dropped_link(move |_, _| counter.set(counter.get() + 1));

        let empty = Pos2::new(600.0, 400.0);
        let (from, to) = (socket(&graph, out), empty);
        drag_link(&mut graph, from, to);
        assert_eq!(count.get(), 0);

        let next = FrameInput::press(socket(&graph, out));
        frame(&mut graph, next);
        frame(&mut graph, FrameInput::release(empty).with_key(egui::Key::Space));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_dropped_link_callback_can_add_node() {
        let mut graph = Graph::default();
        graph.set_view(GridTransform::new(Pos2::new(100.0, 50.0), Vec2::ZERO, 2.0));
        let out = constant(&mut graph, 5, 0.0);
        idle(&mut graph);

        graph.on_dropped_link(|graph, pin| {
            let mut node = Node::new("Spawned");
            let input = node.add_input("in", "In", 0i32, ConnectionFilter::none(), None);
            graph.place_node(node);
            let _ = graph.create_link(pin, input.pin_ref());
        });

        let (from, to) = (socket(&graph, out), Pos2::new(600.0, 400.0));
        drag_link(&mut graph, from, to);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.link_count(), 1);
        assert_eq!(graph.pointer_grid(), Some(Pos2::new(250.0, 175.0)));
        let spawned = graph.nodes().last().map(Node::position);
        assert_eq!(spawned, Some(Pos2::new(250.0, 175.0)));

        // Callback survives its own invocation
        let (from, to) = (socket(&graph, out), Pos2::new(900.0, 900.0));
        drag_link(&mut graph, from, to);
        assert_eq!(graph.node_count(), 3);
    }

    #[test]
    fn test_cancelled_link_drag_fires_nothing() {
        let mut graph = Graph::default();
        let out = constant(&mut graph, 5, 0.0);
        idle(&mut graph);

        let count = Rc::new(Cell::new(0));
        let calls = Rc::clone(&count);
        graph.on_dropped_link(move |_, _| calls.set(calls.get() + 1));

        let empty = Pos2::new(600.0, 400.0);
        let next = FrameInput::press(socket(&graph, out));
        frame(&mut graph, next);
        frame(&mut graph, FrameInput::drag(empty));
        assert_eq!(graph.cancel_link_drag(), Some(out.pin_ref()));
        frame(&mut graph, FrameInput::release(empty));

        assert_eq!(count.get(), 0);
        assert_eq!(graph.dragged_link(), None);
        assert_eq!(graph.cancel_link_drag(), None);
    }

    #[test]
    fn test_click_selects_on_next_frame() {
        let mut graph = Graph::default();
        let a = graph.add_node(Node::new("A"));
        let b = graph.add_node(Node::new("B").with_position(0.0, 200.0));
        idle(&mut graph);

        let next = FrameInput::press(center(&graph, a));
        frame(&mut graph, next);
        assert!(!graph.node(a).is_some_and(Node::is_selected));
        let next = FrameInput::release(center(&graph, a));
        frame(&mut graph, next);
        assert!(graph.node(a).is_some_and(Node::is_selected));

        let next = FrameInput::press(center(&graph, b));
        frame(&mut graph, next);
        let next = FrameInput::release(center(&graph, b));
        frame(&mut graph, next);
        assert!(!graph.node(a).is_some_and(Node::is_selected));
        assert!(graph.node(b).is_some_and(Node::is_selected));

        frame(&mut graph, FrameInput::press(Pos2::new(800.0, 800.0)));
        idle(&mut graph);
        assert!(graph.nodes().all(|node| !node.is_selected()));
    }

    #[test]
    fn test_group_drag_moves_selected_nodes() {
        let mut graph = Graph::default();
        let a = graph.add_node(Node::new("A"));
        let b = graph.add_node(Node::new("B").with_position(0.0, 200.0));
        idle(&mut graph);

        let next = FrameInput::press(center(&graph, a));
        frame(&mut graph, next);
        let next = FrameInput::release(center(&graph, a));
        frame(&mut graph, next);
        let ctrl = egui::Modifiers::CTRL;
        let next = FrameInput::press(center(&graph, b)).with_modifiers(ctrl);
        frame(&mut graph, next);
        let next = FrameInput::release(center(&graph, b)).with_modifiers(ctrl);
        frame(&mut graph, next);
        assert!(graph.nodes().all(Node::is_selected));

        let start = center(&graph, a);
        frame(&mut graph, FrameInput::press(start));
        frame(&mut graph, FrameInput::drag(start + Vec2::new(10.0, 5.0)));
        assert!(graph.is_dragging_nodes());
        frame(&mut graph, FrameInput::release(start + Vec2::new(10.0, 5.0)));

        assert_eq!(graph.node(a).map(Node::position), Some(Pos2::new(10.0, 5.0)));
        assert_eq!(graph.node(b).map(Node::position), Some(Pos2::new(10.0, 205.0)));
        assert!(graph.nodes().all(|node| !node.is_dragged()));
    }

    #[test]
    fn test_drag_snaps_to_sub_grid() {
        let mut graph = Graph::with_config(
            "Snapped",
            crate::config::EditorConfig::default().with_snapping(50.0, 5.0),
        );
        let a = graph.add_node(Node::new("A"));
        idle(&mut graph);

        let start = center(&graph, a);
        frame(&mut graph, FrameInput::press(start));
        frame(&mut graph, FrameInput::drag(start + Vec2::new(7.0, 3.0)));
        assert_eq!(graph.node(a).map(Node::position), Some(Pos2::new(10.0, 0.0)));
        assert_eq!(graph.node(a).map(Node::target), Some(Pos2::new(7.0, 3.0)));
    }

    #[test]
    fn test_link_hover_select_and_delete() {
        let mut graph = Graph::default();
        let out = constant(&mut graph, 5, 0.0);
        let input = sink(&mut graph, 300.0);
        let link = graph.connect(out, input).expect("link");
        idle(&mut graph);

        let curve = CubicBezier::cable(socket(&graph, out), socket(&graph, input));
        let middle = curve.eval(0.5);
        frame(&mut graph, FrameInput::hover(middle));
        assert_eq!(graph.hovered_link(), Some(link));
        assert!(graph.link(link).is_some_and(Link::is_hovered));

        frame(&mut graph, FrameInput::press(middle));
        assert!(graph.link(link).is_some_and(Link::is_selected));

        frame(
            &mut graph,
            FrameInput {
                delete_pressed: true,
                ..FrameInput::hover(middle)
            },
        );
        assert_eq!(graph.link_count(), 0);
        assert_eq!(graph.value(input), 0);
    }

    #[test]
    fn test_pressing_elsewhere_deselects_links() {
        let mut graph = Graph::default();
        let out = constant(&mut graph, 5, 0.0);
        let input = sink(&mut graph, 300.0);
        let link = graph.connect(out, input).expect("link");
        graph.select_link(link, true);
        idle(&mut graph);

        frame(&mut graph, FrameInput::press(Pos2::new(800.0, 800.0)));
        assert!(!graph.link(link).is_some_and(Link::is_selected));
    }

    #[test]
    fn test_delete_key_destroys_selected_nodes() {
        let mut graph = Graph::default();
        let out = constant(&mut graph, 5, 0.0);
        let input = sink(&mut graph, 300.0);
        graph.connect(out, input).expect("link");
        idle(&mut graph);

        let node = out.node();
        let next = FrameInput::press(center(&graph, node));
        frame(&mut graph, next);
        let next = FrameInput::release(center(&graph, node));
        frame(&mut graph, next);
        frame(
            &mut graph,
            FrameInput {
                delete_pressed: true,
                ..FrameInput::default()
            },
        );

        assert!(graph.node(node).is_none());
        assert_eq!(graph.node_count(), 1);
        assert!(!graph.is_connected(input));
    }

    #[test]
    fn test_context_menu_gets_hovered_node() {
        let mut graph = Graph::default();
        let a = graph.add_node(Node::new("A"));
        idle(&mut graph);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        graph.on_context_menu(move |_, node| log.borrow_mut().push(node));

        let right_click = |pointer| FrameInput {
            secondary_clicked: true,
            ..FrameInput::hover(pointer)
        };
        let next = right_click(center(&graph, a));
        frame(&mut graph, next);
        frame(&mut graph, right_click(Pos2::new(900.0, 900.0)));
        assert_eq!(*seen.borrow(), vec![Some(a), None]);
    }

    #[test]
    fn test_destroyed_node_swept_with_links() {
        let mut graph = Graph::default();
        let out = constant(&mut graph, 5, 0.0);
        let a = sink(&mut graph, 300.0);
        let b = sink(&mut graph, 300.0);
        graph.connect(out, a).expect("a");
        graph.connect(out, b).expect("b");

        graph.destroy_node(out.node());
        assert_eq!(graph.link_count(), 2);
        idle(&mut graph);

        assert_eq!(graph.link_count(), 0);
        assert!(graph.node(out.node()).is_none());
        assert_eq!(graph.value(a), 0);
        assert!(!graph.destroy_node(out.node()));
    }

    #[test]
    fn test_body_can_consume_click_once() {
        let mut graph = Graph::default();
        let claims = Rc::new(Cell::new(0));
        for x in [0.0, 400.0] {
            let claims = Rc::clone(&claims);
            let button = Node::lambda("Button", move |ui| {
                if ui.consume_click() {
                    claims.set(claims.get() + 1);
                }
            });
            graph.add_node(button.with_position(x, 0.0));
        }
        idle(&mut graph);

        frame(&mut graph, FrameInput::press(Pos2::new(900.0, 900.0)));
        assert_eq!(claims.get(), 1);
        idle(&mut graph);
        assert_eq!(claims.get(), 1);

        // A press on a node is claimed by the node gesture
        let next = FrameInput::press(Pos2::new(10.0, 10.0));
        frame(&mut graph, next);
        assert_eq!(claims.get(), 1);
    }

    #[test]
    fn test_dynamic_pins_follow_body() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let mut graph = Graph::default();
        let out = constant(&mut graph, 5, 0.0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let node = graph.add_node(
            Node::lambda("Dynamic", move |ui| {
                if ui.frame() <= 3 {
                    let value = ui.show_input("extra", "Extra", 0i32, ConnectionFilter::none());
                    log.borrow_mut().push(value);
                }
            })
            .with_position(300.0, 0.0),
        );

        idle(&mut graph);
        let pin = PinRef::input(node, "extra");
        assert!(graph.node(node).is_some_and(|n| n.is_dynamic(pin)));
        graph.create_link(out.pin_ref(), pin).expect("link");

        idle(&mut graph);
        idle(&mut graph);
        assert!(graph.pin(pin).is_some());
        assert_eq!(graph.link_count(), 1);

        idle(&mut graph);
        assert_eq!(graph.frame(), 4);
        assert!(graph.pin(pin).is_none());
        assert_eq!(graph.link_count(), 0);
        assert!(!graph.is_connected(out));
        assert_eq!(*seen.borrow(), vec![0, 5, 5]);
    }

    #[test]
    fn test_dynamic_output_feeds_downstream() {
        let mut graph = Graph::default();
        let node = graph.add_node(Node::lambda("Source", |ui| {
            ui.show_output::<i32, _>("out", "Out", |_| 42);
        }));
        let input = sink(&mut graph, 300.0);
        idle(&mut graph);

        graph
            .create_link(PinRef::output(node, "out"), input.pin_ref())
            .expect("link");
        idle(&mut graph);
        assert_eq!(graph.value(input), 42);
    }

    #[test]
    fn test_pending_link_is_oriented() {
        let mut graph = Graph::default();
        let input = sink(&mut graph, 300.0);
        idle(&mut graph);

        let mut renderer = RecordingRenderer::default();
        let anchor = socket(&graph, input);
        graph.update(&FrameInput::press(anchor), &mut renderer);
        let pointer = Pos2::new(100.0, 200.0);
        graph.update(&FrameInput::drag(pointer), &mut renderer);

        assert_eq!(renderer.pending.last(), Some(&(pointer, anchor)));
    }

    #[test]
    fn test_render_hook_replaces_default_pin() {
        let mut graph = Graph::default();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let hook: PinRenderHook = Rc::new(move |_: &PinVisual<'_>, _: &mut dyn Renderer| {
            counter.set(counter.get() + 1);
        });

        let mut node = Node::new("Custom");
        let input = node.add_input("a", "A", 0i32, ConnectionFilter::none(), None);
        node.add_output::<i32>("b", "B", None);
        node.set_pin_renderer(input.pin_ref(), Some(hook));
        graph.add_node(node);

        let mut renderer = RecordingRenderer::default();
        graph.update(&FrameInput::default(), &mut renderer);
        assert_eq!(renderer.nodes, 1);
        assert_eq!(renderer.pins, 1);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_links_rendered_in_screen_space() {
        let mut graph = Graph::default();
        let out = constant(&mut graph, 5, 0.0);
        let input = sink(&mut graph, 300.0);
        graph.connect(out, input).expect("link");
        graph.set_view(crate::geometry::GridTransform::new(
            Pos2::new(10.0, 20.0),
            Vec2::new(5.0, 0.0),
            2.0,
        ));

        let mut renderer = RecordingRenderer::default();
        graph.update(&FrameInput::default(), &mut renderer);
        let link = renderer.links.first().copied();
        assert_eq!(link.map(|l| l.from), Some(socket(&graph, out)));
        assert_eq!(link.map(|l| l.to), Some(socket(&graph, input)));
    }
}
