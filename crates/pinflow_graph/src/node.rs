// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the graph framework.

use crate::config::LayoutMetrics;
use crate::evaluation::Eval;
use crate::interaction::NodeUi;
use crate::pin::{
    AnyPin, Behaviour, ConnectionFilter, InPin, InputPin, OutPin, OutputPin, PinCore, PinData,
    PinKind, PinRef, PinStyle, PinUid,
};
use crate::render::{PinRenderHook, Renderer};
use egui::{Pos2, Rect, Vec2};
use indexmap::IndexMap;
use std::any::Any;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-frame content of a node.
///
/// Implemented for every `FnMut(&mut NodeUi)` closure, so ad hoc nodes need no type.
pub trait NodeBody {
    /// Called once per frame; may declare dynamic pins and read input values
    fn draw(&mut self, ui: &mut NodeUi<'_>);

    /// Space reserved between the pin columns (grid space)
    fn content_size(&self) -> Vec2 {
        Vec2::ZERO
    }
}

impl<F> NodeBody for F
where
    F: FnMut(&mut NodeUi<'_>),
{
    fn draw(&mut self, ui: &mut NodeUi<'_>) {
        self(ui);
    }
}

/// A node instance in the graph
pub struct Node {
    id: NodeId,
    title: String,
    position: Pos2,
    target: Pos2,
    size: Vec2,
    header_height: f32,
    inputs: Vec<InputPin>,
    outputs: Vec<OutputPin>,
    dynamic_inputs: IndexMap<PinUid, u64>,
    dynamic_outputs: IndexMap<PinUid, u64>,
    selected: bool,
    selected_next: bool,
    dragged: bool,
    destroyed: bool,
    body: Option<Box<dyn NodeBody>>,
}

impl Node {
    /// Create an empty node
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            title: title.into(),
            position: Pos2::ZERO,
            target: Pos2::ZERO,
            size: Vec2::ZERO,
            header_height: 0.0,
            inputs: Vec::new(),
            outputs: Vec::new(),
            dynamic_inputs: IndexMap::new(),
            dynamic_outputs: IndexMap::new(),
            selected: false,
            selected_next: false,
            dragged: false,
            destroyed: false,
            body: None,
        }
    }

    /// Create a node whose body is a closure
    pub fn lambda(title: impl Into<String>, body: impl FnMut(&mut NodeUi<'_>) + 'static) -> Self {
        Self::new(title).with_body(body)
    }

    /// Use an explicit ID instead of a random one
    pub fn with_id(mut self, id: NodeId) -> Self {
        self.set_id(id);
        self
    }

    /// Replace the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the position
    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.set_position(Pos2::new(x, y));
        self
    }

    /// Attach a body
    pub fn with_body(mut self, body: impl NodeBody + 'static) -> Self {
        self.body = Some(Box::new(body));
        self
    }

    /// Node ID
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: NodeId) {
        self.id = id;
        for pin in &mut self.inputs {
            pin.core_mut().node = id;
        }
        for pin in &mut self.outputs {
            pin.core_mut().node = id;
        }
    }

    /// Display title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Change the title
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// Current position (grid space)
    pub fn position(&self) -> Pos2 {
        self.position
    }

    /// Position the node is heading toward while dragged
    pub fn target(&self) -> Pos2 {
        self.target
    }

    /// Jump to `position`, resetting the drag target
    pub fn set_position(&mut self, position: Pos2) {
        self.position = position;
        self.target = position;
    }

    /// Size computed by the last layout pass
    pub fn size(&self) -> Vec2 {
        self.size
    }

    /// Rectangle from the last layout pass (grid space)
    pub fn rect(&self) -> Rect {
        Rect::from_min_size(self.position, self.size)
    }

    /// Title bar rectangle (grid space)
    pub fn header_rect(&self) -> Rect {
        Rect::from_min_size(self.position, Vec2::new(self.size.x, self.header_height))
    }

    /// Input pins in declaration order
    pub fn inputs(&self) -> &[InputPin] {
        &self.inputs
    }

    /// Output pins in declaration order
    pub fn outputs(&self) -> &[OutputPin] {
        &self.outputs
    }

    /// All pins, inputs first
    pub fn pins(&self) -> impl Iterator<Item = AnyPin<'_>> {
        self.inputs
            .iter()
            .map(AnyPin::Input)
            .chain(self.outputs.iter().map(AnyPin::Output))
    }

    /// Get an input pin by ID
    pub fn input(&self, uid: impl Into<PinUid>) -> Option<&InputPin> {
        let uid = uid.into();
        self.inputs.iter().find(|pin| pin.uid() == uid)
    }

    /// Get an output pin by ID
    pub fn output(&self, uid: impl Into<PinUid>) -> Option<&OutputPin> {
        let uid = uid.into();
        self.outputs.iter().find(|pin| pin.uid() == uid)
    }

    /// Get either pin kind by reference
    pub fn pin(&self, pin: PinRef) -> Option<AnyPin<'_>> {
        match pin.kind {
            PinKind::Input => self.input(pin.uid).map(AnyPin::Input),
            PinKind::Output => self.output(pin.uid).map(AnyPin::Output),
        }
    }

    pub(crate) fn input_mut(&mut self, uid: PinUid) -> Option<&mut InputPin> {
        self.inputs.iter_mut().find(|pin| pin.uid() == uid)
    }

    pub(crate) fn output_mut(&mut self, uid: PinUid) -> Option<&mut OutputPin> {
        self.outputs.iter_mut().find(|pin| pin.uid() == uid)
    }

    /// Declare an input pin.
    ///
    /// If an input with the same ID exists it is kept and its handle returned.
    pub fn add_input<T: PinData>(
        &mut self,
        uid: impl Into<PinUid>,
        name: impl Into<String>,
        default: T,
        filter: ConnectionFilter,
        style: Option<PinStyle>,
    ) -> InPin<T> {
        let uid = uid.into();
        if self.input(uid).is_some() {
            tracing::debug!(node = ?self.id, ?uid, "input already declared, keeping existing pin");
            return InPin::new(self.id, uid);
        }

        self.inputs.push(InputPin::new(
            self.id,
            uid,
            name.into(),
            default,
            filter,
            style.unwrap_or_default(),
        ));
        InPin::new(self.id, uid)
    }

    /// Declare an output pin. Attach a producer with [`Node::set_behaviour`].
    ///
    /// If an output with the same ID exists it is kept and its handle returned.
    pub fn add_output<T: PinData>(
        &mut self,
        uid: impl Into<PinUid>,
        name: impl Into<String>,
        style: Option<PinStyle>,
    ) -> OutPin<T> {
        let uid = uid.into();
        if self.output(uid).is_some() {
            tracing::debug!(node = ?self.id, ?uid, "output already declared, keeping existing pin");
            return OutPin::new(self.id, uid);
        }

        self.outputs.push(OutputPin::new::<T>(
            self.id,
            uid,
            name.into(),
            style.unwrap_or_default(),
        ));
        OutPin::new(self.id, uid)
    }

    /// Attach the producer of an output pin
    pub fn set_behaviour<T, F>(&mut self, pin: OutPin<T>, behaviour: F) -> bool
    where
        T: PinData,
        F: Fn(&Eval<'_>) -> T + 'static,
    {
        let Some(output) = self.output_mut(pin.uid()) else {
            return false;
        };
        let behaviour: Behaviour = Box::new(move |eval| Box::new(behaviour(eval)) as Box<dyn Any>);
        output.set_behaviour(behaviour);
        true
    }

    /// Allow an input to accept links from this node's own outputs
    pub fn set_allow_same_node(&mut self, uid: impl Into<PinUid>, allow: bool) -> bool {
        match self.input_mut(uid.into()) {
            Some(pin) => {
                pin.set_allow_same_node(allow);
                true
            }
            None => false,
        }
    }

    /// Replace the socket style of a pin
    pub fn set_pin_style(&mut self, pin: PinRef, style: PinStyle) -> bool {
        self.with_pin_layout(pin, |layout| layout.style = style)
    }

    /// Draw a pin with `hook` instead of the renderer's default
    pub fn set_pin_renderer(&mut self, pin: PinRef, hook: Option<PinRenderHook>) -> bool {
        self.with_pin_layout(pin, |layout| layout.render_hook = hook)
    }

    fn with_pin_layout(&mut self, pin: PinRef, apply: impl FnOnce(&mut PinCore)) -> bool {
        let layout = match pin.kind {
            PinKind::Input => self.input_mut(pin.uid).map(InputPin::core_mut),
            PinKind::Output => self.output_mut(pin.uid).map(OutputPin::core_mut),
        };
        match layout {
            Some(layout) => {
                apply(layout);
                true
            }
            None => false,
        }
    }

    /// Remove an input pin. Its link must already be torn down.
    pub(crate) fn remove_input(&mut self, uid: PinUid) -> Option<InputPin> {
        self.dynamic_inputs.shift_remove(&uid);
        let index = self.inputs.iter().position(|pin| pin.uid() == uid)?;
        Some(self.inputs.remove(index))
    }

    /// Remove an output pin. Its links must already be torn down.
    pub(crate) fn remove_output(&mut self, uid: PinUid) -> Option<OutputPin> {
        self.dynamic_outputs.shift_remove(&uid);
        let index = self.outputs.iter().position(|pin| pin.uid() == uid)?;
        Some(self.outputs.remove(index))
    }

    /// Whether an input was declared through the per-frame body
    pub fn is_dynamic(&self, pin: PinRef) -> bool {
        match pin.kind {
            PinKind::Input => self.dynamic_inputs.contains_key(&pin.uid),
            PinKind::Output => self.dynamic_outputs.contains_key(&pin.uid),
        }
    }

    /// Record that a dynamic pin was declared during `frame`
    pub(crate) fn touch_dynamic(&mut self, pin: PinRef, frame: u64) {
        match pin.kind {
            PinKind::Input => self.dynamic_inputs.insert(pin.uid, frame),
            PinKind::Output => self.dynamic_outputs.insert(pin.uid, frame),
        };
    }

    /// Dynamic pins not declared during `frame`
    pub(crate) fn stale_dynamic_pins(&self, frame: u64) -> Vec<PinRef> {
        let inputs = self
            .dynamic_inputs
            .iter()
            .filter(|(_, touched)| **touched != frame)
            .map(|(uid, _)| PinRef::input(self.id, *uid));
        let outputs = self
            .dynamic_outputs
            .iter()
            .filter(|(_, touched)| **touched != frame)
            .map(|(uid, _)| PinRef::output(self.id, *uid));
        inputs.chain(outputs).collect()
    }

    /// Whether the node is selected (as of the start of this frame)
    pub fn is_selected(&self) -> bool {
        self.selected
    }

    /// Stage the selected flag; it takes effect on the next update
    pub fn select(&mut self, selected: bool) {
        self.selected_next = selected;
    }

    /// Whether the node is being dragged
    pub fn is_dragged(&self) -> bool {
        self.dragged
    }

    pub(crate) fn set_dragged(&mut self, dragged: bool) {
        self.dragged = dragged;
    }

    /// Mark the node for removal during the next sweep
    pub fn destroy(&mut self) {
        self.destroyed = true;
    }

    /// Whether the node is marked for removal
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Apply flags staged during the previous frame
    pub(crate) fn commit_staged(&mut self) {
        self.selected = self.selected_next;
    }

    /// Move the drag target by `delta`; the position follows, snapped to `step`
    pub(crate) fn drag_by(&mut self, delta: Vec2, step: Option<f32>) {
        self.target += delta;
        self.position = match step {
            Some(step) => Pos2::new(
                (self.target.x / step).round() * step,
                (self.target.y / step).round() * step,
            ),
            None => self.target,
        };
    }

    pub(crate) fn take_body(&mut self) -> Option<Box<dyn NodeBody>> {
        self.body.take()
    }

    pub(crate) fn restore_body(&mut self, body: Box<dyn NodeBody>) {
        if self.body.is_none() {
            self.body = Some(body);
        }
    }

    /// Compute node size and pin rectangles from text metrics
    pub(crate) fn layout(&mut self, metrics: &LayoutMetrics, renderer: &mut dyn Renderer) {
        let title = renderer.text_size(&self.title);
        let header = title.y + metrics.header_padding * 2.0;
        let pad = metrics.body_padding;

        let mut input_sizes = Vec::with_capacity(self.inputs.len());
        for pin in &self.inputs {
            input_sizes.push(pin_row(renderer, metrics, pin.name()));
        }
        let mut output_sizes = Vec::with_capacity(self.outputs.len());
        for pin in &self.outputs {
            output_sizes.push(pin_row(renderer, metrics, pin.name()));
        }

        let column = |sizes: &[Vec2]| {
            let width = sizes.iter().fold(0.0f32, |w, s| w.max(s.x));
            let height: f32 = sizes.iter().map(|s| s.y).sum::<f32>()
                + metrics.pin_spacing * sizes.len().saturating_sub(1) as f32;
            Vec2::new(width, height)
        };
        let ins = column(&input_sizes);
        let outs = column(&output_sizes);
        let content = self.body.as_ref().map_or(Vec2::ZERO, |body| body.content_size());

        let mut inner_width = ins.x + content.x + outs.x;
        if !input_sizes.is_empty() && (content.x > 0.0 || !output_sizes.is_empty()) {
            inner_width += metrics.column_gap;
        }
        if !output_sizes.is_empty() && content.x > 0.0 {
            inner_width += metrics.column_gap;
        }

        let width = (inner_width + pad.x * 2.0).max(title.x + pad.x * 2.0);
        let height = header + pad.y * 2.0 + ins.y.max(outs.y).max(content.y);
        self.size = Vec2::new(width, height);
        self.header_height = header;

        let top = self.position.y + header + pad.y;
        let mut y = top;
        for (pin, size) in self.inputs.iter_mut().zip(&input_sizes) {
            let min = Pos2::new(self.position.x + pad.x, y);
            pin.core_mut().rect = Rect::from_min_size(min, *size);
            y += size.y + metrics.pin_spacing;
        }

        let mut y = top;
        for (pin, size) in self.outputs.iter_mut().zip(&output_sizes) {
            let min = Pos2::new(self.position.x + width - pad.x - size.x, y);
            pin.core_mut().rect = Rect::from_min_size(min, *size);
            y += size.y + metrics.pin_spacing;
        }
    }
}

/// Size of one pin row: label text, at least `pin_row_height` tall
fn pin_row(renderer: &mut dyn Renderer, metrics: &LayoutMetrics, name: &str) -> Vec2 {
    let text = renderer.text_size(name);
    Vec2::new(text.x, text.y.max(metrics.pin_row_height))
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("position", &self.position)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("selected", &self.selected)
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessRenderer;

    #[test]
    fn test_duplicate_input_keeps_existing() {
        let mut node = Node::new("Add");
        let first = node.add_input("a", "A", 1.0f32, ConnectionFilter::none(), None);
        let second = node.add_input("a", "Other", 2.0f32, ConnectionFilter::none(), None);

        assert_eq!(first, second);
        assert_eq!(node.inputs().len(), 1);
        assert_eq!(node.input("a").map(|p| p.name()), Some("A"));
        assert_eq!(node.input("a").and_then(|p| p.default_value::<f32>()), Some(1.0));
    }

    #[test]
    fn test_input_and_output_ids_are_independent() {
        let mut node = Node::new("Passthrough");
        node.add_input("value", "In", 0i32, ConnectionFilter::none(), None);
        node.add_output::<i32>("value", "Out", None);

        assert_eq!(node.inputs().len(), 1);
        assert_eq!(node.outputs().len(), 1);
        assert_eq!(node.pins().count(), 2);
    }

    #[test]
    fn test_pin_style_and_new_id_reach_pins() {
        let mut node = Node::new("Styled");
        let out = node.add_output::<i32>("out", "Out", None);
        let style = PinStyle::with_color([200, 40, 40]);

        assert!(node.set_pin_style(out.pin_ref(), style));
        assert!(!node.set_pin_style(PinRef::input(node.id(), "missing"), style));
        assert_eq!(node.pin(out.pin_ref()).map(|pin| *pin.style()), Some(style));

        let id = NodeId::new();
        node.set_id(id);
        assert_eq!(node.pins().map(|pin| pin.node()).collect::<Vec<_>>(), vec![id]);
    }

    #[test]
    fn test_set_behaviour_on_unknown_pin_fails() {
        let mut node = Node::new("Const");
        let stray: OutPin<i32> = OutPin::new(node.id(), PinUid::from("missing"));
        assert!(!node.set_behaviour(stray, |_| 1));

        let out = node.add_output::<i32>("out", "Out", None);
        assert!(node.set_behaviour(out, |_| 1));
        assert!(node.output("out").is_some_and(OutputPin::has_behaviour));
    }

    #[test]
    fn test_selection_is_staged() {
        let mut node = Node::new("N");
        node.select(true);
        assert!(!node.is_selected());
        node.commit_staged();
        assert!(node.is_selected());
    }

    #[test]
    fn test_drag_snaps_position_but_not_target() {
        let mut node = Node::new("N").with_position(0.0, 0.0);
        node.drag_by(Vec2::new(13.0, 4.0), Some(10.0));
        assert_eq!(node.target(), Pos2::new(13.0, 4.0));
        assert_eq!(node.position(), Pos2::new(10.0, 0.0));

        node.drag_by(Vec2::new(3.0, 3.0), Some(10.0));
        assert_eq!(node.position(), Pos2::new(20.0, 10.0));

        node.drag_by(Vec2::new(0.5, 0.0), None);
        assert_eq!(node.position(), Pos2::new(16.5, 7.0));
    }

    #[test]
    fn test_layout_places_pins_in_columns() {
        let metrics = LayoutMetrics::default();
        let mut renderer = HeadlessRenderer::default();
        let mut node = Node::new("Mix").with_position(100.0, 50.0);
        node.add_input("a", "A", 0.0f32, ConnectionFilter::none(), None);
        node.add_input("b", "B", 0.0f32, ConnectionFilter::none(), None);
        node.add_output::<f32>("out", "Result", None);
        node.layout(&metrics, &mut renderer);

        let rect = node.rect();
        assert!(rect.width() >= 7.0 * 6.0);
        let a = node.input("a").map(InputPin::socket).unwrap_or(Pos2::ZERO);
        let b = node.input("b").map(InputPin::socket).unwrap_or(Pos2::ZERO);
        let out = node.output("out").map(OutputPin::socket).unwrap_or(Pos2::ZERO);

        assert!(b.y > a.y);
        assert!(a.x < rect.center().x);
        assert!(out.x > rect.center().x);
        assert!(rect.contains(a) && rect.contains(out));
        assert!(node.header_rect().height() > 0.0);
    }

    #[test]
    fn test_stale_dynamic_pins() {
        let mut node = Node::new("Dyn");
        node.add_input("x", "X", 0i32, ConnectionFilter::none(), None);
        let pin = PinRef::input(node.id(), "x");
        node.touch_dynamic(pin, 3);

        assert!(node.is_dynamic(pin));
        assert!(node.stale_dynamic_pins(3).is_empty());
        assert_eq!(node.stale_dynamic_pins(4), vec![pin]);

        assert!(node.remove_input(pin.uid).is_some());
        assert!(!node.is_dynamic(pin));
    }
}
