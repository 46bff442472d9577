// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph data structure owning nodes, pins and links.

use crate::config::{EditorConfig, NameSequence};
use crate::evaluation::EvalStack;
use crate::geometry::GridTransform;
use crate::interaction::{ContextMenuCallback, DroppedLinkCallback, InteractionState};
use crate::link::{Link, LinkId};
use crate::node::{Node, NodeId};
use crate::pin::{AnyPin, DataType, InPin, InputPin, OutPin, OutputPin, PinKind, PinRef, PinUid};
use egui::Pos2;
use indexmap::IndexMap;

/// A node graph.
///
/// Nodes live in insertion order; later nodes are drawn on top. Each link is owned by
/// the input pin it feeds, the graph only keeps an index from link ID to that pin.
pub struct Graph {
    /// Graph name
    pub name: String,
    /// Interaction and layout settings
    pub config: EditorConfig,
    /// Nodes in the graph
    nodes: IndexMap<NodeId, Node>,
    /// Link index: link ID to the input pin owning it
    links: IndexMap<LinkId, PinRef>,
    /// Pan/zoom supplied by the host
    view: GridTransform,
    /// Frame counter, bumped by every update
    pub(crate) frame: u64,
    pub(crate) state: InteractionState,
    pub(crate) on_dropped_link: Option<DroppedLinkCallback>,
    pub(crate) on_context_menu: Option<ContextMenuCallback>,
    /// Input pins being resolved by the read in progress
    pub(crate) eval_stack: EvalStack,
}

impl Graph {
    /// Create a new empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, EditorConfig::default())
    }

    /// Create a graph with explicit settings
    pub fn with_config(name: impl Into<String>, config: EditorConfig) -> Self {
        Self {
            name: name.into(),
            config,
            nodes: IndexMap::new(),
            links: IndexMap::new(),
            view: GridTransform::default(),
            frame: 0,
            state: InteractionState::default(),
            on_dropped_link: None,
            on_context_menu: None,
            eval_stack: EvalStack::default(),
        }
    }

    /// Create a graph named by the next value of `names`
    pub fn numbered(names: &mut NameSequence) -> Self {
        Self::new(names.next_name())
    }

    /// Add a node to the graph.
    ///
    /// A node whose ID is already in use gets a fresh one.
    pub fn add_node(&mut self, mut node: Node) -> NodeId {
        if self.nodes.contains_key(&node.id()) {
            tracing::warn!(id = ?node.id(), "node ID already in use, assigning a new one");
            node.set_id(NodeId::new());
        }
        let id = node.id();
        tracing::debug!(?id, title = node.title(), "node added");
        self.nodes.insert(id, node);
        id
    }

    /// Mark a node for destruction; it is removed by the next update sweep.
    ///
    /// Returns `false` if the node does not exist or is already marked.
    pub fn destroy_node(&mut self, node_id: NodeId) -> bool {
        match self.nodes.get_mut(&node_id) {
            Some(node) if !node.is_destroyed() => {
                node.destroy();
                true
            }
            _ => false,
        }
    }

    /// Remove a node right away, tearing down its links first
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        if !self.nodes.contains_key(&node_id) {
            return None;
        }
        let doomed: Vec<LinkId> = self
            .links()
            .filter(|link| link.involves_node(node_id))
            .map(Link::id)
            .collect();
        for link in doomed {
            self.delete_link(link);
        }

        let state = &mut self.state;
        if state.hover.node == Some(node_id) {
            state.hover.node = None;
        }
        if state.hover.pin.is_some_and(|pin| pin.node == node_id) {
            state.hover.pin = None;
        }
        if state.drag_out.is_some_and(|pin| pin.node == node_id) {
            state.drag_out = None;
        }

        tracing::debug!(id = ?node_id, "node removed");
        self.nodes.shift_remove(&node_id)
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Get all nodes, bottom to top
    pub fn nodes(&self) -> impl DoubleEndedIterator<Item = &Node> {
        self.nodes.values()
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    /// Get all node IDs
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Move a node, resetting its drag target
    pub fn set_position(&mut self, node_id: NodeId, position: Pos2) -> bool {
        match self.nodes.get_mut(&node_id) {
            Some(node) => {
                node.set_position(position);
                true
            }
            None => false,
        }
    }

    /// Look up either pin kind
    pub fn pin(&self, pin: PinRef) -> Option<AnyPin<'_>> {
        self.nodes.get(&pin.node)?.pin(pin)
    }

    pub(crate) fn input_pin(&self, pin: PinRef) -> Option<&InputPin> {
        if pin.kind != PinKind::Input {
            return None;
        }
        self.nodes.get(&pin.node)?.input(pin.uid)
    }

    pub(crate) fn output_pin(&self, pin: PinRef) -> Option<&OutputPin> {
        if pin.kind != PinKind::Output {
            return None;
        }
        self.nodes.get(&pin.node)?.output(pin.uid)
    }

    fn input_pin_mut(&mut self, pin: PinRef) -> Option<&mut InputPin> {
        if pin.kind != PinKind::Input {
            return None;
        }
        self.nodes.get_mut(&pin.node)?.input_mut(pin.uid)
    }

    fn output_pin_mut(&mut self, pin: PinRef) -> Option<&mut OutputPin> {
        if pin.kind != PinKind::Output {
            return None;
        }
        self.nodes.get_mut(&pin.node)?.output_mut(pin.uid)
    }

    /// Whether a pin takes part in any link
    pub fn is_connected(&self, pin: impl Into<PinRef>) -> bool {
        self.pin(pin.into()).is_some_and(|pin| pin.is_connected())
    }

    /// Data type tag of a pin
    pub fn data_type(&self, pin: impl Into<PinRef>) -> Option<DataType> {
        self.pin(pin.into()).map(|pin| pin.data_type())
    }

    /// Link attached to an input pin
    pub fn get_link(&self, input: impl Into<PinRef>) -> Option<&Link> {
        self.input_pin(input.into())?.link()
    }

    /// Create a link from `output` to `input`.
    ///
    /// Both pins must carry the same data type, the input's filter must accept the
    /// pair, and same-node links need the input's opt-in. On success any link already
    /// feeding `input` is removed first.
    pub fn create_link(&mut self, output: PinRef, input: PinRef) -> Result<LinkId, ConnectionError> {
        if output.kind != PinKind::Output || input.kind != PinKind::Input {
            return Err(ConnectionError::WrongDirection);
        }

        // Validate nodes exist
        let source_node = self.live_node(output.node)?;
        let target_node = self.live_node(input.node)?;

        // Validate pins exist
        let source_pin = source_node.output(output.uid).ok_or(ConnectionError::PinNotFound(output))?;
        let target_pin = target_node.input(input.uid).ok_or(ConnectionError::PinNotFound(input))?;

        if source_pin.data_type() != target_pin.data_type() {
            return Err(ConnectionError::TypeMismatch {
                output: source_pin.data_type().name(),
                input: target_pin.data_type().name(),
            });
        }

        if output.node == input.node && !target_pin.allows_same_node() {
            return Err(ConnectionError::SameNode);
        }

        if !target_pin.filter().accepts(&source_pin.info(), &target_pin.info()) {
            return Err(ConnectionError::FilterRejected);
        }

        // An input holds at most one link
        self.disconnect(input);

        let link = Link::new(output, input);
        let id = link.id();
        if let Some(pin) = self.input_pin_mut(input) {
            pin.set_link(link);
        }
        if let Some(pin) = self.output_pin_mut(output) {
            pin.attach(id);
        }
        self.links.insert(id, input);

        tracing::debug!(?id, ?output, ?input, "link created");
        Ok(id)
    }

    /// Create a link between typed handles
    pub fn connect<T>(&mut self, output: OutPin<T>, input: InPin<T>) -> Result<LinkId, ConnectionError> {
        self.create_link(output.pin_ref(), input.pin_ref())
    }

    fn live_node(&self, node_id: NodeId) -> Result<&Node, ConnectionError> {
        self.nodes
            .get(&node_id)
            .filter(|node| !node.is_destroyed())
            .ok_or(ConnectionError::NodeNotFound(node_id))
    }

    /// Remove a link from both of its endpoints
    pub fn delete_link(&mut self, link_id: LinkId) -> bool {
        let Some(input) = self.links.shift_remove(&link_id) else {
            return false;
        };

        let removed = self.input_pin_mut(input).and_then(|pin| {
            let owned = pin.link().is_some_and(|link| link.id() == link_id);
            if owned {
                pin.take_link()
            } else {
                None
            }
        });
        if let Some(link) = &removed {
            if let Some(pin) = self.output_pin_mut(link.output()) {
                pin.detach(link_id);
            }
        }

        if self.state.hover.link == Some(link_id) {
            self.state.hover.link = None;
        }
        tracing::debug!(id = ?link_id, "link deleted");
        removed.is_some()
    }

    /// Remove the link feeding an input pin
    pub fn disconnect(&mut self, input: impl Into<PinRef>) -> bool {
        match self.get_link(input).map(Link::id) {
            Some(id) => self.delete_link(id),
            None => false,
        }
    }

    /// Remove an input pin, tearing down its link first
    pub fn drop_input(&mut self, node_id: NodeId, uid: impl Into<PinUid>) -> bool {
        let pin = PinRef::input(node_id, uid);
        if self.input_pin(pin).is_none() {
            return false;
        }
        self.disconnect(pin);
        self.clear_pin_state(pin);
        self.nodes
            .get_mut(&node_id)
            .and_then(|node| node.remove_input(pin.uid))
            .is_some()
    }

    /// Remove an output pin, tearing down all of its links first
    pub fn drop_output(&mut self, node_id: NodeId, uid: impl Into<PinUid>) -> bool {
        let pin = PinRef::output(node_id, uid);
        if self.output_pin(pin).is_none() {
            return false;
        }
        let links: Vec<LinkId> = self
            .links()
            .filter(|link| link.involves_pin(pin))
            .map(Link::id)
            .collect();
        for link in links {
            self.delete_link(link);
        }
        self.clear_pin_state(pin);
        self.nodes
            .get_mut(&node_id)
            .and_then(|node| node.remove_output(pin.uid))
            .is_some()
    }

    fn clear_pin_state(&mut self, pin: PinRef) {
        if self.state.hover.pin == Some(pin) {
            self.state.hover.pin = None;
        }
        if self.state.drag_out == Some(pin) {
            self.state.drag_out = None;
        }
    }

    /// Get a link by ID
    pub fn link(&self, link_id: LinkId) -> Option<&Link> {
        let input = self.links.get(&link_id)?;
        self.input_pin(*input)?.link()
    }

    pub(crate) fn link_mut(&mut self, link_id: LinkId) -> Option<&mut Link> {
        let input = *self.links.get(&link_id)?;
        self.input_pin_mut(input)?.link_mut()
    }

    /// Get all links, oldest first
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.keys().filter_map(|id| self.link(*id))
    }

    /// Get all link IDs
    pub fn link_ids(&self) -> impl Iterator<Item = LinkId> + '_ {
        self.links.keys().copied()
    }

    /// Links touching a pin
    pub fn links_of(&self, pin: impl Into<PinRef>) -> Vec<LinkId> {
        let pin = pin.into();
        match self.pin(pin) {
            Some(AnyPin::Input(input)) => input.link().map(Link::id).into_iter().collect(),
            Some(AnyPin::Output(output)) => output.links().to_vec(),
            None => Vec::new(),
        }
    }

    /// Get the number of links
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Current pan/zoom
    pub fn view(&self) -> GridTransform {
        self.view
    }

    /// Replace the pan/zoom, zoom clamped to the configured limits
    pub fn set_view(&mut self, mut view: GridTransform) {
        view.zoom = view.zoom.clamp(self.config.min_zoom, self.config.max_zoom);
        self.view = view;
    }

    /// Convert a screen position to grid space
    pub fn to_grid(&self, screen: Pos2) -> Pos2 {
        self.view.to_grid(screen)
    }

    /// Convert a grid position to screen space
    pub fn to_screen(&self, grid: Pos2) -> Pos2 {
        self.view.to_screen(grid)
    }

    /// Number of updates run so far
    pub fn frame(&self) -> u64 {
        self.frame
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

/// Error when creating a link
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// Node not found, or marked for destruction
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// Pin not found
    #[error("Pin not found: {0:?}")]
    PinNotFound(PinRef),

    /// Endpoints are not an output followed by an input
    #[error("Links run from an output pin to an input pin")]
    WrongDirection,

    /// Data types differ
    #[error("Incompatible pin types: {output} -> {input}")]
    TypeMismatch {
        /// Output data type
        output: &'static str,
        /// Input data type
        input: &'static str,
    },

    /// The input's filter rejected the pair
    #[error("Connection rejected by filter")]
    FilterRejected,

    /// Both pins belong to the same node and the input did not opt in
    #[error("Same-node connection not allowed")]
    SameNode,
}

impl ConnectionError {
    /// Whether the pins exist but may not be linked
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::NodeNotFound(_) | Self::PinNotFound(_))
    }
}
