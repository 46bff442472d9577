// SPDX-License-Identifier: MIT OR Apache-2.0
//! Link (edge) definitions for the graph.

use crate::node::NodeId;
use crate::pin::PinRef;
use uuid::Uuid;

/// Unique identifier for a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub Uuid);

impl LinkId {
    /// Create a new random link ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LinkId {
    fn default() -> Self {
        Self::new()
    }
}

/// A directed link from an output pin to an input pin.
///
/// Links are only built by [`Graph::create_link`](crate::Graph::create_link) and live
/// inside the input pin they feed.
#[derive(Debug)]
pub struct Link {
    id: LinkId,
    output: PinRef,
    input: PinRef,
    hovered: bool,
    selected: bool,
}

impl Link {
    pub(crate) fn new(output: PinRef, input: PinRef) -> Self {
        Self {
            id: LinkId::new(),
            output,
            input,
            hovered: false,
            selected: false,
        }
    }

    /// Link ID
    pub fn id(&self) -> LinkId {
        self.id
    }

    /// Source (output) end
    pub fn output(&self) -> PinRef {
        self.output
    }

    /// Target (input) end
    pub fn input(&self) -> PinRef {
        self.input
    }

    /// Whether the pointer was over the link this frame
    pub fn is_hovered(&self) -> bool {
        self.hovered
    }

    /// Whether the link is selected
    pub fn is_selected(&self) -> bool {
        self.selected
    }

    /// Check if this link touches a specific node
    pub fn involves_node(&self, node: NodeId) -> bool {
        self.output.node == node || self.input.node == node
    }

    /// Check if this link touches a specific pin
    pub fn involves_pin(&self, pin: PinRef) -> bool {
        self.output == pin || self.input == pin
    }

    pub(crate) fn set_hovered(&mut self, hovered: bool) {
        self.hovered = hovered;
    }

    pub(crate) fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_ends() {
        let (a, b, c) = (NodeId::new(), NodeId::new(), NodeId::new());
        let link = Link::new(PinRef::output(a, "out"), PinRef::input(b, "in"));

        assert!(link.involves_node(a));
        assert!(link.involves_node(b));
        assert!(!link.involves_node(c));
        assert!(link.involves_pin(PinRef::input(b, "in")));
        assert!(!link.involves_pin(PinRef::output(b, "in")));
        assert!(!link.involves_pin(PinRef::input(b, "other")));
    }
}
