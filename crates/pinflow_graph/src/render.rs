// SPDX-License-Identifier: MIT OR Apache-2.0
//! Renderer collaborator interface.
//!
//! The graph computes positions, sizes and state flags; a [`Renderer`] turns them
//! into pixels. Everything handed over here is in screen space.

use crate::link::LinkId;
use crate::node::NodeId;
use crate::pin::{PinKind, PinRef, PinStyle};
use egui::{Pos2, Rect, Vec2};
use std::rc::Rc;

/// Custom pin drawing, called instead of [`Renderer::pin`]
pub type PinRenderHook = Rc<dyn Fn(&PinVisual<'_>, &mut dyn Renderer)>;

/// Node geometry and state for one frame
#[derive(Debug, Clone, Copy)]
pub struct NodeVisual<'a> {
    /// Node ID
    pub id: NodeId,
    /// Title text
    pub title: &'a str,
    /// Whole node rectangle
    pub rect: Rect,
    /// Header (title bar) rectangle
    pub header: Rect,
    /// Current zoom factor
    pub zoom: f32,
    /// Selected flag
    pub selected: bool,
    /// Hovered flag
    pub hovered: bool,
    /// Being dragged
    pub dragged: bool,
}

/// Pin geometry and state for one frame
#[derive(Debug, Clone, Copy)]
pub struct PinVisual<'a> {
    /// Pin reference
    pub pin: PinRef,
    /// Direction
    pub kind: PinKind,
    /// Label text
    pub name: &'a str,
    /// Label rectangle
    pub rect: Rect,
    /// Socket center
    pub socket: Pos2,
    /// Socket style
    pub style: &'a PinStyle,
    /// Current zoom factor
    pub zoom: f32,
    /// Whether the pin takes part in a link
    pub connected: bool,
    /// Whether the pointer is over the pin
    pub hovered: bool,
}

/// Link endpoints and state for one frame
#[derive(Debug, Clone, Copy)]
pub struct LinkVisual {
    /// Link ID
    pub id: LinkId,
    /// Output socket
    pub from: Pos2,
    /// Input socket
    pub to: Pos2,
    /// Color of the output pin style
    pub color: [u8; 3],
    /// Hovered flag
    pub hovered: bool,
    /// Selected flag
    pub selected: bool,
}

/// Drawing backend used by [`Graph::update`](crate::Graph::update)
pub trait Renderer {
    /// Size of `text` at zoom 1.0, used for node layout
    fn text_size(&mut self, text: &str) -> Vec2;

    /// Draw a node frame (header, body, border)
    fn node(&mut self, node: &NodeVisual<'_>);

    /// Draw a pin label and socket
    fn pin(&mut self, pin: &PinVisual<'_>);

    /// Draw an established link
    fn link(&mut self, link: &LinkVisual);

    /// Draw the link currently being dragged, always oriented output to input
    fn pending_link(&mut self, _from: Pos2, _to: Pos2) {}
}

/// Renderer that draws nothing and measures text with fixed metrics
#[derive(Debug, Clone, Copy)]
pub struct HeadlessRenderer {
    /// Width of each character
    pub char_width: f32,
    /// Height of a text line
    pub line_height: f32,
}

impl Default for HeadlessRenderer {
    fn default() -> Self {
        Self {
            char_width: 7.0,
            line_height: 14.0,
        }
    }
}

impl Renderer for HeadlessRenderer {
    fn text_size(&mut self, text: &str) -> Vec2 {
        Vec2::new(text.chars().count() as f32 * self.char_width, self.line_height)
    }

    fn node(&mut self, _node: &NodeVisual<'_>) {}

    fn pin(&mut self, _pin: &PinVisual<'_>) {}

    fn link(&mut self, _link: &LinkVisual) {}
}
