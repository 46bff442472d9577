// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed node graph with lazy pull evaluation and an immediate-mode editor core.
//!
//! ## Architecture
//!
//! The crate is built on a small dataflow model with:
//! - Typed input/output pins, checked pairwise when a link is created
//! - Links owned by the input pin they feed, fanned out from outputs
//! - Pull evaluation: reading an input runs the upstream producer, with a cycle guard
//! - A per-frame interaction state machine (hover, link drags, selection, node drags)
//! - Curve hit-testing so links can be hovered and clicked
//!
//! Drawing goes through the [`Renderer`] trait; [`ui`] adapts it to egui.

pub mod config;
pub mod evaluation;
pub mod geometry;
pub mod graph;
pub mod interaction;
pub mod link;
pub mod node;
pub mod pin;
pub mod render;
pub mod ui;

pub use config::{EditorConfig, LayoutMetrics, NameSequence};
pub use evaluation::{Eval, EvaluationError};
pub use geometry::{CubicBezier, GridTransform};
pub use graph::{ConnectionError, Graph};
pub use interaction::{ClickToken, FrameInput, Hover, HoverTarget, NodeUi};
pub use link::{Link, LinkId};
pub use node::{Node, NodeBody, NodeId};
pub use pin::{
    AnyPin, ConnectionFilter, DataType, InPin, InputPin, OutPin, OutputPin, PinData, PinInfo, PinKind, PinRef,
    PinStyle, PinUid,
};
pub use render::{HeadlessRenderer, LinkVisual, NodeVisual, PinRenderHook, PinVisual, Renderer};
pub use ui::{EguiRenderer, GraphView};
