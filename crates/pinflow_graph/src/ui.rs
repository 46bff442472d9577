// SPDX-License-Identifier: MIT OR Apache-2.0
//! egui host adapter.
//!
//! Features:
//! - [`frame_input`] samples egui input into a [`FrameInput`]
//! - [`EguiRenderer`] paints nodes, pins and links with an [`egui::Painter`]
//! - [`GraphView`] widget owning pan/zoom (middle-drag pan, scroll zoom toward cursor)

use crate::config::EditorConfig;
use crate::geometry::{CubicBezier, GridTransform};
use crate::graph::Graph;
use crate::interaction::FrameInput;
use crate::pin::PinKind;
use crate::render::{LinkVisual, NodeVisual, PinVisual, Renderer};
use egui::{Color32, FontId, Pos2, Rect, Stroke, Vec2};

/// Node visual parameters
const TEXT_SIZE: f32 = 12.0;
const NODE_ROUNDING: f32 = 6.0;
const NODE_SHADOW_OFFSET: f32 = 3.0;

/// Link visual parameters
const LINK_THICKNESS: f32 = 2.5;

/// Zoom change per scrolled point
const ZOOM_SPEED: f32 = 0.001;

/// Sample the input relevant to graph interaction
pub fn frame_input(input: &egui::InputState) -> FrameInput {
    FrameInput {
        pointer: input.pointer.hover_pos(),
        primary_pressed: input.pointer.primary_pressed(),
        primary_down: input.pointer.primary_down(),
        primary_released: input.pointer.primary_released(),
        secondary_clicked: input.pointer.secondary_clicked(),
        delete_pressed: input.key_pressed(egui::Key::Delete),
        modifiers: input.modifiers,
        keys_down: input.keys_down.iter().copied().collect(),
    }
}

fn color([r, g, b]: [u8; 3]) -> Color32 {
    Color32::from_rgb(r, g, b)
}

/// [`Renderer`] drawing through an egui painter
pub struct EguiRenderer<'a> {
    painter: &'a egui::Painter,
    zoom: f32,
}

impl<'a> EguiRenderer<'a> {
    /// Create a renderer for a canvas drawn at `zoom`
    pub fn new(painter: &'a egui::Painter, zoom: f32) -> Self {
        Self { painter, zoom }
    }

    fn cable(&self, from: Pos2, to: Pos2, stroke: Stroke) {
        let curve = CubicBezier::cable(from, to);
        let shape = egui::epaint::CubicBezierShape::from_points_stroke(
            [curve.start, curve.ctrl1, curve.ctrl2, curve.end],
            false,
            Color32::TRANSPARENT,
            stroke,
        );
        self.painter.add(shape);
    }
}

impl Renderer for EguiRenderer<'_> {
    fn text_size(&mut self, text: &str) -> Vec2 {
        self.painter
            .layout_no_wrap(text.to_owned(), FontId::proportional(TEXT_SIZE), Color32::WHITE)
            .size()
    }

    fn node(&mut self, node: &NodeVisual<'_>) {
        let rounding = NODE_ROUNDING * node.zoom;

        // Shadow
        let shadow = node.rect.translate(Vec2::splat(NODE_SHADOW_OFFSET));
        self.painter
            .rect_filled(shadow, rounding, Color32::from_rgba_unmultiplied(0, 0, 0, 60));

        let background = if node.selected {
            Color32::from_rgb(60, 70, 90)
        } else {
            Color32::from_rgb(45, 45, 48)
        };
        self.painter.rect_filled(node.rect, rounding, background);

        self.painter.rect_filled(
            node.header,
            egui::Rounding {
                nw: rounding,
                ne: rounding,
                sw: 0.0,
                se: 0.0,
            },
            Color32::from_rgb(70, 100, 130),
        );
        self.painter.text(
            node.header.center(),
            egui::Align2::CENTER_CENTER,
            node.title,
            FontId::proportional(TEXT_SIZE * node.zoom),
            Color32::WHITE,
        );

        if node.selected {
            self.painter
                .rect_stroke(node.rect, rounding, Stroke::new(2.0, Color32::from_rgb(100, 150, 255)));
        } else if node.hovered {
            self.painter
                .rect_stroke(node.rect, rounding, Stroke::new(1.0, Color32::from_gray(120)));
        }
    }

    fn pin(&mut self, pin: &PinVisual<'_>) {
        let radius = pin.style.socket_radius * pin.zoom;
        let fill = color(pin.style.color);
        let radius = if pin.hovered { radius * 1.3 } else { radius };

        if pin.connected {
            self.painter.circle_filled(pin.socket, radius, fill);
        } else {
            self.painter.circle_filled(pin.socket, radius, Color32::from_gray(30));
        }
        self.painter.circle_stroke(pin.socket, radius, Stroke::new(1.0, fill));

        let (anchor, align) = match pin.kind {
            PinKind::Input => (pin.rect.left_center(), egui::Align2::LEFT_CENTER),
            PinKind::Output => (pin.rect.right_center(), egui::Align2::RIGHT_CENTER),
        };
        self.painter.text(
            anchor,
            align,
            pin.name,
            FontId::proportional(TEXT_SIZE * pin.zoom),
            Color32::from_gray(200),
        );
    }

    fn link(&mut self, link: &LinkVisual) {
        let base = color(link.color);
        let (width, stroke_color) = if link.selected {
            (LINK_THICKNESS * 1.6, Color32::from_rgb(100, 150, 255))
        } else if link.hovered {
            (LINK_THICKNESS * 1.4, base.gamma_multiply(1.3))
        } else {
            (LINK_THICKNESS, base)
        };
        self.cable(link.from, link.to, Stroke::new(width * self.zoom, stroke_color));
    }

    fn pending_link(&mut self, from: Pos2, to: Pos2) {
        self.cable(from, to, Stroke::new(LINK_THICKNESS * self.zoom, Color32::GRAY));
    }
}

/// Canvas widget showing a [`Graph`]
#[derive(Debug, Clone)]
pub struct GraphView {
    /// Pan offset (grid space)
    pub pan: Vec2,
    /// Zoom factor
    pub zoom: f32,
    /// Draw the background grid
    pub show_grid: bool,
    /// Primary button went down inside the canvas and is still held
    captured: bool,
    last_pointer: Option<Pos2>,
}

impl Default for GraphView {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphView {
    /// Unpanned, unzoomed view
    pub fn new() -> Self {
        Self {
            pan: Vec2::ZERO,
            zoom: 1.0,
            show_grid: true,
            captured: false,
            last_pointer: None,
        }
    }

    /// Grid transform for a canvas occupying `rect`; the grid origin sits at its center
    pub fn transform(&self, rect: Rect) -> GridTransform {
        GridTransform::new(rect.center(), self.pan, self.zoom)
    }

    /// Run one graph frame inside the available space of `ui`
    pub fn show(&mut self, ui: &mut egui::Ui, graph: &mut Graph) -> egui::Response {
        let rect = ui.available_rect_before_wrap();
        let response = ui.allocate_rect(rect, egui::Sense::click_and_drag());
        let painter = ui.painter_at(rect);

        let (input, released_outside) = self.canvas_input(rect, ui.input(frame_input));
        if released_outside {
            graph.cancel_link_drag();
        }

        // Pan with middle mouse
        if response.dragged_by(egui::PointerButton::Middle) {
            self.pan += response.drag_delta() / self.zoom;
        }

        // Zoom toward the cursor
        if let Some(pointer) = input.pointer {
            let scroll = ui.input(|i| i.raw_scroll_delta.y);
            if scroll != 0.0 {
                let mut view = self.transform(rect);
                view.zoom_about(
                    pointer,
                    1.0 + scroll * ZOOM_SPEED,
                    graph.config.min_zoom,
                    graph.config.max_zoom,
                );
                self.pan = view.pan;
                self.zoom = view.zoom;
            }
        }

        let view = self.transform(rect);
        graph.set_view(view);

        if self.show_grid {
            draw_grid(&painter, rect, &view, &graph.config);
        }

        let mut renderer = EguiRenderer::new(&painter, view.zoom);
        graph.update(&input, &mut renderer);
        response
    }

    /// Restrict `input` to the canvas. A drag that started inside keeps following the
    /// pointer past the edge, falling back to the last known position when egui loses it.
    /// Also reports whether such a drag was released outside the canvas.
    fn canvas_input(&mut self, rect: Rect, mut input: FrameInput) -> (FrameInput, bool) {
        let inside = input.pointer.filter(|pointer| rect.contains(*pointer));
        if input.primary_pressed {
            self.captured = inside.is_some();
        }

        let held = input.primary_down || input.primary_released;
        let mut released_outside = false;
        if self.captured && held {
            input.pointer = input.pointer.or(self.last_pointer);
            released_outside = input.primary_released && inside.is_none();
        } else {
            input.pointer = inside;
            if held {
                // Button went down outside the canvas
                input.primary_pressed = false;
                input.primary_down = false;
                input.primary_released = false;
            }
        }
        if input.primary_released {
            self.captured = false;
        }

        self.last_pointer = input.pointer;
        (input, released_outside)
    }
}

fn draw_grid(painter: &egui::Painter, rect: Rect, view: &GridTransform, config: &EditorConfig) {
    let major = config.grid_size * view.zoom;
    if major < 4.0 {
        return;
    }
    let minor = major / config.grid_subdivisions.max(1.0);

    let grid_color_minor = Color32::from_rgba_unmultiplied(60, 60, 60, 100);
    let grid_color_major = Color32::from_rgba_unmultiplied(80, 80, 80, 150);

    // Screen position of the grid origin, wrapped into the first cell
    let origin = view.to_screen(Pos2::ZERO);
    for (spacing, stroke) in [
        (minor, Stroke::new(1.0, grid_color_minor)),
        (major, Stroke::new(1.0, grid_color_major)),
    ] {
        if spacing < 4.0 {
            continue;
        }
        let mut x = rect.left() + (origin.x - rect.left()).rem_euclid(spacing);
        while x < rect.right() {
            painter.line_segment([Pos2::new(x, rect.top()), Pos2::new(x, rect.bottom())], stroke);
            x += spacing;
        }
        let mut y = rect.top() + (origin.y - rect.top()).rem_euclid(spacing);
        while y < rect.bottom() {
            painter.line_segment([Pos2::new(rect.left(), y), Pos2::new(rect.right(), y)], stroke);
            y += spacing;
        }
    }
}
