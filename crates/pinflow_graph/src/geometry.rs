// SPDX-License-Identifier: MIT OR Apache-2.0
//! Link curve shape, curve hit-testing and the grid/screen transform.

use egui::{Pos2, Vec2};

/// Share of the horizontal endpoint distance used as control-point offset
const CONTROL_SCALE: f32 = 0.5;
/// Extra offset per unit of backwards travel (input left of output)
const REVERSED_SCALE: f32 = 0.2;

/// Smallest control-point offset, keeps short links from kinking
pub const MIN_CONTROL_OFFSET: f32 = 25.0;
/// Largest control-point offset
pub const MAX_CONTROL_OFFSET: f32 = 250.0;
/// Default number of parametric steps used when sampling a curve
pub const DEFAULT_CURVE_SAMPLES: usize = 24;

/// A cubic Bezier curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicBezier {
    /// Start point (output socket)
    pub start: Pos2,
    /// First control point
    pub ctrl1: Pos2,
    /// Second control point
    pub ctrl2: Pos2,
    /// End point (input socket)
    pub end: Pos2,
}

impl CubicBezier {
    /// Create a curve from explicit control points
    pub fn new(start: Pos2, ctrl1: Pos2, ctrl2: Pos2, end: Pos2) -> Self {
        Self {
            start,
            ctrl1,
            ctrl2,
            end,
        }
    }

    /// Curve shaped like a taut cable between an output socket and an input socket.
    ///
    /// Tangents are horizontal at both ends: the curve leaves `start` heading right
    /// and enters `end` heading right, whatever the relative placement.
    pub fn cable(start: Pos2, end: Pos2) -> Self {
        let offset = Vec2::new(control_offset(start, end), 0.0);
        Self::new(start, start + offset, end - offset, end)
    }

    /// Evaluate the curve at parameter `t` in `[0, 1]`
    pub fn eval(&self, t: f32) -> Pos2 {
        let t = t.clamp(0.0, 1.0);
        let mt = 1.0 - t;
        let a = mt * mt * mt;
        let b = 3.0 * mt * mt * t;
        let c = 3.0 * mt * t * t;
        let d = t * t * t;
        Pos2::new(
            a * self.start.x + b * self.ctrl1.x + c * self.ctrl2.x + d * self.end.x,
            a * self.start.y + b * self.ctrl1.y + c * self.ctrl2.y + d * self.end.y,
        )
    }

    /// Sample `steps + 1` points along the curve, both endpoints included
    pub fn sample(&self, steps: usize) -> Vec<Pos2> {
        let steps = steps.max(1);
        let mut points = Vec::with_capacity(steps + 1);
        points.push(self.start);
        for i in 1..steps {
            points.push(self.eval(i as f32 / steps as f32));
        }
        points.push(self.end);
        points
    }

    /// Distance from `point` to the sampled polyline approximation of the curve
    pub fn distance_to(&self, point: Pos2, steps: usize) -> f32 {
        self.sample(steps)
            .windows(2)
            .map(|segment| distance_to_segment(point, segment[0], segment[1]))
            .fold(f32::INFINITY, f32::min)
    }
}

/// Horizontal control-point offset for a cable between `start` and `end`
pub fn control_offset(start: Pos2, end: Pos2) -> f32 {
    let dx = end.x - start.x;
    let mut offset = dx.abs() * CONTROL_SCALE;
    if dx < 0.0 {
        offset += -dx * REVERSED_SCALE;
    }
    offset.clamp(MIN_CONTROL_OFFSET, MAX_CONTROL_OFFSET)
}

/// Distance from `point` to the closest point of segment `a`-`b`
fn distance_to_segment(point: Pos2, a: Pos2, b: Pos2) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_sq();
    if len_sq <= f32::EPSILON {
        return point.distance(a);
    }

    let t = (point - a).dot(ab) / len_sq;
    if t <= 0.0 {
        point.distance(a)
    } else if t >= 1.0 {
        point.distance(b)
    } else {
        point.distance(a + ab * t)
    }
}

/// Check whether `point` lies within `radius` of the cable curve from `start` to `end`.
///
/// The curve is approximated by `steps` straight segments, so very small radii can
/// miss points that fall between samples.
pub fn hit_test(point: Pos2, start: Pos2, end: Pos2, radius: f32, steps: usize) -> bool {
    CubicBezier::cable(start, end).distance_to(point, steps) <= radius
}

/// Affine map between screen pixels and the pannable, zoomable grid space.
///
/// `screen = origin + (grid + pan) * zoom`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridTransform {
    /// Screen position of the canvas origin
    pub origin: Pos2,
    /// Pan offset (grid space)
    pub pan: Vec2,
    /// Zoom factor, screen pixels per grid unit
    pub zoom: f32,
}

impl GridTransform {
    /// Create a transform
    pub fn new(origin: Pos2, pan: Vec2, zoom: f32) -> Self {
        Self { origin, pan, zoom }
    }

    /// Convert a screen position to grid space
    pub fn to_grid(&self, screen: Pos2) -> Pos2 {
        ((screen - self.origin) / self.zoom - self.pan).to_pos2()
    }

    /// Convert a grid position to screen space
    pub fn to_screen(&self, grid: Pos2) -> Pos2 {
        self.origin + (grid.to_vec2() + self.pan) * self.zoom
    }

    /// Convert a screen-space length or delta to grid space
    pub fn delta_to_grid(&self, delta: Vec2) -> Vec2 {
        delta / self.zoom
    }

    /// Multiply the zoom by `factor` while keeping the grid point under `anchor` fixed
    pub fn zoom_about(&mut self, anchor: Pos2, factor: f32, min: f32, max: f32) {
        let before = self.to_grid(anchor);
        self.zoom = (self.zoom * factor).clamp(min, max);
        let after = self.to_grid(anchor);
        self.pan += after - before;
    }
}

impl Default for GridTransform {
    fn default() -> Self {
        Self::new(Pos2::ZERO, Vec2::ZERO, 1.0)
    }
}
