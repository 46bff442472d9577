// SPDX-License-Identifier: MIT OR Apache-2.0
//! Editor configuration.

use crate::geometry::DEFAULT_CURVE_SAMPLES;
use egui::Vec2;

/// Node layout measurements (grid space)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutMetrics {
    /// Space above and below the title
    pub header_padding: f32,
    /// Space between the node border and its pin columns
    pub body_padding: Vec2,
    /// Minimum height of a pin row
    pub pin_row_height: f32,
    /// Vertical space between pin rows
    pub pin_spacing: f32,
    /// Horizontal space between pin columns and the body content
    pub column_gap: f32,
    /// Radius around a socket that still counts as hovering the pin
    pub socket_hit_radius: f32,
}

impl Default for LayoutMetrics {
    fn default() -> Self {
        Self {
            header_padding: 4.0,
            body_padding: Vec2::new(12.0, 6.0),
            pin_row_height: 18.0,
            pin_spacing: 2.0,
            column_gap: 16.0,
            socket_hit_radius: 6.0,
        }
    }
}

/// Interaction and layout settings of a [`Graph`](crate::Graph)
#[derive(Debug, Clone, PartialEq)]
pub struct EditorConfig {
    /// Distance (screen pixels) within which the pointer hovers a link
    pub link_hover_radius: f32,
    /// Parametric steps used to sample link curves for hit-testing
    pub curve_samples: usize,
    /// Key that must be held for the dropped-link callback to fire
    pub dropped_link_key: Option<egui::Key>,
    /// Snap dragged nodes to the sub-grid
    pub snap_to_grid: bool,
    /// Size of a main grid cell
    pub grid_size: f32,
    /// Sub-grid divisions used for snapping
    pub grid_subdivisions: f32,
    /// Smallest zoom factor
    pub min_zoom: f32,
    /// Largest zoom factor
    pub max_zoom: f32,
    /// Node layout measurements
    pub layout: LayoutMetrics,
}

impl EditorConfig {
    /// Require `key` to be held when a link is dropped on empty space
    pub fn with_dropped_link_key(mut self, key: egui::Key) -> Self {
        self.dropped_link_key = Some(key);
        self
    }

    /// Enable snapping to the sub-grid
    pub fn with_snapping(mut self, grid_size: f32, subdivisions: f32) -> Self {
        self.snap_to_grid = true;
        self.grid_size = grid_size;
        self.grid_subdivisions = subdivisions;
        self
    }

    /// Snapping step, if snapping is enabled
    pub fn snap_step(&self) -> Option<f32> {
        if !self.snap_to_grid || self.grid_subdivisions <= 0.0 {
            return None;
        }
        let step = self.grid_size / self.grid_subdivisions;
        (step > 0.0).then_some(step)
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            link_hover_radius: 5.0,
            curve_samples: DEFAULT_CURVE_SAMPLES,
            dropped_link_key: None,
            snap_to_grid: false,
            grid_size: 50.0,
            grid_subdivisions: 5.0,
            min_zoom: 0.1,
            max_zoom: 4.0,
            layout: LayoutMetrics::default(),
        }
    }
}

/// Counter handing out default graph names ("Graph 0", "Graph 1", ...)
#[derive(Debug, Clone, Default)]
pub struct NameSequence {
    next: u32,
}

impl NameSequence {
    /// Start counting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Next unused name
    pub fn next_name(&mut self) -> String {
        let name = format!("Graph {}", self.next);
        self.next += 1;
        name
    }
}
