//! Rasterizer boundary.
//!
//! The paint scheduler drives a [`Painter`] with frame, transform, clip, and
//! draw-node calls; actual rendering of node content belongs to the SVG
//! rasterizer behind the trait. A recording painter for tests lives in
//! [`crate::tutils`].

use geom::Rect;

use crate::dom::{NodeId, Tree};

/// RGBA color, 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// Drawing backend driven by the paint scheduler.
pub trait Painter {
    /// Begin a frame; resets transform and clip state.
    fn begin_frame(&mut self);
    /// Finish the frame.
    fn end_frame(&mut self);
    /// The drawable device rect in logical units.
    fn device_rect(&self) -> Rect;
    /// Append a translation to the current transform.
    fn translate(&mut self, dx: f32, dy: f32);
    /// Append a scale to the current transform.
    fn scale(&mut self, s: f32);
    /// Restrict drawing to `rect` (in the current transform).
    fn set_clip_rect(&mut self, rect: Rect);
    /// Fill `rect` with a solid color.
    fn fill_rect(&mut self, rect: Rect, color: Color);
    /// Render a node subtree under the current transform, limited to `clip`.
    fn draw_node(&mut self, tree: &Tree, node: NodeId, clip: Rect);
}
