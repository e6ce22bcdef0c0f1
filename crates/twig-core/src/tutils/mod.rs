//! Test utilities: an instrumented widget tree and a recording painter.

/// Instrumented standard tree for dispatch tests.
pub mod ttree;

use geom::Rect;

use crate::dom::{NodeId, Tree};
use crate::painter::{Color, Painter};

/// Painter that records draw calls for assertions.
#[derive(Default)]
pub struct RecordingPainter {
    /// Device rect reported to the scheduler.
    pub device: Rect,
    /// Nodes drawn this frame, with their clip rects.
    pub drawn: Vec<(NodeId, Rect)>,
    /// Solid fills issued this frame.
    pub fills: Vec<(Rect, Color)>,
    /// Clip rect set for the current frame.
    pub clip: Option<Rect>,
    /// Completed frame count.
    pub frames: usize,
}

impl RecordingPainter {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            device: Rect::wh(width, height),
            ..Self::default()
        }
    }
}

impl Painter for RecordingPainter {
    fn begin_frame(&mut self) {
        self.drawn.clear();
        self.fills.clear();
        self.clip = None;
    }

    fn end_frame(&mut self) {
        self.frames += 1;
    }

    fn device_rect(&self) -> Rect {
        self.device
    }

    fn translate(&mut self, _dx: f32, _dy: f32) {}

    fn scale(&mut self, _s: f32) {}

    fn set_clip_rect(&mut self, rect: Rect) {
        self.clip = Some(rect);
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.fills.push((rect, color));
    }

    fn draw_node(&mut self, _tree: &Tree, node: NodeId, clip: Rect) {
        self.drawn.push((node, clip));
    }
}
