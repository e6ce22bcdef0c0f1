//! Core types for the twig GUI toolkit: a retained widget tree layered over
//! an SVG-style document, with an incremental flex-layout adapter, an
//! event/focus/modal dispatch state machine, gesture recognition, and a
//! timer subsystem.

pub mod dom;
pub mod error;
pub mod event;
pub mod gesture;
pub mod gui;
mod layout;
pub mod painter;
pub mod platform;
pub mod text;
pub mod timer;
pub mod tutils;
pub mod widget;

pub use dom::{Dirty, DisplayMode, NodeId, NodeKind, Tree};
pub use error::{Error, Result};
pub use event::{
    Buttons, Event, FocusReason, KeyCode, KeyEvent, Mods, PointerEvent, PointerId, Timestamp,
    TouchPoint, WindowEvent, is_long_press_or_right_click,
};
pub use gesture::GestureState;
pub use gui::{EventCx, Gui};
pub use painter::{Color, Painter};
pub use platform::{EventQueue, HeadlessPlatform, Platform};
pub use text::{FixedAdvance, GlyphPos, TextMeasure};
pub use timer::{TimerCallback, TimerId};
pub use widget::{
    AbsPosState, Anchor, Handler, Length, Shadow, WidgetKind, WidgetState, WindowState,
};

// Geometry re-exported at the root for downstream crates.
pub use geom::{Point, Rect, Transform2D};
