//! Canonical input events.
//!
//! All pointer input (mouse, touch, pen) is normalized into one "finger"
//! representation so downstream code does not branch on the input source
//! except where it matters (multi-touch vs. mouse). Synthetic events
//! generated during dispatch (enter/leave, focus changes, outside-press
//! notifications) share the same enum and are delivered as nested calls,
//! never queued.

use std::ops::{Add, BitOr};

use geom::{Point, Rect};

use crate::dom::NodeId;

/// Milliseconds since an arbitrary epoch, as stamped by the platform.
pub type Timestamp = u64;

/// Identity of a pointing device contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointerId(pub u64);

impl PointerId {
    /// Reserved identity for events synthesized from the mouse.
    pub const MOUSE: Self = Self(u64::MAX);
    /// Reserved identity for pen/stylus contacts.
    pub const PEN: Self = Self(u64::MAX - 1);
    /// Reserved identity for synthesized long-press events.
    pub const LONG_PRESS: Self = Self(u64::MAX - 2);
    /// Long-press identity used when the widget under the point changed
    /// between arming and firing.
    pub const LONG_PRESS_ALT: Self = Self(u64::MAX - 3);

    /// True for touch contacts (not mouse, pen, or synthesized identities).
    pub fn is_touch(&self) -> bool {
        self.0 < Self::LONG_PRESS_ALT.0
    }
}

/// Button bitmask carried on pointer events. A single touch contact reports
/// `PRIMARY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Buttons(pub u8);

impl Buttons {
    pub const NONE: Self = Self(0);
    pub const PRIMARY: Self = Self(1);
    pub const SECONDARY: Self = Self(2);
    pub const MIDDLE: Self = Self(4);

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

impl BitOr for Buttons {
    type Output = Self;

    fn bitor(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// One pointer contact sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    /// Contact identity.
    pub id: PointerId,
    /// Pressed button mask (for touch, `PRIMARY` while down).
    pub buttons: Buttons,
    /// Position in window-local logical coordinates.
    pub pos: Point,
    /// Contact pressure in [0, 1]; mouse reports 1.
    pub pressure: f32,
    /// Event timestamp.
    pub t: Timestamp,
}

impl PointerEvent {
    pub fn new(id: PointerId, buttons: Buttons, pos: Point, t: Timestamp) -> Self {
        Self {
            id,
            buttons,
            pos,
            pressure: 1.0,
            t,
        }
    }
}

/// A tracked touch contact, reported with multi-touch events.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    pub id: PointerId,
    pub pos: Point,
    pub pressure: f32,
}

/// Keyboard modifier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Mods {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

/// No modifiers held.
pub const EMPTY: Mods = Mods {
    shift: false,
    ctrl: false,
    alt: false,
};

/// Shift modifier.
pub const SHIFT: Mods = Mods {
    shift: true,
    ctrl: false,
    alt: false,
};

/// Control modifier.
pub const CTRL: Mods = Mods {
    shift: false,
    ctrl: true,
    alt: false,
};

impl Add for Mods {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            shift: self.shift || other.shift,
            ctrl: self.ctrl || other.ctrl,
            alt: self.alt || other.alt,
        }
    }
}

/// Key codes the core routes. Printable input arrives as `TextInput`
/// events; `Char` keys exist for shortcut matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    PageUp,
    PageDown,
    Delete,
    Backspace,
    Enter,
    Escape,
    Tab,
    Char(char),
}

/// A key press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: KeyCode,
    pub mods: Mods,
    pub t: Timestamp,
}

impl KeyEvent {
    pub fn new(key: KeyCode, mods: Mods, t: Timestamp) -> Self {
        Self { key, mods, t }
    }
}

/// Why focus moved. Receivers use this to pick side effects: tab focus
/// selects all text in an editor, pressed focus does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusReason {
    None,
    Pressed,
    Tab,
    Window,
    Menu,
    Hidden,
}

/// Window-level events from the platform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowEvent {
    /// The native window was resized or moved; new bounds in logical units.
    Resized(Rect),
    /// The native window gained keyboard focus.
    FocusGained,
    /// The native window lost keyboard focus.
    FocusLost,
    /// The pointer left the native window.
    Leave,
    /// A region was uncovered and must be repainted.
    Expose,
    /// The window manager requested the window close.
    CloseRequested,
}

/// The canonical event union.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    PointerDown(PointerEvent),
    PointerMove(PointerEvent),
    PointerUp(PointerEvent),
    PointerCancel(PointerEvent),
    Wheel {
        pos: Point,
        dx: f32,
        dy: f32,
        mods: Mods,
        t: Timestamp,
    },
    KeyDown(KeyEvent),
    KeyUp(KeyEvent),
    /// A chunk of committed text input (UTF-8).
    TextInput {
        text: String,
        t: Timestamp,
    },
    /// Full-contents IME update: replacement text plus selection, as sent by
    /// soft keyboards.
    ImeUpdate {
        text: String,
        sel_start: usize,
        sel_end: usize,
    },
    /// The soft keyboard was dismissed by the user.
    KeyboardHidden,
    Window(WindowEvent),

    // Synthesized during dispatch; delivered as nested calls.
    /// The pointer entered the widget.
    Enter,
    /// The pointer left the widget.
    Leave,
    FocusGained(FocusReason),
    FocusLost {
        reason: FocusReason,
        /// The widget about to gain focus, if any.
        to: Option<NodeId>,
    },
    /// A press landed outside the active modal. Sent to the modal, which may
    /// close itself; returning accepted swallows the press.
    OutsideModal {
        /// Widget under the press, if any.
        target: Option<NodeId>,
        press: PointerEvent,
    },
    /// The gesture ended outside the pressed widget's subtree. Equivalent to
    /// a release without acceptance.
    OutsidePressed {
        /// Widget under the release, if any.
        target: Option<NodeId>,
    },
    Enabled,
    Disabled,
    Visible,
    Invisible,
    LongPress {
        pos: Point,
        /// True when the widget under the point changed between arming and
        /// firing.
        alt: bool,
    },
    /// All touch contacts bundled once a second concurrent contact appears.
    MultiTouch {
        points: Vec<TouchPoint>,
        /// The pointer event that produced this bundle.
        cause: PointerEvent,
    },
    /// Opaque wake from the timer thread; triggers `process_timers`.
    TimerTick,
    /// The screen or top-level window size changed.
    ScreenResized(Rect),
}

impl Event {
    /// The timestamp carried by the event, if it has one.
    pub fn timestamp(&self) -> Option<Timestamp> {
        match self {
            Self::PointerDown(p)
            | Self::PointerMove(p)
            | Self::PointerUp(p)
            | Self::PointerCancel(p) => Some(p.t),
            Self::Wheel { t, .. } | Self::TextInput { t, .. } => Some(*t),
            Self::KeyDown(k) | Self::KeyUp(k) => Some(k.t),
            _ => None,
        }
    }

    /// The pointer payload for pointer-phase events.
    pub fn pointer(&self) -> Option<&PointerEvent> {
        match self {
            Self::PointerDown(p)
            | Self::PointerMove(p)
            | Self::PointerUp(p)
            | Self::PointerCancel(p) => Some(p),
            _ => None,
        }
    }
}

/// True for events conventionally treated as a context-menu request: a
/// synthesized long press or a secondary-button press.
pub fn is_long_press_or_right_click(event: &Event) -> bool {
    match event {
        Event::LongPress { alt, .. } => !alt,
        Event::PointerDown(p) => p.buttons.contains(Buttons::SECONDARY),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_identities() {
        assert!(!PointerId::MOUSE.is_touch());
        assert!(!PointerId::LONG_PRESS.is_touch());
        assert!(PointerId(0).is_touch());
        assert!(PointerId(7).is_touch());
    }

    #[test]
    fn button_masks() {
        let b = Buttons::PRIMARY | Buttons::MIDDLE;
        assert!(b.contains(Buttons::PRIMARY));
        assert!(b.contains(Buttons::MIDDLE));
        assert!(!b.contains(Buttons::SECONDARY));
        assert!(!Buttons::NONE.contains(Buttons::NONE));
    }

    #[test]
    fn right_click_detection() {
        let p = PointerEvent::new(PointerId::MOUSE, Buttons::SECONDARY, Point::ZERO, 0);
        assert!(is_long_press_or_right_click(&Event::PointerDown(p)));
        assert!(is_long_press_or_right_click(&Event::LongPress {
            pos: Point::ZERO,
            alt: false
        }));
        assert!(!is_long_press_or_right_click(&Event::LongPress {
            pos: Point::ZERO,
            alt: true
        }));
    }
}
