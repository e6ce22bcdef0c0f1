//! Scrollable viewport.
//!
//! The viewport steals low-level pointer events from its descendants with
//! an event filter, so it can disambiguate a tap (forwarded to the child
//! under the finger) from a drag (scrolls the contents). The gesture logic
//! itself lives in [`ScrollGesture`], a plain state machine with named
//! phases that is testable without the dispatch pipeline.

use std::cell::RefCell;
use std::rc::Rc;

use geom::{Point, Rect, Transform2D};
use twig_core::gui::{EventCx, Gui};
use twig_core::{Buttons, Event, KeyCode, NodeId, NodeKind, PointerId, is_long_press_or_right_click};

/// Velocity IIR time constant while dragging (ms).
pub const FLING_AVG_MS: f32 = 50.0;
/// Fling deceleration, px per ms per ms.
pub const FLING_DECEL: f32 = 100e-6;
/// Slower releases than this do not fling (px per ms).
pub const MIN_FLING_V: f32 = 200e-3;
/// Fling animation tick period (ms).
pub const FLING_TIMER_MS: i64 = 50;
/// Overscroll correction divisor per tick. Tuned, not derived.
pub const OVERSCROLL_DAMPING: f32 = 2.0;
/// Time constant of the overscroll snap-back fade (ms). Tuned, not derived.
pub const FLING_FADE_MS: f32 = 750.0;

/// Gesture phases for a scroll viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollPhase {
    Idle,
    /// Finger down; may still become a tap.
    PressPending,
    /// Finger travel exceeded the tap slop; scrolling.
    Dragging,
    /// Finger lifted with velocity; deceleration ticks run.
    Flinging,
}

/// What the state machine asks its owner to do after a transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollOp {
    None,
    /// Scroll the contents by this delta.
    ScrollBy(Point),
    /// The gesture ended as a tap: undo `ScrollBy` drift and forward the
    /// click.
    Tap { undo: Point },
    /// Begin deceleration ticks.
    StartFling,
    /// Deceleration finished.
    StopFling,
}

/// Explicit scroll gesture state machine.
#[derive(Debug)]
pub struct ScrollGesture {
    pub phase: ScrollPhase,
    /// Estimated velocity in px/ms (IIR over motion samples).
    pub fling_v: Point,
    initial_pos: Point,
    prev_pos: Point,
    prev_time: f32,
}

impl Default for ScrollGesture {
    fn default() -> Self {
        Self {
            phase: ScrollPhase::Idle,
            fling_v: Point::ZERO,
            initial_pos: Point::ZERO,
            prev_pos: Point::ZERO,
            prev_time: 0.0,
        }
    }
}

impl ScrollGesture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finger down. Kills any fling in progress.
    pub fn press(&mut self, pos: Point, t_ms: f32) -> ScrollOp {
        let was_flinging = self.phase == ScrollPhase::Flinging;
        self.phase = ScrollPhase::PressPending;
        self.fling_v = Point::ZERO;
        self.initial_pos = pos;
        self.prev_pos = pos;
        self.prev_time = t_ms;
        if was_flinging {
            ScrollOp::StopFling
        } else {
            ScrollOp::None
        }
    }

    /// Finger motion while down.
    pub fn drag(&mut self, pos: Point, t_ms: f32, still_tap: bool) -> ScrollOp {
        if self.phase == ScrollPhase::Idle || self.phase == ScrollPhase::Flinging {
            return ScrollOp::None;
        }
        if self.phase == ScrollPhase::PressPending && !still_tap {
            self.phase = ScrollPhase::Dragging;
        }
        let delta = pos - self.prev_pos;
        let dt = t_ms - self.prev_time;
        if dt > 1.0 {
            // Single-pole IIR low-pass over the instantaneous velocity.
            let vel = delta / dt;
            let d = (-dt / FLING_AVG_MS).exp();
            self.fling_v = self.fling_v * d + vel * (1.0 - d);
        }
        self.prev_pos = pos;
        self.prev_time = t_ms;
        ScrollOp::ScrollBy(delta)
    }

    /// Finger up. `still_tap` reflects the recognizer's click counter.
    pub fn release(&mut self, still_tap: bool) -> ScrollOp {
        match self.phase {
            ScrollPhase::Idle | ScrollPhase::Flinging => ScrollOp::None,
            ScrollPhase::PressPending if still_tap => {
                self.phase = ScrollPhase::Idle;
                ScrollOp::Tap {
                    undo: self.initial_pos - self.prev_pos,
                }
            }
            _ => {
                // Fling along the dominant axis only.
                self.fling_v = if self.fling_v.x.abs() > self.fling_v.y.abs() {
                    Point::new(self.fling_v.x, 0.0)
                } else {
                    Point::new(0.0, self.fling_v.y)
                };
                if self.fling_v.dist(Point::ZERO) > MIN_FLING_V {
                    self.phase = ScrollPhase::Flinging;
                    ScrollOp::StartFling
                } else {
                    self.phase = ScrollPhase::Idle;
                    self.fling_v = Point::ZERO;
                    ScrollOp::None
                }
            }
        }
    }

    /// One deceleration tick.
    pub fn tick(&mut self) -> ScrollOp {
        if self.phase != ScrollPhase::Flinging {
            return ScrollOp::None;
        }
        let delta = self.fling_v * FLING_TIMER_MS as f32;
        let v = self.fling_v.dist(Point::ZERO);
        let scaled = (v - FLING_DECEL * FLING_TIMER_MS as f32).max(0.0) / v;
        self.fling_v = self.fling_v * scaled;
        if self.fling_v.dist(Point::ZERO) <= MIN_FLING_V {
            self.phase = ScrollPhase::Idle;
            self.fling_v = Point::ZERO;
            return ScrollOp::StopFling;
        }
        ScrollOp::ScrollBy(delta)
    }

    /// External interruption (outside-press, cancel).
    pub fn interrupt(&mut self) {
        self.phase = ScrollPhase::Idle;
        self.fling_v = Point::ZERO;
    }
}

struct ScrollState {
    gesture: ScrollGesture,
    /// Scroll position, 0 at top-left, growing down/right.
    scroll: Point,
    /// Valid scroll range derived from contents vs viewport size.
    limits: Rect,
    /// Widget that took the press, pending tap-vs-drag resolution.
    tapped: Option<NodeId>,
}

/// A scrolling container: a document viewport around one contents group.
#[derive(Clone, Copy)]
pub struct ScrollArea {
    pub root: NodeId,
    pub contents: NodeId,
}

impl ScrollArea {
    /// Wrap `contents` (a layout container) in a scroll viewport.
    pub fn new(gui: &mut Gui, contents: NodeId) -> Self {
        let root = gui.tree.new_node(NodeKind::Doc);
        gui.tree.add_class(root, "scrollarea");
        gui.tree.set_attr(root, "width", "100%");
        gui.tree.set_attr(root, "height", "100%");
        gui.tree.set_attr(root, "layout", "box");
        gui.tree.add_child(root, contents);

        {
            let w = gui.tree.ensure_widget(root);
            w.focusable = true;
        }
        // Changes inside the viewport never force relayout of ancestors.
        gui.tree.ensure_widget(contents).layout_isolate = true;

        let state = Rc::new(RefCell::new(ScrollState {
            gesture: ScrollGesture::new(),
            scroll: Point::ZERO,
            limits: Rect::wh(0.0, 0.0),
            tapped: None,
        }));
        gui.tree.ensure_widget(root).user_data = Some(state.clone());

        let this = Self { root, contents };

        let st = state.clone();
        gui.tree.ensure_widget(root).filter = Some(Rc::new(move |cx, target, event| {
            this.filter_event(cx, &st, target, event)
        }));

        let st = state.clone();
        gui.add_handler(root, move |cx, event| this.handle_event(cx, &st, event));

        let st = state.clone();
        gui.tree.ensure_widget(contents).on_apply_layout =
            Some(Rc::new(move |gui, id, _src, dest| {
                // Contents were just solved: refresh the scroll range.
                let mut s = st.borrow_mut();
                let bbox = gui.tree.bounds(this.root);
                s.limits = Rect::ltrb(
                    0.0,
                    0.0,
                    (dest.width() - bbox.width()).max(0.0),
                    (dest.height() - bbox.height()).max(0.0),
                );
                s.scroll.x = s.scroll.x.clamp(s.limits.left, s.limits.right);
                s.scroll.y = s.scroll.y.clamp(s.limits.top, s.limits.bottom);
                let _ = id;
                false
            }));

        let st = state.clone();
        gui.tree.ensure_widget(root).on_prepare_layout = Some(Rc::new(move |gui, id| {
            let (hfit, vfit) = this.fit_axes(gui);
            if hfit || vfit {
                // Fit the viewport to its contents on the free axes; only
                // happens before the document size is pinned.
                gui.tree
                    .set_layout_transform(this.contents, Transform2D::identity());
                gui.tree.set_layout_transform(id, Transform2D::identity());
                let _ = gui.layout_widget(this.contents, Rect::wh(0.0, 0.0));
                let bbox = gui.tree.bounds(this.contents);
                let scroll = st.borrow().scroll;
                let tf = Transform2D::translating(-scroll.x, -scroll.y)
                    * gui
                        .tree
                        .widget(this.contents)
                        .map(|w| w.layout_transform)
                        .unwrap_or_default();
                gui.tree.set_layout_transform(this.contents, tf);
                Rect::wh(
                    if hfit { bbox.width() } else { 0.0 },
                    if vfit { bbox.height() } else { 0.0 },
                )
            } else {
                let px = |name: &str| {
                    gui.tree
                        .node(id)
                        .attr(name)
                        .filter(|v| !v.ends_with('%'))
                        .and_then(|v| v.parse::<f32>().ok())
                        .unwrap_or(0.0)
                };
                Rect::wh(px("width"), px("height"))
            }
        }));

        let st = state;
        gui.tree.ensure_widget(root).on_apply_layout = Some(Rc::new(move |gui, id, _src, dest| {
            let (hfit, vfit) = this.fit_axes(gui);
            // Pin the document size to the solved box.
            gui.tree
                .set_attr(id, "width", &format!("{}", dest.width()));
            gui.tree
                .set_attr(id, "height", &format!("{}", dest.height()));

            if !hfit && !vfit {
                // Contents fit to the viewport: deferred sub-layout against
                // the solved box, then the scroll offset.
                gui.tree
                    .set_layout_transform(this.contents, Transform2D::identity());
                let old_tf = gui
                    .tree
                    .widget(id)
                    .map(|w| w.layout_transform)
                    .unwrap_or_default();
                gui.tree.set_layout_transform(id, Transform2D::identity());
                let canchor = gui
                    .tree
                    .widget(this.contents)
                    .map(|w| w.layout.anchor)
                    .unwrap_or_default();
                let sub = Rect::wh(
                    if canchor.hfill() { dest.width() } else { 0.0 },
                    if canchor.vfill() { dest.height() } else { 0.0 },
                );
                let _ = gui.layout_widget(this.contents, sub);
                let scroll = st.borrow().scroll;
                let tf = Transform2D::translating(-scroll.x, -scroll.y)
                    * gui
                        .tree
                        .widget(this.contents)
                        .map(|w| w.layout_transform)
                        .unwrap_or_default();
                gui.tree.set_layout_transform(this.contents, tf);
                gui.tree.set_layout_transform(id, old_tf);
            }
            let bbox = gui.tree.bounds(id);
            let tf = Transform2D::translating(dest.left - bbox.left, dest.top - bbox.top)
                * gui
                    .tree
                    .widget(id)
                    .map(|w| w.layout_transform)
                    .unwrap_or_default();
            gui.tree.set_layout_transform(id, tf);
            true
        }));

        this
    }

    /// Axes on which the viewport fits its contents instead of constraining
    /// them: percent-sized and not anchored to fill.
    fn fit_axes(&self, gui: &Gui) -> (bool, bool) {
        let node = gui.tree.node(self.root);
        let anchor = node
            .widget
            .as_ref()
            .map(|w| w.layout.anchor)
            .unwrap_or_default();
        let percent = |name: &str| node.attr(name).is_some_and(|v| v.ends_with('%'));
        (
            percent("width") && !anchor.hfill(),
            percent("height") && !anchor.vfill(),
        )
    }

    fn state(&self, gui: &Gui) -> Rc<RefCell<ScrollState>> {
        gui.tree
            .widget(self.root)
            .and_then(|w| w.data::<RefCell<ScrollState>>())
            .expect("scroll state missing")
    }

    /// Current scroll offset.
    pub fn scroll_pos(&self, gui: &Gui) -> Point {
        self.state(gui).borrow().scroll
    }

    /// Scroll by a content-space delta (positive dr scrolls toward the
    /// top-left).
    pub fn scroll(&self, gui: &mut Gui, dr: Point) {
        let target = self.state(gui).borrow().scroll - dr;
        self.set_scroll(gui, target, false);
    }

    /// Jump to an absolute scroll position, clamped to the limits.
    pub fn scroll_to(&self, gui: &mut Gui, r: Point) {
        self.set_scroll(gui, r, false);
    }

    /// Drag-scroll by a delta; positions past the limits rubber-band by the
    /// damping divisor instead of stopping dead.
    fn scroll_rubber(&self, gui: &mut Gui, dr: Point) {
        let target = self.state(gui).borrow().scroll - dr;
        self.set_scroll(gui, target, true);
    }

    fn set_scroll(&self, gui: &mut Gui, r: Point, rubber: bool) {
        let state = self.state(gui);
        let (old, new) = {
            let mut s = state.borrow_mut();
            if !s.limits.is_valid() {
                return;
            }
            let clamped = Point::new(
                r.x.clamp(s.limits.left, s.limits.right),
                r.y.clamp(s.limits.top, s.limits.bottom),
            );
            let new = if rubber {
                clamped + (r - clamped) / OVERSCROLL_DAMPING
            } else {
                clamped
            };
            let old = s.scroll;
            s.scroll = new;
            (old, new)
        };
        if old != new {
            let tf = Transform2D::translating(old.x - new.x, old.y - new.y)
                * gui
                    .tree
                    .widget(self.contents)
                    .map(|w| w.layout_transform)
                    .unwrap_or_default();
            gui.tree.set_layout_transform(self.contents, tf);
        }
    }

    /// How far the current position sits past the limits.
    fn overscroll(state: &ScrollState) -> Point {
        let s = state.scroll;
        let clamped = Point::new(
            s.x.clamp(state.limits.left, state.limits.right),
            s.y.clamp(state.limits.top, state.limits.bottom),
        );
        s - clamped
    }

    /// The event filter: runs before normal dispatch for everything
    /// targeted inside the viewport.
    fn filter_event(
        &self,
        cx: &mut EventCx<'_>,
        state: &Rc<RefCell<ScrollState>>,
        _target: Option<NodeId>,
        event: &Event,
    ) -> bool {
        let root = self.root;
        let Some(win) = cx.gui.tree.window_of(root) else {
            return false;
        };
        let primary_down = matches!(event, Event::PointerDown(p) if p.buttons.contains(Buttons::PRIMARY));
        if primary_down || is_long_press_or_right_click(event) {
            let pos = match event {
                Event::PointerDown(p) => p.pos,
                Event::LongPress { pos, .. } => *pos,
                _ => unreachable!(),
            };
            let t = event.timestamp().unwrap_or_else(|| cx.gui.now_ms()) as f32;
            let op = state.borrow_mut().gesture.press(pos, t);
            if op == ScrollOp::StopFling {
                cx.gui.remove_widget_timer(root);
            }
            // A pending tap at this point can only mean a long press landed.
            let stale = state.borrow_mut().tapped.take();
            if let Some(stale) = stale {
                cx.gui
                    .deliver(stale, &Event::OutsidePressed { target: Some(root) });
            }
            // Forward the press to the child under the finger so it can
            // highlight (and possibly become the tap target).
            let child = cx
                .gui
                .tree
                .node_at(self.contents, pos)
                .and_then(|n| cx.gui.tree.nearest_widget(n));
            if let Some(child) = child {
                cx.gui.send_event(win, Some(child), event);
            }
            if primary_down {
                state.borrow_mut().tapped = cx.gui.pressed_widget;
                // Keep leave notifications away from the tapped child while
                // the gesture is still ambiguous.
                cx.gui.hovered_widget = Some(root);
                cx.gui.set_pressed(root);
            }
            return true;
        }

        match event {
            Event::PointerMove(p)
                if p.id != PointerId::MOUSE && cx.gui.pressed_widget == Some(root) =>
            {
                let still_tap = cx.gui.gestures.clicks >= 1;
                let op = state.borrow_mut().gesture.drag(p.pos, p.t as f32, still_tap);
                if let ScrollOp::ScrollBy(delta) = op {
                    self.scroll_rubber(cx.gui, delta);
                }
                if !still_tap {
                    let tapped = state.borrow_mut().tapped.take();
                    if let Some(tapped) = tapped {
                        cx.gui
                            .deliver(tapped, &Event::OutsidePressed { target: Some(root) });
                    }
                }
                true
            }
            Event::PointerUp(_) | Event::OutsidePressed { .. }
                if cx.gui.pressed_widget == Some(root)
                    || state.borrow().gesture.phase != ScrollPhase::Idle =>
            {
                let is_up = matches!(event, Event::PointerUp(_));
                let still_tap = is_up && cx.gui.gestures.clicks >= 1;
                let op = state.borrow_mut().gesture.release(still_tap);
                match op {
                    ScrollOp::Tap { undo } => {
                        // Cancel any drift, then replay the click on the
                        // child that took the press.
                        self.scroll(cx.gui, undo);
                        let tapped = state.borrow_mut().tapped.take();
                        if let Some(tapped) = tapped {
                            cx.gui.set_pressed(tapped);
                            cx.gui.send_event(win, Some(tapped), event);
                        }
                    }
                    ScrollOp::StartFling => {
                        let tapped = state.borrow_mut().tapped.take();
                        if let Some(tapped) = tapped {
                            cx.gui
                                .deliver(tapped, &Event::OutsidePressed { target: Some(root) });
                        }
                        cx.gui.set_timer(FLING_TIMER_MS, root, None);
                    }
                    _ => {
                        let tapped = state.borrow_mut().tapped.take();
                        if let Some(tapped) = tapped {
                            cx.gui
                                .deliver(tapped, &Event::OutsidePressed { target: Some(root) });
                        }
                        // Snap back any overscroll left by the drag.
                        if Self::overscroll(&state.borrow()) != Point::ZERO {
                            cx.gui.set_timer(FLING_TIMER_MS, root, None);
                        }
                    }
                }
                true
            }
            _ => false,
        }
    }

    /// Normal handlers: wheel, keyboard scrolling, fling ticks.
    fn handle_event(
        &self,
        cx: &mut EventCx<'_>,
        state: &Rc<RefCell<ScrollState>>,
        event: &Event,
    ) -> bool {
        match event {
            Event::Wheel { dy, .. } => {
                state.borrow_mut().gesture.interrupt();
                cx.gui.remove_widget_timer(self.root);
                self.scroll(cx.gui, Point::new(0.0, dy / 12.0));
                true
            }
            Event::KeyDown(k) => {
                let page = cx.gui.tree.bounds(self.root).height();
                let dy = match k.key {
                    KeyCode::PageUp => page,
                    KeyCode::PageDown => -page,
                    KeyCode::Up => 20.0,
                    KeyCode::Down => -20.0,
                    _ => return false,
                };
                self.scroll(cx.gui, Point::new(0.0, dy));
                true
            }
            Event::TimerTick => {
                let op = state.borrow_mut().gesture.tick();
                let mut rearm = false;
                if let ScrollOp::ScrollBy(delta) = op {
                    self.scroll(cx.gui, delta);
                    // Hitting an edge kills the velocity on that axis.
                    let mut s = state.borrow_mut();
                    let at = s.scroll;
                    if at.x <= s.limits.left || at.x >= s.limits.right {
                        s.gesture.fling_v.x = 0.0;
                    }
                    if at.y <= s.limits.top || at.y >= s.limits.bottom {
                        s.gesture.fling_v.y = 0.0;
                    }
                    rearm = true;
                }
                // Exponential snap-back of overscroll, damped per tick.
                let excess = Self::overscroll(&state.borrow());
                if excess != Point::ZERO {
                    let k = 1.0
                        - (-(FLING_TIMER_MS as f32) * OVERSCROLL_DAMPING / FLING_FADE_MS).exp();
                    let mut corr = excess * k;
                    if excess.dist(Point::ZERO) < 0.5 {
                        corr = excess;
                    }
                    let target = state.borrow().scroll - corr;
                    self.set_scroll(cx.gui, target, true);
                    rearm = rearm || Self::overscroll(&state.borrow()) != Point::ZERO;
                }
                rearm
            }
            _ => false,
        }
    }
}
