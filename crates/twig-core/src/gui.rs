//! The event/focus/modal dispatch core.
//!
//! One `Gui` instance per rendering context owns the node tree, the window
//! stack, menu stack, pressed/hovered/focused tracking, timers, and the
//! dirty-rect layout-and-paint scheduler. All widget access happens on the
//! thread that owns the `Gui`; the only other thread is the timer waker,
//! which never touches widgets.

use std::rc::Rc;

use geom::{Point, Rect, Transform2D};
use tracing::{debug, warn};

use crate::dom::{Dirty, DisplayMode, NodeId, NodeKind, Tree};
use crate::error::Result;
use crate::event::{
    Buttons, Event, FocusReason, PointerEvent, PointerId, Timestamp, TouchPoint, WindowEvent,
};
use crate::gesture::{GestureState, Phase};
use crate::layout;
use crate::painter::{Color, Painter};
use crate::platform::{EventQueue, HeadlessPlatform, Platform};
use crate::text::{FixedAdvance, TextMeasure};
use crate::timer::{TimerCallback, TimerId, Timers};
use crate::widget::{Handler, WidgetKind, WidgetState, WindowState};

/// Context handed to widget event handlers: the GUI plus the widget the
/// handler is attached to.
pub struct EventCx<'a> {
    pub gui: &'a mut Gui,
    pub widget: NodeId,
}

/// Default long-press delay in ms.
pub const LONG_PRESS_DELAY_MS: i64 = 700;
/// Finger travel beyond this cancels a pending long press (px).
const LONG_PRESS_CANCEL_DIST: f32 = 20.0;

/// The GUI controller.
pub struct Gui {
    pub tree: Tree,
    /// Open windows; back is topmost/active.
    windows: Vec<NodeId>,
    /// Open floating menus; front is the root menu, back the most nested.
    menu_stack: Vec<NodeId>,
    /// Widget capturing the current pointer gesture, if any.
    pub pressed_widget: Option<NodeId>,
    /// Widget under the pointer receiving enter/leave notifications.
    pub hovered_widget: Option<NodeId>,
    next_input_widget: Option<NodeId>,
    curr_input_widget: Option<NodeId>,
    timers: Timers,
    pub gestures: GestureState,
    long_press_timer: Option<TimerId>,
    /// Menu closed by the most recent press, so the opening button can avoid
    /// immediately reopening it.
    pub last_closed_menu: Option<NodeId>,
    /// Screen regions uncovered by closed windows or hidden floats.
    closed_bounds: Rect,
    pub queue: EventQueue,
    pub platform: Box<dyn Platform>,
    pub text_measure: Box<dyn TextMeasure>,
    pub long_press_delay_ms: i64,
    paint_scale: f32,
}

impl Gui {
    pub fn new(platform: Box<dyn Platform>, queue: EventQueue) -> Self {
        Self {
            tree: Tree::new(),
            windows: Vec::new(),
            menu_stack: Vec::new(),
            pressed_widget: None,
            hovered_widget: None,
            next_input_widget: None,
            curr_input_widget: None,
            timers: Timers::new(queue.clone()),
            gestures: GestureState::new(),
            long_press_timer: None,
            last_closed_menu: None,
            closed_bounds: Rect::default(),
            queue,
            platform,
            text_measure: Box::new(FixedAdvance::default()),
            long_press_delay_ms: LONG_PRESS_DELAY_MS,
            paint_scale: 1.0,
        }
    }

    /// In-memory GUI for tests and tools.
    pub fn headless() -> Self {
        Self::new(Box::new(HeadlessPlatform::default()), EventQueue::unwakeable())
    }

    pub fn windows(&self) -> &[NodeId] {
        &self.windows
    }

    pub fn menu_stack(&self) -> &[NodeId] {
        &self.menu_stack
    }

    /// Milliseconds since the GUI started; timestamp source for synthesized
    /// events.
    pub fn now_ms(&self) -> Timestamp {
        self.timers.now_ms()
    }

    // ---- widget construction helpers -----------------------------------

    /// Create a window rooted at a new document node.
    pub fn new_window(&mut self) -> NodeId {
        let doc = self.tree.new_node(NodeKind::Doc);
        self.tree.node_mut(doc).widget =
            Some(WidgetState::new(WidgetKind::Window(Box::new(WindowState::new()))));
        doc
    }

    /// Mark an existing node as absolutely positioned.
    pub fn make_abs_pos(&mut self, id: NodeId) {
        self.tree.set_attr(id, "position", "absolute");
        self.tree.set_display(id, DisplayMode::Absolute);
        let w = self.tree.ensure_widget(id);
        if !matches!(w.kind, WidgetKind::AbsPos(_)) {
            w.kind = WidgetKind::AbsPos(Default::default());
            w.layout_vars_valid = false;
        }
    }

    /// Append an event handler; handlers added later run first.
    pub fn add_handler(
        &mut self,
        id: NodeId,
        handler: impl Fn(&mut EventCx<'_>, &Event) -> bool + 'static,
    ) {
        self.tree.ensure_widget(id).handlers.push(Rc::new(handler));
    }

    // ---- dispatch -------------------------------------------------------

    /// Run a widget's handler chain for one event. Returns true if a
    /// handler accepted it. A widget with no handlers never consumes
    /// events; a disabled widget receives none.
    pub fn deliver(&mut self, id: NodeId, event: &Event) -> bool {
        if !self.tree.contains(id) || !self.tree.is_enabled(id) {
            return false;
        }
        let handlers: Vec<Handler> = match &self.tree.node(id).widget {
            Some(w) if !w.handlers.is_empty() => w.handlers.clone(),
            _ => return false,
        };
        for h in handlers.iter().rev() {
            if h(&mut EventCx { gui: self, widget: id }, event) {
                return true;
            }
        }
        false
    }

    /// The widget that owns press gestures for `id`: the topmost visible
    /// pressed-group container above it, or `id` itself.
    pub fn pressed_group_container(&self, id: NodeId) -> NodeId {
        let mut container = id;
        let mut cur = self.tree.parent_widget(id);
        while let Some(w) = cur {
            let state = self.tree.widget(w).expect("parent_widget returns widgets");
            if state.pressed_group && self.tree.node(w).is_visible() {
                container = w;
            }
            cur = self.tree.parent_widget(w);
        }
        container
    }

    fn root_window(&self, win: NodeId) -> NodeId {
        let mut w = win;
        while let Some(p) = self.tree.window_state(w).parent_window {
            w = p;
        }
        w
    }

    /// The window's active modal child, or the window itself.
    pub fn modal_or_self(&self, win: NodeId) -> NodeId {
        self.tree
            .window_state(self.root_window(win))
            .modal_child
            .unwrap_or(win)
    }

    fn modal_child_of(&self, win: NodeId) -> Option<NodeId> {
        self.tree.window_state(self.root_window(win)).modal_child
    }

    /// Move keyboard focus to the nearest focusable, enabled ancestor of
    /// `widget` (possibly itself). Returns false if nothing focusable was
    /// found.
    pub fn set_focused(&mut self, widget: NodeId, reason: FocusReason) -> bool {
        let Some(win) = self.tree.window_of(widget) else {
            return false;
        };
        let mut target = Some(widget);
        while let Some(w) = target {
            let focusable = self
                .tree
                .widget(w)
                .is_some_and(|s| s.focusable && s.enabled);
            if focusable && self.tree.is_enabled(w) {
                break;
            }
            target = self.tree.parent_widget(w);
        }
        if self.tree.window_state(win).focused == target {
            return true;
        }
        let Some(target) = target else {
            return false;
        };
        if let Some(old) = self.tree.window_state(win).focused {
            self.deliver(
                old,
                &Event::FocusLost {
                    reason,
                    to: Some(target),
                },
            );
            self.tree.remove_class(old, "focused");
        }
        self.tree.window_state_mut(win).focused = Some(target);
        self.deliver(target, &Event::FocusGained(reason));
        // The receiver may clear or redirect focus from its handler.
        if let Some(focused) = self.tree.window_state(win).focused {
            self.tree.add_class(focused, "focused");
        }
        true
    }

    /// Make `widget`'s pressed-group container capture the pointer gesture
    /// and focus it.
    pub fn set_pressed(&mut self, widget: NodeId) {
        self.pressed_widget = Some(self.pressed_group_container(widget));
        self.set_focused(widget, FocusReason::Pressed);
    }

    /// Send leave events from the hovered widget up to (not including)
    /// `widget`, which becomes the new hovered widget; never walks above
    /// `top_widget`. `widget` must be None or an ancestor of the hovered
    /// widget.
    pub fn hovered_leave(&mut self, widget: Option<NodeId>, top_widget: Option<NodeId>) {
        let Some(hovered) = self.hovered_widget else {
            return;
        };
        if widget == Some(hovered) {
            return;
        }
        let mut leaving = Some(hovered);
        while let Some(w) = leaving {
            if Some(w) == widget {
                break;
            }
            self.deliver(w, &Event::Leave);
            if Some(w) == top_widget {
                break;
            }
            leaving = self.tree.parent_widget(w);
        }
        self.hovered_widget = widget;
    }

    /// Clear core state referring into a subtree about to be hidden:
    /// hover, pressed, focus, then any menus, in that order, before the
    /// subtree's display actually changes.
    pub fn on_hide_widget(&mut self, widget: NodeId) {
        if self
            .hovered_widget
            .is_some_and(|h| self.tree.is_descendant(h, widget))
        {
            self.hovered_leave(self.tree.parent_widget(widget), None);
        }
        if self
            .pressed_widget
            .is_some_and(|p| self.tree.is_descendant(p, widget))
        {
            self.pressed_widget = None;
        }
        if let Some(win) = self.tree.window_of(widget) {
            let focused = self.tree.window_state(win).focused;
            if let Some(f) = focused.filter(|f| self.tree.is_descendant(*f, widget)) {
                let to = (widget != win).then_some(win);
                self.deliver(
                    f,
                    &Event::FocusLost {
                        reason: FocusReason::Hidden,
                        to,
                    },
                );
                self.tree.remove_class(f, "focused");
                // Hiding a whole window keeps its focus for re-show.
                if widget != win {
                    self.tree.window_state_mut(win).focused = None;
                }
            }
        }
        while self
            .menu_stack
            .last()
            .is_some_and(|m| self.tree.is_descendant(*m, widget))
        {
            // Pop before hiding: set_visible re-enters on_hide_widget.
            let menu = self.menu_stack.pop().expect("checked non-empty");
            self.set_visible(menu, false);
            if let Some(p) = self.tree.parent_widget(menu) {
                self.tree.remove_class(p, "pressed");
            }
        }
    }

    /// Show or hide a widget, maintaining the window's abs-pos registry and
    /// delivering visibility events. Core state pointing into the subtree
    /// is cleared before the display mode actually changes, so nothing
    /// dispatches into a hidden tree afterward.
    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        let displayed = self.tree.is_displayed(id);
        if displayed != visible {
            self.deliver(id, if visible { &Event::Visible } else { &Event::Invisible });
        }
        if displayed && !visible {
            self.on_hide_widget(id);
        }
        let is_abs = matches!(
            self.tree.widget(id).map(|w| &w.kind),
            Some(WidgetKind::AbsPos(_))
        );
        if is_abs {
            self.tree.set_display(
                id,
                if visible {
                    DisplayMode::Absolute
                } else {
                    DisplayMode::None
                },
            );
            if let Some(win) = self.tree.window_of(id) {
                let registered = self
                    .tree
                    .window_state(win)
                    .abs_pos_nodes
                    .iter()
                    .position(|n| *n == id);
                match (visible, registered) {
                    (false, Some(at)) => {
                        self.tree.window_state_mut(win).abs_pos_nodes.remove(at);
                        let mut r = self.tree.rendered_bounds(id);
                        if let Some(shadow) =
                            self.tree.widget(id).and_then(|w| w.abs_pos()).and_then(|a| a.shadow)
                        {
                            r = r.union(shadow.bounds(self.tree.rendered_bounds(id)));
                        }
                        let origin = self.tree.window_state(win).win_bounds.origin();
                        self.closed_bounds = self.closed_bounds.union(r.translate(origin.x, origin.y));
                    }
                    (true, None) => {
                        self.tree.window_state_mut(win).abs_pos_nodes.push(id);
                    }
                    _ => {}
                }
            }
        } else {
            self.tree.set_display(
                id,
                if visible {
                    DisplayMode::Block
                } else {
                    DisplayMode::None
                },
            );
        }
    }

    /// Enable or disable a widget subtree. Disabling clears any core state
    /// pointing into it, since a disabled widget receives no events.
    pub fn set_enabled(&mut self, id: NodeId, enabled: bool) {
        let already = self.tree.widget(id).is_none_or(|w| w.enabled);
        if enabled == already {
            return;
        }
        if enabled {
            self.tree.remove_class(id, "disabled");
        } else {
            self.tree.add_class(id, "disabled");
        }
        self.on_hide_widget(id);
        self.deliver(id, if enabled { &Event::Enabled } else { &Event::Disabled });
        self.tree.ensure_widget(id).enabled = enabled;
    }

    /// Tear down a widget subtree: clear dangling core references, remove
    /// its timers, unlink and drop the nodes. Handlers that trigger this
    /// must accept the current event immediately.
    pub fn delete_widget(&mut self, id: NodeId) {
        self.on_hide_widget(id);
        self.remove_timers_for(id, true);
        self.tree.remove_subtree(id);
    }

    // ---- timers ---------------------------------------------------------

    /// Schedule a timer on `widget`. Without a callback the tick goes to the
    /// widget's handler chain (one such default timer per widget).
    pub fn set_timer(
        &mut self,
        period_ms: i64,
        widget: NodeId,
        callback: Option<TimerCallback>,
    ) -> TimerId {
        self.timers.set_timer(period_ms, widget, callback)
    }

    /// Replace `old` (if set) with a fresh timer.
    pub fn reset_timer(
        &mut self,
        period_ms: i64,
        widget: NodeId,
        old: Option<TimerId>,
        callback: Option<TimerCallback>,
    ) -> TimerId {
        if let Some(old) = old {
            self.timers.remove(old);
        }
        self.set_timer(period_ms, widget, callback)
    }

    /// Remove a timer; safe to call after it has already fired.
    pub fn remove_timer(&mut self, id: TimerId) {
        self.timers.remove(id);
        self.timers.signal_deadline();
    }

    /// Remove the widget's default timer.
    pub fn remove_widget_timer(&mut self, widget: NodeId) {
        self.timers.remove_default_for(widget);
        self.timers.signal_deadline();
    }

    /// Remove all timers owned by `widget`, optionally including its whole
    /// subtree.
    pub fn remove_timers_for(&mut self, widget: NodeId, children: bool) {
        if children {
            // Collect first: the predicate must not borrow the tree while
            // timers mutate.
            let tree = &self.tree;
            self.timers.remove_where(|w| tree.is_descendant(w, widget));
        } else {
            self.timers.remove_where(|w| w == widget);
        }
        self.timers.signal_deadline();
    }

    /// Fire due timers on the UI thread. Bookkeeping (re-arming, one-shot
    /// removal, re-sorting) all happens here, never on the waker thread.
    pub fn process_timers(&mut self) -> bool {
        let now = self.timers.now_ms();
        while let Some(mut entry) = self.timers.pop_due(now) {
            self.timers.begin_fire(entry.id, entry.widget);
            let period = match entry.callback.as_mut() {
                Some(cb) => cb(self),
                None => {
                    if self.deliver(entry.widget, &Event::TimerTick) {
                        entry.period_ms
                    } else {
                        0
                    }
                }
            };
            let cancelled = self.timers.end_fire();
            if period > 0 && !cancelled && self.tree.contains(entry.widget) {
                entry.period_ms = period;
                entry.next_tick += period as u64;
                self.timers.insert_sorted(entry);
            }
        }
        self.timers.signal_deadline();
        true
    }

    // ---- windows --------------------------------------------------------

    pub fn set_win_bounds(&mut self, win: NodeId, r: Rect) {
        let old = self.tree.window_state(win).win_bounds;
        if r != old && old.width() > 0.0 && old.height() > 0.0 {
            self.closed_bounds = self.closed_bounds.union(old);
        }
        if r.to_size() != old.to_size() {
            if r.width() > 0.0 {
                self.tree.set_attr(win, "width", &format!("{}", r.width()));
            }
            if r.height() > 0.0 {
                self.tree.set_attr(win, "height", &format!("{}", r.height()));
            }
            self.tree.invalidate_bounds(win);
        }
        self.tree.window_state_mut(win).win_bounds = r;
    }

    pub fn win_bounds(&self, win: NodeId) -> Rect {
        self.tree.window_state(win).win_bounds
    }

    /// Register and show a window. The first window is the screen root;
    /// further windows must be modal children stacked on the current top.
    pub fn show_window(&mut self, win: NodeId, parent: Option<NodeId>, show_modal: bool) {
        assert!(parent.is_some() || !show_modal, "modal windows must have a parent");
        assert!(parent != Some(win), "parent cannot be the window itself");
        assert!(
            self.windows.is_empty() || (show_modal && parent == self.windows.last().copied()),
            "only modal children may stack on the active window"
        );

        let bbox = self.tree.window_state(win).win_bounds;
        if bbox.right < 0.0 || bbox.bottom < 0.0 {
            // Size without position: center on the parent.
            let center = parent
                .map(|p| self.tree.window_state(p).win_bounds.center())
                .unwrap_or(Point::ZERO);
            let r = Rect::centerwh(center, bbox.width().max(0.0), bbox.height().max(0.0));
            self.set_win_bounds(win, r);
        }

        self.tree.window_state_mut(win).parent_window = parent;
        self.windows.push(win);

        if show_modal {
            let parent = parent.expect("asserted above");
            // Clear pressed/hovered state pointing into the parent.
            self.on_hide_widget(parent);
            self.tree.set_dirty(parent, Dirty::Pixels);
            self.tree.window_state_mut(win).is_modal = true;
            let root = self.root_window(win);
            self.tree.window_state_mut(root).modal_child = Some(win);
        }
        self.set_visible(win, true);
        if let Some(f) = self.tree.window_state(win).focused {
            self.deliver(f, &Event::FocusGained(FocusReason::Window));
            self.tree.add_class(f, "focused");
        }
    }

    pub fn show_modal(&mut self, modal: NodeId, parent: NodeId) {
        self.show_window(modal, Some(parent), true);
    }

    /// Unregister a window, unwinding modal state and subtree timers.
    pub fn close_window(&mut self, win: NodeId) {
        self.close_menus(None, false);
        self.set_visible(win, false);
        if self.tree.window_state(win).is_modal {
            let parent = self.tree.window_state(win).parent_window;
            if let Some(p) = parent {
                self.tree.set_dirty(p, Dirty::Pixels);
            }
            let root = self.root_window(win);
            let next_modal = parent.filter(|p| self.tree.window_state(*p).is_modal);
            self.tree.window_state_mut(root).modal_child = next_modal;
        }
        self.remove_timers_for(win, true);

        let at = self
            .windows
            .iter()
            .position(|w| *w == win)
            .expect("window is not open");
        self.windows.remove(at);
        self.closed_bounds = self
            .closed_bounds
            .union(self.tree.window_state(win).win_bounds);

        if let Some(&top) = self.windows.last() {
            if let Some(f) = self.tree.window_state(top).focused {
                self.deliver(f, &Event::FocusGained(FocusReason::Window));
                self.tree.add_class(f, "focused");
            }
        }
    }

    // ---- menus ----------------------------------------------------------

    /// Close menus down to (not including) `parent_menu`; None closes all.
    /// Closing is always a suffix truncation, so the stack stays one
    /// contiguous chain of nested menus.
    pub fn close_menus(&mut self, parent_menu: Option<NodeId>, close_group: bool) {
        if self.menu_stack.is_empty() {
            return;
        }
        let mut keep = parent_menu;
        if let Some(p) = keep {
            if close_group {
                keep = Some(self.pressed_group_container(p));
            }
            // Resolve to the nearest enclosing menu widget.
            while let Some(w) = keep {
                if self.tree.node(w).has_class("menu") {
                    break;
                }
                keep = self.tree.parent_widget(w);
            }
        }
        while self.menu_stack.last().copied() != keep && !self.menu_stack.is_empty() {
            let menu = self.menu_stack.pop().expect("checked non-empty");
            self.set_visible(menu, false);
            if let Some(p) = self.tree.parent_widget(menu) {
                self.tree.remove_class(p, "pressed");
            }
            self.last_closed_menu = Some(menu);
        }

        if let Some(&win) = self.windows.last() {
            let focused = self.tree.window_state(win).focused;
            let back = self.menu_stack.last().copied();
            if let Some(f) = focused {
                if back.is_none_or(|m| self.tree.is_descendant(f, m)) {
                    self.deliver(f, &Event::FocusGained(FocusReason::Menu));
                    self.tree.add_class(f, "focused");
                }
            }
        }
    }

    /// Open a floating menu, pushing it onto the menu stack.
    pub fn show_menu(&mut self, menu: NodeId) {
        if let Some(&win) = self.windows.last() {
            if let Some(f) = self.tree.window_state(win).focused {
                self.deliver(
                    f,
                    &Event::FocusLost {
                        reason: FocusReason::Menu,
                        to: None,
                    },
                );
                self.tree.remove_class(f, "focused");
            }
        }
        self.set_visible(menu, true);
        self.menu_stack.push(menu);
    }

    /// Open a context menu at `p` (window content coordinates).
    /// `make_pressed` should be false when opening on a release, since the
    /// pressed widget would be cleared immediately anyway.
    pub fn show_context_menu(
        &mut self,
        menu: NodeId,
        p: Point,
        parent_menu: Option<NodeId>,
        make_pressed: bool,
    ) {
        let parent_bounds = self
            .tree
            .node(menu)
            .parent()
            .map(|pa| self.tree.bounds(pa))
            .unwrap_or_default();
        self.tree
            .set_attr(menu, "left", &format!("{}", p.x - parent_bounds.left));
        self.tree
            .set_attr(menu, "top", &format!("{}", p.y - parent_bounds.top));
        if !self.tree.node(menu).is_visible() {
            self.close_menus(parent_menu, false);
            self.set_visible(menu, true);
            self.menu_stack.push(menu);
            if make_pressed {
                if let Some(pressed) = self.pressed_widget {
                    self.deliver(
                        pressed,
                        &Event::OutsidePressed {
                            target: Some(pressed),
                        },
                    );
                }
                self.set_pressed(menu);
            }
        }
    }

    // ---- text input -----------------------------------------------------

    /// Route IME/text input to `widget` from the next frame on.
    pub fn start_text_input(&mut self, widget: NodeId) {
        self.next_input_widget = Some(widget);
    }

    pub fn stop_text_input(&mut self) {
        self.next_input_widget = None;
    }

    pub fn curr_input_widget(&self) -> Option<NodeId> {
        self.curr_input_widget
    }

    pub fn next_input_widget(&self) -> Option<NodeId> {
        self.next_input_widget
    }

    pub fn set_ime_text(&mut self, text: &str, sel_start: usize, sel_end: usize) {
        self.platform.set_ime_text(text, sel_start, sel_end);
    }

    // ---- focus traversal ------------------------------------------------

    fn focusable_widgets(&self, parent: NodeId, out: &mut Vec<NodeId>) {
        for &child in self.tree.node(parent).children() {
            if self.tree.widget(child).is_some_and(|w| w.focusable) {
                out.push(child);
            } else if self.tree.node(child).kind.is_container() {
                self.focusable_widgets(child, out);
            }
        }
    }

    /// Next (or previous) focusable widget after `curr` under `parent`,
    /// wrapping around.
    pub fn find_next_focusable(
        &self,
        parent: NodeId,
        curr: NodeId,
        reverse: bool,
    ) -> Option<NodeId> {
        let mut focusables = Vec::new();
        self.focusable_widgets(parent, &mut focusables);
        let n = focusables.len();
        if n < 2 {
            return None;
        }
        let at = focusables.iter().position(|f| *f == curr)?;
        let step = if reverse { n - 1 } else { 1 };
        Some(focusables[(at + step) % n])
    }

    // ---- hit testing ----------------------------------------------------

    /// The widget under `p` (window content coordinates): absolutely
    /// positioned floats first (topmost last-shown wins), then the window's
    /// flow content.
    pub fn widget_at(&self, win: NodeId, p: Point) -> Option<NodeId> {
        let ws = self.tree.window_state(win);
        let mut node = None;
        for &abs in ws.abs_pos_nodes.iter().rev() {
            if self.tree.node(abs).is_visible() {
                node = self.tree.node_at(abs, p);
                if node.is_some() {
                    break;
                }
            }
        }
        if node.is_none() && ws.win_bounds.to_size().contains(p) {
            node = self.tree.node_at(win, p);
        }
        node.and_then(|n| self.tree.nearest_widget(n))
    }

    // ---- event dispatch core -------------------------------------------

    /// Run event filters, then normal dispatch. Filters collect from the
    /// target up to its nearest absolutely positioned ancestor and run
    /// outermost-first; the first acceptance short-circuits everything.
    pub fn send_event_filtered(
        &mut self,
        win: NodeId,
        widget: Option<NodeId>,
        event: &Event,
    ) -> bool {
        let mut filters = Vec::new();
        let mut cur = widget.or(Some(win));
        while let Some(w) = cur {
            if let Some(state) = self.tree.widget(w) {
                if let Some(f) = &state.filter {
                    filters.push((w, f.clone()));
                }
                if state.is_abs_pos() {
                    break;
                }
            }
            cur = self.tree.parent_widget(w);
        }
        for (w, filter) in filters.into_iter().rev() {
            if filter(&mut EventCx { gui: self, widget: w }, widget, event) {
                return true;
            }
        }
        self.send_event(win, widget, event)
    }

    /// The dispatch state machine. Returns whether any handler claimed the
    /// event; false is not an error.
    pub fn send_event(&mut self, win: NodeId, widget: Option<NodeId>, event: &Event) -> bool {
        // A release or drag with no accepted press is swallowed: reacting
        // to it would suggest the hovered widget will act on release.
        if self.pressed_widget.is_none() {
            match event {
                Event::PointerUp(_) => return true,
                Event::PointerMove(p) if p.buttons != Buttons::NONE => return true,
                _ => {}
            }
        }

        // The active modal: the most nested menu's press group, else the
        // window's modal child (which may be `win` itself).
        let modal_widget = match self.menu_stack.last() {
            Some(&m) => Some(self.pressed_group_container(m)),
            None => self.modal_child_of(win),
        };
        let mut widget = widget.or(modal_widget).or(Some(win));

        // Hover reconciliation on motion and press, bounded above by the
        // pressed widget or the modal.
        if matches!(event, Event::PointerMove(_) | Event::PointerDown(_)) {
            let top_widget = self.pressed_widget.or(modal_widget);
            if widget != self.hovered_widget {
                let parent = match (widget, self.hovered_widget) {
                    (Some(a), Some(b)) => self
                        .tree
                        .common_ancestor(a, b)
                        .and_then(|c| self.tree.nearest_widget(c)),
                    _ => None,
                };
                self.hovered_leave(parent, top_widget);
                let inside_top =
                    |w: NodeId| top_widget.is_none_or(|t| self.tree.is_descendant(w, t));
                match widget {
                    Some(w) if inside_top(w) => {
                        // Do not enter children of the pressed widget unless
                        // it is a pressed-group container.
                        let pressed_blocks = self.pressed_widget.filter(|p| {
                            !self.tree.widget(*p).is_some_and(|s| s.pressed_group)
                        });
                        let mut entering = pressed_blocks.or(Some(w));
                        while let Some(e) = entering {
                            if Some(e) == parent {
                                break;
                            }
                            self.deliver(e, &Event::Enter);
                            if top_widget == Some(e) {
                                break;
                            }
                            entering = self.tree.parent_widget(e);
                        }
                        self.hovered_widget = widget;
                    }
                    _ => self.hovered_widget = None,
                }
            }
        }

        if let Some(pressed) = self.pressed_widget {
            if let Some(mut w) = widget.filter(|w| self.tree.is_descendant(*w, pressed)) {
                // The press belongs to some ancestor of the original press
                // target: bubble no further than the pressed widget.
                let mut accepted = false;
                loop {
                    accepted = self.deliver(w, event);
                    if accepted || w == pressed {
                        break;
                    }
                    match self.tree.parent_widget(w) {
                        Some(p) => w = p,
                        None => break,
                    }
                }
                if matches!(event, Event::PointerUp(_)) {
                    self.pressed_widget = None;
                }
                return accepted;
            } else if matches!(event, Event::PointerUp(_)) {
                self.deliver(pressed, &Event::OutsidePressed { target: widget });
                self.pressed_widget = None;
                return true;
            } else {
                return self.deliver(pressed, event);
            }
        }

        // Strict modal containment for events outside the modal subtree.
        if let Some(modal) = modal_widget {
            let outside = widget.is_none_or(|w| !self.tree.is_descendant(w, modal));
            if outside {
                let Event::PointerDown(press) = event else {
                    return true;
                };
                // The modal may swallow the press or close itself.
                if self.deliver(
                    modal,
                    &Event::OutsideModal {
                        target: widget,
                        press: *press,
                    },
                ) {
                    return true;
                }
            }
        }

        while let Some(w) = widget {
            if self.deliver(w, event) {
                return true;
            }
            widget = self.tree.parent_widget(w);
        }
        false
    }

    // ---- input normalization -------------------------------------------

    /// Entry point for canonical platform events.
    pub fn dispatch(&mut self, event: &Event) -> bool {
        match event {
            Event::PointerDown(_)
            | Event::PointerMove(_)
            | Event::PointerUp(_)
            | Event::PointerCancel(_) => self.handle_pointer(event),
            Event::Wheel { pos, .. } => {
                let Some(&first) = self.windows.first() else {
                    return false;
                };
                let win = self.modal_or_self(first);
                let origin = self.tree.window_state(win).win_bounds.origin();
                let p = *pos - origin;
                let adjusted = match event {
                    Event::Wheel { dx, dy, mods, t, .. } => Event::Wheel {
                        pos: p,
                        dx: *dx,
                        dy: *dy,
                        mods: *mods,
                        t: *t,
                    },
                    _ => unreachable!(),
                };
                let target = self.widget_at(win, p);
                self.send_event_filtered(win, target, &adjusted)
            }
            Event::KeyDown(_)
            | Event::KeyUp(_)
            | Event::TextInput { .. }
            | Event::ImeUpdate { .. }
            | Event::KeyboardHidden => {
                let Some(&first) = self.windows.first() else {
                    return false;
                };
                let win = self.modal_or_self(first);
                let focused = self.tree.window_state(win).focused;
                let to_focused = match self.menu_stack.last() {
                    Some(&m) => focused.is_some_and(|f| self.tree.is_descendant(f, m)),
                    None => true,
                };
                // With focus outside an open menu, route to the menu (the
                // modal widget) instead.
                let target = if to_focused { focused } else { None };
                self.send_event_filtered(win, target, event)
            }
            Event::TimerTick => self.process_timers(),
            Event::Window(we) => self.handle_window_event(*we),
            _ => {
                debug!(?event, "unrouted event");
                false
            }
        }
    }

    fn gesture_phase(event: &Event) -> Option<Phase> {
        match event {
            Event::PointerDown(_) => Some(Phase::Down),
            Event::PointerMove(_) => Some(Phase::Move),
            Event::PointerUp(_) => Some(Phase::Up),
            _ => None,
        }
    }

    fn handle_pointer(&mut self, event: &Event) -> bool {
        let Some(&first) = self.windows.first() else {
            return false;
        };
        let win = self.modal_or_self(first);
        let origin = self.tree.window_state(win).win_bounds.origin();
        let raw = event.pointer().expect("pointer event");
        let mut p = *raw;
        p.pos = raw.pos - origin;
        let adjusted = match event {
            Event::PointerDown(_) => Event::PointerDown(p),
            Event::PointerMove(_) => Event::PointerMove(p),
            Event::PointerUp(_) => Event::PointerUp(p),
            Event::PointerCancel(_) => Event::PointerCancel(p),
            _ => unreachable!(),
        };

        if let Some(phase) = Self::gesture_phase(&adjusted) {
            self.gestures.update(phase, p.pos, p.t);
        }
        if matches!(adjusted, Event::PointerDown(_)) {
            self.last_closed_menu = None;
        }

        // Mouse input: gesture state only, no touch tracking or long press.
        if p.id == PointerId::MOUSE {
            let target = self.widget_at(win, p.pos);
            return self.send_event_filtered(win, target, &adjusted);
        }

        let is_pen = p.id == PointerId::PEN;
        let cancel = matches!(adjusted, Event::PointerCancel(_));

        if !is_pen || cancel {
            let at = self.gestures.touch_points.iter().position(|f| f.id == p.id);
            match &adjusted {
                Event::PointerDown(_) => {
                    if let Some(at) = at {
                        warn!("finger down for a finger already down");
                        self.gestures.touch_points.remove(at);
                    }
                    self.gestures.touch_points.push(TouchPoint {
                        id: p.id,
                        pos: p.pos,
                        pressure: p.pressure,
                    });
                }
                Event::PointerMove(_) => match at {
                    // Motion for an unknown finger is ignored.
                    None => return true,
                    Some(at) => {
                        self.gestures.touch_points[at] = TouchPoint {
                            id: p.id,
                            pos: p.pos,
                            pressure: p.pressure,
                        };
                    }
                },
                Event::PointerUp(_) => {
                    if at.is_none() {
                        warn!("finger up for an unknown finger");
                    } else if !self.gestures.multi_touch_active {
                        // Keep the point until after any multi-touch event.
                        let at = at.expect("checked above");
                        self.gestures.touch_points.remove(at);
                    }
                }
                _ => {}
            }

            let was_multi = self.gestures.multi_touch_active || self.gestures.pen_down;
            self.gestures.multi_touch_active =
                was_multi || self.gestures.touch_points.len() > 1 || cancel;

            if self.gestures.multi_touch_active {
                let is_up = matches!(adjusted, Event::PointerUp(_));
                return self.handle_multi_touch(win, &p, cancel, is_up, was_multi, is_pen);
            }
        }

        // Cancel a pending long press on travel or release.
        if self.long_press_timer.is_some()
            && (self.gestures.total_dist >= LONG_PRESS_CANCEL_DIST
                || matches!(adjusted, Event::PointerUp(_)))
        {
            let t = self.long_press_timer.take().expect("checked above");
            self.remove_timer(t);
        }

        let target = self.widget_at(win, p.pos);
        if matches!(adjusted, Event::PointerDown(_)) {
            self.arm_long_press(win, target, p.pos);
        }
        if is_pen {
            match adjusted {
                Event::PointerDown(_) => self.gestures.pen_down = true,
                Event::PointerUp(_) => self.gestures.pen_down = false,
                _ => {}
            }
        }
        self.send_event_filtered(win, target, &adjusted)
    }

    fn handle_multi_touch(
        &mut self,
        win: NodeId,
        p: &PointerEvent,
        cancel: bool,
        is_up: bool,
        was_multi: bool,
        is_pen: bool,
    ) -> bool {
        self.gestures.clicks = 0;
        if let Some(t) = self.long_press_timer.take() {
            self.remove_timer(t);
        }
        let anchor = self
            .gestures
            .touch_points
            .first()
            .map(|f| f.pos)
            .unwrap_or(p.pos);
        let mut target = self.widget_at(win, anchor);
        let mt = Event::MultiTouch {
            points: self.gestures.touch_points.clone(),
            cause: *p,
        };

        let drop_point = |g: &mut GestureState, id: PointerId| {
            if let Some(at) = g.touch_points.iter().position(|f| f.id == id) {
                g.touch_points.remove(at);
            }
        };

        // Clear the pressed widget if it does not accept the first
        // multi-touch event.
        if !was_multi && self.pressed_widget.is_some() {
            if self.send_event_filtered(win, target, &mt) {
                if cancel {
                    drop_point(&mut self.gestures, p.id);
                }
                return true;
            }
            let pressed = self.pressed_widget.expect("checked above");
            target = self.tree.parent_widget(pressed);
            self.deliver(pressed, &Event::OutsidePressed { target });
            self.pressed_widget = None;
        }

        let res = self.send_event_filtered(win, target, &mt);
        // The released point stays in the table until after the bundle so
        // receivers see the full final contact set.
        if cancel || is_up {
            drop_point(&mut self.gestures, p.id);
        }
        if self.gestures.touch_points.is_empty() {
            self.gestures.multi_touch_active = false;
            if !self.gestures.pen_down {
                self.pressed_widget = None;
            }
        }
        if is_pen {
            self.gestures.pen_down = false;
        }
        res
    }

    /// Arm the long-press timer for a fresh press. The timer is owned by
    /// the window root, so closing the window tears it down.
    fn arm_long_press(&mut self, win: NodeId, target: Option<NodeId>, pos: Point) {
        let delay = self.long_press_delay_ms;
        let old = self.long_press_timer.take();
        let timer = self.reset_timer(
            delay,
            win,
            old,
            Some(Box::new(move |gui: &mut Gui| {
                gui.long_press_timer = None;
                // If the widget under the point changed since arming, flag
                // the alt identity so receivers can tell the difference.
                let now_target = gui.widget_at(win, pos);
                let alt = now_target != target;
                gui.send_event_filtered(win, target, &Event::LongPress { pos, alt });
                0
            })),
        );
        self.long_press_timer = Some(timer);
    }

    fn handle_window_event(&mut self, we: WindowEvent) -> bool {
        let Some(&first) = self.windows.first() else {
            return true;
        };
        let win = self.modal_or_self(first);
        let focused = self.tree.window_state(win).focused;
        match we {
            WindowEvent::Resized(new_bounds) => {
                let current = self.tree.window_state(first).win_bounds;
                if current.width() > 0.0 && current.height() > 0.0 {
                    self.set_win_bounds(first, new_bounds);
                }
                let windows = self.windows.clone();
                for w in windows {
                    self.deliver(w, &Event::ScreenResized(new_bounds));
                }
            }
            WindowEvent::Expose => {
                let b = self.tree.window_state(first).win_bounds;
                self.closed_bounds = self.closed_bounds.union(b);
            }
            WindowEvent::FocusGained => {
                if let Some(f) = focused {
                    self.deliver(f, &Event::FocusGained(FocusReason::Window));
                    self.tree.add_class(f, "focused");
                }
            }
            WindowEvent::FocusLost => {
                self.close_menus(None, false);
                // In case the platform dropped release events on the floor.
                self.gestures.touch_points.clear();
                if let Some(f) = focused {
                    self.deliver(
                        f,
                        &Event::FocusLost {
                            reason: FocusReason::Window,
                            to: None,
                        },
                    );
                    self.tree.remove_class(f, "focused");
                }
            }
            WindowEvent::Leave => {
                if self.hovered_widget.is_some() {
                    let modal = match self.menu_stack.first() {
                        Some(&m) => Some(self.pressed_group_container(m)),
                        None => self.modal_child_of(win),
                    };
                    self.hovered_leave(None, modal);
                }
            }
            WindowEvent::CloseRequested => {
                let modal = self.modal_child_of(win);
                if modal.is_none_or(|m| m == win) && self.windows.len() > 1 {
                    self.close_window(win);
                    return true;
                }
            }
        }
        if self.tree.contains(win) {
            self.deliver(win, &Event::Window(we));
        }
        true
    }

    // ---- layout & paint -------------------------------------------------

    /// Lay out a window's content against its bounds, then its floating
    /// widgets.
    pub fn layout_window(&mut self, win: NodeId, bbox: Rect) -> Result<()> {
        layout::layout_window(self, win, bbox)
    }

    /// The shallowest node whose re-layout covers all dirty state under
    /// `root`, or None when layout is not needed.
    pub fn find_layout_dirty_root(&self, root: NodeId) -> Option<NodeId> {
        layout::find_layout_dirty_root(&self.tree, root)
    }

    /// Move a widget's bounds to `dest`, deriving its layout transform (or
    /// rewriting rect geometry) from the change.
    pub fn set_layout_bounds(&mut self, id: NodeId, dest: Rect) {
        layout::set_layout_bounds(self, id, dest);
    }

    /// Sub-layout of an isolated container against an explicit box.
    pub fn layout_widget(&mut self, contents: NodeId, bbox: Rect) -> Result<()> {
        layout::layout_widget(self, contents, bbox)
    }

    /// Incremental layout pass plus paint. Returns the repainted rect in
    /// device units (invalid when nothing was dirty).
    pub fn layout_and_draw(&mut self, painter: &mut dyn Painter) -> Result<Rect> {
        let mut dirty = std::mem::take(&mut self.closed_bounds);
        let Some(&screen_win) = self.windows.first() else {
            return Ok(Rect::default());
        };
        let screen_rect = self.tree.window_state(screen_win).win_bounds;

        let mut layout_idx = self.windows.len();
        while layout_idx > 0 {
            layout_idx -= 1;
            let win = self.windows[layout_idx];
            let winbounds = self.tree.window_state(win).win_bounds;

            match layout::find_layout_dirty_root(&self.tree, win) {
                Some(root) if root == win => self.layout_window(win, winbounds)?,
                Some(root) => {
                    // Newly shown widgets have never been laid out; size the
                    // sub-layout with the parent's last rendered box.
                    let bbox = self
                        .tree
                        .node(root)
                        .parent()
                        .map(|p| self.tree.rendered_bounds(p))
                        .unwrap_or(winbounds);
                    self.layout_widget(root, bbox)?;
                }
                None => {}
            }

            if winbounds.width() == 0.0 || winbounds.height() == 0.0 {
                let content = self.tree.bounds(win);
                let r = Rect::centerwh(winbounds.center(), content.width(), content.height());
                self.set_win_bounds(win, r);
            }

            let mut windirty = self.tree.dirty_rect(win);
            let origin = self.tree.window_state(win).win_bounds.origin();

            let abs_nodes = self.tree.window_state(win).abs_pos_nodes.clone();
            for abs in abs_nodes {
                let parent_moved = self.tree.node(abs).parent().is_some_and(|pa| {
                    self.tree.bounds(pa) != self.tree.rendered_bounds(pa)
                });
                let dirty_root = if parent_moved {
                    Some(abs)
                } else {
                    layout::find_layout_dirty_root(&self.tree, abs)
                };
                match dirty_root {
                    Some(root) if root == abs => layout::layout_abs_pos_widget(self, abs)?,
                    Some(root) => {
                        let bbox = self
                            .tree
                            .node(root)
                            .parent()
                            .map(|p| self.tree.rendered_bounds(p))
                            .unwrap_or_default();
                        self.layout_widget(root, bbox)?;
                    }
                    None => {}
                }

                // Keep floats on screen (not necessarily inside the parent).
                let b = self.tree.bounds(abs).translate(origin.x, origin.y);
                let dx = if b.left < 0.0 {
                    -b.left
                } else if b.right > screen_rect.width() {
                    -(b.left.min(b.right - screen_rect.width()))
                } else {
                    0.0
                };
                let dy = if b.top < 0.0 {
                    -b.top
                } else if b.bottom > screen_rect.height() {
                    -(b.top.min(b.bottom - screen_rect.height()))
                } else {
                    0.0
                };
                if dx != 0.0 || dy != 0.0 {
                    let tf = Transform2D::translating(dx, dy)
                        * self
                            .tree
                            .widget(abs)
                            .map(|w| w.layout_transform)
                            .unwrap_or_default();
                    self.tree.set_layout_transform(abs, tf);
                }

                windirty = windirty.union(self.tree.dirty_rect(abs));
                if self.tree.node(abs).dirty() > Dirty::Child {
                    if let Some(shadow) =
                        self.tree.widget(abs).and_then(|w| w.abs_pos()).and_then(|a| a.shadow)
                    {
                        windirty = windirty.union(shadow.bounds(self.tree.bounds(abs)));
                        windirty = windirty.union(shadow.bounds(self.tree.rendered_bounds(abs)));
                    }
                }
            }

            dirty = dirty.union(windirty.translate(origin.x, origin.y));
            if self
                .tree
                .window_state(win)
                .win_bounds
                .contains_rect(screen_rect)
            {
                break;
            }
        }

        self.update_text_input_state();

        if !dirty.is_valid() {
            return Ok(Rect::default());
        }

        // Find the bottommost window covering the dirty rect; windows below
        // it need no repaint.
        let mut cover = self.windows.len() - 1;
        while cover > layout_idx {
            let win = self.windows[cover];
            if self.tree.window_state(win).win_bounds.contains_rect(dirty) {
                break;
            }
            let covered = self
                .tree
                .window_state(win)
                .abs_pos_nodes
                .iter()
                .any(|&a| self.tree.bounds(a).contains_rect(dirty));
            if covered {
                break;
            }
            cover -= 1;
        }

        painter.begin_frame();
        painter.scale(self.paint_scale);
        let dirty_px = dirty.pad(1.0).intersect(painter.device_rect());
        painter.set_clip_rect(dirty_px);
        let clip = dirty_px.pad(1.0);

        for ii in cover..self.windows.len() {
            let win = self.windows[ii];
            let origin = self.tree.window_state(win).win_bounds.origin();
            let winclip = clip.translate(-origin.x, -origin.y);

            painter.translate(origin.x, origin.y);
            painter.draw_node(&self.tree, win, winclip);
            let abs_nodes = self.tree.window_state(win).abs_pos_nodes.clone();
            for abs in abs_nodes {
                if let Some(shadow) =
                    self.tree.widget(abs).and_then(|w| w.abs_pos()).and_then(|a| a.shadow)
                {
                    let sb = shadow.bounds(self.tree.bounds(abs));
                    if sb.intersects(winclip) {
                        painter.fill_rect(sb, shadow.color);
                    }
                }
                painter.draw_node(&self.tree, abs, winclip);
            }
            if ii + 1 < self.windows.len() {
                // Dim windows under an open modal.
                let b = self.tree.window_state(win).win_bounds.to_size();
                painter.fill_rect(b, Color::rgba(0, 0, 0, 128));
            }
            painter.translate(-origin.x, -origin.y);
            self.tree.clear_dirty(win);
        }
        painter.end_frame();
        Ok(dirty_px)
    }

    /// Apply a pending text-input target change: push the input rect to the
    /// platform and start/stop native text input.
    fn update_text_input_state(&mut self) {
        if self.next_input_widget == self.curr_input_widget {
            return;
        }
        match self.next_input_widget {
            Some(w) if self.tree.contains(w) => {
                let origin = self
                    .tree
                    .window_of(w)
                    .map(|win| self.tree.window_state(win).win_bounds.origin())
                    .unwrap_or(Point::ZERO);
                let bbox = self.tree.bounds(w).translate(origin.x, origin.y);
                self.platform.set_text_input_rect(bbox);
                if !self.platform.is_text_input_active() {
                    self.platform.start_text_input();
                }
            }
            _ => self.platform.stop_text_input(),
        }
        self.curr_input_widget = self.next_input_widget;
    }
}

impl Drop for Gui {
    fn drop(&mut self) {
        debug_assert!(
            self.windows.is_empty() || std::thread::panicking(),
            "all windows must be closed before dropping the Gui"
        );
    }
}
