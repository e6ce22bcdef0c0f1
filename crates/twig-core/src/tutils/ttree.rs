/*! A standard tree of instrumented widgets for dispatch testing.

The window is 100x100 with two container halves, each holding two leaf
rects:

```text
win (doc, 100x100)
├── a (group, left half)
│   ├── a_a (rect, 0,0 .. 50,50)
│   └── a_b (rect, 0,50 .. 50,100)
└── b (group, right half)
    ├── b_a (rect, 50,0 .. 100,50)
    └── b_b (rect, 50,50 .. 100,100)
```

Every widget records the events it sees into a thread-local path as
`name@event->accepted|ignored`; per-widget acceptance is toggled through
[`TestTree::set_accepts`].
*/

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use geom::{Point, Rect};

use crate::dom::{NodeId, NodeKind};
use crate::event::{Buttons, Event, PointerEvent, PointerId};
use crate::gui::Gui;

thread_local! {
    static TSTATE: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Clear the recorded event path.
pub fn reset_state() {
    TSTATE.with(|s| s.borrow_mut().clear());
}

/// The recorded event path so far.
pub fn get_state() -> Vec<String> {
    TSTATE.with(|s| s.borrow().clone())
}

/// Short name for an event in recorded paths.
pub fn event_name(event: &Event) -> &'static str {
    match event {
        Event::PointerDown(_) => "down",
        Event::PointerMove(_) => "move",
        Event::PointerUp(_) => "up",
        Event::PointerCancel(_) => "cancel",
        Event::Wheel { .. } => "wheel",
        Event::KeyDown(_) => "keydown",
        Event::KeyUp(_) => "keyup",
        Event::TextInput { .. } => "text",
        Event::ImeUpdate { .. } => "ime",
        Event::KeyboardHidden => "kbhidden",
        Event::Window(_) => "window",
        Event::Enter => "enter",
        Event::Leave => "leave",
        Event::FocusGained(_) => "focusgained",
        Event::FocusLost { .. } => "focuslost",
        Event::OutsideModal { .. } => "outsidemodal",
        Event::OutsidePressed { .. } => "outsidepressed",
        Event::Enabled => "enabled",
        Event::Disabled => "disabled",
        Event::Visible => "visible",
        Event::Invisible => "invisible",
        Event::LongPress { alt: false, .. } => "longpress",
        Event::LongPress { alt: true, .. } => "longpress-alt",
        Event::MultiTouch { .. } => "multitouch",
        Event::TimerTick => "timer",
        Event::ScreenResized(_) => "resized",
    }
}

/// The instrumented fixture.
pub struct TestTree {
    pub gui: Gui,
    pub win: NodeId,
    pub a: NodeId,
    pub a_a: NodeId,
    pub a_b: NodeId,
    pub b: NodeId,
    pub b_a: NodeId,
    pub b_b: NodeId,
    accepts: Rc<RefCell<HashSet<NodeId>>>,
}

impl TestTree {
    pub fn new() -> Self {
        let mut gui = Gui::headless();
        let win = gui.new_window();

        let group = |gui: &mut Gui, parent: NodeId| {
            let id = gui.tree.new_node(NodeKind::Group);
            gui.tree.add_child(parent, id);
            gui.tree.ensure_widget(id);
            id
        };
        let leaf = |gui: &mut Gui, parent: NodeId, shape: Rect| {
            let id = gui.tree.new_node(NodeKind::Rect);
            gui.tree.set_shape(id, shape);
            gui.tree.add_child(parent, id);
            gui.tree.ensure_widget(id);
            id
        };

        let a = group(&mut gui, win);
        let a_a = leaf(&mut gui, a, Rect::ltrb(0.0, 0.0, 50.0, 50.0));
        let a_b = leaf(&mut gui, a, Rect::ltrb(0.0, 50.0, 50.0, 100.0));
        let b = group(&mut gui, win);
        let b_a = leaf(&mut gui, b, Rect::ltrb(50.0, 0.0, 100.0, 50.0));
        let b_b = leaf(&mut gui, b, Rect::ltrb(50.0, 50.0, 100.0, 100.0));

        let mut tt = Self {
            gui,
            win,
            a,
            a_a,
            a_b,
            b,
            b_a,
            b_b,
            accepts: Rc::default(),
        };
        for (id, name) in [
            (win, "win"),
            (a, "a"),
            (a_a, "a_a"),
            (a_b, "a_b"),
            (b, "b"),
            (b_a, "b_a"),
            (b_b, "b_b"),
        ] {
            tt.add_recorder(id, name);
        }

        tt.gui.set_win_bounds(win, Rect::wh(100.0, 100.0));
        tt.gui.show_window(win, None, false);
        tt.gui.tree.clear_dirty(win);
        reset_state();
        tt
    }

    /// Attach the recording handler to an extra node (e.g. a menu or modal
    /// window built by a test).
    pub fn add_recorder(&mut self, id: NodeId, name: &str) {
        let name = name.to_string();
        let accepts = self.accepts.clone();
        self.gui.add_handler(id, move |cx, event| {
            let accepted = accepts.borrow().contains(&cx.widget);
            TSTATE.with(|s| {
                s.borrow_mut().push(format!(
                    "{}@{}->{}",
                    name,
                    event_name(event),
                    if accepted { "accepted" } else { "ignored" }
                ));
            });
            accepted
        });
    }

    /// Make `id` accept (or ignore) events from now on.
    pub fn set_accepts(&mut self, id: NodeId, accepts: bool) {
        if accepts {
            self.accepts.borrow_mut().insert(id);
        } else {
            self.accepts.borrow_mut().remove(&id);
        }
    }

    fn pointer(&self, pos: Point, buttons: Buttons, t: u64) -> PointerEvent {
        let _ = self;
        PointerEvent::new(PointerId::MOUSE, buttons, pos, t)
    }

    /// Dispatch a primary-button press at `pos`.
    pub fn press(&mut self, pos: Point, t: u64) -> bool {
        let p = self.pointer(pos, Buttons::PRIMARY, t);
        self.gui.dispatch(&Event::PointerDown(p))
    }

    /// Dispatch pointer motion at `pos` (button held).
    pub fn drag(&mut self, pos: Point, t: u64) -> bool {
        let p = self.pointer(pos, Buttons::PRIMARY, t);
        self.gui.dispatch(&Event::PointerMove(p))
    }

    /// Dispatch hover motion at `pos` (no buttons).
    pub fn hover(&mut self, pos: Point, t: u64) -> bool {
        let p = self.pointer(pos, Buttons::NONE, t);
        self.gui.dispatch(&Event::PointerMove(p))
    }

    /// Dispatch a primary-button release at `pos`.
    pub fn release(&mut self, pos: Point, t: u64) -> bool {
        let p = self.pointer(pos, Buttons::PRIMARY, t);
        self.gui.dispatch(&Event::PointerUp(p))
    }
}

impl Default for TestTree {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestTree {
    fn drop(&mut self) {
        for win in self.gui.windows().to_vec().into_iter().rev() {
            self.gui.close_window(win);
        }
    }
}
