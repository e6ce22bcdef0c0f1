//! Press/hover button behavior.

use std::cell::RefCell;
use std::rc::Rc;

use geom::Rect;
use twig_core::gui::{EventCx, Gui};
use twig_core::{Buttons, Event, KeyCode, NodeId, NodeKind};

/// Callback invoked with the GUI so handlers can open menus, close windows,
/// and so on.
pub type ButtonCallback = Rc<dyn Fn(&mut Gui)>;

pub(crate) struct ButtonState {
    pub(crate) menu: Option<NodeId>,
    pub(crate) checked: bool,
    pub(crate) on_pressed: Option<ButtonCallback>,
    pub(crate) on_clicked: Option<ButtonCallback>,
}

/// A clickable widget: hover/pressed styling, optional attached menu,
/// click callback.
#[derive(Clone, Copy)]
pub struct Button {
    pub root: NodeId,
}

impl Button {
    /// Build a button with a text label.
    pub fn new(gui: &mut Gui, title: &str) -> Self {
        let root = gui.tree.new_node(NodeKind::Group);
        gui.tree.add_class(root, "button");
        gui.tree.set_attr(root, "layout", "box");

        let w = (title.chars().count() as f32) * 8.0 + 12.0;
        let bg = gui.tree.new_node(NodeKind::Rect);
        gui.tree.set_shape(bg, Rect::wh(w, 24.0));
        gui.tree.add_child(root, bg);
        let label = gui.tree.new_node(NodeKind::Text);
        gui.tree.set_text(label, title);
        gui.tree.set_shape(label, Rect::ltwh(6.0, 4.0, w - 12.0, 16.0));
        gui.tree.add_child(root, label);

        let state = Rc::new(RefCell::new(ButtonState {
            menu: None,
            checked: false,
            on_pressed: None,
            on_clicked: None,
        }));
        gui.tree.ensure_widget(root).user_data = Some(state.clone());

        gui.add_handler(root, move |cx, event| button_event(cx, &state, event));
        Self { root }
    }

    fn state(&self, gui: &Gui) -> Rc<RefCell<ButtonState>> {
        gui.tree
            .widget(self.root)
            .and_then(|w| w.data::<RefCell<ButtonState>>())
            .expect("button state missing")
    }

    /// Attach a menu opened by pressing the button. The menu is reparented
    /// under the button unless it already has a position elsewhere.
    pub fn set_menu(&self, gui: &mut Gui, menu: NodeId) {
        let state = self.state(gui);
        assert!(state.borrow().menu.is_none(), "replacing a menu is not supported");
        if gui.tree.node(menu).parent().is_none() {
            gui.tree.add_child(self.root, menu);
        }
        state.borrow_mut().menu = Some(menu);
    }

    pub fn menu(&self, gui: &Gui) -> Option<NodeId> {
        self.state(gui).borrow().menu
    }

    pub fn on_clicked(&self, gui: &mut Gui, f: impl Fn(&mut Gui) + 'static) {
        self.state(gui).borrow_mut().on_clicked = Some(Rc::new(f));
    }

    pub fn on_pressed(&self, gui: &mut Gui, f: impl Fn(&mut Gui) + 'static) {
        self.state(gui).borrow_mut().on_pressed = Some(Rc::new(f));
    }

    pub fn is_checked(&self, gui: &Gui) -> bool {
        self.state(gui).borrow().checked
    }

    pub fn set_checked(&self, gui: &mut Gui, checked: bool) {
        let state = self.state(gui);
        if state.borrow().checked == checked {
            return;
        }
        state.borrow_mut().checked = checked;
        if checked {
            gui.tree.add_class(self.root, "checked");
        } else {
            gui.tree.remove_class(self.root, "checked");
        }
    }
}

fn menu_visible(gui: &Gui, menu: Option<NodeId>) -> bool {
    menu.is_some_and(|m| gui.tree.node(m).is_visible())
}

fn button_event(cx: &mut EventCx<'_>, state: &Rc<RefCell<ButtonState>>, event: &Event) -> bool {
    let id = cx.widget;
    match event {
        Event::Enter => {
            let class = if cx.gui.pressed_widget.is_some() {
                "pressed"
            } else {
                "hovered"
            };
            cx.gui.tree.add_class(id, class);
        }
        Event::Leave | Event::OutsidePressed { .. } | Event::Disabled => {
            cx.gui.tree.remove_class(id, "hovered");
            if !menu_visible(cx.gui, state.borrow().menu) {
                cx.gui.tree.remove_class(id, "pressed");
            }
        }
        Event::PointerDown(p) if p.buttons.contains(Buttons::PRIMARY) => {
            // Close any sibling menu before opening ours.
            cx.gui.close_menus(Some(id), false);
            let menu = state.borrow().menu;
            match menu {
                Some(menu) => {
                    cx.gui.show_menu(menu);
                    cx.gui.set_pressed(menu);
                }
                None => cx.gui.set_pressed(id),
            }
            // After close_menus, which may clear "pressed".
            cx.gui.tree.remove_class(id, "hovered");
            cx.gui.tree.add_class(id, "pressed");
            let cb = state.borrow().on_pressed.clone();
            if let Some(cb) = cb {
                cb(cx.gui);
            }
        }
        Event::PointerUp(_) => {
            // A release only arrives here if the press was accepted.
            if !menu_visible(cx.gui, state.borrow().menu) {
                cx.gui.tree.remove_class(id, "pressed");
            }
            let cb = state.borrow().on_clicked.clone();
            if let Some(cb) = cb {
                cb(cx.gui);
            }
        }
        Event::KeyDown(k) if k.key == KeyCode::Enter => {
            // Delivered only while focusable and focused.
            let cb = state.borrow().on_clicked.clone();
            if let Some(cb) = cb {
                cb(cx.gui);
            }
        }
        _ => return false,
    }
    true
}

/// Menu-item behavior layered on a button: hovering opens its submenu and
/// closes sibling menus; clicking a leaf item closes the whole menu tree.
/// Runs before the button's own handler.
pub fn setup_menu_item(gui: &mut Gui, btn: &Button) {
    let root = btn.root;
    let btn = *btn;
    gui.add_handler(root, move |cx, event| {
        match event {
            // A press is always preceded by an enter, so the enter does the
            // submenu work.
            Event::Enter => {
                cx.gui.close_menus(Some(cx.widget), false);
                if let Some(menu) = btn.menu(cx.gui) {
                    if !cx.gui.tree.node(menu).is_visible() {
                        cx.gui.show_menu(menu);
                        cx.gui.tree.add_class(cx.widget, "pressed");
                    }
                }
            }
            Event::PointerUp(_) => {
                if btn.menu(cx.gui).is_none() {
                    cx.gui.close_menus(None, false);
                }
            }
            _ => {}
        }
        // Always continue to the button handler.
        false
    });
}

#[cfg(test)]
mod tests {
    use geom::Point;
    use twig_core::PointerEvent;
    use twig_core::PointerId;

    use super::*;

    fn fixture() -> (Gui, NodeId, Button) {
        let mut gui = Gui::headless();
        let win = gui.new_window();
        gui.tree.set_attr(win, "layout", "box");
        let btn = Button::new(&mut gui, "ok");
        gui.tree.add_child(win, btn.root);
        gui.set_win_bounds(win, Rect::wh(200.0, 100.0));
        gui.show_window(win, None, false);
        (gui, win, btn)
    }

    fn press(gui: &mut Gui, pos: Point, t: u64) {
        let p = PointerEvent::new(PointerId::MOUSE, Buttons::PRIMARY, pos, t);
        gui.dispatch(&Event::PointerDown(p));
    }

    fn release(gui: &mut Gui, pos: Point, t: u64) {
        let p = PointerEvent::new(PointerId::MOUSE, Buttons::PRIMARY, pos, t);
        gui.dispatch(&Event::PointerUp(p));
    }

    #[test]
    fn click_fires_callback_and_tracks_pressed_class() {
        let (mut gui, win, btn) = fixture();
        let clicks = Rc::new(std::cell::Cell::new(0));
        let c = clicks.clone();
        btn.on_clicked(&mut gui, move |_| c.set(c.get() + 1));

        press(&mut gui, Point::new(10.0, 10.0), 1000);
        assert_eq!(gui.pressed_widget, Some(btn.root));
        assert!(gui.tree.node(btn.root).has_class("pressed"));

        release(&mut gui, Point::new(10.0, 10.0), 1050);
        assert_eq!(clicks.get(), 1);
        assert!(!gui.tree.node(btn.root).has_class("pressed"));
        assert_eq!(gui.pressed_widget, None);

        gui.close_window(win);
    }

    #[test]
    fn release_outside_does_not_click() {
        let (mut gui, win, btn) = fixture();
        let clicks = Rc::new(std::cell::Cell::new(0));
        let c = clicks.clone();
        btn.on_clicked(&mut gui, move |_| c.set(c.get() + 1));

        press(&mut gui, Point::new(10.0, 10.0), 1000);
        release(&mut gui, Point::new(150.0, 90.0), 1100);
        assert_eq!(clicks.get(), 0);
        assert!(!gui.tree.node(btn.root).has_class("pressed"));

        gui.close_window(win);
    }

    #[test]
    fn hover_class_follows_pointer() {
        let (mut gui, win, btn) = fixture();
        let hover = PointerEvent::new(
            PointerId::MOUSE,
            Buttons::NONE,
            Point::new(10.0, 10.0),
            1000,
        );
        gui.dispatch(&Event::PointerMove(hover));
        assert!(gui.tree.node(btn.root).has_class("hovered"));

        let away = PointerEvent::new(
            PointerId::MOUSE,
            Buttons::NONE,
            Point::new(150.0, 90.0),
            1010,
        );
        gui.dispatch(&Event::PointerMove(away));
        assert!(!gui.tree.node(btn.root).has_class("hovered"));

        gui.close_window(win);
    }
}
