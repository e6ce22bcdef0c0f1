//! Floating menu behavior: stack discipline glue, placement, auto-flip.

use twig_core::gui::{EventCx, Gui};
use twig_core::{Event, KeyCode, NodeId, NodeKind, is_long_press_or_right_click};

use crate::button::{Button, setup_menu_item};

/// Where a menu opens relative to its anchoring control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAlign {
    /// Below the anchor, left edges aligned.
    VertRight,
    /// Below the anchor, right edges aligned.
    VertLeft,
    /// Below the anchor; side chosen by available room when shown.
    Vert,
    /// Beside the anchor, opening rightward.
    HorzRight,
    /// Beside the anchor, opening leftward.
    HorzLeft,
    /// Beside the anchor; side chosen by available room when shown.
    Horz,
    /// Positioned explicitly (context menus).
    Floating,
}

impl MenuAlign {
    fn is_vert(&self) -> bool {
        matches!(self, Self::Vert | Self::VertLeft | Self::VertRight)
    }

    fn is_horz(&self) -> bool {
        matches!(self, Self::Horz | Self::HorzLeft | Self::HorzRight)
    }
}

/// A floating menu. Its node carries the `menu` class the core's stack
/// discipline keys on, and acts as the pressed-group container for presses
/// anywhere in its subtree.
#[derive(Clone, Copy)]
pub struct Menu {
    pub root: NodeId,
    pub align: MenuAlign,
}

impl Menu {
    pub fn new(gui: &mut Gui, align: MenuAlign) -> Self {
        let root = gui.tree.new_node(NodeKind::Group);
        gui.tree.add_class(root, "menu");
        gui.tree.set_attr(root, "layout", "flex");
        gui.tree.set_attr(root, "flex-direction", "column");
        gui.make_abs_pos(root);

        match align {
            MenuAlign::VertRight => gui.tree.set_attr(root, "left", "0"),
            MenuAlign::VertLeft => gui.tree.set_attr(root, "right", "0"),
            MenuAlign::HorzRight => gui.tree.set_attr(root, "left", "100%"),
            MenuAlign::HorzLeft => gui.tree.set_attr(root, "right", "100%"),
            MenuAlign::Vert | MenuAlign::Horz | MenuAlign::Floating => {}
        }
        if align.is_vert() {
            gui.tree.set_attr(root, "top", "100%");
        } else if align.is_horz() {
            gui.tree.set_attr(root, "top", "0");
        }

        // The modal boundary must attribute presses anywhere in the menu
        // tree to the menu itself.
        gui.tree.ensure_widget(root).pressed_group = true;

        gui.add_handler(root, move |cx, event| menu_event(cx, align, event));
        gui.set_visible(root, false);
        Self { root, align }
    }

    /// Append a menu item.
    pub fn add_item(&self, gui: &mut Gui, btn: &Button) {
        setup_menu_item(gui, btn);
        gui.tree.add_child(self.root, btn.root);
    }

    /// Append a submenu behind a new item.
    pub fn add_submenu(&self, gui: &mut Gui, title: &str, submenu: &Menu) -> Button {
        let item = Button::new(gui, title);
        item.set_menu(gui, submenu.root);
        self.add_item(gui, &item);
        item
    }
}

/// Placement on show. With no explicit side, open toward the side with more
/// room; a vertical menu that fits neither below nor above the anchor falls
/// back to opening beside it.
fn place_on_show(cx: &mut EventCx<'_>, align: MenuAlign) {
    let id = cx.widget;
    let Some(win) = cx.gui.tree.window_of(id) else {
        return;
    };
    let wrect = cx.gui.win_bounds(win).to_size();
    let Some(parent) = cx.gui.tree.node(id).parent() else {
        return;
    };
    let prect = cx.gui.tree.bounds(parent);

    if matches!(align, MenuAlign::Horz | MenuAlign::Vert) {
        // More room to the right of the anchor: open rightward.
        let (side, value) = if prect.left < wrect.width() - prect.right {
            ("left", if align.is_horz() { "100%" } else { "0" })
        } else {
            ("right", if align.is_horz() { "100%" } else { "0" })
        };
        cx.gui.tree.set_attr(id, side, value);
    }

    if align.is_vert() {
        // The anchor position and menu size may both have changed since the
        // last open; re-test the vertical fit every time.
        let h = cx.gui.tree.bounds(id).height();
        if h > 0.0 {
            if prect.bottom + h <= wrect.height() {
                cx.gui.tree.remove_attr(id, "bottom");
                cx.gui.tree.set_attr(id, "top", "100%");
            } else if prect.top - h >= 0.0 {
                cx.gui.tree.remove_attr(id, "top");
                cx.gui.tree.set_attr(id, "bottom", "100%");
            } else {
                // Neither above nor below fits (e.g. landscape mobile):
                // open beside the anchor instead.
                cx.gui.tree.remove_attr(id, "bottom");
                cx.gui.tree.set_attr(id, "top", "0");
                let (side, other) = if prect.left < wrect.width() - prect.right {
                    ("left", "right")
                } else {
                    ("right", "left")
                };
                cx.gui.tree.remove_attr(id, other);
                cx.gui.tree.set_attr(id, side, "100%");
            }
        }
    }
}

fn menu_event(cx: &mut EventCx<'_>, align: MenuAlign, event: &Event) -> bool {
    match event {
        Event::KeyDown(k) if k.key == KeyCode::Escape => {
            cx.gui.close_menus(None, false);
            true
        }
        Event::Visible => {
            place_on_show(cx, align);
            false
        }
        Event::OutsidePressed { target } => {
            // Close unless released over the anchoring control (which
            // includes the opening button).
            let id = cx.widget;
            let over_parent = target.is_some_and(|t| {
                cx.gui
                    .tree
                    .parent_widget(id)
                    .is_some_and(|p| cx.gui.tree.is_descendant(t, p))
            });
            if !over_parent {
                cx.gui.close_menus(None, false);
            }
            true
        }
        Event::OutsideModal { target, press } => {
            cx.gui.close_menus(None, false);
            // Never swallow context-menu gestures; swallow plain presses
            // within the anchor so the menu does not immediately reopen.
            if is_long_press_or_right_click(&Event::PointerDown(*press)) {
                return false;
            }
            let id = cx.widget;
            target.is_some_and(|t| {
                cx.gui
                    .tree
                    .parent_widget(id)
                    .is_some_and(|p| cx.gui.tree.is_descendant(t, p))
            })
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use geom::{Point, Rect};
    use twig_core::{Buttons, PointerEvent, PointerId};

    use super::*;

    fn press(gui: &mut Gui, pos: Point, t: u64) {
        let p = PointerEvent::new(PointerId::MOUSE, Buttons::PRIMARY, pos, t);
        gui.dispatch(&Event::PointerDown(p));
    }

    fn release(gui: &mut Gui, pos: Point, t: u64) {
        let p = PointerEvent::new(PointerId::MOUSE, Buttons::PRIMARY, pos, t);
        gui.dispatch(&Event::PointerUp(p));
    }

    /// Window with a full-size background, a top-left button, and a menu on
    /// the button holding one item.
    fn menu_fixture(gui: &mut Gui) -> (twig_core::NodeId, Button, Menu, Button) {
        let win = gui.new_window();
        gui.tree.set_attr(win, "layout", "box");
        let bg = gui.tree.new_node(NodeKind::Rect);
        gui.tree.set_shape(bg, Rect::wh(200.0, 100.0));
        gui.tree.add_child(win, bg);

        let btn = Button::new(gui, "menu");
        gui.tree.set_attr(btn.root, "box-anchor", "left top");
        gui.tree.add_child(win, btn.root);
        let menu = Menu::new(gui, MenuAlign::VertRight);
        btn.set_menu(gui, menu.root);
        let item = Button::new(gui, "item");
        menu.add_item(gui, &item);

        gui.set_win_bounds(win, Rect::wh(200.0, 100.0));
        gui.show_window(win, None, false);
        let mut painter = twig_core::tutils::RecordingPainter::new(200.0, 100.0);
        gui.layout_and_draw(&mut painter).unwrap();
        (win, btn, menu, item)
    }

    fn frame(gui: &mut Gui) {
        let mut painter = twig_core::tutils::RecordingPainter::new(200.0, 100.0);
        gui.layout_and_draw(&mut painter).unwrap();
    }

    #[test]
    fn button_press_opens_menu_and_outside_press_closes_it() {
        let mut gui = Gui::headless();
        let (win, btn, menu, _item) = menu_fixture(&mut gui);

        press(&mut gui, Point::new(10.0, 10.0), 1000);
        assert_eq!(gui.menu_stack(), &[menu.root]);
        assert!(gui.tree.node(menu.root).is_visible());
        assert_eq!(gui.pressed_widget, Some(menu.root));

        // The frame between events places the menu below its button.
        frame(&mut gui);
        let mb = gui.tree.bounds(menu.root);
        let bb = gui.tree.bounds(btn.root);
        assert!(mb.top >= bb.bottom - 0.5, "{mb:?} vs {bb:?}");

        // Releasing over the opening button leaves the menu up.
        release(&mut gui, Point::new(10.0, 10.0), 1050);
        assert_eq!(gui.menu_stack(), &[menu.root]);

        // A press on the window background outside the menu tree closes it.
        press(&mut gui, Point::new(190.0, 90.0), 1500);
        assert!(gui.menu_stack().is_empty());
        assert!(!gui.tree.node(menu.root).is_visible());

        gui.close_window(win);
    }

    #[test]
    fn item_click_closes_the_menu_tree() {
        let mut gui = Gui::headless();
        let (win, _btn, menu, item) = menu_fixture(&mut gui);
        let clicked = std::rc::Rc::new(std::cell::Cell::new(false));
        let c = clicked.clone();
        item.on_clicked(&mut gui, move |_| c.set(true));

        press(&mut gui, Point::new(10.0, 10.0), 1000);
        frame(&mut gui);
        release(&mut gui, Point::new(10.0, 10.0), 1040);
        assert_eq!(gui.menu_stack(), &[menu.root]);

        // Click the item where the frame placed it.
        let target = gui.tree.bounds(item.root).center();
        press(&mut gui, target, 1600);
        release(&mut gui, target, 1650);
        assert!(clicked.get());
        assert!(gui.menu_stack().is_empty());

        gui.close_window(win);
    }
}
