//! Layout adapter behavior: transform derivation, dirty-root discovery,
//! flex solving, and absolutely positioned placement.

use geom::{Point, Rect, Transform2D};
use twig_core::tutils::RecordingPainter;
use twig_core::{Anchor, Gui, NodeId, NodeKind};

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 0.5
}

fn group(gui: &mut Gui, parent: NodeId, attrs: &[(&str, &str)]) -> NodeId {
    let id = gui.tree.new_node(NodeKind::Group);
    gui.tree.add_child(parent, id);
    gui.tree.ensure_widget(id);
    for (k, v) in attrs {
        gui.tree.set_attr(id, k, v);
    }
    id
}

fn rect_leaf(gui: &mut Gui, parent: NodeId, shape: Rect) -> NodeId {
    let id = gui.tree.new_node(NodeKind::Rect);
    gui.tree.set_shape(id, shape);
    gui.tree.add_child(parent, id);
    gui.tree.ensure_widget(id);
    id
}

#[test]
fn stretched_rect_rewrites_geometry_instead_of_scaling() {
    let mut gui = Gui::headless();
    let root = gui.tree.new_node(NodeKind::Group);
    let rect = rect_leaf(&mut gui, root, Rect::wh(20.0, 20.0));
    gui.tree.ensure_widget(rect).layout.anchor = Anchor {
        left: true,
        top: true,
        right: true,
        bottom: true,
    };

    gui.set_layout_bounds(rect, Rect::ltwh(5.0, 5.0, 40.0, 20.0));

    // Width grows in the rect's own geometry; no affine scale is applied.
    let shape = gui.tree.node(rect).shape();
    assert_eq!(shape, Rect::wh(40.0, 20.0));
    let tf = gui.tree.widget(rect).unwrap().layout_transform;
    assert_eq!(tf, Transform2D::translating(5.0, 5.0));
    assert_eq!(tf.xscale(), 1.0);
    assert_eq!(gui.tree.bounds(rect), Rect::ltwh(5.0, 5.0, 40.0, 20.0));
}

#[test]
fn stretched_rect_accounts_for_stroke_width() {
    let mut gui = Gui::headless();
    let root = gui.tree.new_node(NodeKind::Group);
    let rect = rect_leaf(&mut gui, root, Rect::wh(20.0, 20.0));
    gui.tree.set_attr(rect, "stroke-width", "2");
    gui.tree.ensure_widget(rect).layout.anchor = Anchor {
        left: true,
        top: true,
        right: true,
        bottom: true,
    };

    gui.set_layout_bounds(rect, Rect::ltwh(0.0, 0.0, 40.0, 30.0));
    let shape = gui.tree.node(rect).shape();
    assert_eq!(shape, Rect::wh(38.0, 28.0));
}

#[test]
fn non_rect_leaf_scales() {
    let mut gui = Gui::headless();
    let root = gui.tree.new_node(NodeKind::Group);
    let path = gui.tree.new_node(NodeKind::Path);
    gui.tree.set_shape(path, Rect::wh(10.0, 10.0));
    gui.tree.add_child(root, path);
    gui.tree.ensure_widget(path);

    gui.set_layout_bounds(path, Rect::ltwh(0.0, 0.0, 20.0, 10.0));
    let tf = gui.tree.widget(path).unwrap().layout_transform;
    assert_eq!(tf.xscale(), 2.0);
    assert_eq!(tf.yscale(), 1.0);
    assert_eq!(gui.tree.bounds(path), Rect::wh(20.0, 10.0));
}

#[test]
fn unchanged_bounds_are_a_no_op() {
    let mut gui = Gui::headless();
    let root = gui.tree.new_node(NodeKind::Group);
    let rect = rect_leaf(&mut gui, root, Rect::wh(20.0, 20.0));
    gui.tree.clear_dirty(root);

    gui.set_layout_bounds(rect, Rect::wh(20.0, 20.0));
    assert!(gui.tree.widget(rect).unwrap().layout_transform.is_identity());
    assert_eq!(gui.tree.node(root).dirty(), twig_core::Dirty::Clean);
}

#[test]
fn flex_row_places_children_adjacently() {
    let mut gui = Gui::headless();
    let win = gui.new_window();
    gui.tree.set_attr(win, "layout", "box");
    let row = group(
        &mut gui,
        win,
        &[("layout", "flex"), ("flex-direction", "row")],
    );
    let c1 = rect_leaf(&mut gui, row, Rect::wh(20.0, 10.0));
    let c2 = rect_leaf(&mut gui, row, Rect::wh(20.0, 10.0));

    gui.set_win_bounds(win, Rect::wh(100.0, 100.0));
    gui.show_window(win, None, false);
    gui.layout_window(win, Rect::wh(100.0, 100.0)).unwrap();

    let b1 = gui.tree.bounds(c1);
    let b2 = gui.tree.bounds(c2);
    assert!(approx(b1.width(), 20.0), "{b1:?}");
    assert!(approx(b2.width(), 20.0), "{b2:?}");
    assert!(approx(b2.left, b1.right), "{b1:?} {b2:?}");
    assert!(approx(b1.top, b2.top));
    // The unanchored row centers inside the window box.
    let row_bounds = gui.tree.bounds(row);
    assert!(approx(row_bounds.center().x, 50.0), "{row_bounds:?}");

    // A clean second pass finds nothing to lay out.
    gui.tree.clear_dirty(win);
    assert_eq!(gui.find_layout_dirty_root(win), None);

    gui.close_window(win);
}

#[test]
fn fill_anchored_child_stretches_to_the_window() {
    let mut gui = Gui::headless();
    let win = gui.new_window();
    gui.tree.set_attr(win, "layout", "box");
    let fill = rect_leaf(&mut gui, win, Rect::wh(20.0, 20.0));
    gui.tree.set_attr(fill, "box-anchor", "fill");

    gui.set_win_bounds(win, Rect::wh(100.0, 80.0));
    gui.show_window(win, None, false);
    gui.layout_window(win, Rect::wh(100.0, 80.0)).unwrap();

    let b = gui.tree.bounds(fill);
    assert!(approx(b.width(), 100.0), "{b:?}");
    assert!(approx(b.height(), 80.0), "{b:?}");

    gui.close_window(win);
}

#[test]
fn dirty_root_stops_at_isolated_container() {
    let mut gui = Gui::headless();
    let win = gui.new_window();
    gui.tree.set_attr(win, "layout", "box");
    let iso = group(&mut gui, win, &[("layout", "box")]);
    gui.tree.ensure_widget(iso).layout_isolate = true;
    let inner = rect_leaf(&mut gui, iso, Rect::wh(30.0, 30.0));
    let sibling = rect_leaf(&mut gui, win, Rect::wh(10.0, 10.0));

    gui.set_win_bounds(win, Rect::wh(100.0, 100.0));
    gui.show_window(win, None, false);
    gui.layout_window(win, Rect::wh(100.0, 100.0)).unwrap();
    gui.tree.clear_dirty(win);
    assert_eq!(gui.find_layout_dirty_root(win), None);

    // A mutation inside the isolated subtree never escapes it.
    gui.tree.set_shape(inner, Rect::wh(35.0, 30.0));
    assert_eq!(gui.find_layout_dirty_root(win), Some(iso));

    // A second dirty subtree outside forces the window root.
    gui.tree.set_shape(sibling, Rect::wh(12.0, 10.0));
    assert_eq!(gui.find_layout_dirty_root(win), Some(win));

    gui.close_window(win);
}

#[test]
fn invalid_layout_vars_mark_the_node_itself() {
    let mut gui = Gui::headless();
    let win = gui.new_window();
    gui.tree.set_attr(win, "layout", "box");
    let child = rect_leaf(&mut gui, win, Rect::wh(10.0, 10.0));

    gui.set_win_bounds(win, Rect::wh(100.0, 100.0));
    gui.show_window(win, None, false);
    gui.layout_window(win, Rect::wh(100.0, 100.0)).unwrap();
    gui.tree.clear_dirty(win);

    // Changing a layout attribute invalidates the cached vars and makes the
    // node its own dirty root.
    gui.tree.set_attr(child, "margin", "4");
    assert_eq!(gui.find_layout_dirty_root(child), Some(child));

    gui.close_window(win);
}

fn abs_fixture(gui: &mut Gui, left: &str) -> (NodeId, NodeId) {
    let win = gui.new_window();
    gui.tree.set_attr(win, "layout", "box");
    let content = rect_leaf(gui, win, Rect::wh(100.0, 100.0));
    let _ = content;
    let float = group(gui, win, &[("layout", "box"), ("left", left), ("top", "20")]);
    gui.make_abs_pos(float);
    rect_leaf(gui, float, Rect::wh(30.0, 10.0));
    gui.set_win_bounds(win, Rect::wh(100.0, 100.0));
    gui.show_window(win, None, false);
    gui.set_visible(float, true);
    (win, float)
}

#[test]
fn abs_pos_widget_is_placed_by_offsets() {
    let mut gui = Gui::headless();
    let (win, float) = abs_fixture(&mut gui, "10");

    let mut painter = RecordingPainter::new(100.0, 100.0);
    let repainted = gui.layout_and_draw(&mut painter).unwrap();
    assert!(repainted.is_valid());

    let b = gui.tree.bounds(float);
    assert!(approx(b.left, 10.0), "{b:?}");
    assert!(approx(b.top, 20.0), "{b:?}");
    assert!(painter.drawn.iter().any(|(n, _)| *n == win));
    assert!(painter.drawn.iter().any(|(n, _)| *n == float));

    // Nothing dirty: the next pass paints nothing.
    let repainted = gui.layout_and_draw(&mut painter).unwrap();
    assert!(!repainted.is_valid());

    gui.close_window(win);
}

#[test]
fn abs_pos_widget_is_clamped_on_screen() {
    let mut gui = Gui::headless();
    let (win, float) = abs_fixture(&mut gui, "90");

    let mut painter = RecordingPainter::new(100.0, 100.0);
    gui.layout_and_draw(&mut painter).unwrap();

    let b = gui.tree.bounds(float);
    assert!(b.right <= 100.5, "{b:?}");
    assert!(b.left >= -0.5, "{b:?}");

    gui.close_window(win);
}

#[test]
fn hiding_a_float_repaints_the_area_it_covered() {
    let mut gui = Gui::headless();
    let (win, float) = abs_fixture(&mut gui, "10");
    let mut painter = RecordingPainter::new(100.0, 100.0);
    gui.layout_and_draw(&mut painter).unwrap();

    let covered = gui.tree.bounds(float);
    gui.set_visible(float, false);
    let repainted = gui.layout_and_draw(&mut painter).unwrap();
    assert!(repainted.is_valid());
    assert!(repainted.contains_rect(covered), "{repainted:?} {covered:?}");

    gui.close_window(win);
}

#[test]
fn point_query_hits_floats_before_flow_content() {
    let mut gui = Gui::headless();
    let (win, float) = abs_fixture(&mut gui, "10");
    let mut painter = RecordingPainter::new(100.0, 100.0);
    gui.layout_and_draw(&mut painter).unwrap();

    // Inside the float.
    let hit = gui.widget_at(win, Point::new(15.0, 22.0)).unwrap();
    assert!(gui.tree.is_descendant(hit, float));
    // Outside it: the flow content.
    let hit = gui.widget_at(win, Point::new(80.0, 80.0)).unwrap();
    assert!(!gui.tree.is_descendant(hit, float));

    gui.close_window(win);
}
