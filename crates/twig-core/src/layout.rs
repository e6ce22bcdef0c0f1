//! Layout engine adapter.
//!
//! Each pass builds an ephemeral taffy item tree mirroring the visible,
//! in-flow widget subtree, runs the solver, and writes the solved
//! rectangles back as widget transforms. Sub-layouts of isolated containers
//! get their own disposable solver tree, so a hook re-entering layout
//! cannot perturb an outer run.

use std::collections::HashMap;

use geom::{Point, Rect, Transform2D};
use taffy::prelude::{TaffyMaxContent, auto, fr, length, line};
use taffy::{
    AlignItems, AvailableSpace, Display, FlexDirection, FlexWrap, JustifyContent, Size, Style,
    TaffyTree,
};
use tracing::warn;

use crate::dom::{DisplayMode, NodeId, NodeKind, Tree};
use crate::error::Result;
use crate::gui::Gui;
use crate::widget::{self, Anchor, Arrange, ContainerVars, FlexDir, Justify};

/// Size differences below this are treated as unchanged.
const THRESH: f32 = 1e-3;

/// One solver run: the taffy tree plus the node-to-item mapping that is
/// valid only for this pass.
struct LayoutPass {
    taffy: TaffyTree<()>,
    items: HashMap<NodeId, taffy::NodeId>,
}

impl LayoutPass {
    fn new() -> Self {
        Self {
            taffy: TaffyTree::new(),
            items: HashMap::new(),
        }
    }
}

/// Width/height attributes of a document node; percent sizes resolve during
/// layout and count as unset here.
fn doc_size(tree: &Tree, id: NodeId) -> (f32, f32) {
    let px = |name: &str| {
        tree.node(id)
            .attr(name)
            .filter(|v| !v.trim_end().ends_with('%'))
            .and_then(|v| v.trim().parse::<f32>().ok())
            .unwrap_or(0.0)
    };
    (px("width"), px("height"))
}

fn container_vars(tree: &Tree, id: NodeId) -> Option<ContainerVars> {
    tree.widget(id).and_then(|w| w.layout.container)
}

fn is_layout_container(tree: &Tree, id: NodeId) -> bool {
    tree.node(id).kind.is_container() && container_vars(tree, id).is_some()
}

fn dimension(extent: f32, fills: bool) -> taffy::Dimension {
    if fills || extent <= 0.0 {
        auto()
    } else {
        length(extent)
    }
}

fn align_for(start: bool, end: bool) -> AlignItems {
    match (start, end) {
        (true, true) => AlignItems::Stretch,
        (true, false) => AlignItems::Start,
        (false, true) => AlignItems::End,
        (false, false) => AlignItems::Center,
    }
}

/// Style for the widget as an item inside `parent`, plus its own container
/// configuration when it lays out children.
fn item_style(
    margins: Rect,
    anchor: Anchor,
    bbox: Rect,
    container: Option<ContainerVars>,
    parent: Option<ContainerVars>,
) -> Style {
    let mut style = Style {
        margin: taffy::Rect {
            left: length(margins.left),
            top: length(margins.top),
            right: length(margins.right),
            bottom: length(margins.bottom),
        },
        size: Size {
            width: dimension(if bbox.is_valid() { bbox.width() } else { 0.0 }, anchor.hfill()),
            height: dimension(if bbox.is_valid() { bbox.height() } else { 0.0 }, anchor.vfill()),
        },
        ..Style::default()
    };

    match container {
        Some(c) => match c.arrange {
            Arrange::Flex => {
                style.display = Display::Flex;
                style.flex_direction = match (c.dir, c.reverse) {
                    (FlexDir::Row, false) => FlexDirection::Row,
                    (FlexDir::Row, true) => FlexDirection::RowReverse,
                    (FlexDir::Column, false) => FlexDirection::Column,
                    (FlexDir::Column, true) => FlexDirection::ColumnReverse,
                };
                if c.wrap {
                    style.flex_wrap = FlexWrap::Wrap;
                }
                style.justify_content = c.justify.map(|j| match j {
                    Justify::Start => JustifyContent::FlexStart,
                    Justify::End => JustifyContent::FlexEnd,
                    Justify::Center => JustifyContent::Center,
                    Justify::SpaceBetween => JustifyContent::SpaceBetween,
                });
            }
            Arrange::Stack => {
                // Children overlap in a single grid cell, each anchored by
                // its own alignment.
                style.display = Display::Grid;
                style.grid_template_rows = vec![fr(1.0)];
                style.grid_template_columns = vec![fr(1.0)];
            }
        },
        None => style.display = Display::Block,
    }

    match parent {
        Some(p) if p.arrange == Arrange::Stack => {
            style.grid_row = taffy::Line {
                start: line(1),
                end: line(2),
            };
            style.grid_column = taffy::Line {
                start: line(1),
                end: line(2),
            };
            style.justify_self = Some(align_for(anchor.left, anchor.right));
            style.align_self = Some(align_for(anchor.top, anchor.bottom));
        }
        Some(p) => {
            let (main_fill, cross_start, cross_end) = match p.dir {
                FlexDir::Row => (anchor.hfill(), anchor.top, anchor.bottom),
                FlexDir::Column => (anchor.vfill(), anchor.left, anchor.right),
            };
            if main_fill {
                style.flex_grow = 1.0;
            }
            style.align_self = Some(align_for(cross_start, cross_end));
        }
        None => {}
    }

    style
}

/// Build the solver item for `id` and its in-flow descendants.
///
/// Be wary of refactoring: this runs reentrantly (intrinsic-size hooks may
/// start a nested sub-layout) and from three entry points.
fn prepare_layout(
    gui: &mut Gui,
    pass: &mut LayoutPass,
    id: NodeId,
    parent: Option<ContainerVars>,
) -> Result<taffy::NodeId> {
    gui.tree.ensure_widget(id);
    if !gui.tree.widget(id).is_some_and(|w| w.layout_vars_valid) {
        widget::update_layout_vars(gui.tree.node_mut(id));
    }

    let mut bbox = Rect::default();
    if let Some(hook) = gui.tree.widget(id).and_then(|w| w.on_prepare_layout.clone()) {
        bbox = hook(gui, id);
    }

    let container = container_vars(&gui.tree, id);
    let is_container = gui.tree.node(id).kind.is_container();
    let mut child_items = Vec::new();

    if !bbox.is_valid() && is_container && container.is_some() {
        let children: Vec<NodeId> = gui.tree.node(id).children().to_vec();
        for child in children {
            let c = gui.tree.node(child);
            if !c.is_visible() || c.display() == DisplayMode::Absolute {
                continue;
            }
            child_items.push(prepare_layout(gui, pass, child, container)?);
        }
        if gui.tree.node(id).kind == NodeKind::Doc {
            let (w, h) = doc_size(&gui.tree, id);
            bbox = Rect::wh(w, h);
        }
    } else if !bbox.is_valid() {
        bbox = gui.tree.bounds(id);
        if bbox.width() <= 0.0 || bbox.height() <= 0.0 {
            // A stale scale from a previous layout can zero the bounds;
            // measure from an identity transform.
            gui.tree.set_layout_transform(id, Transform2D::identity());
            bbox = gui.tree.bounds(id);
        }
    }

    let w = gui.tree.widget(id).expect("widget created above");
    let style = item_style(w.margins, w.layout.anchor, bbox, container, parent);
    let item = if child_items.is_empty() {
        pass.taffy.new_leaf(style)?
    } else {
        pass.taffy.new_with_children(style, &child_items)?
    };
    pass.items.insert(id, item);
    Ok(item)
}

/// Write solved rectangles back, children before their container so the
/// container sees final child bounds. `origin` is the document-frame origin
/// of the item's parent.
fn apply_layout(gui: &mut Gui, pass: &LayoutPass, id: NodeId, origin: Point) -> Result<()> {
    let Some(&item) = pass.items.get(&id) else {
        return Ok(());
    };
    let solved = pass.taffy.layout(item)?;
    let dest = Rect::ltwh(
        origin.x + solved.location.x,
        origin.y + solved.location.y,
        solved.size.width,
        solved.size.height,
    );

    if is_layout_container(&gui.tree, id) {
        let children: Vec<NodeId> = gui.tree.node(id).children().to_vec();
        for child in children {
            let c = gui.tree.node(child);
            if !c.is_visible() || c.display() == DisplayMode::Absolute {
                continue;
            }
            apply_layout(gui, pass, child, dest.origin())?;
        }
    }
    set_layout_bounds(gui, id, dest);
    Ok(())
}

/// Derive the widget transform taking its bounds from `src` to `dest`.
pub(crate) fn set_layout_bounds(gui: &mut Gui, id: NodeId, dest: Rect) {
    if !dest.is_valid() {
        return;
    }
    let src = gui.tree.bounds(id);
    if let Some(hook) = gui.tree.widget(id).and_then(|w| w.on_apply_layout.clone()) {
        if hook(gui, id, src, dest) {
            return;
        }
    }
    if !src.is_valid() {
        return;
    }
    // A layout container's bounds derive from its already-placed children.
    if is_layout_container(&gui.tree, id) {
        return;
    }

    let mut sx = if (dest.width() - src.width()).abs() < THRESH || src.width() <= 0.0 {
        1.0
    } else {
        dest.width() / src.width()
    };
    let mut sy = if (dest.height() - src.height()).abs() < THRESH || src.height() <= 0.0 {
        1.0
    } else {
        dest.height() / src.height()
    };
    let dx = dest.left - src.left;
    let dy = dest.top - src.top;
    if sx == 1.0 && sy == 1.0 && dx.abs() < THRESH && dy.abs() < THRESH {
        return;
    }

    let anchor = gui.tree.widget(id).map(|w| w.layout.anchor).unwrap_or_default();
    if (sx != 1.0 && !anchor.hfill()) || (sy != 1.0 && !anchor.vfill()) {
        // The solver squeezed a fixed-size item; conflicting flex
        // constraints (e.g. nested fill containers along one axis).
        warn!(node = ?id, sx, sy, "scaling non-scalable node");
    }

    // Resize rect geometry directly instead of scaling, which would distort
    // stroke width; corner radii attributes are untouched.
    if gui.tree.node(id).kind == NodeKind::Rect && (sx != 1.0 || sy != 1.0) {
        let tf = gui.tree.total_transform(id);
        let sw = gui.tree.node(id).attr_f32("stroke-width", 0.0);
        let shape = gui.tree.node(id).shape();
        let w = ((dest.width() - sw) / tf.xscale()).max(0.0);
        let h = ((dest.height() - sw) / tf.yscale()).max(0.0);
        gui.tree
            .set_shape(id, Rect::ltwh(shape.left, shape.top, w, h));
        sx = 1.0;
        sy = 1.0;
    }

    // Translation happens in the parent frame, scaling in the local frame.
    let old = gui
        .tree
        .widget(id)
        .map(|w| w.layout_transform)
        .unwrap_or_default();
    let tf = Transform2D::translating(dx, dy) * old * Transform2D::scaling(sx, sy);
    gui.tree.set_layout_transform(id, tf);
}

/// Find the shallowest node whose re-layout suffices for the dirty state
/// under `id`. Returns None when nothing needs layout.
pub(crate) fn find_layout_dirty_root(tree: &Tree, id: NodeId) -> Option<NodeId> {
    use crate::dom::Dirty;

    let node = tree.node(id);
    if node.dirty() == Dirty::Clean {
        return None;
    }
    if tree.widget(id).is_some_and(|w| !w.layout_vars_valid) {
        return Some(id);
    }
    if node.dirty() == Dirty::Bounds {
        return Some(id);
    }
    if !node.kind.is_container() {
        return None;
    }
    if tree.removed_bounds(id).is_valid() {
        return Some(id);
    }
    // Contents not subject to layout: relayout only if rendered bounds
    // drifted (possibly from a change deeper down).
    let has_hook = tree.widget(id).is_some_and(|w| w.on_prepare_layout.is_some());
    if container_vars(tree, id).is_none() && !has_hook {
        return (tree.bounds(id) != tree.rendered_bounds(id)).then_some(id);
    }
    let mut dirty_root = None;
    for &child in tree.node(id).children() {
        let c = tree.node(child);
        if c.dirty() == Dirty::Clean || !c.is_visible() || c.display() == DisplayMode::Absolute {
            continue;
        }
        // A newly shown child may not have widget state yet.
        if tree.widget(child).is_none() {
            return Some(id);
        }
        let Some(d) = find_layout_dirty_root(tree, child) else {
            continue;
        };
        // Two dirty children, or a dirty child that is not isolated, make
        // this node the root.
        if !tree.widget(d).is_some_and(|w| w.layout_isolate) || dirty_root.is_some() {
            return Some(id);
        }
        dirty_root = Some(d);
    }
    dirty_root
}

/// Lay out a window's content tree against `bbox` (its window bounds).
/// Absolutely positioned descendants run in a separate pass.
pub(crate) fn layout_window(gui: &mut Gui, win: NodeId, bbox: Rect) -> Result<()> {
    let mut pass = LayoutPass::new();
    let doc = prepare_layout(gui, &mut pass, win, None)?;
    let root = pass.taffy.new_with_children(
        Style {
            size: Size {
                width: dimension(bbox.width(), false),
                height: dimension(bbox.height(), false),
            },
            ..Style::default()
        },
        &[doc],
    )?;
    pass.taffy.compute_layout(
        root,
        Size {
            width: AvailableSpace::Definite(bbox.width()),
            height: AvailableSpace::Definite(bbox.height()),
        },
    )?;
    apply_layout(gui, &pass, win, Point::ZERO)
}

/// Sub-layout of an isolated container against an explicit box. Uses a
/// fresh disposable solver tree.
pub(crate) fn layout_widget(gui: &mut Gui, contents: NodeId, bbox: Rect) -> Result<()> {
    let mut pass = LayoutPass::new();
    let item = prepare_layout(gui, &mut pass, contents, None)?;
    let root = pass.taffy.new_with_children(
        Style {
            size: Size {
                width: dimension(bbox.width(), false),
                height: dimension(bbox.height(), false),
            },
            ..Style::default()
        },
        &[item],
    )?;
    let space = |extent: f32| {
        if extent > 0.0 {
            AvailableSpace::Definite(extent)
        } else {
            AvailableSpace::MaxContent
        }
    };
    pass.taffy.compute_layout(
        root,
        Size {
            width: space(bbox.width()),
            height: space(bbox.height()),
        },
    )?;
    apply_layout(gui, &pass, contents, bbox.origin())
}

/// Lay out an absolutely positioned widget: solve its content at the
/// origin, then translate by the offset attributes against the parent box.
pub(crate) fn layout_abs_pos_widget(gui: &mut Gui, ext: NodeId) -> Result<()> {
    let parent_bbox = gui
        .tree
        .node(ext)
        .parent()
        .map(|p| gui.tree.bounds(p))
        .unwrap_or_default();

    // An existing transform would fight the solver; clearing it means the
    // transform is only touched when there is an actual change.
    gui.tree.set_layout_transform(ext, Transform2D::identity());

    let mut pass = LayoutPass::new();
    let item = prepare_layout(gui, &mut pass, ext, None)?;
    pass.taffy.compute_layout(item, Size::MAX_CONTENT)?;
    apply_layout(gui, &pass, ext, Point::ZERO)?;

    let bbox = gui.tree.bounds(ext);
    let offset = gui
        .tree
        .widget(ext)
        .and_then(|w| w.abs_pos())
        .map(|a| a.calc_offset(bbox, parent_bbox))
        .unwrap_or(Point::ZERO);
    let tf = Transform2D::translating(offset.x, offset.y)
        * gui.tree.widget(ext).map(|w| w.layout_transform).unwrap_or_default();
    gui.tree.set_layout_transform(ext, tf);
    Ok(())
}
