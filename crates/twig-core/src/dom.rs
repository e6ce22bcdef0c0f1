//! Node-tree capability layer.
//!
//! The GUI core consumes a document tree through this module: string
//! attributes, classes, dirty levels, display modes, cached bounds, and
//! hit-testing, with one optional widget extension per node. Nodes live in a
//! generational arena, so a stale id fails lookup instead of dangling.

use std::cell::Cell;
use std::collections::HashMap;

use geom::{Point, Rect, Transform2D};

use crate::widget::{self, WidgetKind, WidgetState, WindowState};

slotmap::new_key_type! {
    /// Generational key for a node in the tree arena.
    pub struct NodeId;
}

/// Node content categories. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Document root (windows, isolated sub-documents).
    Doc,
    /// Grouping container.
    Group,
    /// Rectangle leaf.
    Rect,
    /// Text leaf.
    Text,
    /// Generic shape leaf.
    Path,
}

impl NodeKind {
    /// Containers may hold children; leaves carry geometry.
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Doc | Self::Group)
    }
}

/// Dirty levels, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Dirty {
    /// Nothing to do.
    Clean,
    /// Some descendant is dirty.
    Child,
    /// This node's bounds may have changed.
    Bounds,
    /// This node must repaint but its bounds are unchanged.
    Pixels,
}

/// CSS-style display mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Participates in flow layout.
    Block,
    /// Hidden; excluded from layout, bounds, and hit-testing.
    None,
    /// Out of flow; positioned by offsets, laid out in a separate pass.
    Absolute,
}

/// One node in the tree.
pub struct Node {
    pub kind: NodeKind,
    pub(crate) attrs: HashMap<String, String>,
    pub(crate) classes: Vec<String>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) dirty: Dirty,
    pub(crate) display: DisplayMode,
    /// Intrinsic geometry for leaf nodes, in the node's local frame.
    pub(crate) shape: Rect,
    /// Text content for `Text` nodes.
    pub(crate) text: String,
    /// Bounds as of the last completed paint, in the parent frame.
    pub(crate) rendered_bounds: Rect,
    /// Accumulated bounds of children removed since the last paint.
    pub(crate) removed_bounds: Rect,
    pub(crate) bounds_cache: Cell<Option<Rect>>,
    /// Widget extension, created lazily.
    pub widget: Option<WidgetState>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            attrs: HashMap::new(),
            classes: Vec::new(),
            parent: None,
            children: Vec::new(),
            dirty: Dirty::Bounds,
            display: DisplayMode::Block,
            shape: Rect::default(),
            text: String::new(),
            rendered_bounds: Rect::default(),
            removed_bounds: Rect::default(),
            bounds_cache: Cell::new(None),
            widget: None,
        }
    }

    /// The node's layout transform, identity when it has no widget.
    pub fn layout_transform(&self) -> Transform2D {
        self.widget
            .as_ref()
            .map(|w| w.layout_transform)
            .unwrap_or_default()
    }

    pub fn display(&self) -> DisplayMode {
        self.display
    }

    pub fn dirty(&self) -> Dirty {
        self.dirty
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_visible(&self) -> bool {
        self.display != DisplayMode::None
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn shape(&self) -> Rect {
        self.shape
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Numeric attribute with a fallback. Malformed values fall back
    /// silently: declarative input is authored content, not hostile input.
    pub fn attr_f32(&self, name: &str, fallback: f32) -> f32 {
        self.attr(name)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(fallback)
    }
}

/// The node arena. All windows managed by one GUI instance root their
/// subtrees here.
#[derive(Default)]
pub struct Tree {
    nodes: slotmap::SlotMap<NodeId, Node>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_node(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.insert(Node::new(kind))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Attach `child` under `parent`.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        assert!(
            self.nodes[parent].kind.is_container(),
            "cannot add child to non-container node"
        );
        assert!(
            self.nodes[child].parent.is_none(),
            "node already has a parent"
        );
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
        self.invalidate_bounds(parent);
    }

    /// Unlink `child` from its parent, accumulating its bounds into the
    /// parent's removed-child tracker so layout and repaint cover the hole.
    pub fn remove_child(&mut self, child: NodeId) {
        let Some(parent) = self.nodes[child].parent else {
            return;
        };
        let child_bounds = self.bounds(child);
        let p = &mut self.nodes[parent];
        p.children.retain(|c| *c != child);
        p.removed_bounds = p.removed_bounds.union(child_bounds);
        self.nodes[child].parent = None;
        self.invalidate_bounds(parent);
    }

    /// Remove `id` and its whole subtree from the arena.
    pub fn remove_subtree(&mut self, id: NodeId) {
        self.remove_child(id);
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if let Some(node) = self.nodes.remove(n) {
                stack.extend(node.children);
            }
        }
    }

    /// Set a string attribute, invalidating widget layout vars for
    /// layout-relevant names and dirtying pixels otherwise.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        let node = &mut self.nodes[id];
        node.attrs.insert(name.to_string(), value.to_string());
        self.on_attr_change(id, name);
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if self.nodes[id].attrs.remove(name).is_some() {
            self.on_attr_change(id, name);
        }
    }

    fn on_attr_change(&mut self, id: NodeId, name: &str) {
        let node = &mut self.nodes[id];
        if widget::is_layout_attr(name) {
            if let Some(w) = node.widget.as_mut() {
                if w.layout_vars_valid {
                    w.layout_vars_valid = false;
                }
            }
            self.invalidate_bounds(id);
        } else {
            self.set_dirty(id, Dirty::Pixels);
        }
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        let node = &mut self.nodes[id];
        if !node.has_class(class) {
            node.classes.push(class.to_string());
            self.set_dirty(id, Dirty::Pixels);
        }
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        let node = &mut self.nodes[id];
        let before = node.classes.len();
        node.classes.retain(|c| c != class);
        if node.classes.len() != before {
            self.set_dirty(id, Dirty::Pixels);
        }
    }

    /// Set leaf geometry in the node's local frame.
    pub fn set_shape(&mut self, id: NodeId, shape: Rect) {
        if self.nodes[id].shape != shape {
            self.nodes[id].shape = shape;
            self.invalidate_bounds(id);
        }
    }

    /// Replace the content of a `Text` node. The caller is responsible for
    /// updating the node's shape from measured extents.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        debug_assert_eq!(self.nodes[id].kind, NodeKind::Text);
        if self.nodes[id].text != text {
            self.nodes[id].text = text.to_string();
            self.invalidate_bounds(id);
        }
    }

    pub fn set_display(&mut self, id: NodeId, display: DisplayMode) {
        if self.nodes[id].display == display {
            return;
        }
        self.nodes[id].display = display;
        self.invalidate_bounds(id);
        if let Some(parent) = self.nodes[id].parent {
            self.invalidate_bounds(parent);
        }
    }

    /// Raise the node's dirty level and mark ancestors child-dirty.
    pub fn set_dirty(&mut self, id: NodeId, level: Dirty) {
        let node = &mut self.nodes[id];
        node.dirty = node.dirty.max(level);
        let mut up = node.parent;
        while let Some(p) = up {
            let pn = &mut self.nodes[p];
            if pn.dirty >= Dirty::Child {
                break;
            }
            pn.dirty = Dirty::Child;
            up = pn.parent;
        }
    }

    /// Mark the node bounds-dirty and drop cached bounds here and up the
    /// ancestor chain (parent bounds depend on child bounds).
    pub fn invalidate_bounds(&mut self, id: NodeId) {
        let mut up = Some(id);
        while let Some(n) = up {
            let node = &self.nodes[n];
            node.bounds_cache.set(None);
            up = node.parent;
        }
        self.set_dirty(id, Dirty::Bounds);
    }

    /// Drop cached bounds for the whole subtree under `id`. Needed when a
    /// transform changes, since descendant bounds embed ancestor transforms.
    fn invalidate_subtree_caches(&self, id: NodeId) {
        let node = &self.nodes[id];
        node.bounds_cache.set(None);
        for &child in &node.children {
            self.invalidate_subtree_caches(child);
        }
    }

    /// Accumulated transform from the document root down to and including
    /// `id`'s own layout transform.
    pub fn total_transform(&self, id: NodeId) -> Transform2D {
        let mut chain = vec![id];
        let mut up = self.nodes[id].parent;
        while let Some(n) = up {
            chain.push(n);
            up = self.nodes[n].parent;
        }
        let mut tf = Transform2D::identity();
        for n in chain.into_iter().rev() {
            tf = tf * self.nodes[n].layout_transform();
        }
        tf
    }

    /// Explicit document viewport size, when both extents are absolute.
    fn doc_viewport(&self, node: &Node) -> Option<Rect> {
        if node.kind != NodeKind::Doc {
            return None;
        }
        let px = |name: &str| {
            node.attr(name)
                .filter(|v| !v.trim_end().ends_with('%'))
                .and_then(|v| v.trim().parse::<f32>().ok())
                .filter(|v| *v > 0.0)
        };
        Some(Rect::wh(px("width")?, px("height")?))
    }

    /// Node bounds in the document (window-content) frame, transformed
    /// through the full ancestor chain. A document with explicit dimensions
    /// reports its viewport; other containers report the union of their
    /// in-flow children. Abs-positioned children are out of flow and do not
    /// contribute; hidden nodes and invalid shapes yield an invalid rect.
    pub fn bounds(&self, id: NodeId) -> Rect {
        let node = &self.nodes[id];
        if let Some(b) = node.bounds_cache.get() {
            return b;
        }
        let b = if let Some(viewport) = self.doc_viewport(node) {
            self.total_transform(id).map_rect(viewport)
        } else if node.kind.is_container() {
            let mut r = Rect::default();
            for &child in &node.children {
                let c = &self.nodes[child];
                if c.is_visible() && c.display != DisplayMode::Absolute {
                    r = r.union(self.bounds(child));
                }
            }
            r
        } else {
            self.total_transform(id).map_rect(node.shape)
        };
        node.bounds_cache.set(Some(b));
        b
    }

    pub fn rendered_bounds(&self, id: NodeId) -> Rect {
        self.nodes[id].rendered_bounds
    }

    pub fn removed_bounds(&self, id: NodeId) -> Rect {
        self.nodes[id].removed_bounds
    }

    /// Deepest visible node containing `p`, which is given in the document
    /// frame. Containers are hit only through their children; absolutely
    /// positioned children are resolved separately via the window's
    /// registry.
    pub fn node_at(&self, id: NodeId, p: Point) -> Option<NodeId> {
        let node = &self.nodes[id];
        if !node.is_visible() || !self.bounds(id).contains(p) {
            return None;
        }
        for &child in node.children.iter().rev() {
            if self.nodes[child].display == DisplayMode::Absolute {
                continue;
            }
            if let Some(hit) = self.node_at(child, p) {
                return Some(hit);
            }
        }
        (!node.kind.is_container()).then_some(id)
    }

    /// True if `child` is `ancestor` or a descendant of it.
    pub fn is_descendant(&self, child: NodeId, ancestor: NodeId) -> bool {
        let mut cur = Some(child);
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            cur = self.nodes.get(n).and_then(|node| node.parent);
        }
        false
    }

    /// Deepest common ancestor of two nodes, if they share a tree.
    pub fn common_ancestor(&self, a: NodeId, b: NodeId) -> Option<NodeId> {
        let mut path_a = Vec::new();
        let mut cur = Some(a);
        while let Some(n) = cur {
            path_a.push(n);
            cur = self.nodes[n].parent;
        }
        let mut cur = Some(b);
        while let Some(n) = cur {
            if path_a.contains(&n) {
                return Some(n);
            }
            cur = self.nodes[n].parent;
        }
        None
    }

    /// Nearest ancestor (starting at `id` itself) carrying widget state.
    pub fn nearest_widget(&self, id: NodeId) -> Option<NodeId> {
        let mut cur = Some(id);
        while let Some(n) = cur {
            if self.nodes[n].widget.is_some() {
                return Some(n);
            }
            cur = self.nodes[n].parent;
        }
        None
    }

    /// Nearest strict ancestor carrying widget state.
    pub fn parent_widget(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent.and_then(|p| self.nearest_widget(p))
    }

    /// The window root above `id`, if any.
    pub fn window_of(&self, id: NodeId) -> Option<NodeId> {
        let mut cur = Some(id);
        while let Some(n) = cur {
            if matches!(
                self.nodes[n].widget.as_ref().map(|w| &w.kind),
                Some(WidgetKind::Window(_))
            ) {
                return Some(n);
            }
            cur = self.nodes[n].parent;
        }
        None
    }

    pub fn window_state(&self, win: NodeId) -> &WindowState {
        match &self.nodes[win].widget.as_ref().expect("not a widget").kind {
            WidgetKind::Window(ws) => ws,
            _ => panic!("not a window"),
        }
    }

    pub fn window_state_mut(&mut self, win: NodeId) -> &mut WindowState {
        match &mut self.nodes[win].widget.as_mut().expect("not a widget").kind {
            WidgetKind::Window(ws) => ws,
            _ => panic!("not a window"),
        }
    }

    /// Get or create the widget extension on a node.
    pub fn ensure_widget(&mut self, id: NodeId) -> &mut WidgetState {
        self.nodes[id]
            .widget
            .get_or_insert_with(|| WidgetState::new(WidgetKind::Plain))
    }

    pub fn widget(&self, id: NodeId) -> Option<&WidgetState> {
        self.nodes.get(id).and_then(|n| n.widget.as_ref())
    }

    pub fn widget_mut(&mut self, id: NodeId) -> Option<&mut WidgetState> {
        self.nodes.get_mut(id).and_then(|n| n.widget.as_mut())
    }

    /// Enabled state is inherited down the parent chain.
    pub fn is_enabled(&self, id: NodeId) -> bool {
        let mut cur = Some(id);
        while let Some(n) = cur {
            if let Some(w) = &self.nodes[n].widget {
                if !w.enabled {
                    return false;
                }
            }
            cur = self.nodes[n].parent;
        }
        true
    }

    /// Visible here and in every ancestor.
    pub fn is_displayed(&self, id: NodeId) -> bool {
        let mut cur = Some(id);
        while let Some(n) = cur {
            if !self.nodes[n].is_visible() {
                return false;
            }
            cur = self.nodes[n].parent;
        }
        true
    }

    /// Set the widget's layout transform, invalidating bounds on change.
    /// Descendant bounds embed this transform, so their caches drop too.
    pub fn set_layout_transform(&mut self, id: NodeId, tf: Transform2D) {
        let w = self.ensure_widget(id);
        if w.layout_transform != tf {
            w.layout_transform = tf;
            self.invalidate_subtree_caches(id);
            self.invalidate_bounds(id);
        }
    }

    /// Dirty region of the subtree in the document frame. Invalid when
    /// nothing needs repainting.
    pub fn dirty_rect(&self, id: NodeId) -> Rect {
        let node = &self.nodes[id];
        match node.dirty {
            Dirty::Clean => Rect::default(),
            Dirty::Child => {
                let mut r = node.removed_bounds;
                for &child in &node.children {
                    r = r.union(self.dirty_rect(child));
                }
                r
            }
            Dirty::Bounds | Dirty::Pixels => self.bounds(id).union(node.rendered_bounds),
        }
    }

    /// Clear dirty state after paint, recording rendered bounds.
    pub fn clear_dirty(&mut self, id: NodeId) {
        let bounds = self.bounds(id);
        let node = &mut self.nodes[id];
        node.dirty = Dirty::Clean;
        node.rendered_bounds = bounds;
        node.removed_bounds = Rect::default();
        let children = node.children.clone();
        for child in children {
            self.clear_dirty(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(tree: &mut Tree, parent: NodeId, shape: Rect) -> NodeId {
        let id = tree.new_node(NodeKind::Rect);
        tree.set_shape(id, shape);
        tree.add_child(parent, id);
        id
    }

    #[test]
    fn bounds_union_and_transform() {
        let mut tree = Tree::new();
        let root = tree.new_node(NodeKind::Group);
        let a = leaf(&mut tree, root, Rect::wh(10.0, 10.0));
        let _b = leaf(&mut tree, root, Rect::ltwh(20.0, 0.0, 10.0, 10.0));
        assert_eq!(tree.bounds(root), Rect::ltrb(0.0, 0.0, 30.0, 10.0));

        tree.set_layout_transform(a, Transform2D::translating(5.0, 5.0));
        assert_eq!(tree.bounds(a), Rect::ltrb(5.0, 5.0, 15.0, 15.0));
        assert_eq!(tree.bounds(root), Rect::ltrb(5.0, 0.0, 30.0, 15.0));
    }

    #[test]
    fn hidden_children_excluded() {
        let mut tree = Tree::new();
        let root = tree.new_node(NodeKind::Group);
        let a = leaf(&mut tree, root, Rect::wh(10.0, 10.0));
        let _b = leaf(&mut tree, root, Rect::ltwh(50.0, 0.0, 10.0, 10.0));
        tree.set_display(a, DisplayMode::None);
        assert_eq!(tree.bounds(root), Rect::ltrb(50.0, 0.0, 60.0, 10.0));
    }

    #[test]
    fn hit_testing_prefers_topmost() {
        let mut tree = Tree::new();
        let root = tree.new_node(NodeKind::Group);
        let under = leaf(&mut tree, root, Rect::wh(20.0, 20.0));
        let over = leaf(&mut tree, root, Rect::wh(20.0, 20.0));
        assert_eq!(tree.node_at(root, Point::new(5.0, 5.0)), Some(over));
        tree.set_display(over, DisplayMode::None);
        assert_eq!(tree.node_at(root, Point::new(5.0, 5.0)), Some(under));
        assert_eq!(tree.node_at(root, Point::new(50.0, 50.0)), None);
    }

    #[test]
    fn dirty_propagates_to_ancestors() {
        let mut tree = Tree::new();
        let root = tree.new_node(NodeKind::Group);
        let mid = tree.new_node(NodeKind::Group);
        tree.add_child(root, mid);
        let a = leaf(&mut tree, mid, Rect::wh(4.0, 4.0));
        tree.clear_dirty(root);
        assert_eq!(tree.node(root).dirty(), Dirty::Clean);

        tree.set_dirty(a, Dirty::Pixels);
        assert_eq!(tree.node(a).dirty(), Dirty::Pixels);
        assert_eq!(tree.node(mid).dirty(), Dirty::Child);
        assert_eq!(tree.node(root).dirty(), Dirty::Child);
    }

    #[test]
    fn dirty_rect_tracks_old_and_new_bounds() {
        let mut tree = Tree::new();
        let root = tree.new_node(NodeKind::Group);
        let a = leaf(&mut tree, root, Rect::wh(10.0, 10.0));
        tree.clear_dirty(root);
        assert!(!tree.dirty_rect(root).is_valid());

        tree.set_layout_transform(a, Transform2D::translating(100.0, 0.0));
        let dirty = tree.dirty_rect(root);
        assert!(dirty.contains_rect(Rect::wh(10.0, 10.0)));
        assert!(dirty.contains_rect(Rect::ltwh(100.0, 0.0, 10.0, 10.0)));
    }

    #[test]
    fn removed_child_bounds_accumulate() {
        let mut tree = Tree::new();
        let root = tree.new_node(NodeKind::Group);
        let a = leaf(&mut tree, root, Rect::wh(10.0, 10.0));
        tree.clear_dirty(root);
        tree.remove_child(a);
        assert!(tree.removed_bounds(root).contains_rect(Rect::wh(10.0, 10.0)));
        assert!(tree.dirty_rect(root).contains_rect(Rect::wh(10.0, 10.0)));
    }

    #[test]
    fn descendant_and_common_ancestor() {
        let mut tree = Tree::new();
        let root = tree.new_node(NodeKind::Group);
        let mid = tree.new_node(NodeKind::Group);
        tree.add_child(root, mid);
        let a = leaf(&mut tree, mid, Rect::wh(1.0, 1.0));
        let b = leaf(&mut tree, root, Rect::wh(1.0, 1.0));
        assert!(tree.is_descendant(a, root));
        assert!(tree.is_descendant(a, a));
        assert!(!tree.is_descendant(root, a));
        assert_eq!(tree.common_ancestor(a, b), Some(root));
    }
}
