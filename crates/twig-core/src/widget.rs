//! Widget extension state attached to nodes.
//!
//! A widget gives a node interactivity (handler chain, filter, enable and
//! focus state) and layout participation (margins, container/anchor vars,
//! layout transform). The widget category is a tagged variant fixed at
//! construction: plain, absolutely positioned, or window.

use std::any::Any;
use std::rc::Rc;

use geom::{Point, Rect, Transform2D};

use crate::dom::{Node, NodeId};
use crate::event::Event;
use crate::gui::{EventCx, Gui};
use crate::painter::Color;

/// Event handler attached to a widget. Handlers run most-recently-added
/// first; returning true accepts the event and stops the chain.
pub type Handler = Rc<dyn Fn(&mut EventCx<'_>, &Event) -> bool>;

/// Event filter. Filters between a target and its nearest absolutely
/// positioned ancestor run outermost-first before normal dispatch; the first
/// to return true short-circuits delivery entirely.
pub type EventFilter = Rc<dyn Fn(&mut EventCx<'_>, Option<NodeId>, &Event) -> bool>;

/// Intrinsic-size hook for layout. Returning a valid rect reports the size
/// without descending into children.
pub type PrepareLayoutHook = Rc<dyn Fn(&mut Gui, NodeId) -> Rect>;

/// Custom bounds-application hook: `(gui, widget, src, dest)`. Returning
/// true means the hook handled the change.
pub type ApplyLayoutHook = Rc<dyn Fn(&mut Gui, NodeId, Rect, Rect) -> bool>;

/// An offset length: absolute pixels or percent of the parent dimension.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Length {
    Px(f32),
    Percent(f32),
}

impl Length {
    /// Resolve against a reference dimension.
    pub fn to_px(&self, reference: f32) -> f32 {
        match self {
            Self::Px(v) => *v,
            Self::Percent(v) => reference * v / 100.0,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(pct) = s.strip_suffix('%') {
            pct.trim().parse().ok().map(Self::Percent)
        } else {
            s.parse().ok().map(Self::Px)
        }
    }
}

/// Drop-shadow parameters for floating widgets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shadow {
    pub dx: f32,
    pub dy: f32,
    pub blur: f32,
    pub spread: f32,
    pub color: Color,
}

impl Shadow {
    /// The screen area the shadow can touch for content bounds `b`.
    pub fn bounds(&self, b: Rect) -> Rect {
        b.pad(self.spread)
            .pad(0.5 * self.blur + 1.0)
            .translate(self.dx, self.dy)
    }
}

/// State for absolutely positioned widgets (menus, tooltips, handles).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AbsPosState {
    pub left: Option<Length>,
    pub top: Option<Length>,
    pub right: Option<Length>,
    pub bottom: Option<Length>,
    pub shadow: Option<Shadow>,
}

impl AbsPosState {
    /// Base offset: per axis, a start offset anchors the start edge, else an
    /// end offset anchors the end edge, else the axis is untouched.
    /// Percentages resolve against the parent dimension.
    pub fn calc_offset(&self, bbox: Rect, parent: Rect) -> Point {
        let mut dr = Point::ZERO;
        if let Some(left) = self.left {
            dr.x = parent.left + left.to_px(parent.width()) - bbox.left;
        } else if let Some(right) = self.right {
            dr.x = parent.right - right.to_px(parent.width()) - bbox.right;
        }
        if let Some(top) = self.top {
            dr.y = parent.top + top.to_px(parent.height()) - bbox.top;
        } else if let Some(bottom) = self.bottom {
            dr.y = parent.bottom - bottom.to_px(parent.height()) - bbox.bottom;
        }
        dr
    }
}

/// Per-window state held on the window's root widget.
pub struct WindowState {
    /// Window bounds in logical screen units.
    pub win_bounds: Rect,
    /// Parent window for stacked (modal) windows.
    pub parent_window: Option<NodeId>,
    /// Active modal child. Only root windows hold this.
    pub modal_child: Option<NodeId>,
    /// Widget with keyboard focus in this window.
    pub focused: Option<NodeId>,
    /// Registry of visible absolutely positioned widgets in this window.
    pub abs_pos_nodes: Vec<NodeId>,
    pub is_modal: bool,
    pub title: String,
}

impl WindowState {
    pub fn new() -> Self {
        Self {
            win_bounds: Rect::default(),
            parent_window: None,
            modal_child: None,
            focused: None,
            abs_pos_nodes: Vec::new(),
            is_modal: false,
            title: String::new(),
        }
    }
}

impl Default for WindowState {
    fn default() -> Self {
        Self::new()
    }
}

/// Widget category, fixed at construction.
pub enum WidgetKind {
    Plain,
    AbsPos(AbsPosState),
    Window(Box<WindowState>),
}

/// Container arrangement modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrange {
    /// Children overlap, each anchored within the container.
    Stack,
    /// Children flow along the flex direction.
    Flex,
}

/// Flex main-axis orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexDir {
    Row,
    Column,
}

/// Main-axis content distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Justify {
    Start,
    End,
    Center,
    SpaceBetween,
}

/// Container-side layout vars parsed from attributes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerVars {
    pub arrange: Arrange,
    pub dir: FlexDir,
    /// Children run in reverse declaration order, so an item meant to appear
    /// before another can follow it in the document and paint on top.
    pub reverse: bool,
    pub wrap: bool,
    pub justify: Option<Justify>,
}

/// Item-side anchoring parsed from `box-anchor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Anchor {
    pub left: bool,
    pub top: bool,
    pub right: bool,
    pub bottom: bool,
}

impl Anchor {
    pub fn hfill(&self) -> bool {
        self.left && self.right
    }

    pub fn vfill(&self) -> bool {
        self.top && self.bottom
    }
}

/// Cached layout behavior derived from string attributes. Invalidated via
/// `layout_vars_valid` whenever a layout-relevant attribute changes;
/// recomputed at most once per dirty subtree per layout pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LayoutVars {
    pub container: Option<ContainerVars>,
    pub anchor: Anchor,
    pub flex_break: bool,
}

/// The behavioral extension attached 1:1 to a node.
pub struct WidgetState {
    pub kind: WidgetKind,
    /// Margins as left/top/right/bottom values.
    pub margins: Rect,
    pub layout: LayoutVars,
    pub layout_vars_valid: bool,
    /// Internal dirtiness never forces relayout of ancestors.
    pub layout_isolate: bool,
    pub enabled: bool,
    pub focusable: bool,
    /// This widget owns any press gesture inside it for hover/modal
    /// boundary purposes.
    pub pressed_group: bool,
    /// Translation in the parent frame composed with scale in the local
    /// frame; applied outside any document transform.
    pub layout_transform: Transform2D,
    pub handlers: Vec<Handler>,
    pub filter: Option<EventFilter>,
    pub on_prepare_layout: Option<PrepareLayoutHook>,
    pub on_apply_layout: Option<ApplyLayoutHook>,
    /// Type-erased user data with shared ownership.
    pub user_data: Option<Rc<dyn Any>>,
}

impl WidgetState {
    pub fn new(kind: WidgetKind) -> Self {
        Self {
            kind,
            margins: Rect::ltrb(0.0, 0.0, 0.0, 0.0),
            layout: LayoutVars::default(),
            layout_vars_valid: false,
            layout_isolate: false,
            enabled: true,
            focusable: false,
            pressed_group: false,
            layout_transform: Transform2D::identity(),
            handlers: Vec::new(),
            filter: None,
            on_prepare_layout: None,
            on_apply_layout: None,
            user_data: None,
        }
    }

    pub fn is_window(&self) -> bool {
        matches!(self.kind, WidgetKind::Window(_))
    }

    pub fn is_abs_pos(&self) -> bool {
        matches!(self.kind, WidgetKind::AbsPos(_) | WidgetKind::Window(_))
    }

    pub fn abs_pos(&self) -> Option<&AbsPosState> {
        match &self.kind {
            WidgetKind::AbsPos(a) => Some(a),
            _ => None,
        }
    }

    /// Typed view of the user-data slot.
    pub fn data<T: 'static>(&self) -> Option<Rc<T>> {
        self.user_data.clone().and_then(|d| d.downcast::<T>().ok())
    }
}

/// Attribute names that feed the layout-var cache.
const LAYOUT_ATTRS: &[&str] = &[
    "left",
    "top",
    "right",
    "bottom",
    "layout",
    "flex-direction",
    "flex-wrap",
    "justify-content",
    "box-anchor",
    "flex-break",
    "box-shadow",
];

/// True if changing `name` must invalidate cached layout vars.
pub(crate) fn is_layout_attr(name: &str) -> bool {
    name.starts_with("margin") || LAYOUT_ATTRS.contains(&name)
}

fn parse_numbers(s: &str) -> Vec<f32> {
    s.split_whitespace().filter_map(|t| t.parse().ok()).collect()
}

/// Expand CSS margin shorthand to (top, right, bottom, left).
fn expand_margin(values: &[f32]) -> [f32; 4] {
    match values {
        [] => [0.0; 4],
        [a] => [*a; 4],
        [v, h] => [*v, *h, *v, *h],
        [t, h, b] => [*t, *h, *b, *h],
        [t, r, b, l, ..] => [*t, *r, *b, *l],
    }
}

fn parse_justify(s: &str) -> Option<Justify> {
    match s {
        "flex-start" => Some(Justify::Start),
        "flex-end" => Some(Justify::End),
        "center" => Some(Justify::Center),
        "space-between" => Some(Justify::SpaceBetween),
        _ => None,
    }
}

fn parse_color(s: &str) -> Color {
    let s = s.trim();
    let parse_hex = |hex: &str| -> Option<Color> {
        match hex.len() {
            6 => {
                let v = u32::from_str_radix(hex, 16).ok()?;
                Some(Color::rgba(
                    (v >> 16) as u8,
                    (v >> 8) as u8,
                    v as u8,
                    255,
                ))
            }
            8 => {
                let v = u32::from_str_radix(hex, 16).ok()?;
                Some(Color::rgba(
                    (v >> 24) as u8,
                    (v >> 16) as u8,
                    (v >> 8) as u8,
                    v as u8,
                ))
            }
            _ => None,
        }
    };
    s.strip_prefix('#')
        .and_then(parse_hex)
        .unwrap_or(Color::rgba(0, 0, 0, 255))
}

/// Re-parse layout-relevant attributes into the widget's cached vars.
///
/// Idempotent; callers check `layout_vars_valid` first so this runs once per
/// dirty subtree per layout pass, not per frame. Malformed numeric values
/// fall back to defaults and never error.
pub(crate) fn update_layout_vars(node: &mut Node) {
    let margins = {
        let shorthand = node.attr("margin").map(parse_numbers).unwrap_or_default();
        let [t, r, b, l] = expand_margin(&shorthand);
        Rect::ltrb(
            node.attr_f32("margin-left", l),
            node.attr_f32("margin-top", t),
            node.attr_f32("margin-right", r),
            node.attr_f32("margin-bottom", b),
        )
    };

    let container = node.attr("layout").and_then(|layout| {
        let arrange = match layout {
            "box" => Arrange::Stack,
            "flex" => Arrange::Flex,
            _ => return None,
        };
        let (dir, reverse) = match node.attr("flex-direction") {
            Some("row") => (FlexDir::Row, false),
            Some("row-reverse") => (FlexDir::Row, true),
            Some("column-reverse") => (FlexDir::Column, true),
            _ => (FlexDir::Column, false),
        };
        Some(ContainerVars {
            arrange,
            dir,
            reverse,
            wrap: node.attr("flex-wrap") == Some("wrap"),
            justify: node.attr("justify-content").and_then(parse_justify),
        })
    });

    let anchor = match node.attr("box-anchor") {
        Some("fill") => Anchor {
            left: true,
            top: true,
            right: true,
            bottom: true,
        },
        Some(keywords) => Anchor {
            left: keywords.contains("left") || keywords.contains("hfill"),
            top: keywords.contains("top") || keywords.contains("vfill"),
            right: keywords.contains("right") || keywords.contains("hfill"),
            bottom: keywords.contains("bottom") || keywords.contains("vfill"),
        },
        None => Anchor::default(),
    };

    let flex_break = node.attr("flex-break") == Some("before");

    let abs = if node
        .widget
        .as_ref()
        .is_some_and(|w| matches!(w.kind, WidgetKind::AbsPos(_)))
    {
        Some(AbsPosState {
            left: node.attr("left").and_then(Length::parse),
            top: node.attr("top").and_then(Length::parse),
            right: node.attr("right").and_then(Length::parse),
            bottom: node.attr("bottom").and_then(Length::parse),
            shadow: node.attr("box-shadow").map(parse_shadow),
        })
    } else {
        None
    };

    let widget = node
        .widget
        .get_or_insert_with(|| WidgetState::new(WidgetKind::Plain));
    widget.margins = margins;
    widget.layout = LayoutVars {
        container,
        anchor,
        flex_break,
    };
    if let (WidgetKind::AbsPos(state), Some(parsed)) = (&mut widget.kind, abs) {
        *state = parsed;
    }
    widget.layout_vars_valid = true;
}

/// Parse `box-shadow`: "dx dy [blur] [spread] [inset] color".
fn parse_shadow(s: &str) -> Shadow {
    let mut tokens = s.split_whitespace().peekable();
    let mut next_num = |tokens: &mut std::iter::Peekable<std::str::SplitWhitespace<'_>>| {
        tokens
            .peek()
            .and_then(|t| t.parse::<f32>().ok())
            .inspect(|_| {
                tokens.next();
            })
    };
    let dx = next_num(&mut tokens).unwrap_or(0.0);
    let dy = next_num(&mut tokens).unwrap_or(0.0);
    let blur = next_num(&mut tokens).unwrap_or(0.0);
    let spread = next_num(&mut tokens).unwrap_or(0.0);
    if tokens.peek() == Some(&"inset") {
        tokens.next();
    }
    let color = tokens.next().map(parse_color).unwrap_or(Color::rgba(0, 0, 0, 255));
    Shadow {
        dx,
        dy,
        blur,
        spread,
        color,
    }
}

#[cfg(test)]
mod tests {
    use crate::dom::{NodeKind, Tree};

    use super::*;

    fn vars_for(attrs: &[(&str, &str)]) -> (Tree, crate::dom::NodeId) {
        let mut tree = Tree::new();
        let id = tree.new_node(NodeKind::Group);
        tree.ensure_widget(id);
        for (k, v) in attrs {
            tree.set_attr(id, k, v);
        }
        update_layout_vars(tree.node_mut(id));
        (tree, id)
    }

    #[test]
    fn margin_shorthand_expansion() {
        // (input, expected (top, right, bottom, left))
        let cases = [
            ("4", (4.0, 4.0, 4.0, 4.0)),
            ("4 8", (4.0, 8.0, 4.0, 8.0)),
            ("1 2 3", (1.0, 2.0, 3.0, 2.0)),
            ("1 2 3 4", (1.0, 2.0, 3.0, 4.0)),
            ("", (0.0, 0.0, 0.0, 0.0)),
            ("bogus", (0.0, 0.0, 0.0, 0.0)),
        ];
        for (input, (t, r, b, l)) in cases {
            let (tree, id) = vars_for(&[("margin", input)]);
            let m = tree.widget(id).unwrap().margins;
            assert_eq!((m.top, m.right, m.bottom, m.left), (t, r, b, l), "{input:?}");
        }
    }

    #[test]
    fn margin_side_overrides() {
        let (tree, id) = vars_for(&[("margin", "2"), ("margin-left", "9")]);
        let m = tree.widget(id).unwrap().margins;
        assert_eq!((m.top, m.right, m.bottom, m.left), (2.0, 2.0, 2.0, 9.0));
    }

    #[test]
    fn anchor_keywords() {
        let (tree, id) = vars_for(&[("box-anchor", "fill")]);
        let a = tree.widget(id).unwrap().layout.anchor;
        assert!(a.hfill() && a.vfill());

        let (tree, id) = vars_for(&[("box-anchor", "hfill top")]);
        let a = tree.widget(id).unwrap().layout.anchor;
        assert!(a.hfill());
        assert!(a.top && !a.bottom && !a.vfill());

        let (tree, id) = vars_for(&[]);
        let a = tree.widget(id).unwrap().layout.anchor;
        assert_eq!(a, Anchor::default());
    }

    #[test]
    fn container_parsing() {
        let (tree, id) = vars_for(&[
            ("layout", "flex"),
            ("flex-direction", "row-reverse"),
            ("justify-content", "space-between"),
        ]);
        let c = tree.widget(id).unwrap().layout.container.unwrap();
        assert_eq!(c.arrange, Arrange::Flex);
        assert_eq!(c.dir, FlexDir::Row);
        assert!(c.reverse);
        assert_eq!(c.justify, Some(Justify::SpaceBetween));

        let (tree, id) = vars_for(&[("layout", "box")]);
        let c = tree.widget(id).unwrap().layout.container.unwrap();
        assert_eq!(c.arrange, Arrange::Stack);
    }

    #[test]
    fn attr_change_invalidates_vars() {
        let (mut tree, id) = vars_for(&[("margin", "2")]);
        assert!(tree.widget(id).unwrap().layout_vars_valid);
        tree.set_attr(id, "margin", "3");
        assert!(!tree.widget(id).unwrap().layout_vars_valid);
        // Non-layout attributes leave the cache alone.
        update_layout_vars(tree.node_mut(id));
        tree.set_attr(id, "fill", "#ff0000");
        assert!(tree.widget(id).unwrap().layout_vars_valid);
    }

    #[test]
    fn abs_offset_resolution() {
        let abs = AbsPosState {
            left: Some(Length::Px(10.0)),
            top: Some(Length::Percent(50.0)),
            ..AbsPosState::default()
        };
        let parent = Rect::ltwh(0.0, 0.0, 200.0, 100.0);
        let bbox = Rect::wh(20.0, 10.0);
        let off = abs.calc_offset(bbox, parent);
        assert_eq!(off, Point::new(10.0, 50.0));

        // End-edge anchoring when only right/bottom are set.
        let abs = AbsPosState {
            right: Some(Length::Px(5.0)),
            bottom: Some(Length::Px(0.0)),
            ..AbsPosState::default()
        };
        let off = abs.calc_offset(bbox, parent);
        assert_eq!(off, Point::new(175.0, 90.0));
    }

    #[test]
    fn shadow_parsing() {
        let s = parse_shadow("2 3 8 1 #00000080");
        assert_eq!((s.dx, s.dy, s.blur, s.spread), (2.0, 3.0, 8.0, 1.0));
        assert_eq!(s.color.a, 0x80);
        let b = s.bounds(Rect::wh(10.0, 10.0));
        assert!(b.contains_rect(Rect::wh(10.0, 10.0).translate(2.0, 3.0)));
    }
}
