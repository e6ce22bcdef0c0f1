//! Single-line text editor.
//!
//! Adapts the fixed-buffer editing state machine in [`crate::editstate`] to
//! the widget tree: UTF-8 at every public boundary over a UTF-32 buffer
//! inside, a per-character glyph-position cache serving both the engine's
//! width queries and selection/cursor geometry, and deferred change
//! resolution. The engine may issue several low-level edits per user action
//! (paste over a selection is a delete plus an insert), so the adapter
//! accumulates a change severity and performs exactly one visual and
//! notification update per top-level event.

use std::cell::RefCell;
use std::rc::Rc;

use geom::{Point, Rect, Transform2D};
use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

use twig_core::gui::{EventCx, Gui};
use twig_core::text::GlyphPos;
use twig_core::{
    Buttons, Event, FocusReason, KeyCode, NodeId, NodeKind, PointerId,
    is_long_press_or_right_click,
};

use crate::button::Button;
use crate::editstate::{EditBuffer, EditState, Motion};
use crate::menu::{Menu, MenuAlign};

/// Cursor blink half-period (ms).
const BLINK_MS: i64 = 700;
/// Line box height used for selection/cursor geometry.
const LINE_H: f32 = 20.0;
/// Font size for glyph measurement.
const FONT_SIZE: f32 = 14.0;
/// Default buffer length limit.
pub const DEFAULT_MAX_LENGTH: usize = 256;
/// Mask glyph for password mode.
const PASS_CHAR: char = '\u{2022}';

/// Editor behavior modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    Normal,
    ReadOnly,
    Password,
    /// Password mode that momentarily reveals the last typed character.
    PasswordShowLast,
}

/// How much the buffer changed since the last update pass, from least to
/// most consequential. Only user-originated edits commit to `on_changed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum TextChange {
    None,
    /// Geometry only; glyph positions must be refreshed.
    Layout,
    /// Programmatic `set_text`.
    Set,
    /// User-originated edit.
    User,
    /// IME-originated edit.
    Ime,
}

/// Buffer view handed to the editing engine. Width queries answer from the
/// cached glyph table; edits raise the change severity.
struct BufView<'a> {
    text: &'a mut Vec<char>,
    glyphs: &'a [GlyphPos],
    changed: &'a mut TextChange,
}

impl EditBuffer for BufView<'_> {
    fn len(&self) -> usize {
        self.text.len()
    }

    fn char_at(&self, i: usize) -> char {
        self.text[i]
    }

    fn char_width(&self, i: usize) -> f32 {
        let right = self.glyphs.get(i).map(|g| g.right).unwrap_or(0.0);
        let left = if i > 0 {
            self.glyphs.get(i - 1).map(|g| g.right).unwrap_or(0.0)
        } else {
            0.0
        };
        right - left
    }

    fn insert(&mut self, pos: usize, ins: &[char]) -> bool {
        self.text.splice(pos..pos, ins.iter().copied());
        *self.changed = (*self.changed).max(TextChange::User);
        true
    }

    fn delete(&mut self, pos: usize, n: usize) {
        self.text.drain(pos..pos + n);
        *self.changed = (*self.changed).max(TextChange::User);
    }
}

/// Node handles inside the editor subtree.
#[derive(Clone, Copy)]
struct Ids {
    root: NodeId,
    container: NodeId,
    content: NodeId,
    text_node: NodeId,
    empty_text: NodeId,
    sel_bg: NodeId,
    cursor: NodeId,
    cursor_handle: NodeId,
    selstart_handle: NodeId,
}

struct TextEditState {
    state: EditState,
    text: Vec<char>,
    glyph_pos: Vec<GlyphPos>,
    text_changed: TextChange,
    /// Selection as of the previous update pass.
    sel_start: usize,
    sel_end: usize,
    /// Cursor as of the previous update pass.
    cursor_pos: usize,
    /// Right edge of the visible window in text coordinates.
    scroll_x: f32,
    max_scroll_x: f32,
    scroll_x_offset: f32,
    prev_pos: Point,
    show_last_char: bool,
    edit_mode: EditMode,
    max_length: usize,
    clear_focus_on_done: bool,
    on_changed: Option<Rc<dyn Fn(&mut Gui, &str)>>,
    /// Dragging a selection handle must keep the other bound fixed.
    handle_had_selection: bool,
}

impl TextEditState {
    fn with_buf<R>(&mut self, f: impl FnOnce(&mut EditState, &mut BufView<'_>) -> R) -> R {
        let Self {
            state,
            text,
            glyph_pos,
            text_changed,
            ..
        } = self;
        let mut view = BufView {
            text,
            glyphs: glyph_pos,
            changed: text_changed,
        };
        f(state, &mut view)
    }

    fn is_read_only(&self) -> bool {
        self.edit_mode == EditMode::ReadOnly
    }

    /// Characters as shown: masked in password modes.
    fn display_text(&self) -> Vec<char> {
        match self.edit_mode {
            EditMode::Password | EditMode::PasswordShowLast if !self.text.is_empty() => {
                let mut masked = vec![PASS_CHAR; self.text.len()];
                if self.edit_mode == EditMode::PasswordShowLast && self.show_last_char {
                    let last = self.text.len() - 1;
                    masked[last] = self.text[last];
                }
                masked
            }
            _ => self.text.clone(),
        }
    }

    fn raise(&mut self, level: TextChange) {
        self.text_changed = self.text_changed.max(level);
    }
}

type SharedState = Rc<RefCell<TextEditState>>;

/// The single-line text-edit widget.
#[derive(Clone, Copy)]
pub struct TextEdit {
    pub root: NodeId,
    ids: Ids,
    /// The cut/copy/paste context menu.
    pub menu: Menu,
    pub ctx_select_all: Button,
    pub ctx_cut: Button,
    pub ctx_copy: Button,
    pub ctx_paste: Button,
}

fn clean_text(s: &str) -> String {
    s.chars()
        .map(|c| if matches!(c, '\t' | '\r' | '\n') { ' ' } else { c })
        .collect()
}

impl TextEdit {
    pub fn new(gui: &mut Gui) -> Self {
        let root = gui.tree.new_node(NodeKind::Group);
        gui.tree.add_class(root, "textbox");
        gui.tree.add_class(root, "textedit");
        gui.tree.set_attr(root, "layout", "box");
        gui.tree.ensure_widget(root).focusable = true;

        // Intrinsic minimum size; the fill-anchored container stretches over
        // it.
        let min_width = gui.tree.new_node(NodeKind::Rect);
        gui.tree.add_class(min_width, "min-width-rect");
        gui.tree.set_shape(min_width, Rect::wh(150.0, 36.0));
        gui.tree.add_child(root, min_width);
        gui.tree.ensure_widget(min_width);

        let container = gui.tree.new_node(NodeKind::Doc);
        gui.tree.add_class(container, "textbox-container");
        gui.tree.set_attr(container, "layout", "box");
        gui.tree.set_attr(container, "box-anchor", "fill");
        gui.tree.set_attr(container, "width", "100%");
        gui.tree.set_attr(container, "height", "100%");
        gui.tree.add_child(root, container);

        let content = gui.tree.new_node(NodeKind::Group);
        gui.tree.add_class(content, "textbox-content");
        gui.tree.set_attr(content, "layout", "box");
        gui.tree.set_attr(content, "box-anchor", "fill");
        gui.tree.add_child(container, content);
        // Changes inside the editor must never trigger a global relayout.
        gui.tree.ensure_widget(content).layout_isolate = true;

        // Invisible rect so pointer events land past the end of the text,
        // and to set the line height.
        let min_rect = gui.tree.new_node(NodeKind::Rect);
        gui.tree.set_attr(min_rect, "box-anchor", "hfill");
        gui.tree.set_shape(min_rect, Rect::wh(20.0, 36.0));
        gui.tree.add_child(content, min_rect);

        let sel_bg = gui.tree.new_node(NodeKind::Rect);
        gui.tree.add_class(sel_bg, "text-selection-bg");
        gui.tree.set_attr(sel_bg, "box-anchor", "left");
        gui.tree.set_shape(sel_bg, Rect::wh(0.0, LINE_H));
        gui.tree.add_child(content, sel_bg);

        let empty_text = gui.tree.new_node(NodeKind::Text);
        gui.tree.add_class(empty_text, "textedit-empty-text");
        gui.tree.set_attr(empty_text, "box-anchor", "left");
        gui.tree.add_child(content, empty_text);

        let text_node = gui.tree.new_node(NodeKind::Text);
        gui.tree.add_class(text_node, "textedit-text");
        gui.tree.set_attr(text_node, "box-anchor", "left");
        gui.tree.add_child(content, text_node);

        let cursor = gui.tree.new_node(NodeKind::Rect);
        gui.tree.add_class(cursor, "text-cursor");
        gui.tree.set_shape(cursor, Rect::ltwh(-1.0, 0.0, 1.5, LINE_H));
        gui.tree.add_child(content, cursor);
        gui.tree.ensure_widget(cursor);
        gui.tree.set_display(cursor, twig_core::DisplayMode::None);

        let handle = |gui: &mut Gui, class: &str| {
            let h = gui.tree.new_node(NodeKind::Group);
            gui.tree.add_class(h, class);
            gui.tree.add_class(h, "cursor-handle");
            let grip = gui.tree.new_node(NodeKind::Rect);
            gui.tree.set_shape(grip, Rect::wh(16.0, 28.0));
            gui.tree.add_child(h, grip);
            gui.tree.add_child(container, h);
            gui.make_abs_pos(h);
            gui.tree.set_attr(h, "top", "100%");
            gui.tree.set_attr(h, "left", "0");
            gui.tree.set_display(h, twig_core::DisplayMode::None);
            h
        };
        let cursor_handle = handle(gui, "selend-handle");
        let selstart_handle = handle(gui, "selstart-handle");

        let ids = Ids {
            root,
            container,
            content,
            text_node,
            empty_text,
            sel_bg,
            cursor,
            cursor_handle,
            selstart_handle,
        };

        let state: SharedState = Rc::new(RefCell::new(TextEditState {
            state: EditState::new(),
            text: Vec::new(),
            glyph_pos: Vec::new(),
            text_changed: TextChange::None,
            sel_start: 0,
            sel_end: 0,
            cursor_pos: 0,
            scroll_x: 0.0,
            max_scroll_x: 0.0,
            scroll_x_offset: 0.0,
            prev_pos: Point::ZERO,
            show_last_char: false,
            edit_mode: EditMode::Normal,
            max_length: DEFAULT_MAX_LENGTH,
            clear_focus_on_done: true,
            on_changed: None,
            handle_had_selection: false,
        }));
        gui.tree.ensure_widget(root).user_data = Some(state.clone());

        // Context menu with per-show item visibility.
        let menu = Menu::new(gui, MenuAlign::Floating);
        gui.tree.remove_child(menu.root);
        gui.tree.add_child(container, menu.root);
        let ctx_select_all = Button::new(gui, "Select All");
        let ctx_cut = Button::new(gui, "Cut");
        let ctx_copy = Button::new(gui, "Copy");
        let ctx_paste = Button::new(gui, "Paste");
        menu.add_item(gui, &ctx_select_all);
        menu.add_item(gui, &ctx_cut);
        menu.add_item(gui, &ctx_copy);
        menu.add_item(gui, &ctx_paste);

        let this = Self {
            root,
            ids,
            menu,
            ctx_select_all,
            ctx_cut,
            ctx_copy,
            ctx_paste,
        };

        {
            let st = state.clone();
            ctx_select_all.on_clicked(gui, move |gui| {
                st.borrow_mut().with_buf(|es, buf| es.select_all(buf));
                this.do_update(gui);
                this.show_menu(gui);
            });
        }
        {
            let st = state.clone();
            ctx_cut.on_clicked(gui, move |gui| {
                this.do_cut(gui, &st, true);
                this.do_update(gui);
            });
        }
        {
            let st = state.clone();
            ctx_copy.on_clicked(gui, move |gui| {
                this.do_copy(gui, &st, true);
            });
        }
        {
            let st = state.clone();
            ctx_paste.on_clicked(gui, move |gui| {
                this.do_paste(gui, &st);
                this.do_update(gui);
            });
        }

        {
            let st = state.clone();
            gui.add_handler(root, move |cx, event| this.root_event(cx, &st, event));
        }
        {
            let st = state.clone();
            gui.add_handler(cursor_handle, move |cx, event| {
                this.cursor_handle_event(cx, &st, event)
            });
        }
        {
            let st = state.clone();
            gui.add_handler(selstart_handle, move |cx, event| {
                this.selstart_handle_event(cx, &st, event)
            });
        }

        // Container reports the contents' intrinsic size; the contents hook
        // implements horizontal cursor scrolling.
        {
            gui.tree.ensure_widget(container).on_prepare_layout =
                Some(Rc::new(move |gui, id| {
                    let hfill = gui
                        .tree
                        .widget(this.root)
                        .map(|w| w.layout.anchor.hfill())
                        .unwrap_or(false);
                    gui.tree
                        .set_layout_transform(this.ids.content, Transform2D::identity());
                    let origin = gui.tree.bounds(id).origin();
                    let _ = gui.layout_widget(
                        this.ids.content,
                        Rect::ltwh(origin.x, origin.y, 0.0, 0.0),
                    );
                    let bbox = gui.tree.bounds(this.ids.content);
                    Rect::wh(if hfill { 0.0 } else { bbox.width() }, bbox.height())
                }));
        }
        {
            gui.tree.ensure_widget(container).on_apply_layout =
                Some(Rc::new(move |gui, id, _src, dest| {
                    gui.tree.set_attr(id, "width", &format!("{}", dest.width()));
                    gui.tree
                        .set_attr(id, "height", &format!("{}", dest.height()));
                    let origin = gui.tree.bounds(id).origin();
                    let _ = gui.layout_widget(
                        this.ids.content,
                        Rect::ltwh(origin.x, origin.y, 0.0, 0.0),
                    );
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
        }
        {
            let st = state;
            gui.tree.ensure_widget(content).on_apply_layout =
                Some(Rc::new(move |gui, id, _src, _dest| {
                    let w = gui.tree.bounds(this.ids.container).width() - 6.0;
                    {
                        let mut s = st.borrow_mut();
                        let pos = gui
                            .tree
                            .widget(this.ids.cursor)
                            .map(|c| c.layout_transform.xoffset())
                            .unwrap_or(0.0);
                        let cw = 2.0;
                        if s.state.has_selection() {
                            // Cursor autoscroll is disabled with a live
                            // selection; do_update handles it there.
                        } else if pos > s.scroll_x {
                            s.scroll_x = pos + cw;
                        } else if pos < s.scroll_x - w {
                            s.scroll_x = pos + w;
                        }
                        s.scroll_x = s.scroll_x.clamp(w.min(s.max_scroll_x + cw), s.max_scroll_x + cw).max(w);
                        s.scroll_x_offset = w;
                        let dx = w - s.scroll_x;
                        let tf = Transform2D::translating(dx, 0.0)
                            * gui
                                .tree
                                .widget(id)
                                .map(|n| n.layout_transform)
                                .unwrap_or_default();
                        gui.tree.set_layout_transform(id, tf);
                        s.raise(TextChange::Layout);
                    }
                    this.do_update(gui);
                    true
                }));
        }

        this
    }

    fn state(&self, gui: &Gui) -> SharedState {
        gui.tree
            .widget(self.root)
            .and_then(|w| w.data::<RefCell<TextEditState>>())
            .expect("textedit state missing")
    }

    // ---- public API -----------------------------------------------------

    /// Current contents as UTF-8.
    pub fn text(&self, gui: &Gui) -> String {
        self.state(gui).borrow().text.iter().collect()
    }

    /// Replace the contents. Control characters (tab, CR, LF) are replaced
    /// with spaces; the selection collapses to the start of the line and
    /// `on_changed` does not fire.
    pub fn set_text(&self, gui: &mut Gui, s: &str) {
        let st = self.state(gui);
        {
            let mut st = st.borrow_mut();
            let cleaned: Vec<char> = clean_text(s).chars().collect();
            st.with_buf(|es, buf| {
                es.select_start = 0;
                es.select_end = buf.len();
                es.paste(buf, &cleaned);
                es.key(buf, Motion::LineStart, false);
            });
            st.text_changed = TextChange::Set;
        }
        self.do_update(gui);
    }

    pub fn select_all(&self, gui: &mut Gui) {
        let st = self.state(gui);
        st.borrow_mut().with_buf(|es, buf| es.select_all(buf));
        self.do_update(gui);
    }

    /// Selection as an ascending character range.
    pub fn selection(&self, gui: &Gui) -> (usize, usize) {
        self.state(gui).borrow().state.selection()
    }

    pub fn cursor(&self, gui: &Gui) -> usize {
        self.state(gui).borrow().state.cursor
    }

    /// Number of cached glyph positions; equals the buffer length after
    /// every update pass.
    pub fn glyph_count(&self, gui: &Gui) -> usize {
        self.state(gui).borrow().glyph_pos.len()
    }

    pub fn buffer_len(&self, gui: &Gui) -> usize {
        self.state(gui).borrow().text.len()
    }

    /// What the editor actually renders (masked in password modes).
    pub fn display_text(&self, gui: &Gui) -> String {
        gui.tree.node(self.ids.text_node).text().to_string()
    }

    /// The draggable selection handles (end, start).
    pub fn handles(&self) -> (NodeId, NodeId) {
        (self.ids.cursor_handle, self.ids.selstart_handle)
    }

    pub fn set_edit_mode(&self, gui: &mut Gui, mode: EditMode) {
        let st = self.state(gui);
        st.borrow_mut().edit_mode = mode;
        st.borrow_mut().raise(TextChange::Set);
        self.do_update(gui);
    }

    pub fn set_max_length(&self, gui: &mut Gui, n: usize) {
        self.state(gui).borrow_mut().max_length = n;
    }

    /// Commit notification: fires once per user-originated edit, never for
    /// layout recalculation, programmatic `set_text`, or IME composition.
    pub fn on_changed(&self, gui: &mut Gui, f: impl Fn(&mut Gui, &str) + 'static) {
        self.state(gui).borrow_mut().on_changed = Some(Rc::new(f));
    }

    // ---- clipboard ------------------------------------------------------

    fn do_paste(&self, gui: &mut Gui, st: &SharedState) {
        if st.borrow().is_read_only() {
            return;
        }
        let Some(cb) = gui.platform.clipboard_text() else {
            return;
        };
        let ins: Vec<char> = clean_text(&cb).chars().collect();
        let mut s = st.borrow_mut();
        let (selmin, selmax) = s.state.selection();
        // The replaced selection frees room for the same number of chars.
        let room = (s.max_length + (selmax - selmin)).saturating_sub(s.text.len());
        let take = ins.len().min(room);
        if take > 0 {
            s.with_buf(|es, buf| es.paste(buf, &ins[..take]));
        }
    }

    /// Copy the selection; with `copy_all`, fall back to the whole text.
    /// Returns whether a selection was copied.
    fn do_copy(&self, gui: &mut Gui, st: &SharedState, copy_all: bool) -> bool {
        let (text, had_sel) = {
            let s = st.borrow();
            let (lo, hi) = s.state.selection();
            if lo != hi {
                (s.text[lo..hi].iter().collect::<String>(), true)
            } else if copy_all {
                (s.text.iter().collect::<String>(), false)
            } else {
                return false;
            }
        };
        gui.platform.set_clipboard_text(&text);
        had_sel
    }

    fn do_cut(&self, gui: &mut Gui, st: &SharedState, cut_all: bool) {
        if st.borrow().is_read_only() {
            self.do_copy(gui, st, cut_all);
        } else if self.do_copy(gui, st, cut_all) {
            st.borrow_mut().with_buf(|es, buf| {
                es.cut(buf);
            });
        } else if cut_all {
            st.borrow_mut().with_buf(|es, buf| {
                es.select_all(buf);
                es.cut(buf);
            });
        }
    }

    // ---- context menu ---------------------------------------------------

    /// Open the context menu near the selection (or cursor), recomputing
    /// item visibility from the current state.
    pub fn show_menu(&self, gui: &mut Gui) {
        let st = self.state(gui);
        let (has_sel, read_only) = {
            let s = st.borrow();
            (s.state.has_selection(), s.is_read_only())
        };
        let has_clip = gui.platform.has_clipboard_text();
        gui.set_visible(self.ctx_select_all.root, !has_sel);
        gui.set_visible(self.ctx_cut.root, !read_only && has_sel);
        gui.set_visible(self.ctx_copy.root, has_sel);
        gui.set_visible(self.ctx_paste.root, !read_only && has_clip);

        let mut b = if has_sel {
            gui.tree
                .bounds(self.ids.sel_bg)
                .intersect(gui.tree.bounds(self.root))
        } else {
            Rect::default()
        };
        if !b.is_valid() {
            b = gui.tree.bounds(self.ids.cursor);
        }
        let w = gui.tree.bounds(self.menu.root).width().max(100.0);
        gui.show_context_menu(
            self.menu.root,
            Point::new(b.center().x - w / 2.0, b.bottom + 30.0),
            None,
            false,
        );
        // Place the menu above the text when there is room.
        let y = b.top - 10.0;
        if y > 0.0 {
            if let Some(p) = gui.tree.node(self.menu.root).parent() {
                let pbounds = gui.tree.bounds(p);
                gui.tree.remove_attr(self.menu.root, "top");
                gui.tree
                    .set_attr(self.menu.root, "bottom", &format!("{}", pbounds.bottom - y));
            }
        }
    }

    // ---- events ---------------------------------------------------------

    /// x offset of an event position from the text origin.
    fn text_x(&self, gui: &Gui, pos: Point) -> f32 {
        pos.x - gui.tree.bounds(self.ids.text_node).left
    }

    /// Select the word around the cursor (double-click).
    fn select_word(&self, st: &SharedState) {
        let mut s = st.borrow_mut();
        let text: String = s.text.iter().collect();
        let cursor = s.state.cursor;
        // Word boundaries over char indices.
        let mut char_index = 0;
        let mut target = None;
        for word in text.split_word_bounds() {
            let len = word.chars().count();
            if cursor < char_index + len || char_index + len == s.text.len() {
                target = Some((char_index, char_index + len));
                break;
            }
            char_index += len;
        }
        if let Some((lo, hi)) = target {
            s.state.select_start = lo;
            s.state.select_end = hi;
            s.state.cursor = hi;
        }
    }

    fn root_event(&self, cx: &mut EventCx<'_>, st: &SharedState, event: &Event) -> bool {
        let gui = &mut *cx.gui;
        let ids = self.ids;

        if let Event::TimerTick = event {
            // Cursor blink; steady while a handle drag is in progress.
            if gui.pressed_widget != Some(ids.cursor_handle) {
                let on = gui.tree.node(ids.cursor).attr_f32("opacity", 1.0) != 0.0;
                gui.tree
                    .set_attr(ids.cursor, "opacity", if on { "0" } else { "1" });
            }
            return true;
        }

        // Any other event hides the revealed last password character.
        st.borrow_mut().show_last_char = false;

        match event {
            Event::PointerDown(p) if p.buttons.contains(Buttons::PRIMARY) => {
                let x = self.text_x(gui, p.pos);
                {
                    let mut s = st.borrow_mut();
                    let (old_lo, old_hi) = (s.sel_start, s.sel_end);
                    s.with_buf(|es, buf| es.click(buf, x));
                    if p.id != PointerId::MOUSE {
                        // A touch press inside the selection keeps it, so
                        // dragging scrolls instead of collapsing.
                        let c = s.state.cursor;
                        if (c >= old_lo.min(old_hi) && c < old_lo.max(old_hi))
                            || (old_lo != old_hi && c == old_lo.max(old_hi))
                        {
                            s.state.select_start = old_lo;
                            s.state.select_end = old_hi;
                            s.state.cursor = old_hi;
                        }
                    }
                    s.prev_pos = p.pos;
                }
                // Double-click selects a word, triple-click the line, and a
                // fourth click starts over.
                let clicks = gui.gestures.clicks;
                if clicks > 0 {
                    if clicks % 3 == 2 {
                        self.select_word(st);
                    } else if clicks % 3 == 0 {
                        st.borrow_mut().with_buf(|es, buf| {
                            es.key(buf, Motion::LineStart, false);
                            es.key(buf, Motion::LineEnd, true);
                        });
                    }
                }
                gui.set_pressed(ids.root);
            }
            Event::LongPress { .. } | Event::PointerDown(_)
                if is_long_press_or_right_click(event) =>
            {
                // No-op when already focused; otherwise selects all.
                gui.set_focused(ids.root, FocusReason::Tab);
                self.do_update(gui);
                self.show_menu(gui);
                return true;
            }
            Event::PointerDown(_) => return false,
            Event::PointerMove(p) if p.buttons.contains(Buttons::PRIMARY) => {
                let x = self.text_x(gui, p.pos);
                let mut s = st.borrow_mut();
                if p.id == PointerId::MOUSE {
                    s.with_buf(|es, buf| es.drag(buf, x));
                } else if s.state.has_selection() {
                    // Touch drag with a selection pans the text.
                    let dx = p.pos.x - s.prev_pos.x;
                    s.scroll_x -= dx;
                    drop(s);
                    gui.tree.set_dirty(ids.content, twig_core::Dirty::Bounds);
                    let mut s2 = st.borrow_mut();
                    s2.prev_pos = p.pos;
                    s2.raise(TextChange::Layout);
                    s2.show_last_char = false;
                    drop(s2);
                    self.do_update(gui);
                    return true;
                } else {
                    s.with_buf(|es, buf| es.click(buf, x));
                }
                s.prev_pos = p.pos;
            }
            Event::PointerMove(_) => return false,
            Event::PointerUp(_) => {
                let (has_sel, clicks) = {
                    let s = st.borrow();
                    (s.state.has_selection(), gui.gestures.clicks)
                };
                if has_sel {
                    if clicks == 1 {
                        let prev = st.borrow().prev_pos;
                        let x = self.text_x(gui, prev);
                        st.borrow_mut().with_buf(|es, buf| es.click(buf, x));
                    } else {
                        self.do_update(gui);
                        self.show_menu(gui);
                        return true;
                    }
                }
            }
            Event::KeyDown(k) => {
                let read_only = st.borrow().is_read_only();
                if st.borrow().clear_focus_on_done
                    && matches!(k.key, KeyCode::Escape | KeyCode::Enter)
                {
                    let fw = gui
                        .tree
                        .window_of(ids.root)
                        .and_then(|w| gui.tree.window_state(w).focused);
                    if let Some(parent) = fw.and_then(|f| gui.tree.parent_widget(f)) {
                        gui.set_focused(parent, FocusReason::None);
                    }
                }
                match k.key {
                    KeyCode::Escape | KeyCode::Enter | KeyCode::Tab => return false,
                    KeyCode::Delete | KeyCode::Backspace if read_only => return true,
                    KeyCode::Char('v') if k.mods.ctrl => self.do_paste(gui, st),
                    KeyCode::Char('c') if k.mods.ctrl => {
                        self.do_copy(gui, st, false);
                    }
                    KeyCode::Char('x') if k.mods.ctrl => self.do_cut(gui, st, false),
                    KeyCode::Char('a') if k.mods.ctrl => {
                        st.borrow_mut().with_buf(|es, buf| es.select_all(buf));
                    }
                    key => {
                        let motion = match key {
                            KeyCode::Left if k.mods.ctrl => Some(Motion::WordLeft),
                            KeyCode::Right if k.mods.ctrl => Some(Motion::WordRight),
                            KeyCode::Left => Some(Motion::Left),
                            KeyCode::Right => Some(Motion::Right),
                            KeyCode::Home => Some(Motion::LineStart),
                            KeyCode::End => Some(Motion::LineEnd),
                            KeyCode::Backspace => Some(Motion::Backspace),
                            KeyCode::Delete => Some(Motion::Delete),
                            _ => None,
                        };
                        match motion {
                            Some(m) => st
                                .borrow_mut()
                                .with_buf(|es, buf| es.key(buf, m, k.mods.shift)),
                            None => return false,
                        }
                    }
                }
            }
            Event::TextInput { text, .. } => {
                if st.borrow().is_read_only() {
                    return true;
                }
                let cleaned = clean_text(text);
                let mut s = st.borrow_mut();
                let (selmin, selmax) = s.state.selection();
                let room = (s.max_length + (selmax - selmin)).saturating_sub(s.text.len());
                for c in cleaned.chars().take(room) {
                    s.with_buf(|es, buf| es.insert_char(buf, c));
                }
                s.show_last_char = true;
            }
            Event::ImeUpdate {
                text,
                sel_start,
                sel_end,
            } => {
                let incoming: Vec<char> = text.chars().collect();
                let mut s = st.borrow_mut();
                if incoming != s.text {
                    // Common-prefix diff, applied through the engine so the
                    // edit behaves like any other.
                    let mut i = 0;
                    while i < incoming.len() && i < s.text.len() && incoming[i] == s.text[i] {
                        i += 1;
                    }
                    let tail: Vec<char> = incoming[i..].to_vec();
                    s.with_buf(|es, buf| {
                        es.select_start = i;
                        es.select_end = buf.len();
                        es.cursor = buf.len();
                        if !tail.is_empty() {
                            es.paste(buf, &tail);
                        } else {
                            es.cut(buf);
                        }
                    });
                }
                let n = incoming.len();
                s.state.select_start = (*sel_start).min(n);
                s.state.select_end = (*sel_end).min(n);
                s.state.cursor = s.state.select_end;
                s.text_changed = TextChange::Ime;
            }
            Event::FocusGained(reason) => {
                if *reason == FocusReason::Tab {
                    st.borrow_mut().with_buf(|es, buf| es.select_all(buf));
                }
                let read_only = st.borrow().is_read_only();
                if !read_only
                    && (gui.curr_input_widget() != Some(ids.root)
                        || gui.next_input_widget() != Some(ids.root))
                {
                    let (text, lo, hi) = {
                        let s = st.borrow();
                        (s.text.iter().collect::<String>(), s.state.select_start, s.state.select_end)
                    };
                    gui.set_ime_text(&text, lo, hi);
                    gui.start_text_input(ids.root);
                }
                gui.set_visible(ids.cursor, true);
                gui.set_timer(BLINK_MS, ids.root, None);
                self.do_update(gui);
                return true;
            }
            Event::FocusLost { reason, to } => {
                if gui.tree.node(self.menu.root).is_visible() {
                    gui.close_menus(None, false);
                }
                if !st.borrow().is_read_only() && *reason != FocusReason::Window {
                    gui.stop_text_input();
                }
                gui.set_visible(ids.cursor, false);
                gui.remove_widget_timer(ids.root);
                if st.borrow().edit_mode == EditMode::PasswordShowLast {
                    st.borrow_mut().raise(TextChange::Set);
                }
                // Keep the selection when the whole window lost focus.
                if to.is_some() {
                    {
                        let mut s = st.borrow_mut();
                        let c = s.state.cursor;
                        s.state.select_start = c;
                        s.state.select_end = c;
                    }
                    self.do_update(gui);
                }
                gui.set_visible(ids.selstart_handle, false);
                gui.set_visible(ids.cursor_handle, false);
                return true;
            }
            Event::KeyboardHidden => {
                // Unfocus so tapping again re-shows the keyboard.
                let fw = gui
                    .tree
                    .window_of(ids.root)
                    .and_then(|w| gui.tree.window_state(w).focused);
                if let Some(parent) = fw.and_then(|f| gui.tree.parent_widget(f)) {
                    gui.set_focused(parent, FocusReason::None);
                }
            }
            _ => return false,
        }

        // Show the cursor on presses and whenever it moved; keep it solid
        // while a selection exists so shift-motion feedback is visible.
        let cursor_moved = {
            let s = st.borrow();
            s.state.cursor != s.cursor_pos && s.text_changed != TextChange::Set
        };
        if matches!(event, Event::PointerDown(_)) || cursor_moved {
            gui.tree.set_attr(ids.cursor, "opacity", "1");
            gui.set_timer(BLINK_MS, ids.root, None);
        }

        self.do_update(gui);
        true
    }

    fn cursor_handle_event(&self, cx: &mut EventCx<'_>, st: &SharedState, event: &Event) -> bool {
        let gui = &mut *cx.gui;
        match event {
            Event::PointerDown(p) if p.buttons.contains(Buttons::PRIMARY) => {
                gui.set_pressed(self.ids.cursor_handle);
                gui.tree.set_attr(self.ids.cursor, "opacity", "1");
                let mut s = st.borrow_mut();
                s.handle_had_selection = s.state.has_selection();
            }
            Event::PointerMove(p) if gui.pressed_widget == Some(self.ids.cursor_handle) => {
                let x = self.text_x(gui, p.pos);
                {
                    let mut s = st.borrow_mut();
                    if s.handle_had_selection {
                        s.with_buf(|es, buf| es.drag(buf, x));
                    } else {
                        s.with_buf(|es, buf| es.click(buf, x));
                    }
                }
                self.do_update(gui);
            }
            Event::PointerUp(_) | Event::OutsidePressed { .. } => {
                if st.borrow().state.has_selection() {
                    self.show_menu(gui);
                }
            }
            _ => return false,
        }
        true
    }

    fn selstart_handle_event(&self, cx: &mut EventCx<'_>, st: &SharedState, event: &Event) -> bool {
        let gui = &mut *cx.gui;
        match event {
            Event::PointerDown(p) if p.buttons.contains(Buttons::PRIMARY) => {
                gui.set_pressed(self.ids.selstart_handle);
            }
            Event::PointerMove(p) if gui.pressed_widget == Some(self.ids.selstart_handle) => {
                let x = self.text_x(gui, p.pos);
                {
                    // Move the start bound; the engine's click would collapse
                    // the selection, so pin the end bound back afterward.
                    let mut s = st.borrow_mut();
                    let end = s.sel_end;
                    s.with_buf(|es, buf| {
                        es.click(buf, x);
                        es.select_end = end;
                        es.cursor = end;
                    });
                }
                self.do_update(gui);
            }
            Event::PointerUp(_) | Event::OutsidePressed { .. } => {
                if st.borrow().state.has_selection() {
                    self.show_menu(gui);
                }
            }
            _ => return false,
        }
        true
    }

    // ---- the single deferred update pass --------------------------------

    /// Resolve all accumulated changes: display text, glyph cache,
    /// selection geometry, handles, IME, and the commit notification.
    /// Called exactly once per top-level event.
    fn do_update(&self, gui: &mut Gui) {
        let st = self.state(gui);
        let ids = self.ids;

        // Rebuild the display text when content or a live selection changed.
        let (changed, sel_changed, display): (TextChange, bool, Vec<char>) = {
            let mut s = st.borrow_mut();
            let sel_changed =
                s.sel_start != s.state.select_start || s.sel_end != s.state.select_end;
            let had_or_has = s.sel_start != s.sel_end || s.state.has_selection();
            // Keep the selection fields valid even when collapsed.
            if !s.state.has_selection() {
                let c = s.state.cursor;
                s.state.select_start = c;
                s.state.select_end = c;
            }
            let display = s.display_text();
            (s.text_changed, sel_changed && had_or_has, display)
        };

        if changed > TextChange::Layout || sel_changed {
            let text: String = display.iter().collect();
            gui.tree.set_text(ids.text_node, &text);
            gui.set_visible(ids.empty_text, display.is_empty());
        }

        if changed > TextChange::None {
            let glyphs = gui.text_measure.glyph_positions(&display, FONT_SIZE);
            let extent = glyphs.last().map(|g| g.right).unwrap_or(0.0);
            gui.tree
                .set_shape(ids.text_node, Rect::wh(extent.max(1.0), LINE_H));
            st.borrow_mut().glyph_pos = glyphs;
        }

        {
            let mut s = st.borrow_mut();
            s.sel_start = s.state.select_start;
            s.sel_end = s.state.select_end;
        }

        // One glyph per character, always; a mismatch means the metrics
        // provider mangled the text, which is unrecoverable.
        {
            let s = st.borrow();
            assert!(
                s.glyph_pos.len() == s.text.len(),
                "glyph count does not match character count"
            );
        }

        let (sel_rect, cursor_x, width, cursor_moved) = {
            let mut s = st.borrow_mut();
            let (selmin, selmax) = s.state.selection();
            let right = |s: &TextEditState, i: usize| -> f32 {
                if i == 0 { 0.0 } else { s.glyph_pos[i - 1].right }
            };
            let left = |s: &TextEditState, i: usize| -> f32 {
                s.glyph_pos
                    .get(i)
                    .map(|g| g.left)
                    .unwrap_or_else(|| right(s, i))
            };
            s.max_scroll_x = s.glyph_pos.last().map(|g| g.right).unwrap_or(0.0);
            let sel_rect = if selmin != selmax {
                Rect::ltrb(right(&s, selmin), 0.0, right(&s, selmax), LINE_H)
            } else {
                Rect::wh(0.0, LINE_H)
            };
            let c = s.state.cursor;
            let cursor_x = (right(&s, c) + left(&s, c)) / 2.0;
            let cursor_moved = c != s.cursor_pos && s.text_changed != TextChange::Set;
            (sel_rect, cursor_x, s.scroll_x_offset, cursor_moved)
        };

        if changed > TextChange::None || sel_changed {
            gui.tree.set_shape(ids.sel_bg, sel_rect);
        }
        gui.tree
            .set_layout_transform(ids.cursor, Transform2D::translating(cursor_x, 0.0));

        // Selection handles track the visible selection edges.
        {
            let (selmin, selmax, scroll_x) = {
                let s = st.borrow();
                let (lo, hi) = s.state.selection();
                (lo, hi, s.scroll_x - s.scroll_x_offset)
            };
            let has_sel = selmin != selmax;
            let start_x = sel_rect.left - scroll_x;
            let end_x = cursor_x - scroll_x;
            let dragging_start = gui.pressed_widget == Some(ids.selstart_handle);
            let dragging_end = gui.pressed_widget == Some(ids.cursor_handle);
            if !dragging_start {
                let on_screen = start_x >= 0.0 && start_x <= width;
                gui.set_visible(ids.selstart_handle, (has_sel || dragging_end) && on_screen);
            }
            gui.tree
                .set_attr(ids.selstart_handle, "left", &format!("{}", start_x - 2.0));
            if has_sel {
                gui.set_visible(ids.cursor_handle, end_x >= 0.0 && end_x <= width);
            } else if changed > TextChange::Layout {
                gui.set_visible(ids.cursor_handle, false);
            } else if cursor_moved && !dragging_end {
                gui.set_visible(ids.cursor_handle, true);
            }
            gui.tree
                .set_attr(ids.cursor_handle, "left", &format!("{}", end_x - 2.0));
        }

        // Closing the menu after the selection collapsed (e.g. a cut).
        if sel_changed
            && !st.borrow().state.has_selection()
            && gui.tree.node(self.menu.root).is_visible()
        {
            gui.close_menus(None, false);
        }

        // Push state to the IME while it is attached to this editor.
        if gui.curr_input_widget() == Some(ids.root)
            && gui.next_input_widget() == Some(ids.root)
            && (changed > TextChange::Layout || sel_changed)
            && changed < TextChange::Ime
        {
            let (text, lo, hi) = {
                let s = st.borrow();
                (
                    s.text.iter().collect::<String>(),
                    s.state.select_start,
                    s.state.select_end,
                )
            };
            gui.set_ime_text(&text, lo, hi);
        }

        // The commit contract: only user-originated edits notify.
        let commit = {
            let mut s = st.borrow_mut();
            let commit = if s.text_changed >= TextChange::User && s.text_changed != TextChange::Ime
            {
                s.on_changed.clone()
            } else {
                None
            };
            if s.text_changed == TextChange::Ime && s.on_changed.is_some() {
                debug!("ime update deferred; commit on focus change");
            }
            s.text_changed = TextChange::None;
            s.cursor_pos = s.state.cursor;
            commit
        };
        if let Some(cb) = commit {
            let text = self.text(gui);
            cb(gui, &text);
        }
    }
}
