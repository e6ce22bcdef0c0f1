//! TextEdit behavior through the dispatch pipeline: round-trips, the glyph
//! invariant, the commit contract, password masking, selection handles, and
//! the context menu.

use geom::{Point, Rect};
use proptest::prelude::*;
use twig_core::{
    Buttons, Event, FocusReason, Gui, KeyCode, KeyEvent, Mods, NodeId, PointerEvent, PointerId,
    event,
};
use twig_widgets::textedit::{EditMode, TextEdit};

fn fixture() -> (Gui, NodeId, TextEdit) {
    let mut gui = Gui::headless();
    let win = gui.new_window();
    gui.tree.set_attr(win, "layout", "box");
    let te = TextEdit::new(&mut gui);
    gui.tree.set_attr(te.root, "box-anchor", "left top");
    gui.tree.add_child(win, te.root);
    gui.set_win_bounds(win, Rect::wh(200.0, 50.0));
    gui.show_window(win, None, false);
    gui.set_focused(te.root, FocusReason::None);
    (gui, win, te)
}

fn key(gui: &mut Gui, code: KeyCode, mods: Mods) {
    gui.dispatch(&Event::KeyDown(KeyEvent::new(code, mods, 0)));
}

fn type_text(gui: &mut Gui, s: &str) {
    gui.dispatch(&Event::TextInput {
        text: s.to_string(),
        t: 0,
    });
}

#[test]
fn set_text_round_trips_cleaned_input() {
    let (mut gui, win, te) = fixture();
    for (input, expected) in [
        ("hello", "hello"),
        ("tab\there", "tab here"),
        ("line\r\nbreak", "line  break"),
        ("über • ☃", "über • ☃"),
        ("", ""),
    ] {
        te.set_text(&mut gui, input);
        assert_eq!(te.text(&gui), expected, "{input:?}");
        // Selection collapses to the start so the head of the text shows.
        assert_eq!(te.selection(&gui), (0, 0));
        assert_eq!(te.cursor(&gui), 0);
        assert_eq!(te.glyph_count(&gui), te.buffer_len(&gui));
    }
    gui.close_window(win);
}

#[test]
fn typing_inserts_at_the_cursor() {
    let (mut gui, win, te) = fixture();
    type_text(&mut gui, "ab");
    key(&mut gui, KeyCode::Left, event::EMPTY);
    type_text(&mut gui, "X");
    assert_eq!(te.text(&gui), "aXb");
    assert_eq!(te.cursor(&gui), 2);
    gui.close_window(win);
}

#[test]
fn select_all_then_type_replaces_everything() {
    let (mut gui, win, te) = fixture();
    te.set_text(&mut gui, "old contents");
    key(&mut gui, KeyCode::Char('a'), event::CTRL);
    assert_eq!(te.selection(&gui), (0, 12));
    type_text(&mut gui, "n");
    assert_eq!(te.text(&gui), "n");
    gui.close_window(win);
}

#[test]
fn commit_fires_only_for_user_edits() {
    let (mut gui, win, te) = fixture();
    let commits = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let log = commits.clone();
    te.on_changed(&mut gui, move |_gui, text| {
        log.borrow_mut().push(text.to_string());
    });

    // Programmatic set: no commit.
    te.set_text(&mut gui, "seed");
    assert!(commits.borrow().is_empty());

    // User edit: exactly one commit per event, even though the engine ran a
    // delete plus an insert.
    key(&mut gui, KeyCode::Char('a'), event::CTRL);
    type_text(&mut gui, "x");
    assert_eq!(commits.borrow().as_slice(), &["x".to_string()]);

    key(&mut gui, KeyCode::Backspace, event::EMPTY);
    assert_eq!(commits.borrow().len(), 2);

    // IME composition updates do not commit.
    gui.dispatch(&Event::ImeUpdate {
        text: "composing".into(),
        sel_start: 9,
        sel_end: 9,
    });
    assert_eq!(commits.borrow().len(), 2);
    assert_eq!(te.text(&gui), "composing");

    gui.close_window(win);
}

#[test]
fn clipboard_cut_copy_paste() {
    let (mut gui, win, te) = fixture();
    te.set_text(&mut gui, "hello world");
    key(&mut gui, KeyCode::Char('a'), event::CTRL);
    key(&mut gui, KeyCode::Char('c'), event::CTRL);
    assert_eq!(gui.platform.clipboard_text().as_deref(), Some("hello world"));

    key(&mut gui, KeyCode::Char('x'), event::CTRL);
    assert_eq!(te.text(&gui), "");

    key(&mut gui, KeyCode::Char('v'), event::CTRL);
    assert_eq!(te.text(&gui), "hello world");
    assert_eq!(te.glyph_count(&gui), te.buffer_len(&gui));
    gui.close_window(win);
}

#[test]
fn paste_respects_max_length() {
    let (mut gui, win, te) = fixture();
    te.set_max_length(&mut gui, 5);
    gui.platform.set_clipboard_text("overflowing");
    key(&mut gui, KeyCode::Char('v'), event::CTRL);
    assert_eq!(te.text(&gui), "overf");

    // Replacing a selection frees its room.
    key(&mut gui, KeyCode::Char('a'), event::CTRL);
    key(&mut gui, KeyCode::Char('v'), event::CTRL);
    assert_eq!(te.text(&gui), "overf");
    gui.close_window(win);
}

#[test]
fn read_only_blocks_edits_but_allows_copy() {
    let (mut gui, win, te) = fixture();
    te.set_text(&mut gui, "locked");
    te.set_edit_mode(&mut gui, EditMode::ReadOnly);
    type_text(&mut gui, "x");
    key(&mut gui, KeyCode::Backspace, event::EMPTY);
    assert_eq!(te.text(&gui), "locked");

    key(&mut gui, KeyCode::Char('a'), event::CTRL);
    key(&mut gui, KeyCode::Char('c'), event::CTRL);
    assert_eq!(gui.platform.clipboard_text().as_deref(), Some("locked"));
    gui.close_window(win);
}

#[test]
fn password_mode_masks_display_only() {
    let (mut gui, win, te) = fixture();
    te.set_edit_mode(&mut gui, EditMode::Password);
    type_text(&mut gui, "secret");
    assert_eq!(te.text(&gui), "secret");
    assert_eq!(te.display_text(&gui), "••••••");

    te.set_edit_mode(&mut gui, EditMode::PasswordShowLast);
    type_text(&mut gui, "s");
    // The freshly typed character shows; the rest stays masked.
    assert_eq!(te.display_text(&gui), "••••••s");
    // Any other event hides it again.
    key(&mut gui, KeyCode::Left, event::EMPTY);
    assert_eq!(te.display_text(&gui), "•••••••");
    assert_eq!(te.text(&gui), "secrets");
    gui.close_window(win);
}

#[test]
fn dragging_the_start_handle_pins_the_end() {
    let (mut gui, win, te) = fixture();
    te.set_text(&mut gui, "hello world");
    te.select_all(&mut gui);
    assert_eq!(te.selection(&gui), (0, 11));

    let (_end_handle, start_handle) = te.handles();
    let advance = 7.0; // FixedAdvance at the editor font size.
    let down = PointerEvent::new(PointerId(3), Buttons::PRIMARY, Point::new(0.0, 5.0), 0);
    gui.deliver(start_handle, &Event::PointerDown(down));
    let to_char6 = PointerEvent::new(
        PointerId(3),
        Buttons::PRIMARY,
        Point::new(6.0 * advance + 1.0, 5.0),
        16,
    );
    gui.deliver(start_handle, &Event::PointerMove(to_char6));

    // The dragged bound moved; the opposite bound stayed fixed.
    assert_eq!(te.selection(&gui), (6, 11));
    assert_eq!(te.cursor(&gui), 11);
    gui.close_window(win);
}

#[test]
fn dragging_the_end_handle_pins_the_start() {
    let (mut gui, win, te) = fixture();
    te.set_text(&mut gui, "hello world");
    te.select_all(&mut gui);

    let (end_handle, _start_handle) = te.handles();
    let advance = 7.0;
    let down = PointerEvent::new(PointerId(3), Buttons::PRIMARY, Point::new(77.0, 5.0), 0);
    gui.deliver(end_handle, &Event::PointerDown(down));
    let to_char4 = PointerEvent::new(
        PointerId(3),
        Buttons::PRIMARY,
        Point::new(4.0 * advance + 1.0, 5.0),
        16,
    );
    gui.deliver(end_handle, &Event::PointerMove(to_char4));

    assert_eq!(te.selection(&gui), (0, 4));
    gui.close_window(win);
}

#[test]
fn context_menu_items_follow_state() {
    let (mut gui, win, te) = fixture();
    te.set_text(&mut gui, "abc");

    // No selection, empty clipboard: only select-all shows.
    te.show_menu(&mut gui);
    assert!(gui.tree.node(te.ctx_select_all.root).is_visible());
    assert!(!gui.tree.node(te.ctx_cut.root).is_visible());
    assert!(!gui.tree.node(te.ctx_copy.root).is_visible());
    assert!(!gui.tree.node(te.ctx_paste.root).is_visible());
    gui.close_menus(None, false);

    // Selection plus clipboard text: cut/copy/paste show instead.
    gui.platform.set_clipboard_text("clip");
    te.select_all(&mut gui);
    te.show_menu(&mut gui);
    assert!(!gui.tree.node(te.ctx_select_all.root).is_visible());
    assert!(gui.tree.node(te.ctx_cut.root).is_visible());
    assert!(gui.tree.node(te.ctx_copy.root).is_visible());
    assert!(gui.tree.node(te.ctx_paste.root).is_visible());
    gui.close_menus(None, false);

    // Read-only: no cut or paste.
    te.set_edit_mode(&mut gui, EditMode::ReadOnly);
    te.select_all(&mut gui);
    te.show_menu(&mut gui);
    assert!(!gui.tree.node(te.ctx_cut.root).is_visible());
    assert!(gui.tree.node(te.ctx_copy.root).is_visible());
    assert!(!gui.tree.node(te.ctx_paste.root).is_visible());
    gui.close_menus(None, false);

    gui.close_window(win);
}

#[test]
fn editor_participates_in_window_layout() {
    let (mut gui, win, te) = fixture();
    te.set_text(&mut gui, "measured");
    let mut painter = twig_core::tutils::RecordingPainter::new(200.0, 50.0);
    gui.layout_and_draw(&mut painter).unwrap();
    let b = gui.tree.bounds(te.root);
    assert!(b.is_valid());
    assert!(b.height() > 0.0, "{b:?}");

    // Editing after layout keeps the glyph table in sync.
    type_text(&mut gui, "!");
    gui.layout_and_draw(&mut painter).unwrap();
    assert_eq!(te.glyph_count(&gui), te.buffer_len(&gui));
    gui.close_window(win);
}

// Property: after any event sequence, the glyph table has exactly one entry
// per buffer character.

#[derive(Debug, Clone)]
enum Op {
    Type(String),
    SetText(String),
    Backspace,
    Delete,
    Left(bool),
    Right(bool),
    Home,
    End,
    SelectAll,
    Cut,
    Copy,
    Paste,
    ClickAt(u16),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let text = || proptest::string::string_regex("[a-zA-Z0-9 àöß☃]{0,8}").unwrap();
    prop_oneof![
        text().prop_map(Op::Type),
        text().prop_map(Op::SetText),
        Just(Op::Backspace),
        Just(Op::Delete),
        any::<bool>().prop_map(Op::Left),
        any::<bool>().prop_map(Op::Right),
        Just(Op::Home),
        Just(Op::End),
        Just(Op::SelectAll),
        Just(Op::Cut),
        Just(Op::Copy),
        Just(Op::Paste),
        (0u16..600).prop_map(Op::ClickAt),
    ]
}

fn apply(gui: &mut Gui, te: &TextEdit, op: &Op) {
    match op {
        Op::Type(s) => type_text(gui, s),
        Op::SetText(s) => te.set_text(gui, s),
        Op::Backspace => key(gui, KeyCode::Backspace, event::EMPTY),
        Op::Delete => key(gui, KeyCode::Delete, event::EMPTY),
        Op::Left(shift) => key(
            gui,
            KeyCode::Left,
            if *shift { event::SHIFT } else { event::EMPTY },
        ),
        Op::Right(shift) => key(
            gui,
            KeyCode::Right,
            if *shift { event::SHIFT } else { event::EMPTY },
        ),
        Op::Home => key(gui, KeyCode::Home, event::EMPTY),
        Op::End => key(gui, KeyCode::End, event::EMPTY),
        Op::SelectAll => key(gui, KeyCode::Char('a'), event::CTRL),
        Op::Cut => key(gui, KeyCode::Char('x'), event::CTRL),
        Op::Copy => key(gui, KeyCode::Char('c'), event::CTRL),
        Op::Paste => key(gui, KeyCode::Char('v'), event::CTRL),
        Op::ClickAt(x) => {
            let p = PointerEvent::new(
                PointerId::MOUSE,
                Buttons::PRIMARY,
                Point::new(*x as f32 / 4.0, 5.0),
                0,
            );
            gui.deliver(te.root, &Event::PointerDown(p));
            let up = PointerEvent::new(
                PointerId::MOUSE,
                Buttons::PRIMARY,
                Point::new(*x as f32 / 4.0, 5.0),
                40,
            );
            gui.deliver(te.root, &Event::PointerUp(up));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn glyph_table_matches_buffer_after_any_sequence(ops in prop::collection::vec(op_strategy(), 1..24)) {
        let (mut gui, win, te) = fixture();
        for op in &ops {
            apply(&mut gui, &te, op);
            prop_assert_eq!(te.glyph_count(&gui), te.buffer_len(&gui));
            let (lo, hi) = te.selection(&gui);
            prop_assert!(lo <= hi && hi <= te.buffer_len(&gui));
            prop_assert!(te.cursor(&gui) <= te.buffer_len(&gui));
        }
        gui.close_window(win);
    }
}
