//! Single-line text-editing state machine.
//!
//! Operates on a character buffer through the [`EditBuffer`] trait: the
//! cursor and selection live here, the text and glyph metrics live with the
//! caller. One character in the buffer corresponds to one visual glyph, so
//! the caller feeds it UTF-32 (`char`) positions, never byte offsets.

/// Buffer operations the state machine drives. Horizontal metrics answer
/// click/drag hit-testing.
pub trait EditBuffer {
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn char_at(&self, i: usize) -> char;
    /// Width of the glyph at `i`.
    fn char_width(&self, i: usize) -> f32;
    /// Insert `text` at `pos`. Returns false when rejected (e.g. a length
    /// limit); the state machine leaves the cursor in place.
    fn insert(&mut self, pos: usize, text: &[char]) -> bool;
    fn delete(&mut self, pos: usize, n: usize);
}

/// Cursor motions and edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Left,
    Right,
    WordLeft,
    WordRight,
    LineStart,
    LineEnd,
    Backspace,
    Delete,
}

/// Cursor plus selection over an external buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditState {
    pub cursor: usize,
    /// Selection anchor; equal to `select_end` when nothing is selected.
    pub select_start: usize,
    /// Selection lead; tracks the cursor while extending.
    pub select_end: usize,
}

impl EditState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_selection(&self) -> bool {
        self.select_start != self.select_end
    }

    /// Selection as an ascending range.
    pub fn selection(&self) -> (usize, usize) {
        (
            self.select_start.min(self.select_end),
            self.select_start.max(self.select_end),
        )
    }

    /// Clamp cursor and selection into the buffer.
    pub fn clamp(&mut self, buf: &impl EditBuffer) {
        let n = buf.len();
        self.cursor = self.cursor.min(n);
        self.select_start = self.select_start.min(n);
        self.select_end = self.select_end.min(n);
    }

    /// Char index for an x offset from the line start: positions within the
    /// left half of a glyph map before it, within the right half after it.
    pub fn locate(buf: &impl EditBuffer, x: f32) -> usize {
        if x < 0.0 {
            return 0;
        }
        let mut edge = 0.0;
        for i in 0..buf.len() {
            let w = buf.char_width(i);
            if x < edge + w / 2.0 {
                return i;
            }
            edge += w;
        }
        buf.len()
    }

    /// Place the cursor at `x`, collapsing any selection.
    pub fn click(&mut self, buf: &impl EditBuffer, x: f32) {
        self.cursor = Self::locate(buf, x);
        self.select_start = self.cursor;
        self.select_end = self.cursor;
    }

    /// Extend the selection toward `x`, anchoring at the cursor when no
    /// selection exists yet.
    pub fn drag(&mut self, buf: &impl EditBuffer, x: f32) {
        if !self.has_selection() {
            self.select_start = self.cursor;
        }
        self.cursor = Self::locate(buf, x);
        self.select_end = self.cursor;
    }

    fn delete_selection(&mut self, buf: &mut impl EditBuffer) {
        let (lo, hi) = self.selection();
        buf.delete(lo, hi - lo);
        self.cursor = lo;
        self.select_start = lo;
        self.select_end = lo;
    }

    /// Prepare selection state for a shifted motion.
    fn prep_extend(&mut self) {
        if !self.has_selection() {
            self.select_start = self.cursor;
            self.select_end = self.cursor;
        }
    }

    fn word_left(buf: &impl EditBuffer, mut i: usize) -> usize {
        while i > 0 && buf.char_at(i - 1).is_whitespace() {
            i -= 1;
        }
        while i > 0 && !buf.char_at(i - 1).is_whitespace() {
            i -= 1;
        }
        i
    }

    fn word_right(buf: &impl EditBuffer, mut i: usize) -> usize {
        let n = buf.len();
        while i < n && !buf.char_at(i).is_whitespace() {
            i += 1;
        }
        while i < n && buf.char_at(i).is_whitespace() {
            i += 1;
        }
        i
    }

    /// Apply a motion or deleting edit. `shift` extends the selection for
    /// pure motions.
    pub fn key(&mut self, buf: &mut impl EditBuffer, motion: Motion, shift: bool) {
        self.clamp(buf);
        match motion {
            Motion::Backspace => {
                if self.has_selection() {
                    self.delete_selection(buf);
                } else if self.cursor > 0 {
                    buf.delete(self.cursor - 1, 1);
                    self.cursor -= 1;
                    self.select_start = self.cursor;
                    self.select_end = self.cursor;
                }
                return;
            }
            Motion::Delete => {
                if self.has_selection() {
                    self.delete_selection(buf);
                } else if self.cursor < buf.len() {
                    buf.delete(self.cursor, 1);
                }
                return;
            }
            _ => {}
        }

        let dest = match motion {
            Motion::Left => {
                if self.has_selection() && !shift {
                    self.selection().0
                } else {
                    self.cursor.saturating_sub(1)
                }
            }
            Motion::Right => {
                if self.has_selection() && !shift {
                    self.selection().1
                } else {
                    (self.cursor + 1).min(buf.len())
                }
            }
            Motion::WordLeft => Self::word_left(buf, self.cursor),
            Motion::WordRight => Self::word_right(buf, self.cursor),
            Motion::LineStart => 0,
            Motion::LineEnd => buf.len(),
            Motion::Backspace | Motion::Delete => unreachable!(),
        };
        if shift {
            self.prep_extend();
            self.cursor = dest;
            self.select_end = dest;
        } else {
            self.cursor = dest;
            self.select_start = dest;
            self.select_end = dest;
        }
    }

    /// Insert one typed character, replacing any selection.
    pub fn insert_char(&mut self, buf: &mut impl EditBuffer, c: char) {
        self.clamp(buf);
        if self.has_selection() {
            self.delete_selection(buf);
        }
        if buf.insert(self.cursor, &[c]) {
            self.cursor += 1;
            self.select_start = self.cursor;
            self.select_end = self.cursor;
        }
    }

    /// Paste text, replacing any selection. Returns whether the buffer took
    /// the insertion.
    pub fn paste(&mut self, buf: &mut impl EditBuffer, text: &[char]) -> bool {
        self.clamp(buf);
        if self.has_selection() {
            self.delete_selection(buf);
        }
        if buf.insert(self.cursor, text) {
            self.cursor += text.len();
            self.select_start = self.cursor;
            self.select_end = self.cursor;
            true
        } else {
            false
        }
    }

    /// Delete the selected range (after the caller copied it). Returns
    /// false with no selection.
    pub fn cut(&mut self, buf: &mut impl EditBuffer) -> bool {
        if !self.has_selection() {
            return false;
        }
        self.delete_selection(buf);
        true
    }

    /// Select the whole line.
    pub fn select_all(&mut self, buf: &impl EditBuffer) {
        self.select_start = 0;
        self.select_end = buf.len();
        self.cursor = buf.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fixed-width test buffer.
    struct Buf(Vec<char>);

    impl Buf {
        fn new(s: &str) -> Self {
            Self(s.chars().collect())
        }

        fn text(&self) -> String {
            self.0.iter().collect()
        }
    }

    impl EditBuffer for Buf {
        fn len(&self) -> usize {
            self.0.len()
        }
        fn char_at(&self, i: usize) -> char {
            self.0[i]
        }
        fn char_width(&self, _i: usize) -> f32 {
            10.0
        }
        fn insert(&mut self, pos: usize, text: &[char]) -> bool {
            self.0.splice(pos..pos, text.iter().copied());
            true
        }
        fn delete(&mut self, pos: usize, n: usize) {
            self.0.drain(pos..pos + n);
        }
    }

    #[test]
    fn click_maps_half_glyph_boundaries() {
        let buf = Buf::new("abcd");
        assert_eq!(EditState::locate(&buf, -5.0), 0);
        assert_eq!(EditState::locate(&buf, 4.0), 0);
        assert_eq!(EditState::locate(&buf, 6.0), 1);
        assert_eq!(EditState::locate(&buf, 24.0), 2);
        assert_eq!(EditState::locate(&buf, 26.0), 3);
        assert_eq!(EditState::locate(&buf, 500.0), 4);
    }

    #[test]
    fn drag_builds_a_selection_anchored_at_the_click() {
        let buf = Buf::new("hello world");
        let mut st = EditState::new();
        st.click(&buf, 0.0);
        st.drag(&buf, 52.0);
        assert_eq!(st.selection(), (0, 5));
        // Dragging back across the anchor inverts the range.
        st.drag(&buf, 0.0);
        assert_eq!(st.selection(), (0, 0));
    }

    #[test]
    fn typed_char_replaces_selection() {
        let mut buf = Buf::new("hello");
        let mut st = EditState::new();
        st.click(&buf, 0.0);
        st.drag(&buf, 500.0);
        st.insert_char(&mut buf, 'x');
        assert_eq!(buf.text(), "x");
        assert_eq!(st.cursor, 1);
        assert!(!st.has_selection());
    }

    #[test]
    fn backspace_and_delete() {
        let mut buf = Buf::new("abc");
        let mut st = EditState::new();
        st.key(&mut buf, Motion::LineEnd, false);
        st.key(&mut buf, Motion::Backspace, false);
        assert_eq!(buf.text(), "ab");
        assert_eq!(st.cursor, 2);

        st.key(&mut buf, Motion::LineStart, false);
        st.key(&mut buf, Motion::Delete, false);
        assert_eq!(buf.text(), "b");
        assert_eq!(st.cursor, 0);
    }

    #[test]
    fn plain_motion_collapses_selection_to_its_edge() {
        let mut buf = Buf::new("abcdef");
        let mut st = EditState::new();
        st.click(&buf, 12.0);
        st.drag(&buf, 42.0);
        assert_eq!(st.selection(), (1, 4));
        st.key(&mut buf, Motion::Left, false);
        assert_eq!(st.cursor, 1);
        assert!(!st.has_selection());

        st.drag(&mut buf, 42.0);
        st.key(&mut buf, Motion::Right, false);
        assert_eq!(st.cursor, 4);
        assert!(!st.has_selection());
    }

    #[test]
    fn shifted_motion_extends() {
        let mut buf = Buf::new("abcdef");
        let mut st = EditState::new();
        st.click(&buf, 0.0);
        st.key(&mut buf, Motion::Right, true);
        st.key(&mut buf, Motion::Right, true);
        assert_eq!(st.selection(), (0, 2));
        st.key(&mut buf, Motion::LineEnd, true);
        assert_eq!(st.selection(), (0, 6));
    }

    #[test]
    fn word_motions_skip_runs() {
        let mut buf = Buf::new("foo  bar baz");
        let mut st = EditState::new();
        st.key(&mut buf, Motion::WordRight, false);
        assert_eq!(st.cursor, 5);
        st.key(&mut buf, Motion::WordRight, false);
        assert_eq!(st.cursor, 9);
        st.key(&mut buf, Motion::WordLeft, false);
        assert_eq!(st.cursor, 5);
        st.key(&mut buf, Motion::WordLeft, false);
        assert_eq!(st.cursor, 0);
    }

    #[test]
    fn paste_over_selection_is_one_replace() {
        let mut buf = Buf::new("hello world");
        let mut st = EditState::new();
        st.click(&buf, 0.0);
        st.drag(&buf, 52.0);
        let ins: Vec<char> = "goodbye".chars().collect();
        assert!(st.paste(&mut buf, &ins));
        assert_eq!(buf.text(), "goodbye world");
        assert_eq!(st.cursor, 7);
    }

    #[test]
    fn cut_requires_selection() {
        let mut buf = Buf::new("abc");
        let mut st = EditState::new();
        assert!(!st.cut(&mut buf));
        st.select_all(&buf);
        assert!(st.cut(&mut buf));
        assert_eq!(buf.text(), "");
        assert_eq!(st.cursor, 0);
    }

    #[test]
    fn state_clamps_after_external_shrink() {
        let mut buf = Buf::new("abcdef");
        let mut st = EditState::new();
        st.select_all(&buf);
        buf.delete(2, 4);
        st.key(&mut buf, Motion::Right, false);
        assert!(st.cursor <= buf.len());
    }
}
