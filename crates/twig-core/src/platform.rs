//! Platform backend boundary.
//!
//! The windowing/event backend maps native events into the canonical
//! [`Event`](crate::event::Event) representation and hands them to
//! [`Gui::dispatch`](crate::gui::Gui::dispatch). This module defines the
//! small set of services the core needs in the other direction, plus the
//! thread-safe queue foreign threads use to inject events.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use geom::Rect;

use crate::event::Event;

/// Services the core requires from the platform layer.
pub trait Platform {
    /// Replace the clipboard contents.
    fn set_clipboard_text(&mut self, text: &str);
    /// Current clipboard contents, if it holds text.
    fn clipboard_text(&self) -> Option<String>;
    /// True if the clipboard currently holds text.
    fn has_clipboard_text(&self) -> bool {
        self.clipboard_text().is_some()
    }
    /// Hint the on-screen rect of the active text input, so the platform can
    /// scroll it clear of the soft keyboard.
    fn set_text_input_rect(&mut self, rect: Rect);
    /// Begin platform text input (shows the soft keyboard on mobile).
    fn start_text_input(&mut self);
    /// End platform text input.
    fn stop_text_input(&mut self);
    /// True while platform text input is active.
    fn is_text_input_active(&self) -> bool;
    /// Push the current editor contents and selection to the IME.
    fn set_ime_text(&mut self, _text: &str, _sel_start: usize, _sel_end: usize) {}
}

/// In-memory platform used by tests and headless runs.
#[derive(Default)]
pub struct HeadlessPlatform {
    clipboard: Option<String>,
    text_input_active: bool,
    /// Last rect passed to `set_text_input_rect`.
    pub text_input_rect: Option<Rect>,
    /// Last IME text pushed, with its selection.
    pub ime_text: Option<(String, usize, usize)>,
}

impl Platform for HeadlessPlatform {
    fn set_clipboard_text(&mut self, text: &str) {
        self.clipboard = Some(text.to_string());
    }

    fn clipboard_text(&self) -> Option<String> {
        self.clipboard.clone()
    }

    fn set_text_input_rect(&mut self, rect: Rect) {
        self.text_input_rect = Some(rect);
    }

    fn start_text_input(&mut self) {
        self.text_input_active = true;
    }

    fn stop_text_input(&mut self) {
        self.text_input_active = false;
    }

    fn is_text_input_active(&self) -> bool {
        self.text_input_active
    }

    fn set_ime_text(&mut self, text: &str, sel_start: usize, sel_end: usize) {
        self.ime_text = Some((text.to_string(), sel_start, sel_end));
    }
}

/// Thread-safe event queue with an attached wake callback.
///
/// Producers on foreign threads (the timer waker, async completions) push
/// events here and wake the blocked event wait; they never call dispatch
/// directly. The UI thread drains the queue between native events.
#[derive(Clone)]
pub struct EventQueue {
    inner: Arc<Mutex<VecDeque<Event>>>,
    waker: Arc<dyn Fn() + Send + Sync>,
}

impl EventQueue {
    /// Create a queue that calls `waker` after each push.
    pub fn new(waker: Arc<dyn Fn() + Send + Sync>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
            waker,
        }
    }

    /// Create a queue with no wake side effect.
    pub fn unwakeable() -> Self {
        Self::new(Arc::new(|| {}))
    }

    /// Push an event and wake the event wait.
    pub fn push(&self, event: Event) {
        self.inner.lock().expect("event queue poisoned").push_back(event);
        (self.waker)();
    }

    /// Pop the next queued event, if any.
    pub fn pop(&self) -> Option<Event> {
        self.inner.lock().expect("event queue poisoned").pop_front()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn queue_is_fifo_and_wakes() {
        let wakes = Arc::new(AtomicUsize::new(0));
        let counter = wakes.clone();
        let q = EventQueue::new(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        q.push(Event::TimerTick);
        q.push(Event::KeyboardHidden);
        assert_eq!(wakes.load(Ordering::SeqCst), 2);
        assert_eq!(q.pop(), Some(Event::TimerTick));
        assert_eq!(q.pop(), Some(Event::KeyboardHidden));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn headless_clipboard() {
        let mut p = HeadlessPlatform::default();
        assert!(!p.has_clipboard_text());
        p.set_clipboard_text("hi");
        assert_eq!(p.clipboard_text().as_deref(), Some("hi"));
        assert!(p.has_clipboard_text());
    }
}
