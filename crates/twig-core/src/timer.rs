//! Timer subsystem.
//!
//! Timers live in a list kept sorted by deadline on the UI thread. A single
//! background thread knows only the earliest deadline: it blocks until that
//! deadline passes or the UI thread re-signals it (after any mutation of the
//! list), then posts an opaque [`Event::TimerTick`] through the thread-safe
//! queue and waits to be re-armed. Firing and all bookkeeping (advancing
//! periods, dropping one-shots, re-sorting) happen on the UI thread in
//! `Gui::process_timers`, so callbacks touch widget state without races.

use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::dom::NodeId;
use crate::event::Event;
use crate::gui::Gui;
use crate::platform::EventQueue;

/// Generation-free timer handle; removal with a stale id is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerId(u64);

/// Timer callback; returns the next period in ms, zero or negative to stop.
pub type TimerCallback = Box<dyn FnMut(&mut Gui) -> i64>;

/// One scheduled timer.
pub(crate) struct TimerEntry {
    pub(crate) id: TimerId,
    /// Period in ms. Not meaningful after a callback returns a new one.
    pub(crate) period_ms: i64,
    /// Absolute deadline in ms since the subsystem epoch.
    pub(crate) next_tick: u64,
    /// Owning widget; used to tear timers down with their subtree.
    pub(crate) widget: NodeId,
    /// Without a callback the tick is delivered to the widget's handler
    /// chain instead; a widget has at most one such default timer.
    pub(crate) callback: Option<TimerCallback>,
}

/// Deadline shared with the waker thread.
struct WakeState {
    /// Earliest deadline in epoch ms; None parks the thread.
    next_timeout: Option<u64>,
    shutdown: bool,
}

struct Shared {
    state: Mutex<WakeState>,
    cond: Condvar,
}

/// The timer list plus its waker thread.
pub struct Timers {
    entries: Vec<TimerEntry>,
    next_id: u64,
    epoch: Instant,
    queue: EventQueue,
    shared: Arc<Shared>,
    handle: Option<thread::JoinHandle<()>>,
    /// Entry currently executing in `process_timers`, so removal from
    /// inside a callback is honored instead of lost.
    firing: Option<(TimerId, NodeId)>,
    cancel_firing: bool,
}

impl Timers {
    pub(crate) fn new(queue: EventQueue) -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
            epoch: Instant::now(),
            queue,
            shared: Arc::new(Shared {
                state: Mutex::new(WakeState {
                    next_timeout: None,
                    shutdown: false,
                }),
                cond: Condvar::new(),
            }),
            handle: None,
            firing: None,
            cancel_firing: false,
        }
    }

    /// Milliseconds since the subsystem epoch.
    pub fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    pub(crate) fn set_timer(
        &mut self,
        period_ms: i64,
        widget: NodeId,
        callback: Option<TimerCallback>,
    ) -> TimerId {
        assert!(period_ms > 0, "timer period must be positive");
        self.ensure_thread();
        // A widget has one default timer: setting another replaces it.
        if callback.is_none() {
            self.remove_default_for(widget);
        }
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let entry = TimerEntry {
            id,
            period_ms,
            next_tick: self.now_ms() + period_ms as u64,
            widget,
            callback,
        };
        self.insert_sorted(entry);
        self.signal_deadline();
        id
    }

    /// Remove a timer by handle. Idempotent: removing an already-fired or
    /// unknown timer does nothing.
    pub(crate) fn remove(&mut self, id: TimerId) {
        if self.firing.is_some_and(|(fid, _)| fid == id) {
            self.cancel_firing = true;
        }
        self.entries.retain(|t| t.id != id);
    }

    /// Remove the default (callback-less) timer for a widget.
    pub(crate) fn remove_default_for(&mut self, widget: NodeId) {
        self.entries
            .retain(|t| !(t.widget == widget && t.callback.is_none()));
    }

    /// Remove every timer whose owner matches the predicate.
    pub(crate) fn remove_where(&mut self, mut owned: impl FnMut(NodeId) -> bool) {
        if self.firing.is_some_and(|(_, w)| owned(w)) {
            self.cancel_firing = true;
        }
        self.entries.retain(|t| !owned(t.widget));
    }

    pub(crate) fn insert_sorted(&mut self, entry: TimerEntry) {
        let at = self
            .entries
            .partition_point(|t| t.next_tick <= entry.next_tick);
        self.entries.insert(at, entry);
    }

    /// Pop the earliest timer if it is due at `now`.
    pub(crate) fn pop_due(&mut self, now: u64) -> Option<TimerEntry> {
        if self.entries.first().is_some_and(|t| t.next_tick <= now) {
            Some(self.entries.remove(0))
        } else {
            None
        }
    }

    pub(crate) fn begin_fire(&mut self, id: TimerId, widget: NodeId) {
        self.firing = Some((id, widget));
        self.cancel_firing = false;
    }

    /// True if the firing timer was removed from inside its own callback.
    pub(crate) fn end_fire(&mut self) -> bool {
        self.firing = None;
        std::mem::take(&mut self.cancel_firing)
    }

    /// Push the earliest deadline to the waker thread. Called after every
    /// list mutation on the UI thread.
    pub(crate) fn signal_deadline(&mut self) {
        let mut st = self.shared.state.lock().expect("timer state poisoned");
        st.next_timeout = self.entries.first().map(|t| t.next_tick);
        self.shared.cond.notify_one();
    }

    fn ensure_thread(&mut self) {
        if self.handle.is_some() {
            return;
        }
        let shared = self.shared.clone();
        let queue = self.queue.clone();
        let epoch = self.epoch;
        let handle = thread::Builder::new()
            .name("twig-timer".into())
            .spawn(move || waker_main(&shared, &queue, epoch))
            .expect("failed to spawn timer thread");
        self.handle = Some(handle);
    }

    #[cfg(test)]
    fn deadlines(&self) -> Vec<u64> {
        self.entries.iter().map(|t| t.next_tick).collect()
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            {
                let mut st = self.shared.state.lock().expect("timer state poisoned");
                st.shutdown = true;
            }
            self.shared.cond.notify_one();
            let _ = handle.join();
        }
    }
}

/// Waker thread body: wait for the earliest deadline, post a tick, wait to
/// be re-armed. Performs no widget access.
fn waker_main(shared: &Shared, queue: &EventQueue, epoch: Instant) {
    let mut st = shared.state.lock().expect("timer state poisoned");
    loop {
        if st.shutdown {
            return;
        }
        match st.next_timeout {
            None => {
                st = shared.cond.wait(st).expect("timer state poisoned");
            }
            Some(deadline) => {
                let now = epoch.elapsed().as_millis() as u64;
                if now >= deadline {
                    // Disarm until process_timers re-signals the next
                    // deadline, then notify the UI thread.
                    st.next_timeout = None;
                    drop(st);
                    queue.push(Event::TimerTick);
                    st = shared.state.lock().expect("timer state poisoned");
                } else {
                    let wait = Duration::from_millis(deadline - now);
                    let (guard, _) = shared
                        .cond
                        .wait_timeout(st, wait)
                        .expect("timer state poisoned");
                    st = guard;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::dom::{NodeKind, Tree};
    use crate::platform::EventQueue;

    use super::*;

    fn test_widget() -> (Tree, NodeId) {
        let mut tree = Tree::new();
        let id = tree.new_node(NodeKind::Group);
        (tree, id)
    }

    #[test]
    fn list_stays_sorted() {
        let (_tree, w) = test_widget();
        let mut timers = Timers::new(EventQueue::unwakeable());
        timers.set_timer(300, w, Some(Box::new(|_| 0)));
        timers.set_timer(100, w, Some(Box::new(|_| 0)));
        timers.set_timer(200, w, Some(Box::new(|_| 0)));
        let d = timers.deadlines();
        assert!(d.windows(2).all(|p| p[0] <= p[1]));
        assert_eq!(d.len(), 3);
    }

    #[test]
    fn pop_due_respects_deadline() {
        let (_tree, w) = test_widget();
        let mut timers = Timers::new(EventQueue::unwakeable());
        timers.set_timer(50, w, Some(Box::new(|_| 0)));
        let now = timers.now_ms();
        assert!(timers.pop_due(now).is_none());
        assert!(timers.pop_due(now + 51).is_some());
        assert!(timers.pop_due(now + 51).is_none());
    }

    #[test]
    fn remove_is_idempotent() {
        let (_tree, w) = test_widget();
        let mut timers = Timers::new(EventQueue::unwakeable());
        let id = timers.set_timer(50, w, Some(Box::new(|_| 0)));
        timers.remove(id);
        timers.remove(id);
        assert!(timers.deadlines().is_empty());
    }

    #[test]
    fn default_timer_is_replaced() {
        let (_tree, w) = test_widget();
        let mut timers = Timers::new(EventQueue::unwakeable());
        timers.set_timer(50, w, None);
        timers.set_timer(70, w, None);
        assert_eq!(timers.deadlines().len(), 1);
    }

    #[test]
    fn waker_posts_tick() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let queue = EventQueue::new(Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        let (_tree, w) = test_widget();
        let mut timers = Timers::new(queue.clone());
        timers.set_timer(10, w, Some(Box::new(|_| 0)));
        // The waker thread should post a tick shortly after the deadline.
        let start = std::time::Instant::now();
        while count.load(Ordering::SeqCst) == 0 && start.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(queue.pop(), Some(Event::TimerTick));
    }
}
