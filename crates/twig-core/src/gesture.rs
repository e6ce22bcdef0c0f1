//! Pointer gesture recognition: click counting and fling velocity.
//!
//! The recognizer is a plain state object fed one pointer phase at a time,
//! so its transitions are testable without routing through dispatch. It
//! keeps a bounded ring of recent samples and estimates fling velocity with
//! a finite-impulse-response window over them, which is more robust to
//! irregular input timing than a recursive filter.

use std::collections::VecDeque;

use geom::Point;

use crate::event::{Timestamp, TouchPoint};

/// Max samples retained for velocity estimation.
const MAX_SAMPLES: usize = 12;
/// Samples closer together than this are merged (seconds).
const MIN_SAMPLE_DT: f32 = 0.005;
/// Velocity averaging window before release (seconds).
const FLING_AVG_SECS: f32 = 0.05;
/// Gestures shorter than this never fling (seconds).
const MIN_FLING_SECS: f32 = 0.03;
/// Gestures that travel less than this never fling (px).
pub const MIN_FLING_DIST: f32 = 40.0;
/// Presses farther apart than this do not chain into multi-clicks (px).
pub const MAX_CLICK_DIST: f32 = 20.0;
/// Presses farther apart than this in time do not chain (ms).
pub const MAX_CLICK_MS: u64 = 400;
/// Up/down pairs closer than this are switch bounce, not a new click (ms).
const CLICK_BOUNCE_MS: u64 = 40;

/// One retained motion sample.
#[derive(Debug, Clone, Copy)]
struct Sample {
    pos: Point,
    /// Seconds since the gesture's finger-down.
    trel: f32,
}

/// A pointer phase fed to the recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Down,
    Move,
    Up,
}

/// Gesture-tracking state for the primary pointer.
#[derive(Debug, Default)]
pub struct GestureState {
    samples: VecDeque<Sample>,
    /// Velocity estimated at the last release, px/sec.
    pub fling_velocity: Point,
    /// Consecutive-click counter: 1 for a single click, 2 for double, ...
    pub clicks: u32,
    /// Path length accumulated since finger-down.
    pub total_dist: f32,
    prev_pos: Point,
    /// Timestamp of the last down or up transition.
    up_down_time: Timestamp,
    /// Contacts currently down, tracked for multi-touch bundling.
    pub touch_points: Vec<TouchPoint>,
    /// Set once a second concurrent contact (or a cancel) is seen; cleared
    /// when all contacts lift.
    pub multi_touch_active: bool,
    /// A stylus contact is down.
    pub pen_down: bool,
}

impl GestureState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one primary-pointer phase.
    pub fn update(&mut self, phase: Phase, pos: Point, t: Timestamp) {
        match phase {
            Phase::Down => {
                self.fling_velocity = Point::ZERO;
                self.samples.clear();
                self.samples.push_back(Sample { pos, trel: 0.0 });
                let gap = t.saturating_sub(self.up_down_time);
                self.clicks = if gap < MAX_CLICK_MS && pos.dist(self.prev_pos) < MAX_CLICK_DIST {
                    if gap < CLICK_BOUNCE_MS {
                        // Too fast to be a deliberate click: bounce noise.
                        self.clicks
                    } else {
                        self.clicks + 1
                    }
                } else {
                    1
                };
                self.total_dist = 0.0;
                self.up_down_time = t;
            }
            Phase::Move => {
                let trel = t.saturating_sub(self.up_down_time) as f32 / 1000.0;
                while self.samples.len() > 1
                    && self
                        .samples
                        .back()
                        .is_some_and(|s| trel - s.trel < MIN_SAMPLE_DT)
                {
                    self.samples.pop_back();
                }
                while self.samples.len() >= MAX_SAMPLES {
                    self.samples.pop_front();
                }
                self.samples.push_back(Sample { pos, trel });
                self.total_dist += pos.dist(self.prev_pos);
                if self.total_dist >= MAX_CLICK_DIST
                    || t.saturating_sub(self.up_down_time) >= MAX_CLICK_MS
                {
                    self.clicks = 0;
                }
            }
            Phase::Up => {
                let trel = t.saturating_sub(self.up_down_time) as f32 / 1000.0;
                if self.total_dist > MIN_FLING_DIST && trel > MIN_FLING_SECS {
                    // Walk back to the oldest sample still inside (or just
                    // outside) the averaging window.
                    let mut i = self.samples.len().saturating_sub(1);
                    while i > 0 && trel - self.samples[i].trel < FLING_AVG_SECS {
                        i -= 1;
                    }
                    let s = self.samples[i];
                    let dt = trel - s.trel;
                    if dt > 0.0 {
                        self.fling_velocity = (pos - s.pos) / dt;
                    }
                }
                if self.total_dist >= MAX_CLICK_DIST
                    || t.saturating_sub(self.up_down_time) >= MAX_CLICK_MS
                {
                    self.clicks = 0;
                }
                self.total_dist = 0.0;
                self.up_down_time = t;
            }
        }
        self.prev_pos = pos;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn down(g: &mut GestureState, x: f32, t: u64) {
        g.update(Phase::Down, Point::new(x, 0.0), t);
    }

    fn up(g: &mut GestureState, x: f32, t: u64) {
        g.update(Phase::Up, Point::new(x, 0.0), t);
    }

    #[test]
    fn click_counting_increments_within_thresholds() {
        let mut g = GestureState::new();
        down(&mut g, 0.0, 1000);
        assert_eq!(g.clicks, 1);
        up(&mut g, 0.0, 1050);
        down(&mut g, 5.0, 1200);
        assert_eq!(g.clicks, 2);
        up(&mut g, 5.0, 1250);
        down(&mut g, 5.0, 1400);
        assert_eq!(g.clicks, 3);
    }

    #[test]
    fn click_counter_resets_after_timeout_regardless_of_distance() {
        let mut g = GestureState::new();
        down(&mut g, 0.0, 1000);
        up(&mut g, 0.0, 1050);
        down(&mut g, 0.0, 1050 + MAX_CLICK_MS + 1);
        assert_eq!(g.clicks, 1);
    }

    #[test]
    fn click_counter_resets_on_distance() {
        let mut g = GestureState::new();
        down(&mut g, 0.0, 1000);
        up(&mut g, 0.0, 1050);
        down(&mut g, 100.0, 1200);
        assert_eq!(g.clicks, 1);
    }

    #[test]
    fn bounce_is_not_a_click() {
        let mut g = GestureState::new();
        down(&mut g, 0.0, 1000);
        up(&mut g, 0.0, 1020);
        // 30 ms after the up: contact bounce, counter unchanged.
        down(&mut g, 0.0, 1050);
        assert_eq!(g.clicks, 1);
    }

    #[test]
    fn motion_cancels_click() {
        let mut g = GestureState::new();
        down(&mut g, 0.0, 1000);
        for i in 1..=10 {
            g.update(Phase::Move, Point::new(i as f32 * 3.0, 0.0), 1000 + i * 10);
        }
        assert_eq!(g.clicks, 0);
    }

    #[test]
    fn short_travel_yields_no_fling() {
        let mut g = GestureState::new();
        down(&mut g, 0.0, 1000);
        g.update(Phase::Move, Point::new(5.0, 0.0), 1100);
        g.update(Phase::Move, Point::new(10.0, 0.0), 1200);
        up(&mut g, 10.0, 1200);
        assert_eq!(g.fling_velocity, Point::ZERO);
    }

    #[test]
    fn fast_swipe_produces_velocity() {
        let mut g = GestureState::new();
        down(&mut g, 0.0, 1000);
        for i in 1..=10 {
            g.update(Phase::Move, Point::new(i as f32 * 10.0, 0.0), 1000 + i * 10);
        }
        up(&mut g, 100.0, 1100);
        // 100 px over 100 ms, roughly 1000 px/sec rightward.
        assert!(g.fling_velocity.x > 500.0, "{:?}", g.fling_velocity);
        assert_eq!(g.fling_velocity.y, 0.0);
    }

    #[test]
    fn sample_ring_is_bounded() {
        let mut g = GestureState::new();
        down(&mut g, 0.0, 1000);
        for i in 1..200u64 {
            g.update(Phase::Move, Point::new(i as f32, 0.0), 1000 + i * 10);
        }
        assert!(g.samples.len() <= MAX_SAMPLES);
    }
}
