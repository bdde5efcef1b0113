//! Presentation time for the preview: wall-clock sources plus the
//! play/pause/seek state machine driving the render loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Abstraction over where wall-clock seconds originate from.
pub trait Clock: Send {
    /// Seconds elapsed since an arbitrary fixed origin.
    fn now(&self) -> f64;
}

/// Monotonic system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Clock advanced by hand. Clones share the same reading, so a test can keep
/// one handle while the renderer owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Paused,
    Playing,
}

/// Timing of one executed draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTiming {
    /// Index of the frame being drawn, starting at 0.
    pub frame: u64,
    pub time: f64,
    /// Seconds since the previous draw; 0 for the first draw and after a
    /// backwards seek.
    pub delta: f64,
}

impl FrameTiming {
    pub fn frame_rate(&self) -> f64 {
        if self.delta > 0.0 {
            1.0 / self.delta
        } else {
            0.0
        }
    }
}

/// Play/pause/seek state machine.
///
/// While playing, `current_time` is `clock.now() - origin` and never moves
/// backwards between ticks. While paused it stays frozen.
#[derive(Debug)]
pub struct PlaybackClock<C = SystemClock> {
    clock: C,
    state: PlaybackState,
    origin: f64,
    current_time: f64,
    frame_count: u64,
    last_frame_time: Option<f64>,
}

impl Default for PlaybackClock<SystemClock> {
    fn default() -> Self {
        Self::new(SystemClock::new())
    }
}

impl<C: Clock> PlaybackClock<C> {
    pub fn new(clock: C) -> Self {
        let origin = clock.now();
        Self {
            clock,
            state: PlaybackState::Paused,
            origin,
            current_time: 0.0,
            frame_count: 0,
            last_frame_time: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Starts playback from the current time. Returns `false` when already
    /// playing.
    pub fn play(&mut self) -> bool {
        if self.is_playing() {
            return false;
        }
        self.origin = self.clock.now() - self.current_time;
        self.state = PlaybackState::Playing;
        true
    }

    /// Freezes playback at the last ticked time, so a paused redraw shows
    /// the frame already on screen. Returns `false` when already paused.
    pub fn pause(&mut self) -> bool {
        if !self.is_playing() {
            return false;
        }
        self.state = PlaybackState::Paused;
        true
    }

    /// Jumps to `time` in either state. Non-finite targets are ignored and
    /// reported as `false`.
    pub fn seek(&mut self, time: f64) -> bool {
        if !time.is_finite() {
            return false;
        }
        self.current_time = time;
        self.origin = self.clock.now() - time;
        if self
            .last_frame_time
            .is_some_and(|previous| previous > time)
        {
            self.last_frame_time = None;
        }
        true
    }

    /// Advances `current_time` from the wall clock while playing.
    pub fn tick(&mut self) -> f64 {
        if self.is_playing() {
            let elapsed = self.clock.now() - self.origin;
            if elapsed > self.current_time {
                self.current_time = elapsed;
            }
        }
        self.current_time
    }

    /// Timing the next draw would get, without counting it.
    pub fn pending_frame(&self) -> FrameTiming {
        let time = self.current_time;
        let delta = self
            .last_frame_time
            .map(|previous| (time - previous).max(0.0))
            .unwrap_or(0.0);
        FrameTiming {
            frame: self.frame_count,
            time,
            delta,
        }
    }

    /// Accounts for one executed draw at the current time.
    pub fn record_frame(&mut self) -> FrameTiming {
        let timing = self.pending_frame();
        self.frame_count += 1;
        self.last_frame_time = Some(timing.time);
        timing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual() -> (ManualClock, PlaybackClock<ManualClock>) {
        let wall = ManualClock::new();
        wall.set(100.0);
        let clock = PlaybackClock::new(wall.clone());
        (wall, clock)
    }

    #[test]
    fn starts_paused_at_zero() {
        let (wall, mut clock) = manual();
        assert_eq!(clock.state(), PlaybackState::Paused);
        wall.advance(5.0);
        assert_eq!(clock.tick(), 0.0);
        assert_eq!(clock.frame_count(), 0);
    }

    #[test]
    fn seek_play_pause_sequence() {
        let (wall, mut clock) = manual();
        assert!(clock.seek(3.0));
        assert_eq!(clock.current_time(), 3.0);
        assert!(clock.play());
        assert_eq!(clock.tick(), 3.0);

        let mut last = clock.current_time();
        for _ in 0..5 {
            wall.advance(0.25);
            let now = clock.tick();
            assert!(now > last);
            last = now;
        }
        assert!((last - 4.25).abs() < 1e-9);

        wall.advance(0.1);
        assert!(clock.pause());
        let frozen = clock.current_time();
        assert_eq!(frozen, last);
        wall.advance(10.0);
        assert_eq!(clock.tick(), frozen);

        assert!(clock.play());
        wall.advance(0.5);
        assert!((clock.tick() - (frozen + 0.5)).abs() < 1e-9);
    }

    #[test]
    fn paused_time_equals_last_seek() {
        let (wall, mut clock) = manual();
        clock.seek(7.5);
        wall.advance(3.0);
        assert_eq!(clock.tick(), 7.5);
        assert!(!clock.seek(f64::NAN));
        assert_eq!(clock.current_time(), 7.5);
    }

    #[test]
    fn play_and_pause_are_idempotent() {
        let (wall, mut clock) = manual();
        assert!(clock.play());
        wall.advance(1.0);
        assert!(!clock.play());
        assert!((clock.tick() - 1.0).abs() < 1e-9);
        assert!(clock.pause());
        assert!(!clock.pause());
    }

    #[test]
    fn seek_while_playing_resets_origin() {
        let (wall, mut clock) = manual();
        clock.play();
        wall.advance(4.0);
        clock.tick();
        clock.seek(1.0);
        assert_eq!(clock.tick(), 1.0);
        wall.advance(0.5);
        assert!((clock.tick() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn frame_timing_tracks_deltas() {
        let (wall, mut clock) = manual();
        clock.play();
        assert_eq!(clock.pending_frame().frame, 0);
        assert_eq!(clock.frame_count(), 0);
        let first = clock.record_frame();
        assert_eq!(first.frame, 0);
        assert_eq!(first.delta, 0.0);
        assert_eq!(first.frame_rate(), 0.0);

        wall.advance(0.5);
        clock.tick();
        let second = clock.record_frame();
        assert_eq!(second.frame, 1);
        assert!((second.delta - 0.5).abs() < 1e-9);
        assert!((second.frame_rate() - 2.0).abs() < 1e-9);

        clock.seek(0.0);
        assert_eq!(clock.record_frame().delta, 0.0);
        assert_eq!(clock.frame_count(), 3);
    }
}
