//! Frame recorder with playback.
//!
//! Recording captures a full snapshot of instance memory once per tick into a
//! bounded ring; the oldest frames drop out when it is full. Playback picks
//! the last frame at or before the playback time.

use std::collections::VecDeque;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RecorderMode {
    Idle,
    Recording,
    Playback,
}

#[derive(Clone, Debug)]
pub struct Recorder<T> {
    frames: VecDeque<(f32, T)>,
    capacity: usize,
    clock: f32,
    mode: RecorderMode,
    playback_time: f32,
}

impl<T: Clone> Recorder<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            capacity: capacity.max(1),
            clock: 0.0,
            mode: RecorderMode::Idle,
            playback_time: 0.0,
        }
    }

    #[inline]
    pub fn mode(&self) -> RecorderMode {
        self.mode
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.mode == RecorderMode::Playback
    }

    /// Drop previous frames and start capturing.
    pub fn start_recording(&mut self) {
        self.frames.clear();
        self.clock = 0.0;
        self.mode = RecorderMode::Recording;
    }

    pub fn stop_recording(&mut self) {
        if self.mode == RecorderMode::Recording {
            self.mode = RecorderMode::Idle;
        }
    }

    /// Capture a frame after a tick of `dt` seconds. No-op unless recording.
    pub fn capture(&mut self, dt: f32, frame: &T) {
        if self.mode != RecorderMode::Recording {
            return;
        }
        self.clock += dt.max(0.0);
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back((self.clock, frame.clone()));
    }

    /// Enter playback at the first recorded frame. Returns false when nothing
    /// has been recorded.
    pub fn start_playback(&mut self) -> bool {
        let Some(start) = self.start_time() else {
            return false;
        };
        self.mode = RecorderMode::Playback;
        self.playback_time = start;
        true
    }

    pub fn stop_playback(&mut self) {
        if self.mode == RecorderMode::Playback {
            self.mode = RecorderMode::Idle;
        }
    }

    /// Clamped into the recorded range.
    pub fn set_playback_time(&mut self, t: f32) {
        if let (Some(a), Some(b)) = (self.start_time(), self.stop_time()) {
            self.playback_time = t.clamp(a, b);
        }
    }

    pub fn playback_time(&self) -> f32 {
        self.playback_time
    }

    pub fn start_time(&self) -> Option<f32> {
        self.frames.front().map(|(t, _)| *t)
    }

    pub fn stop_time(&self) -> Option<f32> {
        self.frames.back().map(|(t, _)| *t)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame shown at the current playback time.
    pub fn current(&self) -> Option<&T> {
        let idx = self.frames.partition_point(|(t, _)| *t <= self.playback_time);
        self.frames.get(idx.saturating_sub(1)).map(|(_, f)| f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_drops_oldest_frames() {
        let mut r = Recorder::new(3);
        r.start_recording();
        for i in 0..5 {
            r.capture(0.5, &i);
        }
        assert_eq!(r.len(), 3);
        assert_eq!(r.start_time(), Some(1.5));
        assert_eq!(r.stop_time(), Some(2.5));
    }

    #[test]
    fn playback_picks_frame_at_or_before_time() {
        let mut r = Recorder::new(10);
        assert!(!r.start_playback());
        r.start_recording();
        for i in 0..4 {
            r.capture(1.0, &i);
        }
        r.stop_recording();
        assert!(r.start_playback());
        assert_eq!(r.current(), Some(&0));
        r.set_playback_time(2.5);
        assert_eq!(r.current(), Some(&1));
        r.set_playback_time(100.0);
        assert_eq!(r.playback_time(), 4.0);
        assert_eq!(r.current(), Some(&3));
        // capture is ignored during playback
        r.capture(1.0, &9);
        assert_eq!(r.len(), 4);
    }
}
