//! Playback clock with frame-accurate timing
//!
//! Maps accumulated playback time to a frame index and asks the caller to
//! deliver that frame.
//!
//! # Timing Model
//!
//! `target = round(accumulated_ms / frame_interval_ms)`. Time only accumulates
//! while playing. If the target frame is not decoded yet the last delivered
//! frame stays on screen (no black flash) and delivery is retried next tick.
//!
//! # Playback Loop
//!
//! `advance()` is called once per host tick with the tick's wall delta.
//! Reaching the end wraps the accumulated time modulo the sequence length when
//! looping (the wrap itself is not a frame drop), otherwise playback stops and
//! [`ClockEvent::Finished`] is returned.

use log::{debug, trace};

/// Exponential decay of the delivered-FPS average
const FPS_DECAY: f64 = 0.95;

/// Notable outcome of one [`PlaybackClock::advance`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    Delivered(usize),
    /// End reached with looping disabled
    Finished,
}

/// Playback state of one sequence
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    frame_interval_ms: f64,
    total_frames: usize,
    accumulated_ms: f64,
    playing: bool,
    loop_play: bool,
    /// Last delivered frame
    current_frame: Option<usize>,
    elapsed_ms_since_last_frame: f64,
    smoothed_fps: f64,
    frame_dropped: bool,
    /// Wrapped since the last delivery, the jump back is not a drop
    looped: bool,
}

impl PlaybackClock {
    pub fn new(frame_interval_ms: f64, total_frames: usize) -> Self {
        Self {
            frame_interval_ms,
            total_frames,
            accumulated_ms: 0.0,
            playing: false,
            loop_play: true,
            current_frame: None,
            elapsed_ms_since_last_frame: 0.0,
            smoothed_fps: 0.0,
            frame_dropped: false,
            looped: false,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_play
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.loop_play = enabled;
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn frame_interval_ms(&self) -> f64 {
        self.frame_interval_ms
    }

    pub fn total_duration_ms(&self) -> f64 {
        self.total_frames as f64 * self.frame_interval_ms
    }

    pub fn accumulated_ms(&self) -> f64 {
        self.accumulated_ms
    }

    /// Last delivered frame (None before the first delivery)
    pub fn current_frame(&self) -> Option<usize> {
        self.current_frame
    }

    /// Frame the playback position maps to
    pub fn target_index(&self) -> usize {
        if self.frame_interval_ms <= 0.0 {
            return 0;
        }
        (self.accumulated_ms / self.frame_interval_ms).round() as usize
    }

    /// Target index clamped into the sequence, anchor for the buffer window
    pub fn playback_index(&self) -> usize {
        self.target_index().min(self.total_frames.saturating_sub(1))
    }

    pub fn target_fps(&self) -> f64 {
        1000.0 / self.frame_interval_ms
    }

    /// Smoothed rate of actual deliveries
    pub fn actual_fps(&self) -> f64 {
        self.smoothed_fps
    }

    pub fn elapsed_ms_since_last_frame(&self) -> f64 {
        self.elapsed_ms_since_last_frame
    }

    /// Read-and-clear the frame-dropped flag
    pub fn take_frame_dropped(&mut self) -> bool {
        std::mem::take(&mut self.frame_dropped)
    }

    /// Current playback time in seconds
    pub fn current_time(&self) -> f64 {
        self.accumulated_ms / 1000.0
    }

    /// Sequence length in seconds
    pub fn total_time(&self) -> f64 {
        self.total_duration_ms() / 1000.0
    }

    /// Seek to `seconds`. Rejected outside `[0, total_time]`.
    pub fn go_to_time(&mut self, seconds: f64) -> bool {
        if !(0.0..=self.total_time()).contains(&seconds) {
            debug!("Seek to {:.3}s rejected (total {:.3}s)", seconds, self.total_time());
            return false;
        }
        self.accumulated_ms = seconds * 1000.0;
        trace!("Seek to {:.3}s -> frame {}", seconds, self.target_index());
        true
    }

    /// Seek to the start of `frame`
    pub fn go_to_frame(&mut self, frame: usize) -> bool {
        self.go_to_time(frame as f64 * self.frame_interval_ms / 1000.0)
    }

    /// Rewind and start playing
    pub fn play_from_start(&mut self) {
        self.accumulated_ms = 0.0;
        self.playing = true;
    }

    /// Advance by `delta_ms` of wall time.
    ///
    /// `deliver(index)` is called when the target frame differs from the last
    /// delivered one, and must return whether the frame was ready and shown.
    pub fn advance<F>(&mut self, delta_ms: f64, mut deliver: F) -> Option<ClockEvent>
    where
        F: FnMut(usize) -> bool,
    {
        let delta_ms = delta_ms.max(0.0);
        self.elapsed_ms_since_last_frame += delta_ms;

        let mut event = None;
        if self.playing {
            self.accumulated_ms += delta_ms;

            let total = self.total_duration_ms();
            if total > 0.0 && self.accumulated_ms >= total {
                if self.loop_play {
                    self.accumulated_ms %= total;
                    self.looped = true;
                    trace!("Loop: wrapped to {:.1}ms", self.accumulated_ms);
                } else {
                    self.accumulated_ms = total;
                    self.playing = false;
                    debug!("Playback finished at frame {:?}", self.current_frame);
                    event = Some(ClockEvent::Finished);
                }
            }
        }

        let target = self.target_index();
        if self.current_frame != Some(target) && target < self.total_frames && deliver(target) {
            if self.elapsed_ms_since_last_frame > 0.0 {
                let instant = 1000.0 / self.elapsed_ms_since_last_frame;
                self.smoothed_fps = FPS_DECAY * self.smoothed_fps + (1.0 - FPS_DECAY) * instant;
            }
            self.elapsed_ms_since_last_frame = 0.0;

            if !std::mem::take(&mut self.looped)
                && let Some(prev) = self.current_frame
                && target.abs_diff(prev) > 1
                && target > 0
                && prev > 0
            {
                trace!("Frame drop: {} -> {}", prev, target);
                self.frame_dropped = true;
            }

            self.current_frame = Some(target);
            event = event.or(Some(ClockEvent::Delivered(target)));
        }

        event
    }
}
