use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use crate::models::{StreamParams, StreamState};

/// Monotonic count of frames delivered to the backend.
///
/// Written only by the render pump, read from any thread. A single `u64`
/// so readers never observe a torn value.
#[derive(Debug, Default)]
pub struct FrameCounter {
    frames: AtomicU64,
}

impl FrameCounter {
    pub fn new() -> Self {
        Self { frames: AtomicU64::new(0) }
    }

    /// Add `frames` delivered frames, returning the new position
    pub fn advance(&self, frames: u64) -> u64 {
        self.frames.fetch_add(frames, Ordering::AcqRel) + frames
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }
}

/// Clamp a requested volume into [0.0, 1.0]. NaN maps to silence.
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// Linear output volume shared with the render pump
#[derive(Debug)]
pub struct VolumeControl {
    bits: AtomicU32, // f32 bits for atomic access
}

impl VolumeControl {
    pub fn new(volume: f32) -> Self {
        Self { bits: AtomicU32::new(clamp_volume(volume).to_bits()) }
    }

    /// Store a new volume; out-of-range input is clamped, never rejected
    pub fn set(&self, volume: f32) -> f32 {
        let clamped = clamp_volume(volume);
        self.bits.store(clamped.to_bits(), Ordering::Release);
        clamped
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }
}

impl Default for VolumeControl {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Snapshot of a stream's position for status displays
#[derive(Debug, Clone, PartialEq)]
pub struct PositionUpdate {
    pub frames: u64,
    pub position: Duration,
    pub state: Option<StreamState>,
    /// Progress in [0, 1] when the total length is known
    pub progress: Option<f32>,
    pub remaining: Option<Duration>,
}

impl PositionUpdate {
    pub fn new(frames: u64, params: &StreamParams, state: Option<StreamState>, total_frames: Option<u64>) -> Self {
        let position = params.frames_to_duration(frames);
        let (progress, remaining) = match total_frames {
            Some(total) if total > 0 => {
                let progress = (frames as f64 / total as f64).min(1.0) as f32;
                let remaining = params.frames_to_duration(total.saturating_sub(frames));
                (Some(progress), Some(remaining))
            }
            _ => (None, None),
        };

        Self {
            frames,
            position,
            state,
            progress,
            remaining,
        }
    }
}
