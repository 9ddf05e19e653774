//! Fixed-size capture frames and the assembler that cuts them.
//!
//! Devices deliver audio in whatever chunk size the platform picks.  The
//! matcher and the capture bookkeeping want uniform frames, so raw samples
//! are accumulated and sliced into frames of exactly `frame_samples`
//! samples.  The assembler is bounded: once `max_frames` frames have been
//! produced it ignores further input.
//!
//! # Example
//!
//! ```rust
//! use music_recognizer::audio::FrameAssembler;
//!
//! let mut asm = FrameAssembler::new(4, 2, 16_000);
//! let frames = asm.push(&[0.1, 0.1, 0.1, 0.1, 0.2, 0.2]);
//! assert_eq!(frames.len(), 1);
//! assert_eq!(asm.pending(), 2);
//!
//! let frames = asm.push(&[0.2, 0.2, 0.3, 0.3, 0.3, 0.3]);
//! assert_eq!(frames.len(), 1); // capped at 2 frames total
//! assert!(asm.is_full());
//! ```

use std::time::Duration;

use serde::Serialize;

use super::level::rms;

// ---------------------------------------------------------------------------
// AudioFrame
// ---------------------------------------------------------------------------

/// One fixed-size block of mono PCM samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioFrame {
    /// Position of the frame within its capture session, starting at 0.
    pub seq: u64,
    /// Mono `f32` samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// RMS level of `samples`.
    pub level: f32,
}

impl AudioFrame {
    pub fn new(seq: u64, samples: Vec<f32>, sample_rate: u32) -> Self {
        let level = rms(&samples);
        Self {
            seq,
            samples,
            sample_rate,
            level,
        }
    }

    /// Wall-clock length of the frame.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

// ---------------------------------------------------------------------------
// FrameAssembler
// ---------------------------------------------------------------------------

/// Re-chunks an arbitrary sample stream into fixed-size [`AudioFrame`]s.
///
/// A trailing partial frame is never emitted; it stays in
/// [`pending`](Self::pending) until enough samples arrive.
pub struct FrameAssembler {
    frame_samples: usize,
    max_frames: usize,
    sample_rate: u32,
    pending: Vec<f32>,
    produced: usize,
}

impl FrameAssembler {
    /// Create an assembler producing frames of `frame_samples` samples, at
    /// most `max_frames` of them.
    ///
    /// # Panics
    ///
    /// Panics if `frame_samples == 0`.
    pub fn new(frame_samples: usize, max_frames: usize, sample_rate: u32) -> Self {
        assert!(frame_samples > 0, "frame size must be > 0");
        Self {
            frame_samples,
            max_frames,
            sample_rate,
            pending: Vec::with_capacity(frame_samples),
            produced: 0,
        }
    }

    /// Append `samples`, returning every frame completed by them.
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        let mut frames = Vec::new();
        let mut rest = samples;

        while !rest.is_empty() && !self.is_full() {
            let want = self.frame_samples - self.pending.len();
            let take = want.min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == self.frame_samples {
                let samples = std::mem::replace(
                    &mut self.pending,
                    Vec::with_capacity(self.frame_samples),
                );
                frames.push(AudioFrame::new(
                    self.produced as u64,
                    samples,
                    self.sample_rate,
                ));
                self.produced += 1;
            }
        }

        frames
    }

    /// Number of buffered samples not yet forming a whole frame.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Frames produced so far.
    pub fn produced(&self) -> usize {
        self.produced
    }

    /// `true` once `max_frames` frames have been produced.
    pub fn is_full(&self) -> bool {
        self.produced >= self.max_frames
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
