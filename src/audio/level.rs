//! Signal level measurement for capture feedback.
//!
//! Every capture frame carries its RMS level.  A quiet frame is not an error
//! (the matcher can still succeed on a faint signal) but it is logged, and
//! the capture summary reports the peak level so the UI can hint that the
//! phone should be held closer to the speaker.

/// Root-mean-square level of `samples`, in the same units as the samples.
///
/// Returns `0.0` for an empty slice.
///
/// ```rust
/// use music_recognizer::audio::rms;
///
/// assert!((rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
/// assert_eq!(rms(&[]), 0.0);
/// ```
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// Largest absolute sample value.
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
}

/// Tracks how many consecutive frames fell under the volume floor so a quiet
/// room produces one warning rather than one per frame.
#[derive(Debug, Clone)]
pub struct VolumeMonitor {
    floor: f32,
    quiet_run: usize,
}

impl VolumeMonitor {
    pub fn new(floor: f32) -> Self {
        Self {
            floor,
            quiet_run: 0,
        }
    }

    /// Feed one frame level.  Returns `true` on the frame that *starts* a
    /// quiet run.
    pub fn observe(&mut self, level: f32) -> bool {
        if level < self.floor {
            self.quiet_run += 1;
            if self.quiet_run == 1 {
                log::warn!(
                    "capture: volume too low ({level:.3} < {:.3}), recognition may fail",
                    self.floor
                );
                return true;
            }
        } else {
            self.quiet_run = 0;
        }
        false
    }

    /// Number of consecutive quiet frames seen so far.
    pub fn quiet_run(&self) -> usize {
        self.quiet_run
    }
}
