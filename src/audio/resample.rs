//! Channel mixing and sample-rate conversion.
//!
//! Devices deliver whatever their native format is (commonly 48 kHz stereo);
//! the matcher expects mono at the configured rate.  Capture runs every raw
//! chunk through:
//!
//! 1. [`to_mono`]: downmix any number of interleaved channels to mono.
//! 2. [`resample`]: convert from the device rate to the target rate.
//!
//! The resampler uses linear interpolation; fingerprinting is tolerant of the
//! small amount of aliasing this introduces.

// ---------------------------------------------------------------------------
// to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// The output length is `samples.len() / channels`.
///
/// * If `channels == 1` the input slice is returned as an owned `Vec`.
/// * If `channels == 0` an empty vector is returned.
///
/// # Example
///
/// ```rust
/// use music_recognizer::audio::to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, 0.4]; // L R L R
/// let mono = to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample
// ---------------------------------------------------------------------------

/// Resample mono `samples` from `source_rate` Hz to `target_rate` Hz using
/// linear interpolation.
///
/// * Equal rates return the input unchanged.
/// * Empty input or a zero rate yields an empty vector.
///
/// # Example
///
/// ```rust
/// use music_recognizer::audio::resample;
///
/// let hi = vec![0.5_f32; 480];
/// let lo = resample(&hi, 48_000, 16_000);
/// assert_eq!(lo.len(), 160);
/// ```
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate {
        return samples.to_vec();
    }

    if samples.is_empty() || source_rate == 0 || target_rate == 0 {
        return Vec::new();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- to_mono -----------------------------------------------------------

    #[test]
    fn mono_input_is_unchanged() {
        let input = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(to_mono(&input, 1), input);
    }

    #[test]
    fn two_channels_are_averaged() {
        let out = to_mono(&[1.0_f32, -1.0, 0.5, 0.5], 2);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn trailing_partial_frame_is_dropped() {
        // 5 samples, 2 channels → 2 whole frames
        let out = to_mono(&[0.2_f32, 0.2, 0.4, 0.4, 0.9], 2);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn zero_channels_yield_nothing() {
        assert!(to_mono(&[1.0_f32, 2.0], 0).is_empty());
    }

    // ---- resample ----------------------------------------------------------

    #[test]
    fn equal_rates_are_a_noop() {
        let input: Vec<f32> = (0..441).map(|i| i as f32 / 441.0).collect();
        assert_eq!(resample(&input, 44_100, 44_100), input);
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(resample(&[], 48_000, 44_100).is_empty());
    }

    #[test]
    fn zero_rate_yields_nothing() {
        assert!(resample(&[0.1, 0.2], 0, 44_100).is_empty());
    }

    #[test]
    fn downsample_48k_to_44k1_length() {
        // 1 s @ 48 kHz → ~1 s @ 44.1 kHz
        let out = resample(&vec![0.0_f32; 48_000], 48_000, 44_100);
        assert!(out.len().abs_diff(44_100) <= 1, "got {}", out.len());
    }

    #[test]
    fn upsample_doubles_length() {
        let out = resample(&vec![0.0_f32; 80], 8_000, 16_000);
        assert_eq!(out.len(), 160);
    }

    #[test]
    fn constant_signal_preserves_amplitude() {
        let out = resample(&vec![0.5_f32; 480], 48_000, 44_100);
        for &s in &out {
            assert!((s - 0.5).abs() < 1e-5, "amplitude drift: {s}");
        }
    }
}
