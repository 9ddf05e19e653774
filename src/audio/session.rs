//! Capture session: one bounded recording for one recognition attempt.
//!
//! [`CaptureSession::start`] opens the device, then a tokio task turns raw
//! device chunks into fixed-size mono frames at the target rate.  Each frame
//! is handed to the caller's frame callback and retained for submission.
//!
//! ```text
//! AudioDevice ──AudioChunk──▶ to_mono ─▶ resample ─▶ FrameAssembler
//!                                                        │
//!                                     on_frame(&frame) ◀─┤
//!                                    session.frames  ◀───┘
//! ```
//!
//! The session ends when the frame budget for `max_duration` is used up,
//! when the device closes, or when the attempt's [`CancelFlag`] is raised.
//! Cancellation is observed at frame boundaries: frames delivered before it
//! stay valid, none are delivered after it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::cancel::CancelFlag;
use crate::config::{AudioConfig, RecognitionConfig};

use super::device::{AudioDevice, CaptureError};
use super::frame::{AudioFrame, FrameAssembler};
use super::level::peak;
use super::resample::{resample, to_mono};

/// Slack on top of `max_duration` before a stalled device is given up on.
const CAPTURE_GRACE: Duration = Duration::from_millis(500);

static NEXT_CAPTURE_ID: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// Identifiers and status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CaptureId(pub u64);

impl std::fmt::Display for CaptureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "capture-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CaptureStatus {
    Recording,
    Complete,
    Cancelled,
}

// ---------------------------------------------------------------------------
// CaptureParams
// ---------------------------------------------------------------------------

/// Shape of one capture: how long, at what rate, in what frame size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureParams {
    pub max_duration: Duration,
    pub sample_rate: u32,
    pub frame_samples: usize,
}

impl CaptureParams {
    pub fn from_config(audio: &AudioConfig, recognition: &RecognitionConfig) -> Self {
        Self {
            max_duration: recognition.max_capture(),
            sample_rate: audio.sample_rate,
            frame_samples: audio.frame_samples(),
        }
    }

    /// Number of whole frames that fit in `max_duration`.
    pub fn max_frames(&self) -> usize {
        let total = self.max_duration.as_secs_f64() * self.sample_rate as f64;
        (total / self.frame_samples.max(1) as f64).floor() as usize
    }
}

// ---------------------------------------------------------------------------
// CaptureSession
// ---------------------------------------------------------------------------

/// The recording produced by one session.  Owned by the recognition request
/// it is submitted with.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    pub id: CaptureId,
    pub started_at: Instant,
    pub max_duration: Duration,
    pub sample_rate: u32,
    pub frames: Vec<AudioFrame>,
    pub status: CaptureStatus,
}

impl CaptureSession {
    /// Open `device` and start recording.
    ///
    /// The device is opened on the blocking pool.  `on_frame` runs on the
    /// capture task for every frame, in order.  Raising `cancel` ends the
    /// session at the next frame boundary with status `Cancelled`.
    ///
    /// # Errors
    ///
    /// [`CaptureError::DeviceUnavailable`] when the device cannot be opened;
    /// no task is spawned in that case.
    pub async fn start<F>(
        device: Arc<dyn AudioDevice>,
        params: CaptureParams,
        cancel: CancelFlag,
        mut on_frame: F,
    ) -> Result<CaptureHandle, CaptureError>
    where
        F: FnMut(&AudioFrame) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let input = tokio::task::spawn_blocking(move || device.open(tx))
            .await
            .map_err(|e| CaptureError::DeviceUnavailable(format!("device open task failed: {e}")))??;

        let id = CaptureId(NEXT_CAPTURE_ID.fetch_add(1, Ordering::Relaxed));
        let status = Arc::new(Mutex::new(CaptureStatus::Recording));
        let control = CaptureControl {
            id,
            status: Arc::clone(&status),
            cancel: cancel.clone(),
        };

        let max_frames = params.max_frames();
        let started_at = Instant::now();
        log::debug!(
            "capture: {id} started ({} frames of {} samples max)",
            max_frames,
            params.frame_samples
        );

        let task = tokio::spawn(async move {
            let mut session = CaptureSession {
                id,
                started_at,
                max_duration: params.max_duration,
                sample_rate: params.sample_rate,
                frames: Vec::with_capacity(max_frames),
                status: CaptureStatus::Recording,
            };
            let mut assembler =
                FrameAssembler::new(params.frame_samples.max(1), max_frames, params.sample_rate);
            let give_up_at = started_at + params.max_duration + CAPTURE_GRACE;

            let final_status = 'capture: loop {
                if assembler.is_full() {
                    break CaptureStatus::Complete;
                }

                let chunk = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break CaptureStatus::Cancelled,
                    _ = tokio::time::sleep_until(give_up_at) => {
                        log::warn!("capture: {id} device stalled, ending early");
                        break CaptureStatus::Complete;
                    }
                    chunk = rx.recv() => chunk,
                };

                let Some(chunk) = chunk else {
                    log::debug!("capture: {id} device closed the stream");
                    break CaptureStatus::Complete;
                };

                let mono = to_mono(&chunk.samples, chunk.channels);
                let samples = resample(&mono, chunk.sample_rate, params.sample_rate);

                for frame in assembler.push(&samples) {
                    if cancel.is_cancelled() {
                        break 'capture CaptureStatus::Cancelled;
                    }
                    on_frame(&frame);
                    session.frames.push(frame);
                }
            };

            drop(input);

            // A cancel from the control may already have recorded Cancelled.
            let mut shared = status.lock().unwrap_or_else(PoisonError::into_inner);
            if *shared == CaptureStatus::Recording {
                *shared = final_status;
            }
            session.status = *shared;
            drop(shared);

            log::debug!(
                "capture: {id} finished as {:?} with {} frame(s)",
                session.status,
                session.frames.len()
            );
            session
        });

        Ok(CaptureHandle { control, task })
    }

    /// Total captured length.
    pub fn duration(&self) -> Duration {
        self.frames.iter().map(AudioFrame::duration).sum()
    }

    /// All frames concatenated into one mono sample buffer.
    pub fn samples(&self) -> Vec<f32> {
        let total = self.frames.iter().map(|f| f.samples.len()).sum();
        let mut out = Vec::with_capacity(total);
        for frame in &self.frames {
            out.extend_from_slice(&frame.samples);
        }
        out
    }

    /// Loudest sample across the whole capture.
    pub fn peak_level(&self) -> f32 {
        self.frames
            .iter()
            .map(|f| peak(&f.samples))
            .fold(0.0_f32, f32::max)
    }
}

// ---------------------------------------------------------------------------
// CaptureControl / CaptureHandle
// ---------------------------------------------------------------------------

/// Clonable control surface of a running session.
#[derive(Debug, Clone)]
pub struct CaptureControl {
    id: CaptureId,
    status: Arc<Mutex<CaptureStatus>>,
    cancel: CancelFlag,
}

impl CaptureControl {
    pub fn id(&self) -> CaptureId {
        self.id
    }

    /// Stop the session.  Its status reads `Cancelled` from this point on,
    /// even before the capture task reaches its next frame boundary.
    pub fn cancel(&self) {
        {
            let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
            if *status == CaptureStatus::Recording {
                *status = CaptureStatus::Cancelled;
            }
        }
        self.cancel.cancel();
    }

    pub fn status(&self) -> CaptureStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_active(&self) -> bool {
        self.status() == CaptureStatus::Recording
    }
}

/// Owner handle returned by [`CaptureSession::start`].
pub struct CaptureHandle {
    control: CaptureControl,
    task: JoinHandle<CaptureSession>,
}

impl CaptureHandle {
    pub fn id(&self) -> CaptureId {
        self.control.id
    }

    pub fn control(&self) -> CaptureControl {
        self.control.clone()
    }

    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn is_active(&self) -> bool {
        self.control.is_active()
    }

    /// Wait for the session to end and take its recording.
    pub async fn finish(self) -> CaptureSession {
        let control = self.control;
        match self.task.await {
            Ok(session) => session,
            Err(e) => {
                log::error!("capture: {} task failed: {e}", control.id);
                control.cancel();
                CaptureSession {
                    id: control.id,
                    started_at: Instant::now(),
                    max_duration: Duration::ZERO,
                    sample_rate: 0,
                    frames: Vec::new(),
                    status: CaptureStatus::Cancelled,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedDevice;

    fn params(secs: u64) -> CaptureParams {
        CaptureParams {
            max_duration: Duration::from_secs(secs),
            sample_rate: 44_100,
            frame_samples: 4_410,
        }
    }

    #[test]
    fn max_frames_fill_the_duration() {
        assert_eq!(params(3).max_frames(), 30);
        assert_eq!(params(10).max_frames(), 100);
    }

    #[tokio::test]
    async fn unavailable_device_fails_immediately() {
        let device = Arc::new(ScriptedDevice::unavailable());
        let result = CaptureSession::start(device, params(3), CancelFlag::new(), |_| {}).await;
        assert!(matches!(result, Err(CaptureError::DeviceUnavailable(_))));
    }

    #[tokio::test]
    async fn records_up_to_max_duration() {
        let device = Arc::new(ScriptedDevice::seconds(5.0, 44_100));
        let handle = CaptureSession::start(device, params(3), CancelFlag::new(), |_| {})
            .await
            .expect("device opens");

        let session = handle.finish().await;
        assert_eq!(session.status, CaptureStatus::Complete);
        assert_eq!(session.frames.len(), 30);
        assert_eq!(session.duration(), Duration::from_secs(3));
        assert!(session.frames.iter().all(|f| f.samples.len() == 4_410));
    }

    #[tokio::test]
    async fn device_closing_early_completes_with_what_was_captured() {
        let device = Arc::new(ScriptedDevice::seconds(1.0, 44_100));
        let handle = CaptureSession::start(device, params(3), CancelFlag::new(), |_| {})
            .await
            .expect("device opens");

        let session = handle.finish().await;
        assert_eq!(session.status, CaptureStatus::Complete);
        assert_eq!(session.frames.len(), 10);
    }

    #[tokio::test]
    async fn resamples_and_downmixes_device_audio() {
        let device = Arc::new(ScriptedDevice::seconds(1.0, 48_000).with_channels(2));
        let handle = CaptureSession::start(device, params(3), CancelFlag::new(), |_| {})
            .await
            .expect("device opens");

        let session = handle.finish().await;
        // 1 s of 48 kHz stereo becomes ~1 s of 44.1 kHz mono.
        assert_eq!(session.frames.len(), 10);
        assert_eq!(session.sample_rate, 44_100);
    }

    #[tokio::test]
    async fn frame_callback_sees_every_frame_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let device = Arc::new(ScriptedDevice::seconds(2.0, 44_100));
        let handle = CaptureSession::start(device, params(3), CancelFlag::new(), move |f| {
            sink.lock().unwrap().push(f.seq);
        })
        .await
        .expect("device opens");

        let session = handle.finish().await;
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, (0..20).collect::<Vec<u64>>());
        assert_eq!(session.frames.len(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_delivery_and_keeps_earlier_frames() {
        let device = Arc::new(ScriptedDevice::seconds(1.0, 44_100).held_open());
        let cancel = CancelFlag::new();
        let handle = CaptureSession::start(device, params(3), cancel.clone(), |_| {})
            .await
            .expect("device opens");
        assert!(handle.is_active());

        // Let the task drain the scripted second of audio, then stall.
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();
        assert!(!handle.is_active());

        let session = handle.finish().await;
        assert_eq!(session.status, CaptureStatus::Cancelled);
        assert_eq!(session.frames.len(), 10);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_device_is_given_up_after_grace() {
        let device = Arc::new(ScriptedDevice::silent().held_open());
        let handle = CaptureSession::start(device, params(3), CancelFlag::new(), |_| {})
            .await
            .expect("device opens");

        let session = handle.finish().await;
        assert_eq!(session.status, CaptureStatus::Complete);
        assert!(session.frames.is_empty());
    }

    #[tokio::test]
    async fn samples_concatenate_frames() {
        let device = Arc::new(ScriptedDevice::seconds(1.0, 44_100));
        let session = CaptureSession::start(device, params(3), CancelFlag::new(), |_| {})
            .await
            .expect("device opens")
            .finish()
            .await;

        assert_eq!(session.samples().len(), 44_100);
        assert!(session.peak_level() > 0.0);
    }
}
