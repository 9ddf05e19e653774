//! Audio input device abstraction and its `cpal` implementation.
//!
//! [`AudioDevice`] is the seam between capture and the platform: it opens an
//! input stream and forwards raw [`AudioChunk`]s over a tokio channel until
//! the returned [`InputHandle`] is dropped.
//!
//! `cpal::Stream` is not `Send` on every platform, so [`CpalDevice`] builds
//! and owns the stream on a dedicated OS thread.  `open` blocks until that
//! thread reports whether the device could be opened, so capture calls it
//! through `spawn_blocking`.  Closing only signals the thread; it never
//! waits for the stream to be torn down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::error::ErrorKind;

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// A raw block of samples exactly as delivered by the device.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved `f32` PCM samples in the range `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Native device sample rate (Hz).
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors raised while opening an input device.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptureError {
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptureError::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
        }
    }
}

// ---------------------------------------------------------------------------
// InputHandle
// ---------------------------------------------------------------------------

/// Keeps an opened input stream alive.  Dropping it closes the stream.
pub struct InputHandle {
    close: Option<Box<dyn FnOnce() + Send>>,
}

impl InputHandle {
    /// Handle that runs `close` when dropped.
    pub fn new(close: impl FnOnce() + Send + 'static) -> Self {
        Self {
            close: Some(Box::new(close)),
        }
    }

    /// Handle that raises `stop` and wakes `thread` when dropped.  The
    /// thread winds its stream down on its own; dropping never joins it.
    pub fn signal_stop(stop: Arc<AtomicBool>, thread: std::thread::Thread) -> Self {
        Self::new(move || {
            stop.store(true, Ordering::Release);
            thread.unpark();
        })
    }

    /// Handle for a device with nothing to release.
    pub fn detached() -> Self {
        Self { close: None }
    }
}

impl Drop for InputHandle {
    fn drop(&mut self) {
        if let Some(close) = self.close.take() {
            close();
        }
    }
}

impl std::fmt::Debug for InputHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputHandle")
            .field("open", &self.close.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// AudioDevice trait
// ---------------------------------------------------------------------------

/// An audio input the capture session can open.
///
/// Implementations must be `Send + Sync` so one device can be shared by every
/// recognition attempt behind an `Arc<dyn AudioDevice>`.
pub trait AudioDevice: Send + Sync {
    /// Open the device and start forwarding chunks to `tx`.
    ///
    /// May block while the platform opens the stream; async callers run it
    /// on the blocking pool.
    ///
    /// Fails with [`CaptureError::DeviceUnavailable`] without ever sending a
    /// chunk when the device cannot be opened.  When the device stops on its
    /// own, it drops `tx`.
    fn open(&self, tx: mpsc::UnboundedSender<AudioChunk>) -> Result<InputHandle, CaptureError>;
}

// ---------------------------------------------------------------------------
// CpalDevice
// ---------------------------------------------------------------------------

/// Microphone input backed by `cpal`.
#[derive(Debug, Clone, Default)]
pub struct CpalDevice {
    /// Preferred input device name; `None` selects the host default.
    device_name: Option<String>,
}

impl CpalDevice {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

impl AudioDevice for CpalDevice {
    fn open(&self, tx: mpsc::UnboundedSender<AudioChunk>) -> Result<InputHandle, CaptureError> {
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), CaptureError>>();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let device_name = self.device_name.clone();

        let thread = std::thread::Builder::new()
            .name("audio-input".into())
            .spawn(move || {
                let stream = match build_stream(device_name.as_deref(), tx) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                while !stop_flag.load(Ordering::Acquire) {
                    std::thread::park_timeout(Duration::from_millis(50));
                }
                drop(stream);
                log::debug!("capture: input stream closed");
            })
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(InputHandle::signal_stop(stop, thread.thread().clone())),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(CaptureError::DeviceUnavailable(
                "audio input thread exited before opening the device".into(),
            )),
        }
    }
}

fn build_stream(
    device_name: Option<&str>,
    tx: mpsc::UnboundedSender<AudioChunk>,
) -> Result<cpal::Stream, CaptureError> {
    let host = cpal::default_host();

    let device = match device_name {
        Some(wanted) => host
            .input_devices()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| {
                CaptureError::DeviceUnavailable(format!("no input device named {wanted:?}"))
            })?,
        None => host.default_input_device().ok_or_else(|| {
            CaptureError::DeviceUnavailable("no input device found on the default audio host".into())
        })?,
    };

    let supported = device
        .default_input_config()
        .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

    let channels = supported.channels();
    let sample_rate = supported.sample_rate().0;
    let config: cpal::StreamConfig = supported.into();

    log::info!(
        "capture: opened {:?} at {sample_rate} Hz, {channels} channel(s)",
        device.name().unwrap_or_else(|_| "<unnamed>".into())
    );

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Receiver gone means the session is over; nothing to do.
                let _ = tx.send(AudioChunk {
                    samples: data.to_vec(),
                    sample_rate,
                    channels,
                });
            },
            |err: cpal::StreamError| {
                log::error!("capture: cpal stream error: {err}");
            },
            None,
        )
        .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

    stream
        .play()
        .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

    Ok(stream)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
