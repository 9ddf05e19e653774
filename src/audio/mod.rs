//! Audio capture: device input → downmix → resample → fixed frames.
//!
//! # Pipeline
//!
//! ```text
//! AudioDevice (cpal) → AudioChunk (mpsc) → to_mono → resample
//!                    → FrameAssembler → AudioFrame → CaptureSession
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use music_recognizer::audio::{CaptureParams, CaptureSession, CpalDevice};
//! use music_recognizer::cancel::CancelFlag;
//! use music_recognizer::config::AppConfig;
//!
//! # async fn example() {
//! let config = AppConfig::default();
//! let params = CaptureParams::from_config(&config.audio, &config.recognition);
//! let device = Arc::new(CpalDevice::new(None));
//!
//! let handle = CaptureSession::start(device, params, CancelFlag::new(), |frame| {
//!     println!("frame {} level {:.3}", frame.seq, frame.level);
//! })
//! .await
//! .unwrap();
//! let session = handle.finish().await;
//! println!("captured {:?}", session.duration());
//! # }
//! ```

pub mod device;
pub mod frame;
pub mod level;
pub mod resample;
pub mod session;

pub use device::{AudioChunk, AudioDevice, CaptureError, CpalDevice, InputHandle};
pub use frame::{AudioFrame, FrameAssembler};
pub use level::{peak, rms, VolumeMonitor};
pub use resample::{resample, to_mono};
pub use session::{
    CaptureControl, CaptureHandle, CaptureId, CaptureParams, CaptureSession, CaptureStatus,
};
