//! Music recognition and playback engine.
//!
//! Captures a short clip from the microphone, asks a fingerprint service what
//! is playing, and hands a confident match to the player.
//!
//! ```text
//! SessionOrchestrator ──▶ RecognitionCoordinator ──▶ CaptureSession ──▶ AudioDevice
//!        │                        │
//!        │                        └──▶ RecognitionRequest ──▶ Matcher
//!        └──▶ PlaybackController ──▶ Player
//! ```

pub mod assistant;
pub mod audio;
pub mod cancel;
pub mod config;
pub mod error;
pub mod library;
pub mod matcher;
pub mod playback;
pub mod recognition;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use error::ErrorKind;
