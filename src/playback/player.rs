//! Player collaborator interface.
//!
//! The player decodes and renders audio; the controller only drives it.
//! Commands are synchronous requests.  Progress (ready, position, end of
//! track, failures) comes back asynchronously as [`PlayerEvent`]s on a
//! channel that [`PlaybackController::pump_events`](super::PlaybackController::pump_events)
//! consumes.

use thiserror::Error;

use crate::error::ErrorKind;
use crate::matcher::TrackRef;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlayerError {
    /// The media could not be decoded or fetched.
    #[error("decode failed: {0}")]
    Decode(String),

    /// The output device or backend is gone.
    #[error("player unavailable: {0}")]
    Unavailable(String),
}

impl PlayerError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::DecodeError
    }
}

/// Notifications from the player.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// `track` finished loading and is ready to start.
    Ready { track: TrackRef, duration_ms: u64 },
    /// Playback position moved.
    Position { ms: u64 },
    /// The current track played to its end.
    Ended,
    /// Decode or network failure during playback.
    Failed(String),
}

/// Media player driven by the playback controller.
pub trait Player: Send {
    /// Begin loading `track`.  Readiness is reported by a later
    /// [`PlayerEvent::Ready`].
    fn load(&mut self, track: &TrackRef) -> Result<(), PlayerError>;
    fn play(&mut self) -> Result<(), PlayerError>;
    fn pause(&mut self) -> Result<(), PlayerError>;
    fn seek(&mut self, position_ms: u64) -> Result<(), PlayerError>;
    fn stop(&mut self) -> Result<(), PlayerError>;
}
