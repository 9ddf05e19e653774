//! Error taxonomy shared by the recognition and playback paths.
//!
//! Each subsystem owns its own `thiserror` enum; every one of them maps onto
//! exactly one [`ErrorKind`] so the UI can decide how to present a failure
//! without knowing which subsystem produced it.

use serde::Serialize;

/// Coarse classification of every failure the engine can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// The microphone could not be opened.
    DeviceUnavailable,
    /// The matcher could not be reached or answered with an error.
    TransportError,
    /// The attempt ran past its deadline.
    Timeout,
    /// The matcher answered but nothing cleared the confidence threshold.
    NoMatch,
    /// A playback command was issued from a state that does not accept it.
    InvalidTransition,
    /// The player failed to load or render a track.
    DecodeError,
}

impl ErrorKind {
    /// Recoverable failures may be retried by a fresh, explicit
    /// `begin_recognition()`.  Nothing is retried automatically.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorKind::TransportError | ErrorKind::Timeout | ErrorKind::NoMatch
        )
    }

    /// Whether the UI should offer a "try again" affordance.
    ///
    /// ```
    /// use music_recognizer::ErrorKind;
    ///
    /// assert!(ErrorKind::TransportError.suggests_retry());
    /// assert!(!ErrorKind::Timeout.suggests_retry());
    /// ```
    pub fn suggests_retry(&self) -> bool {
        matches!(self, ErrorKind::TransportError)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::DeviceUnavailable => "Microphone unavailable",
            ErrorKind::TransportError => "Network error",
            ErrorKind::Timeout => "Timed out",
            ErrorKind::NoMatch => "No match found",
            ErrorKind::InvalidTransition => "Not allowed right now",
            ErrorKind::DecodeError => "Playback failed",
        }
    }
}
