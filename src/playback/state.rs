//! Playback state snapshot.

use serde::Serialize;

use crate::matcher::TrackRef;

/// Status of the playback state machine.
///
/// ```text
/// Idle/Stopped/Errored ──load──▶ Loading ──ready──▶ Playing (auto-play)
///                                                 └▶ Paused
/// Playing ◀──play/pause──▶ Paused
/// Loading/Playing/Paused ──stop──▶ Stopped
/// Playing ──ended──▶ Stopped
/// any ──player failure──▶ Errored
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Stopped,
    Errored,
}

impl PlaybackStatus {
    /// `true` when a new track may be loaded.
    ///
    /// ```
    /// use music_recognizer::playback::PlaybackStatus;
    ///
    /// assert!(PlaybackStatus::Idle.accepts_load());
    /// assert!(PlaybackStatus::Errored.accepts_load());
    /// assert!(!PlaybackStatus::Playing.accepts_load());
    /// ```
    pub fn accepts_load(&self) -> bool {
        matches!(
            self,
            PlaybackStatus::Idle | PlaybackStatus::Stopped | PlaybackStatus::Errored
        )
    }

    /// `true` while a track is loaded or loading.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PlaybackStatus::Loading | PlaybackStatus::Playing | PlaybackStatus::Paused
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            PlaybackStatus::Idle => "Idle",
            PlaybackStatus::Loading => "Loading",
            PlaybackStatus::Playing => "Playing",
            PlaybackStatus::Paused => "Paused",
            PlaybackStatus::Stopped => "Stopped",
            PlaybackStatus::Errored => "Error",
        }
    }
}

impl std::fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The process-wide playback state.  Only the controller mutates it;
/// everyone else sees copies.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PlaybackState {
    pub current_track: Option<TrackRef>,
    pub position_ms: u64,
    /// Known once the player reports the track ready.
    pub duration_ms: Option<u64>,
    pub status: PlaybackStatus,
    /// Last player failure, set while `Errored`.
    pub error: Option<String>,
}
