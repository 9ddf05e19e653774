//! Playback: the state machine around the media player.
//!
//! [`PlaybackController`] owns the single [`PlaybackState`] and drives a
//! [`Player`].  Subscribers get a snapshot after every change.

pub mod controller;
pub mod player;
pub mod state;

pub use controller::{PlaybackController, PlaybackError};
pub use player::{Player, PlayerError, PlayerEvent};
pub use state::{PlaybackState, PlaybackStatus};
