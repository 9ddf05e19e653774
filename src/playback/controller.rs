//! Playback controller: the only writer of [`PlaybackState`].
//!
//! Every operation validates its source state first.  An operation that is
//! not allowed from the current status fails with
//! [`PlaybackError::InvalidTransition`] and touches neither the player nor
//! the state.  Each accepted change publishes a fresh snapshot on the
//! broadcast channel; snapshots are sent while the state lock is held, so
//! subscribers see them in transition order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::config::PlaybackConfig;
use crate::error::ErrorKind;
use crate::matcher::TrackRef;

use super::player::{Player, PlayerError, PlayerEvent};
use super::state::{PlaybackState, PlaybackStatus};

const SNAPSHOT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaybackError {
    #[error("cannot {op} while {from}")]
    InvalidTransition {
        op: &'static str,
        from: PlaybackStatus,
    },

    #[error("player failed: {0}")]
    Decode(String),
}

impl PlaybackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlaybackError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            PlaybackError::Decode(_) => ErrorKind::DecodeError,
        }
    }
}

struct Core {
    player: Box<dyn Player>,
    state: PlaybackState,
}

/// Wraps a [`Player`] in the playback state machine.
///
/// Share it as `Arc<PlaybackController>`; every method takes `&self`.
pub struct PlaybackController {
    core: Mutex<Core>,
    snapshots: broadcast::Sender<PlaybackState>,
    auto_play: bool,
}

impl PlaybackController {
    pub fn new(player: Box<dyn Player>, config: &PlaybackConfig) -> Self {
        let (snapshots, _) = broadcast::channel(SNAPSHOT_CAPACITY);
        Self {
            core: Mutex::new(Core {
                player,
                state: PlaybackState::default(),
            }),
            snapshots,
            auto_play: config.auto_play,
        }
    }

    /// Receive a snapshot after every change from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackState> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> PlaybackState {
        self.core().state.clone()
    }

    pub fn status(&self) -> PlaybackStatus {
        self.core().state.status
    }

    fn core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &PlaybackState) {
        // No subscribers is fine.
        let _ = self.snapshots.send(state.clone());
    }

    fn set_status(&self, core: &mut Core, status: PlaybackStatus) {
        log::debug!("playback: {} → {}", core.state.status, status);
        core.state.status = status;
        if status != PlaybackStatus::Errored {
            core.state.error = None;
        }
        self.publish(&core.state);
    }

    fn fail(&self, core: &mut Core, error: &PlayerError) -> PlaybackError {
        log::error!("playback: {error}");
        core.state.error = Some(error.to_string());
        core.state.status = PlaybackStatus::Errored;
        self.publish(&core.state);
        PlaybackError::Decode(error.to_string())
    }

    fn require(
        core: &Core,
        op: &'static str,
        allowed: &[PlaybackStatus],
    ) -> Result<(), PlaybackError> {
        let from = core.state.status;
        if allowed.contains(&from) {
            Ok(())
        } else {
            Err(Self::rejected(op, from))
        }
    }

    fn rejected(op: &'static str, from: PlaybackStatus) -> PlaybackError {
        log::debug!("playback: rejected {op} while {from}");
        PlaybackError::InvalidTransition { op, from }
    }

    /// Start loading `track`.  Allowed from Idle, Stopped and Errored.
    pub fn load(&self, track: TrackRef) -> Result<(), PlaybackError> {
        let mut core = self.core();
        let from = core.state.status;
        if !from.accepts_load() {
            return Err(Self::rejected("load", from));
        }
        self.begin_load(&mut core, track)
    }

    /// Stop whatever is loaded, then load `track`, under one lock so no
    /// player event can land in between.  Allowed from every status.
    pub fn replace(&self, track: TrackRef) -> Result<(), PlaybackError> {
        let mut core = self.core();
        if core.state.status.is_active() {
            self.halt(&mut core)?;
        }
        self.begin_load(&mut core, track)
    }

    fn begin_load(&self, core: &mut Core, track: TrackRef) -> Result<(), PlaybackError> {
        log::info!("playback: loading {track}");
        core.state.current_track = Some(track.clone());
        core.state.position_ms = 0;
        core.state.duration_ms = None;
        self.set_status(core, PlaybackStatus::Loading);

        if let Err(e) = core.player.load(&track) {
            return Err(self.fail(core, &e));
        }
        Ok(())
    }

    fn halt(&self, core: &mut Core) -> Result<(), PlaybackError> {
        if let Err(e) = core.player.stop() {
            return Err(self.fail(core, &e));
        }
        core.state.position_ms = 0;
        self.set_status(core, PlaybackStatus::Stopped);
        Ok(())
    }

    /// Resume.  Allowed from Paused.
    pub fn play(&self) -> Result<(), PlaybackError> {
        let mut core = self.core();
        Self::require(&core, "play", &[PlaybackStatus::Paused])?;
        if let Err(e) = core.player.play() {
            return Err(self.fail(&mut core, &e));
        }
        self.set_status(&mut core, PlaybackStatus::Playing);
        Ok(())
    }

    /// Allowed from Playing.
    pub fn pause(&self) -> Result<(), PlaybackError> {
        let mut core = self.core();
        Self::require(&core, "pause", &[PlaybackStatus::Playing])?;
        if let Err(e) = core.player.pause() {
            return Err(self.fail(&mut core, &e));
        }
        self.set_status(&mut core, PlaybackStatus::Paused);
        Ok(())
    }

    /// Move to `ms`, clamped into `[0, duration]`.  Allowed from Playing and
    /// Paused.  Returns the position actually sought to.
    pub fn seek(&self, ms: i64) -> Result<u64, PlaybackError> {
        let mut core = self.core();
        Self::require(
            &core,
            "seek",
            &[PlaybackStatus::Playing, PlaybackStatus::Paused],
        )?;

        let mut target = ms.max(0) as u64;
        if let Some(duration) = core.state.duration_ms {
            target = target.min(duration);
        }
        if let Err(e) = core.player.seek(target) {
            return Err(self.fail(&mut core, &e));
        }
        core.state.position_ms = target;
        self.publish(&core.state);
        Ok(target)
    }

    /// Allowed from Loading, Playing and Paused.
    pub fn stop(&self) -> Result<(), PlaybackError> {
        let mut core = self.core();
        Self::require(
            &core,
            "stop",
            &[
                PlaybackStatus::Loading,
                PlaybackStatus::Playing,
                PlaybackStatus::Paused,
            ],
        )?;
        self.halt(&mut core)
    }

    /// Apply one notification from the player.
    pub fn handle_player_event(&self, event: PlayerEvent) {
        let mut core = self.core();
        match event {
            PlayerEvent::Ready { track, duration_ms } => {
                if core.state.status != PlaybackStatus::Loading
                    || core.state.current_track.as_ref() != Some(&track)
                {
                    log::debug!("playback: ignoring stale ready for {track}");
                    return;
                }
                core.state.duration_ms = Some(duration_ms);
                if !self.auto_play {
                    self.set_status(&mut core, PlaybackStatus::Paused);
                    return;
                }
                match core.player.play() {
                    Ok(()) => self.set_status(&mut core, PlaybackStatus::Playing),
                    Err(e) => {
                        self.fail(&mut core, &e);
                    }
                }
            }
            PlayerEvent::Position { ms } => {
                if !matches!(
                    core.state.status,
                    PlaybackStatus::Playing | PlaybackStatus::Paused
                ) {
                    return;
                }
                core.state.position_ms = match core.state.duration_ms {
                    Some(duration) => ms.min(duration),
                    None => ms,
                };
                self.publish(&core.state);
            }
            PlayerEvent::Ended => {
                if core.state.status == PlaybackStatus::Playing {
                    log::info!("playback: track ended");
                    if let Some(duration) = core.state.duration_ms {
                        core.state.position_ms = duration;
                    }
                    self.set_status(&mut core, PlaybackStatus::Stopped);
                }
            }
            PlayerEvent::Failed(msg) => {
                self.fail(&mut core, &PlayerError::Decode(msg));
            }
        }
    }

    /// Feed player notifications into the state machine until the player
    /// side of the channel closes.
    pub async fn pump_events(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<PlayerEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_player_event(event);
        }
        log::debug!("playback: player event stream closed");
    }

    /// Teardown: stop whatever is active and return to a fresh `Idle` state.
    pub fn shutdown(&self) {
        let mut core = self.core();
        if core.state.status.is_active() {
            if let Err(e) = core.player.stop() {
                log::warn!("playback: stop during shutdown failed: {e}");
            }
        }
        core.state = PlaybackState::default();
        self.publish(&core.state);
        log::info!("playback: shut down");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingPlayer, TRACK_MS};

    fn controller(auto_play: bool) -> (PlaybackController, Arc<Mutex<Vec<String>>>) {
        let player = RecordingPlayer::new();
        let calls = Arc::clone(&player.calls);
        let controller = PlaybackController::new(Box::new(player), &PlaybackConfig { auto_play });
        (controller, calls)
    }

    fn ready(c: &PlaybackController, track: &str) {
        c.handle_player_event(PlayerEvent::Ready {
            track: TrackRef::new(track),
            duration_ms: TRACK_MS,
        });
    }

    fn playing(track: &str) -> (PlaybackController, Arc<Mutex<Vec<String>>>) {
        let (c, calls) = controller(true);
        c.load(TrackRef::new(track)).unwrap();
        ready(&c, track);
        assert_eq!(c.status(), PlaybackStatus::Playing);
        (c, calls)
    }

    #[test]
    fn pause_outside_playing_is_rejected_without_side_effects() {
        let (c, calls) = controller(true);
        let mut rx = c.subscribe();

        for _ in 0..2 {
            let err = c.pause().unwrap_err();
            assert_eq!(
                err,
                PlaybackError::InvalidTransition {
                    op: "pause",
                    from: PlaybackStatus::Idle
                }
            );
            assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        }

        c.load(TrackRef::new("a")).unwrap();
        assert!(c.pause().is_err());
        assert_eq!(c.status(), PlaybackStatus::Loading);

        assert_eq!(rx.try_recv().unwrap().status, PlaybackStatus::Loading);
        assert!(rx.try_recv().is_err());
        assert_eq!(*calls.lock().unwrap(), vec!["load a".to_string()]);
    }

    #[test]
    fn load_then_ready_autoplays() {
        let (c, calls) = controller(true);
        let mut rx = c.subscribe();

        c.load(TrackRef::new("a")).unwrap();
        ready(&c, "a");

        assert_eq!(rx.try_recv().unwrap().status, PlaybackStatus::Loading);
        let snap = rx.try_recv().unwrap();
        assert_eq!(snap.status, PlaybackStatus::Playing);
        assert_eq!(snap.duration_ms, Some(TRACK_MS));
        assert_eq!(snap.current_track, Some(TrackRef::new("a")));
        assert_eq!(*calls.lock().unwrap(), vec!["load a", "play"]);
    }

    #[test]
    fn ready_without_autoplay_pauses() {
        let (c, calls) = controller(false);
        c.load(TrackRef::new("a")).unwrap();
        ready(&c, "a");

        assert_eq!(c.status(), PlaybackStatus::Paused);
        assert_eq!(*calls.lock().unwrap(), vec!["load a"]);

        c.play().unwrap();
        assert_eq!(c.status(), PlaybackStatus::Playing);
    }

    #[test]
    fn stale_ready_is_ignored() {
        let (c, _) = controller(true);
        c.load(TrackRef::new("a")).unwrap();
        ready(&c, "b");
        assert_eq!(c.status(), PlaybackStatus::Loading);
    }

    #[test]
    fn seek_clamps_into_track_bounds() {
        let (c, calls) = playing("a");

        assert_eq!(c.seek(-500).unwrap(), 0);
        assert_eq!(c.seek(i64::MAX).unwrap(), TRACK_MS);
        assert_eq!(c.seek(42_000).unwrap(), 42_000);
        assert_eq!(c.snapshot().position_ms, 42_000);

        c.pause().unwrap();
        assert_eq!(c.seek(TRACK_MS as i64 + 1).unwrap(), TRACK_MS);

        let calls = calls.lock().unwrap();
        assert!(calls.contains(&"seek 0".to_string()));
        assert!(calls.contains(&format!("seek {TRACK_MS}")));
    }

    #[test]
    fn seek_requires_a_loaded_track() {
        let (c, _) = controller(true);
        assert!(matches!(
            c.seek(10),
            Err(PlaybackError::InvalidTransition { op: "seek", .. })
        ));
    }

    #[test]
    fn load_is_rejected_while_a_track_is_active() {
        let (c, _) = playing("a");
        assert_eq!(
            c.load(TrackRef::new("b")).unwrap_err(),
            PlaybackError::InvalidTransition {
                op: "load",
                from: PlaybackStatus::Playing
            }
        );
        assert_eq!(c.snapshot().current_track, Some(TrackRef::new("a")));

        c.stop().unwrap();
        assert_eq!(c.status(), PlaybackStatus::Stopped);
        c.load(TrackRef::new("b")).unwrap();
        assert_eq!(c.status(), PlaybackStatus::Loading);
    }

    #[test]
    fn load_follows_accepts_load_for_every_status() {
        let reach = |status: PlaybackStatus| {
            let (c, _) = controller(false);
            match status {
                PlaybackStatus::Idle => {}
                PlaybackStatus::Loading => c.load(TrackRef::new("a")).unwrap(),
                PlaybackStatus::Paused => {
                    c.load(TrackRef::new("a")).unwrap();
                    ready(&c, "a");
                }
                PlaybackStatus::Playing => {
                    c.load(TrackRef::new("a")).unwrap();
                    ready(&c, "a");
                    c.play().unwrap();
                }
                PlaybackStatus::Stopped => {
                    c.load(TrackRef::new("a")).unwrap();
                    c.stop().unwrap();
                }
                PlaybackStatus::Errored => {
                    c.load(TrackRef::new("a")).unwrap();
                    c.handle_player_event(PlayerEvent::Failed("bad frame".into()));
                }
            }
            assert_eq!(c.status(), status);
            c
        };

        for status in [
            PlaybackStatus::Idle,
            PlaybackStatus::Loading,
            PlaybackStatus::Playing,
            PlaybackStatus::Paused,
            PlaybackStatus::Stopped,
            PlaybackStatus::Errored,
        ] {
            let c = reach(status);
            assert_eq!(
                c.load(TrackRef::new("b")).is_ok(),
                status.accepts_load(),
                "load from {status}"
            );
        }
    }

    #[test]
    fn replace_stops_and_loads_in_one_step() {
        let (c, calls) = playing("a");
        let mut rx = c.subscribe();

        c.replace(TrackRef::new("b")).unwrap();
        assert_eq!(rx.try_recv().unwrap().status, PlaybackStatus::Stopped);
        let loading = rx.try_recv().unwrap();
        assert_eq!(loading.status, PlaybackStatus::Loading);
        assert_eq!(loading.current_track, Some(TrackRef::new("b")));
        assert_eq!(*calls.lock().unwrap(), vec!["load a", "play", "stop", "load b"]);
    }

    #[test]
    fn replace_after_the_track_ended_skips_the_stop() {
        let (c, calls) = playing("a");
        c.handle_player_event(PlayerEvent::Ended);

        c.replace(TrackRef::new("b")).unwrap();
        assert_eq!(c.status(), PlaybackStatus::Loading);
        assert_eq!(*calls.lock().unwrap(), vec!["load a", "play", "load b"]);
    }

    #[test]
    fn decode_failure_errors_until_fresh_load() {
        let player = RecordingPlayer::new().failing_load();
        let c = PlaybackController::new(Box::new(player), &PlaybackConfig::default());

        let err = c.load(TrackRef::new("broken")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeError);
        let snap = c.snapshot();
        assert_eq!(snap.status, PlaybackStatus::Errored);
        assert!(snap.error.is_some());

        assert!(c.play().is_err());
        assert!(c.stop().is_err());
        assert_eq!(c.status(), PlaybackStatus::Errored);
    }

    #[test]
    fn player_failure_during_playback_errors() {
        let (c, _) = playing("a");
        c.handle_player_event(PlayerEvent::Failed("stream reset".into()));
        assert_eq!(c.status(), PlaybackStatus::Errored);

        c.load(TrackRef::new("b")).unwrap();
        assert_eq!(c.status(), PlaybackStatus::Loading);
        assert!(c.snapshot().error.is_none());
    }

    #[test]
    fn end_of_track_stops() {
        let (c, _) = playing("a");
        c.handle_player_event(PlayerEvent::Position { ms: 90_000 });
        assert_eq!(c.snapshot().position_ms, 90_000);

        c.handle_player_event(PlayerEvent::Ended);
        let snap = c.snapshot();
        assert_eq!(snap.status, PlaybackStatus::Stopped);
        assert_eq!(snap.position_ms, TRACK_MS);
    }

    #[test]
    fn shutdown_stops_and_resets() {
        let (c, calls) = playing("a");
        c.shutdown();
        assert_eq!(c.snapshot(), PlaybackState::default());
        assert_eq!(calls.lock().unwrap().last().map(String::as_str), Some("stop"));
    }

    #[tokio::test]
    async fn pump_applies_player_events() {
        let (player, events) = RecordingPlayer::with_events();
        let c = Arc::new(PlaybackController::new(
            Box::new(player),
            &PlaybackConfig::default(),
        ));
        let mut rx = c.subscribe();
        tokio::spawn(Arc::clone(&c).pump_events(events));

        c.load(TrackRef::new("a")).unwrap();
        assert_eq!(rx.recv().await.unwrap().status, PlaybackStatus::Loading);
        assert_eq!(rx.recv().await.unwrap().status, PlaybackStatus::Playing);
    }
}
