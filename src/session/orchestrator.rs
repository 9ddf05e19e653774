//! Session orchestrator: binds recognition outcomes to playback.
//!
//! ```text
//! SessionCommand ──▶ SessionOrchestrator ──begin──▶ RecognitionCoordinator
//!                          ▲                               │
//!                          └──────── OutcomeEvent ◀────────┘
//!                          │
//!                          └──load/stop/transport──▶ PlaybackController
//! ```
//!
//! Every resolved attempt is recorded and surfaced.  A `Matched` outcome
//! auto-loads its track only when it belongs to the latest attempt and the
//! user has not taken a playback action since that attempt began.  Every
//! other outcome leaves playback alone.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::error::ErrorKind;
use crate::matcher::{MatchResult, TrackRef};
use crate::playback::{PlaybackController, PlaybackError};
use crate::recognition::{AttemptId, OutcomeEvent, RecognitionCoordinator, RecognitionOutcome};

use super::record::SessionRecord;

// ---------------------------------------------------------------------------
// Commands, events, errors
// ---------------------------------------------------------------------------

/// User-facing actions.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    BeginRecognition,
    CancelRecognition,
    /// Pick one candidate of the last ambiguous outcome.
    SelectCandidate(usize),
    PlayTrack(TrackRef),
    Play,
    Pause,
    Seek(i64),
    Stop,
}

/// What the orchestrator reports back to the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    RecognitionStarted {
        attempt: AttemptId,
    },
    Outcome {
        attempt: AttemptId,
        outcome: RecognitionOutcome,
        auto_played: bool,
    },
    CommandFailed {
        command: SessionCommand,
        error: SessionError,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("no candidate #{0} to choose from")]
    NoSuchCandidate(usize),

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::NoSuchCandidate(_) => ErrorKind::InvalidTransition,
            SessionError::Playback(e) => e.kind(),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionOrchestrator
// ---------------------------------------------------------------------------

pub struct SessionOrchestrator {
    coordinator: RecognitionCoordinator,
    outcomes: mpsc::UnboundedReceiver<OutcomeEvent>,
    playback: Arc<PlaybackController>,
    threshold: f32,
    events: mpsc::UnboundedSender<SessionEvent>,
    /// Newest attempt started; older outcomes are stale.
    latest_attempt: Option<AttemptId>,
    /// Bumped on every user playback action.
    user_actions: u64,
    /// `user_actions` when the latest attempt began.
    actions_at_begin: u64,
    /// Candidates of the last ambiguous outcome.
    choices: Vec<MatchResult>,
    record: SessionRecord,
}

impl SessionOrchestrator {
    pub fn new(
        coordinator: RecognitionCoordinator,
        outcomes: mpsc::UnboundedReceiver<OutcomeEvent>,
        playback: Arc<PlaybackController>,
        threshold: f32,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let orchestrator = Self {
            coordinator,
            outcomes,
            playback,
            threshold,
            events,
            latest_attempt: None,
            user_actions: 0,
            actions_at_begin: 0,
            choices: Vec::new(),
            record: SessionRecord::new(),
        };
        (orchestrator, rx)
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn playback(&self) -> &Arc<PlaybackController> {
        &self.playback
    }

    /// Candidates awaiting a user choice.
    pub fn choices(&self) -> &[MatchResult] {
        &self.choices
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Start (or restart) recognition.
    pub fn begin_recognition(&mut self) -> AttemptId {
        let attempt = self.coordinator.begin_recognition().id();
        self.latest_attempt = Some(attempt);
        self.actions_at_begin = self.user_actions;
        self.choices.clear();
        log::info!("session: {attempt} started");
        self.emit(SessionEvent::RecognitionStarted { attempt });
        attempt
    }

    pub fn cancel_recognition(&mut self) -> Option<AttemptId> {
        self.coordinator.cancel_recognition()
    }

    /// Play `track` on direct user request, replacing whatever is loaded.
    pub fn play_track(&mut self, track: TrackRef) -> Result<(), SessionError> {
        self.user_actions += 1;
        self.replace_track(track)
    }

    /// Play candidate `index` of the last ambiguous outcome.
    pub fn select_candidate(&mut self, index: usize) -> Result<TrackRef, SessionError> {
        let track = self
            .choices
            .get(index)
            .map(|c| c.playable().clone())
            .ok_or(SessionError::NoSuchCandidate(index))?;
        self.user_actions += 1;
        self.replace_track(track.clone())?;
        self.choices.clear();
        Ok(track)
    }

    fn replace_track(&self, track: TrackRef) -> Result<(), SessionError> {
        self.playback.replace(track)?;
        Ok(())
    }

    /// Apply one coordinator outcome and return whether it auto-played.
    ///
    /// Every outcome is recorded and surfaced.  An outcome from an attempt
    /// older than the latest one resolved before the user re-triggered, so
    /// it never touches playback or the pending choices.
    pub fn handle_outcome(&mut self, event: OutcomeEvent) -> bool {
        let OutcomeEvent { attempt, outcome } = event;
        let stale = self.latest_attempt.is_some_and(|latest| attempt < latest);

        let mut auto_played = false;
        match &outcome {
            _ if stale => log::info!("session: {attempt} {outcome} (superseded by a newer attempt)"),
            RecognitionOutcome::Matched(m) if m.confidence() >= self.threshold => {
                if self.user_actions != self.actions_at_begin {
                    log::info!("session: {attempt} matched but the user took over playback");
                } else {
                    match self.replace_track(m.playable().clone()) {
                        Ok(()) => auto_played = true,
                        Err(e) => log::warn!("session: auto-play of {} failed: {e}", m.playable()),
                    }
                }
            }
            RecognitionOutcome::Ambiguous(candidates) => {
                log::info!("session: {attempt} needs a choice among {}", candidates.len());
                self.choices = candidates.clone();
            }
            other => log::info!("session: {attempt} {other}"),
        }
        if !stale {
            self.latest_attempt = Some(attempt);
        }

        self.record.push(attempt, outcome.clone(), auto_played);
        self.emit(SessionEvent::Outcome {
            attempt,
            outcome,
            auto_played,
        });
        auto_played
    }

    /// Wait for the next coordinator outcome and apply it.  `None` once the
    /// coordinator is gone.
    pub async fn next_outcome(&mut self) -> Option<bool> {
        let event = self.outcomes.recv().await?;
        Some(self.handle_outcome(event))
    }

    pub fn handle_command(&mut self, command: SessionCommand) -> Result<(), SessionError> {
        log::debug!("session: command {command:?}");
        match command {
            SessionCommand::BeginRecognition => {
                self.begin_recognition();
            }
            SessionCommand::CancelRecognition => {
                self.cancel_recognition();
            }
            SessionCommand::SelectCandidate(index) => {
                self.select_candidate(index)?;
            }
            SessionCommand::PlayTrack(track) => self.play_track(track)?,
            SessionCommand::Play => {
                self.user_actions += 1;
                self.playback.play()?;
            }
            SessionCommand::Pause => {
                self.user_actions += 1;
                self.playback.pause()?;
            }
            SessionCommand::Seek(ms) => {
                self.user_actions += 1;
                self.playback.seek(ms)?;
            }
            SessionCommand::Stop => {
                self.user_actions += 1;
                self.playback.stop()?;
            }
        }
        Ok(())
    }

    /// Serve commands and outcomes until either channel closes, then tear
    /// down playback and hand back the session record.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) -> SessionRecord {
        log::info!("session: orchestrator running");
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if let Err(error) = self.handle_command(command.clone()) {
                        log::warn!("session: {command:?} failed: {error}");
                        self.emit(SessionEvent::CommandFailed { command, error });
                    }
                }
                event = self.outcomes.recv() => {
                    let Some(event) = event else { break };
                    self.handle_outcome(event);
                }
            }
        }

        self.coordinator.cancel_recognition();
        self.playback.shutdown();
        log::info!("session: orchestrator stopped");
        self.record
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::{broadcast, oneshot};

    use super::*;
    use crate::audio::CaptureParams;
    use crate::config::PlaybackConfig;
    use crate::matcher::Identification;
    use crate::playback::{PlaybackState, PlaybackStatus};
    use crate::recognition::{CoordinatorState, RecognitionSettings};
    use crate::testing::{candidate, found, RecordingPlayer, Script, ScriptedDevice, ScriptedMatcher};

    struct Rig {
        orchestrator: SessionOrchestrator,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        matcher: Arc<ScriptedMatcher>,
        playback: Arc<PlaybackController>,
        snapshots: broadcast::Receiver<PlaybackState>,
        player_calls: Arc<std::sync::Mutex<Vec<String>>>,
    }

    fn rig(scripts: Vec<Script>) -> Rig {
        let settings = RecognitionSettings {
            capture: CaptureParams {
                max_duration: Duration::from_secs(3),
                sample_rate: 44_100,
                frame_samples: 4_410,
            },
            deadline: Duration::from_secs(15),
            threshold: 0.8,
            margin: 0.05,
            min_volume: 0.1,
        };
        let matcher = Arc::new(ScriptedMatcher::new(scripts));
        let (coordinator, outcomes) = RecognitionCoordinator::new(
            Arc::new(ScriptedDevice::seconds(3.0, 44_100)),
            matcher.clone(),
            settings,
        );

        let (player, player_events) = RecordingPlayer::with_events();
        let player_calls = Arc::clone(&player.calls);
        let playback = Arc::new(PlaybackController::new(
            Box::new(player),
            &PlaybackConfig::default(),
        ));
        tokio::spawn(Arc::clone(&playback).pump_events(player_events));
        let snapshots = playback.subscribe();

        let (orchestrator, events) =
            SessionOrchestrator::new(coordinator, outcomes, Arc::clone(&playback), 0.8);
        Rig {
            orchestrator,
            events,
            matcher,
            playback,
            snapshots,
            player_calls,
        }
    }

    async fn wait_for(snapshots: &mut broadcast::Receiver<PlaybackState>, status: PlaybackStatus) {
        loop {
            if snapshots.recv().await.unwrap().status == status {
                return;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn confident_match_autoplays_through_one_loading() {
        let mut r = rig(vec![Script::Respond(found("hit", 0.92))]);

        let attempt = r.orchestrator.begin_recognition();
        assert_eq!(r.orchestrator.next_outcome().await, Some(true));

        let loading = r.snapshots.recv().await.unwrap();
        assert_eq!(loading.status, PlaybackStatus::Loading);
        assert_eq!(loading.current_track, Some(TrackRef::new("track:hit")));
        assert_eq!(r.snapshots.recv().await.unwrap().status, PlaybackStatus::Playing);

        let entry = r.orchestrator.record().last().unwrap();
        assert_eq!(entry.attempt, attempt);
        assert!(entry.auto_played);

        assert_eq!(
            r.events.recv().await.unwrap(),
            SessionEvent::RecognitionStarted { attempt }
        );
        assert!(matches!(
            r.events.recv().await.unwrap(),
            SessionEvent::Outcome { auto_played: true, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_leaves_playback_untouched() {
        let mut r = rig(vec![Script::Hang]);

        r.orchestrator.begin_recognition();
        assert_eq!(r.orchestrator.next_outcome().await, Some(false));

        assert_eq!(
            r.orchestrator.record().last().unwrap().outcome,
            RecognitionOutcome::Timeout
        );
        assert_eq!(r.playback.snapshot(), PlaybackState::default());
        assert!(r.snapshots.try_recv().is_err());
        assert!(r.player_calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_result_never_reaches_playback() {
        let (gate_tx, gate_rx) = oneshot::channel();
        let mut r = rig(vec![
            Script::Gate(gate_rx),
            Script::Respond(found("second", 0.9)),
        ]);

        r.orchestrator.begin_recognition();
        r.matcher.wait_for_calls(1).await;
        let second = r.orchestrator.begin_recognition();
        let _ = gate_tx.send(found("first", 0.99));

        assert_eq!(r.orchestrator.next_outcome().await, Some(true));
        assert_eq!(r.orchestrator.record().len(), 1);
        assert_eq!(r.orchestrator.record().entries()[0].attempt, second);
        assert_eq!(
            r.playback.snapshot().current_track,
            Some(TrackRef::new("track:second"))
        );
    }

    #[tokio::test]
    async fn outcome_of_an_older_attempt_is_recorded_but_never_played() {
        let mut r = rig(vec![Script::Hang]);
        r.orchestrator.begin_recognition();

        let older = OutcomeEvent {
            attempt: AttemptId(0),
            outcome: RecognitionOutcome::Matched(candidate("old", 0.99)),
        };
        assert!(!r.orchestrator.handle_outcome(older));
        assert_eq!(r.orchestrator.record().len(), 1);
        assert_eq!(r.orchestrator.record().entries()[0].attempt, AttemptId(0));
        assert!(!r.orchestrator.record().entries()[0].auto_played);
        assert_eq!(r.playback.status(), PlaybackStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_resolved_before_a_retrigger_is_still_recorded() {
        let mut r = rig(vec![Script::Respond(Ok(Identification::NoMatch)), Script::Hang]);

        let first = r.orchestrator.begin_recognition();
        while r.orchestrator.coordinator.state() != CoordinatorState::Idle {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let second = r.orchestrator.begin_recognition();

        assert_eq!(r.orchestrator.next_outcome().await, Some(false));
        assert_eq!(r.orchestrator.record().len(), 1);
        let entry = &r.orchestrator.record().entries()[0];
        assert_eq!(entry.attempt, first);
        assert_eq!(entry.outcome, RecognitionOutcome::NoMatch);

        assert_eq!(r.orchestrator.next_outcome().await, Some(false));
        let last = r.orchestrator.record().last().unwrap();
        assert_eq!(last.attempt, second);
        assert_eq!(last.outcome, RecognitionOutcome::Timeout);
        assert_eq!(r.orchestrator.record().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn user_action_during_recognition_blocks_autoplay() {
        let (gate_tx, gate_rx) = oneshot::channel();
        let mut r = rig(vec![Script::Gate(gate_rx)]);

        r.orchestrator.begin_recognition();
        r.matcher.wait_for_calls(1).await;
        r.orchestrator.play_track(TrackRef::new("manual")).unwrap();
        let _ = gate_tx.send(found("hit", 0.95));

        assert_eq!(r.orchestrator.next_outcome().await, Some(false));
        assert!(matches!(
            r.orchestrator.record().last().unwrap().outcome,
            RecognitionOutcome::Matched(_)
        ));
        assert_eq!(
            r.playback.snapshot().current_track,
            Some(TrackRef::new("manual"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ambiguous_outcome_waits_for_a_choice() {
        let answer = Ok(Identification::Found(vec![
            candidate("a", 0.9),
            candidate("b", 0.88),
        ]));
        let mut r = rig(vec![Script::Respond(answer)]);

        r.orchestrator.begin_recognition();
        assert_eq!(r.orchestrator.next_outcome().await, Some(false));
        assert_eq!(r.playback.status(), PlaybackStatus::Idle);
        assert_eq!(r.orchestrator.choices().len(), 2);

        assert_eq!(
            r.orchestrator.select_candidate(5).unwrap_err(),
            SessionError::NoSuchCandidate(5)
        );
        let picked = r.orchestrator.select_candidate(1).unwrap();
        assert_eq!(picked, TrackRef::new("track:b"));
        assert!(r.orchestrator.choices().is_empty());
        wait_for(&mut r.snapshots, PlaybackStatus::Playing).await;
    }

    #[tokio::test]
    async fn replacing_a_playing_track_stops_it_first() {
        let mut r = rig(Vec::new());

        r.orchestrator.play_track(TrackRef::new("one")).unwrap();
        wait_for(&mut r.snapshots, PlaybackStatus::Playing).await;

        r.orchestrator.play_track(TrackRef::new("two")).unwrap();
        wait_for(&mut r.snapshots, PlaybackStatus::Playing).await;

        assert_eq!(
            *r.player_calls.lock().unwrap(),
            vec!["load one", "play", "stop", "load two", "play"]
        );
    }

    #[tokio::test]
    async fn transport_commands_report_invalid_transitions() {
        let mut r = rig(Vec::new());
        let err = r.orchestrator.handle_command(SessionCommand::Pause).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(r.playback.status(), PlaybackStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_serves_commands_and_outcomes() {
        let r = rig(vec![Script::Respond(found("hit", 0.95))]);
        let mut events = r.events;
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(r.orchestrator.run(rx));

        tx.send(SessionCommand::BeginRecognition).await.unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::RecognitionStarted { .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::Outcome { auto_played: true, .. }
        ));

        tx.send(SessionCommand::SelectCandidate(0)).await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::CommandFailed {
                command: SessionCommand::SelectCandidate(0),
                error: SessionError::NoSuchCandidate(0),
            }
        );

        drop(tx);
        let record = task.await.unwrap();
        assert_eq!(record.len(), 1);
        assert_eq!(r.playback.status(), PlaybackStatus::Idle);
    }
}
