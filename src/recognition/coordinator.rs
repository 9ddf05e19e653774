//! Recognition coordinator: the single active-attempt slot.
//!
//! ```text
//! Idle ──begin──▶ Capturing ──capture done──▶ Awaiting ──resolved──▶ Resolved ──▶ Idle
//!   ▲                 │                          │
//!   └─────────────────┴──── begin (supersede) ───┘  old attempt cancelled, new one starts
//! ```
//!
//! Every transition happens under the slot lock, and so does every outcome
//! emission.  An attempt may only emit while it is still the slot's current
//! generation, so once a newer attempt has begun nothing from an older one
//! can reach the outcome channel.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::audio::{
    AudioDevice, CaptureControl, CaptureParams, CaptureSession, CaptureStatus, VolumeMonitor,
};
use crate::cancel::CancelFlag;
use crate::config::AppConfig;
use crate::matcher::Matcher;

use super::outcome::{rank_candidates, RecognitionOutcome};
use super::request::{submit, RequestControl, RequestOutcome};

// ---------------------------------------------------------------------------
// State, ids and events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum CoordinatorState {
    #[default]
    Idle,
    Capturing,
    Awaiting,
    Resolved,
}

impl CoordinatorState {
    /// `true` while an attempt occupies the slot.
    pub fn is_active(&self) -> bool {
        matches!(self, CoordinatorState::Capturing | CoordinatorState::Awaiting)
    }
}

/// Generation number of one recognition attempt.  Strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AttemptId(pub u64);

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "attempt-{}", self.0)
    }
}

/// The single outcome of a non-superseded attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeEvent {
    pub attempt: AttemptId,
    pub outcome: RecognitionOutcome,
}

/// Returned by [`RecognitionCoordinator::begin_recognition`].
#[derive(Debug, Clone)]
pub struct AttemptHandle {
    id: AttemptId,
    cancel: CancelFlag,
}

impl AttemptHandle {
    pub fn id(&self) -> AttemptId {
        self.id
    }

    /// `true` once the attempt was superseded or cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

// ---------------------------------------------------------------------------
// RecognitionSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct RecognitionSettings {
    pub capture: CaptureParams,
    /// Per-request deadline, measured from submission.
    pub deadline: Duration,
    pub threshold: f32,
    pub margin: f32,
    /// Frame level under which "volume too low" is reported.
    pub min_volume: f32,
}

impl RecognitionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            capture: CaptureParams::from_config(&config.audio, &config.recognition),
            deadline: config.recognition.deadline(),
            threshold: config.recognition.confidence_threshold,
            margin: config.recognition.ambiguity_margin,
            min_volume: config.audio.min_volume,
        }
    }
}

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Slot {
    state: CoordinatorState,
    generation: u64,
    cancel: Option<CancelFlag>,
    capture: Option<CaptureControl>,
    request: Option<RequestControl>,
}

impl Slot {
    fn is_current(&self, attempt: AttemptId) -> bool {
        self.generation == attempt.0 && self.state.is_active()
    }

    /// Cancel whatever the current attempt is running.
    fn abort(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.cancel();
        }
        if let Some(request) = self.request.take() {
            request.cancel();
        }
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }

    fn clear(&mut self) {
        self.cancel = None;
        self.capture = None;
        self.request = None;
        self.state = CoordinatorState::Idle;
    }
}

struct Inner {
    slot: Mutex<Slot>,
    device: Arc<dyn AudioDevice>,
    matcher: Arc<dyn Matcher>,
    settings: RecognitionSettings,
    events: mpsc::UnboundedSender<OutcomeEvent>,
}

impl Inner {
    fn slot(&self) -> std::sync::MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Emit `outcome` for the slot's current attempt and return to `Idle`.
    /// Caller holds the lock and has checked the generation.
    fn emit(&self, slot: &mut Slot, attempt: AttemptId, outcome: RecognitionOutcome) {
        slot.state = CoordinatorState::Resolved;
        log::info!("coordinator: {attempt} resolved: {outcome}");
        if self.events.send(OutcomeEvent { attempt, outcome }).is_err() {
            log::warn!("coordinator: outcome receiver dropped");
        }
        slot.clear();
    }
}

// ---------------------------------------------------------------------------
// RecognitionCoordinator
// ---------------------------------------------------------------------------

/// Owns the active-recognition slot.  Cheap to clone; clones share the slot.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use music_recognizer::audio::CpalDevice;
/// use music_recognizer::config::AppConfig;
/// use music_recognizer::matcher::HttpMatcher;
/// use music_recognizer::recognition::{RecognitionCoordinator, RecognitionSettings};
///
/// # async fn example() {
/// let config = AppConfig::default();
/// let (coordinator, mut outcomes) = RecognitionCoordinator::new(
///     Arc::new(CpalDevice::new(None)),
///     Arc::new(HttpMatcher::from_config(&config.matcher)),
///     RecognitionSettings::from_config(&config),
/// );
/// coordinator.begin_recognition();
/// if let Some(event) = outcomes.recv().await {
///     println!("{}: {}", event.attempt, event.outcome);
/// }
/// # }
/// ```
#[derive(Clone)]
pub struct RecognitionCoordinator {
    inner: Arc<Inner>,
}

impl RecognitionCoordinator {
    pub fn new(
        device: Arc<dyn AudioDevice>,
        matcher: Arc<dyn Matcher>,
        settings: RecognitionSettings,
    ) -> (Self, mpsc::UnboundedReceiver<OutcomeEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot::default()),
                device,
                matcher,
                settings,
                events,
            }),
        };
        (coordinator, rx)
    }

    pub fn state(&self) -> CoordinatorState {
        self.inner.slot().state
    }

    pub fn settings(&self) -> &RecognitionSettings {
        &self.inner.settings
    }

    /// Attempt currently occupying the slot, if any.
    pub fn active_attempt(&self) -> Option<AttemptId> {
        let slot = self.inner.slot();
        slot.state.is_active().then_some(AttemptId(slot.generation))
    }

    /// Start a new attempt, superseding the active one if there is one.
    ///
    /// The superseded attempt is cancelled and never emits.  The slot moves
    /// to `Capturing` before this returns; the device itself is opened on the
    /// attempt's task, and one that cannot be opened resolves the attempt
    /// with `DeviceUnavailable`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn begin_recognition(&self) -> AttemptHandle {
        let cancel = CancelFlag::new();
        let attempt = {
            let mut slot = self.inner.slot();
            if slot.state.is_active() {
                log::info!(
                    "coordinator: superseding attempt-{} ({:?})",
                    slot.generation,
                    slot.state
                );
                slot.abort();
            }

            slot.generation += 1;
            slot.state = CoordinatorState::Capturing;
            slot.cancel = Some(cancel.clone());
            AttemptId(slot.generation)
        };
        log::info!("coordinator: {attempt} capturing");

        let this = self.clone();
        let flag = cancel.clone();
        tokio::spawn(async move { this.run_attempt(attempt, flag).await });

        AttemptHandle {
            id: attempt,
            cancel,
        }
    }

    /// Cancel the active attempt and report it as `Cancelled`.
    ///
    /// Returns the cancelled attempt, or `None` when the slot was idle.
    pub fn cancel_recognition(&self) -> Option<AttemptId> {
        let mut slot = self.inner.slot();
        if !slot.state.is_active() {
            return None;
        }
        let attempt = AttemptId(slot.generation);
        log::info!("coordinator: {attempt} cancelled by user");
        slot.abort();
        self.inner
            .emit(&mut slot, attempt, RecognitionOutcome::Cancelled);
        Some(attempt)
    }

    async fn run_attempt(&self, attempt: AttemptId, cancel: CancelFlag) {
        let settings = &self.inner.settings;
        let mut monitor = VolumeMonitor::new(settings.min_volume);
        let started = CaptureSession::start(
            Arc::clone(&self.inner.device),
            settings.capture,
            cancel.clone(),
            move |frame| {
                monitor.observe(frame.level);
            },
        )
        .await;

        let capture = {
            let mut slot = self.inner.slot();
            match started {
                Err(e) => {
                    log::error!("coordinator: {attempt} capture failed: {e}");
                    if slot.is_current(attempt) {
                        self.inner.emit(
                            &mut slot,
                            attempt,
                            RecognitionOutcome::DeviceUnavailable(e.to_string()),
                        );
                    }
                    return;
                }
                Ok(capture) if !slot.is_current(attempt) || cancel.is_cancelled() => {
                    capture.cancel();
                    return;
                }
                Ok(capture) => {
                    slot.capture = Some(capture.control());
                    capture
                }
            }
        };

        let session = capture.finish().await;
        if session.status == CaptureStatus::Cancelled {
            log::debug!("coordinator: {attempt} capture cancelled, dropping recording");
            return;
        }

        if session.frames.is_empty() {
            let mut slot = self.inner.slot();
            if slot.is_current(attempt) {
                self.inner.emit(
                    &mut slot,
                    attempt,
                    RecognitionOutcome::DeviceUnavailable("no audio captured".into()),
                );
            }
            return;
        }
        if session.peak_level() < settings.min_volume {
            log::warn!(
                "capture: {attempt} peak level {:.3} is under {:.3}, move closer to the source",
                session.peak_level(),
                settings.min_volume
            );
        }

        let request = {
            let mut slot = self.inner.slot();
            if !slot.is_current(attempt) || cancel.is_cancelled() {
                return;
            }
            slot.state = CoordinatorState::Awaiting;
            slot.capture = None;
            log::info!("coordinator: {attempt} awaiting matcher");
            let request = submit(
                Arc::clone(&self.inner.matcher),
                session,
                settings.deadline,
                cancel,
            );
            slot.request = Some(request.control());
            request
        };

        let outcome = match request.outcome().await {
            RequestOutcome::Found(candidates) => {
                rank_candidates(candidates, settings.threshold, settings.margin)
            }
            RequestOutcome::NoMatch => RecognitionOutcome::NoMatch,
            RequestOutcome::Timeout => RecognitionOutcome::Timeout,
            RequestOutcome::TransportError(msg) => RecognitionOutcome::TransportError(msg),
            RequestOutcome::Cancelled => return,
        };

        let mut slot = self.inner.slot();
        if slot.is_current(attempt) {
            self.inner.emit(&mut slot, attempt, outcome);
        } else {
            log::debug!("coordinator: {attempt} superseded, discarding {}", outcome.label());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
