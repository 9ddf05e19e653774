//! Test doubles for the three collaborators: audio device, matcher, player.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Notify};

use crate::audio::{AudioChunk, AudioDevice, CaptureError, CaptureSession, InputHandle};
use crate::matcher::{Identification, MatchResult, Matcher, MatcherError, TrackRef};
use crate::playback::{Player, PlayerError, PlayerEvent};

const CHUNK: usize = 1024;
const LEVEL: f32 = 0.3;

// ---------------------------------------------------------------------------
// ScriptedDevice
// ---------------------------------------------------------------------------

/// Audio device that delivers a fixed amount of constant-level audio the
/// moment it is opened.
pub(crate) struct ScriptedDevice {
    available: bool,
    samples_per_channel: usize,
    sample_rate: u32,
    channels: u16,
    held_open: bool,
    pub opened: Arc<AtomicUsize>,
}

impl ScriptedDevice {
    pub fn seconds(secs: f64, sample_rate: u32) -> Self {
        Self {
            available: true,
            samples_per_channel: (secs * sample_rate as f64).round() as usize,
            sample_rate,
            channels: 1,
            held_open: false,
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn silent() -> Self {
        Self::seconds(0.0, 44_100)
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::silent()
        }
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    /// Keep the stream open after the scripted audio, like a live mic that
    /// has gone quiet.
    pub fn held_open(mut self) -> Self {
        self.held_open = true;
        self
    }
}

impl AudioDevice for ScriptedDevice {
    fn open(&self, tx: mpsc::UnboundedSender<AudioChunk>) -> Result<InputHandle, CaptureError> {
        if !self.available {
            return Err(CaptureError::DeviceUnavailable("scripted device".into()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);

        let channels = self.channels.max(1) as usize;
        let mut remaining = self.samples_per_channel;
        while remaining > 0 {
            let n = remaining.min(CHUNK);
            let _ = tx.send(AudioChunk {
                samples: vec![LEVEL; n * channels],
                sample_rate: self.sample_rate,
                channels: self.channels.max(1),
            });
            remaining -= n;
        }

        if self.held_open {
            Ok(InputHandle::new(move || drop(tx)))
        } else {
            Ok(InputHandle::detached())
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedMatcher
// ---------------------------------------------------------------------------

pub(crate) type Answer = Result<Identification, MatcherError>;

/// What the matcher does on one call.
pub(crate) enum Script {
    Respond(Answer),
    Delay(Duration, Answer),
    /// Wait until the test releases the answer through the paired sender.
    Gate(oneshot::Receiver<Answer>),
    Hang,
}

/// Matcher that replays one [`Script`] per call, in order.  Calls past the
/// end of the script answer `NoMatch`.
pub(crate) struct ScriptedMatcher {
    scripts: Mutex<VecDeque<Script>>,
    calls: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    called: Notify,
}

impl ScriptedMatcher {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            calls: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            called: Notify::new(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Resolves once `identify` has been entered at least `n` times.
    pub async fn wait_for_calls(&self, n: usize) {
        loop {
            let notified = self.called.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.calls() >= n {
                return;
            }
            notified.await;
        }
    }
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Matcher for ScriptedMatcher {
    async fn identify(
        &self,
        _audio: &CaptureSession,
        _timeout: Duration,
    ) -> Result<Identification, MatcherError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(Arc::clone(&self.in_flight));

        let script = self.scripts.lock().unwrap().pop_front();
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.called.notify_waiters();

        match script {
            None => Ok(Identification::NoMatch),
            Some(Script::Respond(answer)) => answer,
            Some(Script::Delay(wait, answer)) => {
                tokio::time::sleep(wait).await;
                answer
            }
            Some(Script::Gate(rx)) => match rx.await {
                Ok(answer) => answer,
                Err(_) => std::future::pending().await,
            },
            Some(Script::Hang) => std::future::pending().await,
        }
    }
}

pub(crate) fn candidate(id: &str, confidence: f32) -> MatchResult {
    MatchResult::new(
        id,
        format!("Title {id}"),
        "Artist",
        confidence,
        TrackRef::new(format!("track:{id}")),
    )
    .unwrap()
}

pub(crate) fn found(id: &str, confidence: f32) -> Answer {
    Ok(Identification::Found(vec![candidate(id, confidence)]))
}

// ---------------------------------------------------------------------------
// RecordingPlayer
// ---------------------------------------------------------------------------

/// Player that records every call and reports `Ready` for each load.
pub(crate) struct RecordingPlayer {
    pub calls: Arc<Mutex<Vec<String>>>,
    events: Option<mpsc::UnboundedSender<PlayerEvent>>,
    fail_load: bool,
}

pub(crate) const TRACK_MS: u64 = 180_000;

impl RecordingPlayer {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            events: None,
            fail_load: false,
        }
    }

    /// Player whose `load` also emits `Ready` on the returned stream.
    pub fn with_events() -> (Self, mpsc::UnboundedReceiver<PlayerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let player = Self {
            events: Some(tx),
            ..Self::new()
        };
        (player, rx)
    }

    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Player for RecordingPlayer {
    fn load(&mut self, track: &TrackRef) -> Result<(), PlayerError> {
        self.record(format!("load {track}"));
        if self.fail_load {
            return Err(PlayerError::Decode(format!("cannot decode {track}")));
        }
        if let Some(events) = &self.events {
            let _ = events.send(PlayerEvent::Ready {
                track: track.clone(),
                duration_ms: TRACK_MS,
            });
        }
        Ok(())
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        self.record("play".into());
        Ok(())
    }

    fn pause(&mut self) -> Result<(), PlayerError> {
        self.record("pause".into());
        Ok(())
    }

    fn seek(&mut self, position_ms: u64) -> Result<(), PlayerError> {
        self.record(format!("seek {position_ms}"));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PlayerError> {
        self.record("stop".into());
        Ok(())
    }
}
