//! Recognition request: one matcher submission bounded by its own deadline.
//!
//! ```text
//! Pending ──submit──▶ Submitted ──answer──▶ Resolved
//!    │                    ├──deadline────▶ TimedOut
//!    │                    ├──error───────▶ Failed
//!    └────────────────────┴──cancel──────▶ Cancelled
//! ```
//!
//! The deadline is raced against the matcher call, so a collaborator that
//! ignores its own `timeout` still cannot hold the attempt open.  Whichever
//! of cancel, deadline and answer completes first decides the outcome; the
//! losing futures are dropped, which discards any late matcher response.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::audio::{CaptureId, CaptureSession};
use crate::cancel::CancelFlag;
use crate::matcher::{Identification, MatchResult, Matcher, MatcherError};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "request-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// RequestStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RequestStatus {
    Pending,
    Submitted,
    Resolved,
    TimedOut,
    Cancelled,
    Failed,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Resolved
                | RequestStatus::TimedOut
                | RequestStatus::Cancelled
                | RequestStatus::Failed
        )
    }

    fn rank(&self) -> u8 {
        match self {
            RequestStatus::Pending => 0,
            RequestStatus::Submitted => 1,
            _ => 2,
        }
    }
}

// ---------------------------------------------------------------------------
// RecognitionRequest
// ---------------------------------------------------------------------------

/// Bookkeeping for one submission.  The capture it submits is referenced by
/// id only; the recording itself moves into the request task.
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    pub id: RequestId,
    pub capture_session_id: CaptureId,
    pub submitted_at: Instant,
    pub deadline: Instant,
    status: RequestStatus,
    result: Option<MatchResult>,
}

impl RecognitionRequest {
    /// A `Pending` request whose deadline lies `within` from now.
    ///
    /// A zero budget is bumped to one millisecond so the deadline is always
    /// strictly after submission.
    pub fn new(capture_session_id: CaptureId, within: Duration) -> Self {
        let submitted_at = Instant::now();
        let within = within.max(Duration::from_millis(1));
        Self {
            id: RequestId(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)),
            capture_session_id,
            submitted_at,
            deadline: submitted_at + within,
            status: RequestStatus::Pending,
            result: None,
        }
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    /// Best candidate, once `Resolved` with a match.
    pub fn result(&self) -> Option<&MatchResult> {
        self.result.as_ref()
    }

    /// Move forward to `next`.  Returns `false`, leaving the status as is,
    /// when the request is terminal or `next` would go backwards.
    pub fn advance(&mut self, next: RequestStatus) -> bool {
        if self.status.is_terminal() || next.rank() <= self.status.rank() {
            return false;
        }
        log::debug!("request: {} {:?} → {:?}", self.id, self.status, next);
        self.status = next;
        true
    }
}

// ---------------------------------------------------------------------------
// RequestOutcome
// ---------------------------------------------------------------------------

/// What a request resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// Raw candidates, best first.
    Found(Vec<MatchResult>),
    NoMatch,
    Timeout,
    Cancelled,
    TransportError(String),
}

enum Race {
    Cancelled,
    Deadline,
    Answer(Result<Identification, MatcherError>),
}

// ---------------------------------------------------------------------------
// submit
// ---------------------------------------------------------------------------

/// Submit `audio` to `matcher` on a new task.
///
/// The request gives up `deadline` after submission no matter what the
/// matcher does.  Raising `cancel` resolves it as `Cancelled` at the next
/// await point.
///
/// Must be called from within a tokio runtime.
pub fn submit(
    matcher: Arc<dyn Matcher>,
    audio: CaptureSession,
    deadline: Duration,
    cancel: CancelFlag,
) -> RequestHandle {
    let request = RecognitionRequest::new(audio.id, deadline);
    let id = request.id;
    let deadline_at = request.deadline;
    let shared = Arc::new(Mutex::new(request));
    let control = RequestControl {
        id,
        shared: Arc::clone(&shared),
        cancel: cancel.clone(),
    };

    let task = tokio::spawn(async move {
        {
            let mut request = shared.lock().unwrap_or_else(PoisonError::into_inner);
            request.advance(RequestStatus::Submitted);
        }
        log::info!(
            "request: {id} submitted {} ({:.1}s of audio)",
            audio.id,
            audio.duration().as_secs_f32()
        );

        let race = tokio::select! {
            biased;
            _ = cancel.cancelled() => Race::Cancelled,
            _ = tokio::time::sleep_until(deadline_at) => Race::Deadline,
            answer = matcher.identify(&audio, deadline) => Race::Answer(answer),
        };

        finalise(&shared, race)
    });

    RequestHandle { control, task }
}

fn finalise(shared: &Mutex<RecognitionRequest>, race: Race) -> RequestOutcome {
    let mut request = shared.lock().unwrap_or_else(PoisonError::into_inner);
    let id = request.id;

    if request.status() == RequestStatus::Cancelled {
        log::debug!("request: {id} answer discarded after cancel");
        return RequestOutcome::Cancelled;
    }

    match race {
        Race::Cancelled => {
            request.advance(RequestStatus::Cancelled);
            RequestOutcome::Cancelled
        }
        Race::Deadline => {
            log::warn!("request: {id} deadline expired before the matcher answered");
            request.advance(RequestStatus::TimedOut);
            RequestOutcome::Timeout
        }
        Race::Answer(Ok(Identification::Found(candidates))) => {
            request.advance(RequestStatus::Resolved);
            request.result = candidates.first().cloned();
            log::info!("request: {id} resolved with {} candidate(s)", candidates.len());
            RequestOutcome::Found(candidates)
        }
        Race::Answer(Ok(Identification::NoMatch)) => {
            request.advance(RequestStatus::Resolved);
            log::info!("request: {id} resolved without a match");
            RequestOutcome::NoMatch
        }
        Race::Answer(Err(MatcherError::Timeout)) => {
            log::warn!("request: {id} matcher timed out");
            request.advance(RequestStatus::TimedOut);
            RequestOutcome::Timeout
        }
        Race::Answer(Err(e)) => {
            log::warn!("request: {id} failed: {e}");
            request.advance(RequestStatus::Failed);
            RequestOutcome::TransportError(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// RequestControl / RequestHandle
// ---------------------------------------------------------------------------

/// Clonable control surface of an in-flight request.
#[derive(Debug, Clone)]
pub struct RequestControl {
    id: RequestId,
    shared: Arc<Mutex<RecognitionRequest>>,
    cancel: CancelFlag,
}

impl RequestControl {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Mark the request `Cancelled` now and wake its task.  Any answer that
    /// arrives afterwards is discarded.
    pub fn cancel(&self) {
        {
            let mut request = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
            request.advance(RequestStatus::Cancelled);
        }
        self.cancel.cancel();
    }

    pub fn status(&self) -> RequestStatus {
        self.snapshot().status()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn snapshot(&self) -> RecognitionRequest {
        self.shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Owner handle returned by [`submit`].
pub struct RequestHandle {
    control: RequestControl,
    task: JoinHandle<RequestOutcome>,
}

impl RequestHandle {
    pub fn id(&self) -> RequestId {
        self.control.id
    }

    pub fn control(&self) -> RequestControl {
        self.control.clone()
    }

    pub fn cancel(&self) {
        self.control.cancel();
    }

    /// Wait for the single resolution of this request.
    pub async fn outcome(self) -> RequestOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("request: {} task failed: {e}", self.control.id);
                let mut request = self
                    .control
                    .shared
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                request.advance(RequestStatus::Failed);
                RequestOutcome::TransportError(format!("request task failed: {e}"))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
