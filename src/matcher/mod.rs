//! Fingerprint matcher collaborator.
//!
//! [`Matcher`] is the opaque service that maps captured audio to catalog
//! tracks.  It is network-backed in production ([`HttpMatcher`]) and
//! therefore slow and fallible; the recognition request wraps every call in
//! its own deadline regardless of what the matcher does with `timeout`.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use music_recognizer::config::MatcherConfig;
//! use music_recognizer::matcher::{HttpMatcher, Matcher};
//!
//! # async fn example(audio: music_recognizer::audio::CaptureSession) {
//! let matcher = HttpMatcher::from_config(&MatcherConfig::default());
//! let answer = matcher.identify(&audio, Duration::from_secs(10)).await;
//! # }
//! ```

pub mod http;
pub mod response;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::audio::CaptureSession;
use crate::error::ErrorKind;

pub use http::{encode_pcm16, HttpMatcher};
pub use response::parse_identify;

// ---------------------------------------------------------------------------
// TrackRef
// ---------------------------------------------------------------------------

/// Opaque reference a player knows how to load (file path, URI, catalog id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TrackRef(String);

impl TrackRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TrackRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// MatchResult
// ---------------------------------------------------------------------------

/// One catalog track the matcher believes it heard.
///
/// Immutable once constructed; `confidence` is always within `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    track_id: String,
    title: String,
    artist: String,
    confidence: f32,
    playable: TrackRef,
}

impl MatchResult {
    /// # Errors
    ///
    /// [`MatcherError::InvalidScore`] when `confidence` is NaN or outside
    /// `[0, 1]`.
    pub fn new(
        track_id: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
        confidence: f32,
        playable: TrackRef,
    ) -> Result<Self, MatcherError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(MatcherError::InvalidScore(confidence));
        }
        Ok(Self {
            track_id: track_id.into(),
            title: title.into(),
            artist: artist.into(),
            confidence,
            playable,
        })
    }

    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn artist(&self) -> &str {
        &self.artist
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn playable(&self) -> &TrackRef {
        &self.playable
    }
}

// ---------------------------------------------------------------------------
// Identification
// ---------------------------------------------------------------------------

/// A successful matcher answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Identification {
    /// Candidates, best first.  Never empty.
    Found(Vec<MatchResult>),
    NoMatch,
}

impl Identification {
    /// `Found` for a non-empty list, `NoMatch` otherwise.  Sorts best first.
    pub fn from_candidates(mut candidates: Vec<MatchResult>) -> Self {
        if candidates.is_empty() {
            return Identification::NoMatch;
        }
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Identification::Found(candidates)
    }
}

// ---------------------------------------------------------------------------
// MatcherError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatcherError {
    /// HTTP transport or connection failure.
    #[error("matcher request failed: {0}")]
    Transport(String),

    /// The collaborator's own timeout fired.
    #[error("matcher request timed out")]
    Timeout,

    /// The service answered with a non-success status code.
    #[error("matcher service error {code}: {message}")]
    Service { code: i64, message: String },

    /// The response body was not understood.
    #[error("failed to parse matcher response: {0}")]
    Parse(String),

    #[error("confidence score {0} is outside [0, 1]")]
    InvalidScore(f32),
}

impl MatcherError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MatcherError::Timeout => ErrorKind::Timeout,
            _ => ErrorKind::TransportError,
        }
    }
}

impl From<reqwest::Error> for MatcherError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            MatcherError::Timeout
        } else {
            MatcherError::Transport(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Matcher trait
// ---------------------------------------------------------------------------

/// Opaque audio-to-track matching service.
///
/// Implementations must be `Send + Sync` so one matcher can serve every
/// attempt behind an `Arc<dyn Matcher>`.  Dropping the returned future
/// abandons the call; implementations must tolerate that.
#[async_trait]
pub trait Matcher: Send + Sync {
    async fn identify(
        &self,
        audio: &CaptureSession,
        timeout: Duration,
    ) -> Result<Identification, MatcherError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
