//! Terminal outcome of one recognition attempt and candidate ranking.

use serde::Serialize;

use crate::error::ErrorKind;
use crate::matcher::MatchResult;

/// What the coordinator reports, exactly once, for an attempt that was not
/// superseded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RecognitionOutcome {
    /// One candidate cleared the threshold with a clear lead.
    Matched(MatchResult),
    /// Several candidates cleared the threshold within the ambiguity margin;
    /// best first.  The user picks one.
    Ambiguous(Vec<MatchResult>),
    NoMatch,
    Timeout,
    TransportError(String),
    DeviceUnavailable(String),
    /// Cancelled explicitly by the user.
    Cancelled,
}

impl RecognitionOutcome {
    /// Error kind for failure outcomes, `None` for results and cancellation.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            RecognitionOutcome::NoMatch => Some(ErrorKind::NoMatch),
            RecognitionOutcome::Timeout => Some(ErrorKind::Timeout),
            RecognitionOutcome::TransportError(_) => Some(ErrorKind::TransportError),
            RecognitionOutcome::DeviceUnavailable(_) => Some(ErrorKind::DeviceUnavailable),
            RecognitionOutcome::Matched(_)
            | RecognitionOutcome::Ambiguous(_)
            | RecognitionOutcome::Cancelled => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RecognitionOutcome::Matched(_) => "matched",
            RecognitionOutcome::Ambiguous(_) => "ambiguous",
            RecognitionOutcome::NoMatch => "no match",
            RecognitionOutcome::Timeout => "timeout",
            RecognitionOutcome::TransportError(_) => "transport error",
            RecognitionOutcome::DeviceUnavailable(_) => "device unavailable",
            RecognitionOutcome::Cancelled => "cancelled",
        }
    }

    /// Best candidate of a `Matched` or `Ambiguous` outcome.
    pub fn best(&self) -> Option<&MatchResult> {
        match self {
            RecognitionOutcome::Matched(m) => Some(m),
            RecognitionOutcome::Ambiguous(c) => c.first(),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecognitionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecognitionOutcome::Matched(m) => write!(
                f,
                "matched {} - {} ({:.0}%)",
                m.artist(),
                m.title(),
                m.confidence() * 100.0
            ),
            RecognitionOutcome::Ambiguous(c) => write!(f, "{} possible matches", c.len()),
            RecognitionOutcome::TransportError(msg) | RecognitionOutcome::DeviceUnavailable(msg) => {
                write!(f, "{}: {msg}", self.label())
            }
            other => f.write_str(other.label()),
        }
    }
}

/// Turn raw matcher candidates into an outcome.
///
/// Candidates under `threshold` are dropped.  The survivors are ordered best
/// first; when the runner-up is within `margin` of the leader the result is
/// [`RecognitionOutcome::Ambiguous`].
pub fn rank_candidates(
    mut candidates: Vec<MatchResult>,
    threshold: f32,
    margin: f32,
) -> RecognitionOutcome {
    candidates.retain(|c| c.confidence() >= threshold);
    candidates.sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));

    match candidates.as_slice() {
        [] => RecognitionOutcome::NoMatch,
        [first, second, ..] if first.confidence() - second.confidence() <= margin => {
            RecognitionOutcome::Ambiguous(candidates)
        }
        _ => RecognitionOutcome::Matched(candidates.swap_remove(0)),
    }
}
