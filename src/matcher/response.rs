//! Parsing of the identify service's JSON envelope.
//!
//! ```text
//! {
//!   "status":   { "code": 0, "msg": "Success" },
//!   "metadata": {
//!     "music":   [ { "acrid": "...", "title": "...", "score": 92,
//!                    "artists": [ { "name": "..." } ],
//!                    "external_metadata": { "spotify": { "track": { "id": "..." } } } } ],
//!     "humming": [ ... ]
//!   }
//! }
//! ```
//!
//! Status `0` carries candidates, `1001` means nothing matched, anything else
//! is a service failure.  Exact-fingerprint results (`music`) win over
//! humming results when both are present.

use serde::Deserialize;

use super::{Identification, MatchResult, MatcherError, TrackRef};

const STATUS_OK: i64 = 0;
const STATUS_NO_RESULT: i64 = 1001;

#[derive(Debug, Deserialize)]
struct Envelope {
    status: Status,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
struct Status {
    code: i64,
    #[serde(default)]
    msg: String,
}

#[derive(Debug, Default, Deserialize)]
struct Metadata {
    #[serde(default)]
    music: Vec<Track>,
    #[serde(default)]
    humming: Vec<Track>,
}

#[derive(Debug, Deserialize)]
struct Track {
    #[serde(default)]
    acrid: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    artists: Vec<Artist>,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    external_metadata: ExternalMetadata,
}

#[derive(Debug, Deserialize)]
struct Artist {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalMetadata {
    #[serde(default)]
    spotify: Option<ExternalTrack>,
    #[serde(default)]
    deezer: Option<ExternalTrack>,
}

#[derive(Debug, Deserialize)]
struct ExternalTrack {
    track: ExternalId,
}

#[derive(Debug, Deserialize)]
struct ExternalId {
    id: serde_json::Value,
}

impl ExternalId {
    fn as_string(&self) -> Option<String> {
        match &self.id {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Scores are reported either as a unit score or as a percentage.
fn normalise_score(raw: f64) -> f32 {
    let unit = if raw > 1.0 { raw / 100.0 } else { raw };
    unit.clamp(0.0, 1.0) as f32
}

fn playable_for(track: &Track) -> TrackRef {
    let external = &track.external_metadata;
    if let Some(id) = external.spotify.as_ref().and_then(|t| t.track.as_string()) {
        return TrackRef::new(format!("spotify:track:{id}"));
    }
    if let Some(id) = external.deezer.as_ref().and_then(|t| t.track.as_string()) {
        return TrackRef::new(format!("deezer:track:{id}"));
    }
    TrackRef::new(format!("acrcloud:{}", track.acrid))
}

fn to_match(track: &Track) -> Result<MatchResult, MatcherError> {
    let title = track
        .title
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or("Unknown");
    let artist = track
        .artists
        .first()
        .and_then(|a| a.name.as_deref())
        .filter(|n| !n.is_empty())
        .unwrap_or("Unknown");

    MatchResult::new(
        track.acrid.clone(),
        title,
        artist,
        normalise_score(track.score),
        playable_for(track),
    )
}

/// Parse an identify response body.
///
/// # Errors
///
/// - [`MatcherError::Parse`]: body is not the expected JSON.
/// - [`MatcherError::Service`]: non-success status code.
pub fn parse_identify(body: &str) -> Result<Identification, MatcherError> {
    let envelope: Envelope =
        serde_json::from_str(body).map_err(|e| MatcherError::Parse(e.to_string()))?;

    match envelope.status.code {
        STATUS_OK => {}
        STATUS_NO_RESULT => return Ok(Identification::NoMatch),
        code => {
            return Err(MatcherError::Service {
                code,
                message: envelope.status.msg,
            })
        }
    }

    let metadata = envelope.metadata.unwrap_or_default();
    let tracks = if metadata.music.is_empty() {
        &metadata.humming
    } else {
        &metadata.music
    };

    let candidates = tracks.iter().map(to_match).collect::<Result<Vec<_>, _>>()?;
    Ok(Identification::from_candidates(candidates))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
