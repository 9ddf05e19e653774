//! HTTP-backed [`Matcher`] for a remote identify service.
//!
//! The captured audio is posted as raw 16-bit little-endian mono PCM; the
//! sample rate travels in the query string.  All connection details come
//! from [`MatcherConfig`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use crate::audio::CaptureSession;
use crate::config::MatcherConfig;

use super::response::parse_identify;
use super::{Identification, Matcher, MatcherError};

/// Convert `f32` samples in `[-1, 1]` to 16-bit little-endian PCM bytes.
/// Out-of-range samples are clamped.
///
/// ```
/// use music_recognizer::matcher::encode_pcm16;
///
/// assert_eq!(encode_pcm16(&[0.0, 1.0]), vec![0x00, 0x00, 0xff, 0x7f]);
/// ```
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Calls `POST {host}/v1/identify` with the captured PCM.
pub struct HttpMatcher {
    client: reqwest::Client,
    config: MatcherConfig,
}

impl HttpMatcher {
    /// Build a matcher from application config.
    ///
    /// The client-level timeout comes from `config.timeout_secs`; each call
    /// additionally carries the per-request `timeout` passed to `identify`.
    pub fn from_config(config: &MatcherConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }

    fn identify_url(&self, sample_rate: u32) -> String {
        format!(
            "{}/v1/identify?sample_rate={sample_rate}&channels=1&data_type=audio",
            self.config.host.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl Matcher for HttpMatcher {
    async fn identify(
        &self,
        audio: &CaptureSession,
        timeout: Duration,
    ) -> Result<Identification, MatcherError> {
        let body = encode_pcm16(&audio.samples());
        log::debug!(
            "matcher: submitting {} ({} bytes, {:.1}s)",
            audio.id,
            body.len(),
            audio.duration().as_secs_f32()
        );

        let mut req = self
            .client
            .post(self.identify_url(audio.sample_rate))
            .timeout(timeout)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body);

        let key = self.config.access_key.as_deref().unwrap_or("");
        if !key.is_empty() {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MatcherError::Transport(format!("HTTP {status}")));
        }

        let text = response.text().await?;
        parse_identify(&text)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
