//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for microphone capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate in Hz of the frames handed to the matcher.  Device audio
    /// is resampled to this rate.
    pub sample_rate: u32,
    /// Length of one fixed-size capture frame in milliseconds.
    pub frame_ms: u32,
    /// RMS level under which a frame is reported as "volume too low".
    pub min_volume: f32,
    /// Input device name: `None` means the system default.
    pub device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            frame_ms: 100,
            min_volume: 0.1,
            device: None,
        }
    }
}

impl AudioConfig {
    /// Number of mono samples in one capture frame (never zero).
    pub fn frame_samples(&self) -> usize {
        ((self.sample_rate as u64 * self.frame_ms as u64) / 1000).max(1) as usize
    }
}

// ---------------------------------------------------------------------------
// RecognitionConfig
// ---------------------------------------------------------------------------

/// Timing and acceptance policy for recognition attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// Longest capture per attempt, in milliseconds.
    pub max_capture_ms: u64,
    /// Absolute bound on the matcher round trip, measured from submission.
    pub deadline_ms: u64,
    /// Candidates scoring below this are treated as "no match" (0.0 – 1.0).
    pub confidence_threshold: f32,
    /// When the two best candidates are closer than this, the outcome is
    /// ambiguous and the user picks.
    pub ambiguity_margin: f32,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            max_capture_ms: 10_000,
            deadline_ms: 15_000,
            confidence_threshold: 0.8,
            ambiguity_margin: 0.05,
        }
    }
}

impl RecognitionConfig {
    pub fn max_capture(&self) -> Duration {
        Duration::from_millis(self.max_capture_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

// ---------------------------------------------------------------------------
// MatcherConfig
// ---------------------------------------------------------------------------

/// Connection details for the remote fingerprint service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Base URL of the identify service (scheme + host).
    pub host: String,
    /// Access key: empty or `None` sends no credentials.
    pub access_key: Option<String>,
    /// Transport-level timeout of the HTTP client, in seconds.
    pub timeout_secs: u64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            host: "https://identify-eu-west-1.acrcloud.com".into(),
            access_key: None,
            timeout_secs: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// PlaybackConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Start playing as soon as the player reports a loaded track.  When
    /// `false` a loaded track waits in `Paused`.
    pub auto_play: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { auto_play: true }
    }
}

// ---------------------------------------------------------------------------
// LibraryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Directory scanned for local audio files.
    pub music_dir: PathBuf,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            music_dir: AppPaths::new().music_dir,
        }
    }
}

// ---------------------------------------------------------------------------
// AssistantConfig
// ---------------------------------------------------------------------------

/// Settings for the chat-based music assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Whether the assistant may be used at all.
    pub enabled: bool,
    /// Base URL of an OpenAI-compatible API endpoint.
    pub base_url: String,
    /// API key: `None` for local providers.
    pub api_key: Option<String>,
    /// Model identifier sent to the API.
    pub model: String,
    /// Sampling temperature (0.0 – 1.0).
    pub temperature: f32,
    /// Maximum seconds to wait for a reply.
    pub timeout_secs: u64,
    /// Number of chat messages kept as conversation history.
    pub history_limit: usize,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.openai.com".into(),
            api_key: None,
            model: "gpt-4o".into(),
            temperature: 0.7,
            timeout_secs: 30,
            history_limit: 20,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use music_recognizer::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Microphone capture settings.
    pub audio: AudioConfig,
    /// Recognition timing and acceptance policy.
    pub recognition: RecognitionConfig,
    /// Fingerprint service connection.
    pub matcher: MatcherConfig,
    /// Playback behaviour.
    pub playback: PlaybackConfig,
    /// Local music library.
    pub library: LibraryConfig,
    /// Chat assistant.
    pub assistant: AssistantConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
