//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\music-recognizer\
//!   macOS:   ~/Library/Application Support/music-recognizer/
//!   Linux:   ~/.config/music-recognizer/
//!
//! Data dir (local music library):
//!   Windows: %LOCALAPPDATA%\music-recognizer\
//!   macOS:   ~/Library/Application Support/music-recognizer/
//!   Linux:   ~/.local/share/music-recognizer/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory for application data.
    pub data_dir: PathBuf,
    /// Default location of the local music library.
    pub music_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "music-recognizer";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let music_dir = data_dir.join("music");

        Self {
            config_dir,
            settings_file,
            data_dir,
            music_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
