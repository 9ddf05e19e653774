//! Local music library.
//!
//! A flat scan of `music_dir` for audio files.  Tracks are named by their
//! file stem; [`Library::find_matching`] resolves a partial title the way a
//! user (or the assistant) would write it.

use std::io;
use std::path::{Path, PathBuf};

use crate::matcher::TrackRef;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "wav", "m4a", "aac", "opus"];

/// One audio file in the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryTrack {
    /// File name without extension.
    pub name: String,
    pub path: PathBuf,
}

impl LibraryTrack {
    pub fn track_ref(&self) -> TrackRef {
        TrackRef::new(self.path.to_string_lossy())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Library {
    tracks: Vec<LibraryTrack>,
}

fn is_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

impl Library {
    /// Scan `root` (not recursively).  A missing directory is an empty
    /// library.
    ///
    /// # Errors
    ///
    /// I/O errors other than "not found" while listing `root`.
    pub fn scan(root: &Path) -> io::Result<Self> {
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::info!("library: {} does not exist, library is empty", root.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e),
        };

        let mut tracks = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() || !is_audio(&path) {
                continue;
            }
            if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                tracks.push(LibraryTrack {
                    name: name.to_string(),
                    path: path.clone(),
                });
            }
        }
        tracks.sort_by(|a, b| a.name.cmp(&b.name));

        log::info!("library: {} track(s) in {}", tracks.len(), root.display());
        Ok(Self { tracks })
    }

    pub fn from_tracks(tracks: Vec<LibraryTrack>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[LibraryTrack] {
        &self.tracks
    }

    pub fn titles(&self) -> Vec<&str> {
        self.tracks.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// First track whose name contains `partial`, ignoring case.
    pub fn find_matching(&self, partial: &str) -> Option<&LibraryTrack> {
        let needle = partial.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.tracks
            .iter()
            .find(|t| t.name.to_lowercase().contains(&needle))
    }
}
