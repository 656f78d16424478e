//! Background music playlist
//!
//! Ordered list of tracks, the current index and the loop flag. Decides which
//! track follows a completed one.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What "loop" repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPolicy {
    /// Restart the track that just ended
    #[default]
    RepeatTrack,
    /// Advance through the list, wrapping from last to first
    RepeatPlaylist,
}

/// Playlist state for the background slot
#[derive(Debug, Clone, Default)]
pub struct PlaylistState {
    tracks: Vec<PathBuf>,
    current: usize,
    looping: bool,
}

impl PlaylistState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a new playlist without installing it.
    ///
    /// # Errors
    /// `InvalidArgument` for an empty list, an empty path, or an index out of range
    pub fn validate(tracks: &[PathBuf], index: usize) -> Result<()> {
        if tracks.is_empty() {
            return Err(Error::InvalidArgument("playlist is empty".to_string()));
        }
        if index >= tracks.len() {
            return Err(Error::InvalidArgument(format!(
                "start index {} out of range for {} tracks",
                index,
                tracks.len()
            )));
        }
        if let Some(pos) = tracks.iter().position(|t| t.as_os_str().is_empty()) {
            return Err(Error::InvalidArgument(format!("track {} has an empty path", pos)));
        }
        Ok(())
    }

    /// Replace the track list and current index. The loop flag is kept.
    pub fn replace(&mut self, tracks: Vec<PathBuf>, index: usize) -> Result<()> {
        Self::validate(&tracks, index)?;
        self.tracks = tracks;
        self.current = index;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.current = 0;
    }

    /// Index to play after the current track ends, if any.
    pub fn next_after_completion(&self, policy: LoopPolicy) -> Option<usize> {
        if self.tracks.is_empty() {
            return None;
        }
        let next = self.current + 1;
        match (self.looping, policy) {
            (true, LoopPolicy::RepeatTrack) => Some(self.current),
            (true, LoopPolicy::RepeatPlaylist) => Some(next % self.tracks.len()),
            (false, _) if next < self.tracks.len() => Some(next),
            (false, _) => None,
        }
    }

    /// Move to `index`; returns its track.
    pub fn advance_to(&mut self, index: usize) -> Option<&Path> {
        let track = self.tracks.get(index)?;
        self.current = index;
        Some(track.as_path())
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_track(&self) -> Option<&Path> {
        self.tracks.get(self.current).map(|p| p.as_path())
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn set_looping(&mut self, enabled: bool) {
        self.looping = enabled;
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }
}
