//! Player event types broadcast by the playback engine
//!
//! Events are serializable so front ends can forward them (log them as JSON,
//! push them over a socket) without depending on the player crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// How a pipeline ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CompletionOutcome {
    /// Source decoded to the end and every buffer was played
    Finished,
    /// Source could not be opened, decoded or played
    Failed { reason: String },
    /// Pipeline was stopped before reaching the end
    Stopped,
}

impl CompletionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, CompletionOutcome::Failed { .. })
    }
}

impl fmt::Display for CompletionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionOutcome::Finished => write!(f, "finished"),
            CompletionOutcome::Failed { reason } => write!(f, "failed: {}", reason),
            CompletionOutcome::Stopped => write!(f, "stopped"),
        }
    }
}

/// Player event types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Background track pipeline started
    MusicStarted {
        pipeline_id: Uuid,
        path: PathBuf,
        index: usize,
    },

    /// Background track pipeline ended
    MusicCompleted {
        pipeline_id: Uuid,
        path: PathBuf,
        index: usize,
        outcome: CompletionOutcome,
    },

    /// Background slot has nothing left to play
    MusicIdle,

    /// Background pause flag changed
    MusicPaused { pipeline_id: Uuid, paused: bool },

    /// One-shot effect accepted and started
    EffectStarted { effect_id: Uuid, path: PathBuf },

    /// One-shot effect ended and left the queue
    EffectCompleted {
        effect_id: Uuid,
        path: PathBuf,
        outcome: CompletionOutcome,
    },

    /// Effect request refused because the queue was full
    EffectRejected { path: PathBuf },

    /// Oldest effect stopped to make room for a new one
    EffectEvicted { effect_id: Uuid, path: PathBuf },
}

impl PlayerEvent {
    /// Get event type as string
    pub fn event_type(&self) -> &str {
        match self {
            PlayerEvent::MusicStarted { .. } => "MusicStarted",
            PlayerEvent::MusicCompleted { .. } => "MusicCompleted",
            PlayerEvent::MusicIdle => "MusicIdle",
            PlayerEvent::MusicPaused { .. } => "MusicPaused",
            PlayerEvent::EffectStarted { .. } => "EffectStarted",
            PlayerEvent::EffectCompleted { .. } => "EffectCompleted",
            PlayerEvent::EffectRejected { .. } => "EffectRejected",
            PlayerEvent::EffectEvicted { .. } => "EffectEvicted",
        }
    }
}
