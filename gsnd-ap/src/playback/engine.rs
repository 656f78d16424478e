//! Playback engine
//!
//! Owns one background music pipeline (with playlist advance and looping) and
//! a bounded queue of one-shot effect pipelines, each running on its own
//! worker thread.
//!
//! **Locking:** all orchestrator state sits behind one mutex. It is mutated by
//! API calls and by pipeline workers reporting their own completion. Workers
//! are never joined while the lock is held; stopped or finished handles are
//! parked in a retired list and joined once their thread has exited.
//!
//! **Events:** every state change is broadcast as a [`PlayerEvent`]. Sending
//! with no subscribers is not an error.

use crate::audio::codec::{CodecFactory, Mp3CodecFactory};
use crate::audio::output::{CpalDeviceFactory, DeviceFactory, NullDeviceFactory};
use crate::config::PlayerConfig;
use crate::error::{Error, Result};
use crate::playback::effects::{EffectQueue, Room};
use crate::playback::pipeline::{PipelineHandle, PipelineReport, StreamingPipeline};
use crate::playback::playlist::PlaylistState;
use gsnd_common::PlayerEvent;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Snapshot of the background slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MusicStatus {
    /// Running background pipeline, if any
    pub pipeline_id: Option<Uuid>,
    pub path: Option<PathBuf>,
    pub index: usize,
    pub playlist_len: usize,
    pub looping: bool,
    pub paused: bool,
    pub state: Option<String>,
}

/// Snapshot of one queued effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectInfo {
    pub id: Uuid,
    pub path: PathBuf,
    pub state: String,
}

struct EngineState {
    running: bool,
    playlist: PlaylistState,
    music: Option<PipelineHandle>,
    /// Background tracks that failed in a row
    music_failures: usize,
    effects: EffectQueue<PipelineHandle>,
    retired: Vec<PipelineHandle>,
}

impl EngineState {
    /// Pull out retired handles whose threads have exited.
    fn take_finished(&mut self) -> Vec<PipelineHandle> {
        let (finished, running): (Vec<_>, Vec<_>) =
            self.retired.drain(..).partition(|h| h.is_finished());
        self.retired = running;
        finished
    }

    fn retire(&mut self, handle: PipelineHandle) {
        handle.stop();
        self.retired.push(handle);
    }
}

struct EngineInner {
    config: PlayerConfig,
    codecs: Arc<dyn CodecFactory>,
    devices: Arc<dyn DeviceFactory>,
    state: Mutex<EngineState>,
    event_tx: broadcast::Sender<PlayerEvent>,
}

fn join_all(handles: Vec<PipelineHandle>) {
    for mut handle in handles {
        handle.join();
    }
}

impl EngineInner {
    fn broadcast_event(&self, event: PlayerEvent) {
        // Ignore send errors (no receivers is OK)
        let _ = self.event_tx.send(event);
    }

    fn new_pipeline(&self, path: &Path) -> StreamingPipeline {
        StreamingPipeline::new(
            path,
            Arc::clone(&self.codecs),
            Arc::clone(&self.devices),
            self.config.pool_config(),
        )
    }

    /// Start the background pipeline for playlist entry `index`.
    ///
    /// `paused` carries a pause that outlived the previous track.
    fn start_music(self: &Arc<Self>, state: &mut EngineState, index: usize, paused: bool) -> Result<Uuid> {
        let path = state
            .playlist
            .advance_to(index)
            .ok_or_else(|| Error::InvalidArgument(format!("no track at index {}", index)))?
            .to_path_buf();

        let pipeline = self.new_pipeline(&path).start_paused(paused);
        let id = pipeline.id();
        let weak: Weak<EngineInner> = Arc::downgrade(self);
        let handle = pipeline.spawn(thread_name("gsnd-music", id), move |report| {
            if let Some(inner) = weak.upgrade() {
                inner.on_music_complete(index, report);
            }
        })?;

        info!(
            "Background track {} started{}: {}",
            index,
            if paused { " paused" } else { "" },
            path.display()
        );
        state.music = Some(handle);
        self.broadcast_event(PlayerEvent::MusicStarted {
            pipeline_id: id,
            path,
            index,
        });
        Ok(id)
    }

    fn on_music_complete(self: &Arc<Self>, index: usize, report: PipelineReport) {
        let finished = {
            let mut state = self.state.lock();
            if !state.running {
                return;
            }
            if state.music.as_ref().map(|h| h.id()) != Some(report.id) {
                debug!("Ignoring completion of superseded pipeline {}", report.id);
                return;
            }
            let paused = state.music.as_ref().map_or(false, |h| h.is_paused());
            if let Some(handle) = state.music.take() {
                state.retired.push(handle);
            }

            let outcome = report.outcome.to_completion();
            self.broadcast_event(PlayerEvent::MusicCompleted {
                pipeline_id: report.id,
                path: report.path.clone(),
                index,
                outcome: outcome.clone(),
            });

            if outcome.is_failure() {
                state.music_failures += 1;
            } else {
                state.music_failures = 0;
            }

            let next = if state.music_failures >= state.playlist.len() {
                warn!(
                    "Every playlist entry failed in a row ({}), background slot idle",
                    state.music_failures
                );
                None
            } else {
                state.playlist.next_after_completion(self.config.loop_policy)
            };

            match next {
                Some(next_index) => {
                    if let Err(e) = self.start_music(&mut state, next_index, paused) {
                        error!("Failed to start background track {}: {}", next_index, e);
                        self.broadcast_event(PlayerEvent::MusicIdle);
                    }
                }
                None => {
                    info!("Background playlist exhausted");
                    self.broadcast_event(PlayerEvent::MusicIdle);
                }
            }
            state.take_finished()
        };
        join_all(finished);
    }

    fn on_effect_complete(&self, report: PipelineReport) {
        let finished = {
            let mut state = self.state.lock();
            if !state.running {
                return;
            }
            // Evicted effects were already removed
            let Some(handle) = state.effects.remove(report.id) else {
                return;
            };
            state.retired.push(handle);

            debug!("Effect {} done: {}", report.id, report.path.display());
            self.broadcast_event(PlayerEvent::EffectCompleted {
                effect_id: report.id,
                path: report.path,
                outcome: report.outcome.to_completion(),
            });
            state.take_finished()
        };
        join_all(finished);
    }
}

fn thread_name(prefix: &str, id: Uuid) -> String {
    let short = id.simple().to_string();
    format!("{}-{}", prefix, &short[..8])
}

/// Background music + effects orchestrator
pub struct PlaybackEngine {
    inner: Arc<EngineInner>,
}

impl PlaybackEngine {
    /// Create engine state with an empty playlist and effect queue.
    ///
    /// # Errors
    /// `Config` if `config` fails validation
    pub fn init(
        config: PlayerConfig,
        codecs: Arc<dyn CodecFactory>,
        devices: Arc<dyn DeviceFactory>,
    ) -> Result<Self> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(config.event_capacity);

        info!(
            "Playback engine initialized: {} x {} byte buffers, {} effects ({:?}), loop policy {:?}",
            config.buffer_count,
            config.buffer_len,
            config.effect_capacity,
            config.effect_overflow,
            config.loop_policy
        );

        let state = EngineState {
            running: true,
            playlist: PlaylistState::new(),
            music: None,
            music_failures: 0,
            effects: EffectQueue::new(config.effect_capacity),
            retired: Vec::new(),
        };

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                codecs,
                devices,
                state: Mutex::new(state),
                event_tx,
            }),
        })
    }

    /// Engine decoding MP3 and playing through the default audio device
    pub fn new(config: PlayerConfig) -> Result<Self> {
        Self::init(config, Arc::new(Mp3CodecFactory), Arc::new(CpalDeviceFactory))
    }

    /// Engine decoding MP3 and discarding the audio
    pub fn with_null_output(config: PlayerConfig) -> Result<Self> {
        Self::init(config, Arc::new(Mp3CodecFactory), Arc::new(NullDeviceFactory))
    }

    fn ensure_running(state: &EngineState) -> Result<()> {
        if state.running {
            Ok(())
        } else {
            Err(Error::InvalidArgument("playback engine is shut down".to_string()))
        }
    }

    /// Replace the playlist and start playing `tracks[index]`.
    ///
    /// The current background track is stopped. The loop flag is kept; the
    /// pause flag is cleared.
    ///
    /// # Returns
    /// Id of the new background pipeline
    ///
    /// # Errors
    /// `InvalidArgument` for an empty list, an empty path or an index out of
    /// range; current playback is left untouched in that case.
    pub fn play_music<P: AsRef<Path>>(&self, tracks: &[P], index: usize) -> Result<Uuid> {
        let tracks: Vec<PathBuf> = tracks.iter().map(|t| t.as_ref().to_path_buf()).collect();
        PlaylistState::validate(&tracks, index)?;

        let (result, finished) = {
            let mut state = self.inner.state.lock();
            Self::ensure_running(&state)?;

            if let Some(old) = state.music.take() {
                debug!("Stopping background pipeline {}", old.id());
                state.retire(old);
            }
            state.playlist.replace(tracks, index)?;
            state.music_failures = 0;

            let result = self.inner.start_music(&mut state, index, false);
            (result, state.take_finished())
        };
        join_all(finished);
        result
    }

    /// Toggle pause on the background track.
    ///
    /// A pause still set when the track ends carries over to the next one.
    ///
    /// # Returns
    /// The new pause flag, or `None` when no background track is running
    pub fn pause_music(&self) -> Result<Option<bool>> {
        let state = self.inner.state.lock();
        Self::ensure_running(&state)?;

        let Some(music) = state.music.as_ref() else {
            debug!("pause_music with no background track");
            return Ok(None);
        };
        let paused = music.toggle_pause();
        info!("Background track {}", if paused { "paused" } else { "resumed" });
        self.inner.broadcast_event(PlayerEvent::MusicPaused {
            pipeline_id: music.id(),
            paused,
        });
        Ok(Some(paused))
    }

    /// Enable or disable looping for the next background completion.
    pub fn set_loop(&self, enabled: bool) -> Result<()> {
        let mut state = self.inner.state.lock();
        Self::ensure_running(&state)?;
        state.playlist.set_looping(enabled);
        debug!("Loop {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Start a one-shot effect.
    ///
    /// # Returns
    /// Id of the effect pipeline
    ///
    /// # Errors
    /// - `InvalidArgument` for an empty path
    /// - `ResourceExhausted` when the queue is full and the overflow policy
    ///   is `DropNewest`
    pub fn play_sound(&self, path: impl AsRef<Path>) -> Result<Uuid> {
        let path = path.as_ref().to_path_buf();
        if path.as_os_str().is_empty() {
            return Err(Error::InvalidArgument("effect path is empty".to_string()));
        }

        let (result, finished) = {
            let mut state = self.inner.state.lock();
            Self::ensure_running(&state)?;
            let result = self.start_effect(&mut state, path);
            (result, state.take_finished())
        };
        join_all(finished);
        result
    }

    fn start_effect(&self, state: &mut EngineState, path: PathBuf) -> Result<Uuid> {
        match state.effects.make_room(self.inner.config.effect_overflow) {
            Room::Available => {}
            Room::Evicted(id, handle) => {
                info!("Evicting effect {} ({})", id, handle.path().display());
                self.inner.broadcast_event(PlayerEvent::EffectEvicted {
                    effect_id: id,
                    path: handle.path().to_path_buf(),
                });
                state.retire(handle);
            }
            Room::Full => {
                warn!(
                    "Effect queue full ({}), rejecting {}",
                    state.effects.capacity(),
                    path.display()
                );
                self.inner.broadcast_event(PlayerEvent::EffectRejected { path: path.clone() });
                return Err(Error::ResourceExhausted(format!(
                    "effect queue full ({} active)",
                    state.effects.capacity()
                )));
            }
        }

        let pipeline = self.inner.new_pipeline(&path);
        let id = pipeline.id();
        let weak = Arc::downgrade(&self.inner);
        let handle = pipeline.spawn(thread_name("gsnd-sfx", id), move |report| {
            if let Some(inner) = weak.upgrade() {
                inner.on_effect_complete(report);
            }
        })?;

        if let Err(handle) = state.effects.insert(id, handle) {
            // make_room guaranteed space under this lock
            state.retire(handle);
            return Err(Error::ResourceExhausted("effect queue full".to_string()));
        }

        debug!("Effect {} started: {}", id, path.display());
        self.inner.broadcast_event(PlayerEvent::EffectStarted { effect_id: id, path });
        Ok(id)
    }

    /// Subscribe to player events
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn music_status(&self) -> MusicStatus {
        let state = self.inner.state.lock();
        let music = state.music.as_ref();
        MusicStatus {
            pipeline_id: music.map(|h| h.id()),
            path: music.map(|h| h.path().to_path_buf()),
            index: state.playlist.current_index(),
            playlist_len: state.playlist.len(),
            looping: state.playlist.is_looping(),
            paused: music.map_or(false, |h| h.is_paused()),
            state: music.map(|h| h.state().to_string()),
        }
    }

    pub fn active_effects(&self) -> Vec<EffectInfo> {
        let state = self.inner.state.lock();
        state
            .effects
            .iter()
            .map(|(id, handle)| EffectInfo {
                id: *id,
                path: handle.path().to_path_buf(),
                state: handle.state().to_string(),
            })
            .collect()
    }

    /// No background track and no effects
    pub fn is_idle(&self) -> bool {
        let state = self.inner.state.lock();
        state.music.is_none() && state.effects.is_empty()
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.inner.config
    }

    /// Stop every pipeline and wait for their workers. Idempotent.
    pub fn shutdown(&self) {
        let handles = {
            let mut state = self.inner.state.lock();
            if !state.running {
                return;
            }
            state.running = false;

            let mut handles: Vec<PipelineHandle> = state.retired.drain(..).collect();
            handles.extend(state.music.take());
            handles.extend(state.effects.drain().map(|(_, h)| h));
            state.playlist.clear();
            handles
        };

        info!("Shutting down playback engine ({} pipelines)", handles.len());
        for handle in &handles {
            handle.stop();
        }
        join_all(handles);
        info!("Playback engine shut down");
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("config", &self.inner.config)
            .finish()
    }
}
