//! `SegmentPlayer`: plays a multi-segment guide as one continuous timeline.
//!
//! ## Lifecycle
//!
//! ```text
//! SegmentPlayer::open()
//!     └─► load(0)                       → Loading → Ready (paused)
//!         ├─► seek / seek_and_play      → in place, or load(j) across segments
//!         ├─► segment i finishes        → load(i + 1), auto-play
//!         ├─► last segment finishes     → Ready, paused at timeline end
//!         └─► close()                   → handle released, every op → Closed
//! ```
//!
//! ## Concurrency
//!
//! Only the newest `load` matters. Each load takes a fresh value from a
//! monotonic generation counter; continuations re-check it (and the mounted
//! flag) before touching shared state, and a load that lost the race unloads
//! the handle it created. Progress statuses carry the generation of the sink
//! they came through and are applied in order by a single pump task that
//! holds only a `Weak` reference to the player.

mod state;

pub use state::{next_speed, SPEED_LADDER};

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc, Weak,
};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{AudioBackend, AudioSource, ProgressSink, ProgressUpdate, SoundHandle, SoundRequest},
    cache::AssetCache,
    error::{Result, TourError},
    guide::AudioGuide,
    ipc::events::{LoadState, PlaybackEvent, PlaybackEventKind, PlaybackSnapshot},
};

use state::PlaybackState;

/// Configuration for `SegmentPlayer`.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Jump used by `skip_forward` / `skip_back`. Default: 15 s.
    pub skip_interval: Duration,
    /// Delay after `end_scrub` before progress updates apply again.
    /// Default: 50 ms.
    pub scrub_release_debounce: Duration,
    /// Global position to open at. Default: 0.
    pub resume_position_ms: u64,
    /// Broadcast buffer for slow event consumers. Default: 256.
    pub event_capacity: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            skip_interval: Duration::from_secs(15),
            scrub_release_debounce: Duration::from_millis(50),
            resume_position_ms: 0,
            event_capacity: 256,
        }
    }
}

/// Arguments for `SegmentPlayer::load`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadRequest {
    /// Start playing once loaded.
    pub should_play: bool,
    /// Global position to load at. Converted to a local offset inside the
    /// segment.
    pub global_position_ms: u64,
}

struct LoadedSound {
    generation: u64,
    index: usize,
    handle: Box<dyn SoundHandle>,
}

struct Inner {
    guide: AudioGuide,
    backend: Arc<dyn AudioBackend>,
    cache: Option<Arc<AssetCache>>,
    config: PlayerConfig,
    state: Mutex<PlaybackState>,
    sound: tokio::sync::Mutex<Option<LoadedSound>>,
    generation: AtomicU64,
    mounted: AtomicBool,
    loads: AtomicUsize,
    seq: AtomicU64,
    events: broadcast::Sender<PlaybackEvent>,
    progress_tx: mpsc::UnboundedSender<ProgressUpdate>,
}

/// Cheaply clonable handle to one guide's playback. `Send + Sync`.
#[derive(Clone)]
pub struct SegmentPlayer {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SegmentPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentPlayer")
            .field("guide", &self.inner.guide.id)
            .field("generation", &self.inner.generation.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl SegmentPlayer {
    /// Validate `guide`, start the progress pump and load the opening
    /// segment paused.
    ///
    /// A failed opening load leaves the player in `LoadState::Error` rather
    /// than failing `open`, so a later seek can still recover.
    ///
    /// # Errors
    /// `TourError::NoSegments` / `TourError::InvalidGuide` for a guide the
    /// player cannot drive.
    pub async fn open(
        guide: AudioGuide,
        backend: Arc<dyn AudioBackend>,
        cache: Option<Arc<AssetCache>>,
        config: PlayerConfig,
    ) -> Result<Self> {
        guide.validate()?;

        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let start_ms = config.resume_position_ms.min(guide.timeline_duration_ms());
        let start_index = guide.resolve_segment(start_ms);

        info!(
            guide = %guide.id,
            segments = guide.segments.len(),
            duration_ms = guide.timeline_duration_ms(),
            "opening segment player"
        );

        let inner = Arc::new(Inner {
            guide,
            backend,
            cache,
            config,
            state: Mutex::new(PlaybackState::new()),
            sound: tokio::sync::Mutex::new(None),
            generation: AtomicU64::new(0),
            mounted: AtomicBool::new(true),
            loads: AtomicUsize::new(0),
            seq: AtomicU64::new(0),
            events,
            progress_tx,
        });
        tokio::spawn(pump_progress(Arc::downgrade(&inner), progress_rx));

        let player = Self { inner };
        let request = LoadRequest {
            should_play: false,
            global_position_ms: start_ms,
        };
        if let Err(e) = player.load(start_index, request).await {
            warn!(segment = start_index, "opening load failed: {e}");
        }
        Ok(player)
    }

    /// Make segment `index` the active one.
    ///
    /// Tears down the current asset, resolves the segment URI through the
    /// cache, creates a handle at the local offset for
    /// `request.global_position_ms`, applies the current speed and plays if
    /// requested. A load superseded by a newer one returns `Ok(())` and
    /// discards its own handle.
    ///
    /// # Errors
    /// - `TourError::Closed` after `close()`.
    /// - `TourError::SegmentOutOfRange` for a bad index.
    /// - `TourError::MissingUri` or the backend's error; the player is left
    ///   in `LoadState::Error`.
    pub async fn load(&self, index: usize, request: LoadRequest) -> Result<()> {
        self.ensure_open()?;
        let inner = &self.inner;
        let count = inner.guide.segments.len();
        let Some(segment) = inner.guide.segments.get(index) else {
            return Err(TourError::SegmentOutOfRange { index, count });
        };

        inner.loads.fetch_add(1, Ordering::SeqCst);
        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let global_ms = request
            .global_position_ms
            .min(inner.guide.timeline_duration_ms());
        let local_ms = segment.local_position_ms(global_ms);

        {
            let mut st = inner.state.lock();
            st.load_state = LoadState::Loading;
            st.segment_index = index;
            st.global_position_ms = global_ms;
            st.is_playing = request.should_play;
            st.error = None;
        }
        self.emit(PlaybackEventKind::Loading);
        info!(segment = index, generation, local_ms, play = request.should_play, "loading segment");

        let previous = inner.sound.lock().await.take();
        if let Some(previous) = previous {
            release(previous).await;
        }

        if !segment.has_uri() {
            return self.fail_load(generation, TourError::MissingUri { index });
        }

        let source = match &inner.cache {
            Some(cache) => cache.resolve(&segment.uri).await,
            None => AudioSource::from_uri(&segment.uri),
        };
        if !self.is_current(generation) {
            debug!(segment = index, generation, "load superseded before create");
            return Ok(());
        }

        let sink = ProgressSink::new(generation, inner.progress_tx.clone());
        let sound_request = SoundRequest {
            source,
            start_position_ms: local_ms,
            duration_hint_ms: Some(segment.duration_ms()).filter(|d| *d > 0),
        };
        let handle = match inner.backend.create(sound_request, sink).await {
            Ok(handle) => handle,
            Err(e) if !self.is_current(generation) => {
                debug!(segment = index, generation, "superseded load failed: {e}");
                return Ok(());
            }
            Err(e) => return self.fail_load(generation, e),
        };

        let mut slot = inner.sound.lock().await;
        if !self.is_current(generation) {
            drop(slot);
            debug!(segment = index, generation, "load superseded, discarding handle");
            release(LoadedSound {
                generation,
                index,
                handle,
            })
            .await;
            return Ok(());
        }
        if let Some(orphan) = slot.take() {
            release(orphan).await;
        }

        let speed = inner.state.lock().speed;
        if (speed - 1.0).abs() > f32::EPSILON {
            if let Err(e) = handle.set_rate(speed).await {
                warn!(segment = index, speed, "failed to apply speed: {e}");
            }
        }

        let mut playing = request.should_play;
        if playing {
            if let Err(e) = handle.play().await {
                warn!(segment = index, "autoplay failed: {e}");
                playing = false;
            }
        }

        *slot = Some(LoadedSound {
            generation,
            index,
            handle,
        });
        {
            let mut st = inner.state.lock();
            st.load_state = LoadState::Ready;
            st.is_playing = playing;
        }
        drop(slot);

        self.emit(PlaybackEventKind::Loaded);
        debug!(segment = index, generation, "segment ready");
        Ok(())
    }

    /// Flip between playing and paused. No-op while nothing is loaded.
    pub async fn toggle_play_pause(&self) -> Result<()> {
        self.ensure_open()?;
        let slot = self.inner.sound.lock().await;
        let Some(loaded) = slot.as_ref() else {
            debug!("toggle ignored, no asset loaded");
            return Ok(());
        };

        let playing = self.inner.state.lock().is_playing;
        let result = if playing {
            loaded.handle.pause().await
        } else {
            loaded.handle.play().await
        };
        drop(slot);

        match result {
            Ok(()) => {
                self.inner.state.lock().is_playing = !playing;
                self.emit(PlaybackEventKind::PlayState);
            }
            Err(e) => warn!(playing, "play/pause failed: {e}"),
        }
        Ok(())
    }

    /// Move to `global_ms`, keeping the current play intent.
    ///
    /// A target inside the active segment repositions the loaded asset in
    /// place; any other target loads the segment it resolves to.
    pub async fn seek(&self, global_ms: u64) -> Result<()> {
        self.seek_inner(global_ms, None).await
    }

    /// Like `seek`, but always ends up playing.
    pub async fn seek_and_play(&self, global_ms: u64) -> Result<()> {
        self.seek_inner(global_ms, Some(true)).await
    }

    /// Start a scrub gesture: progress updates stop moving the position.
    pub fn begin_scrub(&self) -> Result<()> {
        self.ensure_open()?;
        {
            let mut st = self.inner.state.lock();
            st.is_seeking = true;
            st.scrub_epoch += 1;
        }
        debug!("scrub started");
        Ok(())
    }

    /// Move the displayed position during a scrub without touching audio.
    pub fn scrub_to(&self, global_ms: u64) -> Result<()> {
        self.ensure_open()?;
        {
            let mut st = self.inner.state.lock();
            st.global_position_ms = global_ms.min(self.inner.guide.timeline_duration_ms());
        }
        self.emit(PlaybackEventKind::Seeked);
        Ok(())
    }

    /// Finish a scrub: seek to `global_ms`, then re-enable progress updates
    /// after the release debounce.
    pub async fn end_scrub(&self, global_ms: u64) -> Result<()> {
        self.ensure_open()?;
        let epoch = {
            let mut st = self.inner.state.lock();
            st.is_seeking = true;
            st.scrub_epoch
        };

        let result = self.seek(global_ms).await;

        let weak = Arc::downgrade(&self.inner);
        let debounce = self.inner.config.scrub_release_debounce;
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if let Some(inner) = weak.upgrade() {
                let mut st = inner.state.lock();
                if st.scrub_epoch == epoch {
                    st.is_seeking = false;
                }
            }
        });

        result
    }

    /// Jump ahead by the skip interval, clamped to the timeline end.
    pub async fn skip_forward(&self) -> Result<()> {
        self.ensure_open()?;
        let skip = duration_ms(self.inner.config.skip_interval);
        let target = self
            .position_ms()
            .saturating_add(skip)
            .min(self.inner.guide.timeline_duration_ms());
        self.seek_and_play(target).await
    }

    /// Jump back by the skip interval, clamped to 0.
    pub async fn skip_back(&self) -> Result<()> {
        self.ensure_open()?;
        let skip = duration_ms(self.inner.config.skip_interval);
        let target = self.position_ms().saturating_sub(skip);
        self.seek_and_play(target).await
    }

    /// Play from the start of chapter `index`.
    pub async fn jump_to_chapter(&self, index: usize) -> Result<()> {
        self.ensure_open()?;
        let chapters = &self.inner.guide.chapters;
        let Some(chapter) = chapters.get(index) else {
            return Err(TourError::ChapterOutOfRange {
                index,
                count: chapters.len(),
            });
        };
        info!(chapter = index, title = %chapter.title, "jumping to chapter");
        self.seek_and_play(chapter.start_ms()).await
    }

    /// Pause, rewind to the start and reload the first segment paused.
    pub async fn stop(&self) -> Result<()> {
        self.ensure_open()?;
        {
            let slot = self.inner.sound.lock().await;
            if let Some(loaded) = slot.as_ref() {
                if let Err(e) = loaded.handle.pause().await {
                    warn!("pause before stop failed: {e}");
                }
            }
        }
        {
            let mut st = self.inner.state.lock();
            st.is_playing = false;
            st.global_position_ms = 0;
        }
        info!("playback stopped");
        self.load(
            0,
            LoadRequest {
                should_play: false,
                global_position_ms: 0,
            },
        )
        .await
    }

    /// Release the player. Idempotent.
    ///
    /// In-flight loads are invalidated and the loaded asset is stopped and
    /// unloaded. Afterwards progress reports no longer change state and every
    /// other operation returns `TourError::Closed`.
    pub async fn close(&self) -> Result<()> {
        if !self.inner.mounted.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.generation.fetch_add(1, Ordering::SeqCst);

        let previous = self.inner.sound.lock().await.take();
        if let Some(previous) = previous {
            release(previous).await;
        }
        self.inner.state.lock().is_playing = false;

        self.emit(PlaybackEventKind::Closed);
        info!(guide = %self.inner.guide.id, "segment player closed");
        Ok(())
    }

    /// Advance the speed ladder (1.0 → 1.5 → 2.0 → 1.0) and apply it to the
    /// loaded asset. Returns the speed now in effect.
    pub async fn change_speed(&self) -> Result<f32> {
        self.ensure_open()?;
        let current = self.inner.state.lock().speed;
        let next = next_speed(current);

        let slot = self.inner.sound.lock().await;
        if let Some(loaded) = slot.as_ref() {
            if let Err(e) = loaded.handle.set_rate(next).await {
                warn!(speed = next, "speed change failed: {e}");
                return Ok(current);
            }
        }
        self.inner.state.lock().speed = next;
        drop(slot);

        self.emit(PlaybackEventKind::SpeedChanged);
        debug!(speed = next, "speed changed");
        Ok(next)
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.inner.state.lock().snapshot(&self.inner.guide)
    }

    /// Subscribe to state change events.
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.inner.events.subscribe()
    }

    /// Number of `load` calls made so far, superseded ones included.
    pub fn load_count(&self) -> usize {
        self.inner.loads.load(Ordering::SeqCst)
    }

    pub fn guide(&self) -> &AudioGuide {
        &self.inner.guide
    }

    pub fn is_closed(&self) -> bool {
        !self.inner.mounted.load(Ordering::SeqCst)
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(TourError::Closed);
        }
        Ok(())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.mounted.load(Ordering::SeqCst)
            && self.inner.generation.load(Ordering::SeqCst) == generation
    }

    fn position_ms(&self) -> u64 {
        self.inner.state.lock().global_position_ms
    }

    async fn seek_inner(&self, global_ms: u64, play: Option<bool>) -> Result<()> {
        self.ensure_open()?;
        let inner = &self.inner;
        let target = global_ms.min(inner.guide.timeline_duration_ms());
        let index = inner.guide.resolve_segment(target);
        let (current_index, load_state, playing) = {
            let st = inner.state.lock();
            (st.segment_index, st.load_state, st.is_playing)
        };
        let should_play = play.unwrap_or(playing);
        let request = LoadRequest {
            should_play,
            global_position_ms: target,
        };

        if index != current_index || load_state != LoadState::Ready {
            debug!(from = current_index, to = index, target, "seek crosses segments");
            return self.load(index, request).await;
        }

        let slot = inner.sound.lock().await;
        let Some(loaded) = slot.as_ref().filter(|s| s.index == index) else {
            drop(slot);
            return self.load(index, request).await;
        };

        let local_ms = inner.guide.segments[index].local_position_ms(target);
        match loaded.handle.set_position(local_ms).await {
            Ok(()) => {}
            Err(e) if e.is_interrupted() => {
                debug!(target, "seek interrupted by a newer seek");
                return Ok(());
            }
            Err(e) => {
                warn!(target, "seek failed: {e}");
                return Ok(());
            }
        }

        let mut now_playing = playing;
        if should_play && !playing {
            match loaded.handle.play().await {
                Ok(()) => now_playing = true,
                Err(e) => warn!("play after seek failed: {e}"),
            }
        }
        drop(slot);

        {
            let mut st = inner.state.lock();
            st.global_position_ms = target;
            st.is_playing = now_playing;
        }
        self.emit(PlaybackEventKind::Seeked);
        debug!(segment = index, local_ms, "seeked in place");
        Ok(())
    }

    async fn handle_progress(&self, update: ProgressUpdate) {
        let inner = &self.inner;
        if !inner.mounted.load(Ordering::SeqCst) {
            return;
        }

        let status = update.status;
        let finished = {
            let mut st = inner.state.lock();
            if inner.generation.load(Ordering::SeqCst) != update.generation {
                debug!(generation = update.generation, "stale progress ignored");
                return;
            }
            // A scrub owns the displayed position, but a finish still counts.
            if st.is_seeking && !status.did_finish {
                return;
            }
            let Some(segment) = inner.guide.segments.get(st.segment_index) else {
                return;
            };
            if !st.is_seeking {
                st.global_position_ms = segment.global_position_ms(status.position_ms);
            }
            status.did_finish.then_some(st.segment_index)
        };

        if let Some(message) = &status.error {
            warn!(generation = update.generation, "backend reported playback error: {message}");
        }

        let Some(index) = finished else {
            self.emit(PlaybackEventKind::Progress);
            return;
        };

        let next = index + 1;
        if let Some(segment) = inner.guide.segments.get(next) {
            info!(segment = index, "segment finished, advancing");
            self.emit(PlaybackEventKind::SegmentFinished);
            let request = LoadRequest {
                should_play: true,
                global_position_ms: segment.start_ms(),
            };
            if let Err(e) = self.load(next, request).await {
                error!(segment = next, "failed to advance: {e}");
            }
        } else {
            {
                let mut st = inner.state.lock();
                st.is_playing = false;
                st.global_position_ms = inner.guide.segments[index].end_ms();
            }
            info!(guide = %inner.guide.id, "guide finished");
            self.emit(PlaybackEventKind::Finished);
        }
    }

    fn fail_load(&self, generation: u64, err: TourError) -> Result<()> {
        if !self.is_current(generation) {
            return Ok(());
        }
        {
            let mut st = self.inner.state.lock();
            st.load_state = LoadState::Error;
            st.is_playing = false;
            st.error = Some(err.to_string());
        }
        error!(generation, "segment load failed: {err}");
        self.emit(PlaybackEventKind::Error);
        Err(err)
    }

    fn emit(&self, kind: PlaybackEventKind) {
        let snapshot = self.snapshot();
        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed);
        let _ = self.inner.events.send(PlaybackEvent {
            seq,
            kind,
            snapshot,
        });
    }
}

/// Applies progress updates in arrival order until the player is dropped or
/// closed.
async fn pump_progress(inner: Weak<Inner>, mut rx: mpsc::UnboundedReceiver<ProgressUpdate>) {
    while let Some(update) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.mounted.load(Ordering::SeqCst) {
            break;
        }
        SegmentPlayer { inner }.handle_progress(update).await;
    }
    debug!("progress pump stopped");
}

/// Stop and unload a handle, logging failures.
async fn release(sound: LoadedSound) {
    if let Err(e) = sound.handle.stop().await {
        warn!(segment = sound.index, generation = sound.generation, "stop failed: {e}");
    }
    if let Err(e) = sound.handle.unload().await {
        warn!(segment = sound.index, generation = sound.generation, "unload failed: {e}");
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
