//! `StubBackend`: clock-driven backend that simulates playback without decoding.
//!
//! Each sound owns a small ticker task that advances a virtual position by
//! `tick * rate * speedup` while playing and reports it through the progress sink, the
//! way a platform media player reports roughly every 100 ms. Reaching the
//! asset length emits a single `did_finish` status and pauses.
//!
//! Used by the host's `play` command and by end-to-end tests, so the whole
//! player pipeline can be exercised with no audio device.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::audio::{AudioBackend, AudioSource, ProgressSink, SoundHandle, SoundRequest, SoundStatus};
use crate::error::{Result, TourError};

/// Configuration for `StubBackend`.
#[derive(Debug, Clone)]
pub struct StubConfig {
    /// Progress cadence. Default: 100 ms.
    pub tick: Duration,
    /// Length assumed for sounds created without a duration hint.
    /// Default: 60 s.
    pub default_duration_ms: u64,
    /// Virtual time multiplier on top of the playback rate, so long guides
    /// can be run through quickly. Default: 1.0.
    pub speedup: f64,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            default_duration_ms: 60_000,
            speedup: 1.0,
        }
    }
}

/// Simulated playback backend.
#[derive(Debug, Clone, Default)]
pub struct StubBackend {
    config: StubConfig,
}

impl StubBackend {
    pub fn new(config: StubConfig) -> Self {
        Self { config }
    }

    /// Stub ticking at `tick`, handy for fast tests.
    pub fn with_tick(tick: Duration) -> Self {
        Self::new(StubConfig {
            tick,
            ..StubConfig::default()
        })
    }
}

#[async_trait]
impl AudioBackend for StubBackend {
    async fn create(&self, request: SoundRequest, sink: ProgressSink) -> Result<Box<dyn SoundHandle>> {
        if let AudioSource::Local(path) = &request.source {
            if path.as_os_str().is_empty() {
                return Err(TourError::Decode("empty local path".into()));
            }
        }

        let duration_ms = request
            .duration_hint_ms
            .filter(|d| *d > 0)
            .unwrap_or(self.config.default_duration_ms);
        let clock = Arc::new(Mutex::new(Clock {
            position_ms: request.start_position_ms.min(duration_ms) as f64,
            playing: false,
            rate: 1.0,
            unloaded: false,
        }));

        debug!(
            source = %request.source,
            generation = sink.generation(),
            start_ms = request.start_position_ms,
            duration_ms,
            "stub sound created"
        );

        let speedup = self.config.speedup.max(f64::MIN_POSITIVE);
        let step_ms = self.config.tick.as_secs_f64() * 1000.0 * speedup;
        let ticker = tokio::spawn(run_ticker(
            Arc::clone(&clock),
            sink,
            self.config.tick,
            step_ms,
            duration_ms,
        ));

        Ok(Box::new(StubSound {
            clock,
            duration_ms,
            ticker,
        }))
    }
}

#[derive(Debug)]
struct Clock {
    position_ms: f64,
    playing: bool,
    rate: f32,
    unloaded: bool,
}

struct StubSound {
    clock: Arc<Mutex<Clock>>,
    duration_ms: u64,
    ticker: JoinHandle<()>,
}

impl StubSound {
    fn ensure_loaded(&self) -> Result<()> {
        if self.clock.lock().unloaded {
            return Err(TourError::Playback("sound is unloaded".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SoundHandle for StubSound {
    async fn play(&self) -> Result<()> {
        self.ensure_loaded()?;
        self.clock.lock().playing = true;
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.ensure_loaded()?;
        self.clock.lock().playing = false;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.ensure_loaded()?;
        let mut clock = self.clock.lock();
        clock.playing = false;
        clock.position_ms = 0.0;
        Ok(())
    }

    async fn unload(&self) -> Result<()> {
        {
            let mut clock = self.clock.lock();
            clock.playing = false;
            clock.unloaded = true;
        }
        self.ticker.abort();
        Ok(())
    }

    async fn set_position(&self, position_ms: u64) -> Result<()> {
        self.ensure_loaded()?;
        self.clock.lock().position_ms = position_ms.min(self.duration_ms) as f64;
        Ok(())
    }

    async fn set_rate(&self, rate: f32) -> Result<()> {
        self.ensure_loaded()?;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(TourError::Playback(format!("invalid rate {rate}")));
        }
        self.clock.lock().rate = rate;
        Ok(())
    }
}

impl Drop for StubSound {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

async fn run_ticker(
    clock: Arc<Mutex<Clock>>,
    sink: ProgressSink,
    tick: Duration,
    step_ms: f64,
    duration_ms: u64,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately.
    interval.tick().await;

    let end = duration_ms as f64;
    loop {
        interval.tick().await;

        let status = {
            let mut clock = clock.lock();
            if clock.unloaded {
                break;
            }
            if !clock.playing {
                continue;
            }
            clock.position_ms += step_ms * f64::from(clock.rate);
            let did_finish = clock.position_ms >= end;
            if did_finish {
                clock.position_ms = end;
                clock.playing = false;
            }
            SoundStatus {
                position_ms: clock.position_ms as u64,
                is_playing: clock.playing,
                did_finish,
                error: None,
            }
        };

        if !sink.emit(status) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(start: u64, duration: u64) -> SoundRequest {
        SoundRequest {
            source: AudioSource::Remote("https://cdn.example.com/a.mp3".into()),
            start_position_ms: start,
            duration_hint_ms: Some(duration),
        }
    }

    #[tokio::test]
    async fn paused_sound_reports_nothing() {
        let backend = StubBackend::with_tick(Duration::from_millis(5));
        let (sink, mut rx) = ProgressSink::channel(1);
        let _sound = backend.create(request(0, 1_000), sink).await.expect("create");

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn playing_sound_advances_and_finishes_once() {
        let backend = StubBackend::with_tick(Duration::from_millis(5));
        let (sink, mut rx) = ProgressSink::channel(2);
        let sound = backend.create(request(0, 20), sink).await.expect("create");
        sound.set_rate(2.0).await.expect("rate");
        sound.play().await.expect("play");

        let mut finished = 0;
        let mut last = 0;
        while let Ok(Some(update)) =
            tokio::time::timeout(Duration::from_millis(200), rx.recv()).await
        {
            assert_eq!(update.generation, 2);
            assert!(update.status.position_ms >= last);
            last = update.status.position_ms;
            if update.status.did_finish {
                finished += 1;
                assert!(!update.status.is_playing);
            }
        }
        assert_eq!(finished, 1);
        assert_eq!(last, 20);
    }

    #[tokio::test]
    async fn speedup_scales_virtual_time() {
        let backend = StubBackend::new(StubConfig {
            tick: Duration::from_millis(5),
            default_duration_ms: 60_000,
            speedup: 100.0,
        });
        let (sink, mut rx) = ProgressSink::channel(5);
        let sound = backend.create(request(0, 10_000), sink).await.expect("create");
        sound.play().await.expect("play");

        let first = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("tick")
            .expect("update");
        assert_eq!(first.status.position_ms, 500);
    }

    #[tokio::test]
    async fn unloaded_sound_rejects_controls() {
        let backend = StubBackend::default();
        let (sink, _rx) = ProgressSink::channel(3);
        let sound = backend.create(request(500, 1_000), sink).await.expect("create");
        sound.unload().await.expect("unload");
        assert!(sound.play().await.is_err());
        assert!(sound.set_position(10).await.is_err());
        // Unload twice is harmless.
        sound.unload().await.expect("second unload");
    }

    #[tokio::test]
    async fn rejects_non_positive_rate() {
        let backend = StubBackend::default();
        let (sink, _rx) = ProgressSink::channel(0);
        let sound = backend.create(request(0, 1_000), sink).await.expect("create");
        assert!(sound.set_rate(0.0).await.is_err());
        assert!(sound.set_rate(1.5).await.is_ok());
    }
}
