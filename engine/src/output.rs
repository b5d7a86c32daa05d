//! The playback element seam.
//!
//! The controller tells an [`AudioOutput`] what to load and when to play; the
//! output reports completion or failure back as [`OutputEvent`]s on a channel.

use crate::error::{PlayoutError, Result};
use crate::model::ContentItem;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::debug;

/// Playback time assumed for items whose duration is unknown.
pub const DEFAULT_ITEM_DURATION: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Ended { item_id: String },
    Errored { item_id: String, reason: String },
}

#[async_trait::async_trait]
pub trait AudioOutput: Send + Sync {
    /// Point the element at `item`, replacing whatever was loaded.
    async fn load(&self, item: &ContentItem) -> Result<()>;
    /// Start or resume the loaded item.
    async fn play(&self) -> Result<()>;
    async fn pause(&self);
    async fn set_gain(&self, gain: f32);
    async fn gain(&self) -> f32;
}

pub fn clamp01_f32(x: f32) -> f32 {
    x.max(0.0).min(1.0)
}

/// Whether a locator looks like something an audio element can fetch.
pub fn is_playable_url(url: &str) -> bool {
    let url = url.trim();
    ["http://", "https://", "file://", "data:audio/", "/"]
        .iter()
        .any(|p| url.starts_with(p))
}

fn check_playable(item: &ContentItem) -> Result<()> {
    if is_playable_url(&item.url) {
        Ok(())
    } else {
        Err(PlayoutError::PlaybackFailure {
            item_id: item.id.clone(),
            reason: format!("unsupported audio locator: {:?}", item.url),
        })
    }
}

#[derive(Default)]
struct RemoteState {
    loaded: Option<ContentItem>,
    playing: bool,
    gain: f32,
}

/// Output played by remote clients (browsers).
///
/// Clients fetch the current item's URL from the status endpoint, play it
/// locally at the published gain, and post `ended`/`error` back. This side
/// only keeps the state they poll.
pub struct RemoteOutput {
    state: Mutex<RemoteState>,
}

impl RemoteOutput {
    pub fn new() -> Self {
        Self { state: Mutex::new(RemoteState { gain: 1.0, ..Default::default() }) }
    }

    pub async fn is_playing(&self) -> bool {
        self.state.lock().await.playing
    }
}

impl Default for RemoteOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AudioOutput for RemoteOutput {
    async fn load(&self, item: &ContentItem) -> Result<()> {
        check_playable(item)?;
        let mut s = self.state.lock().await;
        s.loaded = Some(item.clone());
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        let mut s = self.state.lock().await;
        if s.loaded.is_none() {
            return Err(PlayoutError::PlaybackFailure {
                item_id: String::new(),
                reason: "nothing loaded".into(),
            });
        }
        s.playing = true;
        Ok(())
    }

    async fn pause(&self) {
        self.state.lock().await.playing = false;
    }

    async fn set_gain(&self, gain: f32) {
        self.state.lock().await.gain = clamp01_f32(gain);
    }

    async fn gain(&self) -> f32 {
        self.state.lock().await.gain
    }
}

struct SimState {
    loaded: Option<ContentItem>,
    remaining: Duration,
    started_at: Option<Instant>,
    timer: Option<JoinHandle<()>>,
    gain: f32,
}

/// Server-side stand-in for a playback element: an item "plays" for its
/// duration and then reports `Ended`. Pausing freezes the remaining time.
pub struct SimulatedOutput {
    state: Mutex<SimState>,
    events: mpsc::Sender<OutputEvent>,
}

impl SimulatedOutput {
    pub fn new(events: mpsc::Sender<OutputEvent>) -> Self {
        Self {
            state: Mutex::new(SimState {
                loaded: None,
                remaining: Duration::ZERO,
                started_at: None,
                timer: None,
                gain: 1.0,
            }),
            events,
        }
    }
}

impl SimState {
    fn stop_timer(&mut self) {
        if let Some(t) = self.timer.take() {
            t.abort();
        }
        if let Some(started) = self.started_at.take() {
            self.remaining = self.remaining.saturating_sub(started.elapsed());
        }
    }
}

#[async_trait::async_trait]
impl AudioOutput for SimulatedOutput {
    async fn load(&self, item: &ContentItem) -> Result<()> {
        let mut s = self.state.lock().await;
        s.stop_timer();
        s.loaded = None;
        check_playable(item)?;

        s.remaining = match item.duration_seconds {
            0 => DEFAULT_ITEM_DURATION,
            d => Duration::from_secs(d as u64),
        };
        s.loaded = Some(item.clone());
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        let mut s = self.state.lock().await;
        let Some(item) = s.loaded.clone() else {
            return Err(PlayoutError::PlaybackFailure {
                item_id: String::new(),
                reason: "nothing loaded".into(),
            });
        };
        if s.timer.is_some() {
            return Ok(());
        }

        let remaining = s.remaining;
        let events = self.events.clone();
        debug!("simulated output: {} for {:?}", item.id, remaining);
        s.started_at = Some(Instant::now());
        s.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            let _ = events.send(OutputEvent::Ended { item_id: item.id }).await;
        }));
        Ok(())
    }

    async fn pause(&self) {
        self.state.lock().await.stop_timer();
    }

    async fn set_gain(&self, gain: f32) {
        self.state.lock().await.gain = clamp01_f32(gain);
    }

    async fn gain(&self) -> f32 {
        self.state.lock().await.gain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Category;
    use crate::testing::item;

    #[test]
    fn playable_locators() {
        assert!(is_playable_url("https://cdn.example/a.mp3"));
        assert!(is_playable_url(crate::rotation::FALLBACK_AUDIO_URL));
        assert!(is_playable_url("/srv/audio/a.flac"));
        assert!(!is_playable_url(""));
        assert!(!is_playable_url("ftp://x/a.mp3"));
    }

    #[tokio::test]
    async fn remote_output_rejects_bad_locator() {
        let out = RemoteOutput::new();
        let mut bad = item("bad", Category::Music);
        bad.url = "  ".into();
        assert!(matches!(out.load(&bad).await, Err(PlayoutError::PlaybackFailure { .. })));
        assert!(out.play().await.is_err());

        out.load(&item("ok", Category::Music)).await.unwrap();
        out.play().await.unwrap();
        assert!(out.is_playing().await);
        out.set_gain(1.7).await;
        assert_eq!(out.gain().await, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_output_ends_after_duration() {
        let (tx, mut rx) = mpsc::channel(4);
        let out = SimulatedOutput::new(tx);
        let mut it = item("m1", Category::Music);
        it.duration_seconds = 10;

        out.load(&it).await.unwrap();
        out.play().await.unwrap();

        tokio::time::sleep(Duration::from_secs(4)).await;
        out.pause().await;
        // Paused for a long time: nothing may end meanwhile.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());

        out.play().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(rx.try_recv().unwrap(), OutputEvent::Ended { item_id: "m1".into() });
    }
}
