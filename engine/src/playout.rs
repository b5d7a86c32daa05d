//! Playback continuity: what plays now and what plays next.
//!
//! [`Playout`] owns the queue, the history and the session counters. It runs
//! as a single task ([`spawn`]) that serializes every transition: commands
//! from the API, `ended`/`error` signals from the output, catalog change
//! notifications and the retry deadline. Readers never touch the queue; they
//! read the [`PlayoutSnapshot`] republished after each handled message.

use crate::clock::{time_signal_window, HourWindow, WallClock};
use crate::error::{PlayoutError, Result};
use crate::fader::Fader;
use crate::model::{Category, CategoryCounts, ContentItem, PlaybackStats};
use crate::output::{AudioOutput, OutputEvent};
use crate::rotation::{build_rotation, RotationConfig};
use crate::source::{one_or_default, pool_or_empty, ContentSource};
use serde::Serialize;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::{debug, info, warn};

pub const HISTORY_LEN: usize = 10;
pub const RETRY_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Loading,
    Playing,
    Ended,
    Errored,
}

#[derive(Debug, Clone)]
pub struct PlayoutConfig {
    pub rotation: RotationConfig,
    /// Interrupt the rotation with a time signal at the top of the hour.
    pub time_signal: bool,
    /// Fall back to built-in content when the catalog is empty.
    pub fallback_content: bool,
    pub retry_delay: Duration,
    pub history_len: usize,
    pub fade: Duration,
    /// Initial logical volume, percent.
    pub volume: u8,
}

impl Default for PlayoutConfig {
    fn default() -> Self {
        Self {
            rotation: RotationConfig::default(),
            time_signal: true,
            fallback_content: true,
            retry_delay: RETRY_DELAY,
            history_len: HISTORY_LEN,
            fade: Duration::from_millis(1000),
            volume: 70,
        }
    }
}

#[derive(Debug)]
pub enum PlayoutCommand {
    Play,
    Pause,
    SetVolume(u8),
    Shutdown,
}

/// Read-only view of the controller, published after every transition.
#[derive(Debug, Clone, Serialize)]
pub struct PlayoutSnapshot {
    pub phase: Phase,
    pub is_playing: bool,
    /// Nothing could be scheduled; the UI shows a "no content" state.
    pub no_content: bool,
    pub current: Option<ContentItem>,
    #[serde(skip)]
    pub queue: Vec<ContentItem>,
    pub history: Vec<ContentItem>,
    pub stats: PlaybackStats,
    /// Logical volume, percent.
    pub volume: u8,
    /// Gain the output is actually at (differs from `volume` mid-fade or paused).
    pub gain: f32,
}

impl PlayoutSnapshot {
    pub fn upcoming(&self, n: usize) -> Vec<ContentItem> {
        self.queue.iter().take(n).cloned().collect()
    }
}

impl Default for PlayoutSnapshot {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            is_playing: false,
            no_content: false,
            current: None,
            queue: Vec::new(),
            history: Vec::new(),
            stats: PlaybackStats::default(),
            volume: 0,
            gain: 0.0,
        }
    }
}

pub struct Playout {
    source: Arc<dyn ContentSource>,
    output: Arc<dyn AudioOutput>,
    clock: Arc<dyn WallClock>,
    fader: Fader,
    cfg: PlayoutConfig,

    queue: VecDeque<ContentItem>,
    history: VecDeque<ContentItem>,
    current: Option<ContentItem>,
    phase: Phase,
    is_playing: bool,
    no_content: bool,

    total_played: u64,
    played: CategoryCounts,
    started_at: Instant,

    last_signal: Option<HourWindow>,
    retry: Option<Pin<Box<Sleep>>>,
}

impl Playout {
    pub fn new(
        source: Arc<dyn ContentSource>,
        output: Arc<dyn AudioOutput>,
        clock: Arc<dyn WallClock>,
        cfg: PlayoutConfig,
    ) -> Self {
        let fader = Fader::new(output.clone(), cfg.fade, cfg.volume.min(100) as f32 / 100.0);
        Self {
            source,
            output,
            clock,
            fader,
            cfg,
            queue: VecDeque::new(),
            history: VecDeque::new(),
            current: None,
            phase: Phase::Idle,
            is_playing: false,
            no_content: false,
            total_played: 0,
            played: CategoryCounts::default(),
            started_at: Instant::now(),
            last_signal: None,
            retry: None,
        }
    }

    pub fn current_track(&self) -> Option<&ContentItem> {
        self.current.as_ref()
    }

    /// The next `n` queued items, without consuming them.
    pub fn upcoming(&self, n: usize) -> Vec<ContentItem> {
        self.queue.iter().take(n).cloned().collect()
    }

    pub fn history(&self) -> Vec<ContentItem> {
        self.history.iter().cloned().collect()
    }

    pub fn stats(&self) -> PlaybackStats {
        PlaybackStats {
            total_played: self.total_played,
            played: self.played,
            uptime_sec: self.started_at.elapsed().as_secs(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn retry_pending(&self) -> bool {
        self.retry.is_some()
    }

    pub async fn snapshot(&self) -> PlayoutSnapshot {
        PlayoutSnapshot {
            phase: self.phase,
            is_playing: self.is_playing,
            no_content: self.no_content,
            current: self.current.clone(),
            queue: self.queue.iter().cloned().collect(),
            history: self.history(),
            stats: self.stats(),
            volume: (self.fader.target() * 100.0).round() as u8,
            gain: self.output.gain().await,
        }
    }

    /// Replace the queue's future contents with a fresh rotation. The
    /// current track is left alone.
    pub async fn rebuild(&mut self) {
        let src = self.source.as_ref();
        let (music, ads, announcements) = tokio::join!(
            pool_or_empty(src, Category::Music),
            pool_or_empty(src, Category::Ad),
            pool_or_empty(src, Category::Announcement),
        );

        let catalog_empty = music.is_empty() && ads.is_empty() && announcements.is_empty();
        let rotation = if catalog_empty && !self.cfg.fallback_content {
            Vec::new()
        } else {
            if catalog_empty {
                warn!("catalog is empty; scheduling built-in fallback content");
            }
            build_rotation(&music, &ads, &announcements, &self.cfg.rotation)
        };

        info!(
            "rotation rebuilt: {} items ({} music, {} ads, {} announcements in pools)",
            rotation.len(),
            music.len(),
            ads.len(),
            announcements.len()
        );
        self.queue = rotation.into();
        if !self.queue.is_empty() {
            self.no_content = false;
        }
    }

    async fn refill(&mut self) -> Result<()> {
        self.rebuild().await;
        if self.queue.is_empty() {
            return Err(PlayoutError::QueueExhausted);
        }
        Ok(())
    }

    /// Enter `Loading`: pick the next item (time signal first, then the queue
    /// front), hand it to the output and start it if the session is playing.
    async fn load_next(&mut self) {
        self.retry = None;
        self.phase = Phase::Loading;

        if let Some(signal) = self.time_signal_due().await {
            self.start(signal).await;
            return;
        }

        if self.queue.is_empty() {
            if let Err(e) = self.refill().await {
                warn!("{e}; going idle");
                self.go_idle();
                return;
            }
        }

        match self.queue.pop_front() {
            Some(next) => self.start(next).await,
            None => self.go_idle(),
        }
    }

    fn go_idle(&mut self) {
        self.current = None;
        self.phase = Phase::Idle;
        self.no_content = true;
    }

    /// Time signal to play now, if this is the first `Loading` inside a
    /// top-of-hour window. The queue is not touched.
    async fn time_signal_due(&mut self) -> Option<ContentItem> {
        // A paused session would only hold the signal until it's stale.
        if !self.cfg.time_signal || !self.is_playing {
            return None;
        }
        let window = time_signal_window(self.clock.now())?;
        if self.last_signal == Some(window) {
            return None;
        }
        self.last_signal = Some(window);

        let signal = one_or_default(self.source.as_ref(), Category::TimeSignal).await;
        info!("top of the hour: interrupting rotation with {}", signal.display_title());
        Some(signal)
    }

    async fn start(&mut self, item: ContentItem) {
        self.no_content = false;
        self.current = Some(item.clone());
        self.note_selection(&item);

        if let Err(e) = self.output.load(&item).await {
            self.fail(&item.id, &e.to_string());
            return;
        }
        if self.is_playing {
            self.begin_playback().await;
        }
    }

    async fn begin_playback(&mut self) {
        let Some(item) = self.current.clone() else {
            return;
        };
        match self.output.play().await {
            Ok(()) => {
                self.phase = Phase::Playing;
                info!(
                    "playout start: [{}] {} - {}",
                    item.category.tag(),
                    item.display_artist(),
                    item.display_title()
                );
            }
            Err(e) => self.fail(&item.id, &e.to_string()),
        }
    }

    /// Tell the source an item was picked. Fire-and-forget: a failure is
    /// logged and never reaches the controller.
    fn note_selection(&self, item: &ContentItem) {
        let source = self.source.clone();
        let id = item.id.clone();
        tokio::spawn(async move {
            let listeners = source.active_listeners().await.unwrap_or_else(|e| {
                debug!("listener count unavailable: {e}");
                0
            });
            if let Err(e) = source.record_play(&id, listeners).await {
                warn!("failed to record play of {id}: {e}");
            }
        });
    }

    fn fail(&mut self, item_id: &str, reason: &str) {
        warn!(
            "playback failure on {item_id}: {reason}; advancing in {:?}",
            self.cfg.retry_delay
        );
        self.phase = Phase::Errored;
        self.retry = Some(Box::pin(tokio::time::sleep(self.cfg.retry_delay)));
    }

    fn is_current(&self, item_id: &str) -> bool {
        self.current.as_ref().is_some_and(|c| c.id == item_id)
    }

    pub async fn on_ended(&mut self, item_id: &str) {
        if !self.is_current(item_id) {
            debug!("ignoring stale ended signal for {item_id}");
            return;
        }
        let Some(done) = self.current.take() else {
            return;
        };
        info!("playout end: {} - {}", done.display_artist(), done.display_title());

        self.phase = Phase::Ended;
        self.total_played += 1;
        self.played.bump(done.category);
        self.history.push_back(done);
        while self.history.len() > self.cfg.history_len {
            self.history.pop_front();
        }

        self.load_next().await;
    }

    pub async fn on_error(&mut self, item_id: &str, reason: &str) {
        if !self.is_current(item_id) {
            debug!("ignoring stale error signal for {item_id}");
            return;
        }
        self.fail(item_id, reason);
    }

    /// The backoff after a failure elapsed: move on to the next item.
    pub async fn retry_due(&mut self) {
        self.retry = None;
        self.load_next().await;
    }

    pub async fn on_output_event(&mut self, event: OutputEvent) {
        match event {
            OutputEvent::Ended { item_id } => self.on_ended(&item_id).await,
            OutputEvent::Errored { item_id, reason } => self.on_error(&item_id, &reason).await,
        }
    }

    pub async fn on_catalog_change(&mut self) {
        self.rebuild().await;
        if self.phase == Phase::Idle && self.is_playing && !self.queue.is_empty() {
            self.load_next().await;
        }
    }

    pub async fn play(&mut self) {
        if self.is_playing {
            return;
        }
        self.is_playing = true;

        if self.current.is_none() {
            self.load_next().await;
        } else if self.phase != Phase::Errored {
            self.begin_playback().await;
        }
        self.fader.fade_in().await;
    }

    pub async fn pause(&mut self) {
        if !self.is_playing {
            return;
        }
        self.is_playing = false;

        let output = self.output.clone();
        self.fader
            .fade_out(move || async move {
                output.pause().await;
                info!("playback paused");
            })
            .await;
    }

    pub async fn set_volume(&mut self, percent: u8) {
        let percent = percent.min(100);
        self.fader.set_target(percent as f32 / 100.0);
        if !self.is_playing {
            return;
        }
        if self.fader.is_ramping() {
            self.fader.retarget().await;
        } else {
            self.output.set_gain(self.fader.target()).await;
        }
    }

    /// Stop everything: no retry or ramp may act after this.
    pub async fn teardown(&mut self) {
        self.retry = None;
        self.fader.cancel();
        self.output.pause().await;
        self.is_playing = false;
        self.phase = Phase::Idle;
    }

    async fn publish(&self, snapshot: &RwLock<PlayoutSnapshot>) {
        let snap = self.snapshot().await;
        *snapshot.write().await = snap;
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<PlayoutCommand>,
        mut events: mpsc::Receiver<OutputEvent>,
        snapshot: Arc<RwLock<PlayoutSnapshot>>,
    ) {
        let mut changes = self.source.subscribe();
        let mut changes_open = true;
        self.publish(&snapshot).await;

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(PlayoutCommand::Play) => self.play().await,
                    Some(PlayoutCommand::Pause) => self.pause().await,
                    Some(PlayoutCommand::SetVolume(p)) => self.set_volume(p).await,
                    Some(PlayoutCommand::Shutdown) | None => {
                        self.teardown().await;
                        self.publish(&snapshot).await;
                        info!("playout stopped");
                        break;
                    }
                },
                Some(event) = events.recv() => self.on_output_event(event).await,
                change = changes.recv(), if changes_open => match change {
                    Ok(c) => {
                        info!("catalog changed ({c:?}); rebuilding rotation");
                        self.on_catalog_change().await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        info!("missed {n} catalog notifications; rebuilding rotation");
                        self.on_catalog_change().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => changes_open = false,
                },
                _ = retry_elapsed(&mut self.retry) => self.retry_due().await,
            }
            self.publish(&snapshot).await;
        }
    }
}

async fn retry_elapsed(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Cheap, cloneable handle to a running playout task.
#[derive(Clone)]
pub struct PlayoutHandle {
    commands: mpsc::Sender<PlayoutCommand>,
    events: mpsc::Sender<OutputEvent>,
    snapshot: Arc<RwLock<PlayoutSnapshot>>,
}

impl PlayoutHandle {
    pub async fn send(&self, cmd: PlayoutCommand) -> anyhow::Result<()> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| anyhow::anyhow!("playout task is not running"))
    }

    /// Forward a playback element signal (e.g. posted by a browser client).
    pub async fn report(&self, event: OutputEvent) -> anyhow::Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| anyhow::anyhow!("playout task is not running"))
    }

    pub async fn snapshot(&self) -> PlayoutSnapshot {
        self.snapshot.read().await.clone()
    }
}

/// Start the playout task. `events_tx`/`events_rx` is the channel the output
/// reports on; the handle keeps a sender so remote clients can report too.
pub fn spawn(
    playout: Playout,
    events_tx: mpsc::Sender<OutputEvent>,
    events_rx: mpsc::Receiver<OutputEvent>,
) -> (PlayoutHandle, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let snapshot = Arc::new(RwLock::new(PlayoutSnapshot::default()));
    let task = tokio::spawn(playout.run(cmd_rx, events_rx, snapshot.clone()));
    (PlayoutHandle { commands: cmd_tx, events: events_tx, snapshot }, task)
}
