//! Scriptable collaborators for unit tests.

use crate::clock::WallClock;
use crate::error::{PlayoutError, Result};
use crate::model::{Category, ContentItem};
use crate::output::{clamp01_f32, AudioOutput};
use crate::source::{CatalogChange, ContentSource};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use time::OffsetDateTime;
use tokio::sync::broadcast;

pub fn item(id: &str, category: Category) -> ContentItem {
    ContentItem {
        id: id.into(),
        title: Some(id.to_uppercase()),
        artist: Some("Test Artist".into()),
        url: format!("https://cdn.example/{id}.mp3"),
        category,
        duration_seconds: 180,
        play_count: 0,
    }
}

pub fn music(ids: &[&str]) -> Vec<ContentItem> {
    ids.iter().map(|id| item(id, Category::Music)).collect()
}

pub struct FakeSource {
    pools: Mutex<HashMap<Category, Vec<ContentItem>>>,
    fail: AtomicBool,
    plays: Mutex<Vec<(String, u32)>>,
    changes: broadcast::Sender<CatalogChange>,
}

impl Default for FakeSource {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(8);
        Self {
            pools: Mutex::new(HashMap::new()),
            fail: AtomicBool::new(false),
            plays: Mutex::new(Vec::new()),
            changes,
        }
    }
}

impl FakeSource {
    pub fn set_pool(&self, category: Category, items: Vec<ContentItem>) {
        self.pools.lock().unwrap().insert(category, items);
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn plays(&self) -> Vec<(String, u32)> {
        self.plays.lock().unwrap().clone()
    }

    pub fn notify(&self, change: CatalogChange) {
        let _ = self.changes.send(change);
    }

    fn check(&self, category: Category) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PlayoutError::SourceUnavailable { category, reason: "offline".into() });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ContentSource for FakeSource {
    async fn fetch_pool(&self, category: Category) -> Result<Vec<ContentItem>> {
        self.check(category)?;
        Ok(self.pools.lock().unwrap().get(&category).cloned().unwrap_or_default())
    }

    async fn fetch_one(&self, category: Category) -> Result<Option<ContentItem>> {
        self.check(category)?;
        Ok(self.pools.lock().unwrap().get(&category).and_then(|p| p.first().cloned()))
    }

    async fn record_play(&self, item_id: &str, listeners: u32) -> Result<()> {
        self.plays.lock().unwrap().push((item_id.to_string(), listeners));
        Ok(())
    }

    async fn active_listeners(&self) -> Result<u32> {
        Ok(3)
    }

    fn subscribe(&self) -> broadcast::Receiver<CatalogChange> {
        self.changes.subscribe()
    }
}

#[derive(Default)]
struct FakeOutputState {
    loads: Vec<String>,
    playing: bool,
    gain: f32,
    gains: Vec<f32>,
    failing: HashSet<String>,
}

#[derive(Default)]
pub struct FakeOutput {
    state: Mutex<FakeOutputState>,
}

impl FakeOutput {
    /// Make `load` fail for this item id.
    pub fn fail_on(&self, id: &str) {
        self.state.lock().unwrap().failing.insert(id.to_string());
    }

    pub fn loads(&self) -> Vec<String> {
        self.state.lock().unwrap().loads.clone()
    }

    pub fn playing(&self) -> bool {
        self.state.lock().unwrap().playing
    }

    pub fn current_gain(&self) -> f32 {
        self.state.lock().unwrap().gain
    }

    pub fn gain_log(&self) -> Vec<f32> {
        self.state.lock().unwrap().gains.clone()
    }
}

#[async_trait::async_trait]
impl AudioOutput for FakeOutput {
    async fn load(&self, item: &ContentItem) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.loads.push(item.id.clone());
        if s.failing.contains(&item.id) {
            return Err(PlayoutError::PlaybackFailure {
                item_id: item.id.clone(),
                reason: "decoder refused".into(),
            });
        }
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        self.state.lock().unwrap().playing = true;
        Ok(())
    }

    async fn pause(&self) {
        self.state.lock().unwrap().playing = false;
    }

    async fn set_gain(&self, gain: f32) {
        let mut s = self.state.lock().unwrap();
        let g = clamp01_f32(gain);
        s.gain = g;
        s.gains.push(g);
    }

    async fn gain(&self) -> f32 {
        self.state.lock().unwrap().gain
    }
}

pub struct FixedClock(Mutex<OffsetDateTime>);

impl FixedClock {
    pub fn new(at: OffsetDateTime) -> Self {
        Self(Mutex::new(at))
    }

    pub fn set(&self, at: OffsetDateTime) {
        *self.0.lock().unwrap() = at;
    }
}

impl WallClock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        *self.0.lock().unwrap()
    }
}
