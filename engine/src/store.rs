//! SQLite-backed catalog.
//!
//! Holds the content catalog, the play log and listener presence in one
//! file. rusqlite is synchronous, so every call hops onto the blocking pool
//! via `spawn_blocking` and the connection sits behind a std mutex.

use crate::error::{PlayoutError, Result};
use crate::model::{Category, CategoryCounts, ContentItem};
use crate::source::{CatalogChange, ContentSource};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

/// A catalog entry as submitted by the admin panel.
#[derive(Debug, Clone, Deserialize)]
pub struct NewContentItem {
    pub title: String,
    #[serde(default)]
    pub artist: Option<String>,
    pub url: String,
    pub category: Category,
    #[serde(default)]
    pub duration_seconds: Option<u32>,
}

impl NewContentItem {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title is empty".into());
        }
        if self.url.trim().is_empty() {
            return Err("url is empty".into());
        }
        Ok(())
    }
}

/// One row of the play log.
#[derive(Debug, Clone, Serialize)]
pub struct PlayRecord {
    pub item_id: String,
    pub title: Option<String>,
    pub category: Category,
    /// Unix seconds.
    pub played_at: i64,
    pub listeners: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogSummary {
    pub items: CategoryCounts,
    pub active_listeners: u32,
}

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    changes: broadcast::Sender<CatalogChange>,
    listener_window: Duration,
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn db_init(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;

        CREATE TABLE IF NOT EXISTS catalog_items (
            id          TEXT PRIMARY KEY,
            title       TEXT,
            artist      TEXT,
            url         TEXT NOT NULL,
            category    TEXT NOT NULL,
            duration_s  INTEGER NOT NULL DEFAULT 0,
            play_count  INTEGER NOT NULL DEFAULT 0,
            active      INTEGER NOT NULL DEFAULT 1,
            created_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_catalog_items_category ON catalog_items(category, active);

        CREATE TABLE IF NOT EXISTS play_history (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            item_id     TEXT NOT NULL,
            played_at   INTEGER NOT NULL,
            listeners   INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS listeners (
            session_id  TEXT PRIMARY KEY,
            started_at  INTEGER NOT NULL,
            last_seen   INTEGER NOT NULL
        );
        "#,
    )
}

const ITEM_COLUMNS: &str = "id, title, artist, url, category, duration_s, play_count";

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContentItem> {
    let category: String = row.get(4)?;
    let category = category
        .parse::<Category>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e.into()))?;
    Ok(ContentItem {
        id: row.get(0)?,
        title: row.get(1)?,
        artist: row.get(2)?,
        url: row.get(3)?,
        category,
        duration_seconds: row.get::<_, i64>(5)?.max(0) as u32,
        play_count: row.get::<_, i64>(6)?.max(0) as u64,
    })
}

fn db_load_pool(conn: &Connection, category: Option<Category>) -> rusqlite::Result<Vec<ContentItem>> {
    let mut out = Vec::new();
    match category {
        Some(c) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM catalog_items
                 WHERE active = 1 AND category = ?1
                 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt.query_map(params![c.as_str()], row_to_item)?;
            for r in rows {
                out.push(r?);
            }
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM catalog_items
                 WHERE active = 1
                 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt.query_map([], row_to_item)?;
            for r in rows {
                out.push(r?);
            }
        }
    }
    Ok(out)
}

fn db_least_played(conn: &Connection, category: Category) -> rusqlite::Result<Option<ContentItem>> {
    conn.query_row(
        &format!(
            "SELECT {ITEM_COLUMNS} FROM catalog_items
             WHERE active = 1 AND category = ?1
             ORDER BY play_count ASC, created_at ASC, rowid ASC
             LIMIT 1"
        ),
        params![category.as_str()],
        row_to_item,
    )
    .optional()
}

fn db_record_play(conn: &mut Connection, item_id: &str, listeners: u32, at: i64) -> rusqlite::Result<bool> {
    let tx = conn.transaction()?;
    let updated = tx.execute(
        "UPDATE catalog_items SET play_count = play_count + 1 WHERE id = ?1",
        params![item_id],
    )?;
    if updated > 0 {
        tx.execute(
            "INSERT INTO play_history (item_id, played_at, listeners) VALUES (?1, ?2, ?3)",
            params![item_id, at, listeners as i64],
        )?;
    }
    tx.commit()?;
    Ok(updated > 0)
}

fn db_touch_listener(conn: &Connection, session_id: &str, at: i64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO listeners (session_id, started_at, last_seen)
         VALUES (?1, ?2, ?2)
         ON CONFLICT(session_id) DO UPDATE SET last_seen = excluded.last_seen",
        params![session_id, at],
    )?;
    Ok(())
}

fn db_count_listeners(conn: &Connection, since: i64) -> rusqlite::Result<u32> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM listeners WHERE last_seen >= ?1",
        params![since],
        |row| row.get(0),
    )?;
    Ok(n.max(0) as u32)
}

impl SqliteStore {
    pub fn open(path: &str, listener_window: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;
        info!("catalog database opened at {path}");
        Self::from_connection(conn, listener_window)
    }

    pub fn open_in_memory(listener_window: Duration) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, listener_window)
    }

    fn from_connection(conn: Connection, listener_window: Duration) -> Result<Self> {
        db_init(&conn)?;
        let (changes, _) = broadcast::channel(16);
        Ok(Self { conn: Arc::new(Mutex::new(conn)), changes, listener_window })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| anyhow::anyhow!("sqlite connection mutex poisoned"))?;
            f(&mut *guard)
        })
        .await
        .map_err(|e| anyhow::anyhow!("sqlite task join failed: {e}"))?
    }

    fn notify(&self, change: CatalogChange) {
        // No receivers is fine: nothing is playing yet.
        let _ = self.changes.send(change);
    }

    pub async fn add_item(&self, new: NewContentItem) -> Result<ContentItem> {
        let item = ContentItem {
            id: Uuid::new_v4().to_string(),
            title: Some(new.title.trim().to_string()),
            artist: new.artist.map(|a| a.trim().to_string()).filter(|a| !a.is_empty()),
            url: new.url.trim().to_string(),
            category: new.category,
            duration_seconds: new.duration_seconds.unwrap_or(0),
            play_count: 0,
        };

        let row = item.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO catalog_items (id, title, artist, url, category, duration_s, play_count, active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 1, ?7)",
                params![
                    row.id,
                    row.title,
                    row.artist,
                    row.url,
                    row.category.as_str(),
                    row.duration_seconds as i64,
                    unix_now()
                ],
            )?;
            Ok(())
        })
        .await?;

        info!("catalog add: [{}] {} ({})", item.category.tag(), item.display_title(), item.id);
        self.notify(CatalogChange::Added(item.id.clone()));
        Ok(item)
    }

    /// Soft-deletes an item. Returns `false` when no active item has that id.
    pub async fn deactivate_item(&self, id: &str) -> Result<bool> {
        let id_owned = id.to_string();
        let changed = self
            .with_conn(move |conn| {
                let n = conn.execute(
                    "UPDATE catalog_items SET active = 0 WHERE id = ?1 AND active = 1",
                    params![id_owned],
                )?;
                Ok(n > 0)
            })
            .await?;

        if changed {
            info!("catalog remove: {id}");
            self.notify(CatalogChange::Removed(id.to_string()));
        }
        Ok(changed)
    }

    pub async fn list_items(&self, category: Option<Category>) -> Result<Vec<ContentItem>> {
        self.with_conn(move |conn| Ok(db_load_pool(conn, category)?)).await
    }

    pub async fn summary(&self) -> Result<CatalogSummary> {
        let since = unix_now() - self.listener_window.as_secs() as i64;
        self.with_conn(move |conn| {
            let mut items = CategoryCounts::default();
            {
                let mut stmt = conn.prepare(
                    "SELECT category, COUNT(*) FROM catalog_items WHERE active = 1 GROUP BY category",
                )?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    let cat: String = row.get(0)?;
                    let n: i64 = row.get(1)?;
                    if let Ok(c) = cat.parse::<Category>() {
                        items.add(c, n.max(0) as u64);
                    }
                }
            }
            let active_listeners = db_count_listeners(conn, since)?;
            Ok(CatalogSummary { items, active_listeners })
        })
        .await
    }

    pub async fn recent_plays(&self, limit: u32) -> Result<Vec<PlayRecord>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT h.item_id, c.title, c.category, h.played_at, h.listeners
                 FROM play_history h JOIN catalog_items c ON c.id = h.item_id
                 ORDER BY h.id DESC
                 LIMIT ?1",
            )?;
            let mut rows = stmt.query(params![limit as i64])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let cat: String = row.get(2)?;
                let category = cat
                    .parse::<Category>()
                    .map_err(|e| PlayoutError::Other(anyhow::anyhow!(e)))?;
                out.push(PlayRecord {
                    item_id: row.get(0)?,
                    title: row.get(1)?,
                    category,
                    played_at: row.get(3)?,
                    listeners: row.get::<_, i64>(4)?.max(0) as u32,
                });
            }
            Ok(out)
        })
        .await
    }

    /// Presence ping from a listening client.
    pub async fn touch_listener(&self, session_id: &str) -> Result<()> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| Ok(db_touch_listener(conn, &session_id, unix_now())?))
            .await
    }
}

#[async_trait::async_trait]
impl ContentSource for SqliteStore {
    async fn fetch_pool(&self, category: Category) -> Result<Vec<ContentItem>> {
        self.with_conn(move |conn| Ok(db_load_pool(conn, Some(category))?))
            .await
            .map_err(|e| PlayoutError::SourceUnavailable { category, reason: e.to_string() })
    }

    async fn fetch_one(&self, category: Category) -> Result<Option<ContentItem>> {
        self.with_conn(move |conn| Ok(db_least_played(conn, category)?))
            .await
            .map_err(|e| PlayoutError::SourceUnavailable { category, reason: e.to_string() })
    }

    async fn record_play(&self, item_id: &str, listeners: u32) -> Result<()> {
        let id = item_id.to_string();
        let known = self
            .with_conn(move |conn| Ok(db_record_play(conn, &id, listeners, unix_now())?))
            .await?;
        if !known {
            debug!("play of {item_id} not logged: not in catalog");
        }
        Ok(())
    }

    async fn active_listeners(&self) -> Result<u32> {
        let since = unix_now() - self.listener_window.as_secs() as i64;
        self.with_conn(move |conn| Ok(db_count_listeners(conn, since)?)).await
    }

    fn subscribe(&self) -> broadcast::Receiver<CatalogChange> {
        self.changes.subscribe()
    }
}
