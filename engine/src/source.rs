//! Content source contract consumed by the rotation builder and the playout
//! controller, plus the single place where lookups degrade to fallbacks.

use crate::error::Result;
use crate::model::{Category, ContentItem};
use crate::rotation::default_item;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

/// Catalog change notification. The payload is informational; any change
/// triggers a full rotation rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "id", rename_all = "snake_case")]
pub enum CatalogChange {
    Added(String),
    Removed(String),
}

#[async_trait::async_trait]
pub trait ContentSource: Send + Sync {
    /// Every active item of `category`, in catalog order.
    async fn fetch_pool(&self, category: Category) -> Result<Vec<ContentItem>>;

    /// One item of `category` for immediate playback (least played first),
    /// or `None` when the catalog has none.
    async fn fetch_one(&self, category: Category) -> Result<Option<ContentItem>>;

    /// Note that `item_id` was selected for playback while `listeners`
    /// clients were tuned in. Increments the item's play count.
    async fn record_play(&self, item_id: &str, listeners: u32) -> Result<()>;

    /// Number of clients seen recently.
    async fn active_listeners(&self) -> Result<u32>;

    /// Change feed for the backing catalog.
    fn subscribe(&self) -> broadcast::Receiver<CatalogChange>;
}

/// `fetch_pool` that never fails: errors are logged and become an empty pool.
pub async fn pool_or_empty(source: &dyn ContentSource, category: Category) -> Vec<ContentItem> {
    match source.fetch_pool(category).await {
        Ok(items) => items,
        Err(e) => {
            warn!("pool fetch failed for {category}, treating as empty: {e}");
            Vec::new()
        }
    }
}

/// `fetch_one` that always yields something playable: a missing item or a
/// failed lookup becomes the built-in item for the category.
pub async fn one_or_default(source: &dyn ContentSource, category: Category) -> ContentItem {
    match source.fetch_one(category).await {
        Ok(Some(item)) => item,
        Ok(None) => default_item(category),
        Err(e) => {
            warn!("lookup failed for {category}, using built-in content: {e}");
            default_item(category)
        }
    }
}
