use crate::model::Category;

/// Failures inside the playout core. None of them are fatal: callers degrade
/// to fallback content or a delayed retry.
#[derive(Debug, thiserror::Error)]
pub enum PlayoutError {
    #[error("content source unavailable for {category}: {reason}")]
    SourceUnavailable { category: Category, reason: String },

    #[error("playback failed for {item_id}: {reason}")]
    PlaybackFailure { item_id: String, reason: String },

    #[error("queue exhausted and rebuild produced nothing")]
    QueueExhausted,

    #[error("storage: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PlayoutError>;
