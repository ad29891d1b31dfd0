use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use tracing::error;

use yatube_db::Database;

use crate::cache::FeedCache;
use crate::error::{BlogError, Result};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub feed_cache: FeedCache,
    /// Uploaded images live under `<media_root>/posts/`.
    pub media_root: PathBuf,
}

/// Run blocking DB work off the async runtime.
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        BlogError::Internal(anyhow!("blocking task failed: {}", e))
    })?
}
