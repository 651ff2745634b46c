use std::sync::Arc;

use anyhow::{Result, anyhow};
use tracing::error;

use echo_ai::EchoAi;
use echo_db::Database;

use crate::aggregator::ThreadAggregator;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub ai: EchoAi,
    pub threads: ThreadAggregator,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, ai: EchoAi) -> AppState {
        Arc::new(Self {
            threads: ThreadAggregator::new(db.clone()),
            db,
            ai,
        })
    }
}

/// Run blocking store work off the async runtime.
pub(crate) async fn blocking<F, T>(db: &Arc<Database>, f: F) -> Result<T>
where
    F: FnOnce(&Database) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            anyhow!("Store task failed: {}", e)
        })?
}
