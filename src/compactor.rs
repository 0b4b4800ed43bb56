use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::Engine;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Background task that rewrites the WAL from a state snapshot once enough
/// appends have accumulated since the last compaction. Keeps replay time
/// bounded on busy calendars (cancel/re-book churn never shrinks the log
/// on its own).
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => warn!("WAL compaction failed: {e}"),
        }
    }
}
