use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use parlor_db::Database;

/// Background task that prunes expired sessions.
///
/// Lookups already ignore expired rows; this only keeps the table small.
pub async fn run_cleanup_loop(db: Arc<Database>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let db = db.clone();
        let result = tokio::task::spawn_blocking(move || {
            db.delete_expired_sessions(&parlor_db::now_timestamp())
        })
        .await;

        match result {
            Ok(Ok(count)) => {
                if count > 0 {
                    info!("Cleanup: pruned {} expired sessions", count);
                }
            }
            Ok(Err(e)) => warn!("Cleanup error: {}", e),
            Err(e) => warn!("Cleanup task panicked: {}", e),
        }
    }
}
