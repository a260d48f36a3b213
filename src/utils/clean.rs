use std::time::Duration;
use tokio::time;
use tracing::debug;
use crate::state::RoomRegistry;

/// Evicts rooms left empty for longer than `ttl`. Only spawned when a TTL
/// is configured; otherwise rooms live as long as the process.
pub async fn task(rooms: RoomRegistry, ttl: Duration, every: Duration) {
    let mut tick = time::interval(every);
    loop {
        tick.tick().await;
        let removed = rooms.evict_idle(ttl).await;
        if removed > 0 {
            let left = rooms.len().await;
            debug!(removed, left, "sweep done");
        }
    }
}
