use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{
    error::{AppErr, AppResult},
    room::RoomHandle,
    utils::keygen,
};

/* ------------ room registry ------------ */
/// Key → room for the whole process. Built once in `main` and handed to
/// handlers through an `Extension`.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<String, RoomHandle>>>,
}

impl RoomRegistry {
    /// Generates a key, starts a room task and records it, all under the write lock.
    pub async fn create_room(&self) -> AppResult<(String, RoomHandle)> {
        let key = keygen::room_key()?;
        let room = RoomHandle::spawn(&key);
        let mut m = self.rooms.write().await;
        if m.insert(key.clone(), room.clone()).is_some() {
            // 48-bit keys; a clash is accepted and the newer room wins.
            warn!(room = %key, "room key collision, previous room replaced");
        }
        info!(room = %key, total = m.len(), "room created");
        Ok((key, room))
    }

    pub async fn lookup(&self, key: &str) -> AppResult<RoomHandle> {
        self.rooms
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| AppErr::RoomNotFound(key.to_string()))
    }

    pub async fn len(&self) -> usize { self.rooms.read().await.len() }

    pub async fn is_empty(&self) -> bool { self.len().await == 0 }

    /// Drops rooms nobody has been connected to for at least `ttl`.
    /// Returns how many were removed.
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        let snapshot: Vec<(String, RoomHandle)> = self
            .rooms
            .read()
            .await
            .iter()
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect();

        let mut stale = Vec::new();
        for (key, room) in snapshot {
            match room.idle_for().await {
                Ok(Some(idle)) if idle >= ttl => stale.push((key, room)),
                Ok(_) => {}
                Err(_) => stale.push((key, room)),
            }
        }
        if stale.is_empty() { return 0; }

        let mut m = self.rooms.write().await;
        let mut removed = 0;
        for (key, room) in stale {
            // the key may have been reissued while we were asking
            if m.get(&key).is_some_and(|cur| cur.same_room(&room)) {
                m.remove(&key);
                removed += 1;
                info!(room = %key, "idle room evicted");
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::{ClientId, OUTBOX_CAPACITY};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn lookup_returns_created_room() {
        let reg = RoomRegistry::default();
        let (key, room) = reg.create_room().await.unwrap();
        let found = reg.lookup(&key).await.unwrap();
        assert!(found.same_room(&room));
        assert_eq!(found.key(), key);
        assert_eq!(reg.len().await, 1);
    }

    #[tokio::test]
    async fn unknown_and_empty_keys_are_not_found() {
        let reg = RoomRegistry::default();
        reg.create_room().await.unwrap();
        for k in ["", "nope", "ZZZZZZZZZZZZ"] {
            assert!(matches!(reg.lookup(k).await, Err(AppErr::RoomNotFound(_))));
        }
    }

    #[tokio::test]
    async fn concurrent_creates_all_land() {
        let reg = RoomRegistry::default();
        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let reg = reg.clone();
                tokio::spawn(async move { reg.create_room().await.unwrap().0 })
            })
            .collect();
        for t in tasks {
            let key = t.await.unwrap();
            assert!(reg.lookup(&key).await.is_ok());
        }
        assert_eq!(reg.len().await, 32);
    }

    #[tokio::test]
    async fn evict_keeps_occupied_rooms() {
        let reg = RoomRegistry::default();
        let (busy_key, busy) = reg.create_room().await.unwrap();
        let (idle_key, idle) = reg.create_room().await.unwrap();
        let (tx, _idle_rx) = mpsc::channel(OUTBOX_CAPACITY);
        let left = ClientId::new_v4();
        idle.join(left, tx, None).await.unwrap();
        idle.leave(left);
        let (tx, _rx) = mpsc::channel(OUTBOX_CAPACITY);
        busy.join(ClientId::new_v4(), tx, None).await.unwrap();

        assert_eq!(reg.evict_idle(Duration::ZERO).await, 1);
        assert!(reg.lookup(&busy_key).await.is_ok());
        assert!(reg.lookup(&idle_key).await.is_err());
    }

    #[tokio::test]
    async fn evict_respects_ttl() {
        let reg = RoomRegistry::default();
        let (_, room) = reg.create_room().await.unwrap();
        let (tx, _rx) = mpsc::channel(OUTBOX_CAPACITY);
        let id = ClientId::new_v4();
        room.join(id, tx, None).await.unwrap();
        room.leave(id);
        assert!(room.idle_for().await.unwrap().is_some());
        assert_eq!(reg.evict_idle(Duration::from_secs(3600)).await, 0);
        assert!(!reg.is_empty().await);
    }

    #[tokio::test]
    async fn fresh_room_survives_zero_ttl_sweep() {
        let reg = RoomRegistry::default();
        let (key, _) = reg.create_room().await.unwrap();
        assert_eq!(reg.evict_idle(Duration::ZERO).await, 0);
        assert!(reg.lookup(&key).await.is_ok());
    }
}
