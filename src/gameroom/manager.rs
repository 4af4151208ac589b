use super::room::Room;
use crate::settings::Settings;
use crate::storage::CacheStore;
use crate::storage::DurableStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

const SWEEP_EVERY: std::time::Duration = std::time::Duration::from_secs(60);

/// Process-wide registry of live rooms, keyed by room id. Rooms are
/// created lazily on first join; one live room object per id.
pub struct RoomManager {
    cache: CacheStore,
    durable: DurableStore,
    settings: Arc<Settings>,
    rooms: Mutex<HashMap<String, Arc<Room>>>,
}

impl RoomManager {
    pub fn new(cache: CacheStore, durable: DurableStore, settings: Arc<Settings>) -> Self {
        Self {
            cache,
            durable,
            settings,
            rooms: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Read-or-insert under the registry mutex; `start()` runs after
    /// release and is idempotent.
    pub async fn get_or_create(&self, room_id: &str) -> Arc<Room> {
        let room = {
            let mut rooms = self.rooms.lock().await;
            rooms
                .entry(room_id.to_owned())
                .or_insert_with(|| {
                    log::info!("opening room {}", room_id);
                    Arc::new(Room::new(
                        room_id,
                        self.cache.clone(),
                        self.durable.clone(),
                        self.settings.clone(),
                    ))
                })
                .clone()
        };
        room.start().await;
        room
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// Periodically closes rooms that have sat empty past the configured
    /// idle window, so the registry does not grow with every room id ever
    /// joined. The tick task is cancelled before the room is dropped.
    pub async fn sweep_idle(self: Arc<Self>) {
        let idle_ms = self.settings.room_reap_idle_secs as i64 * 1000;
        if idle_ms == 0 {
            return;
        }
        loop {
            tokio::time::sleep(SWEEP_EVERY).await;
            let candidates = {
                let rooms = self.rooms.lock().await;
                rooms
                    .iter()
                    .map(|(id, room)| (id.clone(), room.clone()))
                    .collect::<Vec<_>>()
            };
            let now = crate::now_ms();
            for (room_id, room) in candidates {
                if now - room.last_occupied_ms() < idle_ms {
                    continue;
                }
                if room.player_count().await > 0 {
                    continue;
                }
                self.rooms.lock().await.remove(&room_id);
                room.close().await;
                log::info!("reaped idle room {}", room_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> RoomManager {
        RoomManager::new(
            CacheStore::disabled(),
            DurableStore::disabled(),
            Arc::new(Settings::default()),
        )
    }

    #[tokio::test]
    async fn get_or_create_is_lazy_and_unique() {
        let manager = manager();
        assert_eq!(manager.room_count().await, 0);
        let first = manager.get_or_create("public").await;
        let again = manager.get_or_create("public").await;
        let other = manager.get_or_create("attic").await;
        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(manager.room_count().await, 2);
        first.close().await;
        other.close().await;
    }

    #[tokio::test]
    async fn created_rooms_are_started() {
        let manager = manager();
        let room = manager.get_or_create("lobby").await;
        assert!(!room.is_closed());
        room.close().await;
        assert!(room.is_closed());
    }
}
