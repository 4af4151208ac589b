use crate::protocol::ChatMessage;
use crate::protocol::PersistedTree;
use crate::protocol::SnapshotPayload;
use redis::AsyncCommands;
use serde_json::Value;

const PLAYERS_TTL_SECS: i64 = 6 * 3600;
const SNAPSHOT_TTL_SECS: u64 = 3600;
const TREE_TTL_SECS: u64 = 24 * 3600;
const CHAT_TTL_SECS: i64 = 6 * 3600;
const CHAT_RING_CAP: isize = 50;

/// Optional hot store for the per-room player index, latest snapshot,
/// chat ring, and tree state. Every operation is a no-op when the backend
/// is missing or broken; the room never depends on it.
#[derive(Clone)]
pub struct CacheStore {
    client: Option<redis::Client>,
}

impl CacheStore {
    pub fn disabled() -> Self {
        Self { client: None }
    }

    /// Pings once up front; an unreachable backend downgrades to the
    /// disabled store rather than failing startup.
    pub async fn connect(url: Option<&str>) -> Self {
        let Some(url) = url else {
            log::info!("cache disabled (no REDIS_URL)");
            return Self::disabled();
        };
        let client = match redis::Client::open(url) {
            Ok(client) => client,
            Err(e) => {
                log::warn!("invalid REDIS_URL, cache disabled: {}", e);
                return Self::disabled();
            }
        };
        match client.get_multiplexed_async_connection().await {
            Ok(mut conn) => match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
                Ok(_) => {
                    log::info!("cache connected");
                    Self { client: Some(client) }
                }
                Err(e) => {
                    log::warn!("cache ping failed, cache disabled: {}", e);
                    Self::disabled()
                }
            },
            Err(e) => {
                log::warn!("cache unreachable, cache disabled: {}", e);
                Self::disabled()
            }
        }
    }

    async fn conn(&self) -> Option<redis::aio::MultiplexedConnection> {
        let client = self.client.as_ref()?;
        client
            .get_multiplexed_async_connection()
            .await
            .inspect_err(|e| log::debug!("cache connection failed: {}", e))
            .ok()
    }

    pub async fn upsert_player(&self, room_id: &str, player_id: &str, name: &str) {
        let Some(mut conn) = self.conn().await else { return };
        let key = format!("room:{}:players", room_id);
        if let Err(e) = conn.hset::<_, _, _, ()>(&key, player_id, name).await {
            log::debug!("cache upsert_player failed: {}", e);
            return;
        }
        let _ = conn.expire::<_, ()>(&key, PLAYERS_TTL_SECS).await;
    }

    pub async fn remove_player(&self, room_id: &str, player_id: &str) {
        let Some(mut conn) = self.conn().await else { return };
        let key = format!("room:{}:players", room_id);
        if let Err(e) = conn.hdel::<_, _, ()>(&key, player_id).await {
            log::debug!("cache remove_player failed: {}", e);
        }
    }

    pub async fn update_room_snapshot(&self, room_id: &str, payload: &SnapshotPayload) {
        let Some(mut conn) = self.conn().await else { return };
        let Ok(blob) = serde_json::to_string(payload) else { return };
        let key = format!("room:{}:snapshot", room_id);
        if let Err(e) = conn.set_ex::<_, _, ()>(&key, blob, SNAPSHOT_TTL_SECS).await {
            log::debug!("cache update_room_snapshot failed: {}", e);
        }
    }

    pub async fn set_tree_state(&self, room_id: &str, tree: &PersistedTree) {
        let Some(mut conn) = self.conn().await else { return };
        let Ok(blob) = serde_json::to_string(tree) else { return };
        let key = format!("room:{}:tree", room_id);
        if let Err(e) = conn.set_ex::<_, _, ()>(&key, blob, TREE_TTL_SECS).await {
            log::debug!("cache set_tree_state failed: {}", e);
        }
    }

    pub async fn get_tree_state(&self, room_id: &str) -> Option<Value> {
        let mut conn = self.conn().await?;
        let key = format!("room:{}:tree", room_id);
        let raw = conn
            .get::<_, Option<String>>(&key)
            .await
            .inspect_err(|e| log::debug!("cache get_tree_state failed: {}", e))
            .ok()??;
        serde_json::from_str::<Value>(&raw)
            .ok()
            .filter(|value| value.is_object())
    }

    /// Newest at the head, trimmed to the ring capacity.
    pub async fn push_chat_message(&self, room_id: &str, msg: &ChatMessage) {
        let Some(mut conn) = self.conn().await else { return };
        let Ok(blob) = serde_json::to_string(msg) else { return };
        let key = format!("room:{}:chat", room_id);
        if let Err(e) = conn.lpush::<_, _, ()>(&key, blob).await {
            log::debug!("cache push_chat_message failed: {}", e);
            return;
        }
        let _ = conn.ltrim::<_, ()>(&key, 0, CHAT_RING_CAP - 1).await;
        let _ = conn.expire::<_, ()>(&key, CHAT_TTL_SECS).await;
    }

    pub async fn delete_chat_history(&self, room_id: &str) {
        let Some(mut conn) = self.conn().await else { return };
        let key = format!("room:{}:chat", room_id);
        if let Err(e) = conn.del::<_, ()>(&key).await {
            log::debug!("cache delete_chat_history failed: {}", e);
        }
    }

    /// Ring in oldest-first order; unparseable entries are dropped.
    pub async fn get_chat_history(&self, room_id: &str) -> Vec<ChatMessage> {
        let Some(mut conn) = self.conn().await else {
            return Vec::new();
        };
        let key = format!("room:{}:chat", room_id);
        let raw = match conn.lrange::<_, Vec<String>>(&key, 0, CHAT_RING_CAP - 1).await {
            Ok(raw) => raw,
            Err(e) => {
                log::debug!("cache get_chat_history failed: {}", e);
                return Vec::new();
            }
        };
        raw.into_iter()
            .rev()
            .filter_map(|item| serde_json::from_str(&item).ok())
            .collect()
    }
}
