use crate::protocol::ChatMessage;
use crate::protocol::PersistedTree;
use serde_json::Value;
use std::sync::Arc;
use tokio_postgres::Client;
use tokio_postgres::Config;
use tokio_postgres::NoTls;
use tokio_postgres::error::SqlState;

const CREATES: &str = "
    CREATE TABLE IF NOT EXISTS room_tree_state (
        id         BIGSERIAL PRIMARY KEY,
        room_id    VARCHAR(64) NOT NULL UNIQUE,
        json_blob  TEXT NOT NULL,
        updated_ms BIGINT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS chat_log (
        id          BIGSERIAL PRIMARY KEY,
        room_id     VARCHAR(64) NOT NULL,
        player_id   VARCHAR(64) NOT NULL,
        player_name VARCHAR(64) NOT NULL,
        player_ip   VARCHAR(64) NOT NULL,
        message     TEXT NOT NULL,
        created_ms  BIGINT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS chat_log_room_id_idx ON chat_log (room_id);
    CREATE INDEX IF NOT EXISTS chat_log_created_ms_idx ON chat_log (created_ms);
";

/// Optional durable store: tree state upserted by room, chat appended and
/// bulk-deleted by room. Schema problems are startup-fatal, except for a
/// missing database, which is created best-effort. Once connected, every
/// runtime failure is logged and swallowed so the simulation never stalls
/// on persistence.
#[derive(Clone)]
pub struct DurableStore {
    client: Option<Arc<Client>>,
}

impl DurableStore {
    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub async fn connect(url: Option<&str>) -> anyhow::Result<Self> {
        let Some(url) = url else {
            log::info!("durable store disabled (no DB_URL)");
            return Ok(Self::disabled());
        };
        let config: Config = url.parse()?;
        let client = match Self::open(&config).await {
            Ok(client) => client,
            Err(e) if e.code() == Some(&SqlState::INVALID_CATALOG_NAME) => {
                Self::create_database(&config).await?;
                Self::open(&config).await?
            }
            Err(e) => return Err(e.into()),
        };
        client.batch_execute(CREATES).await?;
        log::info!("durable store connected");
        Ok(Self {
            client: Some(Arc::new(client)),
        })
    }

    async fn open(config: &Config) -> Result<Client, tokio_postgres::Error> {
        let (client, connection) = config.connect(NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                log::warn!("durable store connection ended: {}", e);
            }
        });
        Ok(client)
    }

    async fn create_database(config: &Config) -> anyhow::Result<()> {
        let name = config
            .get_dbname()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| anyhow::anyhow!("DB_URL names no database"))?
            .to_owned();
        let mut admin = config.clone();
        admin.dbname("postgres");
        let client = Self::open(&admin).await?;
        client
            .batch_execute(&format!("CREATE DATABASE \"{}\"", name.replace('"', "")))
            .await?;
        log::info!("created database {}", name);
        Ok(())
    }

    pub async fn get_room_state(&self, room_id: &str) -> Option<Value> {
        let client = self.client.as_ref()?;
        let row = client
            .query_opt(
                "SELECT json_blob FROM room_tree_state WHERE room_id = $1",
                &[&room_id],
            )
            .await
            .inspect_err(|e| log::warn!("durable get_room_state failed: {}", e))
            .ok()??;
        let blob: String = row.get(0);
        serde_json::from_str::<Value>(&blob)
            .ok()
            .filter(|value| value.is_object())
    }

    pub async fn upsert_room_state(&self, room_id: &str, tree: &PersistedTree, updated_ms: i64) {
        let Some(client) = self.client.as_ref() else { return };
        let Ok(blob) = serde_json::to_string(tree) else { return };
        let _ = client
            .execute(
                "INSERT INTO room_tree_state (room_id, json_blob, updated_ms)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (room_id)
                 DO UPDATE SET json_blob = EXCLUDED.json_blob, updated_ms = EXCLUDED.updated_ms",
                &[&room_id, &blob, &updated_ms],
            )
            .await
            .inspect_err(|e| log::warn!("durable upsert_room_state failed: {}", e));
    }

    pub async fn insert_chat_message(&self, msg: &ChatMessage, player_ip: &str) {
        let Some(client) = self.client.as_ref() else { return };
        let _ = client
            .execute(
                "INSERT INTO chat_log (room_id, player_id, player_name, player_ip, message, created_ms)
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &msg.room_id,
                    &msg.player_id,
                    &msg.name,
                    &player_ip,
                    &msg.text,
                    &msg.server_time_ms,
                ],
            )
            .await
            .inspect_err(|e| log::warn!("durable insert_chat_message failed: {}", e));
    }

    pub async fn delete_chat_history(&self, room_id: &str) {
        let Some(client) = self.client.as_ref() else { return };
        let _ = client
            .execute("DELETE FROM chat_log WHERE room_id = $1", &[&room_id])
            .await
            .inspect_err(|e| log::warn!("durable delete_chat_history failed: {}", e));
    }
}
