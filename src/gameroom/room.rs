use super::connection::PlayerConn;
use crate::protocol::ChatMessage;
use crate::protocol::PersistedTree;
use crate::protocol::PlayerView;
use crate::protocol::SnapshotPayload;
use crate::protocol::TreeView;
use crate::protocol::envelope;
use crate::protocol::sanitize_name;
use crate::protocol::MoveInput;
use crate::protocol::PlaceInput;
use crate::settings::Settings;
use crate::sim::Decoration;
use crate::sim::DecorationKind;
use crate::sim::MoveConstraints;
use crate::sim::PlayerRuntime;
use crate::sim::clamp;
use crate::sim::clamp_height;
use crate::sim::normalize_axis;
use crate::sim::wrap_angle;
use crate::storage::CacheStore;
use crate::storage::DurableStore;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

const PHASE_PLAY: &str = "PLAY";
const MAX_CHAT_CHARS: usize = 120;
const SPAWN_SPACING: f64 = 1.2;
const SPAWN_Z: f64 = 8.0;

/// Mutable room state. One mutex guards all of it: every mutation and
/// every multi-field read (snapshot assembly, broadcast target listing)
/// goes through the lock. Store I/O happens after release.
#[derive(Debug, Default)]
struct RoomState {
    players: HashMap<String, PlayerConn>,
    decorations: HashMap<String, Decoration>,
}

/// Authoritative runtime for one isolated world.
///
/// Owns the players and decorations, runs the fixed-rate tick task,
/// enforces movement constraints and input rate limits, coalesces
/// snapshots at the snapshot cadence, and coordinates the in-memory hot
/// path with the cache and the durable store. Both stores are optional
/// collaborators; the room keeps running from memory if either is gone.
pub struct Room {
    room_id: String,
    phase: &'static str,
    created_ms: i64,
    settings: Arc<Settings>,
    cache: CacheStore,
    durable: DurableStore,
    state: Mutex<RoomState>,
    tick_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    last_occupied_ms: AtomicI64,
}

impl Room {
    pub fn new(
        room_id: &str,
        cache: CacheStore,
        durable: DurableStore,
        settings: Arc<Settings>,
    ) -> Self {
        let created_ms = crate::now_ms();
        Self {
            room_id: room_id.to_owned(),
            phase: PHASE_PLAY,
            created_ms,
            settings,
            cache,
            durable,
            state: Mutex::new(RoomState::default()),
            tick_task: Mutex::new(None),
            closed: AtomicBool::new(false),
            last_occupied_ms: AtomicI64::new(created_ms),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn phase(&self) -> &'static str {
        self.phase
    }

    pub fn created_ms(&self) -> i64 {
        self.created_ms
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    pub(crate) fn last_occupied_ms(&self) -> i64 {
        self.last_occupied_ms.load(Ordering::Relaxed)
    }

    pub async fn player_count(&self) -> usize {
        self.state.lock().await.players.len()
    }

    /// Idempotent: the first call hydrates decorations (cache, then
    /// durable store) and launches the tick task; later calls return.
    pub async fn start(self: &Arc<Self>) {
        let mut slot = self.tick_task.lock().await;
        if slot.is_some() {
            return;
        }
        self.hydrate().await;
        let room = Arc::clone(self);
        *slot = Some(tokio::spawn(async move { room.run_ticks().await }));
        log::info!("started room {}", self.room_id);
    }

    /// Cancels the tick task and drains the player map. Dropping the
    /// connection senders ends each session task, which closes its socket.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        if let Some(task) = self.tick_task.lock().await.take() {
            task.abort();
        }
        let dropped = {
            let mut state = self.state.lock().await;
            state.players.drain().count()
        };
        log::info!("closed room {} ({} connections dropped)", self.room_id, dropped);
    }

    async fn hydrate(&self) {
        let value = match self.cache.get_tree_state(&self.room_id).await {
            Some(value) => Some(value),
            None => self.durable.get_room_state(&self.room_id).await,
        };
        let Some(value) = value else { return };
        let mut state = self.state.lock().await;
        Self::hydrate_decorations(&mut state.decorations, &value);
        log::info!(
            "hydrated room {} with {} decorations",
            self.room_id,
            state.decorations.len()
        );
    }

    /// Accepts only entries with a non-empty id, a known kind, and numeric
    /// angle/height/placed_ms; silently drops the rest. Angle and height
    /// are coerced back into their invariant ranges, so stale rows cannot
    /// smuggle out-of-band values into a live room.
    fn hydrate_decorations(decorations: &mut HashMap<String, Decoration>, value: &Value) {
        let Some(entries) = value.get("decorations").and_then(Value::as_array) else {
            return;
        };
        for entry in entries {
            let Some(id) = entry
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
            else {
                continue;
            };
            let Some(kind) = entry
                .get("type")
                .and_then(Value::as_str)
                .and_then(|s| DecorationKind::try_from(s).ok())
            else {
                continue;
            };
            let Some(angle) = number_or(entry.get("angle"), 0.0) else {
                continue;
            };
            let Some(height) = number_or(entry.get("height"), 0.2) else {
                continue;
            };
            let Some(placed_ms) = number_or(entry.get("placed_ms"), 0.0) else {
                continue;
            };
            let placed_by = entry
                .get("placed_by")
                .and_then(Value::as_str)
                .unwrap_or_default();
            decorations.insert(
                id.to_owned(),
                Decoration {
                    deco_id: id.to_owned(),
                    deco_type: kind,
                    angle: wrap_angle(angle),
                    height: clamp_height(height),
                    placed_by: placed_by.to_owned(),
                    placed_ms: placed_ms as i64,
                },
            );
        }
    }

    /// Fails with `room_full` at capacity and `room_closed` after close.
    /// New players spawn along a line south of the tree, one spacing apart.
    pub async fn add_player(
        &self,
        tx: UnboundedSender<String>,
        name: &str,
        ip: &str,
    ) -> anyhow::Result<String> {
        let now = crate::now_ms();
        let player_id = {
            let mut state = self.state.lock().await;
            if self.is_closed() {
                anyhow::bail!("room_closed");
            }
            if state.players.len() >= self.settings.max_players_per_room {
                anyhow::bail!("room_full");
            }
            let player_id = crate::hex_id();
            let mut runtime = PlayerRuntime::new(player_id.clone(), name, ip);
            runtime.kin.x = clamp(
                (state.players.len() as f64 - 2.0) * SPAWN_SPACING,
                self.settings.world_min_x,
                self.settings.world_max_x,
            );
            runtime.kin.z = clamp(SPAWN_Z, self.settings.world_min_z, self.settings.world_max_z);
            let conn = PlayerConn::new(tx, runtime, self.settings.input_rate_limit_hz, now);
            state.players.insert(player_id.clone(), conn);
            player_id
        };
        self.last_occupied_ms.store(now, Ordering::Relaxed);
        self.cache.upsert_player(&self.room_id, &player_id, name).await;
        Ok(player_id)
    }

    pub async fn remove_player(&self, player_id: &str) {
        {
            let mut state = self.state.lock().await;
            state.players.remove(player_id);
        }
        self.cache.remove_player(&self.room_id, player_id).await;
    }

    /// Unknown players are silently ignored. The name is re-sanitized here
    /// so no caller can bypass the boundary rules.
    pub async fn set_name(&self, player_id: &str, name: &str) {
        let name = sanitize_name(Some(name));
        {
            let mut state = self.state.lock().await;
            let Some(conn) = state.players.get_mut(player_id) else {
                return;
            };
            conn.runtime.name = name.clone();
        }
        self.cache.upsert_player(&self.room_id, player_id, &name).await;
    }

    /// `None` means the client sent something that was not a boolean.
    pub async fn set_cosmetic(&self, player_id: &str, hat: Option<bool>) {
        let Some(hat) = hat else { return };
        let mut state = self.state.lock().await;
        if let Some(conn) = state.players.get_mut(player_id) {
            conn.runtime.cosmetic.hat = hat;
        }
    }

    pub async fn submit_move_input(&self, player_id: &str, input: &MoveInput) {
        self.submit_move_input_at(player_id, input, crate::now_ms()).await
    }

    /// Rate-denied inputs only set the `rate_limited` flag; stale or
    /// duplicate sequence numbers are dropped without any state change.
    async fn submit_move_input_at(&self, player_id: &str, input: &MoveInput, now_ms: i64) {
        let mut state = self.state.lock().await;
        let Some(conn) = state.players.get_mut(player_id) else {
            return;
        };
        if !conn.bucket.allow(now_ms) {
            conn.runtime.cheat_flags.rate_limited = true;
            return;
        }
        if input.seq <= conn.runtime.last_input_seq {
            return;
        }
        conn.runtime.last_input_seq = input.seq;
        conn.runtime.last_input_client_time_ms = input.client_time_ms;
        conn.runtime.last_axis = normalize_axis(input.ax, input.az);
    }

    /// Placement is gated on a known kind, planar distance to the tree,
    /// and the decoration cap. The slot is coerced first: angle wrapped to
    /// [0, 2π), height clamped to the decorated band.
    pub async fn place_decoration(&self, player_id: &str, input: &PlaceInput) {
        let Ok(kind) = DecorationKind::try_from(input.kind.as_str()) else {
            return;
        };
        let angle = wrap_angle(input.slot.angle.unwrap_or(0.0));
        let height = clamp_height(input.slot.height.unwrap_or(0.5));
        let now = crate::now_ms();
        let (deco, tree) = {
            let mut state = self.state.lock().await;
            let Some(conn) = state.players.get(player_id) else {
                return;
            };
            let dx = conn.runtime.kin.x - self.settings.tree_center_x;
            let dz = conn.runtime.kin.z - self.settings.tree_center_z;
            if (dx * dx + dz * dz).sqrt() > self.settings.tree_interact_radius {
                return;
            }
            if state.decorations.len() >= self.settings.tree_max_decorations {
                return;
            }
            let deco = Decoration {
                deco_id: crate::hex_id(),
                deco_type: kind,
                angle,
                height,
                placed_by: player_id.to_owned(),
                placed_ms: now,
            };
            state.decorations.insert(deco.deco_id.clone(), deco.clone());
            if let Some(conn) = state.players.get_mut(player_id) {
                conn.runtime.placed_count += 1;
            }
            (deco, Self::tree_of(&self.room_id, &state))
        };
        self.broadcast(&envelope("tree.placed", &deco)).await;
        self.cache.set_tree_state(&self.room_id, &tree).await;
        self.durable.upsert_room_state(&self.room_id, &tree, now).await;
    }

    /// Empty-after-trim messages are dropped; the rest are truncated to
    /// 120 chars, pushed onto the cache ring, broadcast, and appended to
    /// the durable log with the sender's address.
    pub async fn send_chat(&self, player_id: &str, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let text: String = text.chars().take(MAX_CHAT_CHARS).collect();
        let now = crate::now_ms();
        let (msg, player_ip) = {
            let state = self.state.lock().await;
            let Some(conn) = state.players.get(player_id) else {
                return;
            };
            let msg = ChatMessage {
                id: crate::hex_id(),
                room_id: self.room_id.clone(),
                player_id: conn.runtime.player_id.clone(),
                name: conn.runtime.name.clone(),
                text,
                server_time_ms: now,
            };
            (msg, conn.runtime.ip.clone())
        };
        self.cache.push_chat_message(&self.room_id, &msg).await;
        self.broadcast(&envelope("chat.message", &msg)).await;
        self.durable.insert_chat_message(&msg, &player_ip).await;
    }

    /// Authorization happens at the connection boundary; this trusts its
    /// caller.
    pub async fn clear_chat(&self) {
        self.cache.delete_chat_history(&self.room_id).await;
        self.durable.delete_chat_history(&self.room_id).await;
        self.broadcast(&envelope("chat.cleared", &serde_json::json!({}))).await;
    }

    /// Cache ring in oldest-first order; empty when the cache is gone.
    pub async fn get_chat_history(&self) -> Vec<ChatMessage> {
        self.cache.get_chat_history(&self.room_id).await
    }

    async fn run_ticks(self: Arc<Self>) {
        let tick_dt = 1.0 / f64::from(self.settings.server_tick_hz.max(1));
        let snapshot_interval_ms = i64::from(1000 / self.settings.snapshot_hz.max(1));
        let constraints = MoveConstraints::from(&*self.settings);
        let mut last = tokio::time::Instant::now();
        while !self.is_closed() {
            let now = tokio::time::Instant::now();
            let elapsed = now.duration_since(last).as_secs_f64();
            if elapsed < tick_dt {
                tokio::time::sleep(std::time::Duration::from_secs_f64(tick_dt - elapsed)).await;
                continue;
            }
            last = now;
            self.tick(&constraints, tick_dt, snapshot_interval_ms).await;
        }
    }

    /// One simulation step: integrate every player toward their last input
    /// axis, apply constraints, then emit one coalesced snapshot to every
    /// connection whose snapshot interval has elapsed.
    async fn tick(&self, constraints: &MoveConstraints, dt: f64, snapshot_interval_ms: i64) {
        let now = crate::now_ms();
        let emitted = {
            let mut state = self.state.lock().await;
            for conn in state.players.values_mut() {
                integrate(&mut conn.runtime, constraints, dt);
            }
            if !state.players.is_empty() {
                self.last_occupied_ms.store(now, Ordering::Relaxed);
            }
            let due = state
                .players
                .values()
                .filter(|conn| now - conn.last_sent_snapshot_ms >= snapshot_interval_ms)
                .map(|conn| conn.runtime.player_id.clone())
                .collect::<Vec<_>>();
            if due.is_empty() {
                None
            } else {
                let payload = self.assemble_snapshot(&state, now);
                for id in &due {
                    if let Some(conn) = state.players.get_mut(id) {
                        conn.last_sent_snapshot_ms =
                            next_snapshot_mark(conn.last_sent_snapshot_ms, now, snapshot_interval_ms);
                    }
                }
                Some(payload)
            }
        };
        let Some(payload) = emitted else { return };
        self.cache.update_room_snapshot(&self.room_id, &payload).await;
        self.broadcast(&envelope("state.snapshot", &payload)).await;
    }

    fn assemble_snapshot(&self, state: &RoomState, now_ms: i64) -> SnapshotPayload {
        let players = state
            .players
            .values()
            .map(|conn| PlayerView {
                id: conn.runtime.player_id.clone(),
                name: conn.runtime.name.clone(),
                x: conn.runtime.kin.x,
                y: conn.runtime.kin.y,
                z: conn.runtime.kin.z,
                vx: conn.runtime.kin.vx,
                vz: conn.runtime.kin.vz,
                yaw: conn.runtime.kin.yaw,
                cosmetic: conn.runtime.cosmetic,
                placed_count: conn.runtime.placed_count,
            })
            .collect();
        let ack = state
            .players
            .values()
            .map(|conn| (conn.runtime.player_id.clone(), conn.runtime.last_input_seq))
            .collect();
        SnapshotPayload {
            server_time_ms: now_ms,
            room_id: self.room_id.clone(),
            phase: self.phase.to_owned(),
            players,
            ack,
            tree: TreeView {
                decorations: state.decorations.values().cloned().collect(),
            },
        }
    }

    fn tree_of(room_id: &str, state: &RoomState) -> PersistedTree {
        PersistedTree {
            room_id: room_id.to_owned(),
            decorations: state.decorations.values().cloned().collect(),
        }
    }

    /// Best-effort fan-out. The connection list is snapshotted under the
    /// lock; sends happen after release so a slow client cannot stall the
    /// simulation. Dead connections are removed afterwards.
    async fn broadcast(&self, message: &str) {
        let conns = {
            let state = self.state.lock().await;
            state
                .players
                .values()
                .map(|conn| (conn.runtime.player_id.clone(), conn.tx.clone()))
                .collect::<Vec<_>>()
        };
        let mut dead = Vec::new();
        for (player_id, tx) in conns {
            if tx.send(message.to_owned()).is_err() {
                dead.push(player_id);
            }
        }
        for player_id in dead {
            log::info!("dropping dead connection {} in room {}", player_id, self.room_id);
            self.remove_player(&player_id).await;
        }
    }
}

/// Accelerate toward the last input axis (per-axis, capped by max_accel),
/// integrate, then box the result with the movement constraints.
fn integrate(runtime: &mut PlayerRuntime, constraints: &MoveConstraints, dt: f64) {
    let (ax, az) = runtime.last_axis;
    let target_vx = ax * constraints.max_speed;
    let target_vz = az * constraints.max_speed;
    let dv = constraints.max_accel * dt;
    runtime.kin.vx += clamp(target_vx - runtime.kin.vx, -dv, dv);
    runtime.kin.vz += clamp(target_vz - runtime.kin.vz, -dv, dv);
    runtime.kin.x += runtime.kin.vx * dt;
    runtime.kin.z += runtime.kin.vz * dt;
    let corrected = constraints.apply(runtime.kin.x, runtime.kin.z, runtime.kin.vx, runtime.kin.vz);
    runtime.kin.x = corrected.x;
    runtime.kin.z = corrected.z;
    runtime.kin.vx = corrected.vx;
    runtime.kin.vz = corrected.vz;
    runtime.cheat_flags.absorb(corrected.flags);
}

/// Advance the per-connection snapshot mark by one interval to hold the
/// snapshot cadence on the coarser tick grid; re-anchor to now when the
/// connection has fallen more than one interval behind.
fn next_snapshot_mark(last_ms: i64, now_ms: i64, interval_ms: i64) -> i64 {
    if now_ms - last_ms > 2 * interval_ms {
        now_ms
    } else {
        last_ms + interval_ms
    }
}

fn number_or(value: Option<&Value>, default: f64) -> Option<f64> {
    match value {
        None => Some(default),
        Some(value) => value.as_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PlacementSlot;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::sync::mpsc::unbounded_channel;

    fn room_with(settings: Settings) -> Arc<Room> {
        Arc::new(Room::new(
            "north_pole",
            CacheStore::disabled(),
            DurableStore::disabled(),
            Arc::new(settings),
        ))
    }

    async fn join(room: &Room, name: &str) -> (String, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let player_id = room.add_player(tx, name, "127.0.0.1").await.expect("join");
        (player_id, rx)
    }

    async fn teleport(room: &Room, player_id: &str, x: f64, z: f64) {
        let mut state = room.state.lock().await;
        let conn = state.players.get_mut(player_id).expect("player");
        conn.runtime.kin.x = x;
        conn.runtime.kin.z = z;
    }

    fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<Value> {
        let mut messages = Vec::new();
        while let Ok(raw) = rx.try_recv() {
            messages.push(serde_json::from_str(&raw).expect("valid json"));
        }
        messages
    }

    fn move_input(seq: u64, ax: f64, az: f64) -> MoveInput {
        MoveInput {
            seq,
            ax,
            az,
            client_time_ms: seq as i64,
        }
    }

    fn place_input(kind: &str, angle: Option<f64>, height: Option<f64>) -> PlaceInput {
        PlaceInput {
            kind: kind.to_owned(),
            slot: PlacementSlot { angle, height },
        }
    }

    #[tokio::test]
    async fn rate_limit_denies_burst_beyond_bucket() {
        let room = room_with(Settings {
            input_rate_limit_hz: 2,
            ..Settings::default()
        });
        let (player_id, _rx) = join(&room, "dasher").await;
        for seq in 1..=5 {
            room.submit_move_input_at(&player_id, &move_input(seq, 1.0, 0.0), 1_000_000).await;
        }
        let state = room.state.lock().await;
        let runtime = &state.players.get(&player_id).expect("player").runtime;
        assert_eq!(runtime.last_input_seq, 2);
        assert!(runtime.cheat_flags.rate_limited);
    }

    #[tokio::test]
    async fn stale_and_duplicate_seqs_are_dropped() {
        let room = room_with(Settings::default());
        let (player_id, _rx) = join(&room, "dancer").await;
        room.submit_move_input_at(&player_id, &move_input(5, 1.0, 0.0), 0).await;
        room.submit_move_input_at(&player_id, &move_input(5, 0.0, 1.0), 1_000).await;
        room.submit_move_input_at(&player_id, &move_input(3, 0.0, 1.0), 2_000).await;
        let state = room.state.lock().await;
        let runtime = &state.players.get(&player_id).expect("player").runtime;
        assert_eq!(runtime.last_input_seq, 5);
        assert_eq!(runtime.last_axis, (1.0, 0.0));
    }

    #[tokio::test]
    async fn join_spawns_along_the_line() {
        let room = room_with(Settings::default());
        let (first, _rx1) = join(&room, "a").await;
        let (second, _rx2) = join(&room, "b").await;
        let state = room.state.lock().await;
        let kin1 = state.players.get(&first).expect("first").runtime.kin;
        let kin2 = state.players.get(&second).expect("second").runtime.kin;
        assert_eq!((kin1.x, kin1.z), (-2.4, 8.0));
        assert_eq!((kin2.x, kin2.z), (-1.2, 8.0));
    }

    #[tokio::test]
    async fn join_fails_at_capacity() {
        let room = room_with(Settings {
            max_players_per_room: 1,
            ..Settings::default()
        });
        let (_player_id, _rx) = join(&room, "first").await;
        let (tx, _rx2) = unbounded_channel();
        let err = room.add_player(tx, "second", "127.0.0.1").await.expect_err("full");
        assert_eq!(err.to_string(), "room_full");
    }

    #[tokio::test]
    async fn placement_outside_radius_is_rejected() {
        let room = room_with(Settings {
            tree_interact_radius: 7.5,
            ..Settings::default()
        });
        let (player_id, mut rx) = join(&room, "comet").await;
        teleport(&room, &player_id, 10.0, 0.0).await;
        room.place_decoration(&player_id, &place_input("bell", None, None)).await;
        assert!(room.state.lock().await.decorations.is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn placement_coerces_slot_and_broadcasts() {
        let room = room_with(Settings::default());
        let (player_id, mut rx) = join(&room, "cupid").await;
        teleport(&room, &player_id, 1.0, 1.0).await;
        room.place_decoration(&player_id, &place_input("bell", Some(7.0), Some(9.0))).await;
        {
            let state = room.state.lock().await;
            assert_eq!(state.decorations.len(), 1);
            let deco = state.decorations.values().next().expect("deco");
            assert!((deco.angle - (7.0 - std::f64::consts::TAU)).abs() < 1e-9);
            assert_eq!(deco.height, 1.28);
            assert_eq!(deco.placed_by, player_id);
            assert_eq!(state.players.get(&player_id).expect("player").runtime.placed_count, 1);
        }
        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["type"], "tree.placed");
        assert_eq!(messages[0]["payload"]["type"], "bell");
    }

    #[tokio::test]
    async fn placement_respects_decoration_cap() {
        let room = room_with(Settings {
            tree_max_decorations: 3,
            ..Settings::default()
        });
        let (player_id, _rx) = join(&room, "vixen").await;
        teleport(&room, &player_id, 0.0, 0.0).await;
        for _ in 0..5 {
            room.place_decoration(&player_id, &place_input("tinsel", None, None)).await;
        }
        assert_eq!(room.state.lock().await.decorations.len(), 3);
    }

    #[tokio::test]
    async fn unknown_decoration_kind_is_rejected() {
        let room = room_with(Settings::default());
        let (player_id, mut rx) = join(&room, "blitzen").await;
        teleport(&room, &player_id, 0.0, 0.0).await;
        room.place_decoration(&player_id, &place_input("star", None, None)).await;
        assert!(room.state.lock().await.decorations.is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn chat_truncates_and_drops_blank() {
        let room = room_with(Settings::default());
        let (player_id, mut rx) = join(&room, "prancer").await;
        room.send_chat(&player_id, &"x".repeat(200)).await;
        room.send_chat(&player_id, "   ").await;
        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["type"], "chat.message");
        let text = messages[0]["payload"]["text"].as_str().expect("text");
        assert_eq!(text.chars().count(), 120);
        assert_eq!(messages[0]["payload"]["name"], "prancer");
    }

    #[tokio::test]
    async fn clear_chat_broadcasts() {
        let room = room_with(Settings::default());
        let (player_id, mut rx) = join(&room, "donner").await;
        room.send_chat(&player_id, "merry").await;
        room.clear_chat().await;
        let kinds = drain(&mut rx)
            .into_iter()
            .map(|m| m["type"].as_str().expect("type").to_owned())
            .collect::<Vec<_>>();
        assert_eq!(kinds, vec!["chat.message", "chat.cleared"]);
    }

    #[tokio::test]
    async fn cosmetic_requires_boolean() {
        let room = room_with(Settings::default());
        let (player_id, _rx) = join(&room, "rudolph").await;
        room.set_cosmetic(&player_id, Some(true)).await;
        assert!(room.state.lock().await.players.get(&player_id).expect("player").runtime.cosmetic.hat);
        room.set_cosmetic(&player_id, None).await;
        assert!(room.state.lock().await.players.get(&player_id).expect("player").runtime.cosmetic.hat);
    }

    #[tokio::test]
    async fn set_name_sanitizes_at_the_room_boundary() {
        let room = room_with(Settings::default());
        let (player_id, _rx) = join(&room, "before").await;
        room.set_name(&player_id, "   ").await;
        assert_eq!(
            room.state.lock().await.players.get(&player_id).expect("player").runtime.name,
            crate::protocol::DEFAULT_NAME,
        );
    }

    #[tokio::test]
    async fn integration_keeps_players_inside_the_world() {
        let room = room_with(Settings::default());
        let (player_id, _rx) = join(&room, "runner").await;
        let constraints = MoveConstraints::from(&*room.settings);
        let dt = 0.05;
        for step in 0..200u64 {
            let (ax, az) = match step % 4 {
                0 => (1.0, 0.0),
                1 => (1.0, 1.0),
                2 => (0.0, -1.0),
                _ => (-1.0, 1.0),
            };
            room.submit_move_input_at(&player_id, &move_input(step + 1, ax, az), step as i64 * 50)
                .await;
            room.tick(&constraints, dt, i64::MAX).await;
        }
        let state = room.state.lock().await;
        let kin = state.players.get(&player_id).expect("player").runtime.kin;
        assert!((-14.0..=14.0).contains(&kin.x));
        assert!((-14.0..=14.0).contains(&kin.z));
        assert!(kin.vx.abs() <= 3.5 + 1e-9);
        assert!(kin.vz.abs() <= 3.5 + 1e-9);
    }

    #[tokio::test]
    async fn hydration_round_trips_placed_decorations() {
        let room = room_with(Settings::default());
        let (player_id, _rx) = join(&room, "builder").await;
        teleport(&room, &player_id, 0.0, 0.0).await;
        room.place_decoration(&player_id, &place_input("bell", Some(1.0), Some(0.5))).await;
        room.place_decoration(&player_id, &place_input("tinsel", Some(2.0), Some(1.0))).await;
        let tree = {
            let state = room.state.lock().await;
            Room::tree_of(room.room_id(), &state)
        };
        let value = serde_json::to_value(&tree).expect("serialize");
        let mut rebuilt = HashMap::new();
        Room::hydrate_decorations(&mut rebuilt, &value);
        let state = room.state.lock().await;
        assert_eq!(rebuilt.len(), state.decorations.len());
        for (id, deco) in &state.decorations {
            let back = rebuilt.get(id).expect("rehydrated");
            assert_eq!(back.deco_type, deco.deco_type);
            assert!((back.angle - deco.angle).abs() < 1e-9);
            assert!((back.height - deco.height).abs() < 1e-9);
            assert_eq!(back.placed_by, deco.placed_by);
            assert_eq!(back.placed_ms, deco.placed_ms);
        }
    }

    #[tokio::test]
    async fn hydration_drops_malformed_and_coerces_ranges() {
        let value = serde_json::json!({
            "decorations": [
                { "id": "", "type": "bell", "angle": 0.0, "height": 0.5, "placed_ms": 1 },
                { "id": "a", "type": "star", "angle": 0.0, "height": 0.5, "placed_ms": 1 },
                { "id": "b", "type": "bell", "angle": "wide", "height": 0.5, "placed_ms": 1 },
                { "id": "c", "type": "bell", "angle": 10.0, "height": 5.0, "placed_ms": 1 },
                { "id": "d", "type": "mini_hat" },
            ]
        });
        let mut decorations = HashMap::new();
        Room::hydrate_decorations(&mut decorations, &value);
        assert_eq!(decorations.len(), 2);
        let c = decorations.get("c").expect("kept");
        assert!((0.0..std::f64::consts::TAU).contains(&c.angle));
        assert_eq!(c.height, 1.28);
        let d = decorations.get("d").expect("kept");
        assert_eq!(d.angle, 0.0);
        assert_eq!(d.height, 0.2);
    }

    #[tokio::test]
    async fn start_is_idempotent_and_close_drains() {
        let room = room_with(Settings::default());
        room.start().await;
        room.start().await;
        assert!(room.tick_task.lock().await.is_some());
        let (_player_id, _rx) = join(&room, "guest").await;
        room.close().await;
        assert!(room.is_closed());
        assert_eq!(room.player_count().await, 0);
        let (tx, _rx2) = unbounded_channel();
        let err = room.add_player(tx, "late", "127.0.0.1").await.expect_err("closed");
        assert_eq!(err.to_string(), "room_closed");
    }

    #[tokio::test]
    async fn snapshots_hold_cadence_and_carry_acks() {
        let room = room_with(Settings::default());
        room.start().await;
        let (player_id, mut rx) = join(&room, "watcher").await;
        room.submit_move_input(&player_id, &move_input(1, 0.0, 0.0)).await;
        tokio::time::sleep(std::time::Duration::from_millis(1300)).await;
        room.close().await;
        let snapshots = drain(&mut rx)
            .into_iter()
            .filter(|m| m["type"] == "state.snapshot")
            .collect::<Vec<_>>();
        assert!(!snapshots.is_empty());
        let t0 = snapshots[0]["payload"]["server_time_ms"].as_i64().expect("ts");
        let in_window = snapshots
            .iter()
            .filter(|m| {
                let ts = m["payload"]["server_time_ms"].as_i64().expect("ts");
                (t0..t0 + 1000).contains(&ts)
            })
            .count();
        assert!(
            (14..=16).contains(&in_window),
            "{} snapshots in one second",
            in_window
        );
        let last = snapshots.last().expect("snapshot");
        assert_eq!(last["payload"]["ack"][&player_id], 1);
        assert_eq!(last["payload"]["phase"], "PLAY");
        assert_eq!(last["payload"]["room_id"], "north_pole");
    }

    #[test]
    fn snapshot_marks_hold_cadence_on_the_tick_grid() {
        let interval = 66;
        let mut mark = 0;
        let mut sends = 0;
        for tick in 0..=20 {
            let now = 1_000_000 + tick * 50;
            if now - mark >= interval {
                mark = next_snapshot_mark(mark, now, interval);
                sends += 1;
            }
        }
        // 21 ticks span one second; one send per interval plus the first
        assert_eq!(sends, 16);
    }
}
