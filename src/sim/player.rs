use super::motion::ClampFlags;
use serde::Serialize;

/// Kinematic state on the flat plane. `y` is scenery height and never
/// integrated.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlayerKinematic {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub vx: f64,
    pub vz: f64,
    pub yaw: f64,
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct PlayerCosmetic {
    pub hat: bool,
}

/// Anti-cheat telemetry: which corrections and denials have ever fired for
/// this player. Set-only; nothing downstream clears these.
#[derive(Debug, Default, Clone, Copy)]
pub struct CheatFlags {
    pub speed_clamped: bool,
    pub x_clamped: bool,
    pub z_clamped: bool,
    pub rate_limited: bool,
}

impl CheatFlags {
    pub fn absorb(&mut self, flags: ClampFlags) {
        self.speed_clamped |= flags.speed_clamped;
        self.x_clamped |= flags.x_clamped;
        self.z_clamped |= flags.z_clamped;
    }
}

/// Authoritative per-player record owned by the room.
#[derive(Debug)]
pub struct PlayerRuntime {
    pub player_id: String,
    pub name: String,
    pub ip: String,
    pub kin: PlayerKinematic,
    pub last_input_seq: u64,
    pub last_input_client_time_ms: i64,
    pub last_axis: (f64, f64),
    pub cheat_flags: CheatFlags,
    pub cosmetic: PlayerCosmetic,
    pub placed_count: u32,
}

impl PlayerRuntime {
    pub fn new(player_id: String, name: &str, ip: &str) -> Self {
        Self {
            player_id,
            name: name.to_owned(),
            ip: ip.to_owned(),
            kin: PlayerKinematic::default(),
            last_input_seq: 0,
            last_input_client_time_ms: 0,
            last_axis: (0.0, 0.0),
            cheat_flags: CheatFlags::default(),
            cosmetic: PlayerCosmetic::default(),
            placed_count: 0,
        }
    }
}
