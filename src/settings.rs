/// Frozen settings bag, read once from the environment at startup.
/// Every key is optional; missing or unparseable values fall back to the
/// defaults below. Rooms hold a shared handle and never observe changes.
#[derive(Debug, Clone)]
pub struct Settings {
    pub app_name: String,
    pub bind_addr: String,
    pub cors_allow_origins: Vec<String>,
    pub ws_path: String,
    pub max_players_per_room: usize,
    pub server_tick_hz: u32,
    pub snapshot_hz: u32,
    pub input_rate_limit_hz: u32,
    pub player_max_speed: f64,
    pub player_max_accel: f64,
    pub world_min_x: f64,
    pub world_max_x: f64,
    pub world_min_z: f64,
    pub world_max_z: f64,
    pub tree_center_x: f64,
    pub tree_center_z: f64,
    pub tree_interact_radius: f64,
    pub tree_max_decorations: usize,
    pub admin_password: String,
    pub room_reap_idle_secs: u64,
    pub redis_url: Option<String>,
    pub db_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: String::from("garland"),
            bind_addr: String::from("0.0.0.0:8080"),
            cors_allow_origins: vec![String::from("*")],
            ws_path: String::from("/ws"),
            max_players_per_room: 12,
            server_tick_hz: 20,
            snapshot_hz: 15,
            input_rate_limit_hz: 30,
            player_max_speed: 3.5,
            player_max_accel: 25.0,
            world_min_x: -14.0,
            world_max_x: 14.0,
            world_min_z: -14.0,
            world_max_z: 14.0,
            tree_center_x: 0.0,
            tree_center_z: 0.0,
            tree_interact_radius: 5.0,
            tree_max_decorations: 300,
            admin_password: String::from("20251225"),
            room_reap_idle_secs: 600,
            redis_url: None,
            db_url: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            app_name: var("APP_NAME").unwrap_or(defaults.app_name),
            bind_addr: var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            cors_allow_origins: var("CORS_ALLOW_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect::<Vec<_>>()
                })
                .filter(|origins| !origins.is_empty())
                .unwrap_or(defaults.cors_allow_origins),
            ws_path: var("WS_PATH").unwrap_or(defaults.ws_path),
            max_players_per_room: parse("MAX_PLAYERS_PER_ROOM", defaults.max_players_per_room),
            server_tick_hz: parse("SERVER_TICK_HZ", defaults.server_tick_hz),
            snapshot_hz: parse("SNAPSHOT_HZ", defaults.snapshot_hz),
            input_rate_limit_hz: parse("INPUT_RATE_LIMIT_HZ", defaults.input_rate_limit_hz),
            player_max_speed: parse("PLAYER_MAX_SPEED", defaults.player_max_speed),
            player_max_accel: parse("PLAYER_MAX_ACCEL", defaults.player_max_accel),
            world_min_x: parse("WORLD_MIN_X", defaults.world_min_x),
            world_max_x: parse("WORLD_MAX_X", defaults.world_max_x),
            world_min_z: parse("WORLD_MIN_Z", defaults.world_min_z),
            world_max_z: parse("WORLD_MAX_Z", defaults.world_max_z),
            tree_center_x: parse("TREE_CENTER_X", defaults.tree_center_x),
            tree_center_z: parse("TREE_CENTER_Z", defaults.tree_center_z),
            tree_interact_radius: parse("TREE_INTERACT_RADIUS", defaults.tree_interact_radius),
            tree_max_decorations: parse("TREE_MAX_DECORATIONS", defaults.tree_max_decorations),
            admin_password: var("ADMIN_PASSWORD").unwrap_or(defaults.admin_password),
            room_reap_idle_secs: parse("ROOM_REAP_IDLE_SECS", defaults.room_reap_idle_secs),
            redis_url: var("REDIS_URL"),
            db_url: var("DB_URL"),
        }
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    var(name)
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
