use super::motion::clamp;
use serde::Deserialize;
use serde::Serialize;

pub const MIN_DECORATION_HEIGHT: f64 = 0.12;
pub const MAX_DECORATION_HEIGHT: f64 = 1.28;

/// Wrap an angle onto [0, 2π).
pub fn wrap_angle(angle: f64) -> f64 {
    angle.rem_euclid(std::f64::consts::TAU)
}

/// Clamp a height onto the decorated band of the tree.
pub fn clamp_height(height: f64) -> f64 {
    clamp(height, MIN_DECORATION_HEIGHT, MAX_DECORATION_HEIGHT)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecorationKind {
    Bell,
    MiniHat,
    Tinsel,
}

impl TryFrom<&str> for DecorationKind {
    type Error = ();
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "bell" => Ok(Self::Bell),
            "mini_hat" => Ok(Self::MiniHat),
            "tinsel" => Ok(Self::Tinsel),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for DecorationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bell => write!(f, "bell"),
            Self::MiniHat => write!(f, "mini_hat"),
            Self::Tinsel => write!(f, "tinsel"),
        }
    }
}

/// One ornament on the shared tree. Ids are server-minted; broadcast order
/// is the source of truth for ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decoration {
    #[serde(rename = "id")]
    pub deco_id: String,
    #[serde(rename = "type")]
    pub deco_type: DecorationKind,
    pub angle: f64,
    pub height: f64,
    pub placed_by: String,
    pub placed_ms: i64,
}
