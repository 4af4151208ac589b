use serde::Deserialize;
use serde_json::Value;

/// Every client message is `{ "type": <string>, "payload": <object> }`.
/// The payload stays raw here so unknown and malformed types can be
/// answered with a notice instead of dropping the connection.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
pub struct MoveInput {
    #[serde(default)]
    pub seq: u64,
    #[serde(default)]
    pub ax: f64,
    #[serde(default)]
    pub az: f64,
    #[serde(default)]
    pub client_time_ms: i64,
}

#[derive(Debug, Deserialize)]
pub struct PlaceInput {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub slot: PlacementSlot,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlacementSlot {
    pub angle: Option<f64>,
    pub height: Option<f64>,
}
