pub const DEFAULT_NAME: &str = "游客";
pub const DEFAULT_ROOM: &str = "public";

const MAX_NAME_CHARS: usize = 16;
const MAX_ROOM_CHARS: usize = 32;

/// Display names: trimmed, 1..=16 chars, guest fallback.
pub fn sanitize_name(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        None | Some("") => String::from(DEFAULT_NAME),
        Some(name) => name.chars().take(MAX_NAME_CHARS).collect(),
    }
}

/// Room ids: trimmed, truncated to 32 chars, reduced to `[A-Za-z0-9_-]`,
/// "public" fallback.
pub fn sanitize_room_id(raw: Option<&str>) -> String {
    let id = raw
        .map(str::trim)
        .unwrap_or_default()
        .chars()
        .take(MAX_ROOM_CHARS)
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect::<String>();
    if id.is_empty() {
        String::from(DEFAULT_ROOM)
    } else {
        id
    }
}
