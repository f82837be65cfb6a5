use serde_json::Value;

use crate::{
    error::{Error, Result},
    types::{ItemType, PlaylistTableRow, RecentTableRow},
};

/// How a caller referred to a catalog item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemReference {
    /// Extracted from a `spotify:` URI or an API / web URL.
    Id(String),
    /// Free text. May be a bare id or a name to search for.
    Text(String),
}

/// Spotify ids are 22 characters of base62.
pub fn looks_like_spotify_id(candidate: &str) -> bool {
    candidate.len() == 22 && candidate.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Splits `reference` into an id or leaves it as free text.
///
/// Accepted forms for a track (other types alike):
/// - `spotify:track:<id>`
/// - `https://api.spotify.com/v1/tracks/<id>`
/// - `https://open.spotify.com/track/<id>`, optionally with a query string
/// - anything else is returned as [`ItemReference::Text`]
pub fn parse_item_reference(reference: &str, item_type: ItemType) -> Result<ItemReference> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(Error::Validation(format!("empty {item_type} reference")));
    }

    let uri_prefix = format!("spotify:{item_type}:");
    let api_prefix = format!("https://api.spotify.com/v1/{}/", item_type.collection());
    let web_prefix = format!("https://open.spotify.com/{item_type}/");

    for prefix in [&uri_prefix, &api_prefix, &web_prefix] {
        if let Some(rest) = reference.strip_prefix(prefix.as_str()) {
            let id = rest
                .split(['?', '#', '/'])
                .next()
                .unwrap_or_default();
            if id.is_empty() {
                return Err(Error::Validation(format!(
                    "no {item_type} id in '{reference}'"
                )));
            }
            return Ok(ItemReference::Id(id.to_string()));
        }
    }

    Ok(ItemReference::Text(reference.to_string()))
}

/// Id part of a `spotify:<type>:<id>` URI.
pub fn id_from_uri(uri: &str) -> Option<&str> {
    uri.rsplit(':').next().filter(|id| !id.is_empty())
}

/// `m:ss` for a millisecond duration.
pub fn format_duration_ms(ms: i64) -> String {
    let total_secs = ms.max(0) / 1000;
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

/// Comma separated artist names of a track object. Accepts both key styles.
pub fn artist_names(track: &Value) -> String {
    track
        .get("artists")
        .and_then(Value::as_array)
        .map(|artists| {
            artists
                .iter()
                .filter_map(|artist| artist.get("name").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

pub fn playlist_table_rows(items: &[Value]) -> Vec<PlaylistTableRow> {
    items
        .iter()
        .map(|playlist| {
            let tracks = playlist
                .get("tracks")
                .and_then(|tracks| tracks.get("total"))
                .and_then(Value::as_u64)
                .map(|total| total.to_string())
                .unwrap_or_else(|| "-".to_string());

            PlaylistTableRow {
                name: str_field(playlist, "name").to_string(),
                tracks,
                public: match playlist.get("public").and_then(Value::as_bool) {
                    Some(true) => "yes".to_string(),
                    Some(false) => "no".to_string(),
                    None => "-".to_string(),
                },
                uri: str_field(playlist, "uri").to_string(),
            }
        })
        .collect()
}

/// Rows for recently played items, newest first.
pub fn recent_table_rows(items: &[Value]) -> Vec<RecentTableRow> {
    let mut rows: Vec<RecentTableRow> = items
        .iter()
        .map(|entry| {
            let played_at = entry
                .get("played_at")
                .or_else(|| entry.get("playedAt"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let track = entry.get("track").unwrap_or(&Value::Null);

            RecentTableRow {
                played_at,
                track: str_field(track, "name").to_string(),
                artists: artist_names(track),
            }
        })
        .collect();

    // ISO 8601 timestamps sort lexically.
    rows.sort_by(|a, b| b.played_at.cmp(&a.played_at));
    rows
}
