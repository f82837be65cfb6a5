use serde_json::Value;

use crate::{config::Config, info, types::PlaybackSnapshot, utils};

/// Prints the profile of the authorized user and what is playing.
pub async fn me(config: &Config) {
    let client = super::connect(config).await;

    let profile = match client.user_data().await {
        Ok(profile) => profile,
        Err(e) => super::fail("Failed to fetch profile", e),
    };

    let field = |key: &str| {
        profile
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or("-")
            .to_string()
    };
    info!("User: {} ({})", field("displayName"), field("id"));
    info!("Country: {}, product: {}", field("country"), field("product"));

    match client.current_playback().await {
        Ok(Some(playback)) => match PlaybackSnapshot::from_payload(playback) {
            Some(snapshot) => info!(
                "Playing: {} [{}/{}]",
                snapshot.track_name.as_deref().unwrap_or("<unknown>"),
                utils::format_duration_ms(snapshot.progress_ms),
                utils::format_duration_ms(snapshot.duration_ms)
            ),
            None => info!("Nothing playing"),
        },
        Ok(None) => info!("No active device"),
        Err(e) => super::fail("Failed to fetch playback", e),
    }
}
