use tabled::Table;

use crate::{config::Config, info, success, types::NewPlaylist, utils, warning};

/// Prints the user's playlists, following pages when `all` is set.
pub async fn playlists(config: &Config, page: u32, limit: u32, all: bool) {
    let client = super::connect(config).await;

    let pb = super::spinner("Fetching playlists...");
    let mut current = match client.list_playlists(page, limit).await {
        Ok(page) => page,
        Err(e) => {
            pb.finish_and_clear();
            super::fail("Failed to fetch playlists", e);
        }
    };

    let mut items = Vec::new();
    while let Some(listing) = current {
        items.extend(listing.items.iter().cloned());
        if !all {
            break;
        }

        pb.set_message(format!("Fetched {} playlists...", items.len()));
        current = match client.next_playlists(&listing).await {
            Ok(next) => next,
            Err(e) => {
                warning!("Stopped paging: {}", e);
                None
            }
        };
    }
    pb.finish_and_clear();

    if items.is_empty() {
        info!("No playlists on page {}", page);
        return;
    }

    println!("{}", Table::new(utils::playlist_table_rows(&items)));
}

pub async fn create_playlist(
    config: &Config,
    name: &str,
    description: Option<String>,
    private: bool,
    collaborative: bool,
) {
    let client = super::connect(config).await;

    let mut playlist = NewPlaylist::new(name)
        .public(!private)
        .collaborative(collaborative);
    if let Some(description) = description {
        playlist = playlist.description(description);
    }

    match client.create_playlist(playlist).await {
        Ok(created) => success!(
            "Created playlist {} {}",
            name,
            created.get("uri").and_then(|uri| uri.as_str()).unwrap_or_default()
        ),
        Err(e) => super::fail("Failed to create playlist", e),
    }
}
