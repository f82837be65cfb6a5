use tabled::Table;

use crate::{config::Config, info, utils, warning};

/// Prints recently played tracks, `pages` pages deep.
pub async fn recent(config: &Config, pages: u32) {
    let client = super::connect(config).await;

    let pb = super::spinner("Fetching recently played tracks...");
    let mut page = match client.recently_played().await {
        Ok(page) => page,
        Err(e) => {
            pb.finish_and_clear();
            super::fail("Failed to fetch recently played tracks", e);
        }
    };

    let mut items = page.items.clone();
    for _ in 1..pages.max(1) {
        match client.recently_played_page(&page).await {
            Ok(Some(next)) => {
                items.extend(next.items.iter().cloned());
                page = next;
            }
            Ok(None) => break,
            Err(e) => {
                warning!("Stopped paging: {}", e);
                break;
            }
        }
    }
    pb.finish_and_clear();

    if items.is_empty() {
        info!("Nothing played recently");
        return;
    }

    println!("{}", Table::new(utils::recent_table_rows(&items)));
}
