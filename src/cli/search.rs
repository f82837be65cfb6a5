use serde_json::Value;

use crate::{config::Config, success, types::ItemType, utils};

/// Resolves `reference` (URI, URL, id or name) to an item and prints it.
pub async fn search(config: &Config, reference: &str, item_type: ItemType, json: bool) {
    let client = super::connect(config).await;

    let pb = super::spinner(&format!("Looking up {item_type}..."));
    let result = client.get_item(reference, item_type).await;
    pb.finish_and_clear();

    let item = match result {
        Ok(item) => item,
        Err(e) => super::fail("Lookup failed", e),
    };

    if json {
        match serde_json::to_string_pretty(&item) {
            Ok(pretty) => println!("{pretty}"),
            Err(e) => crate::error!("Cannot format item. Err: {}", e),
        }
        return;
    }

    let name = item.get("name").and_then(Value::as_str).unwrap_or_default();
    let uri = item.get("uri").and_then(Value::as_str).unwrap_or_default();
    let artists = utils::artist_names(&item);

    if artists.is_empty() {
        success!("{} {}", name, uri);
    } else {
        success!("{} by {} {}", name, artists, uri);
    }
}
