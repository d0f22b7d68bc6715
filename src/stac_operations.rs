use crate::error::Result;
use serde::Serialize;
use serde_json::{json, Value};
use stac::{Collection, Item};
use std::fs::{self, read_to_string};
use std::path::{Path, PathBuf};

pub fn read_item_from_file(path: &Path) -> Result<Item> {
    let content = read_to_string(path)?;
    let item: Item = serde_json::from_str(&content)?;
    Ok(item)
}

pub fn read_collection_from_file(path: &Path) -> Result<Collection> {
    let content = read_to_string(path)?;
    let collection: Collection = serde_json::from_str(&content)?;
    Ok(collection)
}

/// Write pretty-printed JSON to `path`, going through `<path>.partial` so an
/// interrupted write never leaves a truncated document behind.
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent_dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent_dir.exists() {
            fs::create_dir_all(parent_dir)?;
        }
    }

    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    let content = serde_json::to_string_pretty(value)?;
    if let Err(err) = fs::write(&partial, content) {
        let _ = fs::remove_file(&partial);
        return Err(err.into());
    }
    fs::rename(partial, path)?;
    Ok(())
}

/// Serialize `document` and add an absolute `self` link pointing at
/// `destination`, replacing any existing one.
pub fn add_self_link<T: Serialize>(document: &T, destination: &Path) -> Result<Value> {
    let mut value = serde_json::to_value(document)?;
    let href = std::path::absolute(destination)?;

    if let Some(links) = value.get_mut("links").and_then(Value::as_array_mut) {
        links.retain(|link| link.get("rel").and_then(Value::as_str) != Some("self"));
        links.push(json!({
            "rel": "self",
            "href": href.to_string_lossy(),
            "type": crate::media_type::JSON,
        }));
    }
    Ok(value)
}
