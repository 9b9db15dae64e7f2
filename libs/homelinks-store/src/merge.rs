//! Pure composition rules between the common set and a user overlay.
//!
//! Nothing in here touches the filesystem; `LinkStore` loads the document,
//! calls into these functions and persists the result.

use crate::error::{StoreError, StoreResult};
use crate::models::{LinkItem, Settings, SettingsOverlay};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Common items first, user items replacing in place on an id match,
/// user-only items appended in their own order.
pub fn merge_items(common: &[LinkItem], overlay: &[LinkItem]) -> Vec<LinkItem> {
    let mut merged: Vec<LinkItem> = Vec::with_capacity(common.len() + overlay.len());
    let mut index: HashMap<&str, usize> = HashMap::new();

    for item in common.iter().chain(overlay.iter()) {
        match index.get(item.id.as_str()) {
            Some(&pos) => merged[pos] = item.clone(),
            None => {
                index.insert(item.id.as_str(), merged.len());
                merged.push(item.clone());
            }
        }
    }

    merged
}

/// Decide which submitted items belong in a user's overlay.
///
/// Items unknown to the common set are private additions and always stay.
/// Items that match their common version field for field are dropped; they
/// come back from the common set at merge time.
pub fn reconcile_items(common: &[LinkItem], submitted: Vec<LinkItem>) -> Vec<LinkItem> {
    let by_id: HashMap<&str, &LinkItem> =
        common.iter().map(|item| (item.id.as_str(), item)).collect();

    submitted
        .into_iter()
        .filter(|item| match by_id.get(item.id.as_str()) {
            Some(base) => *base != item,
            None => true,
        })
        .collect()
}

/// Reject empty or repeated identifiers.
pub fn validate_items(items: &[LinkItem]) -> StoreResult<()> {
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if item.id.trim().is_empty() {
            return Err(StoreError::InvalidItems("item id must not be empty".into()));
        }
        if !seen.insert(item.id.as_str()) {
            return Err(StoreError::InvalidItems(format!(
                "duplicate item id '{}'",
                item.id
            )));
        }
    }
    Ok(())
}

fn settings_map(settings: &Settings) -> StoreResult<Map<String, Value>> {
    match serde_json::to_value(settings)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::InvalidSettings(
            "settings did not encode as an object".into(),
        )),
    }
}

fn settings_from_map(map: Map<String, Value>) -> StoreResult<Settings> {
    serde_json::from_value(Value::Object(map))
        .map_err(|e| StoreError::InvalidSettings(e.to_string()))
}

/// Lay `patch` over `base` key by key and re-validate the result.
pub fn merge_settings(base: &Settings, patch: &Map<String, Value>) -> StoreResult<Settings> {
    let mut map = settings_map(base)?;
    for (key, value) in patch {
        map.insert(key.clone(), value.clone());
    }
    settings_from_map(map)
}

/// Effective settings for a user.
///
/// Overrides that no longer fit their field are skipped, leaving the global
/// value in place.
pub fn apply_overlay(global: &Settings, overlay: &SettingsOverlay) -> Settings {
    let (settings, skipped) = global.overlay_lenient(&overlay.0);
    if !skipped.is_empty() {
        debug!("Skipping stored overrides that do not fit: {}", skipped.join(", "));
    }
    settings
}

/// Build the overlay to persist for a non-admin user.
///
/// The submission is laid over the existing overlay and the result is
/// normalized through `Settings`. Only keys that are real settings fields and
/// whose normalized value differs from the global one are kept, so `30.0`
/// against a global `30` is not an override.
pub fn diff_settings(
    global: &Settings,
    existing: &SettingsOverlay,
    submitted: &Map<String, Value>,
) -> StoreResult<SettingsOverlay> {
    merge_settings(global, submitted)?;

    let global_map = settings_map(global)?;
    let mut candidate = existing.0.clone();
    for (key, value) in submitted {
        candidate.insert(key.clone(), value.clone());
    }
    let effective = settings_map(&apply_overlay(global, &SettingsOverlay(candidate.clone())))?;

    let overlay = candidate
        .keys()
        .filter_map(|key| {
            let value = effective.get(key)?;
            (global_map.get(key) != Some(value)).then(|| (key.clone(), value.clone()))
        })
        .collect();

    Ok(SettingsOverlay(overlay))
}
