//! On-disk representation of the store.

use crate::error::{StoreError, StoreResult};
use crate::models::StoreData;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Result of looking at the store file.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(StoreData),
    /// The file exists but does not parse. `raw` is what was on disk.
    Corrupt { raw: Vec<u8>, reason: String },
    Missing,
}

pub async fn load(path: &Path) -> StoreResult<LoadOutcome> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(LoadOutcome::Missing),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    match serde_json::from_slice::<StoreData>(&raw) {
        Ok(data) => Ok(LoadOutcome::Loaded(data)),
        Err(e) => Ok(LoadOutcome::Corrupt {
            raw,
            reason: e.to_string(),
        }),
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "store.json".into());
    name.push(suffix);
    path.with_file_name(name)
}

async fn ensure_parent(path: &Path) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }
    }
    Ok(())
}

/// Write the whole document to a temporary sibling, then rename it over the
/// store so readers never see a half-written file.
pub async fn save(path: &Path, data: &StoreData) -> StoreResult<()> {
    ensure_parent(path).await?;

    let body = serde_json::to_vec_pretty(data)?;
    // Unique per save so two processes sharing a data dir never share a temp file.
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp = sibling(path, &format!(".tmp-{}-{}", std::process::id(), seq));

    tokio::fs::write(&tmp, &body)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::io(path, e))?;

    debug!("Store written to {} ({} bytes)", path.display(), body.len());
    Ok(())
}

/// Copy unparseable bytes next to the store before they get replaced.
pub async fn backup_corrupt(path: &Path, raw: &[u8]) -> StoreResult<PathBuf> {
    let stamp = chrono::Utc::now().timestamp_millis();
    let target = sibling(path, &format!(".corrupt-{}", stamp));

    ensure_parent(&target).await?;
    tokio::fs::write(&target, raw)
        .await
        .map_err(|e| StoreError::io(&target, e))?;

    Ok(target)
}
