use crate::error::StoreResult;
use crate::file::{self, LoadOutcome};
use crate::lock::WriteLock;
use crate::merge::{
    apply_overlay, diff_settings, merge_items, merge_settings, reconcile_items, validate_items,
};
use crate::models::{ADMIN_USER, EffectiveView, StoreData, WritePatch};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// JSON-file backed link store.
///
/// Reads go straight to disk without taking the lock, so a read racing a
/// write may see either side of it. The one exception is the first read of a
/// missing file, which creates the defaults under `lock`. Writes hold `lock`
/// across the whole load-modify-save cycle.
#[derive(Debug, Clone)]
pub struct LinkStore {
    path: PathBuf,
    lock: Arc<WriteLock>,
}

impl LinkStore {
    pub fn new(path: impl Into<PathBuf>, lock: Arc<WriteLock>) -> Self {
        Self {
            path: path.into(),
            lock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look at the file without any fallback or side effect.
    pub async fn probe(&self) -> StoreResult<LoadOutcome> {
        file::load(&self.path).await
    }

    /// Merged settings and items for `user`.
    pub async fn read_view(&self, user: &str) -> StoreResult<EffectiveView> {
        let data = self.load_for_read().await?;
        Ok(compose_view(&data, user))
    }

    /// Apply one write request for `user` under the write lock.
    pub async fn write(&self, user: &str, patch: WritePatch) -> StoreResult<()> {
        let _guard = self.lock.acquire().await;

        let mut data = self.load_for_write().await?;
        apply_patch(&mut data, user, patch)?;
        file::save(&self.path, &data).await?;

        info!("Store updated for user '{}'", user);
        Ok(())
    }

    async fn load_for_read(&self) -> StoreResult<StoreData> {
        match file::load(&self.path).await? {
            LoadOutcome::Loaded(data) => Ok(data),
            LoadOutcome::Missing => self.create_defaults().await,
            LoadOutcome::Corrupt { reason, .. } => {
                self.serve_defaults_for_corrupt(&reason);
                Ok(StoreData::default())
            }
        }
    }

    /// Write the default document, unless a writer got there first.
    async fn create_defaults(&self) -> StoreResult<StoreData> {
        let _guard = self.lock.acquire().await;

        match file::load(&self.path).await? {
            LoadOutcome::Loaded(data) => Ok(data),
            LoadOutcome::Missing => {
                info!("No store at {}, creating defaults", self.path.display());
                let data = StoreData::default();
                file::save(&self.path, &data).await?;
                Ok(data)
            }
            LoadOutcome::Corrupt { reason, .. } => {
                self.serve_defaults_for_corrupt(&reason);
                Ok(StoreData::default())
            }
        }
    }

    fn serve_defaults_for_corrupt(&self, reason: &str) {
        warn!(
            "Store at {} is unreadable ({}), serving defaults",
            self.path.display(),
            reason
        );
    }

    async fn load_for_write(&self) -> StoreResult<StoreData> {
        match file::load(&self.path).await? {
            LoadOutcome::Loaded(data) => Ok(data),
            LoadOutcome::Missing => Ok(StoreData::default()),
            LoadOutcome::Corrupt { raw, reason } => {
                let backup = file::backup_corrupt(&self.path, &raw).await?;
                warn!(
                    "Store at {} is unreadable ({}), copied to {} before rewriting",
                    self.path.display(),
                    reason,
                    backup.display()
                );
                Ok(StoreData::default())
            }
        }
    }
}

/// Build the effective view of `data` for `user`.
pub fn compose_view(data: &StoreData, user: &str) -> EffectiveView {
    let user_data = data.users.get(user);

    let settings = match user_data {
        Some(u) => apply_overlay(&data.global_settings, &u.settings),
        None => data.global_settings.clone(),
    };
    let overlay = user_data.map(|u| u.items.as_slice()).unwrap_or_default();

    EffectiveView {
        settings,
        global_settings: data.global_settings.clone(),
        items: merge_items(&data.common.items, overlay),
    }
}

/// Fold a write request into `data`.
///
/// Everything is validated before `data` is touched, so an error leaves the
/// document as it was.
pub fn apply_patch(data: &mut StoreData, user: &str, patch: WritePatch) -> StoreResult<()> {
    if let Some(items) = &patch.items {
        validate_items(items)?;
    }

    if user == ADMIN_USER {
        let settings = match &patch.settings {
            Some(submitted) => Some(merge_settings(&data.global_settings, submitted)?),
            None => None,
        };

        if let Some(settings) = settings {
            data.global_settings = settings;
        }
        if let Some(items) = patch.items {
            data.common.items = items;
            data.users.entry(ADMIN_USER.to_string()).or_default().items.clear();
        }
        return Ok(());
    }

    let existing = data.users.get(user).cloned().unwrap_or_default();

    let overlay = match &patch.settings {
        Some(submitted) => Some(diff_settings(
            &data.global_settings,
            &existing.settings,
            submitted,
        )?),
        None => None,
    };
    let items = patch
        .items
        .map(|submitted| reconcile_items(&data.common.items, submitted));

    let entry = data.users.entry(user.to_string()).or_default();
    if let Some(overlay) = overlay {
        entry.settings = overlay;
    }
    if let Some(items) = items {
        entry.items = items;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LinkItem, SettingsOverlay, SortMode};
    use serde_json::{Value, json};
    use std::time::Duration;

    fn item(id: &str, name: &str) -> LinkItem {
        LinkItem::new(id, name, format!("https://{}.local", id))
    }

    fn items_patch(items: Vec<LinkItem>) -> WritePatch {
        WritePatch {
            items: Some(items),
            settings: None,
        }
    }

    fn settings_patch(value: Value) -> WritePatch {
        let Value::Object(map) = value else {
            panic!("settings patch must be an object");
        };
        WritePatch {
            items: None,
            settings: Some(map),
        }
    }

    fn store_in(dir: &tempfile::TempDir) -> LinkStore {
        LinkStore::new(dir.path().join("home-links.json"), Arc::new(WriteLock::new()))
    }

    #[test]
    fn admin_items_replace_common_and_clear_admin_overlay() {
        let mut data = StoreData::default();
        data.common.items = vec![item("old", "Old")];
        data.users.get_mut(ADMIN_USER).unwrap().items = vec![item("stray", "Stray")];

        apply_patch(&mut data, ADMIN_USER, items_patch(vec![item("a", "A")])).unwrap();

        assert_eq!(data.common.items, vec![item("a", "A")]);
        assert!(data.users[ADMIN_USER].items.is_empty());
    }

    #[test]
    fn admin_settings_merge_into_global() {
        let mut data = StoreData::default();
        apply_patch(
            &mut data,
            ADMIN_USER,
            settings_patch(json!({ "siteTitle": "Team", "sortMode": "urgency" })),
        )
        .unwrap();

        assert_eq!(data.global_settings.site_title, "Team");
        assert_eq!(data.global_settings.sort_mode, SortMode::Urgency);
        assert!(data.users[ADMIN_USER].settings.is_empty());
    }

    #[test]
    fn user_write_of_unchanged_common_item_leaves_no_override() {
        let mut data = StoreData::default();
        data.common.items = vec![item("a", "A"), item("b", "B")];

        let unchanged = items_patch(data.common.items.clone());
        apply_patch(&mut data, "kim", unchanged).unwrap();

        assert!(data.users["kim"].items.is_empty());
        assert_eq!(compose_view(&data, "kim").items, data.common.items);
    }

    #[test]
    fn user_edit_is_kept_and_visible_only_to_that_user() {
        let mut data = StoreData::default();
        data.common.items = vec![item("a", "A"), item("b", "B")];

        let mut edited = item("b", "B");
        edited.pinned = Some(true);
        apply_patch(
            &mut data,
            "kim",
            items_patch(vec![item("a", "A"), edited.clone()]),
        )
        .unwrap();

        assert_eq!(data.users["kim"].items, vec![edited.clone()]);
        assert_eq!(compose_view(&data, "kim").items[1], edited);
        assert_eq!(compose_view(&data, "lee").items[1], item("b", "B"));
    }

    #[test]
    fn user_settings_store_only_differences() {
        let mut data = StoreData::default();
        let title = data.global_settings.site_title.clone();

        apply_patch(
            &mut data,
            "kim",
            settings_patch(json!({ "siteTitle": title, "openMode": "same_tab" })),
        )
        .unwrap();

        let overlay = &data.users["kim"].settings;
        assert_eq!(overlay.keys().collect::<Vec<_>>(), vec!["openMode"]);

        let view = compose_view(&data, "kim");
        assert_eq!(view.settings.site_title, data.global_settings.site_title);
        assert_ne!(view.settings.open_mode, view.global_settings.open_mode);
    }

    #[test]
    fn invalid_patch_leaves_document_untouched() {
        let mut data = StoreData::default();
        data.common.items = vec![item("a", "A")];
        let before = data.clone();

        let patch = WritePatch {
            items: Some(vec![item("x", "X"), item("x", "X2")]),
            settings: None,
        };
        assert!(apply_patch(&mut data, ADMIN_USER, patch).is_err());

        let patch = WritePatch {
            items: Some(vec![item("n", "N")]),
            settings: Some(serde_json::Map::from_iter([(
                "healthIntervalSec".to_string(),
                json!("often"),
            )])),
        };
        assert!(apply_patch(&mut data, "kim", patch).is_err());

        assert_eq!(data, before);
    }

    #[test]
    fn unknown_user_sees_global_view() {
        let mut data = StoreData::default();
        data.common.items = vec![item("a", "A")];
        data.users.insert(
            "kim".to_string(),
            crate::models::UserData {
                items: vec![item("k", "K")],
                settings: SettingsOverlay::default(),
            },
        );

        let view = compose_view(&data, "nobody");
        assert_eq!(view.items, data.common.items);
        assert_eq!(view.settings, data.global_settings);
    }

    #[tokio::test]
    async fn first_read_persists_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let view = store.read_view(ADMIN_USER).await.unwrap();
        assert!(view.items.is_empty());
        assert!(matches!(store.probe().await.unwrap(), LoadOutcome::Loaded(_)));
    }

    #[tokio::test]
    async fn corrupt_file_is_served_as_defaults_and_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        tokio::fs::write(store.path(), b"{ broken").await.unwrap();

        let view = store.read_view("kim").await.unwrap();
        assert_eq!(view.settings, crate::models::Settings::default());
        assert_eq!(tokio::fs::read(store.path()).await.unwrap(), b"{ broken");
    }

    #[tokio::test]
    async fn write_over_corrupt_file_keeps_a_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        tokio::fs::write(store.path(), b"{ broken").await.unwrap();

        store
            .write(ADMIN_USER, items_patch(vec![item("a", "A")]))
            .await
            .unwrap();

        let mut backups = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with("home-links.json.corrupt-") {
                backups.push(entry.path());
            }
        }
        assert_eq!(backups.len(), 1);
        assert_eq!(tokio::fs::read(&backups[0]).await.unwrap(), b"{ broken");

        let view = store.read_view(ADMIN_USER).await.unwrap();
        assert_eq!(view.items, vec![item("a", "A")]);
    }

    #[tokio::test]
    async fn write_then_read_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store
            .write(ADMIN_USER, items_patch(vec![item("a", "A"), item("b", "B")]))
            .await
            .unwrap();

        let mut edited = item("a", "Mine");
        edited.favorite = Some(true);
        store
            .write("kim", items_patch(vec![edited.clone(), item("b", "B")]))
            .await
            .unwrap();

        let view = store.read_view("kim").await.unwrap();
        assert_eq!(view.items, vec![edited, item("b", "B")]);

        let admin = store.read_view(ADMIN_USER).await.unwrap();
        assert_eq!(admin.items, vec![item("a", "A"), item("b", "B")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.read_view(ADMIN_USER).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let user = format!("user{}", i);
                store
                    .write(&user, items_patch(vec![item(&format!("p{}", i), "Private")]))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let LoadOutcome::Loaded(data) = store.probe().await.unwrap() else {
            panic!("store should be readable after concurrent writes");
        };
        for i in 0..16 {
            let user = &data.users[&format!("user{}", i)];
            assert_eq!(user.items[0].id, format!("p{}", i));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn first_read_does_not_clobber_a_concurrent_write() {
        for _ in 0..50 {
            let dir = tempfile::tempdir().unwrap();
            let store = store_in(&dir);

            let reader = {
                let store = store.clone();
                tokio::spawn(async move { store.read_view("kim").await })
            };
            let writer = {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .write(ADMIN_USER, items_patch(vec![item("a", "A")]))
                        .await
                })
            };
            reader.await.unwrap().unwrap();
            writer.await.unwrap().unwrap();

            let LoadOutcome::Loaded(data) = store.probe().await.unwrap() else {
                panic!("store should be readable after the first read and write");
            };
            assert_eq!(data.common.items, vec![item("a", "A")]);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn queued_writes_to_one_key_apply_in_arrival_order() {
        let dir = tempfile::tempdir().unwrap();
        let lock = Arc::new(WriteLock::new());
        let store = LinkStore::new(dir.path().join("home-links.json"), lock.clone());

        let held = lock.acquire().await;
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .write(
                        ADMIN_USER,
                        settings_patch(json!({ "siteTitle": format!("title-{}", i) })),
                    )
                    .await
            }));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(lock.is_held());
        assert!(matches!(store.probe().await.unwrap(), LoadOutcome::Missing));
        drop(held);

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let view = store.read_view(ADMIN_USER).await.unwrap();
        assert_eq!(view.global_settings.site_title, "title-7");
    }

    #[tokio::test]
    async fn odd_stored_values_keep_the_document_readable() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let odd_item = json!({
            "id": "a",
            "name": "Grafana",
            "url": "https://grafana.local",
            "healthOkMin": 250.5
        });
        let document = json!({
            "version": 2,
            "globalSettings": { "siteTitle": "Lab", "healthIntervalSec": null },
            "common": { "items": [odd_item.clone()] },
            "users": { "admin": { "items": [] } }
        });
        tokio::fs::write(store.path(), document.to_string())
            .await
            .unwrap();

        assert!(matches!(store.probe().await.unwrap(), LoadOutcome::Loaded(_)));
        let view = store.read_view("kim").await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.settings.site_title, "Lab");
        assert_eq!(view.settings.health_interval_sec, 30);

        store
            .write("kim", settings_patch(json!({ "sortMode": "urgency" })))
            .await
            .unwrap();

        let LoadOutcome::Loaded(data) = store.probe().await.unwrap() else {
            panic!("store should stay readable after a write");
        };
        assert_eq!(serde_json::to_value(&data.common.items).unwrap(), json!([odd_item]));
        assert_eq!(data.global_settings.site_title, "Lab");
    }
}
