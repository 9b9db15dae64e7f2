//! Two-tier link store: a common item set owned by the admin identity plus
//! per-user overlays, persisted as one JSON document.

pub mod error;
pub mod file;
pub mod lock;
pub mod merge;
pub mod models;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use file::LoadOutcome;
pub use lock::WriteLock;
pub use models::{
    ADMIN_USER, DATA_VERSION, EffectiveView, LinkItem, Settings, SettingsOverlay, StoreData,
    UserData, WritePatch,
};
pub use store::LinkStore;
