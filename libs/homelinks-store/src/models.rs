use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Identity whose items are the common set.
pub const ADMIN_USER: &str = "admin";

/// Version tag written into every store file.
pub const DATA_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthMethod {
    #[serde(rename = "HEAD")]
    Head,
    #[serde(rename = "GET")]
    Get,
}

/// A single launcher entry.
///
/// Keys the server does not know about are kept in `extra` and written back
/// untouched, so they survive a round trip through the store. A known key
/// whose value does not fit its field (say `healthOkMin: 250.5`) lands in
/// `extra` too, so one odd item never makes the whole document unreadable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "Map<String, Value>")]
pub struct LinkItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details_md: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_renewal_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_expiry_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_method: Option<HealthMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_ok_min: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LinkItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            git_url: None,
            doc_url: None,
            site_url: None,
            description: None,
            details_md: None,
            logo_url: None,
            cert_renewal_date: None,
            token_expiry_date: None,
            pinned: None,
            favorite: None,
            health_url: None,
            health_method: None,
            health_ok_min: None,
            tags: None,
            is_public: None,
            extra: Map::new(),
        }
    }
}

impl TryFrom<Map<String, Value>> for LinkItem {
    type Error = String;

    fn try_from(mut raw: Map<String, Value>) -> Result<Self, Self::Error> {
        let id = match raw.remove("id") {
            Some(Value::String(id)) => id,
            Some(other) => return Err(format!("item id must be a string, got {}", other)),
            None => return Err("missing field `id`".to_string()),
        };

        Ok(Self {
            id,
            name: take_text(&mut raw, "name"),
            url: take_text(&mut raw, "url"),
            git_url: take(&mut raw, "gitUrl"),
            doc_url: take(&mut raw, "docUrl"),
            site_url: take(&mut raw, "siteUrl"),
            description: take(&mut raw, "description"),
            details_md: take(&mut raw, "detailsMd"),
            logo_url: take(&mut raw, "logoUrl"),
            cert_renewal_date: take(&mut raw, "certRenewalDate"),
            token_expiry_date: take(&mut raw, "tokenExpiryDate"),
            pinned: take(&mut raw, "pinned"),
            favorite: take(&mut raw, "favorite"),
            health_url: take(&mut raw, "healthUrl"),
            health_method: take(&mut raw, "healthMethod"),
            health_ok_min: take(&mut raw, "healthOkMin"),
            tags: take(&mut raw, "tags"),
            is_public: take(&mut raw, "isPublic"),
            extra: raw,
        })
    }
}

/// Move `key` out of `raw` if it decodes as `T`; otherwise leave it there.
fn take<T: DeserializeOwned>(raw: &mut Map<String, Value>, key: &str) -> Option<T> {
    let value = raw.remove(key)?;
    match T::deserialize(&value) {
        Ok(typed) => Some(typed),
        Err(_) => {
            raw.insert(key.to_string(), value);
            None
        }
    }
}

fn take_text(raw: &mut Map<String, Value>, key: &str) -> String {
    match raw.remove(key) {
        Some(Value::String(text)) => text,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Classic,
    Ocean,
    Carbon,
    Sunset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    Urgency,
    #[default]
    AlphaAsc,
    AlphaDesc,
    PinnedFavUrgency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    #[default]
    NewTab,
    SameTab,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Colors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub star: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fav_bar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin_bg: Option<String>,
}

/// Site-wide display settings. Missing keys in a stored record take the
/// default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub site_title: String,
    pub site_subtitle: String,
    pub site_logo: Option<String>,
    pub site_background_url: Option<String>,
    pub theme: Theme,
    pub sort_mode: SortMode,
    pub open_mode: OpenMode,
    pub admin_mode: bool,
    pub health_enabled: bool,
    #[serde(deserialize_with = "whole_seconds")]
    pub health_interval_sec: u32,
    pub health_show_ms: bool,
    pub colors: Option<Colors>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            site_title: "홈링크웹".to_string(),
            site_subtitle: "런처 중심 · 소스위치 · 만료 카운트".to_string(),
            site_logo: None,
            site_background_url: None,
            theme: Theme::Classic,
            sort_mode: SortMode::AlphaAsc,
            open_mode: OpenMode::NewTab,
            admin_mode: true,
            health_enabled: true,
            health_interval_sec: 30,
            health_show_ms: true,
            colors: Some(Colors {
                star: Some("#f59e0b".to_string()),
                fav_bar: Some("#f59e0b".to_string()),
                pin: Some("#0ea5e9".to_string()),
                pin_bg: None,
            }),
        }
    }
}

impl Settings {
    /// Lay `patch` over `self`, skipping keys whose value does not fit.
    ///
    /// Returns the result and the names of the skipped keys.
    pub fn overlay_lenient(&self, patch: &Map<String, Value>) -> (Settings, Vec<String>) {
        let Ok(Value::Object(mut accepted)) = serde_json::to_value(self) else {
            return (self.clone(), patch.keys().cloned().collect());
        };

        let mut skipped = Vec::new();
        for (key, value) in patch {
            let mut trial = accepted.clone();
            trial.insert(key.clone(), value.clone());
            if Settings::deserialize(&Value::Object(trial)).is_ok() {
                accepted.insert(key.clone(), value.clone());
            } else {
                skipped.push(key.clone());
            }
        }

        let settings =
            Settings::deserialize(&Value::Object(accepted)).unwrap_or_else(|_| self.clone());
        (settings, skipped)
    }
}

/// Interval in whole seconds. Fractions are rounded; negatives, non-finite
/// values and anything past `u32::MAX` are rejected.
fn whole_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let number = Number::deserialize(deserializer)?;
    if let Some(secs) = number.as_u64() {
        return u32::try_from(secs).map_err(|_| D::Error::custom("interval is too large"));
    }
    match number.as_f64() {
        Some(secs) if secs.is_finite() && secs >= 0.0 && secs.round() <= f64::from(u32::MAX) => {
            Ok(secs.round() as u32)
        }
        _ => Err(D::Error::custom("interval must be a non-negative number of seconds")),
    }
}

/// Stored global settings: keys that no longer fit fall back to the default
/// instead of failing the whole document.
fn stored_settings<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Settings, D::Error> {
    let raw = Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    let (settings, skipped) = Settings::default().overlay_lenient(&raw);
    if !skipped.is_empty() {
        tracing::warn!(
            "Ignoring stored global settings that do not fit: {}",
            skipped.join(", ")
        );
    }
    Ok(settings)
}

/// Partial settings keyed by their wire names. Only keys a user overrides
/// are present.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsOverlay(pub Map<String, Value>);

impl SettingsOverlay {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserData {
    #[serde(default)]
    pub items: Vec<LinkItem>,
    #[serde(default, skip_serializing_if = "SettingsOverlay::is_empty")]
    pub settings: SettingsOverlay,
}

/// The whole persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreData {
    pub version: u32,
    #[serde(default, deserialize_with = "stored_settings")]
    pub global_settings: Settings,
    #[serde(default)]
    pub common: UserData,
    #[serde(default)]
    pub users: BTreeMap<String, UserData>,
}

impl Default for StoreData {
    fn default() -> Self {
        let mut users = BTreeMap::new();
        users.insert(ADMIN_USER.to_string(), UserData::default());

        Self {
            version: DATA_VERSION,
            global_settings: Settings::default(),
            common: UserData::default(),
            users,
        }
    }
}

/// What one user sees: merged settings and items.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveView {
    pub settings: Settings,
    pub global_settings: Settings,
    pub items: Vec<LinkItem>,
}

/// Body of a write request. Either key may be absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WritePatch {
    #[serde(default)]
    pub items: Option<Vec<LinkItem>>,
    #[serde(default)]
    pub settings: Option<Map<String, Value>>,
}
