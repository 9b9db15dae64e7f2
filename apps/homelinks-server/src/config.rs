use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

const CONFIG_PATHS: [&str; 2] = ["./homelinks.toml", "/etc/homelinks/homelinks.toml"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub data_file: PathBuf,
    /// Served at `/`; uploads land in `<public_dir>/uploads`.
    pub public_dir: PathBuf,
    pub health_timeout_secs: u64,
    pub max_upload_bytes: usize,
    pub log_dir: Option<PathBuf>,

    #[serde(skip)]
    pub loaded_from: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 3000)),
            data_file: PathBuf::from("data/home-links.json"),
            public_dir: PathBuf::from("public"),
            health_timeout_secs: 5,
            max_upload_bytes: 10 * 1024 * 1024,
            log_dir: None,
            loaded_from: None,
        }
    }
}

impl ServerConfig {
    /// An explicit path must exist. Without one, the well-known locations are
    /// tried in order and the environment is the last resort.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        for path in CONFIG_PATHS {
            let path = Path::new(path);
            if path.is_file() {
                return Self::from_file(path);
            }
        }

        Self::from_env_with(|key| std::env::var(key).ok())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.loaded_from = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let listen = match lookup("HOMELINKS_LISTEN") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("HOMELINKS_LISTEN is not a socket address: {}", raw))?,
            None => defaults.listen,
        };

        Ok(Self {
            listen,
            data_file: lookup("HOMELINKS_DATA_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_file),
            public_dir: lookup("HOMELINKS_PUBLIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.public_dir),
            health_timeout_secs: lookup("HOMELINKS_HEALTH_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.health_timeout_secs),
            max_upload_bytes: lookup("HOMELINKS_MAX_UPLOAD_BYTES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_upload_bytes),
            log_dir: lookup("HOMELINKS_LOG_DIR").map(PathBuf::from),
            loaded_from: None,
        })
    }
}
