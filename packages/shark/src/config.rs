use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use shark_client::SyncConfig;

// =============================================================================
// File config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
//   config.toml:     [server]
//                    base_url = "https://chat.example.com"
//
//   env var:         SHARK_SERVER__BASE_URL=https://chat.example.com
//                    SHARK_PUSH__KEEPALIVE_SECS=5   (double underscore = nesting)

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub push: PushFileConfig,
}

/// Backend location (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Push endpoint; derived from `base_url` when unset
    #[serde(default)]
    pub ws_url: Option<String>,
    /// Per-request timeout (0 = wait indefinitely)
    #[serde(default)]
    pub request_timeout_secs: u64,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ws_url: None,
            request_timeout_secs: 0,
        }
    }
}

/// Push channel tunables (lives under `[push]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PushFileConfig {
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    #[serde(default = "default_reconnect_max_secs")]
    pub reconnect_max_secs: u64,
}

impl Default for PushFileConfig {
    fn default() -> Self {
        Self {
            keepalive_secs: default_keepalive_secs(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_secs: default_reconnect_max_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}
fn default_keepalive_secs() -> u64 {
    20
}
fn default_reconnect_initial_ms() -> u64 {
    1000
}
fn default_reconnect_max_secs() -> u64 {
    60
}

/// Build a figment that layers: defaults → config.toml → SHARK_* env vars.
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("SHARK_").split("__"))
}

impl FileConfig {
    /// Runtime view for the sync core. `server` overrides `[server].base_url`
    /// (and the derived push URL).
    pub fn to_sync_config(&self, server: Option<&str>) -> SyncConfig {
        let mut config = match server {
            Some(base) => SyncConfig::new(base),
            None => {
                let config = SyncConfig::new(self.server.base_url.as_str());
                match &self.server.ws_url {
                    Some(ws_url) => config.with_ws_url(ws_url.as_str()),
                    None => config,
                }
            }
        };
        config.keepalive_interval = Duration::from_secs(self.push.keepalive_secs.max(1));
        config.reconnect_initial = Duration::from_millis(self.push.reconnect_initial_ms.max(1));
        config.reconnect_max =
            Duration::from_secs(self.push.reconnect_max_secs).max(config.reconnect_initial);
        config.request_timeout = match self.server.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        config
    }
}

// =============================================================================
// Directory layout (not tunable via figment; derived from --data-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct SharkConfig {
    pub data_dir: PathBuf,
}

impl SharkConfig {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".shark"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        debug!("Data directory: {}", data_dir.display());

        Ok(Self { data_dir })
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    pub fn load(&self) -> Result<FileConfig> {
        load_config(&self.data_dir)
            .extract()
            .with_context(|| format!("Invalid configuration in {:?}", self.config_toml_path()))
    }
}
